//! Sync orchestration: pull one sensor row, normalize it, fetch charts
//! and persist the merged record.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::charts::{
    build_chart_url, escape_html, fetch_chart, log_chart_failure, ChartWindow, PREVIEW_WINDOWS,
    SYNC_WINDOWS,
};
use super::client::{effective_timeout, fetch_sensor_row, normalize_endpoint};
use super::normalize::normalize_row;
use crate::db::{EntityStore, PrtgConfig, SensorRecord};
use crate::error::PrtgError;

/// Scope name of the sensor records owned by this service.
pub const SENSOR_SCOPE: &str = "Sensor";

/// Outcome of a sync attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
}

impl SyncReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Chart set returned by the interactive preview endpoint.
#[derive(Debug, Serialize)]
pub struct ChartPreview {
    pub charts: BTreeMap<String, String>,
    pub failed: Vec<String>,
}

/// Credentials and limits resolved from the active configuration.
struct ResolvedConfig {
    endpoint: String,
    username: String,
    passhash: String,
    verify_tls: bool,
    timeout: Duration,
}

fn resolve_config(config: &PrtgConfig) -> Result<ResolvedConfig, PrtgError> {
    let endpoint = normalize_endpoint(&config.endpoint);
    let username = config.username.trim().to_string();
    let passhash = config.passhash.trim().to_string();

    if endpoint.is_empty() || username.is_empty() || passhash.is_empty() {
        return Err(PrtgError::Configuration(
            "Configuração incompleta (endpoint, usuário ou passhash).".to_string(),
        ));
    }

    Ok(ResolvedConfig {
        endpoint,
        username,
        passhash,
        verify_tls: config.verify_tls,
        timeout: effective_timeout(config.timeout_secs),
    })
}

/// Orchestrates sensor synchronization against the injected store.
pub struct SyncService {
    store: Arc<dyn EntityStore>,
    chart_log_path: PathBuf,
}

impl SyncService {
    pub fn new(store: Arc<dyn EntityStore>, chart_log_path: PathBuf) -> Self {
        Self {
            store,
            chart_log_path,
        }
    }

    /// Sync one stored sensor record by its local id.
    pub async fn sync_by_id(&self, id: i64) -> SyncReport {
        let mut entity = match self.store.get_sensor(id) {
            Ok(Some(entity)) => entity,
            Ok(None) => return SyncReport::fail("Registro não encontrado."),
            Err(e) => {
                tracing::error!("store lookup failed for sensor record {}: {}", id, e);
                return SyncReport::fail("Registro não encontrado.");
            }
        };

        self.sync_entity(&mut entity, true).await
    }

    /// Core sync: fetch the row, normalize, fetch charts, merge and
    /// (optionally) persist. Always recomputes and overwrites every
    /// derived field, so repeated calls are idempotent.
    pub async fn sync_entity(&self, entity: &mut SensorRecord, persist: bool) -> SyncReport {
        let sensor_id = entity.sensor_id.trim().to_string();
        if sensor_id.is_empty() {
            return SyncReport::fail("Sensor ID vazio.");
        }

        let config = match self.store.find_active_config() {
            Ok(Some(config)) => config,
            Ok(None) => return SyncReport::fail("Configuração PRTG não encontrada."),
            Err(e) => {
                tracing::error!("config lookup failed: {}", e);
                return SyncReport::fail("Configuração PRTG não encontrada.");
            }
        };

        let resolved = match resolve_config(&config) {
            Ok(resolved) => resolved,
            Err(e) => return SyncReport::fail(e.to_string()),
        };

        let row = match fetch_sensor_row(
            &resolved.endpoint,
            &resolved.username,
            &resolved.passhash,
            &sensor_id,
            resolved.verify_tls,
            resolved.timeout,
        )
        .await
        {
            Ok(row) => row,
            Err(e) => return SyncReport::fail(e.to_string()),
        };

        let normalized = normalize_row(&row);

        if let Some(name) = normalized.name {
            entity.name = name;
        }
        entity.probe = normalized.probe;
        entity.group = normalized.group;
        entity.device = normalized.device;
        entity.status = normalized.status;
        entity.last_value = normalized.last_value;
        entity.last_check = normalized.last_check;
        entity.last_up = normalized.last_up;
        entity.last_down = normalized.last_down;
        entity.uptime = normalized.uptime;
        entity.downtime = normalized.downtime;
        entity.coverage = normalized.coverage;
        entity.interval_secs = normalized.interval_secs;
        entity.message = normalized.message;
        entity.priority = normalized.priority;
        entity.raw_details = serde_json::to_string(&row).ok();

        // Chart images can be slow to render upstream; give them more
        // room than the table call.
        let now = Utc::now();
        let fetch_timeout = resolved.timeout.max(Duration::from_secs(60));

        for window in &SYNC_WINDOWS {
            let markup = self
                .render_sync_chart(&resolved, &sensor_id, now, window, fetch_timeout)
                .await;
            match window.key {
                "h2" => entity.chart_2h = markup,
                "d2" => entity.chart_2d = markup,
                "d30" => entity.chart_30d = markup,
                "d365" => entity.chart_365d = markup,
                _ => {}
            }
        }

        if persist {
            if let Err(e) = self.store.save_sensor(entity) {
                tracing::error!("failed to persist sensor record {}: {}", entity.id, e);
                return SyncReport::fail("Falha ao salvar o registro.");
            }
        }

        SyncReport::ok("Sensor atualizado do PRTG.")
    }

    /// Fire-and-forget sync attempt used right after record creation.
    ///
    /// Failures are logged and swallowed; the creation has already
    /// succeeded and the record stays recoverable via a manual sync.
    pub fn spawn_auto_sync(self: Arc<Self>, id: i64) {
        let service = self;
        tokio::spawn(async move {
            let report = service.sync_by_id(id).await;
            if !report.success {
                tracing::warn!(
                    "auto-sync for sensor record {} failed: {}",
                    id,
                    report.message
                );
            }
        });
    }

    /// One window of the sync path: embedded image on success, escaped
    /// fallback link on failure. Failures go to the chart log and never
    /// abort sibling windows.
    async fn render_sync_chart(
        &self,
        config: &ResolvedConfig,
        sensor_id: &str,
        now: chrono::DateTime<Utc>,
        window: &ChartWindow,
        timeout: Duration,
    ) -> Option<String> {
        let url = match build_chart_url(
            &config.endpoint,
            &config.username,
            &config.passhash,
            sensor_id,
            now,
            window,
        ) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("chart URL for window {} not built: {}", window.key, e);
                return None;
            }
        };

        let markup = match fetch_chart(&url, config.verify_tls, timeout).await {
            Ok(data_uri) => format!(
                r#"<div class="text-center"><img src="{}" alt="PRTG {}" style="max-width:100%; border:1px solid #e5e7eb; border-radius:4px;" /></div>"#,
                data_uri,
                escape_html(window.key)
            ),
            Err(failure) => {
                log_chart_failure(&self.chart_log_path, &url, &failure);
                format!(
                    r#"<div class="text-center"><a href="{}" target="_blank" rel="noopener">Abrir gráfico {}</a></div>"#,
                    escape_html(url.as_str()),
                    escape_html(window.key)
                )
            }
        };

        Some(markup)
    }

    /// Read-only chart preview for the given scope and record id.
    ///
    /// Resolves the sensor id from the record itself for the sensor
    /// scope, or from the configured field name on any other scope.
    /// Fails only when every window fails.
    pub async fn fetch_charts_for(&self, scope: &str, id: i64) -> Result<ChartPreview, PrtgError> {
        let config = match self.store.find_active_config() {
            Ok(Some(config)) => config,
            Ok(None) => return Err(PrtgError::NotFound("PRTG config not found.".to_string())),
            Err(e) => {
                tracing::error!("config lookup failed: {}", e);
                return Err(PrtgError::NotFound("PRTG config not found.".to_string()));
            }
        };

        let sensor_id = self.resolve_scope_sensor_id(&config, scope, id)?;
        if sensor_id.is_empty() {
            return Err(PrtgError::Validation("Sensor ID not provided.".to_string()));
        }

        let resolved = resolve_config(&config).map_err(|_| {
            PrtgError::Configuration("PRTG credentials/config incomplete.".to_string())
        })?;

        let now = Utc::now();
        let mut charts = BTreeMap::new();
        let mut failed = Vec::new();

        for window in &PREVIEW_WINDOWS {
            let url = match build_chart_url(
                &resolved.endpoint,
                &resolved.username,
                &resolved.passhash,
                &sensor_id,
                now,
                window,
            ) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("chart URL for window {} not built: {}", window.key, e);
                    failed.push(window.key.to_string());
                    continue;
                }
            };

            match fetch_chart(&url, resolved.verify_tls, resolved.timeout).await {
                Ok(data_uri) => {
                    charts.insert(window.key.to_string(), data_uri);
                }
                Err(failure) => {
                    let summary = failure
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("HTTP {}", failure.http_code));
                    tracing::warn!("PRTG chart fetch failed: {} ({})", summary, url);
                    failed.push(window.key.to_string());
                }
            }
        }

        if charts.is_empty() {
            return Err(PrtgError::Protocol {
                code: 502,
                message: "Não foi possível carregar gráficos do PRTG (h2/d2/d30).".to_string(),
            });
        }

        Ok(ChartPreview { charts, failed })
    }

    fn resolve_scope_sensor_id(
        &self,
        config: &PrtgConfig,
        scope: &str,
        id: i64,
    ) -> Result<String, PrtgError> {
        if scope == SENSOR_SCOPE {
            return match self.store.get_sensor(id) {
                Ok(Some(sensor)) => Ok(sensor.sensor_id.trim().to_string()),
                Ok(None) => Err(PrtgError::NotFound(format!(
                    "Entity {} not found.",
                    scope
                ))),
                Err(e) => {
                    tracing::error!("store lookup failed for sensor record {}: {}", id, e);
                    Err(PrtgError::NotFound(format!("Entity {} not found.", scope)))
                }
            };
        }

        let record = match self.store.get_record(scope, id) {
            Ok(Some(record)) => record,
            Ok(None) => return Err(PrtgError::NotFound(format!("Entity {} not found.", scope))),
            Err(e) => {
                tracing::error!("store lookup failed for {} {}: {}", scope, id, e);
                return Err(PrtgError::NotFound(format!("Entity {} not found.", scope)));
            }
        };

        let field = if config.sensor_field.trim().is_empty() {
            "idSensor"
        } else {
            config.sensor_field.trim()
        };

        Ok(match record.get(field) {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Number(number)) => number.to_string(),
            _ => String::new(),
        })
    }
}
