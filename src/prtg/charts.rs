//! Chart image retrieval from the PRTG chart endpoint.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Url;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use super::client::build_client;
use super::normalize::body_snippet;
use crate::error::PrtgError;

/// One requested time-series image: lookback window plus averaging
/// interval.
#[derive(Debug, Clone, Copy)]
pub struct ChartWindow {
    pub key: &'static str,
    pub hours: i64,
    pub avg_secs: i64,
}

/// Windows embedded into a sensor record during sync.
pub const SYNC_WINDOWS: [ChartWindow; 4] = [
    ChartWindow { key: "h2", hours: 2, avg_secs: 300 },
    ChartWindow { key: "d2", hours: 48, avg_secs: 3600 },
    ChartWindow { key: "d30", hours: 720, avg_secs: 86400 },
    ChartWindow { key: "d365", hours: 8760, avg_secs: 86400 },
];

/// Windows served by the interactive preview endpoint.
pub const PREVIEW_WINDOWS: [ChartWindow; 3] = [
    ChartWindow { key: "h2", hours: 2, avg_secs: 300 },
    ChartWindow { key: "d2", hours: 48, avg_secs: 3600 },
    ChartWindow { key: "d30", hours: 720, avg_secs: 86400 },
];

/// Build the signed chart.png URL for one window.
pub fn build_chart_url(
    endpoint: &str,
    username: &str,
    passhash: &str,
    sensor_id: &str,
    now: DateTime<Utc>,
    window: &ChartWindow,
) -> Result<Url, PrtgError> {
    let end = format_chart_date(now);
    let start = format_chart_date(now - ChronoDuration::hours(window.hours));

    let mut url = Url::parse(&format!("{}/chart.png", endpoint))
        .map_err(|e| PrtgError::Configuration(format!("Endpoint inválido: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("graphid", "-1")
        .append_pair("width", "620")
        .append_pair("height", "220")
        .append_pair("sdate", &start)
        .append_pair("edate", &end)
        .append_pair("avg", &window.avg_secs.to_string())
        .append_pair("username", username)
        .append_pair("passhash", passhash)
        .append_pair("id", sensor_id);

    Ok(url)
}

/// PRTG's chart date format, seconds truncated to zero.
fn format_chart_date(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d-%H-%M-00").to_string()
}

/// Details of a failed chart fetch, destined for the failure log.
#[derive(Debug)]
pub struct ChartFailure {
    /// HTTP status, or 0 when the request never produced one.
    pub http_code: u16,
    pub error: Option<String>,
    pub snippet: String,
}

impl ChartFailure {
    fn transport(error: String) -> Self {
        Self {
            http_code: 0,
            error: Some(error),
            snippet: String::new(),
        }
    }
}

/// Fetch one chart image and return it as a PNG data URI.
///
/// The image is embedded rather than linked so viewers never see the
/// credential-bearing URL and never hit TLS-trust or mixed-content
/// problems of their own.
pub async fn fetch_chart(
    url: &Url,
    verify_tls: bool,
    timeout: Duration,
) -> Result<String, ChartFailure> {
    let client = match build_client(verify_tls, timeout) {
        Ok(client) => client,
        Err(e) => return Err(ChartFailure::transport(e.to_string())),
    };

    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(e) => return Err(ChartFailure::transport(e.to_string())),
    };

    let status = response.status().as_u16();
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Err(ChartFailure {
                http_code: status,
                error: Some(e.to_string()),
                snippet: String::new(),
            })
        }
    };

    if status >= 400 {
        return Err(ChartFailure {
            http_code: status,
            error: None,
            snippet: body_snippet(&String::from_utf8_lossy(&bytes)),
        });
    }

    Ok(format!("data:image/png;base64,{}", BASE64.encode(&bytes)))
}

/// Append one failure line to the chart log, best-effort.
///
/// The logged URL still carries credentials; the file must be treated as
/// secret.
pub fn log_chart_failure(log_path: &Path, url: &Url, failure: &ChartFailure) {
    let line = format!(
        "[{}] code={} error={} snippet={} url={}\n",
        Utc::now().to_rfc3339(),
        failure.http_code,
        failure.error.as_deref().unwrap_or("-"),
        if failure.snippet.is_empty() {
            "-"
        } else {
            failure.snippet.as_str()
        },
        url,
    );

    let _ = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
}

/// Minimal HTML escaping for attribute and text positions.
pub(crate) fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use chrono::TimeZone;
    use std::future::IntoFuture;
    use std::net::SocketAddr;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];

    async fn spawn_mock(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, router).into_future());
        addr
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 34, 56).unwrap()
    }

    #[test]
    fn test_build_chart_url() {
        let url = build_chart_url(
            "https://prtg.example.com",
            "admin",
            "0000",
            "2001",
            fixed_now(),
            &SYNC_WINDOWS[0],
        )
        .unwrap();

        assert_eq!(url.path(), "/chart.png");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("graphid"), Some("-1"));
        assert_eq!(get("width"), Some("620"));
        assert_eq!(get("height"), Some("220"));
        // Seconds truncated to zero on both ends.
        assert_eq!(get("edate"), Some("2024-03-15-12-34-00"));
        assert_eq!(get("sdate"), Some("2024-03-15-10-34-00"));
        assert_eq!(get("avg"), Some("300"));
        assert_eq!(get("id"), Some("2001"));
    }

    #[test]
    fn test_window_constants() {
        assert_eq!(SYNC_WINDOWS[3].hours, 8760);
        assert_eq!(SYNC_WINDOWS[3].avg_secs, 86400);
        assert_eq!(PREVIEW_WINDOWS.len(), 3);
        assert!(PREVIEW_WINDOWS.iter().all(|w| w.key != "d365"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#039;"
        );
    }

    #[tokio::test]
    async fn test_fetch_chart_success() {
        let router =
            Router::new().route("/chart.png", get(|| async { PNG_MAGIC.to_vec() }));
        let addr = spawn_mock(router).await;

        let url = Url::parse(&format!("http://{}/chart.png", addr)).unwrap();
        let data_uri = fetch_chart(&url, true, Duration::from_secs(5))
            .await
            .unwrap();

        let expected = format!("data:image/png;base64,{}", BASE64.encode(PNG_MAGIC));
        assert_eq!(data_uri, expected);
    }

    #[tokio::test]
    async fn test_fetch_chart_http_error() {
        let router = Router::new().route(
            "/chart.png",
            get(|| async { (StatusCode::NOT_FOUND, "<p>no such sensor</p>").into_response() }),
        );
        let addr = spawn_mock(router).await;

        let url = Url::parse(&format!("http://{}/chart.png", addr)).unwrap();
        let failure = fetch_chart(&url, true, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(failure.http_code, 404);
        assert_eq!(failure.snippet, "no such sensor");
    }

    #[tokio::test]
    async fn test_fetch_chart_transport_error() {
        let url = Url::parse("http://127.0.0.1:9/chart.png").unwrap();
        let failure = fetch_chart(&url, true, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(failure.http_code, 0);
        assert!(failure.error.is_some());
    }

    #[test]
    fn test_log_chart_failure_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("charts.log");
        let url = Url::parse("https://prtg.example.com/chart.png?id=1").unwrap();

        let failure = ChartFailure {
            http_code: 502,
            error: None,
            snippet: "bad gateway".to_string(),
        };
        log_chart_failure(&log_path, &url, &failure);
        log_chart_failure(&log_path, &url, &failure);

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("code=502"));
        assert!(contents.contains("snippet=bad gateway"));
        assert!(contents.contains(url.as_str()));
    }
}
