//! PRTG API integration.
//!
//! Client for the sensor-table endpoint, pure row normalization, chart
//! image retrieval, and the sync orchestration tying them together.

mod charts;
mod client;
mod normalize;
mod sync;

pub use charts::*;
pub use client::*;
pub use normalize::*;
pub use sync::*;
