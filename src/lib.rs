//! Analytics over Open Hardware Monitor CSV logs: baseline statistics,
//! anomaly detection and human-readable insights, served over HTTP/JSON.

pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;
