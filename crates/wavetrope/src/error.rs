//! Error types for Wavetrope
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the wavetrope engine
#[derive(Error, Debug)]
pub enum WaveError {
    #[error("{}", friendly_network_error(.0))]
    Network(#[from] reqwest::Error),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not ready: {0}")]
    NotReady(&'static str),

    #[error("Filter not found: {0}")]
    FilterNotFound(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl WaveError {
    /// True for errors raised because the session had no audio loaded yet
    pub fn is_not_ready(&self) -> bool {
        matches!(self, WaveError::NotReady(_))
    }
}

/// Result type alias for Wavetrope
pub type Result<T> = std::result::Result<T, WaveError>;

fn friendly_network_error(e: &reqwest::Error) -> String {
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if e.is_status() {
        if let Some(status) = e.status() {
            return format!("Server responded with {status}");
        }
    }
    format!("Network error: {e}")
}
