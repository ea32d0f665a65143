//! Fetch boundary
//!
//! Turns a URL into the raw bytes of an audio file. Only the bytes cross into
//! the engine; retry policy is left to the caller.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::network::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, USER_AGENT};
use crate::error::{Result, WaveError};

/// Source of audio bytes
pub trait Fetch: Send {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP(S) fetcher with standard user agent and timeouts
pub struct HttpFetcher {
    inner: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Create a new fetcher with default Wavetrope settings
    pub fn new() -> Result<Self> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()?;
        Ok(Self { inner })
    }

    /// Access the underlying reqwest client
    pub fn inner(&self) -> &reqwest::blocking::Client {
        &self.inner
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.inner.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WaveError::Fetch(format!("{} returned {}", url, status)));
        }
        let bytes = resp.bytes()?;
        if bytes.is_empty() {
            return Err(WaveError::Fetch(format!("{} returned no data", url)));
        }
        log::debug!("fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// In-memory fetcher keyed by URL, for hosts that already hold the audio
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(url.into(), bytes);
    }

    pub fn with(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes);
        self
    }
}

impl Fetch for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.entries
            .get(url)
            .cloned()
            .ok_or_else(|| WaveError::Fetch(format!("{} not found", url)))
    }
}
