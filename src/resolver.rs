//! Art-URL resolution: embedded payloads, local files, and capped remote
//! downloads. Every failure here is non-fatal; the watch loop answers all of
//! them with the transparent placeholder.

use std::fmt;
use std::fs;
use std::io::Read;
use std::time::Duration;

use base64::Engine;
use log::debug;

use crate::art_reference::{classify, shrink_remote_url, ArtReference};

const USER_AGENT: &str = "Mozilla/5.0";
const DOWNLOAD_CHUNK_BYTES: usize = 8192;

/// Why an art reference produced no usable image bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    NoArt,
    DecodeError,
    NotFound,
    TooLarge,
    FetchError,
    Unsupported,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoArt => "no art reference reported",
            Self::DecodeError => "art data failed to decode",
            Self::NotFound => "local art file does not exist",
            Self::TooLarge => "download exceeded the byte budget",
            Self::FetchError => "remote fetch failed",
            Self::Unsupported => "unsupported art-URL scheme",
        };
        formatter.write_str(label)
    }
}

/// Turns an art-URL string into raw image bytes, or a typed failure.
pub struct ArtResolver {
    http_client: ureq::Agent,
    request_timeout: Duration,
    max_download_bytes: usize,
}

impl ArtResolver {
    pub fn new(request_timeout: Duration, max_download_bytes: usize) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(request_timeout)
            .timeout_read(request_timeout)
            .timeout_write(request_timeout)
            .build();
        Self {
            http_client,
            request_timeout,
            max_download_bytes,
        }
    }

    pub fn resolve(&self, raw: &str) -> Result<Vec<u8>, ResolveError> {
        match classify(raw) {
            ArtReference::NoArt => Err(ResolveError::NoArt),
            ArtReference::Embedded { payload } => base64::engine::general_purpose::STANDARD
                .decode(payload.as_bytes())
                .map_err(|error| {
                    debug!("Embedded art payload failed base64 decode: {error}");
                    ResolveError::DecodeError
                }),
            ArtReference::LocalFile { path } => {
                if !path.is_file() {
                    return Err(ResolveError::NotFound);
                }
                fs::read(&path).map_err(|error| {
                    debug!("Failed to read local art {}: {error}", path.display());
                    ResolveError::NotFound
                })
            }
            ArtReference::Remote { url } => self.fetch_capped(&shrink_remote_url(&url)),
            ArtReference::Unsupported => Err(ResolveError::Unsupported),
        }
    }

    /// Streams a remote download, aborting once the byte budget is exceeded.
    /// Partial data is discarded with the aborted request.
    fn fetch_capped(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let response = self
            .http_client
            .get(url)
            .set("User-Agent", USER_AGENT)
            .timeout(self.request_timeout)
            .call()
            .map_err(|error| {
                debug!("Art request for {url} failed: {error}");
                ResolveError::FetchError
            })?;

        let mut reader = response.into_reader();
        let mut bytes = Vec::new();
        let mut chunk = [0u8; DOWNLOAD_CHUNK_BYTES];
        loop {
            let read = reader.read(&mut chunk).map_err(|error| {
                debug!("Art download from {url} failed mid-stream: {error}");
                ResolveError::FetchError
            })?;
            if read == 0 {
                break;
            }
            if bytes.len() + read > self.max_download_bytes {
                debug!(
                    "Art download from {url} exceeded {} bytes, discarding",
                    self.max_download_bytes
                );
                return Err(ResolveError::TooLarge);
            }
            bytes.extend_from_slice(&chunk[..read]);
        }
        if bytes.is_empty() {
            debug!("Art download from {url} returned an empty body");
            return Err(ResolveError::FetchError);
        }
        Ok(bytes)
    }
}
