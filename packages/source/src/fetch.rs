//! Reading raw payloads from local files or HTTP(S) URLs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::SourceError;
use crate::retry::{RetryPolicy, with_retry};

/// Per-request timeout for HTTP sources.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Where a payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLocation {
    /// Local file.
    Path(PathBuf),
    /// `http://` or `https://` URL.
    Url(String),
}

impl DataLocation {
    /// Whether the location is remote.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

impl FromStr for DataLocation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Ok(Self::Url(trimmed.to_string()))
        } else {
            Ok(Self::Path(PathBuf::from(trimmed)))
        }
    }
}

impl<'de> Deserialize<'de> for DataLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Ok(location) = String::deserialize(deserializer)?.parse();
        Ok(location)
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Payload bytes and whether they came from the fallback cache.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Raw payload.
    pub bytes: Vec<u8>,
    /// `true` when the live read failed and `cache` was used instead.
    pub from_cache: bool,
}

/// Reads `location` with bounded retry.
///
/// Successful remote reads are written to `cache` (when given); if the live
/// read fails, an existing `cache` file is returned instead.
///
/// # Errors
///
/// Returns [`SourceError::DataUnavailable`] if the live read fails and no
/// cache file can be read.
pub async fn fetch_bytes(
    location: &DataLocation,
    policy: &RetryPolicy,
    cache: Option<&Path>,
) -> Result<Fetched, SourceError> {
    let label = location.to_string();
    let client = http_client()?;
    let live = with_retry(policy, &label, || read_once(&client, location)).await;

    match live {
        Ok(bytes) => {
            if let Some(cache) = cache
                && location.is_remote()
                && let Err(e) = write_cache(cache, &bytes).await
            {
                log::warn!("{label}: failed to refresh cache {}: {e}", cache.display());
            }
            Ok(Fetched {
                bytes,
                from_cache: false,
            })
        }
        Err(e) => {
            if let Some(cache) = cache {
                match tokio::fs::read(cache).await {
                    Ok(bytes) => {
                        log::warn!(
                            "{label}: unavailable ({e}), using cached copy {}",
                            cache.display()
                        );
                        return Ok(Fetched {
                            bytes,
                            from_cache: true,
                        });
                    }
                    Err(cache_err) => {
                        log::debug!("{label}: no usable cache at {}: {cache_err}", cache.display());
                    }
                }
            }
            Err(SourceError::DataUnavailable {
                location: label,
                reason: e.to_string(),
            })
        }
    }
}

/// HTTP client shared by every remote read.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("saferoute/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// A single read of `location`, without retry or cache.
///
/// # Errors
///
/// Returns the I/O or HTTP error as-is so callers can decide whether to
/// retry.
pub async fn read_once(
    client: &reqwest::Client,
    location: &DataLocation,
) -> Result<Vec<u8>, SourceError> {
    match location {
        DataLocation::Path(path) => Ok(tokio::fs::read(path).await?),
        DataLocation::Url(url) => get_bytes(client, url).await,
    }
}

async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, SourceError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

async fn write_cache(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_locations() {
        assert_eq!(
            "https://data.example.org/crime.csv".parse::<DataLocation>().unwrap(),
            DataLocation::Url("https://data.example.org/crime.csv".to_string())
        );
        assert_eq!(
            "data/WLCrime.json".parse::<DataLocation>().unwrap(),
            DataLocation::Path(PathBuf::from("data/WLCrime.json"))
        );
    }

    #[tokio::test]
    async fn reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(&path, b"{}").unwrap();

        let fetched = fetch_bytes(&DataLocation::Path(path), &RetryPolicy::immediate(1), None)
            .await
            .unwrap();
        assert_eq!(fetched.bytes, b"{}");
        assert!(!fetched.from_cache);
    }

    #[tokio::test]
    async fn missing_file_without_cache_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let location = DataLocation::Path(dir.path().join("missing.csv"));

        let err = fetch_bytes(&location, &RetryPolicy::immediate(2), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache.csv");
        std::fs::write(&cache, b"cached").unwrap();
        let location = DataLocation::Path(dir.path().join("missing.csv"));

        let fetched = fetch_bytes(&location, &RetryPolicy::immediate(2), Some(&cache))
            .await
            .unwrap();
        assert_eq!(fetched.bytes, b"cached");
        assert!(fetched.from_cache);
    }
}
