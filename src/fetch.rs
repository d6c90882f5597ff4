use async_trait::async_trait;
use reqwest::Url;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where a catalog or image lives: a remote URL or a local file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    Remote(Url),
    Local(PathBuf),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid location '{reference}': {message}")]
    InvalidLocation { reference: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn is_remote(reference: &str) -> bool {
    let lower = reference.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl ResourceLocation {
    /// Parse a user supplied location: http(s) URLs are remote, everything else is a path
    pub fn parse(reference: &str) -> Result<Self, FetchError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(FetchError::InvalidLocation {
                reference: reference.to_string(),
                message: "empty location".to_string(),
            });
        }

        if is_remote(reference) {
            return Url::parse(reference)
                .map(ResourceLocation::Remote)
                .map_err(|e| FetchError::InvalidLocation {
                    reference: reference.to_string(),
                    message: e.to_string(),
                });
        }

        if let Some(rest) = reference.strip_prefix("file://") {
            return Ok(ResourceLocation::Local(PathBuf::from(rest)));
        }

        Ok(ResourceLocation::Local(crate::utils::expand_tilde(reference)))
    }

    /// Resolve a reference found inside a catalog relative to this location
    pub fn resolve(&self, reference: &str) -> Result<Self, FetchError> {
        let reference = reference.trim();
        if is_remote(reference) || reference.starts_with("file://") {
            return Self::parse(reference);
        }

        match self {
            ResourceLocation::Remote(base) => base
                .join(reference)
                .map(ResourceLocation::Remote)
                .map_err(|e| FetchError::InvalidLocation {
                    reference: reference.to_string(),
                    message: e.to_string(),
                }),
            ResourceLocation::Local(base) => {
                let candidate = Path::new(reference);
                if candidate.is_absolute() {
                    Ok(ResourceLocation::Local(candidate.to_path_buf()))
                } else {
                    let dir = base.parent().unwrap_or_else(|| Path::new(""));
                    Ok(ResourceLocation::Local(dir.join(candidate)))
                }
            }
        }
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLocation::Remote(url) => write!(f, "{}", url),
            ResourceLocation::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Retrieves raw bytes for a catalog or image location
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, location: &ResourceLocation) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher backed by reqwest for remote URLs and tokio::fs for local files
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("frostgallery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, location: &ResourceLocation) -> Result<Vec<u8>, FetchError> {
        match location {
            ResourceLocation::Remote(url) => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|source| FetchError::Http {
                        url: url.to_string(),
                        source,
                    })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }

                let bytes = response.bytes().await.map_err(|source| FetchError::Http {
                    url: url.to_string(),
                    source,
                })?;
                Ok(bytes.to_vec())
            }
            ResourceLocation::Local(path) => {
                tokio::fs::read(path).await.map_err(|source| FetchError::Io {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}
