/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The retrieval boundary: turning a location string into the raw bytes of a document.
//!
//! [`DocumentProvider`](super::document::DocumentProvider) depends only on the narrow [`Fetch`]
//! contract. [`LocationFetcher`] implements it by inspecting the location's prefix: locations starting
//! with `http` go to [`HttpFetcher`], everything else to [`FileFetcher`].
//!
//! Neither fetcher retries. A remote document is fetched with a single GET and its whole body is
//! buffered before it is returned. The only deadline on a fetch is the one configured on the HTTP
//! client itself.

use std::{
    fmt::{self, Display, Formatter},
    fs,
    io::Read,
    path::Path,
    time::Duration,
};

use reqwest::blocking::Client;

/// Retrieve the raw bytes at a location.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, RetrievalError>;
}

/// Check whether `location` should be fetched over HTTP rather than read from the filesystem.
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http")
}

/// Reads documents from the local filesystem.
#[derive(Clone)]
pub struct FileFetcher {
    max_size: u64,
}

impl FileFetcher {
    /// Create a `FileFetcher` that rejects files longer than `max_size` bytes.
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }
}

impl Fetch for FileFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, RetrievalError> {
        let path = Path::new(location);
        if !path.exists() {
            return Err(RetrievalError::NotFound {
                path: location.to_string(),
            });
        }

        let size = fs::metadata(path)
            .map_err(|source| RetrievalError::Io {
                location: location.to_string(),
                source,
            })?
            .len();
        if size > self.max_size {
            return Err(RetrievalError::DocumentTooLarge {
                location: location.to_string(),
                size,
                limit: self.max_size,
            });
        }

        fs::read(path).map_err(|source| RetrievalError::Io {
            location: location.to_string(),
            source,
        })
    }
}

/// Fetches documents with an HTTP GET.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_size: u64,
}

impl HttpFetcher {
    /// Create an `HttpFetcher` that rejects bodies longer than `max_size` bytes and gives up on a
    /// request after `timeout`, if one is given.
    pub fn new(max_size: u64, timeout: Option<Duration>) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RetrievalError::ClientBuild)?;
        Ok(Self { client, max_size })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, RetrievalError> {
        let http_error = |source| RetrievalError::Http {
            location: location.to_string(),
            source,
        };

        let response = self.client.get(location).send().map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::UnexpectedStatus {
                location: location.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_size {
                return Err(RetrievalError::DocumentTooLarge {
                    location: location.to_string(),
                    size: declared,
                    limit: self.max_size,
                });
            }
        }

        // The declared length may be missing or wrong, so bound the read itself too.
        let mut body = Vec::new();
        response
            .take(self.max_size.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|source| RetrievalError::Io {
                location: location.to_string(),
                source,
            })?;
        if body.len() as u64 > self.max_size {
            return Err(RetrievalError::DocumentTooLarge {
                location: location.to_string(),
                size: body.len() as u64,
                limit: self.max_size,
            });
        }

        Ok(body)
    }
}

/// Dispatches a fetch to [`HttpFetcher`] or [`FileFetcher`] depending on the location's prefix.
#[derive(Clone)]
pub struct LocationFetcher {
    file: FileFetcher,
    http: HttpFetcher,
}

impl LocationFetcher {
    pub fn new(max_size: u64, http_timeout: Option<Duration>) -> Result<Self, RetrievalError> {
        Ok(Self {
            file: FileFetcher::new(max_size),
            http: HttpFetcher::new(max_size, http_timeout)?,
        })
    }
}

impl Fetch for LocationFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, RetrievalError> {
        if is_remote(location) {
            self.http.fetch(location)
        } else {
            self.file.fetch(location)
        }
    }
}

/// Ways that a [`Fetch`] can fail.
#[derive(Debug)]
pub enum RetrievalError {
    /// The local path does not exist.
    NotFound { path: String },

    /// Reading a local file or an HTTP response body failed.
    Io {
        location: String,
        source: std::io::Error,
    },

    /// The HTTP request could not be completed.
    Http {
        location: String,
        source: reqwest::Error,
    },

    /// The HTTP server answered with a non-success status code.
    UnexpectedStatus { location: String, status: u16 },

    /// The document is longer than the configured maximum.
    DocumentTooLarge {
        location: String,
        size: u64,
        limit: u64,
    },

    /// The HTTP client could not be constructed.
    ClientBuild(reqwest::Error),
}

impl Display for RetrievalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalError::NotFound { path } => write!(f, "could not find file {}", path),
            RetrievalError::Io { location, source } => {
                write!(f, "could not read {}: {}", location, source)
            }
            RetrievalError::Http { location, source } => {
                write!(f, "failed http get of {}: {}", location, source)
            }
            RetrievalError::UnexpectedStatus { location, status } => {
                write!(f, "http get of {} answered with status {}", location, status)
            }
            RetrievalError::DocumentTooLarge {
                location,
                size,
                limit,
            } => write!(
                f,
                "document at {} is too big ({} bytes, limit is {})",
                location, size, limit
            ),
            RetrievalError::ClientBuild(source) => {
                write!(f, "could not build http client: {}", source)
            }
        }
    }
}

impl std::error::Error for RetrievalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetrievalError::Io { source, .. } => Some(source),
            RetrievalError::Http { source, .. } => Some(source),
            RetrievalError::ClientBuild(source) => Some(source),
            RetrievalError::NotFound { .. }
            | RetrievalError::UnexpectedStatus { .. }
            | RetrievalError::DocumentTooLarge { .. } => None,
        }
    }
}
