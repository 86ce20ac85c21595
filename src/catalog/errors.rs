//! Error types for the catalog client.

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("catalog returned HTTP {status} for {url}")]
    Upstream { status: u16, url: String },
    #[error("failed to parse catalog response from {url}")]
    Parse {
        status: u16,
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("fetch session was superseded")]
    Cancelled,
}

impl CatalogError {
    pub fn network(url: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Network {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Whether a caller's retry policy may reissue the request.
    ///
    /// Transport failures, throttling and server-side errors are transient;
    /// client errors and malformed bodies will fail the same way again.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } | Self::Cancelled => false,
        }
    }

    /// HTTP status carried by the error, if the catalog answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } | Self::Parse { status, .. } => Some(*status),
            Self::Network { .. } | Self::Cancelled => None,
        }
    }
}
