//! Error types for the portal downloader
//!
//! Each pipeline stage has its own error enum so callers can decide which
//! failures are fatal (authentication, catalog fetches) and which are only
//! reported (downloads, conversions, merges, cleanup).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Login failed; always fatal
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    /// Catalog or resource listing failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A single resource could not be downloaded
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// A single file could not be converted to PDF
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Merging a unit failed
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Removing leftovers failed
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Menu answer or selection flag that does not parse
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// General error
    #[error("{0}")]
    General(String),
}

/// Reasons the portal refused or could not complete a login
#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("login failed: invalid SRN or password")]
    InvalidCredentials,

    #[error("login failed: account is locked or disabled by the portal")]
    Locked,

    #[error("login failed: portal unreachable ({0})")]
    Unreachable(#[source] reqwest::Error),

    #[error("login failed: no CSRF token on the login page")]
    MissingCsrfToken,

    #[error("login failed: {0}")]
    Rejected(String),
}

/// Errors while listing courses, units, classes or resources
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("session expired and re-authentication did not help ({url})")]
    SessionExpired { url: String },

    #[error("re-authentication failed: {0}")]
    Reauthentication(#[from] AuthenticationError),
}

/// Per-resource download failure
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("{name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: FetchError,
    },

    #[error("{name}: downloaded file is empty")]
    Empty { name: String },

    #[error("{name}: downloaded bytes are not a recognised document")]
    Unrecognised { name: String },

    #[error("{name}: downloaded PDF is damaged ({reason})")]
    Damaged { name: String, reason: String },

    #[error("{name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// The portal refused to log in again while fetching
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            DownloadError::Fetch {
                source: FetchError::Reauthentication(_),
                ..
            }
        )
    }
}

/// Per-file conversion failure
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("no converter backend is available for {}", .0.display())]
    NoBackend(PathBuf),

    #[error("{backend} failed on {}: {reason}", .path.display())]
    Backend {
        backend: String,
        path: PathBuf,
        reason: String,
    },

    #[error("{backend} timed out after {seconds}s on {}", .path.display())]
    Timeout {
        backend: String,
        path: PathBuf,
        seconds: u64,
    },

    #[error("all converters failed on {}: {}", .path.display(), .attempts.join("; "))]
    Exhausted { path: PathBuf, attempts: Vec<String> },

    #[error("could not repair {}: {reason}", .path.display())]
    Repair { path: PathBuf, reason: String },

    #[error("IO error converting {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Merge failures
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no input files provided")]
    NoInputs,

    #[error("none of the {0} input PDFs could be read")]
    NothingToMerge(usize),

    #[error("could not read {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A leftover that could not be removed
#[derive(Error, Debug)]
#[error("could not remove {}: {source}", .path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Whether one error in a source chain is a login failure
///
/// `Error::Authentication` forwards its source, so the wrapped
/// [`AuthenticationError`] does not show up as a link of its own.
pub fn is_authentication(err: &(dyn std::error::Error + 'static)) -> bool {
    err.is::<AuthenticationError>()
        || matches!(err.downcast_ref::<Error>(), Some(Error::Authentication(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_found_in_chain() {
        let halted = anyhow::Error::new(Error::from(AuthenticationError::InvalidCredentials))
            .context("processing units");
        assert!(halted.chain().any(is_authentication));

        let relogin = anyhow::Error::new(FetchError::from(AuthenticationError::Locked))
            .context("listing courses");
        assert!(relogin.chain().any(is_authentication));

        let other = anyhow::Error::new(Error::Config("no base URL".to_string()));
        assert!(!other.chain().any(is_authentication));
    }

    #[test]
    fn test_download_error_authentication() {
        let refused = DownloadError::Fetch {
            name: "001-Lab-Slides".to_string(),
            source: FetchError::Reauthentication(AuthenticationError::InvalidCredentials),
        };
        assert!(refused.is_authentication());

        let missing = DownloadError::Fetch {
            name: "001-Lab-Slides".to_string(),
            source: FetchError::Status {
                url: "https://portal.test/x".to_string(),
                status: 404,
            },
        };
        assert!(!missing.is_authentication());
    }
}
