/*!
 * Error types for the pdfbabel pipeline.
 *
 * Fatal conditions of a run are `PipelineError`s. Per-span translation
 * failures (`TranslationError`) and layout overflows are recoverable and never
 * abort a page.
 */

use thiserror::Error;

/// Errors that can occur when working with translation backends
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether retrying the same request can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::AuthenticationError(_) => false,
            _ => true,
        }
    }
}

/// Errors that can occur while translating a single span
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The upstream call did not answer in time
    #[error("Translation request timed out after {0} ms")]
    Timeout(u64),

    /// Every attempt failed
    #[error("Translation failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Message of the last failure
        last_error: String,
    },

    /// A concurrent request for the same key failed
    #[error("Shared in-flight request failed: {0}")]
    Shared(String),
}

/// Errors raised by layout classifiers
#[derive(Error, Debug)]
pub enum LayoutError {
    /// The model backend cannot be reached or loaded
    #[error("Layout backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with something unusable
    #[error("Invalid layout response: {0}")]
    InvalidResponse(String),

    /// The page could not be rasterized or encoded
    #[error("Failed to prepare page image: {0}")]
    Image(String),
}

/// Fatal errors of a document run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad page range, missing credential, invalid pattern...
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Layout model, font or intermediate document not found or invalid
    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    /// Classifier unreachable or failing on a page
    #[error("Layout analysis failed on page {page}: {source}")]
    Layout {
        /// 1-based page number
        page: usize,
        /// Underlying classifier error
        #[source]
        source: LayoutError,
    },

    /// Unrecoverable read or write failure
    #[error("I/O failure: {0}")]
    Io(String),

    /// The run was stopped between stage boundaries
    #[error("Translation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<lopdf::Error> for PipelineError {
    fn from(error: lopdf::Error) -> Self {
        Self::Io(format!("PDF write error: {}", error))
    }
}

impl PipelineError {
    /// Short machine-friendly category name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::AssetUnavailable(_) => "asset_unavailable",
            Self::Layout { .. } => "layout",
            Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
        }
    }
}
