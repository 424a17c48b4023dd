//! Error types for the DDNS manager
//!
//! Every failure the orchestrator can observe maps to one variant here. The
//! variants mirror the scopes failures are isolated to: a whole IP version
//! (`Detection`), a single domain (`Resolution`), a provider batch (`Init`,
//! `Update`, `RetryExhausted`, `UnknownProvider`) or the whole run
//! (`Aggregate`).

use thiserror::Error;

/// Result type alias for DDNS manager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS manager
#[derive(Error, Debug)]
pub enum Error {
    /// Public address detection failed; the IP version is skipped for this run
    #[error("IP detection error: {0}")]
    Detection(String),

    /// The published address of a domain could not be resolved
    #[error("DNS resolution error ({domain}): {message}")]
    Resolution {
        /// Domain that failed to resolve
        domain: String,
        /// Error message
        message: String,
    },

    /// Updater initialization failed; never retried
    #[error("[{provider}] failed to initialize updater: {message}")]
    Init {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// A record update call failed
    #[error("[{provider}] {addr} - failed to update record: {message}")]
    Update {
        /// Provider name
        provider: String,
        /// Address that was being pushed
        addr: std::net::IpAddr,
        /// Error message
        message: String,
    },

    /// The retry budget ran out; carries the last observed error
    #[error("gave up after {attempts} retry attempt(s): {source}")]
    RetryExhausted {
        /// Number of retry attempts made
        attempts: usize,
        /// Last observed error
        #[source]
        source: Box<Error>,
    },

    /// The run context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// A configured provider has no registered updater
    #[error("no updater registered for provider: {0}")]
    UnknownProvider(String),

    /// Notification delivery failed
    #[error("notification error: {0}")]
    Notify(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Address store errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// HTTP client errors (from detectors, notifiers and provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Several errors collected during one run, displayed one per line
    #[error("{}", join_lines(.0))]
    Aggregate(Vec<Error>),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

fn join_lines(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Create a detection error
    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection(msg.into())
    }

    /// Create a resolution error for a domain
    pub fn resolution(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            domain: domain.into(),
            message: message.into(),
        }
    }

    /// Create an updater initialization error
    pub fn init(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::Init {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Create a record update error
    pub fn update(
        provider: impl Into<String>,
        addr: std::net::IpAddr,
        message: impl ToString,
    ) -> Self {
        Self::Update {
            provider: provider.into(),
            addr,
            message: message.to_string(),
        }
    }

    /// Wrap the last error of an exhausted retry loop
    pub fn retry_exhausted(attempts: usize, last: Error) -> Self {
        Self::RetryExhausted {
            attempts,
            source: Box::new(last),
        }
    }

    /// Create a notification error
    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Collapse a list of errors: `None` when empty, otherwise an `Aggregate`
    pub fn aggregate(errors: Vec<Error>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self::Aggregate(errors))
        }
    }

    /// True if this error, or the error it wraps, stems from cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::RetryExhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
