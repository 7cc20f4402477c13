//! Presale-Crawler: license lookup and hierarchy crawler for a presale registry
//!
//! This crate resolves a presale license number into the registry's internal
//! property id through a CAPTCHA-gated verification session, then crawls the
//! property's buildings and units into a local SQLite database.

pub mod config;
pub mod crawler;
pub mod output;
pub mod runtime;
pub mod session;
pub mod state;
pub mod storage;

use std::fmt;
use thiserror::Error;

/// Main error type for Presale-Crawler operations
#[derive(Debug, Error)]
pub enum PresaleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Unknown crawl job: {0}")]
    UnknownJob(u64),

    #[error("Crawl job {0} did not finish: {1}")]
    JobAborted(u64, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// The remote entity a fetch was aimed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    Captcha,
    Verification,
    Property { property_id: String },
    BuildingList { property_id: String },
    Units {
        property_id: String,
        building_id: String,
    },
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Captcha => write!(f, "captcha image"),
            Self::Verification => write!(f, "license verification"),
            Self::Property { property_id } => write!(f, "property {}", property_id),
            Self::BuildingList { property_id } => {
                write!(f, "building list of property {}", property_id)
            }
            Self::Units {
                property_id,
                building_id,
            } => write!(
                f,
                "units of building {} (property {})",
                building_id, property_id
            ),
        }
    }
}

/// Coarse classification of a [`FetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Session,
    Parse,
    PhaseFatal,
    BuildingFetch,
    Network,
    Storage,
    Cancelled,
}

/// Errors raised by the verification session, the phase fetchers and the
/// crawl orchestrator
#[derive(Debug, Error)]
pub enum FetchError {
    /// The registry rejected the token or the CAPTCHA answer
    #[error("Verification rejected (status {status:?}): {message}")]
    Session {
        status: Option<String>,
        message: String,
    },

    /// An expected markup element or field was absent
    #[error("Failed to parse {target}: {message}")]
    Parse { target: FetchTarget, message: String },

    #[error("Network error fetching {target}: {source}")]
    Network {
        target: FetchTarget,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} fetching {target}")]
    Status { target: FetchTarget, status: u16 },

    /// Property or building-list phase failed; the whole job is aborted
    #[error("{phase:?} failed for property {property_id}: {source}")]
    PhaseFatal {
        phase: CrawlPhase,
        property_id: String,
        #[source]
        source: Box<FetchError>,
    },

    /// A single building's unit fetch failed; eligible for retry
    #[error("Unit fetch failed for building {building_id}: {source}")]
    BuildingFetch {
        building_id: String,
        #[source]
        source: Box<FetchError>,
    },

    #[error("Storage sink error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error(transparent)]
    Transition(#[from] state::TransitionError),

    #[error("Crawl requires a resolved property id")]
    UnresolvedProperty,

    #[error("Crawl cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Session { .. } | Self::UnresolvedProperty => FetchErrorKind::Session,
            Self::Parse { .. } => FetchErrorKind::Parse,
            Self::Network { .. } | Self::Status { .. } => FetchErrorKind::Network,
            Self::PhaseFatal { .. } | Self::Transition(_) => FetchErrorKind::PhaseFatal,
            Self::BuildingFetch { .. } => FetchErrorKind::BuildingFetch,
            Self::Storage(_) => FetchErrorKind::Storage,
            Self::Cancelled => FetchErrorKind::Cancelled,
        }
    }

    /// Builds a parse error for the given target
    pub fn parse(target: FetchTarget, message: impl Into<String>) -> Self {
        Self::Parse {
            target,
            message: message.into(),
        }
    }
}

/// Result type alias for Presale-Crawler operations
pub type Result<T> = std::result::Result<T, PresaleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for fetch and crawl operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOrchestrator, CrawlReport, JobTracker};
pub use runtime::Runtime;
pub use session::{CaptchaSession, VerificationRequest, VerificationResult};
pub use state::{CrawlJob, CrawlPhase};
