//! Crawl phase definitions for tracking a job's progress
//!
//! This module defines every phase a crawl job moves through and which
//! transitions between them are legal.

use std::fmt;
use thiserror::Error;

/// Represents the current phase of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    // ===== Active Phases =====
    /// Fetching the property's registry record
    FetchingProperty,

    /// Fetching the ordered list of buildings
    FetchingBuildingList,

    /// First pass over the building queue
    FetchingUnits,

    /// Re-fetching buildings that failed
    Retrying,

    // ===== Terminal Phases =====
    /// All phases ran; residual building failures may remain
    Done,

    /// Property or building-list phase failed
    Failed,

    /// Cancellation was observed before the job finished
    Cancelled,
}

/// Raised when a job attempts a transition the state machine forbids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid state transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: CrawlPhase,
    pub to: CrawlPhase,
}

impl CrawlPhase {
    /// Returns true if this is a terminal phase (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Returns true if this is an active phase
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the transition `self -> to` is allowed
    ///
    /// | From | Allowed targets |
    /// |------|-----------------|
    /// | FetchingProperty | FetchingBuildingList, Failed |
    /// | FetchingBuildingList | FetchingUnits, Done, Failed |
    /// | FetchingUnits | Retrying, Done |
    /// | Retrying | Retrying, Done |
    ///
    /// Every active phase may also move to Cancelled.
    pub fn can_transition_to(&self, to: CrawlPhase) -> bool {
        if self.is_active() && to == Self::Cancelled {
            return true;
        }

        matches!(
            (self, to),
            (Self::FetchingProperty, Self::FetchingBuildingList)
                | (Self::FetchingProperty, Self::Failed)
                | (Self::FetchingBuildingList, Self::FetchingUnits)
                | (Self::FetchingBuildingList, Self::Done)
                | (Self::FetchingBuildingList, Self::Failed)
                | (Self::FetchingUnits, Self::Retrying)
                | (Self::FetchingUnits, Self::Done)
                | (Self::Retrying, Self::Retrying)
                | (Self::Retrying, Self::Done)
        )
    }

    /// Converts the phase to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::FetchingProperty => "fetching_property",
            Self::FetchingBuildingList => "fetching_building_list",
            Self::FetchingUnits => "fetching_units",
            Self::Retrying => "retrying",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a phase from a database string representation
    ///
    /// Returns None if the string doesn't match any known phase.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "fetching_property" => Some(Self::FetchingProperty),
            "fetching_building_list" => Some(Self::FetchingBuildingList),
            "fetching_units" => Some(Self::FetchingUnits),
            "retrying" => Some(Self::Retrying),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns all possible phases
    pub fn all_phases() -> Vec<Self> {
        vec![
            Self::FetchingProperty,
            Self::FetchingBuildingList,
            Self::FetchingUnits,
            Self::Retrying,
            Self::Done,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
