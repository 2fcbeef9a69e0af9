//! crates/casal_core/src/domain.rs
//!
//! Defines the pure, core data structures for the shared organizer.
//! These structs are independent of any document store or wire encoding; the
//! mapping from stored documents lives in `normalize`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Collections
//=========================================================================================

/// The three logical collections held in the shared namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionName {
    Lists,
    Moments,
    Trips,
}

impl CollectionName {
    pub const ALL: [CollectionName; 3] = [Self::Lists, Self::Moments, Self::Trips];

    /// The collection segment appended to the namespace path prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lists => "casal_lists",
            Self::Moments => "casal_moments",
            Self::Trips => "casal_trips",
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Checklists
//=========================================================================================

/// The fixed set of shared checklists. Each one is stored as a single document
/// whose id is the category name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistCategory {
    Movies,
    Series,
    Cultural,
    Restaurants,
    Music,
}

impl ChecklistCategory {
    pub const ALL: [ChecklistCategory; 5] = [
        Self::Movies,
        Self::Series,
        Self::Cultural,
        Self::Restaurants,
        Self::Music,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movies => "movies",
            Self::Series => "series",
            Self::Cultural => "cultural",
            Self::Restaurants => "restaurants",
            Self::Music => "music",
        }
    }
}

impl fmt::Display for ChecklistCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown checklist category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for ChecklistCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// A single entry of a shared checklist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecklistItem {
    pub id: String,
    pub name: String,
    pub completed: bool,
}

/// Category name to item list. A category absent from the map reads as empty.
pub type ChecklistState = BTreeMap<ChecklistCategory, Vec<ChecklistItem>>;

//=========================================================================================
// Moments
//=========================================================================================

/// A dated entry of the photo gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Moment {
    pub id: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    pub phrase: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// What a collaborator supplies to register a moment. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMoment {
    pub title: String,
    pub date: NaiveDate,
    pub photo_url: String,
    pub phrase: String,
}

//=========================================================================================
// Trips and savings goals
//=========================================================================================

/// A named savings sub-target of a trip. `0 <= current <= target` holds for
/// every goal this crate hands out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub target: f64,
    pub current: f64,
}

impl Goal {
    /// Clamps `amount` into `[0, target]`. NaN collapses to zero.
    pub fn clamp_amount(&self, amount: f64) -> f64 {
        amount.max(0.0).min(self.target)
    }

    /// Returns the goal with `current` set to the clamped `amount`.
    pub fn with_current(&self, amount: f64) -> Goal {
        Goal {
            current: self.clamp_amount(amount),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGoal {
    pub name: String,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trip {
    pub id: String,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub goals: Vec<Goal>,
}

//=========================================================================================
// Session and live view
//=========================================================================================

/// Whether writes go to the shared remote store or stay in process memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Remote,
    LocalFallback,
}

/// The resolved collaborator identity. Built once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollaboratorSession {
    pub identifier: Option<String>,
    pub ready: bool,
    pub mode: SessionMode,
}

impl CollaboratorSession {
    /// The session used when no backing store is configured.
    pub fn local_fallback() -> Self {
        Self {
            identifier: None,
            ready: true,
            mode: SessionMode::LocalFallback,
        }
    }

    pub fn remote(identifier: String) -> Self {
        Self {
            identifier: Some(identifier),
            ready: true,
            mode: SessionMode::Remote,
        }
    }
}

/// Load progress across the three subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadState {
    /// Collections that delivered at least one snapshot.
    pub loaded: BTreeSet<CollectionName>,
    /// Collection-scoped subscription errors.
    pub errors: BTreeMap<CollectionName, String>,
    /// Set when the session could not be established at all.
    pub fatal_error: Option<String>,
}

impl LoadState {
    /// True until every collection has delivered a snapshot, unless an error
    /// already stopped the load.
    pub fn is_loading(&self) -> bool {
        self.fatal_error.is_none()
            && self.errors.is_empty()
            && self.loaded.len() < CollectionName::ALL.len()
    }

    pub fn is_ready(&self) -> bool {
        self.loaded.len() == CollectionName::ALL.len()
    }
}

/// Everything the UI renders, rebuilt from snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrganizerView {
    pub lists: ChecklistState,
    pub moments: Vec<Moment>,
    pub trips: Vec<Trip>,
    pub load: LoadState,
}

impl OrganizerView {
    pub fn items(&self, category: ChecklistCategory) -> &[ChecklistItem] {
        self.lists.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.iter().find(|trip| trip.id == trip_id)
    }
}
