//! crates/casal_core/src/normalize.rs
//!
//! The versioned normalization step applied to every stored document on read,
//! and the matching encoders used on write.
//!
//! Schema history:
//! - v0: checklist items had no `completed` field; moments had no `phrase`.
//! - v1: `completed` defaults to `false`, `phrase` and `photoURL` default to
//!   empty, and trip goals are re-clamped into `[0, target]` on read.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::{
    ChecklistCategory, ChecklistItem, ChecklistState, Goal, Moment, NewMoment, Trip,
};
use crate::ports::{Fields, Snapshot, StoredDocument};

pub const SCHEMA_VERSION: u32 = 1;

/// Stamped on every written document so later readers can tell the layout apart.
const SCHEMA_VERSION_FIELD: &str = "schemaVersion";

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },
}

//=========================================================================================
// "Impure" Stored Record Structs
//=========================================================================================

#[derive(Deserialize, Default)]
struct ChecklistRecord {
    #[serde(default)]
    items: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct ItemRecord {
    id: String,
    name: String,
    #[serde(default)]
    completed: Option<bool>,
}
impl ItemRecord {
    fn to_domain(self) -> ChecklistItem {
        ChecklistItem {
            id: self.id,
            name: self.name,
            completed: self.completed.unwrap_or(false),
        }
    }
}

#[derive(Deserialize)]
struct MomentRecord {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default, rename = "photoURL")]
    photo_url: Option<String>,
    #[serde(default)]
    phrase: Option<String>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<String>,
}
impl MomentRecord {
    fn to_domain(self, id: String) -> Moment {
        Moment {
            id,
            title: self.title.unwrap_or_default(),
            date: self.date.as_deref().and_then(parse_date),
            photo_url: self.photo_url.unwrap_or_default(),
            phrase: self.phrase.unwrap_or_default(),
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
        }
    }
}

#[derive(Deserialize)]
struct GoalRecord {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    target: Option<f64>,
    #[serde(default)]
    current: Option<f64>,
}
impl GoalRecord {
    fn to_domain(self) -> Goal {
        let target = self.target.unwrap_or(0.0).max(0.0);
        let goal = Goal {
            id: self.id,
            name: self.name.unwrap_or_default(),
            target,
            current: 0.0,
        };
        goal.with_current(self.current.unwrap_or(0.0))
    }
}

#[derive(Deserialize)]
struct TripRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    goals: Option<Vec<Value>>,
}
impl TripRecord {
    fn to_domain(self, id: String) -> Trip {
        Trip {
            id,
            name: self.name.unwrap_or_default(),
            date: self.date.as_deref().and_then(parse_date),
            goals: lenient_list(self.goals, GoalRecord::to_domain),
        }
    }
}

//=========================================================================================
// Read Path
//=========================================================================================

/// Items of one checklist document. Entries without a string `id` and `name`
/// are dropped rather than failing the whole list.
pub fn checklist_items(fields: &Fields) -> Vec<ChecklistItem> {
    let record: ChecklistRecord = serde_json::from_value(Value::Object(fields.clone()))
        .unwrap_or_default();
    lenient_list(record.items, ItemRecord::to_domain)
}

/// Rebuilds the category map from a checklist snapshot.
///
/// Returns the categories present in the snapshot plus the ones that are
/// missing. Missing categories are not inserted; the caller decides how to
/// materialize them. Documents whose id is not a known category are ignored.
pub fn checklist_from_snapshot(snapshot: &Snapshot) -> (ChecklistState, Vec<ChecklistCategory>) {
    let mut state = ChecklistState::new();
    let mut missing = Vec::new();
    for category in ChecklistCategory::ALL {
        match snapshot.document(category.as_str()) {
            Some(doc) => {
                state.insert(category, checklist_items(&doc.fields));
            }
            None => missing.push(category),
        }
    }
    (state, missing)
}

pub fn moment_from_document(doc: &StoredDocument) -> Result<Moment, NormalizeError> {
    let record: MomentRecord = decode(doc)?;
    Ok(record.to_domain(doc.id.clone()))
}

pub fn trip_from_document(doc: &StoredDocument) -> Result<Trip, NormalizeError> {
    let record: TripRecord = decode(doc)?;
    Ok(record.to_domain(doc.id.clone()))
}

fn decode<T: for<'de> Deserialize<'de>>(doc: &StoredDocument) -> Result<T, NormalizeError> {
    serde_json::from_value(Value::Object(doc.fields.clone())).map_err(|e| {
        NormalizeError::Malformed {
            id: doc.id.clone(),
            reason: e.to_string(),
        }
    })
}

fn lenient_list<R, T>(values: Option<Vec<Value>>, to_domain: fn(R) -> T) -> Vec<T>
where
    R: for<'de> Deserialize<'de>,
{
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| serde_json::from_value::<R>(value).ok())
        .map(to_domain)
        .collect()
}

/// Accepts `YYYY-MM-DD`, and full timestamps by their date prefix.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

//=========================================================================================
// Write Path
//=========================================================================================

fn fields<const N: usize>(entries: [(&str, Value); N]) -> Fields {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn versioned<const N: usize>(entries: [(&str, Value); N]) -> Fields {
    let mut doc = fields(entries);
    doc.insert(SCHEMA_VERSION_FIELD.to_string(), Value::from(SCHEMA_VERSION));
    doc
}

/// The whole-list document written for a checklist category.
pub fn checklist_fields(items: &[ChecklistItem]) -> Fields {
    let items = items
        .iter()
        .map(|item| {
            Value::Object(fields([
                ("id", Value::from(item.id.as_str())),
                ("name", Value::from(item.name.as_str())),
                ("completed", Value::from(item.completed)),
            ]))
        })
        .collect();
    versioned([("items", Value::Array(items))])
}

pub fn moment_fields(moment: &NewMoment, created_at: DateTime<Utc>) -> Fields {
    versioned([
        ("title", Value::from(moment.title.as_str())),
        ("date", Value::from(moment.date.to_string())),
        ("photoURL", Value::from(moment.photo_url.as_str())),
        ("phrase", Value::from(moment.phrase.as_str())),
        (
            "createdAt",
            Value::from(created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ),
    ])
}

pub fn trip_fields(name: &str, date: Option<NaiveDate>) -> Fields {
    let mut doc = versioned([
        ("name", Value::from(name)),
        ("goals", Value::Array(Vec::new())),
    ]);
    if let Some(date) = date {
        doc.insert("date".to_string(), Value::from(date.to_string()));
    }
    doc
}

/// The partial document merged into a trip when its goals change.
pub fn goals_fields(goals: &[Goal]) -> Fields {
    let goals = goals
        .iter()
        .map(|goal| {
            Value::Object(fields([
                ("id", Value::from(goal.id.as_str())),
                ("name", Value::from(goal.name.as_str())),
                ("target", Value::from(goal.target)),
                ("current", Value::from(goal.current)),
            ]))
        })
        .collect();
    versioned([("goals", Value::Array(goals))])
}
