pub mod aggregate;
pub mod domain;
pub mod normalize;
pub mod ports;

pub use aggregate::{
    checklist_summary, goal_missing, goal_progress, moments_newest_first, savings_summary,
    ChecklistSummary, SavingsSummary,
};
pub use domain::{
    ChecklistCategory, ChecklistItem, ChecklistState, CollaboratorSession, CollectionName, Goal,
    LoadState, Moment, NewGoal, NewMoment, OrganizerView, SessionMode, Trip,
};
pub use ports::{
    AuthService, DocumentStore, Fields, PortError, PortResult, Snapshot, SnapshotStream,
    StoredDocument,
};
