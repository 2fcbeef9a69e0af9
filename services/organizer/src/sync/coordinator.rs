//! services/organizer/src/sync/coordinator.rs
//!
//! The Mutation Coordinator: the single entry point for user-initiated changes.
//!
//! Checklists are written as whole item lists and trip goals as whole goal
//! arrays. Each one is read from the store, modified in memory and written
//! back while this coordinator's write lock is held, so writes from one
//! process never undo each other. Writers in other processes still race at
//! document granularity; the last write wins.

use casal_core::aggregate::goal_missing;
use casal_core::domain::{
    ChecklistCategory, ChecklistItem, CollectionName, Goal, Moment, NewGoal, NewMoment,
    OrganizerView, SessionMode, Trip,
};
use casal_core::normalize::{
    checklist_fields, checklist_items, goals_fields, moment_fields, trip_fields,
    trip_from_document,
};
use casal_core::ports::{DocumentStore, Fields, PortResult, StoredDocument};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::SharedView;

/// What happened to a mutation. Callers may ignore it; failures are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The write was accepted by the store.
    Applied,
    /// Nothing was written: invalid input, unknown id, or no store handle.
    Rejected,
    /// The store returned an error.
    Failed,
}

/// Millisecond-timestamp ids, strictly increasing within the process.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let previous = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            }) {
            Ok(last) | Err(last) => last,
        };
        now.max(previous + 1).to_string()
    }
}

pub struct MutationCoordinator {
    store: Option<Arc<dyn DocumentStore>>,
    mode: SessionMode,
    view: SharedView,
    ids: IdGenerator,
    /// Held across every read-modify-write.
    write_lock: Mutex<()>,
}

impl MutationCoordinator {
    /// `store` is `None` while no store handle exists; every mutation is
    /// then rejected.
    pub fn new(store: Option<Arc<dyn DocumentStore>>, mode: SessionMode, view: SharedView) -> Self {
        Self {
            store,
            mode,
            view,
            ids: IdGenerator::default(),
            write_lock: Mutex::new(()),
        }
    }

    fn writable_store(&self, action: &str) -> Option<Arc<dyn DocumentStore>> {
        match (&self.store, self.mode) {
            (None, _) => {
                error!("Cannot {}: the document store is not ready", action);
                None
            }
            (Some(store), SessionMode::LocalFallback) => {
                warn!("Local mode is active: '{}' stays in memory and is not shared", action);
                Some(store.clone())
            }
            (Some(store), SessionMode::Remote) => Some(store.clone()),
        }
    }

    fn reject(&self, action: &str, reason: &str) -> MutationOutcome {
        warn!("Rejected '{}': {}", action, reason);
        MutationOutcome::Rejected
    }

    /// The stored fields of a document. `Err` carries the outcome to return.
    async fn read_current(
        &self,
        store: &dyn DocumentStore,
        collection: CollectionName,
        id: &str,
        action: &str,
    ) -> Result<Option<Fields>, MutationOutcome> {
        store.get_document(collection, id).await.map_err(|e| {
            error!("Failed to {}: could not read {}/{}: {}", action, collection, id, e);
            MutationOutcome::Failed
        })
    }

    /// Logs a failed write. On success, applies `mirror` to the view right
    /// away; the next snapshot then confirms it.
    fn finish<T>(
        &self,
        action: &str,
        result: PortResult<T>,
        mirror: impl FnOnce(&mut OrganizerView, T),
    ) -> MutationOutcome {
        match result {
            Ok(value) => {
                debug!("'{}' written", action);
                self.view.send_modify(|view| mirror(view, value));
                MutationOutcome::Applied
            }
            Err(e) => {
                error!("Failed to {}: {}", action, e);
                MutationOutcome::Failed
            }
        }
    }

    //=====================================================================================
    // Checklists
    //=====================================================================================

    pub async fn add_item(&self, category: ChecklistCategory, name: &str) -> MutationOutcome {
        let name = name.trim();
        if name.is_empty() {
            return self.reject("add item", "name is empty");
        }
        let item = ChecklistItem {
            id: self.ids.next_id(),
            name: name.to_string(),
            completed: false,
        };
        self.update_list(category, "add item", |items| {
            items.push(item);
            true
        })
        .await
    }

    pub async fn remove_item(&self, category: ChecklistCategory, item_id: &str) -> MutationOutcome {
        self.update_list(category, "remove item", |items| {
            let before = items.len();
            items.retain(|item| item.id != item_id);
            items.len() != before
        })
        .await
    }

    pub async fn toggle_item(&self, category: ChecklistCategory, item_id: &str) -> MutationOutcome {
        self.update_list(category, "toggle item", |items| {
            match items.iter_mut().find(|item| item.id == item_id) {
                Some(item) => {
                    item.completed = !item.completed;
                    true
                }
                None => false,
            }
        })
        .await
    }

    pub async fn rename_item(
        &self,
        category: ChecklistCategory,
        item_id: &str,
        name: &str,
    ) -> MutationOutcome {
        let name = name.trim();
        if name.is_empty() {
            return self.reject("rename item", "name is empty");
        }
        self.update_list(category, "rename item", |items| {
            match items.iter_mut().find(|item| item.id == item_id) {
                Some(item) => {
                    item.name = name.to_string();
                    true
                }
                None => false,
            }
        })
        .await
    }

    /// Read-modify-write of a whole category list. `edit` returns false when
    /// it found nothing to change.
    async fn update_list(
        &self,
        category: ChecklistCategory,
        action: &str,
        edit: impl FnOnce(&mut Vec<ChecklistItem>) -> bool,
    ) -> MutationOutcome {
        let Some(store) = self.writable_store(action) else {
            return MutationOutcome::Rejected;
        };
        let _guard = self.write_lock.lock().await;
        let mut items = match self
            .read_current(store.as_ref(), CollectionName::Lists, category.as_str(), action)
            .await
        {
            Ok(fields) => fields.as_ref().map(checklist_items).unwrap_or_default(),
            Err(outcome) => return outcome,
        };
        if !edit(&mut items) {
            return self.reject(action, "no such item");
        }
        let result = store
            .replace_document(
                CollectionName::Lists,
                category.as_str(),
                checklist_fields(&items),
            )
            .await;
        self.finish(action, result, move |view, ()| {
            view.lists.insert(category, items);
        })
    }

    //=====================================================================================
    // Moments
    //=====================================================================================

    pub async fn add_moment(&self, moment: NewMoment) -> MutationOutcome {
        let title = moment.title.trim();
        if title.is_empty() {
            return self.reject("add moment", "title is empty");
        }
        let moment = NewMoment {
            title: title.to_string(),
            date: moment.date,
            photo_url: moment.photo_url.trim().to_string(),
            phrase: moment.phrase.trim().to_string(),
        };
        let Some(store) = self.writable_store("add moment") else {
            return MutationOutcome::Rejected;
        };
        let created_at = Utc::now();
        let result = store
            .append_document(CollectionName::Moments, moment_fields(&moment, created_at))
            .await;
        self.finish("add moment", result, move |view, id| {
            if !view.moments.iter().any(|m| m.id == id) {
                view.moments.push(Moment {
                    id,
                    title: moment.title,
                    date: Some(moment.date),
                    photo_url: moment.photo_url,
                    phrase: moment.phrase,
                    created_at: Some(created_at),
                });
            }
        })
    }

    pub async fn remove_moment(&self, moment_id: &str) -> MutationOutcome {
        let Some(store) = self.writable_store("remove moment") else {
            return MutationOutcome::Rejected;
        };
        let _guard = self.write_lock.lock().await;
        match self
            .read_current(store.as_ref(), CollectionName::Moments, moment_id, "remove moment")
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => return self.reject("remove moment", "no such moment"),
            Err(outcome) => return outcome,
        }
        let result = store
            .delete_document(CollectionName::Moments, moment_id)
            .await;
        self.finish("remove moment", result, |view, ()| {
            view.moments.retain(|m| m.id != moment_id);
        })
    }

    //=====================================================================================
    // Trips
    //=====================================================================================

    pub async fn add_trip(&self, name: &str, date: Option<NaiveDate>) -> MutationOutcome {
        let name = name.trim();
        if name.is_empty() {
            return self.reject("add trip", "name is empty");
        }
        let Some(store) = self.writable_store("add trip") else {
            return MutationOutcome::Rejected;
        };
        let result = store
            .append_document(CollectionName::Trips, trip_fields(name, date))
            .await;
        self.finish("add trip", result, |view, id| {
            if view.trip(&id).is_none() {
                view.trips.push(Trip {
                    id,
                    name: name.to_string(),
                    date,
                    goals: Vec::new(),
                });
            }
        })
    }

    pub async fn remove_trip(&self, trip_id: &str) -> MutationOutcome {
        let Some(store) = self.writable_store("remove trip") else {
            return MutationOutcome::Rejected;
        };
        let _guard = self.write_lock.lock().await;
        match self
            .read_current(store.as_ref(), CollectionName::Trips, trip_id, "remove trip")
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => return self.reject("remove trip", "no such trip"),
            Err(outcome) => return outcome,
        }
        let result = store.delete_document(CollectionName::Trips, trip_id).await;
        self.finish("remove trip", result, |view, ()| {
            view.trips.retain(|trip| trip.id != trip_id);
        })
    }

    //=====================================================================================
    // Goals
    //=====================================================================================

    pub async fn add_goal(&self, trip_id: &str, goal: NewGoal) -> MutationOutcome {
        let name = goal.name.trim();
        if name.is_empty() {
            return self.reject("add goal", "name is empty");
        }
        if !goal.target.is_finite() || goal.target < 0.0 {
            return self.reject("add goal", "target must be a non-negative number");
        }
        let goal = Goal {
            id: self.ids.next_id(),
            name: name.to_string(),
            target: goal.target,
            current: 0.0,
        };
        self.update_goals(trip_id, "add goal", |goals| {
            goals.push(goal);
            true
        })
        .await
    }

    pub async fn remove_goal(&self, trip_id: &str, goal_id: &str) -> MutationOutcome {
        self.update_goals(trip_id, "remove goal", |goals| {
            let before = goals.len();
            goals.retain(|goal| goal.id != goal_id);
            goals.len() != before
        })
        .await
    }

    /// Sets the saved amount of a goal, clamped into `[0, target]`.
    pub async fn update_goal(&self, trip_id: &str, goal_id: &str, amount: f64) -> MutationOutcome {
        self.edit_goal(trip_id, goal_id, "update goal", |goal| goal.with_current(amount))
            .await
    }

    /// Adds a positive amount to what a goal has saved so far.
    pub async fn contribute_to_goal(
        &self,
        trip_id: &str,
        goal_id: &str,
        amount: f64,
    ) -> MutationOutcome {
        if !amount.is_finite() || amount <= 0.0 {
            return self.reject("contribute to goal", "amount must be a positive number");
        }
        self.edit_goal(trip_id, goal_id, "contribute to goal", |goal| {
            goal.with_current(goal.current + amount)
        })
        .await
    }

    /// Fills a goal that still misses something, or resets a reached one.
    pub async fn toggle_goal_reached(&self, trip_id: &str, goal_id: &str) -> MutationOutcome {
        self.edit_goal(trip_id, goal_id, "toggle goal", |goal| {
            if goal_missing(goal) > 0.0 {
                goal.with_current(goal.target)
            } else {
                goal.with_current(0.0)
            }
        })
        .await
    }

    async fn edit_goal(
        &self,
        trip_id: &str,
        goal_id: &str,
        action: &str,
        edit: impl FnOnce(&Goal) -> Goal,
    ) -> MutationOutcome {
        self.update_goals(trip_id, action, |goals| {
            match goals.iter_mut().find(|goal| goal.id == goal_id) {
                Some(goal) => {
                    *goal = edit(goal);
                    true
                }
                None => false,
            }
        })
        .await
    }

    /// Read-modify-write of a trip's whole goal array, merged into the trip
    /// document so its other fields stay as they are.
    async fn update_goals(
        &self,
        trip_id: &str,
        action: &str,
        edit: impl FnOnce(&mut Vec<Goal>) -> bool,
    ) -> MutationOutcome {
        let Some(store) = self.writable_store(action) else {
            return MutationOutcome::Rejected;
        };
        let _guard = self.write_lock.lock().await;
        let fields = match self
            .read_current(store.as_ref(), CollectionName::Trips, trip_id, action)
            .await
        {
            Ok(Some(fields)) => fields,
            Ok(None) => return self.reject(action, "no such trip"),
            Err(outcome) => return outcome,
        };
        let stored = StoredDocument {
            id: trip_id.to_string(),
            fields,
        };
        let mut trip = match trip_from_document(&stored) {
            Ok(trip) => trip,
            Err(e) => {
                error!("Failed to {}: {}", action, e);
                return MutationOutcome::Failed;
            }
        };
        if !edit(&mut trip.goals) {
            return self.reject(action, "no such goal");
        }
        let result = store
            .merge_document(CollectionName::Trips, trip_id, goals_fields(&trip.goals))
            .await;
        self.finish(action, result, move |view, ()| {
            match view.trips.iter_mut().find(|known| known.id == trip.id) {
                Some(known) => known.goals = trip.goals,
                None => view.trips.push(trip),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalFallbackStore;
    use async_trait::async_trait;
    use casal_core::aggregate::{checklist_summary, savings_summary};
    use casal_core::ports::{PortError, SnapshotStream};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tokio::sync::watch;

    fn shared_view() -> SharedView {
        let (sender, _) = watch::channel(OrganizerView::default());
        Arc::new(sender)
    }

    fn local() -> (MutationCoordinator, SharedView) {
        let view = shared_view();
        let store: Arc<dyn DocumentStore> = Arc::new(LocalFallbackStore::new());
        let coordinator =
            MutationCoordinator::new(Some(store), SessionMode::LocalFallback, view.clone());
        (coordinator, view)
    }

    fn items(view: &SharedView, category: ChecklistCategory) -> Vec<ChecklistItem> {
        view.borrow().items(category).to_vec()
    }

    async fn trip_with_goal(
        coordinator: &MutationCoordinator,
        view: &SharedView,
        target: f64,
    ) -> (String, String) {
        assert_eq!(coordinator.add_trip("Paris", None).await, MutationOutcome::Applied);
        let trip_id = view.borrow().trips[0].id.clone();
        let goal = NewGoal {
            name: "Flights".to_string(),
            target,
        };
        assert_eq!(coordinator.add_goal(&trip_id, goal).await, MutationOutcome::Applied);
        let goal_id = view.borrow().trips[0].goals[0].id.clone();
        (trip_id, goal_id)
    }

    /// Keeps documents in a map, records every write and fails them all when
    /// asked to. Nothing is ever pushed to subscribers.
    #[derive(Default)]
    struct RecordingStore {
        documents: Mutex<BTreeMap<(CollectionName, String), Fields>>,
        writes: Mutex<Vec<(CollectionName, String, Fields)>>,
        appended: Mutex<u32>,
        fail: bool,
    }

    impl RecordingStore {
        fn seeded(collection: CollectionName, id: &str, fields: Fields) -> Self {
            let store = Self::default();
            store
                .documents
                .lock()
                .unwrap()
                .insert((collection, id.to_string()), fields);
            store
        }

        fn written_items(&self, category: ChecklistCategory) -> Vec<Vec<String>> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|(collection, id, _)| {
                    *collection == CollectionName::Lists && id == category.as_str()
                })
                .map(|(_, _, fields)| {
                    checklist_items(fields)
                        .into_iter()
                        .map(|item| item.name)
                        .collect()
                })
                .collect()
        }

        fn record(&self, collection: CollectionName, id: &str, fields: &Fields) -> PortResult<()> {
            if self.fail {
                return Err(PortError::Unavailable("offline".to_string()));
            }
            self.writes
                .lock()
                .unwrap()
                .push((collection, id.to_string(), fields.clone()));
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        async fn subscribe(&self, _collection: CollectionName) -> PortResult<SnapshotStream> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn get_document(
            &self,
            collection: CollectionName,
            id: &str,
        ) -> PortResult<Option<Fields>> {
            Ok(self
                .documents
                .lock()
                .unwrap()
                .get(&(collection, id.to_string()))
                .cloned())
        }

        async fn replace_document(
            &self,
            collection: CollectionName,
            id: &str,
            fields: Fields,
        ) -> PortResult<()> {
            self.record(collection, id, &fields)?;
            self.documents
                .lock()
                .unwrap()
                .insert((collection, id.to_string()), fields);
            Ok(())
        }

        async fn merge_document(
            &self,
            collection: CollectionName,
            id: &str,
            fields: Fields,
        ) -> PortResult<()> {
            self.record(collection, id, &fields)?;
            self.documents
                .lock()
                .unwrap()
                .entry((collection, id.to_string()))
                .or_default()
                .extend(fields);
            Ok(())
        }

        async fn append_document(
            &self,
            collection: CollectionName,
            fields: Fields,
        ) -> PortResult<String> {
            let id = {
                let mut appended = self.appended.lock().unwrap();
                *appended += 1;
                format!("doc-{}", appended)
            };
            self.replace_document(collection, &id, fields).await?;
            Ok(id)
        }

        async fn delete_document(&self, collection: CollectionName, id: &str) -> PortResult<()> {
            self.documents
                .lock()
                .unwrap()
                .remove(&(collection, id.to_string()));
            Ok(())
        }
    }

    #[test]
    fn ids_strictly_increase() {
        let ids = IdGenerator::default();
        let first: i64 = ids.next_id().parse().unwrap();
        let second: i64 = ids.next_id().parse().unwrap();
        let third: i64 = ids.next_id().parse().unwrap();
        assert!(first < second && second < third);
    }

    #[tokio::test]
    async fn add_toggle_scenario_reaches_full_progress() {
        let (coordinator, view) = local();

        assert_eq!(
            coordinator.add_item(ChecklistCategory::Movies, "Inception").await,
            MutationOutcome::Applied
        );
        let movies = items(&view, ChecklistCategory::Movies);
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].name, "Inception");
        assert!(!movies[0].completed);

        coordinator
            .toggle_item(ChecklistCategory::Movies, &movies[0].id)
            .await;
        let movies = items(&view, ChecklistCategory::Movies);
        assert!(movies[0].completed);
        assert_eq!(checklist_summary(&movies).progress_percent, 100);
    }

    #[tokio::test]
    async fn add_and_remove_change_length_by_one() {
        let (coordinator, view) = local();
        coordinator.add_item(ChecklistCategory::Music, "Song A").await;
        coordinator.add_item(ChecklistCategory::Music, "Song B").await;
        assert_eq!(items(&view, ChecklistCategory::Music).len(), 2);

        let id = items(&view, ChecklistCategory::Music)[0].id.clone();
        assert_eq!(
            coordinator.remove_item(ChecklistCategory::Music, &id).await,
            MutationOutcome::Applied
        );
        assert_eq!(items(&view, ChecklistCategory::Music).len(), 1);

        assert_eq!(
            coordinator.remove_item(ChecklistCategory::Music, "missing").await,
            MutationOutcome::Rejected
        );
        assert_eq!(items(&view, ChecklistCategory::Music).len(), 1);
    }

    #[tokio::test]
    async fn toggling_twice_restores_completion() {
        let (coordinator, view) = local();
        coordinator.add_item(ChecklistCategory::Series, "Dark").await;
        let before = items(&view, ChecklistCategory::Series)[0].clone();

        coordinator.toggle_item(ChecklistCategory::Series, &before.id).await;
        coordinator.toggle_item(ChecklistCategory::Series, &before.id).await;

        assert_eq!(items(&view, ChecklistCategory::Series)[0], before);
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let (coordinator, view) = local();
        assert_eq!(
            coordinator.add_item(ChecklistCategory::Cultural, "   ").await,
            MutationOutcome::Rejected
        );
        assert!(items(&view, ChecklistCategory::Cultural).is_empty());
        assert_eq!(coordinator.add_trip("", None).await, MutationOutcome::Rejected);
    }

    #[tokio::test]
    async fn rename_keeps_id_and_completion() {
        let (coordinator, view) = local();
        coordinator.add_item(ChecklistCategory::Restaurants, "Sushi").await;
        let item = items(&view, ChecklistCategory::Restaurants)[0].clone();

        coordinator
            .rename_item(ChecklistCategory::Restaurants, &item.id, " Sushi Bar ")
            .await;

        let renamed = items(&view, ChecklistCategory::Restaurants)[0].clone();
        assert_eq!(renamed.id, item.id);
        assert_eq!(renamed.name, "Sushi Bar");
    }

    #[tokio::test]
    async fn update_goal_always_clamps() {
        let (coordinator, view) = local();
        let (trip_id, goal_id) = trip_with_goal(&coordinator, &view, 800.0).await;

        for amount in [-50.0, 0.0, 320.5, 800.0, 1e9, f64::NAN, f64::NEG_INFINITY, f64::INFINITY] {
            coordinator.update_goal(&trip_id, &goal_id, amount).await;
            let goal = view.borrow().trips[0].goals[0].clone();
            assert!(
                goal.current >= 0.0 && goal.current <= goal.target,
                "amount {} produced current {}",
                amount,
                goal.current
            );
        }
    }

    #[tokio::test]
    async fn contributions_accumulate_and_toggle_fills_or_resets() {
        let (coordinator, view) = local();
        let (trip_id, goal_id) = trip_with_goal(&coordinator, &view, 1000.0).await;

        coordinator.contribute_to_goal(&trip_id, &goal_id, 250.0).await;
        coordinator.contribute_to_goal(&trip_id, &goal_id, 100.0).await;
        assert_eq!(view.borrow().trips[0].goals[0].current, 350.0);

        assert_eq!(
            coordinator.contribute_to_goal(&trip_id, &goal_id, -5.0).await,
            MutationOutcome::Rejected
        );

        coordinator.toggle_goal_reached(&trip_id, &goal_id).await;
        assert_eq!(view.borrow().trips[0].goals[0].current, 1000.0);
        coordinator.toggle_goal_reached(&trip_id, &goal_id).await;
        assert_eq!(view.borrow().trips[0].goals[0].current, 0.0);
    }

    #[tokio::test]
    async fn goal_summary_follows_mutations() {
        let (coordinator, view) = local();
        let (trip_id, flights) = trip_with_goal(&coordinator, &view, 1000.0).await;
        let hotel = NewGoal {
            name: "Hotel".to_string(),
            target: 500.0,
        };
        coordinator.add_goal(&trip_id, hotel).await;
        let hotel_id = view.borrow().trips[0].goals[1].id.clone();
        coordinator.update_goal(&trip_id, &hotel_id, 500.0).await;

        let summary = savings_summary(&view.borrow().trips[0].goals);
        assert_eq!(summary.total_target, 1500.0);
        assert_eq!(summary.progress_percent, 33);
        assert_eq!(summary.missing, 1000.0);

        coordinator.remove_goal(&trip_id, &flights).await;
        assert_eq!(view.borrow().trips[0].goals.len(), 1);
    }

    #[tokio::test]
    async fn invalid_goal_targets_are_rejected() {
        let (coordinator, view) = local();
        coordinator.add_trip("Lisbon", None).await;
        let trip_id = view.borrow().trips[0].id.clone();

        for target in [-1.0, f64::NAN, f64::INFINITY] {
            let goal = NewGoal {
                name: "Bad".to_string(),
                target,
            };
            assert_eq!(coordinator.add_goal(&trip_id, goal).await, MutationOutcome::Rejected);
        }
        let unknown_trip = NewGoal {
            name: "Food".to_string(),
            target: 10.0,
        };
        assert_eq!(
            coordinator.add_goal("nope", unknown_trip).await,
            MutationOutcome::Rejected
        );
    }

    #[tokio::test]
    async fn moments_are_added_and_removed() {
        let (coordinator, view) = local();
        let moment = NewMoment {
            title: "Anniversary dinner".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 2, 14).unwrap(),
            photo_url: " https://example.com/p.jpg ".to_string(),
            phrase: String::new(),
        };
        assert_eq!(coordinator.add_moment(moment).await, MutationOutcome::Applied);

        let added = view.borrow().moments[0].clone();
        assert_eq!(added.photo_url, "https://example.com/p.jpg");
        assert!(added.created_at.is_some());

        coordinator.remove_moment(&added.id).await;
        assert!(view.borrow().moments.is_empty());
        assert_eq!(coordinator.remove_moment(&added.id).await, MutationOutcome::Rejected);
    }

    #[tokio::test]
    async fn no_store_handle_rejects_everything() {
        let view = shared_view();
        let coordinator = MutationCoordinator::new(None, SessionMode::Remote, view.clone());
        assert_eq!(
            coordinator.add_item(ChecklistCategory::Movies, "Up").await,
            MutationOutcome::Rejected
        );
        assert_eq!(coordinator.add_trip("Rome", None).await, MutationOutcome::Rejected);
        assert!(view.borrow().lists.is_empty());
    }

    #[tokio::test]
    async fn remote_mode_writes_whole_list_and_mirrors_it() {
        let alien = ChecklistItem {
            id: "1".to_string(),
            name: "Alien".to_string(),
            completed: true,
        };
        let store = Arc::new(RecordingStore::seeded(
            CollectionName::Lists,
            "movies",
            checklist_fields(&[alien]),
        ));
        let view = shared_view();
        let coordinator =
            MutationCoordinator::new(Some(store.clone()), SessionMode::Remote, view.clone());

        assert_eq!(
            coordinator.add_item(ChecklistCategory::Movies, "Heat").await,
            MutationOutcome::Applied
        );

        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        let (collection, id, fields) = &writes[0];
        assert_eq!(*collection, CollectionName::Lists);
        assert_eq!(id, "movies");
        assert_eq!(fields["items"].as_array().map(Vec::len), Some(2));
        // The view has not seen a snapshot yet, but already shows the write.
        let names: Vec<_> = items(&view, ChecklistCategory::Movies)
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, ["Alien", "Heat"]);
    }

    #[tokio::test]
    async fn back_to_back_remote_adds_keep_both_items() {
        let store = Arc::new(RecordingStore::default());
        let coordinator =
            MutationCoordinator::new(Some(store.clone()), SessionMode::Remote, shared_view());

        coordinator.add_item(ChecklistCategory::Movies, "A").await;
        coordinator.add_item(ChecklistCategory::Movies, "B").await;

        assert_eq!(
            store.written_items(ChecklistCategory::Movies),
            vec![vec!["A".to_string()], vec!["A".to_string(), "B".to_string()]]
        );
    }

    #[tokio::test]
    async fn concurrent_adds_are_serialized() {
        let store = Arc::new(RecordingStore::default());
        let coordinator =
            MutationCoordinator::new(Some(store.clone()), SessionMode::Remote, shared_view());

        let (first, second) = tokio::join!(
            coordinator.add_item(ChecklistCategory::Music, "A"),
            coordinator.add_item(ChecklistCategory::Music, "B"),
        );
        assert_eq!(first, MutationOutcome::Applied);
        assert_eq!(second, MutationOutcome::Applied);

        let last = store.written_items(ChecklistCategory::Music).pop().unwrap();
        assert_eq!(last.len(), 2);
    }

    #[tokio::test]
    async fn remote_goal_edits_build_on_each_other() {
        let store = Arc::new(RecordingStore::default());
        let view = shared_view();
        let coordinator =
            MutationCoordinator::new(Some(store.clone()), SessionMode::Remote, view.clone());

        // No snapshot has delivered the trip yet.
        assert_eq!(coordinator.add_trip("Oslo", None).await, MutationOutcome::Applied);
        let trip_id = view.borrow().trips[0].id.clone();
        let goal = NewGoal {
            name: "Flights".to_string(),
            target: 1000.0,
        };
        assert_eq!(coordinator.add_goal(&trip_id, goal).await, MutationOutcome::Applied);
        let goal_id = view.borrow().trips[0].goals[0].id.clone();

        coordinator.update_goal(&trip_id, &goal_id, 300.0).await;
        coordinator.contribute_to_goal(&trip_id, &goal_id, 200.0).await;

        let stored = store
            .get_document(CollectionName::Trips, &trip_id)
            .await
            .unwrap()
            .unwrap();
        let trip = trip_from_document(&StoredDocument {
            id: trip_id.clone(),
            fields: stored,
        })
        .unwrap();
        assert_eq!(trip.name, "Oslo");
        assert_eq!(trip.goals[0].current, 500.0);
        assert_eq!(view.borrow().trips[0].goals[0].current, 500.0);
    }

    #[tokio::test]
    async fn stale_view_does_not_drop_stored_items() {
        let stored = ChecklistItem {
            id: "1".to_string(),
            name: "Stored".to_string(),
            completed: false,
        };
        let store = Arc::new(RecordingStore::seeded(
            CollectionName::Lists,
            "series",
            checklist_fields(&[stored]),
        ));
        let view = shared_view();
        view.send_modify(|v| {
            v.lists.insert(ChecklistCategory::Series, Vec::new());
        });
        let coordinator = MutationCoordinator::new(
            Some(store.clone()),
            SessionMode::LocalFallback,
            view.clone(),
        );

        coordinator.add_item(ChecklistCategory::Series, "New").await;

        assert_eq!(
            store.written_items(ChecklistCategory::Series),
            vec![vec!["Stored".to_string(), "New".to_string()]]
        );
        assert_eq!(items(&view, ChecklistCategory::Series).len(), 2);
    }

    #[tokio::test]
    async fn remote_removals_check_the_store() {
        let store = Arc::new(RecordingStore::default());
        let coordinator =
            MutationCoordinator::new(Some(store.clone()), SessionMode::Remote, shared_view());
        assert_eq!(coordinator.remove_trip("gone").await, MutationOutcome::Rejected);

        coordinator.add_trip("Rome", None).await;
        assert_eq!(coordinator.remove_trip("doc-1").await, MutationOutcome::Applied);
        assert_eq!(coordinator.remove_trip("doc-1").await, MutationOutcome::Rejected);
    }

    #[tokio::test]
    async fn failed_writes_are_reported_as_failed() {
        let view = shared_view();
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let coordinator = MutationCoordinator::new(Some(store), SessionMode::Remote, view);
        assert_eq!(
            coordinator.add_item(ChecklistCategory::Movies, "Heat").await,
            MutationOutcome::Failed
        );
    }
}
