//! services/organizer/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every mutation answers `202 Accepted` once the write was attempted; a
//! failed store write is logged, not surfaced. `422` means the request was
//! rejected before anything was written.

use crate::sync::coordinator::MutationOutcome;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use casal_core::aggregate::{
    checklist_summary, moments_newest_first, savings_summary, ChecklistSummary, SavingsSummary,
};
use casal_core::domain::{ChecklistCategory, CollaboratorSession, NewGoal, NewMoment, OrganizerView};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_state_handler,
        add_item_handler,
        remove_item_handler,
        toggle_item_handler,
        rename_item_handler,
        add_moment_handler,
        remove_moment_handler,
        add_trip_handler,
        remove_trip_handler,
        add_goal_handler,
        remove_goal_handler,
        update_goal_handler,
        contribute_handler,
        toggle_goal_handler,
    ),
    components(
        schemas(
            StateResponse,
            MutationResponse,
            ItemRequest,
            MomentRequest,
            TripRequest,
            GoalRequest,
            AmountRequest,
        )
    ),
    tags(
        (name = "Casal Organizer API", description = "Shared checklists, moments and trip savings for two collaborators.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The current view plus everything the UI derives from it.
#[derive(Debug, Serialize, ToSchema)]
pub struct StateResponse {
    #[schema(value_type = Object)]
    pub view: OrganizerView,
    #[schema(value_type = Object)]
    pub session: CollaboratorSession,
    pub loading: bool,
    /// Completion per checklist category.
    #[schema(value_type = Object)]
    pub checklists: BTreeMap<ChecklistCategory, ChecklistSummary>,
    /// Savings per trip, keyed by trip id.
    #[schema(value_type = Object)]
    pub savings: BTreeMap<String, SavingsSummary>,
    /// Ids of `view.moments` ordered newest first; undated ones last.
    pub timeline: Vec<String>,
}

impl StateResponse {
    pub fn build(view: &OrganizerView, session: &CollaboratorSession) -> Self {
        let checklists = ChecklistCategory::ALL
            .into_iter()
            .map(|category| (category, checklist_summary(view.items(category))))
            .collect();
        let savings = view
            .trips
            .iter()
            .map(|trip| (trip.id.clone(), savings_summary(&trip.goals)))
            .collect();
        let timeline = moments_newest_first(&view.moments)
            .into_iter()
            .map(|moment| moment.id.clone())
            .collect();

        Self {
            view: view.clone(),
            session: session.clone(),
            loading: view.load.is_loading(),
            checklists,
            savings,
            timeline,
        }
    }
}

/// The result of a mutation request.
#[derive(Serialize, ToSchema)]
pub struct MutationResponse {
    #[schema(value_type = String, example = "applied")]
    pub outcome: MutationOutcome,
}

/// A checklist item name, used to add or rename.
#[derive(Deserialize, ToSchema)]
pub struct ItemRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MomentRequest {
    pub title: String,
    pub date: NaiveDate,
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
    #[serde(default)]
    pub phrase: String,
}

#[derive(Deserialize, ToSchema)]
pub struct TripRequest {
    pub name: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct GoalRequest {
    pub name: String,
    pub target: f64,
}

/// An amount of money: the new saved total, or a contribution.
#[derive(Deserialize, ToSchema)]
pub struct AmountRequest {
    pub amount: f64,
}

type MutationReply = Result<(StatusCode, Json<MutationResponse>), (StatusCode, String)>;

fn reply(outcome: MutationOutcome) -> MutationReply {
    let status = match outcome {
        MutationOutcome::Applied | MutationOutcome::Failed => StatusCode::ACCEPTED,
        MutationOutcome::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((status, Json(MutationResponse { outcome })))
}

fn parse_category(raw: &str) -> Result<ChecklistCategory, (StatusCode, String)> {
    raw.parse::<ChecklistCategory>().map_err(|e| {
        debug!("{}", e);
        (StatusCode::NOT_FOUND, e.to_string())
    })
}

//=========================================================================================
// State
//=========================================================================================

/// The current organizer state with derived summaries.
#[utoipa::path(
    get,
    path = "/state",
    responses((status = 200, description = "Current state", body = StateResponse))
)]
pub async fn get_state_handler(State(app_state): State<Arc<AppState>>) -> Json<StateResponse> {
    let view = app_state.view.borrow().clone();
    Json(StateResponse::build(&view, &app_state.collaborator))
}

//=========================================================================================
// Checklists
//=========================================================================================

#[utoipa::path(
    post,
    path = "/lists/{category}/items",
    request_body = ItemRequest,
    params(("category" = String, Path, description = "movies, series, cultural, restaurants or music")),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 404, description = "Unknown category"),
        (status = 422, description = "Rejected", body = MutationResponse)
    )
)]
pub async fn add_item_handler(
    State(app_state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Json(request): Json<ItemRequest>,
) -> MutationReply {
    let category = parse_category(&category)?;
    reply(app_state.coordinator.add_item(category, &request.name).await)
}

#[utoipa::path(
    delete,
    path = "/lists/{category}/items/{id}",
    params(
        ("category" = String, Path, description = "Checklist category"),
        ("id" = String, Path, description = "Item id")
    ),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 404, description = "Unknown category"),
        (status = 422, description = "No such item", body = MutationResponse)
    )
)]
pub async fn remove_item_handler(
    State(app_state): State<Arc<AppState>>,
    Path((category, item_id)): Path<(String, String)>,
) -> MutationReply {
    let category = parse_category(&category)?;
    reply(app_state.coordinator.remove_item(category, &item_id).await)
}

#[utoipa::path(
    post,
    path = "/lists/{category}/items/{id}/toggle",
    params(
        ("category" = String, Path, description = "Checklist category"),
        ("id" = String, Path, description = "Item id")
    ),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 404, description = "Unknown category"),
        (status = 422, description = "No such item", body = MutationResponse)
    )
)]
pub async fn toggle_item_handler(
    State(app_state): State<Arc<AppState>>,
    Path((category, item_id)): Path<(String, String)>,
) -> MutationReply {
    let category = parse_category(&category)?;
    reply(app_state.coordinator.toggle_item(category, &item_id).await)
}

#[utoipa::path(
    put,
    path = "/lists/{category}/items/{id}",
    request_body = ItemRequest,
    params(
        ("category" = String, Path, description = "Checklist category"),
        ("id" = String, Path, description = "Item id")
    ),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 404, description = "Unknown category"),
        (status = 422, description = "Rejected", body = MutationResponse)
    )
)]
pub async fn rename_item_handler(
    State(app_state): State<Arc<AppState>>,
    Path((category, item_id)): Path<(String, String)>,
    Json(request): Json<ItemRequest>,
) -> MutationReply {
    let category = parse_category(&category)?;
    reply(
        app_state
            .coordinator
            .rename_item(category, &item_id, &request.name)
            .await,
    )
}

//=========================================================================================
// Moments
//=========================================================================================

#[utoipa::path(
    post,
    path = "/moments",
    request_body = MomentRequest,
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 422, description = "Rejected", body = MutationResponse)
    )
)]
pub async fn add_moment_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<MomentRequest>,
) -> MutationReply {
    let moment = NewMoment {
        title: request.title,
        date: request.date,
        photo_url: request.photo_url,
        phrase: request.phrase,
    };
    reply(app_state.coordinator.add_moment(moment).await)
}

#[utoipa::path(
    delete,
    path = "/moments/{id}",
    params(("id" = String, Path, description = "Moment id")),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 422, description = "No such moment", body = MutationResponse)
    )
)]
pub async fn remove_moment_handler(
    State(app_state): State<Arc<AppState>>,
    Path(moment_id): Path<String>,
) -> MutationReply {
    reply(app_state.coordinator.remove_moment(&moment_id).await)
}

//=========================================================================================
// Trips and goals
//=========================================================================================

#[utoipa::path(
    post,
    path = "/trips",
    request_body = TripRequest,
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 422, description = "Rejected", body = MutationResponse)
    )
)]
pub async fn add_trip_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<TripRequest>,
) -> MutationReply {
    reply(
        app_state
            .coordinator
            .add_trip(&request.name, request.date)
            .await,
    )
}

#[utoipa::path(
    delete,
    path = "/trips/{id}",
    params(("id" = String, Path, description = "Trip id")),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 422, description = "No such trip", body = MutationResponse)
    )
)]
pub async fn remove_trip_handler(
    State(app_state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> MutationReply {
    reply(app_state.coordinator.remove_trip(&trip_id).await)
}

#[utoipa::path(
    post,
    path = "/trips/{id}/goals",
    request_body = GoalRequest,
    params(("id" = String, Path, description = "Trip id")),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 422, description = "Rejected", body = MutationResponse)
    )
)]
pub async fn add_goal_handler(
    State(app_state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
    Json(request): Json<GoalRequest>,
) -> MutationReply {
    let goal = NewGoal {
        name: request.name,
        target: request.target,
    };
    reply(app_state.coordinator.add_goal(&trip_id, goal).await)
}

#[utoipa::path(
    delete,
    path = "/trips/{id}/goals/{goal_id}",
    params(
        ("id" = String, Path, description = "Trip id"),
        ("goal_id" = String, Path, description = "Goal id")
    ),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 422, description = "No such trip or goal", body = MutationResponse)
    )
)]
pub async fn remove_goal_handler(
    State(app_state): State<Arc<AppState>>,
    Path((trip_id, goal_id)): Path<(String, String)>,
) -> MutationReply {
    reply(app_state.coordinator.remove_goal(&trip_id, &goal_id).await)
}

/// Sets how much a goal has saved. The amount is clamped to `[0, target]`.
#[utoipa::path(
    put,
    path = "/trips/{id}/goals/{goal_id}",
    request_body = AmountRequest,
    params(
        ("id" = String, Path, description = "Trip id"),
        ("goal_id" = String, Path, description = "Goal id")
    ),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 422, description = "No such trip or goal", body = MutationResponse)
    )
)]
pub async fn update_goal_handler(
    State(app_state): State<Arc<AppState>>,
    Path((trip_id, goal_id)): Path<(String, String)>,
    Json(request): Json<AmountRequest>,
) -> MutationReply {
    reply(
        app_state
            .coordinator
            .update_goal(&trip_id, &goal_id, request.amount)
            .await,
    )
}

#[utoipa::path(
    post,
    path = "/trips/{id}/goals/{goal_id}/contributions",
    request_body = AmountRequest,
    params(
        ("id" = String, Path, description = "Trip id"),
        ("goal_id" = String, Path, description = "Goal id")
    ),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 422, description = "Rejected", body = MutationResponse)
    )
)]
pub async fn contribute_handler(
    State(app_state): State<Arc<AppState>>,
    Path((trip_id, goal_id)): Path<(String, String)>,
    Json(request): Json<AmountRequest>,
) -> MutationReply {
    reply(
        app_state
            .coordinator
            .contribute_to_goal(&trip_id, &goal_id, request.amount)
            .await,
    )
}

/// Marks a goal as reached, or resets a reached goal to zero.
#[utoipa::path(
    post,
    path = "/trips/{id}/goals/{goal_id}/toggle",
    params(
        ("id" = String, Path, description = "Trip id"),
        ("goal_id" = String, Path, description = "Goal id")
    ),
    responses(
        (status = 202, description = "Write attempted", body = MutationResponse),
        (status = 422, description = "No such trip or goal", body = MutationResponse)
    )
)]
pub async fn toggle_goal_handler(
    State(app_state): State<Arc<AppState>>,
    Path((trip_id, goal_id)): Path<(String, String)>,
) -> MutationReply {
    reply(
        app_state
            .coordinator
            .toggle_goal_reached(&trip_id, &goal_id)
            .await,
    )
}
