//! HTTP surface for the offer composer.
//!
//! One live engine per open inquiry, held in a session map: the engine owns
//! the working option set and its autosave loop, the handlers stay thin.
//! Concurrent editors of the same inquiry share the session; across
//! processes the store is last-write-wins by design.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

use tafel_core::activity::ActivityLog;
use tafel_core::domain::inquiry::InquiryId;
use tafel_core::domain::menu::{CourseSelection, DrinkSelection};
use tafel_core::domain::option::OptionId;
use tafel_core::domain::package::Package;
use tafel_core::engine::autosave::{AutosavePolicy, SaveStatus};
use tafel_core::engine::{AddOptionOutcome, OfferEngine, OptionPatch};
use tafel_core::errors::{ApplicationError, InterfaceError};
use tafel_core::identity::IdentityProvider;
use tafel_core::pricing;
use tafel_core::send::{EmailGeneration, SendFlow};
use tafel_core::store::OfferStore;

#[derive(Clone)]
pub struct ComposerState {
    sessions: Arc<Mutex<HashMap<String, Arc<Mutex<OfferEngine>>>>>,
    store: Arc<dyn OfferStore>,
    identity: Arc<dyn IdentityProvider>,
    activity: Arc<dyn ActivityLog>,
    policy: AutosavePolicy,
    catalog: Arc<Vec<Package>>,
    flow: Arc<SendFlow>,
}

impl ComposerState {
    pub fn new(
        store: Arc<dyn OfferStore>,
        identity: Arc<dyn IdentityProvider>,
        activity: Arc<dyn ActivityLog>,
        policy: AutosavePolicy,
        catalog: Arc<Vec<Package>>,
        flow: Arc<SendFlow>,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            store,
            identity,
            activity,
            policy,
            catalog,
            flow,
        }
    }

    /// The live engine for this inquiry, loading one on first access. The
    /// load guard is released as soon as the initial state is in memory.
    async fn session(&self, inquiry_id: &str) -> Result<Arc<Mutex<OfferEngine>>, ApiError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(engine) = sessions.get(inquiry_id) {
            return Ok(Arc::clone(engine));
        }

        let mut engine = OfferEngine::load(
            Arc::clone(&self.store),
            Arc::clone(&self.identity),
            Arc::clone(&self.activity),
            self.policy,
            &InquiryId(inquiry_id.to_string()),
            &self.catalog,
        )
        .await
        .map_err(ApplicationError::from)?;
        engine.release_load_guard();

        let engine = Arc::new(Mutex::new(engine));
        sessions.insert(inquiry_id.to_string(), Arc::clone(&engine));
        Ok(engine)
    }

    fn find_package(&self, id: &str) -> Option<&Package> {
        self.catalog.iter().find(|package| package.id.0 == id)
    }
}

pub fn router(state: ComposerState) -> Router {
    Router::new()
        .route("/inquiries/{id}/composer", get(open_composer))
        .route("/inquiries/{id}/composer/options", post(add_option))
        .route("/inquiries/{id}/composer/options/{option_id}", delete(remove_option))
        .route("/inquiries/{id}/composer/options/{option_id}", patch(update_option))
        .route("/inquiries/{id}/composer/options/{option_id}/package", post(change_package))
        .route("/inquiries/{id}/composer/options/{option_id}/toggle", post(toggle_option))
        .route("/inquiries/{id}/composer/options/{option_id}/course", post(select_course))
        .route("/inquiries/{id}/composer/options/{option_id}/drink", post(select_drink))
        .route("/inquiries/{id}/composer/save", post(save_options))
        .route("/inquiries/{id}/composer/email", post(generate_email))
        .route("/inquiries/{id}/composer/send", post(send_offer))
        .route("/inquiries/{id}/composer/unlock", post(unlock))
        .route("/inquiries/{id}/composer/history", get(history))
        .with_state(state)
}

enum ApiError {
    Application(ApplicationError),
    UnknownOption(String),
    UnknownPackage(String),
}

impl<E: Into<ApplicationError>> From<E> for ApiError {
    fn from(value: E) -> Self {
        Self::Application(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Application(error) => {
                let correlation_id = Uuid::new_v4().to_string();
                error!(
                    event_name = "composer.request_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "composer request failed"
                );
                let interface = error.into_interface(correlation_id.clone());
                let status = match &interface {
                    InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                    InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let body = json!({
                    "error": interface.user_message(),
                    "correlation_id": correlation_id,
                });
                (status, Json(body)).into_response()
            }
            Self::UnknownOption(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("offer option `{id}` is not part of this inquiry") })),
            )
                .into_response(),
            Self::UnknownPackage(id) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("package `{id}` is not in the catalog") })),
            )
                .into_response(),
        }
    }
}

type ApiResult = Result<(StatusCode, Json<Value>), ApiError>;

fn save_status_str(status: SaveStatus) -> &'static str {
    match status {
        SaveStatus::Idle => "idle",
        SaveStatus::Saving => "saving",
        SaveStatus::Saved => "saved",
    }
}

fn composer_view(engine: &OfferEngine) -> Value {
    json!({
        "inquiry": engine.inquiry(),
        "options": engine.options(),
        "locked": engine.is_locked(),
        "active_total": engine.active_total(),
        "save_status": save_status_str(*engine.save_status().borrow()),
    })
}

async fn open_composer(
    State(state): State<ComposerState>,
    Path(id): Path<String>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let engine = session.lock().await;
    Ok((StatusCode::OK, Json(composer_view(&engine))))
}

async fn add_option(State(state): State<ComposerState>, Path(id): Path<String>) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    match engine.add_option() {
        AddOptionOutcome::Added { id, label } => Ok((
            StatusCode::CREATED,
            Json(json!({ "id": id, "label": label, "options": engine.options() })),
        )),
        AddOptionOutcome::CapacityReached => Ok((
            StatusCode::OK,
            Json(json!({ "warning": "option_capacity_reached", "options": engine.options() })),
        )),
    }
}

async fn remove_option(
    State(state): State<ComposerState>,
    Path((id, option_id)): Path<(String, String)>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    if !engine.remove_option(&OptionId(option_id.clone())) {
        return Err(ApiError::UnknownOption(option_id));
    }
    Ok((StatusCode::OK, Json(composer_view(&engine))))
}

#[derive(Debug, Deserialize)]
struct UpdateOptionRequest {
    guest_count: Option<u32>,
    total_amount: Option<Decimal>,
    sort_order: Option<u32>,
}

async fn update_option(
    State(state): State<ComposerState>,
    Path((id, option_id)): Path<(String, String)>,
    Json(request): Json<UpdateOptionRequest>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    let option_id = OptionId(option_id);

    // A guest-count change recomputes the total here, at the caller seam.
    let recomputed = match (request.guest_count, request.total_amount) {
        (Some(guest_count), None) => engine
            .option(&option_id)
            .and_then(|option| option.package_id.as_ref())
            .and_then(|package_id| state.find_package(&package_id.0))
            .map(|package| pricing::package_total(package, guest_count)),
        _ => request.total_amount,
    };

    let patch = OptionPatch {
        guest_count: request.guest_count,
        total_amount: recomputed,
        sort_order: request.sort_order,
    };
    if !engine.update_option(&option_id, patch) {
        return Err(ApiError::UnknownOption(option_id.0));
    }
    Ok((StatusCode::OK, Json(composer_view(&engine))))
}

#[derive(Debug, Deserialize)]
struct ChangePackageRequest {
    package_id: Option<String>,
}

async fn change_package(
    State(state): State<ComposerState>,
    Path((id, option_id)): Path<(String, String)>,
    Json(request): Json<ChangePackageRequest>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    let option_id = OptionId(option_id);

    let package = match &request.package_id {
        Some(package_id) => Some(
            state
                .find_package(package_id)
                .ok_or_else(|| ApiError::UnknownPackage(package_id.clone()))?,
        ),
        None => None,
    };

    if !engine.change_package(&option_id, package) {
        return Err(ApiError::UnknownOption(option_id.0));
    }
    Ok((StatusCode::OK, Json(composer_view(&engine))))
}

async fn toggle_option(
    State(state): State<ComposerState>,
    Path((id, option_id)): Path<(String, String)>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    if !engine.toggle_option_active(&OptionId(option_id.clone())) {
        return Err(ApiError::UnknownOption(option_id));
    }
    Ok((StatusCode::OK, Json(composer_view(&engine))))
}

async fn select_course(
    State(state): State<ComposerState>,
    Path((id, option_id)): Path<(String, String)>,
    Json(selection): Json<CourseSelection>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    if !engine.select_course(&OptionId(option_id.clone()), selection) {
        return Err(ApiError::UnknownOption(option_id));
    }
    Ok((StatusCode::OK, Json(composer_view(&engine))))
}

async fn select_drink(
    State(state): State<ComposerState>,
    Path((id, option_id)): Path<(String, String)>,
    Json(selection): Json<DrinkSelection>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    if !engine.select_drink(&OptionId(option_id.clone()), selection) {
        return Err(ApiError::UnknownOption(option_id));
    }
    Ok((StatusCode::OK, Json(composer_view(&engine))))
}

async fn save_options(State(state): State<ComposerState>, Path(id): Path<String>) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    engine.save_options().await.map_err(ApplicationError::from)?;
    Ok((StatusCode::OK, Json(json!({ "status": "saved" }))))
}

async fn generate_email(State(state): State<ComposerState>, Path(id): Path<String>) -> ApiResult {
    let session = state.session(&id).await?;
    let engine = session.lock().await;
    let generated = state
        .flow
        .generate_email(&engine, &state.catalog)
        .await
        .map_err(ApplicationError::from)?;

    let body = match generated {
        EmailGeneration::Generated(email) => json!({ "status": "generated", "email": email }),
        EmailGeneration::Incomplete { labels } => {
            json!({ "status": "incomplete", "labels": labels })
        }
    };
    Ok((StatusCode::OK, Json(body)))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    email_content: String,
}

async fn send_offer(
    State(state): State<ComposerState>,
    Path(id): Path<String>,
    Json(request): Json<SendRequest>,
) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    let outcome = state
        .flow
        .send_offer(&mut engine, request.email_content)
        .await
        .map_err(ApplicationError::from)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "version": outcome.version,
            "links_created": outcome.links_created,
            "locked": engine.is_locked(),
        })),
    ))
}

async fn unlock(State(state): State<ComposerState>, Path(id): Path<String>) -> ApiResult {
    let session = state.session(&id).await?;
    let mut engine = session.lock().await;
    engine.unlock_for_new_version().await.map_err(ApplicationError::from)?;
    Ok((StatusCode::OK, Json(composer_view(&engine))))
}

async fn history(State(state): State<ComposerState>, Path(id): Path<String>) -> ApiResult {
    let session = state.session(&id).await?;
    let engine = session.lock().await;
    Ok((StatusCode::OK, Json(json!({ "history": engine.history() }))))
}
