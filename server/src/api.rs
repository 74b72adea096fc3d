use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bus_tracker_data_management::{
    DataManager, DataManagerError,
    fleet::{Bus, Driver, LeaveRequest, Parent, ParentStatus, Student},
    store::{Record, Store},
};
use bus_tracker_lib::{
    TrackerError,
    attendance::{AttendanceOutcome, AttendanceRecord},
    notification::{Notification, NotificationKind},
    route::Route,
    session::{ChildStatusView, Role, TripSession, TripSnapshot},
    trip::VehicleId,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{live, server_state::ServerState};

#[derive(Debug)]
pub enum ApiError {
    Tracker(TrackerError),
    Data(DataManagerError),
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        ApiError::Tracker(err)
    }
}

impl From<DataManagerError> for ApiError {
    fn from(err: DataManagerError) -> Self {
        ApiError::Data(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Tracker(TrackerError::NotFound(_)) | ApiError::Data(DataManagerError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Tracker(TrackerError::InvalidTransition(_) | TrackerError::AlreadyRecorded(_)) => StatusCode::CONFLICT,
            ApiError::Tracker(_) | ApiError::Data(DataManagerError::Invalid(_)) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Tracker(err) => err.to_string(),
            ApiError::Data(err) => err.to_string(),
        };
        tracing::warn!("Rejected: {message}");
        (self.status(), Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/routes", get(list_routes))
        .route("/routes/{route_id}", get(get_route))
        .route("/drivers", get(list::<Driver>).post(create::<Driver>))
        .route("/drivers/{id}", get(fetch::<Driver>).put(update::<Driver>).delete(remove::<Driver>))
        .route("/parents", get(list::<Parent>).post(create::<Parent>))
        .route("/parents/{id}", get(fetch::<Parent>).put(update::<Parent>).delete(remove::<Parent>))
        .route("/parents/{id}/status", post(set_parent_status))
        .route("/buses", get(list::<Bus>).post(create::<Bus>))
        .route("/buses/{id}", get(fetch::<Bus>).put(update::<Bus>).delete(remove::<Bus>))
        .route("/students", get(list::<Student>))
        .route("/students/{id}/leave", post(apply_leave))
        .route("/leaves", get(list::<LeaveRequest>))
        .route("/leaves/{id}", get(fetch::<LeaveRequest>))
        .route("/vehicles/{bus_id}/trip", get(get_trip))
        .route("/vehicles/{bus_id}/trip/start", post(start_trip))
        .route("/vehicles/{bus_id}/trip/advance", post(advance_stop))
        .route("/vehicles/{bus_id}/trip/skip", post(skip_stop))
        .route("/vehicles/{bus_id}/trip/end", post(end_trip))
        .route("/vehicles/{bus_id}/attendance", post(mark_attendance))
        .route("/vehicles/{bus_id}/telemetry/refresh", post(refresh_telemetry))
        .route("/vehicles/{bus_id}/notifications", get(list_notifications).post(announce))
        .route("/vehicles/{bus_id}/notifications/read", post(mark_all_read))
        .route("/vehicles/{bus_id}/notifications/{notification_id}/read", post(mark_read))
        .route("/vehicles/{bus_id}/students/{student_id}/status", get(child_status))
        .route("/vehicles/{bus_id}/live", get(live::live_socket))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn list_routes(State(state): State<Arc<ServerState>>) -> Json<Vec<Route>> {
    Json(state.data_manager.routes().iter().map(|route| route.as_ref().clone()).collect())
}

async fn get_route(State(state): State<Arc<ServerState>>, Path(route_id): Path<String>) -> Result<Json<Route>, ApiError> {
    let route = state.data_manager.route(&route_id)?;
    Ok(Json(route.as_ref().clone()))
}

/// A fleet collection exposed over REST.
trait Collection: Record + Serialize + DeserializeOwned + Sync {
    fn store(data_manager: &DataManager) -> &Store<Self>;
}

impl Collection for Driver {
    fn store(data_manager: &DataManager) -> &Store<Self> {
        data_manager.drivers()
    }
}

impl Collection for Parent {
    fn store(data_manager: &DataManager) -> &Store<Self> {
        data_manager.parents()
    }
}

impl Collection for Bus {
    fn store(data_manager: &DataManager) -> &Store<Self> {
        data_manager.buses()
    }
}

impl Collection for Student {
    fn store(data_manager: &DataManager) -> &Store<Self> {
        data_manager.students()
    }
}

impl Collection for LeaveRequest {
    fn store(data_manager: &DataManager) -> &Store<Self> {
        data_manager.leaves()
    }
}

async fn list<T: Collection>(State(state): State<Arc<ServerState>>) -> Json<Vec<T>> {
    Json(T::store(&state.data_manager).list().await)
}

async fn fetch<T: Collection>(State(state): State<Arc<ServerState>>, Path(id): Path<String>) -> Result<Json<T>, ApiError> {
    Ok(Json(T::store(&state.data_manager).get(&id).await?))
}

async fn create<T: Collection>(State(state): State<Arc<ServerState>>, Json(record): Json<T>) -> Result<(StatusCode, Json<T>), ApiError> {
    let record = T::store(&state.data_manager).insert(record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update<T: Collection>(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(record): Json<T>,
) -> Result<Json<T>, ApiError> {
    Ok(Json(T::store(&state.data_manager).update(&id, record).await?))
}

async fn remove<T: Collection>(State(state): State<Arc<ServerState>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    T::store(&state.data_manager).remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct StatusBody {
    status: ParentStatus,
}

async fn set_parent_status(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Parent>, ApiError> {
    Ok(Json(state.data_manager.set_parent_status(&id, body.status).await?))
}

#[derive(Deserialize, Default)]
struct RoleQuery {
    role: Option<Role>,
}

/// Runs `action` on the vehicle's session, creating the session on first use.
/// The live ticker is brought in line with the outcome before the lock is released.
async fn with_session<R>(
    state: &Arc<ServerState>,
    bus_id: &str,
    role: Option<Role>,
    action: impl FnOnce(&mut TripSession) -> Result<R, TrackerError>,
) -> Result<R, ApiError> {
    state.data_manager.buses().get(bus_id).await?;

    let mut sessions = state.sessions.lock().await;
    let session = sessions
        .entry(bus_id.to_string())
        .or_insert_with(|| state.new_session(bus_id, role.unwrap_or_default()));
    if let Some(role) = role {
        session.set_role(role);
    }
    let result = action(session);
    state.sync_ticker(bus_id, session).await;
    Ok(result?)
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn get_trip(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<TripSnapshot>, ApiError> {
    let snapshot = with_session(&state, &bus_id, query.role, |session| Ok(session.snapshot(now()))).await?;
    Ok(Json(snapshot))
}

async fn start_trip(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<TripSnapshot>, ApiError> {
    let (route, roster) = state.data_manager.trip_plan(&bus_id).await?;
    let leaves = state.data_manager.leaves_on(route.route_id(), today()).await?;
    let snapshot = with_session(&state, &bus_id, query.role, |session| {
        session.start_trip(route, roster)?;
        for leave in leaves {
            if let Err(err) = session.apply_leave(&leave.student_id, leave.reason) {
                tracing::warn!("Leave {} not applied on bus {}: {err}", leave.leave_id, session.context().vehicle_id);
            }
        }
        Ok(session.snapshot(now()))
    })
    .await?;

    tracing::info!("Bus {bus_id} started {}", snapshot.route_id.as_deref().unwrap_or("a trip"));
    Ok(Json(snapshot))
}

async fn move_on(state: Arc<ServerState>, bus_id: String, role: Option<Role>, skip: bool) -> Result<Json<TripSnapshot>, ApiError> {
    let snapshot = with_session(&state, &bus_id, role, |session| {
        if skip {
            session.skip_stop()?;
        } else {
            session.advance_stop()?;
        }
        Ok(session.snapshot(now()))
    })
    .await?;
    Ok(Json(snapshot))
}

async fn advance_stop(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<TripSnapshot>, ApiError> {
    move_on(state, bus_id, query.role, false).await
}

async fn skip_stop(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<TripSnapshot>, ApiError> {
    move_on(state, bus_id, query.role, true).await
}

async fn end_trip(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<TripSnapshot>, ApiError> {
    let snapshot = with_session(&state, &bus_id, query.role, |session| {
        session.end_trip();
        Ok(session.snapshot(now()))
    })
    .await?;
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
struct AttendanceBody {
    student_id: String,
    outcome: AttendanceOutcome,
}

async fn mark_attendance(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<RoleQuery>,
    Json(body): Json<AttendanceBody>,
) -> Result<Json<AttendanceRecord>, ApiError> {
    let record = with_session(&state, &bus_id, query.role, |session| session.mark_attendance(&body.student_id, body.outcome)).await?;
    Ok(Json(record))
}

#[derive(Serialize)]
struct RefreshResponse {
    scheduled: bool,
}

async fn refresh_telemetry(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let scheduled = with_session(&state, &bus_id, query.role, |session| session.refresh_telemetry(now())).await?;
    Ok(Json(RefreshResponse { scheduled }))
}

#[derive(Deserialize, Default)]
struct StudentQuery {
    student_id: Option<String>,
}

#[derive(Serialize)]
struct NotificationsResponse {
    unread: usize,
    notifications: Vec<Notification>,
}

async fn list_notifications(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<StudentQuery>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let student_id = query.student_id.as_deref();
    let response = with_session(&state, &bus_id, None, |session| {
        let feed = session.notifications();
        Ok(NotificationsResponse {
            unread: feed.unread_count(student_id),
            notifications: feed.items(student_id),
        })
    })
    .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct AnnouncementBody {
    #[serde(default = "general")]
    kind: NotificationKind,
    title: String,
    message: String,
}

fn general() -> NotificationKind {
    NotificationKind::General
}

async fn announce(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<RoleQuery>,
    Json(body): Json<AnnouncementBody>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(DataManagerError::Invalid("notification title is required".into()).into());
    }
    let notification = with_session(&state, &bus_id, query.role, |session| Ok(session.announce(body.kind, body.title, body.message))).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

#[derive(Serialize)]
struct MarkedResponse {
    marked: usize,
}

async fn mark_all_read(
    State(state): State<Arc<ServerState>>,
    Path(bus_id): Path<String>,
    Query(query): Query<StudentQuery>,
) -> Result<Json<MarkedResponse>, ApiError> {
    let marked = with_session(&state, &bus_id, None, |session| {
        Ok(session.notifications_mut().mark_all_read(query.student_id.as_deref()))
    })
    .await?;
    Ok(Json(MarkedResponse { marked }))
}

async fn mark_read(
    State(state): State<Arc<ServerState>>,
    Path((bus_id, notification_id)): Path<(String, u64)>,
) -> Result<Json<Notification>, ApiError> {
    let notification = with_session(&state, &bus_id, None, |session| session.notifications_mut().mark_read(notification_id)).await?;
    Ok(Json(notification))
}

async fn child_status(
    State(state): State<Arc<ServerState>>,
    Path((bus_id, student_id)): Path<(String, String)>,
) -> Result<Json<ChildStatusView>, ApiError> {
    let view = with_session(&state, &bus_id, None, |session| session.child_status(&student_id)).await?;
    Ok(Json(view))
}

#[derive(Deserialize)]
struct LeaveBody {
    date: Option<NaiveDate>,
    reason: Option<String>,
}

#[derive(Serialize)]
struct LeaveResponse {
    #[serde(flatten)]
    leave: LeaveRequest,
    /// Buses whose running trip already took the leave into account.
    applied_to: Vec<VehicleId>,
}

async fn apply_leave(
    State(state): State<Arc<ServerState>>,
    Path(student_id): Path<String>,
    Json(body): Json<LeaveBody>,
) -> Result<(StatusCode, Json<LeaveResponse>), ApiError> {
    let date = body.date.unwrap_or_else(today);
    let leave = state.data_manager.apply_leave(&student_id, date, body.reason).await?;
    let student = state.data_manager.students().get(&student_id).await?;

    let mut applied_to = Vec::new();
    if date == today() {
        let mut sessions = state.sessions.lock().await;
        for (bus_id, session) in sessions.iter_mut() {
            if !session.state().is_active() || session.route_id() != Some(student.route_id.as_str()) {
                continue;
            }
            match session.apply_leave(&student_id, leave.reason.clone()) {
                Ok(_) => applied_to.push(bus_id.clone()),
                Err(err) => tracing::warn!("Leave {} not applied on bus {bus_id}: {err}", leave.leave_id),
            }
        }
    }

    Ok((StatusCode::CREATED, Json(LeaveResponse { leave, applied_to })))
}
