use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use kick_proto::dashboard::{Dashboard, DashboardError, DashboardState, MultiStream, ScheduleView};
use kick_proto::fetcher::Fetcher;
use kick_proto::layout::{BoardError, DecodedLayout, Expiry, ShareBoard, WindowData, WindowUpdate};
use kick_proto::model::ScheduledStream;
use kick_proto::notify::{LiveNotification, NotificationPermission};
use kick_proto::prefs::{PrefsError, SavedLayout, UiFlags};
use kick_proto::schedule::{NewSchedule, ScheduleSort};
use kick_proto::timefmt;
use kick_proto::views::{ChannelFilter, FavoritesView, LinksView, LiveView, SortMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::logs::{LogLine, RecentLogs};

#[derive(Clone)]
pub struct HttpState {
    pub dashboard: Arc<Dashboard>,
    pub fetcher: Arc<Fetcher>,
    pub logs: RecentLogs,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Dashboard(#[from] DashboardError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Dashboard(e) => match e {
                DashboardError::Prefs(PrefsError::PermissionNotGranted) => StatusCode::FORBIDDEN,
                DashboardError::Prefs(PrefsError::EmptyLayoutName) => StatusCode::BAD_REQUEST,
                DashboardError::Prefs(PrefsError::UnknownLayout(_)) => StatusCode::NOT_FOUND,
                DashboardError::Prefs(PrefsError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
                DashboardError::Layout(_) => StatusCode::BAD_REQUEST,
                DashboardError::Board(BoardError::NoLiveChannels) => StatusCode::CONFLICT,
                DashboardError::Board(BoardError::UnknownWindow(_)) => StatusCode::NOT_FOUND,
                DashboardError::UnknownChannel(_) | DashboardError::UnknownSchedule(_) => {
                    StatusCode::NOT_FOUND
                }
                DashboardError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        if status.is_server_error() {
            error!("HTTP API: {}", self);
        } else {
            warn!("HTTP API: {}", self);
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/channels", get(get_channels))
        .route("/api/refresh", post(refresh))
        .route("/api/schedule", get(get_schedule).post(add_schedule))
        .route("/api/schedule/:id", delete(delete_schedule))
        .route("/api/favorites", get(get_favorites).delete(clear_favorites))
        .route("/api/favorites/:username", post(toggle_favorite))
        .route("/api/notifications", get(get_notifications))
        .route("/api/notifications/:username/:enabled", put(set_notification))
        .route("/api/notifications-all/:enabled", put(set_all_notifications))
        .route("/api/alerts", get(get_alerts))
        .route("/api/alerts/:tag", delete(dismiss_alert))
        .route("/api/multistream", post(multistream))
        .route("/api/links", get(get_links))
        .route("/api/board", get(get_board))
        .route("/api/board/windows", post(add_window))
        .route(
            "/api/board/windows/:id",
            axum::routing::patch(update_window).delete(close_window),
        )
        .route("/api/board/windows/:id/front", post(bring_to_front))
        .route("/api/board/space", post(add_space))
        .route("/api/layouts/encode", post(encode_layout))
        .route("/api/layouts/decode", post(decode_layout))
        .route("/api/layouts", get(get_layouts).post(save_layout))
        .route("/api/layouts/:id", delete(delete_layout))
        .route("/api/ui", get(get_ui))
        .route("/api/ui/tutorial-dismissed", post(dismiss_tutorial))
        .route("/api/logs", get(get_logs))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: HttpState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

pub fn start_server(bind_address: String, port: u16, state: HttpState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = serve(listener, state).await {
            error!("HTTP server error: {}", e);
        }
    })
}

// ── Query helpers ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ChannelQuery {
    sort: Option<String>,
    q: Option<String>,
    /// Comma-separated.
    tags: Option<String>,
    view: Option<String>,
}

impl ChannelQuery {
    fn filter(&self) -> ChannelFilter {
        let tags = self
            .tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        ChannelFilter::new(self.q.clone().unwrap_or_default(), tags)
    }

    fn sort(&self) -> Result<SortMode, ApiError> {
        parse_or_default(self.sort.as_deref())
    }
}

fn parse_or_default<T>(value: Option<&str>) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = String> + Default,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse().map_err(ApiError::BadRequest),
        None => Ok(T::default()),
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

// ── Handlers ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiState {
    #[serde(flatten)]
    state: DashboardState,
    cycle: u64,
    refreshing: bool,
}

async fn get_state(State(state): State<HttpState>) -> Json<ApiState> {
    Json(ApiState {
        state: state.dashboard.state().await,
        cycle: state.fetcher.generation(),
        refreshing: state.fetcher.is_running(),
    })
}

#[derive(Serialize)]
struct ChannelsResponse {
    #[serde(flatten)]
    view: LiveView,
    /// Per username: "live since" phrasing when live, else last stream.
    times: BTreeMap<String, ChannelTimes>,
}

#[derive(Serialize)]
struct ChannelTimes {
    relative: String,
    absolute: String,
}

async fn get_channels(
    State(state): State<HttpState>,
    Query(query): Query<ChannelQuery>,
) -> ApiResult<ChannelsResponse> {
    let sort = query.sort()?;
    let now = now();
    let view = state.dashboard.live_view(&query.filter(), sort, now).await;
    let times = view
        .channels
        .iter()
        .map(|c| {
            let iso = if c.is_live {
                c.live_since.as_deref()
            } else {
                c.last_stream_start_time.as_deref()
            };
            let times = ChannelTimes {
                relative: timefmt::humanize_time(iso, now),
                absolute: timefmt::format_full_date_time(iso),
            };
            (c.username.clone(), times)
        })
        .collect();
    Ok(Json(ChannelsResponse { view, times }))
}

#[derive(Serialize)]
struct RefreshStatus {
    already_running: bool,
}

async fn refresh(State(state): State<HttpState>) -> (StatusCode, Json<RefreshStatus>) {
    info!("HTTP API: refresh requested");
    let already_running = state.fetcher.is_running();
    state.fetcher.trigger();
    (StatusCode::ACCEPTED, Json(RefreshStatus { already_running }))
}

#[derive(Debug, Default, Deserialize)]
struct ScheduleQuery {
    q: Option<String>,
    sort: Option<String>,
}

async fn get_schedule(
    State(state): State<HttpState>,
    Query(query): Query<ScheduleQuery>,
) -> ApiResult<ScheduleView> {
    let sort: ScheduleSort = parse_or_default(query.sort.as_deref())?;
    let q = query.q.unwrap_or_default();
    Ok(Json(state.dashboard.schedule(&q, sort, now()).await))
}

async fn add_schedule(
    State(state): State<HttpState>,
    Json(new): Json<NewSchedule>,
) -> Result<(StatusCode, Json<ScheduledStream>), ApiError> {
    let now = now();
    if new.start_time <= now {
        return Err(ApiError::BadRequest("start time must be in the future".into()));
    }
    let added = state.dashboard.add_schedule(new, now)?;
    info!("HTTP API: scheduled {} at {}", added.streamer_username, added.start_time);
    Ok((StatusCode::CREATED, Json(added)))
}

async fn delete_schedule(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.delete_schedule(&id, now())?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_favorites(State(state): State<HttpState>) -> Json<FavoritesView> {
    Json(state.dashboard.favorites(now()).await)
}

#[derive(Serialize)]
struct FavoriteStatus {
    username: String,
    favorite: bool,
}

async fn toggle_favorite(
    State(state): State<HttpState>,
    Path(username): Path<String>,
) -> ApiResult<FavoriteStatus> {
    let favorite = state.dashboard.toggle_favorite(&username).await?;
    Ok(Json(FavoriteStatus { username, favorite }))
}

async fn clear_favorites(State(state): State<HttpState>) -> Result<StatusCode, ApiError> {
    state.dashboard.clear_favorites().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct NotificationSettings {
    permission: NotificationPermission,
    channels: BTreeMap<String, bool>,
    any_enabled: bool,
}

async fn get_notifications(State(state): State<HttpState>) -> Json<NotificationSettings> {
    let channels = state.dashboard.notification_settings().await;
    Json(NotificationSettings {
        permission: state.dashboard.permission().await,
        any_enabled: channels.values().any(|v| *v),
        channels,
    })
}

async fn set_notification(
    State(state): State<HttpState>,
    Path((username, enabled)): Path<(String, bool)>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.set_notification(&username, enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_all_notifications(
    State(state): State<HttpState>,
    Path(enabled): Path<bool>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.set_all_notifications(enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_alerts(State(state): State<HttpState>) -> Json<Vec<LiveNotification>> {
    Json(state.dashboard.alerts().await)
}

async fn dismiss_alert(State(state): State<HttpState>, Path(tag): Path<String>) -> StatusCode {
    if state.dashboard.dismiss_alert(&tag).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Deserialize)]
struct MultiStreamRequest {
    selection: Vec<String>,
}

async fn multistream(
    State(state): State<HttpState>,
    Json(req): Json<MultiStreamRequest>,
) -> Json<MultiStream> {
    Json(state.dashboard.multistream(&req.selection).await)
}

#[derive(Serialize)]
struct LinksText {
    text: Option<String>,
}

async fn get_links(
    State(state): State<HttpState>,
    Query(query): Query<ChannelQuery>,
) -> ApiResult<LinksText> {
    let view: LinksView = parse_or_default(query.view.as_deref())?;
    let text = state
        .dashboard
        .copy_links(view, &query.filter(), now())
        .await;
    Ok(Json(LinksText { text }))
}

async fn get_board(State(state): State<HttpState>) -> Json<ShareBoard> {
    Json(state.dashboard.board().await)
}

async fn add_window(State(state): State<HttpState>) -> Result<(StatusCode, Json<WindowData>), ApiError> {
    let window = state.dashboard.add_window().await?;
    Ok((StatusCode::CREATED, Json(window)))
}

async fn update_window(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Json(update): Json<WindowUpdate>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.update_window(&id, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn close_window(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.close_window(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bring_to_front(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.bring_to_front(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_space(State(state): State<HttpState>) -> StatusCode {
    state.dashboard.add_space().await;
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct EncodeRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    expiry: Expiry,
}

#[derive(Serialize)]
struct EncodedLayout {
    code: String,
}

async fn encode_layout(
    State(state): State<HttpState>,
    Json(req): Json<EncodeRequest>,
) -> ApiResult<EncodedLayout> {
    let code = state
        .dashboard
        .encode_layout(&req.name, req.expiry, now())
        .await?;
    Ok(Json(EncodedLayout { code }))
}

#[derive(Deserialize)]
struct DecodeRequest {
    code: String,
}

async fn decode_layout(
    State(state): State<HttpState>,
    Json(req): Json<DecodeRequest>,
) -> ApiResult<DecodedLayout> {
    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("layout code is empty".into()));
    }
    Ok(Json(state.dashboard.apply_code(&req.code, now()).await?))
}

async fn get_layouts(State(state): State<HttpState>) -> Json<Vec<SavedLayout>> {
    Json(state.dashboard.saved_layouts().await)
}

#[derive(Deserialize)]
struct SaveLayoutRequest {
    name: String,
}

async fn save_layout(
    State(state): State<HttpState>,
    Json(req): Json<SaveLayoutRequest>,
) -> Result<(StatusCode, Json<SavedLayout>), ApiError> {
    let saved = state.dashboard.save_layout(&req.name, now()).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn delete_layout(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.delete_layout(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_ui(State(state): State<HttpState>) -> Json<UiFlags> {
    Json(state.dashboard.ui_flags().await)
}

async fn dismiss_tutorial(State(state): State<HttpState>) -> Result<StatusCode, ApiError> {
    state.dashboard.dismiss_tutorial().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_logs(State(state): State<HttpState>) -> Json<Vec<LogLine>> {
    Json(state.logs.snapshot())
}
