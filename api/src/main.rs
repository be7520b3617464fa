use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use glossa_lib::debounce::DEFAULT_QUIET;
use glossa_lib::filter::filter_words;
use glossa_lib::{
    AppState, ClickOrigin, Config, EntryRow, FilterState, FilterWord, Fragment, GlossaError,
    PointerTarget, Rect, SaveOutcome, TooltipStack, Viewport,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

type SharedState = Arc<RwLock<AppState>>;
type ApiError = (StatusCode, Json<ErrorResponse>);

/// Upper bound for imported translation files.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const EXPORT_FILE_NAME: &str = "dictionary-translations.json";

// === Request/Response types ===

#[derive(Deserialize)]
struct TranslationBody {
    value: String,
}

#[derive(Deserialize)]
struct TextFilterBody {
    text: String,
}

#[derive(Deserialize)]
struct ClickRequest {
    origin: ClickOrigin,
    anchor: Rect,
    headword: String,
    viewport: Option<Viewport>,
}

#[derive(Deserialize)]
struct PointerRequest {
    target: PointerTarget,
}

#[derive(Deserialize)]
struct JumpQuery {
    q: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    entries: usize,
}

#[derive(Serialize)]
struct MeaningResponse {
    fragments: Vec<Fragment>,
    html: String,
}

#[derive(Serialize)]
struct CommitResponse {
    saved_to: SaveOutcome,
}

#[derive(Serialize)]
struct VisibilityResponse {
    visible: Vec<bool>,
}

#[derive(Serialize)]
struct ImportResponse {
    imported: usize,
}

#[derive(Serialize)]
struct PendingResponse {
    debounce_ms: u64,
}

#[derive(Serialize)]
struct PopupView {
    level: usize,
    headword: String,
    rect: Rect,
    html: String,
}

#[derive(Serialize)]
struct TooltipResponse {
    opened: Option<usize>,
    layers: Vec<PopupView>,
}

#[derive(Serialize)]
struct JumpResponse {
    id: String,
    headword: String,
}

#[derive(Serialize)]
struct CacheStats {
    entries: usize,
    capacity: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_status(e: &GlossaError) -> StatusCode {
    match e {
        GlossaError::Import(_) => StatusCode::BAD_REQUEST,
        GlossaError::NotFound(_) => StatusCode::NOT_FOUND,
        GlossaError::Other(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GlossaError::Storage(_) | GlossaError::Dataset(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: GlossaError) -> ApiError {
    (error_status(&e), Json(ErrorResponse { error: e.to_string() }))
}

fn read(state: &SharedState) -> Result<RwLockReadGuard<'_, AppState>, ApiError> {
    state
        .read()
        .map_err(|_| api_error(GlossaError::Other("Failed to acquire state lock".to_string())))
}

fn write(state: &SharedState) -> Result<RwLockWriteGuard<'_, AppState>, ApiError> {
    state
        .write()
        .map_err(|_| api_error(GlossaError::Other("Failed to acquire state lock".to_string())))
}

fn tooltip_view(stack: &TooltipStack, opened: Option<usize>) -> TooltipResponse {
    TooltipResponse {
        opened,
        layers: stack
            .visible()
            .map(|p| PopupView {
                level: p.level,
                headword: p.headword.clone(),
                rect: p.rect,
                html: p.content.to_html(),
            })
            .collect(),
    }
}

// === Handlers ===

async fn health(State(state): State<SharedState>) -> Result<Json<HealthResponse>, ApiError> {
    let app = read(&state)?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        entries: app.entries().len(),
    }))
}

async fn list_entries(State(state): State<SharedState>) -> Result<Json<Vec<EntryRow>>, ApiError> {
    Ok(Json(read(&state)?.rows()))
}

async fn get_meaning(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MeaningResponse>, ApiError> {
    let app = read(&state)?;
    let fragments = app
        .render_entry(&id)
        .ok_or_else(|| api_error(GlossaError::NotFound(format!("Entry {}", id))))?;
    Ok(Json(MeaningResponse {
        html: glossa_lib::render::to_html(&fragments),
        fragments: (*fragments).clone(),
    }))
}

async fn commit_translation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<TranslationBody>,
) -> Result<Json<CommitResponse>, ApiError> {
    let saved_to = write(&state)?
        .commit_translation(&id, &body.value)
        .map_err(api_error)?;
    Ok(Json(CommitResponse { saved_to }))
}

async fn draft_translation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<TranslationBody>,
) -> Result<Json<VisibilityResponse>, ApiError> {
    let mut app = write(&state)?;
    app.set_draft(&id, &body.value).map_err(api_error)?;
    Ok(Json(VisibilityResponse {
        visible: app.visibility().to_vec(),
    }))
}

async fn export_translations(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let json = read(&state)?.export_json();
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        Body::from(json),
    )
        .into_response())
}

async fn import_translations(
    State(state): State<SharedState>,
    body: String,
) -> Result<Json<ImportResponse>, ApiError> {
    let imported = write(&state)?.import_json(&body).map_err(api_error)?;
    tracing::info!("Imported {} translations", imported);
    Ok(Json(ImportResponse { imported }))
}

async fn set_filter(
    State(state): State<SharedState>,
    Json(filter): Json<FilterState>,
) -> Result<Json<VisibilityResponse>, ApiError> {
    let mut app = write(&state)?;
    let visible = app.set_filter(filter).to_vec();
    Ok(Json(VisibilityResponse { visible }))
}

/// Search-as-you-type input. Only the last keystroke of a burst is
/// applied, once input has been quiet for the debounce period.
async fn text_filter(
    State(state): State<SharedState>,
    Json(body): Json<TextFilterBody>,
) -> Result<(StatusCode, Json<PendingResponse>), ApiError> {
    let due = write(&state)?.push_text_filter(body.text, Instant::now());

    let state = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep_until(due.into()).await;
        if let Ok(mut app) = state.write() {
            if app.poll_text_filter(Instant::now()) {
                tracing::debug!("Applied debounced text filter {:?}", app.filter().text);
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(PendingResponse {
            debounce_ms: DEFAULT_QUIET.as_millis() as u64,
        }),
    ))
}

/// Search button: apply pending text input now.
async fn apply_text_filter(
    State(state): State<SharedState>,
) -> Result<Json<VisibilityResponse>, ApiError> {
    let mut app = write(&state)?;
    app.flush_text_filter();
    Ok(Json(VisibilityResponse {
        visible: app.visibility().to_vec(),
    }))
}

async fn get_filter_words() -> Json<Vec<FilterWord>> {
    Json(filter_words())
}

async fn tooltip_click(
    State(state): State<SharedState>,
    Json(req): Json<ClickRequest>,
) -> Result<Json<TooltipResponse>, ApiError> {
    let mut app = write(&state)?;
    if let Some(viewport) = req.viewport {
        app.set_viewport(viewport);
    }
    let opened = app.click(req.origin, req.anchor, &req.headword);
    Ok(Json(tooltip_view(app.tooltips(), opened)))
}

async fn tooltip_pointer(
    State(state): State<SharedState>,
    Json(req): Json<PointerRequest>,
) -> Result<Json<TooltipResponse>, ApiError> {
    let mut app = write(&state)?;
    app.pointer(req.target);
    Ok(Json(tooltip_view(app.tooltips(), None)))
}

async fn get_tooltips(State(state): State<SharedState>) -> Result<Json<TooltipResponse>, ApiError> {
    Ok(Json(tooltip_view(read(&state)?.tooltips(), None)))
}

async fn jump(
    State(state): State<SharedState>,
    Query(params): Query<JumpQuery>,
) -> Result<Json<Option<JumpResponse>>, ApiError> {
    let app = read(&state)?;
    Ok(Json(app.jump(&params.q).map(|e| JumpResponse {
        id: e.id.to_string(),
        headword: e.headword.clone(),
    })))
}

async fn reload(State(state): State<SharedState>) -> Result<Json<HealthResponse>, ApiError> {
    let entries = write(&state)?.reload().map_err(api_error)?;
    Ok(Json(HealthResponse {
        status: "reloaded".to_string(),
        entries,
    }))
}

async fn cache_stats(State(state): State<SharedState>) -> Result<Json<CacheStats>, ApiError> {
    let (entries, capacity) = read(&state)?.cache_stats();
    Ok(Json(CacheStats { entries, capacity }))
}

async fn clear_cache(State(state): State<SharedState>) -> Result<StatusCode, ApiError> {
    read(&state)?.clear_cache();
    Ok(StatusCode::NO_CONTENT)
}

fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/entries", get(list_entries))
        .route("/entries/:id/meaning", get(get_meaning))
        .route("/translations/export", get(export_translations))
        .route("/translations/import", post(import_translations))
        .route("/translations/:id", put(commit_translation))
        .route("/translations/:id/draft", put(draft_translation))
        .route("/filter", post(set_filter))
        .route("/filter/text", post(text_filter))
        .route("/filter/text/apply", post(apply_text_filter))
        .route("/filter/words", get(get_filter_words))
        .route("/tooltip", get(get_tooltips))
        .route("/tooltip/click", post(tooltip_click))
        .route("/tooltip/dismiss", post(tooltip_pointer))
        .route("/search/jump", get(jump))
        .route("/reload", post(reload))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(clear_cache))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    tracing::info!("Using data directory {:?}", config.data_dir);

    let app_state = AppState::new(&config)?;
    let state: SharedState = Arc::new(RwLock::new(app_state));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on http://{}", config.bind_addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glossa_lib::{MemoryStore, TranslationStore};

    fn state() -> AppState {
        let store = TranslationStore::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()));
        let mut app = AppState::with_store(store, 8);
        app.load_dataset("h,m\nbird,an animal\nwing,part of a bird\n");
        app
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            error_status(&GlossaError::Import("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&GlossaError::NotFound("e9".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&GlossaError::Storage("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_tooltip_view_lists_open_layers() {
        let mut app = state();
        let anchor = Rect::new(0.0, 0.0, 10.0, 10.0);
        app.click(ClickOrigin::Table, anchor, "wing");
        app.click(ClickOrigin::Layer(0), anchor, "bird");

        let view = tooltip_view(app.tooltips(), Some(1));
        assert_eq!(view.opened, Some(1));
        let headwords: Vec<&str> = view.layers.iter().map(|l| l.headword.as_str()).collect();
        assert_eq!(headwords, vec!["wing", "bird"]);
        assert!(view.layers[0].html.contains("data-headword=\"bird\""));
    }
}
