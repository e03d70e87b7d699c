use axum::{extract::State, http::StatusCode, Json};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::gemini::{ChatReply, GeminiClient, GeminiError};
use crate::models::{ChatMessage, ScriptRequest};
use crate::pipeline::{PipelineState, ScriptPipeline};
use crate::seo;

#[derive(Clone)]
pub struct AppState {
    pub gemini: Arc<GeminiClient>,
    pub pipeline: Arc<ScriptPipeline>,
}

type ApiError = (StatusCode, String);

/// Longest film a single run will script (one hour, 450 clips).
const MAX_DURATION_SECONDS: u32 = 3600;

fn validate_duration(total_seconds: u32) -> Result<(), ApiError> {
    // The batch runner treats zero units as instant success; a zero-duration
    // request is caller error and stops here. The upper bound keeps one
    // request from queueing an unbounded number of remote calls.
    if total_seconds == 0 {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, "target duration is zero".into()));
    }
    if total_seconds > MAX_DURATION_SECONDS {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("target duration exceeds {MAX_DURATION_SECONDS} seconds"),
        ));
    }
    Ok(())
}

fn gemini_error(e: GeminiError) -> ApiError {
    let status = match e {
        GeminiError::InvalidCredential => StatusCode::UNAUTHORIZED,
        GeminiError::MalformedResponse(_) | GeminiError::Transport(_) => StatusCode::BAD_GATEWAY,
        GeminiError::Cancelled => StatusCode::CONFLICT,
    };
    (status, e.to_string())
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct KeyResponse {
    pub configured: bool,
}

/// Validate a candidate credential with a minimal live call, then store it
/// for all subsequent generation calls.
pub async fn configure_key(
    State(state): State<AppState>,
    Json(body): Json<KeyRequest>,
) -> Result<Json<KeyResponse>, ApiError> {
    if !state.gemini.validate_key(&body.key, &CancellationToken::new()).await {
        return Err((StatusCode::UNAUTHORIZED, "API key failed validation".into()));
    }
    state.gemini.configure(body.key).map_err(gemini_error)?;
    tracing::info!("✅ API key configured");
    Ok(Json(KeyResponse { configured: true }))
}

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    pub history: Vec<ChatMessage>,
}

/// One turn of the idea-gathering conversation.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatTurnRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    for message in &body.history {
        for image in &message.images {
            if base64::engine::general_purpose::STANDARD.decode(&image.data).is_err() {
                return Err((
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "image data is not valid base64".into(),
                ));
            }
        }
    }
    let reply = state
        .gemini
        .chat(&body.history, &CancellationToken::new())
        .await
        .map_err(gemini_error)?;
    Ok(Json(reply))
}

pub async fn script_state(State(state): State<AppState>) -> Json<PipelineState> {
    Json(state.pipeline.snapshot())
}

/// Kick off a new run. The stage runs on its own task; poll
/// `GET /api/script/state` for progress. Re-entry while a run is active is a
/// silent no-op in the state machine.
pub async fn start_script(
    State(state): State<AppState>,
    Json(body): Json<ScriptRequest>,
) -> Result<(StatusCode, Json<PipelineState>), ApiError> {
    if !state.gemini.is_configured() {
        return Err(gemini_error(GeminiError::InvalidCredential));
    }
    validate_duration(body.total_seconds())?;
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move { pipeline.start_generation(body).await });
    Ok((StatusCode::ACCEPTED, Json(state.pipeline.snapshot())))
}

pub async fn advance_guide(
    State(state): State<AppState>,
) -> (StatusCode, Json<PipelineState>) {
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move { pipeline.advance_to_guide().await });
    (StatusCode::ACCEPTED, Json(state.pipeline.snapshot()))
}

pub async fn advance_prompts(
    State(state): State<AppState>,
) -> (StatusCode, Json<PipelineState>) {
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move { pipeline.advance_to_prompts().await });
    (StatusCode::ACCEPTED, Json(state.pipeline.snapshot()))
}

pub async fn cancel_script(State(state): State<AppState>) -> Json<PipelineState> {
    state.pipeline.cancel();
    Json(state.pipeline.snapshot())
}

pub async fn reset_script(State(state): State<AppState>) -> Json<PipelineState> {
    state.pipeline.reset();
    Json(state.pipeline.snapshot())
}

// --- SEO / thumbnail artifacts ---

fn story_and_guide(
    state: &AppState,
) -> Result<(Vec<crate::models::StoryScene>, crate::models::ConsistencyGuide), ApiError> {
    let snapshot = state.pipeline.snapshot();
    match (snapshot.story.is_empty(), snapshot.guide) {
        (false, Some(guide)) => Ok((snapshot.story, guide)),
        _ => Err((
            StatusCode::CONFLICT,
            "SEO artifacts need a completed story and consistency guide".into(),
        )),
    }
}

fn three(texts: Vec<String>) -> [String; 3] {
    let mut out: [String; 3] = Default::default();
    for (slot, text) in out.iter_mut().zip(texts) {
        *slot = text;
    }
    out
}

#[derive(Debug, Serialize)]
pub struct TitlesResponse {
    pub titles: Vec<String>,
}

pub async fn seo_titles(State(state): State<AppState>) -> Result<Json<TitlesResponse>, ApiError> {
    let (story, guide) = story_and_guide(&state)?;
    let titles = seo::titles(state.gemini.as_ref(), &story, &guide, &CancellationToken::new())
        .await
        .map_err(gemini_error)?;
    Ok(Json(TitlesResponse { titles }))
}

#[derive(Debug, Serialize)]
pub struct DescriptionResponse {
    pub description: String,
}

pub async fn seo_description(
    State(state): State<AppState>,
) -> Result<Json<DescriptionResponse>, ApiError> {
    let (story, guide) = story_and_guide(&state)?;
    let description =
        seo::description(state.gemini.as_ref(), &story, &guide, &CancellationToken::new())
            .await
            .map_err(gemini_error)?;
    Ok(Json(DescriptionResponse { description }))
}

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    pub tags: String,
}

pub async fn seo_tags(State(state): State<AppState>) -> Result<Json<TagsResponse>, ApiError> {
    let (story, guide) = story_and_guide(&state)?;
    let tags = seo::tags(state.gemini.as_ref(), &story, &guide, &CancellationToken::new())
        .await
        .map_err(gemini_error)?;
    Ok(Json(TagsResponse { tags }))
}

#[derive(Debug, Deserialize)]
pub struct ThumbnailTextsRequest {
    #[serde(default)]
    pub texts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ThumbnailTextsResponse {
    pub texts: Vec<String>,
}

pub async fn thumbnail_texts(
    State(state): State<AppState>,
    Json(body): Json<ThumbnailTextsRequest>,
) -> Result<Json<ThumbnailTextsResponse>, ApiError> {
    let (story, guide) = story_and_guide(&state)?;
    let texts = seo::thumbnail_texts(
        state.gemini.as_ref(),
        &story,
        &guide,
        &three(body.texts),
        &CancellationToken::new(),
    )
    .await
    .map_err(gemini_error)?;
    Ok(Json(ThumbnailTextsResponse { texts }))
}

#[derive(Debug, Deserialize)]
pub struct ThumbnailPromptsRequest {
    #[serde(default)]
    pub texts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ThumbnailPromptsResponse {
    pub prompts: Vec<String>,
}

pub async fn thumbnail_prompts(
    State(state): State<AppState>,
    Json(body): Json<ThumbnailPromptsRequest>,
) -> Result<Json<ThumbnailPromptsResponse>, ApiError> {
    let (story, guide) = story_and_guide(&state)?;
    let prompts = seo::thumbnail_prompts(
        state.gemini.as_ref(),
        &story,
        &guide,
        &three(body.texts),
        &CancellationToken::new(),
    )
    .await
    .map_err(gemini_error)?;
    Ok(Json(ThumbnailPromptsResponse { prompts }))
}
