use crate::compile;
use crate::gemini::{GeminiError, ModelGateway};
use crate::guide;
use crate::models::{CompiledPrompt, ConsistencyGuide, ScriptRequest, StoryScene};
use crate::story;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    GeneratingStory,
    StoryComplete,
    GeneratingGuide,
    GuideComplete,
    GeneratingPrompts,
    Complete,
    Error,
}

/// The single mutable aggregate of a generation run. Owned exclusively by
/// [`ScriptPipeline`]; every mutation goes through [`PipelineState::apply`]
/// with a named [`Transition`], never ad hoc field writes.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub stage: Stage,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub request: Option<ScriptRequest>,
    pub story: Vec<StoryScene>,
    pub guide: Option<ConsistencyGuide>,
    pub results: Vec<CompiledPrompt>,
    /// Identity of the run that owns this state; commits from a superseded
    /// run carry a stale id and are dropped.
    pub run_id: Option<Uuid>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    pub fn initial() -> Self {
        Self {
            stage: Stage::Idle,
            progress: 0,
            message: String::new(),
            error: None,
            request: None,
            story: Vec::new(),
            guide: None,
            results: Vec::new(),
            run_id: None,
            cancel: None,
            updated_at: Utc::now(),
        }
    }

    /// Apply a transition, returning the next state.
    pub fn apply(self, transition: Transition) -> Self {
        let mut next = match transition {
            Transition::Start { request, run_id, cancel } => Self {
                stage: Stage::GeneratingStory,
                message: "Starting generation...".into(),
                request: Some(request),
                run_id: Some(run_id),
                cancel: Some(cancel),
                ..Self::initial()
            },
            Transition::BeginGuide => Self {
                stage: Stage::GeneratingGuide,
                progress: 0,
                message: "Step 2/3: analyzing characters and setting...".into(),
                ..self
            },
            Transition::BeginPrompts => Self {
                stage: Stage::GeneratingPrompts,
                progress: 0,
                message: "Step 3/3: compiling clip prompts...".into(),
                ..self
            },
            Transition::Progress { percent, message } => Self {
                progress: percent,
                message,
                ..self
            },
            Transition::StoryReady(story) => Self {
                stage: Stage::StoryComplete,
                story,
                progress: 100,
                message: "Story is ready for review.".into(),
                ..self
            },
            Transition::GuideReady(guide) => Self {
                stage: Stage::GuideComplete,
                guide: Some(guide),
                progress: 100,
                message: "Analysis complete. Ready to compile prompts.".into(),
                ..self
            },
            Transition::PromptsReady(results) => Self {
                stage: Stage::Complete,
                results,
                progress: 100,
                message: "Done!".into(),
                cancel: None,
                ..self
            },
            Transition::Failed(message) => Self {
                stage: Stage::Error,
                error: Some(message),
                cancel: None,
                ..self
            },
            Transition::Cancelled => Self {
                stage: Stage::Error,
                error: Some("Generation was cancelled by user.".into()),
                cancel: None,
                ..self
            },
            Transition::Reset => Self::initial(),
        };
        next.updated_at = Utc::now();
        next
    }
}

#[derive(Debug)]
pub enum Transition {
    Start {
        request: ScriptRequest,
        run_id: Uuid,
        cancel: CancellationToken,
    },
    BeginGuide,
    BeginPrompts,
    Progress { percent: u8, message: String },
    StoryReady(Vec<StoryScene>),
    GuideReady(ConsistencyGuide),
    PromptsReady(Vec<CompiledPrompt>),
    Failed(String),
    Cancelled,
    Reset,
}

/// Orchestrating controller: sequences story → guide → prompts, holds the one
/// live cancellation handle, and is the single place that classifies
/// cancellation against other failures.
pub struct ScriptPipeline {
    gateway: Arc<dyn ModelGateway>,
    state: RwLock<PipelineState>,
}

impl ScriptPipeline {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            gateway,
            state: RwLock::new(PipelineState::initial()),
        }
    }

    pub fn snapshot(&self) -> PipelineState {
        self.state.read().clone()
    }

    /// Commit a transition on behalf of `run_id`. Dropped silently when the
    /// state has since been reset or restarted under a different run.
    fn commit(&self, run_id: Uuid, transition: Transition) {
        let mut state = self.state.write();
        if state.run_id != Some(run_id) {
            debug!("dropping stale transition from superseded run {run_id}");
            return;
        }
        *state = state.clone().apply(transition);
    }

    fn finish(&self, run_id: Uuid, outcome: Result<Transition, GeminiError>) {
        match outcome {
            Ok(transition) => self.commit(run_id, transition),
            Err(GeminiError::Cancelled) => {
                info!("🛑 run {run_id} cancelled");
                self.commit(run_id, Transition::Cancelled);
            }
            Err(e) => {
                warn!("❌ run {run_id} failed: {e}");
                self.commit(run_id, Transition::Failed(format!("Generation failed: {e}")));
            }
        }
    }

    /// Start a new run with a fresh cancellation handle and run the story
    /// stage. Silent no-op while a run is already active (the live handle is
    /// the re-entry guard; terminal states clear it).
    pub async fn start_generation(&self, request: ScriptRequest) {
        let (run_id, cancel) = {
            let mut state = self.state.write();
            if state.cancel.is_some() {
                info!("start_generation ignored: a run is already active");
                return;
            }
            let run_id = Uuid::new_v4();
            let cancel = CancellationToken::new();
            *state = state.clone().apply(Transition::Start {
                request: request.clone(),
                run_id,
                cancel: cancel.clone(),
            });
            (run_id, cancel)
        };
        info!("🚀 run {run_id}: story stage started");

        let on_progress = |percent: u8, message: &str| {
            self.commit(run_id, Transition::Progress { percent, message: message.into() });
        };
        let result =
            story::generate_story(self.gateway.as_ref(), &request, &on_progress, &cancel).await;
        self.finish(run_id, result.map(Transition::StoryReady));
    }

    /// Distill the consistency guide. Silent no-op unless scenes exist and
    /// the run's cancellation handle is still live.
    pub async fn advance_to_guide(&self) {
        let (run_id, cancel, scenes) = {
            let mut state = self.state.write();
            let (Some(run_id), Some(cancel)) = (state.run_id, state.cancel.clone()) else {
                return;
            };
            if state.story.is_empty() {
                return;
            }
            *state = state.clone().apply(Transition::BeginGuide);
            (run_id, cancel, state.story.clone())
        };
        info!("🧭 run {run_id}: guide stage started");

        let result = guide::generate_guide(self.gateway.as_ref(), &scenes, &cancel).await;
        self.finish(run_id, result.map(Transition::GuideReady));
    }

    /// Compile the clip prompts and finish the run. Silent no-op unless
    /// request, scenes and guide are all present under a live handle.
    pub async fn advance_to_prompts(&self) {
        let (run_id, cancel, request, scenes, style_guide) = {
            let mut state = self.state.write();
            let (Some(run_id), Some(cancel), Some(request), Some(style_guide)) = (
                state.run_id,
                state.cancel.clone(),
                state.request.clone(),
                state.guide.clone(),
            ) else {
                return;
            };
            if state.story.is_empty() {
                return;
            }
            *state = state.clone().apply(Transition::BeginPrompts);
            (run_id, cancel, request, state.story.clone(), style_guide)
        };
        info!("🎬 run {run_id}: prompt stage started");

        let on_progress = |percent: u8, message: &str| {
            self.commit(run_id, Transition::Progress { percent, message: message.into() });
        };
        let result = compile::compile_prompts(
            self.gateway.as_ref(),
            &request,
            &scenes,
            &style_guide,
            &on_progress,
            &cancel,
        )
        .await;
        self.finish(run_id, result.map(Transition::PromptsReady));
    }

    /// Trigger the live cancellation handle, if any. Takes effect at the next
    /// check point inside the batch runner or the gateway, not immediately.
    pub fn cancel(&self) {
        if let Some(token) = &self.state.read().cancel {
            info!("cancellation requested");
            token.cancel();
        }
    }

    /// Return to the initial empty state. Does not trigger cancellation of
    /// in-flight work; a stale run's commits are dropped by the run-id guard.
    pub fn reset(&self) {
        let mut state = self.state.write();
        *state = state.clone().apply(Transition::Reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, ChatRole, CLIP_SECONDS};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    /// Scripted gateway: answers story, guide and clip calls from the schema
    /// each call declares, mirroring the contract of the real client.
    struct FakeGateway {
        cancel_during_story: bool,
        fail_guide: bool,
    }

    impl FakeGateway {
        fn well_behaved() -> Self {
            Self { cancel_during_story: false, fail_guide: false }
        }
    }

    fn scene_range(prompt: &str) -> (u32, u32) {
        let rest = &prompt[prompt.find("from scene ").unwrap() + "from scene ".len()..];
        let mut numbers = rest
            .split(|c: char| !c.is_ascii_digit())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<u32>().unwrap());
        (numbers.next().unwrap(), numbers.next().unwrap())
    }

    fn clip_value() -> Value {
        json!({
            "scene_summary": "a beat",
            "video_prompt": {
                "scene_id": "bogus",
                "objective_in_scene": "obj",
                "duration": 99,
                "style": "cinematic",
                "setting": {"location": "rooftop", "time_of_day": "dawn", "environment_details": "wind"},
                "camera": {"opening_frame": "low angle", "movement": "dolly", "angle": "low", "shot_type": "wide"},
                "visual_sequence": [{"time_range": "0-8s", "description": "it happens"}],
                "characters": [],
                "audio": {"ambient_sound": "wind"},
                "aspect_ratio": "1:1",
                "transition_from_previous": "match cut",
            },
        })
    }

    #[async_trait]
    impl ModelGateway for FakeGateway {
        async fn generate_json(
            &self,
            prompt: &str,
            schema: Value,
            cancel: &CancellationToken,
        ) -> Result<Value, GeminiError> {
            if cancel.is_cancelled() {
                return Err(GeminiError::Cancelled);
            }
            if schema["type"] == "OBJECT" {
                if self.fail_guide {
                    return Err(GeminiError::Transport("connection reset".into()));
                }
                return Ok(json!({
                    "charactersAndAppearance": "a boy in a red scarf",
                    "settingAndMood": "rooftops at dawn",
                    "keyObjectsAndStyle": "paper planes",
                }));
            }
            if schema["items"]["properties"].get("video_prompt").is_some() {
                let count = prompt.matches("(Objective:").count();
                return Ok(Value::Array((0..count).map(|_| clip_value()).collect()));
            }
            // Story batch.
            if self.cancel_during_story {
                cancel.cancel();
            }
            let (start, end) = scene_range(prompt);
            Ok(Value::Array(
                (start..=end)
                    .map(|i| json!({"scene_number": i, "description": format!("beat {i}")}))
                    .collect(),
            ))
        }
    }

    fn request(seconds: u32) -> ScriptRequest {
        ScriptRequest {
            chat_history: vec![ChatMessage {
                role: ChatRole::User,
                text: "a boy who dreams of flying".into(),
                images: vec![],
            }],
            minutes: 0,
            seconds,
            aspect_ratio: "16:9 (Landscape)".into(),
            generate_image_prompts: false,
        }
    }

    fn pipeline(gateway: FakeGateway) -> ScriptPipeline {
        ScriptPipeline::new(Arc::new(gateway))
    }

    #[tokio::test]
    async fn sixteen_second_request_runs_the_full_pipeline() {
        let p = pipeline(FakeGateway::well_behaved());

        // ceil(16 / 8) = 2 scenes in one batch.
        p.start_generation(request(16)).await;
        let s = p.snapshot();
        assert_eq!(s.stage, Stage::StoryComplete);
        assert_eq!(s.progress, 100);
        assert_eq!(
            s.story.iter().map(|sc| sc.scene_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(s.cancel.is_some(), "handle stays live between stages");

        p.advance_to_guide().await;
        let s = p.snapshot();
        assert_eq!(s.stage, Stage::GuideComplete);
        assert!(s.guide.is_some());

        p.advance_to_prompts().await;
        let s = p.snapshot();
        assert_eq!(s.stage, Stage::Complete);
        assert_eq!(s.results.len(), 2);
        assert_eq!(s.results[0].video_prompt.scene_id, "scene_01");
        assert_eq!(s.results[0].video_prompt.transition_from_previous, compile::FADE_IN);
        assert_eq!(s.results[1].video_prompt.transition_from_previous, compile::HARD_CUT);
        assert!(s.results.iter().all(|r| r.video_prompt.duration == CLIP_SECONDS));
        assert!(s.cancel.is_none(), "finished run clears the handle");
        assert!(s.error.is_none());
    }

    #[tokio::test]
    async fn guide_advance_before_scenes_is_a_no_op() {
        let p = pipeline(FakeGateway::well_behaved());
        let before = p.snapshot();
        p.advance_to_guide().await;
        let after = p.snapshot();
        assert_eq!(after.stage, Stage::Idle);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn prompts_advance_without_guide_is_a_no_op() {
        let p = pipeline(FakeGateway::well_behaved());
        p.start_generation(request(16)).await;
        p.advance_to_prompts().await;
        assert_eq!(p.snapshot().stage, Stage::StoryComplete);
    }

    #[tokio::test]
    async fn restart_while_a_run_is_active_is_a_no_op() {
        let p = pipeline(FakeGateway::well_behaved());
        p.start_generation(request(16)).await;
        let first = p.snapshot();

        p.start_generation(request(240)).await;
        let second = p.snapshot();
        assert_eq!(second.run_id, first.run_id);
        assert_eq!(second.story.len(), 2);
    }

    #[tokio::test]
    async fn cancellation_mid_run_ends_in_error_without_partial_commit() {
        let p = pipeline(FakeGateway { cancel_during_story: true, fail_guide: false });

        // 60s -> 8 scenes -> two batches; the first batch trips the token, so
        // the second never starts and nothing is committed.
        p.start_generation(request(60)).await;
        let s = p.snapshot();
        assert_eq!(s.stage, Stage::Error);
        assert!(s.story.is_empty());
        assert!(s.error.unwrap().contains("cancelled"));
        assert!(s.cancel.is_none());
    }

    #[tokio::test]
    async fn stage_failure_is_classified_as_error_not_cancellation() {
        let p = pipeline(FakeGateway { cancel_during_story: false, fail_guide: true });
        p.start_generation(request(16)).await;
        p.advance_to_guide().await;

        let s = p.snapshot();
        assert_eq!(s.stage, Stage::Error);
        let message = s.error.unwrap();
        assert!(message.contains("Generation failed"));
        assert!(!message.contains("cancelled"));
        // Story survives in state for inspection; only reset clears it.
        assert_eq!(s.story.len(), 2);
        assert!(s.cancel.is_none());
    }

    #[tokio::test]
    async fn reset_returns_to_initial_and_drops_stale_commits() {
        let p = pipeline(FakeGateway::well_behaved());
        p.start_generation(request(16)).await;
        let run_id = p.snapshot().run_id.unwrap();

        p.reset();
        let s = p.snapshot();
        assert_eq!(s.stage, Stage::Idle);
        assert!(s.story.is_empty() && s.request.is_none() && s.run_id.is_none());

        // A late commit from the old run must not resurrect state.
        p.commit(run_id, Transition::Failed("late".into()));
        assert_eq!(p.snapshot().stage, Stage::Idle);
    }

    #[tokio::test]
    async fn error_state_allows_a_fresh_start() {
        let p = pipeline(FakeGateway { cancel_during_story: true, fail_guide: false });
        p.start_generation(request(60)).await;
        assert_eq!(p.snapshot().stage, Stage::Error);
        let first_run = p.snapshot().run_id;

        // Terminal states cleared the handle, so a new run begins without an
        // explicit reset.
        p.start_generation(request(60)).await;
        let s = p.snapshot();
        assert_ne!(s.run_id, first_run);
    }

    #[test]
    fn progress_transition_only_touches_progress_fields() {
        let state = PipelineState::initial().apply(Transition::Start {
            request: request(16),
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        });
        let next = state.clone().apply(Transition::Progress {
            percent: 40,
            message: "Step 1/3".into(),
        });
        assert_eq!(next.progress, 40);
        assert_eq!(next.message, "Step 1/3");
        assert_eq!(next.stage, Stage::GeneratingStory);
        assert_eq!(next.run_id, state.run_id);
    }
}
