use crate::batch::{run_batched, BatchProducer, ProgressFn};
use crate::gemini::{parse_structured, GeminiError, ModelGateway};
use crate::models::{ScriptRequest, StoryScene, CLIP_SECONDS, SCENE_BATCH_SIZE};
use crate::templates;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

fn story_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "scene_number": {"type": "INTEGER"},
                "description": {"type": "STRING"},
            },
            "required": ["scene_number", "description"],
        },
    })
}

struct StoryProducer<'a> {
    gateway: &'a dyn ModelGateway,
    request: &'a ScriptRequest,
    total_scenes: usize,
    cancel: &'a CancellationToken,
}

#[async_trait]
impl BatchProducer<StoryScene> for StoryProducer<'_> {
    async fn produce(
        &self,
        start: usize,
        count: usize,
        done: &[StoryScene],
    ) -> Result<Vec<StoryScene>, GeminiError> {
        let start_scene = start as u32 + 1;
        let end_scene = (start + count) as u32;
        let prompt = templates::story_batch(
            self.request,
            self.total_scenes,
            start_scene,
            end_scene,
            done,
        );
        let raw = self.gateway.generate_json(&prompt, story_schema(), self.cancel).await?;
        let mut scenes: Vec<StoryScene> = parse_structured(raw)?;

        // The prompt pins the window size, but cardinality is an invariant
        // and not left to the model: a short batch would leave a hole in the
        // numbering, extras would run past the requested range.
        if scenes.len() < count {
            return Err(GeminiError::MalformedResponse(format!(
                "model returned {} scenes for a window of {count}",
                scenes.len()
            )));
        }
        scenes.truncate(count);

        // Numbering is likewise overwritten, never trusted.
        for (i, scene) in scenes.iter_mut().enumerate() {
            scene.scene_number = start_scene + i as u32;
        }
        Ok(scenes)
    }

    fn status(&self, completed: usize, total: usize) -> String {
        format!("Step 1/3: writing the story... (scene {completed}/{total})")
    }
}

/// Generate the full scene sequence for the request's target duration, one
/// batch at a time, carrying already-written scenes forward as context.
pub async fn generate_story(
    gateway: &dyn ModelGateway,
    request: &ScriptRequest,
    on_progress: ProgressFn<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<StoryScene>, GeminiError> {
    let total_scenes = request.total_seconds().div_ceil(CLIP_SECONDS) as usize;
    info!("📖 generating story: {total_scenes} scenes for {}s", request.total_seconds());

    let producer = StoryProducer { gateway, request, total_scenes, cancel };
    run_batched(total_scenes, SCENE_BATCH_SIZE, &producer, cancel, on_progress).await
}
