use crate::gemini::{parse_structured, GeminiError, ModelGateway};
use crate::models::{ConsistencyGuide, StoryScene};
use crate::templates;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

fn guide_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "charactersAndAppearance": {
                "type": "STRING",
                "description": "Main characters, appearance, clothing, consistent traits."
            },
            "settingAndMood": {
                "type": "STRING",
                "description": "Primary setting, atmosphere, mood, time of day."
            },
            "keyObjectsAndStyle": {
                "type": "STRING",
                "description": "Recurring objects, visual style, color palette, art direction."
            },
        },
        "required": ["charactersAndAppearance", "settingAndMood", "keyObjectsAndStyle"],
    })
}

/// Distill the finished story into a reusable style/character/setting guide.
/// Single call, no batching; failure propagates without retry.
pub async fn generate_guide(
    gateway: &dyn ModelGateway,
    story: &[StoryScene],
    cancel: &CancellationToken,
) -> Result<ConsistencyGuide, GeminiError> {
    info!("🧭 distilling consistency guide from {} scenes", story.len());
    let prompt = templates::consistency_guide(story);
    let raw = gateway.generate_json(&prompt, guide_schema(), cancel).await?;
    parse_structured(raw)
}
