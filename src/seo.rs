//! Downstream SEO and thumbnail artifacts, generated from a finished story
//! and its consistency guide. All single-shot structured calls; none of them
//! touch pipeline state.

use crate::gemini::{parse_structured, GeminiError, ModelGateway};
use crate::models::{ConsistencyGuide, StoryScene};
use crate::templates;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn string_array_schema(key: &str) -> Value {
    json!({
        "type": "OBJECT",
        "properties": {key: {"type": "ARRAY", "items": {"type": "STRING"}}},
        "required": [key],
    })
}

fn string_schema(key: &str) -> Value {
    json!({
        "type": "OBJECT",
        "properties": {key: {"type": "STRING"}},
        "required": [key],
    })
}

/// Three click-worthy, SEO-optimized video titles.
pub async fn titles(
    gateway: &dyn ModelGateway,
    story: &[StoryScene],
    guide: &ConsistencyGuide,
    cancel: &CancellationToken,
) -> Result<Vec<String>, GeminiError> {
    #[derive(Deserialize)]
    struct Out {
        titles: Vec<String>,
    }
    let prompt = templates::seo_titles(story, guide);
    let raw = gateway.generate_json(&prompt, string_array_schema("titles"), cancel).await?;
    Ok(parse_structured::<Out>(raw)?.titles)
}

/// A hook-first YouTube description.
pub async fn description(
    gateway: &dyn ModelGateway,
    story: &[StoryScene],
    guide: &ConsistencyGuide,
    cancel: &CancellationToken,
) -> Result<String, GeminiError> {
    #[derive(Deserialize)]
    struct Out {
        description: String,
    }
    let prompt = templates::seo_description(story, guide);
    let raw = gateway.generate_json(&prompt, string_schema("description"), cancel).await?;
    Ok(parse_structured::<Out>(raw)?.description)
}

/// Comma-separated tag list, no space after commas.
pub async fn tags(
    gateway: &dyn ModelGateway,
    story: &[StoryScene],
    guide: &ConsistencyGuide,
    cancel: &CancellationToken,
) -> Result<String, GeminiError> {
    #[derive(Deserialize)]
    struct Out {
        tags: String,
    }
    let prompt = templates::seo_tags(story, guide);
    let raw = gateway.generate_json(&prompt, string_schema("tags"), cancel).await?;
    Ok(parse_structured::<Out>(raw)?.tags)
}

/// Rewrite up to three user-provided texts into ALL-CAPS thumbnail headlines.
pub async fn thumbnail_texts(
    gateway: &dyn ModelGateway,
    story: &[StoryScene],
    guide: &ConsistencyGuide,
    originals: &[String; 3],
    cancel: &CancellationToken,
) -> Result<Vec<String>, GeminiError> {
    #[derive(Deserialize)]
    struct Out {
        texts: Vec<String>,
    }
    let prompt = templates::thumbnail_texts(story, guide, originals);
    let raw = gateway.generate_json(&prompt, string_array_schema("texts"), cancel).await?;
    Ok(parse_structured::<Out>(raw)?.texts)
}

/// Three image-generator prompts composed around the given thumbnail texts.
pub async fn thumbnail_prompts(
    gateway: &dyn ModelGateway,
    story: &[StoryScene],
    guide: &ConsistencyGuide,
    texts: &[String; 3],
    cancel: &CancellationToken,
) -> Result<Vec<String>, GeminiError> {
    #[derive(Deserialize)]
    struct Out {
        prompts: Vec<String>,
    }
    let prompt = templates::thumbnail_prompts(story, guide, texts);
    let raw = gateway.generate_json(&prompt, string_array_schema("prompts"), cancel).await?;
    Ok(parse_structured::<Out>(raw)?.prompts)
}
