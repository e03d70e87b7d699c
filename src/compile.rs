use crate::batch::{run_batched, BatchProducer, ProgressFn};
use crate::gemini::{parse_structured, GeminiError, ModelGateway};
use crate::models::{
    CompiledPrompt, ConsistencyGuide, ScriptRequest, StoryScene, CLIP_SECONDS, SCENE_BATCH_SIZE,
};
use crate::templates;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Transition forced onto the very first scene of the film.
pub const FADE_IN: &str = "Fade in from black";
/// Transition forced onto every other scene; seamlessness comes from matching
/// frames, not from the transition itself.
pub const HARD_CUT: &str = "hard cut";

/// Maximum number of time-stamped sub-events per clip.
const MAX_SEQUENCE_EVENTS: usize = 3;

fn clip_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "scene_summary": {"type": "STRING", "description": "The original scene description."},
                "video_prompt": {
                    "type": "OBJECT",
                    "properties": {
                        "scene_id": {"type": "STRING", "description": "e.g. 'scene_01'"},
                        "objective_in_scene": {"type": "STRING"},
                        "duration": {"type": "INTEGER", "description": format!("Duration in seconds, should be {CLIP_SECONDS}.")},
                        "style": {"type": "STRING"},
                        "setting": {
                            "type": "OBJECT",
                            "properties": {
                                "location": {"type": "STRING"},
                                "time_of_day": {"type": "STRING"},
                                "environment_details": {"type": "STRING"},
                            },
                            "required": ["location", "time_of_day", "environment_details"],
                        },
                        "camera": {
                            "type": "OBJECT",
                            "properties": {
                                "opening_frame": {"type": "STRING"},
                                "movement": {"type": "STRING"},
                                "angle": {"type": "STRING"},
                                "shot_type": {"type": "STRING"},
                            },
                            "required": ["opening_frame", "movement", "angle", "shot_type"],
                        },
                        "visual_sequence": {
                            "type": "ARRAY",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "time_range": {"type": "STRING", "description": "e.g. '0-3s', '3-8s'"},
                                    "description": {"type": "STRING"},
                                },
                                "required": ["time_range", "description"],
                            },
                        },
                        "characters": {
                            "type": "ARRAY",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "name": {"type": "STRING"},
                                    "description": {"type": "STRING", "description": "From the consistency guide."},
                                    "action": {"type": "STRING"},
                                    "emotion": {"type": "STRING"},
                                },
                                "required": ["name", "description", "action", "emotion"],
                            },
                        },
                        "character_interaction": {"type": "STRING"},
                        "audio": {
                            "type": "OBJECT",
                            "properties": {
                                "ambient_sound": {"type": "STRING"},
                                "sfx": {"type": "STRING"},
                            },
                        },
                        "aspect_ratio": {"type": "STRING"},
                        "transition_from_previous": {"type": "STRING"},
                        "starting_image_prompt": {"type": "STRING"},
                    },
                    "required": [
                        "scene_id", "objective_in_scene", "duration", "style", "setting",
                        "camera", "visual_sequence", "characters", "audio", "aspect_ratio",
                    ],
                },
            },
            "required": ["scene_summary", "video_prompt"],
        },
    })
}

/// Narrative objective for a scene, derived from its position in the story.
pub fn scene_objective(scene_number: u32, total_scenes: usize) -> &'static str {
    let total = total_scenes as u32;
    let position = scene_number as f64 / total_scenes as f64;
    if scene_number == 1 {
        return "Establish the main character's core dream, inner desire, or the central theme of the story.";
    }
    if position <= 0.25 {
        return "Introduce the character's world, their daily life, or the initial setting.";
    }
    if position <= 0.5 {
        return "Introduce the first obstacle, an emotional shift, or an inciting incident that pushes the character to act.";
    }
    if position <= 0.75 {
        return "Build tension towards the climax. The character takes decisive action or faces a major challenge.";
    }
    if scene_number == total - 1 {
        return "Depict the story's climax, the peak of action or emotion, or a major turning point/revelation.";
    }
    if scene_number == total {
        return "Show the resolution, the aftermath, or a final emotional echo that resonates with the opening scene.";
    }
    "Continue the narrative flow, developing the plot and characters logically from the previous scene."
}

/// Force the invariants the model cannot be trusted to deliver, regardless of
/// what it returned. `scene_number` is the 1-based position in the full film.
fn sanitize(result: &mut CompiledPrompt, scene_number: u32, request: &ScriptRequest) {
    let vp = &mut result.video_prompt;
    vp.scene_id = format!("scene_{scene_number:02}");
    vp.duration = CLIP_SECONDS;
    vp.aspect_ratio = request.ratio_token().to_string();
    vp.visual_sequence.truncate(MAX_SEQUENCE_EVENTS);

    // Narrated output is unsupported; image prompts only on request.
    vp.audio.voiceover = None;
    if !request.generate_image_prompts {
        vp.starting_image_prompt = None;
    }

    if scene_number == 1 {
        vp.transition_from_previous = FADE_IN.to_string();
    } else if vp.transition_from_previous != HARD_CUT {
        vp.transition_from_previous = HARD_CUT.to_string();
    }
}

struct PromptProducer<'a> {
    gateway: &'a dyn ModelGateway,
    request: &'a ScriptRequest,
    story: &'a [StoryScene],
    guide: &'a ConsistencyGuide,
    cancel: &'a CancellationToken,
}

#[async_trait]
impl BatchProducer<CompiledPrompt> for PromptProducer<'_> {
    async fn produce(
        &self,
        start: usize,
        count: usize,
        done: &[CompiledPrompt],
    ) -> Result<Vec<CompiledPrompt>, GeminiError> {
        let total = self.story.len();
        let window: Vec<(StoryScene, String)> = self.story[start..start + count]
            .iter()
            .map(|s| (s.clone(), scene_objective(s.scene_number, total).to_string()))
            .collect();

        // The compiled spec of the scene right before this window anchors the
        // new window's opening frame.
        let prompt = templates::clip_batch(self.request, self.guide, &window, done.last());
        let raw = self.gateway.generate_json(&prompt, clip_schema(), self.cancel).await?;
        let mut batch: Vec<CompiledPrompt> = parse_structured(raw)?;

        // One compiled prompt per requested scene, no more and no fewer; a
        // batch that runs past the window would mint identifiers beyond the
        // end of the story.
        if batch.len() < count {
            return Err(GeminiError::MalformedResponse(format!(
                "model returned {} prompts for a window of {count}",
                batch.len()
            )));
        }
        batch.truncate(count);

        for (i, result) in batch.iter_mut().enumerate() {
            sanitize(result, (start + i) as u32 + 1, self.request);
        }
        Ok(batch)
    }

    fn status(&self, completed: usize, total: usize) -> String {
        format!("Step 3/3: compiling clip prompts... ({completed}/{total})")
    }
}

/// Compile every story scene into a structured clip spec, batch by batch,
/// threading the previous compiled spec forward as a continuity anchor.
pub async fn compile_prompts(
    gateway: &dyn ModelGateway,
    request: &ScriptRequest,
    story: &[StoryScene],
    guide: &ConsistencyGuide,
    on_progress: ProgressFn<'_>,
    cancel: &CancellationToken,
) -> Result<Vec<CompiledPrompt>, GeminiError> {
    info!("🎬 compiling prompts for {} scenes", story.len());
    let producer = PromptProducer { gateway, request, story, guide, cancel };
    run_batched(story.len(), SCENE_BATCH_SIZE, &producer, cancel, on_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AudioDetails, CameraDetails, SettingDetails, VideoPrompt, VisualSequenceEvent,
        VoiceoverDetails,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn request(image_prompts: bool) -> ScriptRequest {
        ScriptRequest {
            chat_history: vec![],
            minutes: 0,
            seconds: 64,
            aspect_ratio: "9:16 (Portrait)".into(),
            generate_image_prompts: image_prompts,
        }
    }

    fn raw_prompt() -> CompiledPrompt {
        CompiledPrompt {
            scene_summary: "a beat".into(),
            video_prompt: VideoPrompt {
                scene_id: "whatever_the_model_said".into(),
                objective_in_scene: "obj".into(),
                duration: 42,
                style: "cinematic".into(),
                setting: SettingDetails {
                    location: "rooftop".into(),
                    time_of_day: "dawn".into(),
                    environment_details: "wind".into(),
                },
                camera: CameraDetails {
                    opening_frame: "low angle".into(),
                    movement: "dolly in".into(),
                    angle: "low".into(),
                    shot_type: "wide".into(),
                },
                visual_sequence: vec![
                    VisualSequenceEvent { time_range: "0-2s".into(), description: "a".into() },
                    VisualSequenceEvent { time_range: "2-4s".into(), description: "b".into() },
                    VisualSequenceEvent { time_range: "4-6s".into(), description: "c".into() },
                    VisualSequenceEvent { time_range: "6-8s".into(), description: "d".into() },
                ],
                characters: vec![],
                character_interaction: None,
                audio: AudioDetails {
                    ambient_sound: Some("wind".into()),
                    sfx: None,
                    voiceover: Some(VoiceoverDetails { text: "hi".into(), tone: "warm".into() }),
                },
                aspect_ratio: "1:1".into(),
                transition_from_previous: "match cut".into(),
                starting_image_prompt: Some("an image prompt".into()),
            },
        }
    }

    #[test]
    fn objectives_follow_positional_breakpoints() {
        // 10-scene story.
        assert!(scene_objective(1, 10).contains("core dream"));
        assert!(scene_objective(2, 10).contains("character's world"));
        assert!(scene_objective(5, 10).contains("inciting incident"));
        assert!(scene_objective(7, 10).contains("tension towards the climax"));
        assert!(scene_objective(8, 10).contains("Continue the narrative flow"));
        assert!(scene_objective(9, 10).contains("climax, the peak"));
        assert!(scene_objective(10, 10).contains("resolution"));
    }

    #[test]
    fn sanitize_forces_identifier_duration_and_ratio() {
        let req = request(false);
        let mut p = raw_prompt();
        sanitize(&mut p, 12, &req);
        assert_eq!(p.video_prompt.scene_id, "scene_12");
        assert_eq!(p.video_prompt.duration, CLIP_SECONDS);
        assert_eq!(p.video_prompt.aspect_ratio, "9:16");

        let mut p = raw_prompt();
        sanitize(&mut p, 1, &req);
        assert_eq!(p.video_prompt.scene_id, "scene_01");
    }

    #[test]
    fn sanitize_strips_voiceover_and_unrequested_image_prompt() {
        let mut p = raw_prompt();
        sanitize(&mut p, 3, &request(false));
        assert_eq!(p.video_prompt.audio.voiceover, None);
        assert_eq!(p.video_prompt.starting_image_prompt, None);

        let mut p = raw_prompt();
        sanitize(&mut p, 3, &request(true));
        assert_eq!(p.video_prompt.audio.voiceover, None);
        assert_eq!(p.video_prompt.starting_image_prompt, Some("an image prompt".into()));
    }

    #[test]
    fn sanitize_forces_transitions_and_sequence_bound() {
        let mut p = raw_prompt();
        sanitize(&mut p, 1, &request(false));
        assert_eq!(p.video_prompt.transition_from_previous, FADE_IN);
        assert_eq!(p.video_prompt.visual_sequence.len(), MAX_SEQUENCE_EVENTS);

        let mut p = raw_prompt();
        sanitize(&mut p, 2, &request(false));
        assert_eq!(p.video_prompt.transition_from_previous, HARD_CUT);
    }

    struct ScriptedClips {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelGateway for ScriptedClips {
        async fn generate_json(
            &self,
            prompt: &str,
            _schema: Value,
            _cancel: &CancellationToken,
        ) -> Result<Value, GeminiError> {
            self.prompts.lock().push(prompt.to_string());
            let one = serde_json::to_value(raw_prompt()).unwrap();
            Ok(Value::Array(vec![one.clone(), one.clone(), one.clone(), one]))
        }
    }

    fn story(n: u32) -> Vec<StoryScene> {
        (1..=n)
            .map(|i| StoryScene { scene_number: i, description: format!("beat {i}") })
            .collect()
    }

    fn guide() -> ConsistencyGuide {
        ConsistencyGuide {
            characters_and_appearance: "a boy in a red scarf".into(),
            setting_and_mood: "rooftops at dawn".into(),
            key_objects_and_style: "paper planes".into(),
        }
    }

    /// Ignores the window and always returns a fixed number of clip specs.
    struct FixedCount(usize);

    #[async_trait]
    impl ModelGateway for FixedCount {
        async fn generate_json(
            &self,
            _prompt: &str,
            _schema: Value,
            _cancel: &CancellationToken,
        ) -> Result<Value, GeminiError> {
            let one = serde_json::to_value(raw_prompt()).unwrap();
            Ok(Value::Array(vec![one; self.0]))
        }
    }

    #[tokio::test]
    async fn extra_clips_beyond_the_window_are_dropped() {
        // Two-scene story, one window of 2; the model delivers 5. Without the
        // bound this would mint scene_03..scene_05 for scenes that don't exist.
        let out = compile_prompts(
            &FixedCount(5),
            &request(false),
            &story(2),
            &guide(),
            &|_p, _m| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            out.iter().map(|p| p.video_prompt.scene_id.as_str()).collect::<Vec<_>>(),
            vec!["scene_01", "scene_02"]
        );
    }

    #[tokio::test]
    async fn short_clip_batch_is_a_malformed_response() {
        let err = compile_prompts(
            &FixedCount(1),
            &request(false),
            &story(2),
            &guide(),
            &|_p, _m| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GeminiError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn second_batch_carries_the_previous_compiled_spec() {
        let gateway = ScriptedClips { prompts: Mutex::new(Vec::new()) };
        let req = request(false);
        let out = compile_prompts(
            &gateway,
            &req,
            &story(8),
            &guide(),
            &|_p, _m| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(out.len(), 8);
        let prompts = gateway.prompts.lock();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("CONTEXT FROM PREVIOUS SCENE'S PROMPT"));
        assert!(prompts[1].contains("CONTEXT FROM PREVIOUS SCENE'S PROMPT"));
        // The anchor is scene 4's sanitized spec.
        assert!(prompts[1].contains("scene_04"));

        // Identifier is a pure function of position across batches.
        let ids: Vec<_> = out.iter().map(|p| p.video_prompt.scene_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "scene_01", "scene_02", "scene_03", "scene_04", "scene_05", "scene_06",
                "scene_07", "scene_08",
            ]
        );
        assert_eq!(out[0].video_prompt.transition_from_previous, FADE_IN);
        assert!(out[1..]
            .iter()
            .all(|p| p.video_prompt.transition_from_previous == HARD_CUT));
        assert!(out.iter().all(|p| p.video_prompt.duration == CLIP_SECONDS));
        assert!(out.iter().all(|p| p.video_prompt.audio.voiceover.is_none()));
        assert!(out.iter().all(|p| p.video_prompt.starting_image_prompt.is_none()));
    }
}
