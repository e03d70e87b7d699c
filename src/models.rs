use serde::{Serialize, Deserialize};

/// Every generated clip covers a fixed number of seconds of screen time.
pub const CLIP_SECONDS: u32 = 8;
/// Scenes per remote call during story generation and prompt compilation.
pub const SCENE_BATCH_SIZE: usize = 4;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Ai,
}

/// Inline image attached to a chat message, as the Gemini API expects it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    #[serde(default)]
    pub images: Vec<ImagePart>,
}

/// Snapshot of run parameters, captured once when generation starts and
/// reused unchanged by the story and prompt stages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    pub chat_history: Vec<ChatMessage>,
    pub minutes: u32,
    pub seconds: u32,
    /// e.g. "16:9 (Landscape)" — only the leading ratio token goes on the wire.
    pub aspect_ratio: String,
    #[serde(default)]
    pub generate_image_prompts: bool,
}

impl ScriptRequest {
    /// Saturating: the request comes straight off the wire and absurd values
    /// must not wrap or panic here. The route layer rejects out-of-range
    /// durations before a run starts.
    pub fn total_seconds(&self) -> u32 {
        self.minutes.saturating_mul(60).saturating_add(self.seconds)
    }

    pub fn ratio_token(&self) -> &str {
        self.aspect_ratio.split_whitespace().next().unwrap_or("16:9")
    }
}

/// One narrative beat of the story. `scene_number` is 1-based and contiguous.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StoryScene {
    pub scene_number: u32,
    pub description: String,
}

/// Style/character/setting guide distilled once from the finished story and
/// shared read-only by prompt compilation and SEO generation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyGuide {
    pub characters_and_appearance: String,
    pub setting_and_mood: String,
    pub key_objects_and_style: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SettingDetails {
    pub location: String,
    pub time_of_day: String,
    pub environment_details: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CameraDetails {
    pub opening_frame: String,
    pub movement: String,
    pub angle: String,
    pub shot_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VisualSequenceEvent {
    /// e.g. "0-3s", "3-8s"
    pub time_range: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CharacterDetails {
    pub name: String,
    pub description: String,
    pub action: String,
    pub emotion: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct AudioDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sfx: Option<String>,
    /// Never survives compilation; the pipeline does not produce narrated
    /// output, so sanitize strips it even when the model volunteers one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voiceover: Option<VoiceoverDetails>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VoiceoverDetails {
    pub text: String,
    pub tone: String,
}

/// Structured spec for a single video clip, in the shape downstream video
/// models consume. `scene_id`, `duration`, `aspect_ratio` and the transition
/// marker are overwritten after generation and never trusted to the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VideoPrompt {
    pub scene_id: String,
    pub objective_in_scene: String,
    pub duration: u32,
    pub style: String,
    pub setting: SettingDetails,
    pub camera: CameraDetails,
    pub visual_sequence: Vec<VisualSequenceEvent>,
    pub characters: Vec<CharacterDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_interaction: Option<String>,
    #[serde(default)]
    pub audio: AudioDetails,
    pub aspect_ratio: String,
    #[serde(default)]
    pub transition_from_previous: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_image_prompt: Option<String>,
}

/// Final per-scene artifact: the scene summary plus its compiled clip spec.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CompiledPrompt {
    pub scene_summary: String,
    pub video_prompt: VideoPrompt,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(minutes: u32, seconds: u32) -> ScriptRequest {
        ScriptRequest {
            chat_history: vec![],
            minutes,
            seconds,
            aspect_ratio: "16:9 (Landscape)".into(),
            generate_image_prompts: false,
        }
    }

    #[test]
    fn total_seconds_adds_minutes_and_seconds() {
        assert_eq!(request(2, 30).total_seconds(), 150);
        assert_eq!(request(0, 0).total_seconds(), 0);
    }

    #[test]
    fn total_seconds_saturates_on_absurd_input() {
        assert_eq!(request(u32::MAX, 0).total_seconds(), u32::MAX);
        assert_eq!(request(u32::MAX, u32::MAX).total_seconds(), u32::MAX);
    }
}
