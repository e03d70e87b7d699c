//! Prompt wording for every model call.
//!
//! Everything the model is told — system instructions, task framing, the
//! content-safety policy — is domain configuration and lives here as plain
//! template functions. Control flow (batching, state transitions, sanitize
//! passes) never embeds wording.

use crate::models::{
    ChatMessage, ChatRole, CompiledPrompt, ConsistencyGuide, ScriptRequest, StoryScene,
    CLIP_SECONDS,
};

/// Action and conflict are allowed; graphic detail is not. Repeated verbatim
/// in every generation prompt.
const SAFETY_POLICY: &str = "CONTENT RESTRICTION: intense action, fighting \
(punching, kicking) and conflict are allowed. Strictly AVOID graphic or gory \
descriptions: no blood, open wounds, or gruesome death. Focus on choreography \
and emotional impact, never gore.";

pub fn chat_system_instruction() -> String {
    format!(
        "You are a creative, expert film director acting as a helpful AI \
assistant. Your goal is to help the user flesh out their idea for a video. \
Ask insightful, open-ended questions about characters, setting, mood, story, \
visual style and key moments. You can also analyze images the user provides. \
Keep responses concise, friendly and conversational. {SAFETY_POLICY} Do NOT \
write the script; your job is to brainstorm and gather details. Once you have \
a solid understanding of the concept (characters, setting, basic plot), call \
the 'offer_to_generate_script' function to ask the user whether they are \
ready to generate the script."
    )
}

fn transcript(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| {
            let who = match m.role {
                ChatRole::User => "User",
                ChatRole::Ai => "AI Director",
            };
            format!("{who}: {}", m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn numbered_scenes(scenes: &[StoryScene]) -> String {
    scenes
        .iter()
        .map(|s| format!("Scene {}: {}", s.scene_number, s.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One story batch: exact scene-number range plus everything written so far,
/// so the model can neither drift on numbering nor break continuity.
pub fn story_batch(
    request: &ScriptRequest,
    total_scenes: usize,
    start_scene: u32,
    end_scene: u32,
    written_so_far: &[StoryScene],
) -> String {
    format!(
        "You are a creative storyteller writing part of a larger story for a \
video, based on the user's brainstorming conversation with an AI Director:\n\
\"{conversation}\"\n\
Total scenes in the video: {total_scenes}\n\n\
Current task: write exactly {count} scenes, from scene {start_scene} to \
{end_scene}. The story must be continuous and engaging; each scene \
description is a concise summary of the key visual event.\n\n\
{SAFETY_POLICY}\n\n\
Existing story so far (for context, may be empty):\n{existing}\n\n\
Return a JSON array of objects, each with \"scene_number\" (integer) and \
\"description\" (string).",
        conversation = transcript(&request.chat_history),
        count = end_scene - start_scene + 1,
        existing = numbered_scenes(written_so_far),
    )
}

pub fn consistency_guide(story: &[StoryScene]) -> String {
    format!(
        "You are a film production assistant. Analyze the following video \
story script and create a Consistency Guide so the final video stays \
coherent.\n\nFull story script:\n{script}\n\nProvide a detailed guide \
covering:\n\
1. Characters & Appearance: who the main characters are, what they look \
like, what they wear.\n\
2. Setting & Mood: where and when the story takes place, the overall mood.\n\
3. Key Objects & Style: recurring objects, visual style, color palette, art \
direction.\n\nReturn a single JSON object with the specified structure.",
        script = numbered_scenes(story),
    )
}

/// One prompt-compilation batch. `previous` is the fully compiled spec of the
/// scene immediately before this batch, serialized as the continuity anchor.
pub fn clip_batch(
    request: &ScriptRequest,
    guide: &ConsistencyGuide,
    scenes_with_objectives: &[(StoryScene, String)],
    previous: Option<&CompiledPrompt>,
) -> String {
    let scenes_text = scenes_with_objectives
        .iter()
        .map(|(s, objective)| {
            format!("Scene {} (Objective: {objective}): {}", s.scene_number, s.description)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let continuity = match previous {
        Some(p) => format!(
            "CONTEXT FROM PREVIOUS SCENE'S PROMPT (FOR CONTINUITY):\n\
This is the detailed prompt for the scene immediately before the ones you \
are about to create. The 'opening_frame' of your first new scene MUST \
perfectly match the end state of this scene for a seamless cut.\n{json}\n",
            json = serde_json::to_string_pretty(&p.video_prompt).unwrap_or_default(),
        ),
        None => String::new(),
    };

    let image_prompt_rule = if request.generate_image_prompts {
        "\nSTARTING IMAGE PROMPT (MANDATORY): additionally fill \
'starting_image_prompt' with a detailed, single-paragraph text-to-image \
prompt describing the scene's very first frame as defined in \
'camera.opening_frame', incorporating the Consistency Guide (characters, \
clothing, setting, mood, style, lighting)."
    } else {
        ""
    };

    format!(
        "You are a master cinematographer translating a story into highly \
structured, visually driven JSON prompts. Each prompt defines one \
{CLIP_SECONDS}-second video clip; every field must serve the scene's \
objective with precise, physical language.\n\n\
{SAFETY_POLICY}\n\n\
MANDATORY CONSISTENCY GUIDE (applies to the whole film):\n\
- Characters: {characters}\n- Setting/Mood: {setting}\n- Style/Objects: \
{style}\n\n{continuity}\n\
Current task: generate a detailed video prompt for each of these scenes:\n\
{scenes_text}\n\
Put the original scene description in the 'scene_summary' field.\n\n\
FIELD RULES:\n\
1. objective_in_scene: use the provided objective for each scene.\n\
2. style: start from \"photorealistic, hyper-detailed, cinematic shot, 8k, \
sharp focus, professional color grading, realistic lighting\" then add style \
elements from the guide.\n\
3. camera.opening_frame: define the very first frame with precision; it \
carries the continuity.\n\
4. camera.movement: describe the camera path across the {CLIP_SECONDS} \
seconds in real cinematography terms.\n\
5. visual_sequence: break the clip into at most 3 continuous time ranges \
(e.g. \"0-3s\", \"3-8s\"); one or two are ideal for simple actions. Describe \
action with attention to physics.\n\
6. characters: one entry per significant character, names and descriptions \
matching the guide; action and emotion specific to this scene. If two or \
more characters appear, 'character_interaction' is mandatory and the \
per-character action/emotion must support it; omit it for a single \
character.\n\
7. audio: immersive ambient_sound and sfx only. DO NOT add a 'voiceover' \
field; this is a film, not a narration.\n\
8. Continuity (all scenes except the first): the opening frame must match \
the previous scene's end state; set 'transition_from_previous' to \
\"hard cut\".\n\
9. First scene only: 'transition_from_previous' MUST be \"Fade in from \
black\".{image_prompt_rule}\n\n\
Return a valid JSON array of objects. No markdown.",
        characters = guide.characters_and_appearance,
        setting = guide.setting_and_mood,
        style = guide.key_objects_and_style,
    )
}

fn story_and_guide(story: &[StoryScene], guide: &ConsistencyGuide) -> String {
    format!(
        "Video story:\n{script}\n\nVideo style guide:\n\
- Characters & Appearance: {characters}\n- Setting & Mood: {setting}\n\
- Key Objects & Style: {style}",
        script = numbered_scenes(story),
        characters = guide.characters_and_appearance,
        setting = guide.setting_and_mood,
        style = guide.key_objects_and_style,
    )
}

pub fn seo_titles(story: &[StoryScene], guide: &ConsistencyGuide) -> String {
    format!(
        "You are a YouTube SEO expert and viral content strategist. Generate \
3 compelling, click-worthy, SEO-optimized video titles based on the \
following script summary and style guide. Create curiosity, stay concise \
(ideally under 70 characters), include relevant keywords.\n{context}\n\
Return a JSON object with a key \"titles\" containing an array of 3 strings.",
        context = story_and_guide(story, guide),
    )
}

pub fn seo_description(story: &[StoryScene], guide: &ConsistencyGuide) -> String {
    format!(
        "You are a YouTube SEO expert. Write a detailed, engaging, \
SEO-optimized YouTube description for the video below. Open with a strong \
hook in the first two lines, summarize the narrative, weave in relevant \
keywords naturally, structure it in readable paragraphs. It may mention \
action or conflict but must avoid graphic or gory detail. Do NOT include \
placeholders like '[Link]', hashtags, or subscribe calls.\n{context}\n\
Return a JSON object with a key \"description\" containing a single string.",
        context = story_and_guide(story, guide),
    )
}

pub fn seo_tags(story: &[StoryScene], guide: &ConsistencyGuide) -> String {
    format!(
        "You are a YouTube SEO expert. Generate a comprehensive list of SEO \
tags for the video below: broad keywords, specific keywords for characters, \
setting and plot, and thematic keywords.\n{context}\n\
Return a JSON object with a key \"tags\" containing one comma-separated \
string with no space after each comma, e.g. \"tag1,tag2,tag3\".",
        context = story_and_guide(story, guide),
    )
}

pub fn thumbnail_texts(
    story: &[StoryScene],
    guide: &ConsistencyGuide,
    originals: &[String; 3],
) -> String {
    let listed = originals
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let t = if t.is_empty() { "No text provided" } else { t };
            format!("{}. \"{t}\"", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a YouTube viral content strategist maximizing click-through \
rate. Rewrite the 3 user texts below into powerful thumbnail headlines.\n\n\
VIDEO CONTEXT:\n{context}\n\nUSER'S ORIGINAL TEXTS:\n{listed}\n\n\
Rules: transform provided text; where none is provided, invent a headline \
from the video's most dramatic theme. ALL CAPS, 2-4 punchy words, evoke \
strong emotion or a curiosity gap, instantly understandable. Keep order; \
output exactly 3 strings.\n\
Return a JSON object with a key \"texts\" containing an array of 3 strings.",
        context = story_and_guide(story, guide),
    )
}

pub fn thumbnail_prompts(
    story: &[StoryScene],
    guide: &ConsistencyGuide,
    texts: &[String; 3],
) -> String {
    let listed = texts
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let t = if t.is_empty() { "No text provided" } else { t };
            format!("{}. Text for Thumbnail {}: \"{t}\"", i + 1, i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a world-class AI art director creating viral YouTube \
thumbnails. Generate 3 distinct, visually striking prompts for an AI image \
generator.\n\nMANDATORY CONSISTENCY GUIDE (the image MUST follow this):\n\
- Characters & Appearance: {characters}\n- Setting & Mood: {setting}\n\
- Key Objects & Style: {style}\n\nVIDEO STORY (context):\n{script}\n\n\
THUMBNAIL TEXTS (to be overlaid on the images):\n{listed}\n\n\
For each prompt: match the guide exactly; {safety} if text is provided, \
compose with the subject offset to one third of the frame leaving clear \
negative space for the text, the subject's gaze directing attention toward \
it; if no text, fill the frame with one climactic moment. Use vivid \
expressions, dramatic angles, high-contrast lighting, a single focal point. \
Write each prompt as a detailed English paragraph for a 16:9 image, opening \
with keywords like \"ultra realistic photo, dramatic cinematic YouTube \
thumbnail, professional color grading, sharp focus\".\n\
Return a JSON object with a key \"prompts\" containing an array of 3 strings.",
        characters = guide.characters_and_appearance,
        setting = guide.setting_and_mood,
        style = guide.key_objects_and_style,
        script = numbered_scenes(story),
        safety = SAFETY_POLICY,
    )
}
