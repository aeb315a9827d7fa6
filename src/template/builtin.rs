//! Built-in enhancement instructions.
//!
//! One fixed, non-empty instruction text per known template id. These are the
//! last resolution tier and the seed for the in-memory registry.

use crate::llm::ProviderKind;

use super::Template;

/// Id used when an unknown template id is asked for.
pub const DEFAULT_TEMPLATE_ID: &str = "standard";

/// Every built-in template id, in display order.
pub const BUILTIN_IDS: [&str; 8] = [
    "standard", "pipeline", "longform", "narrative", "wildcard", "custom1", "custom2", "custom3",
];

/// Compression level applied when a template does not set one.
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 5;

const STANDARD: &str = "You are an expert prompt engineer for text-to-image models. \
Rewrite the user's prompt into a single vivid, specific image description. \
Keep every subject, attribute and facet the user chose; never drop or contradict one. \
Add concrete visual detail: composition, camera angle, lens, lighting, color palette, texture and mood. \
Prefer comma-separated descriptive phrases over full sentences. \
Do not add text, watermarks or signatures to the scene. \
Return only the rewritten prompt.";

const PIPELINE: &str = "You are the enhancement stage of an automated image-generation pipeline. \
Transform the input prompt into a deterministic, tag-ordered prompt: \
subject, action or pose, clothing, setting, lighting, camera, style, quality tags. \
Use lowercase comma-separated tags, no sentences and no line breaks. \
Preserve every user-provided tag verbatim and only append missing categories. \
Output exactly one line containing the prompt and nothing else.";

const LONGFORM: &str = "You are a visual director writing detailed scene briefs for an image model. \
Expand the user's prompt into a rich paragraph of three to six sentences. \
Describe the subject first, then the environment, then light and atmosphere, then camera and rendering style. \
Every facet in the input must appear in the brief. \
Use precise, sensory language and avoid abstract adjectives that an image model cannot render. \
Return only the paragraph.";

const NARRATIVE: &str = "You are a storyteller who turns prompts into a single illustrated moment. \
Rewrite the user's prompt as a short present-tense scene that implies what happened just before and what happens next, \
while remaining one frozen, paintable instant. \
Keep all characters, clothing, poses and settings from the input. \
Convey emotion through expression, body language and lighting rather than dialogue. \
Return only the scene description.";

const WILDCARD: &str = "You are a creative art director with license to surprise. \
Keep the core subject and every explicit facet of the user's prompt, \
then introduce one unexpected but coherent element: an unusual setting, a striking art style, or an inventive lighting setup. \
Describe the result as a vivid, comma-separated image prompt. \
Return only the prompt.";

const CUSTOM1: &str = "You are a cinematic still photographer. \
Rewrite the user's prompt as a film still: specify the shot type, lens focal length, film stock or sensor look, \
color grade and practical light sources. \
Keep every subject and facet from the input. \
Return only the rewritten prompt.";

const CUSTOM2: &str = "You are a concept artist preparing an illustration brief. \
Rewrite the user's prompt for a painted or illustrated look: name the medium, brush or line quality, \
palette and level of detail. \
Keep every subject and facet from the input. \
Return only the rewritten prompt.";

const CUSTOM3: &str = "You are a minimalist prompt editor. \
Rewrite the user's prompt using the fewest words that still preserve every subject and facet. \
Remove redundancy, merge overlapping descriptors and keep the strongest visual terms. \
Return only the rewritten prompt.";

/// Built-in instruction text for a template id.
///
/// Unknown ids fall back to the [`DEFAULT_TEMPLATE_ID`] text.
pub fn instructions(template_id: &str) -> &'static str {
    match template_id {
        "pipeline" => PIPELINE,
        "longform" => LONGFORM,
        "narrative" => NARRATIVE,
        "wildcard" => WILDCARD,
        "custom1" => CUSTOM1,
        "custom2" => CUSTOM2,
        "custom3" => CUSTOM3,
        _ => STANDARD,
    }
}

/// Whether the id names a built-in template.
pub fn is_builtin(template_id: &str) -> bool {
    BUILTIN_IDS.contains(&template_id)
}

/// Human-readable name for a template id.
pub fn display_name(template_id: &str) -> String {
    match template_id {
        "standard" => "Standard".to_string(),
        "pipeline" => "Pipeline".to_string(),
        "longform" => "Long Form".to_string(),
        "narrative" => "Narrative".to_string(),
        "wildcard" => "Wildcard".to_string(),
        "custom1" => "Custom 1".to_string(),
        "custom2" => "Custom 2".to_string(),
        "custom3" => "Custom 3".to_string(),
        other => other.to_string(),
    }
}

/// Full built-in template for an id, targeting the given provider/model.
pub fn template(template_id: &str, provider: ProviderKind, model: &str) -> Template {
    Template {
        id: template_id.to_string(),
        name: display_name(template_id),
        master_prompt: instructions(template_id).to_string(),
        format_template: String::new(),
        usage_rules: String::new(),
        provider,
        model: model.to_string(),
        use_happy_talk: false,
        compress_prompt: template_id == "pipeline",
        compression_level: DEFAULT_COMPRESSION_LEVEL,
    }
}
