//! Building the provider request and cleaning the provider's answer.

use std::sync::LazyLock;

use regex::Regex;
use tera::{Context, Tera};

use crate::llm::Message;
use crate::template::Template;

/// System message layout. Variables are inserted as data, never re-parsed.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"{{ master_prompt }}
{% if format_template %}
Format the result like this:
{{ format_template }}
{% endif %}{% if usage_rules %}
Rules:
{{ usage_rules }}
{% endif %}{% if compress %}
Compression level {{ compression_level }}/10: keep the result to roughly {{ target_percent }}% of the length of a full rewrite. Drop filler words before descriptive terms and never drop a facet.
{% endif %}{% if not happy_talk %}
Respond with the enhanced prompt only. No greeting, no explanation, no preamble, no surrounding quotes.
{% endif %}"#;

/// Leading "Sure! Here is the enhanced prompt:" style line.
static PREAMBLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\A\s*(?:(?:sure|certainly|of course|okay|ok|absolutely)[!,.]*\s*)?(?:here(?:'s| is| are)|below is)\b[^\n]*:[ \t]*(?:\r?\n)+",
    )
    .ok()
});

/// Trailing "Let me know if ..." sign-off.
static SIGN_OFF: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\r?\n)+[ \t]*(?:let me know|i hope|feel free)[^\n]*\s*\z").ok()
});

/// Target output length, as a percentage, for a compression level.
pub fn compression_target_percent(level: u8) -> u32 {
    let level = u32::from(level.clamp(1, 10));
    100 - (level * 15) / 2
}

/// Render the system message for a template.
pub fn system_prompt(template: &Template) -> String {
    let mut context = Context::new();
    context.insert("master_prompt", template.master_prompt.trim());
    context.insert("format_template", template.format_template.trim());
    context.insert("usage_rules", template.usage_rules.trim());
    context.insert("compress", &template.compress_prompt);
    context.insert("compression_level", &template.compression_level);
    context.insert(
        "target_percent",
        &compression_target_percent(template.compression_level),
    );
    context.insert("happy_talk", &template.use_happy_talk);

    match Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false) {
        Ok(rendered) => rendered.trim().to_string(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                template_id = %template.id,
                "System prompt render failed, sending bare instructions"
            );
            template.master_prompt.clone()
        }
    }
}

/// Messages for one enhancement call.
pub fn messages(template: &Template, prompt: &str) -> Vec<Message> {
    vec![Message::system(system_prompt(template)), Message::user(prompt.trim())]
}

/// Clean a raw provider answer.
///
/// Without happy talk, a leading preamble line, a trailing sign-off and
/// wrapping quotes or code fences are removed.
pub fn clean_output(raw: &str, use_happy_talk: bool) -> String {
    let trimmed = raw.trim();
    if use_happy_talk {
        return trimmed.to_string();
    }

    let mut text = trimmed.to_string();
    if let Some(re) = PREAMBLE.as_ref() {
        text = re.replace(&text, "").into_owned();
    }
    if let Some(re) = SIGN_OFF.as_ref() {
        text = re.replace(&text, "").into_owned();
    }

    strip_wrapping(text.trim()).to_string()
}

fn strip_wrapping(text: &str) -> &str {
    if let Some(inner) = text
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        // Drop an info string such as ```text
        let inner = match inner.split_once('\n') {
            Some((first, rest)) if !first.trim().contains(' ') => rest,
            _ => inner,
        };
        return inner.trim();
    }

    for (open, close) in [("\"", "\""), ("\u{201c}", "\u{201d}"), ("'", "'")] {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            if !inner.contains(open) && !inner.contains(close) {
                return inner.trim();
            }
        }
    }

    text
}
