//! Prompt templates for the model-driven strategies.
//!
//! Templates are plain text with `{{$name}}` placeholders (`{{ $name }}` is accepted too).
//! Selection templates see `{{$agents}}` and `{{$history}}`; termination templates see
//! `{{$history}}` and `{{$success}}`.

use crate::history::{ChatMessage, MessageRole};

/// Used when a scenario leaves `selection_prompt` empty.
pub const DEFAULT_SELECTION_PROMPT: &str = "\
You are moderating a conversation between the participants listed below. \
Decide which participant should speak next, based on the conversation so far.

Participants:
{{$agents}}

Rules:
- Reply with the name of exactly one participant.
- Do not add any explanation or punctuation.
- Do not choose the participant who spoke last unless no one else can make progress.

Conversation:
{{$history}}";

/// Used by a prompt-based termination check constructed with an empty template.
pub const DEFAULT_TERMINATION_PROMPT: &str = "\
Determine whether the work below is finished and approved. \
If it is, reply with {{$success}}. Otherwise reply with NO.

Conversation:
{{$history}}";

/// Substitute `{{$key}}` placeholders with their values.
pub fn render_template(template: &str, variables: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        rendered = rendered
            .replace(&format!("{{{{${}}}}}", key), value)
            .replace(&format!("{{{{ ${} }}}}", key), value);
    }
    rendered
}

/// Render messages as a plain transcript, keeping only the last `window` entries if set.
pub fn render_history(messages: &[ChatMessage], window: Option<usize>) -> String {
    let start = match window {
        Some(n) if n < messages.len() => messages.len() - n,
        _ => 0,
    };
    messages[start..]
        .iter()
        .map(|m| match m.role {
            MessageRole::Tool => format!("{} (tool result): {}", m.speaker, m.content),
            _ => format!("{}: {}", m.speaker, m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
