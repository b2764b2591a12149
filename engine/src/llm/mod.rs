//! Model Provider Layer
//!
//! Concrete `ModelClient` implementations plus helpers for pulling structured
//! JSON out of free-form model output. Models often wrap JSON in code fences
//! or surround it with prose even when told not to.

pub mod openai;

pub use openai::OpenAICompatibleClient;

/// Extract the first JSON object from model output.
///
/// Handles, in order:
/// 1. Raw JSON (the whole content is an object)
/// 2. Fenced JSON, with or without trailing text
/// 3. An object embedded in prose
pub fn extract_json_object(content: &str) -> Option<&str> {
    let trimmed = content.trim();

    // Pattern 1: raw JSON
    if trimmed.starts_with('{') {
        if let Some(json) = extract_balanced(trimmed, '{', '}') {
            return Some(json);
        }
    }

    // Pattern 2: markdown code fence
    if let Some(inner) = extract_fenced_json(trimmed) {
        let inner = inner.trim();
        if let Some(pos) = inner.find('{') {
            if let Some(json) = extract_balanced(&inner[pos..], '{', '}') {
                return Some(json);
            }
        }
    }

    // Pattern 3: scan for the first balanced object anywhere
    let pos = trimmed.find('{')?;
    extract_balanced(&trimmed[pos..], '{', '}')
}

/// Extract the first JSON array from model output.
pub fn extract_json_array(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    let source = extract_fenced_json(trimmed).map(str::trim).unwrap_or(trimmed);
    let pos = source.find('[')?;
    extract_balanced(&source[pos..], '[', ']')
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_json(content: &str) -> Option<&str> {
    // Find opening fence
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    // Find closing fence after the body starts
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced `open`..`close` span starting at position 0 of `s`.
///
/// Counts depth while respecting string literals, to find the matching
/// closing delimiter.
fn extract_balanced(s: &str, open: char, close: char) -> Option<&str> {
    if !s.starts_with(open) {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
