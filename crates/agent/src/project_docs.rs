//! Project instruction discovery.
//!
//! A canonical set of instruction files is read from the working
//! directory once per submitted input and concatenated into the system
//! prompt under a 32 KiB budget. `AGENTS.md` applies to every provider;
//! each provider family adds its own file.

use crate::error::AgentResult;
use crate::execution::ExecutionEnvironment;

/// Total byte budget for concatenated instructions.
pub const MAX_PROJECT_DOCS_BYTES: usize = 32 * 1024;

/// Marker appended when the budget cuts a file short.
const TRUNCATION_MARKER: &str = "[Project instructions truncated at 32KB]";

/// The instruction files recognized for a provider, in load order.
#[must_use]
pub fn instruction_files(provider_id: &str) -> Vec<&'static str> {
    match provider_id {
        "openai" => vec!["AGENTS.md", ".codex/instructions.md"],
        "anthropic" => vec!["AGENTS.md", "CLAUDE.md"],
        "gemini" => vec!["AGENTS.md", "GEMINI.md"],
        _ => vec!["AGENTS.md"],
    }
}

/// Load and concatenate the provider's instruction files.
///
/// Files are separated by blank lines. When appending a file would exceed
/// the budget, the remaining prefix is appended (only if any budget
/// remains) followed by the truncation marker, and loading stops. A file
/// that exactly exhausts the budget gets no marker. Unreadable files are
/// skipped silently.
pub async fn discover_project_docs(
    env: &dyn ExecutionEnvironment,
    provider_id: &str,
) -> AgentResult<String> {
    let mut result = String::new();
    let mut total_bytes: usize = 0;

    for file_name in instruction_files(provider_id) {
        if !env.file_exists(file_name).await {
            continue;
        }
        let Ok(content) = env.read_file(file_name, None, None).await else {
            continue;
        };

        let separator_len = if result.is_empty() { 0 } else { 2 };
        let needed = content.len() + separator_len;

        if total_bytes + needed > MAX_PROJECT_DOCS_BYTES {
            let remaining = MAX_PROJECT_DOCS_BYTES.saturating_sub(total_bytes + separator_len);
            if remaining > 0 {
                if !result.is_empty() {
                    result.push_str("\n\n");
                }
                let cut = char_boundary_at_or_before(&content, remaining);
                result.push_str(&content[..cut]);
            }
            result.push('\n');
            result.push_str(TRUNCATION_MARKER);
            return Ok(result);
        }

        if !result.is_empty() {
            result.push_str("\n\n");
        }
        result.push_str(&content);
        total_bytes += needed;
    }

    Ok(result)
}

/// Largest byte index ≤ `max_bytes` that is a UTF-8 char boundary.
fn char_boundary_at_or_before(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut pos = max_bytes;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_per_provider() {
        assert_eq!(
            instruction_files("openai"),
            vec!["AGENTS.md", ".codex/instructions.md"]
        );
        assert_eq!(instruction_files("anthropic"), vec!["AGENTS.md", "CLAUDE.md"]);
        assert_eq!(instruction_files("gemini"), vec!["AGENTS.md", "GEMINI.md"]);
        assert_eq!(instruction_files("other"), vec!["AGENTS.md"]);
    }

    #[test]
    fn boundary_respects_utf8() {
        let s = "café"; // é is 2 bytes
        let cut = char_boundary_at_or_before(s, 4);
        assert!(s.is_char_boundary(cut));
        assert_eq!(cut, 3);
    }
}
