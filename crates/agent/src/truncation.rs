//! Tool output truncation.
//!
//! Output returned to the model is truncated per tool; the untruncated
//! output always travels on the `TOOL_CALL_END` event. Character limits
//! count Unicode scalar values, not bytes.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// How over-limit output is cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationMode {
    /// Keep the beginning and end; drop the middle.
    HeadTail,
    /// Keep only the end.
    Tail,
}

/// Limits for a single tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolLimits {
    pub max_chars: usize,
    pub mode: TruncationMode,
    /// Line cap applied after character truncation; `None` = unlimited.
    pub max_lines: Option<usize>,
}

/// Built-in limits per tool.
static DEFAULT_LIMITS: LazyLock<HashMap<&'static str, ToolLimits>> = LazyLock::new(|| {
    use TruncationMode::{HeadTail, Tail};
    HashMap::from([
        (
            "read_file",
            ToolLimits {
                max_chars: 50_000,
                mode: HeadTail,
                max_lines: None,
            },
        ),
        (
            "shell",
            ToolLimits {
                max_chars: 30_000,
                mode: HeadTail,
                max_lines: Some(256),
            },
        ),
        (
            "grep",
            ToolLimits {
                max_chars: 20_000,
                mode: Tail,
                max_lines: Some(200),
            },
        ),
        (
            "glob",
            ToolLimits {
                max_chars: 20_000,
                mode: Tail,
                max_lines: Some(500),
            },
        ),
        (
            "write_file",
            ToolLimits {
                max_chars: 1_000,
                mode: Tail,
                max_lines: None,
            },
        ),
        (
            "spawn_agent",
            ToolLimits {
                max_chars: 20_000,
                mode: HeadTail,
                max_lines: None,
            },
        ),
    ])
});

/// Fallback for tools without a dedicated entry.
const FALLBACK_LIMITS: ToolLimits = ToolLimits {
    max_chars: 30_000,
    mode: TruncationMode::HeadTail,
    max_lines: None,
};

/// Session-level overrides. Empty maps mean the defaults apply.
#[derive(Debug, Clone, Default)]
pub struct TruncationConfig {
    pub tool_output_limits: HashMap<String, usize>,
    pub tool_line_limits: HashMap<String, usize>,
}

/// Cut `output` to `max_chars` scalar values with a removal marker.
#[must_use]
pub fn truncate_chars(output: &str, max_chars: usize, mode: TruncationMode) -> String {
    let char_count = output.chars().count();
    if char_count <= max_chars {
        return output.to_string();
    }
    let removed = char_count - max_chars;

    match mode {
        TruncationMode::HeadTail => {
            let tail_len = max_chars / 2;
            let head_len = max_chars - tail_len;
            let head: String = output.chars().take(head_len).collect();
            let tail: String = output.chars().skip(char_count - tail_len).collect();
            format!(
                "{head}\n\n[Output truncated: {removed} characters removed from the middle. \
                 The full output is available in the event stream.]\n\n{tail}"
            )
        }
        TruncationMode::Tail => {
            let tail: String = output.chars().skip(removed).collect();
            format!(
                "[Output truncated: first {removed} characters removed. \
                 The full output is available in the event stream.]\n\n{tail}"
            )
        }
    }
}

/// Cut `output` to `max_lines` lines with a head/tail split.
#[must_use]
pub fn truncate_lines(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.split('\n').collect();
    if lines.len() <= max_lines {
        return output.to_string();
    }
    let head_count = max_lines / 2;
    let tail_count = max_lines - head_count;
    let omitted = lines.len() - head_count - tail_count;
    format!(
        "{}\n[... {omitted} lines omitted ...]\n{}",
        lines[..head_count].join("\n"),
        lines[lines.len() - tail_count..].join("\n"),
    )
}

/// The full pipeline for a tool's output: character truncation first, then
/// the line cap. Config overrides take precedence over the defaults.
#[must_use]
pub fn truncate_tool_output(output: &str, tool_name: &str, config: &TruncationConfig) -> String {
    let limits = DEFAULT_LIMITS.get(tool_name).unwrap_or(&FALLBACK_LIMITS);

    let max_chars = config
        .tool_output_limits
        .get(tool_name)
        .copied()
        .unwrap_or(limits.max_chars);
    let result = truncate_chars(output, max_chars, limits.mode);

    let max_lines = config
        .tool_line_limits
        .get(tool_name)
        .copied()
        .or(limits.max_lines);
    match max_lines {
        Some(cap) => truncate_lines(&result, cap),
        None => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_limit_is_untouched() {
        assert_eq!(truncate_chars("short", 100, TruncationMode::HeadTail), "short");
    }

    #[test]
    fn head_tail_keeps_both_ends() {
        let input = "a".repeat(50) + &"b".repeat(50);
        let out = truncate_chars(&input, 20, TruncationMode::HeadTail);
        assert!(out.starts_with("aaaaaaaaaa"));
        assert!(out.ends_with("bbbbbbbbbb"));
        assert!(out.contains("truncated"));
    }

    #[test]
    fn tail_keeps_only_the_end() {
        let input = "a".repeat(50) + &"b".repeat(10);
        let out = truncate_chars(&input, 10, TruncationMode::Tail);
        assert!(out.ends_with("bbbbbbbbbb"));
        assert!(!out.ends_with(&input));
    }

    #[test]
    fn line_cap_reports_omitted_count() {
        let input = (0..100).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let out = truncate_lines(&input, 10);
        assert!(out.contains("90 lines omitted"));
    }

    #[test]
    fn overrides_beat_defaults() {
        let config = TruncationConfig {
            tool_output_limits: HashMap::from([("grep".to_string(), 5)]),
            tool_line_limits: HashMap::new(),
        };
        let out = truncate_tool_output("abcdefghij", "grep", &config);
        assert!(out.contains("truncated"));
    }
}
