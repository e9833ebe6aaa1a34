//! Tool-call loop detection.
//!
//! Repeated identical tool calls indicate the model is stuck. The session
//! keeps a window of recent call signatures and checks it for a pure
//! repetition of period 1, 2, or 3; a hit injects a steering warning so
//! the next model call can break the cycle.

use md5::{Digest, Md5};
use orrery_models::ToolCall;

/// Signature of one call: `"<name>:<first 8 hex chars of md5(args)>"`.
///
/// The hash is over the serialized arguments, so differently-ordered JSON
/// objects may hash apart; that only costs missed loops, never false
/// positives.
#[must_use]
pub fn tool_call_signature(call: &ToolCall) -> String {
    let digest = Md5::digest(call.arguments.to_string().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}:{}", call.name, &hex[..8])
}

/// Check the last `window` signatures for a repeating pattern.
///
/// Fires iff there are at least `window` signatures and the final
/// `window` of them is an exact repetition of its first `p` entries, for
/// some period `p` in {1, 2, 3} that divides `window`. Returns a steering
/// message naming the repeated tools.
#[must_use]
pub fn detect_loop(signatures: &[String], window: usize) -> Option<String> {
    if window < 2 || signatures.len() < window {
        return None;
    }
    let recent = &signatures[signatures.len() - window..];

    for period in 1..=3usize {
        if window % period != 0 {
            continue;
        }
        let pattern = &recent[..period];
        let repeats = recent.chunks(period).all(|chunk| chunk == pattern);
        if repeats {
            let names: Vec<&str> = pattern
                .iter()
                .map(|s| s.split(':').next().unwrap_or("unknown"))
                .collect();
            return Some(format!(
                "Loop detected: the tool call pattern [{}] has repeated {} times in a row. \
                 Stop repeating it and try a different approach.",
                names.join(" -> "),
                window / period,
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "c".into(),
            name: name.into(),
            arguments: args,
            raw_arguments: None,
            parse_error: None,
        }
    }

    #[test]
    fn signature_is_name_plus_8_hex_chars() {
        let sig = tool_call_signature(&call("read_file", json!({"file_path": "/x"})));
        let (name, hash) = sig.split_once(':').expect("colon");
        assert_eq!(name, "read_file");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_distinguishes_args_and_names() {
        let a = tool_call_signature(&call("read_file", json!({"p": "/a"})));
        let b = tool_call_signature(&call("read_file", json!({"p": "/b"})));
        let c = tool_call_signature(&call("write_file", json!({"p": "/a"})));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn period_one_repetition_detected() {
        let sigs: Vec<String> = (0..6).map(|_| "read_file:abcd1234".to_string()).collect();
        let msg = detect_loop(&sigs, 6).expect("loop");
        assert!(msg.starts_with("Loop detected"));
        assert!(msg.contains("6 times"));
    }

    #[test]
    fn period_two_repetition_detected() {
        let mut sigs = Vec::new();
        for _ in 0..3 {
            sigs.push("a:11111111".to_string());
            sigs.push("b:22222222".to_string());
        }
        assert!(detect_loop(&sigs, 6).is_some());
    }

    #[test]
    fn period_three_requires_divisible_window() {
        let mut sigs = Vec::new();
        for _ in 0..2 {
            sigs.push("a:1".to_string());
            sigs.push("b:2".to_string());
            sigs.push("c:3".to_string());
        }
        assert!(detect_loop(&sigs, 6).is_some());
        // Window 4 is not divisible by 3 and the tail isn't period 1/2.
        assert!(detect_loop(&sigs, 4).is_none());
    }

    #[test]
    fn short_history_never_fires() {
        let sigs = vec!["a:1".to_string(); 3];
        assert!(detect_loop(&sigs, 6).is_none());
    }

    #[test]
    fn near_miss_does_not_fire() {
        let mut sigs: Vec<String> = (0..5).map(|_| "a:1".to_string()).collect();
        sigs.push("b:2".to_string());
        assert!(detect_loop(&sigs, 6).is_none());
    }
}
