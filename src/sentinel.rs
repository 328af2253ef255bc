// src/sentinel.rs

//! Completion markers for code blocks.
//!
//! Each job appends a statement that writes a one-off marker to the REPL's
//! stdout once the user code has run. The coordinator watches stdout for that
//! marker at the end of a chunk and treats it as "this block is done".
//!
//! Uniqueness is best effort: a random float, the current time in
//! milliseconds and the code length are joined behind a fixed tag. Two jobs
//! never run at the same time, and program output ending with a freshly
//! generated marker is treated as negligible. If it happens, the job simply
//! completes early.

use std::fmt;

use chrono::Utc;

use crate::errors::Result;

/// Fixed prefix of every marker.
pub const SENTINEL_TAG: &str = "SIGIL_BLOCK_DONE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel(String);

impl Sentinel {
    /// Generate a fresh marker for a block of `code`.
    pub fn for_code(code: &str) -> Self {
        let random: f64 = rand::random();
        let millis = Utc::now().timestamp_millis();
        Self(format!(
            "{SENTINEL_TAG}{random}_{millis}_{}",
            code.encode_utf16().count()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wrap `code` so that a thrown error is printed to stderr instead of
/// killing the REPL, then unconditionally write `sentinel` to stdout.
///
/// The code is passed to `eval` as a JSON string literal, so it is never
/// interpreted as part of the wrapper itself. Inside the REPL `console` is
/// bound to the REPL's output, so the error goes through `process.stderr`
/// directly. Both writes are `void`ed: `write` returns `false` under
/// backpressure and the REPL would echo that after the sentinel.
pub fn wrap_code(code: &str, sentinel: &Sentinel) -> Result<String> {
    let code_literal = serde_json::to_string(code).map_err(anyhow::Error::from)?;
    let sentinel_literal = serde_json::to_string(sentinel.as_str()).map_err(anyhow::Error::from)?;

    Ok(format!(
        "\ntry {{ eval({code_literal}); }} catch(e) {{ void process.stderr.write(require(\"util\").inspect(e) + \"\\n\"); }}\nvoid process.stdout.write({sentinel_literal});\n"
    ))
}

/// Result of feeding one stdout chunk to a [`SentinelScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// Sentinel not seen yet; forward this text (may be empty).
    Output(String),
    /// Sentinel seen at the end of the stream so far; forward this text and
    /// finish the job.
    Done(String),
}

/// Finds a sentinel at the tail of a stdout stream.
///
/// The check is a plain suffix match on the text seen so far. Output is
/// passed through as soon as it arrives, except for a trailing fragment that
/// could be the start of the sentinel: that fragment is held back until the
/// next chunk shows whether it really was the sentinel. This keeps a marker
/// split across two OS reads from leaking into the sink.
#[derive(Debug)]
pub struct SentinelScanner {
    sentinel: String,
    held: String,
}

impl SentinelScanner {
    pub fn new(sentinel: &Sentinel) -> Self {
        Self {
            sentinel: sentinel.as_str().to_string(),
            held: String::new(),
        }
    }

    pub fn feed(&mut self, chunk: &str) -> Scan {
        let mut text = std::mem::take(&mut self.held);
        text.push_str(chunk);

        if let Some(before) = text.strip_suffix(self.sentinel.as_str()) {
            return Scan::Done(before.to_string());
        }

        let keep = self.partial_suffix_len(&text);
        if keep > 0 {
            self.held = text.split_off(text.len() - keep);
        }
        Scan::Output(text)
    }

    /// Release anything held back; used when the stream ends without a
    /// sentinel.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.held)
    }

    /// Length of the longest proper prefix of the sentinel that `text` ends
    /// with.
    fn partial_suffix_len(&self, text: &str) -> usize {
        let max = self.sentinel.len().saturating_sub(1).min(text.len());
        (1..=max)
            .rev()
            .find(|&n| {
                text.is_char_boundary(text.len() - n)
                    && self.sentinel.is_char_boundary(n)
                    && text.ends_with(&self.sentinel[..n])
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentinel(s: &str) -> Sentinel {
        Sentinel(s.to_string())
    }

    #[test]
    fn sentinel_has_tag_and_code_length() {
        let s = Sentinel::for_code("console.log(1)");
        assert!(s.as_str().starts_with(SENTINEL_TAG));
        assert!(s.as_str().ends_with("_14"));
    }

    #[test]
    fn sentinels_differ_between_calls() {
        let a = Sentinel::for_code("x");
        let b = Sentinel::for_code("x");
        assert_ne!(a, b);
    }

    #[test]
    fn wrap_escapes_code_as_a_string_literal() {
        let code = "console.log(\"hi\")\nthrow new Error('x')";
        let wrapped = wrap_code(code, &sentinel("SIGIL_BLOCK_DONE1_2_3")).unwrap();

        assert!(wrapped.contains(
            r#"try { eval("console.log(\"hi\")\nthrow new Error('x')"); } catch(e) { "#
        ));
        assert!(wrapped.ends_with("\nvoid process.stdout.write(\"SIGIL_BLOCK_DONE1_2_3\");\n"));
    }

    #[test]
    fn wrap_sends_errors_to_the_real_stderr_without_an_echo() {
        let wrapped = wrap_code("throw 1", &sentinel("SIGIL_BLOCK_DONE1_2_3")).unwrap();

        assert!(wrapped.contains(
            r#"catch(e) { void process.stderr.write(require("util").inspect(e) + "\n"); }"#
        ));
        assert!(!wrapped.contains("console.error"));
        assert!(!wrapped.contains("&&undefined"));
        assert!(wrapped.ends_with('\n'));
    }

    #[test]
    fn plain_output_passes_through() {
        let mut scanner = SentinelScanner::new(&sentinel("SIGIL_END"));
        assert_eq!(scanner.feed("hello\n"), Scan::Output("hello\n".into()));
    }

    #[test]
    fn sentinel_at_tail_is_stripped() {
        let mut scanner = SentinelScanner::new(&sentinel("SIGIL_END"));
        assert_eq!(scanner.feed("42\nSIGIL_END"), Scan::Done("42\n".into()));
    }

    #[test]
    fn sentinel_alone_completes_with_empty_text() {
        let mut scanner = SentinelScanner::new(&sentinel("SIGIL_END"));
        assert_eq!(scanner.feed("SIGIL_END"), Scan::Done(String::new()));
    }

    #[test]
    fn sentinel_in_the_middle_is_not_a_match() {
        let mut scanner = SentinelScanner::new(&sentinel("SIGIL_END"));
        assert_eq!(
            scanner.feed("SIGIL_END and more\n"),
            Scan::Output("SIGIL_END and more\n".into())
        );
    }

    #[test]
    fn sentinel_split_across_chunks_is_detected() {
        let mut scanner = SentinelScanner::new(&sentinel("SIGIL_END"));
        assert_eq!(scanner.feed("out\nSIGI"), Scan::Output("out\n".into()));
        assert_eq!(scanner.feed("L_END"), Scan::Done(String::new()));
    }

    #[test]
    fn held_prefix_is_released_when_it_was_not_the_sentinel() {
        let mut scanner = SentinelScanner::new(&sentinel("SIGIL_END"));
        assert_eq!(scanner.feed("value: S"), Scan::Output("value: ".into()));
        assert_eq!(scanner.feed("ome\n"), Scan::Output("Some\n".into()));
        assert_eq!(scanner.flush(), "");
    }

    #[test]
    fn flush_returns_held_text() {
        let mut scanner = SentinelScanner::new(&sentinel("SIGIL_END"));
        let _ = scanner.feed("abc SIG");
        assert_eq!(scanner.flush(), "SIG");
    }

    #[test]
    fn multibyte_output_does_not_panic() {
        let mut scanner = SentinelScanner::new(&sentinel("SIGIL_END"));
        assert_eq!(scanner.feed("héllo ✓"), Scan::Output("héllo ✓".into()));
    }
}
