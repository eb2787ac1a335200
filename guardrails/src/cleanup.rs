//! Syntactic cleanup of raw model output before it is pruned and verified.

use std::sync::LazyLock;

use regex::Regex;

static FENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*```[a-zA-Z0-9_+-]*\s*$").expect("FENCE_LINE regex should compile")
});
static MULTI_BLANK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("MULTI_BLANK regex should compile"));
static PACKAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*package\s+[a-zA-Z_]\w*").expect("PACKAGE_LINE regex should compile")
});

/// Remove a markdown fence wrapping the whole output.
///
/// Only the first and last lines are candidates. Fences inside the body
/// (doc-test examples, JSDoc `@example` blocks) belong to the source and are
/// left alone.
pub fn strip_code_fences(text: &str) -> String {
    let mut lines: Vec<&str> = text.trim().split('\n').collect();

    let opened = lines.first().is_some_and(|line| FENCE_LINE.is_match(line));
    if opened {
        lines.remove(0);
    }
    if lines.last().is_some_and(|line| FENCE_LINE.is_match(line)) {
        lines.pop();
    } else if opened {
        // Closing fence glued onto the last code line.
        if let Some(last) = lines.last_mut() {
            let line = *last;
            if let Some(stripped) = line.trim_end().strip_suffix("```") {
                *last = stripped;
            }
        }
    }

    MULTI_BLANK
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Prepend the original's `package` clause when the model dropped it.
pub fn ensure_package_line(output: &str, original: &str) -> String {
    if PACKAGE_LINE.is_match(output) {
        return output.to_string();
    }
    match PACKAGE_LINE.find(original) {
        Some(m) => format!("{}\n\n{}", m.as_str().trim(), output),
        None => output.to_string(),
    }
}

/// Fence stripping followed by package restoration.
pub fn clean_output(raw: &str, original: &str) -> String {
    ensure_package_line(&strip_code_fences(raw), original)
}
