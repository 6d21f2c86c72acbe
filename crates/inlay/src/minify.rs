//! Size reduction for the final bundle text.
//!
//! This is a conservative line-based pass, not a JS minifier: it drops
//! whole-line comments, blank lines and indentation, and keeps line breaks so
//! automatic semicolon insertion behaves exactly as before. A line that mixes
//! a block comment with code is kept as it is. Text that could carry a string
//! or comment across a line break in a way a line-based pass cannot follow
//! (template literals, `\` line continuations, a block comment opened after
//! code) is returned unchanged.

/// Reduce the size of JS module text.
pub fn minify(source: &str) -> String {
    if source.contains('`') || source.lines().any(|l| l.trim_end().ends_with('\\')) {
        tracing::debug!("Skipping size reduction: source has multi-line string syntax");
        return source.to_owned();
    }

    let mut out = String::with_capacity(source.len());
    let mut in_block_comment = false;

    for line in source.lines() {
        let mut code = line.trim();

        if in_block_comment {
            let Some(end) = code.find("*/") else {
                continue;
            };
            in_block_comment = false;
            code = code[end + 2..].trim_start();
        }
        if code.is_empty() || code.starts_with("//") {
            continue;
        }
        if let Some(body) = code.strip_prefix("/*") {
            match body.find("*/") {
                Some(end) if body[end + 2..].trim().is_empty() => continue,
                Some(_) => {}
                None => {
                    in_block_comment = true;
                    continue;
                }
            }
        }
        if opens_block_comment(code) {
            tracing::debug!("Skipping size reduction: block comment opens after code");
            return source.to_owned();
        }

        out.push_str(code);
        out.push('\n');
    }

    tracing::debug!(
        before = source.len(),
        after = out.len(),
        "Reduced bundle size"
    );
    out
}

/// Whether `line` leaves a `/*` open at its end.
fn opens_block_comment(line: &str) -> bool {
    line.rfind("/*")
        .is_some_and(|open| !line[open + 2..].contains("*/"))
}
