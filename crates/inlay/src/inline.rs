//! Payload inlining.
//!
//! The loader stub imports the artifact from its (resolved) absolute path.
//! Inlining swaps that import for a local function with the same name that
//! decodes an embedded base64 payload and hands it to
//! `WebAssembly.instantiate`, so the bundle references no external file.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::config::ArtifactPath;

/// Helper that turns the embedded base64 text back into bytes.
///
/// Node exposes `Buffer`; browsers and other runtimes fall back to `atob`.
const DECODER: &str = r#"const __inlay_decode = (b64) => {
  if (typeof Buffer === "function") return Buffer.from(b64, "base64");
  const bin = atob(b64);
  const bytes = new Uint8Array(bin.length);
  for (let i = 0; i < bin.length; i++) bytes[i] = bin.charCodeAt(i);
  return bytes;
};"#;

/// Start of the embedded payload literal in a bundle.
const PAYLOAD_OPEN: &str = "__inlay_decode(\"";

/// Failure to embed or recover the payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InlineError {
    /// The payload is larger than the configured cap.
    #[error("artifact is {size} bytes, larger than the {limit} byte embed limit")]
    TooLarge {
        /// Payload size in bytes.
        size: u64,
        /// Configured cap in bytes.
        limit: u64,
    },

    /// The stub has no `import <name> from <artifact path>;` statement.
    #[error("loader stub does not import the artifact from {0}")]
    MissingImport(String),

    /// The stub imports the artifact more than once.
    #[error("loader stub imports the artifact {0} times, expected once")]
    AmbiguousImport(usize),

    /// No embedded payload was found in the bundle text.
    #[error("bundle contains no embedded payload")]
    PayloadNotFound,

    /// The embedded payload is not valid base64.
    #[error("embedded payload is not valid base64: {0}")]
    Decode(String),
}

/// Encode the payload as it appears inside the bundle.
///
/// The same bytes always encode to the same text.
pub fn encode_payload(wasm_bytes: &[u8]) -> String {
    STANDARD.encode(wasm_bytes)
}

/// Embed `wasm_bytes` into `source`, replacing the artifact import.
///
/// # Errors
///
/// - [`InlineError::TooLarge`] if the payload exceeds `max_size`
/// - [`InlineError::MissingImport`] if the artifact import is not found
/// - [`InlineError::AmbiguousImport`] if it is found more than once
pub fn inline(
    source: &str,
    artifact: &ArtifactPath,
    wasm_bytes: &[u8],
    max_size: Option<u64>,
) -> Result<String, InlineError> {
    let size = wasm_bytes.len() as u64;
    if let Some(limit) = max_size
        && size > limit
    {
        return Err(InlineError::TooLarge { size, limit });
    }

    let literal = artifact.js_literal();
    let imports: Vec<(usize, &str)> = source
        .lines()
        .enumerate()
        .filter_map(|(i, line)| import_binding(line, &literal).map(|name| (i, name)))
        .collect();

    let (line_no, binding) = match imports.as_slice() {
        [] => return Err(InlineError::MissingImport(literal)),
        [single] => *single,
        many => return Err(InlineError::AmbiguousImport(many.len())),
    };

    let payload = encode_payload(wasm_bytes);
    tracing::debug!(
        binding,
        bytes = wasm_bytes.len(),
        encoded = payload.len(),
        "Inlining artifact payload"
    );

    let loader = format!(
        "{DECODER}\nconst {binding} = (imports) => WebAssembly.instantiate({PAYLOAD_OPEN}{payload}\"), imports);"
    );

    let mut out = String::with_capacity(source.len() + loader.len());
    for (i, line) in source.lines().enumerate() {
        if i == line_no {
            out.push_str(&loader);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    Ok(out)
}

/// Recover the embedded payload from bundle text.
///
/// # Errors
///
/// [`InlineError::PayloadNotFound`] if no payload literal is present, or
/// [`InlineError::Decode`] if it is not valid base64.
pub fn extract_payload(bundle: &str) -> Result<Vec<u8>, InlineError> {
    let start = bundle
        .find(PAYLOAD_OPEN)
        .ok_or(InlineError::PayloadNotFound)?
        + PAYLOAD_OPEN.len();
    let len = bundle[start..]
        .find('"')
        .ok_or(InlineError::PayloadNotFound)?;

    STANDARD
        .decode(&bundle[start..start + len])
        .map_err(|e| InlineError::Decode(e.to_string()))
}

/// If `line` is `import <ident> from <literal>;`, return `<ident>`.
fn import_binding<'a>(line: &'a str, literal: &str) -> Option<&'a str> {
    let rest = line.trim().strip_prefix("import ")?;
    let (binding, from) = rest.split_once(" from ")?;
    let binding = binding.trim();
    let from = from.trim().trim_end_matches(';').trim_end();

    let valid_binding = !binding.is_empty()
        && binding
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    (valid_binding && from == literal).then_some(binding)
}
