//! Forwarding export synthesis.
//!
//! Each discovered export becomes a module-level export of the bundle bound to
//! the same slot on the `instance` the loader stub creates at load time.

use crate::discovery::ExportSet;

/// Module-level bindings the loader stub declares itself.
///
/// An artifact export with one of these names, or one starting with
/// [`RESERVED_PREFIX`], cannot be forwarded without clobbering the stub.
const STUB_BINDINGS: &[&str] = &["instance", "wasm"];

/// Prefix reserved for bindings the bundler itself generates.
const RESERVED_PREFIX: &str = "__inlay_";

/// Prefix for private bindings of exports that are not plain identifiers.
const ALIAS_PREFIX: &str = "__inlay_export_";

/// Failure to synthesize forwarding exports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// An artifact export collides with a binding the loader stub declares.
    #[error("artifact export {0:?} collides with a loader stub binding")]
    NameTaken(String),
}

/// Render one forwarding declaration per export, in order.
///
/// Plain identifiers are forwarded as `export const name = instance.exports.name;`.
/// Any other name is bound privately and re-exported under its exact spelling
/// as a string export name, so nothing is renamed or dropped. An empty set
/// renders to an empty string.
///
/// # Errors
///
/// Returns [`SynthesisError::NameTaken`] if an export is named like one of
/// the stub's own bindings.
pub fn synthesize(exports: &ExportSet) -> Result<String, SynthesisError> {
    let mut out = String::new();

    for (index, name) in exports.names().enumerate() {
        if STUB_BINDINGS.contains(&name) || name.starts_with(RESERVED_PREFIX) {
            return Err(SynthesisError::NameTaken(name.to_owned()));
        }

        if is_identifier(name) {
            out.push_str(&format!(
                "export const {name} = instance.exports.{name};\n"
            ));
        } else {
            let quoted = js_string(name);
            out.push_str(&format!(
                "const {ALIAS_PREFIX}{index} = instance.exports[{quoted}];\n\
                 export {{ {ALIAS_PREFIX}{index} as {quoted} }};\n"
            ));
        }
    }

    tracing::debug!(count = exports.len(), "Synthesized forwarding exports");
    Ok(out)
}

/// Append synthesized exports to resolved stub source.
///
/// # Errors
///
/// See [`synthesize`].
pub fn append_exports(source: &str, exports: &ExportSet) -> Result<String, SynthesisError> {
    let forwards = synthesize(exports)?;
    if forwards.is_empty() {
        return Ok(source.to_owned());
    }

    let mut out = String::with_capacity(source.len() + forwards.len() + 1);
    out.push_str(source);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&forwards);
    Ok(out)
}

/// JS reserved words that cannot name a `const` binding.
const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield", "arguments",
    "eval",
];

/// Whether `name` can be used as a `const` binding in strict-mode module code.
///
/// Only ASCII identifiers are accepted; everything else takes the string
/// export path, which is always valid.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_owned()).to_string()
}
