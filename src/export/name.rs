//! Deterministic archive entry naming.

/// Maximum length of a sanitized label within an entry name.
const MAX_LABEL_LEN: usize = 64;

/// Fallback label for items whose label sanitizes to nothing.
const FALLBACK_LABEL: &str = "document";

/// Sanitize a display label for use in a file name.
///
/// Anything outside `[A-Za-z0-9._-]` maps to `_`, runs of `_` collapse,
/// leading/trailing `_` are trimmed, and the result is truncated to 64
/// characters. Empty results fall back to `"document"`.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_was_underscore = false;

    for c in label.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') {
            out.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }

    let trimmed: String = out.trim_matches('_').chars().take(MAX_LABEL_LEN).collect();
    if trimmed.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        trimmed
    }
}

/// Name for the archive entry at a 1-based position:
/// `<3-digit index>_<sanitized label>.<ext>`.
pub fn entry_name(position: usize, label: &str, extension: &str) -> String {
    format!("{:03}_{}.{}", position, sanitize_label(label), extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_and_collapses() {
        assert_eq!(sanitize_label("Acme Corp / GmbH"), "Acme_Corp_GmbH");
        assert_eq!(sanitize_label("a   b"), "a_b");
        assert_eq!(sanitize_label("file.v2-final"), "file.v2-final");
    }

    #[test]
    fn sanitize_trims_and_falls_back() {
        assert_eq!(sanitize_label("  "), "document");
        assert_eq!(sanitize_label(""), "document");
        assert_eq!(sanitize_label("__x__"), "x");
    }

    #[test]
    fn sanitize_truncates_long_labels() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_label(&long).len(), 64);
    }

    #[test]
    fn entry_names_are_three_digit_indexed() {
        assert_eq!(entry_name(1, "Acme Corp", "pdf"), "001_Acme_Corp.pdf");
        assert_eq!(entry_name(42, "x", "pdf"), "042_x.pdf");
        assert_eq!(entry_name(100, "", "pdf"), "100_document.pdf");
    }
}
