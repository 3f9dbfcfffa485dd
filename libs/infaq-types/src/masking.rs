/// Marker that replaces the hidden part of a secret.
pub const REDACTION_MARKER: &str = "****";

/// Maximum number of leading characters kept visible.
const MASK_PREFIX_CHARS: usize = 4;

/// Masks a secret for display: a short prefix followed by [`REDACTION_MARKER`].
///
/// At most half of the secret is ever revealed, the output is deterministic
/// (same input, same output) and never equals the input.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len == 0 {
        return REDACTION_MARKER.to_string();
    }

    let keep = std::cmp::min(MASK_PREFIX_CHARS, len / 2);
    let prefix: String = secret.chars().take(keep).collect();
    let masked = format!("{prefix}{REDACTION_MARKER}");

    // A secret that already looks like its own mask must still differ.
    if masked == secret {
        "*".repeat(len + 1)
    } else {
        masked
    }
}

/// Returns true when an admin-submitted value is a masked echo (or empty)
/// rather than a new secret.
pub fn is_masked_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.starts_with(REDACTION_MARKER) || trimmed.contains(REDACTION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_short_prefix() {
        assert_eq!(mask_secret("sk_live_abcdef123456"), "sk_l****");
    }

    #[test]
    fn mask_short_secret_reveals_at_most_half() {
        assert_eq!(mask_secret("abcd"), "ab****");
        assert_eq!(mask_secret("a"), "****");
    }

    #[test]
    fn mask_is_stable() {
        assert_eq!(mask_secret("whsec_123456"), mask_secret("whsec_123456"));
    }

    #[test]
    fn mask_never_equals_input() {
        for secret in ["****", "ab****", "abcd****", "x", "********", "sk_test_1"] {
            assert_ne!(mask_secret(secret), secret, "mask equal for {secret}");
        }
    }

    #[test]
    fn mask_handles_multibyte() {
        assert_eq!(mask_secret("ééééééééé"), "éééé****");
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_masked_placeholder(""));
        assert!(is_masked_placeholder("   "));
        assert!(is_masked_placeholder("****1234"));
        assert!(is_masked_placeholder("sk_l****"));
        assert!(!is_masked_placeholder("sk_live_new_value"));
    }

    #[test]
    fn mask_output_is_a_placeholder() {
        assert!(is_masked_placeholder(&mask_secret("sk_live_abcdef123456")));
    }
}
