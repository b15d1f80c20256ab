use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[^\s@]+@[-\w]+(\.[-\w]+)+$").expect("email pattern"));

/// A value "has a protocol" when it starts with a scheme (`word:`,
/// optionally followed by slashes) or with any non-word character — `/x`,
/// `#x` and `?x` style references must never be prefixed.
static HAS_PROTOCOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^((\w+:(/{2,})?)|(\W))").expect("protocol pattern"));

/// Normalizes a raw form value before it reaches the anchor command:
/// email-shaped values gain `mailto:`, bare domains gain the configured
/// default protocol. Everything else passes through trimmed.
pub fn normalize_anchor_value(raw: &str, default_protocol: Option<&str>) -> String {
    let value = raw.trim();
    if value.is_empty() {
        return String::new();
    }

    if EMAIL.is_match(value) {
        return format!("mailto:{value}");
    }

    if let Some(protocol) = default_protocol {
        if !HAS_PROTOCOL.is_match(value) {
            return format!("{protocol}{value}");
        }
    }

    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_values_gain_mailto() {
        assert_eq!(
            normalize_anchor_value("jane.doe@example.com", Some("https://")),
            "mailto:jane.doe@example.com"
        );
    }

    #[test]
    fn mailto_values_pass_through() {
        assert_eq!(
            normalize_anchor_value("mailto:jane@example.com", Some("https://")),
            "mailto:jane@example.com"
        );
    }

    #[test]
    fn bare_domains_gain_default_protocol() {
        assert_eq!(
            normalize_anchor_value("example.com", Some("https://")),
            "https://example.com"
        );
        assert_eq!(
            normalize_anchor_value("www.example.com/a?b=c", Some("http://")),
            "http://www.example.com/a?b=c"
        );
    }

    #[test]
    fn values_with_scheme_or_leading_symbol_are_untouched() {
        assert_eq!(
            normalize_anchor_value("https://example.com", Some("https://")),
            "https://example.com"
        );
        assert_eq!(
            normalize_anchor_value("/local/path", Some("https://")),
            "/local/path"
        );
        assert_eq!(normalize_anchor_value("#section", Some("https://")), "#section");
    }

    #[test]
    fn no_default_protocol_means_no_prefixing() {
        assert_eq!(normalize_anchor_value("example.com", None), "example.com");
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(
            normalize_anchor_value("  https://example.com  ", None),
            "https://example.com"
        );
    }
}
