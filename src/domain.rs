use crate::model::error::{DeployError, Result};

/// Trims, strips the trailing dot, converts to ASCII (IDNA) and lowercases.
pub fn normalize_domain(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(DeployError::Config("domain name is required".to_string()));
    }
    let ascii = idna::domain_to_ascii(trimmed)
        .map_err(|err| DeployError::Config(format!("invalid domain name '{trimmed}': {err}")))?;
    Ok(ascii.to_lowercase())
}

/// Fully-qualified zone name as the DNS service lists it (`example.com.`).
pub fn qualified_zone_name(domain: &str) -> String {
    format!("{}.", domain.trim_end_matches('.'))
}

/// Prepends `label` to `root`; an empty label yields the apex itself.
pub fn hostname_for(label: &str, root: &str) -> String {
    let label = label.trim().trim_matches('.');
    if label.is_empty() {
        root.to_string()
    } else {
        format!("{label}.{root}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_trailing_dot() {
        assert_eq!(normalize_domain(" Example.TEST. ").unwrap(), "example.test");
    }

    #[test]
    fn normalizes_unicode_to_punycode() {
        assert_eq!(normalize_domain("testé.fr").unwrap(), "xn--test-epa.fr");
    }

    #[test]
    fn rejects_blank_domain() {
        let err = normalize_domain("  . ").unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn zone_name_is_dot_qualified_once() {
        assert_eq!(qualified_zone_name("example.test"), "example.test.");
        assert_eq!(qualified_zone_name("example.test."), "example.test.");
    }

    #[test]
    fn hostname_with_and_without_label() {
        assert_eq!(hostname_for("radiator", "example.test"), "radiator.example.test");
        assert_eq!(hostname_for("", "example.test"), "example.test");
    }
}
