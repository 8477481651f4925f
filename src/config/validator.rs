//! Config validation: template shape, adapter names, glob patterns.

use crate::config::{StrategyKind, TenancyConfig};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

/// Adapter names the orchestrator can build.
pub const KNOWN_ADAPTERS: &[&str] = &["tables", "cache", "storage", "session", "logging", "settings"];

pub fn validate(config: &TenancyConfig) -> Result<(), ConfigError> {
    validate_template(&config.table_template)?;

    if !config.cache_prefix_format.contains("{id}") {
        return Err(ConfigError::MissingPlaceholder("{id}"));
    }

    if config.identification.chain.is_empty() {
        return Err(ConfigError::Validation(
            "identification chain must name at least one strategy".into(),
        ));
    }
    if config.identification.path_segment_index == 0 {
        return Err(ConfigError::Validation(
            "path_segment_index is 1-indexed; 0 is invalid".into(),
        ));
    }
    if config.identification.chain.contains(&StrategyKind::HeaderOrQuery)
        && config.identification.header_name.is_none()
        && config.identification.query_param.is_none()
    {
        return Err(ConfigError::Validation(
            "header_or_query strategy with both header and query disabled".into(),
        ));
    }

    let mut seen = HashSet::new();
    for name in &config.adapters {
        if !KNOWN_ADAPTERS.contains(&name.as_str()) {
            return Err(ConfigError::UnknownAdapter(name.clone()));
        }
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::DuplicateAdapter(name.clone()));
        }
    }

    for pattern in &config.bypass_patterns {
        compile_glob(pattern)?;
    }

    Ok(())
}

/// Both placeholders must appear exactly once or the template cannot be
/// inverted back to a tenant id.
pub fn validate_template(template: &str) -> Result<(), ConfigError> {
    for placeholder in ["{id}", "{table}"] {
        match template.matches(placeholder).count() {
            1 => {}
            0 => return Err(ConfigError::MissingPlaceholder(placeholder)),
            _ => {
                return Err(ConfigError::Validation(format!(
                    "table template must contain {} exactly once",
                    placeholder
                )))
            }
        }
    }
    Ok(())
}

/// Compile a glob-style route pattern (`*` = one segment, `**` = any span,
/// `?` = one char) into an anchored regex over the request path.
pub fn compile_glob(pattern: &str) -> Result<Regex, ConfigError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    re.push_str(".*");
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| ConfigError::InvalidBypassPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentificationConfig;

    #[test]
    fn default_config_validates() {
        validate(&TenancyConfig::default()).unwrap();
    }

    #[test]
    fn template_missing_placeholder_rejected() {
        let config = TenancyConfig {
            table_template: "tenant_{id}_data".into(),
            ..TenancyConfig::default()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingPlaceholder("{table}"))
        ));
    }

    #[test]
    fn template_duplicate_placeholder_rejected() {
        let config = TenancyConfig {
            table_template: "{id}_{id}_{table}".into(),
            ..TenancyConfig::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_adapter_rejected() {
        let config = TenancyConfig {
            adapters: vec!["tables".into(), "blob".into()],
            ..TenancyConfig::default()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnknownAdapter(name)) if name == "blob"
        ));
    }

    #[test]
    fn duplicate_adapter_rejected() {
        let config = TenancyConfig {
            adapters: vec!["tables".into(), "tables".into()],
            ..TenancyConfig::default()
        };
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateAdapter(_))));
    }

    #[test]
    fn header_and_query_both_disabled_rejected() {
        let config = TenancyConfig {
            identification: IdentificationConfig {
                chain: vec![StrategyKind::HeaderOrQuery],
                header_name: None,
                query_param: None,
                ..IdentificationConfig::default()
            },
            ..TenancyConfig::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_segment_index_rejected() {
        let config = TenancyConfig {
            identification: IdentificationConfig {
                path_segment_index: 0,
                ..IdentificationConfig::default()
            },
            ..TenancyConfig::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn glob_single_star_stops_at_slash() {
        let re = compile_glob("/health/*").unwrap();
        assert!(re.is_match("/health/live"));
        assert!(!re.is_match("/health/live/deep"));
    }

    #[test]
    fn glob_double_star_spans_segments() {
        let re = compile_glob("/webhooks/**").unwrap();
        assert!(re.is_match("/webhooks/stripe/invoice"));
        assert!(!re.is_match("/api/webhooks/stripe"));
    }

    #[test]
    fn glob_escapes_regex_metachars() {
        let re = compile_glob("/v1.0/ping").unwrap();
        assert!(re.is_match("/v1.0/ping"));
        assert!(!re.is_match("/v1x0/ping"));
    }
}
