// Static token and field detection patterns
use regex::Regex;
use std::sync::OnceLock;

/// A token detection pattern. `secret_group` selects the capture group that is
/// replaced; `0` replaces the whole match.
#[derive(Debug, Clone, Copy)]
pub struct TokenPattern {
    pub name: &'static str,
    pub pattern: &'static str,
    pub secret_group: usize,
}

/// Applied in order. URL credentials and JWTs come before bearer tokens and
/// emails so that a later pattern sees the earlier replacement, not the raw
/// secret.
pub const TOKEN_PATTERNS: &[TokenPattern] = &[
    TokenPattern {
        name: "credential_url",
        pattern: r"(?i)\b[a-z][a-z0-9+.\-]*://([^\s:/?#@]+:[^\s/?#@]+)@",
        secret_group: 1,
    },
    TokenPattern {
        name: "jwt",
        pattern: r"\beyJ[A-Za-z0-9_\-]{5,}\.[A-Za-z0-9_\-]{5,}\.[A-Za-z0-9_\-]*",
        secret_group: 0,
    },
    TokenPattern {
        name: "bearer_token",
        pattern: r"(?i)\bbearer\s+([A-Za-z0-9\-._~+/*]+=*)",
        secret_group: 1,
    },
    TokenPattern {
        name: "api_key",
        pattern: r"\b(?:sk|pk|rk)[-_](?:live|test)[-_][A-Za-z0-9]{8,}\b",
        secret_group: 0,
    },
    TokenPattern {
        name: "generic_secret",
        pattern: r"\b[A-Za-z0-9]{32,}\b",
        secret_group: 0,
    },
    TokenPattern {
        name: "email",
        pattern: r"[A-Za-z0-9._%+*\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}",
        secret_group: 0,
    },
    TokenPattern {
        name: "credit_card",
        pattern: r"\b(?:\d{4}[\s\-]?){3}\d{4}\b|\b3[47]\d{2}[\s\-]?\d{6}[\s\-]?\d{5}\b",
        secret_group: 0,
    },
    TokenPattern {
        name: "phone",
        pattern: r"(?:\+\d{1,3}[\s.\-]?)?(?:\(\d{3}\)|\b\d{3})[\s.\-]\d{3}[\s.\-]\d{4}\b",
        secret_group: 0,
    },
];

/// `key=value`, `key: value`, `"key": "value"` and `'key': 'value'`. An
/// unquoted value may carry an auth scheme (`Authorization: Bearer x`), in
/// which case only the `bare` part after the scheme is the secret.
///
/// A bare value runs to the next delimiter, brackets included, so a
/// bracketed secret such as `[hunter2]` is captured whole.
pub const FIELD_PATTERN: &str = concat!(
    r#"(?P<key>"[A-Za-z_][A-Za-z0-9_.\-]*"|'[A-Za-z_][A-Za-z0-9_.\-]*'|[A-Za-z_][A-Za-z0-9_.\-]*)"#,
    r#"\s*[:=]\s*"#,
    r#"(?P<value>"[^"]*"|'[^']*'|(?:(?i:bearer|basic|digest|token)\s+)?(?P<bare>[^\s"',;&?}]+))"#,
);

pub const FIELD_PATTERN_NAME: &str = "sensitive_field";

#[derive(Debug)]
pub struct CompiledPattern {
    pub name: &'static str,
    pub regex: Regex,
    pub secret_group: usize,
}

/// Compiles the token patterns once. A pattern that fails to compile is
/// skipped and reported, the rest stay active.
pub fn token_patterns() -> &'static [CompiledPattern] {
    static COMPILED: OnceLock<Vec<CompiledPattern>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        TOKEN_PATTERNS
            .iter()
            .filter_map(|p| match Regex::new(p.pattern) {
                Ok(regex) => Some(CompiledPattern {
                    name: p.name,
                    regex,
                    secret_group: p.secret_group,
                }),
                Err(e) => {
                    tracing::error!(pattern = p.name, "Token pattern failed to compile: {}", e);
                    None
                }
            })
            .collect()
    })
}

pub fn field_pattern() -> Option<&'static Regex> {
    static COMPILED: OnceLock<Option<Regex>> = OnceLock::new();
    COMPILED
        .get_or_init(|| match Regex::new(FIELD_PATTERN) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::error!("Field pattern failed to compile: {}", e);
                None
            }
        })
        .as_ref()
}
