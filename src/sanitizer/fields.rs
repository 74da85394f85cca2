/// Field names treated as sensitive when no override is configured.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "token",
    "accessToken",
    "refreshToken",
    "idToken",
    "apiKey",
    "apiSecret",
    "clientSecret",
    "privateKey",
    "authorization",
    "auth",
    "cookie",
    "setCookie",
    "session",
    "sessionId",
    "ssn",
    "creditCard",
    "cardNumber",
    "cvv",
    "pin",
    "email",
    "phone",
    "phoneNumber",
    "address",
];

/// Trailing words that mark a camelCase/PascalCase key as a composite of a
/// sensitive name, e.g. `userEmail` or `sessionId`.
const COMPOSITE_SUFFIXES: &[&str] = &[
    "id", "name", "email", "phone", "password", "token", "key", "address",
];

const SEPARATORS: &[char] = &['_', '-', '.'];

/// Names shorter than this only match exactly or at a separator, never as a
/// word inside a longer key.
const WORD_MATCH_MIN_LEN: usize = 5;
const MAX_WORD_WINDOW: usize = 3;

#[derive(Debug, Clone)]
struct SensitiveField {
    lower: String,
    compact: String,
}

/// Decides whether a key names sensitive data.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    fields: Vec<SensitiveField>,
}

impl FieldMatcher {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = names
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref().trim();
                if name.is_empty() {
                    return None;
                }
                Some(SensitiveField {
                    lower: name.to_lowercase(),
                    compact: compact(name),
                })
            })
            .collect();
        Self { fields }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SENSITIVE_FIELDS)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.trim_matches(|c| c == '"' || c == '\'').trim();
        if key.is_empty() {
            return false;
        }

        let lower = key.to_lowercase();
        let compact_key = compact(key);
        let words = split_words(key);

        self.fields.iter().any(|field| {
            compact_key == field.compact
                || has_separated_affix(&lower, &field.lower)
                || is_composite(&words, &field.compact)
                || (field.compact.len() >= WORD_MATCH_MIN_LEN
                    && matches_word_window(&words, &field.compact))
        })
    }
}

impl Default for FieldMatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn compact(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn has_separated_affix(key: &str, field: &str) -> bool {
    SEPARATORS.iter().any(|sep| {
        key.strip_prefix(field)
            .is_some_and(|rest| rest.starts_with(*sep))
            || key
                .strip_suffix(field)
                .is_some_and(|rest| rest.ends_with(*sep))
    })
}

fn is_composite(words: &[String], field: &str) -> bool {
    let [.., before, last] = words else {
        return false;
    };
    if !COMPOSITE_SUFFIXES.contains(&last.as_str()) {
        return false;
    }
    last == field || format!("{before}{last}") == field
}

fn matches_word_window(words: &[String], field: &str) -> bool {
    (1..=MAX_WORD_WINDOW.min(words.len())).any(|size| {
        words
            .windows(size)
            .any(|window| window.concat() == field)
    })
}

/// Splits `userEmailAddress`, `auth_token`, `HTTPHeader` and similar into
/// lowercase words.
pub(crate) fn split_words(key: &str) -> Vec<String> {
    let mut words = Vec::new();

    for segment in key.split(|c: char| !c.is_alphanumeric()) {
        let chars: Vec<char> = segment.chars().collect();
        let mut current = String::new();

        for (i, &c) in chars.iter().enumerate() {
            if i > 0 && !current.is_empty() {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                let boundary = (prev.is_lowercase() && c.is_uppercase())
                    || (prev.is_uppercase() && c.is_uppercase() && next_is_lower)
                    || (prev.is_alphabetic() && c.is_numeric())
                    || (prev.is_numeric() && c.is_alphabetic());
                if boundary {
                    words.push(std::mem::take(&mut current));
                }
            }
            current.extend(c.to_lowercase());
        }

        if !current.is_empty() {
            words.push(current);
        }
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_common_key_styles() {
        assert_eq!(split_words("userEmail"), vec!["user", "email"]);
        assert_eq!(split_words("auth_token"), vec!["auth", "token"]);
        assert_eq!(split_words("api-key"), vec!["api", "key"]);
        assert_eq!(split_words("HTTPHeader"), vec!["http", "header"]);
        assert_eq!(split_words("UserID"), vec!["user", "id"]);
    }

    #[test]
    fn exact_and_normalized_matches() {
        let matcher = FieldMatcher::with_defaults();
        assert!(matcher.is_sensitive("password"));
        assert!(matcher.is_sensitive("PASSWORD"));
        assert!(matcher.is_sensitive("api_key"));
        assert!(matcher.is_sensitive("api-key"));
        assert!(matcher.is_sensitive("apiKey"));
        assert!(matcher.is_sensitive("\"token\""));
    }

    #[test]
    fn separator_affixes() {
        let matcher = FieldMatcher::with_defaults();
        assert!(matcher.is_sensitive("auth_token"));
        assert!(matcher.is_sensitive("pin_code"));
        assert!(matcher.is_sensitive("x.secret"));
    }

    #[test]
    fn composite_suffixes() {
        let matcher = FieldMatcher::with_defaults();
        assert!(matcher.is_sensitive("userEmail"));
        assert!(matcher.is_sensitive("UserPassword"));
        assert!(matcher.is_sensitive("sessionId"));
        assert!(matcher.is_sensitive("billingAddress"));
        assert!(matcher.is_sensitive("authToken"));
    }

    #[test]
    fn word_window_for_long_names() {
        let matcher = FieldMatcher::with_defaults();
        assert!(matcher.is_sensitive("passwordHint"));
        assert!(matcher.is_sensitive("userCreditCardExpiry"));
        assert!(matcher.is_sensitive("old_secret_value"));
    }

    #[test]
    fn avoids_short_substring_false_positives() {
        let matcher = FieldMatcher::new(["key", "pin", "token"]);
        assert!(!matcher.is_sensitive("monkey"));
        assert!(!matcher.is_sensitive("keyboard"));
        assert!(!matcher.is_sensitive("spinner"));
        assert!(!matcher.is_sensitive("tokenizer"));
        assert!(matcher.is_sensitive("primaryKey"));
    }

    #[test]
    fn ignores_unrelated_keys() {
        let matcher = FieldMatcher::with_defaults();
        assert!(!matcher.is_sensitive("message"));
        assert!(!matcher.is_sensitive("user"));
        assert!(!matcher.is_sensitive("duration_ms"));
        assert!(!matcher.is_sensitive(""));
    }

    #[test]
    fn empty_names_are_dropped() {
        let matcher = FieldMatcher::new(["", "  ", "secret"]);
        assert_eq!(matcher.len(), 1);
    }
}
