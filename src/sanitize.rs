use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

static REGEX: OnceLock<Regex> = OnceLock::new();

fn regex() -> &'static Regex {
    REGEX.get_or_init(|| {
        let s = ["secret", "key", "pkey", "session", "password", "token", "code"]
            .map(|s| format!(r#"(\b|[-_]){s}(\b|[-_])"#))
            .join("|");

        Regex::new(&format!(r#"(?i)({s})"#)).expect("Unable to compile regex")
    })
}

pub static SANITIZED_VALUE: &str = "**********";

pub fn should_sanitize(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    match key.as_str() {
        "authorization" | "cookie" | "password" | "set-cookie" => true,
        k if k.ends_with("token") || k.ends_with("password") => true,
        k => regex().is_match(k),
    }
}

/// Mask the values of secret-looking query parameters before they reach a log line.
pub fn sanitize_query(query: &IndexMap<String, String>) -> IndexMap<&str, &str> {
    query
        .iter()
        .map(|(k, v)| {
            let v = if should_sanitize(k) { SANITIZED_VALUE } else { v.as_str() };
            (k.as_str(), v)
        })
        .collect()
}
