//! Locating the new tokens in a refresh response.
//!
//! The backend wraps the tokens in a `Data` envelope and/or a nested `Token` object depending on
//! the endpoint version. Each strategy picks one candidate object; the first candidate that
//! carries both tokens wins. This list is an integration point with a backend we do not
//! control, so keep it tolerant.
use serde_json::Value;

use crate::store::Credential;

pub struct Strategy {
    pub name: &'static str,
    pub locate: fn(&Value) -> Option<&Value>,
}

pub static STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "Data.Token",
        locate: |v| v.get("Data")?.get("Token"),
    },
    Strategy {
        name: "Data",
        locate: |v| v.get("Data"),
    },
    Strategy {
        name: "Token",
        locate: |v| v.get("Token"),
    },
    Strategy {
        name: "root",
        locate: |v| Some(v),
    },
];

const ACCESS_KEYS: [&str; 2] = ["AccessToken", "accessToken"];
const REFRESH_KEYS: [&str; 2] = ["RefreshToken", "refreshToken"];

fn string_field(object: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| object.get(*k)?.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Returns the credential and the name of the strategy that found it.
pub fn extract_credential(payload: &Value) -> Option<(Credential, &'static str)> {
    STRATEGIES.iter().find_map(|strategy| {
        let candidate = (strategy.locate)(payload)?;
        let access_token = string_field(candidate, &ACCESS_KEYS)?;
        let refresh_token = string_field(candidate, &REFRESH_KEYS)?;
        Some((Credential { access_token, refresh_token }, strategy.name))
    })
}
