//! Decides what a failed request needs: nothing, a session reset, or a token refresh.
use http::StatusCode;
use tracing::warn;

use crate::config::with_leading_slash;
use crate::{Error, Request};

/// Paths that get special treatment when they answer 401. Matched as prefixes of the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPaths {
    refresh: String,
    excluded: Vec<String>,
}

impl AuthPaths {
    /// `base_path` is the path component of the base URL, prepended to every endpoint path.
    /// Empty endpoint paths are skipped, since an empty prefix would match every request.
    pub fn new<'a>(base_path: &str, refresh: &str, excluded: impl IntoIterator<Item = &'a str>) -> Self {
        let resolve = |path: &str| format!("{}{}", base_path, with_leading_slash(path.trim()));
        let excluded = excluded
            .into_iter()
            .filter(|p| {
                let keep = !p.trim().is_empty();
                if !keep {
                    warn!("Ignoring empty authentication endpoint path");
                }
                keep
            })
            .map(resolve)
            .collect();
        Self {
            refresh: resolve(refresh),
            excluded,
        }
    }

    pub fn is_refresh(&self, path: &str) -> bool {
        path.starts_with(&self.refresh)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|p| path.starts_with(p.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A response other than 401. Returned to the caller as is.
    PassThrough,
    /// No response was received. Returned as is.
    Network,
    /// 401 from a login or credential-recovery endpoint. Returned as is.
    AuthExcluded,
    /// 401 from the refresh endpoint itself. The session is over.
    RefreshEndpoint,
    /// 401 on a request that was already replayed once after a refresh. Returned as is.
    ExhaustedRetry,
    /// 401 that a token refresh may fix.
    Recoverable,
}

pub fn classify(paths: &AuthPaths, request: &Request, error: &Error) -> Classification {
    let status = match error.status() {
        Some(status) => status,
        None => return Classification::Network,
    };
    if status != StatusCode::UNAUTHORIZED {
        return Classification::PassThrough;
    }
    let path = request.path();
    if paths.is_excluded(path) {
        Classification::AuthExcluded
    } else if paths.is_refresh(path) {
        Classification::RefreshEndpoint
    } else if request.is_retried() {
        Classification::ExhaustedRetry
    } else {
        Classification::Recoverable
    }
}
