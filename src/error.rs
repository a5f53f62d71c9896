use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};

use http::StatusCode;

use crate::Response;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures where no response was received from the server.
#[derive(Debug)]
pub enum ProtocolError {
    Connect(hyper_util::client::legacy::Error),
    HttpProtocol(hyper::Error),
    Io(std::io::Error),
}

impl StdError for ProtocolError {}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Connect(e) => write!(f, "ConnectError: {}", e),
            ProtocolError::HttpProtocol(e) => write!(f, "HttpProtocolError: {}", e),
            ProtocolError::Io(e) => write!(f, "IoError: {}", e),
        }
    }
}

/// Why a token refresh did not produce a new credential.
///
/// Cloned into every request that was queued behind the failed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The credential store holds no refresh token.
    MissingRefreshToken,
    /// The refresh endpoint answered, but without both tokens.
    MalformedResponse,
    /// The refresh endpoint answered with an error status.
    Rejected(StatusCode),
    /// The refresh endpoint could not be reached.
    Transport(String),
    Timeout,
    /// The new tokens could not be written back to the credential store.
    Store(String),
    /// The refreshing request was dropped before the refresh settled.
    Aborted,
}

impl StdError for RefreshError {}

impl Display for RefreshError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::MissingRefreshToken => write!(f, "No refresh token is stored"),
            RefreshError::MalformedResponse => write!(f, "Refresh response is missing the access or refresh token"),
            RefreshError::Rejected(status) => write!(f, "Refresh endpoint responded with {}", status),
            RefreshError::Transport(msg) => write!(f, "Refresh request failed: {}", msg),
            RefreshError::Timeout => write!(f, "Refresh request timed out"),
            RefreshError::Store(msg) => write!(f, "Failed to persist refreshed tokens: {}", msg),
            RefreshError::Aborted => write!(f, "Refresh was abandoned before it completed"),
        }
    }
}

impl From<Error> for RefreshError {
    fn from(value: Error) -> Self {
        match value {
            Error::HttpError(r) => RefreshError::Rejected(r.status()),
            Error::Refresh(e) => e,
            other => RefreshError::Transport(other.to_string()),
        }
    }
}

pub enum Error {
    Custom(String),
    /// No response was received.
    Protocol(ProtocolError),
    /// A response was received with a 4xx or 5xx status.
    HttpError(Response),
    /// The request was queued behind a token refresh that failed.
    Refresh(RefreshError),
    InvalidRequest(http::Error),
    JsonEncoding(serde_json::Error),
}

impl Error {
    pub fn custom(msg: &str) -> Self {
        Error::Custom(msg.to_string())
    }

    /// Get the error status code, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError(r) => Some(r.status()),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Error::HttpError(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Custom(msg) => write!(f, "Custom: {}", msg),
            Error::Protocol(e) => write!(f, "ProtocolError: {:?}", e),
            Error::HttpError(r) => {
                write!(
                    f,
                    "HttpError {{ status: {}, headers: {:?}, body: {:?} }}",
                    r.status(), r.headers(), r.body()
                )
            }
            Error::Refresh(e) => write!(f, "RefreshError: {:?}", e),
            Error::InvalidRequest(e) => write!(f, "InvalidRequest: {}", e),
            Error::JsonEncoding(e) => write!(f, "JsonEncodingError: {}", e),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Custom(msg) => write!(f, "{}", msg),
            Error::Protocol(e) => write!(f, "{}", e),
            Error::HttpError(r) => write!(f, "HttpError {{ status: {} }}", r.status()),
            Error::Refresh(e) => write!(f, "Token refresh failed: {}", e),
            Error::InvalidRequest(e) => write!(f, "InvalidRequest: {}", e),
            Error::JsonEncoding(e) => write!(f, "JsonEncodingError: {}", e),
        }
    }
}

impl StdError for Error {}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Error::Protocol(value)
    }
}

impl From<RefreshError> for Error {
    fn from(value: RefreshError) -> Self {
        Error::Refresh(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::JsonEncoding(value)
    }
}

impl From<http::Error> for Error {
    fn from(value: http::Error) -> Self {
        Error::InvalidRequest(value)
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(value: http::header::InvalidHeaderValue) -> Self {
        Error::InvalidRequest(value.into())
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(value: http::uri::InvalidUri) -> Self {
        Error::InvalidRequest(value.into())
    }
}

impl From<hyper::Error> for Error {
    fn from(value: hyper::Error) -> Self {
        Error::Protocol(ProtocolError::HttpProtocol(value))
    }
}

impl From<hyper_util::client::legacy::Error> for ProtocolError {
    fn from(value: hyper_util::client::legacy::Error) -> Self {
        Self::Connect(value)
    }
}

impl From<hyper::Error> for ProtocolError {
    fn from(value: hyper::Error) -> Self {
        Self::HttpProtocol(value)
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Invalid client configuration. Raised when the client is built, never per request.
#[derive(Debug)]
pub enum ConfigError {
    /// The refresh path is unset, which would make every 401 loop.
    MissingRefreshPath,
    InvalidBaseUrl(String),
    Figment(Box<figment::Error>),
}

impl StdError for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingRefreshPath => write!(f, "`refresh_path` must be set to a non-empty path"),
            ConfigError::InvalidBaseUrl(url) => write!(f, "`base_url` is not a valid absolute URL: {}", url),
            ConfigError::Figment(e) => write!(f, "Failed to load configuration: {}", e),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        ConfigError::Figment(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderMap;

    use super::*;
    use crate::InMemoryBody;

    #[test]
    fn test_refresh_error_from_failed_call() {
        let rejected = Error::HttpError(Response::new(StatusCode::BAD_REQUEST, HeaderMap::new(), InMemoryBody::Empty));
        assert_eq!(RefreshError::from(rejected), RefreshError::Rejected(StatusCode::BAD_REQUEST));

        let unreachable = Error::Protocol(ProtocolError::Io(std::io::ErrorKind::ConnectionRefused.into()));
        assert!(matches!(RefreshError::from(unreachable), RefreshError::Transport(_)));

        let queued = Error::Refresh(RefreshError::MalformedResponse);
        assert_eq!(RefreshError::from(queued), RefreshError::MalformedResponse);
    }
}
