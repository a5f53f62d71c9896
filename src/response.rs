use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::{Error, InMemoryBody, Result};

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: InMemoryBody,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: InMemoryBody) -> Self {
        Self { status, headers, body }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &InMemoryBody {
        &self.body
    }

    pub fn into_body(self) -> InMemoryBody {
        self.body
    }

    /// Turn a 4xx or 5xx response into `Error::HttpError`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_client_error() || self.status.is_server_error() {
            Err(Error::HttpError(self))
        } else {
            Ok(self)
        }
    }

    pub fn text(self) -> Result<String> {
        self.body.text()
    }

    pub fn json<U: DeserializeOwned>(self) -> Result<U> {
        Ok(self.body.json()?)
    }

    pub fn bytes(self) -> Result<Bytes> {
        self.body.bytes()
    }
}
