use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::trace;

use crate::error::ProtocolError;
use crate::{InMemoryBody, Request, Response, Result};

/// Sends a fully prepared request and reads the whole response into memory.
///
/// A response with a 4xx or 5xx status comes back as `Err(Error::HttpError(response))`. A request
/// that never got a response comes back as `Err(Error::Protocol(..))`.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, request: Request) -> Result<Response>;
}

pub struct HyperTransport {
    inner: hyper_util::client::legacy::Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HyperTransport")
    }
}

impl HyperTransport {
    pub fn new() -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            inner: hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(https),
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let request = request.into_http()?;
        trace!(method = %request.method(), url = %request.uri(), "Dispatching request");
        let res = self.inner.request(request).await.map_err(ProtocolError::from)?;
        let (parts, body) = res.into_parts();
        let bytes = body.collect().await.map_err(ProtocolError::from)?.to_bytes();
        let body = InMemoryBody::from_received(&parts.headers, bytes);
        Response::new(parts.status, parts.headers, body).error_for_status()
    }
}
