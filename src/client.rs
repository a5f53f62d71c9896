use std::fmt::Formatter;
use std::str::FromStr;
use std::sync::Arc;

use http::{Method, Uri};

use crate::middleware::{Middleware, MiddlewareStack, Next};
use crate::transport::{HyperTransport, Transport};
use crate::{Request, RequestBuilder, Response, Result};

static APP_USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
);

pub struct Client {
    base_url: Option<String>,
    default_headers: Vec<(String, String)>,
    pub(crate) middlewares: MiddlewareStack,
    pub(crate) transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client {{ base_url: {:?}, middlewares: {:?} }}", self.base_url, self.middlewares)
    }
}

impl Client {
    pub fn new() -> Self {
        Self::from_transport(Arc::new(HyperTransport::new()))
    }

    pub fn from_transport(transport: Arc<dyn Transport>) -> Self {
        Client {
            base_url: None,
            default_headers: vec![("User-Agent".to_string(), APP_USER_AGENT.to_string())],
            middlewares: Vec::new(),
            transport,
        }
    }

    /// Set a `base_url` so you can pass relative paths instead of full URLs.
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    /// Replace the transport that requests are dispatched on once every middleware has run.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Middlewares run in the order they are added; the first one added sees the request first.
    pub fn with_middleware<T: Middleware + 'static>(mut self, middleware: T) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn no_default_headers(mut self) -> Self {
        self.default_headers = Vec::new();
        self
    }

    pub fn default_header<S: AsRef<str>>(mut self, key: S, value: S) -> Self {
        self.default_headers.push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn build_uri(&self, uri_or_path: &str) -> Result<Uri> {
        if let Ok(uri) = Uri::from_str(uri_or_path) {
            if uri.scheme().is_some() && uri.host().is_some() {
                return Ok(uri);
            }
        }
        let uri = match &self.base_url {
            Some(base) => format!("{}{}", base, uri_or_path),
            None => uri_or_path.to_string(),
        };
        Ok(Uri::from_str(&uri)?)
    }

    pub fn get(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.request(Method::GET, uri_or_path)
    }

    pub fn post(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.request(Method::POST, uri_or_path)
    }

    pub fn put(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.request(Method::PUT, uri_or_path)
    }

    pub fn patch(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.request(Method::PATCH, uri_or_path)
    }

    pub fn delete(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.request(Method::DELETE, uri_or_path)
    }

    pub fn request(&self, method: Method, uri_or_path: &str) -> RequestBuilder<'_> {
        let uri = self.build_uri(uri_or_path);
        RequestBuilder::new(self, method, uri)
            .headers(self.default_headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Run the request through every middleware, then the transport.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let next = Next {
            client: self,
            middlewares: self.middlewares.as_slice(),
        };
        next.run(request).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
