use std::str::FromStr;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::uri::PathAndQuery;
use http::{HeaderMap, HeaderValue, Method, Uri};
use http_body_util::Full;
use indexmap::IndexMap;
use serde_json::Value;

pub use builder::RequestBuilder;

use crate::{InMemoryBody, Result};

mod builder;

/// An outgoing request, kept in memory so it can be replayed after a token refresh.
///
/// Query parameters are held apart from the URI until dispatch, so context fields can be merged
/// in without re-parsing the query string.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    uri: Uri,
    query: IndexMap<String, String>,
    headers: HeaderMap,
    body: InMemoryBody,
    retried: bool,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            query: IndexMap::new(),
            headers: HeaderMap::new(),
            body: InMemoryBody::Empty,
            retried: false,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> &IndexMap<String, String> {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &InMemoryBody {
        &self.body
    }

    /// Whether this request has already been resubmitted once after a token refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn set_body(mut self, body: InMemoryBody) -> Self {
        self.body = body;
        self
    }

    pub fn set_header(mut self, key: http::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Set or replace a query parameter, keeping the position of an existing key.
    pub fn set_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Set `Authorization: Bearer <token>`, overwriting any previous value.
    pub fn bearer_auth(self, token: &str) -> Result<Self> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        Ok(self.set_header(AUTHORIZATION, value))
    }

    /// Attach the tenant identifier under `key`.
    ///
    /// Reads carry it in the query string. Mutations carry it in the body when the body is a JSON
    /// object; any other body falls back to the query string.
    pub fn with_tenant(self, key: &str, tenant_id: &str) -> Self {
        let is_mutation = matches!(self.method, Method::POST | Method::PUT | Method::DELETE);
        if !is_mutation || !self.body.is_object() {
            return self.set_query(key, tenant_id);
        }
        let Request { method, uri, query, headers, body, retried } = self;
        let body = match body.with_field(key, Value::String(tenant_id.to_string())) {
            Ok(body) | Err(body) => body,
        };
        Request { method, uri, query, headers, body, retried }
    }

    #[must_use]
    pub fn mark_retried(mut self) -> Self {
        self.retried = true;
        self
    }

    /// The URI as sent on the wire, with the query parameters appended to any query already present.
    pub fn full_uri(&self) -> Result<Uri> {
        if self.query.is_empty() {
            return Ok(self.uri.clone());
        }
        let query = serde_qs::to_string(&self.query).map_err(|e| crate::Error::Custom(e.to_string()))?;
        let mut parts = self.uri.clone().into_parts();
        let path_and_query = match parts.path_and_query.as_ref() {
            Some(pq) => match pq.query() {
                Some(existing) if !existing.is_empty() => format!("{}?{}&{}", pq.path(), existing, query),
                _ => format!("{}?{}", pq.path(), query),
            },
            None => format!("/?{}", query),
        };
        parts.path_and_query = Some(PathAndQuery::from_str(&path_and_query)?);
        Uri::from_parts(parts).map_err(|e| crate::Error::InvalidRequest(e.into()))
    }

    /// Convert into a request for the hyper transport.
    pub fn into_http(self) -> Result<http::Request<Full<Bytes>>> {
        let uri = self.full_uri()?;
        let mut headers = self.headers;
        if let Some(content_type) = self.body.default_content_type() {
            headers.entry(CONTENT_TYPE).or_insert(content_type);
        }
        let body = self.body.bytes()?;
        let mut request = http::Request::builder()
            .method(self.method)
            .uri(uri)
            .body(Full::new(body))?;
        *request.headers_mut() = headers;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(method: Method, url: &str) -> Request {
        Request::new(method, Uri::from_str(url).unwrap())
    }

    #[test]
    fn test_tenant_goes_to_query_for_reads() {
        let r = request(Method::GET, "https://api.example.com/api/Invoices")
            .set_query("Page", "2")
            .with_tenant("CompanyId", "c-9");
        assert_eq!(r.query().get("CompanyId").map(String::as_str), Some("c-9"));
        assert_eq!(r.full_uri().unwrap().to_string(), "https://api.example.com/api/Invoices?Page=2&CompanyId=c-9");
    }

    #[test]
    fn test_tenant_goes_to_body_for_object_mutations() {
        let r = request(Method::POST, "https://api.example.com/api/Leads")
            .set_body(InMemoryBody::Json(json!({"Name": "Acme"})))
            .with_tenant("CompanyId", "c-9");
        assert!(r.query().is_empty());
        assert_eq!(r.body(), &InMemoryBody::Json(json!({"Name": "Acme", "CompanyId": "c-9"})));
    }

    #[test]
    fn test_tenant_falls_back_to_query_for_binary_mutations() {
        let r = request(Method::PUT, "https://api.example.com/api/Files")
            .set_body(InMemoryBody::new_bytes(b"--boundary".to_vec()))
            .with_tenant("CompanyId", "c-9");
        assert_eq!(r.query().get("CompanyId").map(String::as_str), Some("c-9"));
        assert_eq!(r.body(), &InMemoryBody::new_bytes(b"--boundary".to_vec()));

        let r = request(Method::PATCH, "https://api.example.com/api/Leads/1")
            .set_body(InMemoryBody::Json(json!({"Name": "Acme"})))
            .with_tenant("CompanyId", "c-9");
        assert_eq!(r.query().get("CompanyId").map(String::as_str), Some("c-9"));
    }

    #[test]
    fn test_bearer_auth_overwrites() {
        let r = request(Method::GET, "https://api.example.com/")
            .bearer_auth("caller")
            .unwrap()
            .bearer_auth("stored")
            .unwrap();
        assert_eq!(r.headers().get(AUTHORIZATION).unwrap(), "Bearer stored");
        assert_eq!(r.headers().get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_full_uri_keeps_existing_query() {
        let r = request(Method::GET, "https://api.example.com/api/Accounts?Sort=Name")
            .set_query("Search", "Acme");
        assert_eq!(r.full_uri().unwrap().to_string(), "https://api.example.com/api/Accounts?Sort=Name&Search=Acme");
    }

    #[test]
    fn test_into_http_sets_json_content_type() {
        let r = request(Method::POST, "https://api.example.com/api/Auth/Refresh")
            .set_body(InMemoryBody::Json(json!({"refreshToken": "r"})));
        let req = r.into_http().unwrap();
        assert_eq!(req.headers().get(CONTENT_TYPE).unwrap(), "application/json; charset=utf-8");
        assert_eq!(req.method(), Method::POST);
    }
}
