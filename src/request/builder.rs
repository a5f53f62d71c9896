use std::future::IntoFuture;
use std::str::FromStr;

use futures::future::BoxFuture;
use http::header::{HeaderName, ACCEPT, CONTENT_TYPE};
use http::{HeaderValue, Method, Uri};
use serde::Serialize;
use serde_json::Value;

use crate::{Client, Error, InMemoryBody, Request, Response, Result};

/// Builds a [`Request`] against a [`Client`]. Errors are deferred until the request is sent.
#[derive(Debug)]
pub struct RequestBuilder<'a> {
    client: &'a Client,
    request: Result<Request>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(client: &'a Client, method: Method, uri: Result<Uri>) -> Self {
        RequestBuilder {
            client,
            request: uri.map(|uri| Request::new(method, uri)),
        }
    }

    fn map(mut self, f: impl FnOnce(Request) -> Result<Request>) -> Self {
        self.request = self.request.and_then(f);
        self
    }

    pub fn header(self, key: &str, value: &str) -> Self {
        self.map(|r| {
            let key = HeaderName::from_str(key).map_err(http::Error::from)?;
            Ok(r.set_header(key, HeaderValue::from_str(value)?))
        })
    }

    pub fn headers<S: AsRef<str>, I: Iterator<Item = (S, S)>>(self, headers: I) -> Self {
        headers.fold(self, |b, (k, v)| b.header(k.as_ref(), v.as_ref()))
    }

    /// Set a bearer token on this request only. The authentication middleware overwrites it
    /// whenever the credential store holds a token.
    pub fn bearer_auth(self, token: &str) -> Self {
        self.map(|r| r.bearer_auth(token))
    }

    /// Add a url query parameter, replacing any parameter previously set with the same key.
    pub fn query(self, k: &str, v: &str) -> Self {
        self.map(|r| Ok(r.set_query(k, v)))
    }

    /// Add every field of a serializable object as a query parameter.
    pub fn set_query<S: Serialize>(self, obj: S) -> Self {
        self.map(|mut r| {
            let Value::Object(map) = serde_json::to_value(obj)? else {
                return Err(Error::custom("object in .set_query was not a Map"));
            };
            for (k, v) in map {
                let v = match v {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return Err(Error::Custom(format!("Invalid query value for `{}`", k))),
                };
                r = r.set_query(k, v);
            }
            Ok(r)
        })
    }

    /// Overwrite the current body with the provided JSON object.
    pub fn set_json<S: Serialize>(self, obj: S) -> Self {
        self.map(|r| {
            let body = InMemoryBody::new_json(obj)?;
            Ok(r.set_body(body)
                .set_header(ACCEPT, HeaderValue::from_static("application/json")))
        })
    }

    /// Add the provided JSON object to the current body.
    pub fn json<S: Serialize>(self, obj: S) -> Self {
        self.map(|r| {
            let fields = match serde_json::to_value(obj)? {
                Value::Object(fields) => fields,
                _ => return Err(Error::custom("Tried to push a non-object to a json body.")),
            };
            let body = match r.body().clone() {
                InMemoryBody::Empty => Value::Object(fields),
                InMemoryBody::Json(Value::Object(mut body)) => {
                    body.extend(fields);
                    Value::Object(body)
                }
                _ => return Err(Error::custom("Tried to call .json() on a non-json body. Use .set_json if you need to force a json body.")),
            };
            Ok(r.set_body(InMemoryBody::Json(body))
                .set_header(ACCEPT, HeaderValue::from_static("application/json")))
        })
    }

    /// Sets the body to the supplied bytes with the given content-type, e.g. a pre-encoded multipart form.
    pub fn bytes(self, bytes: Vec<u8>, content_type: &str) -> Self {
        self.map(|r| {
            let content_type = HeaderValue::from_str(content_type)?;
            Ok(r.set_body(InMemoryBody::Bytes(bytes)).set_header(CONTENT_TYPE, content_type))
        })
    }

    /// Sets content-type to `text/plain` and the body to the supplied text.
    pub fn text(self, text: String) -> Self {
        self.map(|r| {
            Ok(r.set_body(InMemoryBody::Text(text))
                .set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain")))
        })
    }

    /// Warning: Does not set content-type!
    pub fn body(self, body: InMemoryBody) -> Self {
        self.map(|r| Ok(r.set_body(body)))
    }

    pub fn build(self) -> Result<Request> {
        self.request
    }

    pub async fn send(self) -> Result<Response> {
        let client = self.client;
        client.execute(self.build()?).await
    }
}

impl<'a> IntoFuture for RequestBuilder<'a> {
    type Output = Result<Response>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_builder_collects_query_and_json() {
        let client = Client::new().base_url("https://api.example.com");
        let request = client
            .post("/api/Leads")
            .query("Draft", "true")
            .json(json!({"Name": "Acme"}))
            .json(json!({"Phone": "555"}))
            .build()
            .unwrap();
        assert_eq!(request.uri().to_string(), "https://api.example.com/api/Leads");
        assert_eq!(request.query().get("Draft").map(String::as_str), Some("true"));
        assert_eq!(request.body(), &InMemoryBody::Json(json!({"Name": "Acme", "Phone": "555"})));
    }

    #[test]
    fn test_builder_defers_errors() {
        let client = Client::new();
        let result = client
            .get("https://api.example.com/")
            .header("bad header", "x")
            .query("ok", "1")
            .build();
        assert!(matches!(result, Err(Error::InvalidRequest(_))));

        let result = client.post("https://api.example.com/").text("a".into()).json(json!({"a": 1})).build();
        assert!(matches!(result, Err(Error::Custom(_))));
    }

    #[test]
    fn test_set_query_flattens_scalars() {
        #[derive(Serialize)]
        struct Filter {
            page: u32,
            active: bool,
            search: Option<String>,
        }
        let client = Client::new();
        let request = client
            .get("https://api.example.com/api/Accounts")
            .set_query(Filter { page: 3, active: true, search: None })
            .build()
            .unwrap();
        let mut query: Vec<_> = request.query().iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        query.sort();
        assert_eq!(query, vec![("active", "true"), ("page", "3"), ("search", "")]);
    }
}
