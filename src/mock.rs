//! A scripted in-process [`Transport`] for tests: every request is recorded, and a handler decides
//! each reply.
use std::fmt::{Debug, Formatter};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::transport::Transport;
use crate::{InMemoryBody, Request, Response, Result};

pub enum MockReply {
    Json(StatusCode, Value),
    /// Wait before producing the inner reply.
    Delayed(Duration, Box<MockReply>),
    /// Fail without a response, like a dropped connection.
    Unreachable,
}

impl MockReply {
    pub fn json(status: StatusCode, value: Value) -> Self {
        MockReply::Json(status, value)
    }

    pub fn delayed(self, delay: Duration) -> Self {
        MockReply::Delayed(delay, Box::new(self))
    }
}

type Handler = Box<dyn Fn(&Request) -> MockReply + Send + Sync>;

pub struct MockTransport {
    handler: Handler,
    sent: Mutex<Vec<Request>>,
}

impl Debug for MockTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTransport {{ sent: {} }}", self.sent().len())
    }
}

impl MockTransport {
    pub fn new(handler: impl Fn(&Request) -> MockReply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, in dispatch order.
    pub fn sent(&self) -> Vec<Request> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_to(&self, path: &str) -> Vec<Request> {
        self.sent().into_iter().filter(|r| r.path() == path).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(request.clone());
        let mut reply = (self.handler)(&request);
        loop {
            match reply {
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                MockReply::Json(status, value) => {
                    let mut headers = HeaderMap::new();
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    return Response::new(status, headers, InMemoryBody::Json(value)).error_for_status();
                }
                MockReply::Unreachable => {
                    let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
                    return Err(ProtocolError::Io(refused).into());
                }
            }
        }
    }
}
