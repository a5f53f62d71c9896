use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

pub use augment::Augment;
pub use refresh::RefreshOnUnauthorized;

use crate::client::Client;
use crate::transport::Transport;
use crate::{Request, Response, Result};

mod augment;
mod refresh;

pub type MiddlewareStack = Vec<Arc<dyn Middleware>>;

#[derive(Debug, Copy, Clone)]
pub struct Next<'a> {
    pub client: &'a Client,
    pub(crate) middlewares: &'a [Arc<dyn Middleware>],
}

impl Next<'_> {
    pub async fn run(self, request: Request) -> Result<Response> {
        if let Some((middleware, rest)) = self.middlewares.split_first() {
            let next = Next {
                client: self.client,
                middlewares: rest,
            };
            middleware.handle(request, next).await
        } else {
            self.client.transport.send(request).await
        }
    }

    /// The raw transport, for requests that must not pass through any middleware.
    pub fn transport(&self) -> &'_ dyn Transport {
        self.client.transport()
    }
}

#[async_trait]
pub trait Middleware: Send + Sync + Debug {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        next.run(request).await
    }
}
