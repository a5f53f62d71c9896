//! An HTTP client for a multi-tenant CRM backend that keeps the user signed in.
//!
//! Every request carries the stored bearer token and the selected company id. When the server
//! answers 401, the client refreshes the token once, replays the waiting requests in the order
//! they arrived, and ends the session if the refresh fails.
pub use http::Method;

pub use crate::authenticated::{AuthenticatedClient, AuthenticatedClientBuilder};
pub use crate::body::InMemoryBody;
pub use crate::client::Client;
pub use crate::config::ClientConfig;
pub use crate::error::{ConfigError, Error, ProtocolError, RefreshError, Result};
pub use crate::middleware::{Middleware, Next};
pub use crate::request::{Request, RequestBuilder};
pub use crate::response::Response;
pub use crate::store::{Credential, CredentialStore, MemoryCredentialStore, MemoryTenantStore, TenantStore};
pub use crate::transport::{HyperTransport, Transport};

mod authenticated;
mod body;
pub mod classify;
mod client;
pub mod config;
mod error;
pub mod middleware;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod refresh;
mod request;
mod response;
mod sanitize;
pub mod session;
pub mod store;
mod transport;
