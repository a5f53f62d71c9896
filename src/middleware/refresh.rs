use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{Method, Uri};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::classify::{classify, AuthPaths, Classification};
use crate::error::RefreshError;
use crate::middleware::{Middleware, Next};
use crate::refresh::{extract_credential, RefreshCoordinator, Role};
use crate::session::SessionExpiry;
use crate::store::{Credential, CredentialStore};
use crate::transport::Transport;
use crate::{Error, InMemoryBody, Request, Response, Result};

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

/// Recovers from an expired access token.
///
/// A 401 that a refresh can fix triggers exactly one refresh per client at a time. The request
/// that hit it first performs the refresh; every other request that hits a 401 meanwhile waits
/// for that result. All of them are then replayed once with the new token. If the refresh
/// fails, the session is expired and the failure reaches every caller.
#[derive(Debug)]
pub struct RefreshOnUnauthorized {
    credentials: Arc<dyn CredentialStore>,
    paths: AuthPaths,
    refresh_url: Uri,
    timeout: Option<Duration>,
    coordinator: Arc<RefreshCoordinator>,
    session: Arc<SessionExpiry>,
}

impl RefreshOnUnauthorized {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        paths: AuthPaths,
        refresh_url: Uri,
        coordinator: Arc<RefreshCoordinator>,
        session: Arc<SessionExpiry>,
    ) -> Self {
        Self {
            credentials,
            paths,
            refresh_url,
            timeout: None,
            coordinator,
            session,
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exchange the stored refresh token for a new credential and persist it.
    /// Sent straight to the transport so the refresh call is neither augmented nor classified.
    async fn refresh(&self, transport: &dyn Transport) -> Result<Credential, RefreshError> {
        let refresh_token = match self.credentials.refresh_token().await {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => return Err(RefreshError::MissingRefreshToken),
            Err(e) => {
                debug!(error = %e, "Could not read refresh token");
                return Err(RefreshError::MissingRefreshToken);
            }
        };
        let body = InMemoryBody::new_json(RefreshRequest { refresh_token: &refresh_token })
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        let request = Request::new(Method::POST, self.refresh_url.clone()).set_body(body);

        let send = transport.send(request);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, send).await.map_err(|_| RefreshError::Timeout)?,
            None => send.await,
        }?;

        let payload: Value = response.json().map_err(|_| RefreshError::MalformedResponse)?;
        let (credential, strategy) = extract_credential(&payload).ok_or(RefreshError::MalformedResponse)?;
        debug!(strategy, "Found refreshed tokens");
        self.credentials
            .set_tokens(credential.clone())
            .await
            .map_err(|e| RefreshError::Store(e.to_string()))?;
        Ok(credential)
    }

    async fn recover(&self, request: Request, error: Error, next: Next<'_>) -> Result<Response> {
        let request = request.mark_retried();
        match self.coordinator.join() {
            Role::Follower(waiter) => {
                let token = waiter.wait().await?;
                next.run(request.bearer_auth(&token)?).await
            }
            Role::Leader(flight) => {
                info!(path = request.path(), "Access token rejected, refreshing");
                match self.refresh(next.transport()).await {
                    Ok(credential) => {
                        let released = flight.settle(Ok(credential.access_token.clone()));
                        debug!(released, "Token refresh succeeded");
                        next.run(request.bearer_auth(&credential.access_token)?).await
                    }
                    Err(e) => {
                        warn!(error = %e, "Token refresh failed");
                        flight.settle(Err(e));
                        self.session.expire().await;
                        Err(error)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Middleware for RefreshOnUnauthorized {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let error = match next.run(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };
        match classify(&self.paths, &request, &error) {
            Classification::Recoverable => self.recover(request, error, next).await,
            Classification::RefreshEndpoint => {
                warn!(path = request.path(), "Refresh endpoint rejected the session");
                self.session.expire().await;
                Err(error)
            }
            Classification::PassThrough
            | Classification::Network
            | Classification::AuthExcluded
            | Classification::ExhaustedRetry => Err(error),
        }
    }
}
