use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::middleware::{Middleware, Next};
use crate::sanitize::sanitize_query;
use crate::store::{CredentialStore, TenantStore};
use crate::{Request, Response, Result};

/// Attaches the stored bearer token and the selected tenant to every request.
///
/// Both lookups are best-effort: if a store cannot be read, the request goes out without that
/// piece and the server decides.
#[derive(Debug, Clone)]
pub struct Augment {
    credentials: Arc<dyn CredentialStore>,
    tenants: Option<Arc<dyn TenantStore>>,
    tenant_key: String,
}

impl Augment {
    pub fn new(credentials: Arc<dyn CredentialStore>, tenants: Option<Arc<dyn TenantStore>>, tenant_key: impl Into<String>) -> Self {
        Self {
            credentials,
            tenants,
            tenant_key: tenant_key.into(),
        }
    }

    pub async fn augment(&self, request: Request) -> Request {
        let request = match self.credentials.access_token().await {
            Ok(Some(token)) => match request.clone().bearer_auth(&token) {
                Ok(authorized) => authorized,
                Err(e) => {
                    debug!(error = %e, "Stored access token is not a valid header value");
                    request
                }
            },
            Ok(None) => request,
            Err(e) => {
                debug!(error = %e, "Could not read access token");
                request
            }
        };
        let Some(tenants) = &self.tenants else {
            return request;
        };
        match tenants.selected_tenant_id().await {
            Ok(Some(tenant_id)) => request.with_tenant(&self.tenant_key, &tenant_id),
            Ok(None) => request,
            Err(e) => {
                debug!(error = %e, "Could not read selected tenant");
                request
            }
        }
    }
}

fn log_request(request: &Request) {
    let url = request.uri().to_string();
    let params = serde_qs::to_string(&sanitize_query(request.query())).unwrap_or_default();
    debug!(method = %request.method(), url, params, "Sending request");
}

#[async_trait]
impl Middleware for Augment {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let request = self.augment(request).await;
        log_request(&request);
        next.run(request).await
    }
}
