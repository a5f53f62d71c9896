use std::sync::Arc;

use http::Method;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::middleware::{Augment, RefreshOnUnauthorized};
use crate::refresh::RefreshCoordinator;
use crate::session::{SessionExpiredCallback, SessionExpiry};
use crate::store::{CredentialStore, MemoryCredentialStore, TenantStore};
use crate::transport::{HyperTransport, Transport};
use crate::{Client, Request, RequestBuilder, Response, Result};

/// The client every application request goes through.
///
/// Each request carries the stored bearer token and the selected company. A 401 that a token
/// refresh can fix is recovered transparently, with at most one refresh in flight per client.
/// When recovery is impossible the stored credential is cleared and the session-expired callback
/// runs.
#[derive(Debug)]
pub struct AuthenticatedClient {
    client: Client,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthenticatedClient {
    pub fn builder(config: ClientConfig) -> AuthenticatedClientBuilder {
        AuthenticatedClientBuilder::new(config)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_refreshing(&self) -> bool {
        self.coordinator.is_refreshing()
    }

    pub fn get(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.client.get(uri_or_path)
    }

    pub fn post(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.client.post(uri_or_path)
    }

    pub fn put(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.client.put(uri_or_path)
    }

    pub fn patch(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.client.patch(uri_or_path)
    }

    pub fn delete(&self, uri_or_path: &str) -> RequestBuilder<'_> {
        self.client.delete(uri_or_path)
    }

    pub fn request(&self, method: Method, uri_or_path: &str) -> RequestBuilder<'_> {
        self.client.request(method, uri_or_path)
    }

    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.client.execute(request).await
    }
}

pub struct AuthenticatedClientBuilder {
    config: ClientConfig,
    credentials: Option<Arc<dyn CredentialStore>>,
    tenants: Option<Arc<dyn TenantStore>>,
    on_session_expired: Option<SessionExpiredCallback>,
    transport: Option<Arc<dyn Transport>>,
}

impl AuthenticatedClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            credentials: None,
            tenants: None,
            on_session_expired: None,
            transport: None,
        }
    }

    /// Defaults to an empty [`MemoryCredentialStore`].
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Without a tenant store, requests carry no company id.
    pub fn tenants(mut self, store: Arc<dyn TenantStore>) -> Self {
        self.tenants = Some(store);
        self
    }

    pub fn on_session_expired<F: Fn() + Send + Sync + 'static>(mut self, callback: F) -> Self {
        self.on_session_expired = Some(Box::new(callback));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<AuthenticatedClient, ConfigError> {
        let config = self.config;
        config.validate()?;

        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let session = SessionExpiry::new(credentials.clone(), self.on_session_expired)
            .dedupe(config.dedupe_session_expiry);
        let coordinator = Arc::new(RefreshCoordinator::new());
        let refresh = RefreshOnUnauthorized::new(
            credentials.clone(),
            config.auth_paths()?,
            config.refresh_url()?,
            coordinator.clone(),
            Arc::new(session),
        )
        .timeout(config.refresh_timeout());
        let augment = Augment::new(credentials, self.tenants, config.tenant_key.clone());

        let transport = self.transport.unwrap_or_else(|| Arc::new(HyperTransport::new()));
        let client = Client::from_transport(transport)
            .base_url(config.base_url_trimmed())
            .with_middleware(refresh)
            .with_middleware(augment);
        debug!(base_url = config.base_url_trimmed(), refresh_path = %config.refresh_path, "Built authenticated client");
        Ok(AuthenticatedClient { client, coordinator })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::future::join_all;
    use http::header::AUTHORIZATION;
    use http::StatusCode;
    use serde_json::{json, Value};

    use super::*;
    use crate::error::RefreshError;
    use crate::mock::{MockReply, MockTransport};
    use crate::store::{Credential, MemoryTenantStore, StoreResult};
    use crate::{Error, InMemoryBody};

    const REFRESH: &str = "/api/Auth/Refresh";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn config() -> ClientConfig {
        ClientConfig {
            login_path: "/api/Auth/Login".into(),
            third_party_auth_path: "/api/Auth/External".into(),
            forgot_password_path: "/api/Auth/ForgotPassword".into(),
            verify_code_path: "/api/Auth/VerifyCode".into(),
            reset_password_path: "/api/Auth/ResetPassword".into(),
            ..ClientConfig::new("https://crm.example.com", REFRESH)
        }
    }

    fn bearer(request: &Request) -> Option<&str> {
        request.headers().get(AUTHORIZATION)?.to_str().ok()
    }

    fn unauthorized() -> MockReply {
        MockReply::json(StatusCode::UNAUTHORIZED, json!({"Message": "Token expired"}))
    }

    fn new_tokens() -> MockReply {
        MockReply::json(
            StatusCode::OK,
            json!({"Data": {"Token": {"AccessToken": "new-token", "RefreshToken": "refresh-abc"}}}),
        )
    }

    /// Accepts only the refreshed token; the refresh endpoint answers with `refresh`.
    fn backend(refresh: impl Fn() -> MockReply + Send + Sync + 'static) -> impl Fn(&Request) -> MockReply + Send + Sync + 'static {
        move |request| {
            if request.path() == REFRESH {
                return refresh();
            }
            match bearer(request) {
                Some("Bearer new-token") => MockReply::json(StatusCode::OK, json!({"Path": request.path()})),
                _ => unauthorized(),
            }
        }
    }

    struct Harness {
        client: AuthenticatedClient,
        transport: Arc<MockTransport>,
        store: Arc<MemoryCredentialStore>,
        tenants: Arc<MemoryTenantStore>,
        expired: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new(config: ClientConfig, handler: impl Fn(&Request) -> MockReply + Send + Sync + 'static) -> Self {
            Self::with_credential(config, Some(Credential::new("old-token", "refresh-xyz")), handler)
        }

        fn with_credential(
            config: ClientConfig,
            credential: Option<Credential>,
            handler: impl Fn(&Request) -> MockReply + Send + Sync + 'static,
        ) -> Self {
            init_tracing();
            let transport = Arc::new(MockTransport::new(handler));
            let store = Arc::new(match credential {
                Some(credential) => MemoryCredentialStore::with_credential(credential),
                None => MemoryCredentialStore::new(),
            });
            let tenants = Arc::new(MemoryTenantStore::new(Some("c-42".into())));
            let expired = Arc::new(AtomicUsize::new(0));
            let counter = expired.clone();
            let client = AuthenticatedClient::builder(config)
                .credentials(store.clone())
                .tenants(tenants.clone())
                .transport(transport.clone())
                .on_session_expired(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .build()
                .unwrap();
            Self {
                client,
                transport,
                store,
                tenants,
                expired,
            }
        }

        fn expired(&self) -> usize {
            self.expired.load(Ordering::SeqCst)
        }

        fn refresh_calls(&self) -> usize {
            self.transport.sent_to(REFRESH).len()
        }
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_replayed() {
        let h = Harness::new(config(), backend(new_tokens));
        let res = h.client.get("/api/Invoices").send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.json::<Value>().unwrap(), json!({"Path": "/api/Invoices"}));

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(bearer(&sent[0]), Some("Bearer old-token"));
        assert_eq!(sent[0].query().get("CompanyId").map(String::as_str), Some("c-42"));

        let refresh = &sent[1];
        assert_eq!(refresh.method(), Method::POST);
        assert_eq!(refresh.path(), REFRESH);
        assert_eq!(refresh.body(), &InMemoryBody::Json(json!({"refreshToken": "refresh-xyz"})));
        assert!(refresh.headers().get(AUTHORIZATION).is_none());
        assert!(refresh.query().is_empty());

        let replay = &sent[2];
        assert_eq!(replay.path(), "/api/Invoices");
        assert_eq!(bearer(replay), Some("Bearer new-token"));
        assert!(replay.is_retried());

        assert_eq!(h.store.credential(), Some(Credential::new("new-token", "refresh-abc")));
        assert_eq!(h.expired(), 0);
        assert!(!h.client.is_refreshing());
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let h = Harness::new(config(), backend(|| new_tokens().delayed(Duration::from_millis(50))));
        let paths = ["/api/A", "/api/B", "/api/C", "/api/D"];
        let results = join_all(paths.iter().map(|path| h.client.get(path).send())).await;
        for (path, result) in paths.iter().zip(results) {
            let body: Value = result.unwrap().json().unwrap();
            assert_eq!(body, json!({"Path": path}));
        }
        assert_eq!(h.refresh_calls(), 1);

        // the leader replays first, then the queued requests in arrival order
        let sent = h.transport.sent();
        let replays: Vec<&str> = sent.iter().filter(|r| r.is_retried()).map(Request::path).collect();
        assert_eq!(replays, paths);
        assert!(sent.iter().filter(|r| r.is_retried()).all(|r| bearer(r) == Some("Bearer new-token")));
        assert!(!h.client.is_refreshing());
        assert_eq!(h.expired(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_flight_across_threads() {
        let h = Harness::new(config(), backend(|| new_tokens().delayed(Duration::from_millis(100))));
        let client = Arc::new(h.client);
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move { client.get(&format!("/api/Leads/{}", i)).send().await })
            })
            .collect();
        for task in join_all(tasks).await {
            assert_eq!(task.unwrap().unwrap().status(), StatusCode::OK);
        }
        assert_eq!(h.transport.sent_to(REFRESH).len(), 1);
        assert_eq!(h.expired.load(Ordering::SeqCst), 0);
        assert!(!client.is_refreshing());
    }

    #[tokio::test]
    async fn test_replayed_request_is_not_refreshed_again() {
        let h = Harness::new(config(), |request: &Request| {
            if request.path() == REFRESH {
                new_tokens()
            } else {
                unauthorized()
            }
        });
        let err = h.client.get("/api/Invoices").send().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.transport.sent().len(), 3);
        assert_eq!(h.refresh_calls(), 1);
        assert_eq!(h.expired(), 0);
        assert!(!h.client.is_refreshing());

        // back to idle: the next 401 leads a fresh refresh
        let err = h.client.get("/api/Invoices").send().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn test_auth_endpoints_are_not_recovered() {
        let h = Harness::new(config(), backend(new_tokens));
        for path in ["/api/Auth/Login", "/api/Auth/External/Google", "/api/Auth/ResetPassword"] {
            let err = h.client.post(path).json(json!({"Email": "a@example.com"})).send().await.unwrap_err();
            assert!(err.is_unauthorized());
        }
        assert_eq!(h.transport.sent().len(), 3);
        assert_eq!(h.refresh_calls(), 0);
        assert_eq!(h.expired(), 0);
        assert!(h.store.credential().is_some());
    }

    #[tokio::test]
    async fn test_unauthorized_refresh_endpoint_expires_session() {
        let h = Harness::new(config(), backend(unauthorized));
        let err = h.client.post(REFRESH).send().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.transport.sent().len(), 1);
        assert_eq!(h.expired(), 1);
        assert_eq!(h.store.credential(), None);
    }

    #[tokio::test]
    async fn test_rejected_refresh_returns_original_error() {
        let h = Harness::new(config(), backend(|| MockReply::json(StatusCode::UNAUTHORIZED, json!({"Message": "Refresh token revoked"}))));
        let err = h.client.get("/api/Invoices").send().await.unwrap_err();
        let body: Value = err.response().unwrap().body().clone().json().unwrap();
        assert_eq!(body, json!({"Message": "Token expired"}));
        assert_eq!(h.refresh_calls(), 1);
        assert_eq!(h.expired(), 1);
        assert_eq!(h.store.credential(), None);
        assert!(!h.client.is_refreshing());
    }

    #[tokio::test]
    async fn test_malformed_refresh_rejects_queued_requests() {
        let h = Harness::new(
            config(),
            backend(|| {
                MockReply::json(StatusCode::OK, json!({"Data": {"Token": {"AccessToken": "new-token"}}}))
                    .delayed(Duration::from_millis(50))
            }),
        );
        let paths = ["/api/A", "/api/B", "/api/C"];
        let mut results = join_all(paths.iter().map(|path| h.client.get(path).send())).await.into_iter();

        assert!(results.next().unwrap().unwrap_err().is_unauthorized());
        for result in results {
            assert!(matches!(result, Err(Error::Refresh(RefreshError::MalformedResponse))));
        }
        assert_eq!(h.refresh_calls(), 1);
        assert_eq!(h.transport.sent().iter().filter(|r| r.is_retried()).count(), 0);
        assert_eq!(h.expired(), 1);
        assert_eq!(h.store.credential(), None);
        assert!(!h.client.is_refreshing());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_expires_session() {
        let h = Harness::with_credential(config(), None, backend(new_tokens));
        let err = h.client.get("/api/Invoices").send().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.transport.sent().len(), 1);
        assert!(bearer(&h.transport.sent()[0]).is_none());
        assert_eq!(h.refresh_calls(), 0);
        assert_eq!(h.expired(), 1);
    }

    #[tokio::test]
    async fn test_refresh_timeout() {
        let config = ClientConfig {
            refresh_timeout_ms: Some(10),
            ..config()
        };
        let h = Harness::new(config, backend(|| new_tokens().delayed(Duration::from_millis(500))));
        let err = h.client.get("/api/Invoices").send().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(h.expired(), 1);
        assert!(!h.client.is_refreshing());
    }

    #[tokio::test]
    async fn test_cancelled_refresh_restores_idle() {
        let h = Harness::new(config(), backend(|| new_tokens().delayed(Duration::from_secs(5))));
        let attempt = tokio::time::timeout(Duration::from_millis(20), h.client.get("/api/Invoices").send()).await;
        assert!(attempt.is_err());
        assert!(!h.client.is_refreshing());
        assert_eq!(h.expired(), 0);
        assert_eq!(h.store.credential(), Some(Credential::new("old-token", "refresh-xyz")));
    }

    #[tokio::test]
    async fn test_network_failure_is_not_recovered() {
        let h = Harness::new(config(), |_: &Request| MockReply::Unreachable);
        let err = h.client.get("/api/Invoices").send().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(h.transport.sent().len(), 1);
        assert_eq!(h.expired(), 0);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let h = Harness::new(config(), |_: &Request| MockReply::json(StatusCode::FORBIDDEN, json!({})));
        let err = h.client.delete("/api/Invoices/7").send().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(h.transport.sent().len(), 1);
        assert_eq!(h.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_tenant_in_body_for_mutations() {
        let h = Harness::new(config(), backend(new_tokens));
        h.client
            .post("/api/SalesOrders")
            .json(json!({"Total": 120}))
            .send()
            .await
            .unwrap();
        let sent = h.transport.sent();
        assert_eq!(sent[0].body(), &InMemoryBody::Json(json!({"Total": 120, "CompanyId": "c-42"})));
        assert!(sent[0].query().is_empty());
        // the replay is augmented again rather than duplicating the field
        assert_eq!(sent[2].body(), &InMemoryBody::Json(json!({"Total": 120, "CompanyId": "c-42"})));
    }

    #[tokio::test]
    async fn test_switching_company_applies_to_next_request() {
        let h = Harness::new(config(), |_: &Request| MockReply::json(StatusCode::OK, json!([])));
        h.client.get("/api/Invoices").send().await.unwrap();
        h.tenants.select(Some("c-99".into()));
        h.client.get("/api/Invoices").send().await.unwrap();
        h.tenants.select(None);
        h.client.get("/api/Invoices").send().await.unwrap();

        let companies: Vec<Option<String>> = h
            .transport
            .sent()
            .iter()
            .map(|r| r.query().get("CompanyId").cloned())
            .collect();
        assert_eq!(companies, [Some("c-42".to_string()), Some("c-99".to_string()), None]);
    }

    #[derive(Debug)]
    struct LockedKeychain;

    #[async_trait]
    impl CredentialStore for LockedKeychain {
        async fn access_token(&self) -> StoreResult<Option<String>> {
            Err("keychain locked".into())
        }
        async fn refresh_token(&self) -> StoreResult<Option<String>> {
            Err("keychain locked".into())
        }
        async fn set_tokens(&self, _: Credential) -> StoreResult<()> {
            Err("keychain locked".into())
        }
        async fn clear_tokens(&self) -> StoreResult<()> {
            Err("keychain locked".into())
        }
    }

    #[tokio::test]
    async fn test_unreadable_store_still_dispatches() {
        let transport = Arc::new(MockTransport::new(|_: &Request| MockReply::json(StatusCode::OK, json!([]))));
        let client = AuthenticatedClient::builder(config())
            .credentials(Arc::new(LockedKeychain))
            .transport(transport.clone())
            .build()
            .unwrap();
        let res = client.get("/api/Products").send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_build_requires_refresh_path() {
        let result = AuthenticatedClient::builder(ClientConfig::new("https://crm.example.com", "")).build();
        assert!(matches!(result, Err(ConfigError::MissingRefreshPath)));
    }
}
