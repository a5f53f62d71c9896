//! Where credentials and the selected tenant live. The client only reads them, and writes
//! credentials back after a successful refresh.
use std::fmt::Debug;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &crate::sanitize::SANITIZED_VALUE)
            .field("refresh_token", &crate::sanitize::SANITIZED_VALUE)
            .finish()
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync + Debug {
    async fn access_token(&self) -> StoreResult<Option<String>>;
    async fn refresh_token(&self) -> StoreResult<Option<String>>;
    async fn set_tokens(&self, credential: Credential) -> StoreResult<()>;
    async fn clear_tokens(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait TenantStore: Send + Sync + Debug {
    async fn selected_tenant_id(&self) -> StoreResult<Option<String>>;
}

/// Keeps the credential in process memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credential: RwLock<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: RwLock::new(Some(credential)),
        }
    }

    pub fn credential(&self) -> Option<Credential> {
        self.credential.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn access_token(&self) -> StoreResult<Option<String>> {
        Ok(self.credential().map(|c| c.access_token))
    }

    async fn refresh_token(&self) -> StoreResult<Option<String>> {
        Ok(self.credential().map(|c| c.refresh_token))
    }

    async fn set_tokens(&self, credential: Credential) -> StoreResult<()> {
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = Some(credential);
        Ok(())
    }

    async fn clear_tokens(&self) -> StoreResult<()> {
        *self.credential.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Holds the selected company in process memory.
#[derive(Debug, Default)]
pub struct MemoryTenantStore {
    tenant_id: RwLock<Option<String>>,
}

impl MemoryTenantStore {
    pub fn new(tenant_id: Option<String>) -> Self {
        Self {
            tenant_id: RwLock::new(tenant_id),
        }
    }

    pub fn select(&self, tenant_id: Option<String>) {
        *self.tenant_id.write().unwrap_or_else(|e| e.into_inner()) = tenant_id;
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn selected_tenant_id(&self) -> StoreResult<Option<String>> {
        Ok(self.tenant_id.read().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
