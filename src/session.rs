use std::fmt::{Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::store::CredentialStore;

/// Presented by the UI layer. Expected to block interaction and reset navigation to sign-in.
pub type SessionExpiredCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Ends the local session when authentication cannot be recovered: clears the stored credential,
/// then notifies the UI layer.
pub struct SessionExpiry {
    credentials: Arc<dyn CredentialStore>,
    callback: Option<SessionExpiredCallback>,
    dedupe: bool,
    in_progress: AtomicBool,
}

impl Debug for SessionExpiry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionExpiry")
            .field("credentials", &self.credentials)
            .field("callback", &self.callback.as_ref().map(|_| "Fn()"))
            .field("dedupe", &self.dedupe)
            .finish()
    }
}

struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SessionExpiry {
    pub fn new(credentials: Arc<dyn CredentialStore>, callback: Option<SessionExpiredCallback>) -> Self {
        Self {
            credentials,
            callback,
            dedupe: false,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Skip escalations that arrive while another one is still running.
    pub fn dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Clear credentials and notify. Never fails: store and callback failures are logged.
    /// Returns false when the escalation was skipped as a duplicate.
    pub async fn expire(&self) -> bool {
        let _guard = if self.dedupe {
            if self.in_progress.swap(true, Ordering::SeqCst) {
                debug!("Session expiry already in progress");
                return false;
            }
            Some(InProgress(&self.in_progress))
        } else {
            None
        };

        if let Err(e) = self.credentials.clear_tokens().await {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        info!("Session expired");
        if let Some(callback) = &self.callback {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                warn!("Session-expired callback panicked");
            }
        }
        true
    }
}
