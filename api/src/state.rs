use std::sync::Arc;
use std::time::Instant;

use shared::blob::BlobStore;
use shared::lifecycle::PatchLifecycle;
use shared::store::VersionStore;

use crate::auth::AuthManager;
use crate::report::ReportSink;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VersionStore>,
    pub lifecycle: PatchLifecycle,
    pub auth: Arc<AuthManager>,
    pub reports: Arc<ReportSink>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn VersionStore>,
        blobs: Arc<dyn BlobStore>,
        auth: AuthManager,
        reports: ReportSink,
    ) -> Self {
        Self {
            lifecycle: PatchLifecycle::new(store.clone(), blobs),
            store,
            auth: Arc::new(auth),
            reports: Arc::new(reports),
            started_at: Instant::now(),
        }
    }
}
