use std::sync::Arc;

use crate::core::config::Settings;
use crate::repositories::store::GradingStore;
use crate::services::paper_checking::PaperChecker;
use crate::services::storage::ObjectStorage;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn GradingStore>,
    storage: Arc<dyn ObjectStorage>,
    checker: PaperChecker,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn GradingStore>,
        storage: Arc<dyn ObjectStorage>,
        checker: PaperChecker,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, storage, checker }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn GradingStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn storage(&self) -> &dyn ObjectStorage {
        self.inner.storage.as_ref()
    }

    pub(crate) fn checker(&self) -> &PaperChecker {
        &self.inner.checker
    }
}
