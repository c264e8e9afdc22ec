use crate::controller::{MemoController, RecordController};
use crate::memo::MemoStore;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<RecordController>,
    pub memos: Arc<MemoController>,
    /// Raw store access for audio downloads
    pub store: Arc<dyn MemoStore>,
}

impl AppState {
    pub fn new(
        recorder: Arc<RecordController>,
        memos: Arc<MemoController>,
        store: Arc<dyn MemoStore>,
    ) -> Self {
        Self {
            recorder,
            memos,
            store,
        }
    }
}
