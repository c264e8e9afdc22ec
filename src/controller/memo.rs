use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ports::{Dialog, Navigator};
use crate::error::StoreError;
use crate::memo::{EventBus, Memo, MemoStore, SortKey, SortOrder, Topic};

const DELETE_TITLE: &str = "Delete this memo?";
const DELETE_BODY: &str = "Can't get it back if you get rid of it. Just sayin'.";

/// List, details and edit flows over stored memos
pub struct MemoController {
    store: Arc<dyn MemoStore>,
    bus: EventBus,
    navigator: Arc<dyn Navigator>,
    dialog: Arc<dyn Dialog>,
}

impl MemoController {
    pub fn new(
        store: Arc<dyn MemoStore>,
        bus: EventBus,
        navigator: Arc<dyn Navigator>,
        dialog: Arc<dyn Dialog>,
    ) -> Self {
        Self {
            store,
            bus,
            navigator,
            dialog,
        }
    }

    /// Newest first, without audio
    pub async fn list(&self) -> Result<Vec<Memo>, StoreError> {
        self.store.list(SortKey::Time, SortOrder::Descending).await
    }

    /// Show one memo over the list. Unknown memos send the user home.
    pub async fn open_details(&self, url: &str) -> Result<Option<Memo>, StoreError> {
        self.bus.publish(Topic::ListCovered);
        self.load_or_go_home(url).await
    }

    pub fn close_details(&self) {
        self.bus.publish(Topic::ListUncovered);
        self.navigator.go("/");
    }

    /// Lock the list and load the memo for editing
    pub async fn open_edit(&self, url: &str) -> Result<Option<Memo>, StoreError> {
        if url.is_empty() {
            self.navigator.go("/");
            return Ok(None);
        }

        self.bus.publish(Topic::ListLocked);
        self.load_or_go_home(url).await
    }

    /// Store edited fields; a blank title becomes the default title
    pub async fn save_edit(
        &self,
        url: &str,
        title: &str,
        description: Option<String>,
    ) -> Result<Memo, StoreError> {
        let mut memo = self.store.get(url).await?;
        memo.set_title(title);
        memo.set_description(description);

        self.store.put(&memo).await?;
        info!("Memo saved: {} ({})", memo.url, memo.title);

        self.bus.publish(Topic::MemoUpdated);
        self.bus.publish(Topic::ListUnlocked);
        self.navigator.go(&format!("/details/{}", memo.url));

        Ok(memo)
    }

    /// Leave the editor without saving
    pub fn cancel_edit(&self, url: &str) {
        self.bus.publish(Topic::ListUnlocked);
        self.navigator.go(&format!("/details/{}", url));
    }

    /// Delete after confirmation. Returns `false` if the user backed out.
    pub async fn delete_memo(&self, url: &str) -> Result<bool, StoreError> {
        if self.dialog.show(DELETE_TITLE, DELETE_BODY, false).await.is_err() {
            debug!("Delete of {} dismissed", url);
            return Ok(false);
        }

        self.store.delete(url).await?;
        info!("Memo deleted: {}", url);

        self.bus.publish(Topic::MemoUpdated);
        self.navigator.go("/");

        Ok(true)
    }

    async fn load_or_go_home(&self, url: &str) -> Result<Option<Memo>, StoreError> {
        match self.store.get(url).await {
            Ok(memo) => Ok(Some(memo)),
            Err(StoreError::NotFound(_)) => {
                warn!("No memo {}", url);
                self.navigator.go("/");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
