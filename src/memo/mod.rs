//! Memo persistence: the stored record, the store, and the update bus.

mod bus;
mod model;
mod store;

pub use bus::{EventBus, Topic};
pub use model::{make_url, Memo, DEFAULT_TITLE};
pub use store::{FileMemoStore, MemoStore, SortKey, SortOrder};
