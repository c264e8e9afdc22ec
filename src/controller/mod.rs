//! Controllers tying recording sessions and the memo store to the outer
//! surfaces (navigation, dialogs).

mod memo;
mod ports;
mod record;

pub use memo::MemoController;
pub use ports::{AutoConfirmDialog, ConsoleDialog, Dialog, Dismissed, HistoryNavigator, Navigator};
pub use record::{RecordController, RecordingReport};
