// Outer surfaces the controllers talk to: navigation and modal dialogs

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Route changes requested by controllers
pub trait Navigator: Send + Sync {
    fn go(&self, path: &str);
}

/// Navigator that remembers every route it was sent to
#[derive(Debug, Default)]
pub struct HistoryNavigator {
    history: Mutex<Vec<String>>,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<String> {
        self.history.lock().last().cloned()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }
}

impl Navigator for HistoryNavigator {
    fn go(&self, path: &str) {
        info!("Navigating to {}", path);
        self.history.lock().push(path.to_string());
    }
}

/// The user closed a dialog without confirming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dialog dismissed")]
pub struct Dismissed;

/// Modal confirmation dialog
#[async_trait]
pub trait Dialog: Send + Sync {
    /// Resolves `Ok` on confirm. With `hide_cancel` the dialog is purely
    /// informational and can only be confirmed.
    async fn show(&self, title: &str, body: &str, hide_cancel: bool) -> Result<(), Dismissed>;
}

/// Dialog on the terminal
///
/// Informational dialogs are printed and confirmed immediately; questions
/// read a y/N answer from stdin unless `assume_yes` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDialog {
    assume_yes: bool,
}

impl ConsoleDialog {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

#[async_trait]
impl Dialog for ConsoleDialog {
    async fn show(&self, title: &str, body: &str, hide_cancel: bool) -> Result<(), Dismissed> {
        eprintln!("{}\n{}", title, body);

        if hide_cancel || self.assume_yes {
            return Ok(());
        }

        eprint!("Continue? [y/N] ");
        let mut answer = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        if let Err(e) = stdin.read_line(&mut answer).await {
            warn!("Failed to read dialog answer: {}", e);
            return Err(Dismissed);
        }

        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => Ok(()),
            _ => Err(Dismissed),
        }
    }
}

/// Dialog for non-interactive callers: logs and confirms
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirmDialog;

#[async_trait]
impl Dialog for AutoConfirmDialog {
    async fn show(&self, title: &str, body: &str, _hide_cancel: bool) -> Result<(), Dismissed> {
        warn!("{}: {}", title, body);
        Ok(())
    }
}
