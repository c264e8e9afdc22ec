use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// Topics published between controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// The stored memo set changed
    MemoUpdated,
    ListCovered,
    ListUncovered,
    ListLocked,
    ListUnlocked,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemoUpdated => "MemoModel-updated",
            Self::ListCovered => "list-covered",
            Self::ListUncovered => "list-uncovered",
            Self::ListLocked => "list-locked",
            Self::ListUnlocked => "list-unlocked",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-process publish/subscribe bus
///
/// Cloning yields another handle onto the same bus. Publishing with no
/// subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Topic>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn publish(&self, topic: Topic) {
        let receivers = self.sender.send(topic).unwrap_or(0);
        debug!("Published {} to {} subscriber(s)", topic, receivers);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Topic> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
