//! User-visible notifications raised by task store mutations.

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::event::Event;

/// Styling of a notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variant {
  #[default]
  Default,
  /// Failure; rendered in red
  Destructive,
}

/// A transient message shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub description: String,
  pub variant: Variant,
}

impl Notification {
  pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      description: description.into(),
      variant: Variant::Default,
    }
  }

  pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      description: description.into(),
      variant: Variant::Destructive,
    }
  }
}

/// Sink for notifications
pub trait Notifier {
  fn notify(&self, notification: Notification);
}

/// The TUI receives notifications through its event channel
impl Notifier for mpsc::UnboundedSender<Event> {
  fn notify(&self, notification: Notification) {
    // The receiver only goes away during shutdown
    let _ = self.send(Event::Notify(notification));
  }
}

/// Notifier for non-interactive commands: notifications go to the log and stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  fn notify(&self, notification: Notification) {
    match notification.variant {
      Variant::Default => {
        info!(title = %notification.title, "{}", notification.description);
      }
      Variant::Destructive => {
        error!(title = %notification.title, "{}", notification.description);
        eprintln!("{}: {}", notification.title, notification.description);
      }
    }
  }
}
