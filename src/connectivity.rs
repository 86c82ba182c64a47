//! Online/offline tracking for the UI banner.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

/// Publishes whether the app currently has a connection.
///
/// A background task runs the probe on every interval and updates the flag.
/// Dropping the observer stops the task. Reconnection triggers nothing beyond
/// the flag change.
pub struct ConnectivityObserver {
  rx: watch::Receiver<bool>,
  task: JoinHandle<()>,
}

impl ConnectivityObserver {
  /// Start probing. The flag reads online until the first probe says otherwise.
  pub fn spawn<F, Fut>(probe: F, interval: Duration) -> Self
  where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
  {
    let (tx, rx) = watch::channel(true);

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

      loop {
        ticker.tick().await;
        let online = probe().await;

        let changed = tx.send_if_modified(|current| {
          if *current == online {
            return false;
          }
          *current = online;
          true
        });

        if changed {
          if online {
            info!("Connection restored");
          } else {
            warn!("Connection lost");
          }
        }
      }
    });

    Self { rx, task }
  }

  /// Probe `url` with a HEAD request; any HTTP response counts as online.
  pub fn spawn_http(client: reqwest::Client, url: Url, interval: Duration) -> Self {
    Self::spawn(
      move || {
        let request = client.head(url.clone()).send();
        async move { request.await.is_ok() }
      },
      interval,
    )
  }

  pub fn is_online(&self) -> bool {
    *self.rx.borrow()
  }

  /// Receiver that is notified on every online/offline transition.
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.rx.clone()
  }
}

impl Drop for ConnectivityObserver {
  fn drop(&mut self) {
    self.task.abort();
  }
}
