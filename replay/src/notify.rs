//! Notifications raised when cached feeds change or an administrator asks
//! the farm to resynchronise.

use crate::error::{ReplayError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::broadcast;

/// A notification delivered to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FarmNotification {
    /// Configuration must be re-read (payload feed changed).
    ReloadConfiguration,
    /// Management data must be refreshed (threat feed changed).
    RefreshManagementData,
    /// The replay cache must be emptied.
    ResetReplay,
}

/// Receives the local side effects of feed updates.
pub trait Notifier: Send + Sync {
    /// The payload feed changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    fn reload_configuration(&self) -> impl Future<Output = Result<()>> + Send;

    /// The threat feed changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    fn refresh_management_data(&self) -> impl Future<Output = Result<()>> + Send;
}

/// [`Notifier`] publishing on an in-process broadcast channel.
///
/// Delivery is fire-and-forget: a subscriber that lags drops the oldest
/// notifications, and publishing with no subscriber is an error the caller
/// only logs.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: broadcast::Sender<FarmNotification>,
}

impl ChannelNotifier {
    /// Channel buffering up to `capacity` notifications per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New subscription receiving every later notification.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FarmNotification> {
        self.sender.subscribe()
    }

    /// Publish any notification.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Notification`] when nobody is subscribed.
    pub fn publish(&self, notification: FarmNotification) -> Result<()> {
        self.sender
            .send(notification)
            .map(|receivers| {
                tracing::debug!(?notification, receivers, "Notification published");
            })
            .map_err(|e| ReplayError::Notification(e.to_string()))
    }
}

impl Notifier for ChannelNotifier {
    async fn reload_configuration(&self) -> Result<()> {
        self.publish(FarmNotification::ReloadConfiguration)
    }

    async fn refresh_management_data(&self) -> Result<()> {
        self.publish(FarmNotification::RefreshManagementData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let notifier = ChannelNotifier::new(4);
        let mut rx = notifier.subscribe();

        notifier.reload_configuration().await.unwrap();
        notifier.refresh_management_data().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), FarmNotification::ReloadConfiguration);
        assert_eq!(rx.recv().await.unwrap(), FarmNotification::RefreshManagementData);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_fails() {
        let notifier = ChannelNotifier::new(1);
        assert!(matches!(
            notifier.publish(FarmNotification::ResetReplay),
            Err(ReplayError::Notification(_))
        ));
    }
}
