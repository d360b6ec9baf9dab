//! Delivering posts to subscribers.

pub mod telegram;

pub use telegram::TelegramChannel;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::subscriber::SubscriberId;

/// Sends one message to one subscriber.
///
/// Errors are per message; the monitor logs them and retries the item on the
/// next cycle.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, to: SubscriberId, text: &str) -> Result<(), DeliveryError>;
}
