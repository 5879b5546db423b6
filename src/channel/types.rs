use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error_handling::types::ChannelError;

/// Bidirectional connection to the party observing one scan.
///
/// Only the outbound direction carries data. Inbound traffic matters solely
/// for noticing that the observer went away, which is signalled through
/// [`disconnected`](ScanChannel::disconnected).
#[async_trait]
pub trait ScanChannel: Send {
    /// Delivers one text message. Fails once the observer is gone.
    async fn send(&mut self, line: &str) -> Result<(), ChannelError>;

    /// Closes the channel. Calling it more than once is a no-op.
    async fn close(&mut self);

    /// Token cancelled when the observer disconnects on its own.
    fn disconnected(&self) -> CancellationToken;
}
