use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use log::debug;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use warp::ws::{Message, WebSocket};

use crate::channel::types::ScanChannel;
use crate::error_handling::types::ChannelError;

/// [`ScanChannel`] over an upgraded warp WebSocket.
///
/// A background task drains the inbound half so that a close frame or a
/// dropped connection is noticed even while the scan produces no output.
pub struct WsChannel {
    sink: SplitSink<WebSocket, Message>,
    disconnected: CancellationToken,
    reader: JoinHandle<()>,
    closed: bool,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, mut stream) = socket.split();
        let disconnected = CancellationToken::new();
        let token = disconnected.clone();

        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(msg) if msg.is_close() => {
                        debug!("Observer sent close frame");
                        break;
                    }
                    // Inbound payloads carry no meaning for a scan.
                    Ok(_) => continue,
                    Err(e) => {
                        debug!("WebSocket read error: {}", e);
                        break;
                    }
                }
            }
            token.cancel();
        });

        Self {
            sink,
            disconnected,
            reader,
            closed: false,
        }
    }
}

#[async_trait]
impl ScanChannel for WsChannel {
    async fn send(&mut self, line: &str) -> Result<(), ChannelError> {
        if self.closed || self.disconnected.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        self.sink.send(Message::text(line)).await.map_err(|e| {
            debug!("WebSocket send failed: {}", e);
            self.disconnected.cancel();
            ChannelError::Closed
        })
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !self.disconnected.is_cancelled() {
            if let Err(e) = self.sink.send(Message::close()).await {
                debug!("Failed to send close frame: {}", e);
            }
        }
        if let Err(e) = self.sink.close().await {
            debug!("Failed to close WebSocket: {}", e);
        }
        self.reader.abort();
    }

    fn disconnected(&self) -> CancellationToken {
        self.disconnected.clone()
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
