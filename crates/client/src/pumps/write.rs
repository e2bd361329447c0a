//! WebSocket write pump: serialises outbound frames in send order.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Writes frames to the WebSocket until a close frame goes out, the
/// channel closes, or `cancel` fires.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        let is_close = matches!(m, tungstenite::Message::Close(_));
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            return;
                        }
                        if is_close {
                            debug!("close frame sent");
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}
