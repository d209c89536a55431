//! Native WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{future, stream, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{Connector, Duplex, TransportError};

#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Duplex, TransportError> {
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| TransportError::Io(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));

        // Only text frames carry protocol data. Pings are answered by
        // tungstenite itself; a close frame ends the stream.
        let frames = stream::unfold(read, |mut read| async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Some((Ok(text.as_str().to_owned()), read));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "received close frame");
                        return None;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        tracing::trace!(len = data.len(), "received ping");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Some((Err(TransportError::Io(e.to_string())), read));
                    }
                    None => return None,
                }
            }
        });

        Ok(Duplex {
            sink: Box::pin(sink),
            stream: Box::pin(frames),
        })
    }
}
