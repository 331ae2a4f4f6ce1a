//! Per-connection output queue and the task that drains it onto the socket.

use std::sync::Arc;

use gameworld_net::{FrameConfig, FrameError, write_frame};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::SendError;

/// An encoded packet body, shared between a caster and its spectators.
pub type Frame = Arc<[u8]>;

/// Item queued for a connection's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    /// Flush what came before, then close the socket.
    Close,
}

/// Sending half of a connection's output queue.
///
/// Queuing never blocks, so sessions can write from the game executor thread
/// as well as from async tasks.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

/// Receiving half, owned by the writer task.
#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::UnboundedReceiver<Outbound>,
}

/// Create a connected outbox pair.
pub fn outbox() -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbox { tx }, OutboxReceiver { rx })
}

impl Outbox {
    /// Queue a frame for delivery.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| SendError::Closed)
    }

    /// Ask the writer to close the connection after the frames already queued.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Whether the writer is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the writer has stopped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl OutboxReceiver {
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Next queued item without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// Every frame queued so far, stopping at a close request.
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(item) = self.try_recv() {
            match item {
                Outbound::Frame(frame) => frames.push(frame),
                Outbound::Close => break,
            }
        }
        frames
    }
}

/// Write queued frames until a close request arrives or every sender is gone,
/// then shut the write half down.
///
/// A frame over the size limit is logged and skipped; nothing of it reaches
/// the socket, so the stream stays in sync.
pub async fn run_writer<W>(
    mut writer: W,
    mut queue: OutboxReceiver,
    config: FrameConfig,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = queue.recv().await {
        match item {
            Outbound::Frame(frame) => match write_frame(&mut writer, &frame, &config).await {
                Err(FrameError::PayloadTooLarge { size, max }) => {
                    tracing::warn!(opcode = frame.first().copied(), size, max, "Dropped oversized packet");
                }
                result => result?,
            },
            Outbound::Close => break,
        }
    }
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gameworld_net::read_frame;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_writer_flushes_frames_before_close() {
        let (client, mut server) = duplex(1024);
        let (outbox, queue) = outbox();
        let writer = tokio::spawn(run_writer(client, queue, FrameConfig::default()));

        outbox.send(Arc::from(&b"\x1d"[..])).unwrap();
        outbox.send(Arc::from(&b"\x14bye"[..])).unwrap();
        outbox.close();

        let config = FrameConfig::default();
        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"\x1d");
        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"\x14bye");
        assert!(read_frame(&mut server, &config).await.is_err());

        writer.await.unwrap().unwrap();
        outbox.closed().await;
        assert!(outbox.send(Arc::from(&b"late"[..])).is_err());
    }

    #[tokio::test]
    async fn test_oversized_frame_skipped_not_fatal() {
        let (client, mut server) = duplex(1024);
        let (outbox, queue) = outbox();
        let config = FrameConfig { max_payload_size: 8 };
        let writer = tokio::spawn(run_writer(client, queue, config.clone()));

        outbox.send(Arc::from(&b"\x1d"[..])).unwrap();
        outbox.send(Arc::from(vec![0xaa; 64])).unwrap();
        outbox.send(Arc::from(&b"\x1e"[..])).unwrap();
        outbox.close();

        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"\x1d");
        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"\x1e");
        assert!(read_frame(&mut server, &config).await.is_err());
        writer.await.unwrap().unwrap();
    }

    #[test]
    fn test_drain_stops_at_close() {
        let (outbox, mut queue) = outbox();
        outbox.send(Arc::from(&b"a"[..])).unwrap();
        outbox.close();
        outbox.send(Arc::from(&b"b"[..])).unwrap();

        let frames = queue.drain_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(&*frames[0], b"a");
    }
}
