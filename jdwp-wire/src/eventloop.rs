// JDWP Event Loop
//
// One task reads frames off the stream; the loop task writes outgoing
// commands, pairs replies with their commands through a ConversationTracker
// and forwards event sets to listeners.

use crate::conversation::ConversationTracker;
use crate::events::{parse_event_packet, EventSet};
use crate::protocol::{
    CommandPacket, JdwpError, JdwpResult, Packet, PacketHeader, ReplyPacket, HEADER_SIZE,
};
use crate::types::IdSizes;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Maximum allowed JDWP packet size (10MB)
pub const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

/// Request to send a command and get reply
#[derive(Debug)]
pub struct CommandRequest {
    pub packet: CommandPacket,
    pub reply_tx: oneshot::Sender<JdwpResult<ReplyPacket>>,
}

#[derive(Debug)]
enum LoopRequest {
    Command(CommandRequest),
    /// The caller gave up on this id
    Discard(u32),
}

/// Channel sizing and limits for one event loop
#[derive(Debug, Clone, Copy)]
pub struct EventLoopOptions {
    pub command_channel_size: usize,
    pub event_channel_size: usize,
    pub max_packet_size: usize,
}

impl Default for EventLoopOptions {
    fn default() -> Self {
        Self {
            command_channel_size: 32,
            event_channel_size: 256,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

/// Handle to the event loop for sending commands and receiving events
#[derive(Clone, Debug)]
pub struct EventLoopHandle {
    request_tx: mpsc::Sender<LoopRequest>,
    event_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<EventSet>>>,
    id_sizes_tx: Arc<watch::Sender<IdSizes>>,
}

impl EventLoopHandle {
    /// Send a command and wait for its reply.
    ///
    /// With a deadline, the conversation is discarded once it passes and a
    /// reply arriving afterwards is dropped by the loop.
    pub async fn send_command(
        &self,
        packet: CommandPacket,
        deadline: Option<Duration>,
    ) -> JdwpResult<ReplyPacket> {
        let id = packet.id;
        let (reply_tx, reply_rx) = oneshot::channel();

        self.request_tx
            .send(LoopRequest::Command(CommandRequest { packet, reply_tx }))
            .await
            .map_err(|_| JdwpError::ConnectionClosed)?;

        let outcome = match deadline {
            None => reply_rx.await,
            Some(limit) => match tokio::time::timeout(limit, reply_rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("No reply to command id={} within {:?}", id, limit);
                    // The loop may already be gone; then there is nothing to discard
                    self.request_tx.send(LoopRequest::Discard(id)).await.ok();
                    return Err(JdwpError::Timeout(id));
                }
            },
        };

        outcome.map_err(|_| JdwpError::ConnectionClosed)?
    }

    /// Try to receive an event (non-blocking)
    pub async fn try_recv_event(&self) -> Option<EventSet> {
        let mut rx = self.event_rx.lock().await;
        rx.try_recv().ok()
    }

    /// Wait for the next event (blocking)
    pub async fn recv_event(&self) -> Option<EventSet> {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await
    }

    /// Id widths used to decode subsequent event packets
    pub fn set_id_sizes(&self, sizes: IdSizes) {
        self.id_sizes_tx.send_replace(sizes);
    }

    pub fn id_sizes(&self) -> IdSizes {
        *self.id_sizes_tx.borrow()
    }
}

/// Start the event loop task
pub fn spawn_event_loop<R, W>(reader: R, writer: W, options: EventLoopOptions) -> EventLoopHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (request_tx, request_rx) = mpsc::channel(options.command_channel_size);
    // Events are critical (breakpoints, exceptions) and shouldn't be dropped
    let (event_tx, event_rx) = mpsc::channel(options.event_channel_size);
    let (id_sizes_tx, id_sizes_rx) = watch::channel(IdSizes::default());

    // Frames are read on their own task so a half-read packet is never lost
    // to the select! below
    let (frame_tx, frame_rx) = mpsc::channel(options.event_channel_size);
    tokio::spawn(reader_task(reader, frame_tx, options.max_packet_size));
    tokio::spawn(event_loop_task(writer, request_rx, frame_rx, event_tx, id_sizes_rx));

    EventLoopHandle {
        request_tx,
        event_rx: Arc::new(tokio::sync::Mutex::new(event_rx)),
        id_sizes_tx: Arc::new(id_sizes_tx),
    }
}

async fn reader_task<R: AsyncRead + Unpin>(
    mut reader: R,
    frame_tx: mpsc::Sender<JdwpResult<Vec<u8>>>,
    max_packet_size: usize,
) {
    loop {
        let result = read_frame(&mut reader, max_packet_size).await;
        let stop = result.is_err();
        if frame_tx.send(result).await.is_err() || stop {
            break;
        }
    }
}

/// Main event loop task
async fn event_loop_task<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut request_rx: mpsc::Receiver<LoopRequest>,
    mut frame_rx: mpsc::Receiver<JdwpResult<Vec<u8>>>,
    event_tx: mpsc::Sender<EventSet>,
    id_sizes: watch::Receiver<IdSizes>,
) {
    info!("Event loop started");

    let tracker = ConversationTracker::new();
    let mut waiters: HashMap<u32, oneshot::Sender<JdwpResult<ReplyPacket>>> = HashMap::new();

    loop {
        tokio::select! {
            request = request_rx.recv() => {
                match request {
                    Some(LoopRequest::Command(cmd)) => {
                        send_command(&mut writer, &tracker, &mut waiters, cmd).await;
                    }
                    Some(LoopRequest::Discard(id)) => {
                        if tracker.discard(id).is_some() {
                            debug!("Discarded conversation id={}", id);
                        }
                        waiters.remove(&id);
                    }
                    None => {
                        debug!("All handles dropped");
                        break;
                    }
                }
            }

            result = frame_rx.recv() => {
                match result {
                    Some(Ok(frame)) => {
                        let sizes = *id_sizes.borrow();
                        route_frame(&frame, &tracker, &mut waiters, &event_tx, &sizes);
                    }
                    Some(Err(JdwpError::ConnectionClosed)) | None => {
                        info!("Connection closed by VM");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("Failed to read packet: {}", e);
                        break;
                    }
                }
            }
        }
    }

    for (id, tx) in waiters.drain() {
        debug!("Failing pending command id={}", id);
        tx.send(Err(JdwpError::ConnectionClosed)).ok();
    }

    info!("Event loop shutting down");
}

async fn send_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    tracker: &ConversationTracker,
    waiters: &mut HashMap<u32, oneshot::Sender<JdwpResult<ReplyPacket>>>,
    cmd: CommandRequest,
) {
    let packet_id = cmd.packet.id;
    let encoded = cmd.packet.encode();

    if let Err(e) = tracker.record_command(cmd.packet) {
        warn!("Refusing command: {}", e);
        cmd.reply_tx.send(Err(e)).ok();
        return;
    }

    debug!("Sending command id={}", packet_id);

    let written = match writer.write_all(&encoded).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        error!("Failed to write command: {}", e);
        tracker.discard(packet_id);
        cmd.reply_tx.send(Err(JdwpError::Io(e))).ok();
        return;
    }

    waiters.insert(packet_id, cmd.reply_tx);
}

fn route_frame(
    frame: &[u8],
    tracker: &ConversationTracker,
    waiters: &mut HashMap<u32, oneshot::Sender<JdwpResult<ReplyPacket>>>,
    event_tx: &mpsc::Sender<EventSet>,
    sizes: &IdSizes,
) {
    let packet = match Packet::decode(frame) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Failed to decode packet: {}", e);
            return;
        }
    };

    match packet {
        Packet::Reply(reply) => {
            let packet_id = reply.id;
            debug!("Received reply id={}", packet_id);

            match tracker.record_reply(reply) {
                Ok(Some(conversation)) => {
                    let (_, reply) = conversation.into_parts();
                    match (waiters.remove(&packet_id), reply) {
                        (Some(tx), Some(reply)) => {
                            tx.send(Ok(reply)).ok();
                        }
                        _ => debug!("Nobody waiting on reply id={}", packet_id),
                    }
                }
                Ok(None) => {
                    debug!("Dropped late reply id={}", packet_id);
                }
                Err(e) => {
                    warn!("Reply rejected: {}", e);
                }
            }
        }
        Packet::Command(command) if EventSet::is_event_packet(&command) => {
            debug!("Received event packet, len={}", command.data.len());

            match parse_event_packet(command.data(), sizes) {
                Ok(event_set) => {
                    info!(
                        "Parsed event set: {} events, suspend_policy={}",
                        event_set.events.len(),
                        event_set.suspend_policy
                    );

                    match event_tx.try_send(event_set) {
                        Ok(_) => {}
                        Err(mpsc::error::TrySendError::Full(event)) => {
                            error!(
                                "Event channel full! Dropping event set with {} events",
                                event.events.len()
                            );
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            warn!("Event receiver dropped, future events will be discarded");
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to parse event: {}", e);
                }
            }
        }
        Packet::Command(command) => {
            warn!(
                "Ignoring command {}.{} id={} sent by the VM",
                command.command_set, command.command, command.id
            );
        }
    }
}

/// Read one whole packet (header included) from the stream
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_packet_size: usize,
) -> JdwpResult<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];

    if let Err(e) = reader.read_exact(&mut header).await {
        return Err(if e.kind() == ErrorKind::UnexpectedEof {
            JdwpError::ConnectionClosed
        } else {
            JdwpError::Io(e)
        });
    }

    let length = PacketHeader::decode(&header)?.length as usize;

    if length > max_packet_size {
        return Err(JdwpError::Protocol(format!(
            "Packet too large: {} bytes (max: {} bytes)",
            length, max_packet_size
        )));
    }

    let mut frame = Vec::with_capacity(length);
    frame.extend_from_slice(&header);
    frame.resize(length, 0);
    reader.read_exact(&mut frame[HEADER_SIZE..]).await?;

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_frame_splits_back_to_back_packets() {
        let mut bytes = ReplyPacket::new(1, 0, vec![1, 2, 3]).encode();
        bytes.extend(CommandPacket::new(2, 64, 100).encode());
        let mut reader = bytes.as_slice();

        let first = read_frame(&mut reader, MAX_PACKET_SIZE).await.unwrap();
        assert_eq!(first.len(), HEADER_SIZE + 3);

        let second = read_frame(&mut reader, MAX_PACKET_SIZE).await.unwrap();
        assert_eq!(second.len(), HEADER_SIZE);

        assert!(matches!(
            read_frame(&mut reader, MAX_PACKET_SIZE).await,
            Err(JdwpError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_packet() {
        let bytes = ReplyPacket::new(1, 0, vec![0; 64]).encode();
        let mut reader = bytes.as_slice();

        assert!(matches!(
            read_frame(&mut reader, 32).await,
            Err(JdwpError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_read_frame_cut_mid_payload_is_io_error() {
        let mut bytes = ReplyPacket::new(1, 0, vec![0; 8]).encode();
        bytes.truncate(15);
        let mut reader = bytes.as_slice();

        assert!(matches!(
            read_frame(&mut reader, MAX_PACKET_SIZE).await,
            Err(JdwpError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_short_declared_length() {
        let bytes = [0u8, 0, 0, 3, 0, 0, 0, 1, 0, 1, 1];
        let mut reader = &bytes[..];

        assert!(matches!(
            read_frame(&mut reader, MAX_PACKET_SIZE).await,
            Err(JdwpError::TruncatedPacket { .. })
        ));
    }
}
