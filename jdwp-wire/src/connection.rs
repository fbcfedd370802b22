// JDWP connection management
//
// Handles connector setup, handshake, and event loop startup

use crate::connector::{handshake, Connector};
use crate::eventloop::{spawn_event_loop, EventLoopHandle, EventLoopOptions, MAX_PACKET_SIZE};
use crate::events::EventSet;
use crate::protocol::*;
use crate::types::IdSizes;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Tunables for a debugger-side connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub handshake_timeout: Duration,
    /// Deadline applied to every command; `None` waits forever
    pub reply_timeout: Option<Duration>,
    pub command_channel_size: usize,
    pub event_channel_size: usize,
    pub max_packet_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            reply_timeout: Some(Duration::from_secs(10)),
            command_channel_size: 32,
            event_channel_size: 256,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

impl ConnectionConfig {
    fn loop_options(&self) -> EventLoopOptions {
        EventLoopOptions {
            command_channel_size: self.command_channel_size,
            event_channel_size: self.event_channel_size,
            max_packet_size: self.max_packet_size,
        }
    }
}

#[derive(Debug)]
pub struct JdwpConnection {
    event_loop: EventLoopHandle,
    next_id: Arc<AtomicU32>,
    reply_timeout: Option<Duration>,
}

impl JdwpConnection {
    /// Connect to a JVM via JDWP, handshake, and learn its id sizes
    pub async fn connect<C: Connector>(connector: &C, config: ConnectionConfig) -> JdwpResult<Self> {
        let mut stream = connector.connect().await?;

        tokio::time::timeout(config.handshake_timeout, handshake(&mut stream))
            .await
            .map_err(|_| {
                JdwpError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "handshake timed out",
                ))
            })??;

        let mut connection = Self::from_stream(stream, &config);
        connection.refresh_id_sizes().await?;

        Ok(connection)
    }

    /// Run a session over a stream that already completed the handshake
    pub fn from_stream<S>(stream: S, config: &ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let event_loop = spawn_event_loop(reader, writer, config.loop_options());

        Self {
            event_loop,
            next_id: Arc::new(AtomicU32::new(1)),
            reply_timeout: config.reply_timeout,
        }
    }

    /// Send a command and wait for reply
    pub async fn send_command(&mut self, packet: CommandPacket) -> JdwpResult<ReplyPacket> {
        debug!("Sending command packet id={}", packet.id);
        self.event_loop
            .send_command(packet, self.reply_timeout)
            .await
    }

    /// Try to receive an event (non-blocking)
    pub async fn try_recv_event(&self) -> Option<EventSet> {
        self.event_loop.try_recv_event().await
    }

    /// Wait for the next event (blocking)
    pub async fn recv_event(&self) -> Option<EventSet> {
        self.event_loop.recv_event().await
    }

    /// Ask the VM for its id widths and use them from now on
    pub async fn refresh_id_sizes(&mut self) -> JdwpResult<IdSizes> {
        let sizes = self.get_id_sizes().await?;
        info!("VM id sizes: {:?}", sizes);
        self.event_loop.set_id_sizes(sizes);
        Ok(sizes)
    }

    /// Id widths currently used for encoding and decoding
    pub fn id_sizes(&self) -> IdSizes {
        self.event_loop.id_sizes()
    }

    /// Generate next packet ID
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}
