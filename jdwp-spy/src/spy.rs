// Relay between a debugger and a VM, recording what passes through
//
// Bytes are forwarded exactly as read. Decoding happens on a copy of each
// frame after it has been written, so a frame the recorder cannot make
// sense of still reaches the other side.

use crate::config::SpyConfig;
use crate::format::Printer;
use anyhow::{Context, Result};
use jdwp_wire::commands::{command_sets, vm_commands};
use jdwp_wire::connector::{expect_handshake, handshake};
use jdwp_wire::eventloop::read_frame;
use jdwp_wire::protocol::JDWP_HANDSHAKE;
use jdwp_wire::{
    Connector, Conversation, ConversationTracker, EventSet, IdSizes, JdwpError, JdwpResult,
    Packet, SocketAttachConnector, SocketListenConnector,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const RECORD_CHANNEL_SIZE: usize = 256;

/// Which way a frame travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    DebuggerToVm,
    VmToDebugger,
}

impl Direction {
    /// The side that sent the frame
    fn sender(self) -> Origin {
        match self {
            Direction::DebuggerToVm => Origin::Debugger,
            Direction::VmToDebugger => Origin::Vm,
        }
    }
}

/// The side that issued the command of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Debugger,
    Vm,
}

impl Origin {
    fn peer(self) -> Origin {
        match self {
            Origin::Debugger => Origin::Vm,
            Origin::Vm => Origin::Debugger,
        }
    }
}

/// Something worth printing
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A command and its reply
    Conversation {
        origin: Origin,
        conversation: Conversation,
    },
    /// An Event.Composite packet from the VM
    Events { id: u32, set: EventSet },
}

/// Pairs commands with replies for both directions of one session
#[derive(Debug, Default)]
pub struct Recorder {
    from_debugger: ConversationTracker,
    from_vm: ConversationTracker,
    id_sizes: Mutex<IdSizes>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn tracker(&self, origin: Origin) -> &ConversationTracker {
        match origin {
            Origin::Debugger => &self.from_debugger,
            Origin::Vm => &self.from_vm,
        }
    }

    pub fn id_sizes(&self) -> IdSizes {
        *self.id_sizes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one complete frame seen travelling in `direction`.
    ///
    /// Commands are held until their reply shows up; the finished
    /// conversation comes back then. Event packets come back immediately.
    pub fn observe(&self, direction: Direction, frame: &[u8]) -> JdwpResult<Option<Record>> {
        let sender = direction.sender();

        match Packet::decode(frame)? {
            Packet::Command(cmd) => {
                if sender == Origin::Vm && EventSet::is_event_packet(&cmd) {
                    let set = EventSet::decode(&cmd, &self.id_sizes())?;
                    return Ok(Some(Record::Events { id: cmd.id, set }));
                }

                self.tracker(sender).record_command(cmd)?;
                Ok(None)
            }
            Packet::Reply(reply) => {
                let origin = sender.peer();
                let Some(conversation) = self.tracker(origin).record_reply(reply)? else {
                    return Ok(None);
                };

                if origin == Origin::Debugger {
                    self.learn_id_sizes(&conversation);
                }

                Ok(Some(Record::Conversation {
                    origin,
                    conversation,
                }))
            }
        }
    }

    /// Ids still waiting for a reply, per origin
    pub fn pending(&self) -> (Vec<u32>, Vec<u32>) {
        (
            self.from_debugger.pending_ids(),
            self.from_vm.pending_ids(),
        )
    }

    // Event decoding needs the widths the debugger was told about
    fn learn_id_sizes(&self, conversation: &Conversation) {
        let (Some(cmd), Some(reply)) = (conversation.command(), conversation.reply()) else {
            return;
        };

        if cmd.command_set != command_sets::VIRTUAL_MACHINE
            || cmd.command != vm_commands::ID_SIZES
            || reply.is_error()
        {
            return;
        }

        match IdSizes::decode(reply.data()) {
            Ok(sizes) => {
                info!("VM id sizes: {:?}", sizes);
                *self.id_sizes.lock().unwrap_or_else(PoisonError::into_inner) = sizes;
            }
            Err(e) => warn!("Ignoring unreadable IDSizes reply: {}", e),
        }
    }
}

/// Accept debuggers on `config.listen` and spy on each session in turn
pub async fn run(config: SpyConfig) -> Result<()> {
    let listener = SocketListenConnector::bind(config.listen)
        .await
        .with_context(|| format!("Failed to listen on {}", config.listen))?;

    info!(
        "Point the debugger at {}, relaying to {}",
        listener.local_addr()?,
        config.target
    );

    loop {
        let debugger = listener.connect().await?;

        if let Err(e) = serve(&config, debugger).await {
            error!("Session failed: {:#}", e);
        }

        if config.once {
            break;
        }
    }

    Ok(())
}

/// Relay one debugger session to the VM
pub async fn serve(config: &SpyConfig, mut debugger: TcpStream) -> Result<()> {
    expect_handshake(&mut debugger)
        .await
        .context("Debugger handshake")?;

    let connector = SocketAttachConnector::new(config.target.host.clone(), config.target.port)
        .with_timeout(config.connect_timeout());
    let mut vm = connector
        .connect()
        .await
        .with_context(|| format!("Failed to connect to VM at {}", config.target))?;
    handshake(&mut vm).await.context("VM handshake")?;

    debugger.write_all(JDWP_HANDSHAKE).await?;
    debugger.flush().await?;

    let printer = Printer::new(config.format, config.payload);
    relay(debugger, vm, config.max_packet_size, printer, tokio::io::stdout()).await
}

/// Pump frames both ways until either side goes away, printing records to
/// `out` as they complete
pub async fn relay<D, V, O>(
    debugger: D,
    vm: V,
    max_packet_size: usize,
    printer: Printer,
    out: O,
) -> Result<()>
where
    D: AsyncRead + AsyncWrite + Send + 'static,
    V: AsyncRead + AsyncWrite + Send + 'static,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let (debugger_rx, debugger_tx) = tokio::io::split(debugger);
    let (vm_rx, vm_tx) = tokio::io::split(vm);

    let recorder = Arc::new(Recorder::new());
    let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_SIZE);
    let print_task = tokio::spawn(print_records(record_rx, printer, out));

    let upstream = pump(
        Direction::DebuggerToVm,
        debugger_rx,
        vm_tx,
        max_packet_size,
        recorder.clone(),
        record_tx.clone(),
    );
    let downstream = pump(
        Direction::VmToDebugger,
        vm_rx,
        debugger_tx,
        max_packet_size,
        recorder.clone(),
        record_tx,
    );

    // Whichever side finishes first ends the session
    let result = tokio::select! {
        r = upstream => r.context("Debugger to VM"),
        r = downstream => r.context("VM to debugger"),
    };

    let (from_debugger, from_vm) = recorder.pending();
    if !from_debugger.is_empty() || !from_vm.is_empty() {
        info!(
            "Session ended with unanswered commands: debugger {:?}, vm {:?}",
            from_debugger, from_vm
        );
    }

    print_task.await??;
    result
}

async fn pump<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    max_packet_size: usize,
    recorder: Arc<Recorder>,
    records: mpsc::Sender<Record>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = match read_frame(&mut reader, max_packet_size).await {
            Ok(frame) => frame,
            Err(JdwpError::ConnectionClosed) => {
                info!("{:?}: connection closed", direction);
                break;
            }
            Err(e) => return Err(e.into()),
        };

        writer.write_all(&frame).await?;
        writer.flush().await?;

        match recorder.observe(direction, &frame) {
            Ok(Some(record)) => {
                if records.send(record).await.is_err() {
                    debug!("Printer gone, relaying without recording");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("{:?}: could not record frame: {}", direction, e),
        }
    }

    writer.shutdown().await?;
    Ok(())
}

async fn print_records<O>(mut records: mpsc::Receiver<Record>, printer: Printer, mut out: O) -> Result<()>
where
    O: AsyncWrite + Unpin,
{
    while let Some(record) = records.recv().await {
        let mut line = printer.render(&record)?;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}
