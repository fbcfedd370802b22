// JDWP wire layer
//
// The transport-independent core of the Java Debug Wire Protocol:
// - String codec (length-prefixed modified UTF-8)
// - Command/reply packet model
// - Conversation tracking (command/reply correlation)
// - Event record decoding
// plus a tokio session on top of it that exercises a few real commands.

pub mod commands;
pub mod connection;
pub mod connector;
pub mod conversation;
pub mod eventloop;
pub mod eventrequest;
pub mod events;
pub mod protocol;
pub mod reader;
pub mod string;
pub mod types;
pub mod vm;
pub mod writer;

pub use connection::{ConnectionConfig, JdwpConnection};
pub use connector::{Connector, SocketAttachConnector, SocketListenConnector};
pub use conversation::{Conversation, ConversationState, ConversationTracker};
pub use eventrequest::SuspendPolicy;
pub use events::{Event, EventKind, EventSet, ThreadLocation};
pub use protocol::{CommandPacket, JdwpError, JdwpResult, Packet, PacketHeader, ReplyPacket};
pub use string::{decode_string, encode_string};
pub use types::{IdSizes, Location};
