// JDWP protocol definitions and packet handling
//
// Reference: https://docs.oracle.com/javase/8/docs/platform/jpda/jdwp/jdwp-protocol.html

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use thiserror::Error;

// JDWP uses big-endian (network byte order) for all multi-byte values
// This is architecture-independent (works on Intel, ARM M1/M2/M3, etc.)

pub type JdwpResult<T> = Result<T, JdwpError>;

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed string encoding: {0}")]
    MalformedEncoding(String),

    #[error("Truncated packet: needed {needed} bytes, {available} available")]
    TruncatedPacket { needed: usize, available: usize },

    #[error("Conversation {0} already has a command")]
    DuplicateCommand(u32),

    #[error("Conversation {0} already has a reply")]
    DuplicateReply(u32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid handshake")]
    InvalidHandshake,

    #[error("JDWP error code {0}: {1}")]
    JdwpErrorCode(u16, String),

    #[error("Timed out waiting for reply to command id={0}")]
    Timeout(u32),

    #[error("Connection closed")]
    ConnectionClosed,
}

// JDWP handshake string
pub const JDWP_HANDSHAKE: &[u8] = b"JDWP-Handshake";

// Packet structure:
// length (4 bytes) - includes header
// id (4 bytes)
// flags (1 byte) - 0x00 = command, 0x80 = reply
// [Command packet: command set (1 byte) + command (1 byte)]
// [Reply packet: error code (2 bytes)]
// data (variable)

pub const HEADER_SIZE: usize = 11;
pub const REPLY_FLAG: u8 = 0x80;

/// The fixed 11-byte header shared by commands and replies.
///
/// The last two bytes are either `command_set, command` or a big-endian
/// error code depending on [`PacketHeader::is_reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub length: u32,
    pub id: u32,
    pub flags: u8,
    pub tail: [u8; 2],
}

impl PacketHeader {
    /// Parse the header at the start of `buf` without consuming the payload.
    pub fn decode(mut buf: &[u8]) -> JdwpResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(JdwpError::TruncatedPacket {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }

        let length = buf.get_u32();
        let id = buf.get_u32();
        let flags = buf.get_u8();
        let tail = [buf.get_u8(), buf.get_u8()];

        if (length as usize) < HEADER_SIZE {
            return Err(JdwpError::TruncatedPacket {
                needed: HEADER_SIZE,
                available: length as usize,
            });
        }

        Ok(Self {
            length,
            id,
            flags,
            tail,
        })
    }

    pub fn is_reply(&self) -> bool {
        self.flags & REPLY_FLAG != 0
    }

    pub fn payload_len(&self) -> usize {
        self.length as usize - HEADER_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandPacket {
    pub id: u32,
    pub command_set: u8,
    pub command: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyPacket {
    pub id: u32,
    pub error_code: u16,
    pub data: Vec<u8>,
}

/// Either half of a conversation, as framed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    Command(CommandPacket),
    Reply(ReplyPacket),
}

impl CommandPacket {
    pub fn new(id: u32, command_set: u8, command: u8) -> Self {
        Self {
            id,
            command_set,
            command,
            data: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let length = HEADER_SIZE + self.data.len();
        let mut buf = BytesMut::with_capacity(length);

        buf.put_u32(length as u32);
        buf.put_u32(self.id);
        buf.put_u8(0x00); // command flag
        buf.put_u8(self.command_set);
        buf.put_u8(self.command);
        buf.put_slice(&self.data);

        buf.to_vec()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl ReplyPacket {
    pub fn new(id: u32, error_code: u16, data: Vec<u8>) -> Self {
        Self {
            id,
            error_code,
            data,
        }
    }

    pub fn decode(buf: &[u8]) -> JdwpResult<Self> {
        match Packet::decode(buf)? {
            Packet::Reply(reply) => Ok(reply),
            Packet::Command(cmd) => Err(JdwpError::Protocol(format!(
                "Expected reply, got command {}.{} id={}",
                cmd.command_set, cmd.command, cmd.id
            ))),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let length = HEADER_SIZE + self.data.len();
        let mut buf = BytesMut::with_capacity(length);

        buf.put_u32(length as u32);
        buf.put_u32(self.id);
        buf.put_u8(REPLY_FLAG);
        buf.put_u16(self.error_code);
        buf.put_slice(&self.data);

        buf.to_vec()
    }

    pub fn is_error(&self) -> bool {
        self.error_code != 0
    }

    pub fn check_error(&self) -> JdwpResult<()> {
        if self.is_error() {
            Err(JdwpError::JdwpErrorCode(
                self.error_code,
                self.error_message().to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn error_message(&self) -> &'static str {
        error_name(self.error_code)
    }
}

impl Packet {
    /// Decode one complete packet. `buf` must hold at least the declared
    /// length; bytes past it are ignored.
    pub fn decode(buf: &[u8]) -> JdwpResult<Self> {
        let header = PacketHeader::decode(buf)?;
        let end = header.length as usize;

        if buf.len() < end {
            return Err(JdwpError::TruncatedPacket {
                needed: end,
                available: buf.len(),
            });
        }

        let data = buf[HEADER_SIZE..end].to_vec();

        Ok(if header.is_reply() {
            Packet::Reply(ReplyPacket {
                id: header.id,
                error_code: u16::from_be_bytes(header.tail),
                data,
            })
        } else {
            Packet::Command(CommandPacket {
                id: header.id,
                command_set: header.tail[0],
                command: header.tail[1],
                data,
            })
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Command(cmd) => cmd.encode(),
            Packet::Reply(reply) => reply.encode(),
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Packet::Command(cmd) => cmd.id,
            Packet::Reply(reply) => reply.id,
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Packet::Command(cmd) => &cmd.data,
            Packet::Reply(reply) => &reply.data,
        }
    }
}

/// Symbolic name of a JDWP error code.
pub fn error_name(error_code: u16) -> &'static str {
    match error_code {
        0 => "NONE",
        10 => "INVALID_THREAD",
        11 => "INVALID_THREAD_GROUP",
        12 => "INVALID_PRIORITY",
        13 => "THREAD_NOT_SUSPENDED",
        14 => "THREAD_SUSPENDED",
        15 => "THREAD_NOT_ALIVE",
        20 => "INVALID_OBJECT",
        21 => "INVALID_CLASS",
        22 => "CLASS_NOT_PREPARED",
        23 => "INVALID_METHODID",
        24 => "INVALID_LOCATION",
        25 => "INVALID_FIELDID",
        30 => "INVALID_FRAMEID",
        31 => "NO_MORE_FRAMES",
        32 => "OPAQUE_FRAME",
        33 => "NOT_CURRENT_FRAME",
        34 => "TYPE_MISMATCH",
        35 => "INVALID_SLOT",
        40 => "DUPLICATE",
        41 => "NOT_FOUND",
        42 => "INVALID_MODULE",
        50 => "INVALID_MONITOR",
        51 => "NOT_MONITOR_OWNER",
        52 => "INTERRUPT",
        60 => "INVALID_CLASS_FORMAT",
        61 => "CIRCULAR_CLASS_DEFINITION",
        62 => "FAILS_VERIFICATION",
        63 => "ADD_METHOD_NOT_IMPLEMENTED",
        64 => "SCHEMA_CHANGE_NOT_IMPLEMENTED",
        65 => "INVALID_TYPESTATE",
        66 => "HIERARCHY_CHANGE_NOT_IMPLEMENTED",
        67 => "DELETE_METHOD_NOT_IMPLEMENTED",
        68 => "UNSUPPORTED_VERSION",
        69 => "NAMES_DONT_MATCH",
        70 => "CLASS_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
        71 => "METHOD_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
        72 => "CLASS_ATTRIBUTE_CHANGE_NOT_IMPLEMENTED",
        99 => "NOT_IMPLEMENTED",
        100 => "NULL_POINTER",
        101 => "ABSENT_INFORMATION",
        102 => "INVALID_EVENT_TYPE",
        103 => "ILLEGAL_ARGUMENT",
        110 => "OUT_OF_MEMORY",
        111 => "ACCESS_DENIED",
        112 => "VM_DEAD",
        113 => "INTERNAL",
        115 => "UNATTACHED_THREAD",
        500 => "INVALID_TAG",
        502 => "ALREADY_INVOKING",
        503 => "INVALID_INDEX",
        504 => "INVALID_LENGTH",
        506 => "INVALID_STRING",
        507 => "INVALID_CLASS_LOADER",
        508 => "INVALID_ARRAY",
        509 => "TRANSPORT_LOAD",
        510 => "TRANSPORT_INIT",
        511 => "NATIVE_METHOD",
        512 => "INVALID_COUNT",
        _ => "UNKNOWN_ERROR",
    }
}
