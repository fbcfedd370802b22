// JDWP event handling
//
// Events are sent from the JVM as Event.Composite command packets. Each
// record starts with its kind byte and the id of the request that asked for
// it; everything after that depends on the kind.

use crate::commands::{command_sets, event_kinds, event_set_commands};
use crate::protocol::{CommandPacket, JdwpError, JdwpResult};
use crate::reader::{
    read_i32, read_location, read_object_id, read_reference_type_id, read_string,
    read_tagged_value, read_u64, read_u8,
};
use crate::types::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Composite event packet (can contain multiple events)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSet {
    pub suspend_policy: u8,
    pub events: Vec<Event>,
}

/// Single event within an event set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: u8,
    pub request_id: i32,
    pub details: EventKind,
}

/// The thread and location pair shared by every locatable event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadLocation {
    pub thread: ThreadId,
    pub location: Location,
}

/// An object id preceded by its type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedObject {
    pub tag: u8,
    pub id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    VMStart {
        thread: ThreadId,
    },
    VMDeath,
    ThreadStart {
        thread: ThreadId,
    },
    ThreadDeath {
        thread: ThreadId,
    },
    ClassPrepare {
        thread: ThreadId,
        ref_type_tag: u8,
        ref_type: ReferenceTypeId,
        signature: String,
        status: i32,
    },
    ClassUnload {
        signature: String,
    },
    Breakpoint(ThreadLocation),
    Step(ThreadLocation),
    MethodEntry(ThreadLocation),
    MethodExit(ThreadLocation),
    MethodExitWithReturnValue {
        at: ThreadLocation,
        value: Value,
    },
    Exception {
        at: ThreadLocation,
        exception: TaggedObject,
        catch_location: Option<Location>,
    },
    FieldAccess {
        at: ThreadLocation,
        ref_type_tag: u8,
        ref_type: ReferenceTypeId,
        field: FieldId,
        object: TaggedObject,
    },
    FieldModification {
        at: ThreadLocation,
        ref_type_tag: u8,
        ref_type: ReferenceTypeId,
        field: FieldId,
        object: TaggedObject,
        value_to_be: Value,
    },
    MonitorContendedEnter {
        thread: ThreadId,
        object: TaggedObject,
        location: Location,
    },
    MonitorContendedEntered {
        thread: ThreadId,
        object: TaggedObject,
        location: Location,
    },
    MonitorWait {
        thread: ThreadId,
        object: TaggedObject,
        location: Location,
        timeout: i64,
    },
    MonitorWaited {
        thread: ThreadId,
        object: TaggedObject,
        location: Location,
        timed_out: bool,
    },
}

/// Read the thread id and location that open every locatable event
pub fn read_thread_and_location(buf: &mut &[u8], sizes: &IdSizes) -> JdwpResult<ThreadLocation> {
    let thread = read_object_id(buf, sizes)?;
    let location = read_location(buf, sizes)?;
    Ok(ThreadLocation { thread, location })
}

fn read_tagged_object(buf: &mut &[u8], sizes: &IdSizes) -> JdwpResult<TaggedObject> {
    let tag = read_u8(buf)?;
    let id = read_object_id(buf, sizes)?;
    Ok(TaggedObject { tag, id })
}

impl Event {
    /// Decode the body of one event record whose kind and request id were
    /// already read by the caller.
    pub fn read(kind: u8, request_id: i32, buf: &mut &[u8], sizes: &IdSizes) -> JdwpResult<Self> {
        let details = match kind {
            event_kinds::BREAKPOINT => EventKind::Breakpoint(read_thread_and_location(buf, sizes)?),
            event_kinds::SINGLE_STEP => EventKind::Step(read_thread_and_location(buf, sizes)?),
            event_kinds::METHOD_ENTRY => {
                EventKind::MethodEntry(read_thread_and_location(buf, sizes)?)
            }
            event_kinds::METHOD_EXIT => EventKind::MethodExit(read_thread_and_location(buf, sizes)?),
            event_kinds::METHOD_EXIT_WITH_RETURN_VALUE => {
                let at = read_thread_and_location(buf, sizes)?;
                let value = read_tagged_value(buf, sizes)?;
                EventKind::MethodExitWithReturnValue { at, value }
            }
            event_kinds::EXCEPTION => {
                let at = read_thread_and_location(buf, sizes)?;
                let exception = read_tagged_object(buf, sizes)?;
                let catch = read_location(buf, sizes)?;
                // An uncaught exception reports an all-zero catch location
                let catch_location = (catch.class_id != 0).then_some(catch);
                EventKind::Exception {
                    at,
                    exception,
                    catch_location,
                }
            }
            event_kinds::FIELD_ACCESS | event_kinds::FIELD_MODIFICATION => {
                let at = read_thread_and_location(buf, sizes)?;
                let ref_type_tag = read_u8(buf)?;
                let ref_type = read_reference_type_id(buf, sizes)?;
                let field = crate::reader::read_id(buf, sizes.field_id_size)?;
                let object = read_tagged_object(buf, sizes)?;

                if kind == event_kinds::FIELD_ACCESS {
                    EventKind::FieldAccess {
                        at,
                        ref_type_tag,
                        ref_type,
                        field,
                        object,
                    }
                } else {
                    let value_to_be = read_tagged_value(buf, sizes)?;
                    EventKind::FieldModification {
                        at,
                        ref_type_tag,
                        ref_type,
                        field,
                        object,
                        value_to_be,
                    }
                }
            }
            event_kinds::MONITOR_CONTENDED_ENTER
            | event_kinds::MONITOR_CONTENDED_ENTERED
            | event_kinds::MONITOR_WAIT
            | event_kinds::MONITOR_WAITED => {
                let thread = read_object_id(buf, sizes)?;
                let object = read_tagged_object(buf, sizes)?;
                let location = read_location(buf, sizes)?;

                match kind {
                    event_kinds::MONITOR_CONTENDED_ENTER => EventKind::MonitorContendedEnter {
                        thread,
                        object,
                        location,
                    },
                    event_kinds::MONITOR_CONTENDED_ENTERED => EventKind::MonitorContendedEntered {
                        thread,
                        object,
                        location,
                    },
                    event_kinds::MONITOR_WAIT => EventKind::MonitorWait {
                        thread,
                        object,
                        location,
                        timeout: read_u64(buf)? as i64,
                    },
                    _ => EventKind::MonitorWaited {
                        thread,
                        object,
                        location,
                        timed_out: read_u8(buf)? != 0,
                    },
                }
            }
            event_kinds::VM_START => EventKind::VMStart {
                thread: read_object_id(buf, sizes)?,
            },
            event_kinds::VM_DEATH => EventKind::VMDeath,
            event_kinds::THREAD_START => EventKind::ThreadStart {
                thread: read_object_id(buf, sizes)?,
            },
            event_kinds::THREAD_DEATH => EventKind::ThreadDeath {
                thread: read_object_id(buf, sizes)?,
            },
            event_kinds::CLASS_PREPARE => {
                let thread = read_object_id(buf, sizes)?;
                let ref_type_tag = read_u8(buf)?;
                let ref_type = read_reference_type_id(buf, sizes)?;
                let signature = read_string(buf)?;
                let status = read_i32(buf)?;
                EventKind::ClassPrepare {
                    thread,
                    ref_type_tag,
                    ref_type,
                    signature,
                    status,
                }
            }
            event_kinds::CLASS_UNLOAD => EventKind::ClassUnload {
                signature: read_string(buf)?,
            },
            _ => {
                // The record length is implied by the kind, so nothing after
                // an unknown kind can be located.
                warn!("Unsupported event kind: {}", kind);
                return Err(JdwpError::Protocol(format!(
                    "Unsupported event kind {} (request id {})",
                    kind, request_id
                )));
            }
        };

        Ok(Self {
            kind,
            request_id,
            details,
        })
    }

    /// Thread the event happened on, if the kind carries one
    pub fn thread(&self) -> Option<ThreadId> {
        match &self.details {
            EventKind::VMStart { thread }
            | EventKind::ThreadStart { thread }
            | EventKind::ThreadDeath { thread }
            | EventKind::ClassPrepare { thread, .. }
            | EventKind::MonitorContendedEnter { thread, .. }
            | EventKind::MonitorContendedEntered { thread, .. }
            | EventKind::MonitorWait { thread, .. }
            | EventKind::MonitorWaited { thread, .. } => Some(*thread),
            _ => self.thread_location().map(|at| at.thread),
        }
    }

    /// Code position of the event, if the kind carries one
    pub fn location(&self) -> Option<Location> {
        match &self.details {
            EventKind::MonitorContendedEnter { location, .. }
            | EventKind::MonitorContendedEntered { location, .. }
            | EventKind::MonitorWait { location, .. }
            | EventKind::MonitorWaited { location, .. } => Some(*location),
            _ => self.thread_location().map(|at| at.location),
        }
    }

    fn thread_location(&self) -> Option<ThreadLocation> {
        match &self.details {
            EventKind::Breakpoint(at)
            | EventKind::Step(at)
            | EventKind::MethodEntry(at)
            | EventKind::MethodExit(at)
            | EventKind::MethodExitWithReturnValue { at, .. }
            | EventKind::Exception { at, .. }
            | EventKind::FieldAccess { at, .. }
            | EventKind::FieldModification { at, .. } => Some(*at),
            _ => None,
        }
    }
}

/// Parse an event packet payload from JDWP
pub fn parse_event_packet(data: &[u8], sizes: &IdSizes) -> JdwpResult<EventSet> {
    let mut buf = data;

    // Read suspend policy
    let suspend_policy = read_u8(&mut buf)?;

    // Read number of events
    let event_count = read_i32(&mut buf)?;
    if event_count < 0 {
        return Err(JdwpError::Protocol(format!(
            "Negative event count: {}",
            event_count
        )));
    }

    // Every record is at least kind + request id, so cap the reservation
    let mut events = Vec::with_capacity((event_count as usize).min(buf.len() / 5));

    for _ in 0..event_count {
        let kind = read_u8(&mut buf)?;
        let request_id = read_i32(&mut buf)?;
        events.push(Event::read(kind, request_id, &mut buf, sizes)?);
    }

    Ok(EventSet {
        suspend_policy,
        events,
    })
}

impl EventSet {
    /// True for the command packet the VM uses to deliver event sets
    pub fn is_event_packet(packet: &CommandPacket) -> bool {
        packet.command_set == command_sets::EVENT && packet.command == event_set_commands::COMPOSITE
    }

    pub fn decode(packet: &CommandPacket, sizes: &IdSizes) -> JdwpResult<Self> {
        if !Self::is_event_packet(packet) {
            return Err(JdwpError::Protocol(format!(
                "Not an event packet: command {}.{}",
                packet.command_set, packet.command
            )));
        }
        parse_event_packet(packet.data(), sizes)
    }
}
