// Rendering of recorded conversations and event sets
//
// Text output is one line per record for reading along in a terminal; JSON
// output is one object per line for piping into other tools.

use crate::config::OutputFormat;
use crate::spy::{Origin, Record};
use anyhow::Result;
use jdwp_wire::commands::command_name;
use jdwp_wire::protocol::error_name;
use jdwp_wire::{Conversation, Event, EventKind, EventSet, Location};
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: OutputFormat,
    payload: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum View<'a> {
    Conversation {
        origin: Origin,
        id: u32,
        command: String,
        command_set: Option<u8>,
        command_id: Option<u8>,
        error_code: Option<u16>,
        error: Option<&'static str>,
        command_bytes: usize,
        reply_bytes: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        command_payload: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_payload: Option<String>,
    },
    Events {
        id: u32,
        suspend_policy: u8,
        events: &'a [Event],
    },
}

impl Printer {
    pub fn new(format: OutputFormat, payload: bool) -> Self {
        Self { format, payload }
    }

    pub fn render(&self, record: &Record) -> Result<String> {
        match self.format {
            OutputFormat::Text => Ok(self.text(record)),
            OutputFormat::Json => Ok(serde_json::to_string(&self.view(record))?),
        }
    }

    fn view<'a>(&self, record: &'a Record) -> View<'a> {
        match record {
            Record::Conversation {
                origin,
                conversation,
            } => {
                let cmd = conversation.command();
                let reply = conversation.reply();

                View::Conversation {
                    origin: *origin,
                    id: conversation.id(),
                    command: command_label(conversation),
                    command_set: cmd.map(|c| c.command_set),
                    command_id: cmd.map(|c| c.command),
                    error_code: reply.map(|r| r.error_code),
                    error: reply.map(|r| r.error_message()),
                    command_bytes: cmd.map_or(0, |c| c.data.len()),
                    reply_bytes: reply.map_or(0, |r| r.data.len()),
                    command_payload: cmd.filter(|_| self.payload).map(|c| hex::encode(&c.data)),
                    reply_payload: reply.filter(|_| self.payload).map(|r| hex::encode(&r.data)),
                }
            }
            Record::Events { id, set } => View::Events {
                id: *id,
                suspend_policy: set.suspend_policy,
                events: &set.events,
            },
        }
    }

    fn text(&self, record: &Record) -> String {
        match record {
            Record::Conversation {
                origin,
                conversation,
            } => self.conversation_line(*origin, conversation),
            Record::Events { id, set } => events_line(*id, set),
        }
    }

    fn conversation_line(&self, origin: Origin, conversation: &Conversation) -> String {
        let mut line = format!(
            "[{} #{}] {}",
            origin_label(origin),
            conversation.id(),
            command_label(conversation)
        );

        if let Some(reply) = conversation.reply() {
            if reply.is_error() {
                line.push_str(&format!(
                    " -> error {} {}",
                    reply.error_code,
                    error_name(reply.error_code)
                ));
            } else {
                line.push_str(&format!(" -> ok, {} bytes", reply.data.len()));
            }
        }

        if self.payload {
            if let Some(cmd) = conversation.command() {
                line.push_str(&format!(" cmd=[{}]", hex::encode(&cmd.data)));
            }
            if let Some(reply) = conversation.reply() {
                line.push_str(&format!(" reply=[{}]", hex::encode(&reply.data)));
            }
        }

        line
    }
}

fn origin_label(origin: Origin) -> &'static str {
    match origin {
        Origin::Debugger => "debugger",
        Origin::Vm => "vm",
    }
}

fn command_label(conversation: &Conversation) -> String {
    match conversation.command() {
        Some(cmd) => match command_name(cmd.command_set, cmd.command) {
            Some(name) => name.to_string(),
            None => format!("{}.{}", cmd.command_set, cmd.command),
        },
        None => "?".to_string(),
    }
}

fn events_line(id: u32, set: &EventSet) -> String {
    let events: Vec<String> = set.events.iter().map(event_text).collect();
    format!(
        "[vm #{}] Event.Composite suspend={}: {}",
        id,
        set.suspend_policy,
        events.join("; ")
    )
}

fn event_text(event: &Event) -> String {
    let mut text = format!("{} request={}", event_name(&event.details), event.request_id);

    if let Some(thread) = event.thread() {
        text.push_str(&format!(" thread=0x{:x}", thread));
    }
    if let Some(location) = event.location() {
        text.push_str(&format!(" at {}", location_text(&location)));
    }

    match &event.details {
        EventKind::ClassPrepare { signature, .. } | EventKind::ClassUnload { signature } => {
            text.push_str(&format!(" {}", signature));
        }
        EventKind::MethodExitWithReturnValue { value, .. } => {
            text.push_str(&format!(" returned {}", value.format()));
        }
        EventKind::Exception {
            exception,
            catch_location,
            ..
        } => {
            text.push_str(&format!(" exception=0x{:x}", exception.id));
            match catch_location {
                Some(catch) => text.push_str(&format!(" caught at {}", location_text(catch))),
                None => text.push_str(" uncaught"),
            }
        }
        _ => {}
    }

    text
}

fn location_text(location: &Location) -> String {
    format!(
        "{}:0x{:x}:0x{:x}@{}",
        location.type_tag, location.class_id, location.method_id, location.index
    )
}

fn event_name(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::VMStart { .. } => "VMStart",
        EventKind::VMDeath => "VMDeath",
        EventKind::ThreadStart { .. } => "ThreadStart",
        EventKind::ThreadDeath { .. } => "ThreadDeath",
        EventKind::ClassPrepare { .. } => "ClassPrepare",
        EventKind::ClassUnload { .. } => "ClassUnload",
        EventKind::Breakpoint(_) => "Breakpoint",
        EventKind::Step(_) => "SingleStep",
        EventKind::MethodEntry(_) => "MethodEntry",
        EventKind::MethodExit(_) => "MethodExit",
        EventKind::MethodExitWithReturnValue { .. } => "MethodExitWithReturnValue",
        EventKind::Exception { .. } => "Exception",
        EventKind::FieldAccess { .. } => "FieldAccess",
        EventKind::FieldModification { .. } => "FieldModification",
        EventKind::MonitorContendedEnter { .. } => "MonitorContendedEnter",
        EventKind::MonitorContendedEntered { .. } => "MonitorContendedEntered",
        EventKind::MonitorWait { .. } => "MonitorWait",
        EventKind::MonitorWaited { .. } => "MonitorWaited",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jdwp_wire::commands::{command_sets, event_kinds, vm_commands};
    use jdwp_wire::events::TaggedObject;
    use jdwp_wire::{CommandPacket, ReplyPacket, ThreadLocation};
    use pretty_assertions::assert_eq;

    fn conversation(error_code: u16) -> Record {
        let mut conversation = Conversation::new(12);
        let mut cmd = CommandPacket::new(12, command_sets::VIRTUAL_MACHINE, vm_commands::ID_SIZES);
        cmd.data = vec![0xca, 0xfe];
        conversation.attach_command(cmd).unwrap();
        conversation
            .attach_reply(ReplyPacket::new(12, error_code, vec![0, 1, 2]))
            .unwrap();

        Record::Conversation {
            origin: Origin::Debugger,
            conversation,
        }
    }

    fn entry_at() -> ThreadLocation {
        ThreadLocation {
            thread: 0x42,
            location: Location {
                type_tag: 1,
                class_id: 0x1000,
                method_id: 0x2000,
                index: 3,
            },
        }
    }

    #[test]
    fn text_conversation() {
        let printer = Printer::new(OutputFormat::Text, false);
        assert_eq!(
            printer.render(&conversation(0)).unwrap(),
            "[debugger #12] VirtualMachine.IDSizes -> ok, 3 bytes"
        );
        assert_eq!(
            printer.render(&conversation(112)).unwrap(),
            "[debugger #12] VirtualMachine.IDSizes -> error 112 VM_DEAD"
        );
    }

    #[test]
    fn text_payload_is_hex() {
        let printer = Printer::new(OutputFormat::Text, true);
        assert_eq!(
            printer.render(&conversation(0)).unwrap(),
            "[debugger #12] VirtualMachine.IDSizes -> ok, 3 bytes cmd=[cafe] reply=[000102]"
        );
    }

    #[test]
    fn unknown_command_uses_numbers() {
        let mut conversation = Conversation::new(1);
        conversation
            .attach_command(CommandPacket::new(1, 99, 3))
            .unwrap();
        let record = Record::Conversation {
            origin: Origin::Vm,
            conversation,
        };

        let printer = Printer::new(OutputFormat::Text, false);
        assert_eq!(printer.render(&record).unwrap(), "[vm #1] 99.3");
    }

    #[test]
    fn text_events() {
        let set = EventSet {
            suspend_policy: 1,
            events: vec![
                Event {
                    kind: event_kinds::METHOD_ENTRY,
                    request_id: 7,
                    details: EventKind::MethodEntry(entry_at()),
                },
                Event {
                    kind: event_kinds::EXCEPTION,
                    request_id: 8,
                    details: EventKind::Exception {
                        at: entry_at(),
                        exception: TaggedObject { tag: b'L', id: 0x77 },
                        catch_location: None,
                    },
                },
            ],
        };

        let printer = Printer::new(OutputFormat::Text, false);
        assert_eq!(
            printer.render(&Record::Events { id: 3, set }).unwrap(),
            "[vm #3] Event.Composite suspend=1: \
             MethodEntry request=7 thread=0x42 at 1:0x1000:0x2000@3; \
             Exception request=8 thread=0x42 at 1:0x1000:0x2000@3 exception=0x77 uncaught"
        );
    }

    #[test]
    fn json_conversation() {
        let printer = Printer::new(OutputFormat::Json, false);
        let line = printer.render(&conversation(0)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["record"], "conversation");
        assert_eq!(value["origin"], "debugger");
        assert_eq!(value["id"], 12);
        assert_eq!(value["command"], "VirtualMachine.IDSizes");
        assert_eq!(value["error"], "NONE");
        assert_eq!(value["reply_bytes"], 3);
        assert!(value.get("command_payload").is_none());

        let printer = Printer::new(OutputFormat::Json, true);
        let line = printer.render(&conversation(0)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["command_payload"], "cafe");
        assert_eq!(value["reply_payload"], "000102");
    }

    #[test]
    fn json_events_keep_event_shape() {
        let set = EventSet {
            suspend_policy: 0,
            events: vec![Event {
                kind: event_kinds::METHOD_ENTRY,
                request_id: 7,
                details: EventKind::MethodEntry(entry_at()),
            }],
        };

        let printer = Printer::new(OutputFormat::Json, false);
        let line = printer.render(&Record::Events { id: 5, set }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["record"], "events");
        assert_eq!(value["events"][0]["request_id"], 7);
        assert_eq!(value["events"][0]["details"]["type"], "MethodEntry");
        assert_eq!(value["events"][0]["details"]["thread"], 0x42);
    }
}
