// EventRequest command implementations
//
// Set up event requests (method entry, breakpoints) and clear them again

use crate::commands::{command_sets, event_commands, event_kinds, modifier_kinds};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpResult};
use crate::reader::read_i32;
use crate::string::put_string;
use crate::types::{IdSizes, Location};
use crate::writer::put_location;
use bytes::BufMut;

/// Suspend policy for events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SuspendPolicy {
    None = 0,
    EventThread = 1,
    All = 2,
}

/// Build the EventRequest.Set body for method entry events, optionally
/// limited to classes matching `class_pattern` (e.g. `com.example.*`)
pub fn method_entry_request(
    class_pattern: Option<&str>,
    suspend_policy: SuspendPolicy,
) -> JdwpResult<Vec<u8>> {
    let mut data = Vec::new();

    data.put_u8(event_kinds::METHOD_ENTRY);
    data.put_u8(suspend_policy as u8);

    match class_pattern {
        Some(pattern) => {
            data.put_i32(1);
            data.put_u8(modifier_kinds::CLASS_MATCH);
            put_string(&mut data, pattern)?;
        }
        None => data.put_i32(0),
    }

    Ok(data)
}

/// Build the EventRequest.Set body for a breakpoint at `location`
pub fn breakpoint_request(
    location: &Location,
    suspend_policy: SuspendPolicy,
    sizes: &IdSizes,
) -> Vec<u8> {
    let mut data = Vec::new();

    data.put_u8(event_kinds::BREAKPOINT);
    data.put_u8(suspend_policy as u8);

    // Number of modifiers (1 - location only)
    data.put_i32(1);
    data.put_u8(modifier_kinds::LOCATION_ONLY);
    put_location(&mut data, location, sizes);

    data
}

impl JdwpConnection {
    /// Request method entry events (EventRequest.Set command)
    /// Returns the request ID the VM will tag matching events with
    pub async fn request_method_entry(
        &mut self,
        class_pattern: Option<&str>,
        suspend_policy: SuspendPolicy,
    ) -> JdwpResult<i32> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(id, command_sets::EVENT_REQUEST, event_commands::SET);
        packet.data = method_entry_request(class_pattern, suspend_policy)?;

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        read_i32(&mut data)
    }

    /// Set a breakpoint at a specific location (EventRequest.Set command)
    /// Returns the request ID for this breakpoint
    pub async fn set_breakpoint(
        &mut self,
        location: &Location,
        suspend_policy: SuspendPolicy,
    ) -> JdwpResult<i32> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(id, command_sets::EVENT_REQUEST, event_commands::SET);
        packet.data = breakpoint_request(location, suspend_policy, &self.id_sizes());

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        let mut data = reply.data();
        read_i32(&mut data)
    }

    /// Clear an event request by kind and request ID (EventRequest.Clear command)
    pub async fn clear_event_request(&mut self, event_kind: u8, request_id: i32) -> JdwpResult<()> {
        let id = self.next_id();
        let mut packet = CommandPacket::new(id, command_sets::EVENT_REQUEST, event_commands::CLEAR);

        packet.data.put_u8(event_kind);
        packet.data.put_i32(request_id);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        Ok(())
    }
}
