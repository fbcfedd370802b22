// Command/reply correlation
//
// A conversation is one command and its reply, keyed by the packet id the
// sender chose. The tracker never invents ids and never times anything out;
// callers decide when to give up and discard.

use crate::protocol::{CommandPacket, JdwpError, JdwpResult, ReplyPacket};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Nothing attached yet
    Open,
    /// Command sent, waiting for the reply
    Pending,
    /// Command and reply both attached
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    id: u32,
    command: Option<CommandPacket>,
    reply: Option<ReplyPacket>,
}

impl Conversation {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            command: None,
            reply: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn attach_command(&mut self, command: CommandPacket) -> JdwpResult<()> {
        if self.command.is_some() {
            return Err(JdwpError::DuplicateCommand(self.id));
        }
        self.command = Some(command);
        Ok(())
    }

    pub fn attach_reply(&mut self, reply: ReplyPacket) -> JdwpResult<()> {
        if self.reply.is_some() {
            return Err(JdwpError::DuplicateReply(self.id));
        }
        self.reply = Some(reply);
        Ok(())
    }

    pub fn command(&self) -> Option<&CommandPacket> {
        self.command.as_ref()
    }

    pub fn reply(&self) -> Option<&ReplyPacket> {
        self.reply.as_ref()
    }

    pub fn state(&self) -> ConversationState {
        match (&self.command, &self.reply) {
            (Some(_), Some(_)) => ConversationState::Completed,
            (Some(_), None) => ConversationState::Pending,
            (None, _) => ConversationState::Open,
        }
    }

    /// Split a conversation back into its packets
    pub fn into_parts(self) -> (Option<CommandPacket>, Option<ReplyPacket>) {
        (self.command, self.reply)
    }
}

/// How many finished or discarded ids are remembered, per kind
const RECENT_IDS: usize = 256;

/// The set of conversations currently in flight on one connection.
///
/// Safe to share between the reader loop and any number of tasks waiting on
/// replies; each operation takes the map lock once.
///
/// Recently completed and discarded ids are remembered so a reply for them
/// can be told apart from one nobody asked for.
#[derive(Debug, Default)]
pub struct ConversationTracker {
    inner: Mutex<Tracked>,
}

#[derive(Debug, Default)]
struct Tracked {
    open: HashMap<u32, Conversation>,
    completed: VecDeque<u32>,
    discarded: VecDeque<u32>,
}

fn remember(ids: &mut VecDeque<u32>, id: u32) {
    if ids.len() == RECENT_IDS {
        ids.pop_front();
    }
    ids.push_back(id);
}

fn forget(ids: &mut VecDeque<u32>, id: u32) -> bool {
    match ids.iter().position(|&known| known == id) {
        Some(pos) => {
            ids.remove(pos);
            true
        }
        None => false,
    }
}

impl ConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tracked> {
        // Nothing in here a panicking holder could leave half updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking an empty conversation. Returns false if `id` is
    /// already tracked.
    pub fn open(&self, id: u32) -> bool {
        let mut tracked = self.lock();
        if tracked.open.contains_key(&id) {
            return false;
        }
        tracked.open.insert(id, Conversation::new(id));
        true
    }

    /// Attach an outgoing command, opening its conversation if needed.
    /// An id seen before (wrapped around) starts afresh.
    pub fn record_command(&self, command: CommandPacket) -> JdwpResult<()> {
        let mut tracked = self.lock();
        let id = command.id;

        if !tracked.open.contains_key(&id) {
            forget(&mut tracked.completed, id);
            forget(&mut tracked.discarded, id);
        }

        tracked
            .open
            .entry(id)
            .or_insert_with(|| Conversation::new(id))
            .attach_command(command)
    }

    /// Attach a reply and hand back the finished conversation.
    ///
    /// A reply for an id that was discarded after a deadline is dropped
    /// and yields `Ok(None)`. A second reply for a finished id is
    /// `DuplicateReply`; a reply for an id that has no command yet, or was
    /// never seen, is a protocol error.
    pub fn record_reply(&self, reply: ReplyPacket) -> JdwpResult<Option<Conversation>> {
        let mut tracked = self.lock();
        let id = reply.id;

        if let Some(conversation) = tracked.open.get_mut(&id) {
            if conversation.state() == ConversationState::Open {
                return Err(JdwpError::Protocol(format!(
                    "Reply for conversation id={} arrived before its command",
                    id
                )));
            }

            conversation.attach_reply(reply)?;
            remember(&mut tracked.completed, id);
            return Ok(tracked.open.remove(&id));
        }

        if forget(&mut tracked.discarded, id) {
            debug!("Dropping late reply for discarded conversation id={}", id);
            remember(&mut tracked.completed, id);
            return Ok(None);
        }

        if tracked.completed.contains(&id) {
            return Err(JdwpError::DuplicateReply(id));
        }

        Err(JdwpError::Protocol(format!(
            "Reply for unknown conversation id={}",
            id
        )))
    }

    /// Stop tracking `id`; a reply arriving later is dropped
    pub fn discard(&self, id: u32) -> Option<Conversation> {
        let mut tracked = self.lock();
        let conversation = tracked.open.remove(&id)?;
        remember(&mut tracked.discarded, id);
        Some(conversation)
    }

    /// Snapshot of a tracked conversation
    pub fn get(&self, id: u32) -> Option<Conversation> {
        self.lock().open.get(&id).cloned()
    }

    /// Ids of conversations still waiting for a reply, ascending
    pub fn pending_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .lock()
            .open
            .values()
            .filter(|c| c.state() == ConversationState::Pending)
            .map(Conversation::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().open.is_empty()
    }
}
