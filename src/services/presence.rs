//! Presence service — who is connected to the canvas right now.
//!
//! DESIGN
//! ======
//! Participants are keyed by connection id only. Two connections may share
//! a display name or color. An entry lives exactly as long as its
//! connection: the websocket layer turns every disconnect, clean or not,
//! into a `leave`.
//!
//! Listings come back in join order so every client renders the same roster;
//! a rejoin keeps the original position.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A connected participant as shown in `update_users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Connection id of the participant.
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    participant: Participant,
}

/// Registry of joined participants.
#[derive(Debug, Default)]
pub struct Presence {
    entries: HashMap<Uuid, Entry>,
    next_seq: u64,
}

impl Presence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the participant for `connection_id`.
    /// Returns the full participant list.
    pub fn join(&mut self, connection_id: Uuid, name: &str, color: &str) -> Vec<Participant> {
        let participant = Participant { id: connection_id, name: name.to_owned(), color: color.to_owned() };
        if let Some(entry) = self.entries.get_mut(&connection_id) {
            entry.participant = participant;
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.insert(connection_id, Entry { seq, participant });
        }
        self.list()
    }

    /// Remove the participant if present. Unknown ids are ignored.
    /// Returns the full participant list.
    pub fn leave(&mut self, connection_id: Uuid) -> Vec<Participant> {
        self.entries.remove(&connection_id);
        self.list()
    }

    /// Current participants in join order.
    #[must_use]
    pub fn list(&self) -> Vec<Participant> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.participant.clone()).collect()
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
