//! Named publish/subscribe rooms for live attendance feeds.
//!
//! Each faculty member owns one room named by their reg_id. Attendance marks
//! are published there and every socket joined to the room receives them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Events buffered per room before slow receivers start lagging.
const ROOM_CAPACITY: usize = 64;

/// Wire envelope shared by the socket protocol and room broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WsEvent {
    pub fn new(event: impl Into<String>, data: impl Serialize) -> Self {
        Self {
            event: event.into(),
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }
}

#[derive(Default)]
pub struct RoomHub {
    rooms: Mutex<HashMap<String, broadcast::Sender<WsEvent>>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a room, creating it on first use.
    pub fn join(&self, room: &str) -> broadcast::Receiver<WsEvent> {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Send an event to everyone in the room; returns how many received it.
    ///
    /// A room nobody listens to is dropped and the event goes nowhere.
    pub fn publish(&self, room: &str, event: WsEvent) -> usize {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = rooms.get(room) else {
            return 0;
        };
        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                rooms.remove(room);
                tracing::debug!(room, "pruned empty room");
                0
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
