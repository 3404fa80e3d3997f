use std::collections::HashMap;
use std::num::Wrapping;

use protocol::{ConnectionId, RoomId};

/// Room name -> member set, plus the reverse map. Rooms are ephemeral:
/// created on first join, dropped when the last member leaves. Only ever
/// touched from the server task, so no locking.
pub struct RoomRegistry {
    connection_id_source: Wrapping<ConnectionId>,
    connection_rooms: HashMap<ConnectionId, RoomId>,
    rooms: HashMap<RoomId, Vec<ConnectionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            connection_id_source: Wrapping(0),
            connection_rooms: HashMap::new(),
            rooms: HashMap::new(),
        }
    }

    pub fn join(&mut self, room: RoomId) -> ConnectionId {
        let connection_id = self.new_connection_id();
        if !self.rooms.contains_key(&room) {
            log::info!("new room {}", room);
        }
        self.rooms
            .entry(room.clone())
            .or_insert_with(Vec::new)
            .push(connection_id);
        log::info!("connection {} joined room {}", connection_id, room);
        self.connection_rooms.insert(connection_id, room);
        connection_id
    }

    pub fn leave(&mut self, connection_id: &ConnectionId) -> Option<RoomId> {
        let room = self.connection_rooms.remove(connection_id)?;
        if let Some(members) = self.rooms.get_mut(&room) {
            members.retain(|member| member != connection_id);
            if members.is_empty() {
                self.rooms.remove(&room);
                log::info!("room {} is empty, removing", room);
            }
        }
        Some(room)
    }

    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<&RoomId> {
        self.connection_rooms.get(connection_id)
    }

    /// Every current member of `room` except the sender.
    pub fn recipients(&self, room: &RoomId, sender: &ConnectionId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter(|member| *member != sender)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn new_connection_id(&mut self) -> ConnectionId {
        self.connection_id_source += Wrapping(1);
        self.connection_id_source.0
    }
}
