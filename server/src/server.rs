use tokio::sync::mpsc::{channel, Sender};

use crate::connection::{ConnectionCommand, ConnectionEvent};
use crate::connection_tx_storage::ConnectionTxStorage;
use crate::room_registry::RoomRegistry;

pub type ServerTx = Sender<ConnectionCommand>;

struct Server {
    rooms: RoomRegistry,
    connections: ConnectionTxStorage,
}

impl Server {
    fn new() -> Self {
        Self {
            rooms: RoomRegistry::new(),
            connections: ConnectionTxStorage::new(),
        }
    }

    async fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { tx, room } => {
                let connection_id = self.rooms.join(room);
                self.connections.insert(connection_id, tx);
                self.connections
                    .send(&connection_id, ConnectionEvent::Connected { connection_id })
                    .await;
            }
            ConnectionCommand::Disconnect { from } => {
                self.rooms.leave(&from);
                self.connections.remove(&from);
            }
            ConnectionCommand::Broadcast { from, message } => {
                let room = match self.rooms.room_of(&from) {
                    Some(room) => room.clone(),
                    None => {
                        log::warn!("message from unregistered connection {}", from);
                        return;
                    }
                };
                // Pure fan-out: unmodified, un-parsed, never back to the
                // sender. A dead recipient is skipped, not fatal.
                for to in self.rooms.recipients(&room, &from) {
                    self.connections
                        .send(&to, ConnectionEvent::Deliver(message.clone()))
                        .await;
                }
            }
        }
    }
}

pub fn spawn_server() -> ServerTx {
    let (srv_tx, mut srv_rx) = channel::<ConnectionCommand>(16);

    tokio::spawn(async move {
        let mut server = Box::new(Server::new());

        while let Some(command) = srv_rx.recv().await {
            server.handle_connection_command(command).await;
        }
    });

    return srv_tx;
}
