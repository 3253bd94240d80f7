//! Process-wide registry of live connections and rooms.
//!
//! Lock order is room directory -> room -> client set. The client set is a
//! leaf: nothing else is acquired while it is held, and every enqueue under
//! it is a non-blocking `try_send`.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use quizhub_core::code::{generate_admin_secret, generate_unique_room_code};
use quizhub_core::room::Room;
use quizhub_core::time::Timestamp;

pub type ClientId = Uuid;

/// Per-connection outbound queue. Bounded; a full queue evicts the client.
/// `Bytes` keeps fan-out of one encoded frame zero-copy.
pub type ClientSender = mpsc::Sender<Bytes>;

pub type SharedRoom = Arc<RwLock<Room>>;

type ClientMap = Arc<RwLock<HashMap<ClientId, ClientEntry>>>;

/// Connection role. Only `Admin` may create teams, only `Host` may change
/// the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Host,
    Viewer,
}

impl Role {
    /// Role requested on the upgrade query string. Admin is only granted by
    /// `create_room` or `admin_auth`, so asking for it yields a viewer.
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw {
            Some("host") => Self::Host,
            _ => Self::Viewer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Host => "host",
            Self::Viewer => "viewer",
        }
    }
}

/// Registry record for one live connection. Dropping it closes the
/// connection's outbound queue.
pub struct ClientEntry {
    sender: ClientSender,
    room_code: String,
    role: Role,
}

impl ClientEntry {
    pub fn new(sender: ClientSender, room_code: String, role: Role) -> Self {
        Self {
            sender,
            room_code,
            role,
        }
    }
}

enum HubCommand {
    Register {
        id: ClientId,
        entry: ClientEntry,
        ack: oneshot::Sender<()>,
    },
    Unregister(ClientId),
}

pub struct Hub {
    clients: ClientMap,
    rooms: RwLock<HashMap<String, SharedRoom>>,
    intake: mpsc::UnboundedSender<HubCommand>,
}

impl Hub {
    /// Create the hub and spawn its intake loop. The loop exits when
    /// `cancel` fires.
    pub fn start(cancel: CancellationToken) -> Arc<Self> {
        let (intake, rx) = mpsc::unbounded_channel();
        let clients: ClientMap = Arc::new(RwLock::new(HashMap::new()));
        tokio::spawn(run_intake(Arc::clone(&clients), rx, cancel));
        Arc::new(Self {
            clients,
            rooms: RwLock::new(HashMap::new()),
            intake,
        })
    }

    /// Add a client to the live set. Resolves once the intake loop has
    /// applied it; returns false if the hub is shutting down.
    pub async fn register(&self, id: ClientId, entry: ClientEntry) -> bool {
        let (ack, done) = oneshot::channel();
        if self
            .intake
            .send(HubCommand::Register { id, entry, ack })
            .is_err()
        {
            return false;
        }
        done.await.is_ok()
    }

    /// Remove a client and close its queue. Safe to call repeatedly and
    /// after the client was already evicted.
    pub fn unregister(&self, id: ClientId) {
        if self.intake.send(HubCommand::Unregister(id)).is_err() {
            tracing::debug!(client_id = %id, "Hub intake closed, skipping unregister");
        }
    }

    /// Point a live client at `room_code` with `role`. No-op if the client
    /// has already been evicted.
    pub async fn attach(&self, id: ClientId, room_code: &str, role: Role) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get_mut(&id) {
            Some(entry) => {
                entry.room_code = room_code.to_string();
                entry.role = role;
                true
            },
            None => false,
        }
    }

    /// Enqueue `data` for every live client matching `predicate`.
    ///
    /// Clients whose queue is full or closed are removed from the live set
    /// on the spot. Returns the number of successful enqueues.
    pub async fn broadcast_where(
        &self,
        data: &Bytes,
        predicate: impl Fn(&ClientEntry) -> bool,
    ) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let clients = self.clients.read().await;
            for (id, entry) in clients.iter() {
                if !predicate(entry) {
                    continue;
                }
                match entry.sender.try_send(data.clone()) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::debug!(
                            client_id = %id, room = %entry.room_code, error = %e,
                            "Evicting slow client"
                        );
                        dead.push(*id);
                    },
                }
            }
        }
        if !dead.is_empty() {
            self.evict(&dead).await;
        }
        delivered
    }

    /// Enqueue `data` for every client attached to `room_code`.
    pub async fn broadcast_to_room(&self, room_code: &str, data: &Bytes) -> usize {
        self.broadcast_where(data, |e| e.room_code == room_code).await
    }

    /// Enqueue `data` for one client only. Evicts on overflow like a broadcast.
    pub async fn send_to(&self, id: ClientId, data: &Bytes) -> bool {
        let result = {
            let clients = self.clients.read().await;
            match clients.get(&id) {
                Some(entry) => entry.sender.try_send(data.clone()),
                None => return false,
            }
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(client_id = %id, error = %e, "Evicting slow client");
                self.evict(&[id]).await;
                false
            },
        }
    }

    async fn evict(&self, ids: &[ClientId]) {
        let mut clients = self.clients.write().await;
        for id in ids {
            clients.remove(id);
        }
    }

    /// Look up a live room without creating it.
    pub async fn get_room(&self, code: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(code).map(Arc::clone)
    }

    /// Allocate a room with a fresh code and admin secret.
    pub async fn create_room(&self, now: Timestamp) -> (String, SharedRoom) {
        let mut rooms = self.rooms.write().await;
        let code = generate_unique_room_code(|c| rooms.contains_key(c));
        let room = Arc::new(RwLock::new(Room::new(
            code.clone(),
            generate_admin_secret(),
            now,
        )));
        rooms.insert(code.clone(), Arc::clone(&room));
        tracing::info!(room = %code, "Room created");
        (code, room)
    }

    /// Whether `room` is still the live room registered under `code`.
    /// Deferred timers use this to avoid touching a reaped room, or a new
    /// room that reused the code.
    pub async fn is_live(&self, code: &str, room: &SharedRoom) -> bool {
        self.rooms
            .read()
            .await
            .get(code)
            .is_some_and(|live| Arc::ptr_eq(live, room))
    }

    /// Remove rooms idle for at least `max_idle_ms` and drop every client
    /// still attached to them. Returns the removed codes.
    pub async fn reap_idle_rooms(&self, now: Timestamp, max_idle_ms: i64) -> Vec<String> {
        let removed = {
            let mut rooms = self.rooms.write().await;
            let mut stale = Vec::new();
            for (code, room) in rooms.iter() {
                if room.read().await.is_idle(now, max_idle_ms) {
                    stale.push(code.clone());
                }
            }
            for code in &stale {
                rooms.remove(code);
            }
            stale
        };

        if !removed.is_empty() {
            let mut clients = self.clients.write().await;
            let before = clients.len();
            clients.retain(|_, e| !removed.contains(&e.room_code));
            let dropped = before - clients.len();
            tracing::info!(rooms = removed.len(), clients = dropped, "Reaped idle rooms");
        }
        removed
    }

    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// (live rooms, players across all rooms)
    pub async fn stats(&self) -> (usize, usize) {
        let rooms = self.rooms.read().await;
        let mut players = 0;
        for room in rooms.values() {
            players += room.read().await.players.len();
        }
        (rooms.len(), players)
    }

    #[cfg(test)]
    pub(crate) async fn client_room(&self, id: ClientId) -> Option<(String, Role)> {
        self.clients
            .read()
            .await
            .get(&id)
            .map(|e| (e.room_code.clone(), e.role))
    }
}

/// Apply registrations and removals one at a time.
async fn run_intake(
    clients: ClientMap,
    mut rx: mpsc::UnboundedReceiver<HubCommand>,
    cancel: CancellationToken,
) {
    loop {
        let cmd = tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };
        match cmd {
            HubCommand::Register { id, entry, ack } => {
                tracing::debug!(client_id = %id, room = %entry.room_code, role = entry.role.as_str(), "Client registered");
                clients.write().await.insert(id, entry);
                let _ = ack.send(());
            },
            HubCommand::Unregister(id) => {
                if clients.write().await.remove(&id).is_some() {
                    tracing::debug!(client_id = %id, "Client unregistered");
                }
            },
        }
    }
    // Closing every queue lets the writers send Close frames.
    clients.write().await.clear();
    tracing::info!("Hub intake stopped");
}
