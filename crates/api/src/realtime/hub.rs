use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::debug;

use super::events::ServerEvent;

/// In-process fan-out for connected sockets.
///
/// Every user has a personal room, every conversation a room keyed by its
/// public id, and a single lobby reaches all connected clients (presence).
/// Presence is a connection count per user: a user is online while at least
/// one socket is open.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    capacity: usize,
    presence: Mutex<HashMap<i64, usize>>,
    user_rooms: RwLock<HashMap<i64, broadcast::Sender<ServerEvent>>>,
    conversation_rooms: RwLock<HashMap<String, broadcast::Sender<ServerEvent>>>,
    lobby: broadcast::Sender<ServerEvent>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (lobby, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(HubInner {
                capacity,
                presence: Mutex::new(HashMap::new()),
                user_rooms: RwLock::new(HashMap::new()),
                conversation_rooms: RwLock::new(HashMap::new()),
                lobby,
            }),
        }
    }

    /// Record a new connection; `true` when it is the user's first.
    pub async fn connect(&self, user_id: i64) -> bool {
        let mut presence = self.inner.presence.lock().await;
        let count = presence.entry(user_id).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Record a closed connection; `true` when it was the user's last.
    pub async fn disconnect(&self, user_id: i64) -> bool {
        let mut presence = self.inner.presence.lock().await;
        let Some(count) = presence.get_mut(&user_id) else {
            return false;
        };
        *count = count.saturating_sub(1);
        if *count > 0 {
            return false;
        }
        presence.remove(&user_id);
        drop(presence);

        release_if_idle(&self.inner.user_rooms, &user_id).await;
        true
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.inner.presence.lock().await.contains_key(&user_id)
    }

    pub async fn online_users(&self) -> Vec<i64> {
        let presence = self.inner.presence.lock().await;
        let mut users: Vec<i64> = presence.keys().copied().collect();
        users.sort_unstable();
        users
    }

    pub async fn connection_count(&self, user_id: i64) -> usize {
        self.inner
            .presence
            .lock()
            .await
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn subscribe_lobby(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.lobby.subscribe()
    }

    pub async fn subscribe_user(&self, user_id: i64) -> broadcast::Receiver<ServerEvent> {
        room_sender(&self.inner.user_rooms, user_id, self.inner.capacity)
            .await
            .subscribe()
    }

    pub async fn subscribe_conversation(
        &self,
        conversation_id: &str,
    ) -> broadcast::Receiver<ServerEvent> {
        room_sender(
            &self.inner.conversation_rooms,
            conversation_id.to_string(),
            self.inner.capacity,
        )
        .await
        .subscribe()
    }

    /// Drop the conversation room once its last subscriber is gone.
    pub async fn release_conversation(&self, conversation_id: &str) {
        release_if_idle(&self.inner.conversation_rooms, conversation_id).await;
    }

    /// Broadcast to every connected client.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.inner.lobby.send(event).unwrap_or(0)
    }

    /// Broadcast `event` only while `user_id` has no open socket. The check
    /// and the send happen under the presence lock, so a reconnect cannot
    /// slip between them.
    pub async fn broadcast_unless_online(&self, user_id: i64, event: ServerEvent) -> bool {
        let presence = self.inner.presence.lock().await;
        if presence.contains_key(&user_id) {
            return false;
        }
        self.inner.lobby.send(event).ok();
        true
    }

    /// Deliver to a user's personal room. Offline users are skipped.
    pub async fn send_to_user(&self, user_id: i64, event: &ServerEvent) -> usize {
        let rooms = self.inner.user_rooms.read().await;
        match rooms.get(&user_id) {
            Some(sender) => sender.send(event.clone()).unwrap_or(0),
            None => {
                debug!(user_id, "user has no open sockets, skipping event");
                0
            }
        }
    }

    pub async fn send_to_users<I>(&self, user_ids: I, event: &ServerEvent) -> usize
    where
        I: IntoIterator<Item = i64>,
    {
        let rooms = self.inner.user_rooms.read().await;
        user_ids
            .into_iter()
            .filter_map(|user_id| rooms.get(&user_id))
            .map(|sender| sender.send(event.clone()).unwrap_or(0))
            .sum()
    }

    pub async fn send_to_conversation(&self, conversation_id: &str, event: &ServerEvent) -> usize {
        let rooms = self.inner.conversation_rooms.read().await;
        rooms
            .get(conversation_id)
            .map(|sender| sender.send(event.clone()).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(64)
    }
}

async fn room_sender<K>(
    rooms: &RwLock<HashMap<K, broadcast::Sender<ServerEvent>>>,
    key: K,
    capacity: usize,
) -> broadcast::Sender<ServerEvent>
where
    K: Eq + Hash,
{
    if let Some(sender) = rooms.read().await.get(&key) {
        return sender.clone();
    }
    rooms
        .write()
        .await
        .entry(key)
        .or_insert_with(|| broadcast::channel(capacity).0)
        .clone()
}

async fn release_if_idle<K, Q>(rooms: &RwLock<HashMap<K, broadcast::Sender<ServerEvent>>>, key: &Q)
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    let mut rooms = rooms.write().await;
    if rooms
        .get(key)
        .is_some_and(|sender| sender.receiver_count() == 0)
    {
        rooms.remove(key);
    }
}
