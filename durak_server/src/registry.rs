//! Live rooms and logged-in users.
//!
//! Both registries are plain concurrent maps owned by the [`GameServer`](crate::GameServer).
//! A room is only ever read or changed through its own mutex.
//!
//! Lock order: never wait on a room mutex while holding a map guard. Lookups clone the
//! `Arc` out of the map first.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use durak_core::{Card, ConnectionId, GameResult, Player, Room, RoomId, RoomSummary, User, generate_deck, shuffle};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;

const ROOM_ID_LEN: usize = 6;
const ROOM_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub type SharedRoom = Arc<Mutex<Room>>;

/// Supplies the deck for each new room, top card first.
pub type Dealer = Box<dyn Fn() -> Vec<Card> + Send + Sync>;

pub struct RoomRegistry {
    rooms: DashMap<RoomId, SharedRoom>,
    dealer: Dealer,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::with_dealer(Box::new(|| shuffle(&generate_deck(), &mut rand::rng())))
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dealer(dealer: Dealer) -> Self {
        RoomRegistry { rooms: DashMap::new(), dealer }
    }

    /// Deals a new room for `owner` under an id no live room uses.
    pub fn create(&self, owner: Player, name: Option<String>) -> GameResult<(RoomId, SharedRoom)> {
        let mut rng = rand::rng();
        loop {
            let id = random_room_id(&mut rng);
            if let Entry::Vacant(slot) = self.rooms.entry(id.clone()) {
                let room = Room::with_deck(id.clone(), name, owner, (self.dealer)())?;
                let room = Arc::new(Mutex::new(room));
                slot.insert(room.clone());
                return Ok((id, room));
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<SharedRoom> {
        self.rooms.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<SharedRoom> {
        self.rooms.remove(id).map(|(_, room)| room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Lobby listing, oldest room first.
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let rooms: Vec<SharedRoom> = self.rooms.iter().map(|entry| entry.value().clone()).collect();
        let mut summaries: Vec<RoomSummary> = rooms
            .iter()
            .filter_map(|room| {
                let room = room.lock();
                if room.players.is_empty() { None } else { Some(room.summary()) }
            })
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }
}

fn random_room_id<R: Rng + ?Sized>(rng: &mut R) -> RoomId {
    (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_CHARSET[rng.random_range(0..ROOM_ID_CHARSET.len())] as char)
        .collect()
}

#[derive(Default)]
pub struct UserRegistry {
    users: DashMap<ConnectionId, User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the profile for a connection. Logging in again only renames the user;
    /// balance and room membership are kept.
    pub fn login(&self, id: ConnectionId, name: String, mafs: u32) -> User {
        self.users
            .entry(id)
            .and_modify(|user| user.name = name.clone())
            .or_insert_with(|| User { id, name, mafs, room_id: None })
            .value()
            .clone()
    }

    pub fn get(&self, id: &ConnectionId) -> Option<User> {
        self.users.get(id).map(|user| user.value().clone())
    }

    pub fn set_room(&self, id: &ConnectionId, room_id: Option<RoomId>) {
        if let Some(mut user) = self.users.get_mut(id) {
            user.room_id = room_id;
        }
    }

    pub fn set_mafs(&self, id: &ConnectionId, mafs: u32) {
        if let Some(mut user) = self.users.get_mut(id) {
            user.mafs = mafs;
        }
    }

    pub fn remove(&self, id: &ConnectionId) -> Option<User> {
        self.users.remove(id).map(|(_, user)| user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
