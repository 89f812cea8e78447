//! Turns inbound client events into engine calls and fans the results back out.
//!
//! Every change to a room, including a player leaving it, happens while holding that room's
//! mutex, and the resulting messages are queued before the mutex is released. Two actions on
//! the same room therefore never interleave and their broadcasts arrive in the order they
//! were applied. Outboxes are unbounded so queuing never blocks under the lock.

use crate::config::GameSettings;
use crate::registry::{RoomRegistry, UserRegistry};
use dashmap::DashMap;
use durak_core::{Card, ClientMessage, ConnectionId, GameError, GameResult, Player, Room, RoomId, ServerMessage, User};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

pub struct GameServer {
    settings: GameSettings,
    rooms: RoomRegistry,
    users: UserRegistry,
    outboxes: DashMap<ConnectionId, Outbox>,
}

impl GameServer {
    pub fn new(settings: GameSettings) -> Self {
        Self::with_rooms(settings, RoomRegistry::new())
    }

    /// A server whose rooms are dealt by `dealer` instead of a fresh shuffle.
    pub fn with_dealer(settings: GameSettings, dealer: impl Fn() -> Vec<Card> + Send + Sync + 'static) -> Self {
        Self::with_rooms(settings, RoomRegistry::with_dealer(Box::new(dealer)))
    }

    fn with_rooms(settings: GameSettings, rooms: RoomRegistry) -> Self {
        GameServer {
            settings,
            rooms,
            users: UserRegistry::new(),
            outboxes: DashMap::new(),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn user(&self, id: &ConnectionId) -> Option<User> {
        self.users.get(id)
    }

    /// Copy of a room's current state.
    pub fn room_snapshot(&self, room_id: &str) -> Option<Room> {
        self.rooms.get(room_id).map(|room| room.lock().clone())
    }

    // --- Connection lifecycle ---

    pub fn connect(&self, id: ConnectionId, outbox: Outbox) {
        info!("Client {} connected", id);
        self.outboxes.insert(id, outbox);
    }

    /// Drops the connection's profile and takes it out of its room.
    pub fn disconnect(&self, id: ConnectionId) {
        if let Some(user) = self.users.remove(&id) {
            if let Some(room_id) = user.room_id {
                if let Err(err) = self.remove_from_room(id, &room_id) {
                    debug!("Client {} was no longer in room {}: {}", id, room_id, err);
                }
            }
        }
        self.outboxes.remove(&id);
        info!("Client {} disconnected", id);
    }

    /// Answers a frame that could not be decoded.
    pub fn reject_malformed(&self, id: ConnectionId, reason: &str) {
        warn!("Malformed message from {}: {}", id, reason);
        self.send_to_client(id, ServerMessage::error(format!("Malformed message: {reason}")));
    }

    // --- Dispatch ---

    pub fn handle(&self, id: ConnectionId, msg: ClientMessage) {
        match msg {
            ClientMessage::UserLogin { name, mafs } => self.login(id, name, mafs),
            ClientMessage::GetRooms => self.send_to_client(id, ServerMessage::RoomsList(self.rooms.summaries())),
            ClientMessage::Ping(ts) => self.send_to_client(id, ServerMessage::Pong(ts)),
            ClientMessage::PlaceBet { room_id, amount } => {
                let reply = match self.place_bet(id, &room_id, amount) {
                    Ok(()) => ServerMessage::BetResult { success: true, message: None },
                    Err(err) => {
                        self.reject(id, &err);
                        ServerMessage::BetResult { success: false, message: Some(err.to_string()) }
                    }
                };
                self.send_to_client(id, reply);
            }
            other => {
                if let Err(err) = self.handle_room_message(id, other) {
                    self.reject(id, &err);
                }
            }
        }
    }

    fn handle_room_message(&self, id: ConnectionId, msg: ClientMessage) -> GameResult<()> {
        let user = self.users.get(&id).ok_or(GameError::NotLoggedIn)?;
        match msg {
            ClientMessage::CreateRoom(data) => self.create_room(&user, data.and_then(|d| d.room_name)),
            ClientMessage::JoinRoom(room_id) => self.join_room(&user, &room_id),
            ClientMessage::LeaveRoom(room_id) => self.remove_from_room(id, &room_id),
            ClientMessage::ForceContinue { room_id } => self.act(&room_id, |room| room.force_continue(&id)),
            ClientMessage::Attack { room_id, card } | ClientMessage::AddAttack { room_id, card } => {
                self.act(&room_id, |room| room.attack(&id, card))
            }
            ClientMessage::Defend { room_id, card } => self.act(&room_id, |room| room.defend(&id, card)),
            ClientMessage::TakeCards(room_id) => self.act(&room_id, |room| room.take_cards(&id)),
            ClientMessage::Bito(room_id) | ClientMessage::Pass(room_id) => {
                self.act(&room_id, |room| room.close_round(&id))
            }
            ClientMessage::UserLogin { .. }
            | ClientMessage::GetRooms
            | ClientMessage::Ping(_)
            | ClientMessage::PlaceBet { .. } => Ok(()),
        }
    }

    fn reject(&self, id: ConnectionId, err: &GameError) {
        debug!("Rejected action from {}: {}", id, err);
        self.send_to_client(id, ServerMessage::error(err.to_string()));
    }

    // --- Lobby ---

    fn login(&self, id: ConnectionId, name: String, mafs: Option<u32>) {
        let name = name.trim().to_string();
        if name.is_empty() {
            self.send_to_client(id, ServerMessage::LoginError { message: "Name is required".to_string() });
            return;
        }
        // Zero counts as unset.
        let mafs = mafs.filter(|&m| m > 0).unwrap_or(self.settings.starting_mafs);
        let user = self.users.login(id, name, mafs);
        info!("Client {} logged in as {}", id, user.name);
        self.send_to_client(id, ServerMessage::LoginSuccess(user));
    }

    fn create_room(&self, user: &User, name: Option<String>) -> GameResult<()> {
        let stale = self.check_free(user)?;

        let (room_id, shared) = self.rooms.create(Player::from_user(user), name)?;
        {
            let room = shared.lock();
            self.users.set_room(&user.id, Some(room_id.clone()));
            self.send_to_client(user.id, ServerMessage::RoomCreated { room_id: room_id.clone() });
            self.broadcast_state(&room);
        }
        info!("{} created room {}", user.name, room_id);

        self.leave_stale(user.id, stale);
        Ok(())
    }

    fn join_room(&self, user: &User, room_id: &str) -> GameResult<()> {
        let stale = self.check_free(user)?;

        let shared = self.rooms.get(room_id).ok_or(GameError::RoomNotFound)?;
        {
            let mut room = shared.lock();
            room.join(Player::from_user(user))?;
            self.users.set_room(&user.id, Some(room.id.clone()));
            self.broadcast_state(&room);
        }
        info!("{} joined room {}", user.name, room_id);

        self.leave_stale(user.id, stale);
        Ok(())
    }

    /// A user may sit in one live game at a time. Returns the finished room they still
    /// occupy, if any, so the caller can leave it once the new seat is taken.
    fn check_free(&self, user: &User) -> GameResult<Option<RoomId>> {
        let Some(room_id) = &user.room_id else {
            return Ok(None);
        };
        let Some(shared) = self.rooms.get(room_id) else {
            return Ok(None);
        };
        let room = shared.lock();
        if room.player_index(&user.id).is_some() && !room.is_finished() {
            return Err(GameError::AlreadyInRoom);
        }
        Ok(Some(room_id.clone()))
    }

    fn leave_stale(&self, id: ConnectionId, stale: Option<RoomId>) {
        if let Some(old_room_id) = stale {
            if let Err(err) = self.remove_from_room(id, &old_room_id) {
                debug!("Leaving stale room {} failed: {}", old_room_id, err);
            }
        }
    }

    /// Takes a player out of a room. The opponent, if any, is told and the room becomes
    /// terminal; an emptied room is dropped from the registry.
    fn remove_from_room(&self, id: ConnectionId, room_id: &str) -> GameResult<()> {
        let shared = self.rooms.get(room_id).ok_or(GameError::RoomNotFound)?;
        let mut room = shared.lock();
        let player = room.remove_player(&id)?;
        if self.users.get(&id).and_then(|u| u.room_id).as_deref() == Some(room_id) {
            self.users.set_room(&id, None);
        }

        if room.players.is_empty() {
            self.rooms.remove(room_id);
            info!("Room {} is empty and was removed", room_id);
        } else {
            info!("{} left room {}", player.name, room_id);
            let notice = ServerMessage::PlayerDisconnected { message: format!("{} left the game", player.name) };
            self.send_to_room(&room, &notice);
            self.broadcast_state(&room);
        }
        Ok(())
    }

    // --- In game ---

    fn place_bet(&self, id: ConnectionId, room_id: &str, amount: u32) -> GameResult<()> {
        self.users.get(&id).ok_or(GameError::NotLoggedIn)?;
        let balance = self.act(room_id, |room| {
            room.place_bet(&id, amount)?;
            Ok(room.player_index(&id).map(|idx| room.players[idx].mafs))
        })?;
        if let Some(mafs) = balance {
            self.users.set_mafs(&id, mafs);
        }
        Ok(())
    }

    /// Applies one engine action under the room lock and broadcasts the result. Nothing is
    /// sent when the engine rejects the action.
    fn act<T>(&self, room_id: &str, action: impl FnOnce(&mut Room) -> GameResult<T>) -> GameResult<T> {
        let shared = self.rooms.get(room_id).ok_or(GameError::RoomNotFound)?;
        let mut room = shared.lock();
        if room.players.is_empty() {
            return Err(GameError::RoomNotFound);
        }

        let was_finished = room.is_finished();
        let value = action(&mut *room)?;
        debug!(room_id, phase = ?room.phase, "Action applied");
        self.broadcast_state(&room);

        if !was_finished {
            if let Some(outcome) = &room.outcome {
                info!(room_id, winner = ?outcome.winner_name, "Game finished");
                let finished = ServerMessage::GameFinished {
                    winner_index: outcome.winner_index,
                    winner_name: outcome.winner_name.clone(),
                };
                self.send_to_room(&room, &finished);
            }
        }
        Ok(value)
    }

    // --- Delivery ---

    /// Sends every player a `game_update`, concealed per recipient when configured.
    fn broadcast_state(&self, room: &Room) {
        for player in &room.players {
            let snapshot = if self.settings.hide_opponent_hands {
                room.for_client(&player.id)
            } else {
                room.clone()
            };
            self.send_to_client(player.id, ServerMessage::GameUpdate(snapshot));
        }
    }

    fn send_to_room(&self, room: &Room, msg: &ServerMessage) {
        for player in &room.players {
            self.send_to_client(player.id, msg.clone());
        }
    }

    fn send_to_client(&self, id: ConnectionId, msg: ServerMessage) {
        if let Some(outbox) = self.outboxes.get(&id) {
            if outbox.send(msg).is_err() {
                warn!("Failed to queue a message for {} (connection closing)", id);
            }
        }
    }
}
