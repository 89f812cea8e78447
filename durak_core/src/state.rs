use crate::card::{Card, Suit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RoomId = String;
/// Identifier the transport assigns to each live connection.
pub type ConnectionId = Uuid;

/// Cards each player holds after the deal and after every refill, while the stock lasts.
pub const HAND_SIZE: usize = 6;
pub const MAX_PLAYERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub players: Vec<Player>,
    // Top of the stock is the end of the vec. The trump card sits at index 0 and is drawn last.
    pub stock: Vec<Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_stock: Option<usize>,
    pub trump_card: Card,
    // The unresolved trick, in play order.
    pub table: Vec<TableEntry>,
    // Cards beaten off in closed rounds ("bito"). Out of play for the rest of the game.
    pub discard: Vec<Card>,
    pub attacker_index: usize,
    pub defender_index: usize,
    pub phase: GamePhase,
    pub bet_amount: u32,
    pub created_at: DateTime<Utc>,
    pub outcome: Option<GameOutcome>,
    pub opponent_left: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: ConnectionId,
    pub name: String,
    pub mafs: u32,  // currency balance
    pub hand: Vec<Card>,
    // Redacted snapshots keep only the size of an opponent's hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_cards: Option<usize>,
    // Whether the room is waiting on this player's move
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableEntry {
    pub card: Card,
    pub player_index: usize,
    pub role: TableRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableRole {
    Attack,
    Defense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GamePhase {
    /// Only the owner is seated.
    Waiting,
    Betting,
    Attacking,
    Defending,
    /// Every attack card is beaten; the attacker may throw in more or call bito.
    RoundEnd,
    Finished,
}

/// How a finished game ended. `winner_index` is `None` for a draw or an abandoned room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOutcome {
    pub winner_index: Option<usize>,
    pub winner_name: Option<String>,
}

/// The lobby's view of a room, as sent in `rooms_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub game_started: bool,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral profile bound to one connection, created on login and dropped on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: ConnectionId,
    pub name: String,
    pub mafs: u32,
    #[serde(skip)]
    pub room_id: Option<RoomId>,
}

// --- Room read-only helpers ---

impl Room {
    pub fn trump_suit(&self) -> Suit {
        self.trump_card.suit
    }

    pub fn player_index(&self, player_id: &ConnectionId) -> Option<usize> {
        self.players.iter().position(|p| p.id == *player_id)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::Finished
    }

    /// Attack entries on the table that have no defense yet.
    pub fn open_attack_count(&self) -> usize {
        let attacks = self.table.iter().filter(|e| e.role == TableRole::Attack).count();
        let defenses = self.table.iter().filter(|e| e.role == TableRole::Defense).count();
        attacks - defenses
    }

    /// The earliest attack entry that has not been answered.
    ///
    /// Defenses pair with attacks one-to-one in table order, so the n-th defense answers the
    /// n-th attack.
    pub fn first_open_attack(&self) -> Option<&TableEntry> {
        let defenses = self.table.iter().filter(|e| e.role == TableRole::Defense).count();
        self.table.iter().filter(|e| e.role == TableRole::Attack).nth(defenses)
    }

    /// Total cards across hands, stock, table and discard pile. Stays at 36 for a seated pair.
    pub fn card_count(&self) -> usize {
        self.players.iter().map(|p| p.hand.len()).sum::<usize>()
            + self.stock.len()
            + self.table.len()
            + self.discard.len()
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            player_count: self.players.len(),
            max_players: MAX_PLAYERS,
            game_started: !matches!(self.phase, GamePhase::Waiting | GamePhase::Betting),
            created_at: self.created_at,
        }
    }

    /// Copy of the room as `client_id` should see it when hands are concealed:
    /// every other player's cards and the stock are replaced by their sizes. The trump card
    /// stays face up.
    pub fn for_client(&self, client_id: &ConnectionId) -> Self {
        let mut client_room = self.clone();
        for player in client_room.players.iter_mut() {
            if player.id != *client_id {
                player.hidden_cards = Some(player.hand.len());
                player.hand.clear();
            }
        }
        client_room.hidden_stock = Some(client_room.stock.len());
        client_room.stock.clear();
        client_room
    }
}
