use crate::card::Card;
use crate::state::{Room, RoomId, RoomSummary, User};
use serde::{Deserialize, Serialize};

// Every frame on the wire is `{"event": "<snake_case name>", "data": <payload>}`.

// --- Client -> server ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    // --- Lobby ---
    /// `mafs` is the starting balance; the server default applies when absent.
    UserLogin { name: String, mafs: Option<u32> },
    /// The payload may be omitted entirely, or sent as `null`.
    CreateRoom(Option<CreateRoomData>),
    JoinRoom(RoomId),
    GetRooms,
    LeaveRoom(RoomId),

    // --- In game ---
    PlaceBet { room_id: RoomId, amount: u32 },
    /// Skip betting and start play with no stake.
    ForceContinue { room_id: RoomId },
    Attack { room_id: RoomId, card: Card },
    /// Throw-in; handled exactly like `Attack`.
    AddAttack { room_id: RoomId, card: Card },
    Defend { room_id: RoomId, card: Card },
    TakeCards(RoomId),
    Bito(RoomId),
    /// Older clients' name for `Bito`.
    Pass(RoomId),

    Ping(u64),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomData {
    #[serde(default)]
    pub room_name: Option<String>,
}

// --- Server -> client ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    LoginSuccess(User),
    LoginError { message: String },
    RoomCreated { room_id: RoomId },
    RoomsList(Vec<RoomSummary>),

    /// Full room snapshot. Both hands are included unless the server conceals them.
    GameUpdate(Room),
    BetResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    PlayerDisconnected { message: String },
    /// `winner_index` is `None` for a draw.
    GameFinished { winner_index: Option<usize>, winner_name: Option<String> },

    Pong(u64),
    Error { message: String },
}

impl ClientMessage {
    pub fn create_room(room_name: Option<String>) -> Self {
        ClientMessage::CreateRoom(Some(CreateRoomData { room_name }))
    }

    /// The room an in-game action targets, if any.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            ClientMessage::JoinRoom(id)
            | ClientMessage::LeaveRoom(id)
            | ClientMessage::TakeCards(id)
            | ClientMessage::Bito(id)
            | ClientMessage::Pass(id)
            | ClientMessage::PlaceBet { room_id: id, .. }
            | ClientMessage::ForceContinue { room_id: id }
            | ClientMessage::Attack { room_id: id, .. }
            | ClientMessage::AddAttack { room_id: id, .. }
            | ClientMessage::Defend { room_id: id, .. } => Some(id),
            _ => None,
        }
    }
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }
}
