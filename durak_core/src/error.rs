use thiserror::Error;

/// Reasons an inbound action is rejected.
///
/// Every variant is recoverable: it is reported to the acting client only and the room is left
/// exactly as it was. The `Display` text is what the client receives in the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Log in first")]
    NotLoggedIn,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Action is not allowed in the current game phase")]
    WrongPhase,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Card is not in your hand")]
    CardNotInHand,

    #[error("Only ranks already on the table can be thrown in")]
    CardRankMismatch,

    #[error("The defender cannot answer any more attack cards")]
    TooManyAttacks,

    #[error("There is no open attack to beat")]
    NoOpenAttack,

    #[error("This card cannot beat the attacking card")]
    CardCannotBeat,

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("You are not a player in this room")]
    PlayerNotInRoom,

    #[error("You are already playing in another room")]
    AlreadyInRoom,

    #[error("A room needs each of the 36 cards exactly once")]
    InvalidDeck,
}

pub type GameResult<T> = Result<T, GameError>;
