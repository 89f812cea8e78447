//! # Durak core
//!
//! Authoritative rules for two-player Durak ("Fool"): the 36-card deck, the room model,
//! the attack/defense state machine and the messages exchanged with clients.
//! Everything here is synchronous and free of I/O; the server decides how rooms are
//! shared and how messages travel.

mod card;
mod error;
mod logic;
mod message;
mod state;

pub use card::*;

pub use error::*;

pub use message::*;

pub use state::*;
