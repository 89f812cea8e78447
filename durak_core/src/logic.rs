use crate::card::{Card, DECK_SIZE, Suit, can_beat, generate_deck, shuffle};
use crate::error::{GameError, GameResult};
use crate::state::*;
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;

// --- Players ---

impl Player {
    pub fn new(id: ConnectionId, name: impl Into<String>, mafs: u32) -> Self {
        Player {
            id,
            name: name.into(),
            mafs,
            hand: Vec::with_capacity(HAND_SIZE),
            hidden_cards: None,
            is_active: false,
        }
    }

    pub fn from_user(user: &User) -> Self {
        Player::new(user.id, user.name.clone(), user.mafs)
    }

    fn card_position(&self, card: &Card) -> Option<usize> {
        self.hand.iter().position(|c| c == card)
    }

    /// Value of the lowest trump in hand, if any.
    fn lowest_trump(&self, trump: Suit) -> Option<u8> {
        self.hand
            .iter()
            .filter(|c| c.is_trump(trump))
            .map(|c| c.rank.value())
            .min()
    }
}

// --- Room lifecycle ---

impl Room {
    /// Creates a room around its owner with a freshly shuffled deck.
    pub fn new<R: Rng + ?Sized>(id: RoomId, name: Option<String>, owner: Player, rng: &mut R) -> Room {
        let deck = shuffle(&generate_deck(), rng);
        Room::deal(id, name, owner, deck)
    }

    /// Creates a room dealing from `deck` as given.
    ///
    /// `deck[0]` is the top of the stock. The last card is turned up as trump and stays at the
    /// bottom of the stock, so it is the last card anyone draws. The deck must be a full
    /// 36-card deck in any order.
    pub fn with_deck(id: RoomId, name: Option<String>, owner: Player, deck: Vec<Card>) -> GameResult<Room> {
        let mut seen = HashSet::with_capacity(DECK_SIZE);
        if deck.len() != DECK_SIZE || !deck.iter().all(|card| seen.insert(*card)) {
            return Err(GameError::InvalidDeck);
        }
        Ok(Room::deal(id, name, owner, deck))
    }

    fn deal(id: RoomId, name: Option<String>, owner: Player, deck: Vec<Card>) -> Room {
        let mut stock = deck;
        stock.reverse();
        let trump_card = stock[0];
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Room {id}"));

        let mut room = Room {
            id,
            name,
            players: Vec::with_capacity(MAX_PLAYERS),
            stock,
            hidden_stock: None,
            trump_card,
            table: Vec::new(),
            discard: Vec::new(),
            attacker_index: 0,
            defender_index: 0,
            phase: GamePhase::Waiting,
            bet_amount: 0,
            created_at: Utc::now(),
            outcome: None,
            opponent_left: false,
        };
        room.seat(owner);
        room
    }

    /// Seats the second player, deals their hand and moves the room on to betting.
    ///
    /// The player holding the lowest trump attacks first. If nobody holds a trump the owner
    /// attacks.
    pub fn join(&mut self, joiner: Player) -> GameResult<()> {
        if self.players.is_empty() {
            return Err(GameError::RoomNotFound);
        }
        if self.player_index(&joiner.id).is_some() {
            return Err(GameError::AlreadyInRoom);
        }
        if self.is_full() || self.phase != GamePhase::Waiting {
            return Err(GameError::RoomFull);
        }

        self.seat(joiner);
        let first = self.first_attacker();
        self.set_attacker(first);
        self.phase = GamePhase::Betting;
        self.refresh_active();
        Ok(())
    }

    /// Takes a player out of the room.
    ///
    /// A remaining opponent is left in a terminal `Finished` state with `opponent_left` set.
    /// When the last player leaves the room is empty and should be dropped by its owner.
    pub fn remove_player(&mut self, player_id: &ConnectionId) -> GameResult<Player> {
        let idx = self.seat_of(player_id)?;
        let player = self.players.remove(idx);

        if !self.players.is_empty() {
            self.opponent_left = true;
            self.phase = GamePhase::Finished;
            self.attacker_index = 0;
            self.defender_index = 0;
            self.refresh_active();
        }
        Ok(player)
    }

    fn seat(&mut self, mut player: Player) {
        player.hand.clear();
        for _ in 0..HAND_SIZE {
            match self.stock.pop() {
                Some(card) => player.hand.push(card),
                None => break,
            }
        }
        self.players.push(player);
    }

    fn first_attacker(&self) -> usize {
        let trump = self.trump_suit();
        self.players
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| p.lowest_trump(trump).map(|value| (value, idx)))
            .min()
            .map_or(0, |(_, idx)| idx)
    }
}

// --- Betting ---

impl Room {
    /// Stakes `amount` from the bettor's balance and starts play.
    pub fn place_bet(&mut self, player_id: &ConnectionId, amount: u32) -> GameResult<()> {
        let idx = self.seat_of(player_id)?;
        self.expect_phase(&[GamePhase::Betting])?;
        if amount > self.players[idx].mafs {
            return Err(GameError::InsufficientFunds);
        }

        self.players[idx].mafs -= amount;
        self.bet_amount = amount;
        self.phase = GamePhase::Attacking;
        self.refresh_active();
        Ok(())
    }

    /// Skips betting and starts play with no stake.
    pub fn force_continue(&mut self, player_id: &ConnectionId) -> GameResult<()> {
        self.seat_of(player_id)?;
        self.expect_phase(&[GamePhase::Betting])?;

        self.bet_amount = 0;
        self.phase = GamePhase::Attacking;
        self.refresh_active();
        Ok(())
    }
}

// --- Attack / defense ---

impl Room {
    /// Plays an attack card.
    ///
    /// In `Attacking` this opens the round and any card is legal. In `Defending` or `RoundEnd`
    /// it is a throw-in: the rank must already be on the table and the defender must still be
    /// able to answer every open attack.
    pub fn attack(&mut self, player_id: &ConnectionId, card: Card) -> GameResult<()> {
        let idx = self.seat_of(player_id)?;
        self.expect_phase(&[GamePhase::Attacking, GamePhase::Defending, GamePhase::RoundEnd])?;
        if idx != self.attacker_index {
            return Err(GameError::NotYourTurn);
        }
        let pos = self.players[idx].card_position(&card).ok_or(GameError::CardNotInHand)?;
        if !self.table.is_empty() && !self.table.iter().any(|e| e.card.rank == card.rank) {
            return Err(GameError::CardRankMismatch);
        }
        if self.open_attack_count() >= self.players[self.defender_index].hand.len() {
            return Err(GameError::TooManyAttacks);
        }

        self.players[idx].hand.remove(pos);
        self.table.push(TableEntry { card, player_index: idx, role: TableRole::Attack });
        self.phase = GamePhase::Defending;
        self.refresh_active();
        Ok(())
    }

    /// Beats the earliest unanswered attack card.
    pub fn defend(&mut self, player_id: &ConnectionId, card: Card) -> GameResult<()> {
        let idx = self.seat_of(player_id)?;
        self.expect_phase(&[GamePhase::Defending, GamePhase::RoundEnd])?;
        if idx != self.defender_index {
            return Err(GameError::NotYourTurn);
        }
        let pos = self.players[idx].card_position(&card).ok_or(GameError::CardNotInHand)?;
        let target = self.first_open_attack().ok_or(GameError::NoOpenAttack)?;
        if !can_beat(&target.card, &card, self.trump_suit()) {
            return Err(GameError::CardCannotBeat);
        }

        self.players[idx].hand.remove(pos);
        self.table.push(TableEntry { card, player_index: idx, role: TableRole::Defense });
        if self.open_attack_count() == 0 {
            self.phase = GamePhase::RoundEnd;
        }
        self.refresh_active();
        Ok(())
    }

    /// The defender gives up the round and picks up every card on the table.
    pub fn take_cards(&mut self, player_id: &ConnectionId) -> GameResult<()> {
        let idx = self.seat_of(player_id)?;
        self.expect_phase(&[GamePhase::Defending])?;
        if idx != self.defender_index {
            return Err(GameError::NotYourTurn);
        }

        let picked: Vec<Card> = self.table.drain(..).map(|e| e.card).collect();
        self.players[idx].hand.extend(picked);
        self.resolve_round(idx);
        Ok(())
    }

    /// Bito: the attacker closes a fully defended round. The table goes to the discard pile and
    /// the defender attacks next.
    pub fn close_round(&mut self, player_id: &ConnectionId) -> GameResult<()> {
        let idx = self.seat_of(player_id)?;
        self.expect_phase(&[GamePhase::RoundEnd])?;
        if idx != self.attacker_index {
            return Err(GameError::NotYourTurn);
        }

        let beaten: Vec<Card> = self.table.drain(..).map(|e| e.card).collect();
        self.discard.extend(beaten);
        let next_attacker = self.defender_index;
        self.resolve_round(next_attacker);
        Ok(())
    }

    /// Refills hands, hands the attack to `next_attacker` and checks for the end of the game.
    fn resolve_round(&mut self, next_attacker: usize) {
        self.refill_hands();
        self.set_attacker(next_attacker);
        self.phase = GamePhase::Attacking;
        self.check_game_over();
        self.refresh_active();
    }

    /// Attacker draws first, then the defender, each up to `HAND_SIZE` while the stock lasts.
    fn refill_hands(&mut self) {
        for idx in [self.attacker_index, self.defender_index] {
            while self.players[idx].hand.len() < HAND_SIZE {
                match self.stock.pop() {
                    Some(card) => self.players[idx].hand.push(card),
                    None => break,
                }
            }
        }
    }

    fn check_game_over(&mut self) {
        if !self.stock.is_empty() {
            return;
        }
        let empty_hands: Vec<usize> = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| p.hand.is_empty())
            .map(|(idx, _)| idx)
            .collect();

        let winner_index = match empty_hands.as_slice() {
            [] => return,
            [winner] => Some(*winner),
            _ => None,
        };
        self.outcome = Some(GameOutcome {
            winner_index,
            winner_name: winner_index.map(|idx| self.players[idx].name.clone()),
        });
        self.phase = GamePhase::Finished;
    }
}

// --- Helpers ---

impl Room {
    fn seat_of(&self, player_id: &ConnectionId) -> GameResult<usize> {
        self.player_index(player_id).ok_or(GameError::PlayerNotInRoom)
    }

    fn expect_phase(&self, allowed: &[GamePhase]) -> GameResult<()> {
        if allowed.contains(&self.phase) { Ok(()) } else { Err(GameError::WrongPhase) }
    }

    fn set_attacker(&mut self, attacker: usize) {
        self.attacker_index = attacker;
        self.defender_index = (attacker + 1) % self.players.len();
    }

    fn refresh_active(&mut self) {
        let active = match self.phase {
            GamePhase::Attacking | GamePhase::RoundEnd => Some(self.attacker_index),
            GamePhase::Defending => Some(self.defender_index),
            _ => None,
        };
        for (idx, player) in self.players.iter_mut().enumerate() {
            player.is_active = Some(idx) == active;
        }
    }
}

// --- Unit tests ---
