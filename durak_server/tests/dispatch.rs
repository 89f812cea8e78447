//! Dispatcher tests: real registries and engine, in-memory outboxes instead of sockets.

use durak_core::{
    Card, ClientMessage, ConnectionId, GameError, GamePhase, Rank, Room, RoomId, ServerMessage, Suit,
    generate_deck,
};
use durak_server::{GameServer, GameSettings};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use uuid::Uuid;

struct Client {
    id: ConnectionId,
    rx: UnboundedReceiver<ServerMessage>,
}

impl Client {
    fn connect(server: &GameServer) -> Self {
        let id = Uuid::new_v4();
        let (tx, rx) = unbounded_channel();
        server.connect(id, tx);
        Client { id, rx }
    }

    fn login(server: &GameServer, name: &str) -> Self {
        let mut client = Client::connect(server);
        server.handle(client.id, ClientMessage::UserLogin { name: name.to_string(), mafs: None });
        client.drain();
        client
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn last_update(&mut self) -> Option<Room> {
        self.drain().into_iter().rev().find_map(|msg| match msg {
            ServerMessage::GameUpdate(room) => Some(room),
            _ => None,
        })
    }
}

fn errors(messages: &[ServerMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            ServerMessage::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn server() -> GameServer {
    GameServer::new(GameSettings::default())
}

/// Deals every room from the unshuffled deck.
fn ordered_server() -> GameServer {
    GameServer::with_dealer(GameSettings::default(), generate_deck)
}

fn card(rank: Rank, suit: Suit) -> Card {
    Card::new(rank, suit)
}

fn create_room(server: &GameServer, owner: &mut Client) -> RoomId {
    server.handle(owner.id, ClientMessage::create_room(Some("table one".to_string())));
    owner
        .drain()
        .into_iter()
        .find_map(|msg| match msg {
            ServerMessage::RoomCreated { room_id } => Some(room_id),
            _ => None,
        })
        .expect("room_created")
}

/// Two logged-in players seated in a room that has moved past betting.
fn started_game(server: &GameServer) -> (Client, Client, RoomId) {
    let mut alice = Client::login(server, "alice");
    let mut bob = Client::login(server, "bob");
    let room_id = create_room(server, &mut alice);
    server.handle(bob.id, ClientMessage::JoinRoom(room_id.clone()));
    server.handle(alice.id, ClientMessage::ForceContinue { room_id: room_id.clone() });
    alice.drain();
    bob.drain();
    (alice, bob, room_id)
}

fn attacker_card(room: &Room) -> Card {
    room.players[room.attacker_index].hand[0]
}

#[test]
fn test_login() {
    let server = server();
    let mut client = Client::connect(&server);
    server.handle(client.id, ClientMessage::UserLogin { name: "  ".to_string(), mafs: None });
    assert!(matches!(client.drain().as_slice(), [ServerMessage::LoginError { .. }]));

    server.handle(client.id, ClientMessage::UserLogin { name: " Ivan ".to_string(), mafs: Some(300) });
    match client.drain().as_slice() {
        [ServerMessage::LoginSuccess(user)] => {
            assert_eq!(user.name, "Ivan");
            assert_eq!(user.mafs, 300);
            assert_eq!(user.id, client.id);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(server.user_count(), 1);
}

#[test]
fn test_zero_balance_login_gets_the_default() {
    let server = server();
    let mut client = Client::connect(&server);
    server.handle(client.id, ClientMessage::UserLogin { name: "Ivan".to_string(), mafs: Some(0) });
    match client.drain().as_slice() {
        [ServerMessage::LoginSuccess(user)] => assert_eq!(user.mafs, GameSettings::default().starting_mafs),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_actions_require_login() {
    let server = server();
    let mut client = Client::connect(&server);
    server.handle(client.id, ClientMessage::create_room(None));
    assert_eq!(errors(&client.drain()), vec![GameError::NotLoggedIn.to_string()]);
    assert_eq!(server.room_count(), 0);
}

#[test]
fn test_create_and_list_rooms() {
    let server = server();
    let mut alice = Client::login(&server, "alice");
    server.handle(alice.id, ClientMessage::create_room(Some("table one".to_string())));

    let messages = alice.drain();
    let room_id = match &messages[0] {
        ServerMessage::RoomCreated { room_id } => room_id.clone(),
        other => panic!("unexpected {other:?}"),
    };
    match &messages[1] {
        ServerMessage::GameUpdate(room) => {
            assert_eq!(room.phase, GamePhase::Waiting);
            assert_eq!(room.players[0].hand.len(), 6);
        }
        other => panic!("unexpected {other:?}"),
    }

    server.handle(alice.id, ClientMessage::GetRooms);
    match alice.drain().as_slice() {
        [ServerMessage::RoomsList(rooms)] => {
            assert_eq!(rooms.len(), 1);
            assert_eq!(rooms[0].id, room_id);
            assert_eq!(rooms[0].name, "table one");
            assert_eq!(rooms[0].player_count, 1);
            assert_eq!(rooms[0].max_players, 2);
            assert!(!rooms[0].game_started);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_join_broadcasts_and_rejects_third_player() {
    let server = server();
    let mut alice = Client::login(&server, "alice");
    let mut bob = Client::login(&server, "bob");
    let mut carol = Client::login(&server, "carol");
    let room_id = create_room(&server, &mut alice);

    server.handle(bob.id, ClientMessage::JoinRoom(room_id.clone()));
    let seen_by_alice = alice.last_update().unwrap();
    let seen_by_bob = bob.last_update().unwrap();
    assert_eq!(seen_by_alice, seen_by_bob);
    assert_eq!(seen_by_alice.phase, GamePhase::Betting);

    server.handle(carol.id, ClientMessage::JoinRoom(room_id.clone()));
    assert_eq!(errors(&carol.drain()), vec![GameError::RoomFull.to_string()]);
    assert!(alice.drain().is_empty());
    assert_eq!(server.room_snapshot(&room_id).unwrap().players.len(), 2);
}

#[test]
fn test_join_unknown_room() {
    let server = server();
    let mut bob = Client::login(&server, "bob");
    server.handle(bob.id, ClientMessage::JoinRoom("nope00".to_string()));
    assert_eq!(errors(&bob.drain()), vec![GameError::RoomNotFound.to_string()]);
}

#[test]
fn test_place_bet() {
    let server = server();
    let mut alice = Client::login(&server, "alice");
    let mut bob = Client::login(&server, "bob");
    let room_id = create_room(&server, &mut alice);
    server.handle(bob.id, ClientMessage::JoinRoom(room_id.clone()));
    alice.drain();
    bob.drain();

    server.handle(bob.id, ClientMessage::PlaceBet { room_id: room_id.clone(), amount: 5000 });
    let messages = bob.drain();
    assert_eq!(errors(&messages), vec![GameError::InsufficientFunds.to_string()]);
    assert!(messages.contains(&ServerMessage::BetResult {
        success: false,
        message: Some(GameError::InsufficientFunds.to_string()),
    }));
    assert!(alice.drain().is_empty());

    server.handle(bob.id, ClientMessage::PlaceBet { room_id: room_id.clone(), amount: 100 });
    let messages = bob.drain();
    assert!(messages.contains(&ServerMessage::BetResult { success: true, message: None }));
    let room = alice.last_update().unwrap();
    assert_eq!(room.phase, GamePhase::Attacking);
    assert_eq!(room.bet_amount, 100);
    assert_eq!(server.user(&bob.id).unwrap().mafs, 900);
}

#[test]
fn test_wrong_turn_is_reported_to_sender_only() {
    let server = server();
    let (mut alice, mut bob, room_id) = started_game(&server);
    let room = server.room_snapshot(&room_id).unwrap();
    let defender = room.players[room.defender_index].id;
    let card = room.players[room.defender_index].hand[0];

    server.handle(defender, ClientMessage::Attack { room_id: room_id.clone(), card });
    server.handle(defender, ClientMessage::Attack { room_id: room_id.clone(), card });

    let (sender, other) = if defender == alice.id { (&mut alice, &mut bob) } else { (&mut bob, &mut alice) };
    assert_eq!(errors(&sender.drain()), vec![GameError::NotYourTurn.to_string(); 2]);
    assert!(other.drain().is_empty());
    assert_eq!(server.room_snapshot(&room_id).unwrap(), room);
}

#[test]
fn test_attack_take_flow() {
    let server = server();
    let (mut alice, mut bob, room_id) = started_game(&server);
    let room = server.room_snapshot(&room_id).unwrap();
    let attacker = room.players[room.attacker_index].id;
    let defender = room.players[room.defender_index].id;

    server.handle(attacker, ClientMessage::Attack { room_id: room_id.clone(), card: attacker_card(&room) });
    let room = alice.last_update().unwrap();
    assert_eq!(bob.last_update().unwrap(), room);
    assert_eq!(room.phase, GamePhase::Defending);
    assert_eq!(room.table.len(), 1);

    server.handle(defender, ClientMessage::TakeCards(room_id.clone()));
    let room = alice.last_update().unwrap();
    assert!(room.table.is_empty());
    assert_eq!(room.players[room.attacker_index].id, defender);
    assert_eq!(room.phase, GamePhase::Attacking);
    assert_eq!(room.card_count(), 36);
}

#[test]
fn test_pass_is_bito() {
    let server = ordered_server();
    let (mut alice, mut bob, room_id) = started_game(&server);

    // Unshuffled deal: alice holds 6♥..J♥, bob holds Q♥ K♥ A♥ 6♦ 7♦ 8♦, spades are trump.
    let room = server.room_snapshot(&room_id).unwrap();
    assert_eq!(room.trump_card, card(Rank::Ace, Suit::Spades));
    assert_eq!(room.players[room.attacker_index].id, alice.id);

    let six = card(Rank::Six, Suit::Hearts);
    let queen = card(Rank::Queen, Suit::Hearts);
    server.handle(alice.id, ClientMessage::Attack { room_id: room_id.clone(), card: six });
    server.handle(bob.id, ClientMessage::Defend { room_id: room_id.clone(), card: queen });
    assert_eq!(server.room_snapshot(&room_id).unwrap().phase, GamePhase::RoundEnd);

    server.handle(alice.id, ClientMessage::Pass(room_id.clone()));
    let room = alice.last_update().unwrap();
    assert_eq!(bob.last_update().unwrap(), room);
    assert_eq!(room.phase, GamePhase::Attacking);
    assert_eq!(room.players[room.attacker_index].id, bob.id);
    assert_eq!(room.discard, vec![six, queen]);
    assert!(room.table.is_empty());
    // Alice draws first, then bob.
    assert_eq!(room.players[0].hand.last(), Some(&card(Rank::Nine, Suit::Diamonds)));
    assert_eq!(room.players[1].hand.last(), Some(&card(Rank::Ten, Suit::Diamonds)));
    assert_eq!(room.stock.len(), 22);
}

/// Lowest card first, trumps last.
fn lowest(cards: impl Iterator<Item = Card>, trump: Suit) -> Option<Card> {
    cards.min_by_key(|c| (c.is_trump(trump), c.rank.value()))
}

#[test]
fn test_full_game_announces_the_winner_once() {
    let server = ordered_server();
    let (mut alice, mut bob, room_id) = started_game(&server);
    let mut seen_by_alice = Vec::new();
    let mut seen_by_bob = Vec::new();

    // Attack with the lowest card, beat with the lowest card that beats, otherwise take.
    for _ in 0..400 {
        let room = server.room_snapshot(&room_id).unwrap();
        if room.is_finished() {
            break;
        }
        let trump = room.trump_suit();
        let attacker = &room.players[room.attacker_index];
        let defender = &room.players[room.defender_index];
        let (sender, msg) = match room.phase {
            GamePhase::Attacking => {
                let card = lowest(attacker.hand.iter().copied(), trump).unwrap();
                (attacker.id, ClientMessage::Attack { room_id: room_id.clone(), card })
            }
            GamePhase::Defending => {
                let target = room.first_open_attack().unwrap().card;
                match lowest(defender.hand.iter().copied().filter(|c| c.beats(&target, trump)), trump) {
                    Some(card) => (defender.id, ClientMessage::Defend { room_id: room_id.clone(), card }),
                    None => (defender.id, ClientMessage::TakeCards(room_id.clone())),
                }
            }
            GamePhase::RoundEnd => (attacker.id, ClientMessage::Bito(room_id.clone())),
            other => panic!("unexpected phase {other:?}"),
        };
        server.handle(sender, msg);
        seen_by_alice.extend(alice.drain());
        seen_by_bob.extend(bob.drain());
    }

    let room = server.room_snapshot(&room_id).unwrap();
    assert_eq!(room.phase, GamePhase::Finished);
    assert!(room.stock.is_empty());
    assert!(room.players[0].hand.is_empty());
    assert_eq!(room.card_count(), 36);

    let expected = ServerMessage::GameFinished { winner_index: Some(0), winner_name: Some("alice".to_string()) };
    for seen in [&seen_by_alice, &seen_by_bob] {
        assert!(errors(seen).is_empty());
        let finished: Vec<&ServerMessage> =
            seen.iter().filter(|msg| matches!(msg, ServerMessage::GameFinished { .. })).collect();
        assert_eq!(finished, vec![&expected]);
        assert_eq!(seen.last(), Some(&expected));
    }

    // Nothing more is accepted once the game is over.
    server.handle(bob.id, ClientMessage::TakeCards(room_id.clone()));
    assert_eq!(errors(&bob.drain()), vec![GameError::WrongPhase.to_string()]);
    assert!(alice.drain().is_empty());
}

#[test]
fn test_action_on_foreign_room() {
    let server = server();
    let (_alice, _bob, room_id) = started_game(&server);
    let mut carol = Client::login(&server, "carol");
    server.handle(carol.id, ClientMessage::TakeCards(room_id));
    assert_eq!(errors(&carol.drain()), vec![GameError::PlayerNotInRoom.to_string()]);
}

#[test]
fn test_disconnect_leaves_opponent_in_terminal_room() {
    let server = server();
    let (alice, mut bob, room_id) = started_game(&server);

    server.disconnect(alice.id);
    let messages = bob.drain();
    assert!(matches!(messages[0], ServerMessage::PlayerDisconnected { .. }));
    match &messages[1] {
        ServerMessage::GameUpdate(room) => {
            assert_eq!(room.players.len(), 1);
            assert!(room.opponent_left);
            assert_eq!(room.phase, GamePhase::Finished);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(server.room_count(), 1);
    assert_eq!(server.user_count(), 1);

    server.disconnect(bob.id);
    assert_eq!(server.room_count(), 0);
    assert_eq!(server.user_count(), 0);
    assert!(server.room_snapshot(&room_id).is_none());
}

#[test]
fn test_lonely_owner_disconnect_destroys_room() {
    let server = server();
    let mut alice = Client::login(&server, "alice");
    create_room(&server, &mut alice);
    assert_eq!(server.room_count(), 1);
    server.disconnect(alice.id);
    assert_eq!(server.room_count(), 0);
}

#[test]
fn test_one_live_room_per_user() {
    let server = server();
    let (alice, mut bob, room_id) = started_game(&server);

    server.handle(bob.id, ClientMessage::create_room(None));
    assert_eq!(errors(&bob.drain()), vec![GameError::AlreadyInRoom.to_string()]);
    assert_eq!(server.room_count(), 1);

    // Once the opponent is gone the old room is terminal and is discarded on the next move.
    server.disconnect(alice.id);
    bob.drain();
    let new_room = create_room(&server, &mut bob);
    assert_ne!(new_room, room_id);
    assert!(server.room_snapshot(&room_id).is_none());
    assert_eq!(server.room_count(), 1);
    assert_eq!(server.user(&bob.id).unwrap().room_id, Some(new_room));
}

#[test]
fn test_explicit_leave() {
    let server = server();
    let (mut alice, mut bob, room_id) = started_game(&server);
    server.handle(alice.id, ClientMessage::LeaveRoom(room_id.clone()));
    assert!(alice.drain().is_empty());
    assert!(matches!(bob.drain()[0], ServerMessage::PlayerDisconnected { .. }));
    assert!(server.user(&alice.id).is_some());

    server.handle(alice.id, ClientMessage::LeaveRoom(room_id));
    assert_eq!(errors(&alice.drain()), vec![GameError::PlayerNotInRoom.to_string()]);
}

#[test]
fn test_ping() {
    let server = server();
    let mut client = Client::connect(&server);
    server.handle(client.id, ClientMessage::Ping(42));
    assert_eq!(client.drain(), vec![ServerMessage::Pong(42)]);
}

#[test]
fn test_malformed_frame() {
    let server = server();
    let mut client = Client::connect(&server);
    server.reject_malformed(client.id, "expected value at line 1 column 1");
    assert!(matches!(client.drain().as_slice(), [ServerMessage::Error { .. }]));
}

#[test]
fn test_hidden_hands() {
    let server = GameServer::new(GameSettings { hide_opponent_hands: true, ..GameSettings::default() });
    let mut alice = Client::login(&server, "alice");
    let mut bob = Client::login(&server, "bob");
    let room_id = create_room(&server, &mut alice);
    server.handle(bob.id, ClientMessage::JoinRoom(room_id));

    let alice_view = alice.last_update().unwrap();
    let bob_view = bob.last_update().unwrap();
    assert_eq!(alice_view.players[0].hand.len(), 6);
    assert!(alice_view.players[1].hand.is_empty());
    assert_eq!(alice_view.players[1].hidden_cards, Some(6));
    assert!(bob_view.players[0].hand.is_empty());
    assert_eq!(bob_view.players[1].hand.len(), 6);
    assert_eq!(bob_view.hidden_stock, Some(24));
}

#[test]
fn test_disconnect_racing_with_actions() {
    for _ in 0..20 {
        let server = Arc::new(server());
        let (alice, bob, room_id) = started_game(&server);

        std::thread::scope(|scope| {
            let server_a = server.clone();
            let room_a = room_id.clone();
            scope.spawn(move || {
                for _ in 0..50 {
                    let Some(room) = server_a.room_snapshot(&room_a) else { break };
                    if room.players.len() < 2 {
                        break;
                    }
                    let attacker = room.players[room.attacker_index].id;
                    let defender = room.players[room.defender_index].id;
                    if room.phase == GamePhase::Attacking {
                        server_a.handle(attacker, ClientMessage::Attack { room_id: room_a.clone(), card: attacker_card(&room) });
                    } else {
                        server_a.handle(defender, ClientMessage::TakeCards(room_a.clone()));
                    }
                }
            });
            let server_b = server.clone();
            scope.spawn(move || server_b.disconnect(alice.id));
        });

        let room = server.room_snapshot(&room_id).unwrap();
        assert_eq!(room.players.len(), 1);
        assert_eq!(room.players[0].id, bob.id);
        assert!(room.opponent_left);
        server.disconnect(bob.id);
        assert_eq!(server.room_count(), 0);
    }
}
