use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use durak_core::{Card, ClientMessage, ConnectionId, GamePhase, Room, RoomId, ServerMessage, TableRole};

const DEFAULT_URL: &str = "ws://127.0.0.1:5000/ws";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let raw_url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    let url = Url::parse(&raw_url)?;

    println!("Connecting to {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    println!("Connected.");

    let (mut write, mut read) = ws_stream.split();

    // The reader learns which room we sit in; the prompt loop needs it to address actions.
    let (room_tx, room_rx) = watch::channel::<Option<RoomId>>(None);

    tokio::spawn(async move {
        let mut me: Option<ConnectionId> = None;
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(server_msg) => {
                        if let ServerMessage::LoginSuccess(user) = &server_msg {
                            me = Some(user.id);
                        }
                        match &server_msg {
                            ServerMessage::RoomCreated { room_id } => {
                                room_tx.send_replace(Some(room_id.clone()));
                            }
                            ServerMessage::GameUpdate(room) => {
                                room_tx.send_replace(Some(room.id.clone()));
                            }
                            _ => {}
                        }
                        println!();
                        print_message(&server_msg, me.as_ref());
                        print!("> ");
                        let _ = std::io::stdout().flush();
                    }
                    Err(e) => eprintln!("Could not decode server message: {}", e),
                },
                Ok(Message::Close(_)) => {
                    println!("\nServer closed the connection.");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Connection error: {}", e);
                    break;
                }
            }
        }
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    print_help();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else {
            break;
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        let current_room = room_rx.borrow().clone();

        let client_msg = match parse_command(&parts, current_room) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                println!("Disconnecting...");
                break;
            }
            Err(usage) => {
                if !usage.is_empty() {
                    println!("{}", usage);
                }
                continue;
            }
        };

        let payload = serde_json::to_string(&client_msg)?;
        write.send(Message::Text(payload.into())).await?;
    }

    let _ = write.send(Message::Close(None)).await;
    Ok(())
}

fn print_help() {
    println!("--- Durak client ---");
    println!("Commands:");
    println!("  login <name> [mafs]       - log in");
    println!("  create [room name]        - create a room");
    println!("  join <room id>            - join a room");
    println!("  rooms                     - list open rooms");
    println!("  bet <amount>              - place a bet");
    println!("  continue                  - skip betting");
    println!("  attack <card>             - attack, e.g. attack 10h");
    println!("  add <card>                - throw in another card of a rank on the table");
    println!("  defend <card>             - beat the oldest open attack");
    println!("  take                      - pick up the table");
    println!("  bito                      - close a fully defended round");
    println!("  leave                     - leave the current room");
    println!("  ping                      - measure round trip");
    println!("  exit                      - quit");
    println!("Cards are rank then suit letter: 6h 10d jc qs ka, or 7♣.");
}

/// `Ok(None)` means quit; `Err` carries a usage line to show (empty for a blank line).
fn parse_command(parts: &[&str], room: Option<RoomId>) -> Result<Option<ClientMessage>, String> {
    let Some(&command) = parts.first() else {
        return Err(String::new());
    };
    let in_room = || room.clone().ok_or_else(|| "Not in a room.".to_string());
    let card_arg = || -> Result<Card, String> {
        let raw = parts.get(1).ok_or_else(|| format!("Usage: {} <card>", command))?;
        raw.parse::<Card>().map_err(|e| e.to_string())
    };

    let msg = match command {
        "login" => {
            let name = parts.get(1).ok_or("Usage: login <name> [mafs]")?.to_string();
            let mafs = match parts.get(2) {
                Some(raw) => Some(raw.parse::<u32>().map_err(|_| format!("Invalid amount: {}", raw))?),
                None => None,
            };
            ClientMessage::UserLogin { name, mafs }
        }
        "create" => {
            let name = parts[1..].join(" ");
            ClientMessage::create_room((!name.is_empty()).then_some(name))
        }
        "join" => ClientMessage::JoinRoom(parts.get(1).ok_or("Usage: join <room id>")?.to_string()),
        "rooms" => ClientMessage::GetRooms,
        "bet" => {
            let raw = parts.get(1).ok_or("Usage: bet <amount>")?;
            let amount = raw.parse::<u32>().map_err(|_| format!("Invalid amount: {}", raw))?;
            ClientMessage::PlaceBet { room_id: in_room()?, amount }
        }
        "continue" => ClientMessage::ForceContinue { room_id: in_room()? },
        "attack" => ClientMessage::Attack { room_id: in_room()?, card: card_arg()? },
        "add" => ClientMessage::AddAttack { room_id: in_room()?, card: card_arg()? },
        "defend" => ClientMessage::Defend { room_id: in_room()?, card: card_arg()? },
        "take" => ClientMessage::TakeCards(in_room()?),
        "bito" => ClientMessage::Bito(in_room()?),
        "leave" => ClientMessage::LeaveRoom(in_room()?),
        "ping" => {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
            ClientMessage::Ping(now)
        }
        "exit" | "quit" => return Ok(None),
        "help" => {
            print_help();
            return Err(String::new());
        }
        other => return Err(format!("Unknown command: {}", other)),
    };
    Ok(Some(msg))
}

fn print_message(msg: &ServerMessage, me: Option<&ConnectionId>) {
    match msg {
        ServerMessage::LoginSuccess(user) => println!("Logged in as {} with {} mafs", user.name, user.mafs),
        ServerMessage::LoginError { message } => println!("Login failed: {}", message),
        ServerMessage::RoomCreated { room_id } => println!("Room {} created. Waiting for an opponent.", room_id),
        ServerMessage::RoomsList(rooms) if rooms.is_empty() => println!("No open rooms."),
        ServerMessage::RoomsList(rooms) => {
            for room in rooms {
                let state = if room.game_started { "playing" } else { "open" };
                println!("  {}  {:<20} {}/{}  {}", room.id, room.name, room.player_count, room.max_players, state);
            }
        }
        ServerMessage::GameUpdate(room) => print_room(room, me),
        ServerMessage::BetResult { success: true, .. } => println!("Bet accepted."),
        ServerMessage::BetResult { success: false, message } => {
            println!("Bet rejected: {}", message.as_deref().unwrap_or("unknown reason"))
        }
        ServerMessage::PlayerDisconnected { message } => println!("{}", message),
        ServerMessage::GameFinished { winner_name: Some(name), .. } => println!("Game over. {} wins!", name),
        ServerMessage::GameFinished { winner_name: None, .. } => println!("Game over. Draw."),
        ServerMessage::Pong(sent) => {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
            println!("pong ({} ms)", now.saturating_sub(*sent));
        }
        ServerMessage::Error { message } => println!("Error: {}", message),
    }
}

fn print_room(room: &Room, me: Option<&ConnectionId>) {
    let stock = room.hidden_stock.unwrap_or(room.stock.len());
    println!(
        "[{}] {} | phase {:?} | trump {} | stock {} | bet {}",
        room.id, room.name, room.phase, room.trump_card, stock, room.bet_amount
    );
    for (idx, player) in room.players.iter().enumerate() {
        let role = if room.phase == GamePhase::Waiting || room.phase == GamePhase::Finished {
            ""
        } else if idx == room.attacker_index {
            " (attacker)"
        } else if idx == room.defender_index {
            " (defender)"
        } else {
            ""
        };
        let marker = if Some(&player.id) == me { "*" } else { " " };
        let hand = match player.hidden_cards {
            Some(count) => format!("{} cards", count),
            None => join_cards(&player.hand),
        };
        println!(" {}{}{} [{} mafs]: {}", marker, player.name, role, player.mafs, hand);
    }
    if !room.table.is_empty() {
        let table: Vec<String> = room
            .table
            .iter()
            .map(|entry| match entry.role {
                TableRole::Attack => format!("{}", entry.card),
                TableRole::Defense => format!("/{}", entry.card),
            })
            .collect();
        println!("  table: {}", table.join(" "));
    }
    if room.opponent_left {
        println!("  Your opponent left the room.");
    }
}

fn join_cards(cards: &[Card]) -> String {
    cards.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
}
