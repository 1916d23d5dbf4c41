// Quiz Session Server CLI Validation Tool
// Exercises the server through automated scenarios and manual commands

use clap::{Parser, Subcommand};
use colored::*;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Parser)]
#[command(name = "quiz-cli")]
#[command(about = "Quiz Session Server CLI Validation Tool", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8080)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Get server configuration
    Config,

    /// Test WebSocket connection with a session token
    Connect {
        /// Session token
        #[arg(short, long)]
        token: String,
    },

    /// Create a room as host
    CreateRoom {
        /// Host session token
        #[arg(short, long)]
        token: String,

        /// Quiz id the host owns
        #[arg(short, long)]
        quiz_id: u64,

        /// Keep connection alive (press Ctrl+C to exit)
        #[arg(short, long)]
        keep_alive: bool,
    },

    /// Join a room as participant
    JoinRoom {
        /// Participant session token
        #[arg(short, long)]
        token: String,

        /// Room code to join
        #[arg(short, long)]
        code: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Keep connection alive (press Ctrl+C to exit)
        #[arg(short = 'k', long)]
        keep_alive: bool,
    },

    /// Run the scripted end-to-end validation scenario
    Validate {
        /// Host session token (must own the quiz)
        #[arg(long, default_value = "alice-token")]
        host_token: String,

        /// Participant session token
        #[arg(long, default_value = "bob-token")]
        player_token: String,

        /// Quiz id owned by the host
        #[arg(short, long, default_value = "5")]
        quiz_id: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => {
            check_health(&cli.server).await;
        }
        Commands::Config => {
            check_config(&cli.server).await;
        }
        Commands::Connect { token } => {
            test_connection(&cli.server, token).await;
        }
        Commands::CreateRoom {
            token,
            quiz_id,
            keep_alive,
        } => {
            create_room(&cli.server, token, *quiz_id, *keep_alive).await;
        }
        Commands::JoinRoom {
            token,
            code,
            name,
            keep_alive,
        } => {
            join_room(&cli.server, token, code, name, *keep_alive).await;
        }
        Commands::Validate {
            host_token,
            player_token,
            quiz_id,
        } => {
            run_validation(&cli.server, host_token, player_token, *quiz_id).await;
        }
    }
}

fn ws_url(server: &str, token: &str) -> String {
    format!("ws://{}/quiz?token={}", server, urlencoding::encode(token))
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/quiz/health", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<serde_json::Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                    println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn check_config(server: &str) {
    println!("{}", "Fetching server configuration...".cyan());

    let url = format!("http://{}/quiz/config", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => match resp.json::<serde_json::Value>().await {
            Ok(body) => {
                println!("{} Configuration received", "✓".green());
                println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            }
            Err(e) => println!("{} Invalid config response: {}", "✗".red(), e),
        },
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
        }
    }
}

async fn test_connection(server: &str, token: &str) {
    println!("{}", "Testing WebSocket connection...".cyan());

    match connect_async(ws_url(server, token)).await {
        Ok((ws_stream, _)) => {
            println!("{} WebSocket connection established", "✓".green());
            drop(ws_stream);
        }
        Err(e) => {
            println!("{} WebSocket connection failed: {}", "✗".red(), e);
        }
    }
}

async fn send(write: &mut WsWrite, payload: serde_json::Value) -> bool {
    if let Err(e) = write.send(Message::Text(payload.to_string())).await {
        println!("{} Failed to send message: {}", "✗".red(), e);
        return false;
    }
    true
}

/// Waits up to `secs` for the next text frame and parses it.
async fn next_event(read: &mut WsRead, secs: u64) -> Option<serde_json::Value> {
    loop {
        match timeout(Duration::from_secs(secs), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return serde_json::from_str(&text).ok();
            }
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Err(_) => return None,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                println!("{} WebSocket error: {}", "✗".red(), e);
                return None;
            }
        }
    }
}

/// Waits for an event with the given type tag, skipping unrelated events.
async fn expect_event(read: &mut WsRead, event_type: &str, secs: u64) -> Option<serde_json::Value> {
    loop {
        let event = next_event(read, secs).await?;
        if event["type"] == event_type {
            return Some(event);
        }
        println!("  (skipping {} event)", event["type"].as_str().unwrap_or("?"));
    }
}

async fn create_room(server: &str, token: &str, quiz_id: u64, keep_alive: bool) {
    println!("{}", format!("Creating room for quiz {}...", quiz_id).cyan());

    let Ok((ws_stream, _)) = connect_async(ws_url(server, token)).await else {
        println!("{} Cannot connect to server", "✗".red());
        return;
    };
    let (mut write, mut read) = ws_stream.split();

    if !send(&mut write, json!({"type": "createRoom", "quizId": quiz_id})).await {
        return;
    }

    match expect_event(&mut read, "roomCreated", 3).await {
        Some(event) => {
            let code = event["code"].as_str().unwrap_or("?");
            println!("{} Room created: {}", "✓".green(), code.bold());
        }
        None => {
            println!("{} No roomCreated response (is the token authorized?)", "✗".red());
            return;
        }
    }

    if keep_alive {
        println!("{}", "Listening for room events (Ctrl+C to exit)...".cyan());
        while let Some(event) = next_event(&mut read, 3600).await {
            println!("  {}", event);
        }
    }
}

async fn join_room(server: &str, token: &str, code: &str, name: &str, keep_alive: bool) {
    println!("{}", format!("Joining room {} as {}...", code, name).cyan());

    let Ok((ws_stream, _)) = connect_async(ws_url(server, token)).await else {
        println!("{} Cannot connect to server", "✗".red());
        return;
    };
    let (mut write, mut read) = ws_stream.split();

    if !send(
        &mut write,
        json!({"type": "joinQuiz", "code": code, "displayName": name}),
    )
    .await
    {
        return;
    }

    match next_event(&mut read, 3).await {
        Some(event) if event["type"] == "updateParticipants" => {
            let count = event["participants"].as_array().map(|a| a.len()).unwrap_or(0);
            println!("{} Joined, {} participant(s) in room", "✓".green(), count);
        }
        Some(event) if event["type"] == "roomNotFound" => {
            println!("{} Room {} not found", "✗".red(), code);
            return;
        }
        Some(event) if event["type"] == "duplicateUsername" => {
            println!("{} Display name {} already taken", "✗".red(), name);
            return;
        }
        other => {
            println!("{} Unexpected response: {:?}", "✗".red(), other);
            return;
        }
    }

    if keep_alive {
        println!("{}", "Listening for room events (Ctrl+C to exit)...".cyan());
        while let Some(event) = next_event(&mut read, 3600).await {
            println!("  {}", event);
        }
    }
}

/// Full host-and-player walkthrough: create, join, start, one scored
/// question, idempotent resubmission, reveal.
async fn run_validation(server: &str, host_token: &str, player_token: &str, quiz_id: u64) {
    println!("{}", "Running end-to-end validation scenario".cyan().bold());
    let mut passed = 0u32;
    let mut failed = 0u32;

    let Ok((host_stream, _)) = connect_async(ws_url(server, host_token)).await else {
        println!("{} Cannot connect host socket", "✗".red());
        return;
    };
    let (mut host_write, mut host_read) = host_stream.split();

    // 1. Create room
    send(&mut host_write, json!({"type": "createRoom", "quizId": quiz_id})).await;
    let code = match expect_event(&mut host_read, "roomCreated", 3).await {
        Some(event) => {
            let code = event["code"].as_str().unwrap_or_default().to_string();
            println!("{} Room created: {}", "✓".green(), code.bold());
            passed += 1;
            code
        }
        None => {
            println!("{} Room creation failed", "✗".red());
            return;
        }
    };

    // 2. Player joins
    let Ok((player_stream, _)) = connect_async(ws_url(server, player_token)).await else {
        println!("{} Cannot connect player socket", "✗".red());
        return;
    };
    let (mut player_write, mut player_read) = player_stream.split();

    send(
        &mut player_write,
        json!({"type": "joinQuiz", "code": code, "displayName": "validator"}),
    )
    .await;
    match expect_event(&mut player_read, "updateParticipants", 3).await {
        Some(event) if event["participants"].as_array().map(|a| a.len()) == Some(2) => {
            println!("{} Player joined, roster has 2 entries", "✓".green());
            passed += 1;
        }
        _ => {
            println!("{} Join did not produce the expected roster", "✗".red());
            failed += 1;
        }
    }

    // 3. Start quiz
    send(
        &mut host_write,
        json!({"type": "startQuiz", "code": code, "quizId": quiz_id}),
    )
    .await;
    if expect_event(&mut player_read, "quizStarted", 3).await.is_some() {
        println!("{} Quiz started", "✓".green());
        passed += 1;
    } else {
        println!("{} quizStarted not received", "✗".red());
        failed += 1;
    }

    // 4. Broadcast a question; the answer must not reach the player
    send(
        &mut host_write,
        json!({
            "type": "broadcastQuestion",
            "code": code,
            "question": "2+2?",
            "index": 0,
            "answer": "option2",
            "quizId": quiz_id
        }),
    )
    .await;
    match expect_event(&mut player_read, "questionBroadcasted", 3).await {
        Some(event) if event.get("answer").is_none() => {
            println!("{} Question delivered with answer withheld", "✓".green());
            passed += 1;
        }
        _ => {
            println!("{} questionBroadcasted missing or leaking the answer", "✗".red());
            failed += 1;
        }
    }

    // 5. Correct answer with half the window left scores 150
    send(
        &mut player_write,
        json!({"type": "selectAnswer", "code": code, "answerIndex": 1, "timeLeft": 0.5}),
    )
    .await;
    match expect_event(&mut player_read, "updateParticipants", 3).await {
        Some(event) => {
            let score = event["participants"]
                .as_array()
                .and_then(|ps| ps.iter().find(|p| p["displayName"] == "validator"))
                .and_then(|p| p["score"].as_u64());
            if score == Some(150) {
                println!("{} Answer scored 150", "✓".green());
                passed += 1;
            } else {
                println!("{} Expected score 150, got {:?}", "✗".red(), score);
                failed += 1;
            }
        }
        None => {
            println!("{} No roster update after answer", "✗".red());
            failed += 1;
        }
    }

    // 6. Duplicate submission must be silent
    send(
        &mut player_write,
        json!({"type": "selectAnswer", "code": code, "answerIndex": 1, "timeLeft": 0.5}),
    )
    .await;
    if next_event(&mut player_read, 1).await.is_none() {
        println!("{} Duplicate answer ignored", "✓".green());
        passed += 1;
    } else {
        println!("{} Duplicate answer was not ignored", "✗".red());
        failed += 1;
    }

    // 7. Reveal
    send(
        &mut host_write,
        json!({"type": "revealCorrectAnswer", "code": code, "answer": "option2"}),
    )
    .await;
    match expect_event(&mut player_read, "correctAnswerRevealed", 3).await {
        Some(event) if event["answer"] == "option2" => {
            println!("{} Correct answer revealed", "✓".green());
            passed += 1;
        }
        _ => {
            println!("{} Reveal missing or wrong", "✗".red());
            failed += 1;
        }
    }

    println!();
    if failed == 0 {
        println!("{}", format!("All {} checks passed", passed).green().bold());
    } else {
        println!(
            "{}",
            format!("{} passed, {} failed", passed, failed).red().bold()
        );
    }
}
