//! Wire protocol for the quiz WebSocket and the thin per-connection
//! handler the transport layer drives.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use warp::ws::Message;

use crate::error::Result;
use crate::quiz::gateway::ConnectionId;
use crate::quiz::room::ParticipantView;
use crate::quiz::server::QuizServer;
use crate::quiz::store::QuizId;

/// Client-originated events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    CreateRoom { quiz_id: QuizId },

    #[serde(rename_all = "camelCase")]
    JoinQuiz { code: String, display_name: String },

    #[serde(rename_all = "camelCase")]
    StartQuiz { code: String, quiz_id: QuizId },

    #[serde(rename_all = "camelCase")]
    BroadcastQuestion {
        code: String,
        question: String,
        index: usize,
        answer: String,
        quiz_id: QuizId,
    },

    #[serde(rename_all = "camelCase")]
    SelectAnswer {
        code: String,
        answer_index: usize,
        time_left: f64,
    },

    #[serde(rename_all = "camelCase")]
    RevealCorrectAnswer { code: String, answer: String },
}

/// Server-originated events. The correct option id appears only in
/// `CorrectAnswerRevealed`, never alongside the question itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    RoomCreated { code: String },

    RoomNotFound,

    DuplicateUsername,

    #[serde(rename_all = "camelCase")]
    UpdateParticipants { participants: Vec<ParticipantView> },

    #[serde(rename_all = "camelCase")]
    QuizStarted { quiz_id: QuizId },

    #[serde(rename_all = "camelCase")]
    QuestionBroadcasted { question: String, index: usize },

    #[serde(rename_all = "camelCase")]
    AnswerSelected { answer_index: usize },

    #[serde(rename_all = "camelCase")]
    CorrectAnswerRevealed { answer: String },

    HostLeft,
}

/// Drives one WebSocket connection against the quiz server.
pub struct QuizSignalingHandler {
    server: Arc<QuizServer>,
    conn_id: ConnectionId,
}

impl QuizSignalingHandler {
    /// Runs the handshake for a new connection. Failure means the token did
    /// not resolve; the transport closes the socket without an explanation.
    pub async fn connect(
        server: Arc<QuizServer>,
        token: &str,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Result<Self> {
        let conn_id = server.attach(token, sender).await?;
        Ok(Self { server, conn_id })
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Parses and dispatches one inbound text frame. Unparseable frames are
    /// logged and ignored.
    pub async fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => {
                self.server.handle_event(self.conn_id, message).await;
            }
            Err(e) => {
                tracing::error!(
                    conn_id = self.conn_id,
                    error = %e,
                    raw_message = %text,
                    "Failed to parse client message"
                );
            }
        }
    }

    /// Runs the disconnect reconciler for this connection.
    pub async fn cleanup(&self) {
        self.server.detach(self.conn_id).await;
    }
}
