//! Per-room session state: roster, host binding, question context and the
//! lifecycle phases a room moves through.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::quiz::gateway::ConnectionId;
use crate::quiz::store::QuizId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomPhase {
    /// Host created the room, joins are open, no question yet
    Lobby,
    /// A question is being broadcast and answered
    Active,
    /// Answer shown, between questions
    Revealed,
    /// Terminal; remaining connections drain out and the room is destroyed
    Ended,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub conn_id: ConnectionId,
    pub display_name: String,
    pub score: u32,
    pub has_answered: bool,
}

impl Participant {
    pub fn new(conn_id: ConnectionId, display_name: String) -> Self {
        Self {
            conn_id,
            display_name,
            score: 0,
            has_answered: false,
        }
    }
}

/// Roster entry as broadcast to clients. Scores are public; nothing here
/// reveals correctness of an individual answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub display_name: String,
    pub score: u32,
    pub has_answered: bool,
}

/// The live question. Replaced wholesale each time the host broadcasts a
/// new question; the correct option never leaves the server before reveal.
#[derive(Debug, Clone)]
pub struct QuestionContext {
    pub question: String,
    pub index: usize,
    pub correct_answer: String,
    pub open: bool,
    pub answered: HashSet<ConnectionId>,
}

#[derive(Debug)]
pub struct RoomState {
    pub quiz_id: QuizId,
    pub host_conn: ConnectionId,
    pub phase: RoomPhase,
    pub quiz_started: bool,
    pub roster: HashMap<ConnectionId, Participant>,
    pub question: Option<QuestionContext>,
}

pub struct Room {
    pub code: String,
    /// Guards the duplicate-name check at join time and every other state
    /// mutation. Scoped per room: joins to different rooms never contend.
    state: Mutex<RoomState>,
}

impl Room {
    /// Creates a room in `Lobby` with the host registered as its first
    /// participant at score 0.
    pub fn new(code: String, quiz_id: QuizId, host_conn: ConnectionId, host_name: String) -> Self {
        let mut roster = HashMap::new();
        roster.insert(host_conn, Participant::new(host_conn, host_name));

        Self {
            code,
            state: Mutex::new(RoomState {
                quiz_id,
                host_conn,
                phase: RoomPhase::Lobby,
                quiz_started: false,
                roster,
                question: None,
            }),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().await
    }
}

impl RoomState {
    /// Display-name uniqueness is case-insensitive: "Bob" and "bob" are the
    /// same name. Original casing is preserved for display.
    pub fn name_taken(&self, name: &str) -> bool {
        let folded = name.to_lowercase();
        self.roster
            .values()
            .any(|p| p.display_name.to_lowercase() == folded)
    }

    pub fn host_present(&self) -> bool {
        self.roster.contains_key(&self.host_conn)
    }

    /// Installs a fresh question context, clears every per-question answered
    /// marker and opens the answer window.
    pub fn begin_question(&mut self, question: String, index: usize, correct_answer: String) {
        for participant in self.roster.values_mut() {
            participant.has_answered = false;
        }
        self.question = Some(QuestionContext {
            question,
            index,
            correct_answer,
            open: true,
            answered: HashSet::new(),
        });
        self.phase = RoomPhase::Active;
    }

    /// Marks a connection as having answered the current question. Returns
    /// false without mutating anything when the window is closed or the
    /// connection already answered, which is what makes duplicate and racing
    /// submissions idempotent.
    pub fn record_answer(&mut self, conn_id: ConnectionId) -> bool {
        let Some(question) = self.question.as_mut() else {
            return false;
        };
        if !question.open || !question.answered.insert(conn_id) {
            return false;
        }
        if let Some(participant) = self.roster.get_mut(&conn_id) {
            participant.has_answered = true;
        }
        true
    }

    /// Closes the answer window and returns the correct option id for the
    /// reveal broadcast.
    pub fn close_question(&mut self) -> Option<String> {
        let question = self.question.as_mut()?;
        question.open = false;
        self.phase = RoomPhase::Revealed;
        Some(question.correct_answer.clone())
    }

    pub fn roster_view(&self) -> Vec<ParticipantView> {
        let mut view: Vec<ParticipantView> = self
            .roster
            .values()
            .map(|p| ParticipantView {
                display_name: p.display_name.clone(),
                score: p.score,
                has_answered: p.has_answered,
            })
            .collect();
        // Deterministic order for clients and tests
        view.sort_by(|a, b| b.score.cmp(&a.score).then(a.display_name.cmp(&b.display_name)));
        view
    }
}
