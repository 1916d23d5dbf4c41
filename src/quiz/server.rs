use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use warp::ws::Message;

use crate::error::{QuizError, Result};
use crate::quiz::gateway::{ConnectionGateway, ConnectionId};
use crate::quiz::registry::RoomRegistry;
use crate::quiz::room::{Participant, Room, RoomPhase};
use crate::quiz::scoring;
use crate::quiz::signaling::{ClientMessage, ServerMessage};
use crate::quiz::store::{Identity, QuizId, QuizStore, SessionAuth, UserDirectory};

/// Coordinates every live quiz room in the process.
///
/// The registry lock guards only the code namespace and each room guards its
/// own state, so activity in one room never blocks another. Events from a
/// single connection arrive in order (one read loop per socket); ordering
/// across connections is first-committer-wins under the per-room lock.
pub struct QuizServer {
    gateway: ConnectionGateway,
    registry: RoomRegistry,
    quizzes: Arc<dyn QuizStore>,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>,
}

impl QuizServer {
    pub fn new(
        auth: Arc<dyn SessionAuth>,
        users: Arc<dyn UserDirectory>,
        quizzes: Arc<dyn QuizStore>,
    ) -> Self {
        Self {
            gateway: ConnectionGateway::new(auth, users),
            registry: RoomRegistry::new(),
            quizzes,
            rooms: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Handshake for a new connection: the token must resolve to a live
    /// identity before the server will keep the socket.
    pub async fn attach(
        &self,
        token: &str,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Result<ConnectionId> {
        let conn_id = self.gateway.attach(token).await?;
        self.connections.write().await.insert(conn_id, sender);
        Ok(conn_id)
    }

    /// Entry point for every client-originated event. The identity gate
    /// runs first; a connection whose session no longer resolves is closed
    /// without any explanation on the wire.
    pub async fn handle_event(&self, conn_id: ConnectionId, message: ClientMessage) {
        let identity = match self.gateway.authorize(conn_id).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(conn_id, error = %e, "Identity gate rejected event, closing connection");
                self.terminate(conn_id).await;
                return;
            }
        };

        match message {
            ClientMessage::CreateRoom { quiz_id } => {
                if let Err(e) = self.handle_create_room(conn_id, &identity, quiz_id).await {
                    tracing::debug!(conn_id, error = %e, "createRoom dropped");
                }
            }
            ClientMessage::JoinQuiz { code, display_name } => {
                if let Err(e) = self.handle_join(conn_id, &code, display_name).await {
                    match e {
                        QuizError::RoomNotFound(_) => {
                            self.send_to(conn_id, &ServerMessage::RoomNotFound).await;
                        }
                        QuizError::DuplicateName(_) => {
                            self.send_to(conn_id, &ServerMessage::DuplicateUsername).await;
                        }
                        other => {
                            tracing::debug!(conn_id, error = %other, "joinQuiz dropped");
                        }
                    }
                }
            }
            ClientMessage::StartQuiz { code, quiz_id } => {
                if let Err(e) = self.handle_start(conn_id, &identity, &code, quiz_id).await {
                    tracing::debug!(conn_id, error = %e, "startQuiz dropped");
                }
            }
            ClientMessage::BroadcastQuestion {
                code,
                question,
                index,
                answer,
                quiz_id,
            } => {
                if let Err(e) = self
                    .handle_broadcast_question(conn_id, &identity, &code, question, index, answer, quiz_id)
                    .await
                {
                    tracing::debug!(conn_id, error = %e, "broadcastQuestion dropped");
                }
            }
            ClientMessage::SelectAnswer {
                code,
                answer_index,
                time_left,
            } => {
                self.handle_select_answer(conn_id, &code, answer_index, time_left)
                    .await;
            }
            ClientMessage::RevealCorrectAnswer { code, answer } => {
                if let Err(e) = self.handle_reveal(conn_id, &identity, &code, answer).await {
                    tracing::debug!(conn_id, error = %e, "revealCorrectAnswer dropped");
                }
            }
        }
    }

    async fn handle_create_room(
        &self,
        conn_id: ConnectionId,
        identity: &Identity,
        quiz_id: QuizId,
    ) -> Result<()> {
        if self.gateway.room_of(conn_id).await.is_some() {
            return Err(QuizError::AlreadyInRoom(conn_id));
        }
        self.verify_ownership(identity, quiz_id).await?;

        let code = self.registry.allocate().await;
        let room = Arc::new(Room::new(
            code.clone(),
            quiz_id,
            conn_id,
            identity.username.clone(),
        ));

        let roster = room.lock().await.roster_view();
        self.rooms.write().await.insert(code.clone(), room);
        self.gateway.bind_room(conn_id, &code, true).await;

        tracing::info!(
            code = %code,
            quiz_id,
            host = %identity.username,
            "Room created"
        );

        self.send_to(conn_id, &ServerMessage::RoomCreated { code }).await;
        self.send_to(conn_id, &ServerMessage::UpdateParticipants { participants: roster })
            .await;
        Ok(())
    }

    async fn handle_join(
        &self,
        conn_id: ConnectionId,
        code: &str,
        display_name: String,
    ) -> Result<()> {
        if self.gateway.room_of(conn_id).await.is_some() {
            return Err(QuizError::AlreadyInRoom(conn_id));
        }
        let room = self.lookup_room(code).await?;

        let (recipients, roster) = {
            let mut state = room.lock().await;
            // A room in its terminal phase is gone as far as joiners are
            // concerned, even while stragglers are still draining out.
            if state.phase == RoomPhase::Ended {
                return Err(QuizError::RoomNotFound(code.to_string()));
            }
            if state.name_taken(&display_name) {
                return Err(QuizError::DuplicateName(display_name));
            }
            state
                .roster
                .insert(conn_id, Participant::new(conn_id, display_name.clone()));
            (room_recipients(&state.roster), state.roster_view())
        };

        self.gateway.bind_room(conn_id, code, false).await;
        tracing::info!(code = %code, conn_id, display_name = %display_name, "Participant joined");

        self.broadcast_to(
            &recipients,
            &ServerMessage::UpdateParticipants { participants: roster },
        )
        .await;
        Ok(())
    }

    async fn handle_start(
        &self,
        conn_id: ConnectionId,
        identity: &Identity,
        code: &str,
        quiz_id: QuizId,
    ) -> Result<()> {
        let room = self.host_room(conn_id, code).await?;

        {
            let state = room.lock().await;
            if state.host_conn != conn_id {
                return Err(QuizError::Unauthorized(conn_id));
            }
            if state.quiz_id != quiz_id {
                return Err(QuizError::QuizMismatch(quiz_id));
            }
            if state.quiz_started || state.phase != RoomPhase::Lobby {
                tracing::debug!(code = %code, "startQuiz ignored, quiz already started");
                return Ok(());
            }
        }

        // Ownership is re-verified against the quiz store on every
        // state-changing host action, never cached from connect time.
        self.verify_ownership(identity, quiz_id).await?;

        let recipients = {
            let mut state = room.lock().await;
            state.quiz_started = true;
            room_recipients(&state.roster)
        };

        tracing::info!(code = %code, quiz_id, "Quiz started");
        self.broadcast_to(&recipients, &ServerMessage::QuizStarted { quiz_id })
            .await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_broadcast_question(
        &self,
        conn_id: ConnectionId,
        identity: &Identity,
        code: &str,
        question: String,
        index: usize,
        answer: String,
        quiz_id: QuizId,
    ) -> Result<()> {
        let room = self.host_room(conn_id, code).await?;

        {
            let state = room.lock().await;
            if state.host_conn != conn_id {
                return Err(QuizError::Unauthorized(conn_id));
            }
            if state.quiz_id != quiz_id {
                return Err(QuizError::QuizMismatch(quiz_id));
            }
            if !state.quiz_started
                || !matches!(state.phase, RoomPhase::Lobby | RoomPhase::Revealed)
            {
                tracing::debug!(code = %code, phase = ?state.phase, "broadcastQuestion ignored in current phase");
                return Ok(());
            }
        }

        self.verify_ownership(identity, quiz_id).await?;

        let recipients = {
            let mut state = room.lock().await;
            // The correct answer stays in the question context; only the
            // question text and index go out to the room.
            state.begin_question(question.clone(), index, answer);
            room_recipients(&state.roster)
        };

        tracing::info!(code = %code, index, "Question broadcast");
        self.broadcast_to(
            &recipients,
            &ServerMessage::QuestionBroadcasted { question, index },
        )
        .await;
        Ok(())
    }

    /// Answer submissions carry no error surface at all: anything stale,
    /// duplicate or out of place is ignored without a reply.
    async fn handle_select_answer(
        &self,
        conn_id: ConnectionId,
        code: &str,
        answer_index: usize,
        time_left: f64,
    ) {
        let Ok(room) = self.lookup_room(code).await else {
            tracing::debug!(conn_id, code = %code, "selectAnswer for unknown room ignored");
            return;
        };

        let broadcast = {
            let mut state = room.lock().await;
            if state.phase != RoomPhase::Active || !state.host_present() {
                tracing::debug!(conn_id, code = %code, "selectAnswer outside answer window ignored");
                None
            } else if !state.roster.contains_key(&conn_id) {
                tracing::debug!(conn_id, code = %code, "selectAnswer from non-member ignored");
                None
            } else if !state.record_answer(conn_id) {
                tracing::debug!(conn_id, code = %code, "duplicate selectAnswer ignored");
                None
            } else {
                let correct_answer = state
                    .question
                    .as_ref()
                    .map(|q| q.correct_answer.clone())
                    .unwrap_or_default();
                let delta = scoring::score_delta(answer_index, &correct_answer, time_left);
                if let Some(participant) = state.roster.get_mut(&conn_id) {
                    participant.score += delta;
                }
                tracing::debug!(conn_id, code = %code, answer_index, delta, "Answer accepted");
                Some((room_recipients(&state.roster), state.roster_view()))
            }
        };

        if let Some((recipients, roster)) = broadcast {
            // The chosen option is public for the tally; correctness is not.
            self.broadcast_to(&recipients, &ServerMessage::AnswerSelected { answer_index })
                .await;
            self.broadcast_to(
                &recipients,
                &ServerMessage::UpdateParticipants { participants: roster },
            )
            .await;
        }
    }

    async fn handle_reveal(
        &self,
        conn_id: ConnectionId,
        identity: &Identity,
        code: &str,
        claimed_answer: String,
    ) -> Result<()> {
        let room = self.host_room(conn_id, code).await?;

        let quiz_id = {
            let state = room.lock().await;
            if state.host_conn != conn_id {
                return Err(QuizError::Unauthorized(conn_id));
            }
            if state.phase != RoomPhase::Active {
                tracing::debug!(code = %code, phase = ?state.phase, "revealCorrectAnswer ignored in current phase");
                return Ok(());
            }
            state.quiz_id
        };

        self.verify_ownership(identity, quiz_id).await?;

        let (recipients, answer) = {
            let mut state = room.lock().await;
            let Some(answer) = state.close_question() else {
                return Ok(());
            };
            (room_recipients(&state.roster), answer)
        };

        // The stored option is authoritative; the field on the wire is only
        // accepted for compatibility with the observed client.
        if claimed_answer != answer {
            tracing::debug!(code = %code, claimed = %claimed_answer, "Client-supplied answer differs from stored context");
        }

        tracing::info!(code = %code, "Answer revealed");
        self.broadcast_to(&recipients, &ServerMessage::CorrectAnswerRevealed { answer })
            .await;
        Ok(())
    }

    /// Disconnect reconciler. Normal leaves and abrupt drops both land
    /// here; the same mutations apply either way.
    pub async fn detach(&self, conn_id: ConnectionId) {
        self.connections.write().await.remove(&conn_id);

        let Some(record) = self.gateway.detach(conn_id).await else {
            return;
        };
        let Some(code) = record.room_code else {
            tracing::info!(conn_id, "Connection detached");
            return;
        };
        let Some(room) = self.rooms.read().await.get(&code).cloned() else {
            return;
        };

        let was_host = {
            let state = room.lock().await;
            state.host_conn == conn_id
        };

        if was_host {
            // Defensive re-check against stale state before announcing the
            // teardown; a mismatch is logged but cannot keep the room alive.
            let quiz_id = { room.lock().await.quiz_id };
            let verified = self
                .verify_ownership(&record.identity, quiz_id)
                .await
                .is_ok();
            if !verified {
                tracing::warn!(code = %code, conn_id, "Host ownership no longer verifiable at disconnect");
            }

            let (recipients, empty) = {
                let mut state = room.lock().await;
                state.roster.remove(&conn_id);
                state.phase = RoomPhase::Ended;
                if let Some(question) = state.question.as_mut() {
                    question.open = false;
                }
                (room_recipients(&state.roster), state.roster.is_empty())
            };

            tracing::info!(code = %code, conn_id, "Host left, room ended");
            if verified {
                self.broadcast_to(&recipients, &ServerMessage::HostLeft).await;
            }
            if empty {
                self.discard_room(&code).await;
            }
        } else {
            let (recipients, roster, empty) = {
                let mut state = room.lock().await;
                state.roster.remove(&conn_id);
                if let Some(question) = state.question.as_mut() {
                    question.answered.remove(&conn_id);
                }
                (
                    room_recipients(&state.roster),
                    state.roster_view(),
                    state.roster.is_empty(),
                )
            };

            tracing::info!(code = %code, conn_id, "Participant left");
            if empty {
                // Mark terminal before dropping the map entry so a racing
                // join that already holds the Arc sees a dead room.
                room.lock().await.phase = RoomPhase::Ended;
                self.discard_room(&code).await;
            } else {
                self.broadcast_to(
                    &recipients,
                    &ServerMessage::UpdateParticipants { participants: roster },
                )
                .await;
            }
        }
    }

    /// Closes a connection that failed the identity gate.
    async fn terminate(&self, conn_id: ConnectionId) {
        if let Some(sender) = self.connections.read().await.get(&conn_id) {
            let _ = sender.send(Message::close());
        }
        self.detach(conn_id).await;
    }

    async fn discard_room(&self, code: &str) {
        self.rooms.write().await.remove(code);
        self.registry.release(code).await;
        tracing::info!(code = %code, "Room discarded, code released");
    }

    async fn lookup_room(&self, code: &str) -> Result<Arc<Room>> {
        self.rooms
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| QuizError::RoomNotFound(code.to_string()))
    }

    /// Resolves a host-only action: the connection must be bound to this
    /// room as its host.
    async fn host_room(&self, conn_id: ConnectionId, code: &str) -> Result<Arc<Room>> {
        match self.gateway.room_of(conn_id).await {
            Some((bound_code, true)) if bound_code == code => self.lookup_room(code).await,
            _ => Err(QuizError::Unauthorized(conn_id)),
        }
    }

    async fn verify_ownership(&self, identity: &Identity, quiz_id: QuizId) -> Result<()> {
        match self.quizzes.owner_of(quiz_id).await {
            Some(owner) if owner == identity.user_id => Ok(()),
            _ => Err(QuizError::QuizNotOwned {
                quiz_id,
                user_id: identity.user_id,
            }),
        }
    }

    async fn send_to(&self, conn_id: ConnectionId, message: &ServerMessage) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize server message");
                return;
            }
        };
        if let Some(sender) = self.connections.read().await.get(&conn_id) {
            let _ = sender.send(Message::text(text));
        }
    }

    /// Fan-out: one serialization, one send per live connection in the
    /// recipient set. Senders that are gone are skipped silently.
    async fn broadcast_to(&self, recipients: &[ConnectionId], message: &ServerMessage) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize broadcast");
                return;
            }
        };
        let connections = self.connections.read().await;
        for conn_id in recipients {
            if let Some(sender) = connections.get(conn_id) {
                let _ = sender.send(Message::text(text.clone()));
            }
        }
    }

    #[cfg(test)]
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    #[cfg(test)]
    pub async fn code_active(&self, code: &str) -> bool {
        self.registry.is_active(code).await
    }
}

fn room_recipients(
    roster: &HashMap<ConnectionId, Participant>,
) -> Vec<ConnectionId> {
    roster.keys().copied().collect()
}
