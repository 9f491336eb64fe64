use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Handle to one appended turn, used to withdraw exactly that turn later.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TurnId(u64);

#[derive(Debug, Default)]
struct Session {
    turns: Vec<(TurnId, ChatTurn)>,
    last_active: u64,
}

#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<SessionId, Session>,
    tick: u64,
}

impl Sessions {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Marks the session active, creating it (and evicting the idlest one
    /// when full) if it is new.
    fn touch(&mut self, id: SessionId, max_sessions: usize) -> &mut Session {
        let tick = self.next_tick();
        if !self.by_id.contains_key(&id) && self.by_id.len() >= max_sessions {
            self.evict_idlest();
        }
        let session = self.by_id.entry(id).or_default();
        session.last_active = tick;
        session
    }

    fn evict_idlest(&mut self) {
        let idlest = self
            .by_id
            .iter()
            .min_by_key(|(_, session)| session.last_active)
            .map(|(id, _)| *id);
        if let Some(id) = idlest {
            self.by_id.remove(&id);
            debug!(session = %id, "evicted least recently active session");
        }
    }

    fn push(&mut self, id: SessionId, turn: ChatTurn, limits: (usize, usize)) -> TurnId {
        let (max_turns, max_sessions) = limits;
        let turn_id = TurnId(self.next_tick());
        let session = self.touch(id, max_sessions);
        session.turns.push((turn_id, turn));
        if session.turns.len() > max_turns {
            let excess = session.turns.len() - max_turns;
            session.turns.drain(..excess);
        }
        turn_id
    }
}

/// Per-session conversation logs. Clones share the same storage.
///
/// Both the number of turns per log and the number of logs are bounded; once
/// the store is full, starting a new session drops the one that has gone
/// longest without a write.
#[derive(Clone, Debug)]
pub struct SessionStore {
    sessions: Arc<RwLock<Sessions>>,
    max_turns: usize,
    max_sessions: usize,
}

impl SessionStore {
    /// `max_turns` caps each log; the oldest turns are dropped first.
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: Arc::default(),
            max_turns: max_turns.max(1),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    fn limits(&self) -> (usize, usize) {
        (self.max_turns, self.max_sessions)
    }

    pub async fn create(&self) -> SessionId {
        let id = SessionId::new();
        self.sessions.write().await.touch(id, self.max_sessions);
        id
    }

    /// Unknown sessions read as an empty log.
    pub async fn history(&self, id: SessionId) -> Vec<ChatTurn> {
        self.sessions
            .read()
            .await
            .by_id
            .get(&id)
            .map(|session| {
                session
                    .turns
                    .iter()
                    .map(|(_, turn)| turn.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn append(&self, id: SessionId, turn: ChatTurn) -> TurnId {
        self.sessions.write().await.push(id, turn, self.limits())
    }

    /// Appends unless the log already ends with an identical turn.
    pub async fn append_unless_last(&self, id: SessionId, turn: ChatTurn) -> Option<TurnId> {
        let mut sessions = self.sessions.write().await;
        let last = sessions
            .by_id
            .get(&id)
            .and_then(|session| session.turns.last());
        if last.is_some_and(|(_, previous)| *previous == turn) {
            return None;
        }
        Some(sessions.push(id, turn, self.limits()))
    }

    /// Removes one previously appended turn, wherever it now sits in the log.
    pub async fn remove(&self, id: SessionId, turn_id: TurnId) -> Option<ChatTurn> {
        let mut sessions = self.sessions.write().await;
        let turns = &mut sessions.by_id.get_mut(&id)?.turns;
        let index = turns.iter().position(|(tid, _)| *tid == turn_id)?;
        Some(turns.remove(index).1)
    }

    pub async fn clear(&self, id: SessionId) {
        self.sessions.write().await.by_id.remove(&id);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.by_id.len()
    }
}
