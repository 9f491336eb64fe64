mod model;
mod session;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::core::is_context_message;

pub use model::{ChatModel, GeminiClient, ModelConfig};
pub use session::{ChatTurn, DEFAULT_MAX_SESSIONS, Role, SessionId, SessionStore, TurnId};

pub const SYSTEM_INSTRUCTION: &str = "You are a debt repayment planning assistant. Help the user build a plan to pay off their debts using the debt details they provide, either in a message or through the debt form (form submissions appear in the conversation starting with \"[Debt data submitted via form]\").
Only discuss debt repayment and the debt data found in this conversation. Reply in plain text without markdown.
1. Use the whole conversation for context about debts and budget.
2. If no debt details are known, ask for each debt's name, amount owed, APR and minimum monthly payment.
3. If the monthly repayment budget is unknown, ask for it; it must be at least the sum of the minimum payments.
4. With debts and budget known, explain and calculate the Debt Snowball plan (smallest balance first), the Debt Avalanche plan (highest rate first) and a personalised suggestion.
5. For each plan show the payoff order, estimated time to become debt-free and total interest paid.
6. If the budget is below the sum of minimum payments, say so and explain that at least that amount is needed.
7. Stay conversational and encouraging.";

pub const PRIMER: &str = "Understood. I will use the debt information from the form or from our conversation to help you build a repayment plan. If you have not shared your debts yet, please list them, and tell me your total monthly budget for debt repayment.";

/// Shown to the user when the model call fails.
pub const APOLOGY: &str = "Sorry, I encountered an error trying to process your request. Please check the input data and try again.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("AI model not configured properly.")]
    NotConfigured,

    #[error("message must not be empty")]
    EmptyMessage,

    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model returned no text")]
    EmptyReply,
}

/// Relays user messages to the model with the session's conversation log.
#[derive(Clone)]
pub struct ChatService {
    sessions: SessionStore,
    model: Option<Arc<dyn ChatModel>>,
}

impl ChatService {
    pub fn new(sessions: SessionStore, model: Option<Arc<dyn ChatModel>>) -> Self {
        Self { sessions, model }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    pub async fn resolve_session(&self, requested: Option<SessionId>) -> SessionId {
        match requested {
            Some(id) => id,
            None => self.sessions.create().await,
        }
    }

    /// Records submitted debt data unless it repeats the previous turn.
    pub async fn record_context(&self, session: SessionId, context: String) -> bool {
        let added = self
            .sessions
            .append_unless_last(session, ChatTurn::user(context))
            .await
            .is_some();
        if added {
            debug!(%session, "debt context added to conversation");
        }
        added
    }

    pub async fn reply(&self, session: SessionId, message: &str) -> Result<String, ChatError> {
        let model = self.model.as_ref().ok_or(ChatError::NotConfigured)?;
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        // Context turns stay in the log even if the model call fails.
        let turn = ChatTurn::user(message);
        let appended = if is_context_message(message) {
            self.sessions.append_unless_last(session, turn).await;
            None
        } else {
            Some(self.sessions.append(session, turn).await)
        };

        let mut prompt = vec![ChatTurn::user(SYSTEM_INSTRUCTION), ChatTurn::model(PRIMER)];
        prompt.extend(self.sessions.history(session).await);

        match model.generate(&prompt).await {
            Ok(text) => {
                self.sessions
                    .append(session, ChatTurn::model(text.clone()))
                    .await;
                Ok(text)
            }
            Err(err) => {
                warn!(%session, error = %err, "model call failed; rolling back user turn");
                if let Some(turn_id) = appended {
                    self.sessions.remove(session, turn_id).await;
                }
                Err(err)
            }
        }
    }
}
