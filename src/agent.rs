use crate::api::HttpAdvisorBackend;
use crate::cache::CacheGate;
use crate::cli::Args;
use crate::config::responses::{ self, ResponseTable, ResponseTableError };
use crate::data::{ CacheTtls, DataService };
use crate::intent::{ classify, Topic };
use crate::models::chat::{ ChatMessage, ConversationContext };
use crate::models::portfolio::PortfolioSummary;
use crate::storage::initialize_store;

use log::{ debug, info, warn };
use rand::Rng;
use std::error::Error;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type SharedResponses = Arc<RwLock<Arc<ResponseTable>>>;

/// Bounds of the simulated "thinking" pause before a reply is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingDelay {
    pub min: Duration,
    pub max: Duration,
}

impl TypingDelay {
    pub const NONE: TypingDelay = TypingDelay { min: Duration::ZERO, max: Duration::ZERO };

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms.max(min_ms)),
        }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Replied {
        topic: Topic,
        message: ChatMessage,
    },
    /// Blank input; nothing was appended.
    Ignored,
    /// A reply is still pending; nothing was appended.
    Rejected,
    /// The history was cleared while the reply was pending.
    Cancelled,
}

struct SessionState {
    messages: Vec<ChatMessage>,
    context: ConversationContext,
    phase: Phase,
    portfolio: Option<PortfolioSummary>,
    generation: u64,
}

/// Conversation state for one chat client.
pub struct ChatSession {
    id: String,
    responses: SharedResponses,
    typing_delay: TypingDelay,
    state: Mutex<SessionState>,
}

/// Returns a pending session to idle if its reply future is dropped early.
struct PendingReply<'a> {
    session: &'a ChatSession,
    generation: u64,
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        let mut state = self.session.state();
        if state.generation == self.generation && state.phase == Phase::Pending {
            debug!("Session {} abandoned a pending reply", self.session.id);
            state.phase = Phase::Idle;
        }
    }
}

impl ChatSession {
    pub fn new(responses: SharedResponses, typing_delay: TypingDelay) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            responses,
            typing_delay,
            state: Mutex::new(SessionState {
                messages: Vec::new(),
                context: ConversationContext::default(),
                phase: Phase::Idle,
                portfolio: None,
                generation: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state().messages.clone()
    }

    pub fn context(&self) -> ConversationContext {
        self.state().context.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state().phase == Phase::Pending
    }

    pub fn set_portfolio(&self, portfolio: Option<PortfolioSummary>) {
        self.state().portfolio = portfolio;
    }

    pub async fn send(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }

        let table = Arc::clone(&*self.responses.read().await);
        let (topic, reply, generation) = {
            let mut state = self.state();
            if state.phase == Phase::Pending {
                warn!("Session {} is still answering; rejecting message", self.id);
                return SendOutcome::Rejected;
            }
            state.messages.push(ChatMessage::user(text));
            state.phase = Phase::Pending;

            let topic = classify(text, &state.context);
            state.context.record(topic);
            let reply = table.lookup(topic, state.portfolio.as_ref());
            (topic, reply, state.generation)
        };
        info!("Session {} classified message as '{}'", self.id, topic);

        let guard = PendingReply { session: self, generation };
        tokio::time::sleep(self.typing_delay.sample()).await;

        let mut state = self.state();
        if state.generation != generation {
            debug!("Session {} was cleared while typing; dropping reply", self.id);
            drop(state);
            drop(guard);
            return SendOutcome::Cancelled;
        }
        let message = ChatMessage::assistant(reply.content, reply.follow_up, topic.agent());
        state.messages.push(message.clone());
        state.phase = Phase::Idle;
        drop(state);
        drop(guard);

        SendOutcome::Replied { topic, message }
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.messages.clear();
        state.context = ConversationContext::default();
        state.phase = Phase::Idle;
        state.generation += 1;
        info!("Session {} cleared", self.id);
    }
}

#[derive(Clone)]
pub struct Advisor {
    data: Arc<DataService>,
    responses: SharedResponses,
    responses_path: Option<String>,
    typing_delay: TypingDelay,
}

impl Advisor {
    pub fn new(
        data: Arc<DataService>,
        responses: Arc<ResponseTable>,
        responses_path: Option<String>,
        typing_delay: TypingDelay
    ) -> Self {
        Self {
            data,
            responses: Arc::new(RwLock::new(responses)),
            responses_path,
            typing_delay,
        }
    }

    fn initialize_responses(args: &Args) -> Result<Arc<ResponseTable>, ResponseTableError> {
        match &args.responses_path {
            Some(path) => {
                let table = responses::load_responses(path)?;
                info!("Loaded canned responses from: {}", path);
                Ok(table)
            }
            None => {
                info!("No responses file configured. Using built-in responses.");
                Ok(Arc::new(ResponseTable::builtin()))
            }
        }
    }

    pub async fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let store = initialize_store(args)?;
        let backend = HttpAdvisorBackend::new(
            &args.backend_url,
            Duration::from_secs(args.backend_timeout_secs)
        )?;
        info!("Advisor backend configured: {}", args.backend_url);

        let data = DataService::new(Arc::new(backend), CacheGate::new(store), CacheTtls::from_args(args));
        let responses = Self::initialize_responses(args)?;
        let typing_delay = TypingDelay::from_millis(args.typing_delay_min_ms, args.typing_delay_max_ms);

        Ok(Self::new(Arc::new(data), responses, args.responses_path.clone(), typing_delay))
    }

    pub fn data(&self) -> &Arc<DataService> {
        &self.data
    }

    pub fn new_session(&self) -> ChatSession {
        ChatSession::new(Arc::clone(&self.responses), self.typing_delay)
    }

    /// A session whose replies quote the user's live portfolio figures. A
    /// failed lookup still yields a session, just without figures.
    pub async fn session_for(&self, email: Option<&str>) -> ChatSession {
        let session = self.new_session();
        if let Some(email) = email {
            match self.data.portfolio_summary(email).await {
                Ok(summary) => session.set_portfolio(Some(summary)),
                Err(e) => warn!("Chat for {} starts without portfolio figures: {}", email, e),
            }
        }
        session
    }

    pub async fn reload_responses_if_changed(&self) -> Result<bool, ResponseTableError> {
        let Some(path) = &self.responses_path else {
            return Ok(false);
        };
        let current = Arc::clone(&*self.responses.read().await);
        match responses::reload_responses_if_changed(path, &current)? {
            Some(table) => {
                *self.responses.write().await = table;
                info!("Canned responses successfully reloaded");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    fn session(delay: TypingDelay) -> ChatSession {
        ChatSession::new(Arc::new(RwLock::new(Arc::new(ResponseTable::builtin()))), delay)
    }

    #[tokio::test]
    async fn blank_messages_are_ignored() {
        let chat = session(TypingDelay::NONE);

        assert_eq!(chat.send("").await, SendOutcome::Ignored);
        assert_eq!(chat.send("   ").await, SendOutcome::Ignored);
        assert!(chat.messages().is_empty());
        assert!(!chat.is_pending());
    }

    #[tokio::test]
    async fn reply_follows_user_message() {
        let chat = session(TypingDelay::NONE);

        let (topic, message) = match chat.send("Should I rebalance?").await {
            SendOutcome::Replied { topic, message } => (topic, message),
            other => panic!("expected a reply, got {:?}", other),
        };

        assert_eq!(topic, Topic::Rebalancing);
        assert_eq!(message.agent.as_deref(), Some("Rebalancing Advisor"));
        assert!(message.follow_up.is_some());

        let history = chat.messages();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Should I rebalance?");
        assert_eq!(history[1], message);
        assert!(!chat.is_pending());
    }

    #[tokio::test]
    async fn context_feeds_the_next_classification() {
        let chat = session(TypingDelay::NONE);

        chat.send("Can you analyze my portfolio?").await;
        assert!(chat.context().portfolio_analyzed);

        let outcome = chat.send("What should I do?").await;
        assert!(matches!(outcome, SendOutcome::Replied { topic: Topic::ContextualRecommendation, .. }));
        assert_eq!(chat.context().last_topic, Some(Topic::ContextualRecommendation));
    }

    #[tokio::test]
    async fn clear_resets_history_and_context() {
        let chat = session(TypingDelay::NONE);
        chat.send("Can you analyze my portfolio?").await;

        chat.clear();

        assert!(chat.messages().is_empty());
        assert_eq!(chat.context(), ConversationContext::default());
    }

    #[tokio::test]
    async fn dropped_send_returns_session_to_idle() {
        let chat = session(TypingDelay::from_millis(5_000, 5_000));

        let pending = chat.send("hello");
        let _ = tokio::time::timeout(Duration::from_millis(20), pending).await;

        assert!(!chat.is_pending());
        assert_eq!(chat.messages().len(), 1);
    }

    #[test]
    fn typing_delay_stays_within_bounds() {
        let delay = TypingDelay::from_millis(10, 20);
        for _ in 0..100 {
            let d = delay.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(TypingDelay::from_millis(30, 5).sample(), Duration::from_millis(30));
    }
}
