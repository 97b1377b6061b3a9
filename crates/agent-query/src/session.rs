//! Conversational sessions over the resolution loop
//!
//! A [`ChatSession`] keeps a bounded message history. Each user message is
//! classified; when it needs data the resolver runs and its result is handed
//! to the model as a temporary assistant note that never enters the
//! history. The answer streams back through a [`ChatTurn`], which appends
//! the full text to the history once the stream completes.

use crate::error::{QueryError, Result};
use crate::prompts::PromptKind;
use crate::resolver::{QueryResolver, duplicate_abort_message};
use agent_llm::{Message, TokenStream};
use futures::{Stream, StreamExt};
use minijinja::context;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ordered messages with a fixed capacity
///
/// When a push overflows the capacity the oldest non-system message is
/// evicted, or the oldest message when every message is a system message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHistory {
    messages: Vec<Message>,
    capacity: usize,
}

impl MessageHistory {
    /// Empty history holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a message, evicting if over capacity
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > self.capacity {
            let index = self
                .messages
                .iter()
                .position(|m| !m.is_system())
                .unwrap_or(0);
            self.messages.remove(index);
        }
    }

    /// Drop everything except system messages
    pub fn clear(&mut self) {
        self.messages.retain(Message::is_system);
    }

    /// Messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Maximum number of messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Read a yes/no classification reply
///
/// Leading `否`, `不` or `no` mean no; otherwise a `是` anywhere, or a leading
/// `yes`, means yes. Anything else is no.
pub fn parse_yes_no(reply: &str) -> bool {
    let answer = reply
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if answer.starts_with('否') || answer.starts_with('不') || answer.starts_with("no") {
        return false;
    }
    answer.contains('是') || answer.starts_with("yes")
}

/// One conversation bound to a resolver
pub struct ChatSession {
    id: Uuid,
    resolver: Arc<QueryResolver>,
    history: MessageHistory,
}

impl ChatSession {
    /// Create a session with an empty history
    pub fn new(resolver: Arc<QueryResolver>) -> Self {
        let capacity = resolver.config().history_capacity;
        Self {
            id: Uuid::new_v4(),
            resolver,
            history: MessageHistory::new(capacity),
        }
    }

    /// Create a session pinned to a research report
    pub fn with_report(resolver: Arc<QueryResolver>, report: &str) -> Result<Self> {
        let pinned = resolver
            .prompts()
            .render(PromptKind::ReportChatSystem, context! { report => report })?;
        let mut session = Self::new(resolver);
        session.history.push(Message::system(pinned));
        Ok(session)
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current history
    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    /// Drop everything except system messages
    pub fn clear_history(&mut self) {
        self.history.clear();
        info!(session = %self.id, "History cleared");
    }

    /// Phrase `question` as being about `stock`
    pub fn scoped_question(&self, stock: &str, question: &str) -> Result<String> {
        self.resolver.prompts().render(
            PromptKind::ScopedQuestion,
            context! { stock => stock, question => question },
        )
    }

    /// Ask the model whether `message` needs fresh data
    pub async fn needs_data(&self, message: &str) -> Result<bool> {
        let prompts = self.resolver.prompts();
        let system = prompts.render(PromptKind::NeedDataSystem, context! {})?;
        let user = prompts.render(PromptKind::NeedDataUser, context! { question => message })?;

        let request = self
            .resolver
            .model_settings()
            .request(vec![Message::user(user)], Some(system));
        let reply = self.resolver.llm().complete(request).await?.into_text();
        let needed = parse_yes_no(&reply);
        debug!(session = %self.id, reply = %reply.trim(), needed, "Classified message");
        Ok(needed)
    }

    /// Handle a user message and stream the answer
    ///
    /// The user message is recorded immediately. The answer is recorded when
    /// the returned stream is driven to completion; a stream that errors or
    /// is dropped early leaves no assistant message behind.
    pub async fn process_message(&mut self, message: &str) -> Result<ChatTurn<'_>> {
        self.history.push(Message::user(message));
        let mut outgoing = self.history.messages().to_vec();

        if self.needs_data(message).await? {
            outgoing.push(Message::assistant(self.data_note(message).await?));
        }

        let request = self.resolver.model_settings().request(outgoing, None);
        let tokens = self.resolver.llm().stream(request).await?;

        Ok(ChatTurn {
            history: &mut self.history,
            tokens,
            buffer: String::new(),
            finished: false,
        })
    }

    async fn data_note(&self, message: &str) -> Result<String> {
        let config = self.resolver.config();
        let prompts = self.resolver.prompts();

        let error = match self
            .resolver
            .resolve_with_limit(message, config.session_max_iterations)
            .await
        {
            Ok(resolution) => match resolution.outcome() {
                Some(outcome) => {
                    return prompts.render(PromptKind::DataNote, context! { result => outcome.text() });
                }
                None => duplicate_abort_message(config.language).to_string(),
            },
            Err(err) => {
                warn!(session = %self.id, error = %err, "Resolution failed");
                err.to_string()
            }
        };
        prompts.render(PromptKind::ErrorNote, context! { error => error })
    }
}

/// Streaming answer of one chat turn
pub struct ChatTurn<'a> {
    history: &'a mut MessageHistory,
    tokens: TokenStream,
    buffer: String,
    finished: bool,
}

impl ChatTurn<'_> {
    /// Drive the stream to completion and return the full answer
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(token) = self.next().await {
            text.push_str(&token?);
        }
        Ok(text)
    }
}

impl Stream for ChatTurn<'_> {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match this.tokens.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(token))) if token.is_empty() => {}
                Poll::Ready(Some(Ok(token))) => {
                    this.buffer.push_str(&token);
                    return Poll::Ready(Some(Ok(token)));
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(QueryError::from(err))));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    let answer = std::mem::take(&mut this.buffer);
                    this.history.push(Message::assistant(answer));
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Key of a session: stock name and chat model
pub fn session_key(stock: &str, model: &str) -> String {
    format!("{stock}_{model}")
}

/// Sessions keyed by stock and model, each behind its own lock
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Mutex<ChatSession>>>>,
}

impl SessionStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Session for `stock` on the resolver's model, created on first use
    ///
    /// `report` pins a research report into a newly created session; it is
    /// ignored when the session already exists.
    pub async fn get_or_create(
        &self,
        stock: &str,
        resolver: &Arc<QueryResolver>,
        report: Option<&str>,
    ) -> Result<Arc<Mutex<ChatSession>>> {
        let key = session_key(stock, &resolver.config().model);
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&key) {
            return Ok(session.clone());
        }

        let session = match report {
            Some(report) => ChatSession::with_report(resolver.clone(), report)?,
            None => ChatSession::new(resolver.clone()),
        };
        info!(key = %key, session = %session.id(), "Created chat session");
        let session = Arc::new(Mutex::new(session));
        sessions.insert(key, session.clone());
        Ok(session)
    }

    /// Existing session, if any
    pub async fn get(&self, stock: &str, model: &str) -> Option<Arc<Mutex<ChatSession>>> {
        self.sessions
            .lock()
            .await
            .get(&session_key(stock, model))
            .cloned()
    }

    /// Forget a session
    pub async fn remove(&self, stock: &str, model: &str) -> Option<Arc<Mutex<ChatSession>>> {
        self.sessions
            .lock()
            .await
            .remove(&session_key(stock, model))
    }

    /// Number of sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
