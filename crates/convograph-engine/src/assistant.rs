//! Conversation facade: one [`Assistant`] per conversation.
//!
//! Each call to [`Assistant::reply`] runs the assistant graph for one user
//! turn and keeps the transcript, the memory access registry, and the known
//! user identity for the next turn.
//!
//! ```rust,ignore
//! let gateway = Arc::new(ModelGateway::new(Arc::new(my_factory)));
//! let services = Services::builder(gateway).store(store).build();
//! let mut assistant = Assistant::new(RunConfig::default(), services)?;
//! let reply = assistant.reply("What is the weather in Oslo today?").await;
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::errors::{ConfigError, GatewayError};
use crate::executor::{ExecutionEvent, Executor, ExecutorError};
use crate::flows::assistant::{assistant_graph, AssistantState};
use crate::graph::{CompiledGraph, GraphError};
use crate::node_ctx::{RunScope, Services};
use crate::types::{MemoryAccessRecord, Message, Role};

/// Reply sent to the user when a turn fails.
pub const APOLOGY: &str =
    "I'm sorry, something went wrong while answering your message. Please try again.";

/// Errors from [`Assistant`] construction and turns.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssistantError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("model error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("run error: {0}")]
    Run(#[from] ExecutorError),
}

impl AssistantError {
    /// Configuration problems, including unsupported models met mid-run.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Config(_) | Self::Gateway(GatewayError::UnsupportedModel { .. }) => true,
            Self::Run(e) => e.is_configuration(),
            _ => false,
        }
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Run(e) if e.is_contract_violation())
    }
}

/// A conversation with the assistant.
pub struct Assistant {
    config: Arc<RunConfig>,
    services: Services,
    executor: Executor,
    graph: Arc<CompiledGraph<AssistantState>>,
    user: String,
    history: Vec<Message>,
    registry: Vec<MemoryAccessRecord>,
}

impl Assistant {
    /// Validate `config`, check that its model is supported, and compile the
    /// assistant graph.
    pub fn new(config: RunConfig, services: Services) -> Result<Self, AssistantError> {
        config.validate()?;
        services.models.resolve(&config.model_name, 0.0)?;
        let graph = Arc::new(assistant_graph()?);
        let user = config.user.as_deref().unwrap_or_default().trim().to_lowercase();
        Ok(Self {
            config: Arc::new(config),
            services,
            executor: Executor::default(),
            graph,
            user,
            history: Vec::new(),
            registry: Vec::new(),
        })
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// User identity known so far, empty when unknown.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// User and assistant messages of all completed turns.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Memory operations performed across all turns.
    pub fn registry(&self) -> &[MemoryAccessRecord] {
        &self.registry
    }

    /// Live events of every turn started after subscribing, nested research
    /// and memory runs included.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.executor.subscribe()
    }

    /// Answer `text`. Failures are logged and answered with [`APOLOGY`].
    pub async fn reply(&mut self, text: &str) -> Message {
        match self.try_reply(text).await {
            Ok(message) => message,
            Err(e) => {
                error!(
                    error = %e,
                    configuration = e.is_configuration(),
                    contract_violation = e.is_contract_violation(),
                    "turn failed"
                );
                Message::assistant(APOLOGY)
            }
        }
    }

    /// Answer `text`, returning the failure instead of an apology.
    ///
    /// A failed turn leaves the conversation unchanged.
    pub async fn try_reply(&mut self, text: &str) -> Result<Message, AssistantError> {
        let question = Message::human(text);
        let mut messages = self.history.clone();
        messages.push(question.clone());
        let initial = AssistantState {
            user_query: text.to_string(),
            user: self.user.clone(),
            messages,
            memory_access_registry: self.registry.clone(),
            ..Default::default()
        };

        let mut scope = RunScope::new(Arc::clone(&self.config), self.services.clone());
        if let Some(thread) = &self.config.thread_id {
            scope = scope.with_run_id(format!("{thread}-{}", uuid::Uuid::new_v4()));
        }
        info!(run_id = scope.run_id(), "starting turn");
        let state = self.executor.run(&*self.graph, initial, &scope).await?;

        let reply = state
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| Message::assistant(state.processing_answer.clone()));

        self.history.push(question);
        self.history.push(reply.clone());
        self.registry = state.memory_access_registry;
        if !state.user.is_empty() {
            self.user = state.user;
        }
        Ok(reply)
    }
}
