//! Bounded model ⇄ capability loop.
//!
//! The model is invoked with the transcript and the capability list. While
//! its reply requests capability calls, the calls are executed, their results
//! appended as tool messages, and the model invoked again. The loop stops on
//! a reply without calls or once the model has been invoked
//! `max_iterations` times, whichever comes first.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::errors::GatewayError;
use crate::gateway::ModelGateway;
use crate::traits::CapabilityRegistry;
use crate::types::{Message, ModelRequest};

/// Messages produced by a [`ToolCallLoop`] run.
#[derive(Debug, Clone)]
pub struct ToolLoopOutcome {
    /// Assistant replies and tool results, in transcript order.
    pub messages: Vec<Message>,
    /// Model invocations performed.
    pub iterations: u32,
    /// The cap was reached while the last reply still requested calls.
    pub exhausted: bool,
}

impl ToolLoopOutcome {
    /// The last assistant message, if any.
    pub fn final_reply(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::Assistant)
    }
}

pub struct ToolCallLoop<'a> {
    models: &'a ModelGateway,
    capabilities: &'a dyn CapabilityRegistry,
    model: String,
    temperature: f32,
    max_iterations: u32,
}

impl<'a> ToolCallLoop<'a> {
    pub fn new(
        models: &'a ModelGateway,
        capabilities: &'a dyn CapabilityRegistry,
        model: impl Into<String>,
    ) -> Self {
        Self {
            models,
            capabilities,
            model: model.into(),
            temperature: 0.0,
            max_iterations: 5,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap on model invocations; values below 1 are treated as 1.
    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub async fn run(&self, transcript: Vec<Message>) -> Result<ToolLoopOutcome, GatewayError> {
        let chat = self.models.resolve(&self.model, self.temperature)?;
        let tools = self.capabilities.list();
        let mut transcript = transcript;
        let mut produced = Vec::new();
        let mut iterations = 0;

        loop {
            let request = ModelRequest::new(transcript.clone()).with_tools(tools.clone());
            let reply = chat.invoke(request).await?;
            iterations += 1;
            let calls = reply.tool_calls.clone();
            transcript.push(reply.clone());
            produced.push(reply);

            if calls.is_empty() {
                return Ok(ToolLoopOutcome {
                    messages: produced,
                    iterations,
                    exhausted: false,
                });
            }
            if iterations >= self.max_iterations {
                warn!(
                    model = %self.model,
                    iterations,
                    pending_calls = calls.len(),
                    "tool-call cap reached, stopping with calls outstanding"
                );
                return Ok(ToolLoopOutcome {
                    messages: produced,
                    iterations,
                    exhausted: true,
                });
            }

            let results = join_all(calls.iter().map(|call| async move {
                let content = match self
                    .capabilities
                    .invoke(&call.name, call.arguments.clone())
                    .await
                {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(capability = %call.name, error = %e, "capability call failed");
                        format!("Error: {e}")
                    }
                };
                Message::tool_result(&call.id, &call.name, content)
            }))
            .await;
            debug!(calls = results.len(), iterations, "capability calls completed");
            transcript.extend(results.iter().cloned());
            produced.extend(results);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
