//! Deterministic models for offline runs and tests.
//!
//! A [`ScriptedModel`] answers through a responder closure and records every
//! request it receives. [`ScriptedFactory`] serves a fixed set of named
//! models to the [`ModelGateway`](crate::gateway::ModelGateway).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::GatewayError;
use crate::traits::{ChatModel, ModelFactory};
use crate::types::{Message, ModelRequest};

type Responder = dyn Fn(&ModelRequest) -> Result<Message, GatewayError> + Send + Sync;

/// A [`ChatModel`] driven by a closure.
pub struct ScriptedModel {
    name: String,
    responder: Box<Responder>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new<F>(name: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> Message + Send + Sync + 'static,
    {
        Self::fallible(name, move |request| Ok(responder(request)))
    }

    /// Responder that may fail the invocation.
    pub fn fallible<F>(name: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<Message, GatewayError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with `replies` in order, then fails every further call.
    pub fn queue(name: impl Into<String>, replies: Vec<Message>) -> Self {
        let name = name.into();
        let model = name.clone();
        let replies = Mutex::new(VecDeque::from(replies));
        Self::fallible(name, move |_| {
            replies
                .lock()
                .pop_front()
                .ok_or_else(|| GatewayError::Invocation {
                    model: model.clone(),
                    message: "scripted replies exhausted".into(),
                })
        })
    }

    /// Replies with the content of the last message it was sent.
    pub fn echo(name: impl Into<String>) -> Self {
        Self::new(name, |request| {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Message::assistant(last)
        })
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(&self, request: ModelRequest) -> Result<Message, GatewayError> {
        let reply = (self.responder)(&request);
        self.requests.lock().push(request);
        reply
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Serves registered models by name; every other name is unsupported.
///
/// The same instance is returned for every temperature.
pub struct ScriptedFactory {
    models: HashMap<String, Arc<dyn ChatModel>>,
    created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
            created: AtomicUsize::new(0),
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, model: Arc<dyn ChatModel>) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    /// How many times [`ModelFactory::create`] succeeded.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelFactory for ScriptedFactory {
    fn create(&self, model: &str, _temperature: f32) -> Result<Arc<dyn ChatModel>, GatewayError> {
        let instance = self
            .models
            .get(model)
            .cloned()
            .ok_or_else(|| GatewayError::UnsupportedModel {
                model: model.to_string(),
            })?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(instance)
    }
}
