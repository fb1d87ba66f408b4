//! Model gateway: pooled model instances and structured output.
//!
//! Model instances are created through a [`ModelFactory`] and kept in a small
//! least-recently-used pool keyed by `(name, temperature)`, so repeated
//! invocations reuse a client instead of rebuilding it.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::GatewayError;
use crate::traits::{ChatModel, ModelFactory};
use crate::types::{Message, ModelRequest};

struct PoolEntry {
    model: String,
    temperature_bits: u32,
    instance: Arc<dyn ChatModel>,
}

/// Resolves model names to pooled [`ChatModel`] instances.
pub struct ModelGateway {
    factory: Arc<dyn ModelFactory>,
    capacity: usize,
    // Front is least recently used.
    pool: Mutex<VecDeque<PoolEntry>>,
}

impl ModelGateway {
    pub const DEFAULT_POOL_SIZE: usize = 4;

    pub fn new(factory: Arc<dyn ModelFactory>) -> Self {
        Self::with_pool_size(factory, Self::DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(factory: Arc<dyn ModelFactory>, capacity: usize) -> Self {
        Self {
            factory,
            capacity: capacity.max(1),
            pool: Mutex::new(VecDeque::new()),
        }
    }

    /// Pooled instance for `model` at `temperature`, created on a miss.
    ///
    /// Unknown names fail immediately with
    /// [`GatewayError::UnsupportedModel`] and are not pooled.
    pub fn resolve(&self, model: &str, temperature: f32) -> Result<Arc<dyn ChatModel>, GatewayError> {
        let bits = temperature.to_bits();
        let mut pool = self.pool.lock();
        if let Some(pos) = pool
            .iter()
            .position(|e| e.model == model && e.temperature_bits == bits)
        {
            if let Some(entry) = pool.remove(pos) {
                let instance = Arc::clone(&entry.instance);
                pool.push_back(entry);
                return Ok(instance);
            }
        }

        let instance = self.factory.create(model, temperature)?;
        debug!(model, temperature, "created model instance");
        pool.push_back(PoolEntry {
            model: model.to_string(),
            temperature_bits: bits,
            instance: Arc::clone(&instance),
        });
        while pool.len() > self.capacity {
            pool.pop_front();
        }
        Ok(instance)
    }

    /// Number of pooled instances.
    pub fn pooled(&self) -> usize {
        self.pool.lock().len()
    }

    /// One plain invocation.
    pub async fn invoke(
        &self,
        model: &str,
        temperature: f32,
        request: ModelRequest,
    ) -> Result<Message, GatewayError> {
        let chat = self.resolve(model, temperature)?;
        chat.invoke(request).await
    }

    /// Invoke `model` and parse its reply as `T`.
    ///
    /// The request carries `T`'s JSON schema. A reply that does not parse is
    /// sent back with the parse error and the model asked again, up to
    /// `retries` more times. After that the call fails with
    /// [`GatewayError::StructuredOutput`].
    pub async fn structured<T>(
        &self,
        model: &str,
        temperature: f32,
        messages: Vec<Message>,
        retries: u32,
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T)).map_err(|e| {
            GatewayError::StructuredOutput {
                model: model.to_string(),
                attempts: 0,
                message: format!("schema generation failed: {e}"),
            }
        })?;
        let chat = self.resolve(model, temperature)?;
        let mut messages = messages;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let request = ModelRequest::new(messages.clone()).with_output_schema(schema.clone());
            let reply = chat.invoke(request).await?;
            match parse_structured::<T>(&reply.content) {
                Ok(value) => return Ok(value),
                Err(e) if attempt <= retries => {
                    warn!(model, attempt, error = %e, "structured reply failed validation, retrying");
                    messages.push(reply);
                    messages.push(Message::human(format!(
                        "Your previous reply was not valid JSON for the requested schema: {e}. \
                         Reply again with only a JSON object matching the schema."
                    )));
                }
                Err(e) => {
                    return Err(GatewayError::StructuredOutput {
                        model: model.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

/// Parse a structured reply, accepting a fenced ```json block.
pub fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T, serde_json::Error> {
    let value: Value = serde_json::from_str(strip_code_fence(content))?;
    serde_json::from_value(value)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{ScriptedFactory, ScriptedModel};
    use crate::types::ReflectionResult;

    fn factory_with(names: &[&str]) -> Arc<ScriptedFactory> {
        let mut factory = ScriptedFactory::new();
        for name in names {
            factory = factory.with_model(*name, Arc::new(ScriptedModel::echo(*name)));
        }
        Arc::new(factory)
    }

    #[test]
    fn pool_reuses_instances_per_name_and_temperature() {
        let factory = factory_with(&["a"]);
        let gateway = ModelGateway::new(factory.clone());
        gateway.resolve("a", 0.0).unwrap();
        gateway.resolve("a", 0.0).unwrap();
        gateway.resolve("a", 0.5).unwrap();
        assert_eq!(factory.created(), 2);
        assert_eq!(gateway.pooled(), 2);
    }

    #[test]
    fn pool_evicts_least_recently_used() {
        let factory = factory_with(&["a", "b", "c"]);
        let gateway = ModelGateway::with_pool_size(factory.clone(), 2);
        gateway.resolve("a", 0.0).unwrap();
        gateway.resolve("b", 0.0).unwrap();
        // Touch "a" so "b" becomes the eviction candidate.
        gateway.resolve("a", 0.0).unwrap();
        gateway.resolve("c", 0.0).unwrap();
        assert_eq!(factory.created(), 3);

        gateway.resolve("a", 0.0).unwrap();
        assert_eq!(factory.created(), 3);
        gateway.resolve("b", 0.0).unwrap();
        assert_eq!(factory.created(), 4);
    }

    #[test]
    fn unsupported_model_fails_fast() {
        let gateway = ModelGateway::new(factory_with(&["a"]));
        let err = gateway.resolve("gpt-99", 0.0).err().unwrap();
        assert!(matches!(err, GatewayError::UnsupportedModel { ref model } if model == "gpt-99"));
        assert_eq!(gateway.pooled(), 0);
    }

    #[test]
    fn fenced_json_is_accepted() {
        let parsed: ReflectionResult =
            parse_structured("```json\n{\"is_sufficient\": true}\n```").unwrap();
        assert!(parsed.is_sufficient);
    }

    #[tokio::test]
    async fn structured_retries_then_succeeds() {
        let model = Arc::new(ScriptedModel::queue(
            "r",
            vec![
                Message::assistant("not json"),
                Message::assistant(r#"{"is_sufficient": false, "follow_up_queries": ["x"]}"#),
            ],
        ));
        let factory = ScriptedFactory::new().with_model("r", model.clone());
        let gateway = ModelGateway::new(Arc::new(factory));

        let result: ReflectionResult = gateway
            .structured("r", 0.0, vec![Message::human("reflect")], 2)
            .await
            .unwrap();
        assert_eq!(result.follow_up_queries, vec!["x".to_string()]);

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].output_schema.is_some());
        // Second attempt carries the bad reply and the correction request.
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn structured_gives_up_after_retries() {
        let model = Arc::new(ScriptedModel::queue(
            "r",
            vec![
                Message::assistant("{}"),
                Message::assistant("{}"),
                Message::assistant("{}"),
            ],
        ));
        let gateway = ModelGateway::new(Arc::new(ScriptedFactory::new().with_model("r", model.clone())));

        let err = gateway
            .structured::<ReflectionResult>("r", 0.0, vec![Message::human("reflect")], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::StructuredOutput { attempts: 2, .. }));
        assert_eq!(model.requests().len(), 2);
    }
}
