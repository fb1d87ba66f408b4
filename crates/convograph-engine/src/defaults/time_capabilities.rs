//! Built-in clock capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::errors::CapabilityError;
use crate::traits::Capability;
use crate::types::CapabilitySpec;

fn no_arguments() -> Value {
    json!({"type": "object", "properties": {}})
}

/// `current_utc_time`: current UTC time in RFC 3339 format.
pub struct CurrentUtcTime;

#[async_trait]
impl Capability for CurrentUtcTime {
    fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: "current_utc_time".into(),
            description: "Returns the current UTC time in ISO 8601 format.".into(),
            input_schema: no_arguments(),
        }
    }

    async fn call(&self, _arguments: Value) -> Result<String, CapabilityError> {
        Ok(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// `current_local_time`: current time in the host's time zone.
pub struct CurrentLocalTime;

#[async_trait]
impl Capability for CurrentLocalTime {
    fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: "current_local_time".into(),
            description: "Returns the current local date and time, with its UTC offset.".into(),
            input_schema: no_arguments(),
        }
    }

    async fn call(&self, _arguments: Value) -> Result<String, CapabilityError> {
        Ok(Local::now().to_rfc3339_opts(SecondsFormat::Secs, false))
    }
}

/// `local_time_zone`: the host's UTC offset.
pub struct LocalTimeZone;

#[async_trait]
impl Capability for LocalTimeZone {
    fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: "local_time_zone".into(),
            description: "Returns the current local time zone as a UTC offset.".into(),
            input_schema: no_arguments(),
        }
    }

    async fn call(&self, _arguments: Value) -> Result<String, CapabilityError> {
        Ok(format!("UTC{}", Local::now().offset()))
    }
}

/// All clock capabilities, ready for
/// [`ToolRegistry::from_capabilities`](crate::tool_registry::ToolRegistry::from_capabilities).
pub fn time_capabilities() -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(CurrentUtcTime),
        Arc::new(CurrentLocalTime),
        Arc::new(LocalTimeZone),
    ]
}
