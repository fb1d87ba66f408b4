//! Default implementations of the boundary traits.
//!
//! These let the engine run in-process with no external services. Each can
//! be replaced through [`Services::builder`](crate::node_ctx::Services::builder).

pub mod http_fetcher;
pub mod in_memory_store;
pub mod scripted;
pub mod time_capabilities;
pub mod web;
pub use http_fetcher::HttpFetcher;
pub use in_memory_store::InMemoryStore;
pub use scripted::{ScriptedFactory, ScriptedModel};
pub use time_capabilities::{time_capabilities, CurrentLocalTime, CurrentUtcTime, LocalTimeZone};
pub use web::{NoopWebSearch, StaticWebFetch, StaticWebSearch};
