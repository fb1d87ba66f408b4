//! The assistant's graphs.
//!
//! - [`assistant`]: per-turn query processing, knowledge collection, and
//!   the final answer with capability calls.
//! - [`research`]: the deep-research loop used by the web-search branch.
//! - [`memory`]: long-term memory reads and writes used by the memory branch.
//! - [`page`]: fetch-and-analyze for one URL, used by research.

pub mod assistant;
pub mod memory;
pub mod page;
pub mod research;

pub use assistant::{assistant_graph, AssistantState, AssistantUpdate};
pub use memory::{memory_graph, MemoryState, MemoryUpdate};
pub use page::{page_graph, PageState, PageUpdate};
pub use research::{research_graph, ResearchState, ResearchUpdate};
