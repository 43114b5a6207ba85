//! # eb-services
//!
//! Board, thread, post and reaction operations layered over the repository
//! ports of `eb-core`. Every operation takes a [`ClientContext`] explicitly.

pub mod boards;
pub mod context;
pub mod fanout;
pub mod posts;
pub mod reactions;
pub mod retry;
pub mod session;
pub mod threads;

mod records;

pub use context::{AgentSlot, ClientContext, ClientSettings};
pub use fanout::AggregationScope;
pub use retry::RetryPolicy;
pub use session::SessionManager;
