//! Conversation synchronization engine
//!
//! The pieces are plain data structures driven by [`session::ConversationEngine`];
//! [`runtime`] runs an engine on tokio against a [`ChatApi`](crate::api::ChatApi)
//! and an optional [`LiveFeed`](crate::live::LiveFeed).

pub mod composer;
pub mod edit;
pub mod history;
pub mod presenter;
pub mod receipts;
pub mod runtime;
pub mod session;
pub mod store;

pub use presenter::{ConversationView, DayGroup, MessageView, Side};
pub use runtime::{Command, SessionEvent, SessionHandle, SessionOptions};
