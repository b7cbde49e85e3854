//! Data models for conversation messages

mod conversation;
mod draft;
mod message;

pub use conversation::*;
pub use draft::*;
pub use message::*;
