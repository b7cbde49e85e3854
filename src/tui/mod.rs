//! Interactive conversation view
//!
//! Terminal user interface using Ratatui.

mod app;
mod compose;
mod messages;
mod ui;

pub use app::run;
