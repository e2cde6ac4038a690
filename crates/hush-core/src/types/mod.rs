//! Core types for hush.

mod chat;
mod decision;
mod feedback;
mod message;
mod preferences;

pub use chat::*;
pub use decision::*;
pub use feedback::*;
pub use message::*;
pub use preferences::*;
