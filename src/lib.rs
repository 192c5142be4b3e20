// stillmind library - meditation app backend

pub mod cli;
mod core;
mod error;
pub mod server;

pub use core::{
    ChatChunk, ChatTurn, Claude, Db, Progress, RateLimiter, SessionRecord, UserRecord,
    validate_message,
};
pub use error::Error;
pub use server::{AppState, Server};
