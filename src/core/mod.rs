// core logic - ai relay, storage, progress math, and rate limiting

mod ai;
mod db;
mod limit;
mod progress;

pub use ai::{
    ChatChunk, ChatTurn, Claude, DEFAULT_MODEL, MAX_HISTORY_TURNS, MAX_MESSAGE_CHARS,
    validate_message,
};
pub use db::{Db, SessionRecord, UserRecord};
pub use limit::RateLimiter;
pub use progress::Progress;
