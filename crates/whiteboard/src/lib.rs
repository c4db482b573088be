//! The whiteboard: an append-only bulletin board shared by agents and the user.
//!
//! Agents never call each other. They post observations, alerts and
//! suggestions here, and later stages (or the user) read what is relevant by
//! filtering on author, type, tags and recency.
//!
//! ```text
//!   analyst ──post──┐                    ┌──query── planner
//!   wellness ─post──┼──▶  whiteboard  ◀──┼──query── coach
//!   sync ─────post──┘   (store-backed)   └──digest─ prompts
//! ```
//!
//! - Entries are immutable once written.
//! - Expired entries stay in the store and are filtered out at read time.
//! - Priority orders display; `requires_response` is advisory.

pub mod board;
pub mod config;
pub mod digest;

pub use board::Whiteboard;
pub use config::WhiteboardConfig;
pub use digest::{estimate_tokens, render_digest};
