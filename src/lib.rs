//! Real-time sync core for a shared 2-D canvas.
//!
//! Several clients view and edit one canvas at once. This crate keeps them
//! consistent through a single shared real-time store: who is present, where
//! each pointer is, which objects exist, and who currently holds the edit
//! lock on each one. Each client also keeps its own pan/zoom viewport, saved
//! locally and never shared.
//!
//! Every cross-client effect goes through the [`channel::SyncChannel`] trait.
//! [`channel::memory`] provides an in-process store for tests and embedding.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`session`] | Per-user orchestration: join, pointer, drag lifecycle, sign-out |
//! | [`presence`] | Presence records with explicit and disconnect-driven removal |
//! | [`cursor`] | Throttled canvas-space cursor publishing |
//! | [`object`] | Shared canvas objects, validation, snapshots |
//! | [`lock`] | Compare-and-set edit locks with disconnect release |
//! | [`viewport`] | Local pan/zoom with debounced persistence |
//! | [`camera`] | Screen/canvas coordinate transforms and zoom-to-pointer |
//! | [`grid`] | Adaptive background grid with viewport culling |
//! | [`rate_limit`] | Throttle and debounce |
//! | [`channel`] | Sync Channel contract, path layout, in-memory store |
//! | [`identity`] | User identity and palette colors |
//! | [`config`] | Runtime configuration from environment variables |
//! | [`error`] | Grepable error codes |
//! | [`consts`] | Shared numeric constants (zoom limits, rates, grid steps) |

pub mod camera;
pub mod channel;
pub mod config;
pub mod consts;
pub mod cursor;
pub mod error;
pub mod grid;
pub mod identity;
pub mod lock;
pub mod object;
pub mod presence;
pub mod rate_limit;
pub mod session;
pub mod viewport;

pub use channel::SyncChannel;
pub use config::SyncConfig;
pub use error::ErrorCode;
pub use identity::Identity;
pub use session::{Session, SessionError};
