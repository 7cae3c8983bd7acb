//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the reconciliation
//! engine depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IChangeFeed`] - Paged remote change feed, root lookup and content download
//! - [`ICursorStore`] - Durable string key/value store for the feed cursor and tokens
//! - [`IAccessTokenSource`] - Bearer tokens for authenticated requests

pub mod change_feed;
pub mod credentials;
pub mod cursor_store;

pub use change_feed::{ChunkSink, FeedError, FeedPage, IChangeFeed};
pub use credentials::{IAccessTokenSource, Tokens};
pub use cursor_store::ICursorStore;
