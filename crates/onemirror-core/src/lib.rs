//! OneMirror Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `ChangeRecord`, `ItemKind`, `Cursor`, `RemoteId`, `ExclusionPattern`
//! - **Path resolution** - `PathResolver`, the per-pass id→path graph
//! - **Port definitions** - Traits for adapters: `IChangeFeed`, `ICursorStore`
//! - **Configuration** - YAML-backed `Config` with validation
//!
//! # Architecture
//!
//! The domain module is pure and performs no I/O. Ports define the trait
//! interfaces that the adapter crates (`onemirror-graph`, `onemirror-cache`)
//! implement and that the reconciliation engine in `onemirror-sync` consumes.

pub mod config;
pub mod domain;
pub mod ports;
