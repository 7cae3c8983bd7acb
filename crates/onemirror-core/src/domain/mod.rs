//! Domain entities and business logic
//!
//! This module contains the core domain types for OneMirror:
//! - Newtypes for remote identifiers, feed cursors and exclusion patterns
//! - Change records as delivered by the remote change feed
//! - The per-pass path resolver
//! - Domain-specific error types

pub mod change_record;
pub mod errors;
pub mod newtypes;
pub mod path_resolver;

// Re-export commonly used types
pub use change_record::{is_valid_item_name, ChangeRecord, ItemKind};
pub use errors::DomainError;
pub use newtypes::*;
pub use path_resolver::PathResolver;
