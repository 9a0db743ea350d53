//! Common types and abstractions
//!
//! This module defines the core types shared by every layer:
//! - Io: unified async I/O abstraction handed in by the host
//! - Scalars: the per-request scalar parameter map

mod stream;

pub use stream::{AsyncReadWrite, IntoIo, Io};

use std::collections::HashMap;

/// Scalar parameters bound to a single request or connection.
///
/// Query-string values land under their own key; the request body, when a
/// route declares one, lands under [`BODY_KEY`].
pub type Scalars = HashMap<String, String>;

/// Key under which the request body is stored in the scalar map.
pub const BODY_KEY: &str = "$body";

// Re-export error types from crate root
pub use crate::error::{Error, Result};
