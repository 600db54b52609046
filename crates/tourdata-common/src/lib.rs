//! Tourdata Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the tourdata workspace.
//!
//! # Overview
//!
//! - **Hashing**: order-independent content fingerprints for raw API items
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Errors**: the common error type and result alias
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tourdata_common::hash::data_hash;
//!
//! let a = data_hash(&json!({"title": "Jeonju", "contentid": "126508"}));
//! let b = data_hash(&json!({"contentid": "126508", "title": "Jeonju"}));
//! assert_eq!(a, b);
//! ```

pub mod error;
pub mod hash;
pub mod logging;

pub use error::{CommonError, Result};
