//! Common types used by the various components.
pub mod crypto;
pub mod error;
pub mod util;
