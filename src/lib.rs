//! The _cmpserv_ library crate.
//!
//! Builds protected responses to Certificate Management Protocol
//! (RFC 4210) requests.

pub mod cli;
pub mod cmp;
pub mod commons;
pub mod config;
pub mod constants;
pub mod profiles;
