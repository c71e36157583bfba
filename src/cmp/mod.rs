//! The CMP (RFC 4210) response engine.
pub mod algorithms;
pub mod builder;
pub mod context;
pub mod header;
pub mod msg;
pub mod oid;
pub mod pop;
pub mod profile;
pub mod protection;
pub mod responder;
