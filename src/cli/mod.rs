//! The command line interface of the responder.
pub mod options;
pub mod report;
