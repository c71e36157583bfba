//! Various crate-wide constants.

//------------ Binary Names -------------------------------------------------

/// The friendly name of the `cmpserv` binary.
pub const CMPSERV_APP: &str = "CMP Responder";

//------------ Config Files Paths -------------------------------------------

/// The default path to the config file.
pub const CMPSERV_DEFAULT_CONFIG_FILE: &str = "/etc/cmpserv.conf";

//------------ Environment Variables ----------------------------------------

/// The environment variable with the log level.
///
/// The variable should contain the name of a [`log::LevelFilter`]. It will
/// be overwritten by the config file. The default is “info.”
pub const CMPSERV_ENV_LOG_LEVEL: &str = "CMPSERV_LOG_LEVEL";

//------------ Header Values ------------------------------------------------

/// Number of random octets in every senderNonce we produce.
pub const SENDER_NONCE_LEN: usize = 16;

/// The shortest senderNonce we accept from a peer.
pub const MIN_PEER_NONCE_LEN: usize = 16;

//------------ Password Based MAC -------------------------------------------

/// The default number of OWF iterations for password based MAC protection.
pub const PBM_DEFAULT_ITERATIONS: u32 = 500;

/// The default salt length for password based MAC protection.
pub const PBM_DEFAULT_SALT_LEN: usize = 16;

/// RFC 4211 requires at least this many octets of salt.
pub const PBM_MIN_SALT_LEN: usize = 8;

/// Upper bound for iteration counts taken from a peer's PBMParameter.
///
/// Stops a request from making us hash for minutes.
pub const PBM_MAX_ITERATIONS: u32 = 100_000;
