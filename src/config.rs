//! Configuration of the responder.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fmt, fs, io};

use log::{error, LevelFilter};
use serde::de;
use serde::{Deserialize, Deserializer};
use x509_cert::name::Name;

use crate::cmp::algorithms::{MacAlg, OwfAlg, SignatureAlg};
use crate::cmp::profile::ProfileKind;
use crate::cmp::protection::ProtectionMethod;
use crate::commons::crypto::CryptoError;
use crate::constants::*;

//------------ ConfigDefaults ------------------------------------------------

pub struct ConfigDefaults;

impl ConfigDefaults {
    fn log_level() -> LevelFilter {
        match env::var(CMPSERV_ENV_LOG_LEVEL) {
            Ok(level) => match LevelFilter::from_str(&level) {
                Ok(level) => level,
                Err(_) => {
                    eprintln!("Unrecognized value for log level in env var {}", CMPSERV_ENV_LOG_LEVEL);
                    ::std::process::exit(1);
                }
            },
            _ => LevelFilter::Info,
        }
    }

    fn log_type() -> LogType {
        LogType::Stderr
    }

    fn syslog_facility() -> String {
        "daemon".to_string()
    }

    fn protection() -> ProtectionMethod {
        ProtectionMethod::Signature
    }

    fn pbm_iterations() -> u32 {
        PBM_DEFAULT_ITERATIONS
    }

    fn pbm_salt_length() -> usize {
        PBM_DEFAULT_SALT_LEN
    }

    fn require_pop() -> bool {
        true
    }
}

//------------ Config --------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(
        default = "ConfigDefaults::log_level",
        deserialize_with = "crate::commons::util::ext_serde::de_level_filter"
    )]
    pub log_level: LevelFilter,

    #[serde(default = "ConfigDefaults::log_type")]
    pub log_type: LogType,

    pub log_file: Option<PathBuf>,

    #[serde(default = "ConfigDefaults::syslog_facility")]
    pub syslog_facility: String,

    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

/// # Create
impl Config {
    /// Reads and verifies the config file.
    pub fn parse(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::Other(format!("Cannot read config file '{}': {}", path.display(), e))
        })?;
        Self::parse_str(&content)
    }

    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.verify()?;
        Ok(config)
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.log_type == LogType::File && self.log_file.is_none() {
            return Err(ConfigError::other("log_type 'file' requires log_file"));
        }

        let mut names = HashSet::new();
        for profile in &self.profiles {
            if !names.insert(profile.name.as_str()) {
                return Err(ConfigError::Other(format!(
                    "Duplicate profile name '{}'",
                    profile.name
                )));
            }
            profile.verify()?;
        }
        Ok(())
    }
}

/// # Logging
impl Config {
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        match self.log_type {
            LogType::File => match &self.log_file {
                Some(path) => self.file_logger(path),
                None => Err(ConfigError::other("log_type 'file' requires log_file")),
            },
            LogType::Stderr => self.stderr_logger(),
            LogType::Syslog => self.syslog_logger(),
        }
    }

    /// Creates a stderr logger.
    fn stderr_logger(&self) -> Result<(), ConfigError> {
        self.fern_logger()
            .chain(io::stderr())
            .apply()
            .map_err(|e| ConfigError::Other(format!("Failed to init stderr logging: {}", e)))
    }

    /// Creates a file logger using the file provided by `path`.
    fn file_logger(&self, path: &Path) -> Result<(), ConfigError> {
        let file = match fern::log_file(path) {
            Ok(file) => file,
            Err(err) => {
                let error_string = format!("Failed to open log file '{}': {}", path.display(), err);
                error!("{}", error_string.as_str());
                return Err(ConfigError::Other(error_string));
            }
        };
        self.fern_logger()
            .chain(file)
            .apply()
            .map_err(|e| ConfigError::Other(format!("Failed to init file logging: {}", e)))
    }

    /// Creates a syslog logger and configures correctly.
    #[cfg(unix)]
    fn syslog_logger(&self) -> Result<(), ConfigError> {
        let facility = syslog::Facility::from_str(&self.syslog_facility)
            .map_err(|_| ConfigError::other("Invalid syslog_facility"))?;
        let process = env::current_exe()
            .ok()
            .and_then(|path| {
                path.file_name()
                    .and_then(std::ffi::OsStr::to_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| String::from("cmpserv"));
        let formatter = syslog::Formatter3164 {
            facility,
            hostname: None,
            process,
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter.clone())
            .or_else(|_| syslog::tcp(formatter.clone(), ("127.0.0.1", 601)))
            .or_else(|_| syslog::udp(formatter, ("127.0.0.1", 0), ("127.0.0.1", 514)));
        match logger {
            Ok(logger) => self
                .fern_logger()
                .chain(logger)
                .apply()
                .map_err(|e| ConfigError::Other(format!("Failed to init syslog: {}", e))),
            Err(err) => {
                let msg = format!("Cannot connect to syslog: {}", err);
                Err(ConfigError::Other(msg))
            }
        }
    }

    #[cfg(not(unix))]
    fn syslog_logger(&self) -> Result<(), ConfigError> {
        Err(ConfigError::other("syslog is only supported on unix"))
    }

    /// Creates and returns a fern logger.
    fn fern_logger(&self) -> fern::Dispatch {
        let show_target = self.log_level == LevelFilter::Trace || self.log_level == LevelFilter::Debug;
        fern::Dispatch::new()
            .format(move |out, message, record| {
                if show_target {
                    out.finish(format_args!(
                        "{} [{}] [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.target(),
                        message
                    ))
                } else {
                    out.finish(format_args!(
                        "{} [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        message
                    ))
                }
            })
            .level(self.log_level)
    }
}

//------------ ProfileConfig -------------------------------------------------

/// The configuration of one enrollment profile.
#[derive(Clone, Debug, Deserialize)]
pub struct ProfileConfig {
    pub name: String,

    #[serde(default)]
    pub kind: ProfileKind,

    #[serde(default = "ConfigDefaults::protection")]
    pub request_protection: ProtectionMethod,

    #[serde(default = "ConfigDefaults::protection")]
    pub response_protection: ProtectionMethod,

    /// PEM private key for signature protection.
    pub signing_key: Option<PathBuf>,

    /// PEM certificates, the one for `signing_key` first.
    pub signing_chain: Option<PathBuf>,

    pub default_signature_alg: Option<SignatureAlg>,

    pub shared_secret: Option<String>,

    pub sender_kid: Option<String>,

    #[serde(default, deserialize_with = "crate::commons::util::ext_serde::de_name_opt")]
    pub sender_name: Option<Name>,

    #[serde(default, deserialize_with = "crate::commons::util::ext_serde::de_name_opt")]
    pub recipient: Option<Name>,

    #[serde(default = "ConfigDefaults::pbm_iterations")]
    pub pbm_iterations: u32,

    #[serde(default = "ConfigDefaults::pbm_salt_length")]
    pub pbm_salt_length: usize,

    #[serde(default)]
    pub pbm_owf: OwfAlg,

    #[serde(default)]
    pub pbm_mac: MacAlg,

    #[serde(default)]
    pub implicit_confirm: bool,

    #[serde(default = "ConfigDefaults::require_pop")]
    pub require_pop: bool,

    #[serde(default)]
    pub accept_ra_verified: bool,
}

impl ProfileConfig {
    fn uses(&self, method: ProtectionMethod) -> bool {
        self.request_protection == method || self.response_protection == method
    }

    fn verify(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Other(format!("Profile '{}': {}", self.name, msg)));

        if self.name.is_empty() {
            return Err(ConfigError::other("Profile without a name"));
        }
        if self.uses(ProtectionMethod::Signature)
            && (self.signing_key.is_none() || self.signing_chain.is_none())
        {
            return fail("signature protection requires signing_key and signing_chain");
        }
        if self.uses(ProtectionMethod::SharedSecret) {
            match &self.shared_secret {
                Some(secret) if !secret.is_empty() => {}
                _ => return fail("shared_secret protection requires a shared_secret"),
            }
        }
        if self.pbm_salt_length < PBM_MIN_SALT_LEN {
            return fail("pbm_salt_length must be at least 8");
        }
        if self.pbm_iterations < 1 || self.pbm_iterations > PBM_MAX_ITERATIONS {
            return fail("pbm_iterations must be between 1 and 100000");
        }
        Ok(())
    }
}

//------------ LogType -------------------------------------------------------

/// The target to log to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogType {
    Stderr,
    File,
    Syslog,
}

impl<'de> Deserialize<'de> for LogType {
    fn deserialize<D>(d: D) -> Result<LogType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        match string.as_str() {
            "stderr" => Ok(LogType::Stderr),
            "file" => Ok(LogType::File),
            "syslog" => Ok(LogType::Syslog),
            _ => Err(de::Error::custom(format!(
                "expected \"stderr\", \"file\" or \"syslog\", found: \"{}\"",
                string
            ))),
        }
    }
}

//------------ ConfigError ---------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    TomlError(toml::de::Error),
    KeyMaterial(String, CryptoError),
    Other(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => e.fmt(f),
            ConfigError::TomlError(e) => e.fmt(f),
            ConfigError::KeyMaterial(profile, e) => {
                write!(f, "Profile '{}': cannot load key material: {}", profile, e)
            }
            ConfigError::Other(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn other(s: &str) -> ConfigError {
        ConfigError::Other(s.to_string())
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::IoError(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::TomlError(e)
    }
}

//============ Tests =========================================================
