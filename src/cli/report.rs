//! Reporting the outcome of a command to the user.

use std::path::PathBuf;
use std::str::FromStr;
use std::{fmt, io};

use serde::Serialize;

use crate::cmp::responder::Response;
use crate::commons::crypto::CryptoError;
use crate::commons::error::CmpError;
use crate::config::ConfigError;

//------------ ReportFormat --------------------------------------------------

/// The format to use when reporting a response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, ReportError> {
        match s {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(ReportError::UnrecognisedFormat(s.to_string())),
        }
    }
}

//------------ ReportError ---------------------------------------------------

#[derive(Debug)]
pub enum ReportError {
    UnrecognisedFormat(String),
    Json(serde_json::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReportError::UnrecognisedFormat(s) => {
                write!(f, "This report format is not recognised: {}", s)
            }
            ReportError::Json(e) => write!(f, "Cannot serialize report: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

//------------ ResponseReport ------------------------------------------------

/// What happened to a request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ResponseReport {
    body_type: String,
    transaction_id: Option<String>,
    failure: Option<FailureReport>,
    out: Option<PathBuf>,
    response: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FailureReport {
    code: u16,
    failure_info: String,
    detail: String,
}

impl ResponseReport {
    /// Creates the report for a response.
    ///
    /// Either `out` names the file holding the response, or `response`
    /// carries it in base64.
    pub fn new(response: &Response, out: Option<PathBuf>, encoded: Option<String>) -> Self {
        let transaction_id = response
            .message()
            .header
            .trans_id
            .as_ref()
            .map(|tid| hex::encode(tid.as_bytes()));
        let failure = response.failure().map(|err| FailureReport {
            code: err.failure().code(),
            failure_info: err.failure_info().to_string(),
            detail: err.detail().to_string(),
        });
        ResponseReport {
            body_type: response.body_type().to_string(),
            transaction_id,
            failure,
            out,
            response: encoded,
        }
    }

    pub fn is_error(&self) -> bool {
        self.failure.is_some()
    }

    pub fn report(&self, format: ReportFormat) -> Result<String, ReportError> {
        match format {
            ReportFormat::Json => serde_json::to_string_pretty(self).map_err(ReportError::Json),
            ReportFormat::Text => {
                let mut res = String::new();
                res.push_str(&format!("Response: {}\n", self.body_type));
                if let Some(tid) = &self.transaction_id {
                    res.push_str(&format!("Transaction: {}\n", tid));
                }
                if let Some(failure) = &self.failure {
                    res.push_str(&format!(
                        "Failure: [{}] {}: {}\n",
                        failure.code, failure.failure_info, failure.detail
                    ));
                }
                if let Some(out) = &self.out {
                    res.push_str(&format!("Written to: {}\n", out.display()));
                }
                if let Some(response) = &self.response {
                    res.push_str(response);
                    res.push('\n');
                }
                Ok(res)
            }
        }
    }
}

//------------ Report --------------------------------------------------------

/// Prints the outcome of a command and returns the process exit status.
///
/// The status is 0 for a success response, 2 for an error response and 1
/// if no response could be produced.
pub trait Report {
    fn report(self, format: ReportFormat) -> i32;
}

impl Report for Result<ResponseReport, CliError> {
    fn report(self, format: ReportFormat) -> i32 {
        match self {
            Ok(report) => match report.report(format) {
                Ok(text) => {
                    print!("{}", text);
                    if report.is_error() { 2 } else { 0 }
                }
                Err(err) => {
                    eprintln!("{}", err);
                    1
                }
            },
            Err(err) => {
                eprintln!("{}", err);
                1
            }
        }
    }
}

//------------ CliError ------------------------------------------------------

#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Crypto(CryptoError),
    Io(PathBuf, io::Error),
    Cmp(CmpError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Crypto(e) => write!(f, "Cannot load certificates: {}", e),
            CliError::Io(path, e) => write!(f, "Cannot access '{}': {}", path.display(), e),
            CliError::Cmp(e) => write!(f, "Cannot produce a response: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<CryptoError> for CliError {
    fn from(e: CryptoError) -> Self {
        CliError::Crypto(e)
    }
}

impl From<CmpError> for CliError {
    fn from(e: CmpError) -> Self {
        CliError::Cmp(e)
    }
}

//============ Tests =========================================================
