//! The options of the `cmpserv` binary.

use std::fs;
use std::path::PathBuf;

use base64::Engine;
use clap::Parser;
use log::info;

use crate::cmp::responder::{decode_request, IssuedCertificate, Responder, Response};
use crate::commons::crypto;
use crate::config::Config;
use crate::constants;
use crate::profiles::Profiles;

use super::report::{CliError, ReportFormat, ResponseReport};

//------------ Command -------------------------------------------------------

#[derive(clap::Parser)]
#[command(version, about = constants::CMPSERV_APP)]
pub enum Command {
    /// Answer a DER encoded CMP request with an issued certificate
    Respond(Respond),
}

impl Command {
    /// Creates the options from the process arguments.
    ///
    /// If the arguments won’t result in usable options, exits the process.
    pub fn from_args() -> Self {
        Self::parse()
    }
}

//------------ Respond -------------------------------------------------------

#[derive(clap::Args)]
pub struct Respond {
    /// Path to config file.
    #[arg(
        long, short,
        value_name = "path",
        default_value = constants::CMPSERV_DEFAULT_CONFIG_FILE,
    )]
    pub config: PathBuf,

    /// The enrollment profile to answer with.
    #[arg(long, short, value_name = "name")]
    pub profile: String,

    /// Path to the DER encoded request.
    #[arg(long, short, value_name = "path")]
    pub request: PathBuf,

    /// Path to the issued certificate in PEM format.
    #[arg(long, value_name = "path")]
    pub certificate: PathBuf,

    /// Path to the CA chain of the issued certificate in PEM format.
    #[arg(long, value_name = "path")]
    pub ca_certs: Option<PathBuf>,

    /// Where to write the DER encoded response. Printed as base64 if absent.
    #[arg(long, short, value_name = "path")]
    pub out: Option<PathBuf>,

    /// Report format
    #[arg(
        short, long,
        env = "CMPSERV_CLI_FORMAT",
        default_value = "text",
    )]
    pub format: ReportFormat,
}

impl Respond {
    pub fn run(self) -> Result<ResponseReport, CliError> {
        let config = Config::parse(&self.config)?;
        config.init_logging()?;
        self.respond(&config)
    }

    /// Answers the request with the profiles of an already parsed config.
    pub fn respond(self, config: &Config) -> Result<ResponseReport, CliError> {
        let profiles = Profiles::from_config(config)?;

        let issued = self.issued_certificate()?;
        let request = fs::read(&self.request)
            .map_err(|e| CliError::Io(self.request.clone(), e))?;

        let response = match decode_request(&request) {
            Err(err) => Response::unprotected_error(err, None)?,
            Ok(msg) => {
                let header = msg.header.clone();
                match profiles.context_for(&self.profile, msg) {
                    Err(err) => Response::unprotected_error(err, Some(&header))?,
                    Ok(context) => Responder::new(context).respond(|requested| {
                        info!("Handing out certificate for {} request(s)", requested.len());
                        Ok(issued)
                    })?,
                }
            }
        };

        let der = response.to_bytes()?;
        let encoded = match &self.out {
            Some(path) => {
                fs::write(path, &der).map_err(|e| CliError::Io(path.clone(), e))?;
                None
            }
            None => Some(base64::engine::general_purpose::STANDARD.encode(&der)),
        };

        Ok(ResponseReport::new(&response, self.out, encoded))
    }

    fn issued_certificate(&self) -> Result<IssuedCertificate, CliError> {
        let mut certs = crypto::load_certificates(&self.certificate)?;
        let certificate = certs.remove(0);
        let ca_certs = match &self.ca_certs {
            Some(path) => crypto::load_certificates(path)?,
            None => Vec::new(),
        };
        Ok(IssuedCertificate {
            certificate,
            ca_certs,
        })
    }
}
