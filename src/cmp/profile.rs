//! Profile specific checks on top of the generic engine.

use std::fmt;

use log::debug;
use serde::Deserialize;
use x509_cert::Certificate;

use crate::commons::error::{CmpError, CmpResult, ImplFailure};

use super::msg::{PkiBody, PkiMessage};
use super::protection::filter_self_signed;

//------------ ProfileKind ---------------------------------------------------

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    #[default]
    Generic,

    /// The 3GPP profile for mobile network equipment, TS 33.310.
    Mobile3gpp,
}

impl ProfileKind {
    /// Checks a CRMF request before anything is issued for it.
    pub fn validate_request(self, request: &PkiMessage) -> CmpResult<()> {
        match self {
            ProfileKind::Generic => Ok(()),
            ProfileKind::Mobile3gpp => validate_mobile_request(&request.body),
        }
    }

    /// Checks a CRMF response before it is handed to the transport.
    pub fn validate_response(self, response: &PkiMessage) -> CmpResult<()> {
        match self {
            ProfileKind::Generic => Ok(()),
            ProfileKind::Mobile3gpp => validate_mobile_response(response),
        }
    }

    /// Returns the certificates this profile adds to certificate responses.
    ///
    /// The mobile profile sends the issuer chain along, minus its roots.
    pub fn response_extra_certs(self, ca_certs: &[Certificate]) -> CmpResult<Vec<Certificate>> {
        match self {
            ProfileKind::Generic => Ok(Vec::new()),
            ProfileKind::Mobile3gpp => filter_self_signed(ca_certs)
                .map_err(|e| CmpError::new(ImplFailure::CaChainUnusable, e)),
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProfileKind::Generic => write!(f, "generic"),
            ProfileKind::Mobile3gpp => write!(f, "mobile3gpp"),
        }
    }
}

fn validate_mobile_request(body: &PkiBody) -> CmpResult<()> {
    match body {
        PkiBody::Ir(reqs) => {
            if reqs.len() != 1 {
                return Err(CmpError::new(
                    ImplFailure::MobileIrMultipleRequests,
                    format!("ir carries {} certificate requests", reqs.len()),
                ));
            }
            let missing_key = reqs
                .iter()
                .any(|req| req.cert_req.cert_template.public_key.is_none());
            if missing_key {
                return Err(CmpError::plain(ImplFailure::MobileIrPublicKeyMissing));
            }
            Ok(())
        }
        PkiBody::Cr(_) | PkiBody::Kur(_) => {
            debug!("Mobile profile passes {} without further checks", body.body_type());
            Ok(())
        }
        _ => Err(CmpError::new(
            ImplFailure::MobileRequestUnsupported,
            format!("body type {}", body.body_type()),
        )),
    }
}

fn validate_mobile_response(response: &PkiMessage) -> CmpResult<()> {
    match &response.body {
        PkiBody::Ip(_) | PkiBody::Cp(_) | PkiBody::Kup(_) => {
            if response.extra_certs().is_empty() {
                Err(CmpError::new(
                    ImplFailure::MobileExtraCertsMissing,
                    format!("{} without extraCerts", response.body.body_type()),
                ))
            } else {
                Ok(())
            }
        }
        body => Err(CmpError::new(
            ImplFailure::MobileResponseUnsupported,
            format!("body type {}", body.body_type()),
        )),
    }
}

//============ Tests =========================================================
