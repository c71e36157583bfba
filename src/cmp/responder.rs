//! Answering requests.
//!
//! The [`Responder`] turns a validated request into a protected response.
//! Every failure along the way becomes an error body, protected the same
//! way a success would have been. Only when that is impossible does an
//! unprotected error go out.

use der::Decode;
use log::{error, info, warn};
use x509_cert::Certificate;

use crate::commons::error::{CmpError, CmpResult, ImplFailure};

use super::builder::{
    create_error_body, create_ip_cp_kup_body, create_pki_conf_body, create_rp_body,
    PkiMessageBuilder,
};
use super::context::{ConfigurationContext, RequestedCertificate};
use super::header::{derive_header_template, null_dn, HeaderTemplate};
use super::msg::{BodyType, PkiBody, PkiHeader, PkiMessage};

/// Decodes a request received from the transport.
pub fn decode_request(bytes: &[u8]) -> CmpResult<PkiMessage> {
    PkiMessage::from_der(bytes).map_err(|e| CmpError::new(ImplFailure::RequestNotDecodable, e))
}

//------------ IssuedCertificate ---------------------------------------------

/// A certificate issued by the backend, with the chain of its issuer.
#[derive(Clone, Debug)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub ca_certs: Vec<Certificate>,
}

//------------ Response ------------------------------------------------------

/// A response ready for the transport.
///
/// If the response is an error, the failure is kept for logging.
#[derive(Clone, Debug)]
pub struct Response {
    message: PkiMessage,
    failure: Option<CmpError>,
}

impl Response {
    pub fn message(&self) -> &PkiMessage {
        &self.message
    }

    pub fn failure(&self) -> Option<&CmpError> {
        self.failure.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.failure.is_some()
    }

    pub fn body_type(&self) -> BodyType {
        self.message.body.body_type()
    }

    pub fn into_message(self) -> PkiMessage {
        self.message
    }

    pub fn to_bytes(&self) -> CmpResult<Vec<u8>> {
        self.message
            .to_bytes()
            .map_err(|e| CmpError::new(ImplFailure::ResponseEncoding, e))
    }

    /// Creates an unprotected error response.
    ///
    /// Used when no profile applies, e.g. because the request could not
    /// be decoded. The request header is used for transaction binding if
    /// there is one. The peer only sees `systemFailure`, while
    /// [`failure`][Self::failure] keeps the original error.
    pub fn unprotected_error(err: CmpError, inbound: Option<&PkiHeader>) -> CmpResult<Self> {
        let err = err.in_transaction(
            inbound
                .and_then(|header| header.trans_id.as_ref())
                .map(|tid| tid.as_bytes()),
        );
        warn!("Answering with unprotected error: {}", err);
        let message = unprotected_message(&err, inbound)?;
        Ok(Response {
            message,
            failure: Some(err),
        })
    }
}

/// Builds an unprotected error message, always classified `systemFailure`.
fn unprotected_message(err: &CmpError, inbound: Option<&PkiHeader>) -> CmpResult<PkiMessage> {
    let mut template = match inbound {
        Some(header) => derive_header_template(header)?,
        None => HeaderTemplate::unbound()?,
    };
    template.recipient = null_dn();
    template.retain_implicit_confirm(false);

    PkiMessageBuilder::unprotected()
        .add_header(template)?
        .add_body(create_error_body(&err.to_system_failure())?)
        .build()
}

//------------ Responder -----------------------------------------------------

/// Answers a single request.
#[derive(Clone, Debug)]
pub struct Responder {
    context: ConfigurationContext,
}

impl Responder {
    pub fn new(context: ConfigurationContext) -> Self {
        Responder { context }
    }

    pub fn context(&self) -> &ConfigurationContext {
        &self.context
    }

    /// Validates the request and answers it.
    ///
    /// Certificate requests are passed to `issue`, which is expected to
    /// return the issued certificate with its CA chain.
    pub fn respond<F>(&self, issue: F) -> CmpResult<Response>
    where
        F: FnOnce(&[RequestedCertificate]) -> CmpResult<IssuedCertificate>,
    {
        if let Err(err) = self.validate_request() {
            return self.error_response(err);
        }

        match self.context.inbound().body.body_type() {
            body_type if body_type.is_crmf_request() => {
                match issue(&self.context.requested_certificates()) {
                    Ok(issued) => self.certificate_response(&issued.certificate, &issued.ca_certs),
                    Err(err) => self.error_response(err),
                }
            }
            BodyType::CertConf => self.confirm_response(),
            BodyType::Rr => self.revocation_response(),
            other => self.error_response(CmpError::new(
                ImplFailure::BodyTypeUnsupported,
                format!("body type {}", other),
            )),
        }
    }

    pub fn validate_request(&self) -> CmpResult<()> {
        self.context.validate_request()
    }

    /// Answers an ir, cr or kur with the issued certificate.
    pub fn certificate_response(
        &self,
        certificate: &Certificate,
        ca_certs: &[Certificate],
    ) -> CmpResult<Response> {
        match self.build_certificate_response(certificate, ca_certs) {
            Ok(message) => Ok(self.success(message)),
            Err(err) => self.error_response(err),
        }
    }

    fn build_certificate_response(
        &self,
        certificate: &Certificate,
        ca_certs: &[Certificate],
    ) -> CmpResult<PkiMessage> {
        let body = create_ip_cp_kup_body(&self.context.inbound().body, certificate, ca_certs)?;
        let extra_certs = self.context.response_extra_certs(ca_certs)?;

        let message = PkiMessageBuilder::new(self.context.protection_strategy()?)
            .add_header(self.context.header_template()?)?
            .add_body(body)
            .add_extra_certs(&extra_certs)
            .build()?;

        self.context.validate_on_crmf_response(&message)?;
        Ok(message)
    }

    /// Answers a certConf with a pkiConf.
    pub fn confirm_response(&self) -> CmpResult<Response> {
        match self.build_protected(create_pki_conf_body()) {
            Ok(message) => Ok(self.success(message)),
            Err(err) => self.error_response(err),
        }
    }

    /// Answers an rr once the backend has revoked the certificates.
    pub fn revocation_response(&self) -> CmpResult<Response> {
        let message = create_rp_body(&self.context.inbound().body)
            .and_then(|body| self.build_protected(body));
        match message {
            Ok(message) => Ok(self.success(message)),
            Err(err) => self.error_response(err),
        }
    }

    /// Converts a failure into a protected error response.
    ///
    /// Falls back to an unprotected error if protecting fails as well.
    pub fn error_response(&self, err: CmpError) -> CmpResult<Response> {
        let err = err.in_transaction(self.context.transaction_id());
        warn!(
            "Answering {} with error {} ({}): {}",
            self.context.inbound().body.body_type(),
            err.failure().code(),
            err.failure_info(),
            err.detail()
        );

        let message = match create_error_body(&err).and_then(|body| self.build_protected(body)) {
            Ok(message) => message,
            Err(protect_err) => {
                error!("Cannot protect error response: {}", protect_err);
                let fallback = CmpError::new(
                    ImplFailure::ErrorResponseUnprotectable,
                    protect_err.detail(),
                );
                unprotected_message(&fallback, Some(&self.context.inbound().header))?
            }
        };

        Ok(Response {
            message,
            failure: Some(err),
        })
    }

    /// Builds a protected message that doesn't confirm anything implicitly.
    fn build_protected(&self, body: PkiBody) -> CmpResult<PkiMessage> {
        let mut template = self.context.header_template()?;
        template.retain_implicit_confirm(false);
        PkiMessageBuilder::new(self.context.protection_strategy()?)
            .add_header(template)?
            .add_body(body)
            .build()
    }

    fn success(&self, message: PkiMessage) -> Response {
        info!(
            "Answering {} in transaction {} with {}",
            self.context.inbound().body.body_type(),
            self.context.transaction_id().map(hex::encode).unwrap_or_default(),
            message.body.body_type(),
        );
        Response {
            message,
            failure: None,
        }
    }
}

//============ Tests =========================================================
