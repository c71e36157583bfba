//! The per-request configuration of the engine.

use std::sync::Arc;

use log::debug;
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::Extensions;
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::commons::error::{CmpError, CmpResult, ImplFailure};
use crate::constants::MIN_PEER_NONCE_LEN;

use super::header::{derive_header_template, HeaderTemplate};
use super::msg::{PkiMessage, PVNO_CMP2000, PVNO_CMP2021};
use super::pop::PopPolicy;
use super::profile::ProfileKind;
use super::protection::{
    InboundProtection, PbmProtection, ProtectionMethod, ProtectionStrategy, SharedSecretMaterial,
    SignatureProtection, SigningMaterial,
};

//------------ ProfilePolicy -------------------------------------------------

/// The settings of one enrollment profile.
///
/// Key material is shared, so cloning a policy is cheap.
#[derive(Clone, Debug)]
pub struct ProfilePolicy {
    pub name: String,
    pub kind: ProfileKind,
    pub request_protection: ProtectionMethod,
    pub response_protection: ProtectionMethod,
    pub signing: Option<Arc<SigningMaterial>>,
    pub shared_secret: Option<Arc<SharedSecretMaterial>>,
    pub recipient: Option<Name>,
    pub implicit_confirm: bool,
    pub pop: PopPolicy,
}

//------------ RequestedCertificate ------------------------------------------

/// What a certificate request asks for, as needed by the issuing backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestedCertificate {
    pub cert_req_id: i64,
    pub subject: Option<Name>,
    pub public_key: Option<SubjectPublicKeyInfoOwned>,
    pub extensions: Option<Extensions>,
}

//------------ ConfigurationContext ------------------------------------------

/// Everything the engine needs to answer one request.
///
/// A context is created for a single request and dropped with it.
#[derive(Clone, Debug)]
pub struct ConfigurationContext {
    inbound: PkiMessage,
    policy: ProfilePolicy,
}

impl ConfigurationContext {
    pub fn new(inbound: PkiMessage, policy: ProfilePolicy) -> Self {
        ConfigurationContext { inbound, policy }
    }

    pub fn inbound(&self) -> &PkiMessage {
        &self.inbound
    }

    pub fn policy(&self) -> &ProfilePolicy {
        &self.policy
    }

    pub fn kind(&self) -> ProfileKind {
        self.policy.kind
    }

    pub fn transaction_id(&self) -> Option<&[u8]> {
        self.inbound.header.trans_id.as_ref().map(|tid| tid.as_bytes())
    }

    /// Returns the strategy protecting the response.
    pub fn protection_strategy(&self) -> CmpResult<ProtectionStrategy> {
        match self.policy.response_protection {
            ProtectionMethod::Signature => {
                let material = self.signing_material()?;
                SignatureProtection::new(
                    material.clone(),
                    self.inbound.header.protection_alg.as_ref(),
                )
                .map(ProtectionStrategy::Signature)
            }
            ProtectionMethod::SharedSecret => {
                let material = self.shared_secret_material()?;
                Ok(ProtectionStrategy::SharedSecret(PbmProtection::new(material.clone())))
            }
        }
    }

    fn signing_material(&self) -> CmpResult<&Arc<SigningMaterial>> {
        self.policy
            .signing
            .as_ref()
            .ok_or_else(|| self.material_missing(ProtectionMethod::Signature))
    }

    fn shared_secret_material(&self) -> CmpResult<&Arc<SharedSecretMaterial>> {
        self.policy
            .shared_secret
            .as_ref()
            .ok_or_else(|| self.material_missing(ProtectionMethod::SharedSecret))
    }

    fn material_missing(&self, method: ProtectionMethod) -> CmpError {
        CmpError::new(
            ImplFailure::ProtectionMaterialMissing,
            format!("profile '{}' has no material for {}", self.policy.name, method),
        )
    }

    /// The recipient of the response.
    pub fn recipient(&self) -> GeneralName {
        match &self.policy.recipient {
            Some(name) => GeneralName::DirectoryName(name.clone()),
            None => self.inbound.header.sender.clone(),
        }
    }

    /// Derives the response header template for the request.
    pub fn header_template(&self) -> CmpResult<HeaderTemplate> {
        let mut template = derive_header_template(&self.inbound.header)?;
        template.recipient = self.recipient();
        template.retain_implicit_confirm(self.policy.implicit_confirm);
        Ok(template)
    }

    /// Validates the request before any response is built for it.
    pub fn validate_request(&self) -> CmpResult<()> {
        let header = &self.inbound.header;

        if header.pvno != PVNO_CMP2000 && header.pvno != PVNO_CMP2021 {
            return Err(CmpError::new(
                ImplFailure::VersionUnsupported,
                format!("pvno {}", header.pvno),
            ));
        }
        if header.trans_id.is_none() {
            return Err(CmpError::plain(ImplFailure::TransactionIdMissing));
        }
        let nonce_len = header.sender_nonce.as_ref().map(|n| n.as_bytes().len()).unwrap_or(0);
        if nonce_len < MIN_PEER_NONCE_LEN {
            return Err(CmpError::new(
                ImplFailure::SenderNonceInvalid,
                format!("senderNonce of {} octets", nonce_len),
            ));
        }

        self.verify_request_protection()?;

        if let Some(reqs) = self.inbound.body.cert_requests() {
            if reqs.is_empty() {
                return Err(CmpError::plain(ImplFailure::NoCertRequests));
            }
            self.validate_on_crmf_request()?;
            for req in reqs {
                self.policy.pop.verify(req)?;
            }
        }
        Ok(())
    }

    fn verify_request_protection(&self) -> CmpResult<()> {
        let protection = InboundProtection::of(&self.inbound)?;
        if protection.method() != self.policy.request_protection {
            return Err(CmpError::new(
                ImplFailure::RequestProtectionMismatch,
                format!(
                    "expected {}, got {}",
                    self.policy.request_protection,
                    protection.method()
                ),
            ));
        }
        match protection {
            InboundProtection::Signature(alg) => {
                InboundProtection::verify_signature(&self.inbound, alg)?
            }
            InboundProtection::SharedSecret(settings) => {
                let material = self.policy.shared_secret.as_ref().ok_or_else(|| {
                    CmpError::new(
                        ImplFailure::RequestSecretMissing,
                        format!("profile '{}'", self.policy.name),
                    )
                })?;
                InboundProtection::verify_mac(&self.inbound, &settings, material.secret())?
            }
        }
        debug!("Verified {} protection of request", self.policy.request_protection);
        Ok(())
    }

    /// Runs the profile checks on a CRMF request.
    pub fn validate_on_crmf_request(&self) -> CmpResult<()> {
        self.policy.kind.validate_request(&self.inbound)
    }

    /// Runs the profile checks on a finished CRMF response.
    pub fn validate_on_crmf_response(&self, response: &PkiMessage) -> CmpResult<()> {
        self.policy.kind.validate_response(response)
    }

    /// Certificates the profile adds to a certificate response.
    pub fn response_extra_certs(&self, ca_certs: &[Certificate]) -> CmpResult<Vec<Certificate>> {
        self.policy.kind.response_extra_certs(ca_certs)
    }

    /// Returns what each certificate request of the request asks for.
    pub fn requested_certificates(&self) -> Vec<RequestedCertificate> {
        self.inbound
            .body
            .cert_requests()
            .into_iter()
            .flatten()
            .map(|req| {
                let template = &req.cert_req.cert_template;
                RequestedCertificate {
                    cert_req_id: req.cert_req.cert_req_id,
                    subject: template.subject.clone(),
                    public_key: template.public_key.clone(),
                    extensions: template.extensions.clone(),
                }
            })
            .collect()
    }
}
