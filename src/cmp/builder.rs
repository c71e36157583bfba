//! Assembling protected response messages.

use der::asn1::Null;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::Certificate;

use crate::commons::error::{CmpError, CmpResult, ImplFailure};

use super::header::{null_dn, HeaderTemplate};
use super::msg::{
    CertId, CertOrEncCert, CertRepMessage, CertResponse, CertifiedKeyPair, PkiBody, PkiHeader,
    PkiMessage, PkiStatusInfo, RevRepContent,
};
use super::protection::ProtectionStrategy;

//------------ PkiMessageBuilder ---------------------------------------------

/// Builds a single response message.
///
/// The protection is computed in [`build`][Self::build], after header and
/// body are final.
#[derive(Debug)]
pub struct PkiMessageBuilder {
    strategy: Option<ProtectionStrategy>,
    header: Option<PkiHeader>,
    body: Option<PkiBody>,
    extra_certs: Vec<Certificate>,
}

impl PkiMessageBuilder {
    pub fn new(strategy: ProtectionStrategy) -> Self {
        PkiMessageBuilder {
            strategy: Some(strategy),
            header: None,
            body: None,
            extra_certs: Vec::new(),
        }
    }

    /// Creates a builder for a message without protection.
    ///
    /// Only for errors that occur before we know how to protect anything.
    pub fn unprotected() -> Self {
        PkiMessageBuilder {
            strategy: None,
            header: None,
            body: None,
            extra_certs: Vec::new(),
        }
    }

    /// Sets the header from the template plus the strategy's metadata.
    pub fn add_header(mut self, template: HeaderTemplate) -> CmpResult<Self> {
        let header = match &self.strategy {
            Some(strategy) => template.into_header(
                strategy.sender(),
                Some(strategy.protection_alg()?),
                strategy.sender_kid(),
            ),
            None => template.into_header(null_dn(), None, None),
        };
        self.header = Some(header);
        Ok(self)
    }

    pub fn add_body(mut self, body: PkiBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds certificates to send along with the message.
    ///
    /// They are merged with the certificates the protection needs, without
    /// duplicates and in order, when the message is built.
    pub fn add_extra_certs(mut self, chain: &[Certificate]) -> Self {
        self.extra_certs.extend_from_slice(chain);
        self
    }

    pub fn build(self) -> CmpResult<PkiMessage> {
        let header = self
            .header
            .ok_or_else(|| CmpError::plain(ImplFailure::BuilderMissingHeader))?;
        let body = self
            .body
            .ok_or_else(|| CmpError::plain(ImplFailure::BuilderMissingBody))?;

        let mut extra_certs: Vec<Certificate> = Vec::new();
        let protecting = self
            .strategy
            .as_ref()
            .map(ProtectionStrategy::protecting_extra_certs)
            .unwrap_or_default();
        for cert in protecting.iter().chain(self.extra_certs.iter()) {
            if !extra_certs.contains(cert) {
                extra_certs.push(cert.clone())
            }
        }

        let protection = match &self.strategy {
            Some(strategy) => Some(strategy.create_protection(&header, &body)?),
            None => None,
        };

        Ok(PkiMessage {
            header,
            body,
            protection,
            extra_certs: if extra_certs.is_empty() {
                None
            } else {
                Some(extra_certs)
            },
        })
    }
}

//------------ Bodies --------------------------------------------------------

/// Creates the ip, cp or kup answering an ir, cr or kur.
///
/// The response is for the first certificate request in the request.
pub fn create_ip_cp_kup_body(
    request_body: &PkiBody,
    certificate: &Certificate,
    ca_certs: &[Certificate],
) -> CmpResult<PkiBody> {
    let (reqs, into_body): (_, fn(CertRepMessage) -> PkiBody) = match request_body {
        PkiBody::Ir(reqs) => (reqs, PkiBody::Ip),
        PkiBody::Cr(reqs) => (reqs, PkiBody::Cp),
        PkiBody::Kur(reqs) => (reqs, PkiBody::Kup),
        _ => {
            return Err(CmpError::new(
                ImplFailure::BuilderUnsupportedRequest,
                format!("expected ir, cr or kur, got {}", request_body.body_type()),
            ));
        }
    };
    let cert_req_id = reqs.first().map(|req| req.cert_req.cert_req_id).unwrap_or(0);

    Ok(into_body(CertRepMessage {
        ca_pubs: if ca_certs.is_empty() {
            None
        } else {
            Some(ca_certs.to_vec())
        },
        response: vec![CertResponse {
            cert_req_id,
            status: PkiStatusInfo::accepted(),
            certified_key_pair: Some(CertifiedKeyPair {
                cert_or_enc_cert: CertOrEncCert::Certificate(certificate.clone()),
                private_key: None,
                publication_info: None,
            }),
            rsp_info: None,
        }],
    }))
}

/// Creates the rp answering an rr, accepting every revocation.
///
/// `revCerts` has to be in the order of the status list, so it is only
/// included if every revocation names issuer and serial number.
pub fn create_rp_body(request_body: &PkiBody) -> CmpResult<PkiBody> {
    let details = match request_body {
        PkiBody::Rr(details) => details,
        _ => {
            return Err(CmpError::new(
                ImplFailure::BuilderUnsupportedRevocation,
                format!("expected rr, got {}", request_body.body_type()),
            ));
        }
    };

    let rev_certs: Option<Vec<_>> = details
        .iter()
        .map(|detail| {
            let template = &detail.cert_details;
            match (&template.issuer, &template.serial_number) {
                (Some(issuer), Some(serial)) => Some(CertId {
                    issuer: GeneralName::DirectoryName(issuer.clone()),
                    serial_number: serial.clone(),
                }),
                _ => None,
            }
        })
        .collect();

    Ok(PkiBody::Rp(RevRepContent {
        status: details.iter().map(|_| PkiStatusInfo::accepted()).collect(),
        rev_certs: rev_certs.filter(|certs| !certs.is_empty()),
        crls: None,
    }))
}

pub fn create_pki_conf_body() -> PkiBody {
    PkiBody::PkiConf(Null)
}

pub fn create_error_body(err: &CmpError) -> CmpResult<PkiBody> {
    err.to_error_msg_content()
        .map(PkiBody::Error)
        .map_err(|e| CmpError::new(ImplFailure::ErrorBodyEncoding, e))
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;
    use std::sync::Arc;

    use bytes::Bytes;
    use der::asn1::OctetString;
    use x509_cert::name::Name;
    use x509_cert::serial_number::SerialNumber;

    use crate::cmp::algorithms::{MacAlg, OwfAlg};
    use crate::cmp::header::derive_header_template;
    use crate::cmp::msg::{CertTemplate, PkiHeader, RevDetails, PVNO_CMP2000};
    use crate::cmp::protection::{InboundProtection, PbmProtection, SharedSecretMaterial};
    use crate::commons::error::FailureInfo;

    fn strategy() -> ProtectionStrategy {
        let material = SharedSecretMaterial::new(
            Bytes::from_static(b"secret"),
            Some(Name::from_str("CN=RA").unwrap()),
            None,
            10,
            16,
            OwfAlg::Sha256,
            MacAlg::HmacSha256,
        )
        .unwrap();
        ProtectionStrategy::SharedSecret(PbmProtection::new(Arc::new(material)))
    }

    fn inbound_header() -> PkiHeader {
        PkiHeader {
            pvno: PVNO_CMP2000,
            sender: GeneralName::DirectoryName(Name::from_str("CN=device").unwrap()),
            recipient: null_dn(),
            message_time: None,
            protection_alg: None,
            sender_kid: None,
            recip_kid: None,
            trans_id: Some(OctetString::new(b"T1".to_vec()).unwrap()),
            sender_nonce: Some(OctetString::new(vec![7u8; 16]).unwrap()),
            recip_nonce: None,
            free_text: None,
            general_info: None,
        }
    }

    #[test]
    fn build_requires_header_and_body() {
        let err = PkiMessageBuilder::new(strategy())
            .add_body(create_pki_conf_body())
            .build()
            .unwrap_err();
        assert_eq!(err.failure(), ImplFailure::BuilderMissingHeader);

        let template = derive_header_template(&inbound_header()).unwrap();
        let err = PkiMessageBuilder::new(strategy())
            .add_header(template)
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.failure(), ImplFailure::BuilderMissingBody);
        assert_eq!(err.failure_info(), FailureInfo::SystemFailure);
    }

    #[test]
    fn built_message_is_protected_last() {
        let template = derive_header_template(&inbound_header()).unwrap();
        let msg = PkiMessageBuilder::new(strategy())
            .add_header(template)
            .unwrap()
            .add_body(create_pki_conf_body())
            .add_extra_certs(&[])
            .build()
            .unwrap();

        assert!(msg.extra_certs.is_none());
        assert_eq!(
            msg.header.sender,
            GeneralName::DirectoryName(Name::from_str("CN=RA").unwrap())
        );
        match InboundProtection::of(&msg).unwrap() {
            InboundProtection::SharedSecret(settings) => {
                InboundProtection::verify_mac(&msg, &settings, b"secret").unwrap();
                assert!(InboundProtection::verify_mac(&msg, &settings, b"wrong").is_err());
            }
            _ => panic!("expected PBM protection"),
        }
    }

    #[test]
    fn unprotected_message_has_null_sender() {
        let template = derive_header_template(&inbound_header()).unwrap();
        let msg = PkiMessageBuilder::unprotected()
            .add_header(template)
            .unwrap()
            .add_body(create_pki_conf_body())
            .build()
            .unwrap();
        assert!(msg.protection.is_none());
        assert!(msg.header.protection_alg.is_none());
        assert_eq!(msg.header.sender, null_dn());
    }

    fn revocation(issuer: &str, serial: &[u8]) -> RevDetails {
        RevDetails {
            cert_details: CertTemplate {
                issuer: Some(Name::from_str(issuer).unwrap()),
                serial_number: Some(SerialNumber::new(serial).unwrap()),
                ..Default::default()
            },
            crl_entry_details: None,
        }
    }

    fn rp_for(rr: Vec<RevDetails>) -> RevRepContent {
        match create_rp_body(&PkiBody::Rr(rr)).unwrap() {
            PkiBody::Rp(rp) => rp,
            _ => panic!("expected rp"),
        }
    }

    #[test]
    fn revocation_response_needs_a_revocation_request() {
        let err = create_rp_body(&create_pki_conf_body()).unwrap_err();
        assert_eq!(err.failure(), ImplFailure::BuilderUnsupportedRevocation);
        assert_eq!(err.failure_info(), FailureInfo::SystemFailure);

        let err = create_rp_body(&PkiBody::Ir(Vec::new())).unwrap_err();
        assert_eq!(err.failure(), ImplFailure::BuilderUnsupportedRevocation);
        assert!(create_rp_body(&PkiBody::Rr(Vec::new())).is_ok());
    }

    #[test]
    fn rp_lists_revoked_certificates_in_status_order() {
        let rp = rp_for(vec![
            revocation("CN=CA", &[0x01, 0x02]),
            revocation("CN=Other CA", &[0x03]),
        ]);
        assert_eq!(rp.status.len(), 2);
        assert!(rp.status.iter().all(|status| *status == PkiStatusInfo::accepted()));

        let rev_certs = rp.rev_certs.unwrap();
        assert_eq!(rev_certs.len(), 2);
        assert_eq!(
            rev_certs[0].issuer,
            GeneralName::DirectoryName(Name::from_str("CN=CA").unwrap())
        );
        assert_eq!(rev_certs[1].serial_number, SerialNumber::new(&[0x03]).unwrap());
    }

    #[test]
    fn rp_omits_rev_certs_unless_all_are_named() {
        let rp = rp_for(vec![
            revocation("CN=CA", &[0x01, 0x02]),
            RevDetails {
                cert_details: CertTemplate::default(),
                crl_entry_details: None,
            },
        ]);
        assert_eq!(rp.status.len(), 2);
        assert!(rp.rev_certs.is_none());

        assert!(rp_for(Vec::new()).rev_certs.is_none());
    }

    #[test]
    fn error_body_carries_the_failure() {
        let err = CmpError::plain(ImplFailure::PopMissing);
        match create_error_body(&err).unwrap() {
            PkiBody::Error(content) => {
                let bits = content.pki_status_info.fail_info.unwrap();
                assert_eq!(FailureInfo::from_bit_string(&bits), vec![FailureInfo::BadPop]);
            }
            _ => panic!("expected error body"),
        }
    }
}
