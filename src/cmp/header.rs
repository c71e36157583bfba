//! Deriving the header of a response from the header of the request.

use std::time::SystemTime;

use der::asn1::{GeneralizedTime, OctetString};
use log::debug;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::RdnSequence;

use crate::commons::crypto;
use crate::commons::error::{CmpError, CmpResult, ImplFailure};
use crate::constants::SENDER_NONCE_LEN;

use super::msg::{InfoTypeAndValue, PkiHeader, PVNO_CMP2000};
use super::oid;

/// The NULL-DN, a directory name without any RDNs.
pub fn null_dn() -> GeneralName {
    GeneralName::DirectoryName(RdnSequence(Vec::new()))
}

//------------ HeaderTemplate ------------------------------------------------

/// The header fields of a response that don't depend on protection.
///
/// The sender, protection algorithm and key identifier are added when the
/// template is turned into a header by the message builder.
#[derive(Clone, Debug)]
pub struct HeaderTemplate {
    pub pvno: u8,
    pub recipient: GeneralName,
    pub message_time: GeneralizedTime,
    pub trans_id: Option<OctetString>,
    pub sender_nonce: OctetString,
    pub recip_nonce: Option<OctetString>,
    pub general_info: Option<Vec<InfoTypeAndValue>>,
}

impl HeaderTemplate {
    /// Creates a template not bound to any request.
    ///
    /// For answering data that could not be decoded as a PKIMessage.
    pub fn unbound() -> CmpResult<Self> {
        Ok(HeaderTemplate {
            pvno: PVNO_CMP2000,
            recipient: null_dn(),
            message_time: message_time()?,
            trans_id: None,
            sender_nonce: fresh_nonce()?,
            recip_nonce: None,
            general_info: None,
        })
    }

    /// Drops `implicitConfirm` from the general info unless allowed.
    pub fn retain_implicit_confirm(&mut self, allowed: bool) {
        if allowed {
            return;
        }
        if let Some(infos) = self.general_info.take() {
            let infos: Vec<_> = infos
                .into_iter()
                .filter(|info| info.info_type != oid::IT_IMPLICIT_CONFIRM)
                .collect();
            if !infos.is_empty() {
                self.general_info = Some(infos);
            }
        }
    }

    pub fn has_implicit_confirm(&self) -> bool {
        self.general_info
            .iter()
            .flatten()
            .any(|info| info.info_type == oid::IT_IMPLICIT_CONFIRM)
    }

    pub fn into_header(
        self,
        sender: GeneralName,
        protection_alg: Option<AlgorithmIdentifierOwned>,
        sender_kid: Option<OctetString>,
    ) -> PkiHeader {
        PkiHeader {
            pvno: self.pvno,
            sender,
            recipient: self.recipient,
            message_time: Some(self.message_time),
            protection_alg,
            sender_kid,
            recip_kid: None,
            trans_id: self.trans_id,
            sender_nonce: Some(self.sender_nonce),
            recip_nonce: self.recip_nonce,
            free_text: None,
            general_info: self.general_info,
        }
    }
}

/// Derives the response header template from a request header.
///
/// The transaction ID is copied, the sender nonce of the request becomes
/// our recipient nonce, and we reply to whoever sent the request.
pub fn derive_header_template(inbound: &PkiHeader) -> CmpResult<HeaderTemplate> {
    let template = HeaderTemplate {
        pvno: inbound.pvno,
        recipient: inbound.sender.clone(),
        message_time: message_time()?,
        trans_id: inbound.trans_id.clone(),
        sender_nonce: fresh_nonce()?,
        recip_nonce: inbound.sender_nonce.clone(),
        general_info: inbound.general_info.clone(),
    };

    debug!(
        "Derived response header: transaction {}, recipient nonce {}",
        template.trans_id.as_ref().map(|t| hex::encode(t.as_bytes())).unwrap_or_default(),
        template.recip_nonce.as_ref().map(|n| hex::encode(n.as_bytes())).unwrap_or_default(),
    );

    Ok(template)
}

fn message_time() -> CmpResult<GeneralizedTime> {
    GeneralizedTime::from_system_time(SystemTime::now())
        .map_err(|e| CmpError::new(ImplFailure::MessageTimeUnavailable, e))
}

fn fresh_nonce() -> CmpResult<OctetString> {
    OctetString::new(crypto::random_bytes(SENDER_NONCE_LEN))
        .map_err(|e| CmpError::new(ImplFailure::NonceEncoding, e))
}

//============ Tests =========================================================
