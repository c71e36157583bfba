//! The CMP message structures.
//!
//! These are the parts of the RFC 4210 (CMP) and RFC 4211 (CRMF) grammar
//! the responder reads or writes, declared on top of the `der` crate. The
//! CMP module uses explicit tagging, the CRMF module implicit tagging, so
//! watch the `tag_mode` attributes when comparing with the RFC text.

use std::fmt;

use der::asn1::{Any, BitString, GeneralizedTime, Null, ObjectIdentifier, OctetString};
use der::{Choice, Decode, Encode, Enumerated, Sequence};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::ext::Extensions;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;
use x509_cert::{Certificate, Version};

//------------ PkiMessage ----------------------------------------------------

/// A complete CMP message.
///
/// ```text
/// PKIMessage ::= SEQUENCE {
///     header           PKIHeader,
///     body             PKIBody,
///     protection   [0] PKIProtection OPTIONAL,
///     extraCerts   [1] SEQUENCE SIZE (1..MAX) OF CMPCertificate OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiMessage {
    pub header: PkiHeader,
    pub body: PkiBody,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub protection: Option<BitString>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub extra_certs: Option<Vec<Certificate>>,
}

impl PkiMessage {
    /// Decodes a DER encoded message as received from the transport.
    pub fn decode(bytes: &[u8]) -> Result<Self, der::Error> {
        Self::from_der(bytes)
    }

    /// Returns the DER encoding for transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>, der::Error> {
        self.to_der()
    }

    /// Returns the DER encoding of the part covered by the protection.
    pub fn protected_part(&self) -> Result<Vec<u8>, der::Error> {
        ProtectedPart::encode_for(&self.header, &self.body)
    }

    pub fn extra_certs(&self) -> &[Certificate] {
        self.extra_certs.as_deref().unwrap_or_default()
    }
}

//------------ ProtectedPart -------------------------------------------------

/// The structure over which protection is calculated.
///
/// ```text
/// ProtectedPart ::= SEQUENCE {
///     header    PKIHeader,
///     body      PKIBody }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ProtectedPart {
    pub header: PkiHeader,
    pub body: PkiBody,
}

impl ProtectedPart {
    pub fn encode_for(
        header: &PkiHeader,
        body: &PkiBody,
    ) -> Result<Vec<u8>, der::Error> {
        ProtectedPart {
            header: header.clone(),
            body: body.clone(),
        }
        .to_der()
    }
}

//------------ PkiHeader -----------------------------------------------------

pub const PVNO_CMP1999: u8 = 1;
pub const PVNO_CMP2000: u8 = 2;
pub const PVNO_CMP2021: u8 = 3;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiHeader {
    pub pvno: u8,
    pub sender: GeneralName,
    pub recipient: GeneralName,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub message_time: Option<GeneralizedTime>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub protection_alg: Option<AlgorithmIdentifierOwned>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    pub sender_kid: Option<OctetString>,
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", optional = "true")]
    pub recip_kid: Option<OctetString>,
    #[asn1(context_specific = "4", tag_mode = "EXPLICIT", optional = "true")]
    pub trans_id: Option<OctetString>,
    #[asn1(context_specific = "5", tag_mode = "EXPLICIT", optional = "true")]
    pub sender_nonce: Option<OctetString>,
    #[asn1(context_specific = "6", tag_mode = "EXPLICIT", optional = "true")]
    pub recip_nonce: Option<OctetString>,
    #[asn1(context_specific = "7", tag_mode = "EXPLICIT", optional = "true")]
    pub free_text: Option<PkiFreeText>,
    #[asn1(context_specific = "8", tag_mode = "EXPLICIT", optional = "true")]
    pub general_info: Option<Vec<InfoTypeAndValue>>,
}

/// `PKIFreeText ::= SEQUENCE SIZE (1..MAX) OF UTF8String`
pub type PkiFreeText = Vec<String>;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct InfoTypeAndValue {
    pub info_type: ObjectIdentifier,
    pub info_value: Option<Any>,
}

//------------ PkiBody -------------------------------------------------------

/// The message body.
///
/// Only the body types the responder answers or produces are listed. A
/// message with any other body fails to decode and is answered with an
/// unprotected error.
#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum PkiBody {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", constructed = "true")]
    Ir(CertReqMessages),
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    Ip(CertRepMessage),
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    Cr(CertReqMessages),
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", constructed = "true")]
    Cp(CertRepMessage),
    #[asn1(context_specific = "7", tag_mode = "EXPLICIT", constructed = "true")]
    Kur(CertReqMessages),
    #[asn1(context_specific = "8", tag_mode = "EXPLICIT", constructed = "true")]
    Kup(CertRepMessage),
    #[asn1(context_specific = "11", tag_mode = "EXPLICIT", constructed = "true")]
    Rr(RevReqContent),
    #[asn1(context_specific = "12", tag_mode = "EXPLICIT", constructed = "true")]
    Rp(RevRepContent),
    #[asn1(context_specific = "19", tag_mode = "EXPLICIT", constructed = "true")]
    PkiConf(Null),
    #[asn1(context_specific = "23", tag_mode = "EXPLICIT", constructed = "true")]
    Error(ErrorMsgContent),
    #[asn1(context_specific = "24", tag_mode = "EXPLICIT", constructed = "true")]
    CertConf(CertConfirmContent),
}

impl PkiBody {
    pub fn body_type(&self) -> BodyType {
        match self {
            PkiBody::Ir(_) => BodyType::Ir,
            PkiBody::Ip(_) => BodyType::Ip,
            PkiBody::Cr(_) => BodyType::Cr,
            PkiBody::Cp(_) => BodyType::Cp,
            PkiBody::Kur(_) => BodyType::Kur,
            PkiBody::Kup(_) => BodyType::Kup,
            PkiBody::Rr(_) => BodyType::Rr,
            PkiBody::Rp(_) => BodyType::Rp,
            PkiBody::PkiConf(_) => BodyType::PkiConf,
            PkiBody::Error(_) => BodyType::Error,
            PkiBody::CertConf(_) => BodyType::CertConf,
        }
    }

    /// Returns the certificate requests of an ir, cr or kur.
    pub fn cert_requests(&self) -> Option<&CertReqMessages> {
        match self {
            PkiBody::Ir(reqs) | PkiBody::Cr(reqs) | PkiBody::Kur(reqs) => {
                Some(reqs)
            }
            _ => None,
        }
    }

    /// Returns the certificate responses of an ip, cp or kup.
    pub fn cert_response(&self) -> Option<&CertRepMessage> {
        match self {
            PkiBody::Ip(rep) | PkiBody::Cp(rep) | PkiBody::Kup(rep) => {
                Some(rep)
            }
            _ => None,
        }
    }
}

//------------ BodyType ------------------------------------------------------

/// The body type, numbered as the context tags of the PKIBody choice.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum BodyType {
    Ir = 0,
    Ip = 1,
    Cr = 2,
    Cp = 3,
    Kur = 7,
    Kup = 8,
    Rr = 11,
    Rp = 12,
    PkiConf = 19,
    Error = 23,
    CertConf = 24,
}

impl BodyType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_crmf_request(self) -> bool {
        matches!(self, BodyType::Ir | BodyType::Cr | BodyType::Kur)
    }

    pub fn is_crmf_response(self) -> bool {
        matches!(self, BodyType::Ip | BodyType::Cp | BodyType::Kup)
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            BodyType::Ir => "ir",
            BodyType::Ip => "ip",
            BodyType::Cr => "cr",
            BodyType::Cp => "cp",
            BodyType::Kur => "kur",
            BodyType::Kup => "kup",
            BodyType::Rr => "rr",
            BodyType::Rp => "rp",
            BodyType::PkiConf => "pkiconf",
            BodyType::Error => "error",
            BodyType::CertConf => "certConf",
        };
        f.write_str(name)
    }
}

//------------ CRMF Requests -------------------------------------------------

pub type CertReqMessages = Vec<CertReqMsg>;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertReqMsg {
    pub cert_req: CertRequest,
    pub popo: Option<ProofOfPossession>,
    pub reg_info: Option<Vec<AttributeTypeAndValue>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertRequest {
    pub cert_req_id: i64,
    pub cert_template: CertTemplate,
    pub controls: Option<Vec<AttributeTypeAndValue>>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Sequence)]
pub struct CertTemplate {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub version: Option<Version>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub serial_number: Option<SerialNumber>,
    #[asn1(
        context_specific = "2",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub signing_alg: Option<AlgorithmIdentifierOwned>,
    #[asn1(
        context_specific = "3",
        tag_mode = "EXPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub issuer: Option<Name>,
    #[asn1(
        context_specific = "4",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub validity: Option<OptionalValidity>,
    #[asn1(
        context_specific = "5",
        tag_mode = "EXPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub subject: Option<Name>,
    #[asn1(
        context_specific = "6",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub public_key: Option<SubjectPublicKeyInfoOwned>,
    #[asn1(context_specific = "7", tag_mode = "IMPLICIT", optional = "true")]
    pub issuer_uid: Option<BitString>,
    #[asn1(context_specific = "8", tag_mode = "IMPLICIT", optional = "true")]
    pub subject_uid: Option<BitString>,
    #[asn1(
        context_specific = "9",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OptionalValidity {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub not_before: Option<Time>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub not_after: Option<Time>,
}

//------------ Proof of Possession -------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum ProofOfPossession {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    RaVerified(Null),
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Signature(PopoSigningKey),
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    KeyEncipherment(Any),
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", constructed = "true")]
    KeyAgreement(Any),
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PopoSigningKey {
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub poposk_input: Option<PoposkInput>,
    pub algorithm_identifier: AlgorithmIdentifierOwned,
    pub signature: BitString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PoposkInput {
    pub auth_info: PoposkAuthInfo,
    pub public_key: SubjectPublicKeyInfoOwned,
}

#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum PoposkAuthInfo {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", constructed = "true")]
    Sender(GeneralName),
    PublicKeyMac(PkMacValue),
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkMacValue {
    pub alg_id: AlgorithmIdentifierOwned,
    pub value: BitString,
}

//------------ CRMF Responses ------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertRepMessage {
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub ca_pubs: Option<Vec<Certificate>>,
    pub response: Vec<CertResponse>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertResponse {
    pub cert_req_id: i64,
    pub status: PkiStatusInfo,
    pub certified_key_pair: Option<CertifiedKeyPair>,
    pub rsp_info: Option<OctetString>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertifiedKeyPair {
    pub cert_or_enc_cert: CertOrEncCert,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub private_key: Option<Any>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub publication_info: Option<Any>,
}

#[derive(Clone, Debug, Eq, PartialEq, Choice)]
#[allow(clippy::large_enum_variant)]
pub enum CertOrEncCert {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", constructed = "true")]
    Certificate(Certificate),
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    EncryptedCert(Any),
}

//------------ Status --------------------------------------------------------

#[derive(Clone, Copy, Debug, Enumerated, Eq, PartialEq)]
#[asn1(type = "INTEGER")]
#[repr(u8)]
pub enum PkiStatus {
    Accepted = 0,
    GrantedWithMods = 1,
    Rejection = 2,
    Waiting = 3,
    RevocationWarning = 4,
    RevocationNotification = 5,
    KeyUpdateWarning = 6,
}

/// ```text
/// PKIStatusInfo ::= SEQUENCE {
///     status        PKIStatus,
///     statusString  PKIFreeText     OPTIONAL,
///     failInfo      PKIFailureInfo  OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiStatusInfo {
    pub status: PkiStatus,
    pub status_string: Option<PkiFreeText>,
    pub fail_info: Option<BitString>,
}

impl PkiStatusInfo {
    pub fn accepted() -> Self {
        PkiStatusInfo {
            status: PkiStatus::Accepted,
            status_string: None,
            fail_info: None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ErrorMsgContent {
    pub pki_status_info: PkiStatusInfo,
    pub error_code: Option<i64>,
    pub error_details: Option<PkiFreeText>,
}

//------------ Confirmation --------------------------------------------------

pub type CertConfirmContent = Vec<CertStatus>;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertStatus {
    pub cert_hash: OctetString,
    pub cert_req_id: i64,
    pub status_info: Option<PkiStatusInfo>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub hash_alg: Option<AlgorithmIdentifierOwned>,
}

//------------ Revocation ----------------------------------------------------

pub type RevReqContent = Vec<RevDetails>;

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct RevDetails {
    pub cert_details: CertTemplate,
    pub crl_entry_details: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct RevRepContent {
    pub status: Vec<PkiStatusInfo>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub rev_certs: Option<Vec<CertId>>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub crls: Option<Vec<Any>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertId {
    pub issuer: GeneralName,
    pub serial_number: SerialNumber,
}

//------------ Password Based MAC --------------------------------------------

/// ```text
/// PBMParameter ::= SEQUENCE {
///     salt                OCTET STRING,
///     owf                 AlgorithmIdentifier,
///     iterationCount      INTEGER,
///     mac                 AlgorithmIdentifier }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PbmParameter {
    pub salt: OctetString,
    pub owf: AlgorithmIdentifierOwned,
    pub iteration_count: u32,
    pub mac: AlgorithmIdentifierOwned,
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    use x509_cert::name::RdnSequence;

    fn header() -> PkiHeader {
        PkiHeader {
            pvno: PVNO_CMP2000,
            sender: GeneralName::DirectoryName(
                Name::from_str("CN=client").unwrap(),
            ),
            recipient: GeneralName::DirectoryName(RdnSequence(Vec::new())),
            message_time: None,
            protection_alg: None,
            sender_kid: None,
            recip_kid: None,
            trans_id: Some(OctetString::new(vec![1u8; 16]).unwrap()),
            sender_nonce: Some(OctetString::new(vec![2u8; 16]).unwrap()),
            recip_nonce: None,
            free_text: Some(vec!["hello".to_string()]),
            general_info: None,
        }
    }

    #[test]
    fn decode_encoded_ir() {
        let template = CertTemplate {
            subject: Some(Name::from_str("CN=device").unwrap()),
            ..Default::default()
        };
        let msg = PkiMessage {
            header: header(),
            body: PkiBody::Ir(vec![CertReqMsg {
                cert_req: CertRequest {
                    cert_req_id: 0,
                    cert_template: template,
                    controls: None,
                },
                popo: Some(ProofOfPossession::RaVerified(Null)),
                reg_info: None,
            }]),
            protection: None,
            extra_certs: None,
        };

        let der = msg.to_bytes().unwrap();
        let decoded = PkiMessage::decode(&der).unwrap();
        assert_eq!(msg, decoded);
        assert_eq!(decoded.body.body_type(), BodyType::Ir);
        assert_eq!(decoded.body.cert_requests().map(Vec::len), Some(1));
    }

    #[test]
    fn pki_conf_body_is_explicit_null() {
        let body = PkiBody::PkiConf(Null);
        // [19] constructed, length 2, NULL
        assert_eq!(body.to_der().unwrap(), vec![0xb3, 0x02, 0x05, 0x00]);
    }

    #[test]
    fn body_type_numbers_follow_the_choice_tags() {
        assert_eq!(BodyType::Ir.code(), 0);
        assert_eq!(BodyType::Kup.code(), 8);
        assert_eq!(BodyType::Error.code(), 23);
        assert!(BodyType::Kur.is_crmf_request());
        assert!(!BodyType::Rr.is_crmf_request());
        assert!(BodyType::Cp.is_crmf_response());
    }
}
