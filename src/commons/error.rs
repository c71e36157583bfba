//! The failure taxonomy of the CMP engine.
//!
//! Every failure has two faces. The [`FailureInfo`] is the RFC 4210
//! `PKIFailureInfo` bit the peer gets to see. The [`ImplFailure`] is our own
//! diagnostic entry: a unique code and description, each raised at exactly
//! one place in the engine, so that a log line leads back to one check.

use std::fmt;

use bytes::Bytes;
use der::asn1::BitString;

use crate::cmp::msg::{ErrorMsgContent, PkiStatus, PkiStatusInfo};

//------------ FailureInfo ---------------------------------------------------

/// The `PKIFailureInfo` values of RFC 4210, section 5.2.3.
///
/// The discriminant is the bit number on the wire. These must never be
/// renumbered.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum FailureInfo {
    BadAlg = 0,
    BadMessageCheck = 1,
    BadRequest = 2,
    BadTime = 3,
    BadCertId = 4,
    BadDataFormat = 5,
    WrongAuthority = 6,
    IncorrectData = 7,
    MissingTimeStamp = 8,
    BadPop = 9,
    CertRevoked = 10,
    CertConfirmed = 11,
    WrongIntegrity = 12,
    BadRecipientNonce = 13,
    TimeNotAvailable = 14,
    UnacceptedPolicy = 15,
    UnacceptedExtension = 16,
    AddInfoNotAvailable = 17,
    BadSenderNonce = 18,
    BadCertTemplate = 19,
    SignerNotTrusted = 20,
    TransactionIdInUse = 21,
    UnsupportedVersion = 22,
    NotAuthorized = 23,
    SystemUnavail = 24,
    SystemFailure = 25,
    DuplicateCertReq = 26,
}

impl FailureInfo {
    const ALL: [FailureInfo; 27] = [
        FailureInfo::BadAlg,
        FailureInfo::BadMessageCheck,
        FailureInfo::BadRequest,
        FailureInfo::BadTime,
        FailureInfo::BadCertId,
        FailureInfo::BadDataFormat,
        FailureInfo::WrongAuthority,
        FailureInfo::IncorrectData,
        FailureInfo::MissingTimeStamp,
        FailureInfo::BadPop,
        FailureInfo::CertRevoked,
        FailureInfo::CertConfirmed,
        FailureInfo::WrongIntegrity,
        FailureInfo::BadRecipientNonce,
        FailureInfo::TimeNotAvailable,
        FailureInfo::UnacceptedPolicy,
        FailureInfo::UnacceptedExtension,
        FailureInfo::AddInfoNotAvailable,
        FailureInfo::BadSenderNonce,
        FailureInfo::BadCertTemplate,
        FailureInfo::SignerNotTrusted,
        FailureInfo::TransactionIdInUse,
        FailureInfo::UnsupportedVersion,
        FailureInfo::NotAuthorized,
        FailureInfo::SystemUnavail,
        FailureInfo::SystemFailure,
        FailureInfo::DuplicateCertReq,
    ];

    /// The bit number in the PKIFailureInfo bit string.
    pub fn bit(self) -> u8 {
        self as u8
    }

    /// The bit number as the integer the RFC assigns to the name.
    pub fn code(self) -> i32 {
        i32::from(self.bit())
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.get(usize::from(bit)).copied()
    }

    /// Encodes this value as a DER named bit list with only this bit set.
    ///
    /// DER requires trailing zero bits to be dropped, so the string ends
    /// with the byte that holds our bit.
    pub fn to_bit_string(self) -> Result<BitString, der::Error> {
        let bit = usize::from(self.bit());
        let mut bytes = vec![0u8; bit / 8 + 1];
        bytes[bit / 8] = 0x80 >> (bit % 8);
        let unused = 7 - (bit % 8) as u8;
        BitString::new(unused, bytes)
    }

    /// Returns all failure bits set in a PKIFailureInfo bit string.
    pub fn from_bit_string(bits: &BitString) -> Vec<Self> {
        let mut res = Vec::new();
        for (idx, byte) in bits.raw_bytes().iter().enumerate() {
            for shift in 0..8 {
                if byte & (0x80 >> shift) != 0 {
                    let bit = idx * 8 + shift;
                    if let Some(info) = u8::try_from(bit).ok().and_then(Self::from_bit) {
                        res.push(info)
                    }
                }
            }
        }
        res
    }

    pub fn name(self) -> &'static str {
        match self {
            FailureInfo::BadAlg => "badAlg",
            FailureInfo::BadMessageCheck => "badMessageCheck",
            FailureInfo::BadRequest => "badRequest",
            FailureInfo::BadTime => "badTime",
            FailureInfo::BadCertId => "badCertId",
            FailureInfo::BadDataFormat => "badDataFormat",
            FailureInfo::WrongAuthority => "wrongAuthority",
            FailureInfo::IncorrectData => "incorrectData",
            FailureInfo::MissingTimeStamp => "missingTimeStamp",
            FailureInfo::BadPop => "badPOP",
            FailureInfo::CertRevoked => "certRevoked",
            FailureInfo::CertConfirmed => "certConfirmed",
            FailureInfo::WrongIntegrity => "wrongIntegrity",
            FailureInfo::BadRecipientNonce => "badRecipientNonce",
            FailureInfo::TimeNotAvailable => "timeNotAvailable",
            FailureInfo::UnacceptedPolicy => "unacceptedPolicy",
            FailureInfo::UnacceptedExtension => "unacceptedExtension",
            FailureInfo::AddInfoNotAvailable => "addInfoNotAvailable",
            FailureInfo::BadSenderNonce => "badSenderNonce",
            FailureInfo::BadCertTemplate => "badCertTemplate",
            FailureInfo::SignerNotTrusted => "signerNotTrusted",
            FailureInfo::TransactionIdInUse => "transactionIdInUse",
            FailureInfo::UnsupportedVersion => "unsupportedVersion",
            FailureInfo::NotAuthorized => "notAuthorized",
            FailureInfo::SystemUnavail => "systemUnavail",
            FailureInfo::SystemFailure => "systemFailure",
            FailureInfo::DuplicateCertReq => "duplicateCertReq",
        }
    }
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

//------------ ImplFailure ---------------------------------------------------

/// Implementation level failures.
///
/// Each entry is raised from exactly one place. Add a new entry rather than
/// reusing an existing one.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ImplFailure {
    //-----------------------------------------------------------------
    // Transport and controller (1000-1099)
    //-----------------------------------------------------------------

    // 1000
    RequestNotDecodable,

    // 1001
    ProfileUnknown,

    //-----------------------------------------------------------------
    // Service (2000-2099)
    //-----------------------------------------------------------------

    // 2000
    BodyTypeUnsupported,

    // 2001
    BuilderUnsupportedRequest,

    // 2002
    BuilderMissingHeader,

    // 2003
    BuilderMissingBody,

    // 2004
    ProtectionMaterialMissing,

    // 2005
    ResponseEncoding,

    // 2006
    NoCertRequests,

    // 2007
    CaChainUnusable,

    // 2008
    BuilderUnsupportedRevocation,

    // 2009
    ErrorBodyEncoding,

    // 2010
    MessageTimeUnavailable,

    // 2011
    NonceEncoding,

    //-----------------------------------------------------------------
    // Validation (3000-3099)
    //-----------------------------------------------------------------

    // 3000
    VersionUnsupported,

    // 3001
    TransactionIdMissing,

    // 3002
    SenderNonceInvalid,

    // Mobile network (3GPP) profile (3010-3019)

    // 3010
    MobileIrMultipleRequests,

    // 3011
    MobileIrPublicKeyMissing,

    // 3012
    MobileExtraCertsMissing,

    // 3013
    MobileRequestUnsupported,

    // 3014
    MobileResponseUnsupported,

    //-----------------------------------------------------------------
    // Proof of possession (4000-4099)
    //-----------------------------------------------------------------

    // 4000
    PopMissing,

    // 4001
    PopRaVerifiedNotAccepted,

    // 4002
    PopInputUnsupported,

    // 4003
    PopMethodUnsupported,

    // 4004
    PopPublicKeyMissing,

    // 4005
    PopAlgUnsupported,

    // 4006
    PopSignatureInvalid,

    // 4007
    PopInputEncoding,

    //-----------------------------------------------------------------
    // Protection (5000-5099)
    //-----------------------------------------------------------------

    // 5000
    SignatureAlgUnresolved,

    // 5001
    SigningFailed,

    // 5002
    ProtectedPartEncoding,

    // 5003
    ProtectionEncoding,

    // 5010
    MacFailed,

    // 5011
    PbmParameterEncoding,

    // 5020
    RequestProtectionMissing,

    // 5021
    RequestProtectionMismatch,

    // 5022
    RequestProtectionAlgUnsupported,

    // 5023
    RequestSignerCertMissing,

    // 5024
    RequestSignatureInvalid,

    // 5025
    RequestPbmParametersInvalid,

    // 5026
    RequestMacInvalid,

    // 5027
    RequestSecretMissing,

    // 5028
    RequestProtectedPartEncoding,

    // 5030
    ErrorResponseUnprotectable,
}

impl ImplFailure {
    pub fn code(self) -> u16 {
        match self {
            ImplFailure::RequestNotDecodable => 1000,
            ImplFailure::ProfileUnknown => 1001,

            ImplFailure::BodyTypeUnsupported => 2000,
            ImplFailure::BuilderUnsupportedRequest => 2001,
            ImplFailure::BuilderMissingHeader => 2002,
            ImplFailure::BuilderMissingBody => 2003,
            ImplFailure::ProtectionMaterialMissing => 2004,
            ImplFailure::ResponseEncoding => 2005,
            ImplFailure::NoCertRequests => 2006,
            ImplFailure::CaChainUnusable => 2007,
            ImplFailure::BuilderUnsupportedRevocation => 2008,
            ImplFailure::ErrorBodyEncoding => 2009,
            ImplFailure::MessageTimeUnavailable => 2010,
            ImplFailure::NonceEncoding => 2011,

            ImplFailure::VersionUnsupported => 3000,
            ImplFailure::TransactionIdMissing => 3001,
            ImplFailure::SenderNonceInvalid => 3002,
            ImplFailure::MobileIrMultipleRequests => 3010,
            ImplFailure::MobileIrPublicKeyMissing => 3011,
            ImplFailure::MobileExtraCertsMissing => 3012,
            ImplFailure::MobileRequestUnsupported => 3013,
            ImplFailure::MobileResponseUnsupported => 3014,

            ImplFailure::PopMissing => 4000,
            ImplFailure::PopRaVerifiedNotAccepted => 4001,
            ImplFailure::PopInputUnsupported => 4002,
            ImplFailure::PopMethodUnsupported => 4003,
            ImplFailure::PopPublicKeyMissing => 4004,
            ImplFailure::PopAlgUnsupported => 4005,
            ImplFailure::PopSignatureInvalid => 4006,
            ImplFailure::PopInputEncoding => 4007,

            ImplFailure::SignatureAlgUnresolved => 5000,
            ImplFailure::SigningFailed => 5001,
            ImplFailure::ProtectedPartEncoding => 5002,
            ImplFailure::ProtectionEncoding => 5003,
            ImplFailure::MacFailed => 5010,
            ImplFailure::PbmParameterEncoding => 5011,
            ImplFailure::RequestProtectionMissing => 5020,
            ImplFailure::RequestProtectionMismatch => 5021,
            ImplFailure::RequestProtectionAlgUnsupported => 5022,
            ImplFailure::RequestSignerCertMissing => 5023,
            ImplFailure::RequestSignatureInvalid => 5024,
            ImplFailure::RequestPbmParametersInvalid => 5025,
            ImplFailure::RequestMacInvalid => 5026,
            ImplFailure::RequestSecretMissing => 5027,
            ImplFailure::RequestProtectedPartEncoding => 5028,
            ImplFailure::ErrorResponseUnprotectable => 5030,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ImplFailure::RequestNotDecodable => "Request is not a decodable PKIMessage",
            ImplFailure::ProfileUnknown => "No enrollment profile with this name",

            ImplFailure::BodyTypeUnsupported => "Request body type is not supported",
            ImplFailure::BuilderUnsupportedRequest => {
                "Certificate response requested for a body that is not ir, cr or kur"
            }
            ImplFailure::BuilderMissingHeader => "Message built without a header",
            ImplFailure::BuilderMissingBody => "Message built without a body",
            ImplFailure::ProtectionMaterialMissing => {
                "Profile lacks key material for its protection method"
            }
            ImplFailure::ResponseEncoding => "Response could not be DER encoded",
            ImplFailure::NoCertRequests => "Request contains no certificate requests",
            ImplFailure::CaChainUnusable => "CA chain of the issued certificate cannot be used",
            ImplFailure::BuilderUnsupportedRevocation => {
                "Revocation response requested for a body that is not rr"
            }
            ImplFailure::ErrorBodyEncoding => "Error body could not be encoded",
            ImplFailure::MessageTimeUnavailable => "Message time could not be encoded",
            ImplFailure::NonceEncoding => "Sender nonce could not be encoded",

            ImplFailure::VersionUnsupported => "Unsupported protocol version",
            ImplFailure::TransactionIdMissing => "Request has no transactionID",
            ImplFailure::SenderNonceInvalid => "Request senderNonce is missing or too short",
            ImplFailure::MobileIrMultipleRequests => {
                "Mobile profile permits exactly one certificate request per ir"
            }
            ImplFailure::MobileIrPublicKeyMissing => {
                "Mobile profile requires the public key in the certificate template"
            }
            ImplFailure::MobileExtraCertsMissing => {
                "Mobile profile requires extraCerts in certificate responses"
            }
            ImplFailure::MobileRequestUnsupported => {
                "Mobile profile does not support this request body"
            }
            ImplFailure::MobileResponseUnsupported => {
                "Mobile profile does not support this response body"
            }

            ImplFailure::PopMissing => "Certificate request lacks proof of possession",
            ImplFailure::PopRaVerifiedNotAccepted => {
                "raVerified proof of possession is not accepted by this profile"
            }
            ImplFailure::PopInputUnsupported => {
                "Signature proof of possession with poposkInput is not supported"
            }
            ImplFailure::PopMethodUnsupported => {
                "Only signature based proof of possession is supported"
            }
            ImplFailure::PopPublicKeyMissing => {
                "Proof of possession cannot be checked without a public key"
            }
            ImplFailure::PopAlgUnsupported => "Proof of possession algorithm not supported",
            ImplFailure::PopSignatureInvalid => "Proof of possession signature is invalid",
            ImplFailure::PopInputEncoding => {
                "Certificate request could not be encoded to check its proof of possession"
            }

            ImplFailure::SignatureAlgUnresolved => "No usable signature algorithm",
            ImplFailure::SigningFailed => "Creating the protection signature failed",
            ImplFailure::ProtectedPartEncoding => {
                "Protected part of the response could not be encoded"
            }
            ImplFailure::ProtectionEncoding => "Protection value could not be encoded",
            ImplFailure::MacFailed => "Computing the protection MAC failed",
            ImplFailure::PbmParameterEncoding => {
                "PBMParameter of the response could not be encoded"
            }
            ImplFailure::RequestProtectionMissing => "Request is not protected",
            ImplFailure::RequestProtectionMismatch => {
                "Request protection does not match the profile's protection method"
            }
            ImplFailure::RequestProtectionAlgUnsupported => {
                "Request protection algorithm not supported"
            }
            ImplFailure::RequestSignerCertMissing => {
                "Signed request does not carry the signer certificate"
            }
            ImplFailure::RequestSignatureInvalid => "Request signature does not verify",
            ImplFailure::RequestPbmParametersInvalid => "Request PBMParameter is invalid",
            ImplFailure::RequestMacInvalid => "Request MAC does not verify",
            ImplFailure::RequestSecretMissing => {
                "Profile lacks the shared secret to verify the request"
            }
            ImplFailure::RequestProtectedPartEncoding => {
                "Protected part of the request could not be encoded"
            }
            ImplFailure::ErrorResponseUnprotectable => "Error response could not be protected",
        }
    }

    /// The protocol failure the peer sees for this failure.
    pub fn failure_info(self) -> FailureInfo {
        match self {
            ImplFailure::RequestNotDecodable => FailureInfo::SystemFailure,
            ImplFailure::ProfileUnknown => FailureInfo::BadRequest,

            ImplFailure::BodyTypeUnsupported => FailureInfo::BadRequest,
            ImplFailure::BuilderUnsupportedRequest
            | ImplFailure::BuilderUnsupportedRevocation
            | ImplFailure::BuilderMissingHeader
            | ImplFailure::BuilderMissingBody
            | ImplFailure::ProtectionMaterialMissing
            | ImplFailure::ResponseEncoding
            | ImplFailure::ErrorBodyEncoding
            | ImplFailure::MessageTimeUnavailable
            | ImplFailure::NonceEncoding
            | ImplFailure::CaChainUnusable => FailureInfo::SystemFailure,
            ImplFailure::NoCertRequests => FailureInfo::BadDataFormat,

            ImplFailure::VersionUnsupported => FailureInfo::UnsupportedVersion,
            ImplFailure::TransactionIdMissing => FailureInfo::BadDataFormat,
            ImplFailure::SenderNonceInvalid => FailureInfo::BadSenderNonce,
            ImplFailure::MobileIrMultipleRequests => FailureInfo::BadDataFormat,
            ImplFailure::MobileIrPublicKeyMissing => FailureInfo::BadCertTemplate,
            ImplFailure::MobileExtraCertsMissing => FailureInfo::BadDataFormat,
            ImplFailure::MobileRequestUnsupported
            | ImplFailure::MobileResponseUnsupported => FailureInfo::BadRequest,

            ImplFailure::PopAlgUnsupported => FailureInfo::BadAlg,
            ImplFailure::PopMissing
            | ImplFailure::PopRaVerifiedNotAccepted
            | ImplFailure::PopInputUnsupported
            | ImplFailure::PopMethodUnsupported
            | ImplFailure::PopPublicKeyMissing
            | ImplFailure::PopSignatureInvalid => FailureInfo::BadPop,
            ImplFailure::PopInputEncoding => FailureInfo::SystemFailure,

            ImplFailure::SignatureAlgUnresolved
            | ImplFailure::SigningFailed
            | ImplFailure::ProtectedPartEncoding
            | ImplFailure::ProtectionEncoding
            | ImplFailure::MacFailed
            | ImplFailure::PbmParameterEncoding
            | ImplFailure::RequestSecretMissing
            | ImplFailure::ErrorResponseUnprotectable => FailureInfo::SystemFailure,

            ImplFailure::RequestProtectionMismatch => FailureInfo::WrongIntegrity,
            ImplFailure::RequestProtectionAlgUnsupported
            | ImplFailure::RequestPbmParametersInvalid => FailureInfo::BadAlg,
            ImplFailure::RequestProtectionMissing
            | ImplFailure::RequestSignerCertMissing
            | ImplFailure::RequestSignatureInvalid
            | ImplFailure::RequestMacInvalid
            | ImplFailure::RequestProtectedPartEncoding => FailureInfo::BadMessageCheck,
        }
    }
}

impl fmt::Display for ImplFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.description())
    }
}

//------------ CmpError ------------------------------------------------------

pub type CmpResult<T> = Result<T, CmpError>;

/// A failure while answering a CMP request.
#[derive(Clone, Debug)]
pub struct CmpError {
    failure_info: FailureInfo,
    failure: ImplFailure,
    detail: String,
    transaction_id: Option<Bytes>,
}

impl CmpError {
    pub fn new(failure: ImplFailure, detail: impl fmt::Display) -> Self {
        CmpError {
            failure_info: failure.failure_info(),
            failure,
            detail: detail.to_string(),
            transaction_id: None,
        }
    }

    /// Creates an error whose detail is the entry's description.
    pub fn plain(failure: ImplFailure) -> Self {
        Self::new(failure, failure.description())
    }

    /// Attaches the transaction of the request, unless already set.
    pub fn in_transaction(mut self, transaction_id: Option<&[u8]>) -> Self {
        if self.transaction_id.is_none() {
            self.transaction_id = transaction_id.map(Bytes::copy_from_slice);
        }
        self
    }

    pub fn failure_info(&self) -> FailureInfo {
        self.failure_info
    }

    /// The wire value of the failure info.
    pub fn protocol_failure_info(&self) -> i32 {
        self.failure_info.code()
    }

    pub fn failure(&self) -> ImplFailure {
        self.failure
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn transaction_id(&self) -> Option<&Bytes> {
        self.transaction_id.as_ref()
    }

    /// The same failure, shown to the peer as `systemFailure`.
    ///
    /// An unprotected error message cannot be authenticated, so it must not
    /// claim anything more specific.
    pub fn to_system_failure(&self) -> Self {
        CmpError {
            failure_info: FailureInfo::SystemFailure,
            ..self.clone()
        }
    }

    /// Converts the error into the content of an error body.
    ///
    /// The implementation code goes into `errorCode`, the description into
    /// the status string and the detail into `errorDetails`.
    pub fn to_error_msg_content(&self) -> Result<ErrorMsgContent, der::Error> {
        Ok(ErrorMsgContent {
            pki_status_info: PkiStatusInfo {
                status: PkiStatus::Rejection,
                status_string: Some(vec![self.failure.description().to_string()]),
                fail_info: Some(self.failure_info.to_bit_string()?),
            },
            error_code: Some(i64::from(self.failure.code())),
            error_details: Some(vec![self.detail.clone()]),
        })
    }
}

impl fmt::Display for CmpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}): {}", self.failure, self.failure_info, self.detail)?;
        if let Some(tid) = &self.transaction_id {
            write!(f, " [transaction {}]", hex::encode(tid))?;
        }
        Ok(())
    }
}

impl std::error::Error for CmpError {}

//============ Tests =========================================================
