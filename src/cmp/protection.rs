//! Message protection: signatures and password based MACs.
//!
//! The outbound side is the [`ProtectionStrategy`], one per response. The
//! inbound side is [`InboundProtection`], which tells what protection a
//! request carries and checks it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use der::asn1::{Any, BitString, ObjectIdentifier, OctetString};
use der::oid::AssociatedOid;
use der::Decode;
use der::Encode;
use log::debug;
use openssl::pkey::{PKey, Private};
use serde::Deserialize;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::commons::crypto::{self, CryptoError};
use crate::commons::error::{CmpError, CmpResult, ImplFailure};
use crate::constants::{PBM_MAX_ITERATIONS, PBM_MIN_SALT_LEN};

use super::algorithms::{MacAlg, OwfAlg, SignatureAlg};
use super::header::null_dn;
use super::msg::{PbmParameter, PkiBody, PkiHeader, PkiMessage, ProtectedPart};
use super::oid;

//------------ ProtectionMethod ----------------------------------------------

/// How messages of a profile are protected.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionMethod {
    Signature,
    SharedSecret,
}

impl fmt::Display for ProtectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtectionMethod::Signature => write!(f, "signature"),
            ProtectionMethod::SharedSecret => write!(f, "shared_secret"),
        }
    }
}

//------------ SigningMaterial -----------------------------------------------

/// A signing key with its certificate chain, loaded once at startup.
#[derive(Debug)]
pub struct SigningMaterial {
    key: PKey<Private>,
    chain: Vec<Certificate>,
    extra_certs: Vec<Certificate>,
    key_identifier: Option<OctetString>,
    default_alg: Option<SignatureAlg>,
}

impl SigningMaterial {
    /// Creates the material from a key and its chain, signer first.
    pub fn new(
        key: PKey<Private>,
        chain: Vec<Certificate>,
        default_alg: Option<SignatureAlg>,
    ) -> Result<Self, CryptoError> {
        let signer = chain.first().ok_or(CryptoError::NoSignerCertificate)?;
        if key.public_key_to_der()? != signer.tbs_certificate.subject_public_key_info.to_der()? {
            return Err(CryptoError::KeyMismatch);
        }

        let key_type = key.id();
        let usable = match default_alg {
            Some(alg) => alg.fits_key(key_type),
            None => SignatureAlg::default_for(key_type).is_some(),
        };
        if !usable {
            return Err(CryptoError::UnsupportedKey(format!("{:?}", key_type)));
        }

        let key_identifier = subject_key_identifier(signer)?;
        let extra_certs = filter_self_signed(&chain)?;

        Ok(SigningMaterial {
            key,
            chain,
            extra_certs,
            key_identifier,
            default_alg,
        })
    }

    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    pub fn signer(&self) -> &Certificate {
        // The constructor refuses an empty chain.
        &self.chain[0]
    }
}

fn subject_key_identifier(cert: &Certificate) -> Result<Option<OctetString>, der::Error> {
    for ext in cert.tbs_certificate.extensions.iter().flatten() {
        if ext.extn_id == SubjectKeyIdentifier::OID {
            let ski = SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes())?;
            return Ok(Some(ski.0));
        }
    }
    Ok(None)
}

/// Returns the certificates of a chain a peer needs to validate the signer.
///
/// A chain of a single certificate is returned as is. Longer chains lose
/// every certificate that verifies against its own key.
pub fn filter_self_signed(chain: &[Certificate]) -> Result<Vec<Certificate>, CryptoError> {
    if chain.len() == 1 {
        return Ok(chain.to_vec());
    }
    let mut res = Vec::new();
    for cert in chain {
        if !crypto::is_self_signed(cert)? {
            res.push(cert.clone())
        }
    }
    Ok(res)
}

//------------ SharedSecretMaterial ------------------------------------------

/// A shared secret with the parameters for protecting responses.
pub struct SharedSecretMaterial {
    secret: Bytes,
    sender: Option<Name>,
    sender_kid: Option<OctetString>,
    iterations: u32,
    salt_len: usize,
    owf: OwfAlg,
    mac: MacAlg,
}

impl SharedSecretMaterial {
    pub fn new(
        secret: Bytes,
        sender: Option<Name>,
        sender_kid: Option<&[u8]>,
        iterations: u32,
        salt_len: usize,
        owf: OwfAlg,
        mac: MacAlg,
    ) -> Result<Self, CryptoError> {
        let sender_kid = match sender_kid {
            Some(kid) => Some(OctetString::new(kid)?),
            None => None,
        };
        Ok(SharedSecretMaterial {
            secret,
            sender,
            sender_kid,
            iterations,
            salt_len,
            owf,
            mac,
        })
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for SharedSecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SharedSecretMaterial")
            .field("secret", &"<hidden>")
            .field("sender", &self.sender)
            .field("sender_kid", &self.sender_kid)
            .field("iterations", &self.iterations)
            .field("salt_len", &self.salt_len)
            .field("owf", &self.owf)
            .field("mac", &self.mac)
            .finish()
    }
}

//------------ PbmSettings ---------------------------------------------------

/// The parameters of a password based MAC.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PbmSettings {
    pub salt: Vec<u8>,
    pub iterations: u32,
    pub owf: OwfAlg,
    pub mac: MacAlg,
}

impl PbmSettings {
    /// Reads the settings from the parameters of `id-PasswordBasedMac`.
    ///
    /// Returns a reason on failure, the caller decides what it means.
    pub fn from_parameters(parameters: Option<&Any>) -> Result<Self, String> {
        let parameters = parameters.ok_or("PBMParameter missing")?;
        let der = parameters.to_der().map_err(|e| e.to_string())?;
        let param = PbmParameter::from_der(&der).map_err(|e| e.to_string())?;

        let owf = OwfAlg::from_oid(&param.owf.oid)
            .ok_or_else(|| format!("unsupported owf {}", param.owf.oid))?;
        let mac = MacAlg::from_oid(&param.mac.oid)
            .ok_or_else(|| format!("unsupported mac {}", param.mac.oid))?;
        let iterations = param.iteration_count;
        if iterations == 0 || iterations > PBM_MAX_ITERATIONS {
            return Err(format!("iteration count {} out of range", iterations));
        }
        let salt = param.salt.as_bytes().to_vec();
        if salt.len() < PBM_MIN_SALT_LEN {
            return Err(format!("salt of {} octets is too short", salt.len()));
        }

        Ok(PbmSettings {
            salt,
            iterations,
            owf,
            mac,
        })
    }

    pub fn to_parameter(&self) -> Result<PbmParameter, der::Error> {
        Ok(PbmParameter {
            salt: OctetString::new(self.salt.clone())?,
            owf: self.owf.algorithm_identifier(),
            iteration_count: self.iterations,
            mac: self.mac.algorithm_identifier(),
        })
    }

    /// Derives the MAC key.
    ///
    /// The OWF is applied to secret and salt, then to its own output, until
    /// it has been applied `iterations` times.
    pub fn derive_key(&self, secret: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let md = self.owf.digest();
        let mut input = Vec::with_capacity(secret.len() + self.salt.len());
        input.extend_from_slice(secret);
        input.extend_from_slice(&self.salt);

        let mut key = crypto::digest(md, &input)?;
        for _ in 1..self.iterations {
            key = crypto::digest(md, &key)?;
        }
        Ok(key)
    }

    pub fn compute(&self, secret: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self.derive_key(secret)?;
        crypto::hmac(self.mac.digest(), &key, data)
    }
}

//------------ ProtectionStrategy --------------------------------------------

/// The protection of one outbound message.
#[derive(Clone, Debug)]
pub enum ProtectionStrategy {
    Signature(SignatureProtection),
    SharedSecret(PbmProtection),
}

impl ProtectionStrategy {
    pub fn method(&self) -> ProtectionMethod {
        match self {
            ProtectionStrategy::Signature(_) => ProtectionMethod::Signature,
            ProtectionStrategy::SharedSecret(_) => ProtectionMethod::SharedSecret,
        }
    }

    pub fn protection_alg(&self) -> CmpResult<AlgorithmIdentifierOwned> {
        match self {
            ProtectionStrategy::Signature(sig) => Ok(sig.alg.algorithm_identifier()),
            ProtectionStrategy::SharedSecret(pbm) => pbm.protection_alg(),
        }
    }

    pub fn create_protection(&self, header: &PkiHeader, body: &PkiBody) -> CmpResult<BitString> {
        let data = ProtectedPart::encode_for(header, body)
            .map_err(|e| CmpError::new(ImplFailure::ProtectedPartEncoding, e))?;
        let value = match self {
            ProtectionStrategy::Signature(sig) => sig.sign(&data)?,
            ProtectionStrategy::SharedSecret(pbm) => pbm.mac(&data)?,
        };
        BitString::from_bytes(&value)
            .map_err(|e| CmpError::new(ImplFailure::ProtectionEncoding, e))
    }

    /// The certificates that must accompany a protected message.
    pub fn protecting_extra_certs(&self) -> &[Certificate] {
        match self {
            ProtectionStrategy::Signature(sig) => &sig.material.extra_certs,
            ProtectionStrategy::SharedSecret(_) => &[],
        }
    }

    pub fn sender(&self) -> GeneralName {
        match self {
            ProtectionStrategy::Signature(sig) => {
                GeneralName::DirectoryName(sig.material.signer().tbs_certificate.subject.clone())
            }
            ProtectionStrategy::SharedSecret(pbm) => match &pbm.material.sender {
                Some(name) => GeneralName::DirectoryName(name.clone()),
                None => null_dn(),
            },
        }
    }

    pub fn sender_kid(&self) -> Option<OctetString> {
        match self {
            ProtectionStrategy::Signature(sig) => sig.material.key_identifier.clone(),
            ProtectionStrategy::SharedSecret(pbm) => pbm.material.sender_kid.clone(),
        }
    }
}

//------------ SignatureProtection -------------------------------------------

#[derive(Clone, Debug)]
pub struct SignatureProtection {
    material: Arc<SigningMaterial>,
    alg: SignatureAlg,
}

impl SignatureProtection {
    /// Creates the strategy, answering in the request's algorithm if we can.
    pub fn new(
        material: Arc<SigningMaterial>,
        inbound_alg: Option<&AlgorithmIdentifierOwned>,
    ) -> CmpResult<Self> {
        let key_type = material.key.id();
        let alg = SignatureAlg::negotiate(inbound_alg, material.default_alg, key_type)
            .ok_or_else(|| {
                CmpError::new(
                    ImplFailure::SignatureAlgUnresolved,
                    format!("no signature algorithm for key type {:?}", key_type),
                )
            })?;
        debug!("Protecting response with signature algorithm {}", alg);
        Ok(SignatureProtection { material, alg })
    }

    pub fn alg(&self) -> SignatureAlg {
        self.alg
    }

    fn sign(&self, data: &[u8]) -> CmpResult<Vec<u8>> {
        crypto::sign(&self.material.key, self.alg.digest(), data)
            .map_err(|e| CmpError::new(ImplFailure::SigningFailed, e))
    }
}

//------------ PbmProtection -------------------------------------------------

#[derive(Clone, Debug)]
pub struct PbmProtection {
    material: Arc<SharedSecretMaterial>,
    settings: PbmSettings,
}

impl PbmProtection {
    /// Creates the strategy with a fresh random salt.
    pub fn new(material: Arc<SharedSecretMaterial>) -> Self {
        let settings = PbmSettings {
            salt: crypto::random_bytes(material.salt_len),
            iterations: material.iterations,
            owf: material.owf,
            mac: material.mac,
        };
        PbmProtection { material, settings }
    }

    pub fn settings(&self) -> &PbmSettings {
        &self.settings
    }

    fn protection_alg(&self) -> CmpResult<AlgorithmIdentifierOwned> {
        let parameters = self
            .settings
            .to_parameter()
            .and_then(|parameter| Any::encode_from(&parameter))
            .map_err(|e| CmpError::new(ImplFailure::PbmParameterEncoding, e))?;
        Ok(AlgorithmIdentifierOwned {
            oid: oid::PASSWORD_BASED_MAC,
            parameters: Some(parameters),
        })
    }

    fn mac(&self, data: &[u8]) -> CmpResult<Vec<u8>> {
        self.settings
            .compute(self.material.secret(), data)
            .map_err(|e| CmpError::new(ImplFailure::MacFailed, e))
    }
}

//------------ InboundProtection ---------------------------------------------

/// The protection found on a request.
#[derive(Clone, Debug)]
pub enum InboundProtection {
    Signature(SignatureAlg),
    SharedSecret(PbmSettings),
}

impl InboundProtection {
    pub fn of(msg: &PkiMessage) -> CmpResult<Self> {
        let alg = match (&msg.header.protection_alg, &msg.protection) {
            (Some(alg), Some(_)) => alg,
            _ => return Err(CmpError::plain(ImplFailure::RequestProtectionMissing)),
        };

        if alg.oid == oid::PASSWORD_BASED_MAC {
            PbmSettings::from_parameters(alg.parameters.as_ref())
                .map(InboundProtection::SharedSecret)
                .map_err(|reason| CmpError::new(ImplFailure::RequestPbmParametersInvalid, reason))
        } else {
            SignatureAlg::from_oid(&alg.oid)
                .map(InboundProtection::Signature)
                .ok_or_else(|| unsupported_alg(&alg.oid))
        }
    }

    pub fn method(&self) -> ProtectionMethod {
        match self {
            InboundProtection::Signature(_) => ProtectionMethod::Signature,
            InboundProtection::SharedSecret(_) => ProtectionMethod::SharedSecret,
        }
    }

    /// Verifies the signature with the first extra certificate.
    pub fn verify_signature(msg: &PkiMessage, alg: SignatureAlg) -> CmpResult<()> {
        let signer = msg
            .extra_certs()
            .first()
            .ok_or_else(|| CmpError::plain(ImplFailure::RequestSignerCertMissing))?;
        let data = request_protected_part(msg)?;
        let signature = protection_bytes(msg);

        let verified = crypto::public_key(&signer.tbs_certificate.subject_public_key_info)
            .and_then(|key| crypto::verify(&key, alg.digest(), &data, signature));
        let detail = match verified {
            Ok(true) => return Ok(()),
            Ok(false) => "signature mismatch".to_string(),
            Err(e) => e.to_string(),
        };
        Err(CmpError::new(ImplFailure::RequestSignatureInvalid, detail))
    }

    /// Verifies the MAC by recomputing it with our copy of the secret.
    pub fn verify_mac(msg: &PkiMessage, settings: &PbmSettings, secret: &[u8]) -> CmpResult<()> {
        let data = request_protected_part(msg)?;
        let expected = protection_bytes(msg);

        let detail = match settings.compute(secret, &data) {
            Ok(mac) if crypto::mac_eq(&mac, expected) => return Ok(()),
            Ok(_) => "MAC mismatch".to_string(),
            Err(e) => e.to_string(),
        };
        Err(CmpError::new(ImplFailure::RequestMacInvalid, detail))
    }
}

fn unsupported_alg(oid: &ObjectIdentifier) -> CmpError {
    CmpError::new(ImplFailure::RequestProtectionAlgUnsupported, oid)
}

fn request_protected_part(msg: &PkiMessage) -> CmpResult<Vec<u8>> {
    msg.protected_part()
        .map_err(|e| CmpError::new(ImplFailure::RequestProtectedPartEncoding, e))
}

fn protection_bytes(msg: &PkiMessage) -> &[u8] {
    msg.protection
        .as_ref()
        .and_then(BitString::as_bytes)
        .unwrap_or_default()
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(iterations: u32) -> PbmSettings {
        PbmSettings {
            salt: b"0123456789abcdef".to_vec(),
            iterations,
            owf: OwfAlg::Sha256,
            mac: MacAlg::HmacSha256,
        }
    }

    #[test]
    fn key_derivation_iterates_the_owf() {
        let secret = b"secret";
        let mut input = secret.to_vec();
        input.extend_from_slice(b"0123456789abcdef");

        let once = crypto::digest(openssl::hash::MessageDigest::sha256(), &input).unwrap();
        assert_eq!(settings(1).derive_key(secret).unwrap(), once);

        let thrice = (0..2).fold(once, |key, _| {
            crypto::digest(openssl::hash::MessageDigest::sha256(), &key).unwrap()
        });
        assert_eq!(settings(3).derive_key(secret).unwrap(), thrice);
    }

    #[test]
    fn pbm_parameters_round_trip_through_the_identifier() {
        let material = SharedSecretMaterial::new(
            Bytes::from_static(b"secret"),
            None,
            Some(b"kid"),
            500,
            16,
            OwfAlg::Sha256,
            MacAlg::HmacSha256,
        )
        .unwrap();
        let strategy = ProtectionStrategy::SharedSecret(PbmProtection::new(Arc::new(material)));
        let alg = strategy.protection_alg().unwrap();
        assert_eq!(alg.oid, oid::PASSWORD_BASED_MAC);

        let parsed = PbmSettings::from_parameters(alg.parameters.as_ref()).unwrap();
        assert_eq!(parsed.iterations, 500);
        assert_eq!(parsed.salt.len(), 16);
        assert_eq!(strategy.sender(), null_dn());
        assert_eq!(strategy.sender_kid(), Some(OctetString::new(b"kid".to_vec()).unwrap()));
        assert!(strategy.protecting_extra_certs().is_empty());
    }

    #[test]
    fn pbm_parameters_are_bounded() {
        let too_many = PbmSettings {
            iterations: PBM_MAX_ITERATIONS + 1,
            ..settings(1)
        };
        let param = too_many.to_parameter().unwrap();
        let any = Any::encode_from(&param).unwrap();
        assert!(PbmSettings::from_parameters(Some(&any)).is_err());

        let short_salt = PbmSettings {
            salt: vec![1, 2, 3],
            ..settings(1)
        };
        let any = Any::encode_from(&short_salt.to_parameter().unwrap()).unwrap();
        assert!(PbmSettings::from_parameters(Some(&any)).is_err());

        assert!(PbmSettings::from_parameters(None).is_err());
    }

    #[test]
    fn salts_are_fresh_per_strategy() {
        let material = Arc::new(
            SharedSecretMaterial::new(
                Bytes::from_static(b"secret"),
                None,
                None,
                1,
                16,
                OwfAlg::Sha256,
                MacAlg::HmacSha256,
            )
            .unwrap(),
        );
        let one = PbmProtection::new(material.clone());
        let two = PbmProtection::new(material);
        assert_ne!(one.settings().salt, two.settings().salt);
    }
}
