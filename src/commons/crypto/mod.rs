//! Cryptographic primitives, backed by OpenSSL.
//!
//! The CMP structures live in the `der`/`x509-cert` world, while the keys
//! live in OpenSSL. Everything crossing between the two goes through DER.
mod error;
pub use self::error::CryptoError;

use std::{cmp::Ordering, fs, path::Path};

use der::{Decode, Encode};
use openssl::{
    hash::{hash, MessageDigest},
    memcmp,
    pkey::{PKey, PKeyRef, Private, Public},
    sign::{Signer, Verifier},
    x509::X509,
};
use rand::RngCore;
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::Certificate;

//------------ Loading -------------------------------------------------------

fn read_file(path: &Path) -> Result<Vec<u8>, CryptoError> {
    fs::read(path).map_err(|e| CryptoError::IoError(path.to_path_buf(), e))
}

/// Loads a PEM encoded private key.
pub fn load_private_key(path: &Path) -> Result<PKey<Private>, CryptoError> {
    let pem = read_file(path)?;
    let key = PKey::private_key_from_pem(&pem)?;
    Ok(key)
}

/// Loads all certificates from a PEM file, keeping their order.
pub fn load_certificates(path: &Path) -> Result<Vec<Certificate>, CryptoError> {
    let pem = read_file(path)?;
    let certs = certificates_from_pem(&pem)?;
    if certs.is_empty() {
        Err(CryptoError::EmptyChain(path.to_path_buf()))
    } else {
        Ok(certs)
    }
}

pub fn certificates_from_pem(pem: &[u8]) -> Result<Vec<Certificate>, CryptoError> {
    let mut res = Vec::new();
    for x509 in X509::stack_from_pem(pem)? {
        res.push(Certificate::from_der(&x509.to_der()?)?);
    }
    Ok(res)
}

//------------ Certificates --------------------------------------------------

/// Returns whether the certificate verifies against its own public key.
///
/// Issuer and subject are compared in OpenSSL's canonical form, so names
/// that only differ in string type or case still count as equal.
pub fn is_self_signed(cert: &Certificate) -> Result<bool, CryptoError> {
    let x509 = X509::from_der(&cert.to_der()?)?;
    if x509.issuer_name().try_cmp(x509.subject_name())? != Ordering::Equal {
        return Ok(false);
    }
    let key = x509.public_key()?;
    Ok(x509.verify(&key)?)
}

pub fn public_key(spki: &SubjectPublicKeyInfoOwned) -> Result<PKey<Public>, CryptoError> {
    let key = PKey::public_key_from_der(&spki.to_der()?)?;
    Ok(key)
}

//------------ Signing -------------------------------------------------------

/// Signs the data.
///
/// A digest of `None` is for algorithms that hash internally, i.e. Ed25519.
pub fn sign(
    key: &PKeyRef<Private>,
    digest: Option<MessageDigest>,
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let signature = match digest {
        Some(md) => {
            let mut signer = Signer::new(md, key)?;
            signer.update(data)?;
            signer.sign_to_vec()?
        }
        None => {
            let mut signer = Signer::new_without_digest(key)?;
            signer.sign_oneshot_to_vec(data)?
        }
    };
    Ok(signature)
}

pub fn verify(
    key: &PKeyRef<Public>,
    digest: Option<MessageDigest>,
    data: &[u8],
    signature: &[u8],
) -> Result<bool, CryptoError> {
    let valid = match digest {
        Some(md) => {
            let mut verifier = Verifier::new(md, key)?;
            verifier.update(data)?;
            verifier.verify(signature)?
        }
        None => {
            let mut verifier = Verifier::new_without_digest(key)?;
            verifier.verify_oneshot(signature, data)?
        }
    };
    Ok(valid)
}

//------------ Digests and MACs ----------------------------------------------

pub fn digest(md: MessageDigest, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(hash(md, data)?.to_vec())
}

pub fn hmac(md: MessageDigest, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = PKey::hmac(key)?;
    let mut signer = Signer::new(md, &key)?;
    signer.update(data)?;
    Ok(signer.sign_to_vec()?)
}

/// Compares two MAC values in constant time.
pub fn mac_eq(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len() && memcmp::eq(left, right)
}

//------------ Randomness ----------------------------------------------------

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut res = vec![0u8; len];
    rand::rng().fill_bytes(&mut res);
    res
}

//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    use openssl::{
        asn1::{Asn1Integer, Asn1Time, Asn1Type},
        bn::BigNum,
        ec::EcGroup,
        ec::EcKey,
        nid::Nid,
        x509::X509NameBuilder,
    };

    fn ec_key() -> PKey<Private> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
    }

    fn public(key: &PKey<Private>) -> PKey<Public> {
        PKey::public_key_from_der(&key.public_key_to_der().unwrap()).unwrap()
    }

    /// Creates a certificate signed by `signer` with the names as given.
    fn certificate(
        key: &PKey<Private>,
        signer: &PKey<Private>,
        subject: (&str, Asn1Type),
        issuer: (&str, Asn1Type),
    ) -> Certificate {
        let name = |(cn, ty): (&str, Asn1Type)| {
            let mut builder = X509NameBuilder::new().unwrap();
            builder.append_entry_by_text_with_type("CN", cn, ty).unwrap();
            builder.build()
        };
        let mut builder = X509::builder().unwrap();
        let serial = Asn1Integer::from_bn(&BigNum::from_u32(1).unwrap()).unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name(subject)).unwrap();
        builder.set_issuer_name(&name(issuer)).unwrap();
        builder.set_pubkey(key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.sign(signer, MessageDigest::sha256()).unwrap();
        Certificate::from_der(&builder.build().to_der().unwrap()).unwrap()
    }

    #[test]
    fn self_signed_by_canonical_name() {
        let key = ec_key();
        let utf8 = ("Test Root", Asn1Type::UTF8STRING);
        let printable = ("Test Root", Asn1Type::PRINTABLESTRING);

        let plain = certificate(&key, &key, utf8, utf8);
        assert!(is_self_signed(&plain).unwrap());

        // Same name, different string types: still the same DN.
        let mixed = certificate(&key, &key, utf8, printable);
        assert_ne!(mixed.tbs_certificate.subject, mixed.tbs_certificate.issuer);
        assert!(is_self_signed(&mixed).unwrap());

        let other_key = ec_key();
        let foreign = certificate(&key, &other_key, utf8, utf8);
        assert!(!is_self_signed(&foreign).unwrap());

        let issued = certificate(&key, &key, utf8, ("Test CA", Asn1Type::UTF8STRING));
        assert!(!is_self_signed(&issued).unwrap());
    }

    #[test]
    fn sign_and_verify_with_digest() {
        let key = ec_key();
        let sig = sign(&key, Some(MessageDigest::sha256()), b"data").unwrap();
        let public = public(&key);
        assert!(verify(&public, Some(MessageDigest::sha256()), b"data", &sig).unwrap());
        assert!(!verify(&public, Some(MessageDigest::sha256()), b"other", &sig).unwrap());
    }

    #[test]
    fn sign_and_verify_ed25519() {
        let key = PKey::generate_ed25519().unwrap();
        let sig = sign(&key, None, b"data").unwrap();
        assert!(verify(&public(&key), None, b"data", &sig).unwrap());
    }

    #[test]
    fn hmac_matches_known_vector() {
        // RFC 4231, test case 2
        let mac = hmac(
            MessageDigest::sha256(),
            b"Jefe",
            b"what do ya want for nothing?",
        )
        .unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn mac_eq_handles_length_mismatch() {
        assert!(mac_eq(b"abc", b"abc"));
        assert!(!mac_eq(b"abc", b"abd"));
        assert!(!mac_eq(b"abc", b"abcd"));
    }

    #[test]
    fn random_bytes_differ() {
        let one = random_bytes(16);
        let two = random_bytes(16);
        assert_eq!(one.len(), 16);
        assert_ne!(one, two);
    }
}
