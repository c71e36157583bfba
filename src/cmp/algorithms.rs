//! The algorithms usable for protection and proof of possession.

use std::fmt;

use der::asn1::{Any, ObjectIdentifier};
use der::Tag;
use openssl::hash::MessageDigest;
use openssl::pkey::Id;
use serde::Deserialize;
use spki::AlgorithmIdentifierOwned;

use super::oid;

//------------ SignatureAlg --------------------------------------------------

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
pub enum SignatureAlg {
    #[serde(rename = "sha256-with-rsa")]
    RsaSha256,
    #[serde(rename = "sha384-with-rsa")]
    RsaSha384,
    #[serde(rename = "sha512-with-rsa")]
    RsaSha512,
    #[serde(rename = "ecdsa-with-sha256")]
    EcdsaSha256,
    #[serde(rename = "ecdsa-with-sha384")]
    EcdsaSha384,
    #[serde(rename = "ecdsa-with-sha512")]
    EcdsaSha512,
    #[serde(rename = "ed25519")]
    Ed25519,
}

impl SignatureAlg {
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            SignatureAlg::RsaSha256 => oid::SHA256_WITH_RSA,
            SignatureAlg::RsaSha384 => oid::SHA384_WITH_RSA,
            SignatureAlg::RsaSha512 => oid::SHA512_WITH_RSA,
            SignatureAlg::EcdsaSha256 => oid::ECDSA_WITH_SHA256,
            SignatureAlg::EcdsaSha384 => oid::ECDSA_WITH_SHA384,
            SignatureAlg::EcdsaSha512 => oid::ECDSA_WITH_SHA512,
            SignatureAlg::Ed25519 => oid::ED25519,
        }
    }

    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match *oid {
            oid::SHA256_WITH_RSA => Some(SignatureAlg::RsaSha256),
            oid::SHA384_WITH_RSA => Some(SignatureAlg::RsaSha384),
            oid::SHA512_WITH_RSA => Some(SignatureAlg::RsaSha512),
            oid::ECDSA_WITH_SHA256 => Some(SignatureAlg::EcdsaSha256),
            oid::ECDSA_WITH_SHA384 => Some(SignatureAlg::EcdsaSha384),
            oid::ECDSA_WITH_SHA512 => Some(SignatureAlg::EcdsaSha512),
            oid::ED25519 => Some(SignatureAlg::Ed25519),
            _ => None,
        }
    }

    /// The algorithm identifier as it goes on the wire.
    ///
    /// RSA carries NULL parameters, ECDSA and Ed25519 carry none.
    pub fn algorithm_identifier(self) -> AlgorithmIdentifierOwned {
        let parameters = match self {
            SignatureAlg::RsaSha256 | SignatureAlg::RsaSha384 | SignatureAlg::RsaSha512 => {
                Any::new(Tag::Null, Vec::new()).ok()
            }
            _ => None,
        };
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters,
        }
    }

    /// The digest to use with the signer, `None` for pure signatures.
    pub fn digest(self) -> Option<MessageDigest> {
        match self {
            SignatureAlg::RsaSha256 | SignatureAlg::EcdsaSha256 => Some(MessageDigest::sha256()),
            SignatureAlg::RsaSha384 | SignatureAlg::EcdsaSha384 => Some(MessageDigest::sha384()),
            SignatureAlg::RsaSha512 | SignatureAlg::EcdsaSha512 => Some(MessageDigest::sha512()),
            SignatureAlg::Ed25519 => None,
        }
    }

    pub fn fits_key(self, key: Id) -> bool {
        match self {
            SignatureAlg::RsaSha256 | SignatureAlg::RsaSha384 | SignatureAlg::RsaSha512 => {
                key == Id::RSA
            }
            SignatureAlg::EcdsaSha256 | SignatureAlg::EcdsaSha384 | SignatureAlg::EcdsaSha512 => {
                key == Id::EC
            }
            SignatureAlg::Ed25519 => key == Id::ED25519,
        }
    }

    /// The algorithm used with a key type when nothing else is configured.
    pub fn default_for(key: Id) -> Option<Self> {
        match key {
            Id::RSA => Some(SignatureAlg::RsaSha256),
            Id::EC => Some(SignatureAlg::EcdsaSha256),
            Id::ED25519 => Some(SignatureAlg::Ed25519),
            _ => None,
        }
    }

    /// Picks the algorithm for protecting a response.
    ///
    /// The algorithm of the request wins when our key can produce it. Then
    /// comes the configured default, then the default for the key type. A
    /// configured default that doesn't fit the key resolves to nothing.
    pub fn negotiate(
        inbound: Option<&AlgorithmIdentifierOwned>,
        configured: Option<SignatureAlg>,
        key: Id,
    ) -> Option<Self> {
        let requested = inbound
            .and_then(|alg| Self::from_oid(&alg.oid))
            .filter(|alg| alg.fits_key(key));
        match (requested, configured) {
            (Some(alg), _) => Some(alg),
            (None, Some(alg)) => Some(alg).filter(|alg| alg.fits_key(key)),
            (None, None) => Self::default_for(key),
        }
    }
}

impl fmt::Display for SignatureAlg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SignatureAlg::RsaSha256 => "sha256-with-rsa",
            SignatureAlg::RsaSha384 => "sha384-with-rsa",
            SignatureAlg::RsaSha512 => "sha512-with-rsa",
            SignatureAlg::EcdsaSha256 => "ecdsa-with-sha256",
            SignatureAlg::EcdsaSha384 => "ecdsa-with-sha384",
            SignatureAlg::EcdsaSha512 => "ecdsa-with-sha512",
            SignatureAlg::Ed25519 => "ed25519",
        };
        f.write_str(name)
    }
}

//------------ OwfAlg --------------------------------------------------------

/// The one-way function of password based MAC key derivation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OwfAlg {
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl OwfAlg {
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            OwfAlg::Sha1 => oid::SHA1,
            OwfAlg::Sha256 => oid::SHA256,
            OwfAlg::Sha384 => oid::SHA384,
            OwfAlg::Sha512 => oid::SHA512,
        }
    }

    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match *oid {
            oid::SHA1 => Some(OwfAlg::Sha1),
            oid::SHA256 => Some(OwfAlg::Sha256),
            oid::SHA384 => Some(OwfAlg::Sha384),
            oid::SHA512 => Some(OwfAlg::Sha512),
            _ => None,
        }
    }

    pub fn algorithm_identifier(self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: None,
        }
    }

    pub fn digest(self) -> MessageDigest {
        match self {
            OwfAlg::Sha1 => MessageDigest::sha1(),
            OwfAlg::Sha256 => MessageDigest::sha256(),
            OwfAlg::Sha384 => MessageDigest::sha384(),
            OwfAlg::Sha512 => MessageDigest::sha512(),
        }
    }
}

//------------ MacAlg --------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub enum MacAlg {
    #[serde(rename = "hmac-sha1")]
    HmacSha1,
    #[default]
    #[serde(rename = "hmac-sha256")]
    HmacSha256,
    #[serde(rename = "hmac-sha384")]
    HmacSha384,
    #[serde(rename = "hmac-sha512")]
    HmacSha512,
}

impl MacAlg {
    /// The OID we send.
    ///
    /// For SHA-1 this is the `hmac-sha1` arc of RFC 4211. Both that and the
    /// PKCS#5 `hmacWithSHA1` are accepted from peers.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            MacAlg::HmacSha1 => oid::HMAC_SHA1,
            MacAlg::HmacSha256 => oid::HMAC_WITH_SHA256,
            MacAlg::HmacSha384 => oid::HMAC_WITH_SHA384,
            MacAlg::HmacSha512 => oid::HMAC_WITH_SHA512,
        }
    }

    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match *oid {
            oid::HMAC_SHA1 | oid::HMAC_WITH_SHA1 => Some(MacAlg::HmacSha1),
            oid::HMAC_WITH_SHA256 => Some(MacAlg::HmacSha256),
            oid::HMAC_WITH_SHA384 => Some(MacAlg::HmacSha384),
            oid::HMAC_WITH_SHA512 => Some(MacAlg::HmacSha512),
            _ => None,
        }
    }

    pub fn algorithm_identifier(self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: None,
        }
    }

    pub fn digest(self) -> MessageDigest {
        match self {
            MacAlg::HmacSha1 => MessageDigest::sha1(),
            MacAlg::HmacSha256 => MessageDigest::sha256(),
            MacAlg::HmacSha384 => MessageDigest::sha384(),
            MacAlg::HmacSha512 => MessageDigest::sha512(),
        }
    }
}

//============ Tests =========================================================
