#![allow(dead_code)] // Different tests use different parts.

use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use der::asn1::{BitString, OctetString};
use der::{Decode, Encode};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::extension::{BasicConstraints, SubjectKeyIdentifier};
use openssl::x509::{X509, X509NameBuilder, X509Ref};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::Certificate;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;

use cmpserv::cmp::algorithms::{MacAlg, OwfAlg, SignatureAlg};
use cmpserv::cmp::context::ProfilePolicy;
use cmpserv::cmp::msg::{
    CertReqMsg, CertRequest, CertTemplate, PVNO_CMP2000, PkiBody, PkiHeader, PkiMessage,
    PopoSigningKey, ProofOfPossession, ProtectedPart,
};
use cmpserv::cmp::pop::PopPolicy;
use cmpserv::cmp::profile::ProfileKind;
use cmpserv::cmp::protection::{
    PbmProtection, ProtectionMethod, ProtectionStrategy, SharedSecretMaterial, SigningMaterial,
};
use cmpserv::commons::crypto;

pub const TRANSACTION_ID: &[u8] = b"T1";
pub const SENDER_NONCE: &[u8] = b"N1-0123456789abc";
pub const SHARED_SECRET: &[u8] = b"correct horse battery staple";

//------------ Keys and Certificates -----------------------------------------

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

pub fn spki(key: &PKeyRef<Private>) -> SubjectPublicKeyInfoOwned {
    SubjectPublicKeyInfoOwned::from_der(&key.public_key_to_der().unwrap()).unwrap()
}

pub fn to_certificate(x509: &X509Ref) -> Certificate {
    Certificate::from_der(&x509.to_der().unwrap()).unwrap()
}

pub fn to_pem(certs: &[&X509]) -> Vec<u8> {
    certs.iter().flat_map(|cert| cert.to_pem().unwrap()).collect()
}

/// Issues a certificate for `key`, self-signed if there is no issuer.
pub fn issue(
    cn: &str,
    key: &PKeyRef<Private>,
    issuer: Option<(&X509Ref, &PKeyRef<Private>)>,
    ca: bool,
) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let serial = BigNum::from_slice(&crypto::random_bytes(8)).unwrap();
    let serial = Asn1Integer::from_bn(&serial).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some((cert, _)) => builder.set_issuer_name(cert.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(365).unwrap()).unwrap();

    if ca {
        let constraints = BasicConstraints::new().critical().ca().build().unwrap();
        builder.append_extension(constraints).unwrap();
    }
    let ski = {
        let context = builder.x509v3_context(issuer.map(|(cert, _)| cert), None);
        SubjectKeyIdentifier::new().build(&context).unwrap()
    };
    builder.append_extension(ski).unwrap();

    let signing_key = issuer.map(|(_, key)| key).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// A small PKI: a root, an intermediate RA/CA and a certificate it issued.
pub struct TestPki {
    pub root_key: PKey<Private>,
    pub root: X509,
    pub ra_key: PKey<Private>,
    pub ra: X509,
    pub device_key: PKey<Private>,
    pub device_cert: X509,
    pub issued: X509,
}

impl TestPki {
    pub fn new() -> Self {
        let root_key = ec_key();
        let root = issue("Test Root", &root_key, None, true);
        let ra_key = ec_key();
        let ra = issue("Test RA", &ra_key, Some((&*root, &*root_key)), true);

        let device_key = ec_key();
        let device_cert = issue("Vendor Device", &device_key, None, false);
        let issued = issue("Operator Device", &device_key, Some((&*ra, &*ra_key)), false);

        TestPki {
            root_key,
            root,
            ra_key,
            ra,
            device_key,
            device_cert,
            issued,
        }
    }

    /// The chain of the RA: the RA certificate followed by the root.
    pub fn chain(&self) -> Vec<Certificate> {
        vec![to_certificate(&self.ra), to_certificate(&self.root)]
    }

    pub fn signing_material(&self) -> Arc<SigningMaterial> {
        Arc::new(
            SigningMaterial::new(
                self.ra_key.clone(),
                self.chain(),
                Some(SignatureAlg::EcdsaSha256),
            )
            .unwrap(),
        )
    }

    pub fn issued(&self) -> Certificate {
        to_certificate(&self.issued)
    }
}

//------------ Policies ------------------------------------------------------

pub fn shared_secret_material() -> Arc<SharedSecretMaterial> {
    Arc::new(
        SharedSecretMaterial::new(
            Bytes::from_static(SHARED_SECRET),
            Some(Name::from_str("CN=Test RA").unwrap()),
            Some(b"ra-kid"),
            1000,
            16,
            OwfAlg::Sha256,
            MacAlg::HmacSha256,
        )
        .unwrap(),
    )
}

/// A policy protecting both directions with signatures.
pub fn signature_policy(pki: &TestPki, kind: ProfileKind) -> ProfilePolicy {
    ProfilePolicy {
        name: kind.to_string(),
        kind,
        request_protection: ProtectionMethod::Signature,
        response_protection: ProtectionMethod::Signature,
        signing: Some(pki.signing_material()),
        shared_secret: None,
        recipient: None,
        implicit_confirm: false,
        pop: PopPolicy::default(),
    }
}

/// A policy protecting both directions with the shared secret.
pub fn shared_secret_policy(kind: ProfileKind) -> ProfilePolicy {
    ProfilePolicy {
        name: format!("{}-pbm", kind),
        kind,
        request_protection: ProtectionMethod::SharedSecret,
        response_protection: ProtectionMethod::SharedSecret,
        signing: None,
        shared_secret: Some(shared_secret_material()),
        recipient: None,
        implicit_confirm: false,
        pop: PopPolicy::default(),
    }
}

//------------ Requests ------------------------------------------------------

pub fn header() -> PkiHeader {
    PkiHeader {
        pvno: PVNO_CMP2000,
        sender: GeneralName::DirectoryName(Name::from_str("CN=Vendor Device").unwrap()),
        recipient: GeneralName::DirectoryName(Name::from_str("CN=Test RA").unwrap()),
        message_time: None,
        protection_alg: None,
        sender_kid: None,
        recip_kid: None,
        trans_id: Some(OctetString::new(TRANSACTION_ID.to_vec()).unwrap()),
        sender_nonce: Some(OctetString::new(SENDER_NONCE.to_vec()).unwrap()),
        recip_nonce: None,
        free_text: None,
        general_info: None,
    }
}

/// A certificate request with a signature POP by `key`.
pub fn cert_req_msg(cert_req_id: i64, key: &PKeyRef<Private>) -> CertReqMsg {
    let cert_req = CertRequest {
        cert_req_id,
        cert_template: CertTemplate {
            subject: Some(Name::from_str("CN=Operator Device").unwrap()),
            public_key: Some(spki(key)),
            ..Default::default()
        },
        controls: None,
    };
    let alg = SignatureAlg::EcdsaSha256;
    let signature = crypto::sign(key, alg.digest(), &cert_req.to_der().unwrap()).unwrap();

    CertReqMsg {
        cert_req,
        popo: Some(ProofOfPossession::Signature(PopoSigningKey {
            poposk_input: None,
            algorithm_identifier: alg.algorithm_identifier(),
            signature: BitString::from_bytes(&signature).unwrap(),
        })),
        reg_info: None,
    }
}

/// Creates a request signed by the device with its vendor certificate.
pub fn signed_request(pki: &TestPki, mut header: PkiHeader, body: PkiBody) -> PkiMessage {
    let alg = SignatureAlg::EcdsaSha256;
    header.protection_alg = Some(alg.algorithm_identifier());
    let data = ProtectedPart::encode_for(&header, &body).unwrap();
    let signature = crypto::sign(&pki.device_key, alg.digest(), &data).unwrap();

    PkiMessage {
        header,
        body,
        protection: Some(BitString::from_bytes(&signature).unwrap()),
        extra_certs: Some(vec![to_certificate(&pki.device_cert)]),
    }
}

/// Creates a request protected with a MAC over `secret`.
pub fn mac_request(mut header: PkiHeader, body: PkiBody, secret: &'static [u8]) -> PkiMessage {
    let material = SharedSecretMaterial::new(
        Bytes::from_static(secret),
        None,
        None,
        500,
        16,
        OwfAlg::Sha256,
        MacAlg::HmacSha256,
    )
    .unwrap();
    let strategy = ProtectionStrategy::SharedSecret(PbmProtection::new(Arc::new(material)));
    header.protection_alg = Some(strategy.protection_alg().unwrap());
    let protection = strategy.create_protection(&header, &body).unwrap();
    PkiMessage {
        header,
        body,
        protection: Some(protection),
        extra_certs: None,
    }
}

/// Verifies a response signature with the RA key.
pub fn verify_signature(pki: &TestPki, msg: &PkiMessage) -> bool {
    let data = msg.protected_part().unwrap();
    let signature = msg.protection.as_ref().and_then(BitString::as_bytes).unwrap();
    let alg = SignatureAlg::from_oid(&msg.header.protection_alg.as_ref().unwrap().oid).unwrap();
    let public = PKey::public_key_from_der(&pki.ra_key.public_key_to_der().unwrap()).unwrap();
    crypto::verify(&public, alg.digest(), &data, signature).unwrap()
}
