//! Loading profiles and their key material from a config file.
mod common;

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use cmpserv::cmp::msg::{BodyType, PkiBody};
use cmpserv::cmp::profile::ProfileKind;
use cmpserv::cmp::protection::ProtectionMethod;
use cmpserv::cmp::responder::{IssuedCertificate, Responder, Response};
use cmpserv::commons::error::{FailureInfo, ImplFailure};
use cmpserv::config::{Config, ConfigError};
use cmpserv::profiles::Profiles;

use common::*;

/// Writes the RA key and chain and returns a config using them.
fn write_material(pki: &TestPki, dir: &Path) -> String {
    let key = dir.join("ra.key");
    let chain = dir.join("ra.pem");
    fs::write(&key, pki.ra_key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    fs::write(&chain, to_pem(&[&pki.ra, &pki.root])).unwrap();

    format!(
        r#"
        log_level = "warn"

        [[profiles]]
        name = "mobile"
        kind = "mobile3gpp"
        signing_key = "{}"
        signing_chain = "{}"
        default_signature_alg = "ecdsa-with-sha256"

        [[profiles]]
        name = "pbm"
        request_protection = "shared_secret"
        response_protection = "shared_secret"
        shared_secret = "correct horse battery staple"
        sender_name = "CN=Test RA"
        sender_kid = "ra-kid"
        pbm_iterations = 1000
        "#,
        key.display(),
        chain.display()
    )
}

#[test]
fn profiles_answer_requests() {
    let pki = TestPki::new();
    let dir = TempDir::new().unwrap();
    let config = Config::parse_str(&write_material(&pki, dir.path())).unwrap();
    let profiles = Profiles::from_config(&config).unwrap();

    let mobile = config.profile("mobile").unwrap();
    assert_eq!(mobile.kind, ProfileKind::Mobile3gpp);
    assert_eq!(mobile.request_protection, ProtectionMethod::Signature);

    let ir = PkiBody::Ir(vec![cert_req_msg(0, &pki.device_key)]);
    let request = signed_request(&pki, header(), ir);
    let context = profiles.context_for("mobile", request).unwrap();
    let response = Responder::new(context)
        .respond(|_| {
            Ok(IssuedCertificate {
                certificate: pki.issued(),
                ca_certs: pki.chain(),
            })
        })
        .unwrap();
    assert_eq!(response.body_type(), BodyType::Ip);
    assert!(verify_signature(&pki, response.message()));

    let request = mac_request(header(), PkiBody::CertConf(Vec::new()), SHARED_SECRET);
    let context = profiles.context_for("pbm", request).unwrap();
    let response = Responder::new(context).respond(|_| unreachable!()).unwrap();
    assert_eq!(response.body_type(), BodyType::PkiConf);
}

#[test]
fn unknown_profile_is_a_bad_request() {
    let profiles = Profiles::default();
    let request = mac_request(header(), PkiBody::CertConf(Vec::new()), SHARED_SECRET);
    let header = request.header.clone();

    let err = profiles.context_for("nope", request).unwrap_err();
    assert_eq!(err.failure(), ImplFailure::ProfileUnknown);
    assert_eq!(err.failure_info(), FailureInfo::BadRequest);

    // Unprotected, the peer only learns that something failed.
    let response = Response::unprotected_error(err, Some(&header)).unwrap();
    let msg = response.message();
    assert!(msg.protection.is_none());
    assert_eq!(msg.header.trans_id.as_ref().unwrap().as_bytes(), TRANSACTION_ID);
    assert_eq!(msg.header.recip_nonce.as_ref().unwrap().as_bytes(), SENDER_NONCE);
    match &msg.body {
        PkiBody::Error(content) => {
            let bits = content.pki_status_info.fail_info.as_ref().unwrap();
            assert_eq!(FailureInfo::from_bit_string(bits), vec![FailureInfo::SystemFailure]);
            assert_eq!(content.error_code, Some(i64::from(ImplFailure::ProfileUnknown.code())));
        }
        _ => panic!("expected error body"),
    }
    assert_eq!(
        response.failure().unwrap().failure_info(),
        FailureInfo::BadRequest
    );
}

#[test]
fn mismatching_key_is_refused() {
    let pki = TestPki::new();
    let dir = TempDir::new().unwrap();
    let config = write_material(&pki, dir.path());

    // Replace the key with the root's, which the RA certificate doesn't hold.
    fs::write(
        dir.path().join("ra.key"),
        pki.root_key.private_key_to_pem_pkcs8().unwrap(),
    )
    .unwrap();

    let config = Config::parse_str(&config).unwrap();
    match Profiles::from_config(&config) {
        Err(ConfigError::KeyMaterial(name, _)) => assert_eq!(name, "mobile"),
        other => panic!("expected key material error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn missing_chain_file_is_refused() {
    let config = Config::parse_str(
        r#"
        [[profiles]]
        name = "default"
        signing_key = "/nonexistent/ra.key"
        signing_chain = "/nonexistent/ra.pem"
        "#,
    )
    .unwrap();
    assert!(matches!(
        Profiles::from_config(&config),
        Err(ConfigError::KeyMaterial(_, _))
    ));
}

#[test]
fn config_file_is_read_from_disk() {
    let pki = TestPki::new();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cmpserv.conf");
    fs::write(&path, write_material(&pki, dir.path())).unwrap();

    let config = Config::parse(&path).unwrap();
    assert_eq!(config.profiles.len(), 2);
    assert!(Config::parse(&dir.path().join("missing.conf")).is_err());
}
