//! Running the `respond` command against files on disk.
mod common;

use std::fs;

use tempfile::TempDir;

use cmpserv::cli::options::Respond;
use cmpserv::cli::report::{Report, ReportFormat};
use cmpserv::cmp::msg::{BodyType, PkiBody};
use cmpserv::cmp::responder::decode_request;
use cmpserv::config::Config;

use common::*;

#[test]
fn respond_writes_the_response() {
    let pki = TestPki::new();
    let dir = TempDir::new().unwrap();
    let path = |name: &str| dir.path().join(name);

    fs::write(path("ra.key"), pki.ra_key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    fs::write(path("ra.pem"), to_pem(&[&pki.ra, &pki.root])).unwrap();
    fs::write(path("issued.pem"), to_pem(&[&pki.issued])).unwrap();
    fs::write(
        path("cmpserv.conf"),
        format!(
            r#"
            log_level = "off"

            [[profiles]]
            name = "mobile"
            kind = "mobile3gpp"
            signing_key = "{}"
            signing_chain = "{}"
            "#,
            path("ra.key").display(),
            path("ra.pem").display()
        ),
    )
    .unwrap();

    let ir = PkiBody::Ir(vec![cert_req_msg(0, &pki.device_key)]);
    let request = signed_request(&pki, header(), ir);
    fs::write(path("ir.der"), request.to_bytes().unwrap()).unwrap();
    fs::write(path("garbage.der"), b"not a PKIMessage").unwrap();

    let config = Config::parse(&path("cmpserv.conf")).unwrap();
    let command = |request: &str, out: &str| Respond {
        config: path("cmpserv.conf"),
        profile: "mobile".to_string(),
        request: path(request),
        certificate: path("issued.pem"),
        ca_certs: Some(path("ra.pem")),
        out: Some(path(out)),
        format: ReportFormat::Json,
    };

    let report = command("ir.der", "ip.der").respond(&config).unwrap();
    assert!(!report.is_error());
    let json = report.report(ReportFormat::Json).unwrap();
    assert!(json.contains("\"body_type\": \"ip\""));
    assert!(json.contains(&hex::encode(TRANSACTION_ID)));

    let ip = decode_request(&fs::read(path("ip.der")).unwrap()).unwrap();
    assert_eq!(ip.body.body_type(), BodyType::Ip);
    assert_eq!(ip.extra_certs(), &pki.chain()[..1]);
    assert!(verify_signature(&pki, &ip));

    // An undecodable request still gets an answer, an unprotected one.
    let report = command("garbage.der", "error.der").respond(&config).unwrap();
    assert!(report.is_error());
    let error = decode_request(&fs::read(path("error.der")).unwrap()).unwrap();
    assert_eq!(error.body.body_type(), BodyType::Error);
    assert!(error.protection.is_none());

    let unknown = Respond {
        profile: "unknown".to_string(),
        ..command("ir.der", "unknown.der")
    };
    assert_eq!(unknown.respond(&config).report(ReportFormat::Text), 2);

    let missing = Respond {
        request: path("missing.der"),
        ..command("ir.der", "missing-out.der")
    };
    assert_eq!(missing.respond(&config).report(ReportFormat::Text), 1);
}
