//! Proof of possession of the private key for requested certificates.

use der::Encode;
use log::debug;

use crate::commons::crypto;
use crate::commons::error::{CmpError, CmpResult, ImplFailure};

use super::algorithms::SignatureAlg;
use super::msg::{CertReqMsg, ProofOfPossession};

/// Which kinds of proof of possession a profile accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PopPolicy {
    pub require_pop: bool,
    pub accept_ra_verified: bool,
}

impl Default for PopPolicy {
    fn default() -> Self {
        PopPolicy {
            require_pop: true,
            accept_ra_verified: false,
        }
    }
}

impl PopPolicy {
    /// Verifies the proof of possession of one certificate request.
    ///
    /// Only signature POPs computed over the certificate request itself can
    /// be checked, i.e. those without `poposkInput`.
    pub fn verify(self, req: &CertReqMsg) -> CmpResult<()> {
        let popo = match &req.popo {
            Some(popo) => popo,
            None if self.require_pop => {
                return Err(CmpError::new(
                    ImplFailure::PopMissing,
                    format!("certReqId {}", req.cert_req.cert_req_id),
                ));
            }
            None => return Ok(()),
        };

        match popo {
            ProofOfPossession::RaVerified(_) => {
                if self.accept_ra_verified {
                    Ok(())
                } else {
                    Err(CmpError::plain(ImplFailure::PopRaVerifiedNotAccepted))
                }
            }
            ProofOfPossession::Signature(sk) => {
                if sk.poposk_input.is_some() {
                    return Err(CmpError::plain(ImplFailure::PopInputUnsupported));
                }
                let spki = req
                    .cert_req
                    .cert_template
                    .public_key
                    .as_ref()
                    .ok_or_else(|| CmpError::plain(ImplFailure::PopPublicKeyMissing))?;
                let alg = SignatureAlg::from_oid(&sk.algorithm_identifier.oid).ok_or_else(|| {
                    CmpError::new(ImplFailure::PopAlgUnsupported, sk.algorithm_identifier.oid)
                })?;

                let data = req
                    .cert_req
                    .to_der()
                    .map_err(|e| CmpError::new(ImplFailure::PopInputEncoding, e))?;
                let signature = sk.signature.as_bytes().unwrap_or_default();
                let verified = crypto::public_key(spki)
                    .and_then(|key| crypto::verify(&key, alg.digest(), &data, signature));
                let detail = match verified {
                    Ok(true) => {
                        debug!("Verified {} POP of certReqId {}", alg, req.cert_req.cert_req_id);
                        return Ok(());
                    }
                    Ok(false) => format!("certReqId {}", req.cert_req.cert_req_id),
                    Err(e) => e.to_string(),
                };
                Err(CmpError::new(ImplFailure::PopSignatureInvalid, detail))
            }
            ProofOfPossession::KeyEncipherment(_) | ProofOfPossession::KeyAgreement(_) => {
                Err(CmpError::plain(ImplFailure::PopMethodUnsupported))
            }
        }
    }
}

//============ Tests =========================================================
