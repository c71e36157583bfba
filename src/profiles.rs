//! Resolving enrollment profiles by name.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info};

use crate::cmp::context::{ConfigurationContext, ProfilePolicy};
use crate::cmp::msg::PkiMessage;
use crate::cmp::pop::PopPolicy;
use crate::cmp::protection::{SharedSecretMaterial, SigningMaterial};
use crate::commons::crypto::{self, CryptoError};
use crate::commons::error::{CmpError, CmpResult, ImplFailure};
use crate::config::{Config, ConfigError, ProfileConfig};

//------------ Profiles ------------------------------------------------------

/// All configured profiles with their key material.
///
/// Keys and certificates are loaded once. Contexts share them.
#[derive(Clone, Debug, Default)]
pub struct Profiles {
    policies: HashMap<String, ProfilePolicy>,
}

impl Profiles {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut policies = HashMap::new();
        for profile in &config.profiles {
            let policy = Self::load_profile(profile)
                .map_err(|e| ConfigError::KeyMaterial(profile.name.clone(), e))?;
            info!("Loaded profile '{}' ({})", profile.name, profile.kind);
            policies.insert(profile.name.clone(), policy);
        }
        Ok(Profiles { policies })
    }

    fn load_profile(profile: &ProfileConfig) -> Result<ProfilePolicy, CryptoError> {
        let signing = match (&profile.signing_key, &profile.signing_chain) {
            (Some(key), Some(chain)) => {
                let key = crypto::load_private_key(key)?;
                let chain = crypto::load_certificates(chain)?;
                debug!(
                    "Profile '{}' signs with a chain of {} certificates",
                    profile.name,
                    chain.len()
                );
                Some(Arc::new(SigningMaterial::new(
                    key,
                    chain,
                    profile.default_signature_alg,
                )?))
            }
            _ => None,
        };

        let shared_secret = match &profile.shared_secret {
            Some(secret) => Some(Arc::new(SharedSecretMaterial::new(
                Bytes::from(secret.clone().into_bytes()),
                profile.sender_name.clone(),
                profile.sender_kid.as_ref().map(|kid| kid.as_bytes()),
                profile.pbm_iterations,
                profile.pbm_salt_length,
                profile.pbm_owf,
                profile.pbm_mac,
            )?)),
            None => None,
        };

        Ok(ProfilePolicy {
            name: profile.name.clone(),
            kind: profile.kind,
            request_protection: profile.request_protection,
            response_protection: profile.response_protection,
            signing,
            shared_secret,
            recipient: profile.recipient.clone(),
            implicit_confirm: profile.implicit_confirm,
            pop: PopPolicy {
                require_pop: profile.require_pop,
                accept_ra_verified: profile.accept_ra_verified,
            },
        })
    }

    pub fn add(&mut self, policy: ProfilePolicy) {
        self.policies.insert(policy.name.clone(), policy);
    }

    /// Creates a fresh context for answering a request with a profile.
    pub fn context_for(&self, name: &str, inbound: PkiMessage) -> CmpResult<ConfigurationContext> {
        match self.policies.get(name) {
            Some(policy) => Ok(ConfigurationContext::new(inbound, policy.clone())),
            None => Err(CmpError::new(
                ImplFailure::ProfileUnknown,
                format!("profile '{}'", name),
            )),
        }
    }
}
