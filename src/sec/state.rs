use crate::error;
use crate::config;

use super::authn::password::Hasher;
use super::authn::token::Issuer;

#[derive(Debug)]
pub struct Sec {
    hasher: Hasher,
    issuer: Issuer,
}

impl Sec {
    pub fn new(hasher: Hasher, issuer: Issuer) -> Self {
        Sec {
            hasher,
            issuer
        }
    }

    pub fn from_config(config: &config::Config) -> error::Result<Sec> {
        tracing::debug!("creating Sec state");

        let hasher = Hasher::from_config(config);
        let issuer = Issuer::from_config(config)?;

        Ok(Sec {
            hasher,
            issuer
        })
    }

    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }
}
