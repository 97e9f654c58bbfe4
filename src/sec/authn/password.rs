use argon2::{Variant, Version};
use data_encoding::{HEXUPPER, HEXUPPER_PERMISSIVE};
use rand::RngCore;

use crate::config;

pub const SALT_LEN: usize = 32;

pub type Salt = [u8; SALT_LEN];

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error(transparent)]
    Rand(#[from] rand::Error),

    #[error(transparent)]
    Argon2(#[from] argon2::Error),
}

/// argon2id cost parameters. fixed for the lifetime of the process, changing
/// them invalidates every stored hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// memory cost in KiB
    pub mem_cost: u32,
    /// number of passes over memory
    pub time_cost: u32,
    /// degree of parallelism
    pub lanes: u32,
    /// output length in bytes
    pub hash_length: u32,
}

impl KdfParams {
    pub fn from_config(config: &config::Config) -> Self {
        let password = &config.settings.sec.password;

        KdfParams {
            mem_cost: password.mem_cost,
            time_cost: password.time_cost,
            lanes: password.lanes,
            hash_length: password.hash_length,
        }
    }

    fn argon2_config(&self) -> argon2::Config<'static> {
        let mut config = argon2::Config::default();
        config.variant = Variant::Argon2id;
        config.version = Version::Version13;
        config.mem_cost = self.mem_cost;
        config.time_cost = self.time_cost;
        config.lanes = self.lanes;
        config.hash_length = self.hash_length;
        config
    }

    #[cfg(test)]
    pub fn testing() -> Self {
        KdfParams {
            mem_cost: 64,
            time_cost: 1,
            lanes: 1,
            hash_length: config::MIN_HASH_LENGTH,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        let password = config::Password::default();

        KdfParams {
            mem_cost: password.mem_cost,
            time_cost: password.time_cost,
            lanes: password.lanes,
            hash_length: password.hash_length,
        }
    }
}

/// uppercase hex encoded salt and hash as stored on a user record
pub struct CredentialPair {
    pub hash: String,
    pub salt: String,
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialPair { .. }")
    }
}

pub fn gen_salt() -> Result<Salt, rand::Error> {
    let mut salt = [0u8; SALT_LEN];

    rand::rngs::OsRng.try_fill_bytes(&mut salt)?;

    Ok(salt)
}

pub fn gen_hash(password: &str, salt: &[u8], params: &KdfParams) -> Result<Vec<u8>, argon2::Error> {
    argon2::hash_raw(password.as_bytes(), salt, &params.argon2_config())
}

#[derive(Debug, Clone, Default)]
pub struct Hasher {
    params: KdfParams,
}

impl Hasher {
    pub fn new(params: KdfParams) -> Self {
        Hasher { params }
    }

    pub fn from_config(config: &config::Config) -> Self {
        Self::new(KdfParams::from_config(config))
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// creates a fresh salt and derives the hash for the given password
    pub fn generate(&self, password: &str) -> Result<CredentialPair, CryptoError> {
        let salt = gen_salt()?;
        let hash = gen_hash(password, &salt, &self.params)?;

        Ok(CredentialPair {
            hash: HEXUPPER.encode(&hash),
            salt: HEXUPPER.encode(&salt),
        })
    }

    /// recomputes the hash with the stored salt. anything that cannot be
    /// decoded or derived is a mismatch
    pub fn verify(&self, password: &str, salt: &str, expected: &str) -> bool {
        let Ok(salt) = HEXUPPER_PERMISSIVE.decode(salt.as_bytes()) else {
            return false;
        };

        let Ok(expected) = HEXUPPER_PERMISSIVE.decode(expected.as_bytes()) else {
            return false;
        };

        if expected.is_empty() {
            return false;
        }

        argon2::verify_raw(
            password.as_bytes(),
            &salt,
            &expected,
            &self.params.argon2_config()
        ).unwrap_or(false)
    }
}
