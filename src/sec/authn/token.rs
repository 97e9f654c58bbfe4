use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use hmac::digest::KeyInit;
use sha2::{Sha256, Sha384, Sha512};

use crate::config;
use crate::error;

pub mod claims;
pub mod cache;

pub use claims::{Claims, Identity};
use cache::{CacheKey, CachedToken, TokenCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    HS256,
    HS384,
    HS512,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::HS256 => "HS256",
            Algorithm::HS384 => "HS384",
            Algorithm::HS512 => "HS512",
        }
    }

    fn sign(&self, key: &[u8], input: &[u8]) -> Result<Vec<u8>, SigningError> {
        match self {
            Algorithm::HS256 => mac_sign::<Hmac<Sha256>>(key, input),
            Algorithm::HS384 => mac_sign::<Hmac<Sha384>>(key, input),
            Algorithm::HS512 => mac_sign::<Hmac<Sha512>>(key, input),
        }
    }

    fn verify(&self, key: &[u8], input: &[u8], signature: &[u8]) -> bool {
        match self {
            Algorithm::HS256 => mac_verify::<Hmac<Sha256>>(key, input, signature),
            Algorithm::HS384 => mac_verify::<Hmac<Sha384>>(key, input, signature),
            Algorithm::HS512 => mac_verify::<Hmac<Sha512>>(key, input, signature),
        }
    }
}

impl FromStr for Algorithm {
    type Err = SigningError;

    fn from_str(given: &str) -> Result<Self, Self::Err> {
        match given {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            _ => Err(SigningError::UnsupportedAlgorithm(given.to_owned()))
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn mac_sign<M>(key: &[u8], input: &[u8]) -> Result<Vec<u8>, SigningError>
where
    M: Mac + KeyInit
{
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|_| SigningError::InvalidKey)?;

    mac.update(input);

    Ok(mac.finalize().into_bytes().to_vec())
}

fn mac_verify<M>(key: &[u8], input: &[u8], signature: &[u8]) -> bool
where
    M: Mac + KeyInit
{
    let Ok(mut mac) = <M as Mac>::new_from_slice(key) else {
        return false;
    };

    mac.update(input);
    mac.verify_slice(signature).is_ok()
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SigningError {
    #[error("signing key is empty or invalid")]
    InvalidKey,

    #[error("unsupported signing algorithm \"{0}\"")]
    UnsupportedAlgorithm(String),

    #[error(transparent)]
    Encode(Arc<serde_json::Error>),
}

impl From<serde_json::Error> for SigningError {
    fn from(err: serde_json::Error) -> Self {
        SigningError::Encode(Arc::new(err))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token uses unsupported algorithm \"{0}\"")]
    UnsupportedAlgorithm(String),

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,
}

/// signs and caches session tokens. one live token per email, audience and
/// username until its entry expires
pub struct Issuer {
    key: Vec<u8>,
    algorithm: Algorithm,
    ttl: chrono::Duration,
    leeway: chrono::Duration,
    cache: TokenCache,
}

impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issuer")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .field("leeway", &self.leeway)
            .field("cache_entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl Issuer {
    pub fn new(
        key: Vec<u8>,
        algorithm: Algorithm,
        ttl: chrono::Duration,
        leeway: chrono::Duration,
        capacity: u64,
    ) -> Self {
        Issuer {
            key,
            algorithm,
            ttl,
            leeway,
            cache: TokenCache::new(capacity),
        }
    }

    pub fn from_config(config: &config::Config) -> error::Result<Self> {
        tracing::debug!("creating token Issuer");

        let token = &config.settings.sec.token;
        let key = config.signing_key()?;

        Ok(Self::new(
            key,
            token.algorithm,
            token.ttl,
            token.leeway,
            token.cache_capacity,
        ))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// returns the cached token for this identity and audience if one is
    /// live, otherwise signs a new one. an empty `signing_key` or a missing
    /// or non-positive `ttl` fall back to the configured values
    pub fn issue(
        &self,
        identity: &Identity,
        audience: &str,
        signing_key: Option<&[u8]>,
        ttl: Option<chrono::Duration>,
    ) -> Result<String, SigningError> {
        let key = CacheKey {
            email: identity.email.clone(),
            audience: audience.to_owned(),
            username: identity.username.clone(),
        };

        let result = self.cache.get_or_try_insert(key, || {
            self.sign_new(identity, audience, signing_key, ttl)
        });

        match result {
            Ok(cached) => Ok(cached.token.to_string()),
            Err(err) => Err((*err).clone()),
        }
    }

    fn sign_new(
        &self,
        identity: &Identity,
        audience: &str,
        signing_key: Option<&[u8]>,
        ttl: Option<chrono::Duration>,
    ) -> Result<CachedToken, SigningError> {
        let key = match signing_key {
            Some(given) if !given.is_empty() => given,
            _ => self.key.as_slice()
        };

        if key.is_empty() {
            return Err(SigningError::InvalidKey);
        }

        let ttl = match ttl {
            Some(given) if given > chrono::Duration::zero() => given,
            _ => self.ttl
        };

        let now = chrono::Utc::now().timestamp();
        let claims = Claims::new(
            identity,
            audience,
            now,
            ttl.num_seconds(),
            self.leeway.num_seconds(),
        );

        let token = encode(self.algorithm, key, &claims)?;

        let evict_after = (ttl - self.leeway).to_std()
            .unwrap_or(std::time::Duration::ZERO);

        tracing::info!(
            username = %identity.username,
            audience = %audience,
            jti = %claims.jti,
            "issued new token"
        );

        Ok(CachedToken {
            token: token.into(),
            jti: claims.jti.into(),
            evict_after,
        })
    }

    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        self.parse_with_key(token, &self.key)
    }

    /// decodes and checks a token signed with `key`. the header algorithm
    /// must match the configured one
    pub fn parse_with_key(&self, token: &str, key: &[u8]) -> Result<Claims, TokenError> {
        let (signing_input, signature) = token.rsplit_once('.')
            .ok_or(TokenError::Malformed)?;
        let (header, payload) = signing_input.split_once('.')
            .ok_or(TokenError::Malformed)?;

        if payload.contains('.') {
            return Err(TokenError::Malformed);
        }

        let header: claims::Header = decode_segment(header)?;

        let algorithm = match Algorithm::from_str(&header.alg) {
            Ok(alg) if alg == self.algorithm => alg,
            _ => return Err(TokenError::UnsupportedAlgorithm(header.alg))
        };

        let signature = URL_SAFE_NO_PAD.decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        if !algorithm.verify(key, signing_input.as_bytes(), &signature) {
            return Err(TokenError::BadSignature);
        }

        let claims: Claims = decode_segment(payload)?;
        let now = chrono::Utc::now().timestamp();

        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }

        if now > claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    pub fn revoke(&self, identity: &Identity, audience: &str) {
        self.cache.remove(&CacheKey {
            email: identity.email.clone(),
            audience: audience.to_owned(),
            username: identity.username.clone(),
        });
    }

    /// drops every cached token for the user
    pub fn revoke_user(&self, email: &str, username: &str) {
        let removed = self.cache.remove_user(email, username);

        if removed > 0 {
            tracing::debug!(username = %username, "revoked {removed} cached tokens");
        }
    }
}

fn encode(algorithm: Algorithm, key: &[u8], claims: &Claims) -> Result<String, SigningError> {
    let header = claims::Header {
        alg: algorithm.as_str().to_owned(),
        typ: "JWT".to_owned(),
    };

    let mut token = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?));

    let signature = algorithm.sign(key, token.as_bytes())?;

    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(signature));

    Ok(token)
}

fn decode_segment<T>(segment: &str) -> Result<T, TokenError>
where
    T: serde::de::DeserializeOwned
{
    let bytes = URL_SAFE_NO_PAD.decode(segment)
        .map_err(|_| TokenError::Malformed)?;

    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
