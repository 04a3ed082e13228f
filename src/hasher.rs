//! Pseudonymous author identifiers.
//!
//! Real Discord user ids never reach the message table. They are replaced by
//! a PBKDF2-HMAC digest keyed with a deployment-wide salt, so two deployments
//! produce unlinkable ids for the same user.

use lru::LruCache;
use sha2::{Sha256, Sha512};
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    fn output_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha512 => 64,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(anyhow::anyhow!("Unsupported hash algorithm '{}'", other)),
        }
    }
}

#[derive(Clone)]
pub struct HashParams {
    pub algorithm: HashAlgorithm,
    pub salt: String,
    pub iterations: u32,
}

impl std::fmt::Debug for HashParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashParams")
            .field("algorithm", &self.algorithm)
            .field("salt", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .finish()
    }
}

#[derive(Clone)]
pub struct IdentityHasher {
    params: HashParams,
    cache: Arc<Mutex<LruCache<u64, String>>>,
}

impl IdentityHasher {
    pub fn new(params: HashParams) -> Self {
        let cap = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            params,
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    /// Pseudonymous id for a Discord user id.
    pub fn hash(&self, user_id: u64) -> String {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&user_id) {
                return hit.clone();
            }
        }

        let digest = derive(&self.params, user_id);

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(user_id, digest.clone());
        }
        digest
    }
}

fn derive(params: &HashParams, user_id: u64) -> String {
    let password = user_id.to_string();
    let mut out = vec![0u8; params.algorithm.output_len()];
    match params.algorithm {
        HashAlgorithm::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            params.salt.as_bytes(),
            params.iterations,
            &mut out,
        ),
        HashAlgorithm::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(
            password.as_bytes(),
            params.salt.as_bytes(),
            params.iterations,
            &mut out,
        ),
    }
    hex::encode(out)
}

#[cfg(test)]
pub(crate) fn test_hasher() -> IdentityHasher {
    IdentityHasher::new(HashParams {
        algorithm: HashAlgorithm::Sha256,
        salt: "test-salt".to_string(),
        iterations: 10,
    })
}
