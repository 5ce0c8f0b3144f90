//! Randomized bucket names.
//!
//! Names are `ilm-test-` followed by random characters, 30 characters in
//! total, which keeps them valid S3 bucket names. The random source is shared
//! between the scenario flow and the cleanup tasks, so it sits behind a mutex.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_BUCKET_PREFIX: &str = "ilm-test-";
pub const BUCKET_NAME_LENGTH: usize = 30;

const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug)]
pub struct BucketNamer {
    prefix: String,
    rng: Mutex<StdRng>,
}

impl Default for BucketNamer {
    fn default() -> Self {
        BucketNamer::new(DEFAULT_BUCKET_PREFIX)
    }
}

impl BucketNamer {
    pub fn new(prefix: &str) -> Self {
        BucketNamer {
            prefix: prefix.to_string(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic names, for tests.
    pub fn with_seed(prefix: &str, seed: u64) -> Self {
        BucketNamer {
            prefix: prefix.to_string(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn next_name(&self) -> String {
        let suffix_len = BUCKET_NAME_LENGTH.saturating_sub(self.prefix.len());
        // Poisoning leaves the generator usable.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let suffix: String = (0..suffix_len)
            .map(|_| NAME_ALPHABET[rng.gen_range(0..NAME_ALPHABET.len())] as char)
            .collect();

        format!("{}{}", self.prefix, suffix)
    }
}
