//! # Proof-of-Work Challenges
//!
//! Hashcash-style puzzles: find a nonce such that
//! `SHA-256(seed || nonce.to_be_bytes())` starts with `difficulty` zero bits.

use crate::domain::{Challenge, DeploymentMode, Timestamp, BYPASS_SOLUTION};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

/// Hash a seed and candidate nonce.
pub fn pow_hash(seed: &[u8; 32], solution: i64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(solution.to_be_bytes());
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Count leading zero bits of a digest.
pub fn leading_zero_bits(hash: &[u8; 32]) -> u32 {
    let mut bits = 0;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// Check a solution against a seed. Pure.
pub fn verify_solution(seed: &[u8; 32], solution: i64, difficulty: u8) -> bool {
    leading_zero_bits(&pow_hash(seed, solution)) >= u32::from(difficulty)
}

/// Brute-force a solution, trying nonces `0..max_iterations`.
pub fn solve(seed: &[u8; 32], difficulty: u8, max_iterations: u64) -> Option<i64> {
    (0..max_iterations)
        .filter_map(|n| i64::try_from(n).ok())
        .find(|nonce| verify_solution(seed, *nonce, difficulty))
}

/// Issues and verifies challenges for one deployment.
#[derive(Clone, Debug)]
pub struct ChallengeEngine {
    difficulty: u8,
    ttl: Duration,
    mode: DeploymentMode,
}

impl ChallengeEngine {
    /// Create an engine. The mode is fixed for the engine's lifetime.
    pub fn new(difficulty: u8, ttl: Duration, mode: DeploymentMode) -> Self {
        Self {
            difficulty,
            ttl,
            mode,
        }
    }

    /// Configured difficulty.
    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Challenge lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Deployment mode the engine was built with.
    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    /// Generate a fresh challenge. Not persisted.
    pub fn issue(&self, now: Timestamp) -> Challenge {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Challenge {
            id: Uuid::new_v4().to_string(),
            seed,
            difficulty: self.difficulty,
            created_at: now,
            expires_at: now.saturating_add(self.ttl.as_secs()),
        }
    }

    /// Whether `solution` answers `challenge`.
    ///
    /// [`BYPASS_SOLUTION`] is accepted unhashed only on test deployments.
    pub fn verify(&self, challenge: &Challenge, solution: i64) -> bool {
        if solution == BYPASS_SOLUTION && self.mode.allows_pow_bypass() {
            return true;
        }
        verify_solution(&challenge.seed, solution, challenge.difficulty)
    }

    /// Whether this call used the test bypass.
    pub fn is_bypass(&self, solution: i64) -> bool {
        solution == BYPASS_SOLUTION && self.mode.allows_pow_bypass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(mode: DeploymentMode) -> ChallengeEngine {
        ChallengeEngine::new(8, Duration::from_secs(300), mode)
    }

    #[test]
    fn test_leading_zero_bits() {
        let mut hash = [0xffu8; 32];
        assert_eq!(leading_zero_bits(&hash), 0);
        hash[0] = 0;
        hash[1] = 0b0001_0000;
        assert_eq!(leading_zero_bits(&hash), 11);
        assert_eq!(leading_zero_bits(&[0u8; 32]), 256);
    }

    #[test]
    fn test_solve_then_verify() {
        let seed = [42u8; 32];
        let nonce = solve(&seed, 8, 1_000_000).unwrap();
        assert!(verify_solution(&seed, nonce, 8));
        assert!(leading_zero_bits(&pow_hash(&seed, nonce)) >= 8);
    }

    #[test]
    fn test_harder_target_rejects_solution() {
        let seed = [42u8; 32];
        let nonce = solve(&seed, 8, 1_000_000).unwrap();
        let achieved = leading_zero_bits(&pow_hash(&seed, nonce)) as u8;
        assert!(verify_solution(&seed, nonce, achieved));
        assert!(!verify_solution(&seed, nonce, achieved + 1));
    }

    #[test]
    fn test_issue_sets_expiry_and_unique_ids() {
        let engine = engine(DeploymentMode::Production);
        let a = engine.issue(1_000);
        let b = engine.issue(1_000);
        assert_eq!(a.expires_at, 1_300);
        assert_eq!(a.difficulty, 8);
        assert_ne!(a.id, b.id);
        assert_ne!(a.seed, b.seed);
    }

    #[test]
    fn test_issued_challenge_is_solvable() {
        let engine = engine(DeploymentMode::Production);
        let challenge = engine.issue(0);
        let nonce = solve(&challenge.seed, challenge.difficulty, 1_000_000).unwrap();
        assert!(engine.verify(&challenge, nonce));
    }

    #[test]
    fn test_bypass_only_in_test_mode() {
        let prod = engine(DeploymentMode::Production);
        let test = engine(DeploymentMode::Test);
        // -1 must not happen to be a genuine solution for the seed under test.
        let mut challenge = prod.issue(0);
        while verify_solution(&challenge.seed, BYPASS_SOLUTION, challenge.difficulty) {
            challenge = prod.issue(0);
        }
        assert!(!prod.verify(&challenge, BYPASS_SOLUTION));
        assert!(test.verify(&challenge, BYPASS_SOLUTION));
        assert!(test.is_bypass(BYPASS_SOLUTION));
        assert!(!prod.is_bypass(BYPASS_SOLUTION));
    }
}
