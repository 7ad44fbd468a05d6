//! # Algorithms Module
//!
//! Pure admission algorithms: PoW puzzles, the balance guard and the counter
//! key layout.

pub mod balance_guard;
pub mod keys;
pub mod pow;

pub use balance_guard::{check as balance_check, required_reserve, BalanceSnapshot};
pub use pow::{leading_zero_bits, pow_hash, solve, verify_solution, ChallengeEngine};
