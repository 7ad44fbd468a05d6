//! # Balance Guard
//!
//! Refuses disbursements that would leave the faucet below its operating
//! reserve: `balance - amount >= balance * pct / 100`.

use crate::domain::{AdmissionError, Amount, NetworkId, ResourceSymbol};

/// Smallest balance that must remain after a disbursement.
///
/// Exact ceiling of `balance * pct / 100`, computed without overflow.
pub fn required_reserve(balance: Amount, min_reserve_pct: u8) -> Amount {
    let pct = Amount::from(min_reserve_pct.min(100));
    let whole = (balance / 100) * pct;
    let rem = ((balance % 100) * pct).div_ceil(100);
    whole + rem
}

/// Whether `amount` may leave an account holding `balance`.
///
/// `amount > balance` always denies; landing exactly on the reserve is allowed.
pub fn check(balance: Amount, amount: Amount, min_reserve_pct: u8) -> bool {
    match balance.checked_sub(amount) {
        Some(remaining) => remaining >= required_reserve(balance, min_reserve_pct),
        None => false,
    }
}

/// Balance read fresh from the chain for one decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceSnapshot {
    /// Network of the faucet account.
    pub network: NetworkId,
    /// Resource held.
    pub resource: ResourceSymbol,
    /// Current balance in base units.
    pub balance: Amount,
    /// Minimum reserve percentage.
    pub min_reserve_pct: u8,
}

impl BalanceSnapshot {
    /// Allow or reject a disbursement of `amount`.
    pub fn evaluate(&self, amount: Amount) -> Result<(), AdmissionError> {
        if check(self.balance, amount, self.min_reserve_pct) {
            return Ok(());
        }
        Err(AdmissionError::ReserveExhausted {
            network: self.network.clone(),
            resource: self.resource.clone(),
            balance: self.balance,
            amount,
            required_reserve: required_reserve(self.balance, self.min_reserve_pct),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_equality_allowed() {
        // 100 - 5 = 95 == 100 * 95%
        assert!(check(100, 5, 95));
        assert!(!check(100, 6, 95));
    }

    #[test]
    fn test_amount_above_balance_denied() {
        assert!(!check(10, 11, 0));
        assert!(check(10, 10, 0));
    }

    #[test]
    fn test_required_reserve_rounds_up() {
        assert_eq!(required_reserve(101, 50), 51);
        assert_eq!(required_reserve(200, 10), 20);
        assert_eq!(required_reserve(0, 10), 0);
    }

    #[test]
    fn test_no_overflow_near_max() {
        assert!(check(Amount::MAX, 1, 99));
        assert!(!check(Amount::MAX, Amount::MAX / 2, 99));
    }

    #[test]
    fn test_snapshot_reports_numbers() {
        let snapshot = BalanceSnapshot {
            network: NetworkId::new("ethereum"),
            resource: ResourceSymbol::new("ETH"),
            balance: 1_000,
            min_reserve_pct: 95,
        };
        assert!(snapshot.evaluate(50).is_ok());
        match snapshot.evaluate(51).unwrap_err() {
            AdmissionError::ReserveExhausted {
                balance,
                amount,
                required_reserve,
                ..
            } => {
                assert_eq!(balance, 1_000);
                assert_eq!(amount, 51);
                assert_eq!(required_reserve, 950);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
