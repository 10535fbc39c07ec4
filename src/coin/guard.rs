use crate::error::LedgerError;

/// Decides the balance that results from applying a signed delta.
pub trait BalanceGuard: Send + Sync {
    fn apply_delta(&self, current_balance: i32, delta: i32) -> Result<i32, LedgerError>;
}

/// Rejects any delta that would take the balance below zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonNegativeBalance;

impl BalanceGuard for NonNegativeBalance {
    fn apply_delta(&self, current_balance: i32, delta: i32) -> Result<i32, LedgerError> {
        let new_balance = current_balance
            .checked_add(delta)
            .ok_or(LedgerError::InvalidAmount)?;

        if new_balance < 0 {
            return Err(LedgerError::InsufficientFunds {
                have: current_balance,
                need: delta.saturating_neg(),
            });
        }
        Ok(new_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn charge_adds() {
        assert_eq!(NonNegativeBalance.apply_delta(1000, 100).unwrap(), 1100);
    }

    #[test]
    fn spend_to_exactly_zero_is_allowed() {
        assert_eq!(NonNegativeBalance.apply_delta(1100, -1100).unwrap(), 0);
    }

    #[test]
    fn overdraft_reports_have_and_need() {
        match NonNegativeBalance.apply_delta(1100, -1200) {
            Err(LedgerError::InsufficientFunds { have, need }) => {
                assert_eq!(have, 1100);
                assert_eq!(need, 1200);
            }
            other => panic!("expected insufficient funds, got {:?}", other),
        }
    }

    #[test]
    fn overflow_is_rejected() {
        assert!(matches!(
            NonNegativeBalance.apply_delta(i32::MAX, 1),
            Err(LedgerError::InvalidAmount)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Positive deltas that fit are never rejected.
        #[test]
        fn charges_always_pass(current in 0i32..1_000_000, delta in 1i32..1_000_000) {
            prop_assert_eq!(NonNegativeBalance.apply_delta(current, delta).unwrap(), current + delta);
        }

        /// Whatever sequence of deltas is attempted, the accepted balance
        /// never goes negative and a rejected delta leaves it untouched.
        #[test]
        fn balance_never_negative(
            opening in 0i32..10_000,
            deltas in prop::collection::vec(-5_000i32..5_000, 1..50)
        ) {
            let mut balance = opening;
            for delta in deltas {
                match NonNegativeBalance.apply_delta(balance, delta) {
                    Ok(next) => {
                        prop_assert!(next >= 0);
                        prop_assert_eq!(next, balance + delta);
                        balance = next;
                    }
                    Err(LedgerError::InsufficientFunds { have, need }) => {
                        prop_assert!(delta < 0);
                        prop_assert_eq!(have, balance);
                        prop_assert_eq!(need, -delta);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
            }
        }
    }
}
