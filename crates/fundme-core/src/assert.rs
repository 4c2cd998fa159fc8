//! Assertions used by the suites.
//!
//! Revert reasons are compared as exact strings and custom errors by exact name. Every assertion
//! returns a [`AssertionFailure`] instead of panicking so a suite can report the failed case and
//! keep going.

use core::fmt::Debug;

use crate::target::{Revert, TxError};
use crate::verify::Check;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssertionFailure {
    #[error("expected {expected}, got {actual}")]
    NotEqual { expected: String, actual: String },
    #[error("expected transaction to be reverted, but it was confirmed")]
    NotReverted,
    #[error("expected {expected}, but it {actual}")]
    WrongRevert { expected: String, actual: Revert },
    #[error("transaction failed before reaching the contract: {0}")]
    UnexpectedError(TxError),
    #[error("check failed: {0}")]
    Check(String),
}

pub fn equal<T: PartialEq + Debug>(actual: T, expected: T) -> Result<(), AssertionFailure> {
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionFailure::NotEqual {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        })
    }
}

pub fn ok<T>(result: Result<T, TxError>) -> Result<T, AssertionFailure> {
    result.map_err(AssertionFailure::UnexpectedError)
}

/// Passes when the call was reverted by the contract, for any reason.
pub fn reverted<T>(result: &Result<T, TxError>) -> Result<&Revert, AssertionFailure> {
    match result {
        Ok(_) => Err(AssertionFailure::NotReverted),
        Err(TxError::Reverted(revert)) => Ok(revert),
        Err(other) => Err(AssertionFailure::UnexpectedError(other.clone())),
    }
}

pub fn reverted_with<T>(
    result: &Result<T, TxError>,
    reason: &str,
) -> Result<(), AssertionFailure> {
    let revert = reverted(result)?;
    if revert.reason() == Some(reason) {
        Ok(())
    } else {
        Err(AssertionFailure::WrongRevert {
            expected: format!("reverted with reason string '{}'", reason),
            actual: revert.clone(),
        })
    }
}

pub fn reverted_with_custom_error<T>(
    result: &Result<T, TxError>,
    name: &str,
) -> Result<(), AssertionFailure> {
    let revert = reverted(result)?;
    if revert.custom_error() == Some(name) {
        Ok(())
    } else {
        Err(AssertionFailure::WrongRevert {
            expected: format!("reverted with custom error '{}()'", name),
            actual: revert.clone(),
        })
    }
}

/// First failing check, if any.
pub fn checks_pass<'a>(
    checks: impl IntoIterator<Item = &'a Check>,
) -> Result<(), AssertionFailure> {
    match checks.into_iter().find(|check| check.is_failure()) {
        Some(check) => Err(AssertionFailure::Check(check.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::target::{INSUFFICIENT_FUNDS_REASON, NOT_OWNER_ERROR};
    use crate::verify::Failure;

    #[test]
    fn reason_strings_match_exactly() {
        let result: Result<(), TxError> = Err(Revert::InsufficientFunds.into());
        assert_eq!(reverted_with(&result, INSUFFICIENT_FUNDS_REASON), Ok(()));
        assert!(matches!(
            reverted_with(&result, "Didn't send enough"),
            Err(AssertionFailure::WrongRevert { .. })
        ));
        assert!(reverted_with_custom_error(&result, NOT_OWNER_ERROR).is_err());
    }

    #[test]
    fn custom_errors_match_by_name() {
        let result: Result<(), TxError> = Err(Revert::NotOwner.into());
        assert_eq!(reverted_with_custom_error(&result, "FundMe__NotOwner"), Ok(()));
        let err = reverted_with(&result, INSUFFICIENT_FUNDS_REASON).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected reverted with reason string 'Didn't send enough!', but it reverted with custom error 'FundMe__NotOwner()'"
        );
    }

    #[test]
    fn confirmed_and_non_contract_failures_are_not_reverts() {
        let confirmed: Result<u64, TxError> = Ok(1);
        assert_eq!(reverted(&confirmed), Err(AssertionFailure::NotReverted));
        let stranger = Address::from_bytes([1; 20]);
        let unknown: Result<u64, TxError> = Err(TxError::UnknownAccount(stranger));
        assert_eq!(
            reverted(&unknown),
            Err(AssertionFailure::UnexpectedError(TxError::UnknownAccount(stranger)))
        );
    }

    #[test]
    fn equality_reports_both_values() {
        assert_eq!(equal(3, 3), Ok(()));
        assert_eq!(
            equal(2u128, 3u128),
            Err(AssertionFailure::NotEqual {
                expected: "3".into(),
                actual: "2".into(),
            })
        );
    }

    #[test]
    fn first_failing_check_is_reported() {
        let checks = vec![
            Check::passed("a"),
            Check::failed("b", Failure::TargetNotDrained { remaining: 4 }),
        ];
        assert_eq!(
            checks_pass(&checks),
            Err(AssertionFailure::Check("FAILED  b: target still holds 4 wei".into()))
        );
    }
}
