//! Withdrawal attempts by accounts that are not supposed to succeed.

use serde::Serialize;

use crate::address::Address;
use crate::target::{FundMeTarget, Receipt, Revert, TxError, WithdrawMethod};
use crate::units::Wei;
use crate::verify::{Check, Failure, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Rejected { revert: Revert },
    Accepted { receipt: Receipt },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub actor: Address,
    pub method: WithdrawMethod,
    pub outcome: ProbeOutcome,
    pub before: Snapshot,
    pub after: Snapshot,
    /// Balance checks, present only when the attempt was rejected.
    pub checks: Vec<Check>,
}

impl ProbeReport {
    pub fn rejected_with(&self) -> Option<&Revert> {
        match &self.outcome {
            ProbeOutcome::Rejected { revert } => Some(revert),
            ProbeOutcome::Accepted { .. } => None,
        }
    }

    /// True when the attempt was rejected as not coming from the owner and moved no value.
    pub fn blocked_as_not_owner(&self) -> bool {
        self.rejected_with() == Some(&Revert::NotOwner)
            && !self.checks.iter().any(Check::is_failure)
    }
}

fn unchanged(entity: Address, before: Wei, after: Wei) -> Result<(), Failure> {
    if before == after {
        Ok(())
    } else {
        Err(Failure::BalanceChanged {
            entity,
            before,
            after,
        })
    }
}

/// Has `actor` call `method` and records what happened.
///
/// A contract revert is a normal probe result. Any other failure to get the call processed is
/// returned as an error.
pub fn attempt_withdraw<T: FundMeTarget + ?Sized>(
    target: &mut T,
    actor: &Address,
    method: WithdrawMethod,
) -> Result<ProbeReport, TxError> {
    let contract = target.address()?;
    let before = Snapshot::take(target, &contract, actor);
    let outcome = match method.invoke(target, actor) {
        Ok(receipt) => {
            log::info!("{} by {} was accepted", method.name(), actor);
            ProbeOutcome::Accepted { receipt }
        }
        Err(TxError::Reverted(revert)) => {
            log::debug!("{} by {} rejected: {}", method.name(), actor, revert);
            ProbeOutcome::Rejected { revert }
        }
        Err(other) => return Err(other),
    };
    let after = Snapshot::take(target, &contract, actor);

    let checks = match outcome {
        ProbeOutcome::Rejected { .. } => vec![
            Check::from_result(
                "target_unchanged",
                unchanged(contract, before.target, after.target),
            ),
            Check::from_result(
                "actor_unchanged",
                unchanged(*actor, before.actor, after.actor),
            ),
        ],
        ProbeOutcome::Accepted { .. } => Vec::new(),
    };
    Ok(ProbeReport {
        actor: *actor,
        method,
        outcome,
        before,
        after,
        checks,
    })
}
