//! The FundMe test suites, gated by network.
//!
//! The unit suite runs only on development networks and the staging suite only elsewhere. Which
//! suites run is decided once, when they are registered for a network, by [`SuiteKind::select`].
//! Every case gets a freshly deployed [`Fixture`].

use core::fmt;

use serde::Serialize;

use crate::address::Address;
use crate::assert::{self, AssertionFailure};
use crate::config::{ConfigError, HarnessConfig, NetworkSettings};
use crate::devnet::{Deployment, Devnet};
use crate::probe;
use crate::scenario::{self, ScenarioError, WithdrawalScenario};
use crate::target::{
    BalanceSource, FundMeTarget, TxError, WithdrawMethod, INSUFFICIENT_FUNDS_REASON,
    NOT_OWNER_ERROR,
};
use crate::units::{Wei, WEI_PER_ETHER};

/// Value sent by each funding call in the unit suite.
pub const UNIT_SEND_VALUE: Wei = WEI_PER_ETHER;
/// Value sent by the staging suite, 0.03 ether.
pub const STAGING_SEND_VALUE: Wei = 30_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    Unit,
    Staging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Run,
    Skip,
}

impl SuiteKind {
    pub fn name(self) -> &'static str {
        match self {
            SuiteKind::Unit => "unit",
            SuiteKind::Staging => "staging",
        }
    }

    pub fn select(self, network: &str, config: &HarnessConfig) -> Selection {
        let development = config.is_development(network);
        match (self, development) {
            (SuiteKind::Unit, true) | (SuiteKind::Staging, false) => Selection::Run,
            _ => Selection::Skip,
        }
    }
}

/// A deployed FundMe and the network it was deployed for.
pub struct Fixture {
    pub devnet: Devnet,
    pub deployment: Deployment,
    pub network: NetworkSettings,
    pub deployer: Address,
}

impl Fixture {
    pub fn deploy(config: &HarnessConfig, network: &NetworkSettings) -> Result<Self, TxError> {
        let mut devnet = Devnet::new(config.devnet.clone())?;
        let deployment = devnet.deploy(network, &config.mock)?;
        let deployer = devnet.deployer()?;
        Ok(Fixture {
            devnet,
            deployment,
            network: network.clone(),
            deployer,
        })
    }

    pub fn account(&self, index: usize) -> Result<Address, TxError> {
        self.devnet.account(index).ok_or(TxError::AccountIndex(index))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaseFailure {
    #[error("fixture could not be deployed: {0}")]
    Fixture(TxError),
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

pub type CaseFn = fn(&mut Fixture) -> Result<(), CaseFailure>;

pub struct Case {
    pub group: &'static str,
    pub name: &'static str,
    pub before_each: Option<CaseFn>,
    pub run: CaseFn,
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("group", &self.group)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug)]
pub struct Suite {
    pub kind: SuiteKind,
    pub title: &'static str,
    pub cases: Vec<Case>,
}

fn fund_from_deployer(f: &mut Fixture) -> Result<(), CaseFailure> {
    let deployer = f.deployer;
    assert::ok(f.devnet.fund(&deployer, UNIT_SEND_VALUE))?;
    Ok(())
}

fn sets_the_aggregator_address(f: &mut Fixture) -> Result<(), CaseFailure> {
    let response = assert::ok(f.devnet.get_price_feed())?;
    assert::equal(response, f.deployment.price_feed)?;
    Ok(())
}

fn reverts_below_minimum(f: &mut Fixture) -> Result<(), CaseFailure> {
    let deployer = f.deployer;
    assert::reverted_with(&f.devnet.fund(&deployer, 0), INSUFFICIENT_FUNDS_REASON)?;
    Ok(())
}

fn updates_amount_funded(f: &mut Fixture) -> Result<(), CaseFailure> {
    let deployer = f.deployer;
    assert::ok(f.devnet.fund(&deployer, UNIT_SEND_VALUE))?;
    let response = assert::ok(f.devnet.get_address_to_amount_funded(&deployer))?;
    assert::equal(response.to_string(), UNIT_SEND_VALUE.to_string())?;
    Ok(())
}

fn adds_funder_to_list(f: &mut Fixture) -> Result<(), CaseFailure> {
    let deployer = f.deployer;
    assert::ok(f.devnet.fund(&deployer, UNIT_SEND_VALUE))?;
    let funder = assert::ok(f.devnet.get_funder(0))?;
    assert::equal(funder, deployer)?;
    Ok(())
}

fn single_funder(f: &mut Fixture, method: WithdrawMethod) -> Result<(), CaseFailure> {
    let deployer = f.deployer;
    let measurement = scenario::measure_withdrawal(&mut f.devnet, &deployer, method)?;
    assert::equal(measurement.after.target, 0)?;
    assert::checks_pass(&measurement.conservation.checks)?;
    Ok(())
}

fn withdraw_single_funder(f: &mut Fixture) -> Result<(), CaseFailure> {
    single_funder(f, WithdrawMethod::Standard)
}

fn cheaper_withdraw_single_funder(f: &mut Fixture) -> Result<(), CaseFailure> {
    single_funder(f, WithdrawMethod::Cheaper)
}

fn multiple_funders(f: &mut Fixture, method: WithdrawMethod) -> Result<(), CaseFailure> {
    let funders = (1..6).map(|i| f.account(i)).collect::<Result<Vec<_>, _>>();
    let scenario = WithdrawalScenario {
        owner: f.deployer,
        funders: assert::ok(funders)?,
        amount: UNIT_SEND_VALUE,
        method,
    };
    let report = scenario.run(&mut f.devnet)?;
    assert::equal(report.measurement.after.target, 0)?;
    assert::checks_pass(report.checks())?;
    assert::reverted(&f.devnet.get_funder(0))?;
    Ok(())
}

fn withdraw_multiple_funders(f: &mut Fixture) -> Result<(), CaseFailure> {
    multiple_funders(f, WithdrawMethod::Standard)
}

fn cheaper_withdraw_multiple_funders(f: &mut Fixture) -> Result<(), CaseFailure> {
    multiple_funders(f, WithdrawMethod::Cheaper)
}

fn only_owner_withdraws(f: &mut Fixture) -> Result<(), CaseFailure> {
    let attacker = assert::ok(f.account(1))?;
    assert::reverted_with_custom_error(&f.devnet.withdraw(&attacker), NOT_OWNER_ERROR)?;
    let report = assert::ok(probe::attempt_withdraw(
        &mut f.devnet,
        &attacker,
        WithdrawMethod::Cheaper,
    ))?;
    assert::checks_pass(&report.checks)?;
    assert::equal(
        report.rejected_with().and_then(|revert| revert.custom_error()),
        Some(NOT_OWNER_ERROR),
    )?;
    Ok(())
}

fn fund_and_withdraw(f: &mut Fixture) -> Result<(), CaseFailure> {
    let deployer = f.deployer;
    assert::ok(f.devnet.fund(&deployer, STAGING_SEND_VALUE))?;
    assert::ok(f.devnet.withdraw(&deployer))?;
    let contract = assert::ok(f.devnet.address())?;
    let end_balance = f.devnet.balance_of(&contract);
    assert::equal(end_balance.to_string(), "0".to_string())?;
    Ok(())
}

pub fn unit_suite() -> Suite {
    let withdraw = |name: &'static str, run: CaseFn| Case {
        group: "withdraw",
        name,
        before_each: Some(fund_from_deployer),
        run,
    };
    let case = |group: &'static str, name: &'static str, run: CaseFn| Case {
        group,
        name,
        before_each: None,
        run,
    };
    Suite {
        kind: SuiteKind::Unit,
        title: "FundMe",
        cases: vec![
            case(
                "constructor",
                "Sets the aggregator address correctly",
                sets_the_aggregator_address,
            ),
            case(
                "fund",
                "Should revert if not enough eth was sent",
                reverts_below_minimum,
            ),
            case(
                "fund",
                "Updated the amount funded data structure ",
                updates_amount_funded,
            ),
            case(
                "fund",
                "Adds funder to array of getFunder",
                adds_funder_to_list,
            ),
            withdraw("Withdraw ETH from a single funder", withdraw_single_funder),
            withdraw(
                "allows us to withdraw with multiple getFunder",
                withdraw_multiple_funders,
            ),
            withdraw("Only allows the owner to withdraw", only_owner_withdraws),
            withdraw(
                "Withdraw ETH from a single funder",
                cheaper_withdraw_single_funder,
            ),
            withdraw(
                "Gas optimized cheaperWithdraw()",
                cheaper_withdraw_multiple_funders,
            ),
        ],
    }
}

pub fn staging_suite() -> Suite {
    Suite {
        kind: SuiteKind::Staging,
        title: "FundMe",
        cases: vec![Case {
            group: "",
            name: "allows people to fund and withdraw",
            before_each: None,
            run: fund_and_withdraw,
        }],
    }
}

/// Both suites with whether they run on `network`.
pub fn register(network: &str, config: &HarnessConfig) -> Vec<(Suite, Selection)> {
    [unit_suite(), staging_suite()]
        .into_iter()
        .map(|suite| {
            let selection = suite.kind.select(network, config);
            (suite, selection)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed,
    Failed { message: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub suite: SuiteKind,
    pub group: &'static str,
    pub name: &'static str,
    pub outcome: CaseOutcome,
}

impl fmt::Display for CaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.group.is_empty() {
            self.name.to_string()
        } else {
            format!("{} {}", self.group, self.name)
        };
        match &self.outcome {
            CaseOutcome::Passed => write!(f, "ok      {}: {}", self.suite.name(), path),
            CaseOutcome::Failed { message } => {
                write!(f, "FAILED  {}: {}: {}", self.suite.name(), path, message)
            }
            CaseOutcome::Skipped => write!(f, "skipped {}: {}", self.suite.name(), path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    pub network: String,
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CaseResult> + '_ {
        self.results
            .iter()
            .filter(|result| matches!(result.outcome, CaseOutcome::Failed { .. }))
    }

    pub fn count(&self, outcome: fn(&CaseOutcome) -> bool) -> usize {
        self.results
            .iter()
            .filter(|result| outcome(&result.outcome))
            .count()
    }
}

fn run_case(
    case: &Case,
    config: &HarnessConfig,
    network: &NetworkSettings,
) -> Result<(), CaseFailure> {
    let mut fixture = Fixture::deploy(config, network).map_err(CaseFailure::Fixture)?;
    if let Some(before_each) = case.before_each {
        before_each(&mut fixture)?;
    }
    (case.run)(&mut fixture)
}

pub fn run_suite(
    suite: &Suite,
    config: &HarnessConfig,
    network: &NetworkSettings,
) -> Vec<CaseResult> {
    suite
        .cases
        .iter()
        .map(|case| {
            let outcome = match run_case(case, config, network) {
                Ok(()) => CaseOutcome::Passed,
                Err(failure) => CaseOutcome::Failed {
                    message: failure.to_string(),
                },
            };
            let result = CaseResult {
                suite: suite.kind,
                group: case.group,
                name: case.name,
                outcome,
            };
            log::info!("{}", result);
            result
        })
        .collect()
}

/// Runs every suite selected for `network`. Skipped suites list their cases as skipped.
pub fn run(network: &str, config: &HarnessConfig) -> Result<SuiteReport, ConfigError> {
    let settings = config.resolve(network)?;
    let mut results = Vec::new();
    for (suite, selection) in register(network, config) {
        match selection {
            Selection::Run => results.extend(run_suite(&suite, config, &settings)),
            Selection::Skip => {
                log::debug!("{} suite skipped on {}", suite.kind.name(), network);
                results.extend(suite.cases.iter().map(|case| CaseResult {
                    suite: suite.kind,
                    group: case.group,
                    name: case.name,
                    outcome: CaseOutcome::Skipped,
                }));
            }
        }
    }
    Ok(SuiteReport {
        network: network.to_string(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::DevnetConfig;

    #[test]
    fn selection_follows_the_development_switch() {
        let config = HarnessConfig::default();
        assert_eq!(SuiteKind::Unit.select("hardhat", &config), Selection::Run);
        assert_eq!(SuiteKind::Unit.select("localhost", &config), Selection::Run);
        assert_eq!(SuiteKind::Unit.select("sepolia", &config), Selection::Skip);
        assert_eq!(SuiteKind::Staging.select("hardhat", &config), Selection::Skip);
        assert_eq!(SuiteKind::Staging.select("sepolia", &config), Selection::Run);
    }

    #[test]
    fn unit_suite_keeps_case_order_and_names() {
        let suite = unit_suite();
        let names: Vec<_> = suite.cases.iter().map(|case| case.name).collect();
        assert_eq!(names.len(), 9);
        assert_eq!(names[2], "Updated the amount funded data structure ");
        assert_eq!(names[4], names[7]);
        assert!(suite.cases[4..].iter().all(|case| case.before_each.is_some()));
        assert!(suite.cases[..4].iter().all(|case| case.before_each.is_none()));
    }

    #[test]
    fn unit_suite_passes_on_hardhat() {
        let report = run("hardhat", &HarnessConfig::default()).unwrap();
        let failures: Vec<_> = report.failed().map(ToString::to_string).collect();
        assert!(failures.is_empty(), "{:?}", failures);
        assert_eq!(report.count(|o| *o == CaseOutcome::Passed), 9);
        assert_eq!(report.count(|o| *o == CaseOutcome::Skipped), 1);
    }

    #[test]
    fn staging_rehearsal_passes_on_sepolia() {
        let report = run("sepolia", &HarnessConfig::default()).unwrap();
        assert!(report.passed());
        assert_eq!(report.count(|o| *o == CaseOutcome::Passed), 1);
        assert_eq!(report.count(|o| *o == CaseOutcome::Skipped), 9);
    }

    #[test]
    fn unknown_network_is_rejected_before_running() {
        assert!(matches!(
            run("goerli", &HarnessConfig::default()),
            Err(ConfigError::UnknownNetwork(_))
        ));
    }

    #[test]
    fn failing_case_is_reported_and_the_rest_still_run() {
        fn broken(f: &mut Fixture) -> Result<(), CaseFailure> {
            let deployer = f.deployer;
            assert::reverted(&f.devnet.fund(&deployer, UNIT_SEND_VALUE))?;
            Ok(())
        }
        let mut suite = unit_suite();
        suite.cases.insert(
            0,
            Case {
                group: "fund",
                name: "broken",
                before_each: None,
                run: broken,
            },
        );
        let config = HarnessConfig::default();
        let results = run_suite(&suite, &config, &NetworkSettings::local("hardhat"));
        assert_eq!(results.len(), 10);
        assert_eq!(
            results[0].outcome,
            CaseOutcome::Failed {
                message: AssertionFailure::NotReverted.to_string()
            }
        );
        assert!(results[1..]
            .iter()
            .all(|result| result.outcome == CaseOutcome::Passed));
    }

    #[test]
    fn missing_account_reports_its_index() {
        let config = HarnessConfig {
            devnet: DevnetConfig {
                accounts: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let fixture = Fixture::deploy(&config, &NetworkSettings::local("hardhat")).unwrap();
        assert_eq!(fixture.account(1).unwrap(), fixture.devnet.account(1).unwrap());
        assert_eq!(fixture.account(5), Err(TxError::AccountIndex(5)));

        let result = run_suite(&unit_suite(), &config, &NetworkSettings::local("hardhat"));
        let multiple = result
            .iter()
            .find(|result| result.name == "allows us to withdraw with multiple getFunder")
            .unwrap();
        assert_eq!(
            multiple.outcome,
            CaseOutcome::Failed {
                message: "transaction failed before reaching the contract: no account at index 2"
                    .to_string()
            }
        );
    }
}
