//! In-process development network.
//!
//! Stands in for a local chain during unit suites: deterministic accounts with genesis balances,
//! signed transactions, a fixed gas price, and the FundMe contract plus its price feed. Every
//! call is confirmed in its own block before it returns.

use std::collections::BTreeMap;

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::config::{HarnessConfig, MockSettings, NetworkSettings};
use crate::contract::{FundMe, GasMeter, MockV3Aggregator};
use crate::ledger::{Ledger, LedgerMutation, TxHash};
use crate::target::{BalanceSource, FundMeTarget, Receipt, TxError};
use crate::units::{Wei, WEI_PER_ETHER, WEI_PER_GWEI};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct DevnetConfig {
    pub chain_id: u64,
    pub accounts: usize,
    pub initial_balance: Wei,
    pub gas_price: Wei,
    /// Seed of the account keys. Same seed, same addresses.
    pub seed: u64,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        DevnetConfig {
            chain_id: 31_337,
            accounts: 20,
            initial_balance: 10_000 * WEI_PER_ETHER,
            gas_price: WEI_PER_GWEI,
            seed: 0x4841_5244,
        }
    }
}

/// Addresses produced by [`Devnet::deploy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub fund_me: Address,
    pub price_feed: Address,
    pub mock_deployed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Fund,
    Withdraw,
    CheaperWithdraw,
}

impl Call {
    fn selector(self) -> &'static [u8] {
        match self {
            Call::Fund => b"fund()",
            Call::Withdraw => b"withdraw()",
            Call::CheaperWithdraw => b"cheaperWithdraw()",
        }
    }
}

struct Account {
    key: SigningKey,
    address: Address,
}

fn key_address(key: &VerifyingKey) -> Address {
    Address::from_digest(key.as_bytes())
}

fn transaction_hash(from: &Address, nonce: u64, to: &Address, value: Wei, call: Call) -> TxHash {
    let mut hasher = Sha256::new();
    hasher.update(b"tx");
    hasher.update(from.as_bytes());
    hasher.update(nonce.to_le_bytes());
    hasher.update(to.as_bytes());
    hasher.update(value.to_le_bytes());
    hasher.update(call.selector());
    hasher.finalize().into()
}

fn check_signature(
    from: &Address,
    key: &VerifyingKey,
    tx_hash: &TxHash,
    signature: &Signature,
) -> Result<(), TxError> {
    if key_address(key) != *from {
        return Err(TxError::InvalidSignature(*from));
    }
    key.verify_strict(tx_hash, signature)
        .map_err(|_| TxError::InvalidSignature(*from))
}

pub struct Devnet {
    config: DevnetConfig,
    ledger: Ledger,
    accounts: Vec<Account>,
    nonces: BTreeMap<Address, u64>,
    aggregators: BTreeMap<Address, MockV3Aggregator>,
    fund_me: Option<(Address, FundMe)>,
    receipts: Vec<Receipt>,
}

impl Devnet {
    pub fn new(config: DevnetConfig) -> Result<Self, TxError> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut ledger = Ledger::new(Address::from_digest(b"coinbase"));
        let mut accounts = Vec::with_capacity(config.accounts);
        for _ in 0..config.accounts {
            let mut secret = [0u8; 32];
            rng.fill_bytes(&mut secret);
            let key = SigningKey::from_bytes(&secret);
            let address = key_address(&key.verifying_key());
            ledger.allocate(address, config.initial_balance)?;
            accounts.push(Account { key, address });
        }
        log::debug!(
            "devnet chain {} started with {} accounts",
            config.chain_id,
            accounts.len()
        );
        Ok(Devnet {
            config,
            ledger,
            accounts,
            nonces: BTreeMap::new(),
            aggregators: BTreeMap::new(),
            fund_me: None,
            receipts: Vec::new(),
        })
    }

    /// Settings of the network this devnet's chain id is listed under.
    pub fn network_settings(&self, config: &HarnessConfig) -> NetworkSettings {
        config.lookup(self.config.chain_id)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.accounts.iter().map(|account| account.address).collect()
    }

    pub fn account(&self, index: usize) -> Option<Address> {
        self.accounts.get(index).map(|account| account.address)
    }

    /// Named account `deployer`, the first account.
    pub fn deployer(&self) -> Result<Address, TxError> {
        self.account(0).ok_or(TxError::AccountIndex(0))
    }

    pub fn nonce(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    fn bump_nonce(&mut self, account: &Address) -> u64 {
        let nonce = self.nonces.entry(*account).or_insert(0);
        let current = *nonce;
        *nonce += 1;
        current
    }

    pub fn fund_me(&self) -> Option<&FundMe> {
        self.fund_me.as_ref().map(|(_, contract)| contract)
    }

    pub fn aggregator(&self, address: &Address) -> Option<&MockV3Aggregator> {
        self.aggregators.get(address)
    }

    pub fn aggregator_mut(&mut self, address: &Address) -> Option<&mut MockV3Aggregator> {
        self.aggregators.get_mut(address)
    }

    /// Deploys FundMe owned by the deployer.
    ///
    /// Without a configured price feed a mock aggregator is deployed first. A configured feed is
    /// registered at its address with the mock's answer so live settings can be rehearsed locally.
    pub fn deploy(
        &mut self,
        network: &NetworkSettings,
        mock: &MockSettings,
    ) -> Result<Deployment, TxError> {
        let deployer = self.deployer()?;
        let (price_feed, mock_deployed) = match network.eth_usd_price_feed {
            Some(feed) => {
                self.aggregators.entry(feed).or_insert_with(|| {
                    MockV3Aggregator::new(mock.decimals, mock.initial_answer)
                });
                log::info!("{}: using price feed at {}", network.name, feed);
                (feed, false)
            }
            None => {
                let nonce = self.bump_nonce(&deployer);
                let feed = Address::create(&deployer, nonce);
                self.aggregators.insert(
                    feed,
                    MockV3Aggregator::new(mock.decimals, mock.initial_answer),
                );
                log::info!("{}: deployed MockV3Aggregator at {}", network.name, feed);
                (feed, true)
            }
        };

        let nonce = self.bump_nonce(&deployer);
        let fund_me = Address::create(&deployer, nonce);
        self.fund_me = Some((fund_me, FundMe::new(deployer, price_feed)));
        log::info!(
            "{}: deployed FundMe at {} (owner {})",
            network.name,
            fund_me,
            deployer
        );

        Ok(Deployment {
            fund_me,
            price_feed,
            mock_deployed,
        })
    }

    fn deployed(&self) -> Result<(Address, &FundMe), TxError> {
        self.fund_me
            .as_ref()
            .map(|(address, contract)| (*address, contract))
            .ok_or(TxError::NotDeployed)
    }

    /// Signs, executes and confirms a call. Reverted calls change nothing.
    fn transact(&mut self, from: &Address, call: Call, value: Wei) -> Result<Receipt, TxError> {
        let (contract_address, contract) = self.deployed()?;
        let mut next = contract.clone();

        let account = self
            .accounts
            .iter()
            .find(|account| account.address == *from)
            .ok_or(TxError::UnknownAccount(*from))?;
        let nonce = self.nonce(from);
        let tx_hash = transaction_hash(from, nonce, &contract_address, value, call);
        let signature = account.key.sign(&tx_hash);
        check_signature(from, &account.key.verifying_key(), &tx_hash, &signature)?;

        let mut meter = GasMeter::new();
        let outcome = match call {
            Call::Fund => {
                let feed = self
                    .aggregators
                    .get(&next.price_feed())
                    .ok_or(TxError::NoContract(next.price_feed()))?;
                next.fund(*from, value, feed, &mut meter)
            }
            Call::Withdraw => next.withdraw(from, &mut meter),
            Call::CheaperWithdraw => next.cheaper_withdraw(from, &mut meter),
        };
        if let Err(revert) = outcome {
            log::debug!(
                "{} from {} reverted: {}",
                String::from_utf8_lossy(call.selector()),
                from,
                revert
            );
            return Err(revert.into());
        }

        let gas_used = meter.used();
        let fee = Wei::from(gas_used).saturating_mul(self.config.gas_price);
        let mut mutations = vec![LedgerMutation::Fee {
            payer: *from,
            amount: fee,
        }];
        if value > 0 {
            mutations.push(LedgerMutation::Transfer {
                from: *from,
                to: contract_address,
                amount: value,
            });
        }
        if matches!(call, Call::Withdraw | Call::CheaperWithdraw) {
            let payout = self.ledger.balance(&contract_address);
            if payout > 0 {
                mutations.push(LedgerMutation::Transfer {
                    from: contract_address,
                    to: *from,
                    amount: payout,
                });
            }
        }
        self.ledger.apply(&mutations, tx_hash)?;

        self.fund_me = Some((contract_address, next));
        self.bump_nonce(from);
        let receipt = Receipt {
            tx_hash,
            block_number: self.ledger.meta.height,
            from: *from,
            to: contract_address,
            gas_used,
            gas_price: self.config.gas_price,
        };
        log::debug!(
            "block {}: {} from {} used {} gas",
            receipt.block_number,
            String::from_utf8_lossy(call.selector()),
            from,
            gas_used
        );
        self.receipts.push(receipt.clone());
        Ok(receipt)
    }
}

impl BalanceSource for Devnet {
    fn balance_of(&self, account: &Address) -> Wei {
        self.ledger.balance(account)
    }
}

impl FundMeTarget for Devnet {
    fn address(&self) -> Result<Address, TxError> {
        self.deployed().map(|(address, _)| address)
    }

    fn get_owner(&self) -> Result<Address, TxError> {
        self.deployed().map(|(_, contract)| contract.owner())
    }

    fn get_price_feed(&self) -> Result<Address, TxError> {
        self.deployed().map(|(_, contract)| contract.price_feed())
    }

    fn get_funder(&self, index: usize) -> Result<Address, TxError> {
        let (_, contract) = self.deployed()?;
        Ok(contract.funder(index)?)
    }

    fn get_address_to_amount_funded(&self, funder: &Address) -> Result<Wei, TxError> {
        self.deployed().map(|(_, contract)| contract.amount_funded(funder))
    }

    fn fund(&mut self, from: &Address, value: Wei) -> Result<Receipt, TxError> {
        self.transact(from, Call::Fund, value)
    }

    fn withdraw(&mut self, from: &Address) -> Result<Receipt, TxError> {
        self.transact(from, Call::Withdraw, 0)
    }

    fn cheaper_withdraw(&mut self, from: &Address) -> Result<Receipt, TxError> {
        self.transact(from, Call::CheaperWithdraw, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Revert;

    fn deployed() -> (Devnet, Deployment) {
        let mut devnet = Devnet::new(DevnetConfig::default()).unwrap();
        let deployment = devnet
            .deploy(&NetworkSettings::local("hardhat"), &MockSettings::default())
            .unwrap();
        (devnet, deployment)
    }

    #[test]
    fn accounts_are_deterministic() {
        let a = Devnet::new(DevnetConfig::default()).unwrap();
        let b = Devnet::new(DevnetConfig::default()).unwrap();
        assert_eq!(a.accounts(), b.accounts());
        assert_eq!(a.accounts().len(), 20);
        let other = Devnet::new(DevnetConfig {
            seed: 7,
            ..Default::default()
        })
        .unwrap();
        assert_ne!(a.accounts(), other.accounts());
        assert_eq!(a.balance_of(&a.account(3).unwrap()), 10_000 * WEI_PER_ETHER);
    }

    #[test]
    fn local_deploy_uses_a_mock_feed() {
        let (devnet, deployment) = deployed();
        assert!(deployment.mock_deployed);
        assert_eq!(devnet.get_price_feed().unwrap(), deployment.price_feed);
        assert_eq!(devnet.get_owner().unwrap(), devnet.deployer().unwrap());
        assert!(devnet.aggregator(&deployment.price_feed).is_some());
        assert_ne!(deployment.fund_me, deployment.price_feed);
    }

    #[test]
    fn configured_feed_is_used_without_a_mock() {
        let mut devnet = Devnet::new(DevnetConfig::default()).unwrap();
        let feed: Address = "0x694AA1769357215DE4FAC081bf1f309aDC325306".parse().unwrap();
        let network = NetworkSettings {
            name: "sepolia".into(),
            eth_usd_price_feed: Some(feed),
        };
        let deployment = devnet.deploy(&network, &MockSettings::default()).unwrap();
        assert!(!deployment.mock_deployed);
        assert_eq!(devnet.get_price_feed().unwrap(), feed);
    }

    #[test]
    fn funding_charges_value_plus_gas() {
        let (mut devnet, deployment) = deployed();
        let funder = devnet.account(1).unwrap();
        let before = devnet.balance_of(&funder);
        let receipt = devnet.fund(&funder, WEI_PER_ETHER).unwrap();
        let fee = Wei::from(receipt.gas_used) * receipt.gas_price;
        assert_eq!(devnet.balance_of(&funder), before - WEI_PER_ETHER - fee);
        assert_eq!(devnet.balance_of(&deployment.fund_me), WEI_PER_ETHER);
        assert_eq!(devnet.nonce(&funder), 1);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(devnet.receipts().len(), 1);
    }

    #[test]
    fn reverted_call_changes_nothing() {
        let (mut devnet, deployment) = deployed();
        let funder = devnet.account(1).unwrap();
        let before = devnet.balance_of(&funder);
        assert_eq!(
            devnet.fund(&funder, 1),
            Err(TxError::Reverted(Revert::InsufficientFunds))
        );
        assert_eq!(devnet.balance_of(&funder), before);
        assert_eq!(devnet.balance_of(&deployment.fund_me), 0);
        assert_eq!(devnet.nonce(&funder), 0);
        assert!(devnet.receipts().is_empty());
    }

    #[test]
    fn sender_must_cover_value_and_fee() {
        let mut devnet = Devnet::new(DevnetConfig {
            initial_balance: WEI_PER_ETHER,
            ..Default::default()
        })
        .unwrap();
        devnet
            .deploy(&NetworkSettings::local("hardhat"), &MockSettings::default())
            .unwrap();
        let funder = devnet.account(1).unwrap();
        let err = devnet.fund(&funder, WEI_PER_ETHER).unwrap_err();
        assert!(
            matches!(err, TxError::InsufficientBalance { account, .. } if account == funder)
        );
        assert_eq!(devnet.balance_of(&funder), WEI_PER_ETHER);
        assert_eq!(devnet.get_address_to_amount_funded(&funder).unwrap(), 0);
    }

    #[test]
    fn withdraw_pays_out_and_conserves_supply() {
        let (mut devnet, deployment) = deployed();
        let supply = devnet.ledger().total_supply();
        for index in 1..4 {
            let funder = devnet.account(index).unwrap();
            devnet.fund(&funder, WEI_PER_ETHER).unwrap();
        }
        let owner = devnet.deployer().unwrap();
        devnet.withdraw(&owner).unwrap();
        assert_eq!(devnet.balance_of(&deployment.fund_me), 0);
        assert_eq!(devnet.ledger().total_supply(), supply);
        assert!(devnet.balance_of(&devnet.ledger().coinbase()) > 0);
    }

    #[test]
    fn unknown_sender_and_missing_contract_are_errors() {
        let mut fresh = Devnet::new(DevnetConfig::default()).unwrap();
        let owner = fresh.deployer().unwrap();
        assert_eq!(fresh.withdraw(&owner), Err(TxError::NotDeployed));
        assert_eq!(fresh.get_funder(0), Err(TxError::NotDeployed));

        let (mut devnet, _) = deployed();
        let stranger = Address::from_bytes([9; 20]);
        assert_eq!(
            devnet.fund(&stranger, WEI_PER_ETHER),
            Err(TxError::UnknownAccount(stranger))
        );
    }

    #[test]
    fn deployer_needs_at_least_one_account() {
        let mut empty = Devnet::new(DevnetConfig {
            accounts: 0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(empty.deployer(), Err(TxError::AccountIndex(0)));
        assert_eq!(
            empty.deploy(&NetworkSettings::local("hardhat"), &MockSettings::default()),
            Err(TxError::AccountIndex(0))
        );
    }

    #[test]
    fn network_settings_follow_the_chain_id() {
        let config = HarnessConfig::default();
        let local = Devnet::new(DevnetConfig::default()).unwrap();
        assert_eq!(local.network_settings(&config).eth_usd_price_feed, None);

        let sepolia = Devnet::new(DevnetConfig {
            chain_id: crate::config::SEPOLIA_CHAIN_ID,
            ..Default::default()
        })
        .unwrap();
        let settings = sepolia.network_settings(&config);
        assert_eq!(settings.name, "sepolia");
        assert_eq!(
            settings.eth_usd_price_feed,
            Some("0x694AA1769357215DE4FAC081bf1f309aDC325306".parse().unwrap())
        );
    }
}
