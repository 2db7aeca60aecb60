use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::interface::{decode_count, resolve_contract_interface, ContractInterface, OnChainEntry};
use super::rpc::{ChainRpc, TransactionRequest, TxHash};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult, RpcError};
use crate::hashing::{verify_metadata, LedgerMetadata};

/// Gas limit used when estimation fails
pub const FALLBACK_GAS_LIMIT: u64 = 200_000;

/// Who signs outgoing transactions
#[derive(Clone)]
pub enum SigningAccount {
    LocalKey { address: String, private_key: String },
    /// Unlocked account of a local development node
    NodeAccount { address: String },
}

impl SigningAccount {
    pub fn address(&self) -> &str {
        match self {
            SigningAccount::LocalKey { address, .. } | SigningAccount::NodeAccount { address } => address,
        }
    }
}

impl std::fmt::Debug for SigningAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningAccount::LocalKey { address, .. } => f.debug_struct("LocalKey").field("address", address).finish(),
            SigningAccount::NodeAccount { address } => f.debug_struct("NodeAccount").field("address", address).finish(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent(TxHash),
    /// The last committed entry already carries this round; nothing was sent
    AlreadyOnChain,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { block_number: u64 },
    Reverted { reason: String },
}

/// Connection to one audit contract through a [`ChainRpc`] transport
pub struct LedgerClient {
    rpc: Arc<dyn ChainRpc>,
    rpc_url: String,
    account: SigningAccount,
    contract_address: String,
    interface: ContractInterface,
    connected: AtomicBool,
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("rpc_url", &self.rpc_url)
            .field("account", &self.account)
            .field("contract_address", &self.contract_address)
            .field("interface", &self.interface.name)
            .finish()
    }
}

impl LedgerClient {
    /// Validate configuration, reach the node, pick a signer and resolve the contract shape.
    pub async fn connect(config: &LedgerConfig, rpc: Arc<dyn ChainRpc>) -> LedgerResult<Self> {
        let rpc_url = config.resolve_rpc_url()?;
        info!(rpc_url = %rpc_url, local = config.local, "Connecting to ledger RPC");

        if !rpc.is_connected().await {
            return Err(LedgerError::configuration(format!("Unable to connect to RPC at {}", rpc_url)));
        }

        let account = match &config.private_key {
            Some(key) => {
                let address = rpc
                    .account_for_key(key)
                    .await
                    .map_err(|e| LedgerError::configuration(format!("Invalid PRIVATE_KEY: {}", e)))?;
                SigningAccount::LocalKey {
                    address,
                    private_key: key.clone(),
                }
            }
            None if config.local => {
                let accounts = rpc.accounts().await.map_err(|e| {
                    LedgerError::configuration(format!("PRIVATE_KEY not set and node accounts unavailable: {}", e))
                })?;
                let address = accounts.into_iter().next().ok_or_else(|| {
                    LedgerError::configuration("No unlocked accounts available on local node and PRIVATE_KEY not set")
                })?;
                info!(%address, "Using unlocked node account");
                SigningAccount::NodeAccount { address }
            }
            None => return Err(LedgerError::configuration("PRIVATE_KEY not set in environment")),
        };

        let contract_address = config
            .contract_address
            .clone()
            .ok_or_else(|| LedgerError::configuration("CONTRACT_ADDRESS not set in environment"))?;

        let interface = resolve_contract_interface(rpc.as_ref(), &contract_address, account.address()).await?;
        info!(contract = %contract_address, account = account.address(), "Ledger client ready");

        Ok(Self {
            rpc,
            rpc_url,
            account,
            contract_address,
            interface,
            connected: AtomicBool::new(true),
        })
    }

    pub fn interface(&self) -> ContractInterface {
        self.interface
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    pub fn account(&self) -> &SigningAccount {
        &self.account
    }

    /// Last known connectivity; never touches the network
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Probe the node and update the connectivity flag
    pub async fn refresh_connection(&self) -> bool {
        let connected = self.rpc.is_connected().await;
        self.connected.store(connected, Ordering::Relaxed);
        connected
    }

    fn observe<T>(&self, result: Result<T, RpcError>) -> Result<T, RpcError> {
        match &result {
            Ok(_) => self.connected.store(true, Ordering::Relaxed),
            Err(RpcError::Unreachable(_)) => self.connected.store(false, Ordering::Relaxed),
            Err(_) => {}
        }
        result
    }

    pub async fn log_count(&self) -> LedgerResult<u64> {
        let values = self.observe(self.rpc.call(&self.interface.count_call(&self.contract_address)).await)?;
        Ok(decode_count(&values)?)
    }

    pub async fn read_entry(&self, index: u64) -> LedgerResult<OnChainEntry> {
        let call = self.interface.read_call(&self.contract_address, index);
        let values = self.observe(self.rpc.call(&call).await)?;
        Ok(OnChainEntry::decode(&values)?)
    }

    pub async fn last_entry(&self) -> LedgerResult<Option<OnChainEntry>> {
        match self.log_count().await? {
            0 => Ok(None),
            count => self.read_entry(count - 1).await.map(Some),
        }
    }

    /// Entries `[from, min(from + max_count, count))`
    pub async fn read_range(&self, from_index: u64, max_count: u64) -> LedgerResult<Vec<OnChainEntry>> {
        let total = self.log_count().await?;
        if from_index >= total {
            return Ok(Vec::new());
        }
        let end = from_index.saturating_add(max_count).min(total);
        let mut entries = Vec::with_capacity((end - from_index) as usize);
        for index in from_index..end {
            entries.push(self.read_entry(index).await?);
        }
        Ok(entries)
    }

    /// Recompute the digest of `local` and compare with the entry at `index`
    pub async fn verify_entry(&self, index: u64, local: &LedgerMetadata) -> LedgerResult<bool> {
        let entry = self.read_entry(index).await?;
        Ok(verify_metadata(&entry.metadata_hash, local))
    }

    /// Build, sign and broadcast the commitment for `metadata`.
    pub async fn submit(&self, metadata: &LedgerMetadata) -> LedgerResult<SubmitOutcome> {
        let metadata_hash = metadata.digest();

        match self.last_entry().await {
            Ok(Some(last)) if last.round_number == metadata.round_number => {
                warn!(round = metadata.round_number, "Round already on-chain according to last log; skipping send");
                return Ok(SubmitOutcome::AlreadyOnChain);
            }
            Ok(_) => {}
            Err(e) => debug!(round = metadata.round_number, error = %e, "On-chain duplicate check failed; sending anyway"),
        }

        let from = self.account.address().to_string();
        let call = self.interface.log_call(&self.contract_address, metadata, &metadata_hash);

        let nonce = self.observe(self.rpc.transaction_count(&from).await)?;
        let gas = match self.rpc.estimate_gas(&from, &call).await {
            Ok(gas) => gas,
            Err(e) => {
                debug!(error = %e, fallback = FALLBACK_GAS_LIMIT, "Using fallback gas estimate");
                FALLBACK_GAS_LIMIT
            }
        };
        let gas_price = self.observe(self.rpc.gas_price().await)?;
        let chain_id = self.observe(self.rpc.chain_id().await)?;

        let request = TransactionRequest {
            from,
            call,
            nonce,
            gas,
            gas_price,
            chain_id,
        };

        let tx_hash = match &self.account {
            SigningAccount::LocalKey { private_key, .. } => {
                let signed = self.rpc.sign_transaction(&request, private_key).await?;
                self.observe(self.rpc.send_raw_transaction(&signed).await)?
            }
            SigningAccount::NodeAccount { .. } => self.observe(self.rpc.send_transaction(&request).await)?,
        };

        info!(round = metadata.round_number, tx_hash = %tx_hash, nonce, gas, "Transaction submitted");
        Ok(SubmitOutcome::Sent(tx_hash))
    }

    /// Poll for the receipt of `tx_hash` until `timeout` elapses.
    pub async fn confirm(&self, tx_hash: &TxHash, timeout: Duration, poll: Duration) -> LedgerResult<Confirmation> {
        let wait = async {
            loop {
                if let Some(receipt) = self.observe(self.rpc.transaction_receipt(tx_hash).await)? {
                    return Ok::<_, LedgerError>(receipt);
                }
                tokio::time::sleep(poll).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(receipt)) if receipt.success => Ok(Confirmation::Confirmed {
                block_number: receipt.block_number,
            }),
            Ok(Ok(receipt)) => Ok(Confirmation::Reverted {
                reason: receipt.revert_reason.unwrap_or_else(|| "status 0".to_string()),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LedgerError::Timeout {
                tx_hash: tx_hash.to_string(),
                waited: timeout,
            }),
        }
    }
}
