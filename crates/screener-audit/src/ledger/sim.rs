//! In-process ledger implementing [`ChainRpc`].
//!
//! Used by tests and the CLI's `train --chain` mode. Faults can be injected
//! to exercise the worker's retry, revert and timeout paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::interface::{ContractInterface, OnChainEntry};
use super::rpc::{AbiValue, ChainRpc, ContractCall, SignedTransaction, TransactionReceipt, TransactionRequest, TxHash};
use crate::error::RpcError;

const NODE_ACCOUNT: &str = "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1";
const SIM_CHAIN_ID: u64 = 31_337;
const SIM_GAS_PRICE: u64 = 1_000_000_000;
const SIM_GAS_ESTIMATE: u64 = 95_000;

#[derive(Debug, Default)]
struct Faults {
    disconnected: bool,
    failing_sends: u32,
    reverting_sends: u32,
    withhold_receipts: bool,
    fail_estimates: bool,
}

#[derive(Debug)]
struct ChainState {
    entries: Vec<OnChainEntry>,
    receipts: HashMap<TxHash, TransactionReceipt>,
    nonces: HashMap<String, u64>,
    block_number: u64,
    send_attempts: u64,
    faults: Faults,
}

/// A single-contract chain answering to one interface shape
#[derive(Debug)]
pub struct SimulatedChain {
    interface: ContractInterface,
    state: Mutex<ChainState>,
}

impl SimulatedChain {
    pub fn new(interface: ContractInterface) -> Self {
        Self {
            interface,
            state: Mutex::new(ChainState {
                entries: Vec::new(),
                receipts: HashMap::new(),
                nonces: HashMap::new(),
                block_number: 0,
                send_attempts: 0,
                faults: Faults::default(),
            }),
        }
    }

    pub fn node_account(&self) -> String {
        NODE_ACCOUNT.to_string()
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().faults.disconnected = !connected;
    }

    /// The next `n` sends fail as if the connection dropped
    pub fn fail_next_sends(&self, n: u32) {
        self.state.lock().faults.failing_sends = n;
    }

    /// The next `n` transactions are mined with a failed status
    pub fn revert_next_sends(&self, n: u32) {
        self.state.lock().faults.reverting_sends = n;
    }

    /// Receipts stay pending forever while set
    pub fn withhold_receipts(&self, withhold: bool) {
        self.state.lock().faults.withhold_receipts = withhold;
    }

    pub fn fail_gas_estimates(&self, fail: bool) {
        self.state.lock().faults.fail_estimates = fail;
    }

    pub fn preload_entry(&self, entry: OnChainEntry) {
        self.state.lock().entries.push(entry);
    }

    pub fn entries(&self) -> Vec<OnChainEntry> {
        self.state.lock().entries.clone()
    }

    /// Number of broadcast attempts, including failed ones
    pub fn send_attempts(&self) -> u64 {
        self.state.lock().send_attempts
    }

    fn check_connected(state: &ChainState) -> Result<(), RpcError> {
        if state.faults.disconnected {
            return Err(RpcError::Unreachable("simulated node offline".to_string()));
        }
        Ok(())
    }

    fn known(&self, function: &str) -> Result<(), RpcError> {
        let iface = &self.interface;
        if function == iface.log_fn || function == iface.read_fn || function == iface.count_fn {
            Ok(())
        } else {
            Err(RpcError::UnknownFunction(function.to_string()))
        }
    }

    fn decode_write(call: &ContractCall) -> Result<OnChainEntry, RpcError> {
        match call.args.as_slice() {
            [AbiValue::Uint(round), AbiValue::Uint(acc), AbiValue::Str(hash), AbiValue::Uint(ts)] => Ok(OnChainEntry {
                round_number: *round,
                accuracy_scaled: *acc,
                metadata_hash: hash.clone(),
                timestamp: *ts,
            }),
            other => Err(RpcError::UnexpectedResponse(format!("bad arguments: {:?}", other))),
        }
    }

    fn broadcast(&self, request: &TransactionRequest) -> Result<TxHash, RpcError> {
        let mut state = self.state.lock();
        Self::check_connected(&state)?;
        state.send_attempts += 1;

        if state.faults.failing_sends > 0 {
            state.faults.failing_sends -= 1;
            return Err(RpcError::Unreachable("simulated connection reset".to_string()));
        }
        if request.call.function != self.interface.log_fn {
            return Err(RpcError::UnknownFunction(request.call.function.clone()));
        }
        let entry = Self::decode_write(&request.call)?;

        let expected_nonce = state.nonces.get(&request.from).copied().unwrap_or(0);
        if request.nonce != expected_nonce {
            return Err(RpcError::UnexpectedResponse(format!(
                "nonce too low: expected {}, got {}",
                expected_nonce, request.nonce
            )));
        }
        state.nonces.insert(request.from.clone(), expected_nonce + 1);

        let mut hasher = Sha256::new();
        hasher.update(request.from.as_bytes());
        hasher.update(request.nonce.to_be_bytes());
        hasher.update(entry.metadata_hash.as_bytes());
        let tx_hash = TxHash(format!("0x{}", hex::encode(hasher.finalize())));

        state.block_number += 1;
        let reverted = state.faults.reverting_sends > 0;
        if reverted {
            state.faults.reverting_sends -= 1;
        } else {
            state.entries.push(entry);
        }
        let receipt = TransactionReceipt {
            tx_hash: tx_hash.clone(),
            success: !reverted,
            block_number: state.block_number,
            revert_reason: reverted.then(|| "simulated revert".to_string()),
        };
        state.receipts.insert(tx_hash.clone(), receipt);
        Ok(tx_hash)
    }
}

#[async_trait]
impl ChainRpc for SimulatedChain {
    async fn is_connected(&self) -> bool {
        !self.state.lock().faults.disconnected
    }

    async fn accounts(&self) -> Result<Vec<String>, RpcError> {
        Self::check_connected(&self.state.lock())?;
        Ok(vec![self.node_account()])
    }

    async fn account_for_key(&self, private_key: &str) -> Result<String, RpcError> {
        let key = private_key.trim_start_matches("0x");
        if key.is_empty() || hex::decode(key).is_err() {
            return Err(RpcError::Signing("private key is not hex".to_string()));
        }
        let digest = Sha256::digest(key.as_bytes());
        Ok(format!("0x{}", hex::encode(&digest[..20])))
    }

    async fn chain_id(&self) -> Result<u64, RpcError> {
        Self::check_connected(&self.state.lock())?;
        Ok(SIM_CHAIN_ID)
    }

    async fn gas_price(&self) -> Result<u64, RpcError> {
        Self::check_connected(&self.state.lock())?;
        Ok(SIM_GAS_PRICE)
    }

    async fn transaction_count(&self, address: &str) -> Result<u64, RpcError> {
        let state = self.state.lock();
        Self::check_connected(&state)?;
        Ok(state.nonces.get(address).copied().unwrap_or(0))
    }

    async fn call(&self, call: &ContractCall) -> Result<Vec<AbiValue>, RpcError> {
        let state = self.state.lock();
        Self::check_connected(&state)?;
        self.known(&call.function)?;

        if call.function == self.interface.count_fn {
            return Ok(vec![AbiValue::Uint(state.entries.len() as u64)]);
        }
        if call.function == self.interface.read_fn {
            let index = call.args.first().and_then(AbiValue::as_uint).unwrap_or(u64::MAX);
            let entry = usize::try_from(index)
                .ok()
                .and_then(|i| state.entries.get(i))
                .ok_or_else(|| RpcError::ExecutionReverted("index out of bounds".to_string()))?;
            return Ok(vec![
                AbiValue::Uint(entry.round_number),
                AbiValue::Uint(entry.accuracy_scaled),
                AbiValue::Str(entry.metadata_hash.clone()),
                AbiValue::Uint(entry.timestamp),
            ]);
        }
        Err(RpcError::ExecutionReverted("write function called as view".to_string()))
    }

    async fn estimate_gas(&self, _from: &str, call: &ContractCall) -> Result<u64, RpcError> {
        let state = self.state.lock();
        Self::check_connected(&state)?;
        self.known(&call.function)?;
        if state.faults.fail_estimates {
            return Err(RpcError::UnexpectedResponse("gas estimation unavailable".to_string()));
        }
        Ok(SIM_GAS_ESTIMATE)
    }

    async fn sign_transaction(
        &self,
        request: &TransactionRequest,
        private_key: &str,
    ) -> Result<SignedTransaction, RpcError> {
        let signer = self.account_for_key(private_key).await?;
        if signer != request.from {
            return Err(RpcError::Signing(format!("key does not control {}", request.from)));
        }
        let payload = serde_json::to_vec(request).map_err(|e| RpcError::Signing(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(private_key.as_bytes());
        hasher.update(&payload);
        Ok(SignedTransaction {
            request: request.clone(),
            raw: format!("0x{}{}", hex::encode(&payload), hex::encode(hasher.finalize())),
        })
    }

    async fn send_raw_transaction(&self, signed: &SignedTransaction) -> Result<TxHash, RpcError> {
        self.broadcast(&signed.request)
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<TxHash, RpcError> {
        if request.from != NODE_ACCOUNT {
            return Err(RpcError::Signing(format!("{} is not unlocked on this node", request.from)));
        }
        self.broadcast(request)
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TransactionReceipt>, RpcError> {
        let state = self.state.lock();
        Self::check_connected(&state)?;
        if state.faults.withhold_receipts {
            return Ok(None);
        }
        Ok(state.receipts.get(tx_hash).cloned())
    }
}
