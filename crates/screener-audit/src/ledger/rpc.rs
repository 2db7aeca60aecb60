//! Transport contract for the distributed ledger.
//!
//! The adapter never speaks a wire protocol itself. Whatever node client the
//! deployment uses implements [`ChainRpc`]; signing and address derivation
//! stay with the transport since they depend on the chain's key scheme.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RpcError;

/// A contract call argument or return value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbiValue {
    Uint(u64),
    Str(String),
}

impl AbiValue {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            AbiValue::Uint(v) => Some(*v),
            AbiValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AbiValue::Str(s) => Some(s),
            AbiValue::Uint(_) => None,
        }
    }
}

/// Transaction hash as reported by the node
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A function invocation against a deployed contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub address: String,
    pub function: String,
    pub args: Vec<AbiValue>,
}

impl ContractCall {
    pub fn new(address: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            function: function.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: AbiValue) -> Self {
        self.args.push(value);
        self
    }
}

/// A fully parameterized state-changing transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: String,
    pub call: ContractCall,
    pub nonce: u64,
    pub gas: u64,
    pub gas_price: u64,
    pub chain_id: u64,
}

/// A transaction signed by the transport, ready for broadcast
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub request: TransactionRequest,
    /// Transport-encoded raw bytes
    pub raw: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    /// `false` when execution reverted
    pub success: bool,
    pub block_number: u64,
    pub revert_reason: Option<String>,
}

/// Node operations consumed by [`LedgerClient`](super::LedgerClient)
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Cheap liveness probe
    async fn is_connected(&self) -> bool;

    /// Accounts unlocked on the node (local development nodes only)
    async fn accounts(&self) -> Result<Vec<String>, RpcError>;

    /// Address controlled by `private_key`
    async fn account_for_key(&self, private_key: &str) -> Result<String, RpcError>;

    async fn chain_id(&self) -> Result<u64, RpcError>;

    async fn gas_price(&self) -> Result<u64, RpcError>;

    async fn transaction_count(&self, address: &str) -> Result<u64, RpcError>;

    /// Read-only call; `UnknownFunction` when the contract lacks `call.function`
    async fn call(&self, call: &ContractCall) -> Result<Vec<AbiValue>, RpcError>;

    async fn estimate_gas(&self, from: &str, call: &ContractCall) -> Result<u64, RpcError>;

    async fn sign_transaction(
        &self,
        request: &TransactionRequest,
        private_key: &str,
    ) -> Result<SignedTransaction, RpcError>;

    async fn send_raw_transaction(&self, signed: &SignedTransaction) -> Result<TxHash, RpcError>;

    /// Send through an unlocked node account
    async fn send_transaction(&self, request: &TransactionRequest) -> Result<TxHash, RpcError>;

    /// `None` while the transaction is still pending
    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TransactionReceipt>, RpcError>;
}
