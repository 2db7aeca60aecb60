//! Contract interface probing.
//!
//! Deployed audit contracts come in a few shapes that differ only in function
//! names. The shape is resolved once per connection; everything after that
//! goes through the adopted [`ContractInterface`].

use serde::Serialize;
use tracing::{debug, info, warn};

use super::rpc::{AbiValue, ChainRpc, ContractCall};
use crate::error::{LedgerError, LedgerResult, RpcError};
use crate::hashing::{unscale_accuracy, LedgerMetadata};

/// Function names of one known contract shape
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ContractInterface {
    pub name: &'static str,
    pub log_fn: &'static str,
    pub read_fn: &'static str,
    pub count_fn: &'static str,
}

/// Candidates in probing priority order
pub const KNOWN_INTERFACES: [ContractInterface; 3] = [
    ContractInterface {
        name: "AuditLogger",
        log_fn: "logTrainingRound",
        read_fn: "getLog",
        count_fn: "getLogCount",
    },
    ContractInterface {
        name: "FederatedTrainingLogger",
        log_fn: "addTrainingLog",
        read_fn: "getTrainingLog",
        count_fn: "getLogCount",
    },
    ContractInterface {
        name: "LegacyTrainingLogger",
        log_fn: "logTrainingRound",
        read_fn: "getTrainingLog",
        count_fn: "getLogCount",
    },
];

impl ContractInterface {
    pub fn count_call(&self, address: &str) -> ContractCall {
        ContractCall::new(address, self.count_fn)
    }

    pub fn read_call(&self, address: &str, index: u64) -> ContractCall {
        ContractCall::new(address, self.read_fn).arg(AbiValue::Uint(index))
    }

    /// Write call committing `metadata` under `metadata_hash`.
    ///
    /// The contract stores unsigned seconds; a pre-epoch timestamp is clamped to 0.
    pub fn log_call(&self, address: &str, metadata: &LedgerMetadata, metadata_hash: &str) -> ContractCall {
        let timestamp = u64::try_from(metadata.timestamp).unwrap_or_else(|_| {
            warn!(
                round = metadata.round_number,
                timestamp = metadata.timestamp,
                "Negative round timestamp; committing 0"
            );
            0
        });
        ContractCall::new(address, self.log_fn)
            .arg(AbiValue::Uint(metadata.round_number))
            .arg(AbiValue::Uint(metadata.accuracy_scaled))
            .arg(AbiValue::Str(metadata_hash.to_string()))
            .arg(AbiValue::Uint(timestamp))
    }
}

/// An entry as stored by the contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OnChainEntry {
    pub round_number: u64,
    pub accuracy_scaled: u64,
    pub metadata_hash: String,
    pub timestamp: u64,
}

impl OnChainEntry {
    pub fn decode(values: &[AbiValue]) -> Result<Self, RpcError> {
        let malformed = || RpcError::UnexpectedResponse(format!("malformed log entry: {:?}", values));
        match values {
            [round, accuracy, hash, timestamp] => Ok(Self {
                round_number: round.as_uint().ok_or_else(malformed)?,
                accuracy_scaled: accuracy.as_uint().ok_or_else(malformed)?,
                metadata_hash: hash.as_str().ok_or_else(malformed)?.to_string(),
                timestamp: timestamp.as_uint().ok_or_else(malformed)?,
            }),
            _ => Err(malformed()),
        }
    }

    pub fn accuracy(&self) -> f64 {
        unscale_accuracy(self.accuracy_scaled)
    }
}

pub(crate) fn decode_count(values: &[AbiValue]) -> Result<u64, RpcError> {
    values
        .first()
        .and_then(AbiValue::as_uint)
        .ok_or_else(|| RpcError::UnexpectedResponse(format!("malformed count: {:?}", values)))
}

/// Outcome of probing a single candidate
enum Probe {
    Adopt(u64),
    Reject(String),
}

async fn probe(rpc: &dyn ChainRpc, address: &str, from: &str, candidate: &ContractInterface) -> LedgerResult<Probe> {
    let count = match rpc.call(&candidate.count_call(address)).await {
        Ok(values) => match decode_count(&values) {
            Ok(count) => count,
            Err(e) => return Ok(Probe::Reject(e.to_string())),
        },
        Err(RpcError::Unreachable(msg)) => return Err(LedgerError::configuration(format!("RPC unreachable: {}", msg))),
        Err(e) => return Ok(Probe::Reject(e.to_string())),
    };

    // Reading past the end reverts but still proves the function exists
    match rpc.call(&candidate.read_call(address, count.saturating_sub(1))).await {
        Err(RpcError::UnknownFunction(f)) => return Ok(Probe::Reject(format!("missing `{}`", f))),
        Err(RpcError::Unreachable(msg)) => return Err(LedgerError::configuration(format!("RPC unreachable: {}", msg))),
        _ => {}
    }

    let dry_run = LedgerMetadata {
        round_number: 0,
        accuracy_scaled: 0,
        model_hash: String::new(),
        timestamp: 0,
    };
    match rpc.estimate_gas(from, &candidate.log_call(address, &dry_run, "")).await {
        Err(RpcError::UnknownFunction(f)) => Ok(Probe::Reject(format!("missing `{}`", f))),
        Err(RpcError::Unreachable(msg)) => Err(LedgerError::configuration(format!("RPC unreachable: {}", msg))),
        _ => Ok(Probe::Adopt(count)),
    }
}

/// Adopt the first known interface the contract at `address` answers to
pub async fn resolve_contract_interface(
    rpc: &dyn ChainRpc,
    address: &str,
    from: &str,
) -> LedgerResult<ContractInterface> {
    let mut rejections = Vec::new();

    for candidate in KNOWN_INTERFACES.iter() {
        match probe(rpc, address, from, candidate).await? {
            Probe::Adopt(count) => {
                info!(
                    interface = candidate.name,
                    log_fn = candidate.log_fn,
                    existing_logs = count,
                    "Contract interface detected"
                );
                return Ok(*candidate);
            }
            Probe::Reject(reason) => {
                debug!(interface = candidate.name, %reason, "Contract interface rejected");
                rejections.push(format!("{}: {}", candidate.name, reason));
            }
        }
    }

    Err(LedgerError::configuration(format!(
        "Contract at {} matches no known interface ({})",
        address,
        rejections.join("; ")
    )))
}
