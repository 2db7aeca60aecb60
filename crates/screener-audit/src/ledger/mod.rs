//! Ledger client adapter.
//!
//! - [`rpc`]: the transport contract a node client implements
//! - [`interface`]: known contract shapes and probing
//! - [`client`]: connect, submit, confirm and read
//! - [`sim`]: an in-process chain with fault injection

pub mod client;
pub mod interface;
pub mod rpc;
pub mod sim;

pub use client::{Confirmation, LedgerClient, SigningAccount, SubmitOutcome, FALLBACK_GAS_LIMIT};
pub use interface::{resolve_contract_interface, ContractInterface, OnChainEntry, KNOWN_INTERFACES};
pub use rpc::{AbiValue, ChainRpc, ContractCall, SignedTransaction, TransactionReceipt, TransactionRequest, TxHash};
pub use sim::SimulatedChain;
