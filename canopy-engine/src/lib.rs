//! The canopy transaction engine.
//!
//! Orchestrates every transition between datastores: the shared
//! validate/commit core, startup replay with module upgrades, failsafe
//! recovery, confirmed commits with deferred rollback, per-plugin
//! restart, and the NETCONF-shaped RPC surface.
//!
//! The engine is single-threaded and cooperative: at most one
//! transaction is in flight, RPCs are serialized by the caller's event
//! loop, and the loop drives deferred work (the confirmed-commit
//! deadline) through [`Engine::poll_rollback`].

mod confirm;
mod edit;
mod engine;
mod error;
mod options;
mod restart;
mod rpc;
mod startup;
mod txn;

pub use confirm::{ConfirmParams, ConfirmPhase, ConfirmedCommitState};
pub use edit::EditOp;
pub use engine::Engine;
pub use error::{TransactionError, TxResult};
pub use options::EngineOptions;
pub use rpc::RpcReply;
pub use txn::{Transaction, TxState};
