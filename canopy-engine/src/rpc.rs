//! The NETCONF-shaped RPC surface.
//!
//! Thin entry points that check locks and parameters, run the engine
//! pipelines, and fold every failure into the structured error reply.

use canopy_core::{ClientId, ErrorType, RpcError, RpcErrors};
use canopy_store::{CANDIDATE, RUNNING};
use canopy_tree::ConfigTree;
use tracing::debug;

use crate::confirm::ConfirmParams;
use crate::edit::EditOp;
use crate::engine::Engine;
use crate::error::{TransactionError, TxResult};

/// An RPC reply: `<ok/>` or accumulated `<rpc-error>` elements.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcReply {
    /// `<ok/>`.
    Ok,
    /// One or more error elements.
    Error(RpcErrors),
}

impl RpcReply {
    /// True for `<ok/>`.
    pub fn is_ok(&self) -> bool {
        matches!(self, RpcReply::Ok)
    }

    /// The error elements, if any.
    pub fn errors(&self) -> Option<&RpcErrors> {
        match self {
            RpcReply::Ok => None,
            RpcReply::Error(errors) => Some(errors),
        }
    }
}

fn reply_from(result: TxResult<()>) -> RpcReply {
    match result {
        Ok(()) => RpcReply::Ok,
        Err(TransactionError::Validation(errors)) => RpcReply::Error(errors),
        Err(TransactionError::LockHeld { db, holder }) => RpcReply::Error(
            RpcError::in_use(format!(
                "operation failed, datastore {} is locked by session {}",
                db, holder
            ))
            .into(),
        ),
        Err(TransactionError::InvalidParams(message)) => RpcReply::Error(
            RpcError::new(ErrorType::Protocol, canopy_core::ErrorTag::InvalidValue, message)
                .into(),
        ),
        Err(e) => {
            RpcReply::Error(RpcError::operation_failed(ErrorType::Application, e.to_string()).into())
        }
    }
}

impl Engine {
    fn check_unlocked(&self, db: &str, client: ClientId) -> TxResult<()> {
        let holder = self.store.locked_by(db);
        if holder != 0 && holder != client {
            return Err(TransactionError::LockHeld {
                db: db.to_string(),
                holder,
            });
        }
        Ok(())
    }

    /// `<validate>`: run the validation pipeline against a source
    /// datastore.
    pub fn rpc_validate(&mut self, source: &str) -> RpcReply {
        debug!(source, "rpc validate");
        reply_from(self.candidate_validate(source))
    }

    /// `<commit>`: candidate→running, with optional confirmed-commit
    /// parameters.
    pub fn rpc_commit(&mut self, client: ClientId, params: ConfirmParams) -> RpcReply {
        debug!(client, confirmed = params.confirmed, "rpc commit");
        let enabled = self.options.confirmed_commit;
        if enabled && params.confirmed && params.timeout_secs() == 0 {
            return RpcReply::Error(
                RpcError::invalid_value(
                    "/rpc/commit/confirm-timeout",
                    "confirm-timeout must be positive",
                )
                .into(),
            );
        }
        // A plain confirming commit completes the earlier confirmed
        // commit; the candidate was already installed by it, so no new
        // transaction runs.
        if enabled
            && !params.confirmed
            && self
                .confirm
                .matches_confirming(client, params.persist_id.as_deref())
        {
            return reply_from(self.finish_confirming_commit());
        }
        if let Err(e) = self.check_unlocked(RUNNING, client) {
            return reply_from(Err(e));
        }
        let confirm = if enabled { Some(&params) } else { None };
        reply_from(self.candidate_commit(CANDIDATE, client, confirm, false))
    }

    /// `<discard-changes>`: copy running onto candidate.
    pub fn rpc_discard_changes(&mut self, client: ClientId) -> RpcReply {
        debug!(client, "rpc discard-changes");
        let holder = self.store.locked_by(CANDIDATE);
        if holder != 0 && holder != client {
            return RpcReply::Error(
                RpcError::lock_denied(holder, "operation failed, lock is already held").into(),
            );
        }
        let result = (|| -> TxResult<()> {
            self.store.copy(RUNNING, CANDIDATE)?;
            self.store.set_modified(CANDIDATE, false);
            Ok(())
        })();
        reply_from(result)
    }

    /// `<cancel-commit>`: roll back an outstanding confirmed commit
    /// immediately.
    pub fn rpc_cancel_commit(&mut self, client: ClientId, persist_id: Option<&str>) -> RpcReply {
        debug!(client, "rpc cancel-commit");
        if !self.confirm.is_active() {
            return RpcReply::Error(
                RpcError::operation_failed(
                    ErrorType::Protocol,
                    "no confirmed commit outstanding",
                )
                .into(),
            );
        }
        if !self.confirm.matches_confirming(client, persist_id) {
            return RpcReply::Error(
                RpcError::invalid_value(
                    "/rpc/cancel-commit/persist-id",
                    "persist-id does not match the outstanding confirmed commit",
                )
                .into(),
            );
        }
        reply_from(self.rollback_now())
    }

    /// `<edit-config>`: apply a fragment to a datastore.
    pub fn rpc_edit_config(
        &mut self,
        client: ClientId,
        target: &str,
        default_op: EditOp,
        config: &ConfigTree,
    ) -> RpcReply {
        debug!(client, target, "rpc edit-config");
        if target == RUNNING {
            return RpcReply::Error(
                RpcError::operation_failed(
                    ErrorType::Protocol,
                    "running is not writable; edit candidate and commit",
                )
                .into(),
            );
        }
        if let Err(e) = self.check_unlocked(target, client) {
            return reply_from(Err(e));
        }
        reply_from(self.edit_config(target, default_op, config))
    }

    /// `<copy-config>`: file-level copy between datastores.
    pub fn rpc_copy_config(&mut self, client: ClientId, source: &str, target: &str) -> RpcReply {
        debug!(client, source, target, "rpc copy-config");
        if target == RUNNING {
            return RpcReply::Error(
                RpcError::operation_failed(
                    ErrorType::Protocol,
                    "running is not writable; commit a candidate instead",
                )
                .into(),
            );
        }
        if let Err(e) = self.check_unlocked(target, client) {
            return reply_from(Err(e));
        }
        let result = (|| -> TxResult<()> {
            self.store.copy(source, target)?;
            self.store.set_modified(target, false);
            Ok(())
        })();
        reply_from(result)
    }

    /// `<delete-config>`: remove a datastore file.
    pub fn rpc_delete_config(&mut self, client: ClientId, target: &str) -> RpcReply {
        debug!(client, target, "rpc delete-config");
        if target == RUNNING || target == CANDIDATE {
            return RpcReply::Error(
                RpcError::operation_failed(
                    ErrorType::Protocol,
                    format!("datastore {} cannot be deleted", target),
                )
                .into(),
            );
        }
        if let Err(e) = self.check_unlocked(target, client) {
            return reply_from(Err(e));
        }
        reply_from(self.store.delete(target).map_err(Into::into))
    }

    /// `<lock>`: take a datastore's advisory lock.
    pub fn rpc_lock(&mut self, client: ClientId, target: &str) -> RpcReply {
        debug!(client, target, "rpc lock");
        // A candidate with uncommitted changes cannot be locked.
        if target == CANDIDATE && self.store.modified(CANDIDATE) {
            return RpcReply::Error(
                RpcError::in_use("candidate has uncommitted changes").into(),
            );
        }
        match self.store.lock(target, client) {
            Ok(()) => RpcReply::Ok,
            Err(canopy_store::StoreError::LockHeld { holder, .. }) => RpcReply::Error(
                RpcError::lock_denied(holder, "lock is already held").into(),
            ),
            Err(e) => reply_from(Err(e.into())),
        }
    }

    /// `<unlock>`: release a datastore's advisory lock.
    pub fn rpc_unlock(&mut self, client: ClientId, target: &str) -> RpcReply {
        debug!(client, target, "rpc unlock");
        match self.store.unlock(target, client) {
            Ok(()) => RpcReply::Ok,
            Err(canopy_store::StoreError::NotHolder { .. }) => RpcReply::Error(
                RpcError::operation_failed(
                    ErrorType::Protocol,
                    "lock is not held by this session",
                )
                .into(),
            ),
            Err(e) => reply_from(Err(e.into())),
        }
    }
}
