//! Startup replay, upgrade invocation, failsafe recovery and boot.

use tracing::{error, info, warn};

use canopy_core::{Flags, ModstateStatus, NodeId};
use canopy_plugin::Phase;
use canopy_store::{CANDIDATE, FAILSAFE, RUNNING, STARTUP, TMP};
use canopy_tree::ConfigTree;
use canopy_upgrade::modstate_diff;
use canopy_validate::Validator;

use crate::engine::Engine;
use crate::error::{TransactionError, TxResult};
use crate::txn::{Transaction, TxState};

impl Engine {
    /// Bring the engine up: ensure the canonical datastores exist,
    /// replay startup (with upgrades) into running, fall back to the
    /// failsafe configuration if that fails, and recover any
    /// confirmed-commit state a previous process left behind.
    pub fn boot(&mut self) -> TxResult<()> {
        let modstate = if self.options.modstate {
            Some(self.spec.modstate())
        } else {
            None
        };
        if !self.store.exists(RUNNING) {
            self.store.reset(RUNNING, modstate.as_ref())?;
        }
        if self.store.exists(STARTUP) {
            if let Err(e) = self.startup_commit(STARTUP) {
                if matches!(e, TransactionError::Fatal(_)) {
                    return Err(e);
                }
                error!(error = %e, "startup replay failed");
                self.load_failsafe("startup")?;
            }
        }
        // Candidate mirrors running after boot.
        self.store.copy(RUNNING, CANDIDATE)?;
        self.store.set_modified(CANDIDATE, false);
        self.recover_confirmed_commit()?;
        Ok(())
    }

    fn recover_confirmed_commit(&mut self) -> TxResult<()> {
        if self.confirm.in_rollback() {
            // Crashed mid-rollback; retry if the snapshot survived.
            let snapshot = self.confirm.state().snapshot.clone();
            if self.store.exists(&snapshot) {
                warn!("resuming interrupted rollback");
                return self.rollback_now();
            }
            self.confirm.clear()?;
            return Ok(());
        }
        if self.confirm.is_active() {
            if self.confirm.due(self.clock.now()) {
                warn!("confirm deadline passed while down; rolling back");
                self.rollback_now()?;
            } else {
                info!(
                    deadline = self.confirm.state().deadline,
                    "confirmed commit re-armed after restart"
                );
            }
        }
        Ok(())
    }

    // ========== Startup replay ==========

    /// Load the startup datastore, run upgrades, bind, and drive the
    /// all-ADD validate pipeline. Shared by startup-validate and
    /// startup-commit.
    fn startup_common(&mut self, db: &str, txn: &mut Transaction) -> TxResult<()> {
        info!(db, "reading startup configuration");
        let (mut tree, stored_ms) = self.store.load(db)?;
        tree.reset_flags(
            Flags::ADD | Flags::DEL | Flags::CHANGE | Flags::MARK | Flags::DEFAULT,
        );

        let msdiff = if self.options.modstate {
            Some(modstate_diff(stored_ms.as_ref(), &self.spec, true))
        } else {
            None
        };
        if let Some(d) = &msdiff {
            if d.status == ModstateStatus::NoMatch {
                warn!(
                    db,
                    "module-state expected but not found; the datastore may have been \
                     copied by hand, or predates module-state recording"
                );
            }
        }

        if self.options.upgrade_checkold {
            // General-purpose datastore upgrade, then module-specific
            // callbacks for each module whose revision differs.
            self.bus.datastore_upgrade(&mut tree, msdiff.as_ref())?;
            if let Some(d) = &msdiff {
                if !d.is_empty() {
                    for delta in &d.entries {
                        if let Some(log) = &self.changelog {
                            log.upgrade(&mut tree, &delta.namespace, delta.from, delta.to)?;
                        }
                        self.bus
                            .module_upgrade(&mut tree, &delta.namespace, delta.from, delta.to)?;
                    }
                    self.upgrades.run(&mut tree, d)?;
                }
            }
        }

        // Upgrading can add or remove children; only now is the shape
        // final. Bind to the current schema, check for state data,
        // sort and fill defaults.
        if !tree.is_empty() {
            tree.bind(&self.spec)
                .map_err(TransactionError::Validation)?;
            if self.options.validate_state {
                Validator::new(&self.spec)
                    .reject_state_data(&tree)
                    .into_result()
                    .map_err(TransactionError::Validation)?;
            }
            tree.sort_recurse(&self.spec)?;
            Validator::new(&self.spec).fill_defaults(&mut tree)?;
        }

        // Handcraft a transition carrying only an added tree.
        txn.target = tree;
        let top: Vec<NodeId> = txn.target.child_elements(txn.target.root()).collect();
        for node in &top {
            txn.target.set_flag_subtree(*node, Flags::ADD)?;
        }
        txn.added = top;

        match self.bus.begin(&mut txn.view()) {
            Ok(n) => txn.set_begun(n),
            Err((n, e)) => {
                txn.set_begun(n);
                return Err(e.into());
            }
        }
        txn.set_state(TxState::Open);

        if !txn.target.is_empty() {
            info!(db, "validating startup configuration");
            self.generic_validate(txn)?;
        }
        self.bus.run(Phase::Validate, &mut txn.view())?;
        txn.set_state(TxState::Validated);
        self.bus.run(Phase::Complete, &mut txn.view())?;
        txn.set_state(TxState::Ready);
        Ok(())
    }

    /// Validate the startup datastore without committing, returning
    /// the upgraded tree.
    pub fn startup_validate(&mut self, db: &str) -> TxResult<ConfigTree> {
        let mut txn = Transaction::new();
        let result = self.startup_common(db, &mut txn);
        match result {
            Ok(()) => {
                let ended = self.bus.end(&mut txn.view());
                txn.set_begun(0);
                txn.set_state(TxState::Idle);
                ended?;
                Ok(std::mem::take(&mut txn.target))
            }
            Err(e) => {
                self.abort_txn(&mut txn);
                Err(e)
            }
        }
    }

    /// Replay the startup datastore into running.
    pub fn startup_commit(&mut self, db: &str) -> TxResult<()> {
        if db == RUNNING {
            return Err(TransactionError::Fatal(format!(
                "invalid startup datastore: {}",
                db
            )));
        }
        let mut txn = Transaction::new();
        let result = self.startup_pipeline(db, &mut txn);
        if result.is_err() && txn.state() != TxState::Installed {
            self.abort_txn(&mut txn);
        }
        result
    }

    fn startup_pipeline(&mut self, db: &str, txn: &mut Transaction) -> TxResult<()> {
        self.startup_common(db, txn)?;
        self.bus.run(Phase::Commit, &mut txn.view())?;
        txn.set_state(TxState::Committed);
        self.bus.run(Phase::CommitDone, &mut txn.view())?;

        let modstate = if self.options.modstate {
            Some(self.spec.modstate())
        } else {
            None
        };
        self.store.save(RUNNING, &txn.target, modstate.as_ref())?;
        txn.set_state(TxState::Installed);
        info!(db, "startup configuration installed");

        self.bus.end(&mut txn.view())?;
        txn.set_state(TxState::Idle);
        Ok(())
    }

    // ========== Failsafe ==========

    /// Reset running and commit the failsafe datastore in its place.
    ///
    /// Invoked when startup validation or commit fails. The original
    /// running is parked in `tmp` and restored if the failsafe itself
    /// cannot be committed.
    pub fn load_failsafe(&mut self, phase: &str) -> TxResult<()> {
        if !self.store.exists(FAILSAFE) {
            return Err(TransactionError::Fatal(format!(
                "{} failed and no failsafe datastore found",
                phase
            )));
        }
        let modstate = if self.options.modstate {
            Some(self.spec.modstate())
        } else {
            None
        };
        self.store.copy(RUNNING, TMP)?;
        self.store.reset(RUNNING, modstate.as_ref())?;
        match self.candidate_commit(FAILSAFE, 0, None, true) {
            Ok(()) => {
                warn!(phase, "failsafe configuration loaded");
                Ok(())
            }
            Err(e) => {
                self.store.copy(TMP, RUNNING)?;
                Err(TransactionError::Fatal(format!(
                    "{} failed and failsafe load failed: {}",
                    phase, e
                )))
            }
        }
    }
}
