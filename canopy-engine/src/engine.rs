//! The engine: shared validate/commit core and confirmed-commit
//! handling.

use tracing::{debug, error, info, warn};

use canopy_core::{ClientId, Clock, Flags, SystemClock};
use canopy_plugin::{Phase, Plugin, PluginBus};
use canopy_store::{DatastoreStore, RUNNING};
use canopy_tree::{diff, mark_transaction_flags, ConfigTree};
use canopy_upgrade::{Changelog, UpgradeRegistry};
use canopy_validate::Validator;
use canopy_yang::YangSpec;

use crate::confirm::{snapshot_name, ConfirmManager, ConfirmParams, ConfirmedCommitState};
use crate::error::{TransactionError, TxResult};
use crate::options::EngineOptions;
use crate::txn::{Transaction, TxState};

/// The configuration transaction engine.
///
/// Owns the schema, the datastore store, the plugin bus, the upgrade
/// machinery and the confirmed-commit state. All entry points take
/// `&mut self`; there is no global engine handle.
pub struct Engine {
    pub(crate) spec: YangSpec,
    pub(crate) store: DatastoreStore,
    pub(crate) bus: PluginBus,
    pub(crate) upgrades: UpgradeRegistry,
    pub(crate) changelog: Option<Changelog>,
    pub(crate) options: EngineOptions,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) confirm: ConfirmManager,
}

impl Engine {
    /// Create an engine on the system clock.
    pub fn new(spec: YangSpec, store: DatastoreStore, options: EngineOptions) -> TxResult<Self> {
        Self::with_clock(spec, store, options, Box::new(SystemClock))
    }

    /// Create an engine with an injected clock (tests, simulations).
    pub fn with_clock(
        spec: YangSpec,
        store: DatastoreStore,
        options: EngineOptions,
        clock: Box<dyn Clock>,
    ) -> TxResult<Self> {
        let changelog = match &options.changelog_file {
            Some(path) => Some(Changelog::load(path)?),
            None => None,
        };
        let confirm = ConfirmManager::open(ConfirmManager::state_file(store.dir()))?;
        Ok(Self {
            spec,
            store,
            bus: PluginBus::new(),
            upgrades: UpgradeRegistry::new(),
            changelog,
            options,
            clock,
            confirm,
        })
    }

    /// The schema.
    pub fn spec(&self) -> &YangSpec {
        &self.spec
    }

    /// The datastore store.
    pub fn store(&self) -> &DatastoreStore {
        &self.store
    }

    /// Mutable datastore access (tests, edit-config callers).
    pub fn store_mut(&mut self) -> &mut DatastoreStore {
        &mut self.store
    }

    /// The engine options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Register a plugin; registration order is invocation order.
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.bus.register(plugin);
    }

    /// The programmatic upgrade callback registry.
    pub fn upgrades_mut(&mut self) -> &mut UpgradeRegistry {
        &mut self.upgrades
    }

    /// The persisted confirmed-commit state.
    pub fn confirmed_commit_state(&self) -> &ConfirmedCommitState {
        self.confirm.state()
    }

    // ========== Loading ==========

    /// Load a datastore bound, sorted and with defaults filled: the
    /// shape transactions operate on.
    pub(crate) fn load_bound(&self, db: &str) -> TxResult<ConfigTree> {
        let (mut tree, _) = self.store.load(db)?;
        tree.reset_flags(
            Flags::ADD | Flags::DEL | Flags::CHANGE | Flags::MARK | Flags::DEFAULT,
        );
        tree.bind(&self.spec)
            .map_err(TransactionError::Validation)?;
        tree.sort_recurse(&self.spec)?;
        Validator::new(&self.spec).fill_defaults(&mut tree)?;
        Ok(tree)
    }

    // ========== Shared validate core ==========

    /// Load source and target, diff, flag, and run the
    /// begin/validate/complete phases. Shared by candidate-validate
    /// and candidate-commit.
    pub(crate) fn validate_common(&mut self, db: &str, txn: &mut Transaction) -> TxResult<()> {
        debug!(db, "validate transaction");
        // The state we are going to.
        txn.target = self.load_bound(db)?;
        // The state we are going from.
        txn.source = self.load_bound(RUNNING)?;

        let d = diff(&txn.source, &txn.target, &self.spec);
        mark_transaction_flags(&mut txn.source, &mut txn.target, &d);
        txn.set_diff(d);

        match self.bus.begin(&mut txn.view()) {
            Ok(n) => txn.set_begun(n),
            Err((n, e)) => {
                txn.set_begun(n);
                return Err(e.into());
            }
        }
        txn.set_state(TxState::Open);

        // An empty target skips generic validation but still runs the
        // plugin phases: some plugins derive from "empty config".
        if !txn.target.is_empty() {
            self.generic_validate(txn)?;
        }

        self.bus.run(Phase::Validate, &mut txn.view())?;
        txn.set_state(TxState::Validated);
        self.bus.run(Phase::Complete, &mut txn.view())?;
        txn.set_state(TxState::Ready);
        Ok(())
    }

    /// Structural validation: the whole target tree, then each changed
    /// and added subtree.
    pub(crate) fn generic_validate(&self, txn: &Transaction) -> TxResult<()> {
        let validator = Validator::new(&self.spec);
        let mut errors = validator.validate_all_top(&txn.target);
        for node in txn.tgt_changed.iter().chain(txn.added.iter()) {
            errors.merge(validator.validate_add(&txn.target, *node));
        }
        errors.into_result().map_err(TransactionError::Validation)
    }

    /// Run plugin aborts (reverse order, best-effort) and return the
    /// transaction to idle.
    pub(crate) fn abort_txn(&mut self, txn: &mut Transaction) {
        let begun = txn.begun();
        if begun > 0 {
            txn.set_state(TxState::Aborting);
            self.bus.abort(&mut txn.view(), begun);
        }
        txn.set_state(TxState::Idle);
    }

    // ========== Validate and commit transitions ==========

    /// Run the validate pipeline against a datastore without
    /// committing.
    pub fn candidate_validate(&mut self, db: &str) -> TxResult<()> {
        let mut txn = Transaction::new();
        let result = self.validate_pipeline(db, &mut txn);
        if result.is_err() {
            self.abort_txn(&mut txn);
        }
        result
    }

    fn validate_pipeline(&mut self, db: &str, txn: &mut Transaction) -> TxResult<()> {
        self.validate_common(db, txn)?;
        // Every begun plugin gets its end here; a failure must not
        // additionally trigger aborts.
        let ended = self.bus.end(&mut txn.view());
        txn.set_begun(0);
        txn.set_state(TxState::Idle);
        ended.map_err(Into::into)
    }

    /// Run the full commit pipeline: validate, plugin commit phases,
    /// install the target as running.
    ///
    /// `rollback` marks a transaction executing (or recovering) a
    /// confirmed-commit rollback; such transactions skip the
    /// confirmed-commit handling to avoid regress.
    pub(crate) fn candidate_commit(
        &mut self,
        db: &str,
        client: ClientId,
        confirm: Option<&ConfirmParams>,
        rollback: bool,
    ) -> TxResult<()> {
        let mut txn = Transaction::new();
        let result = self.commit_pipeline(db, client, confirm, rollback, &mut txn);
        if result.is_err() && txn.state() != TxState::Installed {
            self.abort_txn(&mut txn);
        }
        result
    }

    fn commit_pipeline(
        &mut self,
        db: &str,
        client: ClientId,
        confirm: Option<&ConfirmParams>,
        rollback: bool,
        txn: &mut Transaction,
    ) -> TxResult<()> {
        self.validate_common(db, txn)?;

        // Confirmed-commit phase two: arm a new rollback point or
        // extend/settle an outstanding one. Rollback transactions
        // skip this entirely.
        if self.options.confirmed_commit && !rollback {
            if let Some(params) = confirm {
                self.handle_confirmed_commit(client, params)?;
            }
        }

        self.bus.run(Phase::Commit, &mut txn.view())?;
        txn.set_state(TxState::Committed);
        self.bus.run(Phase::CommitDone, &mut txn.view())?;

        // Install the (possibly plugin-annotated) target as running.
        let modstate = if self.options.modstate {
            Some(self.spec.modstate())
        } else {
            None
        };
        self.store.save(RUNNING, &txn.target, modstate.as_ref())?;
        self.store.set_modified(db, false);
        // Pointers into the old running are stale from here on.
        txn.clear_source_vectors();
        txn.set_state(TxState::Installed);
        info!(db, "commit installed");

        self.bus.end(&mut txn.view())?;
        txn.set_state(TxState::Idle);
        Ok(())
    }

    // ========== Confirmed commit ==========

    fn handle_confirmed_commit(&mut self, client: ClientId, params: &ConfirmParams) -> TxResult<()> {
        if params.confirmed {
            let deadline = self.clock.now() + params.timeout_secs() as u64;
            if self.confirm.is_active() {
                // A confirming commit that is itself confirmed extends
                // the window; the rollback snapshot stays.
                info!(deadline, "confirmed commit extended");
                self.confirm.extend(deadline)?;
            } else {
                let snapshot = snapshot_name(client, params.persist.as_deref());
                self.store.copy(RUNNING, &snapshot)?;
                info!(snapshot = %snapshot, deadline, "confirmed commit armed");
                self.confirm
                    .arm(client, params.persist.clone(), deadline, snapshot)?;
            }
        } else if self
            .confirm
            .matches_confirming(client, params.persist_id.as_deref())
        {
            self.finish_confirming_commit()?;
        }
        Ok(())
    }

    /// Settle an outstanding confirmed commit: drop the snapshot and
    /// cancel the deadline.
    pub(crate) fn finish_confirming_commit(&mut self) -> TxResult<()> {
        let snapshot = self.confirm.state().snapshot.clone();
        self.store.delete(&snapshot)?;
        self.confirm.clear()?;
        info!("confirmed commit confirmed");
        Ok(())
    }

    /// Drive deferred work: fire the rollback if the confirm deadline
    /// has passed. The event loop calls this; returns true if a
    /// rollback ran.
    pub fn poll_rollback(&mut self) -> TxResult<bool> {
        if self.confirm.due(self.clock.now()) {
            warn!("confirm-timeout expired; rolling back");
            self.rollback_now()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Replace running with the rollback snapshot through a full
    /// commit transaction.
    pub(crate) fn rollback_now(&mut self) -> TxResult<()> {
        let snapshot = self.confirm.state().snapshot.clone();
        self.confirm.start_rollback()?;
        let result = self.candidate_commit(&snapshot, 0, None, true);
        match result {
            Ok(()) => {
                self.store.delete(&snapshot)?;
                self.confirm.clear()?;
                info!("rollback complete");
                Ok(())
            }
            Err(e) => {
                // Keep the snapshot for the operator; clear the state
                // so the engine does not loop on a broken rollback.
                error!(error = %e, "rollback failed; snapshot kept");
                self.confirm.clear()?;
                Err(e)
            }
        }
    }

    /// A session disconnected: release its locks, and treat an
    /// unconfirmed confirmed-commit from that session as expired
    /// (unless a persist token detaches it from the session).
    pub fn on_session_end(&mut self, session: ClientId) -> TxResult<()> {
        self.store.unlock_all(session);
        let state = self.confirm.state();
        if self.confirm.is_active() && state.session_id == session && state.persist.is_none() {
            warn!(session, "session closed with confirmed commit outstanding; rolling back");
            self.rollback_now()?;
        }
        Ok(())
    }
}
