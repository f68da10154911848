//! Per-plugin hot restart.
//!
//! Replays the running configuration into a single plugin without
//! restarting the backend: the plugin seeds a reset `tmp` datastore,
//! then a tmp→running transaction runs through that plugin's
//! callbacks only.

use tracing::info;

use canopy_plugin::Phase;
use canopy_store::{RUNNING, TMP};
use canopy_tree::{diff, mark_transaction_flags};
use canopy_validate::Validator;

use crate::engine::Engine;
use crate::error::{TransactionError, TxResult};
use crate::txn::{Transaction, TxState};

impl Engine {
    /// Restart one plugin by name.
    pub fn plugin_restart(&mut self, name: &str) -> TxResult<()> {
        let index = self
            .bus
            .find(name)
            .ok_or_else(|| TransactionError::Fatal(format!("unknown plugin: {}", name)))?;
        info!(plugin = name, "restarting plugin");

        let modstate = if self.options.modstate {
            Some(self.spec.modstate())
        } else {
            None
        };
        self.store.reset(TMP, modstate.as_ref())?;
        // The plugin may seed extra configuration in its reset hook.
        self.bus.reset_one(index, TMP)?;

        let mut txn = Transaction::new();
        let result = self.restart_pipeline(index, &mut txn);
        if result.is_err() && txn.state() != TxState::Installed {
            txn.set_state(TxState::Aborting);
            let _ = self.bus.run_one(index, Phase::Abort, &mut txn.view());
            txn.set_state(TxState::Idle);
        }
        result
    }

    fn restart_pipeline(&mut self, index: usize, txn: &mut Transaction) -> TxResult<()> {
        // The state we are going to is the current running.
        txn.target = self.load_bound(RUNNING)?;
        Validator::new(&self.spec)
            .validate_all_top(&txn.target)
            .into_result()
            .map_err(TransactionError::Validation)?;
        // The state we are going from is whatever reset seeded.
        txn.source = self.load_bound(TMP)?;

        let d = diff(&txn.source, &txn.target, &self.spec);
        mark_transaction_flags(&mut txn.source, &mut txn.target, &d);
        txn.set_diff(d);

        self.bus.run_one(index, Phase::Begin, &mut txn.view())?;
        txn.set_state(TxState::Open);
        self.generic_validate(txn)?;
        self.bus.run_one(index, Phase::Validate, &mut txn.view())?;
        txn.set_state(TxState::Validated);
        self.bus.run_one(index, Phase::Complete, &mut txn.view())?;
        txn.set_state(TxState::Ready);
        self.bus.run_one(index, Phase::Commit, &mut txn.view())?;
        txn.set_state(TxState::Committed);
        self.bus.run_one(index, Phase::CommitDone, &mut txn.view())?;
        // Nothing is written: the plugin was replayed, running stands.
        txn.set_state(TxState::Installed);
        self.bus.run_one(index, Phase::End, &mut txn.view())?;
        txn.set_state(TxState::Idle);
        Ok(())
    }
}
