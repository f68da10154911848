//! Confirmed-commit state.
//!
//! The small state record is persisted (write-then-rename) so a crash
//! between a confirmed commit and its deadline still triggers the
//! rollback on restart.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use canopy_core::ClientId;
use canopy_store::{StoreError, StoreResult};

/// Phase of the confirmed-commit machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmPhase {
    /// No confirmed commit outstanding.
    Inactive,
    /// A confirmed commit awaits its confirming commit.
    ConfirmedWait,
    /// A rollback is being executed.
    Rollback,
}

/// The persisted confirmed-commit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedCommitState {
    /// Current phase.
    pub phase: ConfirmPhase,
    /// The `<persist>` token of the confirmed commit, if any.
    pub persist: Option<String>,
    /// Session that issued the confirmed commit.
    pub session_id: ClientId,
    /// Absolute rollback deadline, unix seconds.
    pub deadline: u64,
    /// Name of the rollback snapshot datastore.
    pub snapshot: String,
}

impl Default for ConfirmedCommitState {
    fn default() -> Self {
        Self {
            phase: ConfirmPhase::Inactive,
            persist: None,
            session_id: 0,
            deadline: 0,
            snapshot: String::new(),
        }
    }
}

/// Parameters of a commit RPC relevant to confirmed commits.
#[derive(Debug, Clone, Default)]
pub struct ConfirmParams {
    /// `<confirmed/>` present.
    pub confirmed: bool,
    /// `<confirm-timeout>` in seconds; `None` means the 600 s default.
    pub timeout: Option<u32>,
    /// `<persist>` token to record.
    pub persist: Option<String>,
    /// `<persist-id>` presented to confirm an earlier commit.
    pub persist_id: Option<String>,
}

impl ConfirmParams {
    /// The effective timeout.
    pub fn timeout_secs(&self) -> u32 {
        self.timeout.unwrap_or(600)
    }
}

/// Owns the persisted confirmed-commit state.
#[derive(Debug)]
pub(crate) struct ConfirmManager {
    path: PathBuf,
    state: ConfirmedCommitState,
}

impl ConfirmManager {
    /// Open the manager, reading any state a previous process left.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(bytes) => serde_json::from_str(&bytes).map_err(StoreError::Format)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ConfirmedCommitState::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, state })
    }

    pub fn state(&self) -> &ConfirmedCommitState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.phase == ConfirmPhase::ConfirmedWait
    }

    pub fn in_rollback(&self) -> bool {
        self.state.phase == ConfirmPhase::Rollback
    }

    /// The rollback deadline has passed.
    pub fn due(&self, now: u64) -> bool {
        self.is_active() && now >= self.state.deadline
    }

    /// Does a commit from `session` with this `persist-id` confirm the
    /// outstanding confirmed commit?
    pub fn matches_confirming(&self, session: ClientId, persist_id: Option<&str>) -> bool {
        if !self.is_active() {
            return false;
        }
        match &self.state.persist {
            Some(token) => persist_id == Some(token.as_str()),
            None => persist_id.is_none() && session == self.state.session_id,
        }
    }

    /// Record a new confirmed commit.
    pub fn arm(
        &mut self,
        session: ClientId,
        persist: Option<String>,
        deadline: u64,
        snapshot: String,
    ) -> StoreResult<()> {
        self.state = ConfirmedCommitState {
            phase: ConfirmPhase::ConfirmedWait,
            persist,
            session_id: session,
            deadline,
            snapshot,
        };
        self.save()
    }

    /// Push the deadline out without touching the snapshot.
    pub fn extend(&mut self, deadline: u64) -> StoreResult<()> {
        self.state.deadline = deadline;
        self.save()
    }

    /// Enter the rollback phase.
    pub fn start_rollback(&mut self) -> StoreResult<()> {
        self.state.phase = ConfirmPhase::Rollback;
        self.save()
    }

    /// Forget the outstanding confirmed commit.
    pub fn clear(&mut self) -> StoreResult<()> {
        self.state = ConfirmedCommitState::default();
        self.save()
    }

    fn save(&self) -> StoreResult<()> {
        let mut bytes = serde_json::to_string_pretty(&self.state).map_err(StoreError::Format)?;
        bytes.push('\n');
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), phase = ?self.state.phase, "confirmed-commit state saved");
        Ok(())
    }
}

/// A datastore-safe snapshot name for a confirmed commit, derived from
/// the persist token or the issuing session.
pub(crate) fn snapshot_name(session: ClientId, persist: Option<&str>) -> String {
    match persist {
        Some(token) => {
            let safe: String = token
                .chars()
                .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect();
            format!("rollback_{}", safe)
        }
        None => format!("rollback_session_{}", session),
    }
}

impl ConfirmManager {
    /// The full path of the state file (relative to a store directory).
    pub fn state_file(dir: &Path) -> PathBuf {
        dir.join("confirmed-commit.json")
    }
}
