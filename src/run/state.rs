//! Per-run mutable context.
//!
//! One [`RunState`] is owned exclusively by one orchestration run; no
//! state survives between runs and nothing here is shared across
//! concurrent runs.

use uuid::Uuid;

use crate::login::Credentials;
use crate::runlog::RunLog;

/// Coarse-grained checkpoint labels used for diagnostics.
///
/// The derived ordering is the advance order; [`RunState::set_stage`]
/// relies on it to keep observed tags non-decreasing.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// No stage-tagged work has started.
    Idle,
    /// The instance is being brought up.
    InstanceStart,
    /// The login/synchronization dialogue is in progress.
    LogsSynchronization,
    /// Artifacts are being copied.
    FilesCopying,
}

impl Stage {
    /// Kebab-case name used in payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InstanceStart => "instance-start",
            Self::LogsSynchronization => "logs-synchronization",
            Self::FilesCopying => "files-copying",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied directive disabling one boundary action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipDirective {
    /// Do not start the instance before the run.
    InstanceStart,
    /// Do not stop the instance after the run.
    InstanceStop,
}

impl SkipDirective {
    /// Parses a directive name from the invocation surface.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "skip-instance-start" => Some(Self::InstanceStart),
            "skip-instance-stop" => Some(Self::InstanceStop),
            _ => None,
        }
    }

    /// Canonical directive name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InstanceStart => "skip-instance-start",
            Self::InstanceStop => "skip-instance-stop",
        }
    }
}

/// How the final payload reaches the caller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunMode {
    /// The caller blocks on the response sink.
    Synchronous,
    /// The sink receives an immediate acknowledgment; the final payload
    /// is POSTed to one of the callback endpoints later.
    FireAndAcknowledge {
        /// Endpoint receiving the success payload.
        success_endpoint: String,
        /// Endpoint receiving the error payload.
        error_endpoint: String,
    },
}

/// Mutable context for one orchestration run.
#[derive(Clone, Debug)]
pub struct RunState {
    /// Identifier for correlating log output across collaborators.
    pub run_id: Uuid,
    /// Account credentials for the login flow.
    pub credentials: Credentials,
    /// Append-only log trail shipped with the final payload.
    pub log: RunLog,
    mode: RunMode,
    stage: Stage,
    skips: Vec<SkipDirective>,
    completed: bool,
}

impl RunState {
    /// Creates a fresh run context at stage `idle`.
    #[must_use]
    pub fn new(credentials: Credentials, mode: RunMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            credentials,
            log: RunLog::new(),
            mode,
            stage: Stage::Idle,
            skips: Vec::new(),
            completed: false,
        }
    }

    /// Attaches skip directives to the run.
    #[must_use]
    pub fn with_skips(mut self, skips: Vec<SkipDirective>) -> Self {
        self.skips = skips;
        self
    }

    /// Current stage tag.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Advances the stage tag. Regressions are ignored so the tag is
    /// monotonic within a run.
    pub fn set_stage(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    /// Delivery mode for this run.
    #[must_use]
    pub const fn mode(&self) -> &RunMode {
        &self.mode
    }

    /// Whether the caller disabled the given boundary action.
    #[must_use]
    pub fn has_skip(&self, directive: SkipDirective) -> bool {
        self.skips.contains(&directive)
    }

    /// Marks the run completed. Returns `true` for the first caller
    /// only; the final payload must be produced exactly once.
    pub const fn try_complete(&mut self) -> bool {
        if self.completed {
            false
        } else {
            self.completed = true;
            true
        }
    }

    /// Whether a final payload was already produced.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }
}
