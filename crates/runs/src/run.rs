use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gstflow_core::{Aggregate, AggregateRoot, DomainError, RunId, RunScope};
use gstflow_events::Event;

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    AwaitingApproval,
    CriticalExceptions,
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::AwaitingApproval => "awaiting_approval",
            RunStatus::CriticalExceptions => "critical_exceptions",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal runs accept no further commands; their stream is closed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::CriticalExceptions
                | RunStatus::Success
                | RunStatus::Failed
                | RunStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, to: RunStatus) -> bool {
        use RunStatus::*;
        match self {
            Running => matches!(
                to,
                AwaitingApproval | CriticalExceptions | Success | Failed | Cancelled
            ),
            AwaitingApproval => matches!(to, Running | Failed | Cancelled),
            CriticalExceptions | Success | Failed | Cancelled => false,
        }
    }
}

impl core::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: one processing run over a (channel, gstin, month) scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    id: RunId,
    scope: Option<RunScope>,
    status: RunStatus,
    record_count: usize,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    reason: Option<String>,
    version: u64,
    created: bool,
}

impl Run {
    /// Create an empty, not-yet-started aggregate instance for rehydration.
    pub fn empty(id: RunId) -> Self {
        Self {
            id,
            scope: None,
            status: RunStatus::Running,
            record_count: 0,
            started_at: None,
            finished_at: None,
            reason: None,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a run from its persisted events.
    pub fn rehydrate<'a>(id: RunId, events: impl IntoIterator<Item = &'a RunEvent>) -> Self {
        let mut run = Run::empty(id);
        for event in events {
            run.apply(event);
        }
        run
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn scope(&self) -> Option<&RunScope> {
        self.scope.as_ref()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Failure or cancellation reason, when there is one.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl AggregateRoot for Run {
    type Id = RunId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: StartRun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRun {
    pub run_id: RunId,
    pub scope: RunScope,
    pub record_count: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendRun (approvals outstanding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendRun {
    pub run_id: RunId,
    pub pending_approvals: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResumeRun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRun {
    pub run_id: RunId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: HaltRun (critical exceptions present).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltRun {
    pub run_id: RunId,
    pub critical_exceptions: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteRun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRun {
    pub run_id: RunId,
    pub batch_count: usize,
    pub invoice_count: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FailRun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailRun {
    pub run_id: RunId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelRun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRun {
    pub run_id: RunId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunCommand {
    Start(StartRun),
    Suspend(SuspendRun),
    Resume(ResumeRun),
    Halt(HaltRun),
    Complete(CompleteRun),
    Fail(FailRun),
    Cancel(CancelRun),
}

impl RunCommand {
    fn run_id(&self) -> RunId {
        match self {
            RunCommand::Start(c) => c.run_id,
            RunCommand::Suspend(c) => c.run_id,
            RunCommand::Resume(c) => c.run_id,
            RunCommand::Halt(c) => c.run_id,
            RunCommand::Complete(c) => c.run_id,
            RunCommand::Fail(c) => c.run_id,
            RunCommand::Cancel(c) => c.run_id,
        }
    }
}

/// Event: RunStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStarted {
    pub run_id: RunId,
    pub scope: RunScope,
    pub record_count: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RunSuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSuspended {
    pub run_id: RunId,
    pub pending_approvals: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RunResumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResumed {
    pub run_id: RunId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RunHalted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHalted {
    pub run_id: RunId,
    pub critical_exceptions: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RunCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCompleted {
    pub run_id: RunId,
    pub batch_count: usize,
    pub invoice_count: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RunFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailed {
    pub run_id: RunId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RunCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCancelled {
    pub run_id: RunId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted(RunStarted),
    RunSuspended(RunSuspended),
    RunResumed(RunResumed),
    RunHalted(RunHalted),
    RunCompleted(RunCompleted),
    RunFailed(RunFailed),
    RunCancelled(RunCancelled),
}

impl RunEvent {
    /// Status the run is in after this event.
    pub fn resulting_status(&self) -> RunStatus {
        match self {
            RunEvent::RunStarted(_) | RunEvent::RunResumed(_) => RunStatus::Running,
            RunEvent::RunSuspended(_) => RunStatus::AwaitingApproval,
            RunEvent::RunHalted(_) => RunStatus::CriticalExceptions,
            RunEvent::RunCompleted(_) => RunStatus::Success,
            RunEvent::RunFailed(_) => RunStatus::Failed,
            RunEvent::RunCancelled(_) => RunStatus::Cancelled,
        }
    }
}

impl Event for RunEvent {
    fn run_id(&self) -> RunId {
        match self {
            RunEvent::RunStarted(e) => e.run_id,
            RunEvent::RunSuspended(e) => e.run_id,
            RunEvent::RunResumed(e) => e.run_id,
            RunEvent::RunHalted(e) => e.run_id,
            RunEvent::RunCompleted(e) => e.run_id,
            RunEvent::RunFailed(e) => e.run_id,
            RunEvent::RunCancelled(e) => e.run_id,
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            RunEvent::RunStarted(_) => "runs.run.started",
            RunEvent::RunSuspended(_) => "runs.run.suspended",
            RunEvent::RunResumed(_) => "runs.run.resumed",
            RunEvent::RunHalted(_) => "runs.run.halted",
            RunEvent::RunCompleted(_) => "runs.run.completed",
            RunEvent::RunFailed(_) => "runs.run.failed",
            RunEvent::RunCancelled(_) => "runs.run.cancelled",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RunEvent::RunStarted(e) => e.occurred_at,
            RunEvent::RunSuspended(e) => e.occurred_at,
            RunEvent::RunResumed(e) => e.occurred_at,
            RunEvent::RunHalted(e) => e.occurred_at,
            RunEvent::RunCompleted(e) => e.occurred_at,
            RunEvent::RunFailed(e) => e.occurred_at,
            RunEvent::RunCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Run {
    type Command = RunCommand;
    type Event = RunEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RunEvent::RunStarted(e) => {
                self.id = e.run_id;
                self.scope = Some(e.scope.clone());
                self.record_count = e.record_count;
                self.started_at = Some(e.occurred_at);
                self.created = true;
            }
            RunEvent::RunSuspended(_) | RunEvent::RunResumed(_) => {}
            RunEvent::RunHalted(e) => self.finished_at = Some(e.occurred_at),
            RunEvent::RunCompleted(e) => self.finished_at = Some(e.occurred_at),
            RunEvent::RunFailed(e) => {
                self.reason = Some(e.reason.clone());
                self.finished_at = Some(e.occurred_at);
            }
            RunEvent::RunCancelled(e) => {
                self.reason = e.reason.clone();
                self.finished_at = Some(e.occurred_at);
            }
        }
        self.status = event.resulting_status();

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.run_id() != self.id {
            return Err(DomainError::invariant("run_id mismatch"));
        }

        let event = match command {
            RunCommand::Start(cmd) => {
                if self.created {
                    return Err(DomainError::conflict(format!("run {} already started", self.id)));
                }
                RunEvent::RunStarted(RunStarted {
                    run_id: cmd.run_id,
                    scope: cmd.scope.clone(),
                    record_count: cmd.record_count,
                    occurred_at: cmd.occurred_at,
                })
            }
            RunCommand::Suspend(cmd) => RunEvent::RunSuspended(RunSuspended {
                run_id: cmd.run_id,
                pending_approvals: cmd.pending_approvals,
                occurred_at: cmd.occurred_at,
            }),
            RunCommand::Resume(cmd) => RunEvent::RunResumed(RunResumed {
                run_id: cmd.run_id,
                occurred_at: cmd.occurred_at,
            }),
            RunCommand::Halt(cmd) => RunEvent::RunHalted(RunHalted {
                run_id: cmd.run_id,
                critical_exceptions: cmd.critical_exceptions,
                occurred_at: cmd.occurred_at,
            }),
            RunCommand::Complete(cmd) => RunEvent::RunCompleted(RunCompleted {
                run_id: cmd.run_id,
                batch_count: cmd.batch_count,
                invoice_count: cmd.invoice_count,
                occurred_at: cmd.occurred_at,
            }),
            RunCommand::Fail(cmd) => RunEvent::RunFailed(RunFailed {
                run_id: cmd.run_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            }),
            RunCommand::Cancel(cmd) => RunEvent::RunCancelled(RunCancelled {
                run_id: cmd.run_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            }),
        };

        if !matches!(command, RunCommand::Start(_)) {
            self.ensure_transition(event.resulting_status())?;
        }
        Ok(vec![event])
    }
}

impl Run {
    fn ensure_transition(&self, to: RunStatus) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::invariant(format!("run {} has not been started", self.id)));
        }
        if !self.status.can_transition_to(to) {
            return Err(DomainError::illegal_transition("run", self.status, to));
        }
        Ok(())
    }
}
