//! Run orchestration (application-level).
//!
//! The coordinator drives one run through the pipeline:
//!
//! ```text
//! start / resume
//!   ↓
//! 1. Load the run stream and rehydrate the `Run` aggregate
//!   ↓
//! 2. Detect anomalies on the effective records, submit them as exceptions
//!   ↓
//! 3. Gate: any critical exception → halt; any open approval → suspend
//!   ↓
//! 4. Aggregate eligible records, reconcile against the input
//!   ↓
//! 5. Allocate invoices, inspect them for collisions
//!   ↓
//! 6. Finalize outputs, complete
//! ```
//!
//! Every status change is handled by the aggregate, appended to the
//! [`RunStore`] with an exact expected version, and only then published.
//!
//! A pass is re-entrant. Exception and request ids are derived from content,
//! invoice allocation is idempotent per transaction, and outputs are
//! write-once, so repeating a pass after a crash converges on the same result.
//! A port failure is returned as an error without touching the run's status;
//! calling [`RunCoordinator::resume`] later continues from persisted state.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;

use gstflow_aggregation::{AggregationError, EligibleLine, Totals, aggregate, reconcile};
use gstflow_approval::{
    Actor, ApprovalRequest, ApprovalWorkflow, DecisionStore, DecisionStoreError, Outcome, RuleSet,
    Submission, WorkflowError,
};
use gstflow_core::{
    Aggregate, AggregateRoot, DomainError, ExpectedVersion, GstRate, NormalizedRecord,
    RecordOverrides, RequestId, RunId, RunScope, StateCode, TransactionId,
};
use gstflow_events::{Event, EventBus, EventEnvelope};
use gstflow_exceptions::{ErrorCode, Exception, ExceptionDetector, Finding, RecordType};
use gstflow_numbering::{
    AllocationError, Invoice, InvoiceNumberer, NumberingError, NumberingPort, ScopeKey,
};
use gstflow_observability::run_span;
use gstflow_runs::{
    CancelRun, CompleteRun, FailRun, HaltRun, ResumeRun, Run, RunCommand, RunEvent, RunInput,
    RunOutput, RunResult, RunStatus, RunStore, RunStoreError, RunSummary, StartRun, SuspendRun,
};
use gstflow_tax::TaxComputation;

use crate::config::PipelineConfig;

/// Aggregate type recorded on published envelopes.
pub const RUN_AGGREGATE_TYPE: &str = "runs.run";

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("run {0} does not exist")]
    UnknownRun(RunId),

    #[error("run {0} has no stored input")]
    MissingInput(RunId),

    #[error("approval request {0} does not exist")]
    UnknownRequest(RequestId),

    #[error("run {run_id} is closed ({status})")]
    RunClosed { run_id: RunId, status: RunStatus },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    RunStore(#[from] RunStoreError),

    #[error(transparent)]
    Decisions(#[from] DecisionStoreError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// The numbering registry itself failed (not a lost race).
    #[error("numbering registry failure: {0}")]
    Numbering(NumberingError),

    /// Publication failed after a successful append; the transition stands.
    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Per-record verdicts for one pass over a run's input.
#[derive(Debug, Default)]
struct Classification {
    lines: Vec<EligibleLine>,
    invoice_scopes: Vec<(ScopeKey, TransactionId)>,
    observed_rates: BTreeSet<GstRate>,
    excluded: usize,
    validation_failures: usize,
}

#[derive(Debug)]
pub struct RunCoordinator<R, D, P, B> {
    runs: R,
    workflow: ApprovalWorkflow<D>,
    numberer: InvoiceNumberer<P>,
    bus: B,
    detector: ExceptionDetector,
    reconciliation_epsilon: Decimal,
}

impl<R, D, P, B> RunCoordinator<R, D, P, B> {
    pub fn new(
        config: &PipelineConfig,
        rules: RuleSet,
        runs: R,
        decisions: D,
        numbering: P,
        bus: B,
    ) -> Self {
        Self {
            runs,
            workflow: ApprovalWorkflow::new(decisions, rules),
            numberer: InvoiceNumberer::with_policy(numbering, config.retry_policy()),
            bus,
            detector: ExceptionDetector::new(config.detector_config()),
            reconciliation_epsilon: config.reconciliation_epsilon,
        }
    }

    pub fn runs(&self) -> &R {
        &self.runs
    }

    pub fn workflow(&self) -> &ApprovalWorkflow<D> {
        &self.workflow
    }

    pub fn numbering(&self) -> &P {
        self.numberer.port()
    }
}

impl<R, D, P, B> RunCoordinator<R, D, P, B>
where
    R: RunStore,
    D: DecisionStore,
    P: NumberingPort,
    B: EventBus<EventEnvelope<RunEvent>>,
{
    /// Start a run over `records` (input order is preserved) and drive it as
    /// far as it can go.
    ///
    /// Starting an already-started run with the same input behaves like
    /// [`resume`](Self::resume); a different input is refused.
    pub fn start(
        &self,
        run_id: RunId,
        scope: RunScope,
        records: Vec<NormalizedRecord>,
    ) -> Result<RunResult, CoordinatorError> {
        let record_count = records.len();
        let input = RunInput {
            scope: scope.clone(),
            records,
        };
        self.runs.save_input(run_id, input.clone())?;

        let mut run = self.load_run(run_id)?;
        if !run.exists() {
            self.execute(
                &mut run,
                RunCommand::Start(StartRun {
                    run_id,
                    scope,
                    record_count,
                    occurred_at: Utc::now(),
                }),
            )?;
        }

        self.drive(&mut run, &input)?;
        self.result(run_id)
    }

    /// Continue a run from its persisted state. Idempotent.
    pub fn resume(&self, run_id: RunId) -> Result<RunResult, CoordinatorError> {
        let mut run = self.load_run(run_id)?;
        if !run.exists() {
            return Err(CoordinatorError::UnknownRun(run_id));
        }
        let input = self
            .runs
            .load_input(run_id)?
            .ok_or(CoordinatorError::MissingInput(run_id))?;

        self.drive(&mut run, &input)?;
        self.result(run_id)
    }

    /// Record a human decision. The run picks it up on the next `resume`.
    pub fn decide(
        &self,
        request_id: &RequestId,
        outcome: Outcome,
        actor: Actor,
        notes: Option<String>,
    ) -> Result<ApprovalRequest, CoordinatorError> {
        let request = self
            .workflow
            .store()
            .approval_request(request_id)?
            .ok_or(CoordinatorError::UnknownRequest(*request_id))?;

        let run = self.load_run(request.run_id())?;
        if run.status().is_terminal() {
            return Err(CoordinatorError::RunClosed {
                run_id: request.run_id(),
                status: run.status(),
            });
        }

        Ok(self.workflow.decide(request_id, outcome, actor, notes)?)
    }

    /// Cancel a run whose batches have not been finalized.
    pub fn cancel(&self, run_id: RunId, reason: Option<String>) -> Result<RunResult, CoordinatorError> {
        let mut run = self.load_run(run_id)?;
        if !run.exists() {
            return Err(CoordinatorError::UnknownRun(run_id));
        }
        if run.status().is_terminal() {
            return Err(CoordinatorError::RunClosed {
                run_id,
                status: run.status(),
            });
        }
        if self.runs.load_outputs(run_id)?.is_some() {
            return Err(RunStoreError::AlreadyFinalized(run_id).into());
        }

        self.execute(
            &mut run,
            RunCommand::Cancel(CancelRun {
                run_id,
                reason,
                occurred_at: Utc::now(),
            }),
        )?;
        self.result(run_id)
    }

    /// Current view of a run, rebuilt from persisted state.
    ///
    /// Summary counts reflect the current exception and approval state, so
    /// for runs that never reached `success` they describe what would be
    /// eligible, not what was released.
    pub fn result(&self, run_id: RunId) -> Result<RunResult, CoordinatorError> {
        let run = self.load_run(run_id)?;
        if !run.exists() {
            return Err(CoordinatorError::UnknownRun(run_id));
        }
        let input = self
            .runs
            .load_input(run_id)?
            .ok_or(CoordinatorError::MissingInput(run_id))?;

        let classification = self.classify(run_id, &input)?;
        let exceptions = self.workflow.store().exceptions(run_id)?;
        let pending_approvals = self.workflow.pending(run_id)?;

        let (pivot_groups, batch_files, invoices) = match self.runs.load_outputs(run_id)? {
            Some(output) => (
                output.aggregation.pivot_groups,
                output.aggregation.batch_files,
                output.invoices,
            ),
            None => Default::default(),
        };

        let totals = Totals::of_lines(&classification.lines);
        let summary = RunSummary {
            total_records: input.records.len(),
            eligible_records: classification.lines.len(),
            excluded_records: classification.excluded,
            validation_failures: classification.validation_failures,
            invoices_allocated: invoices.len(),
            batch_count: batch_files.len(),
            total_taxable: totals.taxable,
            total_tax: totals.tax(),
        };

        Ok(RunResult {
            run_id,
            status: run.status(),
            pivot_groups,
            batch_files,
            exceptions,
            pending_approvals,
            invoices,
            summary,
        })
    }

    fn drive(&self, run: &mut Run, input: &RunInput) -> Result<(), CoordinatorError> {
        let run_id = *run.id();
        let span = run_span(run_id, &input.scope);
        let _entered = span.enter();

        if run.status().is_terminal() {
            tracing::debug!(status = %run.status(), "run is closed; nothing to do");
            return Ok(());
        }

        self.workflow.reconcile(run_id)?;

        if let Some(output) = self.runs.load_outputs(run_id)? {
            // Finalized on an earlier pass that stopped before completing.
            return self.settle(
                run,
                RunCommand::Complete(CompleteRun {
                    run_id,
                    batch_count: output.aggregation.batch_files.len(),
                    invoice_count: output.invoices.len(),
                    occurred_at: Utc::now(),
                }),
            );
        }

        self.detect(run_id, input)?;

        let critical = self.critical_count(run_id)?;
        if critical > 0 {
            tracing::warn!(critical, "critical exceptions present; aggregation skipped");
            return self.settle(run, halt(run_id, critical));
        }

        let pending = self.workflow.pending(run_id)?.len();
        if pending > 0 {
            tracing::info!(pending, "waiting on approvals");
            return self.settle(
                run,
                RunCommand::Suspend(SuspendRun {
                    run_id,
                    pending_approvals: pending,
                    occurred_at: Utc::now(),
                }),
            );
        }

        let classification = self.classify(run_id, input)?;
        let aggregation = aggregate(
            &input.scope,
            &classification.lines,
            &classification.observed_rates,
        );
        let report = match reconcile(&classification.lines, &aggregation, self.reconciliation_epsilon) {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "reconciliation failed");
                let AggregationError::ReconciliationMismatch { metric, .. } = &err;
                let finding = Finding::new(
                    ErrorCode::ReconciliationMismatch,
                    RecordType::Run,
                    run_id.to_string(),
                    err.to_string(),
                )
                .with_fingerprint(*metric);
                self.submit(run_id, finding, None)?;
                return self.settle(
                    run,
                    RunCommand::Fail(FailRun {
                        run_id,
                        reason: err.to_string(),
                        occurred_at: Utc::now(),
                    }),
                );
            }
        };

        let allocations = self.allocate(run_id, &classification.invoice_scopes)?;
        for finding in self.detector.inspect_invoices(&allocations) {
            self.submit(run_id, finding, None)?;
        }
        let invoices: Vec<Invoice> = allocations.into_iter().map(|(_, invoice)| invoice).collect();
        let critical = self.critical_count(run_id)?;
        if critical > 0 {
            tracing::warn!(critical, "invoice allocation raised critical exceptions");
            return self.settle(run, halt(run_id, critical));
        }

        let batch_count = aggregation.batch_files.len();
        let invoice_count = invoices.len();
        self.runs.finalize_outputs(
            run_id,
            RunOutput {
                aggregation,
                invoices,
                reconciliation: report,
                finalized_at: Utc::now(),
            },
        )?;
        tracing::info!(
            batches = batch_count,
            invoices = invoice_count,
            eligible = classification.lines.len(),
            "outputs finalized"
        );

        self.settle(
            run,
            RunCommand::Complete(CompleteRun {
                run_id,
                batch_count,
                invoice_count,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Raise every finding for the run's current effective input.
    fn detect(&self, run_id: RunId, input: &RunInput) -> Result<(), CoordinatorError> {
        for finding in self.detector.inspect_run(&run_id.to_string(), &input.scope.gstin) {
            self.submit(run_id, finding, None)?;
        }

        let overrides = self.approved_overrides(run_id)?;
        let duplicates = self.detector.duplicate_transactions(&input.records);
        for (idx, record) in input.records.iter().enumerate() {
            let effective = effective_record(record, &overrides);
            let (findings, _) = self.inspect(idx, &input.scope, &effective, &duplicates);
            for finding in findings {
                self.submit(run_id, finding, Some(&effective))?;
            }
        }
        Ok(())
    }

    /// Decide eligibility of every record. Read-only.
    fn classify(&self, run_id: RunId, input: &RunInput) -> Result<Classification, CoordinatorError> {
        let overrides = self.approved_overrides(run_id)?;
        let duplicates = self.detector.duplicate_transactions(&input.records);
        let mut out = Classification::default();

        for (idx, record) in input.records.iter().enumerate() {
            let effective = effective_record(record, &overrides);
            let (findings, computation) = self.inspect(idx, &input.scope, &effective, &duplicates);

            let rejected_outright = findings.iter().any(|f| {
                matches!(f.code, ErrorCode::OutOfScopeRecord | ErrorCode::DuplicateTransaction)
            });
            if !rejected_outright {
                if let Some(rate) = effective.gst_rate.and_then(|raw| GstRate::try_new(raw).ok()) {
                    out.observed_rates.insert(rate);
                }
            }

            let mut blocked = false;
            for finding in &findings {
                if self.blocks(run_id, finding)? {
                    blocked = true;
                    break;
                }
            }
            if blocked {
                out.excluded += 1;
                if findings.iter().any(|f| is_validation_failure(f.code)) {
                    out.validation_failures += 1;
                }
                continue;
            }

            let destination = effective.state_code.as_deref().and_then(StateCode::classify);
            match (computation, destination) {
                (Some(computation), Some(state_code)) => {
                    match EligibleLine::from_record(&effective, computation) {
                        Some(line) => {
                            out.invoice_scopes.push((
                                ScopeKey {
                                    channel: effective.channel,
                                    gstin: effective.gstin.clone(),
                                    state_code,
                                    month: effective.month,
                                },
                                effective.transaction_id.clone(),
                            ));
                            out.lines.push(line);
                        }
                        None => out.excluded += 1,
                    }
                }
                _ => out.excluded += 1,
            }
        }
        Ok(out)
    }

    fn inspect(
        &self,
        idx: usize,
        scope: &RunScope,
        record: &NormalizedRecord,
        duplicates: &HashMap<usize, Finding>,
    ) -> (Vec<Finding>, Option<TaxComputation>) {
        if let Some(duplicate) = duplicates.get(&idx) {
            return (vec![duplicate.clone()], None);
        }
        let inspection = self.detector.inspect_record(scope, record);
        (inspection.findings, inspection.computation)
    }

    /// Whether a finding's exception, as currently stored, keeps its record out.
    fn blocks(&self, run_id: RunId, finding: &Finding) -> Result<bool, CoordinatorError> {
        let stored = self.workflow.store().exception(&finding.exception_id(run_id))?;
        Ok(match stored {
            Some(exception) => exception.blocks_record(),
            None => Exception::raise(run_id, finding.clone(), Utc::now()).blocks_record(),
        })
    }

    fn allocate(
        &self,
        run_id: RunId,
        scopes: &[(ScopeKey, TransactionId)],
    ) -> Result<Vec<(ScopeKey, Invoice)>, CoordinatorError> {
        let mut allocations = Vec::with_capacity(scopes.len());
        for (scope, transaction_id) in scopes {
            match self.numberer.allocate(scope, transaction_id) {
                Ok(invoice) => allocations.push((scope.clone(), invoice)),
                Err(AllocationError::Port(err)) => return Err(CoordinatorError::Numbering(err)),
                Err(err) => {
                    tracing::error!(transaction_id = %transaction_id, %scope, error = %err, "invoice allocation failed");
                    let finding = Finding::new(
                        ErrorCode::NumberingConflict,
                        RecordType::Transaction,
                        transaction_id.as_str(),
                        err.to_string(),
                    )
                    .with_fingerprint(scope.to_string());
                    self.submit(run_id, finding, None)?;
                }
            }
        }
        Ok(allocations)
    }

    fn submit(
        &self,
        run_id: RunId,
        finding: Finding,
        record: Option<&NormalizedRecord>,
    ) -> Result<(), CoordinatorError> {
        let code = finding.code;
        let record_id = finding.record_id.clone();
        let exception = Exception::raise(run_id, finding, Utc::now());
        if self.workflow.submit(exception, record)? != Submission::Known {
            tracing::debug!(code = code.as_str(), record_id = %record_id, "exception raised");
        }
        Ok(())
    }

    fn critical_count(&self, run_id: RunId) -> Result<usize, CoordinatorError> {
        Ok(self
            .workflow
            .store()
            .exceptions(run_id)?
            .iter()
            .filter(|e| e.is_critical())
            .count())
    }

    /// Corrections from approved requests, merged per record in request order.
    fn approved_overrides(&self, run_id: RunId) -> Result<HashMap<String, RecordOverrides>, CoordinatorError> {
        let mut by_record: HashMap<String, RecordOverrides> = HashMap::new();
        for request in self.workflow.store().approval_requests(run_id)? {
            if let Some(overrides) = request.approved_overrides().filter(|o| !o.is_empty()) {
                by_record
                    .entry(request.record_id().to_string())
                    .or_default()
                    .merge(overrides);
            }
        }
        Ok(by_record)
    }

    /// Move the run to the outcome of a pass.
    ///
    /// A suspended run that is still blocked stays as it is, so repeated
    /// resumes append nothing; any other outcome resumes it first.
    fn settle(&self, run: &mut Run, command: RunCommand) -> Result<(), CoordinatorError> {
        if run.status() == RunStatus::AwaitingApproval {
            if matches!(command, RunCommand::Suspend(_)) {
                return Ok(());
            }
            let run_id = *run.id();
            self.execute(
                run,
                RunCommand::Resume(ResumeRun {
                    run_id,
                    occurred_at: Utc::now(),
                }),
            )?;
        }
        self.execute(run, command)
    }

    /// Handle → append (exact version) → apply → publish.
    fn execute(&self, run: &mut Run, command: RunCommand) -> Result<(), CoordinatorError> {
        let run_id = *run.id();
        let events = run.handle(&command)?;
        let base_version = run.version();

        self.runs
            .append(run_id, ExpectedVersion::Exact(base_version), events.clone())?;

        for event in &events {
            run.apply(event);
            tracing::info!(
                run_id = %run_id,
                event_type = event.event_type(),
                status = %run.status(),
                "run transition"
            );
        }

        for (offset, event) in events.into_iter().enumerate() {
            let envelope =
                EventEnvelope::seal(RUN_AGGREGATE_TYPE, base_version + offset as u64 + 1, event);
            self.bus
                .publish(envelope)
                .map_err(|e| CoordinatorError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }

    fn load_run(&self, run_id: RunId) -> Result<Run, CoordinatorError> {
        let events = self.runs.load(run_id)?;
        Ok(Run::rehydrate(run_id, &events))
    }
}

fn halt(run_id: RunId, critical_exceptions: usize) -> RunCommand {
    RunCommand::Halt(HaltRun {
        run_id,
        critical_exceptions,
        occurred_at: Utc::now(),
    })
}

fn effective_record(
    record: &NormalizedRecord,
    overrides: &HashMap<String, RecordOverrides>,
) -> NormalizedRecord {
    match overrides.get(record.transaction_id.as_str()) {
        Some(o) => record.with_overrides(o),
        None => record.clone(),
    }
}

fn is_validation_failure(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::MissingData | ErrorCode::OutOfScopeRecord | ErrorCode::DuplicateTransaction
    )
}
