//! Integration tests for the full run pipeline.
//!
//! Tests: records → RunCoordinator → exceptions/approvals → batches/invoices
//!
//! Verifies:
//! - Tax splits and grouping survive the whole pipeline
//! - Approval gating suspends runs and decisions resume them
//! - Resume is idempotent and invoice numbers are stable across reruns
//! - Invoice series are shared across GSTINs and kept apart across channels
//! - Critical exceptions halt runs before anything is released

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use gstflow_approval::{Actor, ApprovalStatus, Outcome, RuleSet};
    use gstflow_core::{
        Channel, Entity, Gstin, Month, NormalizedRecord, RecordOverrides, RunId, RunScope,
        StateCode, TransactionId,
    };
    use gstflow_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use gstflow_exceptions::ErrorCode;
    use gstflow_numbering::{
        Invoice, InvoiceNumberer, NumberingError, NumberingPort, ScopeKey,
    };
    use gstflow_runs::{RunEvent, RunStatus, RunStore};

    use crate::config::PipelineConfig;
    use crate::coordinator::{CoordinatorError, RunCoordinator};
    use crate::decision_store::InMemoryDecisionStore;
    use crate::numbering::InMemoryNumberingRegistry;
    use crate::run_store::InMemoryRunStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<RunEvent>>>;
    type Coordinator<P> = RunCoordinator<Arc<InMemoryRunStore>, Arc<InMemoryDecisionStore>, P, Bus>;

    fn coordinator<P>(numbering: P) -> (Coordinator<P>, Bus) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let coordinator = RunCoordinator::new(
            &PipelineConfig::default(),
            RuleSet::default_rules(),
            Arc::new(InMemoryRunStore::new()),
            Arc::new(InMemoryDecisionStore::new()),
            numbering,
            bus.clone(),
        );
        (coordinator, bus)
    }

    fn setup() -> (Coordinator<Arc<InMemoryNumberingRegistry>>, Bus) {
        coordinator(Arc::new(InMemoryNumberingRegistry::new()))
    }

    fn scope() -> RunScope {
        RunScope::new(
            Channel::AmazonMtr,
            Gstin::parse("33ABCDE1234F1Z5").unwrap(),
            Month::parse("2024-04").unwrap(),
        )
    }

    fn record(txn: &str, state: &str, taxable: Decimal, rate: Decimal) -> NormalizedRecord {
        let s = scope();
        let mut record = NormalizedRecord::new(TransactionId::new(txn).unwrap(), s.channel, s.gstin, s.month);
        record.state_code = Some(state.into());
        record.ledger_name = Some("Amazon Sales".into());
        record.fg_name = Some("Teak Chair".into());
        record.quantity = 1;
        record.taxable_value = Some(taxable);
        record.gst_rate = Some(rate);
        record
    }

    fn rate(raw: Decimal) -> gstflow_core::GstRate {
        gstflow_core::GstRate::try_new(raw).unwrap()
    }

    #[test]
    fn scenario_a_intrastate_record_splits_into_cgst_and_sgst() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();

        let result = coordinator
            .start(run_id, scope(), vec![record("A-1", "TN", dec!(1000.00), dec!(0.18))])
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.batch_files.len(), 1);
        let batch = &result.batch_files[0];
        assert_eq!(batch.file_name, "amazon_mtr_33ABCDE1234F1Z5_2024-04_18pct_batch");
        assert_eq!(batch.totals.cgst, dec!(90.00));
        assert_eq!(batch.totals.sgst, dec!(90.00));
        assert_eq!(batch.totals.igst, dec!(0.00));
        assert_eq!(batch.totals.tax(), dec!(180.00));

        assert_eq!(result.invoices.len(), 1);
        assert_eq!(result.invoices[0].invoice_no().as_str(), "AMZ-TN-202404-00001");
        assert_eq!(result.summary.eligible_records, 1);
        assert_eq!(result.summary.total_tax, dec!(180.00));
    }

    #[test]
    fn scenario_b_interstate_record_goes_to_igst() {
        let (coordinator, _) = setup();

        let result = coordinator
            .start(RunId::new(), scope(), vec![record("B-1", "KA", dec!(1000.00), dec!(0.18))])
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        let totals = &result.batch_files[0].totals;
        assert_eq!(totals.cgst, dec!(0.00));
        assert_eq!(totals.sgst, dec!(0.00));
        assert_eq!(totals.igst, dec!(180.00));
        assert_eq!(result.invoices[0].invoice_no().as_str(), "AMZ-KA-202404-00001");
    }

    #[test]
    fn scenario_c_identical_keys_collapse_into_one_group() {
        let (coordinator, _) = setup();

        let result = coordinator
            .start(
                RunId::new(),
                scope(),
                vec![
                    record("C-1", "TN", dec!(500.00), dec!(0.18)),
                    record("C-2", "TN", dec!(700.00), dec!(0.18)),
                ],
            )
            .unwrap();

        assert_eq!(result.pivot_groups.len(), 1);
        let group = &result.pivot_groups[0];
        assert_eq!(group.totals.taxable, dec!(1200.00));
        assert_eq!(group.totals.transaction_count, 2);
        assert_eq!(result.batch_files[0].rows()[0][6], "1200.00");

        let numbers: Vec<&str> = result.invoices.iter().map(|i| i.invoice_no().as_str()).collect();
        assert_eq!(numbers, vec!["AMZ-TN-202404-00001", "AMZ-TN-202404-00002"]);
    }

    #[test]
    fn scenario_d_invalid_rate_is_held_back_until_rejected() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();

        let result = coordinator
            .start(
                run_id,
                scope(),
                vec![
                    record("D-1", "TN", dec!(1000.00), dec!(0.18)),
                    record("D-2", "TN", dec!(400.00), dec!(0.15)),
                ],
            )
            .unwrap();

        assert_eq!(result.status, RunStatus::AwaitingApproval);
        assert!(result.batch_files.is_empty());
        assert!(result.invoices.is_empty());
        let rate_exception = result
            .exceptions
            .iter()
            .find(|e| e.error_code() == ErrorCode::InvalidGstRate)
            .unwrap();
        assert_eq!(rate_exception.record_id(), "D-2");

        // Default rules escalate rate overrides to a senior reviewer.
        assert_eq!(result.pending_approvals.len(), 1);
        let request = &result.pending_approvals[0];
        assert_eq!(request.status(), ApprovalStatus::Escalated);

        coordinator
            .decide(request.id(), Outcome::Reject, Actor::human("senior-reviewer"), None)
            .unwrap();
        let result = coordinator.resume(run_id).unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.batch_files.len(), 1);
        assert_eq!(result.batch_files[0].totals.taxable, dec!(1000.00));
        assert_eq!(result.summary.excluded_records, 1);
        assert_eq!(result.invoices.len(), 1);
    }

    #[test]
    fn scenario_d_approved_rate_override_brings_the_record_back() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();

        let result = coordinator
            .start(
                run_id,
                scope(),
                vec![
                    record("D-1", "TN", dec!(1000.00), dec!(0.18)),
                    record("D-2", "TN", dec!(400.00), dec!(0.15)),
                ],
            )
            .unwrap();
        let request_id = *result.pending_approvals[0].id();

        // An approval without the corrected rate is refused.
        assert!(coordinator
            .decide(&request_id, Outcome::approve(), Actor::human("senior-reviewer"), None)
            .is_err());

        let overrides = RecordOverrides {
            gst_rate: Some(dec!(0.12)),
            ..Default::default()
        };
        coordinator
            .decide(&request_id, Outcome::approve_with(overrides), Actor::human("senior-reviewer"), None)
            .unwrap();
        let result = coordinator.resume(run_id).unwrap();

        assert_eq!(result.status, RunStatus::Success);
        let rates: Vec<_> = result.batch_files.iter().map(|b| b.gst_rate).collect();
        assert_eq!(rates, vec![rate(dec!(0.12)), rate(dec!(0.18))]);
        assert_eq!(result.batch_files[0].totals.cgst, dec!(24.00));
        assert_eq!(result.summary.total_taxable, dec!(1400.00));
        assert_eq!(result.summary.eligible_records, 2);
    }

    #[test]
    fn scenario_e_concurrent_allocations_never_collide() {
        let registry = Arc::new(InMemoryNumberingRegistry::new());
        let numberer = InvoiceNumberer::new(registry.clone());
        let scope = ScopeKey {
            channel: Channel::Flipkart,
            gstin: Gstin::parse("29ABCDE1234F1Z5").unwrap(),
            state_code: StateCode::classify("KA").unwrap(),
            month: Month::parse("2024-04").unwrap(),
        };

        let invoices: Vec<Invoice> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..50)
                .map(|i| {
                    let numberer = &numberer;
                    let scope = &scope;
                    s.spawn(move || {
                        let txn = TransactionId::new(format!("E-{i}")).unwrap();
                        numberer.allocate(scope, &txn).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let sequences: BTreeSet<u64> = invoices.iter().map(|i| i.sequence_no()).collect();
        assert_eq!(sequences, (1..=50).collect::<BTreeSet<u64>>());
        let numbers: BTreeSet<&str> = invoices.iter().map(|i| i.invoice_no().as_str()).collect();
        assert_eq!(numbers.len(), 50);
        assert_eq!(registry.issued().unwrap().len(), 50);
    }

    #[test]
    fn resume_after_success_changes_nothing() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();
        let first = coordinator
            .start(run_id, scope(), vec![record("R-1", "TN", dec!(10.00), dec!(0.05))])
            .unwrap();
        let events = coordinator.runs().load(run_id).unwrap().len();

        let again = coordinator.resume(run_id).unwrap();
        let restarted = coordinator
            .start(run_id, scope(), vec![record("R-1", "TN", dec!(10.00), dec!(0.05))])
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(first, restarted);
        assert_eq!(coordinator.runs().load(run_id).unwrap().len(), events);
        assert_eq!(coordinator.numbering().issued().unwrap().len(), 1);
    }

    #[test]
    fn restarting_with_different_input_is_refused() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();
        coordinator
            .start(run_id, scope(), vec![record("R-1", "TN", dec!(10.00), dec!(0.05))])
            .unwrap();

        let err = coordinator
            .start(run_id, scope(), vec![record("R-2", "TN", dec!(10.00), dec!(0.05))])
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::RunStore(_)));
    }

    #[test]
    fn waiting_runs_resume_without_new_events_until_decided() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();
        let mut unmapped = record("W-1", "TN", dec!(250.00), dec!(0.18));
        unmapped.ledger_name = None;

        let result = coordinator.start(run_id, scope(), vec![unmapped]).unwrap();
        assert_eq!(result.status, RunStatus::AwaitingApproval);
        assert_eq!(coordinator.runs().load(run_id).unwrap().len(), 2);

        coordinator.resume(run_id).unwrap();
        coordinator.resume(run_id).unwrap();
        assert_eq!(coordinator.runs().load(run_id).unwrap().len(), 2);

        let request_id = *result.pending_approvals[0].id();
        let overrides = RecordOverrides {
            ledger_name: Some("Amazon Sales TN".into()),
            ..Default::default()
        };
        coordinator
            .decide(&request_id, Outcome::approve_with(overrides), Actor::human("accounts"), None)
            .unwrap();
        let result = coordinator.resume(run_id).unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.pivot_groups[0].key.ledger_name, "Amazon Sales TN");
        assert!(result.pending_approvals.is_empty());
        assert_eq!(coordinator.runs().load(run_id).unwrap().len(), 4);
    }

    #[test]
    fn reruns_reuse_invoice_numbers() {
        let (coordinator, _) = setup();
        let records = vec![
            record("N-1", "TN", dec!(100.00), dec!(0.18)),
            record("N-2", "TN", dec!(100.00), dec!(0.18)),
        ];
        let first = coordinator.start(RunId::new(), scope(), records.clone()).unwrap();

        let mut rerun_records = records;
        rerun_records.push(record("N-3", "TN", dec!(100.00), dec!(0.18)));
        let rerun = coordinator.start(RunId::new(), scope(), rerun_records).unwrap();

        assert_eq!(&rerun.invoices[..2], &first.invoices[..]);
        assert_eq!(rerun.invoices[2].invoice_no().as_str(), "AMZ-TN-202404-00003");
    }

    #[test]
    fn a_second_gstin_continues_the_channel_state_month_series() {
        let (coordinator, _) = setup();
        let records: Vec<NormalizedRecord> = (1..=5)
            .map(|n| record(&format!("G-{n}"), "TN", dec!(100.00), dec!(0.18)))
            .collect();
        let first = coordinator.start(RunId::new(), scope(), records).unwrap();
        assert_eq!(first.status, RunStatus::Success);
        assert_eq!(first.invoices[4].invoice_no().as_str(), "AMZ-TN-202404-00005");

        let karnataka = RunScope::new(
            Channel::AmazonMtr,
            Gstin::parse("29ABCDE1234F1Z5").unwrap(),
            Month::parse("2024-04").unwrap(),
        );
        let mut rec = record("K-1", "TN", dec!(100.00), dec!(0.18));
        rec.gstin = karnataka.gstin.clone();
        let second = coordinator.start(RunId::new(), karnataka, vec![rec]).unwrap();

        assert_eq!(second.status, RunStatus::Success);
        assert_eq!(second.critical_exceptions().count(), 0);
        assert_eq!(second.invoices[0].invoice_no().as_str(), "AMZ-TN-202404-00006");
    }

    #[test]
    fn a_transaction_id_reused_by_another_channel_gets_that_channels_invoice() {
        let (coordinator, _) = setup();
        let amazon = coordinator
            .start(RunId::new(), scope(), vec![record("1001", "TN", dec!(100.00), dec!(0.18))])
            .unwrap();
        assert_eq!(amazon.invoices[0].invoice_no().as_str(), "AMZ-TN-202404-00001");

        let flipkart = RunScope::new(
            Channel::Flipkart,
            Gstin::parse("33ABCDE1234F1Z5").unwrap(),
            Month::parse("2024-04").unwrap(),
        );
        let mut rec = record("1001", "TN", dec!(100.00), dec!(0.18));
        rec.channel = Channel::Flipkart;
        rec.ledger_name = Some("Flipkart Sales".into());
        let result = coordinator.start(RunId::new(), flipkart, vec![rec]).unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.invoices.len(), 1);
        assert_eq!(result.invoices[0].invoice_no().as_str(), "FLIP-TN-202404-00001");
        assert_eq!(result.invoices[0].scope().channel, Channel::Flipkart);
    }

    #[test]
    fn unknown_home_state_halts_the_run() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();
        let scope = RunScope::new(
            Channel::AmazonMtr,
            Gstin::parse("99ABCDE1234F1Z5").unwrap(),
            Month::parse("2024-04").unwrap(),
        );
        let mut rec = record("H-1", "TN", dec!(100.00), dec!(0.18));
        rec.gstin = scope.gstin.clone();

        let result = coordinator.start(run_id, scope, vec![rec]).unwrap();

        assert_eq!(result.status, RunStatus::CriticalExceptions);
        assert!(result.batch_files.is_empty());
        assert_eq!(
            result.critical_exceptions().map(|e| e.error_code()).collect::<Vec<_>>(),
            vec![ErrorCode::UnknownHomeState]
        );

        let err = coordinator.cancel(run_id, None).unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::RunClosed {
                status: RunStatus::CriticalExceptions,
                ..
            }
        ));
    }

    /// Registry that loses every registration race.
    #[derive(Debug, Default)]
    struct ContendedRegistry {
        inner: InMemoryNumberingRegistry,
    }

    impl NumberingPort for ContendedRegistry {
        fn reserve_next(&self, scope: &ScopeKey) -> Result<u64, NumberingError> {
            self.inner.reserve_next(scope)
        }

        fn lookup_existing(
            &self,
            scope: &ScopeKey,
            transaction_id: &TransactionId,
        ) -> Result<Option<Invoice>, NumberingError> {
            self.inner.lookup_existing(scope, transaction_id)
        }

        fn register(&self, invoice: &Invoice) -> Result<Invoice, NumberingError> {
            Err(NumberingError::Conflict(format!("{} taken", invoice.invoice_no())))
        }
    }

    #[test]
    fn exhausted_numbering_retries_halt_the_run() {
        let (coordinator, _) = coordinator(Arc::new(ContendedRegistry::default()));
        let run_id = RunId::new();

        let result = coordinator
            .start(run_id, scope(), vec![record("X-1", "TN", dec!(100.00), dec!(0.18))])
            .unwrap();

        assert_eq!(result.status, RunStatus::CriticalExceptions);
        assert!(result.invoices.is_empty());
        let conflict = result.critical_exceptions().next().unwrap();
        assert_eq!(conflict.error_code(), ErrorCode::NumberingConflict);
        assert_eq!(conflict.record_id(), "X-1");
        assert_eq!(coordinator.runs().load_outputs(run_id).unwrap(), None);
    }

    #[test]
    fn cancelled_runs_accept_no_decisions() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();
        let mut unmapped = record("Q-1", "TN", dec!(250.00), dec!(0.18));
        unmapped.fg_name = None;

        let result = coordinator.start(run_id, scope(), vec![unmapped]).unwrap();
        let request_id = *result.pending_approvals[0].id();

        let cancelled = coordinator.cancel(run_id, Some("wrong month uploaded".into())).unwrap();
        assert_eq!(cancelled.status, RunStatus::Cancelled);

        let err = coordinator
            .decide(&request_id, Outcome::Reject, Actor::human("accounts"), None)
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::RunClosed { .. }));
    }

    #[test]
    fn validation_failures_are_excluded_without_blocking() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();
        let mut other_month = record("V-2", "TN", dec!(50.00), dec!(0.18));
        other_month.month = Month::parse("2024-05").unwrap();
        let mut no_value = record("V-3", "TN", dec!(0), dec!(0.18));
        no_value.taxable_value = None;

        let result = coordinator
            .start(
                run_id,
                scope(),
                vec![
                    record("V-1", "TN", dec!(100.00), dec!(0.18)),
                    other_month,
                    record("V-1", "TN", dec!(100.00), dec!(0.18)),
                    no_value,
                ],
            )
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.summary.total_records, 4);
        assert_eq!(result.summary.eligible_records, 1);
        assert_eq!(result.summary.validation_failures, 3);
        assert_eq!(result.summary.total_taxable, dec!(100.00));

        let codes: BTreeSet<ErrorCode> = result.exceptions.iter().map(|e| e.error_code()).collect();
        assert!(codes.contains(&ErrorCode::OutOfScopeRecord));
        assert!(codes.contains(&ErrorCode::DuplicateTransaction));
        assert!(codes.contains(&ErrorCode::MissingData));
    }

    #[test]
    fn empty_zero_quantity_lines_are_auto_rejected() {
        let (coordinator, _) = setup();
        let run_id = RunId::new();
        let mut empty = record("Z-1", "TN", dec!(0), dec!(0.05));
        empty.quantity = 0;

        let result = coordinator
            .start(
                run_id,
                scope(),
                vec![record("Z-0", "TN", dec!(100.00), dec!(0.18)), empty],
            )
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.summary.excluded_records, 1);
        // The 5% rate was observed, so its batch exists with no rows.
        assert_eq!(result.batch_files.len(), 2);
        assert!(result.batch_files[0].is_empty());

        let approvals = coordinator.workflow().summary(run_id).unwrap();
        assert_eq!(approvals.rejected, 1);
        assert_eq!(approvals.auto_decided, 1);
    }

    #[test]
    fn transitions_are_published_after_they_are_stored() {
        let (coordinator, bus) = setup();
        let subscription = bus.subscribe();
        let run_id = RunId::new();

        coordinator
            .start(run_id, scope(), vec![record("P-1", "TN", dec!(10.00), dec!(0.18))])
            .unwrap();

        let envelopes = subscription.drain();
        let types: Vec<&str> = envelopes.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["runs.run.started", "runs.run.completed"]);
        assert_eq!(
            envelopes.iter().map(|e| e.sequence_number()).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(envelopes.iter().all(|e| e.run_id() == run_id));
        assert_eq!(coordinator.runs().load(run_id).unwrap().len(), 2);
    }
}
