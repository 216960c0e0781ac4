//! Multi-dimensional grouping.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gstflow_core::{GstRate, Gstin, Month, NormalizedRecord, RunScope, TransactionId};
use gstflow_tax::TaxComputation;

use crate::batch::BatchFile;

/// One record that cleared every gate, with its tax split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleLine {
    pub transaction_id: TransactionId,
    pub gstin: Gstin,
    pub month: Month,
    pub ledger_name: String,
    pub fg_name: String,
    pub quantity: i64,
    pub computation: TaxComputation,
}

impl EligibleLine {
    /// `None` when the record still lacks a ledger or final-goods name.
    pub fn from_record(record: &NormalizedRecord, computation: TaxComputation) -> Option<Self> {
        Some(Self {
            transaction_id: record.transaction_id.clone(),
            gstin: record.gstin.clone(),
            month: record.month,
            ledger_name: record.ledger_name.clone().filter(|s| !s.trim().is_empty())?,
            fg_name: record.fg_name.clone().filter(|s| !s.trim().is_empty())?,
            quantity: record.net_quantity(),
            computation,
        })
    }
}

/// Grouping key. Field order is the sort order: rate, then ledger, then
/// final-goods name, then jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PivotKey {
    pub gst_rate: GstRate,
    pub ledger_name: String,
    pub fg_name: String,
    pub gstin: Gstin,
    pub month: Month,
}

/// Summed amounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub transaction_count: u64,
    pub quantity: i64,
    pub taxable: Decimal,
    pub shipping: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
}

impl Totals {
    pub fn add_line(&mut self, line: &EligibleLine) {
        let c = &line.computation;
        self.transaction_count += 1;
        self.quantity += line.quantity;
        self.taxable += c.taxable_value;
        self.shipping += c.shipping_value;
        self.cgst += c.cgst;
        self.sgst += c.sgst;
        self.igst += c.igst;
    }

    pub fn add(&mut self, other: &Totals) {
        self.transaction_count += other.transaction_count;
        self.quantity += other.quantity;
        self.taxable += other.taxable;
        self.shipping += other.shipping;
        self.cgst += other.cgst;
        self.sgst += other.sgst;
        self.igst += other.igst;
    }

    pub fn of_lines<'a>(lines: impl IntoIterator<Item = &'a EligibleLine>) -> Self {
        let mut totals = Totals::default();
        for line in lines {
            totals.add_line(line);
        }
        totals
    }

    pub fn tax(&self) -> Decimal {
        self.cgst + self.sgst + self.igst
    }

    pub fn amount(&self) -> Decimal {
        self.taxable + self.shipping + self.tax()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotGroup {
    pub key: PivotKey,
    pub totals: Totals,
}

/// Aggregator output for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    /// Every group, in key order.
    pub pivot_groups: Vec<PivotGroup>,
    /// One per observed rate, ascending.
    pub batch_files: Vec<BatchFile>,
}

impl Aggregation {
    pub fn totals(&self) -> Totals {
        let mut totals = Totals::default();
        for group in &self.pivot_groups {
            totals.add(&group.totals);
        }
        totals
    }
}

/// Group eligible lines and split them into per-rate batches.
///
/// `observed_rates` are the valid rates seen on any input record, eligible or
/// not; rates of the lines themselves are always included.
pub fn aggregate(
    scope: &RunScope,
    lines: &[EligibleLine],
    observed_rates: &BTreeSet<GstRate>,
) -> Aggregation {
    let mut groups: BTreeMap<PivotKey, Totals> = BTreeMap::new();
    for line in lines {
        let key = PivotKey {
            gst_rate: line.computation.gst_rate,
            ledger_name: line.ledger_name.clone(),
            fg_name: line.fg_name.clone(),
            gstin: line.gstin.clone(),
            month: line.month,
        };
        groups.entry(key).or_default().add_line(line);
    }

    let pivot_groups: Vec<PivotGroup> = groups
        .into_iter()
        .map(|(key, totals)| PivotGroup { key, totals })
        .collect();

    let mut rates = observed_rates.clone();
    rates.extend(pivot_groups.iter().map(|g| g.key.gst_rate));

    let batch_files = rates
        .into_iter()
        .map(|rate| {
            let members = pivot_groups
                .iter()
                .filter(|g| g.key.gst_rate == rate)
                .cloned()
                .collect();
            BatchFile::new(scope, rate, members)
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        scope = %scope,
        groups = pivot_groups.len(),
        batches = batch_files.len(),
        "aggregated eligible lines"
    );

    Aggregation {
        pivot_groups,
        batch_files,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{line, scope};
    use super::*;
    use rust_decimal_macros::dec;

    fn rates(values: &[Decimal]) -> BTreeSet<GstRate> {
        values.iter().map(|v| GstRate::try_new(*v).unwrap()).collect()
    }

    #[test]
    fn identical_keys_collapse_into_one_group() {
        let lines = vec![
            line("A", "Sales TN", "Chair", dec!(100), dec!(0.18), "TN"),
            line("B", "Sales TN", "Chair", dec!(50), dec!(0.18), "TN"),
            line("C", "Sales TN", "Table", dec!(70), dec!(0.18), "TN"),
        ];
        let agg = aggregate(&scope(), &lines, &BTreeSet::new());

        assert_eq!(agg.pivot_groups.len(), 2);
        let chair = &agg.pivot_groups[0];
        assert_eq!(chair.key.fg_name, "Chair");
        assert_eq!(chair.totals.transaction_count, 2);
        assert_eq!(chair.totals.taxable, dec!(150));
        assert_eq!(chair.totals.cgst, dec!(13.50));
        assert_eq!(chair.totals.tax(), dec!(27.00));
        assert_eq!(chair.totals.amount(), dec!(177.00));
    }

    #[test]
    fn one_batch_per_rate_in_ascending_order() {
        let lines = vec![
            line("A", "Sales", "Chair", dec!(100), dec!(0.18), "TN"),
            line("B", "Sales", "Lamp", dec!(100), dec!(0.05), "KA"),
            line("C", "Sales", "Desk", dec!(100), dec!(0.18), "KA"),
        ];
        let agg = aggregate(&scope(), &lines, &BTreeSet::new());

        let labels: Vec<String> = agg.batch_files.iter().map(|b| b.gst_rate.percent_label()).collect();
        assert_eq!(labels, vec!["5", "18"]);
        assert_eq!(agg.batch_files[1].record_count, 2);
        assert_eq!(agg.batch_files[1].totals.taxable, dec!(200));
    }

    #[test]
    fn observed_rates_without_eligible_rows_yield_empty_batches() {
        let lines = vec![line("A", "Sales", "Chair", dec!(100), dec!(0.18), "TN")];
        let agg = aggregate(&scope(), &lines, &rates(&[dec!(0.12), dec!(0.18)]));

        assert_eq!(agg.batch_files.len(), 2);
        let twelve = &agg.batch_files[0];
        assert_eq!(twelve.gst_rate.percent_label(), "12");
        assert!(twelve.is_empty());
        assert_eq!(twelve.record_count, 0);
        assert_eq!(twelve.totals, Totals::default());
    }

    #[test]
    fn lines_need_ledger_and_fg() {
        let engine = gstflow_tax::TaxEngine::new();
        let s = scope();
        let mut record = NormalizedRecord::new(TransactionId::new("A").unwrap(), s.channel, s.gstin, s.month);
        record.state_code = Some("TN".into());
        record.quantity = 3;
        record.returned_qty = 1;
        record.taxable_value = Some(dec!(10));
        record.gst_rate = Some(dec!(0.05));
        let computation = engine.compute_record(&record).unwrap();

        assert!(EligibleLine::from_record(&record, computation.clone()).is_none());
        record.ledger_name = Some("Sales".into());
        record.fg_name = Some("Lamp".into());
        let line = EligibleLine::from_record(&record, computation).unwrap();
        assert_eq!(line.quantity, 2);
    }
}
