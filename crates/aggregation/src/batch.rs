//! Per-rate batch files.

use serde::{Deserialize, Serialize};

use gstflow_core::{GstRate, RunScope, format_money};

use crate::pivot::{PivotGroup, Totals};

/// Column order of every batch row.
pub const BATCH_COLUMNS: [&str; 12] = [
    "gstin",
    "month",
    "gst_rate",
    "ledger_name",
    "fg_name",
    "total_quantity",
    "total_taxable",
    "total_cgst",
    "total_sgst",
    "total_igst",
    "total_tax",
    "total_amount",
];

/// Import-ready batch for one GST rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFile {
    pub gst_rate: GstRate,
    /// `{channel}_{gstin}_{YYYY-MM}_{rate}pct_batch`
    pub file_name: String,
    pub groups: Vec<PivotGroup>,
    /// Number of rows (pivot groups) in the batch.
    pub record_count: usize,
    /// Summed from the groups, independently of the pivot pass.
    pub totals: Totals,
}

impl BatchFile {
    pub fn new(scope: &RunScope, gst_rate: GstRate, groups: Vec<PivotGroup>) -> Self {
        let mut totals = Totals::default();
        for group in &groups {
            totals.add(&group.totals);
        }
        Self {
            gst_rate,
            file_name: Self::file_name_for(scope, gst_rate),
            record_count: groups.len(),
            groups,
            totals,
        }
    }

    pub fn file_name_for(scope: &RunScope, gst_rate: GstRate) -> String {
        format!(
            "{}_{}_{}_{}pct_batch",
            scope.channel.as_str(),
            scope.gstin,
            scope.month,
            gst_rate.percent_label()
        )
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Rendered rows in [`BATCH_COLUMNS`] order, money at two decimals.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.groups
            .iter()
            .map(|group| {
                let t = &group.totals;
                vec![
                    group.key.gstin.to_string(),
                    group.key.month.to_string(),
                    group.key.gst_rate.percent_label(),
                    group.key.ledger_name.clone(),
                    group.key.fg_name.clone(),
                    t.quantity.to_string(),
                    format_money(t.taxable),
                    format_money(t.cgst),
                    format_money(t.sgst),
                    format_money(t.igst),
                    format_money(t.tax()),
                    format_money(t.amount()),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::aggregate;
    use crate::pivot::fixtures::{line, scope};
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    #[test]
    fn file_name_follows_scope_and_rate() {
        let rate = GstRate::try_new(dec!(0.18)).unwrap();
        assert_eq!(
            BatchFile::file_name_for(&scope(), rate),
            "amazon_mtr_33ABCDE1234F1Z5_2024-04_18pct_batch"
        );
        let zero = GstRate::try_new(dec!(0)).unwrap();
        assert!(BatchFile::file_name_for(&scope(), zero).ends_with("_0pct_batch"));
    }

    #[test]
    fn rows_render_in_column_order() {
        let lines = vec![line("A", "Sales KA", "Desk", dec!(100.5), dec!(0.18), "KA")];
        let agg = aggregate(&scope(), &lines, &BTreeSet::new());
        let rows = agg.batch_files[0].rows();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), BATCH_COLUMNS.len());
        assert_eq!(
            rows[0],
            vec![
                "33ABCDE1234F1Z5",
                "2024-04",
                "18",
                "Sales KA",
                "Desk",
                "1",
                "100.50",
                "0.00",
                "0.00",
                "18.09",
                "18.09",
                "118.59",
            ]
        );
    }
}
