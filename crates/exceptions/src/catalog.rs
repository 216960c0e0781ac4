//! Error catalog: every anomaly class the engine can raise.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Mapping,
    Ledger,
    Gst,
    Invoice,
    Schema,
    Data,
    Reconciliation,
}

/// What a human (or rule) is being asked to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Supply the missing final-goods name.
    ItemMapping,
    /// Supply the missing ledger name.
    LedgerMapping,
    /// Supply a classifiable destination state.
    JurisdictionMapping,
    /// Supply an allowed GST rate.
    GstRateOverride,
    /// Accept or reject the record as it stands.
    DataCorrection,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::ItemMapping => "item_mapping",
            RequestType::LedgerMapping => "ledger_mapping",
            RequestType::JurisdictionMapping => "jurisdiction_mapping",
            RequestType::GstRateOverride => "gst_rate_override",
            RequestType::DataCorrection => "data_correction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "MAP-001")]
    MissingFgMapping,
    #[serde(rename = "LED-001")]
    MissingLedger,
    #[serde(rename = "LED-002")]
    UnclassifiedState,
    #[serde(rename = "GST-001")]
    InvalidGstRate,
    #[serde(rename = "GST-002")]
    ComputationMismatch,
    #[serde(rename = "GST-003")]
    MissingGstRate,
    #[serde(rename = "GST-004")]
    UnknownHomeState,
    #[serde(rename = "INV-001")]
    DuplicateInvoice,
    #[serde(rename = "INV-002")]
    InvalidInvoiceFormat,
    #[serde(rename = "INV-005")]
    NumberingConflict,
    #[serde(rename = "SCH-003")]
    ValueOutOfRange,
    #[serde(rename = "DAT-001")]
    NegativeAmount,
    #[serde(rename = "DAT-002")]
    ZeroQuantity,
    #[serde(rename = "DAT-003")]
    MissingData,
    #[serde(rename = "DAT-004")]
    DataInconsistency,
    #[serde(rename = "DAT-005")]
    DuplicateTransaction,
    #[serde(rename = "DAT-006")]
    OutOfScopeRecord,
    #[serde(rename = "REC-001")]
    ReconciliationMismatch,
}

/// Static description of an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDefinition {
    pub code: &'static str,
    pub category: Category,
    pub name: &'static str,
    pub description: &'static str,
    pub severity: Severity,
    pub requires_approval: bool,
    pub request_type: Option<RequestType>,
}

const fn def(
    code: &'static str,
    category: Category,
    name: &'static str,
    description: &'static str,
    severity: Severity,
    request_type: Option<RequestType>,
) -> ErrorDefinition {
    ErrorDefinition {
        code,
        category,
        name,
        description,
        severity,
        requires_approval: request_type.is_some(),
        request_type,
    }
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 18] = [
        ErrorCode::MissingFgMapping,
        ErrorCode::MissingLedger,
        ErrorCode::UnclassifiedState,
        ErrorCode::InvalidGstRate,
        ErrorCode::ComputationMismatch,
        ErrorCode::MissingGstRate,
        ErrorCode::UnknownHomeState,
        ErrorCode::DuplicateInvoice,
        ErrorCode::InvalidInvoiceFormat,
        ErrorCode::NumberingConflict,
        ErrorCode::ValueOutOfRange,
        ErrorCode::NegativeAmount,
        ErrorCode::ZeroQuantity,
        ErrorCode::MissingData,
        ErrorCode::DataInconsistency,
        ErrorCode::DuplicateTransaction,
        ErrorCode::OutOfScopeRecord,
        ErrorCode::ReconciliationMismatch,
    ];

    pub fn definition(&self) -> ErrorDefinition {
        use Category::*;
        use RequestType::*;
        use Severity::*;

        match self {
            ErrorCode::MissingFgMapping => def(
                "MAP-001",
                Mapping,
                "Missing final-goods mapping",
                "no final-goods name was mapped for the SKU",
                Warning,
                Some(ItemMapping),
            ),
            ErrorCode::MissingLedger => def(
                "LED-001",
                Ledger,
                "Missing ledger mapping",
                "no ledger name was mapped for the channel and state",
                Warning,
                Some(LedgerMapping),
            ),
            ErrorCode::UnclassifiedState => def(
                "LED-002",
                Ledger,
                "Unclassifiable state",
                "destination state is missing or not a known Indian state",
                Error,
                Some(JurisdictionMapping),
            ),
            ErrorCode::InvalidGstRate => def(
                "GST-001",
                Gst,
                "Invalid GST rate",
                "rate is not one of 0, 5, 12, 18 or 28 percent",
                Error,
                Some(GstRateOverride),
            ),
            ErrorCode::ComputationMismatch => def(
                "GST-002",
                Gst,
                "GST computation mismatch",
                "computed legs disagree with the rate applied to the tax base",
                Error,
                None,
            ),
            ErrorCode::MissingGstRate => def(
                "GST-003",
                Gst,
                "Missing GST rate",
                "record carries no GST rate",
                Error,
                Some(GstRateOverride),
            ),
            ErrorCode::UnknownHomeState => def(
                "GST-004",
                Gst,
                "Unknown home state",
                "the filing GSTIN does not encode a known state, so no record can be classified",
                Critical,
                None,
            ),
            ErrorCode::DuplicateInvoice => def(
                "INV-001",
                Invoice,
                "Duplicate invoice number",
                "one invoice number was issued to more than one transaction",
                Critical,
                None,
            ),
            ErrorCode::InvalidInvoiceFormat => def(
                "INV-002",
                Invoice,
                "Invalid invoice number format",
                "an allocated invoice number does not match its channel pattern or scope",
                Critical,
                None,
            ),
            ErrorCode::NumberingConflict => def(
                "INV-005",
                Invoice,
                "Numbering conflict",
                "invoice number allocation kept losing races and gave up",
                Critical,
                None,
            ),
            ErrorCode::ValueOutOfRange => def(
                "SCH-003",
                Schema,
                "Value out of range",
                "taxable value exceeds the configured ceiling",
                Warning,
                Some(DataCorrection),
            ),
            ErrorCode::NegativeAmount => def(
                "DAT-001",
                Data,
                "Negative amount",
                "taxable or shipping value is negative",
                Warning,
                Some(DataCorrection),
            ),
            ErrorCode::ZeroQuantity => def(
                "DAT-002",
                Data,
                "Zero quantity",
                "quantity is zero",
                Warning,
                Some(DataCorrection),
            ),
            ErrorCode::MissingData => def(
                "DAT-003",
                Data,
                "Missing transaction data",
                "taxable value is missing",
                Error,
                None,
            ),
            ErrorCode::DataInconsistency => def(
                "DAT-004",
                Data,
                "Data inconsistency",
                "quantities contradict each other (negative quantity or more returns than units)",
                Warning,
                Some(DataCorrection),
            ),
            ErrorCode::DuplicateTransaction => def(
                "DAT-005",
                Data,
                "Duplicate transaction",
                "the transaction id already appeared earlier in the batch",
                Error,
                None,
            ),
            ErrorCode::OutOfScopeRecord => def(
                "DAT-006",
                Data,
                "Out-of-scope record",
                "record channel, GSTIN or month differs from the run",
                Error,
                None,
            ),
            ErrorCode::ReconciliationMismatch => def(
                "REC-001",
                Reconciliation,
                "Reconciliation mismatch",
                "batch totals do not equal the eligible input totals",
                Critical,
                None,
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.definition().code
    }

    pub fn severity(&self) -> Severity {
        self.definition().severity
    }

    pub fn requires_approval(&self) -> bool {
        self.definition().requires_approval
    }

    pub fn request_type(&self) -> Option<RequestType> {
        self.definition().request_type
    }

    pub fn from_code(code: &str) -> Option<ErrorCode> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
