//! Pipeline configuration.
//!
//! Values come from `GSTFLOW_*` environment variables. A missing variable means
//! the default; an unparsable one is logged and also falls back to the default.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;

use gstflow_approval::RuleSet;
use gstflow_exceptions::DetectorConfig;
use gstflow_numbering::RetryPolicy;

pub const ENV_NUMBERING_MAX_ATTEMPTS: &str = "GSTFLOW_NUMBERING_MAX_ATTEMPTS";
pub const ENV_RECONCILIATION_EPSILON: &str = "GSTFLOW_RECONCILIATION_EPSILON";
pub const ENV_MAX_TAXABLE_VALUE: &str = "GSTFLOW_MAX_TAXABLE_VALUE";
pub const ENV_RULES_PATH: &str = "GSTFLOW_RULES_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Reservation attempts per invoice before INV-005.
    pub numbering_max_attempts: u32,
    /// Allowed money drift between eligible input and batch totals.
    pub reconciliation_epsilon: Decimal,
    /// Taxable values above this raise SCH-003.
    pub max_taxable_value: Decimal,
    /// JSON rule set; `None` uses the built-in default rules.
    pub rules_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            numbering_max_attempts: RetryPolicy::default().max_attempts,
            reconciliation_epsilon: Decimal::ZERO,
            max_taxable_value: DetectorConfig::default().max_taxable_value,
            rules_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let numbering_max_attempts = parse_or(
            &lookup,
            ENV_NUMBERING_MAX_ATTEMPTS,
            defaults.numbering_max_attempts,
            |v: &u32| *v >= 1,
        );
        let reconciliation_epsilon = parse_or(
            &lookup,
            ENV_RECONCILIATION_EPSILON,
            defaults.reconciliation_epsilon,
            |v: &Decimal| !v.is_sign_negative(),
        );
        let max_taxable_value = parse_or(
            &lookup,
            ENV_MAX_TAXABLE_VALUE,
            defaults.max_taxable_value,
            |v: &Decimal| *v > Decimal::ZERO,
        );
        let rules_path = lookup(ENV_RULES_PATH)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        Self {
            numbering_max_attempts,
            reconciliation_epsilon,
            max_taxable_value,
            rules_path,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::attempts(self.numbering_max_attempts)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            max_taxable_value: self.max_taxable_value,
            ..DetectorConfig::default()
        }
    }

    /// The rule set for a run: the configured file, or the default rules.
    pub fn load_rule_set(&self) -> anyhow::Result<RuleSet> {
        let Some(path) = &self.rules_path else {
            return Ok(RuleSet::default_rules());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading rule set {}", path.display()))?;
        let rules = RuleSet::from_json_str(&raw)
            .with_context(|| format!("parsing rule set {}", path.display()))?;
        tracing::info!(path = %path.display(), version = rules.version, rules = rules.rules.len(), "rule set loaded");
        Ok(rules)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + core::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            tracing::warn!(key, value = %raw, fallback = %default, "invalid configuration value; using default");
            default
        }
    }
}
