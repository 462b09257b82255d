use std::collections::HashMap;

use super::record::{ClassifyError, InstanceFamily, PriceRecord};

/// Outcome of classifying one record against the active policy.
///
/// Carries the effective ceiling so the reporter can show what the record
/// was compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Accepted { ceiling: f64 },
    Rejected { ceiling: f64 },
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted { .. })
    }
}

/// How the acceptable price ceiling is computed for a record.
///
/// Both observed pricing rules reduce to "compute an effective ceiling,
/// then compare `spot_price <= ceiling`", so they are variants of one
/// strategy rather than two separate code paths.
///
/// # Variants
/// * `Flat`: a fixed ceiling applied identically to every record.
/// * `PerUnitScaled`: ceiling = accelerator count × per-unit rate, divided
///   by a family-specific performance ratio (families without an entry in
///   the map are unadjusted).
#[derive(Debug, Clone)]
pub enum ThresholdPolicy {
    Flat {
        ceiling: f64,
    },
    PerUnitScaled {
        per_unit_rate: f64,
        family_ratios: HashMap<InstanceFamily, f64>,
    },
}

impl ThresholdPolicy {
    /// Computes the effective ceiling for a record.
    ///
    /// Pure and deterministic: the same record and policy always produce
    /// the same result.
    ///
    /// # Errors
    /// The per-unit variant needs the record's derived attributes and
    /// returns a [`ClassifyError`] for an unrecognized family or size; the
    /// flat variant never fails.
    pub fn ceiling(&self, record: &PriceRecord) -> Result<f64, ClassifyError> {
        match self {
            ThresholdPolicy::Flat { ceiling } => Ok(*ceiling),
            ThresholdPolicy::PerUnitScaled {
                per_unit_rate,
                family_ratios,
            } => {
                let family = record.instance_family()?;
                let units = record.unit_count()?;
                let ratio = family_ratios.get(&family).copied().unwrap_or(1.0);
                Ok(f64::from(units) * per_unit_rate / ratio)
            }
        }
    }

    /// Classifies a record: accepted iff `spot_price <= ceiling`.
    ///
    /// The comparison is inclusive — a record priced exactly at the
    /// ceiling passes.
    pub fn evaluate(&self, record: &PriceRecord) -> Result<Decision, ClassifyError> {
        let ceiling = self.ceiling(record)?;
        if record.spot_price <= ceiling {
            Ok(Decision::Accepted { ceiling })
        } else {
            Ok(Decision::Rejected { ceiling })
        }
    }
}
