//! Quality scoring over resolved feature values.
//!
//! The numeric score is informational; the coarse tier label is what
//! downstream consumers key trust decisions off.

use courtline_protocol::defaults::{
    WEIGHT_COMPUTED, WEIGHT_DEFAULT, WEIGHT_PRIMARY, WEIGHT_SECONDARY,
};
use courtline_protocol::{FeatureValue, QualityTier, SourceTier};

fn tier_weight(tier: SourceTier) -> f64 {
    match tier {
        SourceTier::Primary => WEIGHT_PRIMARY,
        SourceTier::Secondary => WEIGHT_SECONDARY,
        SourceTier::Computed => WEIGHT_COMPUTED,
        SourceTier::Default | SourceTier::DefaultUpstreamGap => WEIGHT_DEFAULT,
    }
}

/// Score and label one record's values.
///
/// Resolved means the field carries a value; fields that resolved to
/// nothing contribute neither weight nor tier fractions.
pub fn score_values(values: &[FeatureValue]) -> (f64, QualityTier) {
    let resolved: Vec<&FeatureValue> = values.iter().filter(|v| v.value.is_some()).collect();
    if resolved.is_empty() {
        return (0.0, QualityTier::Unknown);
    }

    let total: f64 = resolved.iter().map(|v| tier_weight(v.tier)).sum();
    let score = total / resolved.len() as f64;

    let n = resolved.len() as f64;
    // Computed fields are first-class: they derive from primary data
    // and count toward the primary fraction for labeling.
    let primary_frac = resolved
        .iter()
        .filter(|v| matches!(v.tier, SourceTier::Primary | SourceTier::Computed))
        .count() as f64
        / n;
    let secondary_frac = resolved
        .iter()
        .filter(|v| v.tier == SourceTier::Secondary)
        .count() as f64
        / n;

    let tier = if primary_frac >= 0.9 {
        QualityTier::Primary
    } else if primary_frac >= 0.5 {
        QualityTier::PrimaryPartial
    } else if secondary_frac >= 0.5 {
        QualityTier::Secondary
    } else {
        QualityTier::Mixed
    };

    (score, tier)
}
