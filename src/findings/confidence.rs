//! Confidence scoring for order and peak findings
//!
//! Order findings start from a weighted blend of four evidence terms and are
//! then scaled by a chain of guards. Every result is clamped to
//! [`CONFIDENCE_FLOOR`, `CONFIDENCE_CEILING`] so no finding reads as certain
//! or as dismissed outright.

use super::PeakClassification;

pub const CONFIDENCE_FLOOR: f64 = 0.08;
pub const CONFIDENCE_CEILING: f64 = 0.97;

/// Divisor normalising `ln(1 + snr)` into [0, 1].
pub const SNR_LOG_DIVISOR: f64 = 2.5;

/// Everything the order confidence depends on.
#[derive(Debug, Clone, Default)]
pub struct OrderConfidenceInputs {
    pub match_rate: f64,
    pub error_score: f64,
    /// |Pearson| of predicted vs matched frequency, 0 when unavailable
    pub correlation: f64,
    pub snr_score: f64,
    pub strength_db: f64,
    pub localization_confidence: f64,
    pub weak_spatial_separation: bool,
    pub dominance_ratio: Option<f64>,
    pub no_wheel_sensors: bool,
    pub constant_speed: bool,
    pub steady_speed: bool,
    pub matched: usize,
    pub corroborating_locations: usize,
    pub phases_with_evidence: usize,
    /// Penalty factor when the excitation is diffuse
    pub diffuse_penalty: Option<f64>,
    pub connected_locations: usize,
    pub path_compliance: f64,
    /// Lower edges of the l1 and l2 buckets
    pub negligible_db: f64,
    pub light_db: f64,
}

/// Calibrated confidence of an order finding.
///
/// Base weights are match 0.35, error 0.20, correlation 0.10, SNR 0.20 on
/// top of 0.10. Compliant paths shift up to 0.05 from correlation to match.
pub fn order_confidence(x: &OrderConfidenceInputs) -> f64 {
    let corr_shift = (0.10 * (x.path_compliance - 1.0)).clamp(0.0, 0.05);
    let mut c = 0.10
        + (0.35 + corr_shift) * x.match_rate
        + 0.20 * x.error_score
        + (0.10 - corr_shift) * x.correlation
        + 0.20 * x.snr_score;

    c = strength_guard(c, x.strength_db, x.negligible_db, x.light_db);
    c *= 0.70 + 0.30 * x.localization_confidence.clamp(0.0, 1.0);
    c *= spatial_penalty(x);
    if x.constant_speed {
        c *= 0.75;
    } else if x.steady_speed {
        c *= 0.82;
    }
    c *= 0.70 + 0.30 * (x.matched as f64 / 20.0).min(1.0);
    c *= corroboration_bonus(x.corroborating_locations, x.phases_with_evidence);
    if let Some(penalty) = x.diffuse_penalty {
        c *= penalty;
    }
    // Sparse layouts: only once localization has something to say
    if x.localization_confidence >= 0.30 {
        match x.connected_locations {
            0 | 1 => c *= 0.85,
            2 => c *= 0.92,
            _ => {}
        }
    }
    c.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}

/// Barely-above-floor signals cap at 0.40; light ones lose 20 %.
fn strength_guard(c: f64, strength_db: f64, negligible_db: f64, light_db: f64) -> f64 {
    if strength_db < negligible_db {
        c.min(0.40)
    } else if strength_db < light_db {
        c * 0.80
    } else {
        c
    }
}

fn spatial_penalty(x: &OrderConfidenceInputs) -> f64 {
    if x.weak_spatial_separation {
        let dominance = x.dominance_ratio;
        if x.no_wheel_sensors && dominance.is_some_and(|d| d >= 1.5) {
            0.90
        } else if dominance.is_some_and(|d| d < 1.05) {
            0.70
        } else {
            0.80
        }
    } else if x.no_wheel_sensors {
        0.75
    } else {
        1.0
    }
}

fn corroboration_bonus(locations: usize, phases: usize) -> f64 {
    let by_location = match locations {
        0..=1 => 1.0,
        2 => 1.04,
        _ => 1.08,
    };
    let by_phase = match phases {
        0..=1 => 1.0,
        2 => 1.03,
        _ => 1.06,
    };
    by_location * by_phase
}

/// `1 - mean_rel_err / (0.25 * compliance)`, floored at 0.
pub fn error_score(mean_rel_err: f64, path_compliance: f64) -> f64 {
    (1.0 - (mean_rel_err / (0.25 * path_compliance)).min(1.0)).max(0.0)
}

/// `ln(1 + amp / floor) / 2.5`, capped at 1; at most 0.40 for amplitudes
/// within twice the sensor noise floor.
pub fn snr_score(mean_amp: f64, mean_floor: f64, mems_floor: f64) -> f64 {
    let score = ((mean_amp / mean_floor.max(mems_floor)).ln_1p() / SNR_LOG_DIVISOR).min(1.0);
    if mean_amp <= 2.0 * mems_floor {
        score.min(0.40)
    } else {
        score
    }
}

/// Inputs for a non-order peak.
#[derive(Debug, Clone)]
pub struct PeakConfidenceInputs {
    pub class: PeakClassification,
    pub presence_ratio: f64,
    pub burstiness: f64,
    pub snr_score: f64,
    /// Share of hits at the busiest location; `None` without location data
    pub spatial_concentration: Option<f64>,
    pub strength_db: f64,
    pub negligible_db: f64,
}

/// Class-dependent confidence of a persistent or transient peak.
pub fn peak_confidence(x: &PeakConfidenceInputs) -> f64 {
    match x.class {
        PeakClassification::BaselineNoise => (0.02 + 0.05 * x.presence_ratio).clamp(0.02, 0.12),
        PeakClassification::Transient => {
            (0.05 + 0.10 * x.presence_ratio + 0.07 * x.snr_score).clamp(0.05, 0.22)
        }
        PeakClassification::Patterned | PeakClassification::Persistent => {
            let base = (0.10
                + 0.35 * x.presence_ratio
                + 0.15 * x.snr_score
                + 0.15 * (1.0 - x.burstiness / 10.0).min(1.0))
            .clamp(0.10, 0.75);
            let mut c = match x.spatial_concentration {
                Some(conc) => base * (0.35 + 0.65 * conc),
                None => base,
            };
            if x.spatial_concentration.is_some_and(|conc| conc <= 0.35) {
                c = c.min(0.35);
            }
            if x.strength_db < x.negligible_db {
                c = c.min(0.40);
            }
            c
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_inputs() -> OrderConfidenceInputs {
        OrderConfidenceInputs {
            match_rate: 0.8,
            error_score: 0.9,
            correlation: 0.9,
            snr_score: 0.8,
            strength_db: 30.0,
            localization_confidence: 0.9,
            weak_spatial_separation: false,
            dominance_ratio: Some(3.0),
            no_wheel_sensors: false,
            constant_speed: false,
            steady_speed: false,
            matched: 40,
            corroborating_locations: 1,
            phases_with_evidence: 1,
            diffuse_penalty: None,
            connected_locations: 4,
            path_compliance: 1.0,
            negligible_db: 8.0,
            light_db: 16.0,
        }
    }

    #[test]
    fn strong_evidence_is_high() {
        let c = order_confidence(&make_inputs());
        // 0.10 + 0.28 + 0.18 + 0.09 + 0.16 = 0.81, x0.97 localization
        assert!((c - 0.81 * 0.97).abs() < 1e-9, "got {c}");
    }

    #[test]
    fn always_clamped() {
        let mut x = make_inputs();
        x.match_rate = 5.0;
        x.corroborating_locations = 4;
        x.phases_with_evidence = 4;
        assert!((order_confidence(&x) - CONFIDENCE_CEILING).abs() < 1e-12);

        let mut x = make_inputs();
        x.match_rate = 0.0;
        x.error_score = 0.0;
        x.correlation = 0.0;
        x.snr_score = 0.0;
        x.matched = 0;
        assert!((order_confidence(&x) - CONFIDENCE_FLOOR).abs() < 1e-12);
    }

    #[test]
    fn negligible_strength_caps() {
        let mut x = make_inputs();
        x.strength_db = 4.0;
        assert!(order_confidence(&x) <= 0.40);
    }

    #[test]
    fn diffuse_and_weak_separation_reduce() {
        let base = order_confidence(&make_inputs());
        let mut weak = make_inputs();
        weak.weak_spatial_separation = true;
        weak.dominance_ratio = Some(1.02);
        assert!(order_confidence(&weak) < base);

        let mut diffuse = make_inputs();
        diffuse.diffuse_penalty = Some(0.69);
        assert!((order_confidence(&diffuse) - base * 0.69).abs() < 1e-9);
    }

    #[test]
    fn compliance_shifts_weight_to_match_rate() {
        let mut x = make_inputs();
        x.correlation = 0.0;
        let stiff = order_confidence(&x);
        x.path_compliance = 1.5;
        let compliant = order_confidence(&x);
        assert!(compliant > stiff);
    }

    #[test]
    fn error_and_snr_scores() {
        assert!((error_score(0.0, 1.0) - 1.0).abs() < 1e-12);
        assert_eq!(error_score(0.5, 1.0), 0.0);
        assert!(error_score(0.05, 1.5) > error_score(0.05, 1.0));
        assert!(snr_score(0.0015, 0.0001, 0.001) <= 0.40);
        assert!((snr_score(10.0, 0.001, 0.001) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn peak_confidence_by_class() {
        let mut x = PeakConfidenceInputs {
            class: PeakClassification::BaselineNoise,
            presence_ratio: 1.0,
            burstiness: 1.2,
            snr_score: 1.0,
            spatial_concentration: Some(1.0),
            strength_db: 30.0,
            negligible_db: 8.0,
        };
        assert!(peak_confidence(&x) <= 0.12);
        x.class = PeakClassification::Transient;
        assert!(peak_confidence(&x) <= 0.22);
        x.class = PeakClassification::Patterned;
        let patterned = peak_confidence(&x);
        assert!(patterned > 0.22 && patterned <= 0.75);
        x.spatial_concentration = Some(0.25);
        assert!(peak_confidence(&x) <= 0.35);
    }
}
