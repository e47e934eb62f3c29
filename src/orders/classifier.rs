//! Peak-to-order classifier.
//!
//! A detected peak is matched against a closed set of order hypotheses
//! evaluated in a fixed priority order. The candidate with the smallest
//! relative error inside its tolerance window wins; ties go to the earlier
//! hypothesis.

use serde::{Deserialize, Serialize};

use super::vehicle::{vehicle_orders, VehicleOrders};
use crate::config::{OrderConfig, VehicleSpec};
use crate::types::{MatrixSource, VibrationSource};

/// Guard against dividing by a vanishing engine frequency.
const FREQUENCY_EPSILON_HZ: f64 = 1e-6;

/// Lower bound on the relative half-width cap.
const MIN_HALF_WIDTH_REL: f64 = 0.005;

/// Order hypothesis a peak can be attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hypothesis {
    #[serde(rename = "wheel1")]
    Wheel1,
    #[serde(rename = "wheel2")]
    Wheel2,
    /// Wheel 2x and engine 1x coincide within their combined uncertainty
    #[serde(rename = "wheel2_eng1")]
    Wheel2Engine1,
    #[serde(rename = "shaft1")]
    Shaft1,
    /// Driveshaft 1x and engine 1x coincide (direct-drive gear)
    #[serde(rename = "shaft_eng1")]
    ShaftEngine1,
    #[serde(rename = "eng1")]
    Engine1,
    #[serde(rename = "eng2")]
    Engine2,
    /// Low-frequency road/body resonance band
    #[serde(rename = "road")]
    Road,
    #[serde(rename = "other")]
    Other,
}

impl Hypothesis {
    pub fn key(self) -> &'static str {
        match self {
            Self::Wheel1 => "wheel1",
            Self::Wheel2 => "wheel2",
            Self::Wheel2Engine1 => "wheel2_eng1",
            Self::Shaft1 => "shaft1",
            Self::ShaftEngine1 => "shaft_eng1",
            Self::Engine1 => "eng1",
            Self::Engine2 => "eng2",
            Self::Road => "road",
            Self::Other => "other",
        }
    }

    /// Order label for matched hypotheses; `None` for road and other.
    pub fn order_label(self) -> Option<&'static str> {
        match self {
            Self::Wheel1 => Some("1x wheel order"),
            Self::Wheel2 => Some("2x wheel order"),
            Self::Wheel2Engine1 => Some("2x wheel / 1x engine order"),
            Self::Shaft1 => Some("1x driveshaft order"),
            Self::ShaftEngine1 => Some("1x driveshaft/engine order"),
            Self::Engine1 => Some("1x engine order"),
            Self::Engine2 => Some("2x engine order"),
            Self::Road | Self::Other => None,
        }
    }

    /// Suspected mechanical source. The wheel/engine overlap defaults to wheel.
    pub fn source(self) -> VibrationSource {
        match self {
            Self::Wheel1 | Self::Wheel2 | Self::Wheel2Engine1 => VibrationSource::WheelTire,
            Self::Shaft1 | Self::ShaftEngine1 => VibrationSource::Driveline,
            Self::Engine1 | Self::Engine2 => VibrationSource::Engine,
            Self::Road => VibrationSource::BodyResonance,
            Self::Other => VibrationSource::Unknown,
        }
    }

    /// Live-matrix rows this hypothesis contributes to.
    pub fn matrix_sources(self) -> &'static [MatrixSource] {
        match self {
            Self::Wheel1 | Self::Wheel2 => &[MatrixSource::Wheel],
            Self::Wheel2Engine1 => &[MatrixSource::Wheel, MatrixSource::Engine],
            Self::Shaft1 => &[MatrixSource::Driveshaft],
            Self::ShaftEngine1 => &[MatrixSource::Driveshaft, MatrixSource::Engine],
            Self::Engine1 | Self::Engine2 => &[MatrixSource::Engine],
            Self::Road | Self::Other => &[MatrixSource::Other],
        }
    }

    pub fn is_order(self) -> bool {
        !matches!(self, Self::Road | Self::Other)
    }
}

impl std::fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Relative tolerance window for one order.
///
/// The bandwidth half-width and the order's propagated uncertainty are
/// combined in quadrature and widened by `sqrt(path_compliance)`. The result
/// is floored at `min_abs_band_hz` (as a fraction of `predicted_hz`) and capped
/// at `max_band_half_width_pct`.
pub fn tolerance_rel(
    bandwidth_pct: f64,
    predicted_hz: f64,
    uncertainty: f64,
    path_compliance: f64,
    vehicle: &VehicleSpec,
) -> f64 {
    if !predicted_hz.is_finite() || predicted_hz <= 0.0 {
        return 0.0;
    }
    let half = bandwidth_pct.max(0.0) / 200.0;
    let combined =
        (half * half + uncertainty * uncertainty).sqrt() * path_compliance.max(0.0).sqrt();
    let abs_floor = vehicle.min_abs_band_hz.max(0.0) / predicted_hz.max(1.0);
    let cap = (vehicle.max_band_half_width_pct / 100.0).max(MIN_HALF_WIDTH_REL);
    combined.max(abs_floor).min(cap)
}

/// Absolute tolerance in Hz around `predicted_hz`.
pub fn tolerance_hz(
    bandwidth_pct: f64,
    predicted_hz: f64,
    uncertainty: f64,
    path_compliance: f64,
    vehicle: &VehicleSpec,
) -> f64 {
    tolerance_rel(bandwidth_pct, predicted_hz, uncertainty, path_compliance, vehicle)
        * predicted_hz.max(0.0)
}

/// Outcome of classifying one peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakClass {
    pub hypothesis: Hypothesis,
    /// Predicted order frequency of the matched hypothesis
    pub matched_hz: Option<f64>,
    pub rel_err: Option<f64>,
    pub tolerance: Option<f64>,
}

impl PeakClass {
    fn unmatched(hypothesis: Hypothesis) -> Self {
        Self {
            hypothesis,
            matched_hz: None,
            rel_err: None,
            tolerance: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    hypothesis: Hypothesis,
    hz: f64,
    tol: f64,
}

/// Candidate windows in priority order for the given fundamentals.
fn candidates(orders: &VehicleOrders, vehicle: &VehicleSpec, cfg: &OrderConfig) -> Vec<Candidate> {
    let wheel_tol = tolerance_rel(
        vehicle.wheel_bandwidth_pct,
        orders.wheel_hz,
        orders.wheel_uncertainty,
        cfg.wheel_path_compliance,
        vehicle,
    );
    let drive_tol = tolerance_rel(
        vehicle.driveshaft_bandwidth_pct,
        orders.drive_hz,
        orders.drive_uncertainty,
        cfg.rigid_path_compliance,
        vehicle,
    );
    let engine_tol = tolerance_rel(
        vehicle.engine_bandwidth_pct,
        orders.engine_hz,
        orders.engine_uncertainty,
        cfg.rigid_path_compliance,
        vehicle,
    );
    let engine_ref = orders.engine_hz.max(FREQUENCY_EPSILON_HZ);

    let mut out = Vec::with_capacity(6);
    out.push(Candidate { hypothesis: Hypothesis::Wheel1, hz: orders.wheel_hz, tol: wheel_tol });

    let wheel_2x = orders.wheel_hz * 2.0;
    let wheel_engine_overlap = cfg
        .min_overlap_tolerance
        .max(orders.wheel_uncertainty + orders.engine_uncertainty);
    if (wheel_2x - orders.engine_hz).abs() / engine_ref < wheel_engine_overlap {
        out.push(Candidate {
            hypothesis: Hypothesis::Wheel2Engine1,
            hz: wheel_2x,
            tol: wheel_tol.max(engine_tol),
        });
    } else {
        out.push(Candidate { hypothesis: Hypothesis::Wheel2, hz: wheel_2x, tol: wheel_tol });
    }

    let shaft_engine_overlap = cfg
        .min_overlap_tolerance
        .max(orders.drive_uncertainty + orders.engine_uncertainty);
    if (orders.drive_hz - orders.engine_hz).abs() / engine_ref < shaft_engine_overlap {
        out.push(Candidate {
            hypothesis: Hypothesis::ShaftEngine1,
            hz: orders.drive_hz,
            tol: drive_tol.max(engine_tol),
        });
    } else {
        out.push(Candidate {
            hypothesis: Hypothesis::Shaft1,
            hz: orders.drive_hz,
            tol: drive_tol,
        });
        out.push(Candidate {
            hypothesis: Hypothesis::Engine1,
            hz: orders.engine_hz,
            tol: engine_tol,
        });
    }

    out.push(Candidate {
        hypothesis: Hypothesis::Engine2,
        hz: orders.engine_hz * 2.0,
        tol: engine_tol,
    });
    out
}

/// Classify a peak against precomputed fundamentals (`None` when speed is unknown).
pub fn classify_with_orders(
    peak_hz: f64,
    orders: Option<&VehicleOrders>,
    vehicle: &VehicleSpec,
    cfg: &OrderConfig,
) -> PeakClass {
    if !peak_hz.is_finite() {
        return PeakClass::unmatched(Hypothesis::Other);
    }

    if let Some(orders) = orders {
        let mut best: Option<(Candidate, f64)> = None;
        for candidate in candidates(orders, vehicle, cfg) {
            if candidate.hz <= cfg.min_order_hz {
                continue;
            }
            let rel_err = (peak_hz - candidate.hz).abs() / candidate.hz;
            let better = best.map_or(true, |(_, err)| rel_err < err);
            if rel_err <= candidate.tol && better {
                best = Some((candidate, rel_err));
            }
        }
        if let Some((c, rel_err)) = best {
            return PeakClass {
                hypothesis: c.hypothesis,
                matched_hz: Some(c.hz),
                rel_err: Some(rel_err),
                tolerance: Some(c.tol),
            };
        }
    }

    if (cfg.road_resonance_min_hz..=cfg.road_resonance_max_hz).contains(&peak_hz) {
        PeakClass::unmatched(Hypothesis::Road)
    } else {
        PeakClass::unmatched(Hypothesis::Other)
    }
}

/// Classify a peak at the given road speed.
pub fn classify_peak(
    peak_hz: f64,
    speed_mps: Option<f64>,
    vehicle: &VehicleSpec,
    cfg: &OrderConfig,
) -> PeakClass {
    let orders = speed_mps.and_then(|s| vehicle_orders(s, vehicle));
    classify_with_orders(peak_hz, orders.as_ref(), vehicle, cfg)
}
