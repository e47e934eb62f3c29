//! Vibration vocabulary: sources, locations, severity buckets, confidence labels.

use serde::{Deserialize, Serialize};

// ============================================================================
// Sources
// ============================================================================

/// Mechanical origin a finding is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VibrationSource {
    /// Wheel or tire (imbalance, runout, flat spot)
    WheelTire,
    /// Driveshaft, CV joints, differential input
    Driveline,
    /// Engine rotating assembly
    Engine,
    /// Low-frequency body or suspension resonance excited by the road
    BodyResonance,
    /// No physical order matched
    Unknown,
}

impl VibrationSource {
    /// Whether findings for this source should be localized to a wheel corner.
    pub fn prefers_wheel_location(self) -> bool {
        matches!(self, Self::WheelTire)
    }
}

impl std::fmt::Display for VibrationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WheelTire => "wheel/tire",
            Self::Driveline => "driveline",
            Self::Engine => "engine",
            Self::BodyResonance => "body resonance",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Row key of the live diagnosis matrix.
///
/// Coarser than [`VibrationSource`]: a merged driveshaft/engine order counts
/// toward both the `Driveshaft` and `Engine` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixSource {
    Engine,
    Driveshaft,
    Wheel,
    Other,
}

impl MatrixSource {
    pub const ALL: [Self; 4] = [Self::Engine, Self::Driveshaft, Self::Wheel, Self::Other];
}

// ============================================================================
// Sensor Locations
// ============================================================================

/// Mounting position of a sensor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorLocation {
    FrontLeftWheel,
    FrontRightWheel,
    RearLeftWheel,
    RearRightWheel,
    Transmission,
    DriveshaftTunnel,
    EngineBay,
    FrontSubframe,
    RearSubframe,
    DriverSeat,
    FrontPassengerSeat,
    RearLeftSeat,
    RearCenterSeat,
    RearRightSeat,
    Trunk,
}

impl SensorLocation {
    pub const ALL: [Self; 15] = [
        Self::FrontLeftWheel,
        Self::FrontRightWheel,
        Self::RearLeftWheel,
        Self::RearRightWheel,
        Self::Transmission,
        Self::DriveshaftTunnel,
        Self::EngineBay,
        Self::FrontSubframe,
        Self::RearSubframe,
        Self::DriverSeat,
        Self::FrontPassengerSeat,
        Self::RearLeftSeat,
        Self::RearCenterSeat,
        Self::RearRightSeat,
        Self::Trunk,
    ];

    /// Sensor sits at a wheel corner.
    pub fn is_wheel(self) -> bool {
        matches!(
            self,
            Self::FrontLeftWheel
                | Self::FrontRightWheel
                | Self::RearLeftWheel
                | Self::RearRightWheel
        )
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::FrontLeftWheel => "Front Left Wheel",
            Self::FrontRightWheel => "Front Right Wheel",
            Self::RearLeftWheel => "Rear Left Wheel",
            Self::RearRightWheel => "Rear Right Wheel",
            Self::Transmission => "Transmission",
            Self::DriveshaftTunnel => "Driveshaft Tunnel",
            Self::EngineBay => "Engine Bay",
            Self::FrontSubframe => "Front Subframe",
            Self::RearSubframe => "Rear Subframe",
            Self::DriverSeat => "Driver Seat",
            Self::FrontPassengerSeat => "Front Passenger Seat",
            Self::RearLeftSeat => "Rear Left Seat",
            Self::RearCenterSeat => "Rear Center Seat",
            Self::RearRightSeat => "Rear Right Seat",
            Self::Trunk => "Trunk",
        }
    }
}

impl std::fmt::Display for SensorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Severity
// ============================================================================

/// Discrete vibration-intensity level. Below l1 there is no bucket (`None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrengthBucket {
    #[serde(rename = "l1")]
    L1,
    #[serde(rename = "l2")]
    L2,
    #[serde(rename = "l3")]
    L3,
    #[serde(rename = "l4")]
    L4,
    #[serde(rename = "l5")]
    L5,
}

impl StrengthBucket {
    pub const ALL: [Self; 5] = [Self::L1, Self::L2, Self::L3, Self::L4, Self::L5];

    /// Zero-based index into a five-entry threshold table.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L3 => "l3",
            Self::L4 => "l4",
            Self::L5 => "l5",
        }
    }
}

impl std::fmt::Display for StrengthBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

// ============================================================================
// Confidence and Location Hypotheses
// ============================================================================

/// Coarse confidence label derived from a [0, 1] score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

impl ConfidenceLabel {
    /// `< 0.40` low, `[0.40, 0.70)` medium, `>= 0.70` high.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.70 {
            Self::High
        } else if confidence >= 0.40 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Where the evidence for a finding points.
///
/// `Diffuse` and `Ambiguous` are explicit outcomes: a finding carrying either
/// never names a single corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationHypothesis {
    /// One location clearly dominates.
    Localized { location: SensorLocation },
    /// Two or more locations show comparable evidence.
    Ambiguous { candidates: Vec<SensorLocation> },
    /// Energy is spread uniformly across sensors (global excitation).
    Diffuse,
    /// No location data was available.
    Unknown,
}

impl LocationHypothesis {
    pub fn is_localized(&self) -> bool {
        matches!(self, Self::Localized { .. })
    }

    pub fn location(&self) -> Option<SensorLocation> {
        match self {
            Self::Localized { location } => Some(*location),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_label_thresholds() {
        assert_eq!(ConfidenceLabel::from_confidence(0.0), ConfidenceLabel::Low);
        assert_eq!(ConfidenceLabel::from_confidence(0.399), ConfidenceLabel::Low);
        assert_eq!(ConfidenceLabel::from_confidence(0.40), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_confidence(0.699), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_confidence(0.70), ConfidenceLabel::High);
    }

    #[test]
    fn wheel_locations() {
        let wheels: Vec<_> = SensorLocation::ALL.iter().filter(|l| l.is_wheel()).collect();
        assert_eq!(wheels.len(), 4);
        assert!(!SensorLocation::DriverSeat.is_wheel());
    }

    #[test]
    fn bucket_serializes_as_key() {
        let json = serde_json::to_string(&StrengthBucket::L3).expect("serialize");
        assert_eq!(json, "\"l3\"");
        assert!(StrengthBucket::L5 > StrengthBucket::L1);
    }

    #[test]
    fn diffuse_is_never_localized() {
        assert!(!LocationHypothesis::Diffuse.is_localized());
        assert_eq!(LocationHypothesis::Diffuse.location(), None);
    }
}
