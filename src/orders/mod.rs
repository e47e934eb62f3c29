//! Vehicle Order Model
//!
//! Derives the rotational frequencies a healthy or faulty vehicle is expected
//! to excite (wheel, driveshaft, engine) from road speed and drivetrain
//! geometry, and matches detected peaks to them.
//!
//! - [`vehicle_orders`] - fundamentals and their propagated uncertainty
//! - [`classify_peak`] - closed [`Hypothesis`] set in fixed priority order
//! - [`VehicleSpec::sanitized`](crate::config::VehicleSpec) - runtime settings clamping

mod classifier;
mod vehicle;

pub use classifier::{
    classify_peak, classify_with_orders, tolerance_hz, tolerance_rel, Hypothesis, PeakClass,
};
pub use vehicle::{
    combined_relative_uncertainty, engine_rpm_from_speed, tire_circumference_from_dims,
    tire_circumference_m, vehicle_orders, VehicleOrders,
};

// Vehicle geometry lives in config; re-exported for order-model callers
pub use crate::config::VehicleSpec;
