//! Drive Simulation
//!
//! Generates synthetic multi-sensor accelerometer frames for testing VibeSense.
//! Simulates one drive with idle, acceleration, a cruise speed sweep and a
//! coast-down, optionally with an injected fault:
//! - Wheel imbalance at one corner (1x wheel order)
//! - Driveline vibration (1x driveshaft order)
//! - Engine vibration (2x engine order)
//!
//! # Usage
//! ```bash
//! ./simulation --seconds 120 --fault wheel --location front-right-wheel | ./vibesense --stdin
//! ```

use clap::{Parser, ValueEnum};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use vibesense::config::VehicleSpec;
use vibesense::orders::{engine_rpm_from_speed, vehicle_orders};
use vibesense::types::{SensorFrame, SensorLocation};

// ============================================================================
// Signal Constants
// ============================================================================

/// Counts per g (matches the default `accel_scale_g_per_lsb`)
const COUNTS_PER_G: f64 = 256.0;
/// Broadband noise on every axis (g)
const NOISE_G: f64 = 0.004;
/// Fault amplitude at the sensor closest to the source (g)
const FAULT_AMP_G: f64 = 0.06;
/// Fraction of the fault amplitude seen by distant sensors
const FAULT_TRANSFER: f64 = 0.25;
/// Body resonance always present at low level (Hz, g)
const BODY_MODE_HZ: f64 = 13.0;
const BODY_MODE_G: f64 = 0.003;
/// Peak cruise speed (km/h)
const CRUISE_MAX_KMH: f64 = 110.0;
const CRUISE_MIN_KMH: f64 = 60.0;

const SENSORS: [(&str, SensorLocation); 5] = [
    ("node-fl", SensorLocation::FrontLeftWheel),
    ("node-fr", SensorLocation::FrontRightWheel),
    ("node-rl", SensorLocation::RearLeftWheel),
    ("node-rr", SensorLocation::RearRightWheel),
    ("node-seat", SensorLocation::DriverSeat),
];

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Fault {
    None,
    Wheel,
    Driveline,
    Engine,
}

#[derive(Parser, Debug)]
#[command(name = "vibesense-simulation")]
#[command(about = "Synthetic drive data for VibeSense testing")]
#[command(version = "1.0")]
struct Args {
    /// Drive duration in seconds
    #[arg(long, default_value = "120", value_parser = clap::value_parser!(u32).range(10..=3600))]
    seconds: u32,

    /// Time compression factor (1 = real-time, 0 = as fast as possible)
    #[arg(short, long, default_value = "0")]
    speed: u32,

    /// Accelerometer sample rate in Hz
    #[arg(long, default_value = "800")]
    sample_rate: u32,

    /// Frame length in milliseconds
    #[arg(long, default_value = "500")]
    frame_ms: u32,

    /// Fault to inject
    #[arg(long, value_enum, default_value = "wheel")]
    fault: Fault,

    /// Corner carrying a wheel fault
    #[arg(long, default_value = "front-right-wheel")]
    location: String,

    /// Suppress the drive log (only output frames)
    #[arg(short, long)]
    quiet: bool,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

// ============================================================================
// Drive Profile
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Segment {
    Idle,
    Accelerating,
    Cruising,
    CoastDown,
}

impl Segment {
    fn from_progress(progress: f64) -> Self {
        match progress {
            p if p < 0.08 => Segment::Idle,
            p if p < 0.25 => Segment::Accelerating,
            p if p < 0.85 => Segment::Cruising,
            _ => Segment::CoastDown,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Segment::Idle => "Idle",
            Segment::Accelerating => "Accelerating",
            Segment::Cruising => "Cruise sweep",
            Segment::CoastDown => "Coast down",
        }
    }
}

/// Vehicle speed (km/h) at `progress` through the drive.
fn speed_at(progress: f64) -> f64 {
    match Segment::from_progress(progress) {
        Segment::Idle => 0.0,
        Segment::Accelerating => CRUISE_MIN_KMH * (progress - 0.08) / 0.17,
        Segment::Cruising => {
            let sweep = ((progress - 0.25) / 0.60 * PI).sin();
            CRUISE_MIN_KMH + (CRUISE_MAX_KMH - CRUISE_MIN_KMH) * sweep
        }
        Segment::CoastDown => CRUISE_MIN_KMH * (1.0 - (progress - 0.85) / 0.15).max(0.0),
    }
}

fn parse_location(raw: &str) -> Option<SensorLocation> {
    let key = raw.trim().to_lowercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(key)).ok()
}

// ============================================================================
// Simulation State
// ============================================================================

struct SimulationState {
    rng: StdRng,
    noise: Normal<f64>,
    vehicle: VehicleSpec,
    fault: Fault,
    fault_location: SensorLocation,
    sample_rate: u32,
    /// Accumulated phase of the fault tone (radians)
    fault_phase: f64,
    body_phase: f64,
    t_s: f64,
    frames_generated: u64,
}

impl SimulationState {
    fn new(args: &Args, fault_location: SensorLocation) -> Result<Self, rand_distr::NormalError> {
        let rng = match args.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            noise: Normal::new(0.0, NOISE_G)?,
            vehicle: VehicleSpec::default(),
            fault: args.fault,
            fault_location,
            sample_rate: args.sample_rate.max(1),
            fault_phase: 0.0,
            body_phase: 0.0,
            t_s: 0.0,
            frames_generated: 0,
        })
    }

    fn fault_hz(&self, speed_kmh: f64) -> Option<f64> {
        let orders = vehicle_orders(speed_kmh / 3.6, &self.vehicle)?;
        match self.fault {
            Fault::None => None,
            Fault::Wheel => Some(orders.wheel_hz),
            Fault::Driveline => Some(orders.drive_hz),
            Fault::Engine => Some(2.0 * orders.engine_hz),
        }
    }

    fn gain_at(&self, location: SensorLocation) -> f64 {
        match self.fault {
            Fault::None => 0.0,
            Fault::Wheel if location == self.fault_location => 1.0,
            Fault::Wheel => FAULT_TRANSFER,
            Fault::Driveline | Fault::Engine if location.is_wheel() => FAULT_TRANSFER,
            Fault::Driveline | Fault::Engine => 1.0,
        }
    }

    /// One frame per sensor covering `frame_samples` samples at `speed_kmh`.
    fn generate_frames(&mut self, frame_samples: usize, speed_kmh: f64) -> Vec<SensorFrame> {
        let dt = 1.0 / f64::from(self.sample_rate);
        let fault_hz = self.fault_hz(speed_kmh);
        let engine_rpm = engine_rpm_from_speed(speed_kmh / 3.6, &self.vehicle);

        // Shared source waveform, so every sensor sees the same excitation.
        let mut fault_wave = Vec::with_capacity(frame_samples);
        let mut body_wave = Vec::with_capacity(frame_samples);
        for _ in 0..frame_samples {
            fault_wave.push(self.fault_phase.sin());
            body_wave.push(self.body_phase.sin());
            if let Some(hz) = fault_hz {
                self.fault_phase = (self.fault_phase + 2.0 * PI * hz * dt) % (2.0 * PI);
            }
            self.body_phase = (self.body_phase + 2.0 * PI * BODY_MODE_HZ * dt) % (2.0 * PI);
        }

        let mut frames = Vec::with_capacity(SENSORS.len());
        for (id, location) in SENSORS {
            let amp = if fault_hz.is_some() { FAULT_AMP_G * self.gain_at(location) } else { 0.0 };
            let mut samples = Vec::with_capacity(frame_samples);
            for (f, b) in fault_wave.iter().zip(&body_wave) {
                let x = amp * 0.6 * f + self.noise.sample(&mut self.rng);
                let y = amp * 0.3 * f + BODY_MODE_G * b + self.noise.sample(&mut self.rng);
                let z = 1.0 + amp * f + BODY_MODE_G * b + self.noise.sample(&mut self.rng);
                let counts = |g: f64| (g * COUNTS_PER_G).round();
                samples.push([counts(x), counts(y), counts(z)]);
            }
            frames.push(SensorFrame {
                sensor_id: id.to_string(),
                location: Some(location),
                t_s: self.t_s,
                sample_rate_hz: self.sample_rate,
                samples,
                speed_kmh: Some(speed_kmh),
                engine_rpm,
            });
        }

        self.t_s += frame_samples as f64 * dt;
        self.frames_generated += SENSORS.len() as u64;
        frames
    }
}

// ============================================================================
// Logging Utilities
// ============================================================================

fn format_time(seconds: f64) -> String {
    let minutes = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", minutes, secs)
}

fn log_drive(time: f64, message: &str, quiet: bool) {
    if !quiet {
        eprintln!("[{}] {}", format_time(time), message);
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let fault_location = parse_location(&args.location)
        .ok_or_else(|| format!("Unknown sensor location: {}", args.location))?;

    let mut state = SimulationState::new(&args, fault_location)?;
    let duration = f64::from(args.seconds);
    let frame_samples =
        ((f64::from(state.sample_rate) * f64::from(args.frame_ms) / 1000.0) as usize).max(1);
    let frame_secs = frame_samples as f64 / f64::from(state.sample_rate);
    let frame_interval_real = (args.speed > 0)
        .then(|| Duration::from_secs_f64(frame_secs / f64::from(args.speed)));

    log_drive(0.0, &"=".repeat(70), args.quiet);
    log_drive(0.0, "VIBESENSE DRIVE SIMULATION v1.0", args.quiet);
    log_drive(0.0, &"=".repeat(70), args.quiet);
    log_drive(0.0, &format!("  Duration: {} s", args.seconds), args.quiet);
    log_drive(0.0, &format!("  Sensors: {} @ {} Hz", SENSORS.len(), state.sample_rate), args.quiet);
    log_drive(0.0, &format!("  Fault: {:?} ({})", args.fault, fault_location.label()), args.quiet);
    if let Some(seed) = args.seed {
        log_drive(0.0, &format!("  Random seed: {}", seed), args.quiet);
    }
    log_drive(0.0, &"=".repeat(70), args.quiet);

    let start_time = Instant::now();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();
    let mut segment = None;

    while state.t_s < duration {
        let loop_start = Instant::now();
        let progress = state.t_s / duration;
        let current = Segment::from_progress(progress);
        if segment != Some(current) {
            log_drive(state.t_s, &format!(">>> {}", current.name()), args.quiet);
            segment = Some(current);
        }

        for frame in state.generate_frames(frame_samples, speed_at(progress)) {
            writeln!(stdout_lock, "{}", serde_json::to_string(&frame)?)?;
        }
        stdout_lock.flush()?;

        if let Some(interval) = frame_interval_real {
            let elapsed = loop_start.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
    }

    stdout_lock.flush()?;
    drop(stdout_lock);

    log_drive(state.t_s, &"=".repeat(70), args.quiet);
    log_drive(state.t_s, "SIMULATION COMPLETE", args.quiet);
    log_drive(state.t_s, &format!("Total frames: {}", state.frames_generated), args.quiet);
    let elapsed = start_time.elapsed().as_secs_f64();
    log_drive(state.t_s, &format!("Real time: {elapsed:.1}s"), args.quiet);
    log_drive(state.t_s, &"=".repeat(70), args.quiet);

    Ok(())
}
