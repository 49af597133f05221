//! Demo Mode - Synthetic hand-tracking source for testing
//!
//! Generates hand-tracking frames in the shape a headset client sends them,
//! so the recorder and replay paths can be exercised without hardware.
//! Hands rest in front of the viewer with small jitter and are raised in a
//! short wave gesture every few seconds.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

/// Joints per tracked hand
pub const JOINT_COUNT: usize = 27;

/// Which hands a simulated frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationMode {
    /// Compact frames with both hands
    #[default]
    Both,
    /// Detailed single-hand frames, left hand only
    Left,
    /// Detailed single-hand frames, right hand only
    Right,
    /// Detailed single-hand frames alternating left and right
    Alternate,
}

impl FromStr for SimulationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "both" => Ok(SimulationMode::Both),
            "left" => Ok(SimulationMode::Left),
            "right" => Ok(SimulationMode::Right),
            "alternate" => Ok(SimulationMode::Alternate),
            other => Err(format!(
                "unknown mode '{other}' (expected both, left, right or alternate)"
            )),
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulationMode::Both => "both",
            SimulationMode::Left => "left",
            SimulationMode::Right => "right",
            SimulationMode::Alternate => "alternate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GestureState {
    /// Hands resting
    Rest,
    /// Hands rising
    Raise { start: f64 },
    /// Hands held up, waving
    Wave { start: f64 },
    /// Hands returning to rest
    Lower { start: f64 },
}

const RAISE_SECS: f64 = 0.4;
const WAVE_SECS: f64 = 1.0;
const LOWER_SECS: f64 = 0.6;
const RAISE_HEIGHT: f64 = 0.25;

/// Synthetic hand-tracking frame generator
pub struct MotionSimulator {
    mode: SimulationMode,
    rng: StdRng,
    /// Time of the first frame
    start_time: Option<f64>,
    /// Seconds from start of the next wave gesture
    next_wave_at: f64,
    gesture: GestureState,
    frame_count: u64,
}

impl MotionSimulator {
    /// Create a simulator seeded from entropy
    pub fn new(mode: SimulationMode) -> Self {
        Self::from_rng(mode, StdRng::from_entropy())
    }

    /// Create a reproducible simulator
    pub fn with_seed(mode: SimulationMode, seed: u64) -> Self {
        Self::from_rng(mode, StdRng::seed_from_u64(seed))
    }

    fn from_rng(mode: SimulationMode, mut rng: StdRng) -> Self {
        let next_wave_at = rng.gen_range(3.0..6.0);
        Self {
            mode,
            rng,
            start_time: None,
            next_wave_at,
            gesture: GestureState::Rest,
            frame_count: 0,
        }
    }

    /// Frames generated so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Generate the frame for `timestamp` (Unix epoch seconds)
    pub fn next_frame(&mut self, timestamp: f64) -> Value {
        let start = *self.start_time.get_or_insert(timestamp);
        let sim_time = (timestamp - start).max(0.0);
        self.update_gesture(sim_time);
        let lift = self.lift(sim_time);

        let frame = match self.mode {
            SimulationMode::Both => json!({
                "timestamp": timestamp,
                "leftHand": self.compact_hand(true, lift),
                "rightHand": self.compact_hand(false, lift),
            }),
            SimulationMode::Left => self.detailed_hand(true, timestamp, lift),
            SimulationMode::Right => self.detailed_hand(false, timestamp, lift),
            SimulationMode::Alternate => {
                let is_left = self.frame_count % 2 == 0;
                self.detailed_hand(is_left, timestamp, lift)
            }
        };
        self.frame_count += 1;
        frame
    }

    fn update_gesture(&mut self, sim_time: f64) {
        match self.gesture {
            GestureState::Rest => {
                if sim_time >= self.next_wave_at {
                    self.gesture = GestureState::Raise { start: sim_time };
                }
            }
            GestureState::Raise { start } => {
                if sim_time >= start + RAISE_SECS {
                    self.gesture = GestureState::Wave { start: sim_time };
                }
            }
            GestureState::Wave { start } => {
                if sim_time >= start + WAVE_SECS {
                    self.gesture = GestureState::Lower { start: sim_time };
                }
            }
            GestureState::Lower { start } => {
                if sim_time >= start + LOWER_SECS {
                    self.gesture = GestureState::Rest;
                    self.next_wave_at = sim_time + self.rng.gen_range(3.0..6.0);
                }
            }
        }
    }

    /// Vertical offset of both hands for the current gesture
    fn lift(&self, sim_time: f64) -> f64 {
        match self.gesture {
            GestureState::Rest => 0.0,
            GestureState::Raise { start } => {
                RAISE_HEIGHT * ((sim_time - start) / RAISE_SECS).min(1.0)
            }
            GestureState::Wave { start } => {
                RAISE_HEIGHT + 0.03 * ((sim_time - start) * 12.0).sin()
            }
            GestureState::Lower { start } => {
                RAISE_HEIGHT * (1.0 - ((sim_time - start) / LOWER_SECS).min(1.0))
            }
        }
    }

    fn joint_position(&mut self, is_left: bool, joint: usize, lift: f64) -> [f64; 3] {
        let base_x = if is_left { -0.1 } else { 0.1 };
        [
            base_x + self.rng.gen_range(-0.02..0.02),
            0.5 + lift + joint as f64 * 0.01 + self.rng.gen_range(-0.01..0.01),
            -0.3 + self.rng.gen_range(-0.02..0.02),
        ]
    }

    fn compact_hand(&mut self, is_left: bool, lift: f64) -> Value {
        let joints: Vec<[f64; 3]> = (0..JOINT_COUNT)
            .map(|joint| self.joint_position(is_left, joint, lift))
            .collect();
        json!({
            "joints": joints,
            "trackedMask": (1u64 << JOINT_COUNT) - 1,
        })
    }

    fn detailed_hand(&mut self, is_left: bool, timestamp: f64, lift: f64) -> Value {
        let joints: Vec<Value> = (0..JOINT_COUNT)
            .map(|joint| {
                json!({
                    "name": format!("joint_{joint}"),
                    "position": self.joint_position(is_left, joint, lift),
                    "isTracked": true,
                })
            })
            .collect();
        json!({
            "timestamp": timestamp,
            "isLeft": is_left,
            "joints": joints,
        })
    }
}
