//! Pre-defined EEG rhythm patterns for realistic simulation

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// One sinusoidal rhythm component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Oscillation {
    /// Frequency in Hz
    pub frequency: f64,
    /// Peak amplitude in microvolts
    pub amplitude: f64,
}

impl Oscillation {
    pub fn value_at(&self, time: f64, phase: f64) -> f64 {
        self.amplitude * (2.0 * PI * self.frequency * time + phase).sin()
    }
}

/// Mental states with a characteristic dominant rhythm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrainState {
    /// Eyes closed, strong alpha
    Relaxed,
    /// Active concentration, beta dominant
    Focused,
    /// Drowsiness, theta dominant
    Drowsy,
    /// Slow-wave sleep, delta dominant
    DeepSleep,
    /// No rhythmic activity (noise only)
    Flat,
}

impl BrainState {
    /// Rhythm components making up this state
    pub fn oscillations(&self) -> Vec<Oscillation> {
        let osc = |frequency, amplitude| Oscillation { frequency, amplitude };
        match self {
            BrainState::Relaxed => vec![osc(10.0, 20.0), osc(6.0, 5.0), osc(20.0, 3.0)],
            BrainState::Focused => vec![osc(20.0, 12.0), osc(10.0, 5.0), osc(40.0, 3.0)],
            BrainState::Drowsy => vec![osc(6.0, 20.0), osc(10.0, 6.0), osc(2.0, 5.0)],
            BrainState::DeepSleep => vec![osc(2.0, 40.0), osc(6.0, 5.0)],
            BrainState::Flat => Vec::new(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BrainState::Relaxed => "Relaxed (alpha)",
            BrainState::Focused => "Focused (beta)",
            BrainState::Drowsy => "Drowsy (theta)",
            BrainState::DeepSleep => "Deep sleep (delta)",
            BrainState::Flat => "Flat",
        }
    }
}

/// How the simulated state evolves over time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatePattern {
    /// Same state for the whole session
    Constant(BrainState),
    /// Cycle through states, `period_secs` each
    Alternating {
        states: Vec<BrainState>,
        period_secs: f64,
    },
}

impl StatePattern {
    /// State active at `time` seconds into the stream
    pub fn state_at_time(&self, time: f64) -> BrainState {
        match self {
            StatePattern::Constant(state) => *state,
            StatePattern::Alternating { states, period_secs } => {
                if states.is_empty() || *period_secs <= 0.0 {
                    return BrainState::Flat;
                }
                let slot = (time.max(0.0) / period_secs) as usize % states.len();
                states[slot]
            }
        }
    }

    pub fn description(&self) -> String {
        match self {
            StatePattern::Constant(state) => state.description().to_string(),
            StatePattern::Alternating { states, period_secs } => {
                let names: Vec<&str> = states.iter().map(|s| s.description()).collect();
                format!("Alternating every {}s: {}", period_secs, names.join(" -> "))
            }
        }
    }
}

impl Default for StatePattern {
    fn default() -> Self {
        StatePattern::Alternating {
            states: vec![
                BrainState::Relaxed,
                BrainState::Focused,
                BrainState::Drowsy,
            ],
            period_secs: 20.0,
        }
    }
}
