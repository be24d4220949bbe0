use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusReading {
    pub score: u8,
    pub present: bool,
}

/// Producer of focus scores, usually backed by a camera. Owned by the
/// sensing controller between `start` and `stop`.
#[async_trait]
pub trait FocusSignalSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Acquire the underlying device.
    async fn start(&self) -> Result<()>;

    async fn sample(&self) -> Result<FocusReading>;

    /// Release the underlying device. Must be safe to call when not started.
    async fn stop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    Good,
    Poor,
}

/// One simulated observation of the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub face_detected: bool,
    pub eyes_open: bool,
    pub looking_at_screen: bool,
    pub posture: Posture,
}

impl Detection {
    /// Scale a raw score down for every negative cue.
    pub fn adjust(&self, base_score: f64) -> u8 {
        let mut adjusted = base_score;
        if !self.face_detected {
            adjusted *= 0.3;
        }
        if !self.eyes_open {
            adjusted *= 0.2;
        }
        if !self.looking_at_screen {
            adjusted *= 0.6;
        }
        if self.posture == Posture::Poor {
            adjusted *= 0.8;
        }
        adjusted.round().clamp(0.0, 100.0) as u8
    }
}

struct DetectorState {
    rng: StdRng,
    running: bool,
}

/// Stand-in for the camera pipeline: random but plausible scores with the
/// same cue penalties the face detector applies.
pub struct SimulatedDetector {
    state: Mutex<DetectorState>,
}

impl SimulatedDetector {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(DetectorState {
                rng,
                running: false,
            }),
        }
    }

    fn next_reading(rng: &mut StdRng) -> FocusReading {
        let base = 70.0 + rng.gen::<f64>() * 20.0;
        let variation = (rng.gen::<f64>() - 0.5) * 30.0;
        let focus_score = (base + variation).round().clamp(0.0, 100.0);

        let detection = Detection {
            face_detected: rng.gen_bool(0.9),
            eyes_open: rng.gen_bool(0.95),
            looking_at_screen: rng.gen_bool(0.8),
            posture: if rng.gen_bool(0.7) {
                Posture::Good
            } else {
                Posture::Poor
            },
        };

        FocusReading {
            score: detection.adjust(focus_score),
            present: detection.face_detected,
        }
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FocusSignalSource for SimulatedDetector {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn start(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("detector state poisoned"))?;
        state.running = true;
        Ok(())
    }

    async fn sample(&self) -> Result<FocusReading> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("detector state poisoned"))?;
        if !state.running {
            bail!("camera is not running");
        }
        Ok(Self::next_reading(&mut state.rng))
    }

    async fn stop(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.running = false;
        }
    }
}
