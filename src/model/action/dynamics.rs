//! Transition dynamics shared by speed and lateral actions.

use std::f64::consts::PI;
use std::str::FromStr;

use crate::model::condition::SMALL_NUMBER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DynamicsShape {
    #[default]
    Linear,
    Sinusoidal,
    Step,
}

impl DynamicsShape {
    /// Map normalized progress in `[0, 1]` onto the transition curve.
    pub fn evaluate(self, progress: f64) -> f64 {
        let x = progress.clamp(0.0, 1.0);
        match self {
            DynamicsShape::Linear => x,
            DynamicsShape::Sinusoidal => (1.0 - (PI * x).cos()) / 2.0,
            DynamicsShape::Step => 1.0,
        }
    }
}

impl FromStr for DynamicsShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(DynamicsShape::Linear),
            "sinusoidal" => Ok(DynamicsShape::Sinusoidal),
            "step" => Ok(DynamicsShape::Step),
            other => Err(format!("invalid dynamics shape '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DynamicsDimension {
    /// Change per second.
    Rate,
    #[default]
    Time,
    Distance,
}

impl FromStr for DynamicsDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rate" => Ok(DynamicsDimension::Rate),
            "time" => Ok(DynamicsDimension::Time),
            "distance" => Ok(DynamicsDimension::Distance),
            other => Err(format!("invalid dynamics dimension '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransitionDynamics {
    pub shape: DynamicsShape,
    pub dimension: DynamicsDimension,
    pub value: f64,
}

/// Time-based progress through a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Transition {
    pub start: f64,
    pub target: f64,
    pub elapsed: f64,
    pub duration: f64,
}

impl Transition {
    pub fn new(start: f64, target: f64, duration: f64) -> Self {
        Self {
            start,
            target,
            elapsed: 0.0,
            duration: duration.max(0.0),
        }
    }

    /// Advance by `dt` and return the progress in `[0, 1]`.
    pub fn advance(&mut self, dt: f64) -> f64 {
        self.elapsed += dt;
        self.progress()
    }

    pub fn progress(&self) -> f64 {
        if self.duration <= SMALL_NUMBER {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }

    pub fn is_done(&self) -> bool {
        self.duration <= SMALL_NUMBER || self.elapsed >= self.duration - SMALL_NUMBER
    }

    pub fn value(&self, shape: DynamicsShape) -> f64 {
        self.start + (self.target - self.start) * shape.evaluate(self.progress())
    }
}
