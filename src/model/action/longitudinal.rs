//! Speed and distance-keeping actions.

use std::str::FromStr;

use log::{debug, warn};

use crate::core::EntityId;
use crate::model::action::dynamics::{DynamicsDimension, DynamicsShape, Transition, TransitionDynamics};
use crate::model::action::{Progress, StepContext};
use crate::model::condition::SMALL_NUMBER;
use crate::model::entity::Entity;
use crate::road::{LaneCoord, WorldPose};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativeValueType {
    #[default]
    Delta,
    Factor,
}

impl RelativeValueType {
    pub fn apply(self, reference: f64, value: f64) -> f64 {
        match self {
            RelativeValueType::Delta => reference + value,
            RelativeValueType::Factor => reference * value,
        }
    }
}

impl FromStr for RelativeValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delta" => Ok(RelativeValueType::Delta),
            "factor" => Ok(RelativeValueType::Factor),
            other => Err(format!("invalid value type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeedTarget {
    Absolute(f64),
    Relative {
        entity: EntityId,
        value: f64,
        value_type: RelativeValueType,
        /// Keep tracking the reference speed after the transition.
        continuous: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedAction {
    pub target: SpeedTarget,
    pub dynamics: TransitionDynamics,
    transition: Option<Transition>,
}

impl SpeedAction {
    pub fn new(target: SpeedTarget, dynamics: TransitionDynamics) -> Self {
        Self {
            target,
            dynamics,
            transition: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.transition = None;
    }

    fn target_speed(&self, ctx: &StepContext<'_>) -> Option<f64> {
        match &self.target {
            SpeedTarget::Absolute(speed) => Some(*speed),
            SpeedTarget::Relative {
                entity,
                value,
                value_type,
                ..
            } => ctx
                .snapshot
                .get(*entity)
                .map(|reference| value_type.apply(reference.speed, *value)),
        }
    }

    fn duration(&self, start: f64, target: f64) -> f64 {
        if self.dynamics.shape == DynamicsShape::Step {
            return 0.0;
        }
        let value = self.dynamics.value;
        match self.dynamics.dimension {
            DynamicsDimension::Time => value,
            DynamicsDimension::Rate if value.abs() > SMALL_NUMBER => (target - start).abs() / value.abs(),
            DynamicsDimension::Distance if start + target > SMALL_NUMBER => 2.0 * value / (start + target),
            _ => {
                warn!("Speed action dynamics {:?} give no usable duration; stepping", self.dynamics);
                0.0
            }
        }
    }

    pub(crate) fn step(&mut self, entity: &mut Entity, ctx: &StepContext<'_>) -> Progress {
        let Some(target) = self.target_speed(ctx) else {
            warn!("{}: speed reference entity missing", entity.name);
            return Progress::Done;
        };

        if self.transition.is_none() {
            let duration = self.duration(entity.speed, target);
            debug!(
                "{}: speed {:.2} -> {:.2} over {:.2} s",
                entity.name, entity.speed, target, duration
            );
            self.transition = Some(Transition::new(entity.speed, target, duration));
        }
        let Some(transition) = self.transition.as_mut() else {
            return Progress::Done;
        };

        let continuous = matches!(self.target, SpeedTarget::Relative { continuous: true, .. });
        if continuous {
            transition.target = target;
        }
        transition.advance(ctx.dt);
        entity.speed = transition.value(self.dynamics.shape);

        if transition.is_done() && !continuous {
            entity.speed = transition.target;
            Progress::Done
        } else {
            Progress::Running
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceTarget {
    Distance(f64),
    TimeGap(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicConstraints {
    pub max_acceleration: f64,
    pub max_deceleration: f64,
    pub max_speed: f64,
}

/// Gains of the distance controller used when constraints are given.
const DISTANCE_KP: f64 = 4.0;
const DISTANCE_KD: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LongitudinalDistanceAction {
    pub target_entity: EntityId,
    pub target: DistanceTarget,
    /// Measure bumper to bumper instead of center to center.
    pub freespace: bool,
    /// `None` places the entity at the required gap every tick.
    pub constraints: Option<DynamicConstraints>,
}

impl LongitudinalDistanceAction {
    /// Required center-to-center distance behind `target`.
    fn required_distance(&self, entity: &Entity, target: &Entity) -> f64 {
        let mut distance = match self.target {
            DistanceTarget::Distance(d) => d,
            DistanceTarget::TimeGap(gap) => gap * target.speed,
        };
        if self.freespace {
            distance += (entity.bounding_box.length + target.bounding_box.length) / 2.0;
        }
        distance
    }

    pub(crate) fn step(&mut self, entity: &mut Entity, ctx: &StepContext<'_>) -> Progress {
        let Some(target) = ctx.snapshot.get(self.target_entity) else {
            warn!("{}: distance target {} missing", entity.name, self.target_entity);
            return Progress::Done;
        };
        let required = self.required_distance(entity, target);

        match self.constraints {
            None => {
                place_behind(entity, target, required, ctx);
                entity.speed = target.speed;
            }
            Some(limits) => {
                let gap = entity.longitudinal_distance_to(target);
                let error = gap - required;
                let relative_speed = target.speed - entity.speed;
                let acceleration = (DISTANCE_KP * error + DISTANCE_KD * relative_speed)
                    .clamp(-limits.max_deceleration.abs(), limits.max_acceleration.abs());
                entity.speed = (entity.speed + acceleration * ctx.dt).clamp(0.0, limits.max_speed);
            }
        }

        // distance keeping never completes on its own
        Progress::Running
    }
}

fn place_behind(entity: &mut Entity, target: &Entity, distance: f64, ctx: &StepContext<'_>) {
    match target.lane {
        Some(target_lane) => {
            let (lane_id, offset) = match entity.lane {
                Some(own) if own.road_id == target_lane.road_id => (own.lane_id, own.offset),
                _ => (target_lane.lane_id, 0.0),
            };
            let lane = LaneCoord {
                road_id: target_lane.road_id,
                lane_id,
                s: target_lane.s - distance * target_lane.driving_direction(),
                offset,
            };
            entity.set_lane_position(lane, None, ctx.road);
        }
        None => {
            let back = target.pose.forward() * distance;
            let pose = WorldPose {
                x: target.pose.x - back.x,
                y: target.pose.y - back.y,
                ..target.pose
            };
            entity.set_world_pose(pose, ctx.road);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::{Category, Control, Entities, VehicleCategory};
    use crate::road::StraightRoads;

    fn car(name: &str, s: f64, speed: f64, road: &StraightRoads) -> Entity {
        let mut e = Entity::new(name, Category::Vehicle(VehicleCategory::Car), Control::Internal);
        e.set_lane_position(LaneCoord { road_id: 0, lane_id: -1, s, offset: 0.0 }, None, road);
        e.speed = speed;
        e
    }

    fn ctx<'a>(snapshot: &'a Entities, road: &'a StraightRoads, dt: f64) -> StepContext<'a> {
        StepContext {
            dt,
            simulation_time: 0.0,
            snapshot,
            road,
        }
    }

    #[test]
    fn test_speed_rate_duration() {
        let road = StraightRoads::single(0, 1000.0, 1, 3.5);
        let snapshot = Entities::new();
        let mut ego = car("Ego", 0.0, 10.0, &road);
        let mut action = SpeedAction::new(
            SpeedTarget::Absolute(20.0),
            TransitionDynamics {
                shape: DynamicsShape::Linear,
                dimension: DynamicsDimension::Rate,
                value: 5.0,
            },
        );
        // 10 m/s at 5 m/s² takes 2 s
        let mut ticks = 0;
        while action.step(&mut ego, &ctx(&snapshot, &road, 0.1)) == Progress::Running {
            ticks += 1;
            assert!(ticks < 100);
        }
        assert_eq!(ticks, 19);
        assert_eq!(ego.speed, 20.0);
    }

    #[test]
    fn test_relative_factor_target() {
        let road = StraightRoads::single(0, 1000.0, 1, 3.5);
        let mut snapshot = Entities::new();
        let lead = snapshot.push(car("Lead", 50.0, 12.0, &road));
        let mut ego = car("Ego", 0.0, 0.0, &road);
        let mut action = SpeedAction::new(
            SpeedTarget::Relative {
                entity: lead,
                value: 1.5,
                value_type: RelativeValueType::Factor,
                continuous: false,
            },
            TransitionDynamics {
                shape: DynamicsShape::Step,
                ..TransitionDynamics::default()
            },
        );
        assert_eq!(action.step(&mut ego, &ctx(&snapshot, &road, 0.1)), Progress::Done);
        assert!((ego.speed - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_continuous_speed_never_completes() {
        let road = StraightRoads::single(0, 1000.0, 1, 3.5);
        let mut snapshot = Entities::new();
        let lead = snapshot.push(car("Lead", 50.0, 12.0, &road));
        let mut ego = car("Ego", 0.0, 0.0, &road);
        let mut action = SpeedAction::new(
            SpeedTarget::Relative {
                entity: lead,
                value: 2.0,
                value_type: RelativeValueType::Delta,
                continuous: true,
            },
            TransitionDynamics {
                shape: DynamicsShape::Step,
                ..TransitionDynamics::default()
            },
        );
        for _ in 0..10 {
            assert_eq!(action.step(&mut ego, &ctx(&snapshot, &road, 0.1)), Progress::Running);
        }
        assert!((ego.speed - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_unconstrained_distance_places_entity() {
        let road = StraightRoads::single(0, 1000.0, 1, 3.5);
        let mut snapshot = Entities::new();
        let lead = snapshot.push(car("Lead", 100.0, 15.0, &road));
        let mut ego = car("Ego", 0.0, 0.0, &road);
        let mut action = LongitudinalDistanceAction {
            target_entity: lead,
            target: DistanceTarget::Distance(20.0),
            freespace: true,
            constraints: None,
        };
        assert_eq!(action.step(&mut ego, &ctx(&snapshot, &road, 0.1)), Progress::Running);
        assert!((ego.lane.unwrap().s - 75.5).abs() < 1e-9);
        assert_eq!(ego.speed, 15.0);
    }

    #[test]
    fn test_constrained_distance_respects_limits() {
        let road = StraightRoads::single(0, 1000.0, 1, 3.5);
        let mut snapshot = Entities::new();
        let lead = snapshot.push(car("Lead", 100.0, 15.0, &road));
        let mut ego = car("Ego", 0.0, 10.0, &road);
        let mut action = LongitudinalDistanceAction {
            target_entity: lead,
            target: DistanceTarget::TimeGap(1.0),
            freespace: false,
            constraints: Some(DynamicConstraints {
                max_acceleration: 2.0,
                max_deceleration: 5.0,
                max_speed: 30.0,
            }),
        };
        action.step(&mut ego, &ctx(&snapshot, &road, 0.5));
        // far behind: accelerate at the limit
        assert!((ego.speed - 11.0).abs() < 1e-9);
    }
}
