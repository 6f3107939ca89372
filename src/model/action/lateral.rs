//! Lane change and lane offset actions.

use log::{debug, warn};

use crate::core::EntityId;
use crate::model::action::dynamics::{DynamicsDimension, DynamicsShape, Transition, TransitionDynamics};
use crate::model::action::{Progress, StepContext};
use crate::model::condition::SMALL_NUMBER;
use crate::model::entity::Entity;
use crate::model::position::offset_lane;
use crate::road::LaneCoord;

/// Steering angle limit used for the cosmetic wheel angle.
const MAX_WHEEL_ANGLE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LaneChangeTarget {
    Absolute(i32),
    /// Lane-count delta from another entity's lane.
    Relative { entity: EntityId, value: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaneChangeAction {
    pub target: LaneChangeTarget,
    /// Offset from the target lane center to end up at.
    pub target_lane_offset: f64,
    pub dynamics: TransitionDynamics,
    transition: Option<Transition>,
}

impl LaneChangeAction {
    pub fn new(target: LaneChangeTarget, target_lane_offset: f64, dynamics: TransitionDynamics) -> Self {
        Self {
            target,
            target_lane_offset,
            dynamics,
            transition: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.transition = None;
    }

    fn start(&self, entity: &Entity, ctx: &StepContext<'_>) -> Option<Transition> {
        let lane = entity.lane?;
        let target_lane = match self.target {
            LaneChangeTarget::Absolute(id) => id,
            LaneChangeTarget::Relative { entity: reference, value } => {
                let reference_lane = ctx.snapshot.get(reference)?.lane?;
                offset_lane(reference_lane.lane_id, value)
            }
        };
        let start_t = entity.lateral_t(ctx.road)?;
        let target_t = ctx.road.lane_center_t(lane.road_id, target_lane)? + self.target_lane_offset;

        let distance = (target_t - start_t).abs();
        let value = self.dynamics.value;
        let duration = match (self.dynamics.shape, self.dynamics.dimension) {
            (DynamicsShape::Step, _) => 0.0,
            (_, DynamicsDimension::Time) => value,
            (_, DynamicsDimension::Distance) if entity.speed.abs() > SMALL_NUMBER => {
                value / entity.speed.abs()
            }
            (_, DynamicsDimension::Rate) if value.abs() > SMALL_NUMBER => distance / value.abs(),
            _ => 0.0,
        };
        debug!(
            "{}: lane change {} -> {} over {:.2} s",
            entity.name, lane.lane_id, target_lane, duration
        );
        Some(Transition::new(start_t, target_t, duration))
    }

    pub(crate) fn step(&mut self, entity: &mut Entity, ctx: &StepContext<'_>) -> Progress {
        if self.transition.is_none() {
            match self.start(entity, ctx) {
                Some(transition) => self.transition = Some(transition),
                None => {
                    warn!("{}: lane change target cannot be resolved on the road", entity.name);
                    return Progress::Done;
                }
            }
        }
        let Some(transition) = self.transition.as_mut() else {
            return Progress::Done;
        };

        let previous = transition.value(self.dynamics.shape);
        transition.advance(ctx.dt);
        let t = transition.value(self.dynamics.shape);
        entity.set_lateral_t(t, ctx.road);
        entity.wheel_angle = wheel_angle(t - previous, entity.speed * ctx.dt);

        if transition.is_done() {
            entity.wheel_angle = 0.0;
            Progress::Done
        } else {
            Progress::Running
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LaneOffsetTarget {
    Absolute(f64),
    Relative { entity: EntityId, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaneOffsetAction {
    pub target: LaneOffsetTarget,
    pub shape: DynamicsShape,
    pub max_lateral_acc: Option<f64>,
    pub duration: Option<f64>,
    transition: Option<Transition>,
}

impl LaneOffsetAction {
    pub fn new(
        target: LaneOffsetTarget,
        shape: DynamicsShape,
        max_lateral_acc: Option<f64>,
        duration: Option<f64>,
    ) -> Self {
        Self {
            target,
            shape,
            max_lateral_acc,
            duration,
            transition: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.transition = None;
    }

    fn start(&self, entity: &Entity, ctx: &StepContext<'_>) -> Option<Transition> {
        let start = entity.lane?.offset;
        let target = match self.target {
            LaneOffsetTarget::Absolute(offset) => offset,
            LaneOffsetTarget::Relative { entity: reference, value } => {
                ctx.snapshot.get(reference)?.lane?.offset + value
            }
        };
        let distance = (target - start).abs();
        let duration = match (self.duration, self.max_lateral_acc) {
            _ if self.shape == DynamicsShape::Step => 0.0,
            (Some(duration), _) => duration,
            (None, Some(acc)) if acc.abs() > SMALL_NUMBER => 2.0 * (distance / acc.abs()).sqrt(),
            _ => 0.0,
        };
        Some(Transition::new(start, target, duration))
    }

    pub(crate) fn step(&mut self, entity: &mut Entity, ctx: &StepContext<'_>) -> Progress {
        if self.transition.is_none() {
            match self.start(entity, ctx) {
                Some(transition) => self.transition = Some(transition),
                None => {
                    warn!("{}: lane offset needs a road position", entity.name);
                    return Progress::Done;
                }
            }
        }
        let (Some(transition), Some(lane)) = (self.transition.as_mut(), entity.lane) else {
            return Progress::Done;
        };

        let previous = transition.value(self.shape);
        transition.advance(ctx.dt);
        let offset = transition.value(self.shape);
        let heading = entity.pose.h;
        entity.set_lane_position(LaneCoord { offset, ..lane }, Some(heading), ctx.road);
        entity.wheel_angle = wheel_angle(offset - previous, entity.speed * ctx.dt);

        if transition.is_done() {
            entity.wheel_angle = 0.0;
            Progress::Done
        } else {
            Progress::Running
        }
    }
}

fn wheel_angle(lateral: f64, longitudinal: f64) -> f64 {
    if longitudinal.abs() < SMALL_NUMBER {
        return 0.0;
    }
    (lateral / longitudinal).atan().clamp(-MAX_WHEEL_ANGLE, MAX_WHEEL_ANGLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::{Category, Control, Entities, VehicleCategory};
    use crate::road::StraightRoads;

    fn ego(road: &StraightRoads) -> Entity {
        let mut e = Entity::new("Ego", Category::Vehicle(VehicleCategory::Car), Control::Internal);
        e.set_lane_position(LaneCoord { road_id: 0, lane_id: -1, s: 20.0, offset: 0.0 }, None, road);
        e.speed = 10.0;
        e
    }

    #[test]
    fn test_lane_change_over_time() {
        let road = StraightRoads::single(0, 1000.0, 2, 3.5);
        let snapshot = Entities::new();
        let ctx = StepContext {
            dt: 0.5,
            simulation_time: 0.0,
            snapshot: &snapshot,
            road: &road,
        };
        let mut e = ego(&road);
        let mut action = LaneChangeAction::new(
            LaneChangeTarget::Absolute(-2),
            0.0,
            TransitionDynamics {
                shape: DynamicsShape::Linear,
                dimension: DynamicsDimension::Time,
                value: 1.0,
            },
        );
        assert_eq!(action.step(&mut e, &ctx), Progress::Running);
        assert!((e.pose.y - -3.5).abs() < 1e-9);
        assert!(e.wheel_angle < 0.0);
        assert_eq!(action.step(&mut e, &ctx), Progress::Done);
        let lane = e.lane.unwrap();
        assert_eq!(lane.lane_id, -2);
        assert!(lane.offset.abs() < 1e-9);
        assert_eq!(e.wheel_angle, 0.0);
    }

    #[test]
    fn test_relative_lane_change_target() {
        let road = StraightRoads::single(0, 1000.0, 2, 3.5);
        let mut snapshot = Entities::new();
        let reference = snapshot.push(ego(&road));
        let ctx = StepContext {
            dt: 0.1,
            simulation_time: 0.0,
            snapshot: &snapshot,
            road: &road,
        };
        let mut e = ego(&road);
        let mut action = LaneChangeAction::new(
            LaneChangeTarget::Relative { entity: reference, value: 1 },
            0.0,
            TransitionDynamics {
                shape: DynamicsShape::Step,
                ..TransitionDynamics::default()
            },
        );
        assert_eq!(action.step(&mut e, &ctx), Progress::Done);
        // -1 + 1 skips the reference line
        assert_eq!(e.lane.unwrap().lane_id, 1);
    }

    #[test]
    fn test_lane_offset_from_lateral_acceleration() {
        let road = StraightRoads::single(0, 1000.0, 2, 3.5);
        let snapshot = Entities::new();
        let ctx = StepContext {
            dt: 0.1,
            simulation_time: 0.0,
            snapshot: &snapshot,
            road: &road,
        };
        let mut e = ego(&road);
        // 0.5 m at 0.5 m/s² takes 2 s
        let mut action = LaneOffsetAction::new(LaneOffsetTarget::Absolute(0.5), DynamicsShape::Sinusoidal, Some(0.5), None);
        let mut ticks = 1;
        while action.step(&mut e, &ctx) == Progress::Running {
            ticks += 1;
        }
        assert_eq!(ticks, 20);
        assert!((e.lane.unwrap().offset - 0.5).abs() < 1e-9);
        assert_eq!(e.lane.unwrap().lane_id, -1);
    }
}
