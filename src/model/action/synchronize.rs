//! Arrive at a target position at the same time as a master entity.

use log::{debug, warn};

use crate::core::EntityId;
use crate::model::action::longitudinal::RelativeValueType;
use crate::model::action::{Progress, StepContext};
use crate::model::condition::SMALL_NUMBER;
use crate::model::entity::Entity;
use crate::model::position::Position;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FinalSpeed {
    Absolute(f64),
    RelativeToMaster {
        value: f64,
        value_type: RelativeValueType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynchronizeAction {
    pub master: EntityId,
    pub master_target: Position,
    pub target: Position,
    pub final_speed: Option<FinalSpeed>,
}

impl SynchronizeAction {
    /// Each tick the owner's speed is set so that it covers its remaining
    /// distance in the master's remaining time: with a final speed, along a
    /// linear ramp ending at that speed; otherwise at constant acceleration.
    pub(crate) fn step(&mut self, entity: &mut Entity, ctx: &StepContext<'_>) -> Progress {
        let Some(master) = ctx.snapshot.get(self.master) else {
            warn!("{}: synchronize master {} missing", entity.name, self.master);
            return Progress::Done;
        };
        let (Some(master_target), Some(own_target)) = (
            self.master_target.resolve(ctx.snapshot, ctx.road),
            self.target.resolve(ctx.snapshot, ctx.road),
        ) else {
            warn!("{}: synchronize target positions cannot be resolved", entity.name);
            return Progress::Done;
        };

        let final_speed = self.final_speed.map(|fs| match fs {
            FinalSpeed::Absolute(speed) => speed,
            FinalSpeed::RelativeToMaster { value, value_type } => value_type.apply(master.speed, value),
        });

        let own_distance = (own_target.pose.xy() - entity.pose.xy()).dot(&entity.pose.forward());
        if own_distance <= 0.0 {
            debug!("{}: reached synchronize target", entity.name);
            if let Some(speed) = final_speed {
                entity.speed = speed;
            }
            return Progress::Done;
        }

        let master_distance = (master_target.pose.xy() - master.pose.xy()).dot(&master.pose.forward());
        if master_distance <= 0.0 {
            warn!("{}: synchronize master passed its target first", entity.name);
            if let Some(speed) = final_speed {
                entity.speed = speed;
            }
            return Progress::Done;
        }
        if master.speed.abs() < SMALL_NUMBER {
            // master standing still: no arrival time to aim for yet
            return Progress::Running;
        }

        let time_left = master_distance / master.speed.abs();
        entity.speed = match final_speed {
            Some(final_speed) => 2.0 * own_distance / time_left - final_speed,
            None => {
                let acceleration = 2.0 * (own_distance - entity.speed * time_left) / (time_left * time_left);
                entity.speed + acceleration * ctx.dt
            }
        }
        .max(0.0);

        Progress::Running
    }
}
