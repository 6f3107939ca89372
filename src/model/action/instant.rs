//! Actions that take effect in a single step.

use std::str::FromStr;

use log::{debug, warn};

use crate::model::action::StepContext;
use crate::model::entity::Entity;
use crate::model::position::Position;
use crate::model::route::Route;

#[derive(Debug, Clone, PartialEq)]
pub struct TeleportAction {
    pub position: Position,
}

impl TeleportAction {
    pub(crate) fn apply(&self, entity: &mut Entity, ctx: &StepContext<'_>) {
        let Some(resolved) = self.position.resolve(ctx.snapshot, ctx.road) else {
            warn!("{}: teleport position cannot be resolved", entity.name);
            return;
        };
        entity.pose = resolved.pose;
        entity.lane = resolved.lane;
        entity.pose_locked = true;
        debug!(
            "{}: teleported to ({:.2}, {:.2}) h {:.3}",
            entity.name, entity.pose.x, entity.pose.y, entity.pose.h
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignRouteAction {
    pub route: Route,
}

impl AssignRouteAction {
    pub(crate) fn apply(&self, entity: &mut Entity) {
        debug!("{}: assigned route {}", entity.name, self.route.name);
        entity.route = Some(self.route.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutonomyDomain {
    Longitudinal,
    Lateral,
    Both,
}

impl FromStr for AutonomyDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "longitudinal" => Ok(AutonomyDomain::Longitudinal),
            "lateral" => Ok(AutonomyDomain::Lateral),
            "both" => Ok(AutonomyDomain::Both),
            other => Err(format!("invalid autonomous domain '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutonomousAction {
    pub activate: bool,
    pub domain: AutonomyDomain,
}

impl AutonomousAction {
    pub(crate) fn apply(&self, entity: &mut Entity) {
        if matches!(self.domain, AutonomyDomain::Longitudinal | AutonomyDomain::Both) {
            entity.autonomy.longitudinal = self.activate;
        }
        if matches!(self.domain, AutonomyDomain::Lateral | AutonomyDomain::Both) {
            entity.autonomy.lateral = self.activate;
        }
        debug!("{}: autonomy {:?}", entity.name, entity.autonomy);
    }
}
