//! Parsed positions and their resolution to world poses.

use std::str::FromStr;

use nalgebra::{Rotation2, Vector2};

use crate::core::EntityId;
use crate::model::entity::{Entities, lane_heading};
use crate::model::route::Route;
use crate::road::{LaneCoord, RoadGeometry, WorldPose, normalize_angle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientationType {
    /// Relative to the road (lane positions) or to the reference entity.
    Relative,
    #[default]
    Absolute,
}

impl FromStr for OrientationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relative" => Ok(OrientationType::Relative),
            "absolute" => Ok(OrientationType::Absolute),
            other => Err(format!("unknown orientation type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    pub h: f64,
    pub p: f64,
    pub r: f64,
    pub kind: OrientationType,
}

impl Orientation {
    /// Heading given the heading `base` it may be relative to.
    fn heading(&self, base: f64) -> f64 {
        match self.kind {
            OrientationType::Relative => normalize_angle(base + self.h),
            OrientationType::Absolute => normalize_angle(self.h),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutePosition {
    pub route: Route,
    /// Distance along the route path.
    pub path_s: f64,
    pub lane_id: i32,
    pub lane_offset: f64,
    pub orientation: Option<Orientation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Position {
    World(WorldPose),
    /// Offset in world axes from an entity.
    RelativeWorld {
        entity: EntityId,
        dx: f64,
        dy: f64,
        dz: f64,
        orientation: Option<Orientation>,
    },
    /// Offset in the entity's own frame.
    RelativeObject {
        entity: EntityId,
        dx: f64,
        dy: f64,
        dz: f64,
        orientation: Option<Orientation>,
    },
    Lane {
        road_id: i32,
        lane_id: i32,
        s: f64,
        offset: f64,
        orientation: Option<Orientation>,
    },
    /// Lane-count and `s` offsets from an entity's current lane.
    RelativeLane {
        entity: EntityId,
        d_lane: i32,
        ds: f64,
        offset: f64,
        orientation: Option<Orientation>,
    },
    Route(Box<RoutePosition>),
}

/// A world pose plus road coordinates when the pose is on a road.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPosition {
    pub pose: WorldPose,
    pub lane: Option<LaneCoord>,
}

/// Apply a lane-count delta, skipping the reference line (lane 0).
pub fn offset_lane(lane_id: i32, delta: i32) -> i32 {
    let mut id = lane_id + delta;
    if lane_id < 0 && id >= 0 {
        id += 1;
    } else if lane_id > 0 && id <= 0 {
        id -= 1;
    }
    id
}

impl Position {
    pub fn resolve(&self, entities: &Entities, road: &dyn RoadGeometry) -> Option<ResolvedPosition> {
        match self {
            Position::World(pose) => Some(ResolvedPosition {
                pose: *pose,
                lane: road.world_to_lane(pose.x, pose.y),
            }),
            Position::RelativeWorld {
                entity,
                dx,
                dy,
                dz,
                orientation,
            } => {
                let reference = entities.get(*entity)?.pose;
                let pose = WorldPose {
                    x: reference.x + dx,
                    y: reference.y + dy,
                    z: reference.z + dz,
                    h: orientation.map_or(reference.h, |o| o.heading(reference.h)),
                    ..reference
                };
                Some(ResolvedPosition {
                    pose,
                    lane: road.world_to_lane(pose.x, pose.y),
                })
            }
            Position::RelativeObject {
                entity,
                dx,
                dy,
                dz,
                orientation,
            } => {
                let reference = entities.get(*entity)?.pose;
                let offset = Rotation2::new(reference.h) * Vector2::new(*dx, *dy);
                let pose = WorldPose {
                    x: reference.x + offset.x,
                    y: reference.y + offset.y,
                    z: reference.z + dz,
                    h: orientation.map_or(reference.h, |o| o.heading(reference.h)),
                    ..reference
                };
                Some(ResolvedPosition {
                    pose,
                    lane: road.world_to_lane(pose.x, pose.y),
                })
            }
            Position::Lane {
                road_id,
                lane_id,
                s,
                offset,
                orientation,
            } => resolve_lane(
                LaneCoord {
                    road_id: *road_id,
                    lane_id: *lane_id,
                    s: *s,
                    offset: *offset,
                },
                *orientation,
                road,
            ),
            Position::RelativeLane {
                entity,
                d_lane,
                ds,
                offset,
                orientation,
            } => {
                let reference = entities.get(*entity)?.lane?;
                let lane = LaneCoord {
                    road_id: reference.road_id,
                    lane_id: offset_lane(reference.lane_id, *d_lane),
                    s: reference.s + ds,
                    offset: *offset,
                };
                resolve_lane(lane, *orientation, road)
            }
            Position::Route(route_position) => {
                let lane = route_position.route.lane_coord_at(
                    route_position.path_s,
                    route_position.lane_id,
                    route_position.lane_offset,
                    entities,
                    road,
                )?;
                resolve_lane(lane, route_position.orientation, road)
            }
        }
    }
}

fn resolve_lane(
    lane: LaneCoord,
    orientation: Option<Orientation>,
    road: &dyn RoadGeometry,
) -> Option<ResolvedPosition> {
    let mut pose = road.lane_to_world(&lane)?;
    let base = lane_heading(pose.h, lane.lane_id);
    pose.h = match orientation {
        Some(o) if o.kind == OrientationType::Relative => normalize_angle(base + o.h),
        Some(o) => normalize_angle(o.h),
        None => base,
    };
    if let Some(o) = orientation {
        pose.p = o.p;
        pose.r = o.r;
    }
    Some(ResolvedPosition {
        pose,
        lane: Some(lane),
    })
}
