//! Simulated entities and the table that owns them.
//!
//! Cross references between entities (targets, masters, triggering entities)
//! are stored as [`EntityId`]s into [`Entities`], never as shared ownership.

use std::f64::consts::PI;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use log::warn;

use crate::core::EntityId;
use crate::model::route::Route;
use crate::road::{LaneCoord, RoadGeometry, WorldPose, normalize_angle};

/// Suffix naming the internally simulated shadow of a hybrid entity.
pub const GHOST_SUFFIX: &str = "_ghost";

/// Default wheel radius used to integrate wheel rotation.
pub const WHEEL_RADIUS: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCategory {
    Car,
    Van,
    Truck,
    Trailer,
    Semitrailer,
    Bus,
    Motorbike,
    Bicycle,
    Train,
    Tram,
}

impl FromStr for VehicleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "car" => Ok(VehicleCategory::Car),
            "van" => Ok(VehicleCategory::Van),
            "truck" => Ok(VehicleCategory::Truck),
            "trailer" => Ok(VehicleCategory::Trailer),
            "semitrailer" => Ok(VehicleCategory::Semitrailer),
            "bus" => Ok(VehicleCategory::Bus),
            "motorbike" => Ok(VehicleCategory::Motorbike),
            "bicycle" => Ok(VehicleCategory::Bicycle),
            "train" => Ok(VehicleCategory::Train),
            "tram" => Ok(VehicleCategory::Tram),
            other => Err(format!("unknown vehicle category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Vehicle(VehicleCategory),
    Pedestrian,
    Misc,
}

/// Who drives an entity's pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// The scenario engine (default kinematics and actions).
    Internal,
    /// External input only.
    External,
    /// Scenario-driven shadow of a hybrid entity.
    HybridGhost,
    /// The externally driven half of a hybrid pair.
    HybridExternal,
    Undefined,
}

impl Control {
    pub fn is_external(self) -> bool {
        matches!(self, Control::External | Control::HybridExternal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            length: 4.5,
            width: 1.8,
            height: 1.5,
        }
    }
}

/// Which parts of the internal kinematics are engaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Autonomy {
    /// Advance along the path by `speed * dt`.
    pub longitudinal: bool,
    /// Follow the road; when off, move straight along the heading.
    pub lateral: bool,
}

impl Default for Autonomy {
    fn default() -> Self {
        Self {
            longitudinal: true,
            lateral: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    /// Name of the vehicle/pedestrian definition (catalog entry name).
    pub definition_name: String,
    pub category: Category,
    pub control: Control,
    pub model_id: i32,
    pub model_filepath: String,
    pub bounding_box: BoundingBox,
    pub pose: WorldPose,
    /// Road coordinates, when the entity is on a known road.
    pub lane: Option<LaneCoord>,
    pub speed: f64,
    pub wheel_angle: f64,
    pub wheel_rotation: f64,
    /// The `<name>_ghost` partner of a hybrid entity.
    pub ghost: Option<EntityId>,
    pub route: Option<Route>,
    pub autonomy: Autonomy,
    /// Pose was set explicitly this tick; skip default kinematics.
    pub(crate) pose_locked: bool,
}

impl Entity {
    pub fn new(name: &str, category: Category, control: Control) -> Self {
        Self {
            id: EntityId(0),
            name: name.to_string(),
            definition_name: name.to_string(),
            category,
            control,
            model_id: -1,
            model_filepath: String::new(),
            bounding_box: BoundingBox::default(),
            pose: WorldPose::default(),
            lane: None,
            speed: 0.0,
            wheel_angle: 0.0,
            wheel_rotation: 0.0,
            ghost: None,
            route: None,
            autonomy: Autonomy::default(),
            pose_locked: false,
        }
    }

    /// Place the entity on a lane. `heading` overrides the lane heading.
    pub fn set_lane_position(
        &mut self,
        lane: LaneCoord,
        heading: Option<f64>,
        road: &dyn RoadGeometry,
    ) -> bool {
        let Some(mut pose) = road.lane_to_world(&lane) else {
            warn!(
                "{}: lane position road {} lane {} s {:.2} is not on the road network",
                self.name, lane.road_id, lane.lane_id, lane.s
            );
            return false;
        };
        pose.h = match heading {
            Some(h) => normalize_angle(h),
            None => lane_heading(pose.h, lane.lane_id),
        };
        self.pose = pose;
        self.lane = Some(lane);
        true
    }

    /// Place the entity at a world pose and re-derive its road coordinates.
    pub fn set_world_pose(&mut self, pose: WorldPose, road: &dyn RoadGeometry) {
        self.pose = pose;
        self.lane = road.world_to_lane(pose.x, pose.y);
    }

    /// Lateral position relative to the road reference line.
    pub fn lateral_t(&self, road: &dyn RoadGeometry) -> Option<f64> {
        let lane = self.lane?;
        Some(road.lane_center_t(lane.road_id, lane.lane_id)? + lane.offset)
    }

    /// Move laterally to reference-line position `t`, keeping `s`.
    pub fn set_lateral_t(&mut self, t: f64, road: &dyn RoadGeometry) -> bool {
        let Some(lane) = self.lane else {
            return false;
        };
        let Some((lane_id, offset)) = road.lane_at_t(lane.road_id, t) else {
            return false;
        };
        let heading = self.pose.h;
        let target = LaneCoord {
            lane_id,
            offset,
            ..lane
        };
        self.set_lane_position(target, Some(heading), road)
    }

    /// Default kinematics for one tick.
    pub fn advance(&mut self, dt: f64, road: &dyn RoadGeometry) {
        let distance = self.speed * dt;
        self.wheel_rotation = (self.wheel_rotation + distance / WHEEL_RADIUS) % (2.0 * PI);

        if !self.autonomy.longitudinal || distance == 0.0 {
            return;
        }

        match self.lane {
            Some(lane) if self.autonomy.lateral => {
                let moved = LaneCoord {
                    s: lane.s + distance * lane.driving_direction(),
                    ..lane
                };
                let heading = lane_heading_or_keep(self.pose.h, lane.lane_id, road, &moved);
                self.set_lane_position(moved, Some(heading), road);
            }
            _ => {
                let forward = self.pose.forward() * distance;
                let pose = WorldPose {
                    x: self.pose.x + forward.x,
                    y: self.pose.y + forward.y,
                    ..self.pose
                };
                self.set_world_pose(pose, road);
            }
        }
    }

    /// Signed distance from `self` to `other` along `self`'s heading.
    pub fn longitudinal_distance_to(&self, other: &Entity) -> f64 {
        (other.pose.xy() - self.pose.xy()).dot(&self.pose.forward())
    }

    /// Signed lateral distance from `self` to `other`, positive to the left.
    pub fn lateral_distance_to(&self, other: &Entity) -> f64 {
        let f = self.pose.forward();
        let left = nalgebra::Vector2::new(-f.y, f.x);
        (other.pose.xy() - self.pose.xy()).dot(&left)
    }

    pub fn euclidean_distance_to(&self, other: &Entity) -> f64 {
        (other.pose.xy() - self.pose.xy()).norm()
    }
}

/// Heading of traffic in a lane given the reference line heading.
pub fn lane_heading(road_heading: f64, lane_id: i32) -> f64 {
    if lane_id > 0 {
        normalize_angle(road_heading + PI)
    } else {
        normalize_angle(road_heading)
    }
}

/// Keep a deliberately set heading offset relative to the road when moving.
fn lane_heading_or_keep(
    current: f64,
    lane_id: i32,
    road: &dyn RoadGeometry,
    lane: &LaneCoord,
) -> f64 {
    match road.lane_to_world(lane) {
        Some(pose) => {
            let base = lane_heading(pose.h, lane_id);
            let relative = normalize_angle(current - base);
            normalize_angle(base + relative)
        }
        None => current,
    }
}

/// The fixed entity set of a scenario, indexed by [`EntityId`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    objects: Vec<Entity>,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entity, assigning the next id in first-seen order.
    pub fn push(&mut self, mut entity: Entity) -> EntityId {
        let id = EntityId(self.objects.len() as u32);
        entity.id = id;
        self.objects.push(entity);
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.objects.get(id.index())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.objects.get_mut(id.index())
    }

    /// Exact name match.
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.objects.iter().find(|e| e.name == name).map(|e| e.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.objects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Index<EntityId> for Entities {
    type Output = Entity;

    fn index(&self, id: EntityId) -> &Entity {
        &self.objects[id.index()]
    }
}

impl IndexMut<EntityId> for Entities {
    fn index_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.objects[id.index()]
    }
}
