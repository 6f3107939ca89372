//! The road-network collaborator.
//!
//! The scenario core never interprets road files itself. It talks to a
//! [`RoadGeometry`] implementation that maps lane coordinates to world poses
//! and back. [`StraightRoads`] is a small reference implementation made of
//! straight, constant-width roads, enough for headless runs and tests.

use std::f64::consts::PI;
use std::fmt;

use nalgebra::Vector2;

/// A position expressed in road coordinates.
///
/// Lane ids follow the usual convention: negative ids lie to the right of the
/// reference line and are driven along increasing `s`, positive ids lie to
/// the left and are driven against it. `offset` is measured from the lane
/// center, positive to the left of the reference direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LaneCoord {
    pub road_id: i32,
    pub lane_id: i32,
    pub s: f64,
    pub offset: f64,
}

impl LaneCoord {
    /// +1 when traffic in this lane moves along increasing `s`, else -1.
    pub fn driving_direction(&self) -> f64 {
        if self.lane_id > 0 { -1.0 } else { 1.0 }
    }
}

/// A world pose: position plus heading/pitch/roll in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub h: f64,
    pub p: f64,
    pub r: f64,
}

impl WorldPose {
    pub fn xy(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Unit vector along the heading.
    pub fn forward(&self) -> Vector2<f64> {
        Vector2::new(self.h.cos(), self.h.sin())
    }
}

/// Normalize an angle to `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle % (2.0 * PI);
    if a < 0.0 { a + 2.0 * PI } else { a }
}

/// Position/geometry service consumed by the scenario core.
pub trait RoadGeometry: Send + Sync + fmt::Debug {
    /// World pose of a lane coordinate. The heading is the reference line
    /// heading at `s`; callers flip it for lanes driven against `s`.
    fn lane_to_world(&self, lane: &LaneCoord) -> Option<WorldPose>;

    /// Closest lane coordinate to a world point.
    fn world_to_lane(&self, x: f64, y: f64) -> Option<LaneCoord>;

    /// Lateral position of a lane's center relative to the reference line.
    fn lane_center_t(&self, road_id: i32, lane_id: i32) -> Option<f64>;

    /// Lane containing lateral position `t`, with the offset from its center.
    fn lane_at_t(&self, road_id: i32, t: f64) -> Option<(i32, f64)>;

    fn road_length(&self, road_id: i32) -> Option<f64>;
}

/// A straight road with a constant number of constant-width lanes per side.
#[derive(Debug, Clone, PartialEq)]
pub struct StraightRoad {
    pub id: i32,
    pub origin: Vector2<f64>,
    pub heading: f64,
    pub length: f64,
    pub left_lanes: u32,
    pub right_lanes: u32,
    pub lane_width: f64,
}

impl StraightRoad {
    fn direction(&self) -> Vector2<f64> {
        Vector2::new(self.heading.cos(), self.heading.sin())
    }

    fn normal(&self) -> Vector2<f64> {
        Vector2::new(-self.heading.sin(), self.heading.cos())
    }

    fn lane_center_t(&self, lane_id: i32) -> Option<f64> {
        let w = self.lane_width;
        match lane_id {
            id if id < 0 && id.unsigned_abs() <= self.right_lanes => {
                Some(-(id.unsigned_abs() as f64 - 0.5) * w)
            }
            id if id > 0 && id.unsigned_abs() <= self.left_lanes => Some((id as f64 - 0.5) * w),
            _ => None,
        }
    }

    fn lane_at_t(&self, t: f64) -> Option<(i32, f64)> {
        let w = self.lane_width;
        let lane_id = if (t >= 0.0 && self.left_lanes > 0) || self.right_lanes == 0 {
            if self.left_lanes == 0 {
                return None;
            }
            ((t.max(0.0) / w).floor() as i64 + 1).min(self.left_lanes as i64) as i32
        } else {
            -(((-t).max(0.0) / w).floor() as i64 + 1).min(self.right_lanes as i64) as i32
        };
        let center = self.lane_center_t(lane_id)?;
        Some((lane_id, t - center))
    }

    /// Local (s, t) of a world point.
    fn local(&self, x: f64, y: f64) -> (f64, f64) {
        let d = Vector2::new(x, y) - self.origin;
        (d.dot(&self.direction()), d.dot(&self.normal()))
    }
}

/// A road network made of independent straight roads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StraightRoads {
    roads: Vec<StraightRoad>,
}

impl StraightRoads {
    pub fn new(roads: Vec<StraightRoad>) -> Self {
        Self { roads }
    }

    /// One road along the x axis starting at the origin.
    pub fn single(id: i32, length: f64, lanes_per_side: u32, lane_width: f64) -> Self {
        Self::new(vec![StraightRoad {
            id,
            origin: Vector2::zeros(),
            heading: 0.0,
            length,
            left_lanes: lanes_per_side,
            right_lanes: lanes_per_side,
            lane_width,
        }])
    }

    fn road(&self, road_id: i32) -> Option<&StraightRoad> {
        self.roads.iter().find(|r| r.id == road_id)
    }
}

impl RoadGeometry for StraightRoads {
    fn lane_to_world(&self, lane: &LaneCoord) -> Option<WorldPose> {
        let road = self.road(lane.road_id)?;
        let t = road.lane_center_t(lane.lane_id)? + lane.offset;
        let p = road.origin + road.direction() * lane.s + road.normal() * t;
        Some(WorldPose {
            x: p.x,
            y: p.y,
            z: 0.0,
            h: normalize_angle(road.heading),
            p: 0.0,
            r: 0.0,
        })
    }

    fn world_to_lane(&self, x: f64, y: f64) -> Option<LaneCoord> {
        self.roads
            .iter()
            .filter_map(|road| {
                let (s, t) = road.local(x, y);
                let (lane_id, offset) = road.lane_at_t(t)?;
                // Distance outside the road's extent along s counts against it.
                let overshoot = if s < 0.0 {
                    -s
                } else if s > road.length {
                    s - road.length
                } else {
                    0.0
                };
                let cost = offset.abs() + overshoot;
                Some((
                    cost,
                    LaneCoord {
                        road_id: road.id,
                        lane_id,
                        s,
                        offset,
                    },
                ))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, lane)| lane)
    }

    fn lane_center_t(&self, road_id: i32, lane_id: i32) -> Option<f64> {
        self.road(road_id)?.lane_center_t(lane_id)
    }

    fn lane_at_t(&self, road_id: i32, t: f64) -> Option<(i32, f64)> {
        self.road(road_id)?.lane_at_t(t)
    }

    fn road_length(&self, road_id: i32) -> Option<f64> {
        self.road(road_id).map(|r| r.length)
    }
}
