//! Routes: ordered waypoint sequences an entity can be told to follow.

use std::str::FromStr;

use itertools::Itertools;
use nalgebra::Vector2;

use crate::model::entity::Entities;
use crate::model::position::Position;
use crate::road::{LaneCoord, RoadGeometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteStrategy {
    #[default]
    Fastest,
    Shortest,
    LeastIntersections,
    Random,
}

impl FromStr for RouteStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fastest" => Ok(RouteStrategy::Fastest),
            "shortest" => Ok(RouteStrategy::Shortest),
            "leastIntersections" => Ok(RouteStrategy::LeastIntersections),
            "random" => Ok(RouteStrategy::Random),
            other => Err(format!("unknown route strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub position: Position,
    pub strategy: RouteStrategy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub name: String,
    pub closed: bool,
    pub waypoints: Vec<Waypoint>,
}

impl Route {
    /// World points of the waypoints, skipping any that do not resolve.
    fn path(&self, entities: &Entities, road: &dyn RoadGeometry) -> Vec<Vector2<f64>> {
        let mut points: Vec<_> = self
            .waypoints
            .iter()
            .filter_map(|wp| wp.position.resolve(entities, road))
            .map(|resolved| resolved.pose.xy())
            .collect();
        if self.closed && let Some(first) = points.first().copied() {
            points.push(first);
        }
        points
    }

    /// Polyline length through the waypoints.
    pub fn length(&self, entities: &Entities, road: &dyn RoadGeometry) -> f64 {
        self.path(entities, road)
            .iter()
            .tuple_windows()
            .map(|(a, b)| (b - a).norm())
            .sum()
    }

    /// Distance along the route of the point on it closest to `point`.
    pub fn path_s_of(
        &self,
        point: Vector2<f64>,
        entities: &Entities,
        road: &dyn RoadGeometry,
    ) -> Option<f64> {
        let path = self.path(entities, road);
        let mut travelled = 0.0;
        let mut best: Option<(f64, f64)> = None;
        for (a, b) in path.iter().tuple_windows() {
            let segment = b - a;
            let len = segment.norm();
            if len <= f64::EPSILON {
                continue;
            }
            let along = ((point - a).dot(&segment) / len).clamp(0.0, len);
            let distance = (a + segment * (along / len) - point).norm();
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, travelled + along));
            }
            travelled += len;
        }
        best.map(|(_, s)| s)
    }

    /// Lane coordinate at `path_s` along the route, on `lane_id`.
    pub fn lane_coord_at(
        &self,
        path_s: f64,
        lane_id: i32,
        lane_offset: f64,
        entities: &Entities,
        road: &dyn RoadGeometry,
    ) -> Option<LaneCoord> {
        let path = self.path(entities, road);
        let mut remaining = path_s.max(0.0);
        let mut point = *path.first()?;
        for (a, b) in path.iter().tuple_windows() {
            let len = (b - a).norm();
            if remaining <= len {
                point = if len > 0.0 { a + (b - a) * (remaining / len) } else { *a };
                remaining = 0.0;
                break;
            }
            remaining -= len;
            point = *b;
        }
        let on_road = road.world_to_lane(point.x, point.y)?;
        Some(LaneCoord {
            road_id: on_road.road_id,
            lane_id,
            s: on_road.s,
            offset: lane_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::StraightRoads;

    fn lane_waypoint(s: f64) -> Waypoint {
        Waypoint {
            position: Position::Lane {
                road_id: 0,
                lane_id: -1,
                s,
                offset: 0.0,
                orientation: None,
            },
            strategy: RouteStrategy::Shortest,
        }
    }

    fn route() -> Route {
        Route {
            name: "straight".to_string(),
            closed: false,
            waypoints: vec![lane_waypoint(10.0), lane_waypoint(60.0), lane_waypoint(110.0)],
        }
    }

    #[test]
    fn test_length() {
        let road = StraightRoads::single(0, 500.0, 1, 3.5);
        assert!((route().length(&Entities::new(), &road) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_lane_coord_at() {
        let road = StraightRoads::single(0, 500.0, 1, 3.5);
        let lane = route()
            .lane_coord_at(75.0, 1, 0.2, &Entities::new(), &road)
            .unwrap();
        assert_eq!(lane.lane_id, 1);
        assert!((lane.s - 85.0).abs() < 1e-9);
        assert_eq!(lane.offset, 0.2);
    }

    #[test]
    fn test_path_s_of() {
        let road = StraightRoads::single(0, 500.0, 1, 3.5);
        let s = route()
            .path_s_of(Vector2::new(40.0, 3.0), &Entities::new(), &road)
            .unwrap();
        assert!((s - 30.0).abs() < 1e-9);
    }
}
