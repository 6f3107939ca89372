use log::warn;

use crate::catalog::CatalogType;
use crate::model::position::{Orientation, OrientationType, Position, RoutePosition};
use crate::model::route::{Route, RouteStrategy, Waypoint};
use crate::road::WorldPose;
use crate::xml::errors::{ParseError, ParseResult};
use crate::xml::node::XmlNode;
use crate::xml::reader::ScenarioReader;

const ENTITY_KEYS: &[&str] = &["entityRef", "object"];

impl ScenarioReader<'_> {
    /// Read a position wrapper element: its single child names the kind.
    pub(crate) fn read_position(&mut self, node: &XmlNode) -> ParseResult<Position> {
        let child = node
            .first_child()
            .ok_or_else(|| ParseError::Position(format!("{} has no position", node.name())))?;

        let position = match child.name() {
            "World" | "WorldPosition" => Position::World(WorldPose {
                x: self.f64_or(child, "x", 0.0)?,
                y: self.f64_or(child, "y", 0.0)?,
                z: self.f64_or(child, "z", 0.0)?,
                h: self.f64_or(child, "h", 0.0)?,
                p: self.f64_or(child, "p", 0.0)?,
                r: self.f64_or(child, "r", 0.0)?,
            }),
            "RelativeWorld" | "RelativeWorldPosition" => Position::RelativeWorld {
                entity: self.entity_ref(child, ENTITY_KEYS)?,
                dx: self.f64_or(child, "dx", 0.0)?,
                dy: self.f64_or(child, "dy", 0.0)?,
                dz: self.f64_or(child, "dz", 0.0)?,
                orientation: self.read_orientation(child)?,
            },
            "RelativeObject" | "RelativeObjectPosition" => Position::RelativeObject {
                entity: self.entity_ref(child, ENTITY_KEYS)?,
                dx: self.f64_or(child, "dx", 0.0)?,
                dy: self.f64_or(child, "dy", 0.0)?,
                dz: self.f64_or(child, "dz", 0.0)?,
                orientation: self.read_orientation(child)?,
            },
            "Lane" | "LanePosition" => Position::Lane {
                road_id: self.req_i32(child, "roadId")?,
                lane_id: self.req_i32(child, "laneId")?,
                s: self.req_f64(child, "s")?,
                offset: self.f64_or(child, "offset", 0.0)?,
                orientation: self.read_orientation(child)?,
            },
            "RelativeLane" | "RelativeLanePosition" => Position::RelativeLane {
                entity: self.entity_ref(child, ENTITY_KEYS)?,
                d_lane: self.req_i32(child, "dLane")?,
                ds: self.f64_or(child, "ds", 0.0)?,
                offset: self.f64_or(child, "offset", 0.0)?,
                orientation: self.read_orientation(child)?,
            },
            "Route" | "RoutePosition" => Position::Route(Box::new(self.read_route_position(child)?)),
            other => {
                return Err(ParseError::Position(format!("unsupported position type {}", other)));
            }
        };
        Ok(position)
    }

    fn read_orientation(&self, node: &XmlNode) -> ParseResult<Option<Orientation>> {
        let Some(orientation) = node.child("Orientation") else {
            return Ok(None);
        };
        Ok(Some(Orientation {
            h: self.f64_or(orientation, "h", 0.0)?,
            p: self.f64_or(orientation, "p", 0.0)?,
            r: self.f64_or(orientation, "r", 0.0)?,
            kind: self.enum_or(orientation, &["type"], OrientationType::Absolute)?,
        }))
    }

    fn read_route_position(&mut self, node: &XmlNode) -> ParseResult<RoutePosition> {
        let route_ref = node
            .child("RouteRef")
            .ok_or_else(|| ParseError::MissingElement("RouteRef".to_string()))?;
        let route = self.read_route_ref(route_ref)?;
        let orientation = self.read_orientation(node)?;

        let in_route = node
            .descend(&["InRoutePosition", "FromLaneCoordinates"])
            .or_else(|| node.descend(&["Position", "LaneCoord"]))
            .ok_or_else(|| ParseError::Position("route position without lane coordinates".to_string()))?;

        Ok(RoutePosition {
            route,
            path_s: self.req_f64(in_route, "pathS")?,
            lane_id: self.req_i32(in_route, "laneId")?,
            lane_offset: self.f64_or(in_route, "laneOffset", 0.0)?,
            orientation,
        })
    }

    /// Read an element holding either an inline `Route` or a route
    /// `CatalogReference`.
    pub(crate) fn read_route_ref(&mut self, node: &XmlNode) -> ParseResult<Route> {
        if let Some(route) = node.child("Route") {
            return self.scoped(|r| r.read_route(route));
        }
        let reference = node
            .child("CatalogReference")
            .ok_or_else(|| ParseError::MissingElement(format!("{}/Route", node.name())))?;
        self.resolve_catalog_reference(reference, |reader, entry_name, entry| match entry {
            Some(entry) if entry.catalog_type == CatalogType::Route => reader.read_route(&entry.node),
            Some(entry) => Err(ParseError::Catalog(format!(
                "entry {} is a {}, expected a route",
                entry_name, entry.catalog_type
            ))),
            None => Err(ParseError::Catalog(format!("route {} not found", entry_name))),
        })
    }

    fn read_route(&mut self, node: &XmlNode) -> ParseResult<Route> {
        if let Some(decls) = node.child("ParameterDeclarations") {
            self.declare_parameters(decls)?;
        }
        let name = self.req_attr(node, "name")?;
        let closed = self.bool_or(node, "closed", false)?;

        let mut waypoints = Vec::new();
        for waypoint in node.children_named("Waypoint") {
            let strategy = self.enum_or(waypoint, &["routeStrategy", "strategy"], RouteStrategy::Shortest)?;
            let position = waypoint
                .child("Position")
                .ok_or_else(|| ParseError::MissingElement("Waypoint/Position".to_string()))?;
            waypoints.push(Waypoint {
                position: self.read_position(position)?,
                strategy,
            });
        }
        if waypoints.len() < 2 {
            warn!("Route {} has {} waypoint(s), expected at least 2", name, waypoints.len());
        }

        Ok(Route {
            name,
            closed,
            waypoints,
        })
    }
}
