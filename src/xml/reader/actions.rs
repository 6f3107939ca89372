use log::{debug, warn};

use crate::core::EntityId;
use crate::model::action::{
    Action, ActionKind, AssignRouteAction, AutonomousAction, AutonomyDomain, DistanceTarget, DynamicConstraints,
    DynamicsDimension, DynamicsShape, FinalSpeed, GlobalAction, LaneChangeAction, LaneChangeTarget, LaneOffsetAction,
    LaneOffsetTarget, LongitudinalDistanceAction, PrivateAction, RelativeValueType, SpeedAction, SpeedTarget,
    SynchronizeAction, TeleportAction, TransitionDynamics, UserDefinedAction,
};
use crate::xml::errors::{ParseError, ParseResult};
use crate::xml::node::XmlNode;
use crate::xml::reader::ScenarioReader;

const ENTITY_KEYS: &[&str] = &["entityRef", "object"];
const CONSTRAINT_ELEMENTS: &[&str] = &["DynamicConstraints", "DynamicsConstraints", "dynamicConstraints"];

impl ScenarioReader<'_> {
    /// Read a global action container. `Ok(None)` for unsupported kinds.
    pub(super) fn read_global_action(&mut self, node: &XmlNode, name: &str) -> ParseResult<Option<Action>> {
        for child in node.children() {
            match child.name() {
                "EXT_Quit" => return Ok(Some(Action::new(name, ActionKind::Global(GlobalAction::Quit)))),
                other => warn!("Unsupported global action {}", other),
            }
        }
        Ok(None)
    }

    pub(super) fn read_user_defined_action(&mut self, node: &XmlNode, name: &str) -> ParseResult<Option<Action>> {
        let Some(command) = node.children().find(|c| matches!(c.name(), "Command" | "CustomCommandAction" | "CommandAction")) else {
            warn!("User defined action {} has no command", name);
            return Ok(None);
        };
        let command_type = self.attr(command, "type")?.unwrap_or_default();
        let content = self.resolve(command.text().trim())?;
        Ok(Some(Action::new(
            name,
            ActionKind::UserDefined(UserDefinedAction::Command {
                command_type,
                content,
            }),
        )))
    }

    /// Read a private action container for `owner`. Unsupported action kinds
    /// are skipped with a warning.
    pub(super) fn read_private_action(&mut self, node: &XmlNode, owner: EntityId) -> ParseResult<Option<PrivateAction>> {
        let Some(child) = node.first_child() else {
            warn!("Empty {} element", node.name());
            return Ok(None);
        };

        let action = match child.name() {
            "Longitudinal" | "LongitudinalAction" => self.read_longitudinal(child)?,
            "Lateral" | "LateralAction" => self.read_lateral(child)?,
            "Synchronize" | "SynchronizeAction" => Some(self.read_synchronize(child)?),
            // a bare Position element is the legacy spelling of a teleport
            "Position" => Some(PrivateAction::Teleport(TeleportAction {
                position: self.read_position(child)?,
            })),
            "TeleportAction" => {
                let position = child
                    .child("Position")
                    .ok_or_else(|| ParseError::MissingElement("TeleportAction/Position".to_string()))?;
                Some(PrivateAction::Teleport(TeleportAction {
                    position: self.read_position(position)?,
                }))
            }
            "Routing" | "RoutingAction" => self.read_routing(child)?,
            "Autonomous" => Some(PrivateAction::Autonomous(AutonomousAction {
                activate: self.bool_or(child, "activate", true)?,
                domain: self.enum_or(child, &["domain"], AutonomyDomain::Both)?,
            })),
            "ActivateControllerAction" => Some(self.read_activate_controller(child)?),
            other => {
                warn!("Unsupported private action {}", other);
                None
            }
        };
        if let Some(action) = &action {
            debug!("Read {} for {}", action.type_name(), owner);
        }
        Ok(action)
    }

    fn read_longitudinal(&mut self, node: &XmlNode) -> ParseResult<Option<PrivateAction>> {
        let Some(child) = node.first_child() else {
            return Ok(None);
        };
        match child.name() {
            "Speed" | "SpeedAction" => Ok(Some(PrivateAction::Speed(self.read_speed(child)?))),
            "LongitudinalDistanceAction" | "Distance" => Ok(Some(PrivateAction::LongitudinalDistance(
                self.read_longitudinal_distance(child)?,
            ))),
            other => {
                warn!("Unsupported longitudinal action {}", other);
                Ok(None)
            }
        }
    }

    fn read_lateral(&mut self, node: &XmlNode) -> ParseResult<Option<PrivateAction>> {
        let Some(child) = node.first_child() else {
            return Ok(None);
        };
        match child.name() {
            "LaneChange" | "LaneChangeAction" => Ok(Some(PrivateAction::LaneChange(self.read_lane_change(child)?))),
            "LaneOffset" | "LaneOffsetAction" => Ok(Some(PrivateAction::LaneOffset(self.read_lane_offset(child)?))),
            other => {
                warn!("Unsupported lateral action {}", other);
                Ok(None)
            }
        }
    }

    /// Transition dynamics, either `dynamicsDimension`/`value` or one of the
    /// legacy `rate`, `time` and `distance` attributes.
    fn read_dynamics(&self, node: &XmlNode) -> ParseResult<TransitionDynamics> {
        let shape = self.enum_or(node, &["dynamicsShape", "shape"], DynamicsShape::Linear)?;
        if node.attrs().has("dynamicsDimension") {
            return Ok(TransitionDynamics {
                shape,
                dimension: self.req_enum(node, &["dynamicsDimension"])?,
                value: self.req_f64(node, "value")?,
            });
        }
        let legacy = [
            ("rate", DynamicsDimension::Rate),
            ("time", DynamicsDimension::Time),
            ("distance", DynamicsDimension::Distance),
        ];
        for (key, dimension) in legacy {
            if let Some(value) = self.f64_attr(node, key)? {
                return Ok(TransitionDynamics { shape, dimension, value });
            }
        }
        if shape != DynamicsShape::Step {
            warn!("{}: no dynamics dimension given, changing instantly", node.name());
        }
        Ok(TransitionDynamics {
            shape,
            dimension: DynamicsDimension::Time,
            value: 0.0,
        })
    }

    fn read_speed(&mut self, node: &XmlNode) -> ParseResult<SpeedAction> {
        let dynamics = match node.children().find(|c| matches!(c.name(), "Dynamics" | "SpeedActionDynamics")) {
            Some(d) => self.read_dynamics(d)?,
            None => TransitionDynamics::default(),
        };
        let target = node
            .children()
            .find(|c| matches!(c.name(), "Target" | "SpeedActionTarget"))
            .and_then(XmlNode::first_child)
            .ok_or_else(|| ParseError::MissingElement(format!("{}/Target", node.name())))?;

        let target = match target.name() {
            "Absolute" | "AbsoluteTargetSpeed" => SpeedTarget::Absolute(self.req_f64(target, "value")?),
            "Relative" | "RelativeTargetSpeed" => SpeedTarget::Relative {
                entity: self.entity_ref(target, ENTITY_KEYS)?,
                value: self.req_f64(target, "value")?,
                value_type: self.enum_or(target, &["speedTargetValueType", "valueType"], RelativeValueType::Delta)?,
                continuous: self.bool_or(target, "continuous", false)?,
            },
            other => {
                return Err(ParseError::UnexpectedElement {
                    expected: "AbsoluteTargetSpeed or RelativeTargetSpeed".to_string(),
                    found: other.to_string(),
                });
            }
        };
        Ok(SpeedAction::new(target, dynamics))
    }

    fn read_longitudinal_distance(&mut self, node: &XmlNode) -> ParseResult<LongitudinalDistanceAction> {
        let target_entity = self.entity_ref(node, ENTITY_KEYS)?;
        let target = match (self.f64_attr(node, "distance")?, self.f64_attr(node, "timeGap")?) {
            (Some(distance), _) => DistanceTarget::Distance(distance),
            (None, Some(gap)) => DistanceTarget::TimeGap(gap),
            (None, None) => {
                return Err(ParseError::MissingAttribute(format!("{}@distance|timeGap", node.name())));
            }
        };

        let constraints = match node.children().find(|c| CONSTRAINT_ELEMENTS.contains(&c.name())) {
            Some(c) => Some(DynamicConstraints {
                max_acceleration: self.f64_or(c, "maxAcceleration", f64::INFINITY)?.abs(),
                max_deceleration: self.f64_or(c, "maxDeceleration", f64::INFINITY)?.abs(),
                max_speed: self.f64_or(c, "maxSpeed", f64::INFINITY)?.abs(),
            }),
            None => None,
        };

        Ok(LongitudinalDistanceAction {
            target_entity,
            target,
            freespace: self.bool_or(node, "freespace", false)?,
            constraints,
        })
    }

    fn read_lane_change(&mut self, node: &XmlNode) -> ParseResult<LaneChangeAction> {
        let dynamics = match node
            .children()
            .find(|c| matches!(c.name(), "Dynamics" | "LaneChangeActionDynamics"))
        {
            Some(d) => self.read_dynamics(d)?,
            None => TransitionDynamics::default(),
        };
        let target = node
            .children()
            .find(|c| matches!(c.name(), "Target" | "LaneChangeTarget"))
            .and_then(XmlNode::first_child)
            .ok_or_else(|| ParseError::MissingElement(format!("{}/Target", node.name())))?;

        let target = match target.name() {
            "Absolute" | "AbsoluteTargetLane" => LaneChangeTarget::Absolute(self.req_i32(target, "value")?),
            "Relative" | "RelativeTargetLane" => LaneChangeTarget::Relative {
                entity: self.entity_ref(target, ENTITY_KEYS)?,
                value: self.req_i32(target, "value")?,
            },
            other => {
                return Err(ParseError::UnexpectedElement {
                    expected: "AbsoluteTargetLane or RelativeTargetLane".to_string(),
                    found: other.to_string(),
                });
            }
        };
        let target_lane_offset = self.f64_or(node, "targetLaneOffset", 0.0)?;
        Ok(LaneChangeAction::new(target, target_lane_offset, dynamics))
    }

    fn read_lane_offset(&mut self, node: &XmlNode) -> ParseResult<LaneOffsetAction> {
        let (shape, max_lateral_acc, duration) = match node
            .children()
            .find(|c| matches!(c.name(), "Dynamics" | "LaneOffsetActionDynamics"))
        {
            Some(d) => (
                self.enum_or(d, &["dynamicsShape", "shape"], DynamicsShape::Linear)?,
                self.f64_attr(d, "maxLateralAcc")?,
                self.f64_attr(d, "duration")?,
            ),
            None => (DynamicsShape::Step, None, None),
        };
        let target = node
            .children()
            .find(|c| matches!(c.name(), "Target" | "LaneOffsetTarget"))
            .and_then(XmlNode::first_child)
            .ok_or_else(|| ParseError::MissingElement(format!("{}/Target", node.name())))?;

        let target = match target.name() {
            "Absolute" | "AbsoluteTargetLaneOffset" => LaneOffsetTarget::Absolute(self.req_f64(target, "value")?),
            "Relative" | "RelativeTargetLaneOffset" => LaneOffsetTarget::Relative {
                entity: self.entity_ref(target, ENTITY_KEYS)?,
                value: self.req_f64(target, "value")?,
            },
            other => {
                return Err(ParseError::UnexpectedElement {
                    expected: "AbsoluteTargetLaneOffset or RelativeTargetLaneOffset".to_string(),
                    found: other.to_string(),
                });
            }
        };
        Ok(LaneOffsetAction::new(target, shape, max_lateral_acc, duration))
    }

    fn read_synchronize(&mut self, node: &XmlNode) -> ParseResult<PrivateAction> {
        let master = self.entity_ref(node, &["masterEntityRef", "masterObject"])?;
        let master_target = node
            .child("TargetPositionMaster")
            .ok_or_else(|| ParseError::MissingElement("TargetPositionMaster".to_string()))?;
        let master_target = self.read_position(master_target)?;
        let target = node
            .child("TargetPosition")
            .ok_or_else(|| ParseError::MissingElement("TargetPosition".to_string()))?;
        let target = self.read_position(target)?;

        let final_speed = match node.child("FinalSpeed").and_then(XmlNode::first_child) {
            None => None,
            Some(speed) => match speed.name() {
                "AbsoluteSpeed" => Some(FinalSpeed::Absolute(self.req_f64(speed, "value")?)),
                "RelativeSpeedToMaster" => Some(FinalSpeed::RelativeToMaster {
                    value: self.req_f64(speed, "value")?,
                    value_type: self.enum_or(speed, &["speedTargetValueType", "valueType"], RelativeValueType::Delta)?,
                }),
                other => {
                    warn!("Unsupported final speed {}, ignored", other);
                    None
                }
            },
        };

        Ok(PrivateAction::Synchronize(SynchronizeAction {
            master,
            master_target,
            target,
            final_speed,
        }))
    }

    fn read_routing(&mut self, node: &XmlNode) -> ParseResult<Option<PrivateAction>> {
        let Some(child) = node.first_child() else {
            return Ok(None);
        };
        match child.name() {
            "FollowRoute" | "AssignRouteAction" => Ok(Some(PrivateAction::AssignRoute(AssignRouteAction {
                route: self.read_route_ref(child)?,
            }))),
            other => {
                warn!("Unsupported routing action {}", other);
                Ok(None)
            }
        }
    }

    /// Map controller activation flags onto the autonomy domains.
    fn read_activate_controller(&self, node: &XmlNode) -> ParseResult<PrivateAction> {
        let longitudinal = self.bool_or(node, "longitudinal", true)?;
        let lateral = self.bool_or(node, "lateral", true)?;
        let (activate, domain) = match (node.attrs().has("longitudinal"), node.attrs().has("lateral")) {
            (true, false) => (longitudinal, AutonomyDomain::Longitudinal),
            (false, true) => (lateral, AutonomyDomain::Lateral),
            _ if longitudinal == lateral => (longitudinal, AutonomyDomain::Both),
            _ => {
                warn!("Mixed controller activation is not supported, applying the longitudinal flag to both");
                (longitudinal, AutonomyDomain::Both)
            }
        };
        Ok(PrivateAction::Autonomous(AutonomousAction { activate, domain }))
    }
}
