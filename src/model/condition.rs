//! Trigger conditions, condition groups and triggers.
//!
//! A [`Condition`] evaluates a raw predicate against the previous tick's
//! committed state, then applies edge detection and delay bookkeeping to
//! decide whether it *triggers* this tick. Groups AND their conditions and a
//! [`Trigger`] ORs its groups.

use std::str::FromStr;

use log::{debug, warn};

use crate::core::EntityId;
use crate::model::entity::{Entities, Entity};
use crate::model::position::Position;
use crate::model::story::{ElementPhase, StoryElementType, StoryPhases, TerminationKind};
use crate::road::RoadGeometry;

/// Tolerance used for `equalTo` comparisons and elapsed-time checks.
pub const SMALL_NUMBER: f64 = 1e-9;

/// Headway reported when the triggering entity is standing still or the
/// target is behind it.
pub const LARGE_NUMBER: f64 = 1e10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    GreaterThan,
    LessThan,
    EqualTo,
}

impl Rule {
    pub fn compare(self, a: f64, b: f64) -> bool {
        match self {
            Rule::GreaterThan => a > b,
            Rule::LessThan => a < b,
            Rule::EqualTo => (a - b).abs() < SMALL_NUMBER,
        }
    }
}

impl FromStr for Rule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greater_than" | "greaterThan" => Ok(Rule::GreaterThan),
            "less_than" | "lessThan" => Ok(Rule::LessThan),
            "equal_to" | "equalTo" => Ok(Rule::EqualTo),
            other => Err(format!("invalid rule '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionEdge {
    #[default]
    Rising,
    Falling,
    /// Either transition.
    Any,
    /// Level triggered: fires whenever the predicate holds.
    None,
}

impl FromStr for ConditionEdge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rising" => Ok(ConditionEdge::Rising),
            "falling" => Ok(ConditionEdge::Falling),
            "any" | "risingOrFalling" => Ok(ConditionEdge::Any),
            "none" => Ok(ConditionEdge::None),
            other => Err(format!("invalid condition edge '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggeringRule {
    Any,
    All,
}

impl FromStr for TriggeringRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(TriggeringRule::Any),
            "all" => Ok(TriggeringRule::All),
            other => Err(format!("invalid triggering entities rule '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggeringEntities {
    pub rule: TriggeringRule,
    pub entities: Vec<EntityId>,
}

impl TriggeringEntities {
    /// Combine a per-entity predicate under the any/all rule. An empty list
    /// never triggers.
    fn check(&self, entities: &Entities, mut predicate: impl FnMut(&Entity) -> bool) -> bool {
        if self.entities.is_empty() {
            return false;
        }
        let mut values = self.entities.iter().map(|id| match entities.get(*id) {
            Some(entity) => predicate(entity),
            None => {
                warn!("Triggering entity {} does not exist", id);
                false
            }
        });
        match self.rule {
            TriggeringRule::Any => values.any(|v| v),
            TriggeringRule::All => values.all(|v| v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDistanceType {
    Longitudinal,
    Lateral,
    /// Straight-line distance.
    Inertial,
}

impl FromStr for RelativeDistanceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "longitudinal" => Ok(RelativeDistanceType::Longitudinal),
            "lateral" => Ok(RelativeDistanceType::Lateral),
            "inertial" | "cartesianDistance" => Ok(RelativeDistanceType::Inertial),
            other => Err(format!("invalid relative distance type '{}'", other)),
        }
    }
}

/// Which terminations satisfy an after-termination condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationRule {
    End,
    Cancel,
    Any,
}

impl TerminationRule {
    fn accepts(self, kind: TerminationKind) -> bool {
        match self {
            TerminationRule::End => kind == TerminationKind::End,
            TerminationRule::Cancel => kind == TerminationKind::Cancel,
            TerminationRule::Any => true,
        }
    }
}

impl FromStr for TerminationRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "end" => Ok(TerminationRule::End),
            "cancel" => Ok(TerminationRule::Cancel),
            "any" => Ok(TerminationRule::Any),
            other => Err(format!("invalid termination rule '{}'", other)),
        }
    }
}

/// Closed set of predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    TimeHeadway {
        triggering: TriggeringEntities,
        target: EntityId,
        value: f64,
        rule: Rule,
        along_route: bool,
        freespace: bool,
    },
    ReachPosition {
        triggering: TriggeringEntities,
        position: Position,
        tolerance: f64,
    },
    RelativeDistance {
        triggering: TriggeringEntities,
        target: EntityId,
        distance_type: RelativeDistanceType,
        value: f64,
        rule: Rule,
        freespace: bool,
    },
    Distance {
        triggering: TriggeringEntities,
        position: Position,
        value: f64,
        rule: Rule,
        freespace: bool,
    },
    SimulationTime {
        value: f64,
        rule: Rule,
    },
    AtStart {
        element_type: StoryElementType,
        element_name: String,
    },
    /// Holds for as long as the element runs, its start tick included.
    Running {
        element_type: StoryElementType,
        element_name: String,
    },
    AfterTermination {
        element_type: StoryElementType,
        element_name: String,
        rule: TerminationRule,
    },
}

/// Read-only view of the world a condition is evaluated against.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Entity state committed at the end of the previous tick.
    pub entities: &'a Entities,
    pub road: &'a dyn RoadGeometry,
    pub simulation_time: f64,
    /// Story element phases committed at the end of the previous tick.
    pub phases: &'a StoryPhases,
}

impl ConditionKind {
    /// Raw predicate value.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            ConditionKind::TimeHeadway {
                triggering,
                target,
                value,
                rule,
                along_route,
                freespace,
            } => {
                let Some(target) = ctx.entities.get(*target) else {
                    warn!("Time headway target {} does not exist", target);
                    return false;
                };
                triggering.check(ctx.entities, |entity| {
                    let headway = time_headway(entity, target, *along_route, *freespace, ctx);
                    rule.compare(headway, *value)
                })
            }
            ConditionKind::ReachPosition {
                triggering,
                position,
                tolerance,
            } => {
                let Some(resolved) = position.resolve(ctx.entities, ctx.road) else {
                    return false;
                };
                triggering.check(ctx.entities, |entity| {
                    (entity.pose.xy() - resolved.pose.xy()).norm() < *tolerance
                })
            }
            ConditionKind::RelativeDistance {
                triggering,
                target,
                distance_type,
                value,
                rule,
                freespace,
            } => {
                let Some(target) = ctx.entities.get(*target) else {
                    warn!("Relative distance target {} does not exist", target);
                    return false;
                };
                triggering.check(ctx.entities, |entity| {
                    let distance = relative_distance(entity, target, *distance_type, *freespace);
                    rule.compare(distance, *value)
                })
            }
            ConditionKind::Distance {
                triggering,
                position,
                value,
                rule,
                freespace,
            } => {
                let Some(resolved) = position.resolve(ctx.entities, ctx.road) else {
                    return false;
                };
                triggering.check(ctx.entities, |entity| {
                    let mut distance = (entity.pose.xy() - resolved.pose.xy()).norm();
                    if *freespace {
                        distance = (distance - entity.bounding_box.length / 2.0).max(0.0);
                    }
                    rule.compare(distance, *value)
                })
            }
            ConditionKind::SimulationTime { value, rule } => {
                rule.compare(ctx.simulation_time, *value)
            }
            ConditionKind::AtStart {
                element_type,
                element_name,
            } => ctx.phases.get(*element_type, element_name) == ElementPhase::Started,
            ConditionKind::Running {
                element_type,
                element_name,
            } => matches!(
                ctx.phases.get(*element_type, element_name),
                ElementPhase::Started | ElementPhase::Running
            ),
            ConditionKind::AfterTermination {
                element_type,
                element_name,
                rule,
            } => match ctx.phases.get(*element_type, element_name) {
                ElementPhase::Ended(kind) => rule.accepts(kind),
                _ => false,
            },
        }
    }
}

fn time_headway(
    entity: &Entity,
    target: &Entity,
    along_route: bool,
    freespace: bool,
    ctx: &EvalContext<'_>,
) -> f64 {
    let mut distance = if along_route {
        let route_distance = entity.route.as_ref().and_then(|route| {
            let own = route.path_s_of(entity.pose.xy(), ctx.entities, ctx.road)?;
            let other = route.path_s_of(target.pose.xy(), ctx.entities, ctx.road)?;
            Some(other - own)
        });
        route_distance.unwrap_or_else(|| entity.longitudinal_distance_to(target))
    } else {
        entity.euclidean_distance_to(target)
    };
    if distance < 0.0 {
        return LARGE_NUMBER;
    }
    if freespace {
        distance = (distance - (entity.bounding_box.length + target.bounding_box.length) / 2.0).max(0.0);
    }
    if entity.speed.abs() < SMALL_NUMBER {
        return LARGE_NUMBER;
    }
    distance / entity.speed.abs()
}

/// Unsigned distance between two entities of the requested type.
pub fn relative_distance(
    entity: &Entity,
    target: &Entity,
    distance_type: RelativeDistanceType,
    freespace: bool,
) -> f64 {
    let (distance, extent) = match distance_type {
        RelativeDistanceType::Longitudinal => (
            entity.longitudinal_distance_to(target).abs(),
            (entity.bounding_box.length + target.bounding_box.length) / 2.0,
        ),
        RelativeDistanceType::Lateral => (
            entity.lateral_distance_to(target).abs(),
            (entity.bounding_box.width + target.bounding_box.width) / 2.0,
        ),
        RelativeDistanceType::Inertial => (
            entity.euclidean_distance_to(target),
            (entity.bounding_box.length + target.bounding_box.length) / 2.0,
        ),
    };
    if freespace {
        (distance - extent).max(0.0)
    } else {
        distance
    }
}

/// An edge-in-progress waiting out the configured delay.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingEdge {
    since: f64,
    /// Raw value right after the edge.
    value: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub name: String,
    pub delay: f64,
    pub edge: ConditionEdge,
    pub kind: ConditionKind,
    last_value: bool,
    pending: Option<PendingEdge>,
}

impl Condition {
    pub fn new(name: &str, delay: f64, edge: ConditionEdge, kind: ConditionKind) -> Self {
        Self {
            name: name.to_string(),
            delay,
            edge,
            kind,
            last_value: false,
            pending: None,
        }
    }

    /// Raw predicate value this tick.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        self.kind.evaluate(ctx)
    }

    /// Evaluate and advance edge/delay bookkeeping. Returns whether the
    /// condition triggers this tick.
    pub fn update(&mut self, ctx: &EvalContext<'_>) -> bool {
        let value = self.evaluate(ctx);
        let edge_hit = match self.edge {
            ConditionEdge::Rising => value && !self.last_value,
            ConditionEdge::Falling => !value && self.last_value,
            ConditionEdge::Any => value != self.last_value,
            ConditionEdge::None => value,
        };
        self.last_value = value;

        if self.delay <= 0.0 {
            if edge_hit {
                debug!("Condition {} triggered at {:.3}", self.name, ctx.simulation_time);
            }
            return edge_hit;
        }

        if let Some(pending) = self.pending {
            let held = match self.edge {
                ConditionEdge::Rising | ConditionEdge::None => value,
                ConditionEdge::Falling => !value,
                ConditionEdge::Any => value == pending.value,
            };
            if !held {
                debug!("Condition {} edge not held through delay", self.name);
                self.pending = None;
            } else if ctx.simulation_time - pending.since >= self.delay - SMALL_NUMBER {
                self.pending = None;
                debug!(
                    "Condition {} triggered at {:.3} after delay {:.3}",
                    self.name, ctx.simulation_time, self.delay
                );
                return true;
            }
        }

        if edge_hit && self.pending.is_none() {
            self.pending = Some(PendingEdge {
                since: ctx.simulation_time,
                value,
            });
        }
        false
    }

    /// Forget edge history, e.g. when a maneuver group re-executes.
    pub fn reset(&mut self) {
        self.last_value = false;
        self.pending = None;
    }
}

/// Conditions combined with AND.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionGroup {
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// Every condition is updated, even after one fails, so edge tracking
    /// stays current for all of them.
    pub fn update(&mut self, ctx: &EvalContext<'_>) -> bool {
        let mut all = !self.conditions.is_empty();
        for condition in &mut self.conditions {
            all &= condition.update(ctx);
        }
        all
    }
}

/// Condition groups combined with OR.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trigger {
    pub groups: Vec<ConditionGroup>,
}

impl Trigger {
    /// No condition group at all. Elements without a trigger start right
    /// away; a trigger holding only empty groups never fires.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn update(&mut self, ctx: &EvalContext<'_>) -> bool {
        let mut any = false;
        for group in &mut self.groups {
            any |= group.update(ctx);
        }
        any
    }

    pub fn reset(&mut self) {
        self.conditions_mut().for_each(Condition::reset);
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.groups.iter().flat_map(|g| g.conditions.iter())
    }

    fn conditions_mut(&mut self) -> impl Iterator<Item = &mut Condition> {
        self.groups.iter_mut().flat_map(|g| g.conditions.iter_mut())
    }
}
