//! Shared builders for integration test documents.
#![allow(dead_code)]

use xosc::{EngineConfig, ScenarioEngine, StraightRoads};

pub const DT: f64 = 0.05;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 1 km straight road along x, two 3.5 m lanes per side.
pub fn road() -> Box<StraightRoads> {
    Box::new(StraightRoads::single(0, 1000.0, 2, 3.5))
}

pub fn vehicle(name: &str) -> String {
    format!(r#"<ScenarioObject name="{name}"><Vehicle name="car" vehicleCategory="car"/></ScenarioObject>"#)
}

pub fn document(entities: &str, init: &str, stories: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OpenSCENARIO>
  <FileHeader revMajor="1" revMinor="0" description="test"/>
  <RoadNetwork><LogicFile filepath="straight.xodr"/></RoadNetwork>
  <Entities>{entities}</Entities>
  <Storyboard>
    <Init><Actions>{init}</Actions></Init>
    {stories}
  </Storyboard>
</OpenSCENARIO>"#
    )
}

/// Teleport onto lane `lane_id` at `s` and set an initial speed.
pub fn place(entity: &str, lane_id: i32, s: f64, speed: f64) -> String {
    format!(
        r#"<Private entityRef="{entity}">
  <PrivateAction><TeleportAction><Position><LanePosition roadId="0" laneId="{lane_id}" s="{s}"/></Position></TeleportAction></PrivateAction>
  {}
</Private>"#,
        speed_action(speed, "step", "time", 0.0)
    )
}

pub fn speed_action(target: f64, shape: &str, dimension: &str, value: f64) -> String {
    format!(
        r#"<PrivateAction><LongitudinalAction><SpeedAction>
  <SpeedActionDynamics dynamicsShape="{shape}" dynamicsDimension="{dimension}" value="{value}"/>
  <SpeedActionTarget><AbsoluteTargetSpeed value="{target}"/></SpeedActionTarget>
</SpeedAction></LongitudinalAction></PrivateAction>"#
    )
}

pub fn time_trigger(time: f64) -> String {
    format!(
        r#"<StartTrigger><ConditionGroup>
  <Condition name="after {time}" delay="0" conditionEdge="rising">
    <ByValueCondition><SimulationTimeCondition value="{time}" rule="greaterThan"/></ByValueCondition>
  </Condition>
</ConditionGroup></StartTrigger>"#
    )
}

pub fn event(name: &str, priority: &str, action: &str, trigger: &str) -> String {
    format!(r#"<Event name="{name}" priority="{priority}"><Action name="{name} action">{action}</Action>{trigger}</Event>"#)
}

/// A maneuver group with a single maneuver holding `events`.
pub fn group(name: &str, actor: &str, events: &str) -> String {
    format!(
        r#"<ManeuverGroup name="{name}" maximumExecutionCount="1">
  <Actors selectTriggeringEntities="false"><EntityRef entityRef="{actor}"/></Actors>
  <Maneuver name="{name} maneuver">{events}</Maneuver>
</ManeuverGroup>"#
    )
}

/// One story with one act that starts right away.
pub fn story(groups: &str) -> String {
    format!(r#"<Story name="Story"><Act name="Act">{groups}</Act></Story>"#)
}

pub fn engine(xml: &str) -> anyhow::Result<ScenarioEngine> {
    init_logging();
    let mut engine = ScenarioEngine::from_str(xml, ".", road(), EngineConfig::default())?;
    engine.step(0.0, true)?;
    Ok(engine)
}

/// Step until `done` holds or `max_time` is reached. Returns whether `done`
/// held.
pub fn run_until(
    engine: &mut ScenarioEngine,
    max_time: f64,
    mut done: impl FnMut(&ScenarioEngine) -> bool,
) -> anyhow::Result<bool> {
    while engine.simulation_time() < max_time {
        engine.step(DT, false)?;
        if done(engine) {
            return Ok(true);
        }
    }
    Ok(false)
}
