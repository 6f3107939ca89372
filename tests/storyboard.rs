mod common;

use anyhow::Result;
use pretty_assertions::assert_eq;
use xosc::model::action::ActionState;
use xosc::model::story::{EventState, TerminationKind};
use xosc::model::{Control, Event};
use xosc::{EngineConfig, ScenarioEngine};

use common::*;

fn event_named<'a>(engine: &'a ScenarioEngine, name: &str) -> &'a Event {
    engine.storyboard().find_event(name).expect("event exists")
}

#[test]
fn test_speed_action_converges() -> Result<()> {
    let xml = document(
        &vehicle("Ego"),
        &place("Ego", -1, 50.0, 0.0),
        &story(&group(
            "Accelerate",
            "Ego",
            &event("Speed up", "overwrite", &speed_action(20.0, "linear", "rate", 4.0), &time_trigger(1.0)),
        )),
    );
    let mut engine = engine(&xml)?;

    run_until(&mut engine, 3.5, |_| false)?;
    let speed = engine.entity("Ego").unwrap().speed;
    assert!(speed > 5.0 && speed < 15.0, "mid-transition speed {}", speed);
    assert!(event_named(&engine, "Speed up").is_active());

    run_until(&mut engine, 10.0, |_| false)?;
    let ego = engine.entity("Ego").unwrap();
    assert_eq!(ego.speed, 20.0);
    assert!(ego.pose.x > 100.0);
    let event = event_named(&engine, "Speed up");
    assert_eq!(event.state(), EventState::Inactive);
    assert_eq!(event.termination(), Some(TerminationKind::End));
    assert!(engine.storyboard().find_maneuver_group("Accelerate").unwrap().is_completed());
    Ok(())
}

#[test]
fn test_event_passes_through_transition_states() -> Result<()> {
    let teleport = r#"<PrivateAction><TeleportAction><Position>
        <LanePosition roadId="0" laneId="1" s="200"/></Position></TeleportAction></PrivateAction>"#;
    let xml = document(
        &vehicle("Ego"),
        &place("Ego", -1, 50.0, 0.0),
        &story(&group("Jump", "Ego", &event("Jump", "overwrite", teleport, &time_trigger(0.2)))),
    );
    let mut engine = engine(&xml)?;

    let mut events = Vec::new();
    let mut actions = Vec::new();
    for _ in 0..20 {
        engine.step(DT, false)?;
        let event = event_named(&engine, "Jump");
        events.push(event.state());
        actions.push(event.actions[0].state());
    }

    let started = events.iter().position(|s| *s == EventState::Activated).unwrap();
    assert_eq!(&events[started..started + 4], &[
        EventState::Activated,
        EventState::Active,
        EventState::Deactivated,
        EventState::Inactive,
    ]);
    assert_eq!(&actions[started..started + 3], &[
        ActionState::Activated,
        ActionState::Deactivated,
        ActionState::Inactive,
    ]);
    assert_eq!(events.iter().filter(|s| **s == EventState::Activated).count(), 1);

    let ego = engine.entity("Ego").unwrap();
    assert_eq!(ego.lane.map(|l| l.lane_id), Some(1));
    Ok(())
}

fn priority_document(priority: &str) -> String {
    let events = [
        event("Slow", "overwrite", &speed_action(10.0, "linear", "time", 2.0), &time_trigger(0.5)),
        event("Fast", priority, &speed_action(30.0, "step", "time", 0.0), &time_trigger(1.0)),
    ]
    .concat();
    document(&vehicle("Ego"), &place("Ego", -1, 50.0, 0.0), &story(&group("Driver", "Ego", &events)))
}

#[test]
fn test_overwrite_cancels_running_event() -> Result<()> {
    let mut engine = engine(&priority_document("overwrite"))?;
    assert!(run_until(&mut engine, 5.0, |e| event_named(e, "Fast").state() != EventState::Inactive)?);

    let slow = event_named(&engine, "Slow");
    assert_eq!(slow.state(), EventState::Deactivated);
    assert_eq!(slow.termination(), Some(TerminationKind::Cancel));
    assert_eq!(event_named(&engine, "Fast").state(), EventState::Activated);

    run_until(&mut engine, 5.0, |_| false)?;
    assert_eq!(engine.entity("Ego").unwrap().speed, 30.0);
    assert_eq!(event_named(&engine, "Fast").termination(), Some(TerminationKind::End));
    Ok(())
}

#[test]
fn test_following_waits_for_running_event() -> Result<()> {
    let mut engine = engine(&priority_document("following"))?;
    assert!(run_until(&mut engine, 5.0, |e| event_named(e, "Fast").state() != EventState::Inactive)?);
    assert_eq!(event_named(&engine, "Fast").state(), EventState::Waiting);
    assert!(event_named(&engine, "Slow").is_active());
    let maneuver = &engine.storyboard().find_maneuver_group("Driver").unwrap().maneuvers[0];
    assert_eq!(maneuver.active_event_index(), Some(0));
    assert_eq!(maneuver.waiting_event_index(), Some(1));

    assert!(run_until(&mut engine, 6.0, |e| event_named(e, "Fast").is_active())?);
    let slow = event_named(&engine, "Slow");
    assert_eq!(slow.termination(), Some(TerminationKind::End));
    // the slow transition ran to completion before the fast one began
    assert!(engine.simulation_time() > 2.5);

    run_until(&mut engine, 8.0, |_| false)?;
    assert_eq!(engine.entity("Ego").unwrap().speed, 30.0);
    Ok(())
}

#[test]
fn test_skip_drops_conflicting_event() -> Result<()> {
    let mut engine = engine(&priority_document("skip"))?;
    run_until(&mut engine, 6.0, |_| false)?;

    let fast = event_named(&engine, "Fast");
    assert_eq!(fast.state(), EventState::Inactive);
    assert_eq!(fast.termination(), None);
    assert_eq!(event_named(&engine, "Slow").termination(), Some(TerminationKind::End));
    assert_eq!(engine.entity("Ego").unwrap().speed, 10.0);
    Ok(())
}

#[test]
fn test_after_termination_chains_groups() -> Result<()> {
    let after_slow = r#"<StartTrigger><ConditionGroup>
        <Condition name="slow done" delay="0" conditionEdge="rising">
          <ByValueCondition>
            <StoryboardElementStateCondition storyboardElementType="event" storyboardElementRef="Lead" state="endTransition"/>
          </ByValueCondition>
        </Condition>
      </ConditionGroup></StartTrigger>"#;
    let groups = [
        group("Leader", "Ego", &event("Lead", "overwrite", &speed_action(15.0, "linear", "time", 1.0), &time_trigger(0.5))),
        group("Follower", "Target", &event("Follow", "overwrite", &speed_action(15.0, "step", "time", 0.0), after_slow)),
    ]
    .concat();
    let xml = document(
        &[vehicle("Ego"), vehicle("Target")].concat(),
        &[place("Ego", -1, 50.0, 0.0), place("Target", -2, 50.0, 0.0)].concat(),
        &story(&groups),
    );
    let mut engine = engine(&xml)?;

    assert!(run_until(&mut engine, 5.0, |e| event_named(e, "Follow").is_active())?);
    assert_eq!(event_named(&engine, "Lead").termination(), Some(TerminationKind::End));
    assert!(engine.simulation_time() > 1.5);
    assert!(engine.entity("Target").unwrap().speed > 0.0);
    Ok(())
}

#[test]
fn test_time_headway_triggers_braking() -> Result<()> {
    let headway = r#"<StartTrigger><ConditionGroup>
        <Condition name="close" delay="0" conditionEdge="rising">
          <ByEntityCondition>
            <TriggeringEntities triggeringEntitiesRule="any"><EntityRef entityRef="Ego"/></TriggeringEntities>
            <EntityCondition>
              <TimeHeadwayCondition entityRef="Target" value="2" freespace="false" alongRoute="false" rule="lessThan"/>
            </EntityCondition>
          </ByEntityCondition>
        </Condition>
      </ConditionGroup></StartTrigger>"#;
    let xml = document(
        &[vehicle("Ego"), vehicle("Target")].concat(),
        &[place("Ego", -1, 50.0, 20.0), place("Target", -1, 100.0, 10.0)].concat(),
        &story(&group("Brake", "Ego", &event("Brake", "overwrite", &speed_action(10.0, "step", "time", 0.0), headway))),
    );
    let mut engine = engine(&xml)?;

    assert!(run_until(&mut engine, 5.0, |e| event_named(e, "Brake").is_active())?);
    // 50 m gap closing at 10 m/s: headway drops below 2 s after about 1 s
    assert!(engine.simulation_time() > 0.9 && engine.simulation_time() < 1.3);

    run_until(&mut engine, 3.0, |_| false)?;
    let ego = engine.entity("Ego").unwrap();
    let target = engine.entity("Target").unwrap();
    assert_eq!(ego.speed, 10.0);
    assert!(target.pose.x - ego.pose.x > 30.0);
    Ok(())
}

#[test]
fn test_distance_along_route_falls_back_to_straight_line() -> Result<()> {
    let near = r#"<StartTrigger><ConditionGroup>
        <Condition name="near" delay="0" conditionEdge="rising">
          <ByEntityCondition>
            <TriggeringEntities triggeringEntitiesRule="any"><EntityRef entityRef="Ego"/></TriggeringEntities>
            <EntityCondition>
              <DistanceCondition value="20" freespace="false" alongRoute="true" rule="lessThan">
                <Position><LanePosition roadId="0" laneId="-1" s="60"/></Position>
              </DistanceCondition>
            </EntityCondition>
          </ByEntityCondition>
        </Condition>
      </ConditionGroup></StartTrigger>"#;
    let xml = document(
        &vehicle("Ego"),
        &place("Ego", -1, 10.0, 10.0),
        &story(&group("Stop", "Ego", &event("Stop", "overwrite", &speed_action(0.0, "step", "time", 0.0), near))),
    );
    let mut engine = engine(&xml)?;

    assert!(run_until(&mut engine, 5.0, |e| event_named(e, "Stop").is_active())?);
    // 50 m to go at 10 m/s: inside 20 m after 3 s
    assert!(engine.simulation_time() > 2.9 && engine.simulation_time() < 3.3);
    Ok(())
}

#[test]
fn test_hybrid_ghost_takes_scenario_actions() -> Result<()> {
    let ego = r#"<ScenarioObject name="Ego"><Vehicle name="car" vehicleCategory="car">
        <Properties><Property name="control" value="hybrid"/></Properties>
      </Vehicle></ScenarioObject>"#;
    let xml = document(
        ego,
        &place("Ego", -1, 50.0, 10.0),
        &story(&group("Drive", "Ego", &event("Faster", "overwrite", &speed_action(15.0, "step", "time", 0.0), &time_trigger(0.5)))),
    );
    let mut engine = engine(&xml)?;

    let ego = engine.entity("Ego").unwrap();
    let ghost = engine.entity("Ego_ghost").unwrap();
    assert_eq!(ego.control, Control::HybridExternal);
    assert_eq!(ego.ghost, Some(ghost.id));
    assert_eq!(ghost.control, Control::HybridGhost);
    assert_eq!(ego.pose, ghost.pose);
    assert_eq!((ego.speed, ghost.speed), (0.0, 10.0));

    run_until(&mut engine, 2.0, |_| false)?;
    let ego = engine.entity("Ego").unwrap();
    let ghost = engine.entity("Ego_ghost").unwrap();
    assert_eq!(ghost.speed, 15.0);
    assert_eq!(ego.pose.x, 50.0);
    assert!(ghost.pose.x > 70.0);
    let group = engine.storyboard().find_maneuver_group("Drive").unwrap();
    assert_eq!(group.actors, vec![ego.id, ghost.id]);
    Ok(())
}

#[test]
fn test_user_command_and_quit() -> Result<()> {
    let command = r#"<UserDefinedAction><CustomCommandAction type="shell">echo done</CustomCommandAction></UserDefinedAction>"#;
    let quit = r#"<GlobalAction><EXT_Quit/></GlobalAction>"#;
    let events = [
        event("Notify", "overwrite", command, &time_trigger(0.2)),
        event("Quit", "overwrite", quit, &time_trigger(1.0)),
    ]
    .concat();
    let xml = document(&vehicle("Ego"), &place("Ego", -1, 50.0, 0.0), &story(&group("Control", "Ego", &events)));
    let mut engine = engine(&xml)?;

    run_until(&mut engine, 0.5, |_| false)?;
    let commands = engine.take_user_commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].command_type, "shell");
    assert_eq!(commands[0].content, "echo done");
    assert!(engine.take_user_commands().is_empty());
    assert!(!engine.is_quit_requested());

    assert!(run_until(&mut engine, 2.0, ScenarioEngine::is_quit_requested)?);
    Ok(())
}

#[test]
fn test_storyboard_stop_trigger_cancels_act() -> Result<()> {
    let mut xml = document(
        &vehicle("Ego"),
        &place("Ego", -1, 50.0, 0.0),
        &story(&group("Long", "Ego", &event("Crawl", "overwrite", &speed_action(5.0, "linear", "time", 100.0), &time_trigger(0.1)))),
    );
    let stop = r#"<StopTrigger><ConditionGroup>
        <Condition name="timeout" delay="0" conditionEdge="rising">
          <ByValueCondition><SimulationTimeCondition value="1" rule="greaterThan"/></ByValueCondition>
        </Condition>
      </ConditionGroup></StopTrigger></Storyboard>"#;
    xml = xml.replacen("</Storyboard>", stop, 1);
    let mut engine = engine(&xml)?;

    assert!(run_until(&mut engine, 3.0, ScenarioEngine::is_quit_requested)?);
    let act = engine.storyboard().find_act("Act").unwrap();
    assert!(!act.is_active());
    assert_eq!(event_named(&engine, "Crawl").termination(), Some(TerminationKind::Cancel));
    Ok(())
}

#[test]
fn test_legacy_document_layout() -> Result<()> {
    let xml = r#"<?xml version="1.0"?>
<OpenSCENARIO>
  <RoadNetwork><Logics filepath="straight.xodr"/></RoadNetwork>
  <Entities>
    <Object name="Ego"><Vehicle name="car" category="car"/></Object>
  </Entities>
  <Storyboard>
    <Init><Actions>
      <Private object="Ego">
        <Action><Position><Lane roadId="0" laneId="-1" s="20"/></Position></Action>
        <Action><Longitudinal><Speed><Dynamics shape="step"/><Target><Absolute value="5"/></Target></Speed></Longitudinal></Action>
      </Private>
    </Actions></Init>
    <Story name="S">
      <Act name="A">
        <Sequence name="Seq" numberOfExecutions="1">
          <Actors><Entity name="Ego"/></Actors>
          <Maneuver name="M">
            <Event name="E" priority="overwrite">
              <Action name="Faster">
                <Private><Longitudinal><Speed><Dynamics shape="linear" rate="10"/><Target><Absolute value="15"/></Target></Speed></Longitudinal></Private>
              </Action>
              <StartConditions><ConditionGroup>
                <Condition name="c" delay="0" edge="rising">
                  <ByValue><SimulationTime value="0.5" rule="greater_than"/></ByValue>
                </Condition>
              </ConditionGroup></StartConditions>
            </Event>
          </Maneuver>
        </Sequence>
        <Conditions>
          <Start><ConditionGroup>
            <Condition name="go" delay="0" edge="rising">
              <ByValue><SimulationTime value="0" rule="greater_than"/></ByValue>
            </Condition>
          </ConditionGroup></Start>
        </Conditions>
      </Act>
    </Story>
  </Storyboard>
</OpenSCENARIO>"#;
    init_logging();
    let mut engine = ScenarioEngine::from_str(xml, ".", road(), EngineConfig::default())?;
    engine.step(0.0, true)?;
    assert_eq!(engine.entity("Ego").unwrap().speed, 5.0);

    assert!(run_until(&mut engine, 3.0, |e| e.entity("Ego").unwrap().speed == 15.0)?);
    assert_eq!(event_named(&engine, "E").actions[0].name, "Faster");
    Ok(())
}

#[test]
fn test_cut_in_scenario_file() -> Result<()> {
    init_logging();
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("data/scenarios/cut_in.xosc");
    let mut engine = ScenarioEngine::from_file(&path, road(), EngineConfig::default())?;
    assert_eq!(engine.parameters().len(), 2);
    engine.step(0.0, true)?;
    assert_eq!(engine.entity("Target").unwrap().speed, 30.0);

    assert!(run_until(&mut engine, 20.0, ScenarioEngine::is_quit_requested)?);
    let cut_in = event_named(&engine, "CutInEvent");
    assert_eq!(cut_in.termination(), Some(TerminationKind::End));
    assert_eq!(event_named(&engine, "BrakeEvent").termination(), Some(TerminationKind::End));

    let ego = engine.entity("Ego").unwrap();
    let target = engine.entity("Target").unwrap();
    assert!((target.pose.y - ego.pose.y).abs() < 1e-3);
    assert_eq!(target.speed, 20.0);
    assert!(target.pose.x > ego.pose.x);
    Ok(())
}
