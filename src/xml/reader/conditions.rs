use log::warn;

use crate::model::condition::{
    Condition, ConditionEdge, ConditionGroup, ConditionKind, RelativeDistanceType, TerminationRule, Trigger,
    TriggeringEntities, TriggeringRule,
};
use crate::model::story::StoryElementType;
use crate::xml::errors::{ParseError, ParseResult};
use crate::xml::node::XmlNode;
use crate::xml::reader::ScenarioReader;

const ENTITY_KEYS: &[&str] = &["entityRef", "entity"];

impl ScenarioReader<'_> {
    /// Read a trigger: condition groups OR-ed, conditions inside AND-ed.
    pub(super) fn read_trigger(&mut self, node: &XmlNode) -> ParseResult<Trigger> {
        let mut trigger = Trigger::default();
        let mut dropped_groups = 0;
        for group in node.children() {
            if group.name() != "ConditionGroup" {
                warn!("Unexpected element {} in {}", group.name(), node.name());
                continue;
            }
            let mut conditions = Vec::new();
            let mut dropped = 0;
            for condition in group.children_named("Condition") {
                match self.read_condition(condition)? {
                    Some(condition) => conditions.push(condition),
                    None => dropped += 1,
                }
            }
            if conditions.is_empty() && dropped > 0 {
                warn!("ConditionGroup in {} has no supported condition left, dropping it", node.name());
                dropped_groups += 1;
                continue;
            }
            trigger.groups.push(ConditionGroup { conditions });
        }
        if trigger.groups.is_empty() && dropped_groups > 0 {
            // an empty group never fires, unlike an absent trigger
            warn!("{} has no supported condition group and can never fire", node.name());
            trigger.groups.push(ConditionGroup::default());
        }
        Ok(trigger)
    }

    /// `None` when the condition type is not supported.
    fn read_condition(&mut self, node: &XmlNode) -> ParseResult<Option<Condition>> {
        let name = self.attr(node, "name")?.unwrap_or_default();
        let delay = self.f64_or(node, "delay", 0.0)?;
        let edge = match self.attr_any(node, &["conditionEdge", "edge"])? {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| ParseError::invalid("conditionEdge", &raw, e))?,
            None => {
                warn!("Condition {} has no edge, assuming rising", name);
                ConditionEdge::Rising
            }
        };

        let body = node
            .first_child()
            .ok_or_else(|| ParseError::MissingElement(format!("Condition {} body", name)))?;
        let kind = match body.name() {
            "ByEntity" | "ByEntityCondition" => self.read_by_entity(body)?,
            "ByState" => self.read_by_state(body)?,
            "ByValue" | "ByValueCondition" => self.read_by_value(body)?,
            other => {
                return Err(ParseError::UnexpectedElement {
                    expected: "ByEntityCondition or ByValueCondition".to_string(),
                    found: other.to_string(),
                });
            }
        };
        match kind {
            Some(kind) => Ok(Some(Condition::new(&name, delay, edge, kind))),
            None => {
                warn!("Condition {} is not supported, ignoring it", name);
                Ok(None)
            }
        }
    }

    fn read_triggering_entities(&mut self, node: &XmlNode) -> ParseResult<TriggeringEntities> {
        let triggering = node
            .child("TriggeringEntities")
            .ok_or_else(|| ParseError::MissingElement("TriggeringEntities".to_string()))?;
        let rule: TriggeringRule = self.req_enum(triggering, &["triggeringEntitiesRule", "rule"])?;
        let mut entities = Vec::new();
        for entity in triggering.children() {
            let id = match entity.name() {
                "EntityRef" => self.entity_ref(entity, &["entityRef"])?,
                "Entity" => self.entity_ref(entity, &["name"])?,
                other => {
                    warn!("Unexpected element {} in TriggeringEntities", other);
                    continue;
                }
            };
            entities.push(id);
        }
        if entities.is_empty() {
            warn!("TriggeringEntities lists no entity, the condition can never trigger");
        }
        Ok(TriggeringEntities { rule, entities })
    }

    fn read_by_entity(&mut self, node: &XmlNode) -> ParseResult<Option<ConditionKind>> {
        let triggering = self.read_triggering_entities(node)?;
        let condition = node
            .child("EntityCondition")
            .and_then(XmlNode::first_child)
            .ok_or_else(|| ParseError::MissingElement("EntityCondition".to_string()))?;

        let kind = match condition.name() {
            "TimeHeadway" | "TimeHeadwayCondition" => ConditionKind::TimeHeadway {
                triggering,
                target: self.entity_ref(condition, ENTITY_KEYS)?,
                value: self.req_f64(condition, "value")?,
                rule: self.req_enum(condition, &["rule"])?,
                along_route: self.bool_or(condition, "alongRoute", false)?,
                freespace: self.bool_or(condition, "freespace", false)?,
            },
            "ReachPosition" | "ReachPositionCondition" => {
                let position = condition
                    .child("Position")
                    .ok_or_else(|| ParseError::MissingElement("ReachPosition/Position".to_string()))?;
                ConditionKind::ReachPosition {
                    triggering,
                    position: self.read_position(position)?,
                    tolerance: self.req_f64(condition, "tolerance")?,
                }
            }
            "RelativeDistance" | "RelativeDistanceCondition" => ConditionKind::RelativeDistance {
                triggering,
                target: self.entity_ref(condition, ENTITY_KEYS)?,
                distance_type: self.req_enum::<RelativeDistanceType>(condition, &["relativeDistanceType", "type"])?,
                value: self.req_f64(condition, "value")?,
                rule: self.req_enum(condition, &["rule"])?,
                freespace: self.bool_or(condition, "freespace", false)?,
            },
            "Distance" | "DistanceCondition" => {
                let position = condition
                    .child("Position")
                    .ok_or_else(|| ParseError::MissingElement("Distance/Position".to_string()))?;
                if self.bool_or(condition, "alongRoute", false)? {
                    warn!("Distance condition alongRoute not supported, using straight-line distance");
                }
                ConditionKind::Distance {
                    triggering,
                    position: self.read_position(position)?,
                    value: self.req_f64(condition, "value")?,
                    rule: self.req_enum(condition, &["rule"])?,
                    freespace: self.bool_or(condition, "freespace", false)?,
                }
            }
            other => {
                warn!("Entity condition {} not supported", other);
                return Ok(None);
            }
        };
        Ok(Some(kind))
    }

    /// Legacy story element state conditions.
    fn read_by_state(&mut self, node: &XmlNode) -> ParseResult<Option<ConditionKind>> {
        let condition = node
            .first_child()
            .ok_or_else(|| ParseError::MissingElement("ByState condition".to_string()))?;
        let kind = match condition.name() {
            "AtStart" => ConditionKind::AtStart {
                element_type: self.req_enum(condition, &["type"])?,
                element_name: self.req_attr(condition, "name")?,
            },
            "AfterTermination" => ConditionKind::AfterTermination {
                element_type: self.req_enum(condition, &["type"])?,
                element_name: self.req_attr(condition, "name")?,
                rule: self.req_enum(condition, &["rule"])?,
            },
            other => {
                warn!("State condition {} not supported", other);
                return Ok(None);
            }
        };
        Ok(Some(kind))
    }

    fn read_by_value(&mut self, node: &XmlNode) -> ParseResult<Option<ConditionKind>> {
        let condition = node
            .first_child()
            .ok_or_else(|| ParseError::MissingElement("ByValue condition".to_string()))?;
        let kind = match condition.name() {
            "SimulationTime" | "SimulationTimeCondition" => ConditionKind::SimulationTime {
                value: self.req_f64(condition, "value")?,
                rule: self.req_enum(condition, &["rule"])?,
            },
            "StoryboardElementStateCondition" => self.read_element_state(condition)?,
            other => {
                warn!("Value condition {} not supported", other);
                return Ok(None);
            }
        };
        Ok(Some(kind))
    }

    /// Map transition states onto the start and termination predicates.
    fn read_element_state(&mut self, node: &XmlNode) -> ParseResult<ConditionKind> {
        let element_type: StoryElementType = self.req_enum(node, &["storyboardElementType"])?;
        let element_name = self.req_attr(node, "storyboardElementRef")?;
        let state = self.req_attr(node, "state")?;
        let rule = match state.as_str() {
            "startTransition" => {
                return Ok(ConditionKind::AtStart {
                    element_type,
                    element_name,
                });
            }
            "runningState" => {
                return Ok(ConditionKind::Running {
                    element_type,
                    element_name,
                });
            }
            "endTransition" | "completeState" => TerminationRule::End,
            "stopTransition" => TerminationRule::Cancel,
            other => return Err(ParseError::invalid("state", other, "unsupported element state")),
        };
        Ok(ConditionKind::AfterTermination {
            element_type,
            element_name,
            rule,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::config::EngineConfig;
    use crate::core::EntityId;
    use crate::model::condition::{ConditionEdge, ConditionKind, Rule, TerminationRule, TriggeringRule};
    use crate::model::entity::{Category, Control, Entity};
    use crate::model::story::StoryElementType;
    use crate::xml::errors::ParseError;
    use crate::xml::node::XmlNode;
    use crate::xml::reader::ScenarioReader;

    fn reader(config: &EngineConfig) -> ScenarioReader<'_> {
        let mut reader = ScenarioReader::new(config, Path::new("."));
        reader.add_entity(Entity::new("Ego", Category::Misc, Control::Internal));
        reader.add_entity(Entity::new("Target", Category::Misc, Control::Internal));
        reader
    }

    #[test]
    fn test_trigger_structure() {
        let config = EngineConfig::default();
        let mut reader = reader(&config);
        let node = XmlNode::parse_str(
            r#"<StartTrigger>
                 <ConditionGroup>
                   <Condition name="t" delay="0.5" conditionEdge="none">
                     <ByValueCondition><SimulationTimeCondition value="2" rule="greaterThan"/></ByValueCondition>
                   </Condition>
                   <Condition name="gap" conditionEdge="rising">
                     <ByEntityCondition>
                       <TriggeringEntities triggeringEntitiesRule="any"><EntityRef entityRef="Ego"/></TriggeringEntities>
                       <EntityCondition>
                         <RelativeDistanceCondition entityRef="Target" relativeDistanceType="longitudinal" value="20" rule="lessThan" freespace="false"/>
                       </EntityCondition>
                     </ByEntityCondition>
                   </Condition>
                 </ConditionGroup>
                 <ConditionGroup/>
               </StartTrigger>"#,
        )
        .unwrap();
        let trigger = reader.read_trigger(&node).unwrap();
        assert_eq!(trigger.groups.len(), 2);
        let first = &trigger.groups[0].conditions;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].delay, 0.5);
        assert_eq!(first[0].edge, ConditionEdge::None);
        assert_eq!(first[0].kind, ConditionKind::SimulationTime {
            value: 2.0,
            rule: Rule::GreaterThan
        });
        let ConditionKind::RelativeDistance { triggering, target, .. } = &first[1].kind else {
            panic!("expected a relative distance condition");
        };
        assert_eq!(triggering.rule, TriggeringRule::Any);
        assert_eq!(triggering.entities, vec![EntityId(0)]);
        assert_eq!(*target, EntityId(1));
    }

    #[test]
    fn test_legacy_state_condition() {
        let config = EngineConfig::default();
        let mut reader = reader(&config);
        let node = XmlNode::parse_str(
            r#"<EndConditions><ConditionGroup>
                 <Condition name="done" delay="0" edge="rising">
                   <ByState><AfterTermination type="event" name="Brake" rule="end"/></ByState>
                 </Condition>
               </ConditionGroup></EndConditions>"#,
        )
        .unwrap();
        let trigger = reader.read_trigger(&node).unwrap();
        assert_eq!(trigger.groups[0].conditions[0].kind, ConditionKind::AfterTermination {
            element_type: StoryElementType::Event,
            element_name: "Brake".to_string(),
            rule: TerminationRule::End,
        });
    }

    #[test]
    fn test_unsupported_conditions_are_dropped() {
        let config = EngineConfig::default();
        let mut reader = reader(&config);
        let collision = r#"<Condition name="crash" conditionEdge="rising">
                 <ByEntityCondition>
                   <TriggeringEntities triggeringEntitiesRule="any"><EntityRef entityRef="Ego"/></TriggeringEntities>
                   <EntityCondition><CollisionCondition><EntityRef entityRef="Target"/></CollisionCondition></EntityCondition>
                 </ByEntityCondition>
               </Condition>"#;
        let node = XmlNode::parse_str(&format!(
            r#"<StartTrigger>
                 <ConditionGroup>
                   {collision}
                   <Condition name="t" conditionEdge="rising">
                     <ByValueCondition><SimulationTimeCondition value="2" rule="greaterThan"/></ByValueCondition>
                   </Condition>
                 </ConditionGroup>
                 <ConditionGroup>
                   <Condition name="param" conditionEdge="rising">
                     <ByValueCondition><ParameterCondition parameterRef="X" value="1" rule="equalTo"/></ByValueCondition>
                   </Condition>
                 </ConditionGroup>
               </StartTrigger>"#
        ))
        .unwrap();
        let trigger = reader.read_trigger(&node).unwrap();
        assert_eq!(trigger.groups.len(), 1);
        assert_eq!(trigger.groups[0].conditions.len(), 1);
        assert_eq!(trigger.groups[0].conditions[0].name, "t");

        // nothing supported left: the trigger must not start its element at once
        let only_collision =
            XmlNode::parse_str(&format!("<StartTrigger><ConditionGroup>{collision}</ConditionGroup></StartTrigger>")).unwrap();
        let trigger = reader.read_trigger(&only_collision).unwrap();
        assert!(!trigger.is_empty());
        assert!(trigger.groups[0].conditions.is_empty());
    }

    #[test]
    fn test_element_state_mapping() {
        let config = EngineConfig::default();
        let mut reader = reader(&config);
        let read_state = |reader: &mut ScenarioReader<'_>, state: &str| {
            let node = XmlNode::parse_str(&format!(
                r#"<StartTrigger><ConditionGroup>
                     <Condition name="s" conditionEdge="none">
                       <ByValueCondition>
                         <StoryboardElementStateCondition storyboardElementType="event" storyboardElementRef="Brake" state="{state}"/>
                       </ByValueCondition>
                     </Condition>
                   </ConditionGroup></StartTrigger>"#
            ))
            .unwrap();
            reader.read_trigger(&node).unwrap().groups[0].conditions[0].kind.clone()
        };
        assert_eq!(read_state(&mut reader, "runningState"), ConditionKind::Running {
            element_type: StoryElementType::Event,
            element_name: "Brake".to_string(),
        });
        assert_eq!(read_state(&mut reader, "startTransition"), ConditionKind::AtStart {
            element_type: StoryElementType::Event,
            element_name: "Brake".to_string(),
        });
        assert_eq!(read_state(&mut reader, "stopTransition"), ConditionKind::AfterTermination {
            element_type: StoryElementType::Event,
            element_name: "Brake".to_string(),
            rule: TerminationRule::Cancel,
        });
    }

    #[test]
    fn test_distance_along_route_uses_straight_line() {
        let config = EngineConfig::default();
        let mut reader = reader(&config);
        let node = XmlNode::parse_str(
            r#"<StartTrigger><ConditionGroup>
                 <Condition name="near" conditionEdge="rising">
                   <ByEntityCondition>
                     <TriggeringEntities triggeringEntitiesRule="any"><EntityRef entityRef="Ego"/></TriggeringEntities>
                     <EntityCondition>
                       <DistanceCondition value="20" freespace="false" alongRoute="true" rule="lessThan">
                         <Position><WorldPosition x="50" y="0"/></Position>
                       </DistanceCondition>
                     </EntityCondition>
                   </ByEntityCondition>
                 </Condition>
               </ConditionGroup></StartTrigger>"#,
        )
        .unwrap();
        let trigger = reader.read_trigger(&node).unwrap();
        assert!(matches!(
            trigger.groups[0].conditions[0].kind,
            ConditionKind::Distance { value, rule: Rule::LessThan, freespace: false, .. } if value == 20.0
        ));
    }

    #[test]
    fn test_bad_rule_is_fatal() {
        let config = EngineConfig::default();
        let mut reader = reader(&config);
        let node = XmlNode::parse_str(
            r#"<StartTrigger><ConditionGroup>
                 <Condition name="t" conditionEdge="rising">
                   <ByValueCondition><SimulationTimeCondition value="2" rule="sometimes"/></ByValueCondition>
                 </Condition>
               </ConditionGroup></StartTrigger>"#,
        )
        .unwrap();
        assert!(matches!(
            reader.read_trigger(&node).unwrap_err(),
            ParseError::InvalidValue { field, .. } if field == "rule"
        ));
    }
}
