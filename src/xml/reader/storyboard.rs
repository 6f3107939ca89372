use log::{debug, info, warn};

use crate::catalog::CatalogType;
use crate::core::EntityId;
use crate::model::action::{Action, ActionKind};
use crate::model::condition::Trigger;
use crate::model::story::{Act, Event, EventPriority, Init, Maneuver, ManeuverGroup, Story, StoryBoard};
use crate::xml::errors::{ErrorContext, ParseError, ParseResult};
use crate::xml::node::XmlNode;
use crate::xml::reader::ScenarioReader;

const NO_NAME: &str = "no name";

impl ScenarioReader<'_> {
    pub(super) fn read_init(&mut self, node: &XmlNode) -> ParseResult<Init> {
        let mut init = Init::default();
        let Some(actions) = node.child("Actions") else {
            return Ok(init);
        };

        for child in actions.children() {
            match child.name() {
                "Private" => {
                    let owner = self.entity_ref(child, &["entityRef", "object"])?;
                    let owners = self.with_ghost(owner);
                    for container in child.children() {
                        for &owner in &owners {
                            let Some(action) = self.read_private_action(container, owner)? else {
                                continue;
                            };
                            let name = format!("Init {} {}", self.entities[owner].name, action.type_name());
                            init.actions.push(Action::new(&name, ActionKind::Private { owner, action }));
                        }
                    }
                }
                "Global" | "GlobalAction" | "UserDefined" | "UserDefinedAction" => {
                    warn!("{} in Init is not supported, ignored", child.name());
                }
                other => warn!("Unexpected element {} in Init", other),
            }
        }
        debug!("{} init actions", init.actions.len());
        Ok(init)
    }

    pub(super) fn read_storyboard(&mut self, node: &XmlNode) -> ParseResult<StoryBoard> {
        let mut storyboard = StoryBoard::default();
        for child in node.children() {
            match child.name() {
                "Init" => {}
                "Story" => {
                    let name = self.attr(child, "name")?.unwrap_or_default();
                    let story = self
                        .scoped(|r| r.read_story(child, &name))
                        .map_err(|e| e.in_context(ErrorContext::new().with_parsing(format!("Story {}", name))))?;
                    storyboard.stories.push(story);
                }
                "StopTrigger" | "EndConditions" => storyboard.stop_trigger = self.read_trigger(child)?,
                other => warn!("Unexpected element {} in Storyboard", other),
            }
        }
        if storyboard.stop_trigger.is_empty() {
            info!("Storyboard has no stop trigger, the run ends only on request");
        }
        Ok(storyboard)
    }

    fn read_story(&mut self, node: &XmlNode, name: &str) -> ParseResult<Story> {
        if let Some(decls) = node.child("ParameterDeclarations") {
            self.declare_parameters(decls)?;
        }
        let mut acts = Vec::new();
        for act in node.children_named("Act") {
            acts.push(self.read_act(act)?);
        }
        Ok(Story::new(name, acts))
    }

    fn read_act(&mut self, node: &XmlNode) -> ParseResult<Act> {
        let name = self.req_attr(node, "name")?;
        let mut groups = Vec::new();
        let mut start_trigger = Trigger::default();
        let mut stop_trigger = Trigger::default();

        for child in node.children() {
            match child.name() {
                "ManeuverGroup" | "Sequence" => groups.push(self.read_maneuver_group(child)?),
                "StartTrigger" => start_trigger = self.read_trigger(child)?,
                "StopTrigger" | "EndTrigger" => stop_trigger = self.read_trigger(child)?,
                "Conditions" => {
                    for gate in child.children() {
                        match gate.name() {
                            "Start" => start_trigger = self.read_trigger(gate)?,
                            // both end the act: fold them into one stop trigger
                            "End" | "Cancel" => stop_trigger.groups.extend(self.read_trigger(gate)?.groups),
                            other => warn!("Unexpected element {} in Act conditions", other),
                        }
                    }
                }
                other => warn!("Unexpected element {} in Act {}", other, name),
            }
        }
        Ok(Act::new(&name, groups, start_trigger, stop_trigger))
    }

    fn read_maneuver_group(&mut self, node: &XmlNode) -> ParseResult<ManeuverGroup> {
        let name = self.req_attr(node, "name")?;
        let executions = self
            .attr_any(node, &["numberOfExecutions", "maximumExecutionCount"])?
            .map(|n| super::parse_number::<i64>("numberOfExecutions", &n))
            .transpose()?;
        let number_of_executions = match executions {
            Some(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
            Some(n) => {
                warn!("ManeuverGroup {}: numberOfExecutions {} raised to 1", name, n);
                1
            }
            None => 1,
        };

        let mut actors = Vec::new();
        if let Some(node) = node.child("Actors") {
            for actor in node.children() {
                let id = match actor.name() {
                    "EntityRef" => self.entity_ref(actor, &["entityRef"])?,
                    "Entity" => self.entity_ref(actor, &["name"])?,
                    other => {
                        warn!("Unexpected element {} in Actors", other);
                        continue;
                    }
                };
                for id in self.with_ghost(id) {
                    if !actors.contains(&id) {
                        actors.push(id);
                    }
                }
            }
        }

        let mut maneuvers = Vec::new();
        for child in node.children() {
            match child.name() {
                "Maneuver" => maneuvers.push(self.scoped(|r| r.read_maneuver(child, &actors))?),
                "CatalogReference" => {
                    let maneuver = self.resolve_catalog_reference(child, |reader, entry_name, entry| match entry {
                        Some(entry) if entry.catalog_type == CatalogType::Maneuver => {
                            reader.read_maneuver(&entry.node, &actors)
                        }
                        Some(entry) => Err(ParseError::Catalog(format!(
                            "entry {} is a {}, expected a maneuver",
                            entry_name, entry.catalog_type
                        ))),
                        None => Err(ParseError::Catalog(format!("maneuver {} not found", entry_name))),
                    })?;
                    maneuvers.push(maneuver);
                }
                _ => {}
            }
        }

        Ok(ManeuverGroup::new(&name, number_of_executions, actors, maneuvers))
    }

    fn read_maneuver(&mut self, node: &XmlNode, actors: &[EntityId]) -> ParseResult<Maneuver> {
        let name = self.req_attr(node, "name")?;
        let parameters = match node.child("ParameterDeclarations") {
            Some(decls) => self.declare_parameters(decls)?,
            None => Vec::new(),
        };
        let mut events = Vec::new();
        for event in node.children_named("Event") {
            let event = self
                .read_event(event, actors)
                .map_err(|e| e.in_context(ErrorContext::new().with_parsing(format!("Maneuver {}", name))))?;
            events.push(event);
        }
        Ok(Maneuver::new(&name, parameters, events))
    }

    fn read_event(&mut self, node: &XmlNode, actors: &[EntityId]) -> ParseResult<Event> {
        let name = self.req_attr(node, "name")?;
        if !node.attrs().has("priority") {
            warn!("Event {} has no priority, using overwrite", name);
        }
        let priority = self.enum_or(node, &["priority"], EventPriority::Overwrite)?;

        let mut actions = Vec::new();
        let mut start_trigger = Trigger::default();
        for child in node.children() {
            match child.name() {
                "Action" => actions.extend(self.read_action(child, actors)?),
                "StartTrigger" | "StartConditions" => start_trigger = self.read_trigger(child)?,
                other => warn!("Unexpected element {} in Event {}", other, name),
            }
        }
        if actions.is_empty() {
            warn!("Event {} has no supported actions", name);
        }
        Ok(Event::new(&name, priority, actions, start_trigger))
    }

    /// One `Action` element. Private actions are instantiated once per actor.
    fn read_action(&mut self, node: &XmlNode, actors: &[EntityId]) -> ParseResult<Vec<Action>> {
        let name = self.attr(node, "name")?.unwrap_or_else(|| NO_NAME.to_string());
        let Some(body) = node.first_child() else {
            warn!("Action {} is empty", name);
            return Ok(Vec::new());
        };

        let actions = match body.name() {
            "Global" | "GlobalAction" => self.read_global_action(body, &name)?.into_iter().collect(),
            "UserDefined" | "UserDefinedAction" => self.read_user_defined_action(body, &name)?.into_iter().collect(),
            "Private" | "PrivateAction" => {
                let mut actions = Vec::new();
                for &owner in actors {
                    if let Some(action) = self.read_private_action(body, owner)? {
                        actions.push(Action::new(&name, ActionKind::Private { owner, action }));
                    }
                }
                actions
            }
            other => {
                warn!("Unsupported action category {}", other);
                Vec::new()
            }
        };
        Ok(actions)
    }

    /// The entity followed by its ghost, if it has one.
    fn with_ghost(&self, id: EntityId) -> Vec<EntityId> {
        std::iter::once(id).chain(self.entities[id].ghost).collect()
    }
}
