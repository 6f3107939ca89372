use log::{debug, info, warn};
use rand::Rng;

use crate::catalog::{CatalogType, Entry};
use crate::config::RequestedControl;
use crate::core::EntityId;
use crate::model::entity::{BoundingBox, Category, Control, Entity, GHOST_SUFFIX, VehicleCategory};
use crate::xml::errors::{ErrorContext, ParseResult};
use crate::xml::node::XmlNode;
use crate::xml::reader::ScenarioReader;

impl ScenarioReader<'_> {
    pub(super) fn read_entities(&mut self, node: &XmlNode) -> ParseResult<()> {
        for object in node.children() {
            if !matches!(object.name(), "Object" | "ScenarioObject") {
                warn!("Unsupported entity element {}, ignored", object.name());
                continue;
            }
            let name = self.req_attr(object, "name")?;
            let entity = self
                .read_object(object)
                .map_err(|e| e.in_context(ErrorContext::new().with_parsing(format!("Entity {}", name))))?;
            let Some(mut entity) = entity else {
                warn!("Entity {} has no definition, ignored", name);
                continue;
            };
            if self.entities.find_by_name(&name).is_some() {
                warn!("Duplicate entity name {}", name);
            }
            entity.name = name;
            self.add_entity(entity);
        }
        Ok(())
    }

    fn read_object(&mut self, object: &XmlNode) -> ParseResult<Option<Entity>> {
        let mut entity = None;
        for child in object.children() {
            match child.name() {
                "CatalogReference" => {
                    entity = Some(self.resolve_catalog_reference(child, |reader, entry_name, entry| {
                        reader.entity_from_catalog(entry_name, entry)
                    })?);
                }
                "Vehicle" => entity = Some(self.scoped(|r| r.read_vehicle(child))?),
                "Pedestrian" => entity = Some(self.scoped(|r| r.read_pedestrian(child))?),
                "MiscObject" => entity = Some(self.scoped(|r| r.read_misc_object(child))?),
                "Controller" | "ObjectController" => {
                    debug!("Controller definitions are not simulated, ignored");
                }
                other => warn!("Unsupported element {} in entity definition", other),
            }
        }
        Ok(entity)
    }

    fn entity_from_catalog(&mut self, entry_name: &str, entry: Option<&Entry>) -> ParseResult<Entity> {
        match entry {
            Some(entry) => match entry.catalog_type {
                CatalogType::Vehicle => self.read_vehicle(&entry.node),
                CatalogType::Pedestrian => self.read_pedestrian(&entry.node),
                CatalogType::MiscObject => self.read_misc_object(&entry.node),
                other => {
                    warn!("Catalog entry {} is a {}, not an entity", entry_name, other);
                    Ok(self.fallback_vehicle(entry_name))
                }
            },
            None => Ok(self.fallback_vehicle(entry_name)),
        }
    }

    /// Generic internally controlled car standing in for a definition that
    /// could not be found.
    fn fallback_vehicle(&mut self, definition_name: &str) -> Entity {
        let mut entity = Entity::new(definition_name, Category::Vehicle(VehicleCategory::Car), Control::Internal);
        entity.definition_name = definition_name.to_string();
        if self.config.fallback_model_count > 0 {
            entity.model_id = self.rng.gen_range(0..self.config.fallback_model_count) as i32;
        }
        warn!(
            "Vehicle {} not found, using a generic car (model {})",
            definition_name, entity.model_id
        );
        entity
    }

    fn read_vehicle(&mut self, node: &XmlNode) -> ParseResult<Entity> {
        self.declare_local_parameters(node)?;
        let name = self.attr(node, "name")?.unwrap_or_default();
        let category = self.enum_or(node, &["vehicleCategory", "category"], VehicleCategory::Car)?;
        let mut entity = Entity::new(&name, Category::Vehicle(category), Control::Internal);
        self.read_common(node, &mut entity)?;
        Ok(entity)
    }

    fn read_pedestrian(&mut self, node: &XmlNode) -> ParseResult<Entity> {
        self.declare_local_parameters(node)?;
        let name = self.attr(node, "name")?.unwrap_or_default();
        let mut entity = Entity::new(&name, Category::Pedestrian, Control::Internal);
        if let Some(model) = self.attr(node, "model")? {
            entity.model_filepath = model;
        }
        self.read_common(node, &mut entity)?;
        Ok(entity)
    }

    fn read_misc_object(&mut self, node: &XmlNode) -> ParseResult<Entity> {
        self.declare_local_parameters(node)?;
        let name = self.attr(node, "name")?.unwrap_or_default();
        let mut entity = Entity::new(&name, Category::Misc, Control::Internal);
        self.read_common(node, &mut entity)?;
        Ok(entity)
    }

    fn declare_local_parameters(&mut self, node: &XmlNode) -> ParseResult<()> {
        if let Some(decls) = node.child("ParameterDeclarations") {
            self.declare_parameters(decls)?;
        }
        Ok(())
    }

    /// Bounding box and properties shared by all object kinds.
    fn read_common(&mut self, node: &XmlNode, entity: &mut Entity) -> ParseResult<()> {
        if let Some(dimensions) = node.descend(&["BoundingBox", "Dimensions"]) {
            let defaults = BoundingBox::default();
            entity.bounding_box = BoundingBox {
                length: self.f64_or(dimensions, "length", defaults.length)?,
                width: self.f64_or(dimensions, "width", defaults.width)?,
                height: self.f64_or(dimensions, "height", defaults.height)?,
            };
        }

        let Some(properties) = node.child("Properties") else {
            return Ok(());
        };
        for property in properties.children() {
            match property.name() {
                "Property" => {
                    let name = self.req_attr(property, "name")?;
                    let value = self.req_attr(property, "value")?;
                    self.apply_property(entity, &name, &value);
                }
                "File" => entity.model_filepath = self.req_attr(property, "filepath")?,
                other => warn!("Unsupported property element {}", other),
            }
        }
        Ok(())
    }

    fn apply_property(&self, entity: &mut Entity, name: &str, value: &str) {
        match name {
            "control" => {
                entity.control = match value {
                    "internal" => Control::Internal,
                    "external" => Control::External,
                    "hybrid" => Control::HybridExternal,
                    other => {
                        warn!("{}: unknown control '{}', using internal", entity.name, other);
                        Control::Internal
                    }
                }
            }
            "model_id" => match value.trim().parse() {
                Ok(id) => entity.model_id = id,
                Err(_) => warn!("{}: invalid model_id '{}'", entity.name, value),
            },
            other => debug!("{}: unsupported property {} ignored", entity.name, other),
        }
    }

    /// Add an entity. A hybrid entity brings its internally driven ghost
    /// with it, registered right after.
    pub(super) fn add_entity(&mut self, entity: Entity) -> EntityId {
        let hybrid = entity.control == Control::HybridExternal;
        let ghost = hybrid.then(|| {
            let mut ghost = entity.clone();
            ghost.name = format!("{}{}", entity.name, GHOST_SUFFIX);
            ghost.control = Control::HybridGhost;
            ghost
        });
        let id = self.entities.push(entity);
        if let Some(ghost) = ghost {
            let ghost_id = self.entities.push(ghost);
            self.entities[id].ghost = Some(ghost_id);
            info!("{}: hybrid control with ghost {}", self.entities[id].name, self.entities[ghost_id].name);
        }
        id
    }

    /// Override the control mode of the first entity on request.
    pub(super) fn apply_requested_control(&mut self) {
        let Some(first) = self.entities.iter().next().map(|e| e.id) else {
            return;
        };
        let control = match self.config.control {
            RequestedControl::ByScenario => return,
            RequestedControl::Internal => Control::Internal,
            RequestedControl::External => Control::External,
            RequestedControl::Hybrid => Control::HybridExternal,
        };
        let entity = &mut self.entities[first];
        info!("{}: control set to {:?} by request", entity.name, control);
        entity.control = control;

        if control == Control::HybridExternal && entity.ghost.is_none() {
            let mut ghost = entity.clone();
            ghost.name = format!("{}{}", entity.name, GHOST_SUFFIX);
            ghost.control = Control::HybridGhost;
            let ghost_id = self.entities.push(ghost);
            self.entities[first].ghost = Some(ghost_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::config::{EngineConfig, RequestedControl};
    use crate::model::entity::{Category, Control, VehicleCategory};
    use crate::xml::node::XmlNode;
    use crate::xml::reader::ScenarioReader;

    fn read(config: &EngineConfig, xml: &str) -> crate::model::entity::Entities {
        let mut reader = ScenarioReader::new(config, Path::new("."));
        reader.read_entities(&XmlNode::parse_str(xml).unwrap()).unwrap();
        reader.apply_requested_control();
        reader.entities
    }

    #[test]
    fn test_inline_vehicle() {
        let config = EngineConfig::default();
        let entities = read(
            &config,
            r#"<Entities>
                 <Object name="Target">
                   <Vehicle name="truck_red" vehicleCategory="truck">
                     <BoundingBox><Dimensions width="2.5" length="12" height="3.5"/></BoundingBox>
                     <Properties>
                       <Property name="model_id" value="4"/>
                       <File filepath="models/truck.osgb"/>
                     </Properties>
                   </Vehicle>
                 </Object>
               </Entities>"#,
        );
        let target = &entities[entities.find_by_name("Target").unwrap()];
        assert_eq!(target.definition_name, "truck_red");
        assert_eq!(target.category, Category::Vehicle(VehicleCategory::Truck));
        assert_eq!(target.bounding_box.length, 12.0);
        assert_eq!(target.model_id, 4);
        assert_eq!(target.model_filepath, "models/truck.osgb");
        assert_eq!(target.control, Control::Internal);
    }

    #[test]
    fn test_missing_catalog_gives_fallback() {
        let config = EngineConfig::default();
        let entities = read(
            &config,
            r#"<Entities>
                 <Object name="Ego">
                   <CatalogReference catalogName="VehicleCatalog" entryName="car_blue"/>
                 </Object>
               </Entities>"#,
        );
        let ego = &entities[entities.find_by_name("Ego").unwrap()];
        assert_eq!(ego.definition_name, "car_blue");
        assert_eq!(ego.category, Category::Vehicle(VehicleCategory::Car));
        assert_eq!(ego.control, Control::Internal);
        assert!((0..10).contains(&ego.model_id));
    }

    #[test]
    fn test_hybrid_property_adds_ghost() {
        let config = EngineConfig::default();
        let entities = read(
            &config,
            r#"<Entities>
                 <Object name="Ego">
                   <Vehicle name="car" vehicleCategory="car">
                     <Properties><Property name="control" value="hybrid"/></Properties>
                   </Vehicle>
                 </Object>
                 <Object name="Target"><Vehicle name="car" vehicleCategory="car"/></Object>
               </Entities>"#,
        );
        let names: Vec<_> = entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Ego", "Ego_ghost", "Target"]);
        let ego = &entities[entities.find_by_name("Ego").unwrap()];
        assert_eq!(ego.control, Control::HybridExternal);
        assert_eq!(ego.ghost, entities.find_by_name("Ego_ghost"));
        assert_eq!(entities[ego.ghost.unwrap()].control, Control::HybridGhost);
    }

    #[test]
    fn test_requested_control_applies_to_first_entity() {
        let config = EngineConfig {
            control: RequestedControl::External,
            ..EngineConfig::default()
        };
        let entities = read(
            &config,
            r#"<Entities>
                 <Object name="Ego"><Vehicle name="car" vehicleCategory="car"/></Object>
                 <Object name="Target"><Vehicle name="car" vehicleCategory="car"/></Object>
               </Entities>"#,
        );
        assert_eq!(entities.iter().map(|e| e.control).collect::<Vec<_>>(), [
            Control::External,
            Control::Internal
        ]);
    }
}
