//! Scenario document reader.
//!
//! [`ScenarioReader`] walks the element tree of a scenario document and
//! builds the in-memory graph. It owns the parameter stack and the catalog
//! registry for the duration of one load, so every `$name` reference and
//! every catalog reference is resolved against explicit, scoped state.
//!
//! Submodules add the walkers for each document section.

mod actions;
mod conditions;
mod entities;
mod position;
mod road_network;
mod storyboard;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::catalog::{Catalogs, Entry};
use crate::config::EngineConfig;
use crate::core::EntityId;
use crate::model::entity::Entities;
use crate::model::story::{Init, StoryBoard};
use crate::parameters::{Parameter, ParameterDeclarations, ParameterType, bare_name};
use crate::types::{Validate, ValidationResult};
use crate::validation_utils::{_chain, _return, find_duplicates};
use crate::xml::errors::{ErrorContext, ParseError, ParseResult};
use crate::xml::node::XmlNode;

pub use road_network::RoadNetwork;

/// A fully loaded scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Source document, when loaded from disk.
    pub path: Option<PathBuf>,
    pub road_network: RoadNetwork,
    /// Global parameter declarations.
    pub parameters: Vec<Parameter>,
    pub entities: Entities,
    pub init: Init,
    pub storyboard: StoryBoard,
}

impl Scenario {
    /// Load a scenario file. Relative paths inside it resolve against the
    /// file's directory.
    pub fn from_file(path: impl AsRef<Path>, config: &EngineConfig) -> ParseResult<Self> {
        let path = path.as_ref();
        info!("Loading scenario {}", path.display());
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let result = XmlNode::parse_file(path).and_then(|root| {
            ScenarioReader::new(config, &base_dir)
                .read(&root)
                .map_err(|e| e.in_context(ErrorContext::with_file_path(path)))
        });

        match result {
            Ok(mut scenario) => {
                scenario.path = Some(path.to_path_buf());
                Ok(scenario)
            }
            Err(e) => {
                error!("Failed to load scenario: {}", e);
                Err(e)
            }
        }
    }

    /// Load a scenario held in memory. `base_dir` anchors relative paths.
    pub fn from_str(xml: &str, base_dir: impl AsRef<Path>, config: &EngineConfig) -> ParseResult<Self> {
        let result = XmlNode::parse_str(xml)
            .and_then(|root| ScenarioReader::new(config, base_dir.as_ref()).read(&root));
        if let Err(e) = &result {
            error!("Failed to load scenario: {}", e);
        }
        result
    }
}

impl Validate for Scenario {
    fn validate(&self) -> ValidationResult {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for name in find_duplicates(self.entities.iter().map(|e| e.name.clone())) {
            warnings.push(format!("Duplicate entity name: {}", name));
        }
        if self.road_network.logic_file.as_os_str().is_empty() {
            warnings.push("No road network logic file".to_string());
        }
        for warning in &warnings {
            warn!("{}", warning);
        }
        _chain(self.storyboard.validate(), &mut warnings, &mut errors);

        _return(warnings, errors)
    }
}

/// Document reader state for one load.
#[derive(Debug)]
pub struct ScenarioReader<'c> {
    config: &'c EngineConfig,
    base_dir: PathBuf,
    params: ParameterDeclarations,
    catalogs: Catalogs,
    /// Parameter assignments of the catalog reference being resolved.
    assignments: Vec<(String, String)>,
    entities: Entities,
    rng: StdRng,
}

impl<'c> ScenarioReader<'c> {
    pub fn new(config: &'c EngineConfig, base_dir: &Path) -> Self {
        Self {
            config,
            base_dir: base_dir.to_path_buf(),
            params: ParameterDeclarations::new(),
            catalogs: Catalogs::new(),
            assignments: Vec::new(),
            entities: Entities::new(),
            rng: StdRng::seed_from_u64(config.fallback_seed),
        }
    }

    pub fn parameters(&self) -> &ParameterDeclarations {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterDeclarations {
        &mut self.params
    }

    pub fn catalogs_mut(&mut self) -> &mut Catalogs {
        &mut self.catalogs
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Read a complete `OpenSCENARIO` document.
    pub fn read(mut self, root: &XmlNode) -> ParseResult<Scenario> {
        if root.name() != "OpenSCENARIO" {
            return Err(ParseError::UnexpectedElement {
                expected: "OpenSCENARIO".to_string(),
                found: root.name().to_string(),
            });
        }

        let parameters = match root.child("ParameterDeclarations") {
            Some(node) => self
                .declare_parameters(node)
                .map_err(|e| e.in_context(ErrorContext::new().with_parsing("ParameterDeclarations")))?,
            None => Vec::new(),
        };

        if let Some(node) = root.child("CatalogLocations") {
            self.read_catalog_locations(node)
                .map_err(|e| e.in_context(ErrorContext::new().with_parsing("CatalogLocations")))?;
        }
        for dir in &self.config.catalog_dirs {
            let dir = self.base_dir.join(dir);
            self.catalogs.register_directory("Config", dir);
        }

        let road_network = self
            .read_road_network(root.child("RoadNetwork"))
            .map_err(|e| e.in_context(ErrorContext::new().with_parsing("RoadNetwork")))?;

        match root.child("Entities") {
            Some(node) => self
                .read_entities(node)
                .map_err(|e| e.in_context(ErrorContext::new().with_parsing("Entities")))?,
            None => warn!("Scenario has no Entities section"),
        }
        self.apply_requested_control();
        info!("{} entities", self.entities.len());

        let storyboard_node = root
            .child("Storyboard")
            .ok_or_else(|| ParseError::MissingElement("Storyboard".to_string()))?;
        let init = match storyboard_node.child("Init") {
            Some(node) => self
                .read_init(node)
                .map_err(|e| e.in_context(ErrorContext::new().with_parsing("Storyboard/Init")))?,
            None => Init::default(),
        };
        let storyboard = self
            .read_storyboard(storyboard_node)
            .map_err(|e| e.in_context(ErrorContext::new().with_parsing("Storyboard")))?;

        let scenario = Scenario {
            path: None,
            road_network,
            parameters,
            entities: self.entities,
            init,
            storyboard,
        };
        let validation = scenario.validate();
        debug!("Validation finished with {} warnings", validation.warnings().len());
        Ok(scenario)
    }

    /// Substitute a `$name` reference with its innermost declared value.
    pub fn resolve(&self, raw: &str) -> ParseResult<String> {
        if raw.starts_with('$') {
            let value = self
                .params
                .lookup(raw)
                .ok_or_else(|| ParseError::UnresolvedParameter(raw.to_string()))?;
            debug!("Resolved {} = {}", raw, value);
            Ok(value.to_string())
        } else {
            Ok(raw.to_string())
        }
    }

    /// Resolved value of an optional attribute.
    pub(crate) fn attr(&self, node: &XmlNode, key: &str) -> ParseResult<Option<String>> {
        node.attrs().get_opt(key).map(|raw| self.resolve(raw)).transpose()
    }

    /// First present attribute among `keys`, resolved.
    pub(crate) fn attr_any(&self, node: &XmlNode, keys: &[&str]) -> ParseResult<Option<String>> {
        match keys.iter().find(|key| node.attrs().has(key)) {
            Some(key) => self.attr(node, key),
            None => Ok(None),
        }
    }

    pub(crate) fn req_attr(&self, node: &XmlNode, key: &str) -> ParseResult<String> {
        self.attr(node, key)?
            .ok_or_else(|| ParseError::MissingAttribute(format!("{}@{}", node.name(), key)))
    }

    pub(crate) fn req_attr_any(&self, node: &XmlNode, keys: &[&str]) -> ParseResult<String> {
        self.attr_any(node, keys)?
            .ok_or_else(|| ParseError::MissingAttribute(format!("{}@{}", node.name(), keys.join("|"))))
    }

    pub(crate) fn f64_attr(&self, node: &XmlNode, key: &str) -> ParseResult<Option<f64>> {
        self.attr(node, key)?
            .map(|v| parse_number::<f64>(key, &v))
            .transpose()
    }

    pub(crate) fn f64_or(&self, node: &XmlNode, key: &str, default: f64) -> ParseResult<f64> {
        Ok(self.f64_attr(node, key)?.unwrap_or(default))
    }

    pub(crate) fn req_f64(&self, node: &XmlNode, key: &str) -> ParseResult<f64> {
        let value = self.req_attr(node, key)?;
        parse_number(key, &value)
    }

    pub(crate) fn req_i32(&self, node: &XmlNode, key: &str) -> ParseResult<i32> {
        let value = self.req_attr(node, key)?;
        parse_number(key, &value)
    }

    pub(crate) fn bool_or(&self, node: &XmlNode, key: &str, default: bool) -> ParseResult<bool> {
        match self.attr(node, key)? {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => Err(ParseError::invalid(key, other, "expected a boolean")),
            },
        }
    }

    /// Optional enumerated attribute: missing or unknown values fall back to
    /// `default`, the latter with a warning.
    pub(crate) fn enum_or<T>(&self, node: &XmlNode, keys: &[&str], default: T) -> ParseResult<T>
    where
        T: FromStr<Err = String> + std::fmt::Debug,
    {
        match self.attr_any(node, keys)? {
            None => Ok(default),
            Some(v) => Ok(v.parse().unwrap_or_else(|e: String| {
                warn!("{}: {}, using {:?}", node.name(), e, default);
                default
            })),
        }
    }

    /// Required enumerated attribute.
    pub(crate) fn req_enum<T>(&self, node: &XmlNode, keys: &[&str]) -> ParseResult<T>
    where
        T: FromStr<Err = String>,
    {
        let value = self.req_attr_any(node, keys)?;
        value
            .parse()
            .map_err(|e: String| ParseError::invalid(keys[0], &value, e))
    }

    /// Resolve an entity reference by exact name.
    pub(crate) fn entity_ref(&self, node: &XmlNode, keys: &[&str]) -> ParseResult<EntityId> {
        let name = self.req_attr_any(node, keys)?;
        self.find_entity(&name)
    }

    pub(crate) fn find_entity(&self, name: &str) -> ParseResult<EntityId> {
        self.entities
            .find_by_name(name)
            .ok_or_else(|| ParseError::UnknownEntity(name.to_string()))
    }

    /// Declare every parameter under a `ParameterDeclarations` element in the
    /// current scope. Active catalog assignments override declared defaults.
    pub fn declare_parameters(&mut self, node: &XmlNode) -> ParseResult<Vec<Parameter>> {
        let mut declared = Vec::new();
        for decl in node.children() {
            if !matches!(decl.name(), "ParameterDeclaration" | "Parameter") {
                warn!("Unexpected element {} in ParameterDeclarations", decl.name());
                continue;
            }
            let name = self.req_attr(decl, "name")?;
            let parameter_type = match self.attr_any(decl, &["parameterType", "type"])? {
                Some(t) => t
                    .parse::<ParameterType>()
                    .map_err(|e| ParseError::invalid("parameterType", &t, e))?,
                None => {
                    warn!("Parameter {} has no type, assuming string", name);
                    ParameterType::String
                }
            };
            let assigned = self
                .assignments
                .iter()
                .find(|(n, _)| n == bare_name(&name))
                .map(|(_, v)| v.clone());
            let value = match assigned {
                Some(value) => {
                    debug!("Parameter {} assigned {}", name, value);
                    value
                }
                None => self.req_attr(decl, "value")?,
            };
            self.params.declare(&name, parameter_type, value.clone());
            declared.push(Parameter {
                name: bare_name(&name).to_string(),
                parameter_type,
                value,
            });
        }
        Ok(declared)
    }

    /// Resolved `(name, value)` pairs assigned by a catalog reference.
    fn parameter_assignments(&self, reference: &XmlNode) -> ParseResult<Vec<(String, String)>> {
        let mut assignments = Vec::new();
        let containers = reference
            .children()
            .filter(|c| matches!(c.name(), "ParameterAssignments" | "ParameterAssignment"));
        for container in containers {
            for assignment in container.children() {
                let name = self.req_attr_any(assignment, &["parameterRef", "name"])?;
                let value = self.req_attr(assignment, "value")?;
                assignments.push((bare_name(&name).to_string(), value));
            }
        }
        Ok(assignments)
    }

    /// Resolve a `CatalogReference` and hand its entry to `f`.
    ///
    /// The entry's parameter declarations see this reference's assignments.
    /// Everything declared while `f` runs is dropped afterwards, whether `f`
    /// succeeds or not. `f` receives `None` when the catalog or the entry
    /// cannot be found.
    pub fn resolve_catalog_reference<T>(
        &mut self,
        reference: &XmlNode,
        f: impl FnOnce(&mut Self, &str, Option<&Entry>) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let catalog_name = self.req_attr(reference, "catalogName")?;
        let entry_name = self.req_attr(reference, "entryName")?;
        let assignments = self.parameter_assignments(reference)?;

        let catalog = self.catalogs.load(&catalog_name)?;
        let entry = catalog.as_ref().and_then(|c| c.find_entry(&entry_name));
        if catalog.is_some() && entry.is_none() {
            warn!("Couldn't find entry {} in catalog {}", entry_name, catalog_name);
        }

        let checkpoint = self.params.checkpoint();
        let outer = std::mem::replace(&mut self.assignments, assignments);
        let result = f(self, &entry_name, entry);
        self.assignments = outer;
        self.params.restore(checkpoint);

        result.map_err(|e| {
            e.in_context(ErrorContext::new().with_parsing(format!("CatalogReference {}/{}", catalog_name, entry_name)))
        })
    }

    /// Run `f` in a parameter scope that is popped afterwards.
    pub(crate) fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let checkpoint = self.params.checkpoint();
        let result = f(self);
        self.params.restore(checkpoint);
        result
    }
}

fn parse_number<T: FromStr>(field: &str, value: &str) -> ParseResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ParseError::invalid(field, value, e))
}
