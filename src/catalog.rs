//! Catalogs: named libraries of reusable document fragments.
//!
//! Catalog directories are registered while the `CatalogLocations` section is
//! read. A catalog is located lazily, the first time a `CatalogReference`
//! names it, by probing each registered directory in registration order for
//! `<catalogName>.xosc`. Loaded catalogs are cached for the rest of the load.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::xml::errors::{ErrorContext, ParseError, ParseResult};
use crate::xml::node::XmlNode;

/// Kind of fragment a catalog holds, inferred from its entry elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogType {
    Vehicle,
    Driver,
    Pedestrian,
    PedestrianController,
    MiscObject,
    Environment,
    Maneuver,
    Trajectory,
    Route,
    Controller,
}

impl CatalogType {
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "Vehicle" => Some(CatalogType::Vehicle),
            "Driver" => Some(CatalogType::Driver),
            "Pedestrian" => Some(CatalogType::Pedestrian),
            "PedestrianController" => Some(CatalogType::PedestrianController),
            "MiscObject" => Some(CatalogType::MiscObject),
            "Environment" => Some(CatalogType::Environment),
            "Maneuver" => Some(CatalogType::Maneuver),
            "Trajectory" => Some(CatalogType::Trajectory),
            "Route" => Some(CatalogType::Route),
            "Controller" => Some(CatalogType::Controller),
            _ => None,
        }
    }
}

impl fmt::Display for CatalogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One named fragment of a catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name: String,
    pub catalog_type: CatalogType,
    pub node: XmlNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub name: String,
    pub path: PathBuf,
    /// Type of the first entry; `None` for an empty catalog.
    pub catalog_type: Option<CatalogType>,
    entries: Vec<Entry>,
}

impl Catalog {
    /// Build a catalog from a parsed `<OpenSCENARIO><Catalog>` document.
    pub fn from_document(name: &str, path: &Path, root: &XmlNode) -> ParseResult<Self> {
        let catalog_node = root.child("Catalog").ok_or_else(|| {
            ParseError::MissingElement("Catalog".to_string())
                .in_context(ErrorContext::with_file_path(path))
        })?;

        let mut entries = Vec::new();
        for entry_node in catalog_node.children() {
            let Some(catalog_type) = CatalogType::from_element(entry_node.name()) else {
                warn!(
                    "Catalog {}: skipping unsupported entry element {}",
                    name,
                    entry_node.name()
                );
                continue;
            };
            let entry_name = entry_node.attrs().get_opt("name").unwrap_or_default();
            debug!("Catalog {}: entry {} ({})", name, entry_name, catalog_type);
            entries.push(Entry {
                name: entry_name.to_string(),
                catalog_type,
                node: entry_node.clone(),
            });
        }

        let catalog_type = entries.first().map(|e| e.catalog_type);
        if catalog_type.is_none() {
            warn!("Catalog {} seems to be empty!", name);
        }

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            catalog_type,
            entries,
        })
    }

    pub fn find_entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

/// A directory registered under `CatalogLocations`.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogDirectory {
    /// The registering element, e.g. `VehicleCatalog`.
    pub kind: String,
    pub path: PathBuf,
}

/// Directory registry plus the cache of loaded catalogs.
#[derive(Debug, Default)]
pub struct Catalogs {
    directories: Vec<CatalogDirectory>,
    loaded: HashMap<String, Arc<Catalog>>,
}

impl Catalogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_directory(&mut self, kind: &str, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!("Registered {} directory {}", kind, path.display());
        self.directories.push(CatalogDirectory {
            kind: kind.to_string(),
            path,
        });
    }

    pub fn directories(&self) -> &[CatalogDirectory] {
        &self.directories
    }

    /// A previously loaded catalog.
    pub fn find(&self, name: &str) -> Option<Arc<Catalog>> {
        self.loaded.get(name).cloned()
    }

    /// Load `name`, or return the cached instance.
    ///
    /// `Ok(None)` means no registered directory contains `<name>.xosc`.
    /// A file that exists but is malformed is an error.
    pub fn load(&mut self, name: &str) -> ParseResult<Option<Arc<Catalog>>> {
        if let Some(catalog) = self.find(name) {
            return Ok(Some(catalog));
        }

        let file_name = format!("{}.xosc", name);
        let Some(path) = self
            .directories
            .iter()
            .map(|dir| dir.path.join(&file_name))
            .find(|candidate| candidate.is_file())
        else {
            warn!(
                "Couldn't locate catalog file {} - make sure it is located in one of the catalog directories listed in the scenario file",
                file_name
            );
            return Ok(None);
        };

        info!("Loading catalog {} from {}", name, path.display());
        let root = XmlNode::parse_file(&path)?;
        let catalog = Arc::new(Catalog::from_document(name, &path, &root)?);
        self.loaded.insert(name.to_string(), Arc::clone(&catalog));
        Ok(Some(catalog))
    }
}
