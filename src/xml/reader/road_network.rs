use std::path::PathBuf;

use log::{debug, warn};

use crate::xml::errors::ParseResult;
use crate::xml::node::XmlNode;
use crate::xml::reader::ScenarioReader;

/// Files describing the road network, resolved against the scenario
/// directory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoadNetwork {
    /// Road description (OpenDRIVE); empty when the document names none.
    pub logic_file: PathBuf,
    /// Visual model of the scene; the scenario directory when the document
    /// names none.
    pub scene_graph_file: PathBuf,
}

impl ScenarioReader<'_> {
    pub(super) fn read_road_network(&self, node: Option<&XmlNode>) -> ParseResult<RoadNetwork> {
        let Some(node) = node else {
            warn!("Scenario has no RoadNetwork section");
            return Ok(RoadNetwork {
                logic_file: PathBuf::new(),
                scene_graph_file: self.base_dir.clone(),
            });
        };

        let logic_file = match node.children().find(|c| matches!(c.name(), "LogicFile" | "Logics")) {
            Some(file) => self.base_dir.join(self.req_attr(file, "filepath")?),
            None => {
                warn!("No road network logic file given");
                PathBuf::new()
            }
        };
        let scene_graph_file = match node.children().find(|c| matches!(c.name(), "SceneGraphFile" | "SceneGraph")) {
            Some(file) => self.base_dir.join(self.req_attr(file, "filepath")?),
            None => {
                debug!("No scene graph file given, models resolve against {}", self.base_dir.display());
                self.base_dir.clone()
            }
        };

        Ok(RoadNetwork {
            logic_file,
            scene_graph_file,
        })
    }

    /// Register every `<XCatalog><Directory path/></XCatalog>` location.
    pub(super) fn read_catalog_locations(&mut self, node: &XmlNode) -> ParseResult<()> {
        for location in node.children() {
            let Some(directory) = location.child("Directory") else {
                warn!("{} without Directory, ignored", location.name());
                continue;
            };
            let Some(path) = self.attr(directory, "path")? else {
                warn!("{} Directory without path, ignored", location.name());
                continue;
            };
            let path = self.base_dir.join(path);
            self.catalogs.register_directory(location.name(), path);
        }
        Ok(())
    }
}
