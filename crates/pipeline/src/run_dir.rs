//! The run directory: per-run artifacts on disk.
//!
//! ```text
//! <logs_root>/
//!   manifest.json
//!   checkpoint.json
//!   <node_id>/
//!     status.json
//!     prompt.md        (codergen)
//!     response.md      (codergen)
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;
use crate::graph::Graph;
use crate::types::Outcome;

/// Run metadata, serialized as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub goal: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    pub start_time: String,
    pub node_count: usize,
    pub edge_count: usize,
}

impl Manifest {
    /// Build a manifest for a graph at run start.
    #[must_use]
    pub fn for_graph(graph: &Graph) -> Self {
        Self {
            name: graph.name.clone(),
            goal: graph
                .get_attr("goal")
                .map(crate::graph::AttrValue::to_string_value)
                .unwrap_or_default(),
            label: graph
                .get_attr("label")
                .map(crate::graph::AttrValue::to_string_value)
                .unwrap_or_default(),
            start_time: chrono::Utc::now().to_rfc3339(),
            node_count: graph.nodes.len(),
            edge_count: graph.edges.len(),
        }
    }
}

/// Path helpers and I/O for one run's directory.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    /// Create the run directory on disk.
    pub fn create(root: impl Into<PathBuf>) -> PipelineResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Wrap an existing directory without touching the filesystem.
    #[must_use]
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.root.join("checkpoint.json")
    }

    /// A node's stage directory, directly under the run root.
    #[must_use]
    pub fn node_dir(&self, node_id: &str) -> PathBuf {
        self.root.join(node_id)
    }

    #[must_use]
    pub fn status_path(&self, node_id: &str) -> PathBuf {
        self.node_dir(node_id).join("status.json")
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> PipelineResult<()> {
        let json = serde_json::to_string_pretty(manifest)?;
        std::fs::write(self.manifest_path(), json)?;
        Ok(())
    }

    /// Write a node's outcome to `<node_id>/status.json`, creating the
    /// stage directory as needed.
    pub fn write_status(&self, node_id: &str, outcome: &Outcome) -> PipelineResult<()> {
        let dir = self.node_dir(node_id);
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(outcome)?;
        std::fs::write(self.status_path(node_id), json)?;
        Ok(())
    }

    pub fn read_status(&self, node_id: &str) -> PipelineResult<Outcome> {
        let data = std::fs::read_to_string(self.status_path(node_id))?;
        Ok(serde_json::from_str(&data)?)
    }
}
