//! Pipeline configuration: which stages run, in order, and the parameters
//! of each algorithm. Loaded from TOML; every section is optional.
//!
//! ```toml
//! threads = 4
//!
//! [features]
//! normal_radius = 0.02
//! feature_radius = 0.02
//!
//! [sac_ia]
//! max_iterations = 500
//! seed = 7
//!
//! [[stage]]
//! kind = "template_match"
//! target = "scene.pcd"
//! templates = "object_templates.txt"
//! ```

use cv_core::{Error, Result};
use cv_point_cloud::FeatureConfig;
use cv_registration::{IcpConfig, SacIaConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads for the global pool; `None` defers to the environment.
    pub threads: Option<usize>,
    pub features: FeatureConfig,
    pub sac_ia: SacIaConfig,
    pub icp: IcpConfig,
    #[serde(rename = "stage")]
    pub stages: Vec<Stage>,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file. Failures are reported as [`Error::Load`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::load(path, e))?;
        Self::from_toml_str(&text).map_err(|e| Error::load(path, e))
    }
}

/// One step of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stage {
    /// Align every listed template to a target and keep the best.
    TemplateMatch(MatchStage),
    /// Refine the alignment of two clouds with ICP.
    Icp(IcpStage),
    /// Closed-form rigid transform between index-corresponding clouds.
    EstimateTransform(EstimateStage),
    /// Apply a rigid transform to a cloud.
    Transform(TransformStage),
    /// Estimate oriented normals and save them with the points.
    Normals(NormalsStage),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::TemplateMatch(_) => "template_match",
            Stage::Icp(_) => "icp",
            Stage::EstimateTransform(_) => "estimate_transform",
            Stage::Transform(_) => "transform",
            Stage::Normals(_) => "normals",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStage {
    pub target: PathBuf,
    /// Template list file; relative entries resolve against its directory.
    pub templates: PathBuf,
    #[serde(default = "default_match_output")]
    pub output: PathBuf,
    /// Voxel leaf size applied to the target before feature extraction.
    #[serde(default)]
    pub target_voxel_size: Option<f32>,
    /// Refine the best coarse alignment with ICP.
    #[serde(default)]
    pub refine: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcpStage {
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default = "default_icp_matrix")]
    pub output_matrix: PathBuf,
    /// Where to save the source cloud moved by the final transform.
    #[serde(default)]
    pub output_cloud: Option<PathBuf>,
    /// Matrix file with the initial guess; identity when absent.
    #[serde(default)]
    pub initial_matrix: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateStage {
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default)]
    pub output_matrix: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStage {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Matrix file; takes precedence over the rotation and translation below.
    #[serde(default)]
    pub matrix: Option<PathBuf>,
    #[serde(default)]
    pub rotation_z_degrees: f32,
    #[serde(default)]
    pub translation: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalsStage {
    pub input: PathBuf,
    pub output: PathBuf,
}

fn default_match_output() -> PathBuf {
    PathBuf::from("output.pcd")
}

fn default_icp_matrix() -> PathBuf {
    PathBuf::from("icp_result.txt")
}
