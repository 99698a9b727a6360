//! Point cloud registration algorithms
//!
//! This crate provides feature-based 3D point cloud registration:
//! - SAC-IA (Sample Consensus Initial Alignment) over FPFH descriptors
//! - Best-template selection across a template registry
//! - Point-to-point ICP (Iterative Closest Point) refinement

pub mod registration;

pub use registration::{
    compute_transformation_from_correspondences, estimate_rigid_transform, evaluate_fitness, FitnessScore,
};

pub use registration::global::{AlignmentResult, SacIaConfig, SampleConsensusAligner};
pub use registration::icp::{refine, IcpConfig, IcpResult, IterativeClosestPoint};
pub use registration::selection::{select_best, Template, TemplateRegistry};
