//! Stage reports. `Display` prints the layout the command line tool shows.

use cv_core::{rotation_block, translation_block};
use cv_registration::IcpResult;
use nalgebra::Matrix4;
use std::fmt;
use std::path::PathBuf;

/// Rotation block and translation of `transform`.
pub struct RigidDisplay<'a>(pub &'a Matrix4<f32>);

impl fmt::Display for RigidDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = rotation_block(self.0);
        let t = translation_block(self.0);
        writeln!(f)?;
        for row in 0..3 {
            let label = if row == 1 { "R = " } else { "    " };
            writeln!(f, "{label}| {:6.3} {:6.3} {:6.3} |", r[(row, 0)], r[(row, 1)], r[(row, 2)])?;
        }
        writeln!(f)?;
        write!(f, "t = < {:.3}, {:.3}, {:.3} >", t[0], t[1], t[2])
    }
}

/// Full 4x4 matrix, one row per line.
pub struct MatrixDisplay<'a>(pub &'a Matrix4<f32>);

impl fmt::Display for MatrixDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.0.row_iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{:10.6} {:10.6} {:10.6} {:10.6}", row[0], row[1], row[2], row[3])?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MatchReport {
    pub template_index: usize,
    pub template_path: PathBuf,
    pub fitness_score: f32,
    /// Coarse SAC-IA transform of the best template.
    pub transformation: Matrix4<f32>,
    /// ICP refinement started from the coarse transform, when enabled.
    pub refinement: Option<IcpResult>,
    pub output: PathBuf,
}

impl MatchReport {
    /// The refined transform when ICP ran, the coarse one otherwise.
    pub fn final_transformation(&self) -> &Matrix4<f32> {
        self.refinement
            .as_ref()
            .map_or(&self.transformation, |icp| &icp.transformation)
    }
}

impl fmt::Display for MatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Best template: {} (#{})",
            self.template_path.display(),
            self.template_index
        )?;
        writeln!(f, "Best fitness score: {:.6}", self.fitness_score)?;
        writeln!(f, "{}", RigidDisplay(&self.transformation))?;
        if let Some(icp) = &self.refinement {
            writeln!(
                f,
                "ICP refinement: has converged: {} score: {:.6e} ({} iterations)",
                icp.converged, icp.fitness_score, icp.iterations
            )?;
            writeln!(f, "{}", RigidDisplay(&icp.transformation))?;
        }
        write!(f, "Aligned template saved to {}", self.output.display())
    }
}

#[derive(Debug, Clone)]
pub struct IcpReport {
    pub result: IcpResult,
    pub output_matrix: PathBuf,
    pub output_cloud: Option<PathBuf>,
}

impl fmt::Display for IcpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "has converged: {} score: {:.6e}",
            self.result.converged, self.result.fitness_score
        )?;
        writeln!(f, "{}", MatrixDisplay(&self.result.transformation))?;
        write!(f, "Transform written to {}", self.output_matrix.display())?;
        if let Some(cloud) = &self.output_cloud {
            write!(f, "\nAligned source saved to {}", cloud.display())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EstimateReport {
    pub transformation: Matrix4<f32>,
    pub output_matrix: Option<PathBuf>,
}

impl fmt::Display for EstimateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Estimated rigid transform:\n{}", RigidDisplay(&self.transformation))?;
        if let Some(path) = &self.output_matrix {
            write!(f, "\nTransform written to {}", path.display())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TransformReport {
    pub transformation: Matrix4<f32>,
    pub points: usize,
    pub output: PathBuf,
}

impl fmt::Display for TransformReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Applied transform:\n{}", RigidDisplay(&self.transformation))?;
        write!(f, "{} points saved to {}", self.points, self.output.display())
    }
}

#[derive(Debug, Clone)]
pub struct NormalsReport {
    pub points: usize,
    pub excluded: usize,
    pub output: PathBuf,
}

impl fmt::Display for NormalsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} points with normals saved to {} ({} excluded)",
            self.points,
            self.output.display(),
            self.excluded
        )
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone)]
pub enum StageReport {
    TemplateMatch(MatchReport),
    Icp(IcpReport),
    EstimateTransform(EstimateReport),
    Transform(TransformReport),
    Normals(NormalsReport),
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageReport::TemplateMatch(r) => r.fmt(f),
            StageReport::Icp(r) => r.fmt(f),
            StageReport::EstimateTransform(r) => r.fmt(f),
            StageReport::Transform(r) => r.fmt(f),
            StageReport::Normals(r) => r.fmt(f),
        }
    }
}
