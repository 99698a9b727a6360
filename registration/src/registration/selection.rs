//! Best-template selection
//!
//! Runs the coarse aligner against every template in a registry and keeps
//! the one with the strictly lowest fitness. Templates are aligned in
//! parallel; the reduction walks the results in registry order so ties
//! resolve to the earlier template.

use super::global::{AlignmentResult, SampleConsensusAligner};
use cv_core::{Error, Result};
use cv_point_cloud::FeatureCloud;
use rayon::prelude::*;

/// A known object shape.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub features: FeatureCloud,
}

impl Template {
    pub fn new(name: impl Into<String>, features: FeatureCloud) -> Self {
        Self {
            name: name.into(),
            features,
        }
    }
}

/// Ordered template collection. The order is the tie-break order.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a template, returning its index.
    pub fn add(&mut self, template: Template) -> usize {
        self.templates.push(template);
        self.templates.len() - 1
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Template> {
        self.templates.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Template> {
        self.templates.iter()
    }
}

impl FromIterator<Template> for TemplateRegistry {
    fn from_iter<I: IntoIterator<Item = Template>>(iter: I) -> Self {
        Self {
            templates: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TemplateRegistry {
    type Item = &'a Template;
    type IntoIter = std::slice::Iter<'a, Template>;

    fn into_iter(self) -> Self::IntoIter {
        self.templates.iter()
    }
}

/// Pick the lowest-fitness result; ties keep the lower index, failed
/// entries are skipped.
///
/// # Errors
///
/// * [`Error::EmptyRegistry`] - `results` is empty
/// * [`Error::AlignmentFailure`] - Every entry failed
pub fn select_best(results: Vec<Result<AlignmentResult>>) -> Result<(usize, AlignmentResult)> {
    if results.is_empty() {
        return Err(Error::EmptyRegistry);
    }
    let total = results.len();

    let mut best: Option<(usize, AlignmentResult)> = None;
    let mut failures = 0;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(result) => {
                let better = best
                    .as_ref()
                    .map_or(true, |(_, b)| result.fitness_score < b.fitness_score);
                if better {
                    best = Some((index, result));
                }
            }
            Err(e) => {
                tracing::warn!("template {index} skipped: {e}");
                failures += 1;
            }
        }
    }

    best.ok_or_else(|| {
        Error::AlignmentFailure(format!("all {total} templates failed to align ({failures} errors)"))
    })
}

impl SampleConsensusAligner {
    /// Align every template to `target`, one result per template in
    /// registry order.
    ///
    /// Each template gets its own random source built from the config seed,
    /// so a result equals that of an independent [`Self::align`] call.
    pub fn align_all(&self, target: &FeatureCloud, registry: &TemplateRegistry) -> Vec<Result<AlignmentResult>> {
        registry
            .templates
            .par_iter()
            .map(|template| self.align(target, &template.features))
            .collect()
    }

    /// Index and result of the best-fitting template.
    ///
    /// # Errors
    ///
    /// * [`Error::EmptyRegistry`] - `registry` holds no templates
    /// * [`Error::AlignmentFailure`] - No template could be aligned
    pub fn find_best_alignment(
        &self,
        target: &FeatureCloud,
        registry: &TemplateRegistry,
    ) -> Result<(usize, AlignmentResult)> {
        if registry.is_empty() {
            return Err(Error::EmptyRegistry);
        }
        let (index, best) = select_best(self.align_all(target, registry))?;
        tracing::info!(
            "best template {} ({}) with fitness {:.6e}",
            index,
            registry.templates[index].name,
            best.fitness_score
        );
        Ok((index, best))
    }
}
