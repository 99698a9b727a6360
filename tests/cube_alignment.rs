//! Coarse-to-fine alignment of a cube template against the cube it was cut
//! from.

mod common;

use common::{jittered_cube, template_motion, FEATURE_RADIUS, NORMAL_RADIUS};
use cv_align::core::{invert_rigid, rotation_difference, translation_block, Error, PointCloudXYZ};
use cv_align::point_cloud::{FeatureCloud, FeatureConfig};
use cv_align::registration::{
    IcpConfig, IterativeClosestPoint, SacIaConfig, SampleConsensusAligner, Template, TemplateRegistry,
};
use nalgebra::{Matrix4, Point3, Vector3};

fn features(cloud: &PointCloudXYZ) -> FeatureCloud {
    FeatureCloud::compute(cloud, &FeatureConfig::new(NORMAL_RADIUS, FEATURE_RADIUS)).unwrap()
}

fn aligner() -> SampleConsensusAligner {
    SampleConsensusAligner::new(SacIaConfig {
        seed: Some(7),
        ..SacIaConfig::default()
    })
}

#[test]
fn test_cube_coarse_then_fine() {
    let target = jittered_cube(10, 1);
    let motion = template_motion();
    let template = target.transformed(&motion);
    let expected = invert_rigid(&motion);

    let target_features = features(&target);
    let template_features = features(&template);
    assert!(target_features.len() * 10 >= target.len() * 9);
    assert_eq!(template_features.len(), target_features.len());

    let coarse = aligner().align(&target_features, &template_features).unwrap();
    let cap = SacIaConfig::default().max_correspondence_distance;
    assert!(
        rotation_difference(&coarse.transformation, &expected).to_degrees() < 3.0,
        "coarse rotation off by {:.2}°",
        rotation_difference(&coarse.transformation, &expected).to_degrees()
    );
    assert!((translation_block(&coarse.transformation) - translation_block(&expected)).norm() < 0.05);
    assert!(coarse.fitness_score < cap, "fitness {}", coarse.fitness_score);
    assert!(coarse.inlier_fraction > 0.5);

    let icp = IterativeClosestPoint::new(IcpConfig::default());
    let fine = icp.align(&template, &target, &coarse.transformation).unwrap();
    assert!(fine.converged);
    assert!(fine.fitness_score < 1e-6, "fitness {}", fine.fitness_score);
    assert!(rotation_difference(&fine.transformation, &expected).to_degrees() < 0.1);

    let p = Point3::new(0.2, 0.7, 0.4);
    let moved = fine.transformation.transform_point(&motion.transform_point(&p));
    assert!((moved - p).norm() < 1e-3);
}

#[test]
fn test_best_template_is_the_matching_cube() {
    let target = jittered_cube(10, 1);
    let target_features = features(&target);

    // A differently sampled, flattened box and the true template.
    let decoy = jittered_cube(10, 99).transformed(&Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 1.0, 0.5)));
    let template = target.transformed(&template_motion());

    let registry: TemplateRegistry = [
        Template::new("decoy", features(&decoy)),
        Template::new("cube", features(&template)),
    ]
    .into_iter()
    .collect();

    let (index, best) = aligner().find_best_alignment(&target_features, &registry).unwrap();
    assert_eq!(index, 1);
    assert_eq!(registry.get(index).unwrap().name, "cube");
    assert!(rotation_difference(&best.transformation, &invert_rigid(&template_motion())).to_degrees() < 3.0);
}

#[test]
fn test_empty_registry() {
    let target_features = features(&jittered_cube(10, 3));
    let err = aligner()
        .find_best_alignment(&target_features, &TemplateRegistry::new())
        .unwrap_err();
    assert!(matches!(err, Error::EmptyRegistry));
}
