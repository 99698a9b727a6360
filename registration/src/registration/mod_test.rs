#[cfg(test)]
mod tests {
    use crate::registration::{
        compute_transformation_from_correspondences, estimate_rigid_transform, evaluate_fitness, refine,
        select_best, AlignmentResult, IcpConfig, IterativeClosestPoint, SacIaConfig, SampleConsensusAligner,
        Template, TemplateRegistry,
    };
    use approx::assert_relative_eq;
    use cv_core::{axis_angle_transform, invert_rigid, is_rigid, rotation_difference, Error, PointCloudXYZ};
    use cv_point_cloud::{FeatureCloud, FpfhSignature, SpatialIndex};
    use nalgebra::{Matrix4, Point3, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> Vec<Point3<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Point3::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)))
            .collect()
    }

    /// Feature cloud whose descriptors identify each point uniquely, so
    /// descriptor matching is exact.
    fn labelled_features(points: Vec<Point3<f32>>, seed: u64) -> FeatureCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        let descriptors: Vec<FpfhSignature> = points
            .iter()
            .map(|_| {
                let mut d = FpfhSignature::default();
                for v in d.histogram.iter_mut() {
                    *v = rng.gen_range(0.0..100.0);
                }
                d
            })
            .collect();
        let normals = vec![Vector3::z(); points.len()];
        FeatureCloud::from_parts(points, normals, descriptors).unwrap()
    }

    fn moved_copy(features: &FeatureCloud, transform: &Matrix4<f32>) -> FeatureCloud {
        let points = features.points().iter().map(|p| transform.transform_point(p)).collect();
        FeatureCloud::from_parts(points, features.normals().to_vec(), features.descriptors().to_vec()).unwrap()
    }

    fn wavy_surface() -> PointCloudXYZ {
        let mut points = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                let x = i as f32 * 0.05;
                let y = j as f32 * 0.05;
                points.push(Point3::new(x, y, 0.3 * (2.0 * x).sin() * (3.0 * y).cos()));
            }
        }
        PointCloudXYZ::from_positions(points)
    }

    fn result(fitness_score: f32) -> AlignmentResult {
        AlignmentResult {
            fitness_score,
            transformation: Matrix4::identity(),
            inlier_fraction: 1.0,
            degenerate_samples: 0,
        }
    }

    #[test]
    fn test_estimate_rigid_transform_recovers_motion() {
        let source = random_points(50, 1);
        let truth = axis_angle_transform(&Vector3::new(1.0, 2.0, -0.5), 0.8, &Vector3::new(0.3, -1.0, 2.0));
        let target: Vec<_> = source.iter().map(|p| truth.transform_point(p)).collect();

        let estimated = estimate_rigid_transform(&source, &target).unwrap();
        assert!(is_rigid(&estimated, 1e-4));
        assert_relative_eq!(estimated, truth, epsilon = 1e-4);
    }

    #[test]
    fn test_estimate_rigid_transform_degenerate() {
        let collinear = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
        assert!(estimate_rigid_transform(&collinear, &collinear).is_none());

        let two = random_points(2, 2);
        assert!(estimate_rigid_transform(&two, &two).is_none());

        let three = random_points(3, 3);
        assert!(estimate_rigid_transform(&three, &three[..2]).is_none());
        assert!(compute_transformation_from_correspondences(&three, &three, &[(0, 0), (1, 1)]).is_none());
    }

    #[test]
    fn test_evaluate_fitness_truncates_outliers() {
        let target = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let index = SpatialIndex::build(&target);
        let source = vec![
            Point3::new(0.0, 0.0, 0.01),
            Point3::new(1.0, 0.0, 0.02),
            Point3::new(5.0, 5.0, 5.0),
        ];
        let score = evaluate_fitness(&source, &index, &Matrix4::identity(), 0.01);
        assert_eq!(score.inlier_count, 2);
        assert_relative_eq!(score.mean_squared_error, (0.0001 + 0.0004) / 2.0, epsilon = 1e-7);
        assert_relative_eq!(score.truncated_error, (0.0001 + 0.0004 + 0.01) / 3.0, epsilon = 1e-7);
        assert_relative_eq!(score.inlier_fraction(source.len()), 2.0 / 3.0);

        let none = evaluate_fitness(&source, &index, &Matrix4::new_translation(&Vector3::new(50.0, 0.0, 0.0)), 0.01);
        assert_eq!(none.inlier_count, 0);
        assert_eq!(none.mean_squared_error, f32::MAX);
    }

    #[test]
    fn test_sac_ia_recovers_transform_with_exact_matches() {
        let target = labelled_features(random_points(200, 4), 5);
        let truth = axis_angle_transform(&Vector3::new(0.0, 0.3, 1.0), 0.6, &Vector3::new(0.5, 0.2, -0.1));
        let source = moved_copy(&target, &invert_rigid(&truth));

        let aligner = SampleConsensusAligner::new(SacIaConfig {
            max_iterations: 20,
            seed: Some(42),
            ..SacIaConfig::default()
        });
        let result = aligner.align(&target, &source).unwrap();

        assert!(rotation_difference(&result.transformation, &truth) < 1e-3);
        assert!(result.fitness_score < 1e-6);
        assert_relative_eq!(result.inlier_fraction, 1.0);
    }

    #[test]
    fn test_sac_ia_is_deterministic_per_seed() {
        let target = labelled_features(random_points(100, 6), 7);
        let source = labelled_features(random_points(100, 8), 9);
        let aligner = SampleConsensusAligner::new(SacIaConfig {
            max_iterations: 30,
            max_correspondence_distance: 0.01,
            seed: Some(7),
            ..SacIaConfig::default()
        });

        let a = aligner.align(&target, &source).unwrap();
        let b = aligner.align_with_rng(&target, &source, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sac_ia_rejects_bad_input() {
        let cloud = labelled_features(random_points(10, 10), 11);
        let aligner = SampleConsensusAligner::default();
        assert!(matches!(
            aligner.align(&FeatureCloud::default(), &cloud),
            Err(Error::InvalidInput(_))
        ));

        let bad = SampleConsensusAligner::new(SacIaConfig {
            sample_count: 2,
            ..SacIaConfig::default()
        });
        assert!(matches!(bad.align(&cloud, &cloud), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_sac_ia_fails_without_valid_sample() {
        // All source points closer together than the minimum sample distance.
        let tight: Vec<_> = (0..10).map(|i| Point3::new(i as f32 * 1e-3, 0.0, 0.0)).collect();
        let source = labelled_features(tight, 12);
        let target = labelled_features(random_points(10, 13), 14);
        let aligner = SampleConsensusAligner::new(SacIaConfig {
            max_iterations: 5,
            max_sample_attempts: 10,
            seed: Some(1),
            ..SacIaConfig::default()
        });
        assert!(matches!(aligner.align(&target, &source), Err(Error::AlignmentFailure(_))));
    }

    #[test]
    fn test_select_best_argmin_and_ties() {
        let results = vec![
            Ok(result(0.5)),
            Ok(result(0.1)),
            Err(Error::AlignmentFailure("no sample".to_string())),
            Ok(result(0.1)),
            Ok(result(0.3)),
        ];
        let (index, best) = select_best(results).unwrap();
        assert_eq!(index, 1);
        assert_eq!(best.fitness_score, 0.1);

        assert!(matches!(select_best(Vec::new()), Err(Error::EmptyRegistry)));
        assert!(matches!(
            select_best(vec![Err(Error::AlignmentFailure("x".to_string()))]),
            Err(Error::AlignmentFailure(_))
        ));
    }

    #[test]
    fn test_find_best_alignment_matches_independent_runs() {
        let target = labelled_features(random_points(150, 20), 21);
        let truth = axis_angle_transform(&Vector3::z(), 0.4, &Vector3::new(0.1, 0.0, 0.0));

        let registry: TemplateRegistry = vec![
            Template::new("unrelated", labelled_features(random_points(150, 22), 23)),
            Template::new("match", moved_copy(&target, &invert_rigid(&truth))),
            Template::new("duplicate", moved_copy(&target, &invert_rigid(&truth))),
        ]
        .into_iter()
        .collect();

        let aligner = SampleConsensusAligner::new(SacIaConfig {
            max_iterations: 25,
            max_correspondence_distance: 1e-3,
            seed: Some(3),
            ..SacIaConfig::default()
        });

        let independent: Vec<_> = registry.iter().map(|t| aligner.align(&target, &t.features)).collect();
        let (index, best) = aligner.find_best_alignment(&target, &registry).unwrap();
        let expected = select_best(independent).unwrap();

        assert_eq!(index, expected.0);
        assert_eq!(best, expected.1);
        assert_eq!(index, 1, "identical templates tie; the earlier one wins");
    }

    #[test]
    fn test_find_best_alignment_empty_registry() {
        let target = labelled_features(random_points(10, 30), 31);
        let err = SampleConsensusAligner::default()
            .find_best_alignment(&target, &TemplateRegistry::new())
            .unwrap_err();
        assert!(matches!(err, Error::EmptyRegistry));
    }

    #[test]
    fn test_icp_identical_point_clouds() {
        let cloud = wavy_surface();
        let result = refine(&cloud, &cloud, &IcpConfig::default()).unwrap();

        assert!(result.converged);
        assert!(result.fitness_score < 1e-10);
        assert_relative_eq!(result.transformation, Matrix4::identity(), epsilon = 1e-5);
    }

    #[test]
    fn test_icp_recovers_small_offset() {
        let target = wavy_surface();
        let truth = axis_angle_transform(
            &Vector3::new(0.2, 0.1, 1.0),
            1f32.to_radians(),
            &Vector3::new(0.005, -0.004, 0.003),
        );
        let source = target.transformed(&invert_rigid(&truth));

        let icp = IterativeClosestPoint::new(IcpConfig {
            max_iterations: 100,
            ..IcpConfig::default()
        });
        let result = icp.align(&source, &target, &Matrix4::identity()).unwrap();

        assert!(result.converged, "ICP did not converge in {} iterations", result.iterations);
        assert!(result.fitness_score < 1e-8, "fitness {}", result.fitness_score);
        assert_relative_eq!(result.transformation, truth, epsilon = 1e-3);
    }

    #[test]
    fn test_icp_stops_at_iteration_budget() {
        let target = wavy_surface();
        let truth = axis_angle_transform(
            &Vector3::new(0.2, 0.1, 1.0),
            1f32.to_radians(),
            &Vector3::new(0.005, -0.004, 0.003),
        );
        let source = target.transformed(&invert_rigid(&truth));

        let icp = IterativeClosestPoint::new(IcpConfig {
            max_iterations: 1,
            ..IcpConfig::default()
        });
        let result = icp.align(&source, &target, &Matrix4::identity()).unwrap();

        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
        assert!(is_rigid(&result.transformation, 1e-4));
        assert_ne!(result.transformation, Matrix4::identity());
    }

    #[test]
    fn test_icp_without_correspondences_does_not_converge() {
        let target = wavy_surface();
        let source = target.transformed(&Matrix4::new_translation(&Vector3::new(10.0, 0.0, 0.0)));
        let icp = IterativeClosestPoint::new(IcpConfig {
            max_correspondence_distance: Some(0.1),
            ..IcpConfig::default()
        });
        let result = icp.align(&source, &target, &Matrix4::identity()).unwrap();

        assert!(!result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.transformation, Matrix4::identity());
    }

    #[test]
    fn test_icp_rejects_empty_input() {
        let cloud = wavy_surface();
        assert!(refine(&PointCloudXYZ::default(), &cloud, &IcpConfig::default()).is_err());
    }
}
