//! cv-align - command line front-end for the alignment pipeline
//!
//! Provides subcommands for:
//! - `run`: execute every stage listed in a pipeline configuration file
//! - `match`: align a template library to a target and keep the best
//! - `icp`: refine the alignment of two clouds
//! - `estimate`: rigid transform between point-by-point corresponding clouds
//! - `transform`: apply a rigid transform to a cloud
//! - `normals`: estimate oriented normals
//! - `config`: print the default configuration as TOML

use clap::{Args, Parser, Subcommand};
use cv_align::pipeline::{
    run_pipeline, run_stage, EstimateStage, IcpStage, MatchStage, NormalsStage, PipelineConfig, Stage,
    TransformStage,
};
use cv_align::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cv-align")]
#[command(about = "Feature-based template alignment for 3D point clouds", long_about = None)]
struct Cli {
    /// Pipeline configuration (TOML) supplying algorithm parameters
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Worker threads (overrides the config file and CV_ALIGN_CPU_THREADS)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the stages listed in the configuration file
    Run,
    /// Align every template in a list to a target cloud and keep the best
    Match(MatchArgs),
    /// Refine the alignment of a source cloud to a target cloud with ICP
    Icp(IcpArgs),
    /// Estimate the rigid transform between two corresponding clouds
    Estimate(EstimateArgs),
    /// Apply a rigid transform to a cloud
    Transform(TransformArgs),
    /// Estimate oriented normals and save them with the points
    Normals(NormalsArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
struct FeatureArgs {
    /// Normal estimation radius
    #[arg(long)]
    normal_radius: Option<f32>,

    /// FPFH radius
    #[arg(long)]
    feature_radius: Option<f32>,
}

#[derive(Args, Debug)]
struct MatchArgs {
    /// Target (scene) PCD file
    target: PathBuf,

    /// Template list file, one PCD path per line
    templates: PathBuf,

    /// Output PCD for the aligned best template
    #[arg(short, long, default_value = "output.pcd")]
    output: PathBuf,

    /// Voxel leaf size for down-sampling the target
    #[arg(long)]
    voxel_size: Option<f32>,

    /// Refine the best alignment with ICP
    #[arg(long)]
    refine: bool,

    /// SAC-IA iteration budget
    #[arg(long)]
    iterations: Option<usize>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    features: FeatureArgs,
}

#[derive(Args, Debug)]
struct IcpArgs {
    source: PathBuf,
    target: PathBuf,

    /// Matrix file for the final transform
    #[arg(short, long, default_value = "icp_result.txt")]
    output_matrix: PathBuf,

    /// Save the transformed source cloud here
    #[arg(long)]
    output_cloud: Option<PathBuf>,

    /// Matrix file with the initial guess
    #[arg(long)]
    initial: Option<PathBuf>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Reject correspondences farther apart than this
    #[arg(long)]
    max_distance: Option<f32>,
}

#[derive(Args, Debug)]
struct EstimateArgs {
    source: PathBuf,
    target: PathBuf,

    /// Write the estimated matrix to this file
    #[arg(short, long)]
    output_matrix: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TransformArgs {
    input: PathBuf,
    output: PathBuf,

    /// Matrix file; overrides --rotate-z and --translate
    #[arg(long)]
    matrix: Option<PathBuf>,

    /// Rotation about Z in degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    rotate_z: f32,

    /// Translation as x y z
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
    translate: Option<Vec<f32>>,
}

#[derive(Args, Debug)]
struct NormalsArgs {
    input: PathBuf,
    output: PathBuf,

    #[command(flatten)]
    features: FeatureArgs,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn apply_feature_args(config: &mut PipelineConfig, args: &FeatureArgs) {
    if let Some(r) = args.normal_radius {
        config.features.normal_radius = r;
    }
    if let Some(r) = args.feature_radius {
        config.features.feature_radius = r;
    }
}

/// Turn a subcommand into the stages it runs, applying its overrides to
/// `config`.
fn stages_for(command: Commands, config: &mut PipelineConfig) -> Vec<Stage> {
    match command {
        Commands::Run | Commands::Config => config.stages.clone(),
        Commands::Match(args) => {
            apply_feature_args(config, &args.features);
            if let Some(n) = args.iterations {
                config.sac_ia.max_iterations = n;
            }
            if args.seed.is_some() {
                config.sac_ia.seed = args.seed;
            }
            vec![Stage::TemplateMatch(MatchStage {
                target: args.target,
                templates: args.templates,
                output: args.output,
                target_voxel_size: args.voxel_size,
                refine: args.refine,
            })]
        }
        Commands::Icp(args) => {
            if let Some(n) = args.max_iterations {
                config.icp.max_iterations = n;
            }
            if args.max_distance.is_some() {
                config.icp.max_correspondence_distance = args.max_distance;
            }
            vec![Stage::Icp(IcpStage {
                source: args.source,
                target: args.target,
                output_matrix: args.output_matrix,
                output_cloud: args.output_cloud,
                initial_matrix: args.initial,
            })]
        }
        Commands::Estimate(args) => vec![Stage::EstimateTransform(EstimateStage {
            source: args.source,
            target: args.target,
            output_matrix: args.output_matrix,
        })],
        Commands::Transform(args) => {
            let translation = match args.translate.as_deref() {
                Some(&[x, y, z]) => [x, y, z],
                _ => [0.0; 3],
            };
            vec![Stage::Transform(TransformStage {
                input: args.input,
                output: args.output,
                matrix: args.matrix,
                rotation_z_degrees: args.rotate_z,
                translation,
            })]
        }
        Commands::Normals(args) => {
            apply_feature_args(config, &args.features);
            vec![Stage::Normals(NormalsStage {
                input: args.input,
                output: args.output,
            })]
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Err(e) = cv_align::init_thread_pool(cli.threads.or(config.threads)) {
        tracing::warn!("thread pool not configured: {e}");
    }

    if matches!(cli.command, Commands::Config) {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let single_stage = !matches!(cli.command, Commands::Run);
    let stages = stages_for(cli.command, &mut config);

    if single_stage {
        for stage in &stages {
            println!("{}", run_stage(stage, &config)?);
        }
    } else {
        for report in run_pipeline(&config)? {
            println!("{report}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
