//! Unsupervised CIFAR-10 training binary.
//!
//! Learns a competitive local-learning layer on Lp-unit-normalized CIFAR-10
//! images, checkpoints on cadence, and gates the final save on both
//! acceptance criteria. A rejected run logs the reason and exits cleanly
//! without writing the final model.

use clap::Parser;
use local_learning::checkpoint::{save_snapshot, FileSink};
use local_learning::data::{cifar, InMemoryLoader};
use local_learning::{
    weight_convergence_criterion, weight_mean_criterion, FastLearner, LayerConfig, Learner,
    LearningRate, SequentialLearner, TrainConfig, Trainer,
};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "ll-train",
    about = "Train a competitive local-learning layer on CIFAR-10, unsupervised"
)]
struct Args {
    /// Output model path (JSON), written only if the run is accepted
    model_path: PathBuf,

    /// Directory containing the CIFAR-10 binary batch files
    #[arg(long, default_value = "data/CIFAR10")]
    data_dir: PathBuf,

    /// Number of hidden units
    #[arg(long, default_value_t = 2000)]
    hidden_size: usize,

    /// Number of training epochs
    #[arg(long, default_value_t = 100)]
    epochs: usize,

    /// Mini-batch size
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Save a checkpoint every N epochs (0 = only the final model)
    #[arg(long, default_value_t = 0)]
    checkpoint_every: usize,

    /// Metric exponent p (>= 2)
    #[arg(long, default_value_t = 3.0)]
    p: f32,

    /// Competition size k
    #[arg(long, default_value_t = 2)]
    k: usize,

    /// Inhibition strength
    #[arg(long, default_value_t = 0.4)]
    delta: f32,

    /// Post-hoc activation exponent (used by downstream classifiers)
    #[arg(long, default_value_t = 4.5)]
    n: f32,

    /// Learning-rate time constant (initial rate is 1/tau_l)
    #[arg(long, default_value_t = 50.0)]
    tau_l: f32,

    /// Target weight-norm radius
    #[arg(long, default_value_t = 1.0)]
    radius: f32,

    /// Weight initialization scale
    #[arg(long, default_value_t = 1.0)]
    sigma: f32,

    /// RNG seed for initialization and shuffling
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Update rule: "fast" or "sequential"
    #[arg(long, default_value = "fast")]
    rule: String,
}

fn main() {
    let args = Args::parse();

    let config = LayerConfig {
        in_size: cifar::CIFAR_PIXELS,
        hidden_size: args.hidden_size,
        n: args.n,
        p: args.p,
        tau_l: args.tau_l,
        k: args.k,
        delta: args.delta,
        radius: args.radius,
    };

    let mut learner: Box<dyn Learner> = match args.rule.as_str() {
        "fast" => match FastLearner::with_init(config, Some(args.sigma), Some(args.seed)) {
            Ok(l) => Box::new(l),
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
        "sequential" => {
            match SequentialLearner::with_init(config, Some(args.sigma), Some(args.seed)) {
                Ok(l) => Box::new(l),
                Err(e) => {
                    eprintln!("{e}");
                    process::exit(1);
                }
            }
        }
        other => {
            eprintln!("Unknown update rule '{other}' (expected 'fast' or 'sequential')");
            process::exit(2);
        }
    };

    if let Some(parent) = args.model_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Failed to create output directory {}: {e}", parent.display());
                process::exit(1);
            }
        }
    }

    eprintln!("Competitive local learning on CIFAR-10");
    eprintln!("  Rule: {}", args.rule);
    eprintln!(
        "  Layer: {} -> {} (p={}, k={}, delta={}, R={})",
        cifar::CIFAR_PIXELS,
        args.hidden_size,
        args.p,
        args.k,
        args.delta,
        args.radius
    );
    eprintln!(
        "  Epochs: {}, batch size: {}, initial lr: {:.5}",
        args.epochs,
        args.batch_size,
        1.0 / args.tau_l
    );
    eprintln!("  Data: {}", args.data_dir.display());
    eprintln!("  Model: {}", args.model_path.display());
    eprintln!();

    let dataset = match cifar::load_lp_normalized_train(&args.data_dir, args.p) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    eprintln!(
        "Loaded {} images of dimension {}",
        dataset.num_images(),
        dataset.image_dim()
    );

    let mut loader = match InMemoryLoader::new(
        dataset.images,
        dataset.labels,
        args.batch_size,
        true,
        args.seed,
    ) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let schedule = LearningRate::linear_decay(1.0 / args.tau_l, args.epochs);
    let train_config = TrainConfig {
        epochs: args.epochs,
        checkpoint_every: args.checkpoint_every,
    };
    let mut sink = FileSink::new(args.model_path.clone());

    let mut trainer = Trainer::new(learner.as_mut(), schedule, train_config);
    let stats = match trainer.run(&mut loader, &mut sink) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("Training failed: {e}");
            process::exit(1);
        }
    };

    let trained_samples: usize = stats.iter().map(|s| s.samples).sum();
    eprintln!(
        "Trained {} epochs ({} samples streamed)",
        stats.len(),
        trained_samples
    );

    // Acceptance gates: a rejected run is an outcome, not an error.
    if !trainer.accept(1e-2, 0.1) {
        let layer = learner.layer();
        if !weight_convergence_criterion(layer, 1e-2, 0.1) {
            eprintln!(
                "Fewer than 10% of hidden units converged close enough to R. \
                 Model not saved. Try running again."
            );
        } else if !weight_mean_criterion(layer) {
            eprintln!("Weights converged to the wrong attractor. Model not saved. Try running again.");
        }
        return;
    }

    if let Err(e) = save_snapshot(learner.as_ref(), &args.model_path, args.epochs) {
        eprintln!("{e}");
        process::exit(1);
    }
    eprintln!("Model saved: {}", args.model_path.display());
}
