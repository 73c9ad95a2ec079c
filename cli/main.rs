#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::process;

use survtime::data::{load_prediction_table, load_training_table};
use survtime::{
    MeanSurvivalEstimator, SurvivalLearner, SurvivalPrediction, SurvivalTree, TrainedModel,
    TreeParams,
};

#[derive(Args)]
pub struct TrainArgs {
    /// Path to training TSV file with time, event and feature columns
    pub training_data: String,

    /// Maximum depth of the survival tree (unlimited when omitted)
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Minimum number of samples required to split a node
    #[arg(long, default_value = "6")]
    pub min_samples_split: usize,

    /// Minimum number of samples each leaf must keep
    #[arg(long, default_value = "3")]
    pub min_samples_leaf: usize,

    /// Maximum number of leaves (unlimited when omitted)
    #[arg(long, value_name = "N")]
    pub max_leaf_nodes: Option<usize>,

    /// Where to write the trained model
    #[arg(long, default_value = "model.toml")]
    pub output: String,
}

#[derive(Args)]
pub struct InferArgs {
    /// Path to test TSV file with the model's feature columns
    pub test_data: String,

    /// Path to trained model file (.toml)
    #[arg(long)]
    pub model: String,

    /// Where to write the predictions
    #[arg(long, default_value = "predictions.tsv")]
    pub output: String,
}

#[derive(Args)]
pub struct CurvesArgs {
    /// Path to test TSV file with the model's feature columns
    pub test_data: String,

    /// Path to trained model file (.toml)
    #[arg(long)]
    pub model: String,

    /// Where to write the survival curves
    #[arg(long, default_value = "survival_curves.tsv")]
    pub output: String,
}

pub fn train(args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading training data from: {}", args.training_data);
    let table = load_training_table(&args.training_data)?;
    println!(
        "Loaded {} samples ({} events) with features: {}",
        table.targets.len(),
        table.targets.n_events(),
        table.feature_names.join(", ")
    );

    let params = TreeParams {
        max_depth: args.max_depth,
        min_samples_split: args.min_samples_split,
        min_samples_leaf: args.min_samples_leaf,
        max_leaf_nodes: args.max_leaf_nodes,
    };
    let mut estimator = MeanSurvivalEstimator::new(SurvivalTree::new(params));
    estimator.fit(table.features.view(), &table.targets)?;

    let tree = estimator.into_inner();
    println!(
        "Fitted survival tree: depth {}, {} leaves, {} event times",
        tree.depth()?,
        tree.n_leaves()?,
        tree.event_times()?.len()
    );

    let model = TrainedModel::new(table.feature_names, tree)?;
    model.save(&args.output)?;
    println!("Model saved to: {}", args.output);
    Ok(())
}

pub fn infer(args: InferArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading model from: {}", args.model);
    let model = TrainedModel::load(&args.model)?;
    println!("Model expects features: {}", model.feature_names.join(", "));

    let table = load_prediction_table(&args.test_data, &model.feature_names)?;
    let estimator = model.into_estimator();
    let means = estimator.predict_mean_survival_time(table.features.view())?;

    let mut file = BufWriter::new(File::create(&args.output)?);
    writeln!(file, "sample_id\tmean_survival_time")?;
    let mut buffer = ryu::Buffer::new();
    for (id, &mean) in table.sample_ids.iter().zip(means.iter()) {
        writeln!(file, "{}\t{}", id, buffer.format(mean))?;
    }
    file.flush()?;

    println!(
        "Predicted mean survival time for {} samples; saved to: {}",
        means.len(),
        args.output
    );
    Ok(())
}

pub fn curves(args: CurvesArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading model from: {}", args.model);
    let model = TrainedModel::load(&args.model)?;
    let table = load_prediction_table(&args.test_data, &model.feature_names)?;
    let estimator = model.into_estimator();

    let SurvivalPrediction::Array(curves) = estimator.predict_surv(table.features.view(), true)?
    else {
        return Err("survival tree returned step functions for an array request".into());
    };
    let event_times = estimator
        .event_times()
        .ok_or("loaded model has no event times")?;

    let mut buffer = ryu::Buffer::new();
    let mut file = BufWriter::new(File::create(&args.output)?);
    write!(file, "sample_id")?;
    for &time in event_times.as_slice() {
        write!(file, "\tS({})", buffer.format(time))?;
    }
    writeln!(file)?;
    for (id, row) in table.sample_ids.iter().zip(curves.rows()) {
        write!(file, "{id}")?;
        for &value in row.iter() {
            write!(file, "\t{}", buffer.format(value))?;
        }
        writeln!(file)?;
    }
    file.flush()?;

    println!(
        "Wrote survival curves for {} samples at {} event times to: {}",
        curves.nrows(),
        event_times.len(),
        args.output
    );
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "survtime",
    about = "Survival trees that predict mean survival time",
    long_about = "Fits log-rank survival trees with Kaplan-Meier leaves and predicts the mean \
                 survival time of new samples by integrating their survival curves."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a survival tree from a TSV file
    #[command(about = "Train a survival tree (outputs: model.toml)")]
    Train(TrainArgs),

    /// Predict mean survival time for new samples
    #[command(about = "Predict mean survival times (outputs: predictions.tsv)")]
    Infer(InferArgs),

    /// Write the predicted survival curve of each sample
    #[command(about = "Predict survival curves (outputs: survival_curves.tsv)")]
    Curves(CurvesArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Train(args)) => train(args),
        Some(Commands::Infer(args)) => infer(args),
        Some(Commands::Curves(args)) => curves(args),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
