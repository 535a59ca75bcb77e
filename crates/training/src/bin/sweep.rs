//! Print the hyperparameter grid for a pipeline, one JSON object per trial.

use clap::Parser;
use training::search::{Pipeline, SearchSpace};

#[derive(Parser, Debug)]
#[command(name = "sweep", about = "Enumerate hyperparameter trials for a training binary")]
struct SweepArgs {
    #[arg(long, value_enum, default_value_t = Pipeline::Autoencoder)]
    pipeline: Pipeline,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = SweepArgs::parse();
    let trials = SearchSpace::for_pipeline(args.pipeline).trials();
    log::info!("{} trials for {:?}", trials.len(), args.pipeline);
    for trial in trials {
        let line = serde_json::json!({
            "id": trial.id,
            "values": trial.values,
            "args": trial.to_cli_args(),
        });
        println!("{line}");
    }
    Ok(())
}
