use clap::Parser;
use training::roadmap::run_roadmap;
use training::RoadMapArgs;

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = RoadMapArgs::parse();
    let best = run_roadmap(args)?;
    log::info!("road-map checkpoint: {}", best.display());
    Ok(())
}
