use clap::Parser;
use training::baseline::run_baseline;
use training::BaselineArgs;

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    run_baseline(BaselineArgs::parse())
}
