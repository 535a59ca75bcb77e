use clap::Parser;
use training::autoencoder::run_autoencoder;
use training::AutoencoderArgs;

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = AutoencoderArgs::parse();
    let best = run_autoencoder(args)?;
    log::info!("pretraining finished; use --pretrained-path {}", best.display());
    Ok(())
}
