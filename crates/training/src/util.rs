use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use clap::ValueEnum;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            log::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend nd-array");
        }
        _ => {}
    }
    Ok(())
}

/// Read a single-element tensor back to the host.
pub fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(f32::NAN)
}

/// First sample of a batch, keeping the batch axis.
pub fn first_sample<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    tensor.narrow(0, 0, 1)
}

/// Write the resolved run configuration as pretty JSON next to the run's metrics.
pub fn write_run_config<T: Serialize>(run_dir: &Path, config: &T) -> anyhow::Result<()> {
    fs::create_dir_all(run_dir)?;
    let path = run_dir.join("config.json");
    fs::write(&path, serde_json::to_vec_pretty(config)?)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))
}
