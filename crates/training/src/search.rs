//! Grid search over the tunable hyperparameters of each pipeline.

use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(usize),
    Float(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v:e}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HyperParam {
    pub name: &'static str,
    pub default: ParamValue,
    pub candidates: Vec<ParamValue>,
    /// Non-tunable options stay at `default` in every trial.
    pub tunable: bool,
}

impl HyperParam {
    fn int(name: &'static str, default: usize, candidates: &[usize], tunable: bool) -> Self {
        Self {
            name,
            default: ParamValue::Int(default),
            candidates: candidates.iter().copied().map(ParamValue::Int).collect(),
            tunable,
        }
    }

    fn float(name: &'static str, default: f64, candidates: &[f64], tunable: bool) -> Self {
        Self {
            name,
            default: ParamValue::Float(default),
            candidates: candidates.iter().copied().map(ParamValue::Float).collect(),
            tunable,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Autoencoder,
    Roadmap,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchSpace {
    pub params: Vec<HyperParam>,
}

/// One point of the grid; keys are CLI option names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trial {
    pub id: usize,
    pub values: BTreeMap<&'static str, ParamValue>,
}

impl Trial {
    /// `--name value` pairs accepted by the matching training binary.
    pub fn to_cli_args(&self) -> Vec<String> {
        self.values
            .iter()
            .flat_map(|(name, value)| [format!("--{}", name.replace('_', "-")), value.to_string()])
            .collect()
    }
}

impl SearchSpace {
    pub fn for_pipeline(pipeline: Pipeline) -> Self {
        match pipeline {
            Pipeline::Autoencoder => Self::autoencoder(),
            Pipeline::Roadmap => Self::roadmap(),
        }
    }

    pub fn autoencoder() -> Self {
        Self {
            params: vec![
                HyperParam::int("hidden_dim", 256, &[256, 128], false),
                HyperParam::int("latent_dim", 128, &[64, 128], true),
                HyperParam::float("learning_rate", 1e-3, &[1e-3, 1e-4, 1e-5], true),
                HyperParam::int("batch_size", 16, &[16], false),
            ],
        }
    }

    pub fn roadmap() -> Self {
        Self {
            params: vec![
                HyperParam::float("learning_rate", 1e-3, &[1e-3, 1e-4, 1e-5], true),
                HyperParam::int("batch_size", 16, &[16], false),
            ],
        }
    }

    /// Cartesian product of the tunable candidates, in declaration order.
    pub fn trials(&self) -> Vec<Trial> {
        let mut grid: Vec<BTreeMap<&'static str, ParamValue>> = vec![BTreeMap::new()];
        for param in &self.params {
            let choices: &[ParamValue] = if param.tunable && !param.candidates.is_empty() {
                &param.candidates
            } else {
                std::slice::from_ref(&param.default)
            };
            grid = grid
                .into_iter()
                .flat_map(|partial| {
                    choices.iter().map(move |value| {
                        let mut next = partial.clone();
                        next.insert(param.name, *value);
                        next
                    })
                })
                .collect();
        }
        grid.into_iter()
            .enumerate()
            .map(|(id, values)| Trial { id, values })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoencoder_grid_has_six_trials_with_fixed_hidden_dim() {
        let trials = SearchSpace::autoencoder().trials();
        assert_eq!(trials.len(), 6);
        assert!(trials
            .iter()
            .all(|t| t.values["hidden_dim"] == ParamValue::Int(256)));
        assert!(trials
            .iter()
            .any(|t| t.values["latent_dim"] == ParamValue::Int(64)));
    }

    #[test]
    fn roadmap_grid_varies_learning_rate_only() {
        let trials = SearchSpace::roadmap().trials();
        assert_eq!(trials.len(), 3);
        assert!(trials
            .iter()
            .all(|t| t.values["batch_size"] == ParamValue::Int(16)));
    }

    #[test]
    fn cli_args_use_kebab_case_flags() {
        let trial = &SearchSpace::roadmap().trials()[0];
        assert_eq!(
            trial.to_cli_args(),
            vec!["--batch-size", "16", "--learning-rate", "1e-3"]
        );
    }
}
