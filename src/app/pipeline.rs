//! Shared "load -> configure -> index" workflow used by every dataset-driven
//! subcommand.
//!
//! Keeping it in one place means every command resolves the dataset path,
//! the configuration layers and the reference index the same way.

use tracing::info;

use crate::cli::{DataArgs, EstimatorArgs};
use crate::domain::EstimatorConfig;
use crate::error::AppError;
use crate::estimator::{Estimator, ReferenceIndex};
use crate::io::{IngestedCases, LoadedConfig, load_cases, read_config_file, resolve_cases_path};

/// Everything a subcommand needs to run the estimator.
#[derive(Debug, Clone)]
pub struct Session {
    pub cases: IngestedCases,
    pub index: ReferenceIndex,
    pub config: EstimatorConfig,
}

impl Session {
    pub fn estimator(&self) -> Result<Estimator<'_>, AppError> {
        Estimator::new(&self.index, &self.config)
    }
}

/// Preset, then `--config`, then individual flags.
pub fn resolve_config(args: &EstimatorArgs) -> Result<EstimatorConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => {
            let loaded = read_config_file(path)?;
            if let LoadedConfig::Calibration(file) = &loaded {
                info!(
                    path = %path.display(),
                    source = %file.source,
                    generated_at = %file.generated_at,
                    "using calibration file"
                );
            }
            loaded.into_config()
        }
        None => args.preset.config(),
    };

    if let Some(k) = args.k {
        config.neighbors.k = k;
    }
    if let Some(d) = args.max_distance {
        config.neighbors.max_distance = d;
    }
    if let Some(m) = args.metric {
        config.neighbors.metric = m;
    }
    if let Some(i) = args.interpolation {
        config.neighbors.interpolation = i;
    }
    if args.no_lookup {
        config.lookup.enabled = false;
    }
    if args.no_neighbors {
        config.neighbors.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

/// True when the configuration never consults reference records.
pub fn needs_reference_data(config: &EstimatorConfig) -> bool {
    config.lookup.enabled || config.neighbors.enabled
}

/// Load the dataset only.
pub fn load_dataset(data: &DataArgs) -> Result<IngestedCases, AppError> {
    let path = resolve_cases_path(data.cases.as_deref());
    load_cases(&path)
}

/// Load the dataset, resolve the configuration and build the index.
pub fn load_session(data: &DataArgs, estimator: &EstimatorArgs) -> Result<Session, AppError> {
    let config = resolve_config(estimator)?;
    let cases = load_dataset(data)?;
    let index = ReferenceIndex::new(cases.records.clone());
    Ok(Session {
        cases,
        index,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DistanceMetric, Preset};

    #[test]
    fn flags_override_preset() {
        let args = EstimatorArgs {
            preset: Preset::Conservative,
            k: Some(7),
            metric: Some(DistanceMetric::Euclidean),
            no_lookup: true,
            ..EstimatorArgs::default()
        };
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.neighbors.k, 7);
        assert_eq!(cfg.neighbors.metric, DistanceMetric::Euclidean);
        assert!(!cfg.lookup.enabled);
        assert_eq!(cfg.formula.scale, 0.9);
        assert!(cfg.shrinkage.is_some());
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = EstimatorArgs {
            k: Some(0),
            ..EstimatorArgs::default()
        };
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn formula_preset_needs_no_data() {
        assert!(!needs_reference_data(&Preset::Formula.config()));
        assert!(needs_reference_data(&Preset::Hybrid.config()));
    }
}
