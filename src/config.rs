use crate::model::Resistances;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Virus and patient parameters.
    pub model: ModelConfig,
    /// Initial population parameters.
    pub init: InitConfig,
    /// Drug schedule and tracked resistances.
    #[serde(default)]
    pub treatment: TreatmentConfig,
    /// Trial and output parameters.
    pub output: OutputConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Maximum reproduction probability of every virus.
    pub max_birth_prob: f64,
    /// Clearance probability of every virus.
    pub clear_prob: f64,
    /// Maximum virus population the patient can hold.
    pub max_pop: usize,
    /// Drug resistance model; simple viruses are used when absent.
    pub resistance: Option<ResistanceConfig>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ResistanceConfig {
    /// Probability of flipping each resistance at birth.
    pub mut_prob: f64,
    /// Initial resistance of every virus, keyed by drug name.
    pub resistances: Resistances,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Initial number of viruses.
    pub n_viruses: usize,
    /// Seed of the random number generator (drawn from the OS if absent).
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct TreatmentConfig {
    /// Drugs added to the patient, each before the update of its step.
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
    /// Drug sets whose fully resistant subpopulation is recorded every step.
    #[serde(default)]
    pub tracked: Vec<Vec<String>>,
    /// Reject drugs missing from the initial resistance map.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub step: usize,
    pub drug: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of steps per trial.
    pub n_steps: usize,
    /// Number of trials per run.
    pub n_trials: usize,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Step at which the last prescription is added (zero without treatment).
    pub fn last_prescription_step(&self) -> usize {
        self.treatment
            .prescriptions
            .iter()
            .map(|pre| pre.step)
            .max()
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<()> {
        let model = &self.model;
        check_num(model.max_birth_prob, 0.0..=1.0)
            .context("invalid maximum birth probability")?;
        check_num(model.clear_prob, 0.0..=1.0).context("invalid clearance probability")?;
        check_num(model.max_pop, 1..10_000_000).context("invalid maximum population")?;

        check_num(self.init.n_viruses, 0..10_000_000)
            .context("invalid initial number of viruses")?;

        check_num(self.output.n_steps, 1..100_000).context("invalid number of steps")?;
        check_num(self.output.n_trials, 1..100_000).context("invalid number of trials")?;

        let treatment = &self.treatment;
        let Some(resistance) = &model.resistance else {
            if !treatment.prescriptions.is_empty() || !treatment.tracked.is_empty() {
                bail!("treatment requires a resistance model");
            }
            return Ok(());
        };
        check_num(resistance.mut_prob, 0.0..=1.0).context("invalid mutation probability")?;

        for (i_pre, pre) in treatment.prescriptions.iter().enumerate() {
            check_num(pre.step, 0..self.output.n_steps)
                .with_context(|| format!("invalid step of prescription {i_pre}"))?;
            if pre.drug.is_empty() {
                bail!("prescription {i_pre} has an empty drug name");
            }
        }

        if treatment.strict {
            let drugs = treatment
                .prescriptions
                .iter()
                .map(|pre| &pre.drug)
                .chain(treatment.tracked.iter().flatten());
            for drug in drugs {
                if !resistance.resistances.contains(drug) {
                    bail!("drug {drug:?} is missing from the resistance map");
                }
            }
        }

        Ok(())
    }
}

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
