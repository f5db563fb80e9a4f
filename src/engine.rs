use crate::config::Config;
use crate::model::{ResistantVirus, Virus};
use crate::patient::{Patient, TreatedPatient};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Population counts recorded after every step of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Total population.
    pub total: Vec<usize>,
    /// Fully resistant population, one series per tracked drug set.
    pub resistant: Vec<Vec<usize>>,
}

impl Trajectory {
    fn new(n_steps: usize, n_tracked: usize) -> Self {
        Self {
            total: Vec::with_capacity(n_steps),
            resistant: vec![Vec::with_capacity(n_steps); n_tracked],
        }
    }
}

/// Trial driver.
///
/// Holds the configuration and random number generator, and runs
/// independent trials, each on a freshly infected patient.
pub struct Engine {
    cfg: Config,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine`, seeded from the configuration or from the OS.
    ///
    /// Each run draws from its own stream, so seeded runs do not repeat each other.
    pub fn new(cfg: Config, run_idx: usize) -> Result<Self> {
        let mut rng = match cfg.init.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };
        rng.set_stream(run_idx as u64);
        Ok(Self { cfg, rng })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    /// Perform all trials and save the resulting trajectories to a binary file.
    pub fn perform_trials<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let n_trials = self.cfg.output.n_trials;
        for i_trial in 0..n_trials {
            let trajectory = self
                .perform_trial()
                .with_context(|| format!("failed to perform trial {i_trial}"))?;

            encode::write(&mut writer, &trajectory).context("failed to serialize trajectory")?;

            let progress = 100.0 * (i_trial + 1) as f64 / n_trials as f64;
            log::info!("completed {progress:06.2}%");
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Perform a single trial.
    pub fn perform_trial(&mut self) -> Result<Trajectory> {
        let model = &self.cfg.model;
        let n_steps = self.cfg.output.n_steps;
        let n_viruses = self.cfg.init.n_viruses;

        let Some(resistance) = &model.resistance else {
            let viruses = (0..n_viruses)
                .map(|_| Virus::new(model.max_birth_prob, model.clear_prob))
                .collect::<Result<Vec<_>>>()
                .context("failed to create viruses")?;
            let mut patient =
                Patient::new(viruses, model.max_pop).context("failed to create patient")?;

            let mut trajectory = Trajectory::new(n_steps, 0);
            for _ in 0..n_steps {
                trajectory.total.push(patient.update(&mut self.rng));
            }
            return Ok(trajectory);
        };

        let viruses = (0..n_viruses)
            .map(|_| {
                ResistantVirus::new(
                    model.max_birth_prob,
                    model.clear_prob,
                    resistance.resistances.clone(),
                    resistance.mut_prob,
                )
            })
            .collect::<Result<Vec<_>>>()
            .context("failed to create viruses")?;
        if let Some(virus) = viruses.first() {
            log::debug!(
                "trial starts with {n_viruses} viruses: birth {}, clearance {}, mutation {}, resistances {:?}",
                virus.max_birth_prob(),
                virus.clear_prob(),
                virus.mut_prob(),
                virus.resistances()
            );
        }
        let mut patient =
            TreatedPatient::new(viruses, model.max_pop).context("failed to create patient")?;

        let treatment = &self.cfg.treatment;
        let mut trajectory = Trajectory::new(n_steps, treatment.tracked.len());
        for step in 0..n_steps {
            for pre in treatment.prescriptions.iter().filter(|pre| pre.step == step) {
                patient.add_prescription(pre.drug.as_str());
            }

            trajectory.total.push(patient.update(&mut self.rng));
            for (drugs, series) in treatment.tracked.iter().zip(&mut trajectory.resistant) {
                series.push(patient.resistant_pop(drugs));
            }
        }

        log::debug!(
            "trial finished with {}/{} viruses under {:?}",
            patient.total_pop(),
            patient.max_pop(),
            patient.prescriptions()
        );

        Ok(trajectory)
    }
}
