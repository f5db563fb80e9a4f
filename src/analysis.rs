use crate::config::Config;
use crate::engine::Trajectory;
use crate::stats::{Accumulator, AccumulatorReport, TimeSeriesReport};
use anyhow::{Context, Result, bail};
use rmp_serde::{decode, encode};
use serde::Serialize;
use serde_value::Value;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

pub trait Obs {
    fn update(&mut self, trajectory: &Trajectory) -> Result<()>;
    fn report(&self) -> Result<Value>;
}

fn named_report<T: Serialize>(name: &str, report: T) -> Result<Value> {
    let report = serde_value::to_value(report)
        .with_context(|| format!("failed to convert {name} report"))?;
    let mut map = BTreeMap::new();
    map.insert(Value::String(name.to_string()), report);
    Ok(Value::Map(map))
}

fn add_series(acc_vec: &mut [Accumulator], series: &[usize]) -> Result<()> {
    if series.len() != acc_vec.len() {
        bail!(
            "series must have {} steps, but has {}",
            acc_vec.len(),
            series.len()
        );
    }
    for (acc, &val) in acc_vec.iter_mut().zip(series) {
        acc.add(val as f64);
    }
    Ok(())
}

/// Average total population at every step, plus the equilibrium reached
/// after the last prescription.
pub struct AvgTotalPop {
    acc_vec: Vec<Accumulator>,
    i_last_phase: usize,
}

#[derive(Serialize)]
struct AvgTotalPopReport {
    per_step: Vec<AccumulatorReport>,
    last_phase: TimeSeriesReport,
}

impl AvgTotalPop {
    pub fn new(cfg: &Config) -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(cfg.output.n_steps, Accumulator::new);
        Self {
            acc_vec,
            i_last_phase: cfg.last_prescription_step(),
        }
    }

    pub fn means(&self) -> Vec<f64> {
        self.acc_vec.iter().map(Accumulator::mean).collect()
    }
}

impl Obs for AvgTotalPop {
    fn update(&mut self, trajectory: &Trajectory) -> Result<()> {
        add_series(&mut self.acc_vec, &trajectory.total)
    }

    fn report(&self) -> Result<Value> {
        let means = self.means();
        let report = AvgTotalPopReport {
            per_step: self.acc_vec.iter().map(Accumulator::report).collect(),
            last_phase: TimeSeriesReport::new(&means[self.i_last_phase..]),
        };
        named_report("avg_total_pop", report)
    }
}

/// Average fully resistant population at every step, per tracked drug set.
pub struct AvgResistantPop {
    tracked: Vec<Vec<String>>,
    acc_vecs: Vec<Vec<Accumulator>>,
}

#[derive(Serialize)]
struct ResistantPopReport<'a> {
    drugs: &'a [String],
    per_step: Vec<AccumulatorReport>,
}

impl AvgResistantPop {
    pub fn new(cfg: &Config) -> Self {
        let tracked = cfg.treatment.tracked.clone();
        let acc_vecs = tracked
            .iter()
            .map(|_| vec![Accumulator::new(); cfg.output.n_steps])
            .collect();
        Self { tracked, acc_vecs }
    }
}

impl Obs for AvgResistantPop {
    fn update(&mut self, trajectory: &Trajectory) -> Result<()> {
        if trajectory.resistant.len() != self.acc_vecs.len() {
            bail!(
                "trajectory must track {} drug sets, but tracks {}",
                self.acc_vecs.len(),
                trajectory.resistant.len()
            );
        }
        for (acc_vec, series) in self.acc_vecs.iter_mut().zip(&trajectory.resistant) {
            add_series(acc_vec, series)?;
        }
        Ok(())
    }

    fn report(&self) -> Result<Value> {
        let reports: Vec<_> = self
            .tracked
            .iter()
            .zip(&self.acc_vecs)
            .map(|(drugs, acc_vec)| ResistantPopReport {
                drugs,
                per_step: acc_vec.iter().map(Accumulator::report).collect(),
            })
            .collect();
        named_report("avg_resistant_pop", reports)
    }
}

/// Fraction of trials in which the patient ends up free of viruses.
pub struct ProbCleared {
    acc: Accumulator,
}

impl ProbCleared {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for ProbCleared {
    fn update(&mut self, trajectory: &Trajectory) -> Result<()> {
        let cleared = trajectory.total.last() == Some(&0);
        self.acc.add(if cleared { 1.0 } else { 0.0 });
        Ok(())
    }

    fn report(&self) -> Result<Value> {
        named_report("prob_cleared", self.acc.report())
    }
}

pub struct Analyzer {
    cfg: Config,
    avg_total_pop: AvgTotalPop,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
    n_trials: usize,
}

impl Analyzer {
    pub fn new(cfg: Config) -> Self {
        let avg_total_pop = AvgTotalPop::new(&cfg);
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(AvgResistantPop::new(&cfg)),
            Box::new(ProbCleared::new()),
        ];
        Self {
            cfg,
            avg_total_pop,
            obs_ptr_vec,
            n_trials: 0,
        }
    }

    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    pub fn add_trajectory(&mut self, trajectory: &Trajectory) -> Result<()> {
        self.avg_total_pop
            .update(trajectory)
            .context("failed to update observable")?;
        for obs in &mut self.obs_ptr_vec {
            obs.update(trajectory)
                .context("failed to update observable")?;
        }
        self.n_trials += 1;
        Ok(())
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        for i_trial in 0..self.cfg.output.n_trials {
            let trajectory: Trajectory = decode::from_read(&mut reader)
                .with_context(|| format!("failed to read trajectory {i_trial}"))?;
            self.add_trajectory(&trajectory)?;
        }
        Ok(())
    }

    /// Log the averaged total population at a few evenly spaced steps.
    pub fn log_summary(&self) {
        let means = self.avg_total_pop.means();
        let stride = (means.len() / 10).max(1);
        for (step, mean) in means.iter().enumerate().step_by(stride) {
            log::info!("step {step:>6}: avg total pop {mean:.2}");
        }
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let mut reports = vec![self.avg_total_pop.report()?];
        for obs in &self.obs_ptr_vec {
            reports.push(obs.report()?);
        }
        encode::write(&mut writer, &reports).context("failed to serialize results")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}
