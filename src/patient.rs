//! Patients hosting a virus population.

use crate::model::{Drugs, Pathogen, ResistantVirus};
use anyhow::{Result, bail};
use rand::prelude::*;

/// Patient hosting a population of viruses of type `V`.
#[derive(Debug, Clone)]
pub struct Patient<V> {
    viruses: Vec<V>,
    max_pop: usize,
}

impl<V: Pathogen> Patient<V> {
    /// Create a new patient with an initial virus population.
    ///
    /// # Errors
    /// Returns an error if `max_pop` is zero.
    pub fn new(viruses: Vec<V>, max_pop: usize) -> Result<Self> {
        if max_pop == 0 {
            bail!("maximum population must be positive");
        }
        Ok(Self { viruses, max_pop })
    }

    pub fn viruses(&self) -> &[V] {
        &self.viruses
    }

    pub fn max_pop(&self) -> usize {
        self.max_pop
    }

    pub fn total_pop(&self) -> usize {
        self.viruses.len()
    }

    /// Advance the population by one time step under `treatment`.
    ///
    /// Cleared viruses are removed first; the density of the survivors is then
    /// fixed for every reproduction decision of this step, and offspring are
    /// only appended once all survivors have had their chance.
    /// Returns the total population at the end of the step.
    pub fn update_with<R: Rng + ?Sized>(&mut self, treatment: &V::Treatment, rng: &mut R) -> usize {
        self.viruses.retain(|virus| virus.survives(rng));

        let pop_density = self.viruses.len() as f64 / self.max_pop as f64;

        let offspring: Vec<V> = self
            .viruses
            .iter()
            .filter_map(|virus| virus.try_reproduce(pop_density, treatment, rng))
            .collect();
        self.viruses.extend(offspring);

        self.viruses.len()
    }
}

impl<V: Pathogen<Treatment = ()>> Patient<V> {
    /// Advance an untreated population by one time step.
    pub fn update<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        self.update_with(&(), rng)
    }
}

/// Patient that can be given drugs.
///
/// Prescriptions are never withdrawn.
#[derive(Debug, Clone)]
pub struct TreatedPatient {
    patient: Patient<ResistantVirus>,
    prescriptions: Drugs,
}

impl TreatedPatient {
    /// Create a new untreated patient with an initial virus population.
    ///
    /// # Errors
    /// Returns an error if `max_pop` is zero.
    pub fn new(viruses: Vec<ResistantVirus>, max_pop: usize) -> Result<Self> {
        Ok(Self {
            patient: Patient::new(viruses, max_pop)?,
            prescriptions: Drugs::new(),
        })
    }

    /// Administer `drug` from now on. Prescribing the same drug twice has no effect.
    pub fn add_prescription(&mut self, drug: impl Into<String>) {
        self.prescriptions.insert(drug.into());
    }

    pub fn prescriptions(&self) -> &Drugs {
        &self.prescriptions
    }

    pub fn viruses(&self) -> &[ResistantVirus] {
        self.patient.viruses()
    }

    pub fn max_pop(&self) -> usize {
        self.patient.max_pop()
    }

    pub fn total_pop(&self) -> usize {
        self.patient.total_pop()
    }

    /// Number of viruses resistant to all of `drugs` (every virus if `drugs` is empty).
    pub fn resistant_pop<S: AsRef<str>>(&self, drugs: &[S]) -> usize {
        self.viruses()
            .iter()
            .filter(|virus| drugs.iter().all(|drug| virus.is_resistant_to(drug.as_ref())))
            .count()
    }

    /// Advance the population by one time step under the current prescriptions.
    pub fn update<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        self.patient.update_with(&self.prescriptions, rng)
    }
}
