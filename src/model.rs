//! Virus particles and their stochastic decisions.

use crate::config::check_num;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::Bernoulli;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Set of drug names currently administered to a patient.
pub type Drugs = BTreeSet<String>;

/// Sample a Bernoulli trial with success probability `prob`.
///
/// The probability is clamped to `[0, 1]` first, so an overcrowded
/// population (density above one) never succeeds.
pub fn bernoulli<R: Rng + ?Sized>(prob: f64, rng: &mut R) -> bool {
    Bernoulli::new(prob.clamp(0.0, 1.0)).is_ok_and(|dist| dist.sample(rng))
}

/// Capability shared by every kind of virus a patient can host.
///
/// `Treatment` is whatever the reproduction decision depends on besides the
/// population density: nothing for a [`Virus`], the active drugs for a
/// [`ResistantVirus`].
pub trait Pathogen: Sized {
    type Treatment: ?Sized;

    fn survives<R: Rng + ?Sized>(&self, rng: &mut R) -> bool;

    fn try_reproduce<R: Rng + ?Sized>(
        &self,
        pop_density: f64,
        treatment: &Self::Treatment,
        rng: &mut R,
    ) -> Option<Self>;
}

/// Virus particle without any drug resistance.
#[derive(Debug, Clone, PartialEq)]
pub struct Virus {
    max_birth_prob: f64,
    clear_prob: f64,
}

impl Virus {
    /// Create a new virus particle.
    ///
    /// # Errors
    /// Returns an error if either probability lies outside `[0, 1]`.
    pub fn new(max_birth_prob: f64, clear_prob: f64) -> Result<Self> {
        check_num(max_birth_prob, 0.0..=1.0).context("invalid maximum birth probability")?;
        check_num(clear_prob, 0.0..=1.0).context("invalid clearance probability")?;
        Ok(Self {
            max_birth_prob,
            clear_prob,
        })
    }

    pub fn max_birth_prob(&self) -> f64 {
        self.max_birth_prob
    }

    pub fn clear_prob(&self) -> f64 {
        self.clear_prob
    }

    /// Decide whether the particle is cleared from the patient at this step.
    pub fn does_clear<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        bernoulli(self.clear_prob, rng)
    }

    pub fn survives<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        !self.does_clear(rng)
    }

    /// Reproduce with probability `max_birth_prob * (1 - pop_density)`.
    ///
    /// Returns `None` when the particle has no offspring at this step.
    pub fn reproduce<R: Rng + ?Sized>(&self, pop_density: f64, rng: &mut R) -> Option<Self> {
        let birth_prob = self.max_birth_prob * (1.0 - pop_density);
        bernoulli(birth_prob, rng).then(|| Self {
            max_birth_prob: self.max_birth_prob,
            clear_prob: self.clear_prob,
        })
    }
}

impl Pathogen for Virus {
    type Treatment = ();

    fn survives<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        Virus::survives(self, rng)
    }

    fn try_reproduce<R: Rng + ?Sized>(
        &self,
        pop_density: f64,
        _treatment: &(),
        rng: &mut R,
    ) -> Option<Self> {
        self.reproduce(pop_density, rng)
    }
}

/// Resistance state of a virus particle, keyed by drug name.
///
/// Never modified in place: mutation produces a new map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resistances(BTreeMap<String, bool>);

impl Resistances {
    /// Resistance to `drug`; a drug missing from the map counts as not resisted.
    pub fn is_resistant_to(&self, drug: &str) -> bool {
        self.0.get(drug).copied().unwrap_or(false)
    }

    pub fn contains(&self, drug: &str) -> bool {
        self.0.contains_key(drug)
    }

    /// Copy of this map where every entry flips independently with probability `mut_prob`.
    pub fn mutated<R: Rng + ?Sized>(&self, mut_prob: f64, rng: &mut R) -> Self {
        let map = self
            .0
            .iter()
            .map(|(drug, &resistant)| (drug.clone(), resistant ^ bernoulli(mut_prob, rng)))
            .collect();
        Self(map)
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for Resistances {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(drug, res)| (drug.into(), res)).collect())
    }
}

/// Virus particle that can acquire or lose resistance to drugs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResistantVirus {
    virus: Virus,
    resistances: Resistances,
    mut_prob: f64,
}

impl ResistantVirus {
    /// Create a new resistant virus particle.
    ///
    /// # Errors
    /// Returns an error if any probability lies outside `[0, 1]`.
    pub fn new(
        max_birth_prob: f64,
        clear_prob: f64,
        resistances: Resistances,
        mut_prob: f64,
    ) -> Result<Self> {
        let virus = Virus::new(max_birth_prob, clear_prob)?;
        check_num(mut_prob, 0.0..=1.0).context("invalid mutation probability")?;
        Ok(Self {
            virus,
            resistances,
            mut_prob,
        })
    }

    pub fn max_birth_prob(&self) -> f64 {
        self.virus.max_birth_prob()
    }

    pub fn clear_prob(&self) -> f64 {
        self.virus.clear_prob()
    }

    pub fn mut_prob(&self) -> f64 {
        self.mut_prob
    }

    pub fn resistances(&self) -> &Resistances {
        &self.resistances
    }

    pub fn survives<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.virus.survives(rng)
    }

    /// Whether this particle resists `drug`.
    ///
    /// Lookup is permissive: a drug this particle has no entry for is not resisted.
    pub fn is_resistant_to(&self, drug: &str) -> bool {
        self.resistances.is_resistant_to(drug)
    }

    /// Reproduce under the given drug regime.
    ///
    /// Reproduction is blocked unless the particle resists every active drug;
    /// no random draw is consumed in that case. The offspring inherits all
    /// probabilities and a mutated copy of the resistance map.
    pub fn reproduce<R: Rng + ?Sized>(
        &self,
        pop_density: f64,
        active_drugs: &Drugs,
        rng: &mut R,
    ) -> Option<Self> {
        if !active_drugs.iter().all(|drug| self.is_resistant_to(drug)) {
            return None;
        }
        let virus = self.virus.reproduce(pop_density, rng)?;
        Some(Self {
            virus,
            resistances: self.resistances.mutated(self.mut_prob, rng),
            mut_prob: self.mut_prob,
        })
    }
}

impl Pathogen for ResistantVirus {
    type Treatment = Drugs;

    fn survives<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        ResistantVirus::survives(self, rng)
    }

    fn try_reproduce<R: Rng + ?Sized>(
        &self,
        pop_density: f64,
        treatment: &Drugs,
        rng: &mut R,
    ) -> Option<Self> {
        self.reproduce(pop_density, treatment, rng)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MaxRng, ZeroRng};
    use super::*;
    use rand_chacha::ChaCha12Rng;

    fn guttagonol(resistant: bool) -> Resistances {
        [("guttagonol", resistant)].into_iter().collect()
    }

    #[test]
    fn survival_follows_clear_prob_extremes() {
        let immortal = Virus::new(0.5, 0.0).unwrap();
        let doomed = Virus::new(0.5, 1.0).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(immortal.survives(&mut rng));
            assert!(!doomed.survives(&mut rng));
        }
        assert!(immortal.survives(&mut ZeroRng));
        assert!(!doomed.survives(&mut MaxRng));
    }

    #[test]
    fn survival_rate_matches_clear_prob() {
        let virus = Virus::new(0.5, 0.3).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let n_draws = 20_000;
        let n_survivors = (0..n_draws).filter(|_| virus.survives(&mut rng)).count();
        let rate = n_survivors as f64 / n_draws as f64;
        assert!((rate - 0.7).abs() < 0.02, "survival rate {rate}");
    }

    #[test]
    fn no_offspring_at_full_density() {
        let virus = Virus::new(1.0, 0.0).unwrap();
        assert_eq!(virus.reproduce(1.0, &mut ZeroRng), None);
        assert_eq!(virus.reproduce(1.5, &mut ZeroRng), None);

        let mut rng = ChaCha12Rng::seed_from_u64(3);
        assert!((0..1000).all(|_| virus.reproduce(1.0, &mut rng).is_none()));

        let resistant = ResistantVirus::new(1.0, 0.0, guttagonol(true), 0.5).unwrap();
        let drugs: Drugs = ["guttagonol".to_string()].into();
        assert_eq!(resistant.reproduce(1.0, &Drugs::new(), &mut ZeroRng), None);
        assert_eq!(resistant.reproduce(1.0, &drugs, &mut ZeroRng), None);
        assert_eq!(resistant.reproduce(1.5, &drugs, &mut ZeroRng), None);
    }

    #[test]
    fn offspring_copies_parent_probabilities() {
        let virus = Virus::new(0.8, 0.25).unwrap();
        let child = virus.reproduce(0.1, &mut ZeroRng).unwrap();
        assert_eq!(child.max_birth_prob(), 0.8);
        assert_eq!(child.clear_prob(), 0.25);
        assert!(virus.reproduce(0.1, &mut MaxRng).is_none());
    }

    #[test]
    fn invalid_probabilities_are_rejected() {
        assert!(Virus::new(1.5, 0.1).is_err());
        assert!(Virus::new(0.1, -0.1).is_err());
        assert!(Virus::new(f64::NAN, 0.1).is_err());
        assert!(ResistantVirus::new(0.1, 0.1, Resistances::default(), 2.0).is_err());
    }

    #[test]
    fn unknown_drug_is_not_resisted() {
        let virus = ResistantVirus::new(0.1, 0.05, guttagonol(true), 0.0).unwrap();
        assert!(virus.is_resistant_to("guttagonol"));
        assert!(!virus.is_resistant_to("grimpex"));
        assert!(virus.resistances().contains("guttagonol"));
        assert!(!virus.resistances().contains("grimpex"));
    }

    #[test]
    fn active_drug_blocks_susceptible_virus_without_drawing() {
        let virus = ResistantVirus::new(1.0, 0.0, guttagonol(false), 0.0).unwrap();
        let drugs: Drugs = ["guttagonol".to_string()].into();

        // A gated-out particle must leave the stream untouched.
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let mut reference = rng.clone();
        assert!(virus.reproduce(0.0, &drugs, &mut rng).is_none());
        assert_eq!(rng.next_u64(), reference.next_u64());

        assert!(virus.reproduce(0.0, &Drugs::new(), &mut ZeroRng).is_some());
    }

    #[test]
    fn reproduction_requires_resisting_every_drug() {
        let resistances: Resistances = [("guttagonol", true), ("grimpex", false)]
            .into_iter()
            .collect();
        let virus = ResistantVirus::new(1.0, 0.0, resistances, 0.0).unwrap();
        let one: Drugs = ["guttagonol".to_string()].into();
        let both: Drugs = ["guttagonol".to_string(), "grimpex".to_string()].into();
        assert!(virus.reproduce(0.0, &one, &mut ZeroRng).is_some());
        assert!(virus.reproduce(0.0, &both, &mut ZeroRng).is_none());
    }

    #[test]
    fn zero_mut_prob_keeps_resistances() {
        let resistances: Resistances = [("guttagonol", true), ("grimpex", false)]
            .into_iter()
            .collect();
        let virus = ResistantVirus::new(1.0, 0.0, resistances.clone(), 0.0).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(13);
        for _ in 0..200 {
            if let Some(child) = virus.reproduce(0.2, &Drugs::new(), &mut rng) {
                assert_eq!(child.resistances(), &resistances);
            }
        }
    }

    #[test]
    fn certain_mutation_flips_every_drug_and_spares_parent() {
        let resistances: Resistances = [("guttagonol", true), ("grimpex", false)]
            .into_iter()
            .collect();
        let virus = ResistantVirus::new(1.0, 0.0, resistances.clone(), 1.0).unwrap();
        let child = virus.reproduce(0.0, &Drugs::new(), &mut ZeroRng).unwrap();

        assert!(!child.is_resistant_to("guttagonol"));
        assert!(child.is_resistant_to("grimpex"));
        assert_eq!(child.mut_prob(), 1.0);
        assert_eq!(virus.resistances(), &resistances);
    }

    #[test]
    fn each_drug_mutates_independently() {
        let resistances: Resistances = [("guttagonol", true), ("grimpex", false)]
            .into_iter()
            .collect();
        let mut rng = ChaCha12Rng::seed_from_u64(29);
        let n_children = 20_000;
        let mut counts = [0_usize; 4];
        for _ in 0..n_children {
            let child = resistances.mutated(0.5, &mut rng);
            let i_combo = 2 * usize::from(child.is_resistant_to("guttagonol"))
                + usize::from(child.is_resistant_to("grimpex"));
            counts[i_combo] += 1;
        }
        for count in counts {
            let freq = count as f64 / n_children as f64;
            assert!((freq - 0.25).abs() < 0.02, "combination counts {counts:?}");
        }
    }
}
