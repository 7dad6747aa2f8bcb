//! Medical record number generation.
//!
//! Numbers are `PREFIX-YYYY-####` for outpatient registration and
//! `PREFIX-####` for emergency arrivals. The suffix is random and re-drawn on
//! collision with an existing record.

use rand::Rng;

use crate::config::MrnConfig;
use crate::models::EncounterType;

#[derive(Debug, Clone)]
pub struct MrnGenerator {
    opd_prefix: String,
    emergency_prefix: String,
    max_attempts: u32,
}

impl MrnGenerator {
    pub fn new(config: &MrnConfig) -> Self {
        Self {
            opd_prefix: config.opd_prefix.clone(),
            emergency_prefix: config.emergency_prefix.clone(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Prefix part of numbers issued for `encounter`, e.g. `TZ-2025` or `EMG`.
    pub fn prefix_for(&self, encounter: EncounterType, year: i32) -> String {
        match encounter {
            EncounterType::Emergency => self.emergency_prefix.clone(),
            _ => format!("{}-{}", self.opd_prefix, year),
        }
    }

    pub fn candidate<R: Rng>(&self, encounter: EncounterType, year: i32, rng: &mut R) -> String {
        format!(
            "{}-{:04}",
            self.prefix_for(encounter, year),
            rng.gen_range(0..10_000u32)
        )
    }

    /// Draw candidates until one is not taken, giving up after `max_attempts`.
    pub fn allocate<R, F>(
        &self,
        encounter: EncounterType,
        year: i32,
        rng: &mut R,
        is_taken: F,
    ) -> Option<String>
    where
        R: Rng,
        F: Fn(&str) -> bool,
    {
        (0..self.max_attempts)
            .map(|_| self.candidate(encounter, year, rng))
            .find(|mrn| {
                let taken = is_taken(mrn.as_str());
                if taken {
                    tracing::warn!("MRN collision on {}, drawing again", mrn);
                }
                !taken
            })
    }
}
