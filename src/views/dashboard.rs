use serde::Serialize;

use super::boards::{census, door_to_doctor, percent};
use crate::config::Config;
use crate::models::{
    EncounterType, InventoryItem, LabOrder, LabStatus, Patient, Prescription, PrescriptionStatus,
    Surgery, SurgeryStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiRating {
    OnTarget,
    Watch,
    OffTarget,
}

impl KpiRating {
    /// Lower is better: above `bad` is off target, above `warn` needs watching.
    fn lower_is_better(value: f64, warn: f64, bad: f64) -> Self {
        if value > bad {
            KpiRating::OffTarget
        } else if value > warn {
            KpiRating::Watch
        } else {
            KpiRating::OnTarget
        }
    }
}

/// Headline numbers of the operations dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub opd_count: usize,
    pub bed_occupancy_percent: f64,
    pub avg_door_to_doctor_minutes: Option<f64>,
    pub or_utilisation_percent: f64,
    pub avg_lab_turnaround_minutes: Option<f64>,
    pub critical_alerts: usize,
}

impl DashboardStats {
    pub fn ratings(&self) -> Vec<(&'static str, KpiRating)> {
        let ipd = if (70.0..=85.0).contains(&self.bed_occupancy_percent) {
            KpiRating::OnTarget
        } else {
            KpiRating::Watch
        };
        let or = match self.or_utilisation_percent {
            u if u >= 60.0 => KpiRating::OnTarget,
            u if u >= 50.0 => KpiRating::Watch,
            _ => KpiRating::OffTarget,
        };
        vec![
            ("opd", KpiRating::lower_is_better(self.opd_count as f64, 100.0, 120.0)),
            (
                "ed",
                KpiRating::lower_is_better(
                    self.avg_door_to_doctor_minutes.unwrap_or(0.0),
                    20.0,
                    30.0,
                ),
            ),
            ("ipd", ipd),
            ("or", or),
            (
                "labs",
                KpiRating::lower_is_better(
                    self.avg_lab_turnaround_minutes.unwrap_or(0.0),
                    45.0,
                    60.0,
                ),
            ),
        ]
    }
}

fn mean(values: &[i64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<i64>() as f64 / values.len() as f64)
}

pub fn dashboard_stats(
    patients: &[Patient],
    surgeries: &[Surgery],
    labs: &[LabOrder],
    config: &Config,
) -> DashboardStats {
    let door_times: Vec<i64> = patients
        .iter()
        .filter(|p| p.encounter_type() == EncounterType::Emergency)
        .filter_map(door_to_doctor)
        .collect();
    let turnarounds: Vec<i64> = labs.iter().filter_map(LabOrder::turnaround_minutes).collect();
    let active = surgeries
        .iter()
        .filter(|s| s.status == SurgeryStatus::InProgress)
        .count();

    DashboardStats {
        opd_count: patients
            .iter()
            .filter(|p| p.encounter_type() == EncounterType::Opd)
            .count(),
        bed_occupancy_percent: census(patients, config, None).percent,
        avg_door_to_doctor_minutes: mean(&door_times),
        or_utilisation_percent: percent(active, config.operations.operating_rooms),
        avg_lab_turnaround_minutes: mean(&turnarounds),
        critical_alerts: patients.iter().filter(|p| p.critical_alert.is_some()).count(),
    }
}

/// Prescriptions still waiting at the pharmacy window, oldest first.
pub fn pharmacy_queue(prescriptions: &[Prescription]) -> Vec<&Prescription> {
    let mut queue: Vec<&Prescription> = prescriptions
        .iter()
        .filter(|p| p.status != PrescriptionStatus::Dispensed)
        .collect();
    queue.sort_by_key(|p| p.prescribed_at);
    queue
}

pub fn supplies_below_par(items: &[InventoryItem]) -> Vec<&InventoryItem> {
    items.iter().filter(|i| i.below_par()).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabCounts {
    pub pending_lab: usize,
    pub pending_radiology: usize,
    pub critical_pending: usize,
}

pub fn lab_counts(orders: &[LabOrder]) -> LabCounts {
    orders
        .iter()
        .filter(|o| o.status != LabStatus::Completed)
        .fold(LabCounts::default(), |mut counts, o| {
            counts.pending_lab += usize::from(o.is_laboratory());
            counts.pending_radiology += usize::from(o.is_radiology());
            counts.critical_pending += usize::from(o.is_critical);
            counts
        })
}
