use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{Config, WardConfig};
use crate::encounter::bed_status_of;
use crate::models::{BedStatus, CareStage, EmergencyStatus, EncounterType, OpdStatus, Patient};

pub(crate) fn percent(part: usize, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / f64::from(whole)
}

// ===== Outpatient =====

#[derive(Debug, Serialize)]
pub struct Column<'a> {
    pub status: OpdStatus,
    pub patients: Vec<&'a Patient>,
}

impl Column<'_> {
    pub fn count(&self) -> usize {
        self.patients.len()
    }
}

#[derive(Debug, Serialize)]
pub struct OutpatientBoard<'a> {
    pub columns: Vec<Column<'a>>,
}

impl<'a> OutpatientBoard<'a> {
    pub fn column(&self, status: OpdStatus) -> Option<&Column<'a>> {
        self.columns.iter().find(|c| c.status == status)
    }
}

/// Kanban columns in workflow order, `Queue` through `Done`.
pub fn outpatient_board(patients: &[Patient]) -> OutpatientBoard<'_> {
    let columns = OpdStatus::ALL
        .iter()
        .map(|&status| Column {
            status,
            patients: patients
                .iter()
                .filter(|p| p.stage == CareStage::Opd(status))
                .collect(),
        })
        .collect();
    OutpatientBoard { columns }
}

// ===== Emergency =====

/// Minutes from arrival to the first treatment step.
pub fn door_to_doctor(patient: &Patient) -> Option<i64> {
    let arrived = patient.timeline.started_at()?;
    let treated = patient
        .timeline
        .entered_at(EmergencyStatus::Treatment.as_str())?;
    Some((treated - arrived).num_minutes())
}

#[derive(Debug, Serialize)]
pub struct EmergencyRow<'a> {
    pub patient: &'a Patient,
    pub door_to_doctor: Option<i64>,
    pub wait_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct EmergencyBoard<'a> {
    pub rows: Vec<EmergencyRow<'a>>,
    pub waiting_room: usize,
    pub observation: usize,
    pub avg_door_to_doctor: Option<f64>,
}

/// Emergency patients, most acute first, then by arrival.
pub fn emergency_board(patients: &[Patient], now: DateTime<Utc>) -> EmergencyBoard<'_> {
    let mut ed: Vec<&Patient> = patients
        .iter()
        .filter(|p| p.encounter_type() == EncounterType::Emergency)
        .collect();
    ed.sort_by_key(|p| {
        (
            p.triage.map_or(u8::MAX, |t| t.level()),
            p.timeline.started_at().unwrap_or(p.last_action_timestamp),
        )
    });

    let count = |status| {
        ed.iter()
            .filter(|p| p.stage == CareStage::Emergency(status))
            .count()
    };
    let waiting_room = count(EmergencyStatus::WaitingRoom);
    let observation = count(EmergencyStatus::Observation);

    let rows: Vec<EmergencyRow<'_>> = ed
        .iter()
        .map(|&p| EmergencyRow {
            patient: p,
            door_to_doctor: door_to_doctor(p),
            wait_minutes: p.wait_minutes(now),
        })
        .collect();

    let timed: Vec<i64> = rows.iter().filter_map(|r| r.door_to_doctor).collect();
    let avg_door_to_doctor =
        (!timed.is_empty()).then(|| timed.iter().sum::<i64>() as f64 / timed.len() as f64);

    EmergencyBoard {
        rows,
        waiting_room,
        observation,
        avg_door_to_doctor,
    }
}

// ===== Inpatient =====

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WardOccupancy {
    pub name: String,
    pub prefix: String,
    pub occupied: usize,
    pub total: u32,
    pub percent: f64,
}

#[derive(Debug, Serialize)]
pub struct Census<'a> {
    pub wards: Vec<WardOccupancy>,
    pub occupied: usize,
    pub total: u32,
    pub percent: f64,
    /// Inpatients, restricted to the requested ward when one was given.
    pub patients: Vec<&'a Patient>,
}

/// Ward occupancy by bed prefix. `ward` matches a ward name or prefix.
pub fn census<'a>(patients: &'a [Patient], config: &Config, ward: Option<&str>) -> Census<'a> {
    let inpatients: Vec<&Patient> = patients
        .iter()
        .filter(|p| p.encounter_type() == EncounterType::Inpatient)
        .collect();
    let ward_of = |p: &Patient| p.bed.as_deref().and_then(|bed| config.ward_for_bed(bed));

    let wards: Vec<WardOccupancy> = config
        .wards
        .iter()
        .map(|w| {
            let occupied = inpatients
                .iter()
                .filter(|&&p| ward_of(p).map_or(false, |found| found.prefix == w.prefix))
                .count();
            WardOccupancy {
                name: w.name.clone(),
                prefix: w.prefix.clone(),
                occupied,
                total: w.total_beds,
                percent: percent(occupied, w.total_beds),
            }
        })
        .collect();

    let occupied = wards.iter().map(|w| w.occupied).sum();
    let total = config.total_beds();

    let patients = match ward {
        None => inpatients,
        Some(wanted) => inpatients
            .into_iter()
            .filter(|&p| {
                ward_of(p).map_or(false, |w| {
                    w.name.eq_ignore_ascii_case(wanted) || w.prefix.eq_ignore_ascii_case(wanted)
                })
            })
            .collect(),
    };

    Census {
        wards,
        occupied,
        total,
        percent: percent(occupied, total),
        patients,
    }
}

#[derive(Debug, Serialize)]
pub struct BedSlot<'a> {
    pub bed: String,
    pub status: BedStatus,
    pub patient: Option<&'a Patient>,
}

/// Every bed of `ward` referenced by a record, with its derived status.
pub fn bed_board<'a>(patients: &'a [Patient], ward: &WardConfig) -> Vec<BedSlot<'a>> {
    let prefix = format!("{}-", ward.prefix);
    let beds: BTreeSet<&str> = patients
        .iter()
        .filter_map(|p| p.bed.as_deref())
        .filter(|bed| bed.starts_with(&prefix))
        .collect();

    beds.into_iter()
        .map(|bed| BedSlot {
            bed: bed.to_string(),
            status: bed_status_of(patients, bed),
            patient: patients.iter().find(|p| p.holds_bed(bed)),
        })
        .collect()
}
