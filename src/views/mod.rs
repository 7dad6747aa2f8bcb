//! Read-only projections over patient and department records.
//!
//! Nothing here writes. Every function takes the records it needs plus a
//! `now` where waiting times matter, so the same snapshot always renders the
//! same way.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CareStage, InpatientStatus, OpdStatus, Patient};

pub mod boards;
pub mod dashboard;

pub use boards::{
    bed_board, census, door_to_doctor, emergency_board, outpatient_board, BedSlot, Census,
    EmergencyBoard, EmergencyRow, OutpatientBoard, WardOccupancy,
};
pub use dashboard::{
    dashboard_stats, lab_counts, pharmacy_queue, supplies_below_par, DashboardStats, KpiRating,
    LabCounts,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    LongWait,
    Normal,
}

/// Critical when an alert is raised, the patient is ESI 1-2 or inpatient
/// critical; long wait past `long_wait_minutes` in the current state.
pub fn urgency(patient: &Patient, now: DateTime<Utc>, long_wait_minutes: i64) -> Urgency {
    let critical = patient.critical_alert.is_some()
        || patient.triage.map_or(false, |t| t.level() <= 2)
        || patient.stage == CareStage::Inpatient(InpatientStatus::Critical);
    if critical {
        Urgency::Critical
    } else if !patient.stage.is_discharged() && patient.wait_minutes(now) > long_wait_minutes {
        Urgency::LongWait
    } else {
        Urgency::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickFilter {
    CriticalAlerts,
    LongWait,
    LabsPending,
}

pub fn quick_filter<'a>(
    patients: &'a [Patient],
    filter: QuickFilter,
    now: DateTime<Utc>,
    long_wait_minutes: i64,
) -> Vec<&'a Patient> {
    patients
        .iter()
        .filter(|p| match filter {
            QuickFilter::CriticalAlerts => p.critical_alert.is_some(),
            QuickFilter::LongWait => {
                !p.stage.is_discharged() && p.wait_minutes(now) > long_wait_minutes
            }
            QuickFilter::LabsPending => p.stage == CareStage::Opd(OpdStatus::Labs),
        })
        .collect()
}

/// Case-insensitive substring match on MRN or name. A blank query matches everyone.
pub fn search<'a>(patients: &'a [Patient], query: &str) -> Vec<&'a Patient> {
    let needle = query.trim().to_lowercase();
    patients
        .iter()
        .filter(|p| {
            needle.is_empty()
                || p.mrn.to_lowercase().contains(&needle)
                || p.name.to_lowercase().contains(&needle)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Duration, Utc};

    use crate::models::{CareStage, Patient, Timeline};

    pub fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_750_000_000, 0).unwrap() + Duration::minutes(minutes)
    }

    pub fn patient(mrn: &str, name: &str, stage: CareStage) -> Patient {
        Patient {
            id: format!("doc-{mrn}"),
            mrn: mrn.into(),
            name: name.into(),
            dob: None,
            sex: None,
            age: None,
            blood_type: "O+".into(),
            photo: "p".into(),
            phone: None,
            national_id: None,
            stage,
            doctor: "Dr. Juma".into(),
            doctor_id: None,
            bed: None,
            bed_status: None,
            admission_date: None,
            dx: None,
            triage: None,
            complaint: None,
            location: None,
            critical_alert: None,
            timeline: Timeline::seeded("Registered", "Fatuma", at(0)),
            tasks: vec![],
            last_action: "Registered".into(),
            last_action_timestamp: at(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{at, patient};
    use super::*;
    use crate::models::{EmergencyStatus, Triage};
    use test_case::test_case;

    #[test_case(None, None, 10, Urgency::Normal ; "fresh arrival")]
    #[test_case(None, None, 45, Urgency::LongWait ; "waiting past threshold")]
    #[test_case(Some(2), None, 45, Urgency::Critical ; "emergent triage wins over wait")]
    #[test_case(None, Some("K+ 6.2 (Critical)"), 0, Urgency::Critical ; "critical alert")]
    fn urgency_classes(triage: Option<u8>, alert: Option<&str>, waited: i64, expected: Urgency) {
        let mut p = patient(
            "EMG-0001",
            "Carlos Garcia",
            CareStage::Emergency(EmergencyStatus::WaitingRoom),
        );
        p.triage = triage.and_then(Triage::new);
        p.critical_alert = alert.map(str::to_string);
        assert_eq!(urgency(&p, at(waited), 30), expected);
    }

    #[test]
    fn search_matches_mrn_or_name_ignoring_case() {
        let patients = vec![
            patient("TZ-2025-1101", "Amina Hassan", CareStage::Opd(OpdStatus::Queue)),
            patient("TZ-2025-1102", "John Williams", CareStage::Opd(OpdStatus::Labs)),
        ];
        assert_eq!(search(&patients, "hassan").len(), 1);
        assert_eq!(search(&patients, "tz-2025-11").len(), 2);
        assert_eq!(search(&patients, "  ").len(), 2);
        assert!(search(&patients, "garcia").is_empty());
    }

    #[test]
    fn labs_pending_filter_only_sees_outpatient_labs() {
        let patients = vec![
            patient("TZ-2025-1101", "Amina Hassan", CareStage::Opd(OpdStatus::Queue)),
            patient("TZ-2025-1102", "John Williams", CareStage::Opd(OpdStatus::Labs)),
        ];
        let pending = quick_filter(&patients, QuickFilter::LabsPending, at(0), 30);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "John Williams");
    }
}
