//! Encounter vocabularies and the transition table shared by every department view.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::UnknownLabel;

/// A status enum with a fixed set of successors per value.
pub trait StatusFlow: Copy + Eq + fmt::Display + 'static {
    fn allowed_next(self) -> &'static [Self];

    fn can_move_to(self, target: Self) -> bool {
        self.allowed_next().contains(&target)
    }

    fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }
}

labelled_enum! {
    /// Department that currently owns the patient.
    pub enum EncounterType {
        Opd => "OPD",
        Emergency => "Emergency",
        Inpatient => "Inpatient",
        Discharged => "Discharged",
    }
}

labelled_enum! {
    pub enum OpdStatus {
        Queue => "Queue",
        InProgress => "In Progress",
        Labs => "Labs",
        Pharmacy => "Pharmacy",
        Done => "Done",
    }
}

labelled_enum! {
    pub enum EmergencyStatus {
        WaitingRoom => "Waiting Room",
        Triage => "Triage",
        Treatment => "Treatment",
        Observation => "Observation",
    }
}

labelled_enum! {
    pub enum InpatientStatus {
        Stable => "Stable",
        Critical => "Critical",
        Observation => "Observation",
        DischargePending => "Discharge Pending",
    }
}

labelled_enum! {
    /// Bed lifecycle, parallel to the patient status: `Clean -> Occupied -> Dirty -> Clean`.
    pub enum BedStatus {
        Occupied => "Occupied",
        Clean => "Clean",
        Dirty => "Dirty",
        Blocked => "Blocked",
    }
}

impl StatusFlow for OpdStatus {
    fn allowed_next(self) -> &'static [Self] {
        use OpdStatus::*;
        match self {
            Queue => &[InProgress],
            InProgress => &[Labs, Pharmacy, Done],
            Labs => &[InProgress, Pharmacy, Done],
            Pharmacy => &[InProgress, Done],
            Done => &[],
        }
    }
}

impl StatusFlow for EmergencyStatus {
    fn allowed_next(self) -> &'static [Self] {
        use EmergencyStatus::*;
        match self {
            WaitingRoom => &[Triage, Treatment],
            Triage => &[WaitingRoom, Treatment],
            Treatment => &[Observation],
            Observation => &[Treatment],
        }
    }
}

impl StatusFlow for InpatientStatus {
    fn allowed_next(self) -> &'static [Self] {
        use InpatientStatus::*;
        match self {
            Stable => &[Critical, Observation, DischargePending],
            Critical => &[Stable, Observation, DischargePending],
            Observation => &[Stable, Critical, DischargePending],
            DischargePending => &[Stable, Critical, Observation],
        }
    }
}

/// Encounter type together with a status from that encounter's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawStage", into = "RawStage")]
pub enum CareStage {
    Opd(OpdStatus),
    Emergency(EmergencyStatus),
    Inpatient(InpatientStatus),
    /// Absorbing.
    Discharged,
}

pub const DISCHARGED: &str = "Discharged";

impl CareStage {
    /// Entry status when a patient joins the department.
    pub fn initial(encounter: EncounterType) -> Self {
        match encounter {
            EncounterType::Opd => CareStage::Opd(OpdStatus::Queue),
            EncounterType::Emergency => CareStage::Emergency(EmergencyStatus::WaitingRoom),
            EncounterType::Inpatient => CareStage::Inpatient(InpatientStatus::Stable),
            EncounterType::Discharged => CareStage::Discharged,
        }
    }

    pub fn encounter_type(&self) -> EncounterType {
        match self {
            CareStage::Opd(_) => EncounterType::Opd,
            CareStage::Emergency(_) => EncounterType::Emergency,
            CareStage::Inpatient(_) => EncounterType::Inpatient,
            CareStage::Discharged => EncounterType::Discharged,
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            CareStage::Opd(s) => s.as_str(),
            CareStage::Emergency(s) => s.as_str(),
            CareStage::Inpatient(s) => s.as_str(),
            CareStage::Discharged => DISCHARGED,
        }
    }

    /// Interpret `status` within `encounter`'s vocabulary.
    pub fn parse_in(encounter: EncounterType, status: &str) -> Result<Self, UnknownLabel> {
        Ok(match encounter {
            EncounterType::Opd => CareStage::Opd(status.parse()?),
            EncounterType::Emergency => CareStage::Emergency(status.parse()?),
            EncounterType::Inpatient => CareStage::Inpatient(status.parse()?),
            EncounterType::Discharged if status == DISCHARGED => CareStage::Discharged,
            EncounterType::Discharged => return Err(UnknownLabel(status.to_string())),
        })
    }

    /// Within-department transition check. Department moves go through admit/discharge.
    pub fn can_advance_to(&self, target: &CareStage) -> bool {
        match (self, target) {
            (CareStage::Opd(from), CareStage::Opd(to)) => from.can_move_to(*to),
            (CareStage::Emergency(from), CareStage::Emergency(to)) => from.can_move_to(*to),
            (CareStage::Inpatient(from), CareStage::Inpatient(to)) => from.can_move_to(*to),
            _ => false,
        }
    }

    pub fn allowed_targets(&self) -> Vec<CareStage> {
        match self {
            CareStage::Opd(s) => s.allowed_next().iter().copied().map(CareStage::Opd).collect(),
            CareStage::Emergency(s) => s
                .allowed_next()
                .iter()
                .copied()
                .map(CareStage::Emergency)
                .collect(),
            CareStage::Inpatient(s) => s
                .allowed_next()
                .iter()
                .copied()
                .map(CareStage::Inpatient)
                .collect(),
            CareStage::Discharged => Vec::new(),
        }
    }

    pub fn is_discharged(&self) -> bool {
        matches!(self, CareStage::Discharged)
    }
}

impl fmt::Display for CareStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.encounter_type(), self.status_label())
    }
}

/// Wire shape: the `encounterType` and `status` fields of a patient document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStage {
    pub encounter_type: EncounterType,
    pub status: String,
}

impl TryFrom<RawStage> for CareStage {
    type Error = String;

    fn try_from(raw: RawStage) -> Result<Self, Self::Error> {
        CareStage::parse_in(raw.encounter_type, &raw.status).map_err(|_| {
            format!(
                "status {:?} is not part of the {} vocabulary",
                raw.status, raw.encounter_type
            )
        })
    }
}

impl From<CareStage> for RawStage {
    fn from(stage: CareStage) -> Self {
        RawStage {
            encounter_type: stage.encounter_type(),
            status: stage.status_label().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(EncounterType::Opd, "Labs", true ; "labs is an outpatient status")]
    #[test_case(EncounterType::Inpatient, "Labs", false ; "labs is not an inpatient status")]
    #[test_case(EncounterType::Emergency, "Queue", false ; "legacy emergency queue is rejected")]
    #[test_case(EncounterType::Inpatient, "Discharge Pending", true ; "discharge pending")]
    #[test_case(EncounterType::Discharged, "Discharged", true ; "discharged")]
    #[test_case(EncounterType::Discharged, "Done", false ; "done is not terminal")]
    fn vocabulary_membership(encounter: EncounterType, status: &str, valid: bool) {
        assert_eq!(CareStage::parse_in(encounter, status).is_ok(), valid);
    }

    #[test_case(OpdStatus::Queue, OpdStatus::InProgress, true)]
    #[test_case(OpdStatus::Queue, OpdStatus::Done, false)]
    #[test_case(OpdStatus::InProgress, OpdStatus::Done, true)]
    #[test_case(OpdStatus::Labs, OpdStatus::Pharmacy, true)]
    #[test_case(OpdStatus::Done, OpdStatus::Queue, false)]
    #[test_case(OpdStatus::Labs, OpdStatus::Labs, false)]
    fn outpatient_table(from: OpdStatus, to: OpdStatus, allowed: bool) {
        assert_eq!(from.can_move_to(to), allowed);
    }

    #[test]
    fn inpatient_clinical_states_move_in_any_order() {
        use InpatientStatus::*;
        for from in [Stable, Critical, Observation] {
            for to in [Stable, Critical, Observation] {
                assert_eq!(from.can_move_to(to), from != to);
            }
            assert!(from.can_move_to(DischargePending));
        }
    }

    #[test]
    fn departments_do_not_cross_through_advance() {
        let opd = CareStage::Opd(OpdStatus::InProgress);
        assert!(!opd.can_advance_to(&CareStage::Inpatient(InpatientStatus::Stable)));
        assert!(!opd.can_advance_to(&CareStage::Discharged));
        assert!(CareStage::Discharged.allowed_targets().is_empty());
    }

    #[test]
    fn wire_shape_round_trips_through_encounter_and_status() {
        let json =
            serde_json::to_value(CareStage::Inpatient(InpatientStatus::DischargePending)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"encounterType": "Inpatient", "status": "Discharge Pending"})
        );

        let bad = serde_json::json!({"encounterType": "Inpatient", "status": "Labs"});
        assert!(serde_json::from_value::<CareStage>(bad).is_err());
    }
}
