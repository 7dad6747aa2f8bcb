use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::stage::{BedStatus, CareStage, EncounterType};
use super::timeline::Timeline;

/// Emergency Severity Index, 1 (resuscitation) to 5 (non-urgent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Triage(u8);

impl Triage {
    pub fn new(level: u8) -> Option<Self> {
        (1..=5).contains(&level).then_some(Self(level))
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "ESI 1 - Resuscitation",
            2 => "ESI 2 - Emergent",
            3 => "ESI 3 - Urgent",
            4 => "ESI 4 - Less Urgent",
            _ => "ESI 5 - Non-Urgent",
        }
    }
}

impl TryFrom<u8> for Triage {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Triage::new(level).ok_or_else(|| format!("triage level {level} outside 1..=5"))
    }
}

impl From<Triage> for u8 {
    fn from(triage: Triage) -> u8 {
        triage.0
    }
}

/// Nursing checklist entry, independent of the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    pub completed: bool,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            completed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Store document id, not part of the document body.
    #[serde(skip)]
    pub id: String,
    pub mrn: String,
    pub name: String,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    pub blood_type: String,
    pub photo: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub national_id: Option<String>,

    #[serde(flatten)]
    pub stage: CareStage,
    pub doctor: String,
    #[serde(default)]
    pub doctor_id: Option<String>,

    #[serde(default)]
    pub bed: Option<String>,
    #[serde(default)]
    pub bed_status: Option<BedStatus>,
    #[serde(default)]
    pub admission_date: Option<NaiveDate>,
    #[serde(default)]
    pub dx: Option<String>,

    #[serde(default)]
    pub triage: Option<Triage>,
    #[serde(default)]
    pub complaint: Option<String>,
    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub critical_alert: Option<String>,

    #[serde(flatten)]
    pub timeline: Timeline,
    #[serde(default)]
    pub tasks: Vec<Task>,
    pub last_action: String,
    pub last_action_timestamp: DateTime<Utc>,
}

impl Patient {
    pub fn encounter_type(&self) -> EncounterType {
        self.stage.encounter_type()
    }

    pub fn status(&self) -> &'static str {
        self.stage.status_label()
    }

    /// Stored age, or age derived from date of birth.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        self.age.or_else(|| {
            let dob = self.dob?;
            let mut years = today.year() - dob.year();
            if (today.month(), today.day()) < (dob.month(), dob.day()) {
                years -= 1;
            }
            u32::try_from(years).ok()
        })
    }

    /// Minutes since the patient entered their current state.
    pub fn wait_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_action_timestamp).num_minutes().max(0)
    }

    /// Whether this record currently occupies `bed`.
    pub fn holds_bed(&self, bed: &str) -> bool {
        self.encounter_type() == EncounterType::Inpatient && self.bed.as_deref() == Some(bed)
    }

    pub(crate) fn touch(&mut self, action: impl Into<String>, at: DateTime<Utc>) {
        self.last_action = action.into();
        self.last_action_timestamp = at;
    }
}
