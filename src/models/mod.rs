//! Records stored in the document collections and the vocabularies they use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string enum whose wire spelling is fixed. Generates `ALL`, `as_str`,
/// `Display`, `FromStr` and serde impls that use the label.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err($crate::models::UnknownLabel(other.to_string())),
                }
            }
        }
    };
}

pub mod orders;
pub mod patient;
pub mod stage;
pub mod timeline;

pub use orders::{
    InventoryItem, LabOrder, LabStatus, Prescription, PrescriptionStatus, Surgery, SurgeryStatus,
    SurgicalChecklist,
};
pub use patient::{Patient, Task, Triage};
pub use stage::{
    BedStatus, CareStage, EmergencyStatus, EncounterType, InpatientStatus, OpdStatus, StatusFlow,
};
pub use timeline::{StepStatus, Timeline, TimelineStep};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown label: {0}")]
pub struct UnknownLabel(pub String);

/// Staff member performing an action. Recorded as the `by` of timeline steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub role: Option<String>,
}

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
        }
    }

    pub fn with_role(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Some(role.into()),
        }
    }
}

/// One bedside measurement set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsReading {
    pub blood_pressure_systolic: Option<f32>,
    pub blood_pressure_diastolic: Option<f32>,
    pub heart_rate: Option<f32>,
    pub oxygen_saturation: Option<f32>,
    pub temperature_celsius: Option<f32>,
    pub respiratory_rate: Option<f32>,
    /// Defaults to the time of recording.
    pub taken_at: Option<DateTime<Utc>>,
}

impl VitalsReading {
    pub fn is_empty(&self) -> bool {
        self.blood_pressure_systolic.is_none()
            && self.blood_pressure_diastolic.is_none()
            && self.heart_rate.is_none()
            && self.oxygen_saturation.is_none()
            && self.temperature_celsius.is_none()
            && self.respiratory_rate.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSigns {
    #[serde(skip)]
    pub id: String,
    pub patient_id: String,
    pub mrn: String,
    pub timestamp: DateTime<Utc>,
    pub blood_pressure_systolic: Option<f32>,
    pub blood_pressure_diastolic: Option<f32>,
    pub heart_rate: Option<f32>,
    pub oxygen_saturation: Option<f32>,
    pub temperature_celsius: Option<f32>,
    pub respiratory_rate: Option<f32>,
    pub recorded_by: String,
}
