//! Peripheral records: each is an enum status plus a reference to a patient.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::StatusFlow;

labelled_enum! {
    pub enum PrescriptionStatus {
        Pending => "Pending",
        Dispensed => "Dispensed",
    }
}

labelled_enum! {
    pub enum LabStatus {
        Ordered => "Ordered",
        Collected => "Collected",
        Received => "Received",
        Processing => "Processing",
        PendingResults => "Pending Results",
        Completed => "Completed",
    }
}

labelled_enum! {
    pub enum SurgeryStatus {
        Scheduled => "Scheduled",
        PreOp => "Pre-Op",
        InProgress => "In Progress",
        PostOp => "Post-Op",
        Cancelled => "Cancelled",
    }
}

impl StatusFlow for PrescriptionStatus {
    fn allowed_next(self) -> &'static [Self] {
        match self {
            PrescriptionStatus::Pending => &[PrescriptionStatus::Dispensed],
            PrescriptionStatus::Dispensed => &[],
        }
    }
}

impl StatusFlow for LabStatus {
    fn allowed_next(self) -> &'static [Self] {
        use LabStatus::*;
        match self {
            Ordered => &[Collected],
            Collected => &[Received],
            Received => &[Processing],
            Processing => &[PendingResults, Completed],
            PendingResults => &[Completed],
            Completed => &[],
        }
    }
}

impl StatusFlow for SurgeryStatus {
    fn allowed_next(self) -> &'static [Self] {
        use SurgeryStatus::*;
        match self {
            Scheduled => &[PreOp, Cancelled],
            PreOp => &[InProgress, Cancelled],
            InProgress => &[PostOp],
            PostOp | Cancelled => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    #[serde(skip)]
    pub id: String,
    pub patient_id: String,
    pub mrn: String,
    pub medication_id: String,
    pub doctor_id: String,
    pub quantity: u32,
    pub status: PrescriptionStatus,
    pub prescribed_at: DateTime<Utc>,
    #[serde(default)]
    pub dispensed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dispensed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabOrder {
    #[serde(skip)]
    pub id: String,
    pub patient_id: String,
    pub mrn: String,
    /// Free text, e.g. "Lab: CBC" or "Rad: Chest X-Ray".
    pub test_type: String,
    pub doctor_id: String,
    pub order_date: DateTime<Utc>,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_critical: bool,
    pub status: LabStatus,
}

impl LabOrder {
    fn has_prefix(&self, prefix: &str) -> bool {
        self.test_type
            .trim_start()
            .get(..prefix.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
    }

    /// Ordered as `Rad: ...`.
    pub fn is_radiology(&self) -> bool {
        self.has_prefix("rad:")
    }

    /// Ordered as `Lab: ...`.
    pub fn is_laboratory(&self) -> bool {
        self.has_prefix("lab:")
    }

    /// Minutes from order to completion.
    pub fn turnaround_minutes(&self) -> Option<i64> {
        self.completion_date
            .map(|done| (done - self.order_date).num_minutes())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurgicalChecklist {
    pub consent: bool,
    pub fasting: bool,
    pub blood: bool,
    pub implant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surgery {
    #[serde(skip)]
    pub id: String,
    pub case_id: String,
    pub patient_id: String,
    pub mrn: String,
    pub procedure: String,
    pub surgeon: String,
    pub anesthetist: String,
    #[serde(rename = "or")]
    pub operating_room: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: SurgeryStatus,
    #[serde(default)]
    pub checklist: SurgicalChecklist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub form: String,
    pub location: String,
    pub stock: u32,
    pub par: u32,
}

impl InventoryItem {
    pub fn below_par(&self) -> bool {
        self.stock < self.par
    }

    /// Stock as a percentage of par, for the stock gauge.
    pub fn stock_percent(&self) -> f64 {
        if self.par == 0 {
            return 100.0;
        }
        f64::from(self.stock) / f64::from(self.par) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(LabStatus::Ordered, LabStatus::Collected, true)]
    #[test_case(LabStatus::Ordered, LabStatus::Completed, false)]
    #[test_case(LabStatus::Processing, LabStatus::Completed, true)]
    #[test_case(LabStatus::Completed, LabStatus::Ordered, false)]
    fn lab_progression(from: LabStatus, to: LabStatus, allowed: bool) {
        assert_eq!(from.can_move_to(to), allowed);
    }

    #[test_case("Lab: Bradykinin", true, false ; "lab test with rad in its name")]
    #[test_case("Rad: Chest X-Ray", false, true ; "radiology")]
    #[test_case("  lab: CBC", true, false ; "lower case with padding")]
    #[test_case("Collaborative review", false, false ; "neither")]
    fn order_kind_follows_the_prefix(test_type: &str, lab: bool, rad: bool) {
        let order = LabOrder {
            id: String::new(),
            patient_id: "p1".into(),
            mrn: "TZ-2025-1101".into(),
            test_type: test_type.into(),
            doctor_id: "d1".into(),
            order_date: Utc::now(),
            completion_date: None,
            is_critical: false,
            status: LabStatus::Ordered,
        };
        assert_eq!(order.is_laboratory(), lab);
        assert_eq!(order.is_radiology(), rad);
    }

    #[test]
    fn cancelled_and_post_op_are_terminal() {
        assert!(SurgeryStatus::Cancelled.is_terminal());
        assert!(SurgeryStatus::PostOp.is_terminal());
        assert!(!SurgeryStatus::InProgress.can_move_to(SurgeryStatus::Cancelled));
    }

    #[test]
    fn surgery_labels_match_the_board() {
        assert_eq!(SurgeryStatus::PreOp.to_string(), "Pre-Op");
        assert_eq!("In Progress".parse::<SurgeryStatus>().unwrap(), SurgeryStatus::InProgress);
        assert!("Done".parse::<SurgeryStatus>().is_err());
    }

    #[test]
    fn par_checks() {
        let item = InventoryItem {
            id: String::new(),
            name: "Artemether 80mg".into(),
            form: "Injection".into(),
            location: "Main Pharmacy".into(),
            stock: 150,
            par: 200,
        };
        assert!(item.below_par());
        assert_eq!(item.stock_percent(), 75.0);
    }
}
