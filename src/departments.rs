//! Pharmacy, laboratory, theatre and stock desks.
//!
//! Each record references a patient by MRN and carries its own status enum.
//! None of these operations touch the patient's encounter status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::config::Config;
use crate::db::{
    patch, to_record, Document, DocumentStore, Filter, Record, LAB_ORDERS, MEDICATIONS, PATIENTS,
    PRESCRIPTIONS, SURGERIES,
};
use crate::error::{Result, TrackerError};
use crate::models::{
    Actor, InventoryItem, LabOrder, LabStatus, Prescription, PrescriptionStatus, StatusFlow,
    Surgery, SurgeryStatus, SurgicalChecklist,
};

const CASE_PREFIX: &str = "CASE";

#[derive(Debug, Clone, Validate)]
pub struct NewLabOrder {
    #[validate(length(min = 1, message = "patient MRN is required"))]
    pub mrn: String,
    #[validate(length(min = 1, message = "test type is required"))]
    pub test_type: String,
    pub doctor_id: String,
    pub is_critical: bool,
}

#[derive(Debug, Clone, Validate)]
pub struct NewSurgery {
    #[validate(length(min = 1, message = "patient MRN is required"))]
    pub mrn: String,
    #[validate(length(min = 1, message = "procedure is required"))]
    pub procedure: String,
    #[validate(length(min = 1, message = "surgeon is required"))]
    pub surgeon: String,
    pub anesthetist: String,
    #[validate(length(min = 1, message = "operating room is required"))]
    pub operating_room: String,
    pub scheduled_for: DateTime<Utc>,
    pub checklist: SurgicalChecklist,
}

#[derive(Debug, Clone, Validate)]
pub struct NewInventoryItem {
    #[validate(length(min = 1, message = "item name is required"))]
    pub name: String,
    pub form: String,
    pub location: String,
    pub stock: u32,
    /// Configured default par when unset.
    pub par: Option<u32>,
}

/// Records whose store id lives outside the document body.
trait Stored: DeserializeOwned {
    fn set_id(&mut self, id: String);
}

macro_rules! stored {
    ($($ty:ty),+) => {
        $(impl Stored for $ty {
            fn set_id(&mut self, id: String) {
                self.id = id;
            }
        })+
    };
}

stored!(Prescription, LabOrder, Surgery, InventoryItem);

fn decode<T: Stored>(doc: &Document) -> Result<T> {
    let mut value: T = doc.decode()?;
    value.set_id(doc.id.clone());
    Ok(value)
}

pub struct DepartmentDesk {
    store: Arc<dyn DocumentStore>,
    config: Arc<Config>,
}

impl DepartmentDesk {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    async fn load<T: Stored>(&self, collection: &str, id: &str) -> Result<T> {
        match self.store.get(collection, id).await? {
            Some(doc) => decode(&doc),
            None => Err(TrackerError::not_found(format!("{collection} record {id}"))),
        }
    }

    async fn load_all<T: Stored>(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> Result<Vec<T>> {
        self.store
            .list(collection, filter)
            .await?
            .iter()
            .map(decode)
            .collect()
    }

    /// Store id of the patient holding `mrn`.
    async fn patient_id(&self, mrn: &str) -> Result<String> {
        self.store
            .list(PATIENTS, Some(Filter::eq("mrn", mrn)))
            .await?
            .into_iter()
            .next()
            .map(|doc| doc.id)
            .ok_or_else(|| TrackerError::not_found(format!("patient with MRN {mrn}")))
    }

    // ===== Pharmacy =====

    #[instrument(skip(self))]
    pub async fn prescribe(
        &self,
        mrn: &str,
        medication_id: &str,
        doctor_id: &str,
        quantity: u32,
    ) -> Result<Prescription> {
        if quantity == 0 {
            return Err(TrackerError::validation("quantity must be at least 1"));
        }
        let patient_id = self.patient_id(mrn).await?;
        let medication: InventoryItem = self.load(MEDICATIONS, medication_id).await?;

        let mut prescription = Prescription {
            id: String::new(),
            patient_id,
            mrn: mrn.to_string(),
            medication_id: medication.id,
            doctor_id: doctor_id.to_string(),
            quantity,
            status: PrescriptionStatus::Pending,
            prescribed_at: Utc::now(),
            dispensed_at: None,
            dispensed_by: None,
        };
        prescription.id = self
            .store
            .create(PRESCRIPTIONS, to_record(&prescription)?)
            .await?;

        info!("Prescribed {} x {} for {}", quantity, medication.name, mrn);
        Ok(prescription)
    }

    /// Hands out a pending prescription and draws its quantity from stock.
    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn dispense(&self, id: &str, actor: &Actor) -> Result<Prescription> {
        let mut prescription: Prescription = self.load(PRESCRIPTIONS, id).await?;
        if !prescription.status.can_move_to(PrescriptionStatus::Dispensed) {
            warn!("Prescription {} already {}", id, prescription.status);
            return Err(TrackerError::transition(
                prescription.status,
                PrescriptionStatus::Dispensed,
            ));
        }

        let mut medication: InventoryItem =
            self.load(MEDICATIONS, &prescription.medication_id).await?;
        let on_hand = medication.stock;
        medication.stock = medication
            .stock
            .checked_sub(prescription.quantity)
            .ok_or_else(|| {
                TrackerError::validation(format!(
                    "insufficient stock of {}: {} on hand, {} prescribed",
                    medication.name, medication.stock, prescription.quantity
                ))
            })?;
        self.store
            .update(MEDICATIONS, &medication.id, patch(&medication, &["stock"])?)
            .await?;

        prescription.status = PrescriptionStatus::Dispensed;
        prescription.dispensed_at = Some(Utc::now());
        prescription.dispensed_by = Some(actor.name.clone());
        let marked = self
            .store
            .update(
                PRESCRIPTIONS,
                id,
                patch(&prescription, &["status", "dispensedAt", "dispensedBy"])?,
            )
            .await;
        if let Err(err) = marked {
            // Stock goes back so a retried dispense draws it once.
            warn!("Prescription {} not marked dispensed, restoring {} stock", id, medication.name);
            let mut restore = Record::new();
            restore.insert("stock".into(), Value::from(on_hand));
            self.store.update(MEDICATIONS, &medication.id, restore).await?;
            return Err(err.into());
        }

        if medication.below_par() {
            warn!("{} below par: {} of {}", medication.name, medication.stock, medication.par);
        }
        info!("Dispensed prescription {} for {}", id, prescription.mrn);
        Ok(prescription)
    }

    pub async fn prescriptions(&self) -> Result<Vec<Prescription>> {
        self.load_all(PRESCRIPTIONS, None).await
    }

    pub async fn prescriptions_for(&self, mrn: &str) -> Result<Vec<Prescription>> {
        self.load_all(PRESCRIPTIONS, Some(Filter::eq("mrn", mrn))).await
    }

    // ===== Laboratory & Radiology =====

    #[instrument(skip(self, order), fields(mrn = %order.mrn))]
    pub async fn order_lab(&self, order: NewLabOrder) -> Result<LabOrder> {
        order.validate()?;
        let patient_id = self.patient_id(&order.mrn).await?;

        let mut lab = LabOrder {
            id: String::new(),
            patient_id,
            mrn: order.mrn,
            test_type: order.test_type,
            doctor_id: order.doctor_id,
            order_date: Utc::now(),
            completion_date: None,
            is_critical: order.is_critical,
            status: LabStatus::Ordered,
        };
        lab.id = self.store.create(LAB_ORDERS, to_record(&lab)?).await?;

        info!("Ordered {} for {}", lab.test_type, lab.mrn);
        Ok(lab)
    }

    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn advance_lab(&self, id: &str, target: &str, actor: &Actor) -> Result<LabOrder> {
        let mut lab: LabOrder = self.load(LAB_ORDERS, id).await?;
        let next = target
            .parse::<LabStatus>()
            .map_err(|_| TrackerError::transition(lab.status, target))?;
        if !lab.status.can_move_to(next) {
            warn!("Rejected lab transition {} -> {} on {}", lab.status, next, id);
            return Err(TrackerError::transition(lab.status, next));
        }

        lab.status = next;
        if next == LabStatus::Completed {
            lab.completion_date = Some(Utc::now());
        }
        self.store
            .update(LAB_ORDERS, id, patch(&lab, &["status", "completionDate"])?)
            .await?;

        info!("Lab order {} for {} now {}", id, lab.mrn, lab.status);
        Ok(lab)
    }

    pub async fn lab_orders(&self) -> Result<Vec<LabOrder>> {
        self.load_all(LAB_ORDERS, None).await
    }

    pub async fn lab_orders_for(&self, mrn: &str) -> Result<Vec<LabOrder>> {
        self.load_all(LAB_ORDERS, Some(Filter::eq("mrn", mrn))).await
    }

    // ===== Theatre =====

    #[instrument(skip(self, surgery), fields(mrn = %surgery.mrn))]
    pub async fn schedule_surgery(&self, surgery: NewSurgery) -> Result<Surgery> {
        surgery.validate()?;
        let patient_id = self.patient_id(&surgery.mrn).await?;
        let case_id = self.allocate_case_id().await?;

        let mut case = Surgery {
            id: String::new(),
            case_id,
            patient_id,
            mrn: surgery.mrn,
            procedure: surgery.procedure,
            surgeon: surgery.surgeon,
            anesthetist: surgery.anesthetist,
            operating_room: surgery.operating_room,
            scheduled_for: surgery.scheduled_for,
            status: SurgeryStatus::Scheduled,
            checklist: surgery.checklist,
        };
        case.id = self.store.create(SURGERIES, to_record(&case)?).await?;

        info!("Scheduled {} ({}) in {}", case.case_id, case.procedure, case.operating_room);
        Ok(case)
    }

    async fn allocate_case_id(&self) -> Result<String> {
        let taken: Vec<String> = self
            .store
            .list(SURGERIES, None)
            .await?
            .iter()
            .filter_map(|doc| doc.data.get("caseId").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        let attempts = self.config.mrn.max_attempts.max(1);
        let mut rng = rand::thread_rng();
        (0..attempts)
            .map(|_| format!("{CASE_PREFIX}-{:04}", rng.gen_range(0..10_000u32)))
            .find(|candidate| !taken.contains(candidate))
            .ok_or(TrackerError::MrnExhausted {
                prefix: CASE_PREFIX.to_string(),
                attempts,
            })
    }

    /// Moves a case along the theatre board. Starting requires signed consent.
    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn advance_surgery(&self, id: &str, target: &str, actor: &Actor) -> Result<Surgery> {
        let mut case: Surgery = self.load(SURGERIES, id).await?;
        let next = target
            .parse::<SurgeryStatus>()
            .map_err(|_| TrackerError::transition(case.status, target))?;
        if !case.status.can_move_to(next) {
            warn!("Rejected surgery transition {} -> {} on {}", case.status, next, case.case_id);
            return Err(TrackerError::transition(case.status, next));
        }
        if next == SurgeryStatus::InProgress && !case.checklist.consent {
            return Err(TrackerError::validation(format!(
                "{} cannot start without signed consent",
                case.case_id
            )));
        }

        case.status = next;
        self.store
            .update(SURGERIES, id, patch(&case, &["status"])?)
            .await?;

        info!("Case {} now {}", case.case_id, case.status);
        Ok(case)
    }

    #[instrument(skip(self, checklist))]
    pub async fn update_checklist(
        &self,
        id: &str,
        checklist: SurgicalChecklist,
    ) -> Result<Surgery> {
        let mut case: Surgery = self.load(SURGERIES, id).await?;
        case.checklist = checklist;
        self.store
            .update(SURGERIES, id, patch(&case, &["checklist"])?)
            .await?;
        info!("Checklist updated for {}", case.case_id);
        Ok(case)
    }

    pub async fn surgeries(&self) -> Result<Vec<Surgery>> {
        self.load_all(SURGERIES, None).await
    }

    // ===== Inventory =====

    #[instrument(skip(self, item), fields(name = %item.name))]
    pub async fn add_inventory_item(&self, item: NewInventoryItem) -> Result<InventoryItem> {
        item.validate()?;
        let mut stocked = InventoryItem {
            id: String::new(),
            name: item.name.trim().to_string(),
            form: item.form,
            location: item.location,
            stock: item.stock,
            par: item.par.unwrap_or(self.config.operations.default_par),
        };
        stocked.id = self.store.create(MEDICATIONS, to_record(&stocked)?).await?;
        info!("Stocked {} ({} on hand, par {})", stocked.name, stocked.stock, stocked.par);
        Ok(stocked)
    }

    #[instrument(skip(self))]
    pub async fn restock(&self, id: &str, quantity: u32) -> Result<InventoryItem> {
        if quantity == 0 {
            return Err(TrackerError::validation("restock quantity must be at least 1"));
        }
        let mut item: InventoryItem = self.load(MEDICATIONS, id).await?;
        item.stock = item.stock.saturating_add(quantity);

        let mut partial = Record::new();
        partial.insert("stock".into(), Value::from(item.stock));
        self.store.update(MEDICATIONS, id, partial).await?;

        info!("Restocked {} to {}", item.name, item.stock);
        Ok(item)
    }

    pub async fn inventory(&self) -> Result<Vec<InventoryItem>> {
        self.load_all(MEDICATIONS, None).await
    }
}
