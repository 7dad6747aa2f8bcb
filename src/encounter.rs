//! Encounter tracker: registration, status transitions, department moves,
//! bed lifecycle, vitals capture and nursing tasks.
//!
//! Every mutation is one read of the patient document followed by one partial
//! update. `status`, `timeline`, `lastAction` and `lastActionTimestamp` always
//! travel in the same update.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::config::Config;
use crate::core::mrn::MrnGenerator;
use crate::core::vitals::analyze_vitals;
use crate::db::{patch, to_record, Document, DocumentStore, Filter, Record, PATIENTS, VITALS};
use crate::error::{Result, TrackerError};
use crate::models::stage::DISCHARGED;
use crate::models::{
    Actor, BedStatus, CareStage, EmergencyStatus, EncounterType, InpatientStatus, Patient, Task,
    Timeline, Triage, VitalSigns, VitalsReading,
};

/// Step opened by registration.
pub const REGISTERED: &str = "Registered";
/// Step opened by inpatient admission.
pub const ADMITTED: &str = "Admitted";

const TRANSITION_FIELDS: &[&str] = &[
    "encounterType",
    "status",
    "timeline",
    "currentStepIndex",
    "lastAction",
    "lastActionTimestamp",
];

/// Registration form.
#[derive(Debug, Clone, Default, Validate)]
pub struct NewPatient {
    #[validate(length(min = 1, message = "patient name is required"))]
    pub name: String,
    pub dob: Option<NaiveDate>,
    pub sex: Option<String>,
    pub age: Option<u32>,
    pub blood_type: Option<String>,
    pub photo: Option<String>,
    pub phone: Option<String>,
    pub national_id: Option<String>,
    /// OPD when unset.
    pub encounter_type: Option<EncounterType>,
    pub doctor: Option<String>,
    pub doctor_id: Option<String>,
    /// ESI level, required for Emergency.
    #[validate(range(min = 1, max = 5, message = "triage must be an ESI level from 1 to 5"))]
    pub triage: Option<u8>,
    pub complaint: Option<String>,
}

impl NewPatient {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Status of `bed` derived from the patient records that reference it.
pub fn bed_status_of(patients: &[Patient], bed: &str) -> BedStatus {
    if patients.iter().any(|p| p.holds_bed(bed)) {
        return BedStatus::Occupied;
    }
    let marked = |status| {
        patients
            .iter()
            .any(|p| p.bed.as_deref() == Some(bed) && p.bed_status == Some(status))
    };
    if marked(BedStatus::Blocked) {
        BedStatus::Blocked
    } else if marked(BedStatus::Dirty) {
        BedStatus::Dirty
    } else {
        BedStatus::Clean
    }
}

fn non_blank(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::validation(format!("{what} is required")));
    }
    Ok(trimmed.to_string())
}

pub struct EncounterTracker {
    store: Arc<dyn DocumentStore>,
    config: Arc<Config>,
    mrn: MrnGenerator,
}

impl EncounterTracker {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<Config>) -> Self {
        let mrn = MrnGenerator::new(&config.mrn);
        Self { store, config, mrn }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ===== Lookups =====

    fn decode(doc: &Document) -> Result<Patient> {
        let mut patient: Patient = doc.decode()?;
        patient.id = doc.id.clone();
        Ok(patient)
    }

    pub async fn patients(&self) -> Result<Vec<Patient>> {
        self.store
            .list(PATIENTS, None)
            .await?
            .iter()
            .map(Self::decode)
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn find(&self, mrn: &str) -> Result<Patient> {
        let docs = self
            .store
            .list(PATIENTS, Some(Filter::eq("mrn", mrn)))
            .await?;
        match docs.first() {
            Some(doc) => Self::decode(doc),
            None => Err(TrackerError::not_found(format!("patient with MRN {mrn}"))),
        }
    }

    /// Live patient list, optionally restricted to one department.
    pub async fn watch(
        &self,
        encounter: Option<EncounterType>,
    ) -> Result<BoxStream<'static, Result<Vec<Patient>>>> {
        let filter = encounter.map(|e| Filter::eq("encounterType", e.as_str()));
        let feed = self.store.subscribe(PATIENTS, filter).await?;
        Ok(feed
            .map(|docs| docs.iter().map(Self::decode).collect::<Result<Vec<_>>>())
            .boxed())
    }

    async fn save(&self, patient: &Patient, fields: &[&str]) -> Result<()> {
        let partial = patch(patient, fields)?;
        self.store.update(PATIENTS, &patient.id, partial).await?;
        Ok(())
    }

    async fn taken_mrns(&self) -> Result<HashSet<String>> {
        Ok(self
            .store
            .list(PATIENTS, None)
            .await?
            .iter()
            .filter_map(|doc| doc.data.get("mrn").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    // ===== Registration =====

    #[instrument(skip(self, details, actor), fields(by = %actor.name))]
    pub async fn register(&self, details: NewPatient, actor: &Actor) -> Result<Patient> {
        let details = NewPatient {
            name: details.name.trim().to_string(),
            ..details
        };
        details.validate()?;

        let encounter = details.encounter_type.unwrap_or(EncounterType::Opd);
        if !matches!(encounter, EncounterType::Opd | EncounterType::Emergency) {
            return Err(TrackerError::validation(format!(
                "patients are registered into OPD or Emergency, not {encounter}"
            )));
        }
        let triage = details.triage.and_then(Triage::new);
        match (encounter, triage) {
            (EncounterType::Emergency, None) => {
                return Err(TrackerError::validation(
                    "emergency registrations need a triage level",
                ))
            }
            (EncounterType::Opd, Some(_)) => {
                return Err(TrackerError::validation(
                    "triage applies to emergency registrations only",
                ))
            }
            _ => {}
        }

        let now = Utc::now();
        let taken = self.taken_mrns().await?;
        let mrn = {
            let mut rng = rand::thread_rng();
            self.mrn
                .allocate(encounter, now.year(), &mut rng, |m| taken.contains(m))
        }
        .ok_or_else(|| TrackerError::MrnExhausted {
            prefix: self.mrn.prefix_for(encounter, now.year()),
            attempts: self.mrn.max_attempts(),
        })?;

        let defaults = &self.config.defaults;
        let mut patient = Patient {
            id: String::new(),
            photo: details
                .photo
                .unwrap_or_else(|| format!("{}/{}/100/100", defaults.photo_base, mrn)),
            mrn,
            name: details.name,
            dob: details.dob,
            sex: details.sex,
            age: details.age,
            blood_type: details
                .blood_type
                .unwrap_or_else(|| defaults.blood_type.clone()),
            phone: details.phone,
            national_id: details.national_id,
            stage: CareStage::initial(encounter),
            doctor: details.doctor.unwrap_or_else(|| defaults.doctor.clone()),
            doctor_id: details.doctor_id,
            bed: None,
            bed_status: None,
            admission_date: None,
            dx: None,
            triage,
            complaint: details.complaint,
            location: None,
            critical_alert: None,
            timeline: Timeline::seeded(REGISTERED, actor.name.as_str(), now),
            tasks: Vec::new(),
            last_action: REGISTERED.to_string(),
            last_action_timestamp: now,
        };

        patient.id = self.store.create(PATIENTS, to_record(&patient)?).await?;
        info!("Patient registered: {} into {}", patient.mrn, encounter);
        Ok(patient)
    }

    // ===== Status transitions =====

    /// Moves the patient within their department's vocabulary.
    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn advance(&self, mrn: &str, target: &str, actor: &Actor) -> Result<Patient> {
        let mut patient = self.find(mrn).await?;
        let target = CareStage::parse_in(patient.encounter_type(), target).map_err(|_| {
            warn!("{} is not a {} status", target, patient.encounter_type());
            TrackerError::transition(patient.stage, target)
        })?;

        Self::apply_transition(&mut patient, target, actor, Utc::now(), None)?;
        self.save(&patient, TRANSITION_FIELDS).await?;

        info!("Patient {} advanced to {}", patient.mrn, patient.stage);
        Ok(patient)
    }

    fn apply_transition(
        patient: &mut Patient,
        target: CareStage,
        actor: &Actor,
        at: DateTime<Utc>,
        details: Option<String>,
    ) -> Result<()> {
        if !patient.stage.can_advance_to(&target) {
            warn!("Rejected transition {} -> {} for {}", patient.stage, target, patient.mrn);
            return Err(TrackerError::transition(patient.stage, target));
        }
        let step = target.status_label();
        patient.timeline.advance_to(step, &actor.name, at, details);
        patient.stage = target;
        patient.touch(step, at);
        Ok(())
    }

    // ===== Department moves =====

    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn admit(&self, mrn: &str, bed: &str, actor: &Actor) -> Result<Patient> {
        let bed = non_blank(bed, "bed assignment")?;
        let mut patient = self.find(mrn).await?;

        if matches!(
            patient.stage,
            CareStage::Inpatient(_) | CareStage::Discharged
        ) {
            return Err(TrackerError::transition(patient.stage, EncounterType::Inpatient));
        }

        let ward = self
            .config
            .ward_for_bed(&bed)
            .ok_or_else(|| TrackerError::not_found(format!("ward for bed {bed}")))?
            .name
            .clone();

        match bed_status_of(&self.patients().await?, &bed) {
            BedStatus::Clean => {}
            BedStatus::Occupied => {
                return Err(TrackerError::validation(format!("bed {bed} is occupied")))
            }
            BedStatus::Dirty => {
                return Err(TrackerError::validation(format!(
                    "bed {bed} must be cleaned before reuse"
                )))
            }
            BedStatus::Blocked => {
                return Err(TrackerError::validation(format!("bed {bed} is blocked")))
            }
        }

        let now = Utc::now();
        patient
            .timeline
            .advance_to(ADMITTED, &actor.name, now, Some(format!("{ward}, bed {bed}")));
        patient.stage = CareStage::Inpatient(InpatientStatus::Stable);
        patient.bed = Some(bed);
        patient.bed_status = Some(BedStatus::Occupied);
        patient.admission_date = Some(now.date_naive());
        if patient.dx.is_none() {
            patient.dx = Some(self.config.defaults.dx.clone());
        }
        patient.location = None;
        if patient.tasks.is_empty() {
            patient.tasks = self
                .config
                .nursing
                .default_tasks
                .iter()
                .map(Task::new)
                .collect();
        }
        patient.touch(ADMITTED, now);

        let mut fields = TRANSITION_FIELDS.to_vec();
        fields.extend([
            "bed",
            "bedStatus",
            "admissionDate",
            "dx",
            "location",
            "tasks",
        ]);
        self.save(&patient, &fields).await?;

        info!(
            "Patient {} admitted to {} bed {}",
            patient.mrn,
            ward,
            patient.bed.as_deref().unwrap_or_default()
        );
        Ok(patient)
    }

    /// Terminal move out of any department. A held bed is left dirty.
    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn discharge(&self, mrn: &str, actor: &Actor) -> Result<Patient> {
        let mut patient = self.find(mrn).await?;
        if patient.stage.is_discharged() {
            debug!("Patient {} already discharged", patient.mrn);
            return Ok(patient);
        }

        let now = Utc::now();
        if patient.bed.is_some() && patient.bed_status == Some(BedStatus::Occupied) {
            patient.bed_status = Some(BedStatus::Dirty);
        }
        patient.timeline.close(DISCHARGED, &actor.name, now);
        patient.stage = CareStage::Discharged;
        patient.touch(DISCHARGED, now);

        let mut fields = TRANSITION_FIELDS.to_vec();
        fields.push("bedStatus");
        self.save(&patient, &fields).await?;

        match patient.bed.as_deref() {
            Some(bed) => info!("Patient {} discharged, bed {} marked dirty", patient.mrn, bed),
            None => info!("Patient {} discharged", patient.mrn),
        }
        Ok(patient)
    }

    // ===== Emergency =====

    /// Puts an emergency patient into a treatment bay. Moving bays while in
    /// treatment only updates the location.
    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn assign_bay(&self, mrn: &str, location: &str, actor: &Actor) -> Result<Patient> {
        let location = non_blank(location, "treatment location")?;
        let mut patient = self.find(mrn).await?;
        let treatment = CareStage::Emergency(EmergencyStatus::Treatment);

        let mut fields = vec!["location"];
        if patient.stage != treatment {
            if patient.encounter_type() != EncounterType::Emergency {
                return Err(TrackerError::transition(patient.stage, treatment));
            }
            Self::apply_transition(
                &mut patient,
                treatment,
                actor,
                Utc::now(),
                Some(location.clone()),
            )?;
            fields.extend_from_slice(TRANSITION_FIELDS);
        }
        patient.location = Some(location);
        self.save(&patient, &fields).await?;

        info!(
            "Patient {} placed in {}",
            patient.mrn,
            patient.location.as_deref().unwrap_or_default()
        );
        Ok(patient)
    }

    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn set_triage(&self, mrn: &str, level: u8, actor: &Actor) -> Result<Patient> {
        let triage = Triage::new(level).ok_or_else(|| {
            TrackerError::validation(format!("triage level {level} is not an ESI level"))
        })?;
        let mut patient = self.find(mrn).await?;
        if patient.encounter_type() != EncounterType::Emergency {
            return Err(TrackerError::validation(format!(
                "triage applies to emergency patients, {} is {}",
                patient.mrn,
                patient.encounter_type()
            )));
        }
        patient.triage = Some(triage);
        self.save(&patient, &["triage"]).await?;

        info!("Patient {} re-triaged to {}", patient.mrn, triage.label());
        Ok(patient)
    }

    // ===== Beds =====

    pub async fn bed_status(&self, bed: &str) -> Result<BedStatus> {
        Ok(bed_status_of(&self.patients().await?, bed))
    }

    /// Closes the cleaning loop for `bed`: every record holding it dirty becomes clean.
    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn mark_bed_clean(&self, bed: &str, actor: &Actor) -> Result<usize> {
        let dirty: Vec<Patient> = self
            .patients()
            .await?
            .into_iter()
            .filter(|p| p.bed.as_deref() == Some(bed) && p.bed_status == Some(BedStatus::Dirty))
            .collect();
        if dirty.is_empty() {
            return Err(TrackerError::not_found(format!("dirty bed {bed}")));
        }

        for patient in &dirty {
            let mut partial = Record::new();
            partial.insert("bedStatus".into(), serde_json::to_value(BedStatus::Clean)?);
            self.store.update(PATIENTS, &patient.id, partial).await?;
        }

        info!("Bed {} cleaned", bed);
        Ok(dirty.len())
    }

    // ===== Vital Signs =====

    /// Stores each reading as its own record. Status is left untouched.
    #[instrument(skip(self, readings, actor), fields(by = %actor.name))]
    pub async fn record_vitals(
        &self,
        mrn: &str,
        readings: Vec<VitalsReading>,
        actor: &Actor,
    ) -> Result<()> {
        if readings.is_empty() {
            return Err(TrackerError::validation("at least one vitals reading is required"));
        }
        if readings.iter().any(VitalsReading::is_empty) {
            return Err(TrackerError::validation("a vitals reading carries no measurements"));
        }
        let patient = self.find(mrn).await?;

        for reading in readings {
            let vitals = VitalSigns {
                id: String::new(),
                patient_id: patient.id.clone(),
                mrn: patient.mrn.clone(),
                timestamp: reading.taken_at.unwrap_or_else(Utc::now),
                blood_pressure_systolic: reading.blood_pressure_systolic,
                blood_pressure_diastolic: reading.blood_pressure_diastolic,
                heart_rate: reading.heart_rate,
                oxygen_saturation: reading.oxygen_saturation,
                temperature_celsius: reading.temperature_celsius,
                respiratory_rate: reading.respiratory_rate,
                recorded_by: actor.name.clone(),
            };
            let id = self.store.create(VITALS, to_record(&vitals)?).await?;
            debug!("Vitals {} recorded for {}", id, patient.mrn);
        }

        info!("Vitals recorded for {}", patient.mrn);
        Ok(())
    }

    pub async fn latest_vitals(&self, mrn: &str) -> Result<Option<VitalSigns>> {
        let docs = self.store.list(VITALS, Some(Filter::eq("mrn", mrn))).await?;
        let mut latest: Option<VitalSigns> = None;
        for doc in &docs {
            let mut vitals: VitalSigns = doc.decode()?;
            vitals.id = doc.id.clone();
            if latest.as_ref().map_or(true, |l| vitals.timestamp >= l.timestamp) {
                latest = Some(vitals);
            }
        }
        Ok(latest)
    }

    /// Threshold alerts over the most recent vitals, empty when none recorded.
    pub async fn vitals_alerts(&self, mrn: &str) -> Result<Vec<String>> {
        Ok(self
            .latest_vitals(mrn)
            .await?
            .map(|v| analyze_vitals(&v))
            .unwrap_or_default())
    }

    // ===== Nursing tasks =====

    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn add_task(&self, mrn: &str, description: &str, actor: &Actor) -> Result<Patient> {
        let description = non_blank(description, "task description")?;
        let mut patient = self.find(mrn).await?;
        patient.tasks.push(Task::new(description));
        self.save(&patient, &["tasks"]).await?;
        debug!("Task added for {}", patient.mrn);
        Ok(patient)
    }

    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn toggle_task(&self, mrn: &str, index: usize, actor: &Actor) -> Result<Patient> {
        let mut patient = self.find(mrn).await?;
        let task = patient
            .tasks
            .get_mut(index)
            .ok_or_else(|| TrackerError::not_found(format!("task {index} for {mrn}")))?;
        task.completed = !task.completed;
        self.save(&patient, &["tasks"]).await?;
        debug!("Task {} toggled for {}", index, patient.mrn);
        Ok(patient)
    }

    // ===== Care team =====

    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn assign_doctor(
        &self,
        mrn: &str,
        doctor_id: Option<String>,
        doctor: &str,
        actor: &Actor,
    ) -> Result<Patient> {
        let doctor = non_blank(doctor, "doctor name")?;
        let mut patient = self.find(mrn).await?;
        patient.doctor = doctor;
        patient.doctor_id = doctor_id;
        self.save(&patient, &["doctor", "doctorId"]).await?;
        info!("Patient {} assigned to {}", patient.mrn, patient.doctor);
        Ok(patient)
    }

    /// Sets or clears (with `None` or a blank string) the critical alert banner.
    #[instrument(skip(self, actor), fields(by = %actor.name))]
    pub async fn set_critical_alert(
        &self,
        mrn: &str,
        alert: Option<&str>,
        actor: &Actor,
    ) -> Result<Patient> {
        let mut patient = self.find(mrn).await?;
        patient.critical_alert = alert
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        self.save(&patient, &["criticalAlert"]).await?;
        match &patient.critical_alert {
            Some(alert) => warn!("Critical alert on {}: {}", patient.mrn, alert),
            None => info!("Critical alert cleared on {}", patient.mrn),
        }
        Ok(patient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockDocumentStore, StoreError};
    use crate::models::OpdStatus;

    fn actor() -> Actor {
        Actor::with_role("Fatuma", "Reception")
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_persistence_without_retry() {
        let mut store = MockDocumentStore::new();
        store.expect_list().times(1).returning(|_, _| Ok(vec![]));
        store
            .expect_create()
            .times(1)
            .returning(|_, _| Err(StoreError::Unavailable("connection reset".into())));

        let tracker = EncounterTracker::new(Arc::new(store), Arc::new(Config::default()));
        let err = tracker
            .register(NewPatient::named("A. Hassan"), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Persistence(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn rejected_transition_never_writes() {
        let mut store = MockDocumentStore::new();
        let patient = Patient {
            id: "doc-1".into(),
            mrn: "TZ-2025-1102".into(),
            name: "John Williams".into(),
            dob: None,
            sex: None,
            age: Some(42),
            blood_type: "A-".into(),
            photo: "p".into(),
            phone: None,
            national_id: None,
            stage: CareStage::Opd(OpdStatus::Queue),
            doctor: "Dr. Evelyn".into(),
            doctor_id: None,
            bed: None,
            bed_status: None,
            admission_date: None,
            dx: None,
            triage: None,
            complaint: None,
            location: None,
            critical_alert: None,
            timeline: Timeline::seeded(REGISTERED, "Fatuma", Utc::now()),
            tasks: vec![],
            last_action: REGISTERED.into(),
            last_action_timestamp: Utc::now(),
        };
        let doc = Document {
            id: patient.id.clone(),
            data: to_record(&patient).unwrap(),
        };
        store
            .expect_list()
            .returning(move |_, _| Ok(vec![doc.clone()]));
        store.expect_update().never();

        let tracker = EncounterTracker::new(Arc::new(store), Arc::new(Config::default()));
        let err = tracker
            .advance("TZ-2025-1102", "Done", &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { .. }));
    }

    #[test]
    fn bed_status_prefers_occupancy_over_stale_marks() {
        let mut holder: Patient = serde_json::from_value(serde_json::json!({
            "mrn": "TZ-2025-0001",
            "name": "Holder",
            "bloodType": "O+",
            "photo": "p",
            "encounterType": "Inpatient",
            "status": "Stable",
            "doctor": "Dr. Juma",
            "bed": "ICU-02B",
            "bedStatus": "Occupied",
            "lastAction": "Admitted",
            "lastActionTimestamp": "2025-06-15T09:00:00Z"
        }))
        .unwrap();
        let mut previous = holder.clone();
        previous.stage = CareStage::Discharged;
        previous.bed_status = Some(BedStatus::Dirty);

        assert_eq!(
            bed_status_of(&[previous.clone(), holder.clone()], "ICU-02B"),
            BedStatus::Occupied
        );
        holder.stage = CareStage::Discharged;
        holder.bed_status = Some(BedStatus::Clean);
        assert_eq!(bed_status_of(&[previous, holder], "ICU-02B"), BedStatus::Dirty);
        assert_eq!(bed_status_of(&[], "ICU-02B"), BedStatus::Clean);
    }
}
