use std::sync::Arc;

use chrono::{Duration, Utc};
use test_case::test_case;

use wardboard::config::Config;
use wardboard::db::{DocumentStore, MemoryStore};
use wardboard::departments::{NewInventoryItem, NewLabOrder, NewSurgery};
use wardboard::encounter::NewPatient;
use wardboard::models::{
    Actor, CareStage, InventoryItem, LabStatus, OpdStatus, PrescriptionStatus, SurgeryStatus,
    SurgicalChecklist,
};
use wardboard::views;
use wardboard::{DepartmentDesk, EncounterTracker, TrackerError};

struct Hospital {
    tracker: EncounterTracker,
    desk: DepartmentDesk,
}

async fn hospital() -> (Hospital, String) {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let config = Arc::new(Config::default());
    let hospital = Hospital {
        tracker: EncounterTracker::new(store.clone(), config.clone()),
        desk: DepartmentDesk::new(store, config),
    };
    let patient = hospital
        .tracker
        .register(NewPatient::named("A. Hassan"), &Actor::new("Fatuma"))
        .await
        .unwrap();
    (hospital, patient.mrn)
}

fn pharmacist() -> Actor {
    Actor::with_role("Neema", "Pharmacist")
}

async fn stock(desk: &DepartmentDesk, quantity: u32) -> InventoryItem {
    desk.add_inventory_item(NewInventoryItem {
        name: "Amoxicillin 500mg".into(),
        form: "Capsule".into(),
        location: "Main Pharmacy".into(),
        stock: quantity,
        par: Some(50),
    })
    .await
    .unwrap()
}

fn appendectomy(mrn: &str, consent: bool) -> NewSurgery {
    NewSurgery {
        mrn: mrn.into(),
        procedure: "Appendectomy".into(),
        surgeon: "Dr. Mwakyusa".into(),
        anesthetist: "Dr. Kimaro".into(),
        operating_room: "OR 2".into(),
        scheduled_for: Utc::now() + Duration::hours(2),
        checklist: SurgicalChecklist {
            consent,
            ..SurgicalChecklist::default()
        },
    }
}

// ===== Pharmacy =====

#[tokio::test]
async fn dispensing_draws_stock_once() {
    let (hospital, mrn) = hospital().await;
    let item = stock(&hospital.desk, 60).await;

    let rx = hospital
        .desk
        .prescribe(&mrn, &item.id, "doc-1", 21)
        .await
        .unwrap();
    assert_eq!(rx.status, PrescriptionStatus::Pending);
    assert_eq!(views::pharmacy_queue(&hospital.desk.prescriptions().await.unwrap()).len(), 1);

    let dispensed = hospital.desk.dispense(&rx.id, &pharmacist()).await.unwrap();
    assert_eq!(dispensed.status, PrescriptionStatus::Dispensed);
    assert_eq!(dispensed.dispensed_by.as_deref(), Some("Neema"));

    let inventory = hospital.desk.inventory().await.unwrap();
    assert_eq!(inventory[0].stock, 39);
    assert_eq!(views::supplies_below_par(&inventory).len(), 1);
    assert!(views::pharmacy_queue(&hospital.desk.prescriptions().await.unwrap()).is_empty());

    let again = hospital.desk.dispense(&rx.id, &pharmacist()).await.unwrap_err();
    assert!(matches!(again, TrackerError::InvalidTransition { .. }));
    assert_eq!(hospital.desk.inventory().await.unwrap()[0].stock, 39);
}

#[tokio::test]
async fn dispensing_more_than_on_hand_fails() {
    let (hospital, mrn) = hospital().await;
    let item = stock(&hospital.desk, 5).await;
    let rx = hospital.desk.prescribe(&mrn, &item.id, "doc-1", 10).await.unwrap();

    let err = hospital.desk.dispense(&rx.id, &pharmacist()).await.unwrap_err();
    assert!(matches!(err, TrackerError::Validation(_)));
    let pending = hospital.desk.prescriptions_for(&mrn).await.unwrap();
    assert_eq!(pending[0].status, PrescriptionStatus::Pending);

    hospital.desk.restock(&item.id, 20).await.unwrap();
    hospital.desk.dispense(&rx.id, &pharmacist()).await.unwrap();
    assert_eq!(hospital.desk.inventory().await.unwrap()[0].stock, 15);
}

#[tokio::test]
async fn prescriptions_need_a_real_patient_and_medication() {
    let (hospital, mrn) = hospital().await;
    let item = stock(&hospital.desk, 5).await;

    assert!(matches!(
        hospital.desk.prescribe("TZ-2025-0000", &item.id, "doc-1", 1).await,
        Err(TrackerError::NotFound(_))
    ));
    assert!(matches!(
        hospital.desk.prescribe(&mrn, "missing", "doc-1", 1).await,
        Err(TrackerError::NotFound(_))
    ));
    assert!(matches!(
        hospital.desk.prescribe(&mrn, &item.id, "doc-1", 0).await,
        Err(TrackerError::Validation(_))
    ));
}

// ===== Laboratory =====

#[tokio::test]
async fn lab_orders_complete_with_a_turnaround() {
    let (hospital, mrn) = hospital().await;
    let order = hospital
        .desk
        .order_lab(NewLabOrder {
            mrn: mrn.clone(),
            test_type: "Lab: Full Blood Count".into(),
            doctor_id: "doc-1".into(),
            is_critical: true,
        })
        .await
        .unwrap();
    assert_eq!(order.status, LabStatus::Ordered);
    assert_eq!(views::lab_counts(&hospital.desk.lab_orders().await.unwrap()).critical_pending, 1);

    let actor = Actor::new("Lab Tech Baraka");
    for step in ["Collected", "Received", "Processing"] {
        hospital.desk.advance_lab(&order.id, step, &actor).await.unwrap();
    }
    let done = hospital.desk.advance_lab(&order.id, "Completed", &actor).await.unwrap();
    assert!(done.completion_date.is_some());
    assert!(done.turnaround_minutes().is_some());

    let counts = views::lab_counts(&hospital.desk.lab_orders_for(&mrn).await.unwrap());
    assert_eq!(counts.pending_lab, 0);
    assert_eq!(counts.critical_pending, 0);
}

#[test_case("Completed" ; "skipping collection")]
#[test_case("Done" ; "unknown status")]
#[tokio::test]
async fn lab_orders_move_forward_one_stage_at_a_time(target: &str) {
    let (hospital, mrn) = hospital().await;
    let order = hospital
        .desk
        .order_lab(NewLabOrder {
            mrn,
            test_type: "Rad: Chest X-Ray".into(),
            doctor_id: "doc-1".into(),
            is_critical: false,
        })
        .await
        .unwrap();
    let err = hospital
        .desk
        .advance_lab(&order.id, target, &Actor::new("Radiographer"))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::InvalidTransition { .. }));
}

// ===== Theatre =====

#[tokio::test]
async fn surgery_cannot_start_without_consent() {
    let (hospital, mrn) = hospital().await;
    let case = hospital
        .desk
        .schedule_surgery(appendectomy(&mrn, false))
        .await
        .unwrap();
    let suffix = case.case_id.strip_prefix("CASE-").unwrap();
    assert_eq!(suffix.len(), 4);

    let theatre = Actor::new("Theatre Nurse");
    hospital.desk.advance_surgery(&case.id, "Pre-Op", &theatre).await.unwrap();
    let err = hospital
        .desk
        .advance_surgery(&case.id, "In Progress", &theatre)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Validation(_)));

    let signed = SurgicalChecklist {
        consent: true,
        fasting: true,
        ..SurgicalChecklist::default()
    };
    hospital.desk.update_checklist(&case.id, signed).await.unwrap();
    let started = hospital
        .desk
        .advance_surgery(&case.id, "In Progress", &theatre)
        .await
        .unwrap();
    assert_eq!(started.status, SurgeryStatus::InProgress);

    let patients = hospital.tracker.patients().await.unwrap();
    let stats = views::dashboard_stats(
        &patients,
        &hospital.desk.surgeries().await.unwrap(),
        &[],
        hospital.tracker.config(),
    );
    assert_eq!(stats.or_utilisation_percent, 25.0);
}

#[tokio::test]
async fn cancelled_cases_stay_cancelled() {
    let (hospital, mrn) = hospital().await;
    let case = hospital
        .desk
        .schedule_surgery(appendectomy(&mrn, true))
        .await
        .unwrap();
    let theatre = Actor::new("Theatre Nurse");
    hospital.desk.advance_surgery(&case.id, "Cancelled", &theatre).await.unwrap();

    for target in ["Scheduled", "Pre-Op", "In Progress"] {
        assert!(matches!(
            hospital.desk.advance_surgery(&case.id, target, &theatre).await,
            Err(TrackerError::InvalidTransition { .. })
        ));
    }
}

#[tokio::test]
async fn desk_work_leaves_the_encounter_alone() {
    let (hospital, mrn) = hospital().await;
    let before = hospital.tracker.find(&mrn).await.unwrap();
    let item = stock(&hospital.desk, 10).await;
    hospital.desk.prescribe(&mrn, &item.id, "doc-1", 2).await.unwrap();
    hospital.desk.schedule_surgery(appendectomy(&mrn, true)).await.unwrap();

    let after = hospital.tracker.find(&mrn).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.stage, CareStage::Opd(OpdStatus::Queue));
}
