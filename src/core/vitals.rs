use crate::models::VitalSigns;

/// Threshold checks over one set of vital signs. Returns one message per breach.
pub fn analyze_vitals(vitals: &VitalSigns) -> Vec<String> {
    let mut alerts = Vec::new();

    // Check for critical values
    if let Some(hr) = vitals.heart_rate {
        if hr > 120.0 {
            alerts.push(format!("High heart rate: {} bpm", hr));
        } else if hr < 50.0 {
            alerts.push(format!("Low heart rate: {} bpm", hr));
        }
    }

    if let Some(map) = mean_arterial_pressure(vitals) {
        if map < 65.0 {
            alerts.push(format!("Low MAP: {:.0} mmHg", map));
        }
    }

    if let Some(sys) = vitals.blood_pressure_systolic {
        if sys >= 180.0 {
            alerts.push(format!("Hypertensive crisis: systolic {} mmHg", sys));
        }
    }

    if let Some(spo2) = vitals.oxygen_saturation {
        if spo2 < 92.0 {
            alerts.push(format!("Low oxygen saturation: {}%", spo2));
        }
    }

    if let Some(temp) = vitals.temperature_celsius {
        if temp >= 38.0 {
            alerts.push(format!("Fever: {}°C", temp));
        } else if temp < 35.0 {
            alerts.push(format!("Hypothermia: {}°C", temp));
        }
    }

    if let Some(rr) = vitals.respiratory_rate {
        if rr > 24.0 || rr < 8.0 {
            alerts.push(format!("Abnormal respiratory rate: {}/min", rr));
        }
    }

    alerts
}

/// MAP from a full blood pressure pair: (SBP + 2 * DBP) / 3.
pub fn mean_arterial_pressure(vitals: &VitalSigns) -> Option<f32> {
    let sys = vitals.blood_pressure_systolic?;
    let dia = vitals.blood_pressure_diastolic?;
    Some((sys + 2.0 * dia) / 3.0)
}
