//! Wardboard core library
//!
//! Patient encounter tracking, department order desks and the read projections
//! the hospital operations dashboard renders.

pub mod core;
pub mod db;
pub mod departments;
pub mod encounter;
pub mod error;
pub mod models;
pub mod views;

pub use departments::DepartmentDesk;
pub use encounter::EncounterTracker;
pub use error::{Result, TrackerError};

/// Application configuration
pub mod config {
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct Config {
        pub store: StoreConfig,
        pub wards: Vec<WardConfig>,
        pub mrn: MrnConfig,
        pub defaults: DefaultsConfig,
        pub operations: OperationsConfig,
        pub nursing: NursingConfig,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct StoreConfig {
        /// `memory` or `sqlite`
        pub backend: String,
        pub url: String,
        pub max_connections: u32,
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    pub struct WardConfig {
        pub name: String,
        /// Bed identifiers in this ward start with the prefix, e.g. `ICU-02B`.
        pub prefix: String,
        pub total_beds: u32,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct MrnConfig {
        pub opd_prefix: String,
        pub emergency_prefix: String,
        pub max_attempts: u32,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct DefaultsConfig {
        pub doctor: String,
        pub blood_type: String,
        pub photo_base: String,
        pub dx: String,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct OperationsConfig {
        pub operating_rooms: u32,
        pub long_wait_minutes: i64,
        pub default_par: u32,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct NursingConfig {
        pub default_tasks: Vec<String>,
    }

    impl Default for Config {
        fn default() -> Self {
            Self {
                store: StoreConfig::default(),
                wards: default_wards(),
                mrn: MrnConfig::default(),
                defaults: DefaultsConfig::default(),
                operations: OperationsConfig::default(),
                nursing: NursingConfig::default(),
            }
        }
    }

    impl Default for StoreConfig {
        fn default() -> Self {
            Self {
                backend: "memory".into(),
                url: "sqlite://wardboard.db?mode=rwc".into(),
                max_connections: 5,
            }
        }
    }

    impl Default for MrnConfig {
        fn default() -> Self {
            Self {
                opd_prefix: "TZ".into(),
                emergency_prefix: "EMG".into(),
                max_attempts: 32,
            }
        }
    }

    impl Default for DefaultsConfig {
        fn default() -> Self {
            Self {
                doctor: "Unassigned".into(),
                blood_type: "Unknown".into(),
                photo_base: "https://picsum.photos/seed".into(),
                dx: "Observation".into(),
            }
        }
    }

    impl Default for OperationsConfig {
        fn default() -> Self {
            Self {
                operating_rooms: 4,
                long_wait_minutes: 30,
                default_par: 200,
            }
        }
    }

    impl Default for NursingConfig {
        fn default() -> Self {
            Self {
                default_tasks: vec![
                    "Administer Morning Meds".into(),
                    "Check Vitals (Q4H)".into(),
                    "Ambulate Patient in Hallway".into(),
                    "Change Wound Dressing".into(),
                    "Patient/Family Education".into(),
                ],
            }
        }
    }

    /// The canonical ward table. Other bed counts seen in older dashboards are not honoured.
    pub fn default_wards() -> Vec<WardConfig> {
        [
            ("Medical-Surgical", "MS", 40),
            ("ICU", "ICU", 10),
            ("Pediatrics", "PED", 20),
            ("Maternity", "MAT", 20),
        ]
        .into_iter()
        .map(|(name, prefix, total_beds)| WardConfig {
            name: name.into(),
            prefix: prefix.into(),
            total_beds,
        })
        .collect()
    }

    impl Config {
        /// Ward owning a bed, matched on `PREFIX-` so `MS-304B` never lands in `MAT`.
        pub fn ward_for_bed(&self, bed: &str) -> Option<&WardConfig> {
            self.wards.iter().find(|w| {
                bed.strip_prefix(w.prefix.as_str())
                    .map_or(false, |rest| rest.starts_with('-'))
            })
        }

        pub fn total_beds(&self) -> u32 {
            self.wards.iter().map(|w| w.total_beds).sum()
        }
    }

    /// Load configuration from file
    pub fn load_config() -> Result<Config, config::ConfigError> {
        // Override with environment-specific settings
        let env = std::env::var("WARDBOARD_ENV").unwrap_or_else(|_| "development".into());

        let settings = config::Config::builder()
            // Start with default settings
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables, e.g. WARDBOARD__STORE__BACKEND=sqlite
            .add_source(config::Environment::with_prefix("WARDBOARD").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn beds_resolve_to_their_ward() {
            let config = Config::default();
            assert_eq!(config.ward_for_bed("MS-304B").unwrap().name, "Medical-Surgical");
            assert_eq!(config.ward_for_bed("ICU-02B").unwrap().total_beds, 10);
            assert!(config.ward_for_bed("MSX-1").is_none());
            assert!(config.ward_for_bed("").is_none());
            assert_eq!(config.total_beds(), 90);
        }
    }
}
