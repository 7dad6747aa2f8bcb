//! Clinical helpers with no storage dependency.

pub mod mrn;
pub mod vitals;
