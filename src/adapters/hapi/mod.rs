//! Remote HAPI FHIR server destination

pub mod sink;

pub use sink::{transaction_bundle, HapiSink};
