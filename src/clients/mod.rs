//! Clients for the external collaborators.

pub mod clinical_tables;
pub mod openai;
pub mod rxnav;

pub use clinical_tables::ClinicalTablesClient;
pub use openai::OpenAiClient;
pub use rxnav::RxNavClient;
