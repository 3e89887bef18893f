pub mod api;
pub mod assembler;
pub mod config;
pub mod domain_utils;
pub mod extractor;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod registration;
pub mod scoring;

#[cfg(test)]
pub mod test_support;

pub use config::Config;
pub use extractor::DomainExtractor;
pub use models::{AttestationInfo, AttestationStatus, EmailMessage, IngestionResult, SenderDomain};
pub use pipeline::{IngestError, IngestionPipeline};
pub use registration::{AttestationRequest, RegistrationFlow};
