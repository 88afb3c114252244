//! Application layer wiring DTOs and services for Brightsteps.

pub mod dtos;
pub mod services;

pub use dtos::{
    AskRequest, HealthStatusResponse, IngestDocumentRequest, IngestSummary, PageText,
    SourceListResponse,
};
pub use services::RagService;
