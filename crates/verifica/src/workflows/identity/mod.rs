//! KYC/PLD verification workflows.
//!
//! Two consumption contexts share the same gateway and storage seams: the
//! staff-operated [`orchestrator::ValidationService`] and the anonymous
//! token-authenticated [`session::SelfServiceSession`].

pub mod credential;
pub mod domain;
pub mod evidence;
pub mod gateway;
pub mod orchestrator;
pub mod repository;
pub mod router;
pub mod session;

mod normalizer;

#[cfg(test)]
mod tests;

pub use credential::{
    classify_model, document_payload, extract_mrz, normalize_date, CredentialError,
    CredentialFields, CredentialModel, DocumentPayload, MrzFields,
};
pub use domain::{
    BiometricStatus, CheckKind, DocumentSide, RecordId, Subject, SubjectId, SubjectKind,
    TenantContext, ValidationRecord, VerificationFlags,
};
pub use evidence::{DriveEvidenceStore, EvidenceError, EvidenceStore};
pub use gateway::{
    BiometricVerdict, DocumentVerdict, HttpProviderTransport, ProviderAction, ProviderError,
    ProviderTransport, VerificationGateway, WatchlistVerdict,
};
pub use orchestrator::{RunReport, ValidationError, ValidationService, ValidationState};
pub use repository::{AuditRepository, RepositoryError, SubjectRepository};
pub use router::{identity_router, IdentityState, RegisterSubjectRequest, SubjectView};
pub use session::{SelfServiceSession, SessionState};
