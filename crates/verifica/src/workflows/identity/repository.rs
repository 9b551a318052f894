use super::domain::{CheckKind, RecordId, Subject, SubjectId, ValidationRecord};

/// Storage abstraction over the CRM contact layer so the orchestrators can be
/// exercised in isolation.
pub trait SubjectRepository: Send + Sync {
    fn insert(&self, subject: Subject) -> Result<Subject, RepositoryError>;
    fn fetch(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError>;
    fn update(&self, subject: Subject) -> Result<(), RepositoryError>;
    /// Resolve the single-use self-service token to its subject.
    fn fetch_by_token(&self, token: &str) -> Result<Option<Subject>, RepositoryError>;
}

/// Append-mostly audit store. Rows are immutable once written; `delete` exists
/// only for the explicit staff reset and is best-effort at the call sites.
pub trait AuditRepository: Send + Sync {
    fn insert(&self, record: ValidationRecord) -> Result<ValidationRecord, RepositoryError>;
    /// All records for a subject, newest first.
    fn list(&self, subject_id: &SubjectId) -> Result<Vec<ValidationRecord>, RepositoryError>;
    fn delete(&self, id: &RecordId) -> Result<(), RepositoryError>;
}

/// The most recent record of the given kind, if any. Newest-first input.
pub fn latest_of_kind<'a>(
    records: &'a [ValidationRecord],
    kind: CheckKind,
) -> Option<&'a ValidationRecord> {
    records.iter().find(|record| record.check == kind)
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
