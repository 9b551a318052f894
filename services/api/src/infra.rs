use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use verifica::workflows::identity::{
    AuditRepository, DocumentSide, EvidenceError, EvidenceStore, RecordId, RepositoryError,
    Subject, SubjectId, SubjectRepository, ValidationRecord,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySubjectRepository {
    records: Arc<Mutex<HashMap<SubjectId, Subject>>>,
}

impl SubjectRepository for InMemorySubjectRepository {
    fn insert(&self, subject: Subject) -> Result<Subject, RepositoryError> {
        let mut guard = self.records.lock().expect("subject mutex poisoned");
        if guard.contains_key(&subject.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(subject.id.clone(), subject.clone());
        Ok(subject)
    }

    fn fetch(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError> {
        let guard = self.records.lock().expect("subject mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(&self, subject: Subject) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("subject mutex poisoned");
        if guard.contains_key(&subject.id) {
            guard.insert(subject.id.clone(), subject);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch_by_token(&self, token: &str) -> Result<Option<Subject>, RepositoryError> {
        let guard = self.records.lock().expect("subject mutex poisoned");
        Ok(guard
            .values()
            .find(|subject| subject.verification_token.as_deref() == Some(token))
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAuditRepository {
    rows: Arc<Mutex<Vec<ValidationRecord>>>,
}

impl AuditRepository for InMemoryAuditRepository {
    fn insert(&self, record: ValidationRecord) -> Result<ValidationRecord, RepositoryError> {
        let mut guard = self.rows.lock().expect("audit mutex poisoned");
        guard.push(record.clone());
        Ok(record)
    }

    fn list(&self, subject_id: &SubjectId) -> Result<Vec<ValidationRecord>, RepositoryError> {
        let guard = self.rows.lock().expect("audit mutex poisoned");
        let mut rows: Vec<ValidationRecord> = guard
            .iter()
            .filter(|record| &record.subject_id == subject_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    fn delete(&self, id: &RecordId) -> Result<(), RepositoryError> {
        let mut guard = self.rows.lock().expect("audit mutex poisoned");
        let before = guard.len();
        guard.retain(|record| &record.id != id);
        if guard.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Evidence store for single-node deployments without a configured Drive
/// folder: images are retained in process and referenced by a `memory://`
/// URI so the audit rows stay navigable in development.
#[derive(Default, Clone)]
pub(crate) struct InMemoryEvidenceStore {
    images: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn upload(
        &self,
        image: &str,
        subject_id: &SubjectId,
        side: DocumentSide,
    ) -> Result<Option<String>, EvidenceError> {
        let key = format!("{}/{}", subject_id.0, side.provider_label());
        self.images
            .lock()
            .expect("evidence mutex poisoned")
            .insert(key.clone(), image.to_string());
        Ok(Some(format!("memory://{key}")))
    }
}
