use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::workflows::identity::credential::CredentialModel;
use crate::workflows::identity::domain::{
    DocumentSide, RecordId, Subject, SubjectId, SubjectKind, TenantContext, ValidationRecord,
};
use crate::workflows::identity::evidence::{EvidenceError, EvidenceStore};
use crate::workflows::identity::gateway::{
    ProviderAction, ProviderError, ProviderTransport, VerificationGateway,
};
use crate::workflows::identity::orchestrator::ValidationService;
use crate::workflows::identity::repository::{
    AuditRepository, RepositoryError, SubjectRepository,
};

pub(super) fn tenant() -> TenantContext {
    TenantContext {
        tenant_id: "inmobiliaria-01".to_string(),
        api_key: "test-key".to_string(),
    }
}

/// Subject with everything a model-H validation needs already structured.
pub(super) fn model_h_subject() -> Subject {
    let mut subject = Subject::new(
        SubjectId("subj-1".to_string()),
        SubjectKind::Natural,
        "Juan Pérez López",
    );
    subject.elector_key = Some("PRLPJN90030512H100".to_string());
    subject.emission_number = Some("02".to_string());
    subject.cic = Some("123456789".to_string());
    subject.citizen_id = Some("987654321".to_string());
    subject.ocr_number = Some("1234567890123".to_string());
    subject.issuance_year = Some(2021);
    subject.credential_model = Some(CredentialModel::B);
    subject.front_image = Some("data:image/jpeg;base64,RlJFTlRF".to_string());
    subject.back_image = Some("data:image/jpeg;base64,UkVWRVJTTw==".to_string());
    subject.verification_token = Some("token-1".to_string());
    subject
}

#[derive(Default)]
pub(super) struct MemorySubjects {
    records: Mutex<HashMap<SubjectId, Subject>>,
}

impl MemorySubjects {
    pub(super) fn with(subject: Subject) -> Arc<Self> {
        let repo = Self::default();
        repo.records
            .lock()
            .expect("lock")
            .insert(subject.id.clone(), subject);
        Arc::new(repo)
    }

    pub(super) fn get(&self, id: &SubjectId) -> Subject {
        self.records
            .lock()
            .expect("lock")
            .get(id)
            .cloned()
            .expect("subject present")
    }
}

impl SubjectRepository for MemorySubjects {
    fn insert(&self, subject: Subject) -> Result<Subject, RepositoryError> {
        let mut guard = self.records.lock().expect("lock");
        if guard.contains_key(&subject.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(subject.id.clone(), subject.clone());
        Ok(subject)
    }

    fn fetch(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError> {
        Ok(self.records.lock().expect("lock").get(id).cloned())
    }

    fn update(&self, subject: Subject) -> Result<(), RepositoryError> {
        self.records
            .lock()
            .expect("lock")
            .insert(subject.id.clone(), subject);
        Ok(())
    }

    fn fetch_by_token(&self, token: &str) -> Result<Option<Subject>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("lock")
            .values()
            .find(|subject| subject.verification_token.as_deref() == Some(token))
            .cloned())
    }
}

#[derive(Default)]
pub(super) struct MemoryAudit {
    rows: Mutex<Vec<ValidationRecord>>,
    pub(super) fail_inserts: Mutex<bool>,
}

impl MemoryAudit {
    pub(super) fn records(&self) -> Vec<ValidationRecord> {
        let mut rows = self.rows.lock().expect("lock").clone();
        rows.reverse();
        rows
    }

    pub(super) fn seed(&self, record: ValidationRecord) {
        self.rows.lock().expect("lock").push(record);
    }
}

impl AuditRepository for MemoryAudit {
    fn insert(&self, record: ValidationRecord) -> Result<ValidationRecord, RepositoryError> {
        if *self.fail_inserts.lock().expect("lock") {
            return Err(RepositoryError::Unavailable("audit store down".to_string()));
        }
        self.rows.lock().expect("lock").push(record.clone());
        Ok(record)
    }

    fn list(&self, subject_id: &SubjectId) -> Result<Vec<ValidationRecord>, RepositoryError> {
        let mut rows: Vec<ValidationRecord> = self
            .rows
            .lock()
            .expect("lock")
            .iter()
            .filter(|record| &record.subject_id == subject_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    fn delete(&self, id: &RecordId) -> Result<(), RepositoryError> {
        let mut guard = self.rows.lock().expect("lock");
        let before = guard.len();
        guard.retain(|record| &record.id != id);
        if guard.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryEvidence {
    pub(super) uploads: Mutex<Vec<(SubjectId, DocumentSide)>>,
    pub(super) fail_uploads: Mutex<bool>,
}

#[async_trait]
impl EvidenceStore for MemoryEvidence {
    async fn upload(
        &self,
        _image: &str,
        subject_id: &SubjectId,
        side: DocumentSide,
    ) -> Result<Option<String>, EvidenceError> {
        if *self.fail_uploads.lock().expect("lock") {
            return Err(EvidenceError::Backend("bucket offline".to_string()));
        }
        self.uploads
            .lock()
            .expect("lock")
            .push((subject_id.clone(), side));
        Ok(Some(format!(
            "https://evidence.test/{}/{}",
            subject_id.0,
            side.provider_label()
        )))
    }
}

/// Transport double replaying scripted responses per action, newest queued
/// first-in-first-out, and recording every payload it was handed.
#[derive(Default)]
pub(super) struct ScriptedTransport {
    responses: Mutex<HashMap<&'static str, VecDeque<Result<Value, ProviderError>>>>,
    pub(super) calls: Mutex<Vec<(ProviderAction, Value)>>,
}

impl ScriptedTransport {
    pub(super) fn script(
        &self,
        action: ProviderAction,
        response: Result<Value, ProviderError>,
    ) -> &Self {
        self.responses
            .lock()
            .expect("lock")
            .entry(action.wire_label())
            .or_default()
            .push_back(response);
        self
    }

    pub(super) fn calls_for(&self, action: ProviderAction) -> Vec<Value> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|(called, _)| *called == action)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl ProviderTransport for ScriptedTransport {
    async fn send(
        &self,
        action: ProviderAction,
        payload: &Value,
        _tenant: &TenantContext,
    ) -> Result<Value, ProviderError> {
        self.calls
            .lock()
            .expect("lock")
            .push((action, payload.clone()));
        self.responses
            .lock()
            .expect("lock")
            .get_mut(action.wire_label())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(ProviderError::Unavailable(format!(
                    "no scripted response for {}",
                    action.wire_label()
                )))
            })
    }
}

pub(super) struct Harness {
    pub(super) transport: Arc<ScriptedTransport>,
    pub(super) audit: Arc<MemoryAudit>,
    pub(super) evidence: Arc<MemoryEvidence>,
    pub(super) subjects: Arc<MemorySubjects>,
    pub(super) gateway:
        Arc<VerificationGateway<ScriptedTransport, MemoryAudit, MemoryEvidence>>,
    pub(super) service:
        ValidationService<ScriptedTransport, MemoryAudit, MemoryEvidence, MemorySubjects>,
}

pub(super) fn harness(subject: Subject) -> Harness {
    let transport = Arc::new(ScriptedTransport::default());
    let audit = Arc::new(MemoryAudit::default());
    let evidence = Arc::new(MemoryEvidence::default());
    let subjects = MemorySubjects::with(subject);
    let gateway = Arc::new(VerificationGateway::new(
        transport.clone(),
        audit.clone(),
        evidence.clone(),
    ));
    let service = ValidationService::new(gateway.clone(), subjects.clone(), audit.clone());

    Harness {
        transport,
        audit,
        evidence,
        subjects,
        gateway,
        service,
    }
}

pub(super) fn active_response() -> Value {
    json!({ "active": true, "vigencia": "2031" })
}

pub(super) fn clean_watchlist_response() -> Value {
    json!({ "matches": [] })
}

pub(super) fn risk_watchlist_response() -> Value {
    json!({ "matches": [{ "list": "OFAC", "name": "JUAN PEREZ LOPEZ" }] })
}
