//! Staff-facing validation state machine.
//!
//! One run drives `idle → scanning → validating → {success, error}` for a
//! subject: OCR extraction for sides that still need it, document validation
//! against issuing-authority records, and a concurrent watch-list screening.
//! Runs are resumable: an authoritative success record short-circuits without
//! spending provider quota.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::credential::{self, CredentialFields};
use super::domain::{
    BiometricStatus, CheckKind, DocumentSide, Subject, SubjectId, TenantContext, VerificationFlags,
};
use super::gateway::{
    DocumentVerdict, ProviderError, ProviderTransport, VerificationGateway, WatchlistVerdict,
};
use super::normalizer::normalize_screening_name;
use super::evidence::EvidenceStore;
use super::repository::{latest_of_kind, AuditRepository, RepositoryError, SubjectRepository};

/// Watch-list screening only fires for a normalized name of this length.
const MIN_SCREENING_NAME_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Idle,
    Scanning,
    Validating,
    Success,
    Error,
}

impl ValidationState {
    pub fn label(&self) -> &'static str {
        match self {
            ValidationState::Idle => "idle",
            ValidationState::Scanning => "scanning",
            ValidationState::Validating => "validating",
            ValidationState::Success => "success",
            ValidationState::Error => "error",
        }
    }
}

/// What a single orchestrator run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: ValidationState,
    /// Set when required fields were missing and no call was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_message: Option<String>,
    /// Provider reason when document validation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_reason: Option<String>,
    pub warnings: Vec<String>,
    /// True when an authoritative record satisfied the run without a call.
    pub resumed: bool,
    pub flags: VerificationFlags,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("subject {0} not found")]
    SubjectNotFound(String),
    #[error("screening name must have at least 3 letters")]
    ScreeningNameTooShort,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Service driving staff-operated document validation and screening.
pub struct ValidationService<T, A, E, S> {
    gateway: Arc<VerificationGateway<T, A, E>>,
    subjects: Arc<S>,
    audit: Arc<A>,
}

impl<T, A, E, S> ValidationService<T, A, E, S>
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    pub fn new(
        gateway: Arc<VerificationGateway<T, A, E>>,
        subjects: Arc<S>,
        audit: Arc<A>,
    ) -> Self {
        Self {
            gateway,
            subjects,
            audit,
        }
    }

    pub fn subject(&self, id: &SubjectId) -> Result<Subject, ValidationError> {
        self.subjects
            .fetch(id)?
            .ok_or_else(|| ValidationError::SubjectNotFound(id.0.clone()))
    }

    /// Trigger (or resume) a validation run for the subject.
    pub async fn run(
        &self,
        subject_id: &SubjectId,
        tenant: &TenantContext,
    ) -> Result<RunReport, ValidationError> {
        let subject = self.subject(subject_id)?;

        // Working record: mutated through the steps, committed at checkpoints.
        let mut working = subject;
        let mut warnings = Vec::new();

        let records = self.audit.list(subject_id)?;
        if let Some(record) = latest_of_kind(&records, CheckKind::Watchlist) {
            if !working.flags.watchlist_validated {
                working.flags.watchlist_validated = true;
                working.flags.watchlist_risk = !record.passed;
                working.flags.watchlist_record = Some(record.id.clone());
            }
        }
        if let Some(record) = latest_of_kind(&records, CheckKind::Document) {
            if record.passed {
                working.flags.document_validated = true;
                working.flags.document_record = Some(record.id.clone());
            }
        }

        if working.flags.document_validated {
            // Authoritative success already on file; no provider call.
            let flags = working.flags.clone();
            self.subjects.update(working)?;
            info!(subject = %subject_id.0, "document validation resumed from audit record");
            return Ok(RunReport {
                state: ValidationState::Success,
                blocking_message: None,
                document_reason: None,
                warnings,
                resumed: true,
                flags,
            });
        }

        self.scan(&mut working, &mut warnings, tenant).await;

        let payload = match credential::document_payload(&working) {
            Ok(payload) => payload,
            Err(err) => {
                // InputIncomplete: block locally, no network call, no audit.
                let flags = working.flags.clone();
                self.subjects.update(working)?;
                return Ok(RunReport {
                    state: ValidationState::Idle,
                    blocking_message: Some(err.to_string()),
                    document_reason: None,
                    warnings,
                    resumed: false,
                    flags,
                });
            }
        };

        let mut images = Vec::new();
        if let Some(front) = working.front_image.clone() {
            images.push((DocumentSide::Front, front));
        }
        if let Some(back) = working.back_image.clone() {
            images.push((DocumentSide::Back, back));
        }

        let screening_name = normalize_screening_name(&working.full_name);
        let screen = screening_name.chars().count() >= MIN_SCREENING_NAME_LEN;

        // The two checks target different authorities; both are awaited and
        // neither blocks or cancels the other.
        let (document, watchlist) = if screen {
            let (document, watchlist) = tokio::join!(
                self.gateway
                    .validate_document(&working, &payload, &images, tenant),
                self.gateway
                    .check_watchlist(&working, &screening_name, tenant),
            );
            (document, Some(watchlist))
        } else {
            let document = self
                .gateway
                .validate_document(&working, &payload, &images, tenant)
                .await;
            (document, None)
        };

        if let Some(outcome) = watchlist {
            apply_watchlist(&mut working.flags, &mut warnings, outcome);
        }

        let (state, document_reason) = match document {
            Ok(DocumentVerdict::Active { record }) => {
                working.flags.document_validated = true;
                working.flags.document_record = Some(record.id);
                (ValidationState::Success, None)
            }
            Ok(DocumentVerdict::Refused { reason, record }) => {
                working.flags.document_record = Some(record.id);
                (ValidationState::Error, Some(reason))
            }
            Err(err) => {
                warn!(subject = %subject_id.0, error = %err, "document validation did not complete");
                (ValidationState::Error, Some(err.to_string()))
            }
        };

        let flags = working.flags.clone();
        self.subjects.update(working)?;

        Ok(RunReport {
            state,
            blocking_message: None,
            document_reason,
            warnings,
            resumed: false,
            flags,
        })
    }

    async fn scan(&self, working: &mut Subject, warnings: &mut Vec<String>, tenant: &TenantContext) {
        for side in [DocumentSide::Front, DocumentSide::Back] {
            let (needed, image) = match side {
                DocumentSide::Front => (
                    working.front_needs_extraction(),
                    working.front_image.clone(),
                ),
                DocumentSide::Back => (working.back_needs_extraction(), working.back_image.clone()),
            };
            let Some(image) = image.filter(|_| needed) else {
                continue;
            };

            match self.gateway.extract_ocr(side, &image, tenant).await {
                Ok(raw) => {
                    let fields = credential::fields_from_response(side, &raw);
                    merge_fields(working, fields);
                }
                // Non-fatal: downstream validation fails fast if required
                // fields remain missing.
                Err(err) => {
                    warn!(
                        subject = %working.id.0,
                        side = side.provider_label(),
                        error = %err,
                        "ocr extraction failed"
                    );
                    warnings.push(format!(
                        "ocr extraction failed for {}: {err}",
                        side.provider_label()
                    ));
                }
            }
        }
    }

    /// Standalone watch-list check from just a name; writes its own audit
    /// record and never touches document state.
    pub async fn manual_watchlist(
        &self,
        subject_id: &SubjectId,
        name_override: Option<&str>,
        tenant: &TenantContext,
    ) -> Result<(WatchlistVerdict, VerificationFlags), ValidationError> {
        let mut subject = self.subject(subject_id)?;
        let raw_name = name_override.unwrap_or(&subject.full_name);
        let screening_name = normalize_screening_name(raw_name);
        if screening_name.chars().count() < MIN_SCREENING_NAME_LEN {
            return Err(ValidationError::ScreeningNameTooShort);
        }

        let verdict = self
            .gateway
            .check_watchlist(&subject, &screening_name, tenant)
            .await?;

        let mut warnings = Vec::new();
        apply_watchlist(&mut subject.flags, &mut warnings, Ok(verdict.clone()));
        let flags = subject.flags.clone();
        self.subjects.update(subject)?;

        Ok((verdict, flags))
    }

    /// Destructive staff reset for one check kind: best-effort delete of the
    /// authoritative audit row, then clear the local flags so the check
    /// returns to `idle`. Callers are responsible for double confirmation.
    pub fn reset(&self, subject_id: &SubjectId, kind: CheckKind) -> Result<(), ValidationError> {
        let mut subject = self.subject(subject_id)?;

        let records = self.audit.list(subject_id)?;
        if let Some(record) = records
            .iter()
            .find(|record| record.check == kind && record.passed)
        {
            if let Err(err) = self.audit.delete(&record.id) {
                // Stale row is superseded by the next run anyway.
                warn!(
                    subject = %subject_id.0,
                    check = kind.label(),
                    error = %err,
                    "audit record delete failed during reset"
                );
            }
        }

        match kind {
            CheckKind::Document => {
                subject.flags.document_validated = false;
                subject.flags.document_record = None;
            }
            CheckKind::Watchlist => {
                subject.flags.watchlist_validated = false;
                subject.flags.watchlist_risk = false;
                subject.flags.watchlist_record = None;
            }
            CheckKind::Biometric => {
                subject.flags.biometric_status = BiometricStatus::Unverified;
                subject.flags.biometric_score = None;
            }
        }

        self.subjects.update(subject)?;
        info!(subject = %subject_id.0, check = kind.label(), "verification check reset");
        Ok(())
    }
}

fn apply_watchlist(
    flags: &mut VerificationFlags,
    warnings: &mut Vec<String>,
    outcome: Result<WatchlistVerdict, ProviderError>,
) {
    match outcome {
        Ok(WatchlistVerdict::Clean { record }) => {
            flags.watchlist_validated = true;
            flags.watchlist_risk = false;
            flags.watchlist_record = Some(record.id);
        }
        Ok(WatchlistVerdict::Risk { record, .. }) => {
            flags.watchlist_validated = true;
            flags.watchlist_risk = true;
            flags.watchlist_record = Some(record.id);
            warnings.push("subject matched a sanction/watch list entry".to_string());
        }
        Ok(WatchlistVerdict::Unchecked { reason }) => {
            warnings.push(format!("watchlist screening skipped: {reason}"));
        }
        // Secondary gate: screening trouble never fails the run.
        Err(err) => {
            warnings.push(format!("watchlist screening unavailable: {err}"));
        }
    }
}

fn merge_fields(working: &mut Subject, fields: CredentialFields) {
    // Front side backfills identity fields, but only with non-empty values.
    if let Some(name) = fields.name {
        working.full_name = name;
    }
    if let Some(id_number) = fields.id_number {
        working.id_number = id_number;
    }
    if let Some(address) = fields.address {
        working.address = address;
    }
    if let Some(elector_key) = fields.elector_key {
        working.elector_key = Some(elector_key);
    }
    if let Some(emission) = fields.emission_number {
        working.emission_number = Some(emission);
    }
    if let Some(year) = fields.issuance_year {
        working.issuance_year = Some(year);
    }
    if let Some(model) = fields.model {
        working.credential_model = Some(model);
    }
    if let Some(mrz) = fields.mrz {
        working.mrz = Some(mrz);
    }
    if let Some(cic) = fields.cic {
        working.cic = Some(cic);
    }
    if let Some(citizen_id) = fields.citizen_id {
        working.citizen_id = Some(citizen_id);
    }
    if let Some(ocr_number) = fields.ocr_number {
        working.ocr_number = Some(ocr_number);
    }
}
