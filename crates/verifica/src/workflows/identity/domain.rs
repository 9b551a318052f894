use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::credential::CredentialModel;

/// Identifier for a person under verification, issued by the CRM contact layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub String);

/// Identifier for an immutable audit row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Natural person or legal entity (persona física / persona moral).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Natural,
    Moral,
}

impl SubjectKind {
    pub fn label(&self) -> &'static str {
        match self {
            SubjectKind::Natural => "natural",
            SubjectKind::Moral => "moral",
        }
    }
}

/// The three audited verification checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Document,
    Watchlist,
    Biometric,
}

impl CheckKind {
    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::Document => "document",
            CheckKind::Watchlist => "watchlist",
            CheckKind::Biometric => "biometric",
        }
    }
}

/// Credential side as the provider names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSide {
    Front,
    Back,
}

impl DocumentSide {
    /// Provider wire value (`frente` / `reverso`).
    pub fn provider_label(&self) -> &'static str {
        match self {
            DocumentSide::Front => "frente",
            DocumentSide::Back => "reverso",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricStatus {
    Unverified,
    Matched,
    Failed,
}

impl Default for BiometricStatus {
    fn default() -> Self {
        BiometricStatus::Unverified
    }
}

/// Verification outcome flags carried by a subject. Flags never regress
/// automatically; only an explicit staff reset clears one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationFlags {
    pub document_validated: bool,
    pub document_record: Option<RecordId>,
    pub watchlist_validated: bool,
    pub watchlist_record: Option<RecordId>,
    pub watchlist_risk: bool,
    pub biometric_status: BiometricStatus,
    pub biometric_score: Option<f64>,
}

/// A counter-party (owner or buyer) under KYC verification.
///
/// Created when staff registers a contact; mutated by the orchestrator as
/// checks complete. Credential images are raw base64 (optionally data-URI
/// prefixed) until evidence upload replaces them with durable references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub kind: SubjectKind,
    pub full_name: String,
    #[serde(default)]
    pub id_number: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub elector_key: Option<String>,
    #[serde(default)]
    pub emission_number: Option<String>,
    #[serde(default)]
    pub ocr_number: Option<String>,
    #[serde(default)]
    pub cic: Option<String>,
    #[serde(default)]
    pub citizen_id: Option<String>,
    #[serde(default)]
    pub mrz: Option<String>,
    #[serde(default)]
    pub issuance_year: Option<i32>,
    #[serde(default)]
    pub credential_model: Option<CredentialModel>,
    #[serde(default)]
    pub front_image: Option<String>,
    #[serde(default)]
    pub back_image: Option<String>,
    #[serde(default)]
    pub flags: VerificationFlags,
    /// Single-use opaque token backing the self-service link.
    #[serde(default)]
    pub verification_token: Option<String>,
}

impl Subject {
    /// Minimal subject as the contact layer hands it over.
    pub fn new(id: SubjectId, kind: SubjectKind, full_name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            full_name: full_name.into(),
            id_number: String::new(),
            address: String::new(),
            email: String::new(),
            phone: String::new(),
            elector_key: None,
            emission_number: None,
            ocr_number: None,
            cic: None,
            citizen_id: None,
            mrz: None,
            issuance_year: None,
            credential_model: None,
            front_image: None,
            back_image: None,
            flags: VerificationFlags::default(),
            verification_token: None,
        }
    }

    /// Front side still needs OCR extraction: image present, key fields absent.
    pub fn front_needs_extraction(&self) -> bool {
        self.front_image.is_some() && self.elector_key.is_none()
    }

    /// Back side still needs OCR extraction: image present, MRZ-derived fields absent.
    pub fn back_needs_extraction(&self) -> bool {
        self.back_image.is_some()
            && self.cic.is_none()
            && self.ocr_number.is_none()
            && self.mrz.is_none()
    }
}

/// Immutable audit row. The most recent passed record of a kind is
/// authoritative; older rows are retained for audit and removed only by an
/// explicit reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub id: RecordId,
    pub subject_id: SubjectId,
    pub subject_kind: SubjectKind,
    pub check: CheckKind,
    pub passed: bool,
    /// Raw provider response, kept verbatim for regulators.
    pub response: Value,
    pub evidence: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ValidationRecord {
    pub fn new(
        subject: &Subject,
        check: CheckKind,
        passed: bool,
        response: Value,
        evidence: Vec<String>,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            subject_id: subject.id.clone(),
            subject_kind: subject.kind,
            check,
            passed,
            response,
            evidence,
            recorded_at: Utc::now(),
        }
    }
}

/// Tenant credentials passed explicitly into every gateway call so the
/// gateway stays independently testable (no ambient session state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub api_key: String,
}
