//! Single chokepoint between the verification flows and the external
//! provider. Maps abstract actions to endpoints plus tenant credentials,
//! applies the per-action success predicate, and writes the audit row.
//!
//! Transport failures never escape this module as anything but structured
//! `ProviderError` values.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, warn};

use super::credential::DocumentPayload;
use super::domain::{CheckKind, DocumentSide, Subject, TenantContext, ValidationRecord};
use super::evidence::{strip_data_uri, EvidenceStore};
use super::repository::AuditRepository;

/// Abstract verification actions the provider understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAction {
    ExtractOcr,
    ValidateDocument,
    CheckWatchlist,
    BiometricMatch,
}

impl ProviderAction {
    /// Wire name, also the endpoint path segment.
    pub fn wire_label(&self) -> &'static str {
        match self {
            ProviderAction::ExtractOcr => "extract-ocr",
            ProviderAction::ValidateDocument => "validate-document",
            ProviderAction::CheckWatchlist => "check-watchlist",
            ProviderAction::BiometricMatch => "biometric-match",
        }
    }
}

/// Structured provider failure surfaced to callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("provider response malformed: {0}")]
    ResponseInvalid(String),
}

impl ProviderError {
    /// The provider could not parse our payload. For watch-list screening
    /// this specific rejection is downgraded to an advisory no-op.
    pub fn is_malformed_request(&self) -> bool {
        matches!(self, ProviderError::Rejected { status: 400, .. })
    }
}

/// Transport seam so the flows can be driven against fakes in tests.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn send(
        &self,
        action: ProviderAction,
        payload: &Value,
        tenant: &TenantContext,
    ) -> Result<Value, ProviderError>;
}

/// HTTP transport with a per-call timeout mapped to `Unavailable`, so a hung
/// provider call can never wedge a state machine.
#[derive(Debug, Clone)]
pub struct HttpProviderTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProviderTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ProviderTransport for HttpProviderTransport {
    async fn send(
        &self,
        action: ProviderAction,
        payload: &Value,
        tenant: &TenantContext,
    ) -> Result<Value, ProviderError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            action.wire_label()
        );
        let body = json!({
            "action": action.wire_label(),
            "payload": payload,
            "tenant": tenant.tenant_id,
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&tenant.api_key)
            .header("x-tenant-id", &tenant.tenant_id)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|err| ProviderError::ResponseInvalid(err.to_string()));
        }

        if status.is_client_error() {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|raw| {
                    raw.get("error")
                        .or_else(|| raw.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("status {status}"));
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Err(ProviderError::Unavailable(format!(
            "provider returned {status}"
        )))
    }
}

/// Outcome of a document validation call, with its persisted audit row.
#[derive(Debug, Clone)]
pub enum DocumentVerdict {
    Active { record: ValidationRecord },
    Refused { reason: String, record: ValidationRecord },
}

/// Outcome of a watch-list screening call.
#[derive(Debug, Clone)]
pub enum WatchlistVerdict {
    Clean { record: ValidationRecord },
    Risk { record: ValidationRecord, matches: Value },
    /// The provider could not parse the request; screening did not happen.
    /// Advisory only — never fails the run and never sets the flag.
    Unchecked { reason: String },
}

/// Outcome of a biometric match call.
#[derive(Debug, Clone)]
pub struct BiometricVerdict {
    pub matched: bool,
    pub score: Option<f64>,
    pub record: ValidationRecord,
}

/// Gateway composing the transport, the audit store, and the evidence store.
pub struct VerificationGateway<T, A, E> {
    transport: Arc<T>,
    audit: Arc<A>,
    evidence: Arc<E>,
}

impl<T, A, E> VerificationGateway<T, A, E>
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
{
    pub fn new(transport: Arc<T>, audit: Arc<A>, evidence: Arc<E>) -> Self {
        Self {
            transport,
            audit,
            evidence,
        }
    }

    /// Raw OCR extraction for one credential side. Unaudited.
    pub async fn extract_ocr(
        &self,
        side: DocumentSide,
        image: &str,
        tenant: &TenantContext,
    ) -> Result<Value, ProviderError> {
        let payload = json!({
            "side": side.provider_label(),
            "image_data": strip_data_uri(image),
        });
        self.transport
            .send(ProviderAction::ExtractOcr, &payload, tenant)
            .await
    }

    /// Validate the credential against issuing-authority records.
    ///
    /// Success requires the explicit `active == true` flag. On success the
    /// document images are uploaded as evidence *before* the audit row is
    /// written, so the references land atomically with the success state;
    /// nothing is uploaded for refused attempts. A provider rejection is a
    /// refusal with the provider's reason, persisted like any other failure.
    pub async fn validate_document(
        &self,
        subject: &Subject,
        payload: &DocumentPayload,
        images: &[(DocumentSide, String)],
        tenant: &TenantContext,
    ) -> Result<DocumentVerdict, ProviderError> {
        let body = serde_json::to_value(payload).expect("document payload serializes");
        let sent = self
            .transport
            .send(ProviderAction::ValidateDocument, &body, tenant)
            .await;

        match sent {
            Ok(raw) => {
                let active = raw.get("active").and_then(Value::as_bool) == Some(true);
                if active {
                    let evidence = self.upload_evidence(subject, images).await;
                    let record = self.persist(ValidationRecord::new(
                        subject,
                        CheckKind::Document,
                        true,
                        raw,
                        evidence,
                    ));
                    Ok(DocumentVerdict::Active { record })
                } else {
                    let reason = raw
                        .get("message")
                        .or_else(|| raw.get("reason"))
                        .and_then(Value::as_str)
                        .unwrap_or("document is not active")
                        .to_string();
                    let record = self.persist(ValidationRecord::new(
                        subject,
                        CheckKind::Document,
                        false,
                        raw,
                        Vec::new(),
                    ));
                    Ok(DocumentVerdict::Refused { reason, record })
                }
            }
            Err(ProviderError::Rejected { status, message }) => {
                let record = self.persist(ValidationRecord::new(
                    subject,
                    CheckKind::Document,
                    false,
                    json!({ "error": message, "status": status }),
                    Vec::new(),
                ));
                Ok(DocumentVerdict::Refused {
                    reason: message,
                    record,
                })
            }
            // Transport/timeout failures leave no partial state to clean up.
            Err(err) => Err(err),
        }
    }

    /// Screen a normalized name against sanction/watch lists.
    ///
    /// The predicate is absence of any match. A malformed-payload rejection
    /// is downgraded to `Unchecked` and writes nothing.
    pub async fn check_watchlist(
        &self,
        subject: &Subject,
        full_name: &str,
        tenant: &TenantContext,
    ) -> Result<WatchlistVerdict, ProviderError> {
        let payload = json!({
            "full_name": full_name,
            "first_name": "",
            "middle_name": "",
            "surnames": "",
            "birth_date": "",
            "birth_place": "",
        });
        let sent = self
            .transport
            .send(ProviderAction::CheckWatchlist, &payload, tenant)
            .await;

        match sent {
            Ok(raw) => {
                let matches = raw
                    .get("matches")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                if matches.is_empty() {
                    let record = self.persist(ValidationRecord::new(
                        subject,
                        CheckKind::Watchlist,
                        true,
                        raw,
                        Vec::new(),
                    ));
                    Ok(WatchlistVerdict::Clean { record })
                } else {
                    let record = self.persist(ValidationRecord::new(
                        subject,
                        CheckKind::Watchlist,
                        false,
                        raw,
                        Vec::new(),
                    ));
                    Ok(WatchlistVerdict::Risk {
                        record,
                        matches: Value::Array(matches),
                    })
                }
            }
            Err(err) if err.is_malformed_request() => {
                warn!(subject = %subject.id.0, error = %err, "watchlist request not parseable; screening skipped");
                Ok(WatchlistVerdict::Unchecked {
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Match the live selfie against both credential sides. One call, one
    /// audit row; the match boolean is the predicate.
    pub async fn biometric_match(
        &self,
        subject: &Subject,
        selfie: &str,
        front: &str,
        back: &str,
        tenant: &TenantContext,
    ) -> Result<BiometricVerdict, ProviderError> {
        let payload = json!({
            "imagen_rostro": strip_data_uri(selfie),
            "credencial_frente": strip_data_uri(front),
            "credencial_reverso": strip_data_uri(back),
        });
        let raw = self
            .transport
            .send(ProviderAction::BiometricMatch, &payload, tenant)
            .await?;

        let matched = raw.get("match").and_then(Value::as_bool) == Some(true);
        let score = raw
            .get("similarity")
            .or_else(|| raw.get("score"))
            .and_then(Value::as_f64);
        let record = self.persist(ValidationRecord::new(
            subject,
            CheckKind::Biometric,
            matched,
            raw,
            Vec::new(),
        ));

        Ok(BiometricVerdict {
            matched,
            score,
            record,
        })
    }

    async fn upload_evidence(
        &self,
        subject: &Subject,
        images: &[(DocumentSide, String)],
    ) -> Vec<String> {
        let mut references = Vec::new();
        for (side, image) in images {
            match self.evidence.upload(image, &subject.id, *side).await {
                Ok(Some(url)) => references.push(url),
                Ok(None) => {}
                // One side failing blocks neither the other nor the outcome.
                Err(err) => warn!(
                    subject = %subject.id.0,
                    side = side.provider_label(),
                    error = %err,
                    "evidence upload failed"
                ),
            }
        }
        references
    }

    /// An audit-write failure after a successful provider call is logged and
    /// never masks the true outcome; the in-memory record is still returned.
    fn persist(&self, record: ValidationRecord) -> ValidationRecord {
        match self.audit.insert(record.clone()) {
            Ok(stored) => stored,
            Err(err) => {
                error!(
                    subject = %record.subject_id.0,
                    check = record.check.label(),
                    error = %err,
                    "audit write failed after provider response"
                );
                record
            }
        }
    }
}
