//! Anonymous self-service capture flow behind a single-use link.
//!
//! A separate state machine from the staff orchestrator, sharing the gateway
//! and repository seams. The session has no authenticated identity of its
//! own: everything is keyed by the opaque token resolved at `loading`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use super::domain::{BiometricStatus, Subject, TenantContext};
use super::evidence::EvidenceStore;
use super::gateway::{ProviderTransport, VerificationGateway};
use super::repository::{AuditRepository, SubjectRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Loading,
    Selfie,
    IneFront,
    IneBack,
    Confirmation,
    Processing,
    Success,
    Error,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Loading => "loading",
            SessionState::Selfie => "selfie",
            SessionState::IneFront => "ine_front",
            SessionState::IneBack => "ine_back",
            SessionState::Confirmation => "confirmation",
            SessionState::Processing => "processing",
            SessionState::Success => "success",
            SessionState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Success | SessionState::Error)
    }
}

/// One subject-facing verification session.
///
/// `error` is terminal: there is no in-place retry, the subject reopens the
/// link and starts a fresh session.
pub struct SelfServiceSession<T, A, E, S> {
    gateway: Arc<VerificationGateway<T, A, E>>,
    subjects: Arc<S>,
    token: String,
    state: SessionState,
    subject: Option<Subject>,
    selfie: Option<String>,
    front: Option<String>,
    back: Option<String>,
    similarity: Option<f64>,
    failure: Option<String>,
}

impl<T, A, E, S> SelfServiceSession<T, A, E, S>
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    pub fn new(
        gateway: Arc<VerificationGateway<T, A, E>>,
        subjects: Arc<S>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            subjects,
            token: token.into(),
            state: SessionState::Loading,
            subject: None,
            selfie: None,
            front: None,
            back: None,
            similarity: None,
            failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subject_name(&self) -> Option<&str> {
        self.subject.as_ref().map(|subject| subject.full_name.as_str())
    }

    /// Similarity score surfaced on a failed match, when the provider sent one.
    pub fn similarity(&self) -> Option<f64> {
        self.similarity
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Resolve the token. Resolution failure is a terminal `error`.
    pub fn start(&mut self) -> SessionState {
        if self.state != SessionState::Loading {
            return self.state;
        }

        match self.subjects.fetch_by_token(&self.token) {
            Ok(Some(subject)) => {
                self.subject = Some(subject);
                self.state = SessionState::Selfie;
            }
            Ok(None) => {
                self.failure = Some("verification link is invalid or expired".to_string());
                self.state = SessionState::Error;
            }
            Err(err) => {
                self.failure = Some(err.to_string());
                self.state = SessionState::Error;
            }
        }
        self.state
    }

    /// Capture states advance unconditionally; nothing is validated until
    /// `confirmation`. Captures outside a capture state are ignored.
    pub fn capture(&mut self, image: String) -> SessionState {
        match self.state {
            SessionState::Selfie => {
                self.selfie = Some(image);
                self.state = SessionState::IneFront;
            }
            SessionState::IneFront => {
                self.front = Some(image);
                self.state = SessionState::IneBack;
            }
            SessionState::IneBack => {
                self.back = Some(image);
                self.state = SessionState::Confirmation;
            }
            _ => {}
        }
        self.state
    }

    /// From `confirmation`, throw away every capture and start over.
    pub fn restart(&mut self) -> SessionState {
        if self.state == SessionState::Confirmation {
            self.selfie = None;
            self.front = None;
            self.back = None;
            self.state = SessionState::Selfie;
        }
        self.state
    }

    /// Issue the single biometric-match call bundling all three images.
    pub async fn submit(&mut self, tenant: &TenantContext) -> SessionState {
        if self.state != SessionState::Confirmation {
            return self.state;
        }
        self.state = SessionState::Processing;

        let (Some(subject), Some(selfie), Some(front), Some(back)) = (
            self.subject.clone(),
            self.selfie.as_deref(),
            self.front.as_deref(),
            self.back.as_deref(),
        ) else {
            self.failure = Some("captures incomplete".to_string());
            self.state = SessionState::Error;
            return self.state;
        };

        match self
            .gateway
            .biometric_match(&subject, selfie, front, back, tenant)
            .await
        {
            Ok(verdict) if verdict.matched => {
                self.similarity = verdict.score;
                self.persist_match(verdict.score);
                info!(subject = %subject.id.0, "biometric verification succeeded");
                self.state = SessionState::Success;
            }
            Ok(verdict) => {
                self.similarity = verdict.score;
                self.failure = Some("biometric match failed".to_string());
                self.state = SessionState::Error;
            }
            Err(err) => {
                self.failure = Some(err.to_string());
                self.state = SessionState::Error;
            }
        }
        self.state
    }

    /// Persist the biometric flag/score keyed by the session token. The link
    /// is consumed here, on success only. A persistence failure is logged and
    /// never demotes the provider's true outcome.
    fn persist_match(&self, score: Option<f64>) {
        let fetched = self.subjects.fetch_by_token(&self.token);
        match fetched {
            Ok(Some(mut subject)) => {
                subject.flags.biometric_status = BiometricStatus::Matched;
                subject.flags.biometric_score = score;
                subject.verification_token = None;
                if let Err(err) = self.subjects.update(subject) {
                    error!(error = %err, "failed to persist biometric flags");
                }
            }
            Ok(None) => error!("token no longer resolves; biometric flags not persisted"),
            Err(err) => error!(error = %err, "failed to reload subject for biometric flags"),
        }
    }
}
