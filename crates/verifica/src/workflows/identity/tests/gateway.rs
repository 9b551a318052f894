use serde_json::json;

use super::common::{
    active_response, clean_watchlist_response, harness, model_h_subject,
    risk_watchlist_response, tenant,
};
use crate::workflows::identity::credential::document_payload;
use crate::workflows::identity::domain::{CheckKind, DocumentSide};
use crate::workflows::identity::gateway::{
    DocumentVerdict, ProviderAction, ProviderError, WatchlistVerdict,
};

fn images(subject: &crate::workflows::identity::domain::Subject) -> Vec<(DocumentSide, String)> {
    vec![
        (DocumentSide::Front, subject.front_image.clone().expect("front")),
        (DocumentSide::Back, subject.back_image.clone().expect("back")),
    ]
}

#[tokio::test]
async fn document_success_uploads_evidence_before_the_audit_row() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    fixture
        .transport
        .script(ProviderAction::ValidateDocument, Ok(active_response()));

    let payload = document_payload(&subject).expect("payload builds");
    let verdict = fixture
        .gateway
        .validate_document(&subject, &payload, &images(&subject), &tenant())
        .await
        .expect("structured result");

    let record = match verdict {
        DocumentVerdict::Active { record } => record,
        other => panic!("expected active verdict, got {other:?}"),
    };
    assert!(record.passed);
    assert_eq!(record.check, CheckKind::Document);
    // Evidence references landed on the persisted row itself.
    assert_eq!(record.evidence.len(), 2);
    let stored = fixture.audit.records();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].evidence, record.evidence);
    assert_eq!(fixture.evidence.uploads.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn inactive_document_is_refused_and_keeps_no_evidence() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    fixture.transport.script(
        ProviderAction::ValidateDocument,
        Ok(json!({ "active": false, "message": "credencial no vigente" })),
    );

    let payload = document_payload(&subject).expect("payload builds");
    let verdict = fixture
        .gateway
        .validate_document(&subject, &payload, &images(&subject), &tenant())
        .await
        .expect("structured result");

    match verdict {
        DocumentVerdict::Refused { reason, record } => {
            assert_eq!(reason, "credencial no vigente");
            assert!(!record.passed);
        }
        other => panic!("expected refusal, got {other:?}"),
    }
    assert!(fixture.evidence.uploads.lock().expect("lock").is_empty());
    assert_eq!(fixture.audit.records().len(), 1);
}

#[tokio::test]
async fn provider_rejection_is_a_refusal_with_a_persisted_failure() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    fixture.transport.script(
        ProviderAction::ValidateDocument,
        Err(ProviderError::Rejected {
            status: 422,
            message: "clave de elector desconocida".to_string(),
        }),
    );

    let payload = document_payload(&subject).expect("payload builds");
    let verdict = fixture
        .gateway
        .validate_document(&subject, &payload, &images(&subject), &tenant())
        .await
        .expect("rejection is still a structured verdict");

    match verdict {
        DocumentVerdict::Refused { reason, .. } => {
            assert!(reason.contains("clave de elector"));
        }
        other => panic!("expected refusal, got {other:?}"),
    }
    assert_eq!(fixture.audit.records().len(), 1);
    assert!(!fixture.audit.records()[0].passed);
}

#[tokio::test]
async fn transport_failure_writes_nothing() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    fixture.transport.script(
        ProviderAction::ValidateDocument,
        Err(ProviderError::Unavailable("connect timeout".to_string())),
    );

    let payload = document_payload(&subject).expect("payload builds");
    let result = fixture
        .gateway
        .validate_document(&subject, &payload, &images(&subject), &tenant())
        .await;

    assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    assert!(fixture.audit.records().is_empty());
    assert!(fixture.evidence.uploads.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn audit_write_failure_never_masks_the_provider_outcome() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    *fixture.audit.fail_inserts.lock().expect("lock") = true;
    fixture
        .transport
        .script(ProviderAction::ValidateDocument, Ok(active_response()));

    let payload = document_payload(&subject).expect("payload builds");
    let verdict = fixture
        .gateway
        .validate_document(&subject, &payload, &images(&subject), &tenant())
        .await
        .expect("outcome survives persistence failure");

    assert!(matches!(verdict, DocumentVerdict::Active { .. }));
}

#[tokio::test]
async fn failed_evidence_upload_does_not_block_success() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    *fixture.evidence.fail_uploads.lock().expect("lock") = true;
    fixture
        .transport
        .script(ProviderAction::ValidateDocument, Ok(active_response()));

    let payload = document_payload(&subject).expect("payload builds");
    let verdict = fixture
        .gateway
        .validate_document(&subject, &payload, &images(&subject), &tenant())
        .await
        .expect("structured result");

    match verdict {
        DocumentVerdict::Active { record } => assert!(record.evidence.is_empty()),
        other => panic!("expected active verdict, got {other:?}"),
    }
}

#[tokio::test]
async fn clean_watchlist_passes_and_audits() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    fixture
        .transport
        .script(ProviderAction::CheckWatchlist, Ok(clean_watchlist_response()));

    let verdict = fixture
        .gateway
        .check_watchlist(&subject, "JUAN PEREZ LOPEZ", &tenant())
        .await
        .expect("structured result");

    assert!(matches!(verdict, WatchlistVerdict::Clean { .. }));
    let rows = fixture.audit.records();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].check, CheckKind::Watchlist);
    assert!(rows[0].passed);

    // Wire shape: only full_name carries data, the rest are required-but-unused.
    let calls = fixture.transport.calls_for(ProviderAction::CheckWatchlist);
    assert_eq!(calls[0]["full_name"], "JUAN PEREZ LOPEZ");
    assert_eq!(calls[0]["first_name"], "");
    assert_eq!(calls[0]["birth_place"], "");
}

#[tokio::test]
async fn watchlist_match_is_a_risk_with_a_failed_row() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    fixture
        .transport
        .script(ProviderAction::CheckWatchlist, Ok(risk_watchlist_response()));

    let verdict = fixture
        .gateway
        .check_watchlist(&subject, "JUAN PEREZ LOPEZ", &tenant())
        .await
        .expect("structured result");

    match verdict {
        WatchlistVerdict::Risk { matches, .. } => {
            assert_eq!(matches[0]["list"], "OFAC");
        }
        other => panic!("expected risk verdict, got {other:?}"),
    }
    assert!(!fixture.audit.records()[0].passed);
}

#[tokio::test]
async fn malformed_watchlist_request_is_advisory_only() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    fixture.transport.script(
        ProviderAction::CheckWatchlist,
        Err(ProviderError::Rejected {
            status: 400,
            message: "malformed request".to_string(),
        }),
    );

    let verdict = fixture
        .gateway
        .check_watchlist(&subject, "JUAN PEREZ LOPEZ", &tenant())
        .await
        .expect("downgraded to advisory");

    assert!(matches!(verdict, WatchlistVerdict::Unchecked { .. }));
    assert!(fixture.audit.records().is_empty());
}

#[tokio::test]
async fn biometric_match_records_the_verdict() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    fixture.transport.script(
        ProviderAction::BiometricMatch,
        Ok(json!({ "match": true, "similarity": 0.97 })),
    );

    let verdict = fixture
        .gateway
        .biometric_match(&subject, "U0VMRklF", "RlJFTlRF", "UkVWRVJTTw==", &tenant())
        .await
        .expect("structured result");

    assert!(verdict.matched);
    assert_eq!(verdict.score, Some(0.97));
    let rows = fixture.audit.records();
    assert_eq!(rows[0].check, CheckKind::Biometric);
    assert!(rows[0].passed);
}

#[tokio::test]
async fn extract_ocr_is_not_audited_and_strips_data_uris() {
    let subject = model_h_subject();
    let fixture = harness(subject.clone());
    fixture
        .transport
        .script(ProviderAction::ExtractOcr, Ok(json!({ "nombre": "JUAN" })));

    fixture
        .gateway
        .extract_ocr(
            DocumentSide::Front,
            "data:image/jpeg;base64,RlJFTlRF",
            &tenant(),
        )
        .await
        .expect("ocr call succeeds");

    assert!(fixture.audit.records().is_empty());
    let calls = fixture.transport.calls_for(ProviderAction::ExtractOcr);
    assert_eq!(calls[0]["side"], "frente");
    assert_eq!(calls[0]["image_data"], "RlJFTlRF");
}
