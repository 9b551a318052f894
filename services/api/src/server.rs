use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryAuditRepository, InMemoryEvidenceStore, InMemorySubjectRepository,
};
use crate::routes::with_identity_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use verifica::config::AppConfig;
use verifica::error::AppError;
use verifica::telemetry;
use verifica::workflows::identity::{
    HttpProviderTransport, IdentityState, TenantContext, ValidationError, ValidationService,
    VerificationGateway,
};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let transport = Arc::new(
        HttpProviderTransport::new(config.provider.base_url.clone(), config.provider.timeout())
            .map_err(ValidationError::from)?,
    );
    let subjects = Arc::new(InMemorySubjectRepository::default());
    let audit = Arc::new(InMemoryAuditRepository::default());
    let evidence = Arc::new(InMemoryEvidenceStore::default());
    let gateway = Arc::new(VerificationGateway::new(
        transport,
        audit.clone(),
        evidence,
    ));
    let service = ValidationService::new(gateway.clone(), subjects.clone(), audit);
    let identity_state = Arc::new(IdentityState {
        service,
        gateway,
        subjects,
        tenant: TenantContext {
            tenant_id: config.provider.tenant_id.clone(),
            api_key: config.provider.api_key.clone(),
        },
    });

    let app = with_identity_routes(identity_state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "identity verification service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
