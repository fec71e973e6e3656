use crate::cli::ServeArgs;
use crate::infra::{
    AdminAllowList, AppState, InMemoryDocumentStore, InMemoryDraftStore,
    InMemoryRegistrationRepository,
};
use crate::routes::with_portal_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use provider_portal::access::UserId;
use provider_portal::config::AppConfig;
use provider_portal::error::AppError;
use provider_portal::registration::{
    provider_registration_rules, provider_registration_steps, PortalState, RegistrationService,
};
use provider_portal::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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

    let addr = config.server.socket_addr()?;
    let drafts = Arc::new(InMemoryDraftStore::default());
    let registrations = Arc::new(InMemoryRegistrationRepository::default());
    let permissions = Arc::new(AdminAllowList::new(
        args.admins.iter().map(|admin| UserId::from(admin.as_str())),
    ));
    let documents = Arc::new(InMemoryDocumentStore::new(format!("http://{addr}")));

    let state = PortalState {
        steps: Arc::new(provider_registration_steps()),
        rules: Arc::new(provider_registration_rules()),
        drafts: drafts.clone(),
        registrations: Arc::new(RegistrationService::new(
            drafts,
            registrations,
            permissions,
            provider_registration_rules(),
        )),
    };

    let app = with_portal_routes(state, documents)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        admins = args.admins.len(),
        "provider portal ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
