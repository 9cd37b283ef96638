use crate::cli::ServeArgs;
use crate::infra::{build_scheduler, load_connections, AppState};
use crate::routes::with_scheduling_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tour_booking::config::AppConfig;
use tour_booking::error::AppError;
use tour_booking::scheduling::InMemoryConnectionStore;
use tour_booking::telemetry;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let connections = match args.connections.take() {
        Some(path) => {
            let store = load_connections(&path)?;
            info!(path = %path.display(), "calendar connections loaded");
            store
        }
        None => {
            warn!("no calendar connections supplied; bookings will be local only");
            InMemoryConnectionStore::default()
        }
    };

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let scheduler = Arc::new(build_scheduler(&config, connections)?);
    let business_hours = scheduler.business_hours();

    let app = with_scheduling_routes(scheduler)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        opens = %business_hours.opens(),
        closes = %business_hours.closes(),
        provider_timeout_ms = config.providers.request_timeout.as_millis() as u64,
        "tour booking service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
