use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_roster_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use shift_roster::config::AppConfig;
use shift_roster::error::AppError;
use shift_roster::roster::{InMemoryRosterRepository, RosterService};
use shift_roster::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryRosterRepository::default());
    let roster = Arc::new(
        RosterService::new(repository)
            .with_board_waitlist_limit(config.roster.board_waitlist_limit),
    );

    let app = with_roster_routes(roster)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        board_waitlist_limit = config.roster.board_waitlist_limit,
        "shift roster ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
