use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use reqwest::Client;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use siteflow_backend::config::Config;
use siteflow_backend::db::{postgres_platform_repository::ensure_schema, seed::load_demo_fixtures};
use siteflow_backend::responses::JsonResponse;
use siteflow_backend::routes::build_router;
use siteflow_backend::services::mailer::{Mailer, MockMailer, SmtpMailer};
use siteflow_backend::state::{AppState, Repositories};
use siteflow_backend::utils::jwt::JwtKeys;
use siteflow_backend::worker;

#[cfg(feature = "tls")]
use axum_server::tls_rustls::RustlsConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let (plain, json) = if json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .with(sentry_tracing::layer())
        .init();
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to the database")?;
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;
    ensure_schema(&pool)
        .await
        .context("failed to create platform tables")?;
    info!("connected to the database");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    init_tracing();

    let config = Config::from_env()?;
    let jwt = JwtKeys::from_env(&config.jwt_issuer, &config.jwt_audience)?;
    let repos = match &config.database_url {
        Some(url) => Repositories::with_postgres(establish_connection(url).await?),
        None => {
            warn!("DATABASE_URL not set; platform keys and webhooks are kept in memory");
            Repositories::in_memory()
        }
    };
    let mailer: Arc<dyn Mailer> = match SmtpMailer::from_env() {
        Ok(smtp) => Arc::new(smtp),
        Err(err) => {
            warn!(%err, "SMTP not configured; outgoing mail is only recorded in memory");
            Arc::new(MockMailer::default())
        }
    };
    let http = Client::builder()
        .timeout(config.webhook_timeout)
        .build()
        .context("failed to build http client")?;

    let bind_addr: SocketAddr = config.bind_addr;
    let frontend_origin = config.frontend_origin.clone();
    let state = AppState::build(config, jwt, mailer, repos, http);

    if state.config.app.is_feature_enabled("demoData") {
        load_demo_fixtures(&state.services, &state.rules, &state.workflows).await?;
    }

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .context("invalid rate limiter settings")?,
    );

    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(
            frontend_origin
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    worker::start_background_workers(state.clone()).await;

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(cors);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    #[cfg(feature = "tls")]
    {
        let tls_config = RustlsConfig::from_pem_file(
            std::env::var("DEV_CERT_LOCATION").context("DEV_CERT_LOCATION must be set")?,
            std::env::var("DEV_KEY_LOCATION").context("DEV_KEY_LOCATION must be set")?,
        )
        .await
        .context("failed to load TLS certs")?;

        info!(%bind_addr, "listening with TLS");
        axum_server::bind_rustls(bind_addr, tls_config)
            .serve(make_service)
            .await?;
        return Ok(());
    }

    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "listening");
    axum::serve(listener, make_service).await?;
    Ok(())
}
