use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpResponse, HttpServer};
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use mindwhisper::clock::{Clock, SystemClock};
use mindwhisper::config::{AppConfig, StoreKind};
use mindwhisper::openapi::ApiDoc;
use mindwhisper::repo::local::LocalRepo;
use mindwhisper::rest::RestClient;
use mindwhisper::session::SessionHandle;
use mindwhisper::storage::build_store;
use mindwhisper::telemetry::{init_tracing, install_metrics};
use mindwhisper::wellness::HostedBackend;
use mindwhisper::{config, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    init_tracing();
    validate_env_vars();

    let cfg = AppConfig::from_env();
    info!("Bootstrapping MindWhisper server");
    match &cfg.store {
        StoreKind::Memory => info!("Using in-memory store (data is lost on restart)"),
        StoreKind::File(dir) => info!("Using file store at {}", dir.display()),
    }
    info!("Hosted backend configured: {}", cfg.backend.is_some());

    let store = build_store(&cfg.store)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repo = Arc::new(LocalRepo::with_clock(store, clock.clone()));

    let mut state = AppState::local(repo).with_session(SessionHandle::new(cfg.session, clock.clone()));
    if let Some(backend) = &cfg.backend {
        let client = RestClient::new(backend);
        state = state
            .with_backend(Arc::new(HostedBackend::new(client.clone())))
            .with_profiles(Arc::new(client));
    }

    let metrics = if cfg.metrics_enabled { install_metrics() } else { None };
    let openapi = ApiDoc::openapi();
    info!("OpenAPI document generated");

    let frontend_url = cfg.frontend_url.clone();
    let enable_hsts = cfg.enable_hsts;
    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local dev frontends
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .max_age(3600);
            if let Some(front) = &frontend_url {
                c = c.allowed_origin(front);
            }
            c
        };

        let mut app = App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::default().with_hsts(enable_hsts))
            .wrap(cors)
            .app_data(web::Data::new(state.clone()));
        if let Some(handle) = metrics.clone() {
            app = app.route(
                "/metrics",
                web::get().to(move || {
                    let body = handle.render();
                    async move { HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(body) }
                }),
            );
        }
        app.service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .configure(config)
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);
    server.run().await?;
    Ok(())
}

/// Warn about optional variables; nothing here is fatal.
fn validate_env_vars() {
    use std::env;

    let url = env::var("SUPABASE_URL").is_ok();
    let key = env::var("SUPABASE_SERVICE_ROLE_KEY").is_ok();
    if url != key {
        warn!("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must both be set; hosted backend disabled");
    } else if !url {
        warn!("Hosted backend not configured; home serves demo data and /create-user returns 500");
    }
    if env::var("SUPABASE_ANON_KEY").is_err() && key {
        warn!("SUPABASE_ANON_KEY missing; the service key is sent as apikey");
    }
}
