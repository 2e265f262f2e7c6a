use std::sync::Arc;

use actix_web::{test, web, App, HttpResponse};
use mindwhisper::repo::local::LocalRepo;
use mindwhisper::storage::MemoryStore;
use mindwhisper::{config, AppState, SecurityHeaders};

fn state() -> web::Data<AppState> {
    web::Data::new(AppState::local(Arc::new(LocalRepo::new(Arc::new(MemoryStore::new())))))
}

#[actix_web::test]
#[serial_test::serial]
async fn test_security_headers_present() {
    std::env::remove_var("ENABLE_HSTS");
    let app = test::init_service(App::new().wrap(SecurityHeaders::from_env()).app_data(state()).configure(config)).await;
    let req = test::TestRequest::get().uri("/api/v1/journal").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
}

#[actix_web::test]
#[serial_test::serial]
async fn test_env_var_enables_hsts() {
    std::env::set_var("ENABLE_HSTS", "1");
    let app = test::init_service(App::new().wrap(SecurityHeaders::from_env()).app_data(state()).configure(config)).await;
    let req = test::TestRequest::get().uri("/api/v1/session").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert!(resp.headers().get("strict-transport-security").is_some());
    std::env::remove_var("ENABLE_HSTS");
}

#[actix_web::test]
#[serial_test::serial]
async fn test_builder_can_disable_hsts_even_when_env_set() {
    std::env::set_var("ENABLE_HSTS", "true");
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::from_env().with_hsts(false)).app_data(state()).configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/journal").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("strict-transport-security").is_none());
    std::env::remove_var("ENABLE_HSTS");
}

#[actix_web::test]
async fn test_error_responses_carry_headers_too() {
    let app = test::init_service(App::new().wrap(SecurityHeaders::default()).app_data(state()).configure(config)).await;
    let req = test::TestRequest::get().uri("/api/v1/journal/missing").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.headers().get("cache-control").unwrap(), "no-store");
}

#[actix_web::test]
async fn test_existing_headers_preserved_and_no_store_scoped_to_api() {
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::default()).route(
            "/custom",
            web::get().to(|| async {
                HttpResponse::Ok()
                    .insert_header((actix_web::http::header::CONTENT_SECURITY_POLICY, "custom-src 'none'"))
                    .finish()
            }),
        ),
    )
    .await;
    let req = test::TestRequest::get().uri("/custom").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert_eq!(csp, "custom-src 'none'");
    assert!(resp.headers().get("cache-control").is_none());
}
