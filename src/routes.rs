use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::clock::{Clock, SystemClock};
use crate::error::{ApiError, ApiErrorBody};
use crate::models::*;
use crate::profiles::{parse_create_user, ProfileSink};
use crate::repo::Repo;
use crate::session::{Language, SessionHandle, SessionTiming};
use crate::telemetry::{record_home_load, record_mutation, record_profile_request};
use crate::wellness::{load_home, HomeSnapshot, WellnessBackend};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let body = ApiErrorBody { error: err.to_string(), details: None };
        actix_web::error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let body = ApiErrorBody { error: err.to_string(), details: None };
        actix_web::error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    }));

    cfg.service(
        web::scope("/api/v1")
            .service(
                resource("/journal")
                    .route(web::get().to(list_entries))
                    .route(web::post().to(create_entry))
                    .route(web::delete().to(clear_entries)),
            )
            .service(
                resource("/journal/{id}")
                    .route(web::get().to(get_entry))
                    .route(web::patch().to(update_entry))
                    .route(web::delete().to(delete_entry)),
            )
            .service(
                resource("/doctor-chat/messages")
                    .route(web::get().to(list_messages))
                    .route(web::post().to(send_message))
                    .route(web::delete().to(clear_messages)),
            )
            .service(resource("/doctor-chat/history").route(web::put().to(import_history)))
            .service(
                resource("/community/me")
                    .route(web::get().to(current_user))
                    .route(web::put().to(rename_current_user)),
            )
            .service(
                resource("/community/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(resource("/community/posts/{id}").route(web::delete().to(delete_post)))
            .service(resource("/community/posts/{id}/encourage").route(web::post().to(toggle_encouragement)))
            .service(resource("/community/posts/{id}/comments").route(web::post().to(add_comment)))
            .service(
                resource("/community/posts/{id}/comments/{comment_id}").route(web::delete().to(delete_comment)),
            )
            .service(resource("/session").route(web::get().to(session_view)))
            .service(resource("/session/voice-key").route(web::put().to(configure_voice_key)))
            .service(
                resource("/session/listening")
                    .route(web::post().to(start_listening))
                    .route(web::delete().to(stop_listening)),
            )
            .service(resource("/session/mute").route(web::post().to(toggle_mute)))
            .service(resource("/session/language").route(web::put().to(set_language)))
            .service(resource("/session/new").route(web::post().to(new_session)))
            .service(resource("/home/{user_id}").route(web::get().to(home))),
    );
    cfg.service(resource("/create-user").route(web::post().to(create_user)));
    cfg.default_service(web::route().to(not_found));
}

/// A resource whose unmatched methods get a JSON 405.
fn resource(path: &str) -> actix_web::Resource {
    web::resource(path).default_service(web::route().to(method_not_allowed))
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub session: Arc<SessionHandle>,
    pub backend: Option<Arc<dyn WellnessBackend>>,
    pub profiles: Option<Arc<dyn ProfileSink>>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Local-only state: default session timing on wall time, no hosted backend.
    pub fn local(repo: Arc<dyn Repo>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            repo,
            session: Arc::new(SessionHandle::new(SessionTiming::default(), clock.clone())),
            backend: None,
            profiles: None,
            clock,
        }
    }

    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Arc::new(session);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn WellnessBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileSink>) -> Self {
        self.profiles = Some(profiles);
        self
    }
}

// ---------------- Journal ----------------

#[utoipa::path(
    get,
    path = "/api/v1/journal",
    responses((status = 200, description = "Journal entries, newest first", body = [JournalEntry]))
)]
pub async fn list_entries(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_entries().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/journal",
    request_body = NewJournalEntry,
    responses(
        (status = 201, description = "Entry created", body = JournalEntry),
        (status = 400, description = "Empty or over-long title/content")
    )
)]
pub async fn create_entry(data: web::Data<AppState>, payload: web::Json<NewJournalEntry>) -> Result<HttpResponse, ApiError> {
    let entry = data.repo.create_entry(payload.into_inner()).await?;
    record_mutation("journal");
    Ok(HttpResponse::Created().json(entry))
}

#[utoipa::path(
    get,
    path = "/api/v1/journal/{id}",
    params(("id" = String, Path, description = "Entry id")),
    responses(
        (status = 200, description = "Entry", body = JournalEntry),
        (status = 404, description = "Entry not found")
    )
)]
pub async fn get_entry(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.get_entry(&path.into_inner()).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/journal/{id}",
    request_body = JournalUpdate,
    params(("id" = String, Path, description = "Entry id")),
    responses(
        (status = 200, description = "Entry updated", body = JournalEntry),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "Entry not found")
    )
)]
pub async fn update_entry(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<JournalUpdate>,
) -> Result<HttpResponse, ApiError> {
    let entry = data.repo.update_entry(&path.into_inner(), payload.into_inner()).await?;
    record_mutation("journal");
    Ok(HttpResponse::Ok().json(entry))
}

pub async fn delete_entry(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    data.repo.delete_entry(&path.into_inner()).await?;
    record_mutation("journal");
    Ok(HttpResponse::NoContent().finish())
}

pub async fn clear_entries(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.repo.clear_entries().await?;
    record_mutation("journal");
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Doctor chat ----------------

#[utoipa::path(
    get,
    path = "/api/v1/doctor-chat/messages",
    responses((status = 200, description = "Messages, oldest first", body = [ChatMessage]))
)]
pub async fn list_messages(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_messages().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/doctor-chat/messages",
    request_body = NewChatMessage,
    responses(
        (status = 201, description = "Message sent", body = ChatMessage),
        (status = 400, description = "Empty or over-long message")
    )
)]
pub async fn send_message(data: web::Data<AppState>, payload: web::Json<NewChatMessage>) -> Result<HttpResponse, ApiError> {
    let msg = data.repo.send_message(payload.into_inner()).await?;
    record_mutation("doctor_chat");
    Ok(HttpResponse::Created().json(msg))
}

pub async fn clear_messages(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.repo.clear_messages().await?;
    record_mutation("doctor_chat");
    Ok(HttpResponse::NoContent().finish())
}

/// Body is the raw exported history (a JSON array of messages).
pub async fn import_history(data: web::Data<AppState>, body: String) -> Result<HttpResponse, ApiError> {
    let messages = data.repo.import_history(&body).await?;
    record_mutation("doctor_chat");
    Ok(HttpResponse::Ok().json(messages))
}

// ---------------- Community ----------------

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub order: FeedOrder,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedItem {
    #[serde(flatten)]
    post: CommunityPost,
    posted_ago: String,
    encouraged_by_me: bool,
}

pub async fn current_user(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.current_user().await?))
}

pub async fn rename_current_user(data: web::Data<AppState>, payload: web::Json<RenameUser>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.rename_current_user(&payload.name).await?;
    record_mutation("community");
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    get,
    path = "/api/v1/community/posts",
    params(("order" = Option<FeedOrder>, Query, description = "latest (default) or top")),
    responses((status = 200, description = "Community feed", body = [CommunityPost]))
)]
pub async fn list_posts(data: web::Data<AppState>, query: web::Query<FeedQuery>) -> Result<HttpResponse, ApiError> {
    let me = data.repo.current_user().await?;
    let now = data.clock.now();
    let items: Vec<FeedItem> = data
        .repo
        .list_posts(query.order)
        .await?
        .into_iter()
        .map(|post| FeedItem {
            posted_ago: time_ago(post.created_at, now),
            encouraged_by_me: post.encouragements.contains(&me.id),
            post,
        })
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    post,
    path = "/api/v1/community/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = CommunityPost),
        (status = 400, description = "Empty or over-long post")
    )
)]
pub async fn create_post(data: web::Data<AppState>, payload: web::Json<NewPost>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.create_post(payload.into_inner()).await?;
    record_mutation("community");
    Ok(HttpResponse::Created().json(post))
}

pub async fn delete_post(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    data.repo.delete_post(&path.into_inner()).await?;
    record_mutation("community");
    Ok(HttpResponse::NoContent().finish())
}

pub async fn toggle_encouragement(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let me = data.repo.current_user().await?;
    let post = data.repo.toggle_encouragement(&path.into_inner(), &me.id).await?;
    record_mutation("community");
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    post,
    path = "/api/v1/community/posts/{id}/comments",
    request_body = NewComment,
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 201, description = "Comment added", body = CommunityComment),
        (status = 400, description = "Empty comment"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn add_comment(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let comment = data.repo.add_comment(&path.into_inner(), payload.into_inner()).await?;
    record_mutation("community");
    Ok(HttpResponse::Created().json(comment))
}

pub async fn delete_comment(data: web::Data<AppState>, path: web::Path<(String, String)>) -> Result<HttpResponse, ApiError> {
    let (post_id, comment_id) = path.into_inner();
    data.repo.delete_comment(&post_id, &comment_id).await?;
    record_mutation("community");
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Voice session ----------------

#[derive(Debug, Deserialize)]
pub struct VoiceKeyRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    pub language: Language,
}

#[utoipa::path(
    get,
    path = "/api/v1/session",
    responses((status = 200, description = "Current voice session", body = SessionView))
)]
pub async fn session_view(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.session.view())
}

pub async fn configure_voice_key(data: web::Data<AppState>, payload: web::Json<VoiceKeyRequest>) -> Result<HttpResponse, ApiError> {
    let (res, view) = data.session.with(|s, _| s.configure_voice_key(&payload.key));
    res?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn start_listening(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let (res, view) = data.session.with(|s, now| s.start_listening(now));
    res?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn stop_listening(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let (res, view) = data.session.with(|s, now| s.stop_listening(now));
    res?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn toggle_mute(data: web::Data<AppState>) -> HttpResponse {
    let (_, view) = data.session.with(|s, _| s.toggle_mute());
    HttpResponse::Ok().json(view)
}

pub async fn set_language(data: web::Data<AppState>, payload: web::Json<LanguageRequest>) -> HttpResponse {
    let (_, view) = data.session.with(|s, _| s.set_language(payload.language));
    HttpResponse::Ok().json(view)
}

pub async fn new_session(data: web::Data<AppState>) -> HttpResponse {
    let (_, view) = data.session.with(|s, now| s.new_session(now));
    HttpResponse::Ok().json(view)
}

// ---------------- Connected home ----------------

pub async fn home(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let Some(backend) = data.backend.as_ref() else {
        return Ok(HttpResponse::Ok().json(HomeSnapshot::demo(data.clock.now())));
    };
    match load_home(backend.as_ref(), &user_id).await {
        Ok(snapshot) => {
            record_home_load("ok");
            Ok(HttpResponse::Ok().json(snapshot))
        }
        Err(e) => {
            error!(%user_id, "failed to load home data: {e}");
            record_home_load("error");
            Err(ApiError::Upstream { message: format!("Unable to load your session: {e}"), details: None })
        }
    }
}

// ---------------- Profile provisioning ----------------

/// Request shape for `POST /create-user` (documentation only; the handler
/// parses the raw body so malformed JSON gets a structured error).
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateUserBody {
    pub user_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[utoipa::path(
    post,
    path = "/create-user",
    request_body = CreateUserBody,
    responses(
        (status = 201, description = "Profile created; created row under `data`"),
        (status = 400, description = "Invalid JSON body or missing user_id"),
        (status = 500, description = "Server misconfiguration"),
        (status = 502, description = "Backend rejected the insert")
    )
)]
pub async fn create_user(data: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    let profile = parse_create_user(&body).map_err(|e| {
        record_profile_request("invalid");
        ApiError::from(e)
    })?;
    let Some(sink) = data.profiles.as_ref() else {
        error!("create-user called but SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY are not set");
        record_profile_request("misconfigured");
        return Err(ApiError::Misconfigured);
    };
    match sink.insert_profile(&profile).await {
        Ok(created) => {
            info!(user_id = %profile.user_id, "profile created");
            record_profile_request("created");
            Ok(HttpResponse::Created().json(json!({ "data": created })))
        }
        Err(e) => {
            error!(user_id = %profile.user_id, "profile insert failed: {e}");
            record_profile_request("upstream_error");
            let details = e.details().cloned().unwrap_or(Value::Null);
            Err(ApiError::Upstream { message: "Failed to create profile".into(), details: Some(details) })
        }
    }
}

pub async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed)
}

pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    tracing::debug!(path = req.path(), "no route");
    Err(ApiError::NotFound)
}
