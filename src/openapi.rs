use crate::models::{
    Author, ChatMessage, CommunityComment, CommunityPost, FeedOrder, JournalEntry, JournalUpdate, Mood, NewChatMessage,
    NewComment, NewJournalEntry, NewPost,
};
use crate::session::{Language, Phase, SessionView};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_entries,
        crate::routes::create_entry,
        crate::routes::get_entry,
        crate::routes::update_entry,
        crate::routes::list_messages,
        crate::routes::send_message,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::add_comment,
        crate::routes::session_view,
        crate::routes::create_user,
    ),
    components(schemas(
        Mood, JournalEntry, NewJournalEntry, JournalUpdate,
        Author, ChatMessage, NewChatMessage,
        CommunityPost, CommunityComment, NewPost, NewComment, FeedOrder,
        Phase, Language, SessionView,
        crate::routes::CreateUserBody
    )),
    tags(
        (name = "journal", description = "Private journal"),
        (name = "doctor-chat", description = "Doctor chat transcript"),
        (name = "community", description = "Anonymous support feed"),
        (name = "session", description = "Voice session state"),
    )
)]
pub struct ApiDoc;
