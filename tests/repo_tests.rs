use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mindwhisper::clock::{Clock, ManualClock};
use mindwhisper::models::*;
use mindwhisper::repo::local::{LocalRepo, DEFAULT_PALETTE};
use mindwhisper::repo::{CommunityRepo, DoctorChatRepo, JournalRepo, RepoError};
use mindwhisper::storage::{
    KeyValueStore, MemoryStore, StorageError, COMMUNITY_POSTS_KEY, COMMUNITY_USER_KEY, DOCTOR_CHAT_KEY, JOURNAL_KEY,
};
use serde_json::json;

fn t0() -> DateTime<Utc> {
    "2024-03-01T09:00:00Z".parse().unwrap()
}

fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, LocalRepo) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let repo = LocalRepo::with_clock(store.clone(), clock.clone());
    (store, clock, repo)
}

fn new_entry(title: &str, content: &str) -> NewJournalEntry {
    NewJournalEntry { title: title.into(), content: content.into(), mood: Mood::Neutral }
}

fn persisted<T: serde::de::DeserializeOwned>(store: &MemoryStore, key: &str) -> Vec<T> {
    serde_json::from_str(&store.get(key).unwrap().unwrap()).unwrap()
}

/// Memory store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded").into());
        }
        self.inner.set(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

#[tokio::test]
async fn journal_create_update_delete_persists_every_step() {
    let (store, clock, repo) = setup();

    let first = repo.create_entry(new_entry("  Morning  ", "Slept well")).await.unwrap();
    assert_eq!(first.title, "Morning");
    assert_eq!(first.created_at, t0());
    assert_eq!(first.updated_at, t0());

    clock.advance(Duration::minutes(1));
    let second = repo.create_entry(new_entry("Evening", "Long day")).await.unwrap();

    let listed = repo.list_entries().await.unwrap();
    assert_eq!(listed.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), [second.id.as_str(), first.id.as_str()]);
    assert_eq!(persisted::<JournalEntry>(&store, JOURNAL_KEY), listed);

    clock.advance(Duration::minutes(10));
    let upd = JournalUpdate { title: None, content: Some("Slept badly".into()), mood: Some(Mood::Negative) };
    let updated = repo.update_entry(&first.id, upd).await.unwrap();
    assert_eq!(updated.title, "Morning");
    assert_eq!(updated.content, "Slept badly");
    assert_eq!(updated.mood, Mood::Negative);
    assert_eq!(updated.created_at, t0());
    assert_eq!(updated.updated_at, t0() + Duration::minutes(11));
    assert_eq!(persisted::<JournalEntry>(&store, JOURNAL_KEY), repo.list_entries().await.unwrap());

    repo.delete_entry(&second.id).await.unwrap();
    assert!(matches!(repo.get_entry(&second.id).await, Err(RepoError::NotFound)));
    assert!(matches!(repo.delete_entry(&second.id).await, Err(RepoError::NotFound)));
    assert_eq!(persisted::<JournalEntry>(&store, JOURNAL_KEY).len(), 1);

    repo.clear_entries().await.unwrap();
    assert!(repo.list_entries().await.unwrap().is_empty());
    assert!(persisted::<JournalEntry>(&store, JOURNAL_KEY).is_empty());
}

#[tokio::test]
async fn journal_rejects_blank_and_oversized_fields() {
    let (store, _clock, repo) = setup();
    assert!(matches!(
        repo.create_entry(new_entry("   ", "text")).await,
        Err(RepoError::Invalid(ValidationError::Empty("title")))
    ));
    assert!(matches!(
        repo.create_entry(new_entry("t", "")).await,
        Err(RepoError::Invalid(ValidationError::Empty("content")))
    ));
    let long_title = "x".repeat(TITLE_MAX_CHARS + 1);
    assert!(matches!(
        repo.create_entry(new_entry(&long_title, "c")).await,
        Err(RepoError::Invalid(ValidationError::TooLong { field: "title", .. }))
    ));
    // multi-byte characters count once each
    let exact = "é".repeat(TITLE_MAX_CHARS);
    assert!(repo.create_entry(new_entry(&exact, "c")).await.is_ok());

    assert_eq!(persisted::<JournalEntry>(&store, JOURNAL_KEY).len(), 1);
}

#[tokio::test]
async fn entries_survive_reopen_and_corruption_starts_empty() {
    let store = Arc::new(MemoryStore::new());
    let repo = LocalRepo::new(store.clone());
    let e = repo.create_entry(new_entry("kept", "yes")).await.unwrap();
    drop(repo);

    let reopened = LocalRepo::new(store.clone());
    assert_eq!(reopened.get_entry(&e.id).await.unwrap().title, "kept");

    store.set(JOURNAL_KEY, "{not json").unwrap();
    let fresh = LocalRepo::new(store.clone());
    assert!(fresh.list_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_save_leaves_state_untouched() {
    let store = Arc::new(FlakyStore::default());
    let repo = LocalRepo::new(store.clone());
    let kept = repo.create_entry(new_entry("before", "ok")).await.unwrap();

    store.failing.store(true, Ordering::SeqCst);
    assert!(matches!(repo.create_entry(new_entry("after", "lost")).await, Err(RepoError::Storage(_))));
    assert!(matches!(repo.delete_entry(&kept.id).await, Err(RepoError::Storage(_))));

    let listed = repo.list_entries().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, kept.id);
}

#[tokio::test]
async fn chat_keeps_send_order_and_imports_history() {
    let (store, clock, repo) = setup();
    let a = repo.send_message(NewChatMessage { author: Author::User, content: "Hi doctor".into() }).await.unwrap();
    clock.advance(Duration::seconds(30));
    let b = repo.send_message(NewChatMessage { author: Author::Doctor, content: " Hello ".into() }).await.unwrap();
    assert_eq!(b.content, "Hello");

    let msgs = repo.list_messages().await.unwrap();
    assert_eq!(msgs.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), [a.id.as_str(), b.id.as_str()]);
    assert_eq!(persisted::<ChatMessage>(&store, DOCTOR_CHAT_KEY), msgs);

    let too_long = "y".repeat(BODY_MAX_CHARS + 1);
    assert!(matches!(
        repo.send_message(NewChatMessage { author: Author::User, content: too_long }).await,
        Err(RepoError::Invalid(ValidationError::TooLong { .. }))
    ));

    let history = r#"[
        {"id":"h2","author":"doctor","content":"later","createdAt":"2024-01-01T10:05:00Z"},
        {"id":"h1","author":"user","content":"earlier","createdAt":"2024-01-01T10:00:00Z"}
    ]"#;
    let imported = repo.import_history(history).await.unwrap();
    assert_eq!(imported.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["h1", "h2"]);
    assert_eq!(repo.list_messages().await.unwrap().len(), 2);

    let dup = r#"[
        {"id":"d","author":"user","content":"a","createdAt":"2024-01-01T10:00:00Z"},
        {"id":"d","author":"user","content":"b","createdAt":"2024-01-01T10:01:00Z"}
    ]"#;
    assert!(matches!(repo.import_history(dup).await, Err(RepoError::Invalid(ValidationError::DuplicateId(id))) if id == "d"));
    assert!(matches!(repo.import_history("{}").await, Err(RepoError::Invalid(ValidationError::MalformedHistory))));
    // failed imports keep the previous transcript
    assert_eq!(repo.list_messages().await.unwrap().len(), 2);

    repo.clear_messages().await.unwrap();
    assert!(repo.list_messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn community_user_is_created_once_and_renamable() {
    let store = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0()));
    let repo = LocalRepo::with_palette(store.clone(), clock.clone(), &["#123456".to_string()]);
    let me = repo.current_user().await.unwrap();
    assert_eq!(me.color, "#123456");
    assert!(me.id.starts_with("user_"));

    let renamed = repo.rename_current_user("  Quiet Owl ").await.unwrap();
    assert_eq!(renamed.name, "Quiet Owl");
    assert_eq!(renamed.id, me.id);
    assert!(matches!(repo.rename_current_user(" ").await, Err(RepoError::Invalid(_))));
    assert!(matches!(
        repo.rename_current_user(&"n".repeat(NAME_MAX_CHARS + 1)).await,
        Err(RepoError::Invalid(ValidationError::TooLong { field: "name", .. }))
    ));

    let raw: CommunityUser = serde_json::from_str(&store.get(COMMUNITY_USER_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(raw, renamed);

    let reopened = LocalRepo::with_clock(store, clock);
    assert_eq!(reopened.current_user().await.unwrap(), renamed);
}

#[tokio::test]
async fn default_palette_colors_new_users() {
    let (_store, _clock, repo) = setup();
    let me = repo.current_user().await.unwrap();
    assert!(DEFAULT_PALETTE.contains(&me.color.as_str()));
}

#[tokio::test]
async fn posts_comments_and_encouragements() {
    let (store, clock, repo) = setup();
    let me = repo.current_user().await.unwrap();

    let older = repo.create_post(NewPost { content: "First share".into() }).await.unwrap();
    clock.advance(Duration::minutes(5));
    let newer = repo.create_post(NewPost { content: "Second share".into() }).await.unwrap();
    assert_eq!(newer.author, me);
    assert!(matches!(repo.create_post(NewPost { content: "  ".into() }).await, Err(RepoError::Invalid(_))));

    let latest = repo.list_posts(FeedOrder::Latest).await.unwrap();
    assert_eq!(latest[0].id, newer.id);

    // encouragement is a set: toggling twice restores the starting set
    let p = repo.toggle_encouragement(&older.id, &me.id).await.unwrap();
    assert_eq!(p.encouragements, vec![me.id.clone()]);
    let p = repo.toggle_encouragement(&older.id, "someone-else").await.unwrap();
    assert_eq!(p.encouragements.len(), 2);
    let p = repo.toggle_encouragement(&older.id, &me.id).await.unwrap();
    assert_eq!(p.encouragements, vec!["someone-else".to_string()]);

    let top = repo.list_posts(FeedOrder::Top).await.unwrap();
    assert_eq!(top[0].id, older.id);

    let c = repo.add_comment(&newer.id, NewComment { content: "You got this".into() }).await.unwrap();
    assert_eq!(c.post_id, newer.id);
    assert_eq!(repo.find_comment(&c.id).await.unwrap().content, "You got this");
    assert!(matches!(
        repo.add_comment("missing", NewComment { content: "hi".into() }).await,
        Err(RepoError::NotFound)
    ));

    let stored: Vec<CommunityPost> = persisted(&store, COMMUNITY_POSTS_KEY);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored.iter().find(|p| p.id == newer.id).unwrap().comments.len(), 1);

    repo.delete_comment(&newer.id, &c.id).await.unwrap();
    assert!(matches!(repo.delete_comment(&newer.id, &c.id).await, Err(RepoError::NotFound)));

    // deleting a post takes its comments with it
    let c2 = repo.add_comment(&newer.id, NewComment { content: "again".into() }).await.unwrap();
    repo.delete_post(&newer.id).await.unwrap();
    assert!(matches!(repo.get_post(&newer.id).await, Err(RepoError::NotFound)));
    assert!(matches!(repo.find_comment(&c2.id).await, Err(RepoError::NotFound)));
    assert!(matches!(repo.delete_post(&newer.id).await, Err(RepoError::NotFound)));
    assert!(matches!(repo.toggle_encouragement(&newer.id, &me.id).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn update_never_stamps_before_creation() {
    let (_store, clock, repo) = setup();
    let entry = repo.create_entry(new_entry("Morning", "Slept well")).await.unwrap();

    // wall clock stepped back after the entry was written
    clock.set(t0() - Duration::hours(1));
    let upd = JournalUpdate { title: None, content: Some("Slept badly".into()), mood: None };
    let updated = repo.update_entry(&entry.id, upd).await.unwrap();
    assert_eq!(updated.content, "Slept badly");
    assert_eq!(updated.updated_at, updated.created_at);
    assert_eq!(updated.created_at, t0());
}

#[tokio::test]
async fn toggle_clears_duplicated_encouragements() {
    let store = Arc::new(MemoryStore::new());
    let seeded = json!([{
        "id": "p1",
        "author": {"id": "x", "name": "You", "color": "#fff"},
        "content": "hi",
        "createdAt": "2024-03-01T09:00:00Z",
        "encouragements": ["u1", "u1"],
        "comments": []
    }]);
    store.set(COMMUNITY_POSTS_KEY, &seeded.to_string()).unwrap();
    let repo = LocalRepo::with_clock(store.clone(), Arc::new(ManualClock::new(t0())));

    let p = repo.toggle_encouragement("p1", "u1").await.unwrap();
    assert!(p.encouragements.is_empty());
    assert!(persisted::<CommunityPost>(&store, COMMUNITY_POSTS_KEY)[0].encouragements.is_empty());

    let p = repo.toggle_encouragement("p1", "u1").await.unwrap();
    assert_eq!(p.encouragements, vec!["u1".to_string()]);
}
