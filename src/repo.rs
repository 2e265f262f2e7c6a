use async_trait::async_trait;

use crate::models::*;
use crate::storage::StorageError;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait JournalRepo: Send + Sync {
    /// Newest first.
    async fn list_entries(&self) -> RepoResult<Vec<JournalEntry>>;
    async fn get_entry(&self, id: &str) -> RepoResult<JournalEntry>;
    async fn create_entry(&self, new: NewJournalEntry) -> RepoResult<JournalEntry>;
    async fn update_entry(&self, id: &str, upd: JournalUpdate) -> RepoResult<JournalEntry>;
    async fn delete_entry(&self, id: &str) -> RepoResult<()>;
    async fn clear_entries(&self) -> RepoResult<()>;
}

#[async_trait]
pub trait DoctorChatRepo: Send + Sync {
    /// Oldest first.
    async fn list_messages(&self) -> RepoResult<Vec<ChatMessage>>;
    async fn send_message(&self, new: NewChatMessage) -> RepoResult<ChatMessage>;
    async fn clear_messages(&self) -> RepoResult<()>;
    /// Replace the whole history with `raw`, a JSON array of messages.
    async fn import_history(&self, raw: &str) -> RepoResult<Vec<ChatMessage>>;
}

#[async_trait]
pub trait CommunityRepo: Send + Sync {
    async fn current_user(&self) -> RepoResult<CommunityUser>;
    async fn rename_current_user(&self, name: &str) -> RepoResult<CommunityUser>;
    async fn list_posts(&self, order: FeedOrder) -> RepoResult<Vec<CommunityPost>>;
    async fn get_post(&self, id: &str) -> RepoResult<CommunityPost>;
    async fn create_post(&self, new: NewPost) -> RepoResult<CommunityPost>;
    /// Removes the post together with all of its comments.
    async fn delete_post(&self, id: &str) -> RepoResult<()>;
    async fn toggle_encouragement(&self, post_id: &str, user_id: &str) -> RepoResult<CommunityPost>;
    async fn add_comment(&self, post_id: &str, new: NewComment) -> RepoResult<CommunityComment>;
    async fn delete_comment(&self, post_id: &str, comment_id: &str) -> RepoResult<()>;
    async fn find_comment(&self, comment_id: &str) -> RepoResult<CommunityComment>;
}

pub trait Repo: JournalRepo + DoctorChatRepo + CommunityRepo {}

impl<T> Repo for T where T: JournalRepo + DoctorChatRepo + CommunityRepo {}

/// Key-value backed implementation. Each feature keeps its list in memory and
/// writes the whole list back on every mutation.
pub mod local {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, PoisonError, RwLock};

    use rand::seq::SliceRandom;
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use crate::clock::{Clock, SystemClock};
    use crate::ids::{prefixed_id, timestamped_id};
    use crate::storage::*;

    pub const DEFAULT_PALETTE: [&str; 7] = [
        "#4f46e5", "#16a34a", "#db2777", "#f59e0b", "#0ea5e9", "#ef4444", "#22c55e",
    ];

    /// One feature's persisted collection plus its in-memory copy.
    struct Feature<T> {
        collection: PersistedCollection<T>,
        state: RwLock<Vec<T>>,
    }

    impl<T> Feature<T>
    where
        T: Serialize + DeserializeOwned + HasId + Clone,
    {
        fn open(store: Arc<dyn KeyValueStore>, key: &str) -> Self {
            let collection = PersistedCollection::new(store, key);
            let state = RwLock::new(collection.load());
            Self { collection, state }
        }

        fn snapshot(&self) -> Vec<T> {
            self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Derive the next list from current in-memory state, persist it, and
        /// only then replace in-memory state.
        fn commit<R>(&self, f: impl FnOnce(&[T]) -> RepoResult<(Vec<T>, R)>) -> RepoResult<R> {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let (next, out) = f(&state)?;
            if let Err(e) = self.collection.save(&next) {
                tracing::error!(key = self.collection.key(), "failed to persist collection: {e}");
                return Err(e.into());
            }
            *state = next;
            Ok(out)
        }
    }

    pub struct LocalRepo {
        journal: Feature<JournalEntry>,
        chat: Feature<ChatMessage>,
        posts: Feature<CommunityPost>,
        user: RwLock<CommunityUser>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    }

    impl LocalRepo {
        pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
            Self::with_clock(store, Arc::new(SystemClock))
        }

        pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
            let palette: Vec<String> = DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect();
            Self::with_palette(store, clock, &palette)
        }

        /// `palette` seeds the color of a freshly created community user.
        pub fn with_palette(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, palette: &[String]) -> Self {
            let user = Self::load_or_create_user(store.as_ref(), clock.as_ref(), palette);
            Self {
                journal: Feature::open(store.clone(), JOURNAL_KEY),
                chat: Feature::open(store.clone(), DOCTOR_CHAT_KEY),
                posts: Feature::open(store.clone(), COMMUNITY_POSTS_KEY),
                user: RwLock::new(user),
                store,
                clock,
            }
        }

        fn load_or_create_user(store: &dyn KeyValueStore, clock: &dyn Clock, palette: &[String]) -> CommunityUser {
            if let Ok(Some(raw)) = store.get(COMMUNITY_USER_KEY) {
                match serde_json::from_str::<CommunityUser>(&raw) {
                    Ok(user) => return user,
                    Err(e) => tracing::warn!("malformed community user: {e}. Creating a new one."),
                }
            }
            let color = palette
                .choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_else(|| DEFAULT_PALETTE[0].to_string());
            let user = CommunityUser { id: prefixed_id("user", clock.now()), name: "You".into(), color };
            if let Err(e) = Self::persist_user(store, &user) {
                tracing::error!("failed to persist community user: {e}");
            }
            user
        }

        fn persist_user(store: &dyn KeyValueStore, user: &CommunityUser) -> Result<(), StorageError> {
            store.set(COMMUNITY_USER_KEY, &serde_json::to_string(user)?)
        }

        fn user(&self) -> CommunityUser {
            self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    #[async_trait]
    impl JournalRepo for LocalRepo {
        async fn list_entries(&self) -> RepoResult<Vec<JournalEntry>> {
            let mut v = self.journal.snapshot();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn get_entry(&self, id: &str) -> RepoResult<JournalEntry> {
            self.journal.snapshot().into_iter().find(|e| e.id == id).ok_or(RepoError::NotFound)
        }

        async fn create_entry(&self, new: NewJournalEntry) -> RepoResult<JournalEntry> {
            let (title, content) = new.validate()?;
            let now = self.clock.now();
            let entry = JournalEntry {
                id: timestamped_id(now),
                title,
                content,
                mood: new.mood,
                created_at: now,
                updated_at: now,
            };
            self.journal.commit(|current| {
                let mut next = Vec::with_capacity(current.len() + 1);
                next.push(entry.clone());
                next.extend_from_slice(current);
                Ok((next, entry))
            })
        }

        async fn update_entry(&self, id: &str, upd: JournalUpdate) -> RepoResult<JournalEntry> {
            let title = upd.title.as_deref().map(|t| require_text("title", t, Some(TITLE_MAX_CHARS))).transpose()?;
            let content = upd.content.as_deref().map(|c| require_text("content", c, Some(BODY_MAX_CHARS))).transpose()?;
            let now = self.clock.now();
            self.journal.commit(|current| {
                let mut next = current.to_vec();
                let entry = next.iter_mut().find(|e| e.id == id).ok_or(RepoError::NotFound)?;
                if let Some(title) = title { entry.title = title; }
                if let Some(content) = content { entry.content = content; }
                if let Some(mood) = upd.mood { entry.mood = mood; }
                entry.updated_at = now.max(entry.created_at);
                let updated = entry.clone();
                Ok((next, updated))
            })
        }

        async fn delete_entry(&self, id: &str) -> RepoResult<()> {
            self.journal.commit(|current| {
                if !current.iter().any(|e| e.id == id) {
                    return Err(RepoError::NotFound);
                }
                Ok((current.iter().filter(|e| e.id != id).cloned().collect(), ()))
            })
        }

        async fn clear_entries(&self) -> RepoResult<()> {
            self.journal.commit(|_| Ok((Vec::new(), ())))
        }
    }

    #[async_trait]
    impl DoctorChatRepo for LocalRepo {
        async fn list_messages(&self) -> RepoResult<Vec<ChatMessage>> {
            let mut v = self.chat.snapshot();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at)); // stable: ties keep send order
            Ok(v)
        }

        async fn send_message(&self, new: NewChatMessage) -> RepoResult<ChatMessage> {
            let content = require_text("content", &new.content, Some(BODY_MAX_CHARS))?;
            let now = self.clock.now();
            let msg = ChatMessage { id: timestamped_id(now), author: new.author, content, created_at: now };
            self.chat.commit(|current| {
                let mut next = current.to_vec();
                next.push(msg.clone());
                Ok((next, msg))
            })
        }

        async fn clear_messages(&self) -> RepoResult<()> {
            self.chat.commit(|_| Ok((Vec::new(), ())))
        }

        async fn import_history(&self, raw: &str) -> RepoResult<Vec<ChatMessage>> {
            let history: Vec<ChatMessage> =
                serde_json::from_str(raw).map_err(|_| ValidationError::MalformedHistory)?;
            let mut seen = HashSet::new();
            if let Some(dup) = history.iter().find(|m| !seen.insert(m.id.as_str())) {
                return Err(ValidationError::DuplicateId(dup.id.clone()).into());
            }
            self.chat.commit(|_| Ok((history.clone(), ())))?;
            self.list_messages().await
        }
    }

    #[async_trait]
    impl CommunityRepo for LocalRepo {
        async fn current_user(&self) -> RepoResult<CommunityUser> {
            Ok(self.user())
        }

        async fn rename_current_user(&self, name: &str) -> RepoResult<CommunityUser> {
            let name = require_text("name", name, Some(NAME_MAX_CHARS))?;
            let mut user = self.user.write().unwrap_or_else(PoisonError::into_inner);
            let renamed = CommunityUser { name, ..user.clone() };
            Self::persist_user(self.store.as_ref(), &renamed)?;
            *user = renamed.clone();
            Ok(renamed)
        }

        async fn list_posts(&self, order: FeedOrder) -> RepoResult<Vec<CommunityPost>> {
            let mut v = self.posts.snapshot();
            match order {
                FeedOrder::Latest => v.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
                FeedOrder::Top => v.sort_by(|a, b| {
                    b.encouragements
                        .len()
                        .cmp(&a.encouragements.len())
                        .then_with(|| b.comments.len().cmp(&a.comments.len()))
                }),
            }
            Ok(v)
        }

        async fn get_post(&self, id: &str) -> RepoResult<CommunityPost> {
            self.posts.snapshot().into_iter().find(|p| p.id == id).ok_or(RepoError::NotFound)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<CommunityPost> {
            let content = require_text("content", &new.content, Some(BODY_MAX_CHARS))?;
            let now = self.clock.now();
            let post = CommunityPost {
                id: prefixed_id("post", now),
                author: self.user(),
                content,
                created_at: now,
                encouragements: Vec::new(),
                comments: Vec::new(),
            };
            self.posts.commit(|current| {
                let mut next = Vec::with_capacity(current.len() + 1);
                next.push(post.clone());
                next.extend_from_slice(current);
                Ok((next, post))
            })
        }

        async fn delete_post(&self, id: &str) -> RepoResult<()> {
            self.posts.commit(|current| {
                if !current.iter().any(|p| p.id == id) {
                    return Err(RepoError::NotFound);
                }
                Ok((current.iter().filter(|p| p.id != id).cloned().collect(), ()))
            })
        }

        async fn toggle_encouragement(&self, post_id: &str, user_id: &str) -> RepoResult<CommunityPost> {
            self.posts.commit(|current| {
                let mut next = current.to_vec();
                let post = next.iter_mut().find(|p| p.id == post_id).ok_or(RepoError::NotFound)?;
                post.toggle_encouragement(user_id);
                let updated = post.clone();
                Ok((next, updated))
            })
        }

        async fn add_comment(&self, post_id: &str, new: NewComment) -> RepoResult<CommunityComment> {
            let content = require_text("content", &new.content, None)?;
            let now = self.clock.now();
            let comment = CommunityComment {
                id: prefixed_id("cmt", now),
                post_id: post_id.to_string(),
                author: self.user(),
                content,
                created_at: now,
            };
            self.posts.commit(|current| {
                let mut next = current.to_vec();
                let post = next.iter_mut().find(|p| p.id == post_id).ok_or(RepoError::NotFound)?;
                post.comments.push(comment.clone());
                Ok((next, comment))
            })
        }

        async fn delete_comment(&self, post_id: &str, comment_id: &str) -> RepoResult<()> {
            self.posts.commit(|current| {
                let mut next = current.to_vec();
                let post = next.iter_mut().find(|p| p.id == post_id).ok_or(RepoError::NotFound)?;
                let before = post.comments.len();
                post.comments.retain(|c| c.id != comment_id);
                if post.comments.len() == before {
                    return Err(RepoError::NotFound);
                }
                Ok((next, ()))
            })
        }

        async fn find_comment(&self, comment_id: &str) -> RepoResult<CommunityComment> {
            self.posts
                .snapshot()
                .into_iter()
                .flat_map(|p| p.comments)
                .find(|c| c.id == comment_id)
                .ok_or(RepoError::NotFound)
        }
    }
}
