use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::model::{Channel, ChatUser, OpenDialogRequest, Post};
use crate::platform::{ChatPlatform, PlatformError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlatformOperation {
    Ping,
    GetUser,
    GetUserByUsername,
    GetDirectChannel,
    CreatePost,
    GetPost,
    UpdatePost,
    DeletePost,
    SendEphemeralPost,
    OpenInteractiveDialog,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EphemeralRecord {
    pub user_id: String,
    pub post: Post,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, ChatUser>,
    posts: HashMap<String, Post>,
    created: Vec<Post>,
    updated: Vec<Post>,
    delete_attempts: Vec<String>,
    ephemerals: Vec<EphemeralRecord>,
    dialogs: Vec<OpenDialogRequest>,
    failures: HashSet<PlatformOperation>,
    unreachable: HashSet<String>,
    calls: usize,
    next_post: u64,
}

/// Chat platform kept entirely in memory. Records every mutation so tests can
/// assert on what a handler did, and can be told to fail any single operation.
#[derive(Default)]
pub struct InMemoryChatPlatform {
    state: Mutex<MemoryState>,
}

/// Direct channels are named after both members, smallest id first.
pub fn direct_channel_id(first_user_id: &str, second_user_id: &str) -> String {
    if first_user_id <= second_user_id {
        format!("{first_user_id}__{second_user_id}")
    } else {
        format!("{second_user_id}__{first_user_id}")
    }
}

impl InMemoryChatPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: &str, username: &str) -> Self {
        self.add_user(id, username);
        self
    }

    pub fn add_user(&self, id: &str, username: &str) {
        self.state()
            .users
            .insert(id.to_owned(), ChatUser { id: id.to_owned(), username: username.to_owned() });
    }

    /// Stores a post directly, bypassing call accounting. Returns the stored
    /// post with its id filled in.
    pub fn insert_post(&self, mut post: Post) -> Post {
        let mut state = self.state();
        if post.id.is_empty() {
            state.next_post += 1;
            post.id = format!("post-{}", state.next_post);
        }
        state.posts.insert(post.id.clone(), post.clone());
        post
    }

    pub fn fail(&self, operation: PlatformOperation) {
        self.state().failures.insert(operation);
    }

    pub fn recover(&self, operation: PlatformOperation) {
        self.state().failures.remove(&operation);
    }

    /// Fails every post created in a direct channel with `user_id`, leaving
    /// other recipients reachable.
    pub fn fail_direct_messages_to(&self, user_id: &str) {
        self.state().unreachable.insert(user_id.to_owned());
    }

    pub fn calls(&self) -> usize {
        self.state().calls
    }

    pub fn post(&self, post_id: &str) -> Option<Post> {
        self.state().posts.get(post_id).cloned()
    }

    pub fn created_posts(&self) -> Vec<Post> {
        self.state().created.clone()
    }

    pub fn updated_posts(&self) -> Vec<Post> {
        self.state().updated.clone()
    }

    pub fn delete_attempts(&self) -> Vec<String> {
        self.state().delete_attempts.clone()
    }

    pub fn ephemerals(&self) -> Vec<EphemeralRecord> {
        self.state().ephemerals.clone()
    }

    pub fn opened_dialogs(&self) -> Vec<OpenDialogRequest> {
        self.state().dialogs.clone()
    }

    /// Posts created in a direct channel with `user_id` by someone else.
    pub fn direct_messages_to(&self, user_id: &str) -> Vec<Post> {
        self.state()
            .created
            .iter()
            .filter(|post| {
                post.user_id != user_id
                    && post.channel_id.split("__").any(|member| member == user_id)
            })
            .cloned()
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, operation: PlatformOperation) -> Result<MutexGuard<'_, MemoryState>, PlatformError> {
        let mut state = self.state();
        state.calls += 1;
        if state.failures.contains(&operation) {
            return Err(PlatformError::Status {
                status: 500,
                message: format!("injected {operation:?} failure"),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl ChatPlatform for InMemoryChatPlatform {
    async fn ping(&self) -> Result<(), PlatformError> {
        self.enter(PlatformOperation::Ping).map(|_| ())
    }

    async fn get_user(&self, user_id: &str) -> Result<ChatUser, PlatformError> {
        let state = self.enter(PlatformOperation::GetUser)?;
        state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("user {user_id}")))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<ChatUser, PlatformError> {
        let state = self.enter(PlatformOperation::GetUserByUsername)?;
        state
            .users
            .values()
            .find(|user| user.username == username)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("username {username}")))
    }

    async fn get_direct_channel(
        &self,
        first_user_id: &str,
        second_user_id: &str,
    ) -> Result<Channel, PlatformError> {
        let id = direct_channel_id(first_user_id, second_user_id);
        self.enter(PlatformOperation::GetDirectChannel)?;
        Ok(Channel { name: id.clone(), id })
    }

    async fn create_post(&self, mut post: Post) -> Result<Post, PlatformError> {
        let mut state = self.enter(PlatformOperation::CreatePost)?;
        let blocked = post
            .channel_id
            .split("__")
            .find(|member| *member != post.user_id && state.unreachable.contains(*member));
        if let Some(recipient) = blocked {
            return Err(PlatformError::Status {
                status: 403,
                message: format!("injected failure for direct message to {recipient}"),
            });
        }
        state.next_post += 1;
        post.id = format!("post-{}", state.next_post);
        state.posts.insert(post.id.clone(), post.clone());
        state.created.push(post.clone());
        Ok(post)
    }

    async fn get_post(&self, post_id: &str) -> Result<Post, PlatformError> {
        let state = self.enter(PlatformOperation::GetPost)?;
        state
            .posts
            .get(post_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("post {post_id}")))
    }

    async fn update_post(&self, post: Post) -> Result<Post, PlatformError> {
        let mut state = self.enter(PlatformOperation::UpdatePost)?;
        if !state.posts.contains_key(&post.id) {
            return Err(PlatformError::NotFound(format!("post {}", post.id)));
        }
        state.posts.insert(post.id.clone(), post.clone());
        state.updated.push(post.clone());
        Ok(post)
    }

    async fn delete_post(&self, post_id: &str) -> Result<(), PlatformError> {
        self.state().delete_attempts.push(post_id.to_owned());
        let mut state = self.enter(PlatformOperation::DeletePost)?;
        state
            .posts
            .remove(post_id)
            .map(|_| ())
            .ok_or_else(|| PlatformError::NotFound(format!("post {post_id}")))
    }

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Result<(), PlatformError> {
        let mut state = self.enter(PlatformOperation::SendEphemeralPost)?;
        state.ephemerals.push(EphemeralRecord { user_id: user_id.to_owned(), post });
        Ok(())
    }

    async fn open_interactive_dialog(
        &self,
        request: OpenDialogRequest,
    ) -> Result<(), PlatformError> {
        let mut state = self.enter(PlatformOperation::OpenInteractiveDialog)?;
        state.dialogs.push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{direct_channel_id, InMemoryChatPlatform, PlatformOperation};
    use crate::model::Post;
    use crate::platform::{ChatPlatform, PlatformError};

    #[tokio::test]
    async fn deleted_posts_are_gone_and_attempts_are_recorded() {
        let platform = InMemoryChatPlatform::new();
        let stored = platform.insert_post(Post::new("hello"));

        platform.delete_post(&stored.id).await.expect("delete");
        assert!(matches!(platform.get_post(&stored.id).await, Err(PlatformError::NotFound(_))));
        assert!(platform.delete_post(&stored.id).await.is_err());
        assert_eq!(platform.delete_attempts(), vec![stored.id.clone(), stored.id]);
    }

    #[tokio::test]
    async fn injected_failures_still_count_calls() {
        let platform = InMemoryChatPlatform::new().with_user("U1", "una");
        platform.fail(PlatformOperation::GetUser);

        assert!(platform.get_user("U1").await.is_err());
        platform.recover(PlatformOperation::GetUser);
        assert_eq!(platform.get_user("U1").await.expect("user").username, "una");
        assert_eq!(platform.calls(), 2);
    }

    #[tokio::test]
    async fn unreachable_recipients_fail_only_their_own_messages() {
        let platform = InMemoryChatPlatform::new();
        platform.fail_direct_messages_to("R1");

        let mut to_reporter = Post::new("hi");
        to_reporter.channel_id = direct_channel_id("BOT", "R1");
        to_reporter.user_id = "BOT".to_owned();
        let mut to_assignee = to_reporter.clone();
        to_assignee.channel_id = direct_channel_id("BOT", "A1");

        assert!(platform.create_post(to_reporter).await.is_err());
        platform.create_post(to_assignee).await.expect("create");
        assert_eq!(platform.direct_messages_to("A1").len(), 1);
        assert!(platform.direct_messages_to("R1").is_empty());
    }

    #[tokio::test]
    async fn direct_messages_are_attributed_to_the_recipient() {
        let platform = InMemoryChatPlatform::new();
        let channel = platform.get_direct_channel("BOT", "R1").await.expect("channel");
        assert_eq!(channel.id, direct_channel_id("R1", "BOT"));

        let mut post = Post::new("hi");
        post.channel_id = channel.id;
        post.user_id = "BOT".to_owned();
        platform.create_post(post).await.expect("create");

        assert_eq!(platform.direct_messages_to("R1").len(), 1);
        assert!(platform.direct_messages_to("BOT").is_empty());
    }
}
