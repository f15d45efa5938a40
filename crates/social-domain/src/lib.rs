mod access;
mod comment;
mod domain_stubs;
mod errors;
mod follow;
mod post;
mod privacy;
mod social_store;
mod timeline_entry;
mod user;

use uuid::Uuid;

pub type UserId = Uuid;
pub type PostId = Uuid;
pub type CommentId = Uuid;
pub type TimelineId = Uuid;

pub use access::can_access;
pub use comment::Comment;
pub use domain_stubs::DomainStubs;
pub use errors::DomainError;
pub use follow::{Follow, FollowGraph};
pub use post::Post;
pub use privacy::{PrivacySettings, PrivacyType};
pub use social_store::{InMemorySocialStore, SocialStore, StoreConnector};
pub use timeline_entry::{InsertOutcome, TimelineEntry};
pub use user::User;
