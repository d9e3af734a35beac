// Domain entities, their request drafts and serialized views

pub mod ent_comment;
pub mod ent_friendship;
pub mod ent_like;
pub mod ent_post;
pub mod ent_privacy_settings;
pub mod ent_user;

pub use ent_comment::{Comment, CommentDraft, CommentView, NewComment};
pub use ent_friendship::{FollowOutcome, Friendship, UnfollowOutcome};
pub use ent_like::{Like, LikeDraft, LikeView, ALREADY_LIKED};
pub use ent_post::{NewPost, Post, PostDraft, PostEngagement, PostFilter, PostType, PostView};
pub use ent_privacy_settings::{PrivacyLevel, PrivacySettings, PrivacySettingsUpdate};
pub use ent_user::{
    Credentials, NewUser, RegistrationDraft, Role, User, UserDraft, UserView, VIEW_PRIVATE_POST,
};
