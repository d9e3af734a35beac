// Permission gates - pure predicates over the actor and, once fetched, the resource
//
// A policy is an ordered list of gates evaluated short-circuit; the first denial fails the
// request. Request-level checks run before anything is read; object-level checks run only
// after the object has been loaded.

use crate::entities::{PrivacyLevel, Role, VIEW_PRIVATE_POST};
use crate::error::{AppError, AppResult};
use crate::infrastructure::viewer::{ViewerContext, NOT_AUTHENTICATED};

pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

/// Ownership and visibility of a fetched resource. `actor_is_friend` is resolved by the
/// caller so gates stay free of I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAccess {
    pub author_id: i64,
    pub privacy: PrivacyLevel,
    pub actor_is_friend: bool,
}

impl ResourceAccess {
    pub fn owned_by(author_id: i64) -> Self {
        Self {
            author_id,
            privacy: PrivacyLevel::Public,
            actor_is_friend: false,
        }
    }
}

pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    fn has_permission(&self, _vc: &ViewerContext) -> bool {
        true
    }

    fn has_object_permission(&self, _vc: &ViewerContext, _resource: &ResourceAccess) -> bool {
        true
    }
}

pub struct IsAuthenticated;

impl Gate for IsAuthenticated {
    fn name(&self) -> &'static str {
        "is_authenticated"
    }

    fn has_permission(&self, vc: &ViewerContext) -> bool {
        vc.is_authenticated()
    }
}

pub struct IsAdmin;

impl Gate for IsAdmin {
    fn name(&self) -> &'static str {
        "is_admin"
    }

    fn has_permission(&self, vc: &ViewerContext) -> bool {
        vc.role() == Some(Role::Admin)
    }
}

pub struct IsEditorOrAdmin;

impl Gate for IsEditorOrAdmin {
    fn name(&self) -> &'static str {
        "is_editor_or_admin"
    }

    fn has_permission(&self, vc: &ViewerContext) -> bool {
        matches!(vc.role(), Some(Role::Editor | Role::Admin))
    }
}

pub struct IsOwnerOrEditorOrAdmin;

impl Gate for IsOwnerOrEditorOrAdmin {
    fn name(&self) -> &'static str {
        "is_owner_or_editor_or_admin"
    }

    fn has_object_permission(&self, vc: &ViewerContext, resource: &ResourceAccess) -> bool {
        IsEditorOrAdmin.has_permission(vc) || vc.user_id() == Some(resource.author_id)
    }
}

pub struct IsOwnerOrAdmin;

impl Gate for IsOwnerOrAdmin {
    fn name(&self) -> &'static str {
        "is_owner_or_admin"
    }

    fn has_object_permission(&self, vc: &ViewerContext, resource: &ResourceAccess) -> bool {
        IsAdmin.has_permission(vc) || vc.user_id() == Some(resource.author_id)
    }
}

pub struct IsOwnerOrFriend;

impl Gate for IsOwnerOrFriend {
    fn name(&self) -> &'static str {
        "is_owner_or_friend"
    }

    fn has_object_permission(&self, vc: &ViewerContext, resource: &ResourceAccess) -> bool {
        let is_owner = vc.user_id() == Some(resource.author_id);
        match resource.privacy {
            PrivacyLevel::Public => true,
            PrivacyLevel::Friends => is_owner || resource.actor_is_friend,
            PrivacyLevel::Private => is_owner,
        }
    }
}

pub struct CanViewPrivatePost;

impl Gate for CanViewPrivatePost {
    fn name(&self) -> &'static str {
        "can_view_private_post"
    }

    fn has_permission(&self, vc: &ViewerContext) -> bool {
        vc.user
            .as_ref()
            .is_some_and(|user| user.has_permission(VIEW_PRIVATE_POST))
    }
}

pub type Policy = &'static [&'static dyn Gate];

pub const AUTHENTICATED: Policy = &[&IsAuthenticated];
pub const ADMIN_ONLY: Policy = &[&IsAuthenticated, &IsAdmin];
pub const EDITOR_OR_ADMIN: Policy = &[&IsAuthenticated, &IsEditorOrAdmin];
pub const OWNER_OR_EDITOR_OR_ADMIN: Policy = &[&IsAuthenticated, &IsOwnerOrEditorOrAdmin];
pub const OWNER_OR_ADMIN: Policy = &[&IsAuthenticated, &IsOwnerOrAdmin];

fn deny(vc: &ViewerContext, gate: &dyn Gate) -> AppError {
    tracing::debug!(
        request_id = %vc.request_id,
        gate = gate.name(),
        "permission denied"
    );
    if vc.is_authenticated() {
        AppError::Forbidden(PERMISSION_DENIED.to_string())
    } else {
        AppError::Unauthorized(NOT_AUTHENTICATED.to_string())
    }
}

/// Request-level evaluation. Anonymous actors get a 401, authenticated ones a 403.
pub fn check(vc: &ViewerContext, policy: Policy) -> AppResult<()> {
    match policy.iter().find(|gate| !gate.has_permission(vc)) {
        Some(gate) => Err(deny(vc, *gate)),
        None => Ok(()),
    }
}

/// Object-level evaluation against a fetched resource.
pub fn check_object(vc: &ViewerContext, policy: Policy, resource: &ResourceAccess) -> AppResult<()> {
    match policy
        .iter()
        .find(|gate| !gate.has_object_permission(vc, resource))
    {
        Some(gate) => Err(deny(vc, *gate)),
        None => Ok(()),
    }
}

/// Whether a post may appear in the actor's privacy-filtered feed.
pub fn can_view_post(vc: &ViewerContext, resource: &ResourceAccess) -> bool {
    IsOwnerOrFriend.has_object_permission(vc, resource) || CanViewPrivatePost.has_permission(vc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::User;
    use chrono::Utc;

    fn viewer(id: i64, role: Role, permissions: &[&str]) -> ViewerContext {
        ViewerContext::authenticated(
            User {
                id,
                username: format!("user{}", id),
                email: String::new(),
                password_hash: String::new(),
                role,
                groups: vec![role.group_name().to_string()],
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
                created_at: Utc::now(),
            },
            "req-test".to_string(),
        )
    }

    fn anonymous() -> ViewerContext {
        ViewerContext::anonymous("req-anon".to_string())
    }

    #[test]
    fn anonymous_actor_is_unauthenticated_not_forbidden() {
        let err = check(&anonymous(), EDITOR_OR_ADMIN).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn viewer_role_cannot_create_posts() {
        let err = check(&viewer(1, Role::Viewer, &[]), EDITOR_OR_ADMIN).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref msg) if msg == PERMISSION_DENIED));
    }

    #[test]
    fn editors_and_admins_pass_editor_policy() {
        assert!(check(&viewer(1, Role::Editor, &[]), EDITOR_OR_ADMIN).is_ok());
        assert!(check(&viewer(1, Role::Admin, &[]), EDITOR_OR_ADMIN).is_ok());
        assert!(check(&viewer(1, Role::Editor, &[]), ADMIN_ONLY).is_err());
    }

    #[test]
    fn owner_or_staff_may_touch_a_post() {
        let post = ResourceAccess::owned_by(7);
        assert!(check_object(&viewer(7, Role::User, &[]), OWNER_OR_EDITOR_OR_ADMIN, &post).is_ok());
        assert!(check_object(&viewer(8, Role::Editor, &[]), OWNER_OR_EDITOR_OR_ADMIN, &post).is_ok());
        assert!(check_object(&viewer(8, Role::User, &[]), OWNER_OR_EDITOR_OR_ADMIN, &post).is_err());
    }

    #[test]
    fn only_owner_or_admin_may_remove_a_like() {
        let like = ResourceAccess::owned_by(3);
        assert!(check_object(&viewer(3, Role::User, &[]), OWNER_OR_ADMIN, &like).is_ok());
        assert!(check_object(&viewer(4, Role::Admin, &[]), OWNER_OR_ADMIN, &like).is_ok());
        assert!(check_object(&viewer(4, Role::Editor, &[]), OWNER_OR_ADMIN, &like).is_err());
    }

    #[test]
    fn friends_see_friends_only_posts() {
        let mut post = ResourceAccess {
            author_id: 1,
            privacy: PrivacyLevel::Friends,
            actor_is_friend: false,
        };
        let stranger = viewer(2, Role::User, &[]);
        assert!(!IsOwnerOrFriend.has_object_permission(&stranger, &post));

        post.actor_is_friend = true;
        assert!(IsOwnerOrFriend.has_object_permission(&stranger, &post));
    }

    #[test]
    fn private_posts_need_ownership_or_the_grant() {
        let post = ResourceAccess {
            author_id: 1,
            privacy: PrivacyLevel::Private,
            actor_is_friend: true,
        };
        assert!(!can_view_post(&viewer(2, Role::User, &[]), &post));
        assert!(can_view_post(&viewer(1, Role::User, &[]), &post));
        assert!(can_view_post(&viewer(2, Role::User, &[VIEW_PRIVATE_POST]), &post));
    }
}
