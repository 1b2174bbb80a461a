//! Role gating for signed-in users.
use thiserror::Error;

use crate::model::{Role, User, UserStatus};
use crate::validation::{validate_user, ValidationErrors};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no signed-in user")]
    MissingUser,
    #[error("invalid user record: {0}")]
    InvalidUser(#[from] ValidationErrors),
    #[error("user {0} is not verified")]
    NotVerified(String),
    #[error("user {email} lacks {required} permissions")]
    Forbidden { email: String, required: &'static str },
}

/// The record must be well formed and verified.
pub fn validate_user_permissions(user: Option<&User>) -> Result<&User, AuthError> {
    let user = user.ok_or(AuthError::MissingUser)?;
    validate_user(user)?;
    if user.status != UserStatus::Verified {
        return Err(AuthError::NotVerified(user.email.clone()));
    }
    Ok(user)
}

pub fn has_admin_permissions(user: &User) -> bool {
    user.role == Role::Admin && user.status == UserStatus::Verified
}

pub fn has_moderator_permissions(user: &User) -> bool {
    matches!(user.role, Role::Moderator | Role::Admin) && user.status == UserStatus::Verified
}

pub fn require_admin(user: Option<&User>) -> Result<&User, AuthError> {
    let user = validate_user_permissions(user)?;
    if !has_admin_permissions(user) {
        return Err(AuthError::Forbidden {
            email: user.email.clone(),
            required: "admin",
        });
    }
    Ok(user)
}

pub fn require_moderator(user: Option<&User>) -> Result<&User, AuthError> {
    let user = validate_user_permissions(user)?;
    if !has_moderator_permissions(user) {
        return Err(AuthError::Forbidden {
            email: user.email.clone(),
            required: "moderator",
        });
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: Role, status: UserStatus) -> User {
        let now = Utc::now();
        User {
            id: "u1".into(),
            name: "Nadia".into(),
            email: "nadia@example.com".into(),
            phone: "01912345678".into(),
            status,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn admin_needs_role_and_verification() {
        assert!(has_admin_permissions(&user(Role::Admin, UserStatus::Verified)));
        assert!(!has_admin_permissions(&user(Role::Admin, UserStatus::NonVerified)));
        assert!(!has_admin_permissions(&user(Role::Moderator, UserStatus::Verified)));
    }

    #[test]
    fn admins_count_as_moderators() {
        assert!(has_moderator_permissions(&user(Role::Admin, UserStatus::Verified)));
        assert!(has_moderator_permissions(&user(Role::Moderator, UserStatus::Verified)));
        assert!(!has_moderator_permissions(&user(Role::Moderator, UserStatus::NonVerified)));
    }

    #[test]
    fn validate_rejects_missing_invalid_and_unverified() {
        assert!(matches!(validate_user_permissions(None), Err(AuthError::MissingUser)));

        let mut bad = user(Role::Admin, UserStatus::Verified);
        bad.email = "not-an-email".into();
        assert!(matches!(
            validate_user_permissions(Some(&bad)),
            Err(AuthError::InvalidUser(_))
        ));

        let unverified = user(Role::Moderator, UserStatus::NonVerified);
        assert!(matches!(
            validate_user_permissions(Some(&unverified)),
            Err(AuthError::NotVerified(_))
        ));
    }

    #[test]
    fn moderator_cannot_pass_admin_gate() {
        let m = user(Role::Moderator, UserStatus::Verified);
        assert!(require_moderator(Some(&m)).is_ok());
        assert!(matches!(
            require_admin(Some(&m)),
            Err(AuthError::Forbidden { required: "admin", .. })
        ));
    }
}
