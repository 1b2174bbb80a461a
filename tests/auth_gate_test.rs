mod common;

use common::setup_pool;
use orderdesk::auth::{self, AuthError};
use orderdesk::db;
use orderdesk::model::{Role, UserStatus};

#[tokio::test]
async fn actor_lookup_gates_desk_tools() {
    let pool = setup_pool().await;
    db::create_user(&pool, "Rafi", "rafi@shop.com", "01922222222", Role::Moderator, UserStatus::NonVerified)
        .await
        .unwrap();
    db::create_user(&pool, "Nadia", "nadia@shop.com", "01911111111", Role::Moderator, UserStatus::Verified)
        .await
        .unwrap();

    let unknown = db::get_user_by_email(&pool, "ghost@shop.com").await.unwrap();
    assert!(matches!(
        auth::require_moderator(unknown.as_ref()),
        Err(AuthError::MissingUser)
    ));

    let pending = db::get_user_by_email(&pool, "rafi@shop.com").await.unwrap();
    assert!(matches!(
        auth::require_moderator(pending.as_ref()),
        Err(AuthError::NotVerified(_))
    ));

    let verified = db::get_user_by_email(&pool, "NADIA@shop.com").await.unwrap();
    let user = auth::require_moderator(verified.as_ref()).unwrap();
    assert_eq!(user.email, "nadia@shop.com");
    assert!(matches!(
        auth::require_admin(verified.as_ref()),
        Err(AuthError::Forbidden { required: "admin", .. })
    ));
}
