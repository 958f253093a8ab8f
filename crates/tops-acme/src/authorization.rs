use sea_orm::*;
use tops_core::{ApiError, ApiResult, StatusCode};
use tops_entities::cdn_lock;

/// Fails with 403 when another user holds a hard lock on any of `cdns`.
/// Soft locks and the caller's own locks never block.
pub async fn check_cdn_locks<C: ConnectionTrait>(
    db: &C,
    username: &str,
    cdns: &[&str],
) -> ApiResult<()> {
    if cdns.is_empty() {
        return Ok(());
    }
    let blocking = cdn_lock::Entity::find()
        .filter(cdn_lock::Column::Cdn.is_in(cdns.iter().copied()))
        .filter(cdn_lock::Column::Soft.eq(false))
        .filter(cdn_lock::Column::Username.ne(username))
        .one(db)
        .await
        .map_err(|e| ApiError::system(e.to_string()))?;

    match blocking {
        Some(lock) => Err(ApiError::user(
            StatusCode::FORBIDDEN,
            format!(
                "user {} currently has a hard lock on cdn {}",
                lock.username, lock.cdn
            ),
        )),
        None => Ok(()),
    }
}
