use sqlx::SqlitePool;

use super::models::UserRow;

pub async fn insert_user(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> sqlx::Result<i64> {
    let result = sqlx::query("INSERT INTO users (username, email, password) VALUES (?, ?, ?)")
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn fetch_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, password, is_verified FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

/// Marks every account bound to `email` as verified. Returns the number of rows touched.
pub async fn mark_email_verified(pool: &SqlitePool, email: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("UPDATE users SET is_verified = 1 WHERE email = ?")
        .bind(email)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Replaces the account email and clears its verification flag.
pub async fn update_email(pool: &SqlitePool, username: &str, email: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("UPDATE users SET email = ?, is_verified = 0 WHERE username = ?")
        .bind(email)
        .bind(username)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count_users(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
            .expect("count")
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_rejected() {
        let pool = test_pool().await;
        insert_user(&pool, "alice", "alice@example.com", "hash")
            .await
            .expect("first insert");

        let same_name = insert_user(&pool, "alice", "other@example.com", "hash")
            .await
            .expect_err("duplicate username");
        assert!(is_unique_violation(&same_name));

        let same_email = insert_user(&pool, "bob", "alice@example.com", "hash")
            .await
            .expect_err("duplicate email");
        assert!(is_unique_violation(&same_email));

        assert_eq!(count_users(&pool).await, 1);
    }

    #[tokio::test]
    async fn new_users_start_unverified() {
        let pool = test_pool().await;
        let id = insert_user(&pool, "alice", "alice@example.com", "hash")
            .await
            .expect("insert");

        let user = fetch_user_by_username(&pool, "alice")
            .await
            .expect("query")
            .expect("user exists");
        assert_eq!(user.id, id);
        assert!(!user.is_verified);
    }

    #[tokio::test]
    async fn email_change_resets_verification() {
        let pool = test_pool().await;
        insert_user(&pool, "alice", "alice@example.com", "hash")
            .await
            .expect("insert");
        assert_eq!(
            mark_email_verified(&pool, "alice@example.com").await.expect("verify"),
            1
        );

        update_email(&pool, "alice", "new@example.com")
            .await
            .expect("update");
        let user = fetch_user_by_username(&pool, "alice")
            .await
            .expect("query")
            .expect("user exists");
        assert_eq!(user.email, "new@example.com");
        assert!(!user.is_verified);

        // A stale confirmation for the old address no longer matches anyone.
        assert_eq!(
            mark_email_verified(&pool, "alice@example.com").await.expect("verify"),
            0
        );
    }
}
