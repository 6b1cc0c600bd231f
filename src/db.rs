use sqlx::SqlitePool;
use anyhow::Result;
use uuid::Uuid;
use chrono::Utc;
use rand::Rng;
use recordsearch_backend::models::Operator;

/// Generate random password / 生成随机密码
fn generate_random_password(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789!@#$%^&*";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Run database migrations / 运行数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS operators (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            full_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'operator',
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            last_login TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the initial admin account when no operator exists / 初始化管理员账户
pub async fn ensure_default_admin(pool: &SqlitePool) -> Result<()> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM operators")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let admin_password = generate_random_password(16);
    create_operator(pool, "admin", &admin_password, "Administrator", "admin", bcrypt::DEFAULT_COST).await?;

    tracing::warn!("========================================");
    tracing::warn!("Initial admin account created / 已创建初始管理员账户");
    tracing::warn!("Username: admin");
    tracing::warn!("Password: {}", admin_password);
    tracing::warn!("========================================");
    Ok(())
}

/// Insert an operator with a bcrypt hash of `password` / 创建操作员
pub async fn create_operator(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    full_name: &str,
    role: &str,
    cost: u32,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let password_hash = bcrypt::hash(password, cost)?;

    sqlx::query(
        "INSERT INTO operators (id, username, password_hash, full_name, role, enabled, created_at)
         VALUES (?, ?, ?, ?, ?, 1, ?)"
    )
    .bind(&id)
    .bind(username)
    .bind(&password_hash)
    .bind(full_name)
    .bind(role)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn find_enabled_operator(pool: &SqlitePool, username: &str) -> Result<Option<Operator>> {
    let operator = sqlx::query_as::<_, Operator>(
        "SELECT * FROM operators WHERE username = ? AND enabled = 1"
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(operator)
}

pub async fn touch_last_login(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE operators SET last_login = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn test_generate_random_password() {
        let password = generate_random_password(16);
        assert_eq!(password.chars().count(), 16);
        assert!(!password.contains('0') && !password.contains('O'));
    }

    #[tokio::test]
    async fn test_create_and_find_operator() {
        let pool = pool().await;
        let id = create_operator(&pool, "sara", "s3cret", "Sara K", "operator", 4).await.unwrap();
        let op = find_enabled_operator(&pool, "sara").await.unwrap().unwrap();
        assert_eq!(op.id, id);
        assert!(bcrypt::verify("s3cret", &op.password_hash).unwrap());
        assert!(op.last_login.is_none());

        touch_last_login(&pool, &id).await.unwrap();
        let op = find_enabled_operator(&pool, "sara").await.unwrap().unwrap();
        assert!(op.last_login.is_some());

        assert!(find_enabled_operator(&pool, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let pool = pool().await;
        create_operator(&pool, "sara", "a", "Sara", "operator", 4).await.unwrap();
        assert!(create_operator(&pool, "sara", "b", "Sara", "operator", 4).await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_operator_not_found() {
        let pool = pool().await;
        create_operator(&pool, "old", "a", "Old", "operator", 4).await.unwrap();
        sqlx::query("UPDATE operators SET enabled = 0").execute(&pool).await.unwrap();
        assert!(find_enabled_operator(&pool, "old").await.unwrap().is_none());
    }
}
