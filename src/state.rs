use sqlx::SqlitePool;
use recordsearch_backend::config::AppConfig;
use recordsearch_backend::models::AuthUser;
use recordsearch_backend::{InsertService, SchemaRegistry, SearchService, SqliteRecordStore};
use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use chrono::{DateTime, Utc};
use rand::Rng;

/// Login failure records / 登录失败记录
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub fail_count: u32,
    pub last_attempt: DateTime<Utc>,
}

/// Login security state / 登录安全状态
pub struct LoginSecurity {
    /// IP login failure records: IP -> LoginAttempt / IP登录失败记录
    pub ip_attempts: RwLock<HashMap<String, LoginAttempt>>,
}

impl LoginSecurity {
    pub fn new() -> Self {
        Self {
            ip_attempts: RwLock::new(HashMap::new()),
        }
    }

    /// Check if IP is blocked (5 or more failures within 30 minutes) / 检查IP是否被封禁
    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        let attempts = self.ip_attempts.read();
        if let Some(attempt) = attempts.get(ip) {
            if attempt.fail_count >= 5 {
                let elapsed = Utc::now().signed_duration_since(attempt.last_attempt);
                return elapsed.num_minutes() < 30;
            }
        }
        false
    }

    /// Record login failure / 记录登录失败
    pub fn record_failure(&self, ip: &str) {
        let now = Utc::now();
        let mut attempts = self.ip_attempts.write();
        let entry = attempts.entry(ip.to_string()).or_insert(LoginAttempt {
            fail_count: 0,
            last_attempt: now,
        });
        // If over 30 minutes, reset count / 如果超过30分钟
        if now.signed_duration_since(entry.last_attempt).num_minutes() >= 30 {
            entry.fail_count = 0;
        }
        entry.fail_count += 1;
        entry.last_attempt = now;
    }

    /// Login successful, clear failure records / 登录成功
    pub fn clear_failure(&self, ip: &str) {
        self.ip_attempts.write().remove(ip);
    }
}

impl Default for LoginSecurity {
    fn default() -> Self {
        Self::new()
    }
}

/// Signed-in operators, process memory only / 会话（仅内存）
pub struct SessionStore {
    sessions: RwLock<HashMap<String, AuthUser>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session and return its token / 创建会话
    pub fn create(&self, user: AuthUser) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        self.sessions.write().insert(token.clone(), user);
        token
    }

    pub fn get(&self, token: &str) -> Option<AuthUser> {
        self.sessions.read().get(token).cloned()
    }

    pub fn remove(&self, token: &str) -> Option<AuthUser> {
        self.sessions.write().remove(token)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppState {
    pub db: SqlitePool,
    pub registry: Arc<SchemaRegistry>,
    pub search: SearchService,
    pub insert: InsertService,
    pub sessions: SessionStore,
    pub login_security: LoginSecurity,
}

impl AppState {
    /// Build the registry and services over one pool, creating collection tables / 构建应用状态
    pub async fn new(db: SqlitePool, config: &AppConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(SchemaRegistry::from_config(&config.collections)?);

        let store = SqliteRecordStore::new(db.clone(), config.search.max_rows_per_collection);
        for collection in registry.list() {
            store.ensure_collection(collection).await?;
        }
        tracing::info!("{} record collections ready", registry.list().len());

        let store = Arc::new(store);
        Ok(Self {
            db,
            search: SearchService::new(registry.clone(), store.clone(), config.search.scan_timeout()),
            insert: InsertService::new(registry.clone(), store),
            registry,
            sessions: SessionStore::new(),
            login_security: LoginSecurity::new(),
        })
    }
}
