//! 统一配置中心
//!
//! 提供中继服务的全局配置管理，包括：
//! - HTTP 监听地址
//! - 数据库连接（可选，缺省时使用内存存储）
//! - JWT认证
//! - Hub 队列与超时
//! - WebSocket 心跳与读写期限
//! - 日志级别
//!
//! 加载顺序：默认值 -> `APP_CONFIG_FILE` 指定的文件 -> 兼容旧部署的环境变量 -> `APP_*` 环境变量。

use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub jwt: JwtConfig,
    #[validate(nested)]
    pub hub: HubConfig,
    #[validate(nested)]
    pub websocket: WebSocketConfig,
    #[validate(nested)]
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// 为空时使用内存存储
    #[validate(length(min = 1))]
    pub url: Option<String>,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 25,
        }
    }
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    #[validate(length(min = 16))]
    pub secret: String,
    #[validate(range(min = 1))]
    pub expiration_hours: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "dev-secret-key-change-me".to_string(),
            expiration_hours: 24,
        }
    }
}

/// Hub 配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HubConfig {
    /// Hub 事件队列容量
    #[validate(range(min = 1))]
    pub event_capacity: usize,
    /// 每个连接的出站队列容量
    #[validate(range(min = 1))]
    pub outbound_capacity: usize,
    /// Hub 对存储的单次调用上限
    #[validate(range(min = 1))]
    pub store_timeout_ms: u64,
    /// 进程关闭的总期限
    #[validate(range(min = 1))]
    pub shutdown_timeout_secs: u64,
}

impl HubConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            outbound_capacity: 256,
            store_timeout_ms: 5_000,
            shutdown_timeout_secs: 15,
        }
    }
}

/// WebSocket 连接配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WebSocketConfig {
    #[validate(range(min = 1))]
    pub ping_interval_secs: u64,
    /// 读期限，必须大于心跳间隔，否则空闲连接会被误判为死亡
    #[validate(range(min = 1))]
    pub read_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub write_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub max_message_bytes: usize,
}

impl WebSocketConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            max_message_bytes: 5120,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    #[validate(length(min = 1))]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// 旧部署使用的环境变量名
const LEGACY_ENV_KEYS: [&str; 5] = [
    "PORT",
    "DATABASE_URL",
    "DB_MAX_CONNECTIONS",
    "JWT_SECRET",
    "LOG_LEVEL",
];

fn legacy_key(key: &str) -> &'static str {
    match key.to_ascii_uppercase().as_str() {
        "PORT" => "server.port",
        "DATABASE_URL" => "database.url",
        "DB_MAX_CONNECTIONS" => "database.max_connections",
        "JWT_SECRET" => "jwt.secret",
        "LOG_LEVEL" => "logging.level",
        _ => "unknown",
    }
}

impl AppConfig {
    /// 构建 figment，单独暴露便于测试
    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(
            Env::raw()
                .only(&LEGACY_ENV_KEYS)
                .map(|key| legacy_key(key.as_str()).into()),
        )
        .merge(Env::prefixed("APP_").split("__"))
    }

    /// 加载并验证配置
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// 脱敏后的配置描述（用于日志）
    pub fn sanitize(&self) -> String {
        let database = match &self.database.url {
            Some(url) => match url.split_once('@') {
                Some((_, host)) => format!("postgres://[REDACTED]@{host}"),
                None => "[REDACTED]".to_string(),
            },
            None => "in-memory".to_string(),
        };
        format!(
            "listen={}:{} database={} hub.outbound_capacity={} log={}",
            self.server.host,
            self.server.port,
            database,
            self.hub.outbound_capacity,
            self.logging.level
        )
    }
}
