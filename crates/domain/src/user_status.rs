//! 在线状态实体

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "online" => Ok(PresenceStatus::Online),
            "offline" => Ok(PresenceStatus::Offline),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown presence status `{other}`"),
            )),
        }
    }
}

/// 用户在线状态的持久化镜像，每个用户最多一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_id: UserId,
    pub status: PresenceStatus,
    pub last_seen: Timestamp,
}

impl UserStatus {
    pub fn new(user_id: UserId, status: PresenceStatus, last_seen: Timestamp) -> Self {
        Self {
            user_id,
            status,
            last_seen,
        }
    }

    /// 从未记录过的用户按离线处理
    pub fn offline(user_id: UserId, now: Timestamp) -> Self {
        Self::new(user_id, PresenceStatus::Offline, now)
    }

    pub fn is_online(&self) -> bool {
        self.status == PresenceStatus::Online
    }
}
