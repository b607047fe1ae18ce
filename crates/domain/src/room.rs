use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// 直接消息房间名的保留前缀。
pub const DM_PREFIX: &str = "dm_";

/// 经过验证的房间名。
///
/// 普通房间名来自客户端路由；直接消息房间名由两个参与者的用户名
/// 按升序拼接而成，同一对用户无论谁发起都会落到同一个房间。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("room_name", "cannot be empty"));
        }
        if value.len() > 255 {
            return Err(DomainError::invalid_argument("room_name", "too long"));
        }
        Ok(Self(value))
    }

    /// 两个参与者之间的规范 DM 房间名：`dm_{min}_{max}`。
    pub fn direct(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{DM_PREFIX}{first}_{second}"))
    }

    pub fn is_dm(&self) -> bool {
        self.0.starts_with(DM_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RoomName> for String {
    fn from(value: RoomName) -> Self {
        value.0
    }
}
