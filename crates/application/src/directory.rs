use async_trait::async_trait;
use domain::{RepositoryError, UserRef};

/// 用户目录端口
///
/// 账号管理属于外部协作方，这里只做只读解析。
/// `find_by_usernames` 必须是一次批量查询，禁止按用户逐条回表。
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRef>, RepositoryError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<UserRef>, RepositoryError>;
    async fn find_by_usernames(&self, usernames: &[String])
        -> Result<Vec<UserRef>, RepositoryError>;
}

/// 内存实现（用于测试）。
pub mod memory {
    use super::*;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemoryUserDirectory {
        users: RwLock<Vec<UserRef>>,
    }

    impl MemoryUserDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert(&self, user: UserRef) {
            self.users.write().await.push(user);
        }
    }

    #[async_trait]
    impl UserDirectory for MemoryUserDirectory {
        async fn find_by_username(
            &self,
            username: &str,
        ) -> Result<Option<UserRef>, RepositoryError> {
            Ok(self
                .users
                .read()
                .await
                .iter()
                .find(|u| u.username == username)
                .cloned())
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<UserRef>, RepositoryError> {
            Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
        }

        async fn find_by_usernames(
            &self,
            usernames: &[String],
        ) -> Result<Vec<UserRef>, RepositoryError> {
            Ok(self
                .users
                .read()
                .await
                .iter()
                .filter(|u| usernames.iter().any(|name| name == &u.username))
                .cloned()
                .collect())
        }
    }
}
