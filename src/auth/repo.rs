use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("duplicate {0:?}")]
    Duplicate(UniqueField),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Read side of user persistence. Email and username lookups ignore case.
#[async_trait]
pub trait UserReadRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;
}

/// Write side of user persistence.
#[async_trait]
pub trait UserWriteRepository: Send + Sync {
    /// Inserts the user and returns the assigned id. Must reject a duplicate
    /// email, or a duplicate username when one is set, atomically.
    async fn create(&self, user: &NewUser) -> Result<i64, RepoError>;
}

pub trait UserRepository: UserReadRepository + UserWriteRepository {}

impl<T: UserReadRepository + UserWriteRepository> UserRepository for T {}

#[derive(Default)]
struct MemoryInner {
    last_id: i64,
    users: Vec<User>,
}

/// Process-local user store.
#[derive(Default)]
pub struct MemoryUserRepository {
    inner: RwLock<MemoryInner>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts fixtures, returning their ids in order.
    pub async fn seed(&self, users: Vec<NewUser>) -> Result<Vec<i64>, RepoError> {
        let mut ids = Vec::with_capacity(users.len());
        for u in users {
            ids.push(self.create(&u).await?);
        }
        Ok(ids)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }
}

fn same(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[async_trait]
impl UserReadRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| same(&u.email, email)).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.username.as_deref().is_some_and(|n| same(n, username)))
            .cloned())
    }
}

#[async_trait]
impl UserWriteRepository for MemoryUserRepository {
    async fn create(&self, user: &NewUser) -> Result<i64, RepoError> {
        let mut inner = self.inner.write().await;
        for row in &inner.users {
            if same(&row.email, &user.email) {
                return Err(RepoError::Duplicate(UniqueField::Email));
            }
            if let (Some(a), Some(b)) = (row.username.as_deref(), user.username.as_deref()) {
                if same(a, b) {
                    return Err(RepoError::Duplicate(UniqueField::Username));
                }
            }
        }
        inner.last_id += 1;
        let id = inner.last_id;
        inner
            .users
            .push(user.clone().into_user(id, OffsetDateTime::now_utc()));
        debug!(user_id = id, email = %user.email, "memory user created");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user(email: &str, username: Option<&str>) -> NewUser {
        NewUser {
            email: email.into(),
            username: username.map(Into::into),
            ..NewUser::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let repo = MemoryUserRepository::new();
        let a = repo.create(&user("a@es.com", None)).await.unwrap();
        let b = repo.create(&user("b@es.com", None)).await.unwrap();
        assert_eq!((a, b), (1, 2));
        let found = repo.find_by_id(b).await.unwrap().unwrap();
        assert_eq!(found.email, "b@es.com");
    }

    #[tokio::test]
    async fn lookups_ignore_case() {
        let repo = MemoryUserRepository::new();
        repo.create(&user("Victor@ES.com", Some("VictorNM"))).await.unwrap();
        assert!(repo.find_by_email("victor@es.com").await.unwrap().is_some());
        assert!(repo.find_by_username("victornm").await.unwrap().is_some());
        assert!(repo.find_by_username("other").await.unwrap().is_none());
        assert!(repo.find_by_id(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let repo = MemoryUserRepository::new();
        repo.create(&user("a@es.com", Some("alice"))).await.unwrap();

        let err = repo.create(&user("A@es.com", None)).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(UniqueField::Email)));

        let err = repo.create(&user("b@es.com", Some("ALICE"))).await.unwrap_err();
        assert!(matches!(err, RepoError::Duplicate(UniqueField::Username)));

        // users without a username never collide on it
        repo.create(&user("c@es.com", None)).await.unwrap();
        repo.create(&user("d@es.com", None)).await.unwrap();
        assert_eq!(repo.len().await, 3);
    }

    #[tokio::test]
    async fn concurrent_creates_of_one_email_admit_exactly_one() {
        let repo = Arc::new(MemoryUserRepository::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.create(&user("race@es.com", None)).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(repo.len().await, 1);
    }
}
