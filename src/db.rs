use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};

use crate::auth::{
    repo::{RepoError, UniqueField, UserReadRepository, UserWriteRepository},
    repo_types::{NewUser, User},
};

const USER_COLUMNS: &str = "id, email, username, hashed_password, full_name, is_active, \
     is_super_admin, activation_key, provider, created_at";

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;
    info!("migrations applied");
    Ok(db)
}

/// User store backed by the `users` table.
#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_where(&self, predicate: &str, value: &str) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .context("select user")?;
        Ok(user)
    }
}

/// Maps a unique index name from the migrations to the field it guards.
fn unique_field(constraint: Option<&str>) -> Option<UniqueField> {
    match constraint? {
        "users_email_lower_key" => Some(UniqueField::Email),
        "users_username_lower_key" => Some(UniqueField::Username),
        _ => None,
    }
}

#[async_trait]
impl UserReadRepository for PgUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("select user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        self.find_where("lower(email) = lower($1)", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        self.find_where("lower(username) = lower($1)", username).await
    }
}

#[async_trait]
impl UserWriteRepository for PgUserRepository {
    async fn create(&self, user: &NewUser) -> Result<i64, RepoError> {
        let res = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (email, username, hashed_password, full_name, is_active,
                               is_super_admin, activation_key, provider)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.hashed_password)
        .bind(&user.full_name)
        .bind(user.is_active)
        .bind(user.is_super_admin)
        .bind(&user.activation_key)
        .bind(&user.provider)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(id) => {
                debug!(user_id = id, "user row inserted");
                Ok(id)
            }
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23505") => {
                match unique_field(e.constraint()) {
                    Some(field) => Err(RepoError::Duplicate(field)),
                    None => Err(RepoError::Backend(anyhow::anyhow!(e.to_string()))),
                }
            }
            Err(e) => Err(RepoError::Backend(anyhow::Error::new(e).context("insert user"))),
        }
    }
}
