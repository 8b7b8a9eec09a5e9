//! Users repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{contains_pattern, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        page::PageRequest,
        role::role_names,
        user::{NewUser, User, UserChanges, UserQuery, UserRow},
    },
};

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, address, \
                            phone, date_of_birth, roles, active, created_at, updated_at";

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, value: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE {} = LOWER($1)",
            USER_COLUMNS, filter
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn exists(&self, filter: &str, value: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let exists: bool = if let Some(id) = exclude_id {
            sqlx::query_scalar(&format!(
                "SELECT EXISTS(SELECT 1 FROM users WHERE {} = LOWER($1) AND id != $2)",
                filter
            ))
            .bind(value)
            .bind(id)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar(&format!(
                "SELECT EXISTS(SELECT 1 FROM users WHERE {} = LOWER($1))",
                filter
            ))
            .bind(value)
            .fetch_one(&self.pool)
            .await?
        };
        Ok(exists)
    }
}

fn uniqueness_conflict(err: sqlx::Error) -> AppError {
    if err.as_database_error().is_some_and(|db| db.is_unique_violation()) {
        AppError::InvalidArgument("Username or email already in use".to_string())
    } else {
        err.into()
    }
}

#[async_trait]
impl UserStore for UsersRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        self.find_one("LOWER(username)", username).await
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.find_one("LOWER(email)", email).await
    }

    async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        self.exists("LOWER(username)", username, exclude_id).await
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        self.exists("LOWER(email)", email, exclude_id).await
    }

    async fn search(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        let page = PageRequest { page: query.page, per_page: query.per_page };

        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(ref name) = query.name {
            params.push(contains_pattern(name));
            let n = params.len();
            conditions.push(format!(
                "(username ILIKE ${n} ESCAPE '\\' OR email ILIKE ${n} ESCAPE '\\' \
                 OR first_name ILIKE ${n} ESCAPE '\\' OR last_name ILIKE ${n} ESCAPE '\\')"
            ));
        }

        if let Some(role) = query.role {
            params.push(role.as_str().to_string());
            conditions.push(format!("${} = ANY(roles)", params.len()));
        }

        if let Some(active) = query.active {
            conditions.push(format!("active = {}", active));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM users {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            r#"
            SELECT {}
            FROM users
            {}
            ORDER BY username, id
            LIMIT {} OFFSET {}
            "#,
            USER_COLUMNS,
            where_clause,
            page.limit(),
            page.offset()
        );
        let mut select_builder = sqlx::query_as::<_, UserRow>(&select_query);
        for param in &params {
            select_builder = select_builder.bind(param);
        }
        let users = select_builder
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::from)
            .collect();

        Ok((users, total))
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (
                username, email, password_hash, first_name, last_name, address,
                phone, date_of_birth, roles, active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.address)
        .bind(&user.phone)
        .bind(user.date_of_birth)
        .bind(role_names(&user.roles))
        .bind(user.active)
        .fetch_one(&self.pool)
        .await
        .map_err(uniqueness_conflict)?;

        Ok(row.into())
    }

    async fn update(&self, id: i64, changes: &UserChanges) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                first_name = COALESCE($5, first_name),
                last_name = COALESCE($6, last_name),
                address = COALESCE($7, address),
                phone = COALESCE($8, phone),
                date_of_birth = COALESCE($9, date_of_birth),
                roles = COALESCE($10, roles),
                active = COALESCE($11, active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.address)
        .bind(&changes.phone)
        .bind(changes.date_of_birth)
        .bind(changes.roles.as_ref().map(role_names))
        .bind(changes.active)
        .fetch_optional(&self.pool)
        .await
        .map_err(uniqueness_conflict)?;

        Ok(row.map(User::from))
    }
}
