use chrono::{DateTime, Utc};
use deadpool_postgres::{GenericClient, Pool};
use tokio_postgres::{Error as PgError, Row};

use crate::sql;
use crate::user::{User, Social};

use super::{Filter, StoreError, UniqueKey, UserStore};

/// column order shared by `user_params` and `from_row`
const COLUMNS: [&str; 22] = [
    "email",
    "username",
    "encrypted_password",
    "salt",
    "role",
    "display_name",
    "given_name",
    "family_name",
    "language",
    "avatar",
    "short_bio",
    "long_bio",
    "country",
    "phone",
    "birth",
    "age",
    "gender",
    "social",
    "is_disabled",
    "created_at",
    "updated_at",
    "last_login",
];

const EMAIL_CONSTRAINT: &str = "users_email_key";

fn user_params<'a>(user: &'a User, social: &'a sql::PgJson<&'a Social>) -> sql::ParamsVec<'a> {
    vec![
        &user.email,
        &user.username,
        &user.encrypted_password,
        &user.salt,
        &user.role,
        &user.display_name,
        &user.given_name,
        &user.family_name,
        &user.language,
        &user.avatar,
        &user.short_bio,
        &user.long_bio,
        &user.country,
        &user.phone,
        &user.birth,
        &user.age,
        &user.gender,
        social,
        &user.is_disabled,
        &user.created_at,
        &user.updated_at,
        &user.last_login,
    ]
}

fn from_row(row: &Row) -> User {
    User {
        email: row.get(0),
        username: row.get(1),
        encrypted_password: row.get(2),
        salt: row.get(3),
        role: row.get(4),
        display_name: row.get(5),
        given_name: row.get(6),
        family_name: row.get(7),
        language: row.get(8),
        avatar: row.get(9),
        short_bio: row.get(10),
        long_bio: row.get(11),
        country: row.get(12),
        phone: row.get(13),
        birth: row.get(14),
        age: row.get(15),
        gender: row.get(16),
        social: sql::de_from_sql(row.get(17)),
        is_disabled: row.get(18),
        created_at: row.get(19),
        updated_at: row.get(20),
        last_login: row.get(21),
    }
}

fn select_statement(key: UniqueKey) -> String {
    format!("select {} from users where {} = $1", COLUMNS.join(", "), key.as_str())
}

fn insert_statement() -> String {
    let placeholders: Vec<String> = (1..=COLUMNS.len())
        .map(|index| format!("${index}"))
        .collect();

    format!(
        "insert into users ({}) values ({})",
        COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

fn update_statement(key: UniqueKey, filter_index: usize) -> String {
    let assignments: Vec<String> = COLUMNS.iter()
        .enumerate()
        .map(|(index, column)| format!("{column} = ${}", index + 1))
        .collect();

    format!(
        "update users set {} where {} = ${filter_index}",
        assignments.join(", "),
        key.as_str()
    )
}

fn last_login_statement(key: UniqueKey) -> String {
    format!("update users set last_login = $1 where {} = $2", key.as_str())
}

fn map_pg_error(err: PgError) -> StoreError {
    match sql::unique_constraint_error(&err) {
        Some(EMAIL_CONSTRAINT) => StoreError::Conflict(UniqueKey::Email),
        Some(_) => StoreError::Conflict(UniqueKey::Username),
        None => StoreError::Pg(err)
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        PgStore { pool }
    }

    /// creates the users table if it does not exist
    pub async fn setup(&self) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;

        conn.batch_execute(
            "\
            create table if not exists users ( \
                email text not null constraint users_email_key unique, \
                username text not null constraint users_username_key unique, \
                encrypted_password text not null, \
                salt text not null, \
                role text not null, \
                display_name text not null default '', \
                given_name text not null default '', \
                family_name text not null default '', \
                language text not null default '', \
                avatar text not null default '', \
                short_bio text not null default '', \
                long_bio text not null default '', \
                country text not null default '', \
                phone text not null default '', \
                birth timestamp with time zone, \
                age bigint not null default 0, \
                gender bigint not null default 0, \
                social jsonb not null default '{}', \
                is_disabled boolean not null default false, \
                created_at timestamp with time zone not null, \
                updated_at timestamp with time zone not null, \
                last_login timestamp with time zone \
            )"
        ).await?;

        tracing::debug!("users table ready");

        Ok(())
    }
}

impl UserStore for PgStore {
    async fn find_one(&self, filter: &Filter) -> Result<User, StoreError> {
        let conn = self.pool.get().await?;
        let value = filter.value();

        let statement = select_statement(filter.key());

        let maybe_row = conn.query_opt(statement.as_str(), &[&value]).await?;

        maybe_row.map(|row| from_row(&row))
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        let conn = self.pool.get().await?;
        let social = sql::ser_to_sql(&user.social);
        let params = user_params(&user, &social);

        let statement = insert_statement();

        conn.execute(statement.as_str(), params.as_slice())
            .await
            .map_err(map_pg_error)?;

        Ok(user)
    }

    async fn update(&self, filter: &Filter, user: &User) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let social = sql::ser_to_sql(&user.social);
        let value = filter.value();

        let mut params = user_params(user, &social);
        let filter_index = sql::push_param(&mut params, &value);
        let statement = update_statement(filter.key(), filter_index);

        let updated = conn.execute(statement.as_str(), params.as_slice())
            .await
            .map_err(map_pg_error)?;

        if updated == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }

    async fn set_last_login(&self, filter: &Filter, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        let value = filter.value();

        let statement = last_login_statement(filter.key());

        let updated = conn.execute(statement.as_str(), &[&at, &value]).await?;

        if updated == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }

    async fn delete_all(&self, filter: &Filter) -> Result<u64, StoreError> {
        let conn = self.pool.get().await?;
        let value = filter.value();

        let statement = format!("delete from users where {} = $1", filter.key().as_str());

        let deleted = conn.execute(statement.as_str(), &[&value]).await?;

        Ok(deleted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn statements() {
        assert_eq!(
            select_statement(UniqueKey::Email),
            format!("select {} from users where email = $1", COLUMNS.join(", "))
        );

        let insert = insert_statement();

        assert!(insert.starts_with("insert into users (email, username,"), "insert columns {insert}");
        assert!(insert.ends_with("$21, $22)"), "insert placeholders {insert}");

        let update = update_statement(UniqueKey::Username, COLUMNS.len() + 1);

        assert!(update.starts_with("update users set email = $1, username = $2,"), "update columns {update}");
        assert!(update.ends_with("last_login = $22 where username = $23"), "update filter {update}");

        assert_eq!(
            last_login_statement(UniqueKey::Username),
            "update users set last_login = $1 where username = $2"
        );
    }

    #[test]
    fn params_follow_columns() {
        let user = crate::user::test::alice();
        let social = sql::ser_to_sql(&user.social);

        assert_eq!(user_params(&user, &social).len(), COLUMNS.len());
    }
}
