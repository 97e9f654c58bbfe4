use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use tokio_postgres::Error as PgError;
use vibe_lib::users;

use crate::user::User;

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    Email,
    Username,
}

impl UniqueKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniqueKey::Email => "email",
            UniqueKey::Username => "username",
        }
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a record with the same {0} already exists")]
    Conflict(UniqueKey),

    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Pg(#[from] PgError),

    #[error(transparent)]
    Pool(#[from] deadpool_postgres::PoolError),
}

/// selects a single record by one of its unique keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Email(String),
    Username(String),
}

impl Filter {
    /// anything that parses as an email address is looked up by email,
    /// everything else by username
    pub fn from_identifier(identifier: &str) -> Self {
        if users::email_valid(identifier) {
            Filter::Email(identifier.to_owned())
        } else {
            Filter::Username(identifier.to_owned())
        }
    }

    pub fn key(&self) -> UniqueKey {
        match self {
            Filter::Email(_) => UniqueKey::Email,
            Filter::Username(_) => UniqueKey::Username,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Filter::Email(v) | Filter::Username(v) => v.as_str()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        match self {
            Filter::Email(email) => user.email == *email,
            Filter::Username(username) => user.username == *username,
        }
    }
}

/// keyed document store holding user records. `email` and `username` are
/// each unique across all records
pub trait UserStore {
    fn find_one(&self, filter: &Filter) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// fails with `StoreError::Conflict` if either unique key is taken
    fn insert(&self, user: User) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// replaces the record selected by `filter` with `user`
    fn update(&self, filter: &Filter, user: &User) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// writes only `last_login` on the record selected by `filter`
    fn set_last_login(&self, filter: &Filter, at: DateTime<Utc>) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// returns the number of removed records
    fn delete_all(&self, filter: &Filter) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

#[derive(Debug)]
pub enum Store {
    Memory(MemoryStore),
    Postgres(PgStore),
}

impl UserStore for Store {
    async fn find_one(&self, filter: &Filter) -> Result<User, StoreError> {
        match self {
            Store::Memory(store) => store.find_one(filter).await,
            Store::Postgres(store) => store.find_one(filter).await,
        }
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        match self {
            Store::Memory(store) => store.insert(user).await,
            Store::Postgres(store) => store.insert(user).await,
        }
    }

    async fn update(&self, filter: &Filter, user: &User) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.update(filter, user).await,
            Store::Postgres(store) => store.update(filter, user).await,
        }
    }

    async fn set_last_login(&self, filter: &Filter, at: DateTime<Utc>) -> Result<(), StoreError> {
        match self {
            Store::Memory(store) => store.set_last_login(filter, at).await,
            Store::Postgres(store) => store.set_last_login(filter, at).await,
        }
    }

    async fn delete_all(&self, filter: &Filter) -> Result<u64, StoreError> {
        match self {
            Store::Memory(store) => store.delete_all(filter).await,
            Store::Postgres(store) => store.delete_all(filter).await,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_from_identifier() {
        assert_eq!(Filter::from_identifier("a@x.com"), Filter::Email("a@x.com".into()));
        assert_eq!(Filter::from_identifier("alice"), Filter::Username("alice".into()));
        assert_eq!(Filter::from_identifier("alice@"), Filter::Username("alice@".into()));
    }

    #[test]
    fn filter_matches() {
        let user = crate::user::test::alice();

        assert!(Filter::Email("a@x.com".into()).matches(&user));
        assert!(Filter::Username("alice".into()).matches(&user));
        assert!(!Filter::Username("a@x.com".into()).matches(&user));
        assert_eq!(Filter::Email("a@x.com".into()).key(), UniqueKey::Email);
    }
}
