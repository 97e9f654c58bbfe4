use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::user::User;

use super::{Filter, StoreError, UniqueKey, UserStore};

#[derive(Debug, Default)]
struct Records {
    /// username -> record
    users: HashMap<String, User>,
    /// email -> username
    emails: HashMap<String, String>,
}

impl Records {
    fn username_for(&self, filter: &Filter) -> Option<&String> {
        match filter {
            Filter::Username(username) => self.users.get_key_value(username).map(|(k, _)| k),
            Filter::Email(email) => self.emails.get(email),
        }
    }

    fn remove(&mut self, username: &str) -> Option<User> {
        let removed = self.users.remove(username)?;

        self.emails.remove(&removed.email);

        Some(removed)
    }

    fn check_unique(&self, user: &User) -> Result<(), StoreError> {
        if self.users.contains_key(&user.username) {
            return Err(StoreError::Conflict(UniqueKey::Username));
        }

        if self.emails.contains_key(&user.email) {
            return Err(StoreError::Conflict(UniqueKey::Email));
        }

        Ok(())
    }

    fn add(&mut self, user: User) {
        self.emails.insert(user.email.clone(), user.username.clone());
        self.users.insert(user.username.clone(), user);
    }
}

/// process local store. used when no database is configured and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.users.len()
    }
}

impl UserStore for MemoryStore {
    async fn find_one(&self, filter: &Filter) -> Result<User, StoreError> {
        let records = self.records.read().await;

        records.username_for(filter)
            .and_then(|username| records.users.get(username))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        let mut records = self.records.write().await;

        records.check_unique(&user)?;
        records.add(user.clone());

        Ok(user)
    }

    async fn update(&self, filter: &Filter, user: &User) -> Result<(), StoreError> {
        let mut records = self.records.write().await;

        let username = records.username_for(filter)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let Some(previous) = records.remove(&username) else {
            return Err(StoreError::NotFound);
        };

        if let Err(err) = records.check_unique(user) {
            records.add(previous);

            return Err(err);
        }

        records.add(user.clone());

        Ok(())
    }

    async fn set_last_login(&self, filter: &Filter, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut records = self.records.write().await;

        let username = records.username_for(filter)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let user = records.users.get_mut(&username)
            .ok_or(StoreError::NotFound)?;

        user.last_login = Some(at);

        Ok(())
    }

    async fn delete_all(&self, filter: &Filter) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;

        let Some(username) = records.username_for(filter).cloned() else {
            return Ok(0);
        };

        Ok(records.remove(&username).map_or(0, |_| 1))
    }
}
