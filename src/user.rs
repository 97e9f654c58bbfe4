use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vibe_lib::users::Role;

use crate::sec::authn::token::Identity;

pub mod patch;

pub type Social = BTreeMap<String, String>;

/// the stored user record. the derived credential pair never leaves the
/// process through serialization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub encrypted_password: String,
    #[serde(skip_serializing)]
    pub salt: String,
    pub role: Role,

    pub display_name: String,
    pub given_name: String,
    pub family_name: String,
    pub language: String,
    pub avatar: String,
    pub short_bio: String,
    pub long_bio: String,
    pub country: String,
    pub phone: String,
    pub birth: Option<DateTime<Utc>>,
    pub age: i64,
    pub gender: i64,
    pub social: Social,

    pub is_disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            email: self.email.clone(),
            username: self.username.clone(),
            role: self.role,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub fn alice() -> User {
        let now = Utc::now();

        User {
            email: "a@x.com".into(),
            username: "alice".into(),
            encrypted_password: "AABBCC".into(),
            salt: "DDEEFF".into(),
            role: Role::Member,
            display_name: "Alice".into(),
            given_name: String::new(),
            family_name: "Liddell".into(),
            language: "en".into(),
            avatar: String::new(),
            short_bio: String::new(),
            long_bio: String::new(),
            country: "GB".into(),
            phone: String::new(),
            birth: None,
            age: 30,
            gender: 2,
            social: Social::new(),
            is_disabled: false,
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }

    #[test]
    fn secrets_not_serialized() {
        let json = serde_json::to_value(alice()).expect("failed to serialize user");
        let obj = json.as_object().expect("user is not a json object");

        assert!(!obj.contains_key("encrypted_password"), "hash was serialized");
        assert!(!obj.contains_key("salt"), "salt was serialized");
        assert!(!obj.contains_key("password"), "password was serialized");
        assert_eq!(obj.get("role").and_then(|v| v.as_str()), Some("member"));
        assert_eq!(obj.get("username").and_then(|v| v.as_str()), Some("alice"));
    }

    #[test]
    fn identity_from_user() {
        let identity = alice().identity();

        assert_eq!(identity.email, "a@x.com");
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.role, Role::Member);
    }
}
