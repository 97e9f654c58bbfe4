use std::error::Error;
use std::fmt;

use bytes::BytesMut;
use email_address::EmailAddress;
use postgres_types::{to_sql_checked, Type, IsNull, ToSql, FromSql};
use serde::{Serialize, Deserialize};

use crate::validation::{check_charset, check_control_leading_trailing};

pub const MAX_USERNAME_CHARS: usize = 128;
pub const MAX_PROFILE_CHARS: usize = 512;
pub const MAX_BIO_CHARS: usize = 4096;
pub const MAX_AGE: i64 = 200;

pub fn username_valid(given: &str) -> bool {
    !given.is_empty() && check_charset(given, Some(MAX_USERNAME_CHARS), |ch| {
        ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.'
    })
}

pub fn email_valid(given: &str) -> bool {
    EmailAddress::is_valid(given)
}

/// display names, given/family names, language, avatar, country and phone
pub fn profile_text_valid(given: &str) -> bool {
    check_control_leading_trailing(given, Some(MAX_PROFILE_CHARS))
}

pub fn bio_valid(given: &str) -> bool {
    check_control_leading_trailing(given, Some(MAX_BIO_CHARS))
}

pub fn age_valid(given: &i64) -> bool {
    (0..=MAX_AGE).contains(given)
}

pub fn gender_valid(given: &i64) -> bool {
    Gender::from_i64(*given).is_some()
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
    Guest,
    Bot,
    Api,
}

impl Role {
    pub fn from_str(v: &str) -> Option<Self> {
        match v {
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            "guest" => Some(Role::Guest),
            "bot" => Some(Role::Bot),
            "api" => Some(Role::Api),
            _ => None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
            Role::Guest => "guest",
            Role::Bot => "bot",
            Role::Api => "api",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'a> FromSql<'a> for Role {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Role, Box<dyn Error + Sync + Send>> {
        let v = <&str as FromSql>::from_sql(ty, raw)?;

        Role::from_str(v)
            .ok_or("invalid sql value for Role. expecting \"admin\", \"member\", \"guest\", \"bot\" or \"api\"".into())
    }

    fn accepts(ty: &Type) -> bool {
        <&str as FromSql>::accepts(ty)
    }
}

impl ToSql for Role {
    fn to_sql(&self, ty: &Type, w: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        self.as_str().to_sql(ty, w)
    }

    fn accepts(ty: &Type) -> bool {
        <&str as ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Gender {
    Undefined,
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Gender::Undefined),
            1 => Some(Gender::Male),
            2 => Some(Gender::Female),
            3 => Some(Gender::Other),
            _ => None
        }
    }
}
