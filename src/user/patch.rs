use chrono::{DateTime, Utc};
use serde::Deserialize;
use vibe_lib::users::{self, Role};
use vibe_lib::sec::password_valid;

use super::{User, Social};

#[derive(Debug, thiserror::Error)]
#[error("invalid value for \"{key}\"")]
pub struct ValidationError {
    pub key: &'static str,
}

impl ValidationError {
    pub fn new(key: &'static str) -> Self {
        ValidationError { key }
    }
}

fn check(key: &'static str, valid: bool) -> Result<(), ValidationError> {
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new(key))
    }
}

/// empty strings are treated as "no change" and are not validated
fn check_text(key: &'static str, given: &Option<String>, valid: fn(&str) -> bool) -> Result<(), ValidationError> {
    match given {
        Some(text) if !text.is_empty() => check(key, valid(text)),
        _ => Ok(())
    }
}

fn overlay_text(target: &mut String, given: &Option<String>) {
    if let Some(text) = given {
        if !text.is_empty() {
            target.clone_from(text);
        }
    }
}

pub fn parse_role(given: &str) -> Result<Role, ValidationError> {
    Role::from_str(given).ok_or(ValidationError::new("role"))
}

/// profile fields shared by registration and partial updates
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub language: Option<String>,
    pub avatar: Option<String>,
    pub short_bio: Option<String>,
    pub long_bio: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub birth: Option<DateTime<Utc>>,
    pub age: Option<i64>,
    pub gender: Option<i64>,
    pub social: Option<Social>,
}

impl Profile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_text("display_name", &self.display_name, users::profile_text_valid)?;
        check_text("given_name", &self.given_name, users::profile_text_valid)?;
        check_text("family_name", &self.family_name, users::profile_text_valid)?;
        check_text("language", &self.language, users::profile_text_valid)?;
        check_text("avatar", &self.avatar, users::profile_text_valid)?;
        check_text("short_bio", &self.short_bio, users::bio_valid)?;
        check_text("long_bio", &self.long_bio, users::bio_valid)?;
        check_text("country", &self.country, users::profile_text_valid)?;
        check_text("phone", &self.phone, users::profile_text_valid)?;

        if let Some(age) = &self.age {
            check("age", users::age_valid(age))?;
        }

        if let Some(gender) = &self.gender {
            check("gender", users::gender_valid(gender))?;
        }

        if let Some(social) = &self.social {
            for (key, value) in social {
                check("social", !key.is_empty() && users::profile_text_valid(key))?;
                check("social", users::profile_text_valid(value))?;
            }
        }

        Ok(())
    }

    /// text fields overlay when non-empty, integral and date fields whenever
    /// present. social entries overlay one by one, empty values are skipped
    fn overlay(&self, user: &mut User) {
        overlay_text(&mut user.display_name, &self.display_name);
        overlay_text(&mut user.given_name, &self.given_name);
        overlay_text(&mut user.family_name, &self.family_name);
        overlay_text(&mut user.language, &self.language);
        overlay_text(&mut user.avatar, &self.avatar);
        overlay_text(&mut user.short_bio, &self.short_bio);
        overlay_text(&mut user.long_bio, &self.long_bio);
        overlay_text(&mut user.country, &self.country);
        overlay_text(&mut user.phone, &self.phone);

        if let Some(birth) = self.birth {
            user.birth = Some(birth);
        }

        if let Some(age) = self.age {
            user.age = age;
        }

        if let Some(gender) = self.gender {
            user.gender = gender;
        }

        if let Some(social) = &self.social {
            for (key, value) in social {
                if !value.is_empty() {
                    user.social.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// a partial update. `None` means the field is absent. the username, the
/// credential pair and the system timestamps cannot be expressed here
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_disabled: Option<bool>,
    #[serde(flatten)]
    pub profile: Profile,
}

impl UserPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_text("email", &self.email, users::email_valid)?;

        if let Some(role) = &self.role {
            if !role.is_empty() {
                parse_role(role)?;
            }
        }

        self.profile.validate()
    }
}

/// overlays `patch` onto a copy of `base`. nothing is produced unless every
/// present field is valid
pub fn merge(base: &User, patch: &UserPatch) -> Result<User, ValidationError> {
    patch.validate()?;

    let mut merged = base.clone();

    overlay_text(&mut merged.email, &patch.email);

    if let Some(role) = &patch.role {
        if !role.is_empty() {
            merged.role = parse_role(role)?;
        }
    }

    if let Some(is_disabled) = patch.is_disabled {
        merged.is_disabled = is_disabled;
    }

    patch.profile.overlay(&mut merged);

    Ok(merged)
}

/// registration input. the plaintext password is dropped once hashed
#[derive(Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: String,
    #[serde(flatten)]
    pub profile: Profile,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl NewUser {
    /// checks the required fields and the profile, returning the parsed role
    pub fn validate(&self) -> Result<Role, ValidationError> {
        check("email", users::email_valid(&self.email))?;
        check("username", users::username_valid(&self.username))?;
        check("password", password_valid(&self.password))?;

        let role = parse_role(&self.role)?;

        self.profile.validate()?;

        Ok(role)
    }

    /// builds the record to insert from the derived credential pair
    pub fn into_user(
        self,
        role: Role,
        encrypted_password: String,
        salt: String,
        now: DateTime<Utc>,
    ) -> User {
        let mut user = User {
            email: self.email,
            username: self.username,
            encrypted_password,
            salt,
            role,
            display_name: String::new(),
            given_name: String::new(),
            family_name: String::new(),
            language: String::new(),
            avatar: String::new(),
            short_bio: String::new(),
            long_bio: String::new(),
            country: String::new(),
            phone: String::new(),
            birth: None,
            age: 0,
            gender: 0,
            social: Social::new(),
            is_disabled: false,
            created_at: now,
            updated_at: now,
            last_login: Some(now),
        };

        self.profile.overlay(&mut user);

        user
    }
}
