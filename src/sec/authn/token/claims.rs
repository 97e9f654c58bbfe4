use serde::{Serialize, Deserialize};
use vibe_lib::users::Role;

/// the parts of a verified user that a token is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// username of the subject user
    pub iss: String,
    /// audience name supplied by the caller
    pub sub: String,
    /// email of the subject user
    pub aud: String,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    pub jti: String,
    pub role: Role,
}

impl Claims {
    /// builds the claims for an issuance happening at `now`. all values are
    /// unix seconds
    pub fn new(
        identity: &Identity,
        audience: &str,
        now: i64,
        ttl: i64,
        leeway: i64,
    ) -> Self {
        Claims {
            iss: identity.username.clone(),
            sub: audience.to_owned(),
            aud: identity.email.clone(),
            exp: now + ttl + leeway,
            nbf: now - leeway,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            role: identity.role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Header {
    pub alg: String,
    pub typ: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validity_window() {
        let identity = Identity {
            email: "a@x.com".into(),
            username: "alice".into(),
            role: Role::Member,
        };

        let claims = Claims::new(&identity, "session", 1_000, 3600, 60);

        assert_eq!(claims.iss, "alice", "issuer is the username");
        assert_eq!(claims.sub, "session", "subject is the audience name");
        assert_eq!(claims.aud, "a@x.com", "audience is the email");
        assert_eq!(claims.exp, 1_000 + 3600 + 60);
        assert_eq!(claims.nbf, 1_000 - 60);
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.role, Role::Member);
        assert!(uuid::Uuid::parse_str(&claims.jti).is_ok(), "jti is not a uuid");
    }
}
