use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use vibe_lib::users::Role;
use vibe_lib::sec::password_valid;

use crate::sec::authn::password::{CryptoError, CredentialPair, Hasher};
use crate::sec::authn::token::{Claims, SigningError, TokenError};
use crate::sec::state::Sec;
use crate::storage::{Filter, Store, StoreError, UniqueKey, UserStore};
use crate::user::User;
use crate::user::patch::{self, NewUser, UserPatch, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} is already in use")]
    Duplicate(UniqueKey),

    #[error("user not found")]
    NotFound,

    #[error("authentication failed")]
    Unauthenticated,

    #[error("storage call timed out")]
    Timeout,

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(key) => AccountError::Duplicate(key),
            StoreError::NotFound => AccountError::NotFound,
            err => AccountError::Store(err),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AccountError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AccountError::Timeout
    }
}

/// hashing is cpu and memory heavy so it runs off the async workers
async fn generate(hasher: &Hasher, password: &str) -> Result<CredentialPair, AccountError> {
    let hasher = hasher.clone();
    let password = password.to_owned();

    let pair = tokio::task::spawn_blocking(move || hasher.generate(&password)).await??;

    Ok(pair)
}

async fn verify(hasher: &Hasher, password: &str, user: &User) -> Result<bool, AccountError> {
    let hasher = hasher.clone();
    let password = password.to_owned();
    let salt = user.salt.clone();
    let expected = user.encrypted_password.clone();

    Ok(tokio::task::spawn_blocking(move || hasher.verify(&password, &salt, &expected)).await?)
}

/// user account operations on top of a `UserStore`
#[derive(Debug)]
pub struct AccountService<S = Store> {
    store: S,
    sec: Sec,
    timeout: Duration,
    /// read-modify-write operations and the revocations that follow them
    /// hold this exclusively. issuance holds it shared so a token is never
    /// cached from a record that a concurrent change has replaced
    mutations: RwLock<()>,
}

impl<S> AccountService<S>
where
    S: UserStore
{
    pub fn new(store: S, sec: Sec, timeout: Duration) -> Self {
        AccountService {
            store,
            sec,
            timeout,
            mutations: RwLock::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sec(&self) -> &Sec {
        &self.sec
    }

    /// bounds a storage call by the configured timeout
    async fn timed<F, T>(&self, fut: F) -> Result<T, AccountError>
    where
        F: Future<Output = Result<T, StoreError>>
    {
        Ok(tokio::time::timeout(self.timeout, fut).await??)
    }

    async fn find(&self, filter: &Filter) -> Result<User, AccountError> {
        self.timed(self.store.find_one(filter)).await
    }

    /// writes `user` over the record with the same username and reads it back
    async fn persist(&self, user: &User) -> Result<User, AccountError> {
        let filter = Filter::Username(user.username.clone());

        self.timed(self.store.update(&filter, user)).await?;
        self.find(&filter).await
    }

    pub async fn register(&self, new_user: NewUser) -> Result<User, AccountError> {
        let role = new_user.validate()?;
        let pair = generate(self.sec.hasher(), &new_user.password).await?;

        let user = new_user.into_user(role, pair.hash, pair.salt, Utc::now());
        let username = user.username.clone();

        let created = self.timed(self.store.insert(user)).await
            .inspect_err(|err| {
                if let AccountError::Duplicate(key) = err {
                    tracing::info!(username = %username, "registration rejected. {key} taken");
                }
            })?;

        tracing::info!(username = %created.username, "registered user");

        Ok(created)
    }

    pub async fn get_by_identifier(&self, identifier: &str) -> Result<User, AccountError> {
        self.find(&Filter::from_identifier(identifier)).await
    }

    /// the record if the password matches and the account is enabled
    async fn check_credentials(&self, identifier: &str, password: &str) -> Option<User> {
        let user = match self.get_by_identifier(identifier).await {
            Ok(user) => user,
            Err(err) => {
                tracing::debug!("credential lookup failed: {err}");
                return None;
            }
        };

        if user.is_disabled {
            tracing::debug!(username = %user.username, "account is disabled");
            return None;
        }

        match verify(self.sec.hasher(), password, &user).await {
            Ok(true) => Some(user),
            Ok(false) => {
                tracing::debug!(username = %user.username, "password mismatch");
                None
            },
            Err(err) => {
                tracing::error!("password verification failed: {err}");
                None
            }
        }
    }

    /// true only for an existing, enabled account with a matching password.
    /// the cause of a failure is not reported
    pub async fn authenticate(&self, identifier: &str, password: &str) -> bool {
        let Some(user) = self.check_credentials(identifier, password).await else {
            return false;
        };

        let filter = Filter::Username(user.username.clone());

        if let Err(err) = self.timed(self.store.set_last_login(&filter, Utc::now())).await {
            tracing::warn!(username = %user.username, "failed to record last login: {err}");
        }

        true
    }

    /// authenticates and issues a token for `audience` with the default
    /// signing key and ttl
    pub async fn login(&self, identifier: &str, password: &str, audience: &str) -> Result<String, AccountError> {
        if !self.authenticate(identifier, password).await {
            return Err(AccountError::Unauthenticated);
        }

        self.issue_token(identifier, audience, None).await
    }

    pub async fn issue_token(
        &self,
        identifier: &str,
        audience: &str,
        ttl: Option<chrono::Duration>,
    ) -> Result<String, AccountError> {
        let _guard = self.mutations.read().await;

        let user = self.get_by_identifier(identifier).await?;

        if user.is_disabled {
            return Err(AccountError::Unauthenticated);
        }

        Ok(self.sec.issuer().issue(&user.identity(), audience, None, ttl)?)
    }

    pub fn parse_token(&self, token: &str) -> Result<Claims, AccountError> {
        Ok(self.sec.issuer().parse(token)?)
    }

    /// merges `patch` into the stored record and returns what storage holds
    /// afterwards. cached tokens are dropped when the email, role or status
    /// changes
    pub async fn update_profile(&self, identifier: &str, patch: UserPatch) -> Result<User, AccountError> {
        let _guard = self.mutations.write().await;

        let current = self.get_by_identifier(identifier).await?;
        let mut merged = patch::merge(&current, &patch)?;
        merged.updated_at = Utc::now();

        let updated = self.persist(&merged).await?;

        if updated.email != current.email ||
            updated.role != current.role ||
            updated.is_disabled != current.is_disabled {
            self.sec.issuer().revoke_user(&current.email, &current.username);
        }

        tracing::info!(username = %updated.username, "updated profile");

        Ok(updated)
    }

    /// replaces the credential pair after checking the current password
    pub async fn change_password(&self, identifier: &str, current: &str, new: &str) -> Result<(), AccountError> {
        if !password_valid(new) {
            return Err(ValidationError::new("password").into());
        }

        let Some(checked) = self.check_credentials(identifier, current).await else {
            return Err(AccountError::Unauthenticated);
        };

        let pair = generate(self.sec.hasher(), new).await?;

        let _guard = self.mutations.write().await;

        // the record may have changed while hashing
        let filter = Filter::Username(checked.username);
        let mut user = self.find(&filter).await?;

        if user.is_disabled {
            return Err(AccountError::Unauthenticated);
        }

        user.encrypted_password = pair.hash;
        user.salt = pair.salt;
        user.updated_at = Utc::now();

        self.timed(self.store.update(&filter, &user)).await?;
        self.sec.issuer().revoke_user(&user.email, &user.username);

        tracing::info!(username = %user.username, "changed password");

        Ok(())
    }

    pub async fn set_role(&self, identifier: &str, role: Role) -> Result<User, AccountError> {
        let _guard = self.mutations.write().await;

        let mut user = self.get_by_identifier(identifier).await?;

        if user.role == role {
            return Ok(user);
        }

        user.role = role;
        user.updated_at = Utc::now();

        let updated = self.persist(&user).await?;

        self.sec.issuer().revoke_user(&updated.email, &updated.username);

        tracing::info!(username = %updated.username, "role changed to {role}");

        Ok(updated)
    }

    pub async fn set_disabled(&self, identifier: &str, disabled: bool) -> Result<User, AccountError> {
        let _guard = self.mutations.write().await;

        let mut user = self.get_by_identifier(identifier).await?;

        if user.is_disabled == disabled {
            return Ok(user);
        }

        user.is_disabled = disabled;
        user.updated_at = Utc::now();

        let updated = self.persist(&user).await?;

        self.sec.issuer().revoke_user(&updated.email, &updated.username);

        tracing::info!(username = %updated.username, "disabled set to {disabled}");

        Ok(updated)
    }

    /// removes the record immediately along with its cached tokens
    pub async fn delete(&self, identifier: &str) -> Result<(), AccountError> {
        let _guard = self.mutations.write().await;

        let user = self.get_by_identifier(identifier).await?;
        let filter = Filter::Username(user.username.clone());

        let removed = self.timed(self.store.delete_all(&filter)).await?;

        if removed == 0 {
            return Err(AccountError::NotFound);
        }

        self.sec.issuer().revoke_user(&user.email, &user.username);

        tracing::info!(username = %user.username, "deleted user");

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tokio::sync::oneshot;

    use crate::sec::authn::password::KdfParams;
    use crate::sec::authn::token::{Algorithm, Issuer};
    use crate::storage::MemoryStore;
    use crate::user::patch::Profile;

    use super::*;

    fn sec() -> Sec {
        Sec::new(
            Hasher::new(KdfParams::testing()),
            Issuer::new(
                b"test_signing_key".to_vec(),
                Algorithm::HS256,
                chrono::Duration::seconds(3600),
                chrono::Duration::seconds(60),
                100,
            ),
        )
    }

    fn service() -> AccountService<MemoryStore> {
        AccountService::new(MemoryStore::new(), sec(), Duration::from_secs(5))
    }

    fn alice() -> NewUser {
        NewUser {
            email: "a@x.com".into(),
            username: "alice".into(),
            password: "Secret123".into(),
            role: "member".into(),
            profile: Profile::default(),
        }
    }

    fn given_name(name: &str) -> UserPatch {
        UserPatch {
            profile: Profile {
                given_name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn end_to_end() {
        let service = service();

        let created = service.register(alice()).await.expect("failed to register");

        assert_eq!(created.role, Role::Member);
        assert!(!created.is_disabled, "new user is disabled");
        assert_ne!(created.encrypted_password, "Secret123", "plaintext stored");
        assert_eq!(created.created_at, created.updated_at);
        assert_eq!(created.last_login, Some(created.created_at), "registration did not stamp last login");

        assert!(service.authenticate("alice", "Secret123").await, "valid credentials rejected");
        assert!(!service.authenticate("alice", "wrong").await, "wrong password accepted");
        assert!(service.authenticate("a@x.com", "Secret123").await, "email identifier rejected");

        service.update_profile("alice", given_name("A")).await.expect("failed to update profile");

        let found = service.get_by_identifier("alice").await.expect("failed to find user");

        assert_eq!(found.given_name, "A");
        assert_eq!(found.email, "a@x.com", "email changed");
        assert_eq!(found.created_at, created.created_at, "created_at changed");
        assert!(found.last_login > created.last_login, "last login not recorded");
    }

    #[tokio::test]
    async fn duplicate_registration() {
        let service = service();

        let created = service.register(alice()).await.expect("failed to register");

        let mut second = alice();
        second.email = "other@x.com".into();
        second.password = "Different123".into();

        assert!(matches!(
            service.register(second).await,
            Err(AccountError::Duplicate(UniqueKey::Username))
        ));

        let mut same_email = alice();
        same_email.username = "alice2".into();

        assert!(matches!(
            service.register(same_email).await,
            Err(AccountError::Duplicate(UniqueKey::Email))
        ));

        let stored = service.get_by_identifier("alice").await.expect("failed to find user");

        assert_eq!(stored, created, "failed registration changed the record");
        assert!(service.authenticate("alice", "Secret123").await, "first password no longer works");
    }

    #[tokio::test]
    async fn registration_validation() {
        let service = service();

        let mut bad_role = alice();
        bad_role.role = "superuser".into();

        assert!(matches!(
            service.register(bad_role).await,
            Err(AccountError::Validation(ValidationError { key: "role" }))
        ));

        let mut bad_name = alice();
        bad_name.username = "has space".into();

        assert!(matches!(
            service.register(bad_name).await,
            Err(AccountError::Validation(ValidationError { key: "username" }))
        ));

        assert_eq!(service.store().len().await, 0, "invalid registration stored");
    }

    #[tokio::test]
    async fn invalid_role_update() {
        let service = service();

        service.register(alice()).await.expect("failed to register");

        let before = service.get_by_identifier("alice").await.expect("failed to find user");

        let mut patch = given_name("A");
        patch.role = Some("superuser".into());

        assert!(matches!(
            service.update_profile("alice", patch).await,
            Err(AccountError::Validation(ValidationError { key: "role" }))
        ));

        let after = service.get_by_identifier("alice").await.expect("failed to find user");

        assert_eq!(before, after, "rejected update changed the record");
    }

    #[tokio::test]
    async fn update_missing_user() {
        let service = service();

        assert!(matches!(
            service.update_profile("nobody", given_name("A")).await,
            Err(AccountError::NotFound)
        ));
        assert!(matches!(service.delete("nobody").await, Err(AccountError::NotFound)));
        assert!(!service.authenticate("nobody", "Secret123").await);
    }

    #[tokio::test]
    async fn email_change_conflict() {
        let service = service();

        service.register(alice()).await.expect("failed to register");

        let mut bob = alice();
        bob.email = "b@x.com".into();
        bob.username = "bob".into();

        service.register(bob).await.expect("failed to register");

        let patch = UserPatch {
            email: Some("b@x.com".into()),
            ..Default::default()
        };

        assert!(matches!(
            service.update_profile("alice", patch).await,
            Err(AccountError::Duplicate(UniqueKey::Email))
        ));

        let patch = UserPatch {
            email: Some("alice@y.org".into()),
            ..Default::default()
        };

        let updated = service.update_profile("alice", patch).await.expect("failed to change email");

        assert_eq!(updated.email, "alice@y.org");
        assert!(service.authenticate("alice@y.org", "Secret123").await, "new email rejected");
        assert!(!service.authenticate("a@x.com", "Secret123").await, "old email still accepted");
    }

    #[tokio::test]
    async fn login_tokens() {
        let service = service();

        service.register(alice()).await.expect("failed to register");

        assert!(matches!(
            service.login("alice", "wrong", "session").await,
            Err(AccountError::Unauthenticated)
        ));

        let first = service.login("alice", "Secret123", "session").await.expect("failed to login");
        let second = service.login("alice", "Secret123", "session").await.expect("failed to login");

        assert_eq!(first, second, "same session produced different tokens");

        let claims = service.parse_token(&first).expect("failed to parse token");

        assert_eq!(claims.iss, "alice");
        assert_eq!(claims.aud, "a@x.com");
        assert_eq!(claims.sub, "session");
        assert_eq!(claims.role, Role::Member);

        let updated = service.set_role("alice", Role::Admin).await.expect("failed to set role");

        assert_eq!(updated.role, Role::Admin);

        let third = service.login("alice", "Secret123", "session").await.expect("failed to login");

        assert_ne!(first, third, "role change did not drop cached token");
        assert_eq!(service.parse_token(&third).expect("failed to parse token").role, Role::Admin);

        assert!(matches!(
            service.parse_token("garbage"),
            Err(AccountError::Token(TokenError::Malformed))
        ));
    }

    #[tokio::test]
    async fn disabled_accounts() {
        let service = service();

        service.register(alice()).await.expect("failed to register");

        let token = service.issue_token("alice", "api", Some(chrono::Duration::seconds(600))).await
            .expect("failed to issue token");

        service.set_disabled("alice", true).await.expect("failed to disable");

        assert!(!service.authenticate("alice", "Secret123").await, "disabled account authenticated");
        assert!(matches!(
            service.issue_token("alice", "api", None).await,
            Err(AccountError::Unauthenticated)
        ));

        service.set_disabled("alice", false).await.expect("failed to enable");

        let again = service.issue_token("alice", "api", None).await.expect("failed to issue token");

        assert_ne!(token, again, "token survived disabling");
        assert!(service.authenticate("alice", "Secret123").await, "enabled account rejected");
    }

    #[tokio::test]
    async fn change_password() {
        let service = service();

        service.register(alice()).await.expect("failed to register");

        let token = service.login("alice", "Secret123", "session").await.expect("failed to login");

        assert!(matches!(
            service.change_password("alice", "wrong", "NewSecret456").await,
            Err(AccountError::Unauthenticated)
        ));
        assert!(matches!(
            service.change_password("alice", "Secret123", "short").await,
            Err(AccountError::Validation(ValidationError { key: "password" }))
        ));

        service.change_password("alice", "Secret123", "NewSecret456").await
            .expect("failed to change password");

        assert!(!service.authenticate("alice", "Secret123").await, "old password accepted");
        assert!(service.authenticate("alice", "NewSecret456").await, "new password rejected");

        let after = service.login("alice", "NewSecret456", "session").await.expect("failed to login");

        assert_ne!(token, after, "password change did not drop cached token");
    }

    #[tokio::test]
    async fn delete_user() {
        let service = service();

        service.register(alice()).await.expect("failed to register");
        service.login("alice", "Secret123", "session").await.expect("failed to login");

        service.delete("a@x.com").await.expect("failed to delete");

        assert!(matches!(
            service.get_by_identifier("alice").await,
            Err(AccountError::NotFound)
        ));
        assert_eq!(service.sec().issuer().cache().remove_user("a@x.com", "alice"), 0, "tokens left in cache");

        service.register(alice()).await.expect("failed to register after delete");
    }

    #[tokio::test]
    async fn concurrent_logins_share_token() {
        let service = Arc::new(service());

        service.register(alice()).await.expect("failed to register");

        let mut handles = Vec::new();

        for _ in 0..4 {
            let service = Arc::clone(&service);

            handles.push(tokio::spawn(async move {
                service.login("alice", "Secret123", "session").await
            }));
        }

        let mut tokens = Vec::new();

        for handle in handles {
            tokens.push(handle.await.expect("task panicked").expect("failed to login"));
        }

        for token in &tokens {
            assert_eq!(token, &tokens[0], "concurrent logins produced different tokens");
        }
    }

    struct SlowStore;

    impl UserStore for SlowStore {
        async fn find_one(&self, _filter: &Filter) -> Result<User, StoreError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(StoreError::NotFound)
        }

        async fn insert(&self, user: User) -> Result<User, StoreError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(user)
        }

        async fn update(&self, _filter: &Filter, _user: &User) -> Result<(), StoreError> {
            Ok(())
        }

        async fn set_last_login(&self, _filter: &Filter, _at: chrono::DateTime<Utc>) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_all(&self, _filter: &Filter) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn storage_timeout() {
        let service = AccountService::new(SlowStore, sec(), Duration::from_millis(50));

        assert!(matches!(
            service.get_by_identifier("alice").await,
            Err(AccountError::Timeout)
        ));
        assert!(matches!(service.register(alice()).await, Err(AccountError::Timeout)));
        assert!(!service.authenticate("alice", "Secret123").await, "timed out lookup authenticated");
    }

    struct Gate {
        reached: oneshot::Sender<()>,
        release: oneshot::Receiver<()>,
    }

    /// parks the first lookup after `arm` until the test releases it
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        gate: std::sync::Mutex<Option<Gate>>,
    }

    impl GatedStore {
        fn arm(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (reached_tx, reached_rx) = oneshot::channel();
            let (release_tx, release_rx) = oneshot::channel();

            *self.gate.lock().unwrap() = Some(Gate {
                reached: reached_tx,
                release: release_rx,
            });

            (reached_rx, release_tx)
        }
    }

    impl UserStore for GatedStore {
        async fn find_one(&self, filter: &Filter) -> Result<User, StoreError> {
            let found = self.inner.find_one(filter).await;
            let gate = self.gate.lock().unwrap().take();

            if let Some(gate) = gate {
                let _ = gate.reached.send(());
                let _ = gate.release.await;
            }

            found
        }

        async fn insert(&self, user: User) -> Result<User, StoreError> {
            self.inner.insert(user).await
        }

        async fn update(&self, filter: &Filter, user: &User) -> Result<(), StoreError> {
            self.inner.update(filter, user).await
        }

        async fn set_last_login(&self, filter: &Filter, at: chrono::DateTime<Utc>) -> Result<(), StoreError> {
            self.inner.set_last_login(filter, at).await
        }

        async fn delete_all(&self, filter: &Filter) -> Result<u64, StoreError> {
            self.inner.delete_all(filter).await
        }
    }

    fn gated_service() -> Arc<AccountService<GatedStore>> {
        Arc::new(AccountService::new(GatedStore::default(), sec(), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn login_keeps_concurrent_status_change() {
        let service = gated_service();

        service.register(alice()).await.expect("failed to register");

        let (reached, release) = service.store().arm();

        let login = {
            let service = Arc::clone(&service);

            tokio::spawn(async move {
                service.authenticate("alice", "Secret123").await
            })
        };

        reached.await.expect("lookup never reached");

        service.set_disabled("alice", true).await.expect("failed to disable");

        release.send(()).expect("login task dropped");

        assert!(login.await.expect("task panicked"), "login with a prior lookup failed");

        let stored = service.get_by_identifier("alice").await.expect("failed to find user");

        assert!(stored.is_disabled, "login write re-enabled a disabled account");
        assert!(stored.last_login > Some(stored.updated_at), "last login not recorded");
        assert!(!service.authenticate("alice", "Secret123").await, "disabled account authenticated");
    }

    #[tokio::test]
    async fn role_change_during_issue() {
        let service = gated_service();

        service.register(alice()).await.expect("failed to register");

        let (reached, release) = service.store().arm();

        let issue = {
            let service = Arc::clone(&service);

            tokio::spawn(async move {
                service.issue_token("alice", "session", None).await
            })
        };

        reached.await.expect("lookup never reached");

        let set_role = {
            let service = Arc::clone(&service);

            tokio::spawn(async move {
                service.set_role("alice", Role::Admin).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;

        release.send(()).expect("issue task dropped");

        issue.await.expect("task panicked").expect("failed to issue token");
        set_role.await.expect("task panicked").expect("failed to set role");

        let stored = service.get_by_identifier("alice").await.expect("failed to find user");
        let token = service.login("alice", "Secret123", "session").await.expect("failed to login");
        let claims = service.parse_token(&token).expect("failed to parse token");

        assert_eq!(stored.role, Role::Admin);
        assert_eq!(claims.role, stored.role, "cached token carries a replaced role");
    }
}
