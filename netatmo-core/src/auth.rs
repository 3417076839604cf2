//! Access-token lifecycle across independent invocations.
//!
//! Every run ends up with a [`Session`] holding a usable access token: minted
//! from explicit credentials, refreshed from the persisted refresh token, or
//! reused from the config file as-is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{fmt::Debug, path::PathBuf};
use tracing::{debug, info};

use crate::{
    config::{CredentialStore, PersistedConfig, TokenSet},
    error::AuthError,
    model::TokenResponse,
};

/// Scope requested by the password grant.
pub const SCOPE: &str = "read_station";

/// Credentials supplied for a single invocation.
///
/// Not `Serialize`: the login pair never leaves memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl Credential {
    /// Returns a credential only when all four fields are present and non-empty.
    pub fn from_parts(
        client_id: Option<String>,
        client_secret: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Option<Self> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        Some(Self {
            client_id: non_empty(client_id)?,
            client_secret: non_empty(client_secret)?,
            username: non_empty(username)?,
            password: non_empty(password)?,
        })
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// The two OAuth2 exchanges used against the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenGrant {
    Password {
        client_id: String,
        client_secret: String,
        username: String,
        password: String,
    },
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

impl TokenGrant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::Password { .. } => "password",
            TokenGrant::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form fields of the token request.
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        match self {
            TokenGrant::Password {
                client_id,
                client_secret,
                username,
                password,
            } => vec![
                ("grant_type", self.grant_type()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("username", username.as_str()),
                ("password", password.as_str()),
                ("scope", SCOPE),
            ],
            TokenGrant::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => vec![
                ("grant_type", self.grant_type()),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ],
        }
    }
}

impl From<&Credential> for TokenGrant {
    fn from(credential: &Credential) -> Self {
        TokenGrant::Password {
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
            username: credential.username.clone(),
            password: credential.password.clone(),
        }
    }
}

impl Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("grant_type", &self.grant_type())
            .finish_non_exhaustive()
    }
}

/// Whatever hands out tokens for a grant.
#[async_trait]
pub trait TokenIssuer: Send + Sync + Debug {
    async fn request_token(&self, grant: &TokenGrant) -> Result<TokenResponse, AuthError>;
}

/// What this invocation brings along.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub started_at: DateTime<Utc>,
    pub credential: Option<Credential>,
    pub google_api_key: Option<String>,
}

impl Invocation {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            credential: None,
            google_api_key: None,
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_google_api_key(mut self, key: Option<String>) -> Self {
        self.google_api_key = key.filter(|k| !k.is_empty());
        self
    }
}

/// Outcome of inspecting the invocation and the persisted config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    ExplicitMintRequested(Credential),
    NoSession,
    ValidSession(PersistedConfig),
    ExpiredSession(PersistedConfig),
}

impl SessionState {
    /// Decide the state. Explicit credentials win before the file is consulted.
    pub fn decide(
        invocation: &Invocation,
        persisted: impl FnOnce() -> Result<Option<PersistedConfig>, AuthError>,
    ) -> Result<Self, AuthError> {
        if let Some(credential) = &invocation.credential {
            return Ok(SessionState::ExplicitMintRequested(credential.clone()));
        }

        Ok(match persisted()? {
            None => SessionState::NoSession,
            Some(cfg) if cfg.tokens.is_expired(invocation.started_at) => {
                SessionState::ExpiredSession(cfg)
            }
            Some(cfg) => SessionState::ValidSession(cfg),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::ExplicitMintRequested(_) => "explicit-mint",
            SessionState::NoSession => "no-session",
            SessionState::ValidSession(_) => "valid",
            SessionState::ExpiredSession(_) => "expired",
        }
    }
}

/// Working context of one invocation after the token has been settled.
#[derive(Debug, Clone)]
pub struct Session {
    pub started_at: DateTime<Utc>,
    pub config: PersistedConfig,

    /// Path of the config file if this invocation rewrote it.
    pub written_to: Option<PathBuf>,
}

impl Session {
    pub fn access_token(&self) -> &str {
        &self.config.tokens.access_token
    }

    pub fn google_api_key(&self) -> Option<&str> {
        self.config.google_api_key()
    }
}

/// Drives the mint / refresh / reuse decision against a store and an issuer.
#[derive(Debug)]
pub struct SessionManager<'a, I: TokenIssuer + ?Sized> {
    store: &'a CredentialStore,
    issuer: &'a I,
}

impl<'a, I: TokenIssuer + ?Sized> SessionManager<'a, I> {
    pub fn new(store: &'a CredentialStore, issuer: &'a I) -> Self {
        Self { store, issuer }
    }

    /// Make sure a valid access token exists for this invocation.
    pub async fn ensure_session(&self, invocation: &Invocation) -> Result<Session, AuthError> {
        let state = SessionState::decide(invocation, || Ok(self.store.load()?))?;
        debug!(state = state.name(), "session state decided");

        match state {
            SessionState::ExplicitMintRequested(credential) => {
                self.mint(invocation, &credential).await
            }
            SessionState::NoSession => Err(AuthError::MissingCredentials),
            SessionState::ValidSession(mut config) => {
                let key_changed = match &invocation.google_api_key {
                    Some(key) => config.set_google_api_key(key),
                    None => false,
                };
                let written_to = if key_changed {
                    Some(self.store.save(&config)?)
                } else {
                    None
                };
                Ok(Session {
                    started_at: invocation.started_at,
                    config,
                    written_to,
                })
            }
            SessionState::ExpiredSession(config) => self.refresh(invocation, config).await,
        }
    }

    async fn mint(
        &self,
        invocation: &Invocation,
        credential: &Credential,
    ) -> Result<Session, AuthError> {
        info!(client_id = %credential.client_id, "requesting new tokens with password grant");
        let grant = TokenGrant::from(credential);
        let response = self.issuer.request_token(&grant).await?;

        // The previous file only contributes the Google key when none was supplied.
        let google_api_key = match &invocation.google_api_key {
            Some(key) => key.clone(),
            None => self
                .store
                .load()
                .ok()
                .flatten()
                .map(|cfg| cfg.google_api_key)
                .unwrap_or_default(),
        };

        let config = PersistedConfig {
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
            tokens: TokenSet::issued(response, invocation.started_at),
            google_api_key,
        };

        self.persist(invocation, config)
    }

    async fn refresh(
        &self,
        invocation: &Invocation,
        mut config: PersistedConfig,
    ) -> Result<Session, AuthError> {
        info!(end_time = config.tokens.end_time, "access token expired, refreshing");
        let grant = TokenGrant::RefreshToken {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.tokens.refresh_token.clone(),
        };
        let response = self.issuer.request_token(&grant).await?;

        config.tokens = TokenSet::issued(response, invocation.started_at);
        if let Some(key) = &invocation.google_api_key {
            config.set_google_api_key(key);
        }

        self.persist(invocation, config)
    }

    fn persist(
        &self,
        invocation: &Invocation,
        config: PersistedConfig,
    ) -> Result<Session, AuthError> {
        let path = self.store.save(&config)?;
        debug!(end_time = config.tokens.end_time, "tokens stored");

        Ok(Session {
            started_at: invocation.started_at,
            config,
            written_to: Some(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeIssuer {
        grants: Mutex<Vec<TokenGrant>>,
        reject: bool,
    }

    impl FakeIssuer {
        fn rejecting() -> Self {
            Self {
                grants: Mutex::new(Vec::new()),
                reject: true,
            }
        }

        fn grants(&self) -> Vec<TokenGrant> {
            self.grants.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TokenIssuer for FakeIssuer {
        async fn request_token(&self, grant: &TokenGrant) -> Result<TokenResponse, AuthError> {
            self.grants.lock().unwrap().push(grant.clone());
            if self.reject {
                return Err(AuthError::TokenEndpoint(r#"{"error":"invalid_grant"}"#.into()));
            }

            let prefix = grant.grant_type();
            Ok(TokenResponse {
                access_token: format!("{prefix}-access"),
                refresh_token: format!("{prefix}-refresh"),
                scope: vec![SCOPE.to_string()],
                expires_in: 10800,
                expire_in: 10800,
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn credential() -> Credential {
        Credential::from_parts(
            Some("cid".into()),
            Some("csecret".into()),
            Some("me@example.com".into()),
            Some("hunter2".into()),
        )
        .unwrap()
    }

    fn persisted(end_time: i64) -> PersistedConfig {
        PersistedConfig {
            client_id: "stored-cid".into(),
            client_secret: "stored-secret".into(),
            tokens: TokenSet {
                access_token: "stored-access".into(),
                refresh_token: "stored-refresh".into(),
                scope: vec![SCOPE.into()],
                expires_in: 10800,
                expire_in: 10800,
                end_time,
                end_time_date: String::new(),
            },
            google_api_key: "stored-google".into(),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> CredentialStore {
        CredentialStore::resolve(Some(dir.path().into())).unwrap()
    }

    #[test]
    fn credential_requires_all_four_fields() {
        let some = |v: &str| Some(v.to_string());

        assert!(Credential::from_parts(some("a"), some("b"), some("c"), None).is_none());
        assert!(Credential::from_parts(some("a"), some(""), some("c"), some("d")).is_none());
        assert_eq!(credential().client_id, "cid");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let out = format!("{:?} {:?}", credential(), TokenGrant::from(&credential()));
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("csecret"));
    }

    #[test]
    fn grant_forms() {
        let grant = TokenGrant::from(&credential());
        let form = grant.form();
        assert_eq!(
            form,
            vec![
                ("grant_type", "password"),
                ("client_id", "cid"),
                ("client_secret", "csecret"),
                ("username", "me@example.com"),
                ("password", "hunter2"),
                ("scope", "read_station"),
            ]
        );

        let refresh = TokenGrant::RefreshToken {
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            refresh_token: "rt".into(),
        };
        assert_eq!(
            refresh.form(),
            vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", "rt"),
                ("client_id", "cid"),
                ("client_secret", "csecret"),
            ]
        );
    }

    #[test]
    fn explicit_credentials_skip_the_file() {
        let invocation = Invocation::new(now()).with_credential(Some(credential()));
        let state = SessionState::decide(&invocation, || panic!("file must not be consulted"))
            .unwrap();

        assert_eq!(state, SessionState::ExplicitMintRequested(credential()));
    }

    #[tokio::test]
    async fn no_session_without_credentials_fails_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let issuer = FakeIssuer::default();

        let err = SessionManager::new(&store, &issuer)
            .ensure_session(&Invocation::new(now()))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::MissingCredentials));
        assert!(err.to_string().contains("--clientid"));
        assert!(issuer.grants().is_empty());
        assert!(!store.config_file_path().exists());
    }

    #[tokio::test]
    async fn valid_session_makes_no_issuer_calls() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let cfg = persisted(now().timestamp() + 600);
        store.save(&cfg).unwrap();
        let issuer = FakeIssuer::default();

        let session = SessionManager::new(&store, &issuer)
            .ensure_session(&Invocation::new(now()))
            .await
            .unwrap();

        assert!(issuer.grants().is_empty());
        assert_eq!(session.access_token(), "stored-access");
        assert_eq!(session.written_to, None);
        assert_eq!(store.load().unwrap().unwrap(), cfg);
    }

    #[tokio::test]
    async fn valid_session_merges_new_google_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&persisted(now().timestamp() + 600)).unwrap();
        let issuer = FakeIssuer::default();

        let invocation = Invocation::new(now())
            .with_google_api_key(Some("fresh-google".into()));
        let session = SessionManager::new(&store, &issuer)
            .ensure_session(&invocation)
            .await
            .unwrap();

        assert!(issuer.grants().is_empty());
        assert_eq!(session.google_api_key(), Some("fresh-google"));
        assert!(session.written_to.is_some());

        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored.google_api_key, "fresh-google");
        assert_eq!(stored.tokens.access_token, "stored-access");
    }

    #[tokio::test]
    async fn expiry_boundary_triggers_one_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&persisted(now().timestamp() - 1)).unwrap();
        let issuer = FakeIssuer::default();

        let session = SessionManager::new(&store, &issuer)
            .ensure_session(&Invocation::new(now()))
            .await
            .unwrap();

        assert_eq!(
            issuer.grants(),
            vec![TokenGrant::RefreshToken {
                client_id: "stored-cid".into(),
                client_secret: "stored-secret".into(),
                refresh_token: "stored-refresh".into(),
            }]
        );
        assert_eq!(session.access_token(), "refresh_token-access");

        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored.tokens.end_time, now().timestamp() + 10800);
        assert_eq!(stored.tokens.refresh_token, "refresh_token-refresh");
        assert_eq!(stored.client_id, "stored-cid");
        assert_eq!(stored.google_api_key, "stored-google");
    }

    #[tokio::test]
    async fn expiry_equal_to_now_is_still_valid() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&persisted(now().timestamp())).unwrap();
        let issuer = FakeIssuer::default();

        SessionManager::new(&store, &issuer)
            .ensure_session(&Invocation::new(now()))
            .await
            .unwrap();

        assert!(issuer.grants().is_empty());
    }

    #[tokio::test]
    async fn empty_access_token_triggers_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut cfg = persisted(now().timestamp() + 600);
        cfg.tokens.access_token.clear();
        store.save(&cfg).unwrap();
        let issuer = FakeIssuer::default();

        SessionManager::new(&store, &issuer)
            .ensure_session(&Invocation::new(now()))
            .await
            .unwrap();

        assert_eq!(issuer.grants().len(), 1);
        assert_eq!(issuer.grants()[0].grant_type(), "refresh_token");
    }

    #[tokio::test]
    async fn mint_overrides_valid_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&persisted(now().timestamp() + 600)).unwrap();
        let issuer = FakeIssuer::default();

        let invocation = Invocation::new(now()).with_credential(Some(credential()));
        let session = SessionManager::new(&store, &issuer)
            .ensure_session(&invocation)
            .await
            .unwrap();

        assert_eq!(issuer.grants(), vec![TokenGrant::from(&credential())]);
        assert_eq!(session.access_token(), "password-access");

        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored.client_id, "cid");
        assert_eq!(stored.client_secret, "csecret");
        assert_eq!(stored.tokens.end_time, now().timestamp() + 10800);
        // carried over from the previous file
        assert_eq!(stored.google_api_key, "stored-google");

        let raw = std::fs::read_to_string(store.config_file_path()).unwrap();
        assert!(!raw.contains("me@example.com"));
        assert!(!raw.contains("hunter2"));
    }

    #[tokio::test]
    async fn mint_on_first_run_creates_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let issuer = FakeIssuer::default();

        let invocation = Invocation::new(now())
            .with_credential(Some(credential()))
            .with_google_api_key(Some("g".into()));
        let session = SessionManager::new(&store, &issuer)
            .ensure_session(&invocation)
            .await
            .unwrap();

        assert_eq!(session.written_to, Some(store.config_file_path()));
        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored.google_api_key, "g");
        assert_eq!(stored.tokens.scope, vec![SCOPE.to_string()]);
    }

    #[tokio::test]
    async fn revoked_refresh_token_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let cfg = persisted(now().timestamp() - 100);
        store.save(&cfg).unwrap();
        let issuer = FakeIssuer::rejecting();

        let err = SessionManager::new(&store, &issuer)
            .ensure_session(&Invocation::new(now()))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::TokenEndpoint(_)));
        assert!(err.to_string().contains("--password"));
        assert_eq!(issuer.grants().len(), 1);
        assert_eq!(store.load().unwrap().unwrap(), cfg);
    }

    #[tokio::test]
    async fn malformed_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.config_file_path(), "not json").unwrap();
        let issuer = FakeIssuer::default();

        let err = SessionManager::new(&store, &issuer)
            .ensure_session(&Invocation::new(now()))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Config(ConfigError::Parse { .. })));
        assert!(issuer.grants().is_empty());
    }

    #[tokio::test]
    async fn unreadable_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir(store.config_file_path()).unwrap();
        let issuer = FakeIssuer::default();

        let err = SessionManager::new(&store, &issuer)
            .ensure_session(&Invocation::new(now()))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Config(ConfigError::Read { .. })));
        assert!(issuer.grants().is_empty());
    }
}
