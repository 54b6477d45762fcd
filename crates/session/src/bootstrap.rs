//! Startup routing.
//!
//! Resolution order: stored token, online profile check when the backend
//! is reachable, cached session as the offline fallback. Every failure
//! settles on a route; the host never sees an error.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use fleetops_live_connection::credentials::{AUTH_TOKEN_KEY, CredentialStore, sanitize_token};

use crate::cache::{CachedSession, SessionCache};
use crate::error::SessionError;
use crate::profile::{PROFILE_TIMEOUT, Profile, ProfileApi};
use crate::reachability::Reachability;

/// Where the app starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Main screen. `offline` is set when admitted from the cached session.
    AuthenticatedActive { offline: bool },
    /// Account exists but is not approved yet.
    PendingApproval,
    /// Login screen.
    Unauthenticated,
}

/// Resolves the startup [`Route`] from injected collaborators.
pub struct SessionBootstrap {
    credentials: Arc<dyn CredentialStore>,
    online: Option<OnlineCheck>,
    cache: Arc<dyn SessionCache>,
    profile_timeout: Duration,
}

struct OnlineCheck {
    reachability: Arc<dyn Reachability>,
    profile_api: Arc<dyn ProfileApi>,
}

impl SessionBootstrap {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        reachability: Arc<dyn Reachability>,
        profile_api: Arc<dyn ProfileApi>,
        cache: Arc<dyn SessionCache>,
    ) -> Self {
        Self {
            credentials,
            online: Some(OnlineCheck {
                reachability,
                profile_api,
            }),
            cache,
            profile_timeout: PROFILE_TIMEOUT,
        }
    }

    /// Bootstrap with no profile client: only the cached session is consulted.
    pub fn offline_only(
        credentials: Arc<dyn CredentialStore>,
        cache: Arc<dyn SessionCache>,
    ) -> Self {
        Self {
            credentials,
            online: None,
            cache,
            profile_timeout: PROFILE_TIMEOUT,
        }
    }

    pub fn with_profile_timeout(mut self, timeout: Duration) -> Self {
        self.profile_timeout = timeout;
        self
    }

    /// Decides the startup route.
    pub async fn resolve(&self) -> Route {
        let Some(token) = self
            .credentials
            .read(AUTH_TOKEN_KEY)
            .as_deref()
            .and_then(sanitize_token)
        else {
            info!("no stored token, routing to login");
            return Route::Unauthenticated;
        };

        match &self.online {
            Some(online) => {
                if online.reachability.is_reachable().await {
                    match self.check_profile(online, &token).await {
                        Ok(profile) => return self.route_for_profile(&profile),
                        Err(e) => {
                            warn!(error = %e, "online profile check failed, trying cached session")
                        }
                    }
                } else {
                    info!("backend unreachable, trying cached session");
                }
            }
            None => info!("no profile client, trying cached session"),
        }

        self.offline_route()
    }

    async fn check_profile(
        &self,
        online: &OnlineCheck,
        token: &str,
    ) -> Result<Profile, SessionError> {
        tokio::time::timeout(self.profile_timeout, online.profile_api.fetch_profile(token))
            .await
            .map_err(|_| SessionError::Timeout)?
    }

    fn route_for_profile(&self, profile: &Profile) -> Route {
        if profile.is_approved() {
            let username = profile
                .username
                .clone()
                .or_else(|| self.cached_username())
                .unwrap_or_default();
            if let Err(e) = self.cache.save(&CachedSession::new(username, true)) {
                warn!(error = %e, "failed to cache session");
            }
            info!(status = %profile.status, "profile active");
            Route::AuthenticatedActive { offline: false }
        } else {
            // An unapproved account must not get in offline later.
            if let Err(e) = self.cache.clear() {
                warn!(error = %e, "failed to clear cached session");
            }
            info!(status = %profile.status, is_active = profile.is_active, "profile pending approval");
            Route::PendingApproval
        }
    }

    fn offline_route(&self) -> Route {
        match self.cache.load_cached_session() {
            Ok(Some(session)) if session.is_usable() => {
                info!(username = %session.username, saved_at = %session.saved_at, "admitted from cached session");
                Route::AuthenticatedActive { offline: true }
            }
            Ok(_) => {
                debug!("no usable cached session");
                Route::Unauthenticated
            }
            Err(e) => {
                warn!(error = %e, "failed to read cached session");
                Route::Unauthenticated
            }
        }
    }

    fn cached_username(&self) -> Option<String> {
        self.cache
            .load_cached_session()
            .ok()
            .flatten()
            .map(|s| s.username)
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fleetops_live_connection::credentials::{FileCredentialStore, MemoryCredentialStore};

    use super::*;
    use crate::cache::FileSessionCache;

    struct FixedReachability(bool);

    impl Reachability for FixedReachability {
        fn is_reachable(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
            let reachable = self.0;
            Box::pin(async move { reachable })
        }
    }

    enum Reply {
        Profile(&'static str, bool),
        Body(&'static str),
        Status(u16),
        Hang,
    }

    struct MockProfileApi {
        reply: Reply,
        calls: AtomicUsize,
        tokens: Mutex<Vec<String>>,
    }

    impl MockProfileApi {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                tokens: Mutex::new(Vec::new()),
            })
        }
    }

    impl ProfileApi for MockProfileApi {
        fn fetch_profile<'a>(
            &'a self,
            token: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Profile, SessionError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens.lock().unwrap().push(token.to_string());
            Box::pin(async move {
                match self.reply {
                    Reply::Profile(status, is_active) => Ok(Profile {
                        username: Some("ana".into()),
                        status: status.into(),
                        is_active,
                    }),
                    Reply::Body(body) => Ok(serde_json::from_str(body)?),
                    Reply::Status(status) => Err(SessionError::ProfileCheckFailed { status }),
                    Reply::Hang => std::future::pending().await,
                }
            })
        }
    }

    struct Fixture {
        bootstrap: SessionBootstrap,
        api: Arc<MockProfileApi>,
        cache: Arc<FileSessionCache>,
        dir: tempfile::TempDir,
    }

    fn fixture(token: Option<&str>, reachable: bool, reply: Reply) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileSessionCache::new(dir.path().join("session.json")));
        let credentials = match token {
            Some(t) => MemoryCredentialStore::with_token(t),
            None => MemoryCredentialStore::new(),
        };
        let api = MockProfileApi::new(reply);
        let bootstrap = SessionBootstrap::new(
            Arc::new(credentials),
            Arc::new(FixedReachability(reachable)),
            api.clone(),
            cache.clone(),
        );
        Fixture {
            bootstrap,
            api,
            cache,
            dir,
        }
    }

    #[tokio::test]
    async fn active_profile_routes_to_main_and_caches() {
        let f = fixture(Some(" tok "), true, Reply::Profile("active", true));

        assert_eq!(
            f.bootstrap.resolve().await,
            Route::AuthenticatedActive { offline: false }
        );
        assert_eq!(*f.api.tokens.lock().unwrap(), vec!["tok".to_string()]);
        let cached = f.cache.load_cached_session().unwrap().unwrap();
        assert_eq!(cached.username, "ana");
        assert!(cached.is_active);
    }

    #[tokio::test]
    async fn pending_profile_routes_to_pending_approval() {
        let f = fixture(Some("tok"), true, Reply::Profile("pending", true));
        f.cache.save(&CachedSession::new("ana", true)).unwrap();

        assert_eq!(f.bootstrap.resolve().await, Route::PendingApproval);
        assert_eq!(f.cache.load_cached_session().unwrap(), None);
    }

    #[tokio::test]
    async fn inactive_flag_routes_to_pending_approval() {
        let f = fixture(Some("tok"), true, Reply::Profile("active", false));
        assert_eq!(f.bootstrap.resolve().await, Route::PendingApproval);
    }

    #[tokio::test]
    async fn no_token_routes_to_login_without_network() {
        let f = fixture(None, true, Reply::Profile("active", true));

        assert_eq!(f.bootstrap.resolve().await, Route::Unauthenticated);
        assert_eq!(f.api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_token_counts_as_missing() {
        let f = fixture(Some(" \n "), true, Reply::Profile("active", true));

        assert_eq!(f.bootstrap.resolve().await, Route::Unauthenticated);
        assert_eq!(f.api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_with_cached_user_routes_offline() {
        let f = fixture(Some("tok"), false, Reply::Profile("active", true));
        f.cache.save(&CachedSession::new("ana", true)).unwrap();

        assert_eq!(
            f.bootstrap.resolve().await,
            Route::AuthenticatedActive { offline: true }
        );
        assert_eq!(f.api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_without_cache_routes_to_login() {
        let f = fixture(Some("tok"), false, Reply::Profile("active", true));
        assert_eq!(f.bootstrap.resolve().await, Route::Unauthenticated);
    }

    #[tokio::test]
    async fn failed_check_falls_back_to_cache() {
        let f = fixture(Some("tok"), true, Reply::Status(503));
        f.cache.save(&CachedSession::new("ana", true)).unwrap();

        assert_eq!(
            f.bootstrap.resolve().await,
            Route::AuthenticatedActive { offline: true }
        );
    }

    #[tokio::test]
    async fn failed_check_with_inactive_cache_routes_to_login() {
        let f = fixture(Some("tok"), true, Reply::Status(401));
        f.cache.save(&CachedSession::new("ana", false)).unwrap();

        assert_eq!(f.bootstrap.resolve().await, Route::Unauthenticated);
    }

    #[tokio::test]
    async fn slow_profile_check_times_out() {
        tokio::time::pause();
        let f = fixture(Some("tok"), true, Reply::Hang);
        f.cache.save(&CachedSession::new("ana", true)).unwrap();

        let start = tokio::time::Instant::now();
        let route = f.bootstrap.resolve().await;

        assert_eq!(start.elapsed(), PROFILE_TIMEOUT);
        assert_eq!(route, Route::AuthenticatedActive { offline: true });
    }

    #[tokio::test]
    async fn unnamed_active_profile_is_admitted_offline_later() {
        let f = fixture(
            Some("tok"),
            true,
            Reply::Body(r#"{"status":"active","is_active":true}"#),
        );
        assert_eq!(
            f.bootstrap.resolve().await,
            Route::AuthenticatedActive { offline: false }
        );

        let offline = SessionBootstrap::new(
            Arc::new(MemoryCredentialStore::with_token("tok")),
            Arc::new(FixedReachability(false)),
            f.api.clone(),
            f.cache.clone(),
        );
        assert_eq!(
            offline.resolve().await,
            Route::AuthenticatedActive { offline: true }
        );
    }

    #[tokio::test]
    async fn unnamed_profile_keeps_cached_username() {
        let f = fixture(
            Some("tok"),
            true,
            Reply::Body(r#"{"status":"active","is_active":true}"#),
        );
        f.cache.save(&CachedSession::new("ana", true)).unwrap();

        f.bootstrap.resolve().await;

        let cached = f.cache.load_cached_session().unwrap().unwrap();
        assert_eq!(cached.username, "ana");
    }

    #[tokio::test]
    async fn corrupt_credentials_route_to_login() {
        let f = fixture(Some("tok"), true, Reply::Profile("active", true));
        let path = f.dir.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();

        let bootstrap = SessionBootstrap::new(
            Arc::new(FileCredentialStore::open_or_empty(path)),
            Arc::new(FixedReachability(true)),
            f.api.clone(),
            f.cache.clone(),
        );

        assert_eq!(bootstrap.resolve().await, Route::Unauthenticated);
        assert_eq!(f.api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn offline_only_uses_cached_session() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileSessionCache::new(dir.path().join("session.json")));
        let bootstrap = SessionBootstrap::offline_only(
            Arc::new(MemoryCredentialStore::with_token("tok")),
            cache.clone(),
        );
        assert_eq!(bootstrap.resolve().await, Route::Unauthenticated);

        cache.save(&CachedSession::new("ana", true)).unwrap();
        assert_eq!(
            bootstrap.resolve().await,
            Route::AuthenticatedActive { offline: true }
        );
    }

    #[tokio::test]
    async fn corrupt_cache_routes_to_login() {
        let f = fixture(Some("tok"), false, Reply::Profile("active", true));
        std::fs::write(f.cache.path(), "garbage").unwrap();

        assert_eq!(f.bootstrap.resolve().await, Route::Unauthenticated);
    }
}
