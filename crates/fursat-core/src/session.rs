//! Session state: the signed-in identity and its profile row.
//!
//! One `Session` per signed-in surface, constructed over a gateway. There is
//! no ambient global; independent instances (tests, multiple windows) never
//! observe each other. Consumers subscribe to a watch channel and re-read
//! the state snapshot whenever it changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::FursatResult;
use crate::gateway::{AuthUser, Gateway};
use crate::resources::{ProfilePatch, Profiles};
use crate::types::ProfileRecord;

/// Upper bound on the initial profile load. A backend that never answers
/// must not leave the whole surface stuck on a spinner.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of the session at one point in time.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub user: Option<AuthUser>,
    pub profile: Option<ProfileRecord>,
    /// True only during [`Session::initialize`].
    pub loading: bool,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}

/// Auth/profile state object over a gateway.
pub struct Session {
    gateway: Arc<dyn Gateway>,
    profiles: Profiles,
    state: watch::Sender<SessionState>,
}

impl Session {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            profiles: Profiles::new(gateway.clone()),
            gateway,
            state,
        }
    }

    /// Subscribe to state updates. The receiver always holds the latest
    /// snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The current snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Load the signed-in identity and its profile row.
    ///
    /// Bounded by [`INIT_TIMEOUT`]: on timeout the session settles with
    /// whatever identity the gateway reports and no profile, with
    /// `loading` cleared, rather than hanging the caller.
    pub async fn initialize(&self) -> FursatResult<()> {
        let user = self.gateway.current_user();
        self.state.send_replace(SessionState {
            user: user.clone(),
            profile: None,
            loading: true,
        });

        let profile = match &user {
            Some(user) => {
                match tokio::time::timeout(INIT_TIMEOUT, self.profiles.fetch_profile(&user.id))
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!(user_id = user.id.as_str(), "profile load timed out");
                        None
                    }
                }
            }
            None => None,
        };

        debug!(
            signed_in = user.is_some(),
            has_profile = profile.is_some(),
            "session initialized"
        );
        self.state.send_replace(SessionState {
            user,
            profile,
            loading: false,
        });
        Ok(())
    }

    /// Create the viewer's profile row at signup, tolerating a concurrent
    /// server-side creation, and publish the result.
    pub async fn ensure_profile(&self, username: &str) -> FursatResult<ProfileRecord> {
        let profile = self.profiles.ensure_profile(username).await?;
        info!(user_id = profile.id.as_str(), "profile ensured");
        self.publish_profile(Some(profile.clone()));
        Ok(profile)
    }

    /// Apply a partial profile edit and publish the updated row.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> FursatResult<ProfileRecord> {
        let profile = self.profiles.update_profile(patch).await?;
        self.publish_profile(Some(profile.clone()));
        Ok(profile)
    }

    /// Re-read the viewer's profile row from the gateway.
    pub async fn refresh_profile(&self) -> FursatResult<Option<ProfileRecord>> {
        let profile = match self.gateway.current_user() {
            Some(user) => self.profiles.fetch_profile(&user.id).await?,
            None => None,
        };
        self.publish_profile(profile.clone());
        Ok(profile)
    }

    fn publish_profile(&self, profile: Option<ProfileRecord>) {
        self.state.send_modify(|state| {
            state.user = self.gateway.current_user();
            state.profile = profile;
            state.loading = false;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    #[tokio::test]
    async fn test_initialize_without_user() {
        let gateway = Arc::new(MemoryGateway::new());
        let session = Session::new(gateway);
        session.initialize().await.unwrap();

        let state = session.state();
        assert!(!state.is_signed_in());
        assert!(state.profile.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_initialize_loads_existing_profile() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.sign_in("u1", "ada@campus.edu");
        let session = Session::new(gateway.clone());
        session.ensure_profile("ada").await.unwrap();

        session.initialize().await.unwrap();
        let state = session.state();
        assert!(state.is_signed_in());
        assert_eq!(
            state.profile.as_ref().and_then(|p| p.username.as_deref()),
            Some("ada")
        );
    }

    #[tokio::test]
    async fn test_watchers_observe_profile_updates() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.sign_in("u1", "ada@campus.edu");
        let session = Session::new(gateway);
        let mut updates = session.subscribe();

        session.ensure_profile("ada").await.unwrap();
        updates.changed().await.unwrap();
        assert!(updates.borrow().profile.is_some());

        let patch = ProfilePatch {
            headline: Some("rocketry club".to_string()),
            ..Default::default()
        };
        session.update_profile(&patch).await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(
            updates
                .borrow()
                .profile
                .as_ref()
                .and_then(|p| p.headline.as_deref()),
            Some("rocketry club")
        );
    }

    #[tokio::test]
    async fn test_independent_sessions_do_not_share_state() {
        let gateway_a = Arc::new(MemoryGateway::new());
        let gateway_b = Arc::new(MemoryGateway::new());
        gateway_a.sign_in("u1", "ada@campus.edu");

        let session_a = Session::new(gateway_a);
        let session_b = Session::new(gateway_b);
        session_a.initialize().await.unwrap();
        session_b.initialize().await.unwrap();

        assert!(session_a.state().is_signed_in());
        assert!(!session_b.state().is_signed_in());
    }
}
