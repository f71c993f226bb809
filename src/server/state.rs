use axum::extract::FromRef;

use crate::bookmark_store::BookmarkStore;
use crate::oidc::{AuthStateStore, OidcClient};
use crate::sync::ViewRegistry;
use crate::user::UserStore;
use std::sync::Arc;

use super::ServerConfig;

pub type GuardedBookmarkStore = Arc<dyn BookmarkStore>;
pub type GuardedUserStore = Arc<dyn UserStore>;
pub type GuardedViewRegistry = Arc<ViewRegistry>;
pub type OptionalOidcClient = Option<Arc<OidcClient>>;
pub type GuardedAuthStateStore = Arc<AuthStateStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub bookmark_store: GuardedBookmarkStore,
    pub user_store: GuardedUserStore,
    pub view_registry: GuardedViewRegistry,
    pub oidc_client: OptionalOidcClient,
    pub auth_state_store: GuardedAuthStateStore,
}

impl FromRef<ServerState> for GuardedBookmarkStore {
    fn from_ref(input: &ServerState) -> Self {
        input.bookmark_store.clone()
    }
}

impl FromRef<ServerState> for GuardedUserStore {
    fn from_ref(input: &ServerState) -> Self {
        input.user_store.clone()
    }
}

impl FromRef<ServerState> for GuardedViewRegistry {
    fn from_ref(input: &ServerState) -> Self {
        input.view_registry.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for OptionalOidcClient {
    fn from_ref(input: &ServerState) -> Self {
        input.oidc_client.clone()
    }
}

impl FromRef<ServerState> for GuardedAuthStateStore {
    fn from_ref(input: &ServerState) -> Self {
        input.auth_state_store.clone()
    }
}
