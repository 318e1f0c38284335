//! Scripted executor and token helpers shared by unit tests.

use crate::client::ApiClient;
use crate::executor::{HttpRequest, RawResponse, RequestExecutor, TransportError};
use crate::refresh::HttpTokenRefresher;
use crate::retry::RetryPolicy;
use crate::session::Session;
use crate::token_store::TokenStore;
use async_trait::async_trait;
use pacedream_storage::{
    create_memory_secrets_manager, MemoryStorage, SecretsManager, SecureStorage, StorageError,
    StorageResult,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub(crate) const ACCESS_1: &str = "hdr.a1.sig";
pub(crate) const ACCESS_2: &str = "hdr.a2.sig";

/// One request as the executor saw it.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: reqwest::Method,
    pub path: String,
    pub token: Option<String>,
    pub body: Option<String>,
}

type Handler = dyn Fn(&HttpRequest, Option<&str>) -> Result<RawResponse, TransportError> + Send + Sync;

/// Executor whose responses come from a closure.
pub(crate) struct ScriptedExecutor {
    handler: Box<Handler>,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedExecutor {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest, Option<&str>) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Delay every response so concurrent calls overlap.
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn calls_to(&self, path_suffix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.path.ends_with(path_suffix))
            .count()
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn send(
        &self,
        request: &HttpRequest,
        token: Option<&str>,
    ) -> Result<RawResponse, TransportError> {
        self.calls.lock().push(RecordedCall {
            method: request.method.clone(),
            path: request.url.path().to_string(),
            token: token.map(str::to_string),
            body: request.body.clone(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.handler)(request, token)
    }
}

/// Memory storage that refuses to delete anything.
#[derive(Default)]
pub(crate) struct UndeletableStorage {
    inner: MemoryStorage,
}

impl SecureStorage for UndeletableStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key)
    }

    fn delete(&self, _key: &str) -> StorageResult<bool> {
        Err(StorageError::Platform("delete refused".to_string()))
    }
}

/// Token store over [`UndeletableStorage`], seeded with `session`.
pub(crate) fn undeletable_store(session: Session) -> Arc<TokenStore> {
    let secrets = SecretsManager::new(Box::new(UndeletableStorage::default()));
    let store = Arc::new(TokenStore::new(secrets));
    store.save(session).unwrap();
    store
}

/// Successful refresh response body.
pub(crate) fn token_body(access: &str, refresh: &str) -> String {
    format!(
        r#"{{"success":true,"data":{{"accessToken":"{}","refreshToken":"{}"}}}}"#,
        access, refresh
    )
}

/// Client against `https://api.example.com/v1` whose refresh goes through the
/// same scripted executor, optionally seeded with a session.
pub(crate) fn client_with(executor: Arc<ScriptedExecutor>, session: Option<Session>) -> ApiClient {
    let store = Arc::new(TokenStore::new(create_memory_secrets_manager()));
    if let Some(session) = session {
        store.save(session).unwrap();
    }
    let refresher = Arc::new(HttpTokenRefresher::new(
        executor.clone(),
        Url::parse("https://api.example.com/v1/auth/refresh-token").unwrap(),
        None,
        RetryPolicy::none(),
    ));
    ApiClient::new(
        Url::parse("https://api.example.com/v1").unwrap(),
        executor,
        store,
        refresher,
        RetryPolicy::default(),
    )
}
