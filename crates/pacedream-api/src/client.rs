//! Authenticated API client.
//!
//! Every authenticated call follows the same path: load the session, send
//! with the bearer token, and on a 401 refresh once (shared with any other
//! caller that hit the same 401) and replay once. A second 401 is returned
//! to the caller as-is.

use crate::executor::{HttpExecutor, HttpRequest, RequestExecutor};
use crate::refresh::{HttpTokenRefresher, RefreshCoordinator, TokenRefresher};
use crate::response::{into_result, ApiResponse};
use crate::retry::{send_with_retry, CallState, CallTrace, RetryPolicy};
use crate::token_store::TokenStore;
use crate::{ApiError, ApiResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use pacedream_config::{append_segments, redact_url, Config};
use parking_lot::Mutex;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// A call to make: method, path (or absolute URL), optional JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    pub include_auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            include_auth: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ApiResult<Self> {
        self.body = Some(serde_json::to_string(body)?);
        Ok(self)
    }

    /// Use an already serialized JSON payload.
    pub fn raw_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send without a bearer token. A 401 is returned, never refreshed.
    pub fn public(mut self) -> Self {
        self.include_auth = false;
        self
    }
}

type SharedCall = Shared<BoxFuture<'static, ApiResult<ApiResponse>>>;

struct InFlightGet {
    id: u64,
    waiters: usize,
    future: SharedCall,
}

/// One caller's interest in a shared GET. The entry goes away with its last
/// waiter, whether that waiter finished or was cancelled.
struct GetWaiter<'a> {
    in_flight: &'a Mutex<HashMap<String, InFlightGet>>,
    key: String,
    id: u64,
}

impl Drop for GetWaiter<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if let Some(entry) = in_flight.get_mut(&self.key) {
            if entry.id != self.id {
                return;
            }
            entry.waiters -= 1;
            if entry.waiters == 0 {
                in_flight.remove(&self.key);
            }
        }
    }
}

struct ClientInner {
    api_base: Url,
    executor: Arc<dyn RequestExecutor>,
    store: Arc<TokenStore>,
    refresh: RefreshCoordinator,
    retry: RetryPolicy,
    no_retry: RetryPolicy,
    in_flight_gets: Mutex<HashMap<String, InFlightGet>>,
    next_get_id: AtomicU64,
}

/// REST client with automatic token refresh. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        api_base: Url,
        executor: Arc<dyn RequestExecutor>,
        store: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        retry: RetryPolicy,
    ) -> Self {
        let refresh = RefreshCoordinator::new(store.clone(), refresher);
        Self {
            inner: Arc::new(ClientInner {
                api_base,
                executor,
                store,
                refresh,
                retry,
                no_retry: RetryPolicy::none(),
                in_flight_gets: Mutex::new(HashMap::new()),
                next_get_id: AtomicU64::new(0),
            }),
        }
    }

    /// Client over `reqwest` with the configured timeouts, retry policy and
    /// refresh endpoints.
    pub fn from_config(config: &Config, store: Arc<TokenStore>) -> ApiResult<Self> {
        let retry = RetryPolicy::from_config(config);
        let executor: Arc<dyn RequestExecutor> = Arc::new(
            HttpExecutor::from_config(config).map_err(|e| ApiError::Config(e.to_string()))?,
        );
        let refresher = Arc::new(HttpTokenRefresher::from_config(
            config,
            executor.clone(),
            retry.clone(),
        )?);
        Ok(Self::new(
            config.api_base_url()?,
            executor,
            store,
            refresher,
            retry,
        ))
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.inner.refresh
    }

    pub fn api_base(&self) -> &Url {
        &self.inner.api_base
    }

    /// Resolve a relative path (optionally with a query string) against the
    /// API base. Absolute `http(s)` URLs are used unchanged.
    pub fn resolve_url(&self, path: &str) -> ApiResult<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let mut url = append_segments(&self.inner.api_base, &[path])?;
        url.set_query(query.filter(|query| !query.is_empty()));
        Ok(url)
    }

    /// Authenticated call with an optional JSON body.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> ApiResult<ApiResponse> {
        let mut request = ApiRequest::new(method, path);
        if let Some(body) = body {
            request = request.json(body)?;
        }
        self.send(request).await
    }

    /// Call without a bearer token (login, registration, public listings).
    pub async fn execute_public(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> ApiResult<ApiResponse> {
        let mut request = ApiRequest::new(method, path).public();
        if let Some(body) = body {
            request = request.json(body)?;
        }
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> ApiResult<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiResponse> {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiResponse> {
        self.send(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<ApiResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.get(path).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post(path, body).await?.json()
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.put(path, body).await?.json()
    }

    /// Send a prepared request. Identical concurrent GETs share one execution.
    pub async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let include_auth = request.include_auth;
        let http = HttpRequest {
            url: self.resolve_url(&request.path)?,
            method: request.method,
            body: request.body,
            headers: request.headers,
        };

        if http.method == Method::GET {
            self.send_deduplicated(http, include_auth).await
        } else {
            self.dispatch(http, include_auth).await
        }
    }

    async fn send_deduplicated(&self, request: HttpRequest, include_auth: bool) -> ApiResult<ApiResponse> {
        let key = dedup_key(&request, include_auth);

        let (id, future) = {
            let mut in_flight = self.inner.in_flight_gets.lock();
            match in_flight.get_mut(&key) {
                Some(existing) => {
                    debug!(url = %redact_url(&request.url), "Joining identical in-flight GET");
                    existing.waiters += 1;
                    (existing.id, existing.future.clone())
                }
                None => {
                    let id = self.inner.next_get_id.fetch_add(1, Ordering::Relaxed);
                    let client = self.clone();
                    let future = async move { client.dispatch(request, include_auth).await }
                        .boxed()
                        .shared();
                    in_flight.insert(
                        key.clone(),
                        InFlightGet {
                            id,
                            waiters: 1,
                            future: future.clone(),
                        },
                    );
                    (id, future)
                }
            }
        };

        let _waiter = GetWaiter {
            in_flight: &self.inner.in_flight_gets,
            key,
            id,
        };
        future.await
    }

    /// Only GETs are retried. A write that timed out may already have been
    /// applied, so it is sent once.
    fn retry_policy(&self, request: &HttpRequest) -> &RetryPolicy {
        if request.method == Method::GET {
            &self.inner.retry
        } else {
            &self.inner.no_retry
        }
    }

    async fn dispatch(&self, request: HttpRequest, include_auth: bool) -> ApiResult<ApiResponse> {
        if include_auth {
            self.execute_authenticated(request).await
        } else {
            self.execute_unauthenticated(request).await
        }
    }

    async fn execute_unauthenticated(&self, request: HttpRequest) -> ApiResult<ApiResponse> {
        let mut trace = CallTrace::new(redact_url(&request.url));
        trace.enter(CallState::Sent);
        let raw = send_with_retry(
            &*self.inner.executor,
            &request,
            None,
            self.retry_policy(&request),
            &mut trace,
        )
        .await?;
        let result = into_result(raw);
        if result.is_ok() {
            trace.enter(CallState::Success);
        }
        result
    }

    async fn execute_authenticated(&self, request: HttpRequest) -> ApiResult<ApiResponse> {
        let mut trace = CallTrace::new(redact_url(&request.url));

        let Some(session) = self.inner.store.load()? else {
            debug!(url = %trace.target(), "No session, not sending");
            return Err(ApiError::Unauthenticated);
        };

        trace.enter(CallState::Sent);
        let raw = send_with_retry(
            &*self.inner.executor,
            &request,
            Some(session.access_token()),
            self.retry_policy(&request),
            &mut trace,
        )
        .await?;

        if raw.status != 401 {
            let result = into_result(raw);
            if result.is_ok() {
                trace.enter(CallState::Success);
            }
            return result;
        }

        trace.enter(CallState::AuthFailed);
        info!(url = %trace.target(), "Access token rejected, refreshing");
        trace.enter(CallState::Refreshing);

        let refreshed = match self
            .inner
            .refresh
            .refresh_rejected(session.access_token())
            .await
        {
            Ok(refreshed) => refreshed,
            Err(e) => {
                trace.enter(CallState::RetriedFail);
                return Err(e);
            }
        };

        let replay = send_with_retry(
            &*self.inner.executor,
            &request,
            Some(refreshed.access_token()),
            self.retry_policy(&request),
            &mut trace,
        )
        .await;

        let result = replay.and_then(|raw| {
            if raw.status == 401 {
                warn!(url = %trace.target(), "Replay rejected after refresh");
            }
            into_result(raw)
        });
        trace.enter(if result.is_ok() {
            CallState::RetriedSuccess
        } else {
            CallState::RetriedFail
        });
        result
    }
}

fn dedup_key(request: &HttpRequest, include_auth: bool) -> String {
    let mut headers: Vec<String> = request
        .headers
        .iter()
        .map(|(name, value)| format!("{}={}", name.to_ascii_lowercase(), value))
        .collect();
    headers.sort();
    format!(
        "{} {} auth={} headers={}",
        request.method,
        request.url,
        include_auth,
        headers.join("&")
    )
}
