//! Single-flight token refresh.
//!
//! At most one refresh runs at a time. The exchange runs in its own tokio
//! task and callers await a [`Shared`] handle to it, so a caller that gives
//! up never cancels the refresh for everyone else.

use crate::executor::{HttpRequest, RequestExecutor};
use crate::response::into_result;
use crate::retry::{send_with_retry, CallState, CallTrace, RetryPolicy};
use crate::session::{parse_token_response, Session};
use crate::token_store::TokenStore;
use crate::{ApiError, ApiResult};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use pacedream_config::{redact_url, Config};
use parking_lot::Mutex;
use reqwest::Method;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Exchanges a refresh token for a new session.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> ApiResult<Session>;
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Refresh over HTTP: the API endpoint first, then the web proxy.
pub struct HttpTokenRefresher {
    executor: Arc<dyn RequestExecutor>,
    endpoints: Vec<Url>,
    retry: RetryPolicy,
}

impl HttpTokenRefresher {
    pub fn new(
        executor: Arc<dyn RequestExecutor>,
        primary: Url,
        fallback: Option<Url>,
        retry: RetryPolicy,
    ) -> Self {
        let mut endpoints = vec![primary];
        endpoints.extend(fallback);
        Self {
            executor,
            endpoints,
            retry,
        }
    }

    /// `{api}/auth/refresh-token`, falling back to
    /// `{frontend}/api/proxy/auth/refresh-token`.
    pub fn from_config(
        config: &Config,
        executor: Arc<dyn RequestExecutor>,
        retry: RetryPolicy,
    ) -> ApiResult<Self> {
        let primary = config.build_api_url(&["auth/refresh-token"])?;
        let fallback = config.build_frontend_url(&["api/proxy/auth/refresh-token"])?;
        Ok(Self::new(executor, primary, Some(fallback), retry))
    }

    async fn exchange(&self, endpoint: &Url, body: &str, refresh_token: &str) -> ApiResult<Session> {
        let request = HttpRequest::new(Method::POST, endpoint.clone()).with_body(body);
        let mut trace = CallTrace::new(redact_url(endpoint));
        trace.enter(CallState::Sent);

        let raw = send_with_retry(&*self.executor, &request, None, &self.retry, &mut trace).await?;
        let response = into_result(raw)?;
        trace.enter(CallState::Success);

        parse_token_response(&response.body, Some(refresh_token)).ok_or_else(|| {
            ApiError::Decoding("refresh response carried no usable tokens".to_string())
        })
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> ApiResult<Session> {
        let body = serde_json::to_string(&RefreshRequest { refresh_token })?;

        let mut last_error = ApiError::SessionExpired;
        for endpoint in &self.endpoints {
            match self.exchange(endpoint, &body, refresh_token).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!(url = %redact_url(endpoint), error = %e, "Refresh endpoint failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

type SharedRefresh = Shared<BoxFuture<'static, ApiResult<Session>>>;

struct InFlight {
    id: u64,
    future: SharedRefresh,
}

/// Ensures at most one refresh is in flight and shares its outcome.
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    next_id: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<TokenStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            in_flight: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Refresh now, or join the refresh already running.
    pub async fn refresh(&self) -> ApiResult<Session> {
        let future = {
            let mut slot = self.in_flight.lock();
            let pending = slot.as_ref().map(|in_flight| in_flight.future.clone());
            match pending {
                Some(future) => {
                    debug!("Joining in-flight token refresh");
                    future
                }
                None => {
                    if self.store.load()?.is_none() {
                        return Err(ApiError::SessionExpired);
                    }
                    self.start(&mut slot)
                }
            }
        };
        future.await
    }

    /// Called after `rejected_access_token` drew a 401.
    ///
    /// If the stored token has already moved on, another caller refreshed in
    /// the meantime and the stored session is returned without a new refresh.
    pub async fn refresh_rejected(&self, rejected_access_token: &str) -> ApiResult<Session> {
        let future = {
            let mut slot = self.in_flight.lock();
            let pending = slot.as_ref().map(|in_flight| in_flight.future.clone());
            match pending {
                Some(future) => {
                    debug!("Joining in-flight token refresh");
                    future
                }
                None => match self.store.load()? {
                    None => return Err(ApiError::SessionExpired),
                    Some(current) if current.access_token() != rejected_access_token => {
                        debug!("Access token already refreshed");
                        return Ok(current);
                    }
                    Some(_) => {
                        self.store.mark_token_rejected();
                        self.start(&mut slot)
                    }
                },
            }
        };
        future.await
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    fn start(&self, slot: &mut Option<InFlight>) -> SharedRefresh {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let store = self.store.clone();
        let refresher = self.refresher.clone();
        let in_flight = self.in_flight.clone();

        let task = tokio::spawn(async move {
            let result = run_refresh(&store, &*refresher).await;
            // Later 401s start a fresh refresh instead of replaying this outcome
            let mut slot = in_flight.lock();
            if slot.as_ref().is_some_and(|current| current.id == id) {
                *slot = None;
            }
            result
        });

        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Token refresh task failed");
                    Err(ApiError::SessionExpired)
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            future: future.clone(),
        });
        future
    }
}

async fn run_refresh(store: &TokenStore, refresher: &dyn TokenRefresher) -> ApiResult<Session> {
    let Some(current) = store.load()? else {
        return Err(ApiError::SessionExpired);
    };

    info!("Refreshing access token");
    match refresher.refresh(current.refresh_token()).await {
        Ok(session) => {
            store.refresh_succeeded(session.clone())?;
            info!("Access token refreshed");
            Ok(session)
        }
        Err(e) => {
            warn!(error = %e, "Token refresh failed, clearing session");
            if let Err(e) = store.refresh_failed() {
                error!(error = %e, "Failed to delete rejected session");
            }
            Err(ApiError::SessionExpired)
        }
    }
}
