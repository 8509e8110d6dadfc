// ── Session context ──
//
// Everything a session shares across its devices and managers: the
// service clients, the cache, the LAN session factory, the push channel
// state and the root cancellation token. Constructed once per sign-in
// and shared via `Arc`.

use std::fmt;
use std::sync::Arc;

use ayla_api::lan::LanSessionFactory;
use ayla_api::transport::{TlsMode, TransportConfig};
use ayla_api::{DeviceServiceClient, SharedTokenProvider, StreamServiceClient};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{Cache, MemoryCache};
use crate::config::{SessionConfig, TlsVerification};
use crate::dss::StreamState;
use crate::error::CoreError;

pub struct SessionContext {
    config: SessionConfig,
    device_service: DeviceServiceClient,
    stream_service: Option<StreamServiceClient>,
    cache: Arc<dyn Cache>,
    lan_factory: Option<Arc<dyn LanSessionFactory>>,
    stream_state: watch::Sender<StreamState>,
    cancel: CancellationToken,
}

impl SessionContext {
    /// Context with an in-memory cache and no LAN support.
    pub fn new(config: SessionConfig, token: SharedTokenProvider) -> Result<Arc<Self>, CoreError> {
        Self::builder(config, token).build()
    }

    pub fn builder(config: SessionConfig, token: SharedTokenProvider) -> SessionContextBuilder {
        SessionContextBuilder {
            config,
            token,
            cache: None,
            lan_factory: None,
        }
    }

    /// Cancel every task bound to this session.
    pub fn teardown(&self) {
        debug!(session = %self.config.session_name, "tearing down session");
        self.cancel.cancel();
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn device_service(&self) -> &DeviceServiceClient {
        &self.device_service
    }

    /// `None` when the push channel is disabled.
    pub fn stream_service(&self) -> Option<&StreamServiceClient> {
        self.stream_service.as_ref()
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    pub fn lan_factory(&self) -> Option<&Arc<dyn LanSessionFactory>> {
        self.lan_factory.as_ref()
    }

    pub fn stream_state(&self) -> StreamState {
        *self.stream_state.borrow()
    }

    pub fn subscribe_stream_state(&self) -> watch::Receiver<StreamState> {
        self.stream_state.subscribe()
    }

    pub fn is_stream_connected(&self) -> bool {
        self.stream_state() == StreamState::Connected
    }

    pub(crate) fn set_stream_state(&self, state: StreamState) {
        self.stream_state.send_replace(state);
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_name", &self.config.session_name)
            .field("device_service", &self.device_service.base_url().as_str())
            .field("stream_enabled", &self.stream_service.is_some())
            .field("lan_enabled", &self.lan_factory.is_some())
            .finish_non_exhaustive()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

pub struct SessionContextBuilder {
    config: SessionConfig,
    token: SharedTokenProvider,
    cache: Option<Arc<dyn Cache>>,
    lan_factory: Option<Arc<dyn LanSessionFactory>>,
}

impl SessionContextBuilder {
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn lan_factory(mut self, factory: Arc<dyn LanSessionFactory>) -> Self {
        self.lan_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<Arc<SessionContext>, CoreError> {
        self.config.validate()?;
        let transport = build_transport(&self.config);
        let http = transport.build_client()?;

        let device_service = DeviceServiceClient::from_reqwest(
            self.config.device_service_url.as_str(),
            http.clone(),
            Arc::clone(&self.token),
        )?;
        let stream_service = if self.config.allow_dss {
            Some(StreamServiceClient::from_reqwest(
                self.config.stream_service_url.as_str(),
                self.config.stream_socket_url.as_str(),
                http,
                Arc::clone(&self.token),
            )?)
        } else {
            None
        };

        let (stream_state, _) = watch::channel(StreamState::Uninitialized);

        Ok(Arc::new(SessionContext {
            config: self.config,
            device_service,
            stream_service,
            cache: self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new())),
            lan_factory: self.lan_factory,
            stream_state,
            cancel: CancellationToken::new(),
        }))
    }
}

/// Build a [`TransportConfig`] from the session configuration.
fn build_transport(config: &SessionConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.http_timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
