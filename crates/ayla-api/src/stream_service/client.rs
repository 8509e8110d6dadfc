// Async HTTP client for the device stream service.
//
// Subscriptions live on the mdss host (`api/v1/subscriptions`); the push
// socket itself is served by the mstream host (`stream?stream_key=...`).

use reqwest::header::AUTHORIZATION;
use tracing::debug;
use url::Url;

use super::types::{
    EventType, NewSubscription, SubscriptionRecord, SubscriptionRequest, SubscriptionWrapper,
};
use crate::Error;
use crate::auth::{SharedTokenProvider, authorization_header};
use crate::device_service::client::{handle_empty, handle_response, normalize_base_url};
use crate::transport::TransportConfig;

const SUBSCRIPTION_NAME: &str = "ANDROID_DSS";
const SUBSCRIPTION_DESCRIPTION: &str = "DATAPOINT";
const CLIENT_TYPE: &str = "mobile";
const ALL_PROPERTIES: &str = "*";

/// Client for subscription CRUD and stream URL construction.
#[derive(Clone)]
pub struct StreamServiceClient {
    http: reqwest::Client,
    subscription_url: Url,
    stream_url: Url,
    auth: SharedTokenProvider,
}

impl StreamServiceClient {
    pub fn new(
        subscription_base: &str,
        stream_base: &str,
        auth: SharedTokenProvider,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(subscription_base, stream_base, http, auth)
    }

    pub fn from_reqwest(
        subscription_base: &str,
        stream_base: &str,
        http: reqwest::Client,
        auth: SharedTokenProvider,
    ) -> Result<Self, Error> {
        Ok(Self {
            http,
            subscription_url: normalize_base_url(subscription_base)?,
            stream_url: normalize_base_url(stream_base)?,
            auth,
        })
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Create a subscription covering every property of the given devices.
    pub async fn create_subscription(
        &self,
        dsns: &[String],
        types: &[EventType],
    ) -> Result<SubscriptionRecord, Error> {
        let url = self.subscription_url.join("api/v1/subscriptions")?;
        debug!("POST {url}");

        let body = SubscriptionRequest {
            subscription: NewSubscription {
                name: SUBSCRIPTION_NAME.into(),
                description: SUBSCRIPTION_DESCRIPTION.into(),
                dsn: dsns.join(","),
                property_name: ALL_PROPERTIES.into(),
                client_type: CLIENT_TYPE.into(),
                batch_size: 1,
                subscription_type: types
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            },
        };

        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, authorization_header(self.auth.as_ref())?)
            .json(&body)
            .send()
            .await?;
        let wrapped: SubscriptionWrapper = handle_response(resp).await?;
        Ok(wrapped.subscription)
    }

    pub async fn get_subscription(&self, id: u64) -> Result<SubscriptionRecord, Error> {
        let url = self.subscription_url.join(&format!("api/v1/subscriptions/{id}"))?;
        debug!("GET {url}");

        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, authorization_header(self.auth.as_ref())?)
            .send()
            .await?;
        let wrapped: SubscriptionWrapper = handle_response(resp).await?;
        Ok(wrapped.subscription)
    }

    pub async fn delete_subscription(&self, id: u64) -> Result<(), Error> {
        let url = self.subscription_url.join(&format!("api/v1/subscriptions/{id}"))?;
        debug!("DELETE {url}");

        let resp = self
            .http
            .delete(url)
            .header(AUTHORIZATION, authorization_header(self.auth.as_ref())?)
            .send()
            .await?;
        handle_empty(resp).await
    }

    // ── Socket URL ───────────────────────────────────────────────────

    /// Websocket URL for a stream key: `https` becomes `wss`, `http` becomes `ws`.
    pub fn socket_url(&self, stream_key: &str) -> Result<Url, Error> {
        let mut url = self.stream_url.join("stream")?;
        url.query_pairs_mut().append_pair("stream_key", stream_key);

        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => other,
        }
        .to_owned();
        url.set_scheme(&scheme)
            .map_err(|()| Error::WebSocketConnect(format!("cannot use scheme {scheme}")))?;
        Ok(url)
    }
}

impl std::fmt::Debug for StreamServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamServiceClient")
            .field("subscription_url", &self.subscription_url.as_str())
            .field("stream_url", &self.stream_url.as_str())
            .finish_non_exhaustive()
    }
}
