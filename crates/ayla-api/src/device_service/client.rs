// Async HTTP client for the Ayla device service.
//
// Base path: the regional device-service root (e.g. https://ads-field.aylanetworks.com/)
// Auth: `Authorization: auth_token <token>` on every request

use std::collections::BTreeMap;

use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::types::{
    CreateDatapointRequest, DatapointRecord, DatapointWrapper, DeviceRecord, DeviceWrapper,
    LanConfigRecord, LanConfigWrapper, NewDatapoint, PropertyRecord, PropertyWrapper,
};
use crate::Error;
use crate::auth::{SharedTokenProvider, authorization_header};
use crate::transport::TransportConfig;

/// Header identifying where a datapoint write originated.
const SOURCE_HEADER: &str = "x-ayla-source";
const SOURCE_MOBILE: &str = "Mobile";

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the device service: device list, properties,
/// datapoints and LAN configuration.
#[derive(Clone)]
pub struct DeviceServiceClient {
    http: reqwest::Client,
    base_url: Url,
    auth: SharedTokenProvider,
}

impl DeviceServiceClient {
    // ── Constructors ─────────────────────────────────────────────────

    pub fn new(
        base_url: &str,
        auth: SharedTokenProvider,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, http, auth)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(
        base_url: &str,
        http: reqwest::Client,
        auth: SharedTokenProvider,
    ) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            auth,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, authorization_header(self.auth.as_ref())?)
            .query(params)
            .send()
            .await?;
        handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, authorization_header(self.auth.as_ref())?)
            .header(SOURCE_HEADER, SOURCE_MOBILE)
            .json(body)
            .send()
            .await?;
        handle_response(resp).await
    }

    // ━━ Public API ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    // ── Devices ──────────────────────────────────────────────────────

    /// Fetch the exhaustive device list for the signed-in user.
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        let wrapped: Vec<DeviceWrapper> = self.get("apiv1/devices.json", &[]).await?;
        Ok(wrapped.into_iter().map(|w| w.device).collect())
    }

    // ── Properties ───────────────────────────────────────────────────

    /// Fetch properties for a device, optionally filtered by name.
    pub async fn list_properties(
        &self,
        dsn: &str,
        names: Option<&[String]>,
    ) -> Result<Vec<PropertyRecord>, Error> {
        let params: Vec<(&str, String)> = names
            .unwrap_or_default()
            .iter()
            .map(|n| ("names[]", n.clone()))
            .collect();
        let wrapped: Vec<PropertyWrapper> = self
            .get(&format!("apiv1/dsns/{dsn}/properties.json"), &params)
            .await?;
        Ok(wrapped.into_iter().map(|w| w.property).collect())
    }

    // ── Datapoints ───────────────────────────────────────────────────

    pub async fn create_datapoint(
        &self,
        dsn: &str,
        property: &str,
        value: serde_json::Value,
        metadata: Option<BTreeMap<String, String>>,
    ) -> Result<DatapointRecord, Error> {
        let body = CreateDatapointRequest {
            datapoint: NewDatapoint { value, metadata },
        };
        let wrapped: DatapointWrapper = self
            .post(
                &format!("apiv1/dsns/{dsn}/properties/{property}/datapoints.json"),
                &body,
            )
            .await?;
        Ok(wrapped.datapoint)
    }

    /// Fetch a single datapoint by id. Used to poll for acknowledgement.
    pub async fn get_datapoint(
        &self,
        dsn: &str,
        property: &str,
        id: &str,
    ) -> Result<DatapointRecord, Error> {
        let wrapped: DatapointWrapper = self
            .get(
                &format!("apiv1/dsns/{dsn}/properties/{property}/datapoints/{id}.json"),
                &[],
            )
            .await?;
        Ok(wrapped.datapoint)
    }

    // ── LAN configuration ────────────────────────────────────────────

    pub async fn get_lan_config(&self, dsn: &str) -> Result<LanConfigRecord, Error> {
        let wrapped: LanConfigWrapper = self.get(&format!("apiv1/dsns/{dsn}/lan.json"), &[]).await?;
        Ok(wrapped.lanip)
    }
}

impl std::fmt::Debug for DeviceServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceServiceClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

// ── Shared helpers ───────────────────────────────────────────────────

/// Ensure the base URL ends with `/` so relative joins append.
pub(crate) fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

pub(crate) async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    if status.is_success() {
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    } else {
        Err(parse_error(status, resp).await)
    }
}

pub(crate) async fn handle_empty(resp: reqwest::Response) -> Result<(), Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(parse_error(status, resp).await)
    }
}

async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
    let raw = resp.text().await.unwrap_or_default();

    let message = match serde_json::from_str::<ErrorResponse>(&raw) {
        Ok(ErrorResponse {
            error: Some(msg), ..
        }) => msg,
        Ok(ErrorResponse {
            errors: Some(errs), ..
        }) => errs.to_string(),
        _ if raw.is_empty() => status.to_string(),
        _ => raw,
    };

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Error::Authentication { message };
    }
    Error::Service {
        status: status.as_u16(),
        message,
    }
}
