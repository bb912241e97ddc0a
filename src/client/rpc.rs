//! HTTPS transport for signed RPC calls.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::signature::{add_common_params, sign, string_to_sign};
use super::{Action, ApiError, ApiFuture, CloudApi, Method};
use crate::builder::Params;

/// Access key pair used to sign requests.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    /// Creates a key pair, trimming surrounding whitespace.
    #[must_use]
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into().trim().to_owned(),
            secret_key: secret_key.into().trim().to_owned(),
        }
    }

    /// Public half of the key pair.
    #[must_use]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    request_id: Option<String>,
}

/// Production [`CloudApi`] implementation over HTTPS.
#[derive(Clone, Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    credentials: Credentials,
    region: String,
    endpoint: Option<String>,
}

impl RpcClient {
    /// Creates a client bound to `region`. When `endpoint` is set it replaces
    /// the `<product>.<region>.aliyuncs.com` host for every product.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the HTTP client cannot be built.
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Transport {
                message: err.to_string(),
            })?;
        Ok(Self {
            http,
            credentials,
            region: region.into(),
            endpoint: endpoint.filter(|value| !value.trim().is_empty()),
        })
    }

    fn url_for(&self, action: &Action) -> String {
        match &self.endpoint {
            Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {
                endpoint.clone()
            }
            Some(host) => format!("https://{host}/"),
            None => format!("https://{}.{}.aliyuncs.com/", action.product, self.region),
        }
    }

    fn signed_query(
        &self,
        action: &Action,
        params: &Params,
    ) -> Result<BTreeMap<String, String>, ApiError> {
        let mut query: BTreeMap<String, String> = params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        query
            .entry("RegionId".to_owned())
            .or_insert_with(|| self.region.clone());
        add_common_params(
            &mut query,
            action,
            self.credentials.access_key(),
            Utc::now(),
            &Uuid::new_v4().to_string(),
        );
        let signature = sign(
            &self.credentials.secret_key,
            &string_to_sign(action.method, &query),
        )?;
        query.insert("Signature".to_owned(), signature);
        Ok(query)
    }

    async fn send(&self, action: &Action, params: &Params) -> Result<serde_json::Value, ApiError> {
        let query = self.signed_query(action, params)?;
        let url = self.url_for(action);
        debug!(action = action.name, url = %url, params = params.len(), "sending request");

        let request = match action.method {
            Method::Get => self.http.get(&url).query(&query),
            Method::Post => self.http.post(&url).form(&query),
        };
        let response = request.send().await.map_err(|err| ApiError::Transport {
            message: err.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|err| ApiError::Transport {
            message: err.to_string(),
        })?;
        debug!(action = action.name, status = status.as_u16(), "received response");

        if !status.is_success() {
            let error: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let code = if error.code.is_empty() {
                format!("Http{}", status.as_u16())
            } else {
                error.code
            };
            return Err(ApiError::Service {
                code,
                message: error.message,
                request_id: error.request_id,
                status: status.as_u16(),
            });
        }
        serde_json::from_str(&body).map_err(|err| ApiError::Malformed {
            message: err.to_string(),
        })
    }
}

impl CloudApi for RpcClient {
    fn region(&self) -> &str {
        &self.region
    }

    fn call<'a>(&'a self, action: &'a Action, params: &'a Params) -> ApiFuture<'a> {
        Box::pin(self.send(action, params))
    }
}
