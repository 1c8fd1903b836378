// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP transport.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::TransportError;
use crate::protocol::{Credentials, Transport};

/// HTTP method used to poll the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    /// `GET` (most local device APIs).
    #[default]
    Get,
    /// `POST` with an optional JSON body (many cloud APIs).
    Post,
}

/// HTTP transport for devices exposing a REST endpoint.
///
/// The device address may be a bare host (`192.168.1.100`, `inverter.local:8080`)
/// or a full base URL (`https://api.example.com`). The configured path and
/// query parameters are appended to it.
///
/// HTTP is stateless: each fetch is one independent request. The underlying
/// `reqwest::Client` keeps a connection pool, so consecutive polls of the
/// same device reuse the connection when the device allows it.
///
/// # Examples
///
/// ```
/// use pollsync_lib::protocol::HttpTransport;
///
/// let transport = HttpTransport::builder()
///     .path("/solar_api/v1/GetInverterRealtimeData.cgi")
///     .query("Scope", "Device")
///     .query("DataCollection", "CommonInverterData")
///     .build()
///     .unwrap();
///
/// assert_eq!(
///     transport.build_url("192.168.1.50", None),
///     "http://192.168.1.50/solar_api/v1/GetInverterRealtimeData.cgi?Scope=Device&DataCollection=CommonInverterData"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    use_https: bool,
    path: String,
    method: HttpMethod,
    body: Option<serde_json::Value>,
    query: Vec<(String, String)>,
    query_credentials: bool,
}

impl HttpTransport {
    /// Creates an HTTP transport issuing plain `GET /` requests.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, TransportError> {
        HttpTransportBuilder::new().build()
    }

    /// Returns a builder for a customised transport.
    #[must_use]
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    /// Builds the request URL for a device address.
    ///
    /// When query credentials are enabled, the credentials are appended as
    /// `user` and `password` parameters.
    #[must_use]
    pub fn build_url(&self, address: &str, credentials: Option<&Credentials>) -> String {
        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            let scheme = if self.use_https { "https" } else { "http" };
            format!("{scheme}://{}", address.trim_end_matches('/'))
        };

        let mut params: Vec<(&str, &str)> = self
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if self.query_credentials
            && let Some(creds) = credentials
        {
            params.push(("user", creds.username.as_str()));
            params.push(("password", creds.password.as_str()));
        }

        let mut url = format!("{base}{}", self.path);
        for (i, (key, value)) in params.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(&urlencoding::encode(key));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        address: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let url = self.build_url(address, credentials);
        let mut request = match self.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        }
        .timeout(timeout);

        if let Some(body) = &self.body {
            request = request.json(body);
        }
        if !self.query_credentials
            && let Some(creds) = credentials
        {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let address = address.to_string();
        async move {
            tracing::debug!(%address, method = ?self.method, "Sending HTTP poll request");

            let response = request.send().await.map_err(|e| classify(&e, timeout))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(TransportError::auth_failure(format!(
                    "HTTP {}",
                    status.as_u16()
                )));
            }

            if !status.is_success() {
                return Err(TransportError::other(format!(
                    "HTTP {} - {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                )));
            }

            let body = response.bytes().await.map_err(|e| classify(&e, timeout))?;

            tracing::trace!(%address, bytes = body.len(), "Received HTTP response");

            Ok(body.to_vec())
        }
    }
}

/// Maps a reqwest failure onto the transport taxonomy.
fn classify(error: &reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(timeout)
    } else if error.is_connect() {
        TransportError::connection_refused(error.to_string())
    } else {
        TransportError::other(error.to_string())
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Default)]
pub struct HttpTransportBuilder {
    use_https: bool,
    path: Option<String>,
    method: HttpMethod,
    body: Option<serde_json::Value>,
    query: Vec<(String, String)>,
    query_credentials: bool,
    connect_timeout: Option<Duration>,
}

impl HttpTransportBuilder {
    /// Default connect timeout of the pooled client.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `https` for bare host addresses.
    #[must_use]
    pub fn https(mut self) -> Self {
        self.use_https = true;
        self
    }

    /// Sets the request path (e.g. `/api/status`).
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = Some(if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        });
        self
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Sends a JSON body with every request.
    #[must_use]
    pub fn json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sends credentials as `user`/`password` query parameters instead of
    /// HTTP basic auth.
    #[must_use]
    pub fn query_credentials(mut self) -> Self {
        self.query_credentials = true;
        self
    }

    /// Sets the connect timeout of the pooled client.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout.unwrap_or(Self::DEFAULT_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| TransportError::other(e.to_string()))?;

        Ok(HttpTransport {
            client,
            use_https: self.use_https,
            path: self.path.unwrap_or_default(),
            method: self.method,
            body: self.body,
            query: self.query,
            query_credentials: self.query_credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_bare_host() {
        let transport = HttpTransport::new().unwrap();
        assert_eq!(transport.build_url("192.168.1.100", None), "http://192.168.1.100");
    }

    #[test]
    fn build_url_with_port_and_path() {
        let transport = HttpTransport::builder().path("api/data").build().unwrap();
        assert_eq!(
            transport.build_url("airq.local:8080", None),
            "http://airq.local:8080/api/data"
        );
    }

    #[test]
    fn build_url_https_for_bare_host() {
        let transport = HttpTransport::builder().https().build().unwrap();
        assert_eq!(transport.build_url("cloud.example.com", None), "https://cloud.example.com");
    }

    #[test]
    fn build_url_keeps_explicit_scheme() {
        let transport = HttpTransport::builder()
            .https()
            .path("/status")
            .build()
            .unwrap();
        assert_eq!(
            transport.build_url("http://10.0.0.2/", None),
            "http://10.0.0.2/status"
        );
    }

    #[test]
    fn build_url_encodes_query() {
        let transport = HttpTransport::builder()
            .path("/cm")
            .query("cmnd", "Status 0")
            .build()
            .unwrap();
        assert_eq!(
            transport.build_url("192.168.1.100", None),
            "http://192.168.1.100/cm?cmnd=Status%200"
        );
    }

    #[test]
    fn build_url_with_query_credentials() {
        let transport = HttpTransport::builder()
            .path("/cm")
            .query("cmnd", "Status 8")
            .query_credentials()
            .build()
            .unwrap();
        let creds = Credentials::new("admin", "p&ss");
        assert_eq!(
            transport.build_url("192.168.1.100", Some(&creds)),
            "http://192.168.1.100/cm?cmnd=Status%208&user=admin&password=p%26ss"
        );
    }

    #[test]
    fn basic_auth_credentials_stay_out_of_url() {
        let transport = HttpTransport::builder().path("/data").build().unwrap();
        let creds = Credentials::new("admin", "secret");
        assert_eq!(
            transport.build_url("192.168.1.100", Some(&creds)),
            "http://192.168.1.100/data"
        );
    }
}
