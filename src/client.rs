use crate::report::{
    CliResult, Connectivity, DeviceRecord, NO_FLOOR, NO_LOCATION, TELNET_DISABLED, TELNET_ENABLED,
    TELNET_UNKNOWN,
};
use anyhow::{Context, Result, anyhow, bail};
use colored::Colorize;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderValue, USER_AGENT};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;

pub const PAGE_SIZE: u32 = 100;

const UA: &str = "xiqaudit/0.1";

/// Client for the ExtremeCloud IQ REST API. Carries the bearer token
/// obtained either from configuration or from a login exchange.
#[derive(Debug, Clone)]
pub struct XiqClient {
    base_url: Url,
    http: Client,
    token: String,
}

/// Online listing result: normalized records plus the AP ids that go into
/// the CLI dispatch batch. `ap_ids` stays empty for the offline listing.
#[derive(Debug)]
pub struct DeviceListing {
    pub records: Vec<DeviceRecord>,
    pub ap_ids: Vec<u64>,
}

/// Outcome of the batched CLI dispatch. `detected` flips to true as soon as
/// any device returns non-empty output for the probe command.
#[derive(Debug)]
pub struct CliDispatch {
    pub results: Vec<CliResult>,
    pub detected: bool,
}

#[derive(Debug, Deserialize)]
struct DevicePage {
    page: u32,
    total_pages: u32,
    data: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    id: u64,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    device_function: Option<String>,
    #[serde(default)]
    locations: Option<Vec<RawLocation>>,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    network_policy_name: Option<String>,
    #[serde(default)]
    product_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CliResponse {
    device_cli_outputs: HashMap<String, Vec<CliOutput>>,
}

#[derive(Debug, Deserialize)]
struct CliOutput {
    #[serde(default)]
    output: String,
}

impl RawDevice {
    fn into_record(self, status: Connectivity) -> DeviceRecord {
        // Building is the second-to-last entry of the location hierarchy,
        // floor the last. A hierarchy with a single entry still gets a
        // floor; the building falls back to the placeholder.
        let locations = self.locations.unwrap_or_default();
        let floor = locations
            .last()
            .map(|l| l.name.clone())
            .unwrap_or_else(|| NO_FLOOR.to_string());
        let building = locations
            .len()
            .checked_sub(2)
            .and_then(|i| locations.get(i))
            .map(|l| l.name.clone())
            .unwrap_or_else(|| NO_LOCATION.to_string());

        DeviceRecord {
            id: self.id,
            hostname: self.hostname.unwrap_or_default(),
            status,
            building,
            floor,
            ip: non_empty_or_unknown(self.ip_address),
            policy: non_empty_or_unknown(self.network_policy_name),
            model: non_empty_or_unknown(self.product_type),
            telnet: TELNET_UNKNOWN.to_string(),
        }
    }
}

fn non_empty_or_unknown(value: Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "Unknown".to_string(),
    }
}

impl XiqClient {
    /// Use a pre-shared API token directly as the bearer credential.
    pub fn with_token(base_url: &str, token: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("parsing base URL")?;
        Ok(Self {
            base_url,
            http: build_http()?,
            token: token.trim().to_string(),
        })
    }

    /// Exchange a username/password pair for an access token via `/login`.
    pub fn login(base_url: &str, username: &str, password: &str) -> Result<Self> {
        let parsed = Url::parse(base_url).context("parsing base URL")?;
        let http = build_http()?;
        let url = parsed.join("login").context("joining login path")?;

        let response = http
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(UA))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .context("sending login request")?;

        let status = response.status();
        let body = response.text().context("reading login response")?;
        if !status.is_success() {
            bail!(
                "login failed with HTTP {}{}",
                status.as_u16(),
                error_detail(&body)
            );
        }

        let value: Value = serde_json::from_str(&body).context("parsing login response")?;
        let token = value
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow!("login response did not contain an access token"))?;

        Ok(Self {
            base_url: parsed,
            http,
            token: token.to_string(),
        })
    }

    /// Page through `/devices` for one connectivity state. The online pass
    /// keeps only access points and collects their ids for the dispatch
    /// batch; the offline pass keeps every managed real device.
    pub fn list_devices(&self, state: Connectivity) -> Result<DeviceListing> {
        let mut page: u32 = 1;
        let mut total_pages: u32 = 1;
        let mut records = Vec::new();
        let mut ap_ids = Vec::new();

        while page <= total_pages {
            let query = [
                ("page", page.to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("connected", state.connected_param().to_string()),
                ("adminStates", "MANAGED".to_string()),
                ("views", "FULL".to_string()),
                ("deviceTypes", "REAL".to_string()),
            ];
            let body: DevicePage = self.get_json("devices", &query)?;

            for raw in body.data {
                if state == Connectivity::Online {
                    if raw.device_function.as_deref() != Some("AP") {
                        continue;
                    }
                    ap_ids.push(raw.id);
                }
                records.push(raw.into_record(state));
            }

            total_pages = body.total_pages;
            let progress = format!(
                "Completed page {} of {} collecting {} devices",
                body.page,
                body.total_pages,
                state.label()
            );
            match state {
                Connectivity::Online => println!("{}", progress.green()),
                Connectivity::Offline => println!("{}", progress.dimmed()),
            }
            page = body.page + 1;
        }

        Ok(DeviceListing { records, ap_ids })
    }

    /// Run one CLI command on all given devices in a single synchronous
    /// batch and classify each device's output. Empty output means the
    /// probed feature is absent from the running config.
    pub fn send_cli(&self, ids: &[u64], command: &str) -> Result<CliDispatch> {
        let url = self
            .base_url
            .join("devices/:cli")
            .context("joining CLI dispatch path")?;
        let payload = json!({
            "devices": { "ids": ids },
            "clis": [command],
        });

        let response = self
            .http
            .request(Method::POST, url)
            .query(&[("async", "false")])
            .bearer_auth(&self.token)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(UA))
            .json(&payload)
            .send()
            .context("sending CLI dispatch request")?;

        let status = response.status();
        let body = response.text().context("reading CLI dispatch response")?;
        if !status.is_success() {
            bail!(
                "CLI dispatch failed with HTTP {}{}",
                status.as_u16(),
                error_detail(&body)
            );
        }

        let parsed: CliResponse =
            serde_json::from_str(&body).context("parsing CLI dispatch response")?;

        let mut results = Vec::with_capacity(parsed.device_cli_outputs.len());
        let mut detected = false;
        for (id, outputs) in parsed.device_cli_outputs {
            let id: u64 = id
                .parse()
                .with_context(|| format!("non-numeric device id `{id}` in CLI output"))?;
            let output = outputs.first().map(|o| o.output.as_str()).unwrap_or("");
            let telnet = if output.is_empty() {
                TELNET_DISABLED
            } else {
                detected = true;
                TELNET_ENABLED
            };
            results.push(CliResult {
                id,
                telnet: telnet.to_string(),
            });
        }

        Ok(CliDispatch { results, detected })
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("joining path `{}` to base URL", path))?;

        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(&self.token)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(UA))
            .send()
            .with_context(|| format!("requesting {}", path))?;

        let status = response.status();
        let body = response.text().context("reading response body")?;
        if !status.is_success() {
            bail!(
                "request to {} failed with HTTP {}{}",
                path,
                status.as_u16(),
                error_detail(&body)
            );
        }

        serde_json::from_str(&body).with_context(|| format!("parsing response from {}", path))
    }
}

fn build_http() -> Result<Client> {
    Client::builder()
        .user_agent(HeaderValue::from_static(UA))
        .build()
        .context("building HTTP client")
}

/// The API reports failures as `{"error_message": "..."}`; surface that
/// alongside the status code when present.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error_message")
                .and_then(|m| m.as_str())
                .map(|m| format!(": {}", m))
        })
        .unwrap_or_default()
}
