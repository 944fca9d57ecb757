// src/fetch.rs

use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
};
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::{Config, Credentials};
use crate::error::FetchError;

/// Longest slice of an error body kept in a `FetchError::Status`.
const SNIPPET_LEN: usize = 200;

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub url: String,
    pub body: String,
}

/// Everything needed to issue the single GET of a run.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub user_agent: String,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl FetchRequest {
    /// Build the request from config, appending `query` to the source URL.
    pub fn from_config(cfg: &Config) -> Self {
        let mut url = cfg.source_url.clone();
        if !cfg.query.is_empty() {
            url.query_pairs_mut().extend_pairs(cfg.query.iter());
        }
        Self {
            url,
            headers: cfg.headers.clone(),
            user_agent: cfg.user_agent.clone(),
            credentials: cfg.credentials.clone(),
            timeout: cfg.timeout,
            verify_tls: cfg.verify_tls,
        }
    }
}

/// A source of raw responses. Performs exactly one attempt per call.
pub trait Fetch {
    fn fetch(&self, req: &FetchRequest) -> Result<RawResponse, FetchError>;
}

/// Blocking HTTP(S) fetcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

impl HttpFetcher {
    fn client(&self, req: &FetchRequest) -> Result<Client, FetchError> {
        let mut headers = HeaderMap::new();
        for (k, v) in &req.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(k.clone()))?;
            let value =
                HeaderValue::from_str(v).map_err(|_| FetchError::InvalidHeader(k.clone()))?;
            headers.insert(name, value);
        }

        Client::builder()
            .user_agent(req.user_agent.clone())
            .default_headers(headers)
            .timeout(req.timeout)
            .danger_accept_invalid_certs(!req.verify_tls)
            .build()
            .map_err(FetchError::Client)
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(url = %req.url))]
    fn fetch(&self, req: &FetchRequest) -> Result<RawResponse, FetchError> {
        let url = req.url.to_string();
        if !req.verify_tls {
            info!("TLS certificate verification disabled");
        }

        let client = self.client(req)?;
        let mut builder = client.get(req.url.clone());
        builder = match &req.credentials {
            Some(Credentials::Bearer { bearer_token }) => builder.bearer_auth(bearer_token),
            Some(Credentials::Basic { username, password }) => {
                builder.basic_auth(username, password.as_ref())
            }
            None => builder,
        };

        let resp = builder.send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.clone(),
                    seconds: req.timeout.as_secs(),
                }
            } else {
                FetchError::Connect {
                    url: url.clone(),
                    source: e,
                }
            }
        })?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(status = status.as_u16(), ?content_type, "response headers");

        let body = resp.text().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.clone(),
                    seconds: req.timeout.as_secs(),
                }
            } else {
                FetchError::Body {
                    url: url.clone(),
                    source: e,
                }
            }
        })?;

        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
                snippet: snippet(&body),
            });
        }

        info!(status = status.as_u16(), bytes = body.len(), "fetched");
        Ok(RawResponse {
            status: status.as_u16(),
            content_type,
            url: final_url,
            body,
        })
    }
}

/// First line of `body`, cut to `SNIPPET_LEN` chars.
fn snippet(body: &str) -> String {
    let line = body.trim().lines().next().unwrap_or_default();
    line.chars().take(SNIPPET_LEN).collect()
}
