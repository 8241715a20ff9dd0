//! reqwest-backed HTTP capability.
//!
//! Proxies are a client-level setting in reqwest, so one client is kept per
//! distinct proxy URL.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

use super::{HttpFetcher, HttpRequest, HttpResponse};
use crate::errors::FetchError;

// Headers kept on the response
const KEPT_HEADERS: &[&str] = &["content-type", "content-language", "last-modified", "location"];

/// HTTP fetcher over reqwest
pub struct ReqwestFetcher {
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: &Option<String>) -> Result<Client, FetchError> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(Duration::from_secs(10));

        builder = match proxy {
            Some(url) => {
                let proxy = reqwest::Proxy::all(url)
                    .map_err(|e| FetchError::Unreachable(format!("invalid proxy '{}': {}", url, e)))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| FetchError::Unreachable(format!("failed to build HTTP client: {}", e)))?;
        clients.insert(proxy.clone(), client.clone());
        Ok(client)
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(format!("{}: {}", url, error))
    } else {
        FetchError::Unreachable(format!("{}: {}", url, error))
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let client = self.client_for(&request.proxy)?;

        let mut builder = client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| classify(&request.url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter(|(k, _)| KEPT_HEADERS.contains(&k.as_str()))
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let body = response.text().await.map_err(|e| classify(&request.url, e))?;

        Ok(HttpResponse {
            status,
            body,
            headers,
            final_url,
        })
    }
}
