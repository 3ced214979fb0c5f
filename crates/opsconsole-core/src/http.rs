use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::ConsoleConfig;
use crate::error::{ClientError, ClientResult};

pub const LOGIN_PATH: &str = "/login";
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// A JSON request/response channel to the console backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> ClientResult<Value>;
}

/// Cookie-carrying HTTP client for the console API.
///
/// Every request goes out with the session cookies; mutating requests also
/// carry the anti-forgery header. A 401/403 publishes [`LOGIN_PATH`] on the
/// location channel and fails with [`ClientError::Unauthorized`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    jar: Arc<Jar>,
    location: Arc<watch::Sender<Option<String>>>,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {}", base_url, err)))?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(timeout)
            .build()?;
        let (location, _) = watch::channel(None);

        Ok(Self {
            client,
            base_url,
            jar,
            location: Arc::new(location),
        })
    }

    pub fn from_config(config: &ConsoleConfig) -> ClientResult<Self> {
        let client = Self::new(&config.base_url, config.request_timeout())?;
        if let Some(cookies) = &config.session_cookie {
            client.seed_cookies(cookies);
        }
        Ok(client)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Add `name=value; name2=value2` pairs to the jar for the base URL.
    pub fn seed_cookies(&self, raw: &str) {
        for pair in raw.split(';').map(str::trim).filter(|p| p.contains('=')) {
            self.jar.add_cookie_str(pair, &self.base_url);
        }
    }

    /// Where the console has been sent; `Some("/login")` after an auth failure.
    pub fn location(&self) -> watch::Receiver<Option<String>> {
        self.location.subscribe()
    }

    pub fn login_url(&self) -> String {
        self.base_url
            .join(LOGIN_PATH)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| LOGIN_PATH.to_string())
    }

    /// Current anti-forgery token, percent-decoded. Empty when the cookie is
    /// not set.
    pub fn xsrf_token(&self) -> String {
        let Some(header) = self.jar.cookies(&self.base_url) else {
            return String::new();
        };
        let Ok(cookies) = header.to_str() else {
            return String::new();
        };
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == XSRF_COOKIE)
            .map(|(_, value)| {
                urlencoding::decode(value)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| value.to_string())
            })
            .unwrap_or_default()
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {}", path, err)))
    }
}

fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

#[async_trait]
impl Transport for HttpClient {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> ClientResult<Value> {
        let url = self.endpoint(path)?;
        debug!(%method, %path, "console request");

        let mut builder = self
            .client
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");
        if is_mutating(&method) {
            builder = builder.header(XSRF_HEADER, self.xsrf_token());
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            info!(%status, %path, "session rejected, redirecting to login");
            self.location.send_replace(Some(LOGIN_PATH.to_string()));
            return Err(ClientError::Unauthorized);
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Http { status, body: text });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}
