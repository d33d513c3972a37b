//! Throttled, retrying HTTP client wrapping reqwest.
//!
//! Not a browser, just HTTP requests. Every attempt rotates the outbound
//! identity, optionally picks a proxy, and waits a randomized throttle delay
//! before sending. HTTP 403/429 is a definitive deny and fails immediately;
//! any other failure backs off exponentially until the retry budget is spent.

use anyhow::{Context, Result};
use areascope::{BlockReason, FetchConfig, ScraperError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::header::USER_AGENT;
use reqwest::Method;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::stealth::Identity;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF_SECS: f64 = 300.0;

/// Response from a successful request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code (always 2xx).
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

impl FetchResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Per-request constraints. Anything set here overrides the client config.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// URL-encoded form body.
    pub form: Option<Vec<(String, String)>>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl RequestOptions {
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.form = Some(fields);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// What a single attempt will use, decided before any await point.
struct AttemptPlan {
    identity: Identity,
    client_index: Option<usize>,
    delay: Duration,
}

/// HTTP client used by network source adapters.
///
/// Each instance owns its throttle RNG, so adapters holding separate clients
/// throttle independently.
pub struct FetchClient {
    config: FetchConfig,
    direct: reqwest::Client,
    /// One client per configured proxy, in config order.
    proxied: Vec<reqwest::Client>,
    rng: Mutex<StdRng>,
}

impl FetchClient {
    /// Build a client (and one extra client per proxy) from `config`.
    pub fn new(config: FetchConfig) -> Result<Self> {
        config.validate().context("invalid fetch configuration")?;
        let direct = base_builder(&config)
            .build()
            .context("failed to build HTTP client")?;

        let proxied = config
            .proxies
            .iter()
            .map(|proxy| {
                let proxy = reqwest::Proxy::all(proxy.as_str())
                    .with_context(|| format!("invalid proxy {proxy}"))?;
                base_builder(&config)
                    .proxy(proxy)
                    .build()
                    .context("failed to build proxied HTTP client")
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            direct,
            proxied,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET with default options.
    pub async fn get(&self, url: &str) -> Result<FetchResponse, ScraperError> {
        self.request(url, Method::GET, &RequestOptions::default())
            .await
    }

    /// GET and return only the body.
    pub async fn get_text(&self, url: &str) -> Result<String, ScraperError> {
        self.get(url).await.map(|r| r.body)
    }

    /// Issue a request with throttling, identity rotation and retry.
    ///
    /// Returns on the first 2xx. Fails with `Blocked` on 403/429 without
    /// further attempts, or with `TimeoutExhausted` once the retry budget is
    /// spent, carrying the last observed error.
    pub async fn request(
        &self,
        url: &str,
        method: Method,
        options: &RequestOptions,
    ) -> Result<FetchResponse, ScraperError> {
        let max_attempts = options.max_retries.unwrap_or(self.config.max_retries).max(1);
        let timeout = options.timeout.unwrap_or_else(|| self.config.timeout());
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            let plan = self.plan_attempt();
            if !plan.delay.is_zero() {
                debug!("throttling {:.1}s before {url}", plan.delay.as_secs_f64());
                tokio::time::sleep(plan.delay).await;
            }

            let client = plan
                .client_index
                .and_then(|i| self.proxied.get(i))
                .unwrap_or(&self.direct);

            let mut builder = client
                .request(method.clone(), url)
                .timeout(timeout)
                .header(USER_AGENT, plan.identity.user_agent.as_str());
            for (name, value) in &plan.identity.headers {
                builder = builder.header(*name, *value);
            }
            for (name, value) in &options.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if !options.query.is_empty() {
                builder = builder.query(&options.query);
            }
            if let Some(form) = &options.form {
                builder = builder.form(form);
            }

            debug!("{method} {url} (attempt {attempt}/{max_attempts})");
            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if resp.status().is_success() {
                        let final_url = resp.url().to_string();
                        let headers = resp
                            .headers()
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                            .collect();
                        match resp.text().await {
                            Ok(body) => {
                                return Ok(FetchResponse {
                                    url: url.to_string(),
                                    final_url,
                                    status,
                                    headers,
                                    body,
                                    attempts: attempt,
                                });
                            }
                            Err(e) => last_error = format!("failed to read body: {e}"),
                        }
                    } else if status == 403 || status == 429 {
                        warn!("blocked by {url} (HTTP {status})");
                        return Err(ScraperError::Blocked {
                            url: url.to_string(),
                            reason: BlockReason::Status(status),
                        });
                    } else {
                        last_error = format!("HTTP {status}");
                    }
                }
                Err(e) => last_error = e.to_string(),
            }

            if attempt < max_attempts {
                let wait = self.backoff(attempt);
                warn!(
                    "request attempt {attempt}/{max_attempts} failed for {url}: {last_error}, retrying in {:.1}s",
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
            }
        }

        warn!("all {max_attempts} attempts failed for {url}: {last_error}");
        Err(ScraperError::TimeoutExhausted {
            url: url.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }

    fn plan_attempt(&self) -> AttemptPlan {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let identity = Identity::random(&mut *rng);
        let client_index = if self.proxied.is_empty() {
            None
        } else {
            Some(rng.gen_range(0..self.proxied.len()))
        };
        let (lo, hi) = (self.config.min_delay_secs, self.config.max_delay_secs);
        let delay = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        AttemptPlan {
            identity,
            client_index,
            delay: Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(Duration::MAX),
        }
    }

    /// `base^attempt + uniform(0, jitter)` seconds.
    fn backoff(&self, attempt: u32) -> Duration {
        let jitter = if self.config.jitter_secs > 0.0 {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            rng.gen_range(0.0..=self.config.jitter_secs)
        } else {
            0.0
        };
        let secs = self.config.backoff_base.powi(attempt as i32) + jitter;
        Duration::from_secs_f64(secs.clamp(0.0, MAX_BACKOFF_SECS))
    }
}

fn base_builder(config: &FetchConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .redirect(reqwest::redirect::Policy::limited(5))
}
