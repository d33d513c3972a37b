//! Outbound identity rotation shared by the fetch client and the browser.
//!
//! Every attempt presents a realistic desktop browser: a user-agent drawn
//! from a fixed pool plus the headers that browser would send alongside it.

use rand::seq::SliceRandom;
use rand::Rng;

/// Realistic desktop user-agents (current stable Chrome, Firefox, Safari, Edge).
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-GB,en;q=0.9";

/// A user-agent plus its companion request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
    pub headers: Vec<(&'static str, &'static str)>,
}

impl Identity {
    /// Identity for a specific user-agent string.
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            headers: vec![
                ("Accept", ACCEPT),
                ("Accept-Language", ACCEPT_LANGUAGE),
                ("DNT", "1"),
            ],
        }
    }

    /// Draw a fresh identity from the pool.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::with_user_agent(random_user_agent(rng))
    }
}

pub fn random_user_agent<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0])
}

/// Pick one proxy uniformly, or `None` for a direct connection.
pub fn pick_proxy<'a, R: Rng + ?Sized>(rng: &mut R, proxies: &'a [String]) -> Option<&'a str> {
    proxies.choose(rng).map(String::as_str)
}

/// Chromium flags that remove the obvious automation fingerprints.
pub fn browser_args(user_agent: &str, proxy: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-extensions".to_string(),
        format!("--user-agent={user_agent}"),
    ];
    if let Some(proxy) = proxy {
        args.push(format!("--proxy-server={proxy}"));
    }
    args
}
