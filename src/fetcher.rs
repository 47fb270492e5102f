use async_trait::async_trait;
use config::ConfigError;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FetcherConfig;
use crate::utils::error::{AppError, FetchError, Result};

const FALLBACK_USER_AGENT: &str = "Mozilla/5.0";

static REQUESTS_ISSUED: AtomicU64 = AtomicU64::new(0);

/// Requests sent by every fetcher in this process, retries included.
pub fn requests_issued() -> u64 {
    REQUESTS_ISSUED.load(Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// One HTTP GET, no retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, user_agent: &str) -> std::result::Result<RawResponse, FetchError>;
}

/// Anything that can turn a listing URL into page markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// `index` is the position of `url` in the current batch, for logging.
    async fn fetch(&self, url: &str, index: usize) -> std::result::Result<String, FetchError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, header_value(&config.accept_language)?);
        headers.insert(REFERER, header_value(&config.referer)?);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Config(ConfigError::Message(format!("Invalid header value '{}': {}", value, e))))
}

fn request_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, user_agent: &str) -> std::result::Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| request_error(url, e))?;

        Ok(RawResponse { status, body })
    }
}

/// 403 and 429 mean the site wants us to slow down.
fn is_blocking(status: u16) -> bool {
    status == 403 || status == 429
}

/// Polite GET with a base delay before every request and tiered backoff on
/// blocking responses.
pub struct Fetcher<T: Transport = ReqwestTransport> {
    transport: T,
    config: FetcherConfig,
}

impl Fetcher<ReqwestTransport> {
    pub fn from_config(config: FetcherConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn with_transport(transport: T, config: FetcherConfig) -> Self {
        Self { transport, config }
    }

    fn pick_user_agent(&self) -> String {
        self.config
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
            .to_string()
    }

    fn max_retries(&self) -> usize {
        self.config.retry_tiers.len()
    }
}

#[async_trait]
impl<T: Transport> PageFetcher for Fetcher<T> {
    async fn fetch(&self, url: &str, index: usize) -> std::result::Result<String, FetchError> {
        let mut retries = 0;

        loop {
            let wait = self.config.base_delay.sample();
            tokio::time::sleep(wait).await;

            let user_agent = self.pick_user_agent();
            REQUESTS_ISSUED.fetch_add(1, Ordering::Relaxed);
            debug!("[{}] GET {} (attempt {})", index + 1, url, retries + 1);

            let response = self.transport.get(url, &user_agent).await?;

            if is_blocking(response.status) {
                if retries >= self.max_retries() {
                    return Err(FetchError::Blocked {
                        url: url.to_string(),
                        attempts: (retries + 1) as u32,
                    });
                }

                let backoff = self.config.retry_tiers[retries].sample();
                warn!(
                    "[{}] {} answered {}, backing off {:.1}s",
                    index + 1,
                    url,
                    response.status,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                retries += 1;
                continue;
            }

            if !(200..300).contains(&response.status) {
                return Err(FetchError::Network {
                    url: url.to_string(),
                    message: format!("HTTP {}", response.status),
                });
            }

            return Ok(response.body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayRange;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ScriptedTransport {
        responses: Mutex<VecDeque<std::result::Result<RawResponse, FetchError>>>,
        user_agents: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(statuses: &[u16]) -> Self {
            let responses = statuses
                .iter()
                .map(|status| {
                    Ok(RawResponse {
                        status: *status,
                        body: format!("<html>{}</html>", status),
                    })
                })
                .collect();
            Self {
                responses: Mutex::new(responses),
                user_agents: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: FetchError) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from(vec![Err(error)])),
                user_agents: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.user_agents.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, _url: &str, user_agent: &str) -> std::result::Result<RawResponse, FetchError> {
            self.user_agents.lock().unwrap().push(user_agent.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted")
        }
    }

    fn instant_config() -> FetcherConfig {
        FetcherConfig {
            base_delay: DelayRange::new(0, 0),
            retry_tiers: vec![DelayRange::new(0, 0), DelayRange::new(0, 0)],
            request_timeout: 5,
            ..FetcherConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_waits_base_delay() {
        let fetcher = Fetcher::with_transport(ScriptedTransport::new(&[200]), FetcherConfig::default());
        let start = tokio::time::Instant::now();

        let body = fetcher.fetch("https://www.leboncoin.fr/ad/1", 0).await.unwrap();

        let elapsed = start.elapsed();
        assert_eq!(body, "<html>200</html>");
        assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(3_100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_two_blocks() {
        let transport = ScriptedTransport::new(&[403, 429, 200]);
        let fetcher = Fetcher::with_transport(transport, FetcherConfig::default());
        let start = tokio::time::Instant::now();

        let body = fetcher.fetch("https://www.leboncoin.fr/ad/1", 0).await.unwrap();

        // three base delays, then the 5-7s and 25-27s tiers
        let elapsed = start.elapsed();
        assert_eq!(body, "<html>200</html>");
        assert!(elapsed >= Duration::from_secs(2 * 3 + 5 + 25), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis((3 * 3 + 7 + 27) * 1_000 + 100), "elapsed {:?}", elapsed);
        assert_eq!(fetcher.transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_after_retry_bound() {
        let fetcher = Fetcher::with_transport(ScriptedTransport::new(&[403, 403, 403]), FetcherConfig::default());

        let err = fetcher.fetch("https://www.leboncoin.fr/ad/1", 4).await.unwrap_err();

        assert_eq!(
            err,
            FetchError::Blocked {
                url: "https://www.leboncoin.fr/ad/1".to_string(),
                attempts: 3,
            }
        );
        assert_eq!(fetcher.transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_status_is_network_error() {
        let fetcher = Fetcher::with_transport(ScriptedTransport::new(&[503]), FetcherConfig::default());

        let err = fetcher.fetch("https://www.leboncoin.fr/ad/1", 0).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { ref message, .. } if message == "HTTP 503"));
        assert_eq!(fetcher.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_not_retried() {
        let timeout = FetchError::Timeout {
            url: "https://www.leboncoin.fr/ad/1".to_string(),
        };
        let fetcher = Fetcher::with_transport(ScriptedTransport::failing(timeout.clone()), FetcherConfig::default());

        assert_eq!(fetcher.fetch("https://www.leboncoin.fr/ad/1", 0).await, Err(timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_agent_comes_from_pool() {
        let config = FetcherConfig::default();
        let pool = config.user_agents.clone();
        let fetcher = Fetcher::with_transport(ScriptedTransport::new(&[403, 403, 200]), config);
        let before = requests_issued();

        fetcher.fetch("https://www.leboncoin.fr/ad/1", 0).await.unwrap();

        let used = fetcher.transport.user_agents.lock().unwrap().clone();
        assert_eq!(used.len(), 3);
        assert!(used.iter().all(|ua| pool.contains(ua)));
        assert!(requests_issued() >= before + 3);
    }

    #[tokio::test]
    async fn test_reqwest_transport_sends_browser_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ad/ventes_immobilieres/1"))
            .and(header_exists("user-agent"))
            .and(header_exists("accept-language"))
            .and(header("referer", "https://www.leboncoin.fr/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>annonce</html>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::from_config(instant_config()).unwrap();
        let url = format!("{}/ad/ventes_immobilieres/1", mock_server.uri());

        assert_eq!(fetcher.fetch(&url, 0).await.unwrap(), "<html>annonce</html>");
    }

    #[tokio::test]
    async fn test_reqwest_transport_blocked() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(3)
            .mount(&mock_server)
            .await;

        let fetcher = Fetcher::from_config(instant_config()).unwrap();
        let url = format!("{}/ad/ventes_immobilieres/2", mock_server.uri());

        let err = fetcher.fetch(&url, 0).await.unwrap_err();
        assert!(matches!(err, FetchError::Blocked { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_reqwest_transport_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let config = FetcherConfig {
            request_timeout: 1,
            ..instant_config()
        };
        let fetcher = Fetcher::from_config(config).unwrap();
        let url = format!("{}/ad/ventes_immobilieres/3", mock_server.uri());

        let err = fetcher.fetch(&url, 0).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_reqwest_transport_connection_refused() {
        let fetcher = Fetcher::from_config(instant_config()).unwrap();

        let err = fetcher.fetch("http://127.0.0.1:9/ad/1", 0).await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
