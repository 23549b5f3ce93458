use super::robots::{RobotsCache, RobotsRules};
use super::{check_host, RequestOptions, Transport};
use crate::errors::{BrowserError, Result};
use crate::types::{Headers, HttpTransportConfig, Request, Response};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("testbrowser/", env!("CARGO_PKG_VERSION"));

/// Transport over real HTTP. Redirects are left to the browser.
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
    user_agent: String,
    robots: RobotsCache,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent.clone())
            .build()?;
        let robots = RobotsCache::new(Duration::from_secs(config.robots_ttl_secs));
        Ok(Self {
            client,
            config,
            user_agent,
            robots,
        })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    async fn robots_for(&self, url: &Url) -> Result<RobotsRules> {
        let origin = RobotsCache::origin_of(url);
        if let Some(rules) = self.robots.get(&origin) {
            return Ok(rules);
        }
        let robots_url = url.join("/robots.txt")?;
        info!(url = %robots_url, "fetching robots.txt");
        let rules = match self.fetch_robots(&robots_url).await {
            Ok(rules) => rules,
            Err(err) => {
                warn!(url = %robots_url, error = %err, "robots.txt unavailable, allowing all");
                RobotsRules::allow_all()
            }
        };
        debug!(origin = %origin, "robots.txt cached");
        self.robots.insert(&origin, rules.clone());
        Ok(rules)
    }

    /// 2xx bodies are parsed; 401 and 403 forbid everything, any other
    /// status allows everything.
    async fn fetch_robots(&self, robots_url: &Url) -> Result<RobotsRules> {
        let response = self.client.get(robots_url.as_str()).send().await?;
        let status = response.status().as_u16();
        Ok(match status {
            200..=299 => RobotsRules::parse(&response.text().await?),
            401 | 403 => RobotsRules::disallow_all(),
            _ => RobotsRules::allow_all(),
        })
    }

    fn check_allowed(&self, request: &Request) -> Result<()> {
        if self.config.allowed_hosts.is_empty() {
            return Ok(());
        }
        let allowed: Vec<&str> = self
            .config
            .allowed_hosts
            .iter()
            .map(String::as_str)
            .collect();
        check_host(request, &allowed)
    }
}

#[async_trait(?Send)]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request, _options: RequestOptions) -> Result<Response> {
        self.check_allowed(request)?;
        if self.config.respect_robots {
            let rules = self.robots_for(&request.url).await?;
            if !rules.can_fetch(&self.user_agent, &request.url) {
                warn!(url = %request.url, "request disallowed by robots.txt");
                return Err(BrowserError::RobotExclusion(request.url.to_string()));
            }
        }

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| BrowserError::InvalidArgument(e.to_string()))?;
        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        debug!(url = %request.url, status, bytes = body.len(), "http response");
        Ok(Response::new(request.url.clone(), status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(config: HttpTransportConfig) -> HttpTransport {
        HttpTransport::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_robots_allows_all() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let transport = transport(HttpTransportConfig {
            respect_robots: true,
            timeout_secs: 5,
            ..HttpTransportConfig::default()
        });
        let url = Url::parse(&format!("http://127.0.0.1:{}/private", port)).unwrap();
        let rules = transport.robots_for(&url).await.unwrap();
        assert!(rules.can_fetch("testbrowser", &url));
        let request = Request::new("GET", url);
        assert!(matches!(
            transport.send(&request, RequestOptions::default()).await,
            Err(BrowserError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_get_returns_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html; charset=utf-8")
                    .set_body_string("<title>Hi</title>"),
            )
            .mount(&mock_server)
            .await;

        let http = transport(HttpTransportConfig::default());
        let url = Url::parse(&format!("{}/page", mock_server.uri())).unwrap();
        let response = http
            .send(&Request::new("GET", url), RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(response.is_html());
        assert_eq!(response.text(), "<title>Hi</title>");
    }

    #[tokio::test]
    async fn test_post_body_and_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(header("Content-Type", "application/x-www-form-urlencoded"))
            .and(body_string("a=1&b=x+y"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&mock_server)
            .await;

        let http = transport(HttpTransportConfig::default());
        let url = Url::parse(&format!("{}/submit", mock_server.uri())).unwrap();
        let request = Request::new("POST", url)
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(b"a=1&b=x+y".to_vec());
        let response = http.send(&request, RequestOptions::default()).await.unwrap();
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn test_redirects_are_not_followed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
            .mount(&mock_server)
            .await;

        let http = transport(HttpTransportConfig::default());
        let url = Url::parse(&format!("{}/old", mock_server.uri())).unwrap();
        let response = http
            .send(&Request::new("GET", url), RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(response.header("location"), Some("/new"));
    }

    #[tokio::test]
    async fn test_host_allow_list() {
        let config = HttpTransportConfig {
            allowed_hosts: vec!["example.org".to_string()],
            ..Default::default()
        };
        let http = transport(config);
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        assert!(matches!(
            http.send(&Request::new("GET", url), RequestOptions::default())
                .await,
            Err(BrowserError::HostNotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn test_robots_exclusion_is_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/public"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let config = HttpTransportConfig {
            respect_robots: true,
            ..Default::default()
        };
        let http = transport(config);
        let public = Url::parse(&format!("{}/public", mock_server.uri())).unwrap();
        let private = Url::parse(&format!("{}/private/x", mock_server.uri())).unwrap();
        assert!(http
            .send(&Request::new("GET", public), RequestOptions::default())
            .await
            .is_ok());
        assert!(matches!(
            http.send(&Request::new("GET", private), RequestOptions::default())
                .await,
            Err(BrowserError::RobotExclusion(_))
        ));
    }

    #[tokio::test]
    async fn test_forbidden_robots_disallows_everything() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let config = HttpTransportConfig {
            respect_robots: true,
            ..Default::default()
        };
        let http = transport(config);
        let url = Url::parse(&format!("{}/anything", mock_server.uri())).unwrap();
        assert!(matches!(
            http.send(&Request::new("GET", url), RequestOptions::default())
                .await,
            Err(BrowserError::RobotExclusion(_))
        ));
    }
}
