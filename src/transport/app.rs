use super::{check_host, RequestOptions, Transport};
use crate::errors::{BrowserError, Result};
use crate::types::{Headers, Request, Response};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, warn};

/// Hosts an in-process application answers for (subdomains included).
pub const ALLOWED_HOSTS: &[&str] = &["localhost", "127.0.0.1", "example.com", "example.net"];

/// Decodes `%XX` escapes; malformed escapes are kept verbatim.
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// `Basic user:password` credentials are sent base64-encoded; anything
/// else passes through.
fn encode_authorization(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, credentials))
            if scheme.eq_ignore_ascii_case("basic") && credentials.contains(':') =>
        {
            format!("{} {}", scheme, STANDARD.encode(credentials))
        }
        _ => value.to_string(),
    }
}

/// CGI-style request description handed to an [`Application`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environ {
    vars: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Environ {
    pub fn from_request(request: &Request, options: RequestOptions) -> Self {
        let url = &request.url;
        let mut vars = BTreeMap::new();
        vars.insert("REQUEST_METHOD".to_string(), request.method.clone());
        vars.insert("SCRIPT_NAME".to_string(), String::new());
        vars.insert("PATH_INFO".to_string(), percent_decode(url.path()));
        vars.insert(
            "QUERY_STRING".to_string(),
            url.query().unwrap_or_default().to_string(),
        );
        vars.insert(
            "SERVER_NAME".to_string(),
            url.host_str().unwrap_or_default().to_string(),
        );
        vars.insert(
            "SERVER_PORT".to_string(),
            url.port_or_known_default().unwrap_or(80).to_string(),
        );
        vars.insert("SERVER_PROTOCOL".to_string(), "HTTP/1.1".to_string());
        vars.insert("wsgi.url_scheme".to_string(), url.scheme().to_string());
        let host = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        vars.insert("HTTP_HOST".to_string(), host);
        for (name, value) in request.headers.iter() {
            let key = match name.to_ascii_lowercase().as_str() {
                "content-type" => "CONTENT_TYPE".to_string(),
                "content-length" => "CONTENT_LENGTH".to_string(),
                _ => format!("HTTP_{}", name.to_uppercase().replace('-', "_")),
            };
            let value = if key == "HTTP_AUTHORIZATION" {
                encode_authorization(value)
            } else {
                value.to_string()
            };
            vars.entry(key)
                .and_modify(|v: &mut String| {
                    v.push_str(", ");
                    v.push_str(&value);
                })
                .or_insert(value);
        }
        if !request.body.is_empty() {
            vars.entry("CONTENT_LENGTH".to_string())
                .or_insert_with(|| request.body.len().to_string());
        }
        if !options.handle_errors {
            vars.insert("wsgi.handleErrors".to_string(), "false".to_string());
            vars.insert("paste.throw_errors".to_string(), "true".to_string());
            vars.insert("x-wsgiorg.throw_errors".to_string(), "true".to_string());
        }
        Self {
            vars,
            body: request.body.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn method(&self) -> &str {
        self.get("REQUEST_METHOD").unwrap_or("GET")
    }

    pub fn path(&self) -> &str {
        self.get("PATH_INFO").unwrap_or("/")
    }

    pub fn query(&self) -> &str {
        self.get("QUERY_STRING").unwrap_or_default()
    }

    /// Request header by its HTTP name, e.g. `header("Referer")`.
    pub fn header(&self, name: &str) -> Option<&str> {
        match name.to_ascii_lowercase().as_str() {
            "content-type" => self.get("CONTENT_TYPE"),
            "content-length" => self.get("CONTENT_LENGTH"),
            _ => self.get(&format!("HTTP_{}", name.to_uppercase().replace('-', "_"))),
        }
    }

    /// Whether the application should let its errors escape.
    pub fn throw_errors(&self) -> bool {
        self.get("wsgi.handleErrors") == Some("false")
    }

    /// Decoded `name=value` pairs of the query string.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query().as_bytes())
            .into_owned()
            .collect()
    }

    /// Decoded pairs of a url-encoded body.
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&self.body).into_owned().collect()
    }
}

/// What an application answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl AppResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::new(200)
            .with_header("Content-Type", "text/html; charset=UTF-8")
            .with_body(body.into().into_bytes())
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(200)
            .with_header("Content-Type", "text/plain; charset=UTF-8")
            .with_body(body.into().into_bytes())
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::new(status).with_header("Location", location)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// An application served in-process.
#[async_trait(?Send)]
pub trait Application {
    async fn call(&self, environ: Environ) -> anyhow::Result<AppResponse>;
}

#[async_trait(?Send)]
impl<F> Application for F
where
    F: Fn(Environ) -> anyhow::Result<AppResponse>,
{
    async fn call(&self, environ: Environ) -> anyhow::Result<AppResponse> {
        self(environ)
    }
}

/// Transport calling an [`Application`] directly; only the hosts in
/// [`ALLOWED_HOSTS`] are reachable.
pub struct AppTransport {
    app: Rc<dyn Application>,
}

impl AppTransport {
    pub fn new(app: Rc<dyn Application>) -> Self {
        Self { app }
    }

    pub fn from_app<A: Application + 'static>(app: A) -> Self {
        Self { app: Rc::new(app) }
    }
}

#[async_trait(?Send)]
impl Transport for AppTransport {
    async fn send(&self, request: &Request, options: RequestOptions) -> Result<Response> {
        check_host(request, ALLOWED_HOSTS)?;
        let environ = Environ::from_request(request, options);
        let start = Instant::now();
        let answer = match self.app.call(environ).await {
            Ok(answer) => answer,
            Err(err) if options.handle_errors => {
                warn!(url = %request.url, error = %err, "application error");
                AppResponse::new(500)
                    .with_header("Content-Type", "text/plain")
                    .with_body(format!("Internal Server Error\n\n{}", err).into_bytes())
            }
            Err(err) => return Err(BrowserError::Application(err)),
        };
        debug!(
            method = %request.method,
            url = %request.url,
            status = answer.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "application answered"
        );
        Ok(Response::new(
            request.url.clone(),
            answer.status,
            answer.headers,
            answer.body,
        ))
    }
}
