use crate::errors::Result;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Select the first item of radio groups and multi-selects that have no
    /// selection in the markup.
    pub select_default: bool,
    pub handle_errors: bool,
    pub raise_http_errors: bool,
    pub max_redirects: usize,
    pub user_agent: Option<String>,
    /// Cookie domains without a leading dot match their exact host only.
    pub strict_cookie_domains: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            select_default: false,
            handle_errors: true,
            raise_http_errors: true,
            max_redirects: 100,
            user_agent: None,
            strict_cookie_domains: true,
        }
    }
}

impl BrowserConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
    /// Hosts (and their subdomains) that may be contacted; empty allows all.
    pub allowed_hosts: Vec<String>,
    pub respect_robots: bool,
    pub robots_ttl_secs: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: None,
            allowed_hosts: Vec::new(),
            respect_robots: false,
            robots_ttl_secs: 300,
        }
    }
}

impl HttpTransportConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

/// HTTP header list with case-insensitive names and repeated entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn append(&mut self, name: &str, value: &str) {
        self.0.push((name.to_string(), value.to_string()));
    }

    /// Replaces every entry named `name` with a single one.
    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.append(name, value);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before != self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.0 {
            writeln!(f, "{}: {}", k, v)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_uppercase(),
            url,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(url: Url, status: u16, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            url,
            status,
            reason: reason_phrase(status).to_string(),
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers.get_all(name)
    }

    /// Media type without parameters, lower-cased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_lowercase())
            .filter(|ct| !ct.is_empty())
    }

    /// Charset parameter of the content type, `latin-1` when absent.
    pub fn charset(&self) -> String {
        self.header("content-type")
            .and_then(|ct| {
                ct.split(';').skip(1).find_map(|param| {
                    let (k, v) = param.split_once('=')?;
                    k.trim()
                        .eq_ignore_ascii_case("charset")
                        .then(|| v.trim().trim_matches('"').to_lowercase())
                })
            })
            .unwrap_or_else(|| "latin-1".to_string())
    }

    /// Body decoded with the response charset; unknown labels decode as
    /// windows-1252.
    pub fn text(&self) -> String {
        let encoding =
            Encoding::for_label(self.charset().as_bytes()).unwrap_or(encoding_rs::WINDOWS_1252);
        let (text, _) = encoding.decode_without_bom_handling(&self.body);
        text.into_owned()
    }

    pub fn is_html(&self) -> bool {
        matches!(
            self.content_type().as_deref(),
            Some("text/html") | Some("application/xhtml+xml")
        )
    }

    pub fn status_line(&self) -> String {
        format!("{} {}", self.status, self.reason)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with(content_type: &str, body: &[u8]) -> Response {
        let headers: Headers = vec![("Content-Type", content_type)].into_iter().collect();
        Response::new(
            Url::parse("http://localhost/").unwrap(),
            200,
            headers,
            body.to_vec(),
        )
    }

    #[test]
    fn test_text_decodes_charset() {
        let cp1252 = body_with("text/plain; charset=windows-1252", b"\x80 caf\xe9");
        assert_eq!(cp1252.text(), "\u{20ac} caf\u{e9}");
        let latin = body_with("text/plain", b"\x80");
        assert_eq!(latin.charset(), "latin-1");
        assert_eq!(latin.text(), "\u{20ac}");
        let sjis = body_with("text/html; charset=Shift_JIS", b"\x82\xa0");
        assert_eq!(sjis.text(), "\u{3042}");
        let utf8 = body_with("text/html; charset=\"UTF-8\"", "\u{e9}t\u{e9}".as_bytes());
        assert_eq!(utf8.text(), "\u{e9}t\u{e9}");
        let unknown = body_with("text/plain; charset=x-nothing", b"\xe9");
        assert_eq!(unknown.text(), "\u{e9}");
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = BrowserConfig::default();
        assert_eq!(config.max_redirects, 100);
        assert!(config.handle_errors);
        let parsed = BrowserConfig::from_json(r#"{"select_default": true}"#).unwrap();
        assert!(parsed.select_default);
        assert!(parsed.raise_http_errors);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");
        assert_eq!(headers.get_all("SET-COOKIE"), vec!["a=1", "b=2"]);
        headers.set("SET-COOKIE", "c=3");
        assert_eq!(headers.get_all("set-cookie"), vec!["c=3"]);
        assert!(headers.remove("Set-Cookie"));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_response_charset_and_text() {
        let url = Url::parse("http://localhost/").unwrap();
        let headers: Headers = vec![("Content-Type", "text/html; charset=UTF-8")]
            .into_iter()
            .collect();
        let response = Response::new(url.clone(), 200, headers, "caf\u{e9}".as_bytes().to_vec());
        assert!(response.is_html());
        assert_eq!(response.charset(), "utf-8");
        assert_eq!(response.text(), "caf\u{e9}");
        assert_eq!(response.status_line(), "200 OK");

        let latin = Response::new(url, 200, Headers::new(), vec![0x63, 0xe9]);
        assert_eq!(latin.charset(), "latin-1");
        assert_eq!(latin.text(), "c\u{e9}");
        assert!(!latin.is_html());
    }
}
