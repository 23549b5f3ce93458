use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// A stored cookie. A `domain` starting with `.` matches subdomains; any
/// other domain is host-only (unless domain strictness is turned off).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub expires: Option<DateTime<Utc>>,
    pub port: Option<String>,
    pub comment: Option<String>,
    pub comment_url: Option<String>,
}

impl Cookie {
    pub fn new(name: &str, value: &str, domain: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: domain.to_lowercase(),
            path: path.to_string(),
            secure: false,
            expires: None,
            port: None,
            comment: None,
            comment_url: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|e| e <= now).unwrap_or(false)
    }

    pub fn is_session(&self) -> bool {
        self.expires.is_none()
    }
}

/// Host part of `url` as the jar sees it.
pub fn request_host(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_lowercase()
}

/// True when `host` lies in the cookie `domain`.
pub fn domain_match(host: &str, domain: &str, strict: bool) -> bool {
    match domain.strip_prefix('.') {
        Some(bare) => host == bare || host.ends_with(domain),
        None => host == domain || (!strict && host.ends_with(&format!(".{}", domain))),
    }
}

pub fn path_match(request_path: &str, cookie_path: &str) -> bool {
    request_path.starts_with(cookie_path)
}

/// Directory of the request path, used when a cookie names no path.
pub fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

/// Parses cookie dates: RFC 1123 (`Wed, 02 Jan 2019 00:00:00 GMT`) and the
/// old Netscape dashed form.
pub fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%a, %d-%b-%Y %H:%M:%S GMT", "%A, %d-%b-%y %H:%M:%S GMT", "%a, %d %b %Y %H:%M:%S GMT"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Expiry string as sent in `Set-Cookie`.
pub fn expiration_string(expires: DateTime<Utc>) -> String {
    expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses one `Set-Cookie` header received for `url`.
pub fn parse_set_cookie(header: &str, url: &Url, now: DateTime<Utc>) -> Option<Cookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let mut cookie = Cookie::new(
        name,
        value.trim().trim_matches('"'),
        &request_host(url),
        &default_path(url),
    );
    let mut max_age = None;
    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim().to_lowercase(), v.trim()),
            None => (attr.trim().to_lowercase(), ""),
        };
        match key.as_str() {
            "domain" if !val.is_empty() => {
                let domain = val.to_lowercase();
                cookie.domain = if domain.starts_with('.') {
                    domain
                } else {
                    format!(".{}", domain)
                };
            }
            "path" if val.starts_with('/') => cookie.path = val.to_string(),
            "expires" => cookie.expires = parse_cookie_date(val),
            "max-age" => max_age = val.parse::<i64>().ok(),
            "secure" => cookie.secure = true,
            "comment" => cookie.comment = Some(val.to_string()),
            "commenturl" => cookie.comment_url = Some(val.trim_matches('"').to_string()),
            "port" => cookie.port = Some(val.trim_matches('"').to_string()),
            _ => {}
        }
    }
    if let Some(seconds) = max_age {
        cookie.expires = Some(now + Duration::seconds(seconds));
    }
    Some(cookie)
}

/// In-memory cookie store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
    strict_domains: bool,
}

impl CookieJar {
    pub fn new(strict_domains: bool) -> Self {
        Self {
            cookies: Vec::new(),
            strict_domains,
        }
    }

    pub fn strict_domains(&self) -> bool {
        self.strict_domains
    }

    pub fn set_strict_domains(&mut self, strict: bool) {
        self.strict_domains = strict;
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    /// Stores `cookie`, replacing one with the same domain, path and name.
    pub fn add(&mut self, cookie: Cookie) {
        self.clear(Some(&cookie.domain), Some(&cookie.path), Some(&cookie.name));
        self.cookies.push(cookie);
    }

    /// Removes cookies matching every given criterion.
    pub fn clear(&mut self, domain: Option<&str>, path: Option<&str>, name: Option<&str>) {
        self.cookies.retain(|c| {
            !(domain.map_or(true, |d| c.domain == d)
                && path.map_or(true, |p| c.path == p)
                && name.map_or(true, |n| c.name == n))
        });
    }

    pub fn clear_session(&mut self) {
        self.cookies.retain(|c| !c.is_session());
    }

    pub fn clear_expired(&mut self, now: DateTime<Utc>) {
        self.cookies.retain(|c| !c.is_expired(now));
    }

    /// Whether a server may set `cookie` in response to a request for `url`.
    pub fn set_ok(&self, cookie: &Cookie, url: &Url) -> bool {
        let host = request_host(url);
        let bare = cookie.domain.trim_start_matches('.');
        host == bare || host.ends_with(&format!(".{}", bare))
    }

    /// Cookies to send to `url`, most specific first: longer path, then
    /// longer domain.
    pub fn cookies_for(&self, url: &Url, now: DateTime<Utc>) -> Vec<&Cookie> {
        let host = request_host(url);
        let secure = url.scheme() == "https";
        let mut found: Vec<&Cookie> = self
            .cookies
            .iter()
            .filter(|c| {
                !c.is_expired(now)
                    && (secure || !c.secure)
                    && domain_match(&host, &c.domain, self.strict_domains)
                    && path_match(url.path(), &c.path)
            })
            .collect();
        found.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then(b.domain.len().cmp(&a.domain.len()))
        });
        found
    }

    /// `Cookie` request header value for `url`.
    pub fn header_for(&self, url: &Url, now: DateTime<Utc>) -> Option<String> {
        let cookies = self.cookies_for(url, now);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Applies the `Set-Cookie` headers of a response to `url`.
    pub fn extract<'a>(
        &mut self,
        set_cookie_headers: impl IntoIterator<Item = &'a str>,
        url: &Url,
        now: DateTime<Utc>,
    ) {
        for header in set_cookie_headers {
            let cookie = match parse_set_cookie(header, url, now) {
                Some(cookie) => cookie,
                None => {
                    warn!(header, "ignoring malformed Set-Cookie header");
                    continue;
                }
            };
            if !self.set_ok(&cookie, url) {
                warn!(name = %cookie.name, domain = %cookie.domain, url = %url, "cookie rejected by policy");
                continue;
            }
            if cookie.is_expired(now) {
                debug!(name = %cookie.name, "expiring cookie");
                self.clear(Some(&cookie.domain), Some(&cookie.path), Some(&cookie.name));
            } else {
                debug!(name = %cookie.name, domain = %cookie.domain, path = %cookie.path, "storing cookie");
                self.add(cookie);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_set_cookie_defaults() {
        let now = Utc::now();
        let cookie =
            parse_set_cookie("foo=bar; Path=/; HttpOnly", &url("http://localhost/a/b"), now).unwrap();
        assert_eq!(cookie.name, "foo");
        assert_eq!(cookie.value, "bar");
        assert_eq!(cookie.domain, "localhost");
        assert_eq!(cookie.path, "/");

        let cookie = parse_set_cookie("x=1", &url("http://localhost/a/b"), now).unwrap();
        assert_eq!(cookie.path, "/a");
    }

    #[test]
    fn test_domain_attribute_gets_leading_dot() {
        let now = Utc::now();
        let cookie = parse_set_cookie(
            "x=1; Domain=example.com",
            &url("http://www.example.com/"),
            now,
        )
        .unwrap();
        assert_eq!(cookie.domain, ".example.com");
        assert!(domain_match("www.example.com", ".example.com", true));
        assert!(domain_match("example.com", ".example.com", true));
        assert!(!domain_match("www.example.com", "example.com", true));
        assert!(domain_match("www.example.com", "example.com", false));
    }

    #[test]
    fn test_cookie_date_formats() {
        let expected = Utc.with_ymd_and_hms(2019, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(
            parse_cookie_date("Wed, 02 Jan 2019 00:00:00 GMT"),
            Some(expected)
        );
        assert_eq!(
            parse_cookie_date("Wed, 02-Jan-2019 00:00:00 GMT"),
            Some(expected)
        );
        assert_eq!(expiration_string(expected), "Wed, 02 Jan 2019 00:00:00 GMT");
    }

    #[test]
    fn test_extract_and_header() {
        let now = Utc::now();
        let mut jar = CookieJar::new(true);
        let page = url("http://localhost/dir/page");
        jar.extract(["a=1; Path=/", "b=2; Path=/dir", "c=3; Domain=other.org"], &page, now);
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.header_for(&page, now).as_deref(), Some("b=2; a=1"));
        assert_eq!(
            jar.header_for(&url("http://localhost/"), now).as_deref(),
            Some("a=1")
        );

        jar.extract(["a=gone; Path=/; Max-Age=0"], &page, now);
        assert_eq!(jar.header_for(&page, now).as_deref(), Some("b=2"));
    }

    #[test]
    fn test_secure_cookie_needs_https() {
        let now = Utc::now();
        let mut jar = CookieJar::new(true);
        jar.extract(["s=1; Path=/; Secure"], &url("https://localhost/"), now);
        assert!(jar.header_for(&url("http://localhost/"), now).is_none());
        assert!(jar.header_for(&url("https://localhost/"), now).is_some());
    }
}
