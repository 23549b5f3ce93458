use super::jar::{default_path, request_host, Cookie, CookieJar};
use crate::errors::{BrowserError, Result};
use crate::types::Headers;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;
use url::Url;

/// Everything known about one cookie, as reported by [`Cookies::getinfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieInfo {
    pub name: String,
    pub value: String,
    pub port: Option<String>,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub expires: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub commenturl: Option<String>,
}

impl From<&Cookie> for CookieInfo {
    fn from(c: &Cookie) -> Self {
        Self {
            name: c.name.clone(),
            value: c.value.clone(),
            port: c.port.clone(),
            domain: c.domain.clone(),
            path: c.path.clone(),
            secure: c.secure,
            expires: c.expires,
            comment: c.comment.clone(),
            commenturl: c.comment_url.clone(),
        }
    }
}

/// Optional attributes for [`Cookies::create`] and [`Cookies::change`].
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub path: Option<String>,
    pub secure: Option<bool>,
    pub comment: Option<String>,
    pub comment_url: Option<String>,
    pub port: Option<String>,
}

impl CookieOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Naive instants are taken to be UTC.
    pub fn expires_naive(mut self, expires: NaiveDateTime) -> Self {
        self.expires = Some(expires.and_utc());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn comment_url(mut self, url: &str) -> Self {
        self.comment_url = Some(url.to_string());
        self
    }

    pub fn port(mut self, port: &str) -> Self {
        self.port = Some(port.to_string());
        self
    }
}

#[derive(Clone)]
enum UrlSource {
    Fixed(Url),
    Current(Rc<dyn Fn() -> Option<Url>>),
}

/// Mapping view of the cookies that apply to one URL.
///
/// The view reads and writes the browser's jar directly; nothing is copied.
#[derive(Clone)]
pub struct Cookies {
    jar: Rc<RefCell<CookieJar>>,
    headers: Rc<RefCell<Headers>>,
    source: UrlSource,
}

impl Cookies {
    /// View that follows whatever URL `current` reports.
    pub fn new(
        jar: Rc<RefCell<CookieJar>>,
        headers: Rc<RefCell<Headers>>,
        current: Rc<dyn Fn() -> Option<Url>>,
    ) -> Self {
        Self {
            jar,
            headers,
            source: UrlSource::Current(current),
        }
    }

    /// The same jar, viewed from `url`.
    pub fn for_url(&self, url: &str) -> Result<Cookies> {
        Ok(Self {
            jar: self.jar.clone(),
            headers: self.headers.clone(),
            source: UrlSource::Fixed(Url::parse(url)?),
        })
    }

    pub fn url(&self) -> Result<Url> {
        let url = match &self.source {
            UrlSource::Fixed(url) => Some(url.clone()),
            UrlSource::Current(current) => current(),
        };
        url.ok_or_else(|| BrowserError::BrowserState("no URL for cookies".to_string()))
    }

    fn raw_cookies(&self) -> Result<Vec<Cookie>> {
        let url = self.url()?;
        let jar = self.jar.borrow();
        let cookies = jar
            .cookies_for(&url, Utc::now())
            .into_iter()
            .cloned()
            .collect();
        Ok(cookies)
    }

    /// First cookie per name, in precedence order.
    fn unique_cookies(&self) -> Result<Vec<Cookie>> {
        let mut seen = Vec::new();
        Ok(self
            .raw_cookies()?
            .into_iter()
            .filter(|c| {
                if seen.contains(&c.name) {
                    false
                } else {
                    seen.push(c.name.clone());
                    true
                }
            })
            .collect())
    }

    fn find(&self, name: &str) -> Result<Option<Cookie>> {
        Ok(self.raw_cookies()?.into_iter().find(|c| c.name == name))
    }

    fn require(&self, name: &str) -> Result<Cookie> {
        self.find(name)?
            .ok_or_else(|| BrowserError::CookieNotFound(name.to_string()))
    }

    /// `Cookie` header for the URL with pairs sorted for reproducibility.
    pub fn header(&self) -> Result<String> {
        let mut pairs: Vec<String> = self
            .raw_cookies()?
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        pairs.sort();
        Ok(pairs.join("; "))
    }

    pub fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.find(name)?.map(|c| c.value))
    }

    pub fn getinfo(&self, name: &str) -> Result<CookieInfo> {
        Ok(CookieInfo::from(&self.require(name)?))
    }

    /// Info for every cookie named `name`, or the first of each name.
    pub fn iterinfo(&self, name: Option<&str>) -> Result<Vec<CookieInfo>> {
        let cookies = match name {
            Some(name) => self
                .raw_cookies()?
                .into_iter()
                .filter(|c| c.name == name)
                .collect(),
            None => self.unique_cookies()?,
        };
        Ok(cookies.iter().map(CookieInfo::from).collect())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.unique_cookies()?.into_iter().map(|c| c.name).collect())
    }

    pub fn iter(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .unique_cookies()?
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.unique_cookies()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.find(name)?.is_some())
    }

    fn check_override(&self) -> Result<()> {
        let headers = self.headers.borrow();
        if headers.contains("Cookie") || headers.contains("Cookie2") {
            return Err(BrowserError::InvalidArgument(
                "cookies are already set with a Cookie header; remove it before using the cookie mapping"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn verify_domain(&self, url: &Url, domain: &str, existing: Option<&Cookie>) -> Result<()> {
        let bare = domain.trim_start_matches('.');
        let host = request_host(url);
        if host != bare && !host.ends_with(&format!(".{}", bare)) {
            return Err(BrowserError::Cookie(format!(
                "current url must match given domain {:?}",
                domain
            )));
        }
        if let Some(ck) = existing {
            if ck.domain != bare && ck.domain != domain && ck.domain.ends_with(bare) {
                return Err(BrowserError::Cookie(format!(
                    "cannot set a cookie that will be hidden by another cookie for this url ({})",
                    url
                )));
            }
        }
        Ok(())
    }

    fn verify_path(&self, url: &Url, path: &str, existing: Option<&Cookie>) -> Result<()> {
        if !url.path().starts_with(path) {
            return Err(BrowserError::Cookie(format!(
                "current url must start with path {:?}",
                path
            )));
        }
        if let Some(ck) = existing {
            if ck.path != path && ck.path.starts_with(path) {
                return Err(BrowserError::Cookie(format!(
                    "cannot set a cookie that will be hidden by another cookie for this url ({})",
                    url
                )));
            }
        }
        Ok(())
    }

    fn store(&self, cookie: Cookie) -> Result<()> {
        self.check_override()?;
        debug!(name = %cookie.name, domain = %cookie.domain, path = %cookie.path, "setting cookie");
        self.jar.borrow_mut().add(cookie);
        Ok(())
    }

    /// Adds a new cookie for the current URL.
    pub fn create(&self, name: &str, value: &str, options: CookieOptions) -> Result<()> {
        self.check_override()?;
        let url = self.url()?;
        let existing = self.find(name)?;
        if let Some(ck) = &existing {
            let same_path = options.path.as_ref().map_or(true, |p| &ck.path == p);
            let same_domain = options.domain.as_ref().map_or(true, |d| {
                &ck.domain == d || ck.domain == format!(".{}", d.trim_start_matches('.'))
            });
            if same_path && same_domain {
                return Err(BrowserError::Cookie(format!("cookie {:?} already exists", name)));
            }
        }
        if let Some(domain) = &options.domain {
            self.verify_domain(&url, domain, existing.as_ref())?;
        }
        if let Some(path) = &options.path {
            self.verify_path(&url, path, existing.as_ref())?;
        }
        if let Some(expires) = options.expires {
            if expires <= Utc::now() {
                return Err(BrowserError::AlreadyExpired(format!(
                    "may not create cookie {:?} that is immediately expired",
                    name
                )));
            }
        }
        let domain = match &options.domain {
            Some(d) if d.starts_with('.') => d.to_lowercase(),
            Some(d) => format!(".{}", d.to_lowercase()),
            None => request_host(&url),
        };
        let path = options.path.clone().unwrap_or_else(|| default_path(&url));
        let mut cookie = Cookie::new(name, value, &domain, &path);
        cookie.expires = options.expires;
        cookie.secure = options.secure.unwrap_or(false);
        cookie.comment = options.comment;
        cookie.comment_url = options.comment_url;
        cookie.port = options.port;
        self.store(cookie)
    }

    /// Changes an existing cookie; an expiry in the past deletes it.
    pub fn change(&self, name: &str, value: Option<&str>, options: CookieOptions) -> Result<()> {
        if let Some(expires) = options.expires {
            if expires <= Utc::now() {
                return self.remove(name);
            }
        }
        let ck = self.require(name)?;
        self.change_cookie(ck, value, options)
    }

    fn change_cookie(&self, ck: Cookie, value: Option<&str>, options: CookieOptions) -> Result<()> {
        self.check_override()?;
        let url = self.url()?;
        let domain = match &options.domain {
            Some(d) => {
                self.verify_domain(&url, d, None)?;
                if d.starts_with('.') {
                    d.to_lowercase()
                } else {
                    format!(".{}", d.to_lowercase())
                }
            }
            None => ck.domain.clone(),
        };
        let path = match &options.path {
            Some(p) => {
                self.verify_path(&url, p, None)?;
                p.clone()
            }
            None => ck.path.clone(),
        };
        let mut cookie = Cookie::new(&ck.name, value.unwrap_or(&ck.value), &domain, &path);
        cookie.expires = options.expires.or(ck.expires);
        cookie.secure = options.secure.unwrap_or(ck.secure);
        cookie.comment = options.comment.or_else(|| ck.comment.clone());
        cookie.comment_url = options.comment_url.or_else(|| ck.comment_url.clone());
        cookie.port = options.port.or_else(|| ck.port.clone());
        self.store(cookie)?;
        if domain != ck.domain || path != ck.path {
            self.jar
                .borrow_mut()
                .clear(Some(&ck.domain), Some(&ck.path), Some(&ck.name));
        }
        Ok(())
    }

    /// Mapping assignment: changes the cookie when present, else creates it.
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        match self.find(name)? {
            Some(ck) => self.change_cookie(ck, Some(value), CookieOptions::default()),
            None => self.create(name, value, CookieOptions::default()),
        }
    }

    pub fn update<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<()> {
        for (name, value) in pairs {
            self.set(name, value)?;
        }
        Ok(())
    }

    /// Expires `name` at `when`, or removes it immediately.
    pub fn expire(&self, name: &str, when: Option<DateTime<Utc>>) -> Result<()> {
        match when {
            None => self.remove(name),
            Some(when) => self.change(name, None, CookieOptions::new().expires(when)),
        }
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let ck = self.require(name)?;
        self.jar
            .borrow_mut()
            .clear(Some(&ck.domain), Some(&ck.path), Some(&ck.name));
        Ok(())
    }

    pub fn pop_info(&self, name: &str) -> Result<CookieInfo> {
        let info = self.getinfo(name)?;
        self.remove(name)?;
        Ok(info)
    }

    /// Removes every cookie visible from the URL.
    pub fn clear(&self) -> Result<()> {
        let cookies = self.raw_cookies()?;
        let mut jar = self.jar.borrow_mut();
        for ck in cookies {
            jar.clear(Some(&ck.domain), Some(&ck.path), Some(&ck.name));
        }
        Ok(())
    }

    pub fn clear_all(&self) {
        self.jar.borrow_mut().clear(None, None, None);
    }

    pub fn clear_all_session(&self) {
        self.jar.borrow_mut().clear_session();
    }
}

impl fmt::Debug for Cookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.url().map(|u| u.to_string()).unwrap_or_default();
        let header = self.header().unwrap_or_default();
        write!(f, "<Cookies for {} ({})>", url, header)
    }
}
