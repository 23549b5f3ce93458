use super::session::{HistoryEntry, Page, Shared};
use crate::errors::{BrowserError, Result};
use crate::transport::RequestOptions;
use crate::types::{BrowserConfig, Request, Response};
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

/// Outcome of one request after its redirect chain has been followed.
#[derive(Debug, Clone)]
pub(crate) struct NavigationResult {
    pub request: Request,
    pub response: Response,
    pub redirects: usize,
    pub duration: Duration,
}

/// The request that follows redirect `response` to `request`, or `None`
/// when the response carries no `Location`.
///
/// 301, 302 and 303 become a body-less GET; 307 and 308 repeat the method
/// and body.
pub fn redirect_request(request: &Request, response: &Response) -> Result<Option<Request>> {
    let location = match response.header("location") {
        Some(location) => location,
        None => return Ok(None),
    };
    let url = request.url.join(location.trim())?;
    let next = match response.status {
        307 | 308 => Request {
            url,
            ..request.clone()
        },
        _ => {
            let mut next = Request::new("GET", url);
            for (name, value) in request.headers.iter() {
                if !name.eq_ignore_ascii_case("content-type")
                    && !name.eq_ignore_ascii_case("content-length")
                {
                    next.headers.append(name, value);
                }
            }
            next
        }
    };
    Ok(Some(next))
}

impl Shared {
    /// Adds the pinned headers, `Referer`, `User-Agent` and the jar's
    /// cookies unless the request already carries them.
    fn prepare(&self, request: &Request, referer: Option<&Url>, config: &BrowserConfig) -> Request {
        let mut prepared = request.clone();
        for (name, value) in self.headers.borrow().iter() {
            if !request.headers.contains(name) {
                prepared.headers.append(name, value);
            }
        }
        if let Some(referer) = referer {
            if !prepared.headers.contains("Referer") {
                let mut referer = referer.clone();
                referer.set_fragment(None);
                prepared.headers.append("Referer", referer.as_str());
            }
        }
        if let Some(agent) = &config.user_agent {
            if !prepared.headers.contains("User-Agent") {
                prepared.headers.append("User-Agent", agent);
            }
        }
        if !prepared.headers.contains("Cookie") {
            if let Some(cookie) = self.jar.borrow().header_for(&prepared.url, Utc::now()) {
                prepared.headers.append("Cookie", &cookie);
            }
        }
        prepared
    }

    async fn fetch(
        &self,
        request: Request,
        referer: Option<Url>,
        config: &BrowserConfig,
    ) -> Result<NavigationResult> {
        let options = RequestOptions {
            handle_errors: config.handle_errors,
        };
        let start = Instant::now();
        let mut request = request;
        let mut redirects = 0;
        loop {
            let prepared = self.prepare(&request, referer.as_ref(), config);
            debug!(method = %prepared.method, url = %prepared.url, "sending request");
            let response = self.transport.send(&prepared, options).await?;
            self.jar.borrow_mut().extract(
                response.header_all("set-cookie"),
                &prepared.url,
                Utc::now(),
            );
            if !response.is_redirect() {
                return Ok(NavigationResult {
                    request,
                    response,
                    redirects,
                    duration: start.elapsed(),
                });
            }
            let next = match redirect_request(&request, &response)? {
                Some(next) => next,
                None => {
                    return Ok(NavigationResult {
                        request,
                        response,
                        redirects,
                        duration: start.elapsed(),
                    })
                }
            };
            redirects += 1;
            if redirects > config.max_redirects {
                return Err(BrowserError::RedirectLimit(config.max_redirects));
            }
            info!(status = response.status, location = %next.url, "following redirect");
            request = next;
        }
    }

    /// Sends `request`, follows redirects and makes the result the current
    /// page. Every derived handle expires, whether or not the request
    /// succeeds.
    pub(crate) async fn navigate(&self, request: Request, push_history: bool) -> Result<()> {
        let (config, referer) = {
            let state = self.state.borrow();
            let referer = state.page.as_ref().map(|p| p.response.url.clone());
            (state.config.clone(), referer)
        };
        let mut request = request;
        let fragment = request.url.fragment().map(str::to_string);
        request.url.set_fragment(None);
        info!(method = %request.method, url = %request.url, "opening");

        let start = Instant::now();
        let result = self.fetch(request, referer, &config).await;
        let mut state = self.state.borrow_mut();
        state.counter += 1;
        state.last_elapsed = Some(start.elapsed());
        let result = result?;

        let mut final_request = result.request;
        let fragment = final_request
            .url
            .fragment()
            .map(str::to_string)
            .or(fragment);
        final_request.url.set_fragment(None);
        let status = result.response.status;
        let reason = result.response.reason.clone();
        let entry = HistoryEntry {
            request: final_request,
            response: result.response,
            fragment,
        };
        let page = Page::load(entry, config.select_default);
        if push_history {
            if let Some(previous) = state.page.take() {
                state.history.push(previous.into_entry());
                debug!(depth = state.history.len(), "history push");
            }
        }
        info!(
            status,
            url = %page.url(),
            redirects = result.redirects,
            elapsed_ms = result.duration.as_millis() as u64,
            "page loaded"
        );
        let url = page.url().to_string();
        state.page = Some(page);
        drop(state);

        if config.raise_http_errors && status >= 400 {
            return Err(BrowserError::Http {
                url,
                status,
                reason,
            });
        }
        Ok(())
    }

    /// Submits form `form` of the current page, optionally clicking control
    /// `clicked` at the given coordinates.
    pub(crate) async fn submit(
        &self,
        form: usize,
        clicked: Option<(usize, (i32, i32))>,
    ) -> Result<()> {
        let data = {
            let state = self.state.borrow();
            let page = state.current()?;
            let form = page
                .forms
                .get(form)
                .ok_or_else(|| BrowserError::BrowserState(format!("no form #{}", form)))?;
            form.click_request_data(clicked)?
        };
        let mut request = Request::new(&data.method, data.url).with_body(data.body);
        for (name, value) in &data.headers {
            request.headers.append(name, value);
        }
        self.navigate(request, true).await
    }
}
