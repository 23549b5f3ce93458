use super::handles::{Control, Form, Link};
use crate::cookies::{CookieJar, Cookies};
use crate::dom::{Document, LinkInfo};
use crate::errors::{BrowserError, Result};
use crate::forms::{parse_forms, HtmlForm, URLENCODED};
use crate::locate::{locate_control, locate_form, locate_link, ControlLookup, FormLookup, LinkQuery};
use crate::transport::{AppTransport, Application, Transport};
use crate::types::{BrowserConfig, Headers, Request, Response};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// A completed request/response pair as kept in the history.
#[derive(Debug, Clone)]
pub(crate) struct HistoryEntry {
    pub request: Request,
    pub response: Response,
    pub fragment: Option<String>,
}

/// The current response with the forms and links parsed from it.
#[derive(Debug)]
pub(crate) struct Page {
    pub request: Request,
    pub response: Response,
    pub fragment: Option<String>,
    pub forms: Vec<HtmlForm>,
    pub links: Vec<LinkInfo>,
    pub title: Option<String>,
    pub base_url: Url,
}

impl Page {
    pub fn load(entry: HistoryEntry, select_default: bool) -> Self {
        let mut page = Page {
            base_url: entry.response.url.clone(),
            request: entry.request,
            response: entry.response,
            fragment: entry.fragment,
            forms: Vec::new(),
            links: Vec::new(),
            title: None,
        };
        if page.response.is_html() {
            let document = Document::parse(&page.response.text(), &page.response.url);
            match parse_forms(&document, select_default) {
                Ok(forms) => page.forms = forms,
                Err(err) => warn!(url = %page.response.url, error = %err, "could not parse forms"),
            }
            page.links = document.links();
            page.title = document.title();
            page.base_url = document.base_url().clone();
        }
        page
    }

    /// Response URL with the last opened fragment re-attached.
    pub fn url(&self) -> Url {
        let mut url = self.response.url.clone();
        if self.fragment.is_some() {
            url.set_fragment(self.fragment.as_deref());
        }
        url
    }

    pub fn into_entry(self) -> HistoryEntry {
        HistoryEntry {
            request: self.request,
            response: self.response,
            fragment: self.fragment,
        }
    }
}

pub(crate) struct State {
    pub page: Option<Page>,
    pub history: Vec<HistoryEntry>,
    pub counter: u64,
    pub config: BrowserConfig,
    pub last_elapsed: Option<Duration>,
}

impl State {
    pub fn current(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::BrowserState("no page has been opened".to_string()))
    }

    pub fn current_mut(&mut self) -> Result<&mut Page> {
        self.page
            .as_mut()
            .ok_or_else(|| BrowserError::BrowserState("no page has been opened".to_string()))
    }
}

/// Browser internals shared with the handles it gives out.
pub(crate) struct Shared {
    pub state: RefCell<State>,
    pub jar: Rc<RefCell<CookieJar>>,
    pub headers: Rc<RefCell<Headers>>,
    pub transport: Box<dyn Transport>,
}

impl Shared {
    pub fn counter(&self) -> u64 {
        self.state.borrow().counter
    }

    /// Fails with `Expired` once the browser has moved on from `counter`.
    pub fn check(&self, counter: u64) -> Result<()> {
        if self.counter() != counter {
            return Err(BrowserError::Expired);
        }
        Ok(())
    }

    pub fn current_url(&self) -> Option<Url> {
        self.state
            .borrow()
            .page
            .as_ref()
            .map(|p| p.response.url.clone())
    }
}

/// A programmable web user agent.
///
/// The browser is single-threaded: it and every handle it returns share
/// state through `Rc`, and operations run in program order.
pub struct Browser {
    shared: Rc<Shared>,
}

impl Browser {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, BrowserConfig::default())
    }

    pub fn with_config(transport: impl Transport + 'static, config: BrowserConfig) -> Self {
        let jar = CookieJar::new(config.strict_cookie_domains);
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(State {
                    page: None,
                    history: Vec::new(),
                    counter: 0,
                    config,
                    last_elapsed: None,
                }),
                jar: Rc::new(RefCell::new(jar)),
                headers: Rc::new(RefCell::new(Headers::new())),
                transport: Box::new(transport),
            }),
        }
    }

    /// Browser talking to an in-process application.
    pub fn for_app<A: Application + 'static>(app: A) -> Self {
        Self::new(AppTransport::from_app(app))
    }

    /// Browser talking real HTTP.
    #[cfg(feature = "http")]
    pub fn for_http(config: crate::types::HttpTransportConfig) -> Result<Self> {
        Ok(Self::new(crate::transport::HttpTransport::new(config)?))
    }

    pub fn config(&self) -> BrowserConfig {
        self.shared.state.borrow().config.clone()
    }

    pub fn handle_errors(&self) -> bool {
        self.shared.state.borrow().config.handle_errors
    }

    pub fn set_handle_errors(&self, handle: bool) {
        self.shared.state.borrow_mut().config.handle_errors = handle;
    }

    pub fn raise_http_errors(&self) -> bool {
        self.shared.state.borrow().config.raise_http_errors
    }

    pub fn set_raise_http_errors(&self, raise: bool) {
        self.shared.state.borrow_mut().config.raise_http_errors = raise;
    }

    /// Resolves `url` against the current page's base URL.
    fn resolve(&self, url: &str) -> Result<Url> {
        match Url::parse(url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let state = self.shared.state.borrow();
                let page = state.page.as_ref().ok_or_else(|| {
                    BrowserError::BrowserState(format!(
                        "can't open relative URL {:?} without a current page",
                        url
                    ))
                })?;
                Ok(page.base_url.join(url)?)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn open(&self, url: &str) -> Result<()> {
        let url = self.resolve(url)?;
        self.shared.navigate(Request::new("GET", url), true).await
    }

    /// Opens `url` posting `data` url-encoded.
    pub async fn open_with_data(&self, url: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        self.post(url, data, None).await
    }

    /// POSTs `data`; the content type defaults to url-encoded.
    pub async fn post(
        &self,
        url: &str,
        data: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let url = self.resolve(url)?;
        let request = Request::new("POST", url)
            .with_header("Content-Type", content_type.unwrap_or(URLENCODED))
            .with_body(data.into());
        self.shared.navigate(request, true).await
    }

    /// Sends the current page's request again.
    pub async fn reload(&self) -> Result<()> {
        let request = {
            let state = self.shared.state.borrow();
            let page = state.page.as_ref().ok_or_else(|| {
                BrowserError::BrowserState("no URL has yet been .open()ed".to_string())
            })?;
            let mut request = page.request.clone();
            request.url.set_fragment(page.fragment.as_deref());
            request
        };
        self.shared.navigate(request, false).await
    }

    /// Steps `count` pages back in the history.
    pub fn go_back(&self, count: usize) -> Result<()> {
        let mut state = self.shared.state.borrow_mut();
        if count == 0 {
            return Ok(());
        }
        if state.history.len() < count {
            return Err(BrowserError::BrowserState(format!(
                "already at start of history (asked to go back {} of {})",
                count,
                state.history.len()
            )));
        }
        let keep = state.history.len() - count + 1;
        let mut popped = state.history.split_off(keep - 1);
        let entry = popped.remove(0);
        let select_default = state.config.select_default;
        state.page = Some(Page::load(entry, select_default));
        state.counter += 1;
        debug!(depth = state.history.len(), count, "history pop");
        Ok(())
    }

    pub fn history_len(&self) -> usize {
        self.shared.state.borrow().history.len()
    }

    /// Current URL, including the fragment of the last opened URL.
    pub fn url(&self) -> Option<String> {
        self.shared
            .state
            .borrow()
            .page
            .as_ref()
            .map(|p| p.url().to_string())
    }

    pub fn is_html(&self) -> bool {
        self.shared
            .state
            .borrow()
            .page
            .as_ref()
            .map_or(false, |p| p.response.is_html())
    }

    pub fn title(&self) -> Option<String> {
        self.shared
            .state
            .borrow()
            .page
            .as_ref()
            .and_then(|p| p.title.clone())
    }

    /// Body of the current response, decoded with its charset.
    pub fn contents(&self) -> Option<String> {
        self.shared
            .state
            .borrow()
            .page
            .as_ref()
            .map(|p| p.response.text())
    }

    pub fn headers(&self) -> Option<Headers> {
        self.shared
            .state
            .borrow()
            .page
            .as_ref()
            .map(|p| p.response.headers.clone())
    }

    pub fn status(&self) -> Option<u16> {
        self.shared
            .state
            .borrow()
            .page
            .as_ref()
            .map(|p| p.response.status)
    }

    /// `200 OK` style status of the current response.
    pub fn status_line(&self) -> Option<String> {
        self.shared
            .state
            .borrow()
            .page
            .as_ref()
            .map(|p| p.response.status_line())
    }

    /// The request that produced the current page (after redirects).
    pub fn last_request(&self) -> Option<Request> {
        self.shared
            .state
            .borrow()
            .page
            .as_ref()
            .map(|p| p.request.clone())
    }

    /// Wall-clock seconds of the last navigation.
    pub fn last_request_seconds(&self) -> Option<f64> {
        self.shared
            .state
            .borrow()
            .last_elapsed
            .map(|d| d.as_secs_f64())
    }

    /// Cookies for the current URL, backed by the browser's jar.
    pub fn cookies(&self) -> Cookies {
        let shared = self.shared.clone();
        Cookies::new(
            self.shared.jar.clone(),
            self.shared.headers.clone(),
            Rc::new(move || shared.current_url()),
        )
    }

    /// Pins a request header for all following requests.
    pub fn add_header(&self, key: &str, value: &str) -> Result<()> {
        let is_cookie = key.eq_ignore_ascii_case("cookie") || key.eq_ignore_ascii_case("cookie2");
        if is_cookie && self.shared.current_url().is_some() && !self.cookies().header()?.is_empty() {
            return Err(BrowserError::InvalidArgument(
                "cookies are already set in the cookies mapping".to_string(),
            ));
        }
        self.shared.headers.borrow_mut().append(key, value);
        Ok(())
    }

    /// Drops a pinned header; true when there was one.
    pub fn remove_header(&self, key: &str) -> bool {
        self.shared.headers.borrow_mut().remove(key)
    }

    pub fn get_link(&self, query: impl Into<LinkQuery>) -> Result<Link> {
        let query = query.into();
        let state = self.shared.state.borrow();
        let page = state.current()?;
        let index = locate_link(&page.links, &query)?;
        Ok(Link::new(
            self.shared.clone(),
            state.counter,
            page.links[index].clone(),
        ))
    }

    /// Finds a link and clicks it.
    pub async fn follow(&self, query: impl Into<LinkQuery>) -> Result<()> {
        self.get_link(query)?.click().await
    }

    pub fn get_form(&self, lookup: FormLookup) -> Result<Form> {
        let state = self.shared.state.borrow();
        let page = state.current()?;
        let index = locate_form(&page.forms, &lookup)?;
        Ok(Form::new(self.shared.clone(), state.counter, index))
    }

    /// Finds a control (or an item of a list control) across all forms.
    pub fn get_control(&self, lookup: impl Into<ControlLookup>) -> Result<Control> {
        Control::locate(&self.shared, None, &lookup.into())
    }

    pub fn forms(&self) -> Result<Vec<Form>> {
        let state = self.shared.state.borrow();
        let page = state.current()?;
        Ok((0..page.forms.len())
            .map(|i| Form::new(self.shared.clone(), state.counter, i))
            .collect())
    }

    pub fn links(&self) -> Result<Vec<Link>> {
        let state = self.shared.state.borrow();
        let page = state.current()?;
        Ok(page
            .links
            .iter()
            .map(|l| Link::new(self.shared.clone(), state.counter, l.clone()))
            .collect())
    }
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Browser {}>", self.url().unwrap_or_default())
    }
}

/// Locates a control within the current page; shared by the browser and
/// form handles.
pub(crate) fn locate_on_page(
    shared: &Shared,
    only_form: Option<usize>,
    lookup: &ControlLookup,
) -> Result<(u64, crate::locate::ControlMatch)> {
    let state = shared.state.borrow();
    let page = state.current()?;
    let found = locate_control(&page.forms, only_form, lookup)?;
    Ok((state.counter, found))
}
