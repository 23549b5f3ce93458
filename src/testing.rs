//! Fixtures for driving a [`Browser`] against an in-process application.

use crate::browser::Browser;
use crate::transport::{AppResponse, AppTransport, Application, Environ};
use crate::types::BrowserConfig;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber once; later calls are no-ops.
/// `RUST_LOG` overrides the default `warn` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

type Handler = Rc<dyn Fn(&Environ) -> anyhow::Result<AppResponse>>;

struct Inner {
    routes: RefCell<HashMap<String, Handler>>,
    requests: RefCell<Vec<Environ>>,
}

/// A small routing application with a few built-in endpoints:
///
/// - `/echo` answers `text/plain` with the request line, the request
///   headers, a blank line and the body.
/// - `/set_cookie?name=value` sets one cookie per query pair.
/// - `/status?code=N` answers with status `N`.
/// - `/redirect?to=URL&status=N` redirects (302 by default).
/// - `/hops/N` redirects N times before answering.
/// - `/error` fails inside the application.
///
/// Everything else is a 404 unless registered with [`TestApp::page`] or
/// [`TestApp::route`]. Clones share routes and the request log.
#[derive(Clone)]
pub struct TestApp {
    inner: Rc<Inner>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                routes: RefCell::new(HashMap::new()),
                requests: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Serves `html` at `path`.
    pub fn page(self, path: &str, html: &str) -> Self {
        let html = html.to_string();
        self.route(path, move |_| Ok(AppResponse::html(html.clone())))
    }

    pub fn route(
        self,
        path: &str,
        handler: impl Fn(&Environ) -> anyhow::Result<AppResponse> + 'static,
    ) -> Self {
        self.inner
            .routes
            .borrow_mut()
            .insert(path.to_string(), Rc::new(handler));
        self
    }

    pub fn redirect(self, path: &str, status: u16, location: &str) -> Self {
        let location = location.to_string();
        self.route(path, move |_| Ok(AppResponse::redirect(status, &location)))
    }

    /// Every request the application has seen, oldest first.
    pub fn requests(&self) -> Vec<Environ> {
        self.inner.requests.borrow().clone()
    }

    pub fn last_request(&self) -> Option<Environ> {
        self.inner.requests.borrow().last().cloned()
    }

    /// A browser wired to this application.
    pub fn browser(&self) -> Browser {
        Browser::for_app(self.clone())
    }

    pub fn browser_with(&self, config: BrowserConfig) -> Browser {
        Browser::with_config(AppTransport::from_app(self.clone()), config)
    }

    fn dispatch(&self, environ: &Environ) -> anyhow::Result<AppResponse> {
        let path = environ.path().to_string();
        let handler = self.inner.routes.borrow().get(&path).cloned();
        if let Some(handler) = handler {
            return handler(environ);
        }
        match path.as_str() {
            "/echo" => Ok(echo(environ)),
            "/set_cookie" => Ok(environ.query_pairs().iter().fold(
                AppResponse::html("<html><body>cookies set</body></html>"),
                |response, (name, value)| {
                    response.with_header("Set-Cookie", &format!("{}={}; Path=/", name, value))
                },
            )),
            "/status" => {
                let code = query_value(environ, "code")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(200);
                Ok(AppResponse::html(format!("<html><body>status {}</body></html>", code))
                    .with_status(code))
            }
            "/redirect" => {
                let to = query_value(environ, "to").unwrap_or_else(|| "/".to_string());
                let status = query_value(environ, "status")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(302);
                Ok(AppResponse::redirect(status, &to))
            }
            "/error" => anyhow::bail!("application failure at {}", path),
            _ => match path.strip_prefix("/hops/").map(str::parse::<u32>) {
                Some(Ok(0)) => Ok(AppResponse::text("arrived")),
                Some(Ok(n)) => Ok(AppResponse::redirect(302, &format!("/hops/{}", n - 1))),
                _ => Ok(AppResponse::html("<html><body>Not Found</body></html>").with_status(404)),
            },
        }
    }
}

#[async_trait(?Send)]
impl Application for TestApp {
    async fn call(&self, environ: Environ) -> anyhow::Result<AppResponse> {
        debug!(method = environ.method(), path = environ.path(), "test app request");
        self.inner.requests.borrow_mut().push(environ.clone());
        self.dispatch(&environ)
    }
}

fn query_value(environ: &Environ, name: &str) -> Option<String> {
    environ
        .query_pairs()
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}

/// `HTTP_USER_AGENT` -> `User-Agent`
fn header_name(var: &str) -> Option<String> {
    let raw = match var {
        "CONTENT_TYPE" | "CONTENT_LENGTH" => var,
        _ => var.strip_prefix("HTTP_")?,
    };
    let words: Vec<String> = raw
        .split('_')
        .map(|w| {
            let lower = w.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    Some(words.join("-"))
}

fn echo(environ: &Environ) -> AppResponse {
    let mut out = environ.method().to_string();
    out.push(' ');
    out.push_str(environ.path());
    if !environ.query().is_empty() {
        out.push('?');
        out.push_str(environ.query());
    }
    out.push('\n');
    for (var, value) in environ.vars() {
        if let Some(name) = header_name(var) {
            out.push_str(&format!("{}: {}\n", name, value));
        }
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&environ.body));
    AppResponse::text(out)
}

/// A page exercising most control types.
pub const FORMS_PAGE: &str = r#"<html>
<head><title>Controls</title></head>
<body>
<form action="/echo" method="post" id="main">
  <label for="text-id">Text Control</label>
  <input id="text-id" name="text-value" value="Some Text">
  <input type="hidden" name="hidden-value" value="Hidden">
  <label>Password <input type="password" name="password-value"></label>
  <textarea name="textarea-value">Foo</textarea>
  <label><input type="checkbox" name="single-checkbox" checked> Single Checkbox</label>
  <select name="single-select">
    <option value="1">One</option>
    <option value="2" selected>Two</option>
  </select>
  <select name="multi-select" multiple>
    <option value="a" selected>Alpha</option>
    <option value="b">Beta</option>
    <option value="c" disabled>Gamma</option>
  </select>
  <label><input type="radio" name="radio" value="r1"> Radio One</label>
  <label><input type="radio" name="radio" value="r2"> Radio Two</label>
  <input type="submit" name="submit_me" value="GOOD">
  <input type="submit" name="submit_me" value="BAD">
</form>
<form action="/echo" method="post" enctype="multipart/form-data" name="upload">
  <input type="file" name="foo">
  <input type="submit" name="upload" value="Upload">
</form>
<form action="/echo" method="get" name="search">
  <label>Query <input name="q"></label>
  <input type="image" name="go" src="go.png">
</form>
<a href="/echo?from=link">Echo Link</a>
<a href="/forms.html" id="self">Again</a>
</body>
</html>"#;

/// Shortcuts used by the browser scenario tests.
pub struct TestHelper;

impl TestHelper {
    /// An application serving [`FORMS_PAGE`] at `/forms.html`.
    pub fn forms_app() -> TestApp {
        TestApp::new().page("/forms.html", FORMS_PAGE)
    }

    /// A browser already showing `/forms.html`.
    pub async fn browser_on_forms(app: &TestApp) -> crate::errors::Result<Browser> {
        let browser = app.browser();
        browser.open("http://localhost/forms.html").await?;
        Ok(browser)
    }

    /// Lines of an `/echo` answer up to the blank line.
    pub fn echoed_head(contents: &str) -> Vec<String> {
        contents
            .lines()
            .take_while(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Body part of an `/echo` answer.
    pub fn echoed_body(contents: &str) -> String {
        contents
            .split_once("\n\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BrowserError;
    use crate::forms::Value;
    use crate::locate::{ControlLookup, FormLookup};
    use crate::ItemKey;

    async fn forms_browser() -> (TestApp, Browser) {
        init_tracing();
        let app = TestHelper::forms_app();
        let browser = TestHelper::browser_on_forms(&app).await.unwrap();
        (app, browser)
    }

    #[test]
    fn test_header_names() {
        assert_eq!(header_name("HTTP_USER_AGENT").as_deref(), Some("User-Agent"));
        assert_eq!(header_name("CONTENT_TYPE").as_deref(), Some("Content-Type"));
        assert_eq!(header_name("PATH_INFO"), None);
    }

    #[test]
    fn test_blocking_open() {
        let app = TestHelper::forms_app();
        let browser = app.browser();
        tokio_test::block_on(browser.open("http://localhost/forms.html")).unwrap();
        assert_eq!(browser.title().as_deref(), Some("Controls"));
        assert!(browser.is_html());
        assert_eq!(browser.status_line().as_deref(), Some("200 OK"));
    }

    #[tokio::test]
    async fn test_submit_clicked_button_only() {
        let (_app, browser) = forms_browser().await;
        browser.get_control("BAD").unwrap().click().await.unwrap();
        let contents = browser.contents().unwrap();
        assert!(contents.starts_with("POST /echo\n"));
        let body = TestHelper::echoed_body(&contents);
        assert!(body.contains("submit_me=BAD"));
        assert!(!body.contains("submit_me=GOOD"));
        assert!(body.contains("text-value=Some+Text"));
        assert!(body.contains("hidden-value=Hidden"));
        assert!(body.contains("single-checkbox=on"));
        assert!(body.contains("single-select=2"));
        assert!(body.contains("multi-select=a"));
        assert!(!body.contains("radio="));
        assert_eq!(browser.history_len(), 1);
    }

    #[tokio::test]
    async fn test_form_submit_by_name() {
        let (_app, browser) = forms_browser().await;
        let form = browser.get_form(FormLookup::new().id("main")).unwrap();
        assert_eq!(form.method().unwrap(), "POST");
        form.submit(Some(ControlLookup::name("submit_me").index(0)), None)
            .await
            .unwrap();
        let body = TestHelper::echoed_body(&browser.contents().unwrap());
        assert!(body.contains("submit_me=GOOD"));
        assert!(!body.contains("submit_me=BAD"));
    }

    #[tokio::test]
    async fn test_file_upload() {
        let (_app, browser) = forms_browser().await;
        let form = browser.get_form(FormLookup::new().name("upload")).unwrap();
        let file = form.get_control(ControlLookup::name("foo")).unwrap();
        file.add_file(b"sample_data".to_vec(), Some("text/plain"), Some("x.txt"))
            .unwrap();
        form.submit(Some(ControlLookup::name("upload")), None)
            .await
            .unwrap();
        let contents = browser.contents().unwrap();
        let head = TestHelper::echoed_head(&contents);
        assert!(head
            .iter()
            .any(|l| l.starts_with("Content-Type: multipart/form-data; boundary=")));
        assert!(contents.contains("Content-Disposition: form-data; name=\"foo\"; filename=\"x.txt\""));
        assert!(contents.contains("Content-Type: text/plain\r\n\r\nsample_data"));
        assert!(contents.contains("name=\"upload\"\r\n\r\nUpload"));
    }

    #[tokio::test]
    async fn test_add_file_on_text_control() {
        let (_app, browser) = forms_browser().await;
        let text = browser.get_control("Text Control").unwrap();
        assert!(matches!(
            text.add_file(b"x".to_vec(), None, None),
            Err(BrowserError::Type(_))
        ));
    }

    #[tokio::test]
    async fn test_image_click_in_get_form() {
        let (_app, browser) = forms_browser().await;
        browser
            .get_control("Query")
            .unwrap()
            .set_value("hello world")
            .unwrap();
        browser
            .get_control(ControlLookup::name("go"))
            .unwrap()
            .click_at((3, 4))
            .await
            .unwrap();
        let contents = browser.contents().unwrap();
        assert!(contents.starts_with("GET /echo?q=hello+world&go.x=3&go.y=4\n"));
    }

    #[tokio::test]
    async fn test_script_style_submit() {
        let (app, browser) = forms_browser().await;
        let form = browser.get_form(FormLookup::new().name("search")).unwrap();
        form.get_control("Query").unwrap().set_value("a b&c").unwrap();
        assert!(matches!(
            form.submit(None, Some((1, 2))).await,
            Err(BrowserError::InvalidArgument(_))
        ));
        form.submit(None, None).await.unwrap();
        let seen = app.last_request().unwrap();
        assert_eq!(seen.query(), "q=a+b%26c");
        assert_eq!(
            seen.query_pairs(),
            vec![("q".to_string(), "a b&c".to_string())]
        );
    }

    #[tokio::test]
    async fn test_control_values() {
        let (_app, browser) = forms_browser().await;
        let text = browser.get_control("Text Control").unwrap();
        assert_eq!(text.value().unwrap(), Value::Text("Some Text".to_string()));
        text.set_value("Other").unwrap();
        assert_eq!(text.value().unwrap(), Value::Text("Other".to_string()));

        let textarea = browser
            .get_control(ControlLookup::name("textarea-value"))
            .unwrap();
        assert_eq!(textarea.value().unwrap(), Value::Text("Foo".to_string()));

        let hidden = browser
            .get_control(ControlLookup::name("hidden-value"))
            .unwrap();
        hidden.set_value("changed").unwrap();
        assert_eq!(hidden.value().unwrap(), Value::Text("changed".to_string()));

        let checkbox = browser
            .get_control(ControlLookup::name("single-checkbox"))
            .unwrap();
        assert_eq!(checkbox.value().unwrap(), Value::Bool(true));
        checkbox.set_value(false).unwrap();
        assert_eq!(checkbox.value().unwrap(), Value::Bool(false));
    }

    #[tokio::test]
    async fn test_list_controls() {
        let (_app, browser) = forms_browser().await;
        let multi = browser
            .get_control(ControlLookup::name("multi-select"))
            .unwrap();
        assert!(multi.multiple().unwrap());
        assert_eq!(multi.options().unwrap(), vec!["a", "b"]);
        assert_eq!(multi.display_value().unwrap(), vec!["Alpha"]);
        multi.set_display_value(&["Beta"]).unwrap();
        assert_eq!(multi.value().unwrap(), Value::List(vec!["b".to_string()]));

        let alpha = multi.get_item(ItemKey::Value("a"), None).unwrap();
        assert!(alpha.is_item());
        assert!(!alpha.selected().unwrap());
        alpha.click().await.unwrap();
        assert!(alpha.selected().unwrap());
        assert_eq!(alpha.option_value().unwrap().as_deref(), Some("a"));

        let radio = browser.get_control("Radio Two").unwrap();
        radio.set_value(true).unwrap();
        let group = radio.control().unwrap();
        assert_eq!(group.value().unwrap(), Value::List(vec!["r2".to_string()]));
        assert_eq!(group.controls().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ambiguous_label() {
        let (_app, browser) = forms_browser().await;
        let err = browser.get_control("Radio").unwrap_err();
        assert!(matches!(err, BrowserError::Ambiguity(_)));
        assert!(err.is_lookup_error());
        let second = browser
            .get_control(ControlLookup::label("Radio").index(1))
            .unwrap();
        assert_eq!(second.option_value().unwrap().as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_handles_expire_after_navigation() {
        let (_app, browser) = forms_browser().await;
        let control = browser.get_control("Text Control").unwrap();
        let form = browser.get_form(FormLookup::new().id("main")).unwrap();
        let link = browser.get_link("Echo Link").unwrap();
        browser.open("/forms.html").await.unwrap();
        assert!(matches!(control.value(), Err(BrowserError::Expired)));
        assert!(matches!(form.action(), Err(BrowserError::Expired)));
        assert!(matches!(link.click().await, Err(BrowserError::Expired)));
        assert!(format!("{:?}", control).contains("expired"));
    }

    #[tokio::test]
    async fn test_failed_navigation_expires_handles() {
        let (_app, browser) = forms_browser().await;
        let control = browser.get_control("Text Control").unwrap();
        assert!(browser.open("http://www.google.com/").await.is_err());
        assert!(matches!(control.value(), Err(BrowserError::Expired)));
    }

    #[tokio::test]
    async fn test_base_href() {
        let app = TestApp::new().page(
            "/base/bar",
            r#"<html><head><base href="http://localhost/base/"></head>
            <body><a href="?k=v">link</a></body></html>"#,
        );
        let browser = app.browser();
        browser.open("http://localhost/base/bar").await.unwrap();
        let link = browser.get_link("link").unwrap();
        assert_eq!(link.url(), "http://localhost/base/?k=v");
    }

    #[tokio::test]
    async fn test_redirect_keeps_fragment() {
        let app = TestApp::new()
            .redirect("/a", 302, "/b")
            .page("/b", "<html><body>b</body></html>");
        let browser = app.browser();
        browser.open("http://localhost/a#frag").await.unwrap();
        assert_eq!(browser.url().as_deref(), Some("http://localhost/b#frag"));
        assert_eq!(app.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let app = TestApp::new();
        let browser = app.browser();
        browser.open("http://localhost/hops/100").await.unwrap();
        assert_eq!(browser.url().as_deref(), Some("http://localhost/hops/0"));
        assert!(matches!(
            browser.open("http://localhost/hops/101").await,
            Err(BrowserError::RedirectLimit(100))
        ));
    }

    #[tokio::test]
    async fn test_post_redirect_becomes_get() {
        let app = TestApp::new();
        let browser = app.browser();
        browser
            .post("http://localhost/redirect?to=/echo", b"x=1".to_vec(), None)
            .await
            .unwrap();
        let contents = browser.contents().unwrap();
        assert!(contents.starts_with("GET /echo\n"));
        assert!(TestHelper::echoed_body(&contents).is_empty());
    }

    #[tokio::test]
    async fn test_relative_open_without_page() {
        let browser = TestApp::new().browser();
        assert!(matches!(
            browser.open("/echo").await,
            Err(BrowserError::BrowserState(_))
        ));
        assert!(matches!(
            browser.reload().await,
            Err(BrowserError::BrowserState(_))
        ));
        assert!(browser.url().is_none());
    }

    #[tokio::test]
    async fn test_history() {
        let (_app, browser) = forms_browser().await;
        browser.open("/echo?page=2").await.unwrap();
        browser.open("/echo?page=3").await.unwrap();
        assert_eq!(browser.history_len(), 2);
        assert!(matches!(
            browser.go_back(3),
            Err(BrowserError::BrowserState(_))
        ));
        browser.go_back(0).unwrap();
        assert_eq!(browser.history_len(), 2);
        browser.go_back(2).unwrap();
        assert_eq!(
            browser.url().as_deref(),
            Some("http://localhost/forms.html")
        );
        assert_eq!(browser.history_len(), 0);
        assert!(browser.get_control("Text Control").is_ok());
    }

    #[tokio::test]
    async fn test_go_back_expires_handles() {
        let (_app, browser) = forms_browser().await;
        browser.open("/forms.html").await.unwrap();
        let control = browser.get_control("Text Control").unwrap();
        browser.go_back(1).unwrap();
        assert!(matches!(control.value(), Err(BrowserError::Expired)));
    }

    #[tokio::test]
    async fn test_reload_repeats_request() {
        let (app, browser) = forms_browser().await;
        browser.add_header("X-Pinned", "yes").unwrap();
        browser.get_control("GOOD").unwrap().click().await.unwrap();
        browser.reload().await.unwrap();
        browser.reload().await.unwrap();
        assert_eq!(browser.history_len(), 1);
        let requests = app.requests();
        let last: Vec<&Environ> = requests.iter().rev().take(3).collect();
        for environ in &last {
            assert_eq!(environ.method(), "POST");
            assert_eq!(environ.path(), "/echo");
            assert_eq!(environ.body, last[0].body);
            assert_eq!(environ.header("X-Pinned"), Some("yes"));
        }
    }

    #[tokio::test]
    async fn test_select_default_radio() {
        let app = TestApp::new().page(
            "/radio.html",
            r#"<html><body><form>
            <input type="radio" name="r" value="a" disabled>
            <input type="radio" name="r" value="b">
            <input type="radio" name="r" value="c">
            </form></body></html>"#,
        );
        let config = BrowserConfig {
            select_default: true,
            ..BrowserConfig::default()
        };
        let browser = app.browser_with(config);
        browser.open("http://localhost/radio.html").await.unwrap();
        let radio = browser.get_control(ControlLookup::name("r")).unwrap();
        assert_eq!(radio.value().unwrap(), Value::List(vec!["b".to_string()]));

        let plain = app.browser();
        plain.open("http://localhost/radio.html").await.unwrap();
        let radio = plain.get_control(ControlLookup::name("r")).unwrap();
        assert_eq!(radio.value().unwrap(), Value::List(Vec::new()));
    }

    #[tokio::test]
    async fn test_application_errors() {
        let app = TestApp::new();
        let browser = app.browser();
        match browser.open("http://localhost/error").await {
            Err(BrowserError::Http { status, .. }) => assert_eq!(status, 500),
            other => panic!("expected an HTTP error, got {:?}", other),
        }
        assert_eq!(browser.status(), Some(500));

        browser.set_raise_http_errors(false);
        browser.open("http://localhost/error").await.unwrap();
        assert_eq!(browser.status_line().as_deref(), Some("500 Internal Server Error"));

        browser.set_handle_errors(false);
        match browser.open("http://localhost/error").await {
            Err(BrowserError::Application(err)) => {
                assert!(err.to_string().contains("application failure"))
            }
            other => panic!("expected the application error, got {:?}", other),
        }
        assert_eq!(
            app.last_request().unwrap().get("wsgi.handleErrors"),
            Some("false")
        );
    }

    #[tokio::test]
    async fn test_not_found_raises() {
        let browser = TestApp::new().browser();
        let err = browser.open("http://localhost/missing").await.unwrap_err();
        assert!(matches!(err, BrowserError::Http { status: 404, .. }));
        assert_eq!(browser.url().as_deref(), Some("http://localhost/missing"));
    }

    #[tokio::test]
    async fn test_host_not_allowed() {
        let browser = TestApp::new().browser();
        assert!(matches!(
            browser.open("http://www.google.com/").await,
            Err(BrowserError::HostNotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn test_referer_and_user_agent() {
        let app = TestHelper::forms_app();
        let browser = app.browser_with(BrowserConfig {
            user_agent: Some("testbrowser/1.0".to_string()),
            ..BrowserConfig::default()
        });
        browser.open("http://localhost/forms.html#top").await.unwrap();
        browser.follow("Echo Link").await.unwrap();
        let head = TestHelper::echoed_head(&browser.contents().unwrap());
        assert_eq!(head[0], "GET /echo?from=link");
        assert!(head.contains(&"Referer: http://localhost/forms.html".to_string()));
        assert!(head.contains(&"User-Agent: testbrowser/1.0".to_string()));
    }

    #[tokio::test]
    async fn test_cookies_round_trip() {
        let browser = TestApp::new().browser();
        browser
            .open("http://localhost/set_cookie?session=abc")
            .await
            .unwrap();
        assert_eq!(
            browser.cookies().get("session").unwrap().as_deref(),
            Some("abc")
        );
        browser.open("/echo").await.unwrap();
        let head = TestHelper::echoed_head(&browser.contents().unwrap());
        assert!(head.contains(&"Cookie: session=abc".to_string()));
    }

    #[tokio::test]
    async fn test_pinned_cookie_header_conflicts() {
        let browser = TestApp::new().browser();
        browser.open("http://localhost/echo").await.unwrap();
        browser.add_header("Cookie", "x=1").unwrap();
        assert!(matches!(
            browser.cookies().set("y", "2"),
            Err(BrowserError::InvalidArgument(_))
        ));
        assert!(browser.remove_header("Cookie"));
        browser.cookies().set("y", "2").unwrap();
        assert!(matches!(
            browser.add_header("Cookie", "x=1"),
            Err(BrowserError::InvalidArgument(_))
        ));
        browser.reload().await.unwrap();
        let head = TestHelper::echoed_head(&browser.contents().unwrap());
        assert!(head.contains(&"Cookie: y=2".to_string()));
    }

    #[tokio::test]
    async fn test_basic_auth_header() {
        let browser = TestApp::new().browser();
        browser.add_header("Authorization", "Basic mgr:mgrpw").unwrap();
        browser.open("http://localhost/echo").await.unwrap();
        let head = TestHelper::echoed_head(&browser.contents().unwrap());
        assert!(head.contains(&"Authorization: Basic bWdyOm1ncnB3".to_string()));
    }

    #[tokio::test]
    async fn test_timing_and_last_request() {
        let (_app, browser) = forms_browser().await;
        assert!(browser.last_request_seconds().unwrap() >= 0.0);
        let request = browser.last_request().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.url.as_str(), "http://localhost/forms.html");
    }

    #[tokio::test]
    async fn test_multiple_files_nest_as_mixed() {
        let (_app, browser) = forms_browser().await;
        let form = browser.get_form(FormLookup::new().name("upload")).unwrap();
        let file = form.get_control(ControlLookup::name("foo")).unwrap();
        file.add_file(b"first".to_vec(), Some("text/plain"), Some("a.txt"))
            .unwrap();
        file.add_file(b"second".to_vec(), None, Some("b.bin"))
            .unwrap();
        form.submit(Some(ControlLookup::name("upload")), None)
            .await
            .unwrap();
        let body = TestHelper::echoed_body(&browser.contents().unwrap());
        assert!(body.contains("Content-Disposition: form-data; name=\"foo\"\r\n"));
        assert!(body.contains("Content-Type: multipart/mixed; boundary="));
        assert!(body.contains(
            "Content-Disposition: file; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nfirst"
        ));
        assert!(body.contains(
            "Content-Disposition: file; filename=\"b.bin\"\r\nContent-Type: application/octet-stream\r\n\r\nsecond"
        ));
    }

    #[tokio::test]
    async fn test_isindex_submission() {
        let app = TestApp::new().page(
            "/index.html",
            r#"<html><body><form action="/echo#results">
            <label>Search <isindex></isindex></label>
            </form></body></html>"#,
        );
        let browser = app.browser();
        browser.open("http://localhost/index.html").await.unwrap();
        let search = browser.get_control("Search").unwrap();
        assert_eq!(search.type_name().unwrap(), "isindex");
        search.set_value("my isindex value").unwrap();
        search.click().await.unwrap();
        let seen = app.last_request().unwrap();
        assert_eq!(seen.method(), "GET");
        assert_eq!(seen.query(), "my+isindex+value");
        assert!(seen.body.is_empty());
    }

    #[tokio::test]
    async fn test_temporary_redirects_replay_post() {
        for status in [307, 308] {
            let browser = TestApp::new().browser();
            let url = format!("http://localhost/redirect?to=/echo&status={}", status);
            browser
                .post(&url, b"x=1&y=two".to_vec(), None)
                .await
                .unwrap();
            let contents = browser.contents().unwrap();
            assert!(contents.starts_with("POST /echo\n"));
            let head = TestHelper::echoed_head(&contents);
            assert!(head.contains(&"Content-Type: application/x-www-form-urlencoded".to_string()));
            assert_eq!(TestHelper::echoed_body(&contents), "x=1&y=two");
        }
    }

    #[tokio::test]
    async fn test_urlencoded_reserved_characters_round_trip() {
        let (app, browser) = forms_browser().await;
        let tricky = "a&b=c d+e/f%g?h#i \u{e9}";
        browser
            .get_control("Text Control")
            .unwrap()
            .set_value(tricky)
            .unwrap();
        browser.get_control("GOOD").unwrap().click().await.unwrap();
        let seen = app.last_request().unwrap();
        let body = String::from_utf8(seen.body.clone()).unwrap();
        assert!(body.contains("text-value=a%26b%3Dc+d%2Be%2Ff%25g%3Fh%23i+%C3%A9"));
        let pairs = seen.form_pairs();
        assert!(pairs.contains(&("text-value".to_string(), tricky.to_string())));
    }

    #[tokio::test]
    async fn test_label_lookup_needs_whole_words() {
        let (_app, browser) = forms_browser().await;
        assert!(matches!(
            browser.get_control("Contr"),
            Err(BrowserError::ControlNotFound(_))
        ));
        assert!(matches!(
            browser.get_control("text control"),
            Err(BrowserError::ControlNotFound(_))
        ));
        assert!(browser.get_control("Control").is_ok());
    }

    #[tokio::test]
    async fn test_get_form_rejects_multipart() {
        let app = TestApp::new().page(
            "/get-multipart.html",
            r#"<html><body><form action="/echo" method="get" enctype="multipart/form-data">
            <input name="q" value="x">
            <input type="submit" name="go" value="Go">
            </form></body></html>"#,
        );
        let browser = app.browser();
        browser
            .open("http://localhost/get-multipart.html")
            .await
            .unwrap();
        let sent = app.requests().len();
        assert!(matches!(
            browser.get_control("Go").unwrap().click().await,
            Err(BrowserError::Encoding(_))
        ));
        assert_eq!(app.requests().len(), sent);
        assert_eq!(
            browser.url().as_deref(),
            Some("http://localhost/get-multipart.html")
        );
    }

    #[tokio::test]
    async fn test_checkbox_with_value_is_a_list() {
        let app = TestApp::new().page(
            "/check.html",
            r#"<html><body><form>
            <label><input type="checkbox" name="c" value="yes" checked> Agree</label>
            </form></body></html>"#,
        );
        let browser = app.browser();
        browser.open("http://localhost/check.html").await.unwrap();
        let control = browser.get_control(ControlLookup::name("c")).unwrap();
        assert_eq!(control.value().unwrap(), Value::List(vec!["yes".to_string()]));
        assert!(matches!(control.set_value(true), Err(BrowserError::Type(_))));
        assert!(!control.disabled().unwrap());
        control.set_value(Vec::<String>::new()).unwrap();
        assert_eq!(control.value().unwrap(), Value::List(Vec::new()));
    }
}
