use super::labels::{element_text, normalize_whitespace};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// A link found in a page (`<a href>` or `<area href>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub tag: String,
    pub href: String,
    pub url: String,
    pub text: String,
    pub attrs: BTreeMap<String, String>,
}

/// Parsed HTML page together with the URL it was served from.
pub struct Document {
    html: Html,
    base_url: Url,
}

pub(crate) fn attributes(el: ElementRef) -> BTreeMap<String, String> {
    el.value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Document {
    pub fn parse(source: &str, url: &Url) -> Self {
        let html = Html::parse_document(source);
        let base_url = Selector::parse("base[href]")
            .ok()
            .and_then(|selector| {
                html.select(&selector)
                    .next()
                    .and_then(|base| base.value().attr("href"))
                    .and_then(|href| url.join(href.trim()).ok())
            })
            .unwrap_or_else(|| url.clone());
        Self { html, base_url }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// `<base href>` when the page declares one, else the page URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|t| normalize_whitespace(&t.text().collect::<String>()))
    }

    /// Links in document order: `a` and `area` by `href`, `frame` and
    /// `iframe` by `src`. Frames have no link text.
    pub fn links(&self) -> Vec<LinkInfo> {
        let selector = match Selector::parse("a[href], area[href], frame[src], iframe[src]") {
            Ok(selector) => selector,
            Err(_) => return Vec::new(),
        };
        self.html
            .select(&selector)
            .filter_map(|el| {
                let tag = el.value().name().to_string();
                let target = match tag.as_str() {
                    "frame" | "iframe" => "src",
                    _ => "href",
                };
                let href = el.value().attr(target)?.trim().to_string();
                let url = self.base_url.join(&href).ok()?;
                let text = match tag.as_str() {
                    "area" => el.value().attr("alt").map(normalize_whitespace).unwrap_or_default(),
                    "frame" | "iframe" => String::new(),
                    _ => element_text(el),
                };
                Some(LinkInfo {
                    tag,
                    href,
                    url: url.to_string(),
                    text,
                    attrs: attributes(el),
                })
            })
            .collect()
    }
}
