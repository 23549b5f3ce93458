use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

/// Collapses runs of whitespace to one space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Text of these elements never counts towards a label.
const SKIPPED: &[&str] = &["select", "option", "textarea", "script", "style"];

fn collect_text(el: ElementRef, skip: &[&str], out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            if !skip.contains(&child.value().name()) {
                collect_text(child, skip, out);
            }
        }
    }
}

/// Normalised visible text of `el`, excluding form widget contents.
pub fn label_text(el: ElementRef) -> String {
    let mut out = String::new();
    collect_text(el, SKIPPED, &mut out);
    normalize_whitespace(&out)
}

/// Normalised text of all descendants of `el`.
pub fn element_text(el: ElementRef) -> String {
    let mut out = String::new();
    collect_text(el, &["script", "style"], &mut out);
    normalize_whitespace(&out)
}

/// `<label>` lookup for one document: `for=` targets plus enclosing labels.
#[derive(Debug, Default)]
pub struct LabelIndex {
    by_target: HashMap<String, Vec<String>>,
}

impl LabelIndex {
    pub fn build(html: &Html) -> Self {
        let mut by_target: HashMap<String, Vec<String>> = HashMap::new();
        if let Ok(selector) = Selector::parse("label[for]") {
            for label in html.select(&selector) {
                if let Some(target) = label.value().attr("for") {
                    let text = label_text(label);
                    if !text.is_empty() {
                        by_target.entry(target.to_string()).or_default().push(text);
                    }
                }
            }
        }
        Self { by_target }
    }

    /// Labels of `el`: the enclosing `<label>` first, then every
    /// `<label for=...>` naming the element's id.
    pub fn labels_for(&self, el: ElementRef) -> Vec<String> {
        let mut labels = Vec::new();
        let enclosing = el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| a.value().name() == "label");
        if let Some(label) = enclosing {
            // a label with `for` is attributed to its target instead
            if label.value().attr("for").is_none() {
                let text = label_text(label);
                if !text.is_empty() {
                    labels.push(text);
                }
            }
        }
        if let Some(id) = el.value().id() {
            if let Some(found) = self.by_target.get(id) {
                labels.extend(found.iter().cloned());
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  "), "a b");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_enclosing_and_for_labels() {
        let html = Html::parse_document(
            r#"<form>
                <label>Outer <input id="a" name="a"></label>
                <label for="a">Explicit</label>
                <label for="b">Select  label</label>
                <select id="b"><option>One</option></select>
            </form>"#,
        );
        let index = LabelIndex::build(&html);
        let input = html
            .select(&Selector::parse("input").unwrap())
            .next()
            .unwrap();
        assert_eq!(
            index.labels_for(input),
            vec!["Outer".to_string(), "Explicit".to_string()]
        );
        let select = html
            .select(&Selector::parse("select").unwrap())
            .next()
            .unwrap();
        assert_eq!(index.labels_for(select), vec!["Select label".to_string()]);
    }
}
