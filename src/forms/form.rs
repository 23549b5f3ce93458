use super::control::{FieldValue, FormControl, Item, Value};
use super::encode::{self, RequestData};
use crate::dom::document::attributes;
use crate::dom::{element_text, normalize_whitespace, Document, LabelIndex};
use crate::errors::{BrowserError, Result};
use crate::locate::{self, ControlQuery};
use scraper::{ElementRef, Selector};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

pub const URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MULTIPART: &str = "multipart/form-data";

/// One `<form>` and its controls in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlForm {
    action: Url,
    method: String,
    enctype: String,
    name: Option<String>,
    id: Option<String>,
    attrs: BTreeMap<String, String>,
    controls: Vec<FormControl>,
}

impl HtmlForm {
    pub fn new(action: Url, method: &str, enctype: &str, attrs: BTreeMap<String, String>) -> Self {
        Self {
            action,
            method: method.to_uppercase(),
            enctype: enctype.to_lowercase(),
            name: attrs.get("name").cloned(),
            id: attrs.get("id").cloned(),
            attrs,
            controls: Vec::new(),
        }
    }

    pub fn action(&self) -> &Url {
        &self.action
    }

    pub fn set_action(&mut self, action: Url) {
        self.action = action;
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn enctype(&self) -> &str {
        &self.enctype
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    pub fn controls(&self) -> &[FormControl] {
        &self.controls
    }

    pub fn control(&self, index: usize) -> Option<&FormControl> {
        self.controls.get(index)
    }

    pub fn control_mut(&mut self, index: usize) -> Option<&mut FormControl> {
        self.controls.get_mut(index)
    }

    pub fn push_control(&mut self, control: FormControl) {
        self.controls.push(control);
    }

    pub fn fixup(&mut self, select_default: bool) {
        for control in &mut self.controls {
            control.fixup(select_default);
        }
    }

    pub fn find_control(&self, query: &ControlQuery) -> Result<usize> {
        locate::find_control(&self.controls, query)
    }

    pub fn find_control_mut(&mut self, query: &ControlQuery) -> Result<&mut FormControl> {
        let index = self.find_control(query)?;
        Ok(&mut self.controls[index])
    }

    pub fn get_value(&self, query: &ControlQuery) -> Result<Value> {
        let index = self.find_control(query)?;
        Ok(self.controls[index].value())
    }

    pub fn set_value(&mut self, query: &ControlQuery, value: Value) -> Result<()> {
        self.find_control_mut(query)?.set_value(value)
    }

    pub fn add_file(
        &mut self,
        query: &ControlQuery,
        data: Vec<u8>,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<()> {
        let query = ControlQuery {
            kind: Some("file".to_string()),
            ..query.clone()
        };
        self.find_control_mut(&query)?
            .add_file(data, content_type, filename)
    }

    /// Clears every control that can be written to.
    pub fn clear_all(&mut self) {
        for control in &mut self.controls {
            let _ = control.clear();
        }
    }

    pub fn set_all_readonly(&mut self, readonly: bool) {
        for control in &mut self.controls {
            control.set_readonly(readonly);
        }
    }

    /// Finds a clickable (or isindex) control for `query`.
    pub fn find_clickable(&self, query: &ControlQuery) -> Result<usize> {
        let found = query.filter(&self.controls, |c| {
            c.is_of_kind("clickable") || c.type_name() == "isindex"
        })?;
        locate::disambiguate(found, query.nr, &query.describe(), |&idx| {
            self.controls[idx].to_string()
        })
    }

    /// Successful pairs in document order; `clicked` names the clicked
    /// control and the click coordinates.
    pub fn pairs(&self, clicked: Option<(usize, (i32, i32))>) -> Vec<(String, FieldValue)> {
        self.controls
            .iter()
            .enumerate()
            .flat_map(|(idx, control)| {
                let click = clicked.and_then(|(c, coord)| (c == idx).then_some(coord));
                control.pairs(click)
            })
            .collect()
    }

    /// Pairs as they would be url-encoded (file controls give an empty value).
    pub fn click_pairs(&self, clicked: Option<(usize, (i32, i32))>) -> Vec<(String, String)> {
        self.pairs(clicked)
            .into_iter()
            .map(|(name, value)| match value {
                FieldValue::Text(text) => (name, text),
                FieldValue::Files(_) => (name, String::new()),
            })
            .collect()
    }

    /// Request that submitting the form would issue.
    pub fn click_request_data(&self, clicked: Option<(usize, (i32, i32))>) -> Result<RequestData> {
        if let Some((idx, _)) = clicked {
            let control = self.controls.get(idx).ok_or_else(|| {
                BrowserError::ControlNotFound(format!("control #{}", idx))
            })?;
            if control.type_name() == "isindex" {
                let value = control.value();
                return encode::isindex_request(&self.action, value.as_text().unwrap_or_default());
            }
        }
        encode::encode_submission(&self.action, &self.method, &self.enctype, self.pairs(clicked))
    }
}

impl fmt::Display for HtmlForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .name
            .as_ref()
            .map(|n| format!("{} ", n))
            .unwrap_or_default();
        write!(f, "<{}{} {} {}", name, self.method, self.action, self.enctype)?;
        for control in &self.controls {
            write!(f, "\n  {}", control)?;
        }
        write!(f, ">")
    }
}

fn selector(source: &str) -> Result<Selector> {
    Selector::parse(source)
        .map_err(|e| BrowserError::InvalidArgument(format!("selector {}: {:?}", source, e)))
}

fn input_type(el: ElementRef) -> String {
    match el.value().name() {
        "textarea" => "textarea".to_string(),
        "select" => "select".to_string(),
        "isindex" => "isindex".to_string(),
        "button" => {
            let t = el.value().attr("type").unwrap_or("submit").to_lowercase();
            match t.as_str() {
                "reset" => "resetbutton".to_string(),
                "button" => "buttonbutton".to_string(),
                _ => "submitbutton".to_string(),
            }
        }
        _ => el
            .value()
            .attr("type")
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text".to_string()),
    }
}

fn select_items(el: ElementRef) -> Result<Vec<Item>> {
    let options = selector("option")?;
    let mut items = Vec::new();
    for option in el.select(&options) {
        let attrs = attributes(option);
        let contents = option.text().collect::<String>().trim().to_string();
        let in_disabled_group = option
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|a| a.value().name() != "select")
            .any(|a| a.value().name() == "optgroup" && a.value().attr("disabled").is_some());
        let text = normalize_whitespace(&contents);
        let mut labels = Vec::new();
        if let Some(label) = attrs.get("label") {
            labels.push(normalize_whitespace(label));
        }
        if labels.first() != Some(&text) {
            labels.push(text);
        }
        items.push(Item {
            value: attrs.get("value").cloned().unwrap_or_else(|| contents.clone()),
            labels,
            selected: attrs.contains_key("selected"),
            disabled: attrs.contains_key("disabled") || in_disabled_group,
            id: attrs.get("id").cloned(),
            attrs,
        });
    }
    Ok(items)
}

fn parse_form(
    form_el: ElementRef,
    base_url: &Url,
    labels: &LabelIndex,
    select_default: bool,
) -> Result<HtmlForm> {
    let attrs = attributes(form_el);
    let action = match attrs.get("action").map(|a| a.trim()) {
        Some(action) if !action.is_empty() => base_url.join(action).unwrap_or_else(|err| {
            warn!(action, error = %err, "unparseable form action, using the page URL");
            base_url.clone()
        }),
        _ => base_url.clone(),
    };
    let method = attrs.get("method").map(String::as_str).unwrap_or("GET");
    let enctype = attrs.get("enctype").map(String::as_str).unwrap_or(URLENCODED);
    let mut form = HtmlForm::new(action, method, enctype, attrs.clone());

    let widgets = selector("input, button, textarea, select, isindex")?;
    for el in form_el.select(&widgets) {
        let type_name = input_type(el);
        let mut attrs = attributes(el);
        let name = attrs.get("name").cloned();
        let mut control_labels = labels.labels_for(el);
        match type_name.as_str() {
            "radio" | "checkbox" => {
                let mut item = Item::new(attrs.get("value").cloned().unwrap_or_else(|| "on".to_string()));
                item.labels = control_labels;
                item.selected = attrs.contains_key("checked");
                item.disabled = attrs.contains_key("disabled");
                item.id = attrs.get("id").cloned();
                item.attrs = attrs.clone();
                let existing = form.controls.iter_mut().find(|c| {
                    name.is_some() && c.type_name() == type_name && c.name() == name.as_deref()
                });
                match existing {
                    Some(control) => control.push_item(item),
                    None => {
                        attrs.remove("disabled");
                        attrs.remove("readonly");
                        attrs.remove("id");
                        form.controls.push(FormControl::list(
                            &type_name,
                            name,
                            attrs,
                            vec![item],
                            type_name == "checkbox",
                            Vec::new(),
                        ));
                    }
                }
            }
            "select" => {
                let items = select_items(el)?;
                let multiple = attrs.contains_key("multiple");
                form.controls.push(FormControl::list(
                    "select",
                    name,
                    attrs,
                    items,
                    multiple,
                    control_labels,
                ));
            }
            _ => {
                if type_name == "textarea" {
                    attrs.insert("value".to_string(), el.text().collect());
                }
                if matches!(type_name.as_str(), "submit" | "submitbutton" | "image") {
                    if type_name == "submitbutton" {
                        let text = element_text(el);
                        if !text.is_empty() {
                            control_labels.push(text);
                        }
                    }
                    if let Some(value) = attrs.get("value") {
                        let value = normalize_whitespace(value);
                        if !value.is_empty() && !control_labels.contains(&value) {
                            control_labels.push(value);
                        }
                    }
                }
                form.controls
                    .push(FormControl::scalar(&type_name, name, attrs, control_labels));
            }
        }
    }
    form.fixup(select_default);
    Ok(form)
}

/// Parses every `<form>` of a page.
pub fn parse_forms(document: &Document, select_default: bool) -> Result<Vec<HtmlForm>> {
    let forms = selector("form")?;
    let labels = LabelIndex::build(document.html());
    let parsed = document
        .html()
        .select(&forms)
        .map(|el| parse_form(el, document.base_url(), &labels, select_default))
        .collect::<Result<Vec<_>>>()?;
    debug!(count = parsed.len(), "parsed forms");
    Ok(parsed)
}

/// Parses forms straight from HTML source served from `base_url`.
pub fn parse_html_forms(source: &str, base_url: &Url, select_default: bool) -> Result<Vec<HtmlForm>> {
    parse_forms(&Document::parse(source, base_url), select_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forms(source: &str) -> Vec<HtmlForm> {
        let url = Url::parse("http://localhost/page").unwrap();
        parse_html_forms(source, &url, false).unwrap()
    }

    #[test]
    fn test_bad_action_keeps_other_forms() {
        let f = forms(
            r#"<form name="good" action="/ok"><input name="a"></form>
               <form name="bad" action="http://[bad"><input name="b"></form>"#,
        );
        assert_eq!(f.len(), 2);
        assert_eq!(f[0].action().as_str(), "http://localhost/ok");
        assert_eq!(f[1].action().as_str(), "http://localhost/page");
        assert_eq!(f[1].controls()[0].name(), Some("b"));
    }

    #[test]
    fn test_option_labels_are_normalised() {
        let f = forms(
            "<form><select name=s>\
             <option value=1>  Two\n   words  </option>\
             <option label=\"  Spaced   label \">x</option>\
             </select></form>",
        );
        let items = f[0].controls()[0].items();
        assert_eq!(items[0].labels, vec!["Two words".to_string()]);
        assert_eq!(items[1].labels, vec!["Spaced label".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_textarea_whitespace() {
        let f = forms(
            "<form><textarea name=a>\nFoo\n</textarea>\
             <textarea name=b>\n\nFoo\n</textarea>\
             <textarea name=c>  Foo  </textarea></form>",
        );
        let values: Vec<Value> = f[0].controls().iter().map(|c| c.value()).collect();
        assert_eq!(
            values,
            vec![
                Value::from("Foo\n"),
                Value::from("\nFoo\n"),
                Value::from("  Foo  "),
            ]
        );
    }

    #[test]
    fn test_form_attributes() {
        let f = forms(
            r#"<form name="f" id="fid" action="/submit?x=1" method="post"
                     enctype="multipart/form-data"><input name="q"></form>
               <form><input name="r"></form>"#,
        );
        assert_eq!(f.len(), 2);
        assert_eq!(f[0].action().as_str(), "http://localhost/submit?x=1");
        assert_eq!(f[0].method(), "POST");
        assert_eq!(f[0].enctype(), MULTIPART);
        assert_eq!(f[0].name(), Some("f"));
        assert_eq!(f[0].id(), Some("fid"));
        assert_eq!(f[1].action().as_str(), "http://localhost/page");
        assert_eq!(f[1].method(), "GET");
        assert_eq!(f[1].enctype(), URLENCODED);
    }

    #[test]
    fn test_radio_group_merges_items() {
        let f = forms(
            r#"<form>
                <label><input type="radio" name="r" value="1"> One</label>
                <input type="text" name="t">
                <label><input type="radio" name="r" value="2" checked> Two</label>
                <input type="checkbox" name="c">
               </form>"#,
        );
        let controls = f[0].controls();
        assert_eq!(controls.len(), 3);
        assert_eq!(controls[0].type_name(), "radio");
        assert_eq!(controls[0].items().len(), 2);
        assert_eq!(controls[0].items()[1].labels, vec!["Two".to_string()]);
        assert_eq!(controls[0].value(), Value::from(vec!["2"]));
        assert!(controls[2].is_single_checkbox());
    }

    #[test]
    fn test_select_options() {
        let f = forms(
            r#"<form><select name="s" multiple>
                 <option value="a" label="Alpha">A</option>
                 <option selected>  Bee </option>
                 <optgroup disabled><option>Gamma</option></optgroup>
               </select></form>"#,
        );
        let select = &f[0].controls()[0];
        assert!(select.multiple());
        let items = select.items();
        assert_eq!(items[0].labels, vec!["Alpha".to_string(), "A".to_string()]);
        assert_eq!(items[1].value, "Bee");
        assert!(items[2].disabled);
        assert_eq!(select.value(), Value::from(vec!["Bee"]));
    }

    #[test]
    fn test_submit_labels_and_pairs() {
        let f = forms(
            r#"<form method="post">
                 <input type="submit" name="submit_me" value="GOOD">
                 <input type="submit" name="submit_me" value="BAD">
                 <button name="b" value="v">Press <i>me</i></button>
               </form>"#,
        );
        let form = &f[0];
        assert_eq!(form.controls()[2].labels(), &["Press me".to_string(), "v".to_string()]);
        let bad = form.find_clickable(&ControlQuery::new().label("BAD")).unwrap();
        assert_eq!(
            form.click_pairs(Some((bad, (1, 1)))),
            vec![("submit_me".to_string(), "BAD".to_string())]
        );
        assert!(form.click_pairs(None).is_empty());
    }
}
