use crate::dom::{normalize_whitespace, LinkInfo};
use crate::errors::{BrowserError, Result};
use crate::forms::{FormControl, HtmlForm};
use regex::Regex;
use std::fmt;
use std::rc::Rc;

/// A search term: literal text or a regular expression.
#[derive(Debug, Clone)]
pub enum Pattern {
    Text(String),
    Regex(Regex),
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Pattern::Text(s.to_string())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::Text(s)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

impl From<&Regex> for Pattern {
    fn from(re: &Regex) -> Self {
        Pattern::Regex(re.clone())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Text(s) => write!(f, "{:?}", s),
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl Pattern {
    /// Regex used for whole-word label matching. Literal text is
    /// whitespace-normalised and must be bounded by a word boundary,
    /// a non-word character or the ends of the label.
    pub fn label_regex(&self) -> Result<Regex> {
        match self {
            Pattern::Regex(re) => Ok(re.clone()),
            Pattern::Text(text) => {
                let escaped = regex::escape(&normalize_whitespace(text));
                Ok(Regex::new(&format!(r"(^|\b|\W){}(\b|\W|$)", escaped))?)
            }
        }
    }

    /// Substring search for text, `search` semantics for regexes.
    pub fn search(&self, haystack: &str) -> bool {
        match self {
            Pattern::Text(text) => haystack.contains(text.as_str()),
            Pattern::Regex(re) => re.is_match(haystack),
        }
    }

    /// Text search against normalised link text.
    pub fn search_normalized(&self, haystack: &str) -> bool {
        match self {
            Pattern::Text(text) => haystack.contains(normalize_whitespace(text).as_str()),
            Pattern::Regex(re) => re.is_match(haystack),
        }
    }
}

/// True when any of `labels` matches `matcher` (see [`Pattern::label_regex`]).
pub fn labels_match(labels: &[String], matcher: &Regex) -> bool {
    labels
        .iter()
        .any(|l| matcher.is_match(&normalize_whitespace(l)))
}

/// Picks one match out of `found`.
///
/// Without an index exactly one match is required; with an index the
/// index must be in range.
pub fn disambiguate<T>(
    mut found: Vec<T>,
    index: Option<usize>,
    criteria: &str,
    describe: impl Fn(&T) -> String,
) -> Result<T> {
    match index {
        _ if found.is_empty() => Err(BrowserError::ControlNotFound(criteria.to_string())),
        None if found.len() == 1 => Ok(found.remove(0)),
        None => {
            let listed: Vec<String> = found.iter().map(&describe).collect();
            Err(BrowserError::Ambiguity(format!(
                "{}: {} matches: {}",
                criteria,
                found.len(),
                listed.join(", ")
            )))
        }
        Some(i) if i < found.len() => Ok(found.swap_remove(i)),
        Some(i) => Err(BrowserError::IndexOutOfRange {
            description: format!(
                "{} (indexes 0..{} found)",
                criteria,
                found.len()
            ),
            index: i,
            found: found.len(),
        }),
    }
}

/// Control search criteria for a single form.
///
/// All supplied criteria must hold; `nr` picks the Nth match in document
/// order. Labels match whole words, like the browser-level lookup.
#[derive(Clone, Default)]
pub struct ControlQuery {
    pub name: Option<String>,
    pub type_name: Option<String>,
    pub kind: Option<String>,
    pub id: Option<String>,
    pub label: Option<Pattern>,
    pub predicate: Option<Rc<dyn Fn(&FormControl) -> bool>>,
    pub nr: Option<usize>,
}

impl fmt::Debug for ControlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlQuery")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("label", &self.label)
            .field("predicate", &self.predicate.is_some())
            .field("nr", &self.nr)
            .finish()
    }
}

impl ControlQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn type_name(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn label(mut self, label: impl Into<Pattern>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn predicate(mut self, predicate: impl Fn(&FormControl) -> bool + 'static) -> Self {
        self.predicate = Some(Rc::new(predicate));
        self
    }

    pub fn nr(mut self, nr: usize) -> Self {
        self.nr = Some(nr);
        self
    }

    fn label_matcher(&self) -> Result<Option<Regex>> {
        self.label.as_ref().map(Pattern::label_regex).transpose()
    }

    fn matches_with(&self, control: &FormControl, label: Option<&Regex>) -> bool {
        if let Some(name) = &self.name {
            if control.name() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(type_name) = &self.type_name {
            if control.type_name() != type_name {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if !control.is_of_kind(kind) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if control.id() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(label) = label {
            if !labels_match(control.labels(), label) {
                return false;
            }
        }
        if let Some(predicate) = &self.predicate {
            if !predicate(control) {
                return false;
            }
        }
        true
    }

    pub fn matches(&self, control: &FormControl) -> Result<bool> {
        let label = self.label_matcher()?;
        Ok(self.matches_with(control, label.as_ref()))
    }

    /// Indexes of the controls matching every criterion and `extra`.
    pub fn filter(
        &self,
        controls: &[FormControl],
        extra: impl Fn(&FormControl) -> bool,
    ) -> Result<Vec<usize>> {
        let label = self.label_matcher()?;
        Ok(controls
            .iter()
            .enumerate()
            .filter(|(_, c)| extra(c) && self.matches_with(c, label.as_ref()))
            .map(|(idx, _)| idx)
            .collect())
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(format!("name {:?}", name));
        }
        if let Some(type_name) = &self.type_name {
            parts.push(format!("type {:?}", type_name));
        }
        if let Some(kind) = &self.kind {
            parts.push(format!("kind {:?}", kind));
        }
        if let Some(id) = &self.id {
            parts.push(format!("id {:?}", id));
        }
        if let Some(label) = &self.label {
            parts.push(format!("label {}", label));
        }
        if self.predicate.is_some() {
            parts.push("predicate".to_string());
        }
        if parts.is_empty() {
            "any control".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Finds the index of the control matching `query` among `controls`.
pub fn find_control(controls: &[FormControl], query: &ControlQuery) -> Result<usize> {
    let found = query.filter(controls, |_| true)?;
    disambiguate(found, query.nr, &query.describe(), |&idx| {
        controls[idx].to_string()
    })
}

/// Browser-level control lookup: exactly one of `label` and `name`,
/// optionally with an index among the matches.
#[derive(Debug, Clone, Default)]
pub struct ControlLookup {
    pub label: Option<Pattern>,
    pub name: Option<String>,
    pub index: Option<usize>,
}

impl ControlLookup {
    pub fn label(label: impl Into<Pattern>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn describe(&self) -> String {
        match (&self.label, &self.name) {
            (Some(label), _) => format!("label {}", label),
            (None, Some(name)) => format!("name {:?}", name),
            (None, None) => "no criteria".to_string(),
        }
    }
}

impl From<&str> for ControlLookup {
    fn from(label: &str) -> Self {
        ControlLookup::label(label)
    }
}

impl From<Regex> for ControlLookup {
    fn from(label: Regex) -> Self {
        ControlLookup::label(label)
    }
}

/// Where a control lookup landed: a whole control, or one item of a list
/// control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMatch {
    Control { form: usize, control: usize },
    Item { form: usize, control: usize, item: usize },
}

impl ControlMatch {
    pub fn form(&self) -> usize {
        match *self {
            ControlMatch::Control { form, .. } | ControlMatch::Item { form, .. } => form,
        }
    }

    pub fn control(&self) -> usize {
        match *self {
            ControlMatch::Control { control, .. } | ControlMatch::Item { control, .. } => control,
        }
    }

    pub fn item(&self) -> Option<usize> {
        match *self {
            ControlMatch::Control { .. } => None,
            ControlMatch::Item { item, .. } => Some(item),
        }
    }
}

fn describe_match(forms: &[HtmlForm], m: &ControlMatch) -> String {
    let control = &forms[m.form()].controls()[m.control()];
    match m.item() {
        Some(item) => format!(
            "item {:?} of {}",
            control.items()[item].value,
            control
        ),
        None => control.to_string(),
    }
}

fn available_controls(forms: &[HtmlForm], scope: &[usize]) -> String {
    let mut lines = Vec::new();
    for &f in scope {
        for control in forms[f].controls() {
            lines.push(format!(
                "  {} ({}) labels: {:?}",
                control.name().unwrap_or("<None>"),
                control.type_name(),
                control.labels()
            ));
            for item in control.items() {
                lines.push(format!("    item {:?} labels: {:?}", item.value, item.labels));
            }
        }
    }
    if lines.is_empty() {
        "no controls available".to_string()
    } else {
        format!("available controls:\n{}", lines.join("\n"))
    }
}

/// Finds a control (or list item) by label or name across `forms`, or
/// within the single form `only_form`.
///
/// Radio and checkbox groups are matched through their items' labels;
/// select controls match by their own labels and by their options'.
pub fn locate_control(
    forms: &[HtmlForm],
    only_form: Option<usize>,
    lookup: &ControlLookup,
) -> Result<ControlMatch> {
    locate_control_where(forms, only_form, lookup, |_| true)
}

/// [`locate_control`] restricted to controls accepted by `filter`.
pub fn locate_control_where(
    forms: &[HtmlForm],
    only_form: Option<usize>,
    lookup: &ControlLookup,
    filter: impl Fn(&FormControl) -> bool,
) -> Result<ControlMatch> {
    if lookup.label.is_some() == lookup.name.is_some() {
        return Err(BrowserError::InvalidArgument(
            "supply exactly one of label and name".to_string(),
        ));
    }
    let scope: Vec<usize> = match only_form {
        Some(f) => vec![f],
        None => (0..forms.len()).collect(),
    };
    let mut found = Vec::new();
    match (&lookup.label, &lookup.name) {
        (Some(label), _) => {
            let matcher = label.label_regex()?;
            for &f in &scope {
                for (c, control) in forms[f].controls().iter().enumerate() {
                    if !filter(control) {
                        continue;
                    }
                    let grouped = matches!(control.type_name(), "radio" | "checkbox");
                    if !grouped && labels_match(control.labels(), &matcher) {
                        found.push(ControlMatch::Control { form: f, control: c });
                    }
                    for (i, item) in control.items().iter().enumerate() {
                        if labels_match(&item.labels, &matcher) {
                            found.push(ControlMatch::Item {
                                form: f,
                                control: c,
                                item: i,
                            });
                        }
                    }
                }
            }
        }
        (None, Some(name)) => {
            for &f in &scope {
                for (c, control) in forms[f].controls().iter().enumerate() {
                    if control.name() == Some(name.as_str()) && filter(control) {
                        found.push(ControlMatch::Control { form: f, control: c });
                    }
                }
            }
        }
        (None, None) => {}
    }
    let criteria = if found.is_empty() {
        format!("{}\n{}", lookup.describe(), available_controls(forms, &scope))
    } else {
        lookup.describe()
    };
    disambiguate(found, lookup.index, &criteria, |m| describe_match(forms, m))
}

/// Form lookup: at most one of `id`, `name` and `action` (a regular
/// expression searched in the action URL).
#[derive(Debug, Clone, Default)]
pub struct FormLookup {
    pub id: Option<String>,
    pub name: Option<String>,
    pub action: Option<Pattern>,
    pub index: Option<usize>,
}

impl FormLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn action(mut self, action: impl Into<Pattern>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

pub fn locate_form(forms: &[HtmlForm], lookup: &FormLookup) -> Result<usize> {
    let given = [
        lookup.id.is_some(),
        lookup.name.is_some(),
        lookup.action.is_some(),
    ]
    .iter()
    .filter(|g| **g)
    .count();
    if given > 1 {
        return Err(BrowserError::InvalidArgument(
            "supply at most one of id, name and action".to_string(),
        ));
    }
    let action = match &lookup.action {
        Some(Pattern::Text(text)) => Some(Regex::new(text)?),
        Some(Pattern::Regex(re)) => Some(re.clone()),
        None => None,
    };
    let found: Vec<usize> = forms
        .iter()
        .enumerate()
        .filter(|(_, form)| {
            lookup.id.as_deref().map_or(true, |id| form.id() == Some(id))
                && lookup.name.as_deref().map_or(true, |n| form.name() == Some(n))
                && action
                    .as_ref()
                    .map_or(true, |re| re.is_match(form.action().as_str()))
        })
        .map(|(idx, _)| idx)
        .collect();
    let mut index = lookup.index;
    if given == 0 && index.is_none() {
        if found.len() != 1 {
            return Err(BrowserError::InvalidArgument(
                "if no other arguments are given, index is required".to_string(),
            ));
        }
        index = Some(0);
    }
    let criteria = match (&lookup.id, &lookup.name, &lookup.action) {
        (Some(id), _, _) => format!("form with id {:?}", id),
        (_, Some(name), _) => format!("form named {:?}", name),
        (_, _, Some(action)) => format!("form with action {}", action),
        _ => "form".to_string(),
    };
    disambiguate(found, index, &criteria, |&idx| {
        format!("form #{} ({})", idx, forms[idx].action())
    })
}

/// Link lookup by text, URL and/or id. Every given criterion must hold;
/// `index` counts the matches, starting at 0.
#[derive(Debug, Clone, Default)]
pub struct LinkQuery {
    pub text: Option<Pattern>,
    pub url: Option<Pattern>,
    pub id: Option<String>,
    pub index: usize,
}

impl LinkQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<Pattern>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn url(mut self, url: impl Into<Pattern>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(text) = &self.text {
            parts.push(format!("text {}", text));
        }
        if let Some(url) = &self.url {
            parts.push(format!("url {}", url));
        }
        if let Some(id) = &self.id {
            parts.push(format!("id {:?}", id));
        }
        parts.push(format!("index {}", self.index));
        parts.join(", ")
    }
}

impl From<&str> for LinkQuery {
    fn from(text: &str) -> Self {
        LinkQuery::text(text)
    }
}

impl From<Regex> for LinkQuery {
    fn from(text: Regex) -> Self {
        LinkQuery::text(text)
    }
}

pub fn locate_link(links: &[LinkInfo], query: &LinkQuery) -> Result<usize> {
    links
        .iter()
        .enumerate()
        .filter(|(_, link)| {
            query
                .text
                .as_ref()
                .map_or(true, |t| t.search_normalized(&link.text))
                && query
                    .url
                    .as_ref()
                    .map_or(true, |u| u.search(&link.href) || u.search(&link.url))
                && query
                    .id
                    .as_deref()
                    .map_or(true, |id| link.attrs.get("id").map(String::as_str) == Some(id))
        })
        .map(|(idx, _)| idx)
        .nth(query.index)
        .ok_or_else(|| BrowserError::LinkNotFound(query.describe()))
}
