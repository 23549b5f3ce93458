use crate::errors::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Behavioural family of a control; several HTML types share one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKind {
    Text,
    File,
    Clickable,
    Ignored,
    List,
    Isindex,
}

impl ControlKind {
    pub fn for_type(type_name: &str) -> Self {
        match type_name {
            "file" => ControlKind::File,
            "submit" | "submitbutton" | "image" => ControlKind::Clickable,
            "reset" | "resetbutton" | "button" | "buttonbutton" => ControlKind::Ignored,
            "select" | "radio" | "checkbox" => ControlKind::List,
            "isindex" => ControlKind::Isindex,
            _ => ControlKind::Text,
        }
    }
}

/// One uploaded file attached to a file control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub data: Vec<u8>,
    pub content_type: String,
    pub filename: Option<String>,
}

/// A value read from, or assigned to, a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    List(Vec<String>),
    Bool(bool),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::List(v)
    }
}

impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::List(v.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Value {
    fn from(v: [&str; N]) -> Self {
        Value::List(v.iter().map(|s| s.to_string()).collect())
    }
}

/// Field data a successful control contributes to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Files(Vec<Upload>),
}

/// One option of a list control (select option, radio or checkbox input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub value: String,
    pub labels: Vec<String>,
    pub selected: bool,
    pub disabled: bool,
    pub id: Option<String>,
    pub attrs: BTreeMap<String, String>,
}

impl Item {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            labels: Vec::new(),
            selected: false,
            disabled: false,
            id: None,
            attrs: BTreeMap::new(),
        }
    }

    /// First non-empty label, used for display.
    pub fn label(&self) -> Option<&str> {
        self.labels
            .iter()
            .map(String::as_str)
            .find(|l| !l.is_empty())
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut res = self.value.clone();
        if self.selected {
            res = format!("*{}", res);
        }
        if self.disabled {
            res = format!("({})", res);
        }
        f.write_str(&res)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlBody {
    Text { value: String },
    File { uploads: Vec<Upload> },
    Clickable { value: String, image: bool },
    Ignored { value: String },
    List { items: Vec<Item>, multiple: bool },
    Isindex { value: String },
}

/// One control of a parsed form.
///
/// `type` and `name` are fixed at parse time; the value contract depends on
/// the control's [`ControlKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormControl {
    type_name: String,
    name: Option<String>,
    id: Option<String>,
    attrs: BTreeMap<String, String>,
    disabled: bool,
    readonly: bool,
    labels: Vec<String>,
    body: ControlBody,
}

impl FormControl {
    /// Builds a scalar (non-list) control from its HTML type and attributes.
    pub fn scalar(
        type_name: &str,
        name: Option<String>,
        attrs: BTreeMap<String, String>,
        labels: Vec<String>,
    ) -> Self {
        let value = attrs.get("value").cloned();
        let (body, readonly) = match ControlKind::for_type(type_name) {
            ControlKind::File => (ControlBody::File { uploads: Vec::new() }, false),
            ControlKind::Clickable => {
                let image = type_name == "image";
                (
                    ControlBody::Clickable {
                        value: value.unwrap_or_default(),
                        image,
                    },
                    !image,
                )
            }
            ControlKind::Ignored => (
                ControlBody::Ignored {
                    value: value.unwrap_or_default(),
                },
                false,
            ),
            ControlKind::Isindex => (
                ControlBody::Isindex {
                    value: value.unwrap_or_default(),
                },
                false,
            ),
            // list types never reach here; they are built with `list`
            ControlKind::Text | ControlKind::List => (
                ControlBody::Text {
                    value: value.unwrap_or_default(),
                },
                type_name == "hidden",
            ),
        };
        let readonly = readonly || attrs.contains_key("readonly");
        Self {
            type_name: type_name.to_string(),
            id: attrs.get("id").cloned(),
            disabled: attrs.contains_key("disabled"),
            name,
            attrs,
            readonly,
            labels,
            body,
        }
    }

    /// Builds a list control (select, radio group or checkbox group).
    pub fn list(
        type_name: &str,
        name: Option<String>,
        attrs: BTreeMap<String, String>,
        items: Vec<Item>,
        multiple: bool,
        labels: Vec<String>,
    ) -> Self {
        Self {
            type_name: type_name.to_string(),
            id: attrs.get("id").cloned(),
            disabled: attrs.contains_key("disabled"),
            readonly: attrs.contains_key("readonly"),
            name,
            attrs,
            labels,
            body: ControlBody::List { items, multiple },
        }
    }

    pub(crate) fn push_item(&mut self, item: Item) {
        if let ControlBody::List { items, .. } = &mut self.body {
            items.push(item);
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
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

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn body(&self) -> &ControlBody {
        &self.body
    }

    pub fn kind(&self) -> ControlKind {
        match self.body {
            ControlBody::Text { .. } => ControlKind::Text,
            ControlBody::File { .. } => ControlKind::File,
            ControlBody::Clickable { .. } => ControlKind::Clickable,
            ControlBody::Ignored { .. } => ControlKind::Ignored,
            ControlBody::List { .. } => ControlKind::List,
            ControlBody::Isindex { .. } => ControlKind::Isindex,
        }
    }

    /// Kind test accepting `text`, `file`, `clickable`, `list`,
    /// `singlelist` and `multilist`.
    pub fn is_of_kind(&self, kind: &str) -> bool {
        match (kind, &self.body) {
            ("text", ControlBody::Text { .. }) => true,
            ("file", ControlBody::File { .. }) => true,
            ("clickable", ControlBody::Clickable { .. }) => true,
            ("list", ControlBody::List { .. }) => true,
            ("singlelist", ControlBody::List { multiple, .. }) => !multiple,
            ("multilist", ControlBody::List { multiple, .. }) => *multiple,
            _ => false,
        }
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    pub fn multiple(&self) -> bool {
        matches!(self.body, ControlBody::List { multiple: true, .. })
    }

    pub fn items(&self) -> &[Item] {
        match &self.body {
            ControlBody::List { items, .. } => items,
            _ => &[],
        }
    }

    pub fn uploads(&self) -> &[Upload] {
        match &self.body {
            ControlBody::File { uploads } => uploads,
            _ => &[],
        }
    }

    fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<None>".to_string())
    }

    fn check_writable(&self) -> Result<()> {
        if self.disabled {
            return Err(BrowserError::Disabled(self.display_name()));
        }
        if self.readonly {
            return Err(BrowserError::ReadOnly(self.display_name()));
        }
        Ok(())
    }

    /// Current value. File controls read as an empty string; list
    /// controls read as the values of selected, non-disabled items.
    pub fn value(&self) -> Value {
        match &self.body {
            ControlBody::Text { value }
            | ControlBody::Clickable { value, .. }
            | ControlBody::Ignored { value }
            | ControlBody::Isindex { value } => Value::Text(value.clone()),
            ControlBody::File { .. } => Value::Text(String::new()),
            ControlBody::List { items, .. } => Value::List(
                items
                    .iter()
                    .filter(|i| i.selected && !i.disabled)
                    .map(|i| i.value.clone())
                    .collect(),
            ),
        }
    }

    pub fn set_value(&mut self, value: Value) -> Result<()> {
        self.check_writable()?;
        let name = self.display_name();
        if let ControlBody::List { .. } = self.body {
            return match value {
                Value::List(values) => self.set_list_value(&values),
                Value::Bool(on) if self.is_single_checkbox() => self.set_item_selected(0, on),
                _ => Err(BrowserError::Type(format!(
                    "list control '{}' must be set to a sequence",
                    name
                ))),
            };
        }
        match (&mut self.body, value) {
            (ControlBody::Text { value: v }, Value::Text(s))
            | (ControlBody::Clickable { value: v, .. }, Value::Text(s))
            | (ControlBody::Isindex { value: v }, Value::Text(s)) => {
                *v = s;
                Ok(())
            }
            (ControlBody::Ignored { .. }, _) => Err(BrowserError::ReadOnly(name)),
            (ControlBody::File { .. }, _) => Err(BrowserError::Type(format!(
                "value of file control '{}' cannot be assigned, use add_file",
                name
            ))),
            (_, other) => Err(BrowserError::Type(format!(
                "control '{}' takes a string value, got {:?}",
                name, other
            ))),
        }
    }

    /// A checkbox group holding exactly one item whose value is `on`.
    pub fn is_single_checkbox(&self) -> bool {
        self.type_name == "checkbox" && self.items().len() == 1 && self.items()[0].value == "on"
    }

    /// Resets the control: scalar values become empty, uploads are dropped
    /// and list items are unselected.
    pub fn clear(&mut self) -> Result<()> {
        self.check_writable()?;
        match &mut self.body {
            ControlBody::Text { value }
            | ControlBody::Clickable { value, .. }
            | ControlBody::Isindex { value } => value.clear(),
            ControlBody::Ignored { .. } => {
                return Err(BrowserError::ReadOnly(self.display_name()));
            }
            ControlBody::File { uploads } => uploads.clear(),
            ControlBody::List { items, .. } => {
                for item in items.iter_mut().filter(|i| !i.disabled) {
                    item.selected = false;
                }
            }
        }
        Ok(())
    }

    pub fn add_file(
        &mut self,
        data: Vec<u8>,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        match &mut self.body {
            ControlBody::File { uploads } => {
                uploads.push(Upload {
                    data,
                    content_type: content_type
                        .unwrap_or("application/octet-stream")
                        .to_string(),
                    filename: filename.map(str::to_string),
                });
                Ok(())
            }
            _ => Err(BrowserError::Type(format!(
                "control '{}' is not a file control",
                self.display_name()
            ))),
        }
    }

    /// The (name, data) pairs this control contributes to a submission.
    /// `click` is `Some(coord)` when this is the control that was clicked.
    pub fn pairs(&self, click: Option<(i32, i32)>) -> Vec<(String, FieldValue)> {
        let name = match (&self.name, self.disabled) {
            (Some(name), false) => name.clone(),
            _ => return Vec::new(),
        };
        match &self.body {
            ControlBody::Text { value } => vec![(name, FieldValue::Text(value.clone()))],
            ControlBody::File { uploads } => vec![(name, FieldValue::Files(uploads.clone()))],
            ControlBody::Clickable { value, image } => match click {
                None => Vec::new(),
                Some((x, y)) if *image => {
                    let mut pairs = vec![
                        (format!("{}.x", name), FieldValue::Text(x.to_string())),
                        (format!("{}.y", name), FieldValue::Text(y.to_string())),
                    ];
                    if !value.is_empty() {
                        pairs.push((name, FieldValue::Text(value.clone())));
                    }
                    pairs
                }
                Some(_) => vec![(name, FieldValue::Text(value.clone()))],
            },
            ControlBody::Ignored { .. } | ControlBody::Isindex { .. } => Vec::new(),
            ControlBody::List { items, .. } => items
                .iter()
                .filter(|i| i.selected && !i.disabled)
                .map(|i| (name.clone(), FieldValue::Text(i.value.clone())))
                .collect(),
        }
    }

    /// Applies default selection after parsing. Disabled items never count
    /// as the selection of a radio group or select.
    pub fn fixup(&mut self, select_default: bool) {
        if self.type_name == "checkbox" {
            return;
        }
        let is_select = self.type_name == "select";
        if let ControlBody::List { items, multiple } = &mut self.body {
            let found: Vec<usize> = items
                .iter()
                .enumerate()
                .filter(|(_, i)| i.selected && !i.disabled)
                .map(|(idx, _)| idx)
                .collect();
            match found.split_last() {
                None if select_default || (is_select && !*multiple) => {
                    if let Some(first) = items.iter_mut().find(|i| !i.disabled) {
                        first.selected = true;
                    }
                }
                None => {}
                Some((_, rest)) if !*multiple => {
                    for &idx in rest {
                        items[idx].selected = false;
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// Indexes of items with the given value.
    pub fn items_from_value(&self, value: &str) -> Vec<usize> {
        self.items()
            .iter()
            .enumerate()
            .filter(|(_, i)| i.value == value)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Indexes of items having a label containing `label`.
    pub fn items_from_label(&self, label: &str) -> Vec<usize> {
        self.items()
            .iter()
            .enumerate()
            .filter(|(_, i)| i.labels.iter().any(|l| l.contains(label)))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Looks up one item by value (or by label when `by_label`), with the
    /// usual nothing/ambiguous/out-of-range disambiguation.
    pub fn get_item(&self, key: &str, by_label: bool, nr: Option<usize>) -> Result<usize> {
        let found = if by_label {
            self.items_from_label(key)
        } else {
            self.items_from_value(key)
        };
        match (found.len(), nr) {
            (0, _) => Err(BrowserError::ItemNotFound(key.to_string())),
            (1, None) => Ok(found[0]),
            (_, None) => Err(BrowserError::Ambiguity(key.to_string())),
            (n, Some(k)) if k >= n => Err(BrowserError::IndexOutOfRange {
                description: format!("item {:?}", key),
                index: k,
                found: n,
            }),
            (_, Some(k)) => Ok(found[k]),
        }
    }

    /// Candidate items for value `value`: selected ones first, then
    /// unselected ones, both excluding disabled items.
    fn candidate_items(&self, value: &str, target: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        let all = self.items_from_value(value);
        let items = self.items();
        let enabled: Vec<usize> = all.iter().copied().filter(|&i| !items[i].disabled).collect();
        if enabled.len() < target {
            if all.len() < target {
                return Err(BrowserError::ItemNotFound(format!(
                    "insufficient items with value {:?}",
                    value
                )));
            }
            return Err(BrowserError::ItemDisabled(value.to_string()));
        }
        Ok(enabled.into_iter().partition(|&i| items[i].selected))
    }

    fn set_list_value(&mut self, values: &[String]) -> Result<()> {
        let multiple = self.multiple();
        if values.is_empty() {
            if let ControlBody::List { items, .. } = &mut self.body {
                for item in items.iter_mut().filter(|i| !i.disabled) {
                    item.selected = false;
                }
            }
            return Ok(());
        }
        if !multiple && values.len() > 1 {
            return Err(BrowserError::ItemCount(
                "single selection list, must set sequence of length 0 or 1".to_string(),
            ));
        }

        let mut turn_off: Vec<usize> = self
            .items()
            .iter()
            .enumerate()
            .filter(|(_, i)| i.selected && !i.disabled)
            .map(|(idx, _)| idx)
            .collect();
        let mut turn_on = Vec::new();

        let mut counts: Vec<(&str, usize)> = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for v in values {
            match seen.get(v.as_str()) {
                Some(&pos) => counts[pos].1 += 1,
                None => {
                    seen.insert(v.as_str(), counts.len());
                    counts.push((v.as_str(), 1));
                }
            }
        }

        for (value, count) in counts {
            let (mut on, mut off) = self.candidate_items(value, count)?;
            on.reverse();
            off.reverse();
            for _ in 0..count {
                if let Some(idx) = on.pop() {
                    turn_off.retain(|&i| i != idx);
                } else if let Some(idx) = off.pop() {
                    turn_on.push(idx);
                }
            }
        }

        if let ControlBody::List { items, .. } = &mut self.body {
            for idx in turn_off {
                items[idx].selected = false;
            }
            for idx in turn_on {
                items[idx].selected = true;
            }
        }
        Ok(())
    }

    /// Switches one item on or off. Selecting an item of a single-choice
    /// control unselects the others.
    pub fn set_item_selected(&mut self, index: usize, selected: bool) -> Result<()> {
        self.check_writable()?;
        let name = self.display_name();
        let multiple = self.multiple();
        let items = match &mut self.body {
            ControlBody::List { items, .. } => items,
            _ => {
                return Err(BrowserError::Type(format!(
                    "control '{}' has no items",
                    name
                )))
            }
        };
        let item = items
            .get(index)
            .ok_or_else(|| BrowserError::ItemNotFound(format!("item #{}", index)))?;
        if item.disabled {
            return Err(BrowserError::ItemDisabled(item.value.clone()));
        }
        if item.selected == selected {
            return Ok(());
        }
        if selected && !multiple {
            for other in items.iter_mut().filter(|i| i.selected && !i.disabled) {
                other.selected = false;
            }
        }
        items[index].selected = selected;
        Ok(())
    }

    pub fn set_item_disabled(&mut self, index: usize, disabled: bool) -> Result<()> {
        match &mut self.body {
            ControlBody::List { items, .. } => {
                let item = items
                    .get_mut(index)
                    .ok_or_else(|| BrowserError::ItemNotFound(format!("item #{}", index)))?;
                item.disabled = disabled;
                Ok(())
            }
            _ => Err(BrowserError::Type("control has no items".to_string())),
        }
    }

    pub fn set_all_items_disabled(&mut self, disabled: bool) {
        if let ControlBody::List { items, .. } = &mut self.body {
            for item in items {
                item.disabled = disabled;
            }
        }
    }

    /// Selects items by (substring) label. Several items sharing a label
    /// are only ambiguous when their values differ.
    pub fn set_value_by_label(&mut self, labels: &[String]) -> Result<()> {
        self.check_writable()?;
        if !self.multiple() && labels.len() > 1 {
            return Err(BrowserError::ItemCount(
                "single selection list, must set sequence of length 0 or 1".to_string(),
            ));
        }
        let mut chosen: Vec<usize> = Vec::new();
        for label in labels {
            let found = self.items_from_label(label);
            let items = self.items();
            if let Some(&first) = found.first() {
                let value = &items[first].value;
                if found.iter().any(|&i| &items[i].value != value) {
                    return Err(BrowserError::Ambiguity(format!("label {:?}", label)));
                }
            }
            match found.into_iter().find(|i| !chosen.contains(i)) {
                Some(idx) => {
                    if items[idx].disabled {
                        return Err(BrowserError::ItemDisabled(items[idx].value.clone()));
                    }
                    chosen.push(idx);
                }
                None => return Err(BrowserError::ItemNotFound(label.clone())),
            }
        }
        if let ControlBody::List { items, .. } = &mut self.body {
            for item in items.iter_mut().filter(|i| !i.disabled) {
                item.selected = false;
            }
            for idx in chosen {
                items[idx].selected = true;
            }
        }
        Ok(())
    }

    /// Label of each selected item (first non-empty label, empty when none).
    pub fn get_value_by_label(&self) -> Vec<String> {
        self.items()
            .iter()
            .filter(|i| i.selected && !i.disabled)
            .map(|i| i.label().unwrap_or_default().to_string())
            .collect()
    }

    fn class_name(&self) -> &'static str {
        match self.type_name.as_str() {
            "password" => "PasswordControl",
            "hidden" => "HiddenControl",
            "textarea" => "TextareaControl",
            "file" => "FileControl",
            "submit" | "submitbutton" => "SubmitControl",
            "image" => "ImageControl",
            "reset" | "resetbutton" | "button" | "buttonbutton" => "IgnoreControl",
            "select" => "SelectControl",
            "radio" => "RadioControl",
            "checkbox" => "CheckboxControl",
            "isindex" => "IsindexControl",
            _ => "TextControl",
        }
    }
}

impl fmt::Display for FormControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match &self.body {
            ControlBody::List { items, .. } => format!(
                "[{}]",
                items
                    .iter()
                    .map(Item::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ControlBody::File { uploads } if uploads.is_empty() => "<No files added>".to_string(),
            ControlBody::File { uploads } => uploads
                .iter()
                .map(|u| u.filename.clone().unwrap_or_else(|| "<Unnamed file>".to_string()))
                .collect::<Vec<_>>()
                .join(", "),
            ControlBody::Text { value }
            | ControlBody::Clickable { value, .. }
            | ControlBody::Ignored { value }
            | ControlBody::Isindex { value } => value.clone(),
        };
        let mut infos = Vec::new();
        if self.disabled {
            infos.push("disabled");
        }
        if self.readonly {
            infos.push("readonly");
        }
        let info = if infos.is_empty() {
            String::new()
        } else {
            format!(" ({})", infos.join(", "))
        };
        write!(
            f,
            "<{}({}={}){}>",
            self.class_name(),
            self.display_name(),
            value,
            info
        )
    }
}
