use super::session::{locate_on_page, Shared};
use crate::dom::LinkInfo;
use crate::errors::{BrowserError, Result};
use crate::forms::{FormControl, HtmlForm, Value};
use crate::locate::{locate_control_where, ControlLookup, ControlMatch};
use crate::types::Request;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use url::Url;

const DEFAULT_COORD: (i32, i32) = (1, 1);

/// A link of the page it was found on.
#[derive(Clone)]
pub struct Link {
    shared: Rc<Shared>,
    counter: u64,
    info: LinkInfo,
}

impl Link {
    pub(crate) fn new(shared: Rc<Shared>, counter: u64, info: LinkInfo) -> Self {
        Self {
            shared,
            counter,
            info,
        }
    }

    /// Absolute URL the link points to.
    pub fn url(&self) -> &str {
        &self.info.url
    }

    pub fn text(&self) -> &str {
        &self.info.text
    }

    pub fn tag(&self) -> &str {
        &self.info.tag
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.info.attrs
    }

    pub async fn click(&self) -> Result<()> {
        self.shared.check(self.counter)?;
        let url = Url::parse(&self.info.url)?;
        self.shared.navigate(Request::new("GET", url), true).await
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Link text={:?} url={:?}>", self.info.text, self.info.url)
    }
}

/// A form of the current page.
#[derive(Clone)]
pub struct Form {
    shared: Rc<Shared>,
    counter: u64,
    index: usize,
}

impl Form {
    pub(crate) fn new(shared: Rc<Shared>, counter: u64, index: usize) -> Self {
        Self {
            shared,
            counter,
            index,
        }
    }

    fn read<R>(&self, f: impl FnOnce(&HtmlForm) -> R) -> Result<R> {
        self.shared.check(self.counter)?;
        let state = self.shared.state.borrow();
        let form = state
            .current()?
            .forms
            .get(self.index)
            .ok_or(BrowserError::Expired)?;
        Ok(f(form))
    }

    pub fn action(&self) -> Result<String> {
        self.read(|form| form.action().to_string())
    }

    pub fn method(&self) -> Result<String> {
        self.read(|form| form.method().to_string())
    }

    pub fn enctype(&self) -> Result<String> {
        self.read(|form| form.enctype().to_string())
    }

    pub fn name(&self) -> Result<Option<String>> {
        self.read(|form| form.name().map(str::to_string))
    }

    pub fn id(&self) -> Result<Option<String>> {
        self.read(|form| form.id().map(str::to_string))
    }

    /// Finds a control (or list item) inside this form.
    pub fn get_control(&self, lookup: impl Into<ControlLookup>) -> Result<Control> {
        self.shared.check(self.counter)?;
        Control::locate(&self.shared, Some(self.index), &lookup.into())
    }

    /// Submits the form. With a control lookup the matching submit button
    /// is clicked at `coord` (default `(1, 1)`); without one the form is
    /// submitted as a script would, with no button contributing.
    pub async fn submit(
        &self,
        control: Option<ControlLookup>,
        coord: Option<(i32, i32)>,
    ) -> Result<()> {
        self.shared.check(self.counter)?;
        let clicked = match control {
            Some(lookup) => {
                let found = {
                    let state = self.shared.state.borrow();
                    let page = state.current()?;
                    locate_control_where(&page.forms, Some(self.index), &lookup, |c| {
                        matches!(c.type_name(), "submit" | "submitbutton" | "image")
                    })?
                };
                Some((found.control(), coord.unwrap_or(DEFAULT_COORD)))
            }
            None if coord.is_some() => {
                return Err(BrowserError::InvalidArgument(
                    "may not use index or coord without a control".to_string(),
                ))
            }
            None => None,
        };
        self.shared.submit(self.index, clicked).await
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.read(|form| form.to_string()) {
            Ok(form) => f.write_str(&form),
            Err(_) => f.write_str("<Form (expired)>"),
        }
    }
}

/// Selects a list item by its label or by its value.
#[derive(Debug, Clone, Copy)]
pub enum ItemKey<'a> {
    Label(&'a str),
    Value(&'a str),
}

/// A control of the current page, or one item of a list control.
///
/// Every operation fails with [`BrowserError::Expired`] once the browser
/// has navigated away from the page the handle was taken from.
#[derive(Clone)]
pub struct Control {
    shared: Rc<Shared>,
    counter: u64,
    form: usize,
    control: usize,
    item: Option<usize>,
}

impl Control {
    pub(crate) fn locate(
        shared: &Rc<Shared>,
        only_form: Option<usize>,
        lookup: &ControlLookup,
    ) -> Result<Control> {
        let (counter, found) = locate_on_page(shared, only_form, lookup)?;
        let handle = Control {
            shared: shared.clone(),
            counter,
            form: found.form(),
            control: found.control(),
            item: found.item(),
        };
        // hidden fields stay writable for tests
        handle.write(|c| {
            if c.type_name() == "hidden" {
                c.set_readonly(false);
            }
            Ok(())
        })?;
        Ok(handle)
    }

    fn sibling(&self, item: Option<usize>) -> Control {
        Control {
            item,
            ..self.clone()
        }
    }

    fn read<R>(&self, f: impl FnOnce(&FormControl) -> R) -> Result<R> {
        self.shared.check(self.counter)?;
        let state = self.shared.state.borrow();
        let control = state
            .current()?
            .forms
            .get(self.form)
            .and_then(|form| form.control(self.control))
            .ok_or(BrowserError::Expired)?;
        Ok(f(control))
    }

    fn write<R>(&self, f: impl FnOnce(&mut FormControl) -> Result<R>) -> Result<R> {
        self.shared.check(self.counter)?;
        let mut state = self.shared.state.borrow_mut();
        let control = state
            .current_mut()?
            .forms
            .get_mut(self.form)
            .and_then(|form| form.control_mut(self.control))
            .ok_or(BrowserError::Expired)?;
        f(control)
    }

    fn item_index(&self) -> Result<usize> {
        self.item
            .ok_or_else(|| BrowserError::Type("not an item of a list control".to_string()))
    }

    /// True for the handle of a single list item.
    pub fn is_item(&self) -> bool {
        self.item.is_some()
    }

    pub fn name(&self) -> Result<Option<String>> {
        self.read(|c| c.name().map(str::to_string))
    }

    pub fn type_name(&self) -> Result<String> {
        self.read(|c| c.type_name().to_string())
    }

    pub fn id(&self) -> Result<Option<String>> {
        let item = self.item;
        self.read(|c| match item {
            Some(i) => c.items()[i].id.clone(),
            None => c.id().map(str::to_string),
        })
    }

    pub fn multiple(&self) -> Result<bool> {
        self.read(|c| c.multiple())
    }

    pub fn disabled(&self) -> Result<bool> {
        let item = self.item;
        self.read(|c| match item {
            Some(i) => c.items()[i].disabled,
            None if c.is_single_checkbox() => c.items()[0].disabled,
            None => c.disabled(),
        })
    }

    pub fn readonly(&self) -> Result<bool> {
        self.read(|c| c.readonly())
    }

    pub fn labels(&self) -> Result<Vec<String>> {
        let item = self.item;
        self.read(|c| match item {
            Some(i) => c.items()[i].labels.clone(),
            None => c.labels().to_vec(),
        })
    }

    /// Current value. A single `on` checkbox and item handles read as a
    /// boolean.
    pub fn value(&self) -> Result<Value> {
        let item = self.item;
        self.read(|c| match item {
            Some(i) => Value::Bool(c.items()[i].selected),
            None if c.is_single_checkbox() => Value::Bool(c.items()[0].selected),
            None => c.value(),
        })
    }

    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let item = self.item;
        self.write(|c| match (item, value) {
            (Some(i), Value::Bool(on)) => c.set_item_selected(i, on),
            (Some(_), other) => Err(BrowserError::Type(format!(
                "items take a boolean, got {:?}",
                other
            ))),
            (None, Value::Bool(on)) if c.is_single_checkbox() => c.set_item_selected(0, on),
            (None, value) => c.set_value(value),
        })
    }

    pub fn add_file(
        &self,
        data: impl Into<Vec<u8>>,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<()> {
        let data = data.into();
        self.write(|c| {
            if c.type_name() != "file" {
                return Err(BrowserError::Type(format!(
                    "can't call add_file on {} controls",
                    c.type_name()
                )));
            }
            c.add_file(data, content_type, filename)
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.write(|c| c.clear())
    }

    pub fn set_readonly(&self, readonly: bool) -> Result<()> {
        self.write(|c| {
            c.set_readonly(readonly);
            Ok(())
        })
    }

    /// Clicks the control: submit buttons (and isindex) submit their form,
    /// list items toggle their selection.
    pub async fn click(&self) -> Result<()> {
        self.click_at(DEFAULT_COORD).await
    }

    /// Clicks at `coord`; only image buttons report the coordinates.
    pub async fn click_at(&self, coord: (i32, i32)) -> Result<()> {
        if let Some(i) = self.item {
            return self.write(|c| {
                let selected = c.items()[i].selected;
                c.set_item_selected(i, !selected)
            });
        }
        let submits = self.read(|c| c.is_of_kind("clickable") || c.type_name() == "isindex")?;
        if !submits {
            let type_name = self.type_name()?;
            return Err(BrowserError::Type(format!(
                "{} controls can't be clicked",
                type_name
            )));
        }
        self.shared
            .submit(self.form, Some((self.control, coord)))
            .await
    }

    fn list_read<R>(&self, f: impl FnOnce(&FormControl) -> R) -> Result<R> {
        self.read(|c| {
            if c.items().is_empty() && !c.is_of_kind("list") {
                Err(BrowserError::Type(format!(
                    "{} controls have no options",
                    c.type_name()
                )))
            } else {
                Ok(f(c))
            }
        })?
    }

    /// Values of the enabled items.
    pub fn options(&self) -> Result<Vec<String>> {
        self.list_read(|c| {
            c.items()
                .iter()
                .filter(|i| !i.disabled)
                .map(|i| i.value.clone())
                .collect()
        })
    }

    /// First label of each enabled item.
    pub fn display_options(&self) -> Result<Vec<Option<String>>> {
        self.list_read(|c| {
            c.items()
                .iter()
                .filter(|i| !i.disabled)
                .map(|i| i.label().map(str::to_string))
                .collect()
        })
    }

    /// Labels of the selected items.
    pub fn display_value(&self) -> Result<Vec<String>> {
        self.list_read(|c| c.get_value_by_label())
    }

    /// Selects items by label.
    pub fn set_display_value(&self, labels: &[&str]) -> Result<()> {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        self.write(|c| c.set_value_by_label(&labels))
    }

    /// Handles for every item of a list control.
    pub fn controls(&self) -> Result<Vec<Control>> {
        let count = self.list_read(|c| c.items().len())?;
        Ok((0..count).map(|i| self.sibling(Some(i))).collect())
    }

    pub fn get_item(&self, key: ItemKey<'_>, index: Option<usize>) -> Result<Control> {
        let found = self.list_read(|c| match key {
            ItemKey::Label(label) => c.get_item(label, true, index),
            ItemKey::Value(value) => c.get_item(value, false, index),
        })??;
        Ok(self.sibling(Some(found)))
    }

    pub fn selected(&self) -> Result<bool> {
        let i = self.item_index()?;
        self.read(|c| c.items()[i].selected)
    }

    pub fn set_selected(&self, selected: bool) -> Result<()> {
        let i = self.item_index()?;
        self.write(|c| c.set_item_selected(i, selected))
    }

    /// The item's `value` attribute as written in the markup.
    pub fn option_value(&self) -> Result<Option<String>> {
        let i = self.item_index()?;
        self.read(|c| c.items()[i].attrs.get("value").cloned())
    }

    /// The list control an item belongs to.
    pub fn control(&self) -> Result<Control> {
        self.item_index()?;
        self.shared.check(self.counter)?;
        Ok(self.sibling(None))
    }

    /// Where this handle points, for tests and diagnostics.
    pub fn position(&self) -> ControlMatch {
        match self.item {
            Some(item) => ControlMatch::Item {
                form: self.form,
                control: self.control,
                item,
            },
            None => ControlMatch::Control {
                form: self.form,
                control: self.control,
            },
        }
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let item = self.item;
        let shown = self.read(|c| match item {
            Some(i) => {
                let it = &c.items()[i];
                format!(
                    "<ItemControl name={:?} type={:?} optionValue={:?} selected={}>",
                    c.name().unwrap_or_default(),
                    c.type_name(),
                    it.value,
                    it.selected
                )
            }
            None => format!(
                "<Control name={:?} type={:?}>",
                c.name().unwrap_or_default(),
                c.type_name()
            ),
        });
        f.write_str(&shown.unwrap_or_else(|_| "<Control (expired)>".to_string()))
    }
}
