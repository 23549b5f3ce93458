//! The HTML form model: controls, forms and submission encoding.

pub mod control;
pub mod encode;
pub mod form;

pub use control::{ControlBody, ControlKind, FieldValue, FormControl, Item, Upload, Value};
pub use encode::{choose_boundary, multipart_body, quote_plus, urlencode, RequestData};
pub use form::{parse_forms, parse_html_forms, HtmlForm, MULTIPART, URLENCODED};
