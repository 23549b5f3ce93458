//! HTML parsing: pages, links and label extraction on top of `scraper`.

pub mod document;
pub mod labels;

pub use document::{Document, LinkInfo};
pub use labels::{element_text, label_text, normalize_whitespace, LabelIndex};
