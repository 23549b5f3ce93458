//! The browser state machine: current page, history, header overrides and
//! the handles (links, forms, controls) derived from the current page.

mod handles;
mod navigation;
mod session;

pub use handles::{Control, Form, ItemKey, Link};
pub use navigation::redirect_request;
pub use session::Browser;
