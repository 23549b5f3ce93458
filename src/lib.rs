pub mod browser;
pub mod cookies;
pub mod dom;
pub mod errors;
pub mod forms;
pub mod locate;
pub mod testing;
pub mod transport;
pub mod types;

pub use browser::{Browser, Control, Form, ItemKey, Link};
pub use cookies::{CookieOptions, Cookies};
pub use errors::{BrowserError, Result};
pub use forms::Value;
pub use locate::{ControlLookup, FormLookup, LinkQuery, Pattern};
pub use transport::{AppResponse, Application, Environ, Transport};
pub use types::*;
