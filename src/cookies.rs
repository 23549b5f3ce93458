//! Cookie storage and the per-URL mapping view the browser exposes.

pub mod jar;
pub mod mapping;

pub use jar::{expiration_string, parse_cookie_date, Cookie, CookieJar};
pub use mapping::{CookieInfo, CookieOptions, Cookies};
