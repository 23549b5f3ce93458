use super::control::{FieldValue, Upload};
use super::form::{MULTIPART, URLENCODED};
use crate::errors::{BrowserError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use url::form_urlencoded;
use url::Url;

/// Method, URL, headers and body of a form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestData {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestData {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// `application/x-www-form-urlencoded` serialisation: `+` for spaces,
/// pairs joined with `&`.
pub fn urlencode<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k.as_ref(), v.as_ref());
    }
    serializer.finish()
}

pub fn quote_plus(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);
static BOUNDARY_PREFIX: OnceLock<String> = OnceLock::new();

/// A multipart boundary unique within this process.
pub fn choose_boundary() -> String {
    let prefix = BOUNDARY_PREFIX.get_or_init(|| {
        format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            std::process::id()
        )
    });
    let counter = BOUNDARY_COUNTER.fetch_add(1, Ordering::SeqCst);
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}{}{}", prefix, millis, counter)
}

fn write_part_headers(out: &mut Vec<u8>, headers: &[(&str, String)]) {
    for (name, value) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
}

fn filename_param(upload: &Upload) -> String {
    upload
        .filename
        .as_ref()
        .map(|f| format!("; filename=\"{}\"", f))
        .unwrap_or_default()
}

/// Multipart body for `pairs` delimited by `boundary`. Parts are separated
/// by CRLF; a file control with several uploads nests them under
/// `multipart/mixed`.
pub fn multipart_body(pairs: &[(String, FieldValue)], boundary: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let mut first = true;
    let mut open_part = |out: &mut Vec<u8>| {
        if !first {
            out.extend_from_slice(b"\r\n");
        }
        first = false;
        out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    };
    for (name, value) in pairs {
        match value {
            FieldValue::Text(text) => {
                open_part(&mut out);
                write_part_headers(
                    &mut out,
                    &[(
                        "Content-Disposition",
                        format!("form-data; name=\"{}\"", name),
                    )],
                );
                out.extend_from_slice(text.as_bytes());
            }
            FieldValue::Files(uploads) if uploads.is_empty() => {}
            FieldValue::Files(uploads) if uploads.len() == 1 => {
                let upload = &uploads[0];
                open_part(&mut out);
                write_part_headers(
                    &mut out,
                    &[
                        (
                            "Content-Disposition",
                            format!("form-data; name=\"{}\"{}", name, filename_param(upload)),
                        ),
                        ("Content-Type", upload.content_type.clone()),
                    ],
                );
                out.extend_from_slice(&upload.data);
            }
            FieldValue::Files(uploads) => {
                let inner = choose_boundary();
                open_part(&mut out);
                write_part_headers(
                    &mut out,
                    &[
                        ("Content-Disposition", format!("form-data; name=\"{}\"", name)),
                        ("Content-Type", format!("multipart/mixed; boundary={}", inner)),
                    ],
                );
                for (i, upload) in uploads.iter().enumerate() {
                    if i > 0 {
                        out.extend_from_slice(b"\r\n");
                    }
                    out.extend_from_slice(format!("--{}\r\n", inner).as_bytes());
                    write_part_headers(
                        &mut out,
                        &[
                            ("Content-Disposition", format!("file{}", filename_param(upload))),
                            ("Content-Type", upload.content_type.clone()),
                        ],
                    );
                    out.extend_from_slice(&upload.data);
                }
                out.extend_from_slice(format!("\r\n--{}--\r\n", inner).as_bytes());
            }
        }
    }
    if first {
        out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    } else {
        out.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    }
    out
}

/// Encodes a form submission.
///
/// GET replaces the action's query with the encoded pairs; POST and PUT
/// keep it and send the pairs as the body. Fragments are always dropped.
pub fn encode_submission(
    action: &Url,
    method: &str,
    enctype: &str,
    pairs: Vec<(String, FieldValue)>,
) -> Result<RequestData> {
    let mut url = action.clone();
    url.set_fragment(None);
    match method {
        "GET" => {
            if enctype != URLENCODED {
                return Err(BrowserError::Encoding(format!(
                    "unknown GET form encoding type '{}'",
                    enctype
                )));
            }
            let query = urlencode(&text_pairs(pairs));
            url.set_query(if query.is_empty() { None } else { Some(&query) });
            Ok(RequestData {
                method: method.to_string(),
                url,
                headers: Vec::new(),
                body: Vec::new(),
            })
        }
        "POST" | "PUT" => match enctype {
            URLENCODED => Ok(RequestData {
                method: method.to_string(),
                url,
                headers: vec![("Content-Type".to_string(), URLENCODED.to_string())],
                body: urlencode(&text_pairs(pairs)).into_bytes(),
            }),
            MULTIPART => {
                let boundary = choose_boundary();
                Ok(RequestData {
                    method: method.to_string(),
                    url,
                    headers: vec![(
                        "Content-Type".to_string(),
                        format!("{}; boundary={}", MULTIPART, boundary),
                    )],
                    body: multipart_body(&pairs, &boundary),
                })
            }
            other => Err(BrowserError::Encoding(format!(
                "unknown POST form encoding type '{}'",
                other
            ))),
        },
        other => Err(BrowserError::Encoding(format!(
            "unknown method '{}'",
            other
        ))),
    }
}

/// Submission of an isindex control: the quote-plus encoded value replaces
/// the action's query, with no `name=` part.
pub fn isindex_request(action: &Url, value: &str) -> Result<RequestData> {
    let mut url = action.clone();
    url.set_fragment(None);
    let quoted = quote_plus(value);
    url.set_query(Some(&quoted));
    Ok(RequestData {
        method: "GET".to_string(),
        url,
        headers: Vec::new(),
        body: Vec::new(),
    })
}

fn text_pairs(pairs: Vec<(String, FieldValue)>) -> Vec<(String, String)> {
    pairs
        .into_iter()
        .map(|(name, value)| match value {
            FieldValue::Text(text) => (name, text),
            FieldValue::Files(_) => (name, String::new()),
        })
        .collect()
}
