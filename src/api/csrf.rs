// src/api/csrf.rs
// Anti-forgery token lookup

use percent_encoding::percent_decode_str;

pub const DEFAULT_CSRF_COOKIE: &str = "csrftoken";

/// Anything that can hand out the anti-forgery token for a mutating request
pub trait CsrfSource: Send + Sync {
    fn csrf_token(&self) -> Option<String>;
}

/// Cookies of the current page session, parsed from a `Cookie` header value
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    pairs: Vec<(String, String)>,
    csrf_cookie: String,
}

impl CookieJar {
    /// Parse `name=value; other=value` pairs. Fragments without `=` are skipped.
    pub fn parse(raw: &str, csrf_cookie: &str) -> Self {
        let pairs = raw
            .split(';')
            .filter_map(|part| {
                let (name, value) = part.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();

        Self {
            pairs,
            csrf_cookie: csrf_cookie.to_string(),
        }
    }

    /// First cookie with exactly this name, percent-decoded
    pub fn get(&self, name: &str) -> Option<String> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| percent_decode_str(value).decode_utf8_lossy().into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Value for the outgoing `Cookie` header, if there is anything to send
    pub fn header_value(&self) -> Option<String> {
        if self.pairs.is_empty() {
            return None;
        }

        let joined = self
            .pairs
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("; ");
        Some(joined)
    }
}

impl CsrfSource for CookieJar {
    fn csrf_token(&self) -> Option<String> {
        self.get(&self.csrf_cookie).filter(|token| !token.is_empty())
    }
}
