//! Media types and the boundary marker that prefixes object bodies.
//!
//! Object responses of type [`MEDIA_TYPE`] start with a marker line
//! `--<boundary>\n`, where `<boundary>` is the `header` parameter of the
//! `Content-Type`. The marker is counted in `Content-Length`, so readers
//! must consume it and subtract its length to get the object size.

use indexmap::IndexMap;
use std::io::Read;

use crate::Error;

/// Raw object payloads.
pub const MEDIA_TYPE: &str = "application/vnd.git-media";

/// JSON metadata exchanged during negotiation.
pub const META_MEDIA_TYPE: &str = "application/vnd.git-media+json; charset=utf-8";

/// A parsed `Content-Type` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
    params: IndexMap<String, String>,
}

impl MediaType {
    /// Parse `type/subtype; name=value; ...`.
    ///
    /// Type, subtype and parameter names are case-insensitive and stored
    /// lower-cased. Values may be tokens or quoted strings.
    pub fn parse(value: &str) -> Result<Self, Error> {
        let invalid = |why: &str| Error::MediaType(format!("{}: {:?}", why, value));

        let (essence, mut rest) = match value.find(';') {
            Some(i) => (&value[..i], &value[i..]),
            None => (value, ""),
        };
        let essence = essence.trim().to_ascii_lowercase();
        let (kind, subtype) = essence
            .split_once('/')
            .ok_or_else(|| invalid("missing subtype"))?;
        if !is_token(kind) || !is_token(subtype) {
            return Err(invalid("malformed type"));
        }

        let mut params = IndexMap::new();
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            rest = rest
                .strip_prefix(';')
                .ok_or_else(|| invalid("expected ';'"))?
                .trim_start();
            if rest.is_empty() {
                // Trailing semicolon.
                break;
            }

            let eq = rest.find('=').ok_or_else(|| invalid("parameter without value"))?;
            let name = rest[..eq].trim().to_ascii_lowercase();
            if !is_token(&name) {
                return Err(invalid("malformed parameter name"));
            }
            rest = rest[eq + 1..].trim_start();

            let (val, tail) = if let Some(quoted) = rest.strip_prefix('"') {
                parse_quoted(quoted).ok_or_else(|| invalid("unterminated quoted string"))?
            } else {
                let end = rest.find(';').unwrap_or(rest.len());
                let token = rest[..end].trim_end();
                if !is_token(token) {
                    return Err(invalid("malformed parameter value"));
                }
                (token.to_string(), &rest[end..])
            };
            rest = tail;

            if params.insert(name, val).is_some() {
                return Err(invalid("duplicate parameter"));
            }
        }

        Ok(MediaType { essence, params })
    }

    /// `type/subtype`, lower-cased.
    pub fn essence(&self) -> &str {
        &self.essence
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"' | b'/'
                        | b'[' | b']' | b'?' | b'='
                )
        })
}

/// Parse the remainder of a quoted string (opening quote already consumed).
fn parse_quoted(s: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((out, &s[i + 1..])),
            '\\' => out.push(chars.next()?.1),
            c => out.push(c),
        }
    }
    None
}

/// Check the boundary marker at the start of `reader`.
///
/// For [`MEDIA_TYPE`] bodies the marker is read and compared byte for
/// byte, leaving `reader` positioned at the payload; the marker length is
/// returned. Any other media type carries no marker and yields `0`
/// without touching the reader.
pub fn validate_media_header<R: Read + ?Sized>(
    content_type: &str,
    reader: &mut R,
) -> Result<usize, Error> {
    let media_type = MediaType::parse(content_type)?;
    if media_type.essence() != MEDIA_TYPE {
        return Ok(0);
    }

    let boundary = media_type.param("header").ok_or_else(|| {
        Error::MediaType(format!("missing header parameter in {}", content_type))
    })?;
    let expected = format!("--{}\n", boundary);

    let mut actual = vec![0u8; expected.len()];
    reader.read_exact(&mut actual)?;

    if actual != expected.as_bytes() {
        return Err(Error::Framing(format!(
            "invalid header: expected {:?}, got {:?}",
            expected,
            String::from_utf8_lossy(&actual)
        )));
    }
    Ok(expected.len())
}
