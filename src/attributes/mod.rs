//! File attribute value types.
//!
//! An image's "attributes" are the pair of facts the rest of the pipeline needs
//! before it can do anything with raw bytes: a content type (MIME) and a file
//! extension. Both are modelled as immutable value types that may be *invalid*
//! (unresolved) — resolution happens in [`resolver`], validity is enforced by
//! the applier, not by construction.
//!
//! [`ContentType`] understands the structured form of a MIME string:
//!
//! ```text
//! type "/" [prefix delimiter] subtype ["+" suffix]
//! e.g.   image/jpeg    application/vnd.oasis.opendocument.text+xml
//! ```
//!
//! Parsing and [`std::fmt::Display`] round-trip: for any well-formed input,
//! `ContentType::parse(s).to_string() == s`.

pub mod guesser;
pub mod resolver;

use std::fmt;

/// Registration-tree prefix of a MIME subtype.
///
/// Anything other than these three (per RFC 6838) is treated as part of the
/// subtype itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    /// `x` — unregistered tree
    Unregistered,
    /// `vnd` — vendor tree
    Vendor,
    /// `prs` — personal tree
    Personal,
}

impl Prefix {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "x" => Some(Prefix::Unregistered),
            "vnd" => Some(Prefix::Vendor),
            "prs" => Some(Prefix::Personal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Prefix::Unregistered => "x",
            Prefix::Vendor => "vnd",
            Prefix::Personal => "prs",
        }
    }
}

/// A parsed MIME content type.
///
/// May be invalid (both `type_` and `sub_type` unset) when constructed from an
/// unparseable string — callers that require validity check [`is_valid`].
///
/// [`is_valid`]: ContentType::is_valid
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentType {
    type_: Option<String>,
    sub_type: Option<String>,
    prefix: Option<Prefix>,
    prefix_delimiter: Option<char>,
    suffix: Option<String>,
}

impl ContentType {
    /// Parse a MIME string. Malformed input (no slash, empty halves) yields an
    /// invalid instance rather than an error.
    pub fn parse(input: &str) -> Self {
        let Some((type_, rest)) = input.split_once('/') else {
            return Self::default();
        };
        if type_.is_empty() || rest.is_empty() {
            return Self::default();
        }

        let (rest, suffix) = match rest.rsplit_once('+') {
            Some((head, tail)) if !head.is_empty() && !tail.is_empty() => {
                (head, Some(tail.to_string()))
            }
            _ => (rest, None),
        };

        let (prefix, prefix_delimiter, sub_type) = match rest
            .split_once(['.', '-'])
            .and_then(|(token, tail)| Prefix::from_token(token).map(|p| (p, token.len(), tail)))
        {
            Some((prefix, token_len, tail)) if !tail.is_empty() => {
                let delim = rest.as_bytes()[token_len] as char;
                (Some(prefix), Some(delim), tail.to_string())
            }
            _ => (None, None, rest.to_string()),
        };

        Self {
            type_: Some(type_.to_string()),
            sub_type: Some(sub_type),
            prefix,
            prefix_delimiter,
            suffix,
        }
    }

    /// Parse an optional string; `None` yields an invalid instance.
    pub fn parse_opt(input: Option<&str>) -> Self {
        input.map(Self::parse).unwrap_or_default()
    }

    pub fn type_(&self) -> Option<&str> {
        self.type_.as_deref()
    }

    pub fn sub_type(&self) -> Option<&str> {
        self.sub_type.as_deref()
    }

    pub fn prefix(&self) -> Option<Prefix> {
        self.prefix
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Primary type comparison, e.g. `is_type("image")` for `image/png`.
    pub fn is_type(&self, type_: &str) -> bool {
        self.type_.as_deref() == Some(type_)
    }

    pub fn is_sub_type(&self, sub_type: &str) -> bool {
        self.sub_type.as_deref() == Some(sub_type)
    }

    /// Standard-tree types carry no registration prefix.
    pub fn is_standard(&self) -> bool {
        self.prefix.is_none()
    }

    pub fn is_valid(&self) -> bool {
        self.type_.is_some() && self.sub_type.is_some()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Some(type_), Some(sub_type)) = (&self.type_, &self.sub_type) else {
            return Ok(());
        };
        write!(f, "{type_}/")?;
        if let Some(prefix) = self.prefix {
            write!(f, "{}", prefix.as_str())?;
            if let Some(delim) = self.prefix_delimiter {
                write!(f, "{delim}")?;
            }
        }
        write!(f, "{sub_type}")?;
        if let Some(suffix) = &self.suffix {
            write!(f, "+{suffix}")?;
        }
        Ok(())
    }
}

/// A file extension, without the leading dot. Invalid when unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extension {
    name: Option<String>,
}

impl Extension {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
        }
    }

    pub fn from_opt(name: Option<String>) -> Self {
        Self { name }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }

    pub fn is_valid(&self) -> bool {
        self.name.is_some()
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or(""))
    }
}

/// The (content type, extension) pair describing a file's format.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes {
    content_type: ContentType,
    extension: Extension,
}

impl Attributes {
    pub fn new(content_type: ContentType, extension: Extension) -> Self {
        Self {
            content_type,
            extension,
        }
    }

    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn extension(&self) -> &Extension {
        &self.extension
    }

    pub fn is_valid(&self) -> bool {
        self.content_type.is_valid() && self.extension.is_valid()
    }
}
