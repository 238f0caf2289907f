#![forbid(unsafe_code)]

//! A small CSS selector subset for locating entries.
//!
//! Browser hosts hand the selector's source text to `querySelectorAll`, so
//! this module only needs to be faithful for hosts without a native engine
//! ([`HeadlessDocument`](crate::headless::HeadlessDocument)). The grammar is
//! exactly what the entry patterns use:
//!
//! ```text
//! list      := complex ( ',' complex )*
//! complex   := compound ( WS+ compound )*          // descendant combinator only
//! compound  := ( tag | '*' )? ( '.' ident | '#' ident | '[' ident ( '=' value )? ']' )*
//! value     := '"' .. '"' | '\'' .. '\'' | ident
//! ```

use core::fmt;

use crate::dom::Document;

/// Errors from parsing a selector string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The selector (or one of its comma-separated parts) is empty.
    Empty,
    /// An attribute matcher was not closed with `]`.
    UnterminatedAttribute(usize),
    /// A quoted attribute value was not closed.
    UnterminatedString(usize),
    /// A character that the supported grammar does not accept.
    Unexpected { ch: char, at: usize },
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty selector"),
            Self::UnterminatedAttribute(at) => {
                write!(f, "unterminated attribute matcher at offset {at}")
            }
            Self::UnterminatedString(at) => write!(f, "unterminated string at offset {at}"),
            Self::Unexpected { ch, at } => write!(f, "unexpected {ch:?} at offset {at}"),
        }
    }
}

impl std::error::Error for SelectorError {}

/// `[name]` or `[name="value"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    value: Option<String>,
}

/// One compound selector: `tag.class#id[attr=value]`, or `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    universal: bool,
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        !self.universal
            && self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
    }

    fn matches<D: Document + ?Sized>(&self, doc: &D, node: &D::Node) -> bool {
        if let Some(tag) = &self.tag
            && !doc.tag_name(node).eq_ignore_ascii_case(tag)
        {
            return false;
        }
        if let Some(id) = &self.id
            && doc.attribute(node, "id").as_deref() != Some(id.as_str())
        {
            return false;
        }
        if !self.classes.is_empty() {
            let class_attr = doc.attribute(node, "class").unwrap_or_default();
            let have: Vec<&str> = class_attr.split_ascii_whitespace().collect();
            if !self.classes.iter().all(|want| have.contains(&want.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|attr| match doc.attribute(node, &attr.name) {
            None => false,
            Some(actual) => attr.value.as_ref().is_none_or(|want| *want == actual),
        })
    }
}

/// Descendant chain; the last compound is the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    chain: Vec<Compound>,
}

impl Complex {
    fn matches<D: Document + ?Sized>(&self, doc: &D, node: &D::Node) -> bool {
        let Some((subject, ancestors)) = self.chain.split_last() else {
            return false;
        };
        if !subject.matches(doc, node) {
            return false;
        }
        // Descendant-only combinators: greedy nearest-ancestor matching is exact.
        let mut cursor = doc.parent(node);
        for wanted in ancestors.iter().rev() {
            loop {
                let Some(current) = cursor else {
                    return false;
                };
                cursor = doc.parent(&current);
                if wanted.matches(doc, &current) {
                    break;
                }
            }
        }
        true
    }
}

/// A parsed selector list.
///
/// Keeps its source text so browser adapters can delegate to the native
/// engine via [`Selector::as_css`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    /// Parse a selector list.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let mut alternatives = Vec::new();
        let mut parser = Parser {
            chars: source.char_indices().collect(),
            pos: 0,
        };
        loop {
            alternatives.push(parser.complex()?);
            parser.skip_ws();
            match parser.peek() {
                None => break,
                Some((_, ',')) => parser.pos += 1,
                Some((at, ch)) => return Err(SelectorError::Unexpected { ch, at }),
            }
        }
        Ok(Self {
            source: source.trim().to_owned(),
            alternatives,
        })
    }

    /// The selector in CSS syntax, suitable for `querySelectorAll`.
    #[must_use]
    pub fn as_css(&self) -> &str {
        &self.source
    }

    /// Whether `node` itself matches any alternative.
    pub fn matches<D: Document + ?Sized>(&self, doc: &D, node: &D::Node) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(doc, node))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<(usize, char)> {
        self.chars.get(self.pos).copied()
    }

    fn offset(&self) -> usize {
        self.peek()
            .map_or_else(|| self.chars.last().map_or(0, |(i, c)| i + c.len_utf8()), |(i, _)| i)
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn complex(&mut self) -> Result<Complex, SelectorError> {
        self.skip_ws();
        let mut chain = Vec::new();
        loop {
            let compound = self.compound()?;
            if compound.is_empty() {
                break;
            }
            chain.push(compound);
            let had_ws = self.skip_ws();
            match self.peek() {
                None | Some((_, ',')) => break,
                Some(_) if had_ws => continue,
                Some((at, ch)) => return Err(SelectorError::Unexpected { ch, at }),
            }
        }
        if chain.is_empty() {
            return match self.peek() {
                None | Some((_, ',')) => Err(SelectorError::Empty),
                Some((at, ch)) => Err(SelectorError::Unexpected { ch, at }),
            };
        }
        Ok(Complex { chain })
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut out = Compound::default();
        match self.peek() {
            Some((_, '*')) => {
                self.pos += 1;
                out.universal = true;
            }
            Some((_, c)) if is_ident_char(c) => out.tag = Some(self.ident().to_ascii_lowercase()),
            _ => {}
        }
        loop {
            match self.peek() {
                Some((_, '.')) => {
                    self.pos += 1;
                    out.classes.push(self.required_ident()?);
                }
                Some((_, '#')) => {
                    self.pos += 1;
                    out.id = Some(self.required_ident()?);
                }
                Some((at, '[')) => {
                    self.pos += 1;
                    out.attrs.push(self.attribute(at)?);
                }
                _ => break,
            }
        }
        Ok(out)
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some((_, c)) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }

    fn required_ident(&mut self) -> Result<String, SelectorError> {
        let at = self.offset();
        let ident = self.ident();
        if ident.is_empty() {
            return Err(match self.peek() {
                Some((at, ch)) => SelectorError::Unexpected { ch, at },
                None => SelectorError::Unexpected { ch: ' ', at },
            });
        }
        Ok(ident)
    }

    fn attribute(&mut self, open_at: usize) -> Result<AttrMatch, SelectorError> {
        self.skip_ws();
        let name = self.required_ident()?;
        self.skip_ws();
        let value = match self.peek() {
            Some((_, '=')) => {
                self.pos += 1;
                self.skip_ws();
                Some(self.value()?)
            }
            _ => None,
        };
        self.skip_ws();
        match self.peek() {
            Some((_, ']')) => {
                self.pos += 1;
                Ok(AttrMatch {
                    name: name.to_ascii_lowercase(),
                    value,
                })
            }
            Some((at, ch)) => Err(SelectorError::Unexpected { ch, at }),
            None => Err(SelectorError::UnterminatedAttribute(open_at)),
        }
    }

    fn value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some((at, quote @ ('"' | '\''))) => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.peek() {
                        Some((_, c)) if c == quote => {
                            self.pos += 1;
                            return Ok(out);
                        }
                        Some((_, c)) => {
                            out.push(c);
                            self.pos += 1;
                        }
                        None => return Err(SelectorError::UnterminatedString(at)),
                    }
                }
            }
            _ => self.required_ident(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
