//! Extracted design tokens

use gridline_policy::ColorRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Root font size used to convert `rem` spacing to pixels
const ROOT_FONT_PX: f64 = 16.0;

/// Tailwind spacing step in pixels (`p-1` = 4px)
const TAILWIND_STEP_PX: f64 = 4.0;

/// Namespace given to components defined in the same file
pub const LOCAL_NAMESPACE: &str = ".";

/// Attribute value recorded for `{...spread}` props
pub const SPREAD_ATTRIBUTE: &str = "{...}";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenKind {
    Size,
    Weight,
    Spacing,
    Color { role: ColorRole },
    /// `namespace` is the import source, [`LOCAL_NAMESPACE`], or `None` when unresolved
    Component { namespace: Option<String> },
    Interactive,
    /// Attribute of the interactive element at index `element` of the token list
    Attribute { element: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text as written, e.g. `text-sm`, `14px`, `p-[7px]`, `Button`
    pub value: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
        }
    }

    /// Pixel value of a spacing token, if it has a fixed one
    pub fn spacing_px(&self) -> Option<f64> {
        if self.kind != TokenKind::Spacing {
            return None;
        }
        spacing_px(&self.value)
    }
}

/// Pixel value of a raw spacing value.
///
/// Accepts Tailwind classes (`p-2`, `-mx-1.5`, `gap-px`, `p-[7px]`) and CSS
/// lengths (`7px`, `1rem`, `0`, unitless numbers as in JSX style objects).
/// Keywords, `var()` and `calc()` have no fixed value.
pub fn spacing_px(value: &str) -> Option<f64> {
    let value = value.trim().trim_start_matches('-');

    if let Some(open) = value.find("-[") {
        let inner = value[open + 2..].strip_suffix(']')?;
        return css_length_px(inner);
    }

    if let Some((_, step)) = value.rsplit_once('-') {
        if step == "px" {
            return Some(1.0);
        }
        let n: f64 = step.parse().ok()?;
        return Some(n * TAILWIND_STEP_PX);
    }

    css_length_px(value)
}

fn css_length_px(raw: &str) -> Option<f64> {
    let raw = raw.trim().trim_start_matches('-');
    let (number, scale) = if let Some(n) = raw.strip_suffix("px") {
        (n, 1.0)
    } else if let Some(n) = raw.strip_suffix("rem") {
        (n, ROOT_FONT_PX)
    } else {
        (raw, 1.0)
    };
    let n: f64 = number.parse().ok()?;
    n.is_finite().then_some(n * scale)
}

/// A span the extractor could not make sense of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSpan {
    pub line: usize,
    pub reason: String,
}

/// An interactive element with the attribute names found in its opening tag
#[derive(Debug, Clone, PartialEq)]
pub struct InteractiveElement<'a> {
    pub tag: &'a str,
    pub line: usize,
    pub attributes: BTreeSet<String>,
}

/// Every token found in one source unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub path: String,
    pub tokens: Vec<Token>,
    pub skipped: Vec<SkippedSpan>,
}

impl TokenSet {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, kind: TokenKind, value: impl Into<String>, line: usize) -> usize {
        self.tokens.push(Token::new(kind, value, line));
        self.tokens.len() - 1
    }

    pub fn skip(&mut self, line: usize, reason: impl Into<String>) {
        self.skipped.push(SkippedSpan {
            line,
            reason: reason.into(),
        });
    }

    pub fn sizes(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| t.kind == TokenKind::Size)
    }

    pub fn weights(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| t.kind == TokenKind::Weight)
    }

    pub fn spacing(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| t.kind == TokenKind::Spacing)
    }

    pub fn colors(&self) -> impl Iterator<Item = (ColorRole, &Token)> {
        self.tokens.iter().filter_map(|t| match t.kind {
            TokenKind::Color { role } => Some((role, t)),
            _ => None,
        })
    }

    pub fn components(&self) -> impl Iterator<Item = (Option<&str>, &Token)> {
        self.tokens.iter().filter_map(|t| match &t.kind {
            TokenKind::Component { namespace } => Some((namespace.as_deref(), t)),
            _ => None,
        })
    }

    /// Interactive elements in source order, each with its attribute names
    pub fn interactive_elements(&self) -> Vec<InteractiveElement<'_>> {
        let mut elements: Vec<(usize, InteractiveElement<'_>)> = self
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.kind == TokenKind::Interactive)
            .map(|(i, t)| {
                (
                    i,
                    InteractiveElement {
                        tag: t.value.as_str(),
                        line: t.line,
                        attributes: BTreeSet::new(),
                    },
                )
            })
            .collect();

        for token in &self.tokens {
            if let TokenKind::Attribute { element } = token.kind {
                if let Some((_, owner)) = elements.iter_mut().find(|(i, _)| *i == element) {
                    owner.attributes.insert(token.value.clone());
                }
            }
        }

        elements.into_iter().map(|(_, e)| e).collect()
    }
}
