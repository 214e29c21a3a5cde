//! Token extraction
//!
//! Not a CSS or JSX parser: the extractor only recognizes the small
//! vocabulary the policy constrains (Tailwind utility classes, a handful of
//! CSS declarations, `var(--role)` references, imports and opening tags).
//! Comments are masked out before any pattern runs. Spans it cannot make
//! sense of are recorded on the token set and skipped.

use crate::source::SourceUnit;
use crate::token::{spacing_px, TokenKind, TokenSet, LOCAL_NAMESPACE, SPREAD_ATTRIBUTE};
use gridline_policy::{ColorRole, DesignSystemConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Class-like words: anything between quotes, whitespace and punctuation.
/// Bracketed segments (`data-[state=open]:`, `has-[>svg]:`) stay whole.
static CLASS_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:[^\s"'`{}(),;<>=\[\]]|\[[^\]\s"'`]*\])+"#).unwrap()
});

static SIZE_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^text-(?:xs|sm|base|lg|xl|[2-9]xl|\[\d+(?:\.\d+)?(?:px|rem|em)\])$").unwrap()
});

static WEIGHT_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^font-(?:thin|extralight|light|normal|medium|semibold|bold|extrabold|black|\[\d{3}\])$",
    )
    .unwrap()
});

static SPACING_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^-?(?:space-x|space-y|gap-x|gap-y|gap|p[xytrblse]?|m[xytrblse]?)-(?:\d+(?:\.\d+)?|px|\[-?\d+(?:\.\d+)?(?:px|rem)?\])$",
    )
    .unwrap()
});

static COLOR_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:bg|text|border|ring|fill|stroke|outline|divide|from|via|to|decoration|accent|caret|placeholder|shadow)-([a-z][a-z0-9-]*?)(?:/\d{1,3})?$",
    )
    .unwrap()
});

static CSS_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)(?:^|[\s;{])(font-size|fontSize|font-weight|fontWeight|padding(?:-top|-right|-bottom|-left|-inline|-block|Top|Right|Bottom|Left)?|margin(?:-top|-right|-bottom|-left|-inline|-block|Top|Right|Bottom|Left)?|row-gap|rowGap|column-gap|columnGap|gap)\s*:\s*([^;{},\n]+)",
    )
    .unwrap()
});

static VAR_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var\(\s*--([A-Za-z][A-Za-z0-9-]*)").unwrap());

static IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s+(?:type\s+)?([^'";]+?)\s+from\s+["']([^"']+)["']"#).unwrap()
});

static LOCAL_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:function|class|const|let|var)\s+([A-Z][A-Za-z0-9_]*)").unwrap()
});

static TAG_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([A-Za-z][A-Za-z0-9_-]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)").unwrap()
});

/// Extracts design tokens from source units
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    color_roles: BTreeMap<String, ColorRole>,
    interactive: HashSet<String>,
}

impl TokenExtractor {
    pub fn new(config: &DesignSystemConfig) -> Self {
        Self {
            color_roles: config.color_roles.clone(),
            interactive: config.interactive_elements.iter().cloned().collect(),
        }
    }

    /// Extract every token of one unit. Never fails; malformed spans are
    /// recorded on the returned set.
    pub fn extract(&self, unit: &SourceUnit) -> TokenSet {
        let mut set = TokenSet::new(unit.path.clone());
        let (text, unterminated_comments) = mask_comments(&unit.content);
        let lines = LineIndex::new(&text);

        for offset in unterminated_comments {
            set.skip(lines.line_of(offset), "unterminated comment");
        }

        self.extract_classes(&text, &lines, &mut set);
        self.extract_declarations(&text, &lines, &mut set);
        self.extract_var_refs(&text, &lines, &mut set);
        self.extract_tags(&text, &lines, &mut set);

        if !set.skipped.is_empty() {
            tracing::warn!(
                path = %unit.path,
                skipped = set.skipped.len(),
                "skipped unparseable spans"
            );
        }
        tracing::debug!(path = %unit.path, tokens = set.tokens.len(), "extracted tokens");
        set
    }

    fn extract_classes(&self, text: &str, lines: &LineIndex, set: &mut TokenSet) {
        for word in CLASS_WORD.find_iter(text) {
            let utility = utility_of(word.as_str());
            if utility.is_empty() {
                continue;
            }
            let line = lines.line_of(word.start());

            if SIZE_CLASS.is_match(utility) {
                set.push(TokenKind::Size, utility, line);
            } else if WEIGHT_CLASS.is_match(utility) {
                set.push(TokenKind::Weight, utility, line);
            } else if SPACING_CLASS.is_match(utility) {
                set.push(TokenKind::Spacing, utility, line);
            } else if let Some(caps) = COLOR_CLASS.captures(utility) {
                if let Some(role) = self.role_of(&caps[1]) {
                    set.push(TokenKind::Color { role }, utility, line);
                }
            }
        }
    }

    fn extract_declarations(&self, text: &str, lines: &LineIndex, set: &mut TokenSet) {
        for caps in CSS_DECL.captures_iter(text) {
            let (Some(property), Some(raw)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let value = clean_css_value(raw.as_str());
            if value.is_empty() {
                continue;
            }
            let line = lines.line_of(property.start());

            match property.as_str() {
                "font-size" | "fontSize" => {
                    set.push(TokenKind::Size, value, line);
                }
                "font-weight" | "fontWeight" => {
                    set.push(TokenKind::Weight, value, line);
                }
                _ => {
                    if value.contains('(') {
                        continue;
                    }
                    for part in value.split_whitespace() {
                        if spacing_px(part).is_some() {
                            set.push(TokenKind::Spacing, part, line);
                        }
                    }
                }
            }
        }
    }

    fn extract_var_refs(&self, text: &str, lines: &LineIndex, set: &mut TokenSet) {
        for caps in VAR_REF.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if let Some(role) = self.role_of(name.as_str()) {
                set.push(
                    TokenKind::Color { role },
                    format!("var(--{})", name.as_str()),
                    lines.line_of(whole.start()),
                );
            }
        }
    }

    fn extract_tags(&self, text: &str, lines: &LineIndex, set: &mut TokenSet) {
        let bytes = text.as_bytes();
        let imports = collect_imports(text);
        let locals: BTreeSet<&str> = LOCAL_DEFINITION
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        for caps in TAG_OPEN.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let start = whole.start();
            if start > 0 && is_ident_byte(bytes[start - 1]) {
                continue;
            }
            if let Some(&next) = bytes.get(name.end()) {
                if !(next.is_ascii_whitespace() || next == b'/' || next == b'>') {
                    continue;
                }
            }

            // `<T extends Item>(x: T) =>` is a type parameter list
            let after = text[name.end()..].trim_start();
            if after
                .strip_prefix("extends")
                .is_some_and(|rest| rest.starts_with(char::is_whitespace))
            {
                continue;
            }

            let tag = name.as_str();
            let line = lines.line_of(start);

            if tag.starts_with(|c: char| c.is_ascii_uppercase()) {
                let root = tag.split('.').next().unwrap_or(tag);
                let namespace = imports.get(root).cloned().or_else(|| {
                    locals
                        .contains(root)
                        .then(|| LOCAL_NAMESPACE.to_string())
                });
                set.push(TokenKind::Component { namespace }, tag, line);
            }

            if self.interactive.contains(tag) {
                match scan_attributes(bytes, name.end()) {
                    Ok(attributes) => {
                        let element = set.push(TokenKind::Interactive, tag, line);
                        for (offset, attribute) in attributes {
                            set.push(TokenKind::Attribute { element }, attribute, lines.line_of(offset));
                        }
                    }
                    Err(problem) => {
                        set.skip(line, format!("{} in <{}> tag", problem, tag));
                    }
                }
            }
        }
    }

    fn role_of(&self, name: &str) -> Option<ColorRole> {
        self.color_roles.get(name).copied().or_else(|| {
            name.strip_suffix("-foreground")
                .and_then(|base| self.color_roles.get(base).copied())
        })
    }
}

/// Byte offset to 1-based line number
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset)
    }
}

/// Blank out comments, keeping byte offsets and newlines intact.
/// Returns the masked text and the start offsets of unterminated comments.
fn mask_comments(source: &str) -> (String, Vec<usize>) {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut unterminated = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        // Comment markers inside string literals are text. `"` and `'` strings
        // end at a newline so a stray apostrophe in markup cannot run on.
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q || (b == b'\n' && q != b'`') {
                quote = None;
            }
            i += 1;
            continue;
        }
        if matches!(b, b'"' | b'\'' | b'`') {
            quote = Some(b);
            i += 1;
            continue;
        }

        let rest = &bytes[i..];
        let end = if rest.starts_with(b"/*") {
            find_from(bytes, i + 2, b"*/").map(|e| e + 2)
        } else if rest.starts_with(b"<!--") {
            find_from(bytes, i + 4, b"-->").map(|e| e + 3)
        } else if rest.starts_with(b"//") && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            Some(find_from(bytes, i, b"\n").unwrap_or(bytes.len()))
        } else {
            i += 1;
            continue;
        };

        let end = end.unwrap_or_else(|| {
            unterminated.push(i);
            bytes.len()
        });
        for b in &mut out[i..end] {
            if *b != b'\n' {
                *b = b' ';
            }
        }
        i = end;
    }

    // Comment bounds are ASCII, so whole characters were replaced
    let masked = String::from_utf8(out)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
    (masked, unterminated)
}

fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Strip variant prefixes (`md:hover:`) and the important marker from a class
fn utility_of(word: &str) -> &str {
    let mut depth = 0i32;
    let mut cut = 0;
    for (i, c) in word.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = (depth - 1).max(0),
            ':' if depth == 0 => cut = i + 1,
            _ => {}
        }
    }
    word[cut..].trim_start_matches('!')
}

fn clean_css_value(raw: &str) -> String {
    let value = raw.trim();
    let value = value.strip_suffix("!important").unwrap_or(value).trim();
    value.trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'.'
}

/// Local binding name to import source
fn collect_imports(text: &str) -> BTreeMap<String, String> {
    let mut imports = BTreeMap::new();
    for caps in IMPORT.captures_iter(text) {
        let source = caps[2].to_string();
        let clause = caps[1].trim();

        let (head, braced) = match (clause.find('{'), clause.rfind('}')) {
            (Some(open), Some(close)) if open < close => (&clause[..open], &clause[open + 1..close]),
            _ => (clause, ""),
        };

        for part in head.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let local = match part.strip_prefix('*') {
                Some(rest) => rest.trim().strip_prefix("as").map(str::trim).unwrap_or(""),
                None => part,
            };
            if !local.is_empty() {
                imports.insert(local.to_string(), source.clone());
            }
        }

        for part in braced.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let part = part.strip_prefix("type ").unwrap_or(part).trim();
            let local = match part.split_once(" as ") {
                Some((_, alias)) => alias.trim(),
                None => part,
            };
            if !local.is_empty() {
                imports.insert(local.to_string(), source.clone());
            }
        }
    }
    imports
}

/// Walk an opening tag from just after its name to the closing `>`.
/// Returns each attribute name with its byte offset.
fn scan_attributes(bytes: &[u8], from: usize) -> Result<Vec<(usize, String)>, &'static str> {
    let mut attributes = Vec::new();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut expect_value = false;
    let mut i = from;

    while i < bytes.len() {
        let b = bytes[i];

        if let Some(q) = quote {
            if b == b'\\' && depth > 0 {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        if depth > 0 {
            match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => depth -= 1,
                _ => {}
            }
            i += 1;
            continue;
        }

        match b {
            b'>' => return Ok(attributes),
            b'<' => return Err("unterminated tag"),
            b'"' | b'\'' => {
                quote = Some(b);
                expect_value = false;
                i += 1;
            }
            b'{' => {
                if !expect_value && bytes[i + 1..].starts_with(b"...") {
                    attributes.push((i, SPREAD_ATTRIBUTE.to_string()));
                }
                expect_value = false;
                depth = 1;
                i += 1;
            }
            b'=' => {
                expect_value = true;
                i += 1;
            }
            b'/' => i += 1,
            _ if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < bytes.len() && !is_attribute_delimiter(bytes[i]) {
                    i += 1;
                }
                if expect_value {
                    expect_value = false;
                } else {
                    let raw = String::from_utf8_lossy(&bytes[start..i]);
                    attributes.push((start, normalize_attribute(&raw)));
                }
            }
        }
    }

    if quote.is_some() {
        Err("unterminated string")
    } else if depth > 0 {
        Err("unterminated expression")
    } else {
        Err("unterminated tag")
    }
}

fn is_attribute_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'' | b'{' | b'<')
}

/// `:aria-label` and `v-bind:aria-label` bind the same attribute as `aria-label`
fn normalize_attribute(raw: &str) -> String {
    let name = raw.strip_prefix("v-bind:").unwrap_or(raw);
    name.strip_prefix(':').unwrap_or(name).to_string()
}
