//! Template scanning.
//!
//! A replacement template is a run of three kinds of segment:
//!
//! - `$Name` references another production rule,
//! - `{key params}` is a wildcard resolved against an entity dataset,
//! - anything else is literal text.
//!
//! Cursors are byte offsets. Every delimiter the scanner looks for is ASCII,
//! so a cursor always sits on a char boundary.

use std::borrow::Cow;

/// Leading character of a non-terminal reference.
pub const SIGIL: char = '$';

/// Parameter prefix that attaches metadata to a wildcard token.
const META_PREFIX: &str = "meta:";

/// Letters allowed in a wildcard key.
pub fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic()
}

/// Characters allowed in a non-terminal name after the sigil.
pub fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Advance `cursor` past contiguous whitespace.
pub fn skip_spaces(s: &str, cursor: &mut usize) {
    if *cursor >= s.len() {
        *cursor = s.len();
        return;
    }
    let rest = &s[*cursor..];
    let skipped = rest
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    *cursor += skipped;
}

fn take_while(s: &str, cursor: &mut usize, pred: impl Fn(char) -> bool) {
    let rest = &s[*cursor..];
    let len = rest
        .char_indices()
        .find(|(_, c)| !pred(*c))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    *cursor += len;
}

/// Gender filter for `{female}` / `{male}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameFilter {
    Any,
    Female,
    Male,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationFilter {
    Any,
    Room,
    Beacon,
    Placement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFilter {
    Any,
    Known,
    Alike,
}

/// What a wildcard key resolves to.
///
/// Several keys share a dataset; the filter records the refinement the key
/// asks for when drawing a random entity. The converter only cares about
/// [`WildcardKind::canonical_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WildcardKind<'a> {
    Category,
    Gesture,
    Name(NameFilter),
    Location(LocationFilter),
    Object(ObjectFilter),
    Question,
    /// Produces no text.
    Void,
    /// Any key without a dataset of its own.
    Other(&'a str),
}

impl<'a> WildcardKind<'a> {
    /// Classify a wildcard key. Keys are case-sensitive.
    pub fn from_key(key: &'a str) -> Self {
        match key {
            "category" => WildcardKind::Category,
            "gesture" => WildcardKind::Gesture,
            "name" => WildcardKind::Name(NameFilter::Any),
            "female" => WildcardKind::Name(NameFilter::Female),
            "male" => WildcardKind::Name(NameFilter::Male),
            "location" => WildcardKind::Location(LocationFilter::Any),
            "beacon" => WildcardKind::Location(LocationFilter::Beacon),
            "placement" => WildcardKind::Location(LocationFilter::Placement),
            "room" => WildcardKind::Location(LocationFilter::Room),
            "object" => WildcardKind::Object(ObjectFilter::Any),
            "aobject" => WildcardKind::Object(ObjectFilter::Alike),
            "kobject" => WildcardKind::Object(ObjectFilter::Known),
            "question" => WildcardKind::Question,
            "void" => WildcardKind::Void,
            other => WildcardKind::Other(other),
        }
    }

    /// Rule id the wildcard is exported under, `None` for `void`.
    pub fn canonical_id(&self) -> Option<Cow<'static, str>> {
        let id = match self {
            WildcardKind::Category => "__categories__",
            WildcardKind::Gesture => "__gestures__",
            WildcardKind::Name(_) => "__names__",
            WildcardKind::Location(_) => "__locations__",
            WildcardKind::Object(_) => "__objects__",
            WildcardKind::Question => "__questions__",
            WildcardKind::Void => return None,
            WildcardKind::Other(key) => return Some(Cow::Owned(format!("__{}__", key))),
        };
        Some(Cow::Borrowed(id))
    }
}

/// Whether an exported id has the `__key__` shape reserved for rules
/// generated from wildcards.
pub fn is_generated_id(id: &str) -> bool {
    id.len() > 4 && id.starts_with("__") && id.ends_with("__")
}

/// A `{...}` placeholder inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wildcard<'a> {
    /// Letters-only key following the opening brace.
    pub key: &'a str,
    /// Raw text between the key and the matching closing brace.
    pub params: &'a str,
    /// False when the template ended before the braces balanced.
    pub terminated: bool,
}

impl<'a> Wildcard<'a> {
    pub fn kind(&self) -> WildcardKind<'a> {
        WildcardKind::from_key(self.key)
    }

    /// Text following `meta:` in the parameters, if any.
    pub fn metadata(&self) -> Option<&'a str> {
        let idx = self.params.find(META_PREFIX)?;
        let meta = self.params[idx + META_PREFIX.len()..].trim();
        if meta.is_empty() { None } else { Some(meta) }
    }
}

/// One classified piece of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Reference including the leading sigil, e.g. `$Main`.
    NonTerminal(&'a str),
    Wildcard(Wildcard<'a>),
    Literal(&'a str),
}

/// Classify the segment starting at `cursor` and advance past it.
///
/// The cursor always advances by at least one byte when it is inside the
/// template. An unterminated wildcard consumes the rest of the template.
pub fn next_segment<'a>(template: &'a str, cursor: &mut usize) -> Segment<'a> {
    let start = *cursor;
    let first = template[start..].chars().next();

    match first {
        Some(SIGIL) => {
            *cursor += SIGIL.len_utf8();
            take_while(template, cursor, is_ident);
            Segment::NonTerminal(&template[start..*cursor])
        }
        Some('{') => Segment::Wildcard(fetch_wildcard(template, cursor)),
        _ => {
            let len = template[start..]
                .find(|c| c == SIGIL || c == '{')
                .unwrap_or(template.len() - start);
            *cursor += len;
            Segment::Literal(&template[start..*cursor])
        }
    }
}

fn fetch_wildcard<'a>(template: &'a str, cursor: &mut usize) -> Wildcard<'a> {
    // Opening brace.
    *cursor += 1;
    skip_spaces(template, cursor);

    let key_start = *cursor;
    take_while(template, cursor, is_alpha);
    let key = &template[key_start..*cursor];

    let params_start = *cursor;
    let bytes = template.as_bytes();
    let mut depth = 1usize;
    while *cursor < bytes.len() {
        match bytes[*cursor] {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
        *cursor += 1;
        if depth == 0 {
            break;
        }
    }

    let terminated = depth == 0;
    let params_end = if terminated { *cursor - 1 } else { *cursor };
    Wildcard {
        key,
        params: &template[params_start..params_end],
        terminated,
    }
}

/// Iterator over the segments of a template.
#[derive(Debug, Clone)]
pub struct TemplateScanner<'a> {
    template: &'a str,
    cursor: usize,
}

impl<'a> TemplateScanner<'a> {
    pub fn new(template: &'a str) -> Self {
        TemplateScanner {
            template,
            cursor: 0,
        }
    }
}

impl<'a> Iterator for TemplateScanner<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.template.len() {
            return None;
        }
        Some(next_segment(self.template, &mut self.cursor))
    }
}

/// Scan a whole template.
pub fn segments(template: &str) -> TemplateScanner<'_> {
    TemplateScanner::new(template)
}
