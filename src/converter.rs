//! Conversion of a grammar into an SRGS XML document.
//!
//! The output for a grammar with `$Main = $go | Stop` and `$go = Go to the {room}`
//! looks like:
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <grammar tag-format="semantics/1.0" mode="voice" xml:lang="en-US" version="1.0" root="Main">
//!     <rule id="Main">
//!         <one-of>
//!             <item>
//!                 <ruleref uri="#go"/>
//!             </item>
//!             <item>Stop</item>
//!         </one-of>
//!     </rule>
//!     <rule id="go">Go to the <ruleref uri="#__locations__"/>
//!     </rule>
//!     ...
//! ```
//!
//! followed by one enumeration rule per entity dataset. Indentation uses tabs.

use std::fs;
use std::path::{Component, Path, PathBuf};

use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::{debug, info, warn};

use crate::entities::{Entities, Nameable};
use crate::grammar::{Grammar, ProductionRule, ROOT_RULE, export_id};
use crate::scanner::{self, Segment};
use crate::utils::{GrammarError, Result};

/// Exported id of the root rule.
pub const MAIN_ID: &str = "Main";

/// State for converting one grammar. Each conversion owns its writer, so
/// several grammars can be converted at the same time.
pub struct ConversionContext<'a> {
    grammar: &'a Grammar,
    entities: &'a Entities,
    writer: Writer<Vec<u8>>,
    /// Wildcard ids referenced that no dataset provides, in first-seen order.
    placeholders: Vec<String>,
}

impl<'a> ConversionContext<'a> {
    /// Start a conversion with an empty tab-indented document.
    pub fn new(grammar: &'a Grammar, entities: &'a Entities) -> Self {
        ConversionContext {
            grammar,
            entities,
            writer: Writer::new_with_indent(Vec::new(), b'\t', 1),
            placeholders: Vec::new(),
        }
    }

    /// Run the conversion and return the complete document.
    pub fn convert(mut self) -> Result<Vec<u8>> {
        let grammar = self.grammar;
        let root = grammar
            .root()
            .ok_or_else(|| GrammarError::MissingRoot(grammar.name().to_string()))?;
        grammar.ensure_exportable()?;

        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        self.writer.write_event(Event::Start(
            BytesStart::new("grammar").with_attributes([
                ("tag-format", "semantics/1.0"),
                ("mode", "voice"),
                ("xml:lang", "en-US"),
                ("version", "1.0"),
                ("root", MAIN_ID),
            ]),
        ))?;

        self.write_rule(MAIN_ID, root)?;
        for rule in grammar.rules() {
            if rule.non_terminal != ROOT_RULE {
                self.write_rule(rule.export_id(), rule)?;
            }
        }
        self.write_lists()?;

        self.writer.write_event(Event::End(BytesEnd::new("grammar")))?;
        debug!(grammar = grammar.name(), "conversion complete");
        Ok(self.writer.into_inner())
    }

    fn write_rule(&mut self, id: &str, rule: &ProductionRule) -> Result<()> {
        let start = BytesStart::new("rule").with_attributes([("id", id)]);
        match rule.replacements.as_slice() {
            [] => {
                self.writer.write_event(Event::Empty(start))?;
                return Ok(());
            }
            [only] => {
                self.writer.write_event(Event::Start(start))?;
                self.write_replacement(only)?;
            }
            many => {
                self.writer.write_event(Event::Start(start))?;
                self.writer
                    .write_event(Event::Start(BytesStart::new("one-of")))?;
                for replacement in many {
                    self.writer.write_event(Event::Start(BytesStart::new("item")))?;
                    self.write_replacement(replacement)?;
                    self.writer.write_event(Event::End(BytesEnd::new("item")))?;
                }
                self.writer.write_event(Event::End(BytesEnd::new("one-of")))?;
            }
        }
        self.writer.write_event(Event::End(BytesEnd::new("rule")))?;
        Ok(())
    }

    fn write_replacement(&mut self, replacement: &str) -> Result<()> {
        for segment in scanner::segments(replacement) {
            match segment {
                Segment::NonTerminal(nt) if self.grammar.contains(nt) => {
                    self.write_rule_ref(export_id(nt))?;
                }
                Segment::NonTerminal(nt) => {
                    warn!(
                        grammar = self.grammar.name(),
                        "undefined non-terminal {} written as text", nt
                    );
                    self.write_text(nt)?;
                }
                Segment::Wildcard(wildcard) => {
                    let kind = wildcard.kind();
                    let Some(id) = kind.canonical_id() else {
                        continue;
                    };
                    if matches!(kind, scanner::WildcardKind::Other(_))
                        && !self.placeholders.iter().any(|p| *p == id)
                    {
                        self.placeholders.push(id.to_string());
                    }
                    self.write_rule_ref(&id)?;
                }
                Segment::Literal(text) => self.write_text(text)?,
            }
        }
        Ok(())
    }

    /// Element content only needs `<`, `>` and `&` escaped; quotes are kept.
    fn write_text(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
        Ok(())
    }

    fn write_rule_ref(&mut self, id: &str) -> Result<()> {
        let uri = format!("#{}", id);
        self.writer.write_event(Event::Empty(
            BytesStart::new("ruleref").with_attributes([("uri", uri.as_str())]),
        ))?;
        Ok(())
    }

    fn write_lists(&mut self) -> Result<()> {
        let entities = self.entities;

        self.write_list("__gestures__", entities.gestures.iter().map(|g| g.name()))?;
        self.write_list("__names__", entities.names.iter().map(|n| n.name()))?;
        self.write_list("__locations__", entities.locations.iter().map(|l| l.name()))?;
        self.write_list("__objects__", entities.objects.iter().map(|o| o.name()))?;

        let mut categories: Vec<&str> = Vec::new();
        for object in entities.objects.iter() {
            if !categories.contains(&object.category.name.as_str()) {
                categories.push(&object.category.name);
            }
        }
        self.write_list("__categories__", categories.into_iter())?;

        self.write_list("__questions__", entities.questions.iter().map(|q| q.name()))?;

        for id in std::mem::take(&mut self.placeholders) {
            self.writer.write_event(Event::Empty(
                BytesStart::new("rule").with_attributes([("id", id.as_str())]),
            ))?;
        }
        Ok(())
    }

    fn write_list<'s>(&mut self, id: &str, names: impl Iterator<Item = &'s str>) -> Result<()> {
        let mut names = names.peekable();
        self.writer.write_event(Event::Start(
            BytesStart::new("rule").with_attributes([("id", id)]),
        ))?;
        if names.peek().is_none() {
            self.writer.write_event(Event::Empty(BytesStart::new("one-of")))?;
        } else {
            self.writer
                .write_event(Event::Start(BytesStart::new("one-of")))?;
            for name in names {
                self.writer.write_event(Event::Start(BytesStart::new("item")))?;
                self.write_text(name)?;
                self.writer.write_event(Event::End(BytesEnd::new("item")))?;
            }
            self.writer.write_event(Event::End(BytesEnd::new("one-of")))?;
        }
        self.writer.write_event(Event::End(BytesEnd::new("rule")))?;
        Ok(())
    }
}

/// Convert a grammar into a complete SRGS document.
pub fn convert(grammar: &Grammar, entities: &Entities) -> Result<Vec<u8>> {
    ConversionContext::new(grammar, entities).convert()
}

/// File name of a grammar's document. The name must be a single plain path
/// component so the document lands inside the output directory.
pub fn document_file_name(grammar: &Grammar) -> Result<String> {
    let name = grammar.name();
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.contains(['/', '\\']) {
        return Err(GrammarError::InvalidGrammarName(name.to_string()));
    }
    Ok(format!("{}.xml", name))
}

/// Convert a grammar and write it to `<dir>/<grammar-name>.xml`.
///
/// The document is built in memory and published with a rename, so a failed
/// conversion never leaves a partial file behind.
pub fn write_document<P: AsRef<Path>>(
    grammar: &Grammar,
    entities: &Entities,
    dir: P,
) -> Result<PathBuf> {
    let file_name = document_file_name(grammar)?;
    let document = convert(grammar, entities)?;

    let path = dir.as_ref().join(file_name);
    let tmp = path.with_extension("xml.tmp");
    let publish = fs::write(&tmp, &document).and_then(|_| fs::rename(&tmp, &path));
    if let Err(source) = publish {
        let _ = fs::remove_file(&tmp);
        return Err(GrammarError::Write { path, source });
    }

    info!(grammar = grammar.name(), "wrote {}", path.display());
    Ok(path)
}

/// Convert every grammar. Failures are reported per grammar.
pub fn convert_all<P: AsRef<Path>>(
    grammars: &[Grammar],
    entities: &Entities,
    dir: P,
) -> Vec<(String, Result<PathBuf>)> {
    grammars
        .iter()
        .map(|g| (g.name().to_string(), write_document(g, entities, dir.as_ref())))
        .collect()
}
