use std::fmt;

/// One fragment of a generated task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    text: String,
    metadata: Vec<String>,
}

impl Token {
    /// A literal fragment without metadata.
    pub fn literal(text: &str) -> Self {
        Token {
            text: text.to_string(),
            metadata: Vec::new(),
        }
    }

    pub fn with_metadata(text: &str, metadata: Vec<String>) -> Self {
        Token {
            text: text.to_string(),
            metadata,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Metadata in insertion order
    pub fn metadata(&self) -> &[String] {
        &self.metadata
    }
}

/// Heading used for metadata pooled from tokens without text.
pub const REMARKS: &str = "remarks";

/// Metadata reported under one heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataGroup<'a> {
    pub heading: &'a str,
    pub entries: Vec<&'a str>,
}

/// A fully expanded command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Task {
    tokens: Vec<Token>,
}

impl Task {
    pub fn new(tokens: Vec<Token>) -> Self {
        Task { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Rendered sentence: the token texts concatenated.
    pub fn text(&self) -> String {
        self.tokens.iter().map(Token::text).collect()
    }

    /// Metadata grouped by originating token, in token order.
    ///
    /// Tokens without metadata are skipped. Metadata of tokens whose text is
    /// empty is pooled into a single trailing `remarks` group.
    // TODO: the remarks pool loses which wildcard each remark came from; carry
    // the wildcard key on empty tokens once the dispatch output can show it.
    pub fn metadata_groups(&self) -> Vec<MetadataGroup<'_>> {
        let mut groups = Vec::new();
        let mut remarks = Vec::new();

        for token in &self.tokens {
            if token.metadata.is_empty() {
                continue;
            }
            let entries = token.metadata.iter().map(String::as_str);
            if token.text.is_empty() {
                remarks.extend(entries);
            } else {
                groups.push(MetadataGroup {
                    heading: &token.text,
                    entries: entries.collect(),
                });
            }
        }

        if !remarks.is_empty() {
            groups.push(MetadataGroup {
                heading: REMARKS,
                entries: remarks,
            });
        }
        groups
    }

    /// Sentence followed by its metadata groups, one tab-indented entry per line.
    pub fn report(&self) -> String {
        let mut out = self.text();
        out.push('\n');
        for group in self.metadata_groups() {
            out.push('\n');
            out.push_str(group.heading);
            for entry in group.entries {
                out.push_str("\n\t");
                out.push_str(entry);
            }
        }
        out
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            f.write_str(&token.text)?;
        }
        Ok(())
    }
}
