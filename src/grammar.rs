use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use tracing::{debug, info};

use crate::scanner::{self, Segment};
use crate::utils::{GrammarError, OptionExt, Result};

/// Id of the rule every grammar must define.
pub const ROOT_RULE: &str = "$Main";

/// Difficulty tiers, ordered from unknown to hardest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DifficultyTier {
    #[default]
    Unknown,
    Easy,
    Moderate,
    High,
}

impl DifficultyTier {
    /// Map a dispatch selector (`"1"`, `"2"`, `"3"`) to a tier.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(DifficultyTier::Easy),
            "2" => Some(DifficultyTier::Moderate),
            "3" => Some(DifficultyTier::High),
            _ => None,
        }
    }
}

impl FromStr for DifficultyTier {
    type Err = GrammarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(DifficultyTier::Unknown),
            "easy" => Ok(DifficultyTier::Easy),
            "moderate" => Ok(DifficultyTier::Moderate),
            "high" => Ok(DifficultyTier::High),
            other => Err(GrammarError::Parse(format!("unknown tier '{}'", other))),
        }
    }
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DifficultyTier::Unknown => "Unknown",
            DifficultyTier::Easy => "Easy",
            DifficultyTier::Moderate => "Moderate",
            DifficultyTier::High => "High",
        };
        f.write_str(name)
    }
}

/// A non-terminal and its alternative replacement templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionRule {
    /// Id including the leading sigil, e.g. `$Main`
    pub non_terminal: String,
    /// Replacement templates in source order
    pub replacements: Vec<String>,
}

impl ProductionRule {
    /// Create a rule from its sigil-prefixed id and replacement templates.
    pub fn new(non_terminal: &str, replacements: Vec<String>) -> Self {
        ProductionRule {
            non_terminal: non_terminal.to_string(),
            replacements,
        }
    }

    /// Id under which the rule is exported: the id without its sigil.
    pub fn export_id(&self) -> &str {
        export_id(&self.non_terminal)
    }
}

/// Strip the leading sigil from a non-terminal id.
pub fn export_id(non_terminal: &str) -> &str {
    non_terminal
        .strip_prefix(scanner::SIGIL)
        .unwrap_or(non_terminal)
}

/// A named set of production rules.
///
/// Rules keep their source order so that every walk over the table is
/// deterministic. A grammar is not modified once loaded.
#[derive(Debug, Clone)]
pub struct Grammar {
    name: String,
    tier: DifficultyTier,
    rules: Vec<ProductionRule>,
    index: HashMap<String, usize>,
}

impl Grammar {
    /// Create an empty grammar. It is not valid until a `$Main` rule is added.
    pub fn new(name: &str, tier: DifficultyTier) -> Self {
        Grammar {
            name: name.to_string(),
            tier,
            rules: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Load a grammar from a file; the name defaults to the file stem.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let default_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_grammar_err(|| format!("invalid grammar file name: {}", path.display()))?;
        let grammar = Self::parse(default_name, &content)?;
        info!(
            grammar = grammar.name(),
            tier = %grammar.tier(),
            rules = grammar.len(),
            "loaded grammar from {}",
            path.display()
        );
        Ok(grammar)
    }

    /// Parse grammar text.
    ///
    /// ```text
    /// ; grammar name Category I
    /// ; grammar tier Easy
    /// $Main = $go | $fetch
    /// $go   = Go to the {room}.
    /// ```
    pub fn parse(default_name: &str, text: &str) -> Result<Self> {
        let header_regex = Regex::new(r"^;\s*grammar\s+(name|tier)\s+(.+?)\s*$").unwrap();
        let rule_regex = Regex::new(r"^(\$[A-Za-z0-9_]+)\s*=(.*)$").unwrap();

        let mut grammar = Grammar::new(default_name, DifficultyTier::Unknown);

        for (line_no, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(captures) = header_regex.captures(trimmed) {
                let value = &captures[2];
                match &captures[1] {
                    "name" => grammar.name = value.to_string(),
                    _ => grammar.tier = value.parse()?,
                }
                continue;
            }

            // Skip comments
            if trimmed.starts_with(';') || trimmed.starts_with('#') {
                continue;
            }

            let captures = rule_regex.captures(trimmed).ok_or_else(|| {
                GrammarError::Parse(format!("line {}: expected '$Rule = ...'", line_no + 1))
            })?;
            let replacements = split_alternatives(&captures[2]);
            grammar.add_rule(&captures[1], replacements);
        }

        grammar.ensure_root()?;
        Ok(grammar)
    }

    /// Append replacements to a rule, creating it if needed.
    pub fn add_rule<I, S>(&mut self, non_terminal: &str, replacements: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replacements = replacements.into_iter().map(Into::into);
        match self.index.get(non_terminal) {
            Some(&idx) => self.rules[idx].replacements.extend(replacements),
            None => {
                self.index
                    .insert(non_terminal.to_string(), self.rules.len());
                self.rules
                    .push(ProductionRule::new(non_terminal, replacements.collect()));
            }
        }
        self
    }

    /// Fail unless the grammar has a root rule.
    pub fn ensure_root(&self) -> Result<()> {
        if self.contains(ROOT_RULE) {
            Ok(())
        } else {
            Err(GrammarError::MissingRoot(self.name.clone()))
        }
    }

    /// Grammar name, also the stem of its converted document
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tier(&self) -> DifficultyTier {
        self.tier
    }

    /// Look up a rule by its sigil-prefixed id
    pub fn rule(&self, non_terminal: &str) -> Option<&ProductionRule> {
        self.index.get(non_terminal).map(|&idx| &self.rules[idx])
    }

    /// The `$Main` rule, if defined
    pub fn root(&self) -> Option<&ProductionRule> {
        self.rule(ROOT_RULE)
    }

    /// Check if a non-terminal has a rule in this grammar
    pub fn contains(&self, non_terminal: &str) -> bool {
        self.index.contains_key(non_terminal)
    }

    /// All rules in source order
    pub fn rules(&self) -> &[ProductionRule] {
        &self.rules
    }

    /// Number of distinct rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fail when a rule would be exported under an id reserved for the
    /// rules generated from wildcards, such as `__names__`.
    pub fn ensure_exportable(&self) -> Result<()> {
        match self
            .rules
            .iter()
            .find(|rule| scanner::is_generated_id(rule.export_id()))
        {
            Some(rule) => Err(GrammarError::ReservedRuleId(rule.non_terminal.clone())),
            None => Ok(()),
        }
    }

    /// Report problems that would make expansion or conversion misbehave:
    /// dangling references, unterminated wildcards, and reference cycles
    /// reachable from the root rule.
    pub fn lint(&self) -> Vec<GrammarError> {
        let mut problems = Vec::new();

        for rule in &self.rules {
            if scanner::is_generated_id(rule.export_id()) {
                problems.push(GrammarError::ReservedRuleId(rule.non_terminal.clone()));
            }
            for replacement in &rule.replacements {
                let mut cursor = 0;
                while cursor < replacement.len() {
                    let start = cursor;
                    match scanner::next_segment(replacement, &mut cursor) {
                        Segment::NonTerminal(nt) if !self.contains(nt) => {
                            problems.push(GrammarError::Parse(format!(
                                "{}: undefined non-terminal {}",
                                rule.non_terminal, nt
                            )));
                        }
                        Segment::Wildcard(w) if !w.terminated => {
                            problems.push(GrammarError::UnterminatedWildcard {
                                template: replacement.clone(),
                                offset: start,
                            });
                        }
                        _ => {}
                    }
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            problems.push(GrammarError::CyclicGrammar(cycle));
        }

        problems
    }

    fn references(rule: &ProductionRule) -> Vec<&str> {
        rule.replacements
            .iter()
            .flat_map(|r| scanner::segments(r))
            .filter_map(|seg| match seg {
                Segment::NonTerminal(nt) => Some(nt),
                _ => None,
            })
            .collect()
    }

    /// First reference cycle reachable from the root, as a path that starts
    /// and ends with the same rule.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.root()
            .and_then(|root| self.cycle_from(root, &mut visited, &mut path))
    }

    fn cycle_from<'a>(
        &'a self,
        rule: &'a ProductionRule,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        let id = rule.non_terminal.as_str();
        if let Some(pos) = path.iter().position(|p| *p == id) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        if !visited.insert(id) {
            return None;
        }

        path.push(id);
        for reference in Self::references(rule) {
            if let Some(next) = self.rule(reference) {
                if let Some(cycle) = self.cycle_from(next, visited, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        None
    }
}

/// Split a right-hand side on `|` outside of wildcard braces.
fn split_alternatives(rhs: &str) -> Vec<String> {
    let rhs = rhs.trim();
    if rhs.is_empty() {
        return Vec::new();
    }

    let mut alternatives = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in rhs.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '|' if depth == 0 => {
                alternatives.push(rhs[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    alternatives.push(rhs[start..].trim().to_string());
    alternatives
}

/// Load every `*.txt` grammar in a directory, in path order.
pub fn load_grammars<P: AsRef<Path>>(dir: P) -> Result<Vec<Grammar>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let grammars = paths
        .iter()
        .map(Grammar::from_file)
        .collect::<Result<Vec<_>>>()?;
    debug!(count = grammars.len(), "grammars loaded");
    Ok(grammars)
}

/// Builder for constructing Grammar instances
pub struct GrammarBuilder {
    grammar: Grammar,
}

impl GrammarBuilder {
    pub fn new(name: &str) -> Self {
        GrammarBuilder {
            grammar: Grammar::new(name, DifficultyTier::Unknown),
        }
    }

    pub fn tier(mut self, tier: DifficultyTier) -> Self {
        self.grammar.tier = tier;
        self
    }

    /// Add replacements to a rule
    pub fn add_rule(mut self, non_terminal: &str, replacements: &[&str]) -> Self {
        self.grammar
            .add_rule(non_terminal, replacements.iter().copied());
        self
    }

    /// Build the grammar, failing when `$Main` is missing
    pub fn build(self) -> Result<Grammar> {
        self.grammar.ensure_root()?;
        Ok(self.grammar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
; grammar name Category I
; grammar tier Easy

# plain comment
$Main   = $go | $fetch
$go     = Go to the {room}.
$fetch  = Bring me the {object meta: a | b} from the {placement}
$fetch  = Grab the {kobject}
$empty  =
"#;

    #[test]
    fn test_parse_headers_and_rules() {
        let grammar = Grammar::parse("fallback", SAMPLE).unwrap();

        assert_eq!(grammar.name(), "Category I");
        assert_eq!(grammar.tier(), DifficultyTier::Easy);
        assert_eq!(grammar.len(), 4);

        let main = grammar.root().unwrap();
        assert_eq!(main.replacements, vec!["$go", "$fetch"]);

        // Repeated ids append; `|` inside braces is not a separator
        let fetch = grammar.rule("$fetch").unwrap();
        assert_eq!(
            fetch.replacements,
            vec![
                "Bring me the {object meta: a | b} from the {placement}",
                "Grab the {kobject}",
            ]
        );

        assert!(grammar.rule("$empty").unwrap().replacements.is_empty());
    }

    #[test]
    fn test_rules_keep_source_order() {
        let grammar = Grammar::parse("fallback", SAMPLE).unwrap();
        let ids: Vec<&str> = grammar
            .rules()
            .iter()
            .map(|r| r.non_terminal.as_str())
            .collect();
        assert_eq!(ids, vec!["$Main", "$go", "$fetch", "$empty"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let result = Grammar::parse("lonely", "$go = Go away");
        assert!(matches!(result, Err(GrammarError::MissingRoot(name)) if name == "lonely"));
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let result = Grammar::parse("bad", "$Main = ok\nthis is not a rule");
        match result {
            Err(GrammarError::Parse(msg)) => assert!(msg.contains("line 2")),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_tier_codes() {
        assert_eq!(DifficultyTier::from_code("1"), Some(DifficultyTier::Easy));
        assert_eq!(DifficultyTier::from_code("2"), Some(DifficultyTier::Moderate));
        assert_eq!(DifficultyTier::from_code("3"), Some(DifficultyTier::High));
        assert_eq!(DifficultyTier::from_code("4"), None);
        assert_eq!(DifficultyTier::from_code(" 1"), None);
        assert!(DifficultyTier::Easy < DifficultyTier::High);
        assert_eq!("moderate".parse::<DifficultyTier>().unwrap(), DifficultyTier::Moderate);
    }

    #[test]
    fn test_export_id() {
        assert_eq!(export_id("$Main"), "Main");
        assert_eq!(export_id("__names__"), "__names__");
    }

    #[test]
    fn test_builder_requires_root() {
        assert!(GrammarBuilder::new("g").add_rule("$a", &["x"]).build().is_err());

        let grammar = GrammarBuilder::new("g")
            .tier(DifficultyTier::High)
            .add_rule("$Main", &["A", "B"])
            .build()
            .unwrap();
        assert_eq!(grammar.tier(), DifficultyTier::High);
        assert_eq!(grammar.root().unwrap().replacements, vec!["A", "B"]);
    }

    #[test]
    fn test_lint_reports_problems() {
        let grammar = GrammarBuilder::new("g")
            .add_rule("$Main", &["$a and $missing", "{name"])
            .add_rule("$a", &["$b"])
            .add_rule("$b", &["$a"])
            .build()
            .unwrap();

        let problems = grammar.lint();
        assert_eq!(problems.len(), 3);
        assert!(problems[0].to_string().contains("$missing"));
        assert!(matches!(
            problems[1],
            GrammarError::UnterminatedWildcard { offset: 0, .. }
        ));
        match &problems[2] {
            GrammarError::CyclicGrammar(path) => assert_eq!(path, &vec!["$a", "$b", "$a"]),
            other => panic!("Expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_reserved_rule_ids() {
        let grammar = GrammarBuilder::new("g")
            .add_rule("$Main", &["$__names__"])
            .add_rule("$__names__", &["Bob"])
            .add_rule("$__x", &["ok"])
            .build()
            .unwrap();

        let problems = grammar.lint();
        assert_eq!(problems.len(), 1);
        assert!(matches!(&problems[0], GrammarError::ReservedRuleId(id) if id == "$__names__"));
        assert!(matches!(
            grammar.ensure_exportable(),
            Err(GrammarError::ReservedRuleId(_))
        ));

        let clean = Grammar::parse("fallback", SAMPLE).unwrap();
        assert!(clean.ensure_exportable().is_ok());
    }

    #[test]
    fn test_lint_clean_grammar() {
        let grammar = Grammar::parse("fallback", SAMPLE).unwrap();
        assert!(grammar.lint().is_empty());
    }

    #[test]
    fn test_load_grammars_from_dir() {
        let dir = TempDir::new().unwrap();
        for (file, body) in [
            ("b.txt", "; grammar tier High\n$Main = second"),
            ("a.txt", "; grammar tier Easy\n$Main = first"),
            ("notes.md", "ignored"),
        ] {
            let mut f = fs::File::create(dir.path().join(file)).unwrap();
            f.write_all(body.as_bytes()).unwrap();
        }

        let grammars = load_grammars(dir.path()).unwrap();
        let names: Vec<&str> = grammars.iter().map(|g| g.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(grammars[1].tier(), DifficultyTier::High);
    }
}
