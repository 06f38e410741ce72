use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::entities::{Entities, Gender, Nameable, ObjectType};
use crate::grammar::{DifficultyTier, Grammar, ROOT_RULE};
use crate::scanner::{self, LocationFilter, NameFilter, ObjectFilter, Segment, Wildcard, WildcardKind};
use crate::task::{Task, Token};
use crate::utils::{GrammarError, Result};

/// Configuration options for task generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Maximum rule nesting depth (to prevent runaway expansion)
    pub max_recursion_depth: usize,
    /// Check category locations against the location dataset at startup
    pub validate_locations: bool,
    /// Seed for a replayable random source
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            max_recursion_depth: 100,
            validate_locations: false,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Expands one grammar into a [`Task`].
///
/// The expander only reads the grammar and the datasets; all randomness comes
/// from the generator passed to [`Expander::expand`].
#[derive(Debug, Clone, Copy)]
pub struct Expander<'a> {
    grammar: &'a Grammar,
    entities: &'a Entities,
    max_depth: usize,
}

impl<'a> Expander<'a> {
    pub fn new(grammar: &'a Grammar, entities: &'a Entities, max_depth: usize) -> Self {
        Expander {
            grammar,
            entities,
            max_depth,
        }
    }

    /// Expand the root rule.
    pub fn expand<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Task> {
        self.expand_rule(ROOT_RULE, rng)
    }

    /// Expand an arbitrary rule of the grammar.
    pub fn expand_rule<R: Rng + ?Sized>(&self, non_terminal: &str, rng: &mut R) -> Result<Task> {
        let mut tokens = Vec::new();
        let mut path = Vec::new();
        self.expand_into(non_terminal, rng, &mut path, &mut tokens)?;
        Ok(Task::new(tokens))
    }

    fn expand_into<R: Rng + ?Sized>(
        &self,
        non_terminal: &str,
        rng: &mut R,
        path: &mut Vec<&'a str>,
        tokens: &mut Vec<Token>,
    ) -> Result<()> {
        let Some(rule) = self.grammar.rule(non_terminal) else {
            // Dangling references contribute nothing
            warn!(
                grammar = self.grammar.name(),
                "undefined non-terminal {} skipped", non_terminal
            );
            return Ok(());
        };
        let id = rule.non_terminal.as_str();

        if path.contains(&id) {
            let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Err(GrammarError::CyclicGrammar(cycle));
        }
        if path.len() >= self.max_depth {
            return Err(GrammarError::RecursionLimit {
                rule: id.to_string(),
                limit: self.max_depth,
            });
        }

        let replacement = match rule.replacements.as_slice() {
            [] => return Ok(()),
            [only] => only,
            many => &many[rng.gen_range(0..many.len())],
        };
        trace!(rule = id, "expanding {:?}", replacement);

        path.push(id);
        for segment in scanner::segments(replacement) {
            match segment {
                Segment::NonTerminal(nt) => self.expand_into(nt, rng, path, tokens)?,
                Segment::Wildcard(wildcard) => {
                    if let Some(token) = self.resolve_wildcard(&wildcard, rng)? {
                        tokens.push(token);
                    }
                }
                Segment::Literal(text) => tokens.push(Token::literal(text)),
            }
        }
        path.pop();
        Ok(())
    }

    /// Draw an entity for a wildcard. `void` yields a token only when it
    /// carries metadata.
    fn resolve_wildcard<R: Rng + ?Sized>(
        &self,
        wildcard: &Wildcard<'_>,
        rng: &mut R,
    ) -> Result<Option<Token>> {
        let meta = wildcard.metadata();
        let key = wildcard.key;
        let entities = self.entities;

        let (text, mut metadata) = match wildcard.kind() {
            WildcardKind::Void => {
                return Ok(meta.map(|m| Token::with_metadata("", vec![m.to_string()])));
            }
            WildcardKind::Category => pick(entities.categories.iter(), rng, key)?,
            WildcardKind::Gesture => pick(entities.gestures.iter(), rng, key)?,
            WildcardKind::Question => pick(entities.questions.iter(), rng, key)?,
            WildcardKind::Name(filter) => {
                let names = entities.names.iter().filter(|n| match filter {
                    NameFilter::Any => true,
                    NameFilter::Female => n.gender == Gender::Female,
                    NameFilter::Male => n.gender == Gender::Male,
                });
                pick(names, rng, key)?
            }
            WildcardKind::Location(filter) => {
                let locations = entities.locations.iter().filter(|l| match filter {
                    LocationFilter::Any => true,
                    LocationFilter::Room => l.is_room(),
                    LocationFilter::Beacon => l.is_beacon,
                    LocationFilter::Placement => l.is_placement,
                });
                pick(locations, rng, key)?
            }
            WildcardKind::Object(filter) => {
                let objects = entities.objects.iter().filter(|o| match filter {
                    ObjectFilter::Any => true,
                    ObjectFilter::Known => o.kind == ObjectType::Known,
                    ObjectFilter::Alike => o.kind == ObjectType::Alike,
                });
                pick(objects, rng, key)?
            }
            WildcardKind::Other(other) => {
                return Err(GrammarError::NoCandidates(format!("{{{}}}", other)));
            }
        };

        if let Some(m) = meta {
            metadata.push(m.to_string());
        }
        Ok(Some(Token::with_metadata(text, metadata)))
    }
}

fn pick<'e, T, I, R>(candidates: I, rng: &mut R, key: &str) -> Result<(&'e str, Vec<String>)>
where
    T: Nameable + 'e,
    I: Iterator<Item = &'e T>,
    R: Rng + ?Sized,
{
    let entity = candidates
        .choose(rng)
        .ok_or_else(|| GrammarError::NoCandidates(format!("{{{}}}", key)))?;
    Ok((entity.name(), entity.metadata()))
}

/// Generates tasks from a set of tiered grammars.
#[derive(Debug, Clone)]
pub struct Generator {
    grammars: Vec<Grammar>,
    entities: Arc<Entities>,
    config: GeneratorConfig,
}

impl Generator {
    /// Create a generator; fails if a grammar has no root rule, or if the
    /// location pre-flight check is enabled and fails.
    pub fn new(
        grammars: Vec<Grammar>,
        entities: Arc<Entities>,
        config: GeneratorConfig,
    ) -> Result<Self> {
        for grammar in &grammars {
            grammar.ensure_root()?;
        }
        if config.validate_locations {
            entities.validate_locations()?;
        }
        Ok(Generator {
            grammars,
            entities,
            config,
        })
    }

    pub fn grammars(&self) -> &[Grammar] {
        &self.grammars
    }

    pub fn entities(&self) -> &Arc<Entities> {
        &self.entities
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Pick a grammar for a tier: uniformly among exact matches, otherwise
    /// among grammars of a lower tier.
    pub fn select_grammar<R: Rng + ?Sized>(
        &self,
        tier: DifficultyTier,
        rng: &mut R,
    ) -> Result<&Grammar> {
        if tier == DifficultyTier::Unknown {
            return Err(GrammarError::InvalidDifficulty(tier.to_string()));
        }

        let exact = self.grammars.iter().filter(|g| g.tier() == tier).choose(rng);
        exact
            .or_else(|| self.grammars.iter().filter(|g| g.tier() <= tier).choose(rng))
            .ok_or_else(|| GrammarError::NoGrammarForTier(tier.to_string()))
    }

    /// Generate a task of the given tier.
    pub fn generate_task<R: Rng + ?Sized>(&self, tier: DifficultyTier, rng: &mut R) -> Result<Task> {
        let grammar = self.select_grammar(tier, rng)?;
        debug!(grammar = grammar.name(), %tier, "generating task");
        Expander::new(grammar, &self.entities, self.config.max_recursion_depth).expand(rng)
    }

    /// Generate a task for a dispatch selector. Unknown selectors produce no
    /// task.
    pub fn generate_from_code<R: Rng + ?Sized>(
        &self,
        code: &str,
        rng: &mut R,
    ) -> Result<Option<Task>> {
        match DifficultyTier::from_code(code) {
            Some(tier) => self.generate_task(tier, rng).map(Some),
            None => {
                debug!("ignoring difficulty code {:?}", code);
                Ok(None)
            }
        }
    }
}
