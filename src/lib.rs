//! GPSR-Gen generates random robot commands from a compact template grammar
//! and converts the same grammars into SRGS speech-recognition documents.
//!
//! A grammar maps non-terminals such as `$Main` to alternative templates. A
//! template mixes literal text, references to other non-terminals and
//! `{wildcards}` that draw from entity datasets (names, locations, objects,
//! gestures and questions).
//!
//! # Example
//!
//! ```rust
//! use gpsr_gen::{Entities, Expander, GrammarBuilder, Location};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let grammar = GrammarBuilder::new("demo")
//!     .add_rule("$Main", &["Go to the {room}"])
//!     .build()
//!     .unwrap();
//! let entities = Entities::new().with_locations(vec![Location::room("kitchen")]);
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let task = Expander::new(&grammar, &entities, 100).expand(&mut rng).unwrap();
//! assert_eq!(task.text(), "Go to the kitchen");
//!
//! let xml = gpsr_gen::converter::convert(&grammar, &entities).unwrap();
//! assert!(String::from_utf8(xml).unwrap().contains(r##"<ruleref uri="#__locations__"/>"##));
//! ```

pub mod converter;
pub mod dispatch;
pub mod entities;
pub mod generator;
pub mod grammar;
pub mod scanner;
pub mod task;
pub mod utils;

pub use converter::ConversionContext;
pub use dispatch::{Command, Response, SharedValue, SpeechCommandHandler};
pub use entities::{
    Category, Entities, Gender, Gesture, GpsrObject, Location, Nameable, ObjectType, PersonName,
    Question,
};
pub use generator::{Expander, Generator, GeneratorConfig};
pub use grammar::{DifficultyTier, Grammar, GrammarBuilder, ProductionRule, load_grammars};
pub use task::{Task, Token};
pub use utils::{GrammarError, Result};
