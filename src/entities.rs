//! Entity datasets that wildcards draw from.
//!
//! Each dataset is a read-only, name-indexed table. The on-disk format is
//! one XML file per dataset:
//!
//! ```xml
//! <categories>
//!   <category name="drinks" defaultLocation="bar" room="kitchen">
//!     <object name="coke" type="known"/>
//!   </category>
//! </categories>
//! <names><name gender="Female">Susan</name></names>
//! <rooms>
//!   <room name="kitchen"><location name="fridge" isPlacement="true"/></room>
//! </rooms>
//! <gestures><gesture name="waving" difficulty="Easy"/></gestures>
//! <questions><question><q>Who are you?</q><a>A robot</a></question></questions>
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::grammar::DifficultyTier;
use crate::utils::{GrammarError, Result};

pub const OBJECTS_FILE: &str = "Objects.xml";
pub const NAMES_FILE: &str = "Names.xml";
pub const LOCATIONS_FILE: &str = "Locations.xml";
pub const GESTURES_FILE: &str = "Gestures.xml";
pub const QUESTIONS_FILE: &str = "Questions.xml";

/// Anything a wildcard can resolve to.
pub trait Nameable {
    /// Text the entity contributes to a sentence.
    fn name(&self) -> &str;

    /// Descriptive attributes attached to the token.
    fn metadata(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Female,
    Male,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Female => f.write_str("Female"),
            Gender::Male => f.write_str("Male"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName {
    pub name: String,
    pub gender: Gender,
}

impl PersonName {
    pub fn new(name: &str, gender: Gender) -> Self {
        PersonName {
            name: name.to_string(),
            gender,
        }
    }
}

impl Nameable for PersonName {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Vec<String> {
        vec![format!("gender: {}", self.gender)]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gesture {
    pub name: String,
    pub tier: DifficultyTier,
}

impl Gesture {
    pub fn new(name: &str, tier: DifficultyTier) -> Self {
        Gesture {
            name: name.to_string(),
            tier,
        }
    }
}

impl Nameable for Gesture {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Vec<String> {
        vec![format!("difficulty: {}", self.tier)]
    }
}

/// A room, or a location inside a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub name: String,
    /// Enclosing room; `None` for rooms themselves.
    pub room: Option<String>,
    pub is_beacon: bool,
    pub is_placement: bool,
}

impl Location {
    /// A room; rooms are locations too
    pub fn room(name: &str) -> Self {
        Location {
            name: name.to_string(),
            room: None,
            is_beacon: false,
            is_placement: false,
        }
    }

    /// A location inside `room`
    pub fn inside(name: &str, room: &str, is_beacon: bool, is_placement: bool) -> Self {
        Location {
            name: name.to_string(),
            room: Some(room.to_string()),
            is_beacon,
            is_placement,
        }
    }

    pub fn is_room(&self) -> bool {
        self.room.is_none()
    }
}

impl Nameable for Location {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Vec<String> {
        match &self.room {
            None => vec!["type: room".to_string()],
            Some(room) => {
                let kind = match (self.is_beacon, self.is_placement) {
                    (true, true) => "beacon, placement",
                    (true, false) => "beacon",
                    (false, true) => "placement",
                    (false, false) => "location",
                };
                vec![format!("type: {}", kind), format!("room: {}", room)]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub default_location: String,
    pub room: String,
}

impl Category {
    pub fn new(name: &str, default_location: &str, room: &str) -> Self {
        Category {
            name: name.to_string(),
            default_location: default_location.to_string(),
            room: room.to_string(),
        }
    }
}

impl Nameable for Category {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Vec<String> {
        vec![
            format!("default location: {}", self.default_location),
            format!("room: {}", self.room),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Known,
    Alike,
    Special,
}

impl ObjectType {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "known" => Some(ObjectType::Known),
            "alike" => Some(ObjectType::Alike),
            "special" => Some(ObjectType::Special),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpsrObject {
    pub name: String,
    pub kind: ObjectType,
    pub category: Category,
}

impl GpsrObject {
    /// An object belonging to `category`
    pub fn new(name: &str, kind: ObjectType, category: &Category) -> Self {
        GpsrObject {
            name: name.to_string(),
            kind,
            category: category.clone(),
        }
    }
}

impl Nameable for GpsrObject {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Vec<String> {
        vec![
            format!("category: {}", self.category.name),
            format!(
                "default location: {} ({})",
                self.category.default_location, self.category.room
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub question: String,
    pub answer: String,
}

impl Question {
    pub fn new(question: &str, answer: &str) -> Self {
        Question {
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }
}

impl Nameable for Question {
    fn name(&self) -> &str {
        &self.question
    }

    fn metadata(&self) -> Vec<String> {
        vec![format!("answer: {}", self.answer)]
    }
}

/// Immutable list of entities with a name index.
///
/// Duplicate names are kept in the list; the index points at the first one.
#[derive(Debug, Clone)]
pub struct Dataset<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Nameable> Dataset<T> {
    /// Index the items by name. The first item wins on duplicate names.
    pub fn new(items: Vec<T>) -> Self {
        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            index.entry(item.name().to_string()).or_insert(i);
        }
        Dataset { items, index }
    }

    /// Look up an entity by its display name
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.items[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Nameable> Default for Dataset<T> {
    fn default() -> Self {
        Dataset::new(Vec::new())
    }
}

/// All datasets loaded for a session.
#[derive(Debug, Clone, Default)]
pub struct Entities {
    pub gestures: Dataset<Gesture>,
    pub names: Dataset<PersonName>,
    pub locations: Dataset<Location>,
    pub categories: Dataset<Category>,
    pub objects: Dataset<GpsrObject>,
    pub questions: Dataset<Question>,
}

impl Entities {
    /// Empty datasets
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the gesture dataset
    pub fn with_gestures(mut self, gestures: Vec<Gesture>) -> Self {
        self.gestures = Dataset::new(gestures);
        self
    }

    /// Replace the name dataset
    pub fn with_names(mut self, names: Vec<PersonName>) -> Self {
        self.names = Dataset::new(names);
        self
    }

    /// Replace the location dataset (rooms and the locations inside them)
    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = Dataset::new(locations);
        self
    }

    /// Set the object dataset; categories are taken from the objects in
    /// first-seen order.
    /// Replace the object dataset; categories are derived from the objects
    pub fn with_objects(mut self, objects: Vec<GpsrObject>) -> Self {
        let mut categories: Vec<Category> = Vec::new();
        for object in &objects {
            if !categories.iter().any(|c| c.name == object.category.name) {
                categories.push(object.category.clone());
            }
        }
        self.categories = Dataset::new(categories);
        self.objects = Dataset::new(objects);
        self
    }

    /// Replace the question dataset
    pub fn with_questions(mut self, questions: Vec<Question>) -> Self {
        self.questions = Dataset::new(questions);
        self
    }

    /// Load all five dataset files from a directory.
    ///
    /// A missing file leaves its dataset empty; a file that exists but cannot
    /// be read or parsed is an error.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entities = Entities::new()
            .with_objects(load_dataset(dir, OBJECTS_FILE, parse_objects)?)
            .with_names(load_dataset(dir, NAMES_FILE, parse_names)?)
            .with_locations(load_dataset(dir, LOCATIONS_FILE, parse_locations)?)
            .with_gestures(load_dataset(dir, GESTURES_FILE, parse_gestures)?)
            .with_questions(load_dataset(dir, QUESTIONS_FILE, parse_questions)?);

        info!(
            objects = entities.objects.len(),
            categories = entities.categories.len(),
            names = entities.names.len(),
            locations = entities.locations.len(),
            gestures = entities.gestures.len(),
            questions = entities.questions.len(),
            "entity datasets loaded"
        );
        Ok(entities)
    }

    /// Check that every category's default location and room were loaded.
    pub fn validate_locations(&self) -> Result<()> {
        let mut missing = Vec::new();
        for category in self.categories.iter() {
            for place in [&category.default_location, &category.room] {
                if !place.is_empty() && !self.locations.contains(place) {
                    missing.push(format!("{} (category {})", place, category.name));
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GrammarError::LocationValidation(missing))
        }
    }
}

fn load_dataset<T>(dir: &Path, file: &str, parse: fn(&str) -> Result<Vec<T>>) -> Result<Vec<T>> {
    let path = dir.join(file);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("{} not found, dataset left empty", path.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(GrammarError::DatasetLoad {
                dataset: file.to_string(),
                reason: e.to_string(),
            });
        }
    };

    parse(&content).map_err(|e| GrammarError::DatasetLoad {
        dataset: file.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct CategoriesXml {
    #[serde(rename = "category", default)]
    categories: Vec<CategoryXml>,
}

#[derive(Debug, Deserialize)]
struct CategoryXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@defaultLocation", default)]
    default_location: String,
    #[serde(rename = "@room", default)]
    room: String,
    #[serde(rename = "object", default)]
    objects: Vec<ObjectXml>,
}

#[derive(Debug, Deserialize)]
struct ObjectXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct NamesXml {
    #[serde(rename = "name", default)]
    names: Vec<NameXml>,
}

#[derive(Debug, Deserialize)]
struct NameXml {
    #[serde(rename = "@gender", default)]
    gender: String,
    #[serde(rename = "$text")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RoomsXml {
    #[serde(rename = "room", default)]
    rooms: Vec<RoomXml>,
}

#[derive(Debug, Deserialize)]
struct RoomXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "location", default)]
    locations: Vec<LocationXml>,
}

#[derive(Debug, Deserialize)]
struct LocationXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@isBeacon", default)]
    is_beacon: bool,
    #[serde(rename = "@isPlacement", default)]
    is_placement: bool,
}

#[derive(Debug, Deserialize)]
struct GesturesXml {
    #[serde(rename = "gesture", default)]
    gestures: Vec<GestureXml>,
}

#[derive(Debug, Deserialize)]
struct GestureXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@difficulty", default)]
    difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionsXml {
    #[serde(rename = "question", default)]
    questions: Vec<QuestionXml>,
}

#[derive(Debug, Deserialize)]
struct QuestionXml {
    q: String,
    a: String,
}

/// Parse `Objects.xml`: categories holding their objects.
pub fn parse_objects(xml: &str) -> Result<Vec<GpsrObject>> {
    let doc: CategoriesXml = quick_xml::de::from_str(xml)?;
    let mut objects = Vec::new();
    for cat in doc.categories {
        let category = Category::new(cat.name.trim(), cat.default_location.trim(), cat.room.trim());
        for obj in cat.objects {
            let kind = ObjectType::parse(&obj.kind).ok_or_else(|| {
                GrammarError::Parse(format!("object {}: unknown type '{}'", obj.name, obj.kind))
            })?;
            objects.push(GpsrObject::new(obj.name.trim(), kind, &category));
        }
    }
    Ok(objects)
}

/// Parse `Names.xml`.
pub fn parse_names(xml: &str) -> Result<Vec<PersonName>> {
    let doc: NamesXml = quick_xml::de::from_str(xml)?;
    doc.names
        .into_iter()
        .map(|n| -> Result<PersonName> {
            let gender = match n.gender.trim().to_ascii_lowercase().as_str() {
                "female" => Gender::Female,
                "male" => Gender::Male,
                other => {
                    return Err(GrammarError::Parse(format!(
                        "name {}: unknown gender '{}'",
                        n.name, other
                    )));
                }
            };
            Ok(PersonName::new(n.name.trim(), gender))
        })
        .collect()
}

/// Parse `Locations.xml`. Each room comes first, followed by its locations.
pub fn parse_locations(xml: &str) -> Result<Vec<Location>> {
    let doc: RoomsXml = quick_xml::de::from_str(xml)?;
    let mut locations = Vec::new();
    for room in doc.rooms {
        let room_name = room.name.trim();
        locations.push(Location::room(room_name));
        for loc in room.locations {
            locations.push(Location::inside(
                loc.name.trim(),
                room_name,
                loc.is_beacon,
                loc.is_placement,
            ));
        }
    }
    Ok(locations)
}

/// Parse `Gestures.xml`; a missing difficulty is `Unknown`.
pub fn parse_gestures(xml: &str) -> Result<Vec<Gesture>> {
    let doc: GesturesXml = quick_xml::de::from_str(xml)?;
    doc.gestures
        .into_iter()
        .map(|g| -> Result<Gesture> {
            let tier = match g.difficulty {
                Some(d) => d.parse::<DifficultyTier>()?,
                None => DifficultyTier::Unknown,
            };
            Ok(Gesture::new(g.name.trim(), tier))
        })
        .collect()
}

/// Parse `Questions.xml`.
pub fn parse_questions(xml: &str) -> Result<Vec<Question>> {
    let doc: QuestionsXml = quick_xml::de::from_str(xml)?;
    Ok(doc
        .questions
        .into_iter()
        .map(|q| Question::new(q.q.trim(), q.a.trim()))
        .collect())
}
