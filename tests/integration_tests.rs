use gpsr_gen::converter;
use gpsr_gen::dispatch::{self, SpeechCommandHandler};
use gpsr_gen::{
    DifficultyTier, Entities, Generator, GeneratorConfig, Grammar, GrammarError, load_grammars,
};
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
}

fn shipped_generator(config: GeneratorConfig) -> Generator {
    let data = data_dir();
    let grammars = load_grammars(data.join("grammars")).unwrap();
    let entities = Entities::load_dir(&data).unwrap();
    Generator::new(grammars, Arc::new(entities), config).unwrap()
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

#[test]
fn test_shipped_data_loads_and_lints_clean() {
    let data = data_dir();
    let grammars = load_grammars(data.join("grammars")).unwrap();
    let names: Vec<&str> = grammars.iter().map(Grammar::name).collect();
    assert_eq!(names, vec!["Category I", "Category II", "Category III"]);
    for grammar in &grammars {
        assert!(grammar.lint().is_empty(), "{} has lint problems", grammar.name());
    }

    let entities = Entities::load_dir(&data).unwrap();
    entities.validate_locations().unwrap();
    assert_eq!(entities.categories.len(), 3);
    assert_eq!(entities.names.len(), 6);
}

#[test]
fn test_generate_every_tier() {
    let generator = shipped_generator(GeneratorConfig {
        validate_locations: true,
        ..Default::default()
    });
    let mut rng = StdRng::seed_from_u64(11);

    for tier in [DifficultyTier::Easy, DifficultyTier::Moderate, DifficultyTier::High] {
        for _ in 0..50 {
            let task = generator.generate_task(tier, &mut rng).unwrap();
            let text = task.text();
            assert!(!text.is_empty());
            assert!(!text.contains('{') && !text.contains('$'), "{}", text);
        }
    }
}

#[test]
fn test_seeded_generation_is_replayable() {
    let generator = shipped_generator(GeneratorConfig::default());
    let run = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..20)
            .map(|_| generator.generate_task(DifficultyTier::High, &mut rng).unwrap().report())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(5), run(5));
}

#[test]
fn test_remarks_from_void_metadata() {
    let dir = TempDir::new().unwrap();
    let grammars = dir.path().join("grammars");
    fs::create_dir(&grammars).unwrap();
    write(
        &grammars,
        "remarks.txt",
        "; grammar tier Easy\n$Main = Wave to {name}{void meta: stand still}{void}\n",
    );
    write(
        dir.path(),
        "Names.xml",
        r#"<names><name gender="Male">Noah</name></names>"#,
    );

    let generator = Generator::new(
        load_grammars(&grammars).unwrap(),
        Arc::new(Entities::load_dir(dir.path()).unwrap()),
        GeneratorConfig::default(),
    )
    .unwrap();
    let task = generator
        .generate_task(DifficultyTier::Easy, &mut StdRng::seed_from_u64(0))
        .unwrap();

    assert_eq!(generator.grammars()[0].name(), "remarks");
    assert_eq!(
        task.report(),
        "Wave to Noah\n\nNoah\n\tgender: Male\nremarks\n\tstand still"
    );
}

#[test]
fn test_convert_shipped_grammars() {
    let data = data_dir();
    let grammars = load_grammars(data.join("grammars")).unwrap();
    let entities = Entities::load_dir(&data).unwrap();
    let out = TempDir::new().unwrap();

    let results = converter::convert_all(&grammars, &entities, out.path());
    for (name, result) in &results {
        let path = result.as_ref().unwrap();
        assert_eq!(path, &out.path().join(format!("{}.xml", name)));
    }

    let xml = fs::read_to_string(out.path().join("Category I.xml")).unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
    assert!(xml.contains("<rule id=\"Main\">"));
    assert!(xml.contains("<ruleref uri=\"#go\"/>"));
    assert!(xml.contains("<rule id=\"__objects__\">"));
    assert!(xml.contains("<item>orange juice</item>"));
    assert!(!xml.contains("meta:"));

    // Converting again produces the same bytes.
    let again = converter::convert(&grammars[0], &entities).unwrap();
    assert_eq!(again, xml.into_bytes());
}

#[test]
fn test_load_failures() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "rootless.txt", "$go = Go\n");
    assert!(matches!(
        load_grammars(dir.path()),
        Err(GrammarError::MissingRoot(_))
    ));

    let dir = TempDir::new().unwrap();
    write(dir.path(), "Locations.xml", "<rooms><room name=\"kitchen\">");
    assert!(matches!(
        Entities::load_dir(dir.path()),
        Err(GrammarError::DatasetLoad { .. })
    ));

    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "Objects.xml",
        r#"<categories><category name="drinks" defaultLocation="bar" room="kitchen"><object name="coke"/></category></categories>"#,
    );
    let entities = Entities::load_dir(dir.path()).unwrap();
    let config = GeneratorConfig {
        validate_locations: true,
        ..Default::default()
    };
    let grammar = Grammar::parse("g", "$Main = hi").unwrap();
    assert!(matches!(
        Generator::new(vec![grammar], Arc::new(entities), config),
        Err(GrammarError::LocationValidation(_))
    ));
}

#[test]
fn test_serve_shipped_data() {
    let generator = shipped_generator(GeneratorConfig::default());
    let mut handler =
        SpeechCommandHandler::new(Arc::new(generator), StdRng::seed_from_u64(21));
    let mut output = Vec::new();

    dispatch::serve(
        &mut handler,
        Cursor::new("get_speech_cmd 1\nget_speech_cmd 2\nget_speech_cmd 7\n"),
        &mut output,
    )
    .unwrap();

    let output = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("get_speech_cmd \"") && lines[0].ends_with("\" 1"));
    assert!(lines[1].ends_with("\" 1"));
    assert_eq!(lines[2], "get_speech_cmd \"7\" 0");
}
