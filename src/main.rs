use clap::{Args, Parser, Subcommand};
use gpsr_gen::converter;
use gpsr_gen::dispatch::{self, SpeechCommandHandler};
use gpsr_gen::{DifficultyTier, Entities, Generator, GeneratorConfig, Grammar, load_grammars};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

/// Random GPSR command generator and SRGS grammar converter
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Directory holding the dataset XML files and a `grammars/` subdirectory
    #[arg(short, long, default_value = ".")]
    data: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one task per difficulty code (1 = easy, 2 = moderate, 3 = high)
    Generate {
        #[command(flatten)]
        data: DataArgs,

        /// JSON generator configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed for a replayable run; overrides the config seed
        #[arg(short, long)]
        seed: Option<u64>,

        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Write an SRGS document per grammar
    Convert {
        #[command(flatten)]
        data: DataArgs,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Report dangling references, unterminated wildcards and cycles
    Lint {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Answer `get_speech_cmd <code>` requests read from stdin
    Serve {
        #[command(flatten)]
        data: DataArgs,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> gpsr_gen::Result<GeneratorConfig> {
    match path {
        Some(path) => GeneratorConfig::from_json_file(path),
        None => Ok(GeneratorConfig::default()),
    }
}

fn load(data: &Path) -> gpsr_gen::Result<(Vec<Grammar>, Entities)> {
    let grammars = load_grammars(data.join("grammars"))?;
    let entities = Entities::load_dir(data)?;
    Ok((grammars, entities))
}

fn rng_for(config: &GeneratorConfig) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Generate {
            data,
            config,
            seed,
            codes,
        } => {
            let mut config = load_config(config.as_deref())?;
            if seed.is_some() {
                config.seed = seed;
            }
            let (grammars, entities) = load(&data.data)?;
            let mut rng = rng_for(&config);
            let generator = Generator::new(grammars, Arc::new(entities), config)?;

            for code in &codes {
                match DifficultyTier::from_code(code) {
                    Some(tier) => match generator.generate_task(tier, &mut rng) {
                        Ok(task) => println!("[{}]\n{}", tier, task.report()),
                        Err(err) => eprintln!("Failed to generate a {} task: {}", tier, err),
                    },
                    None => println!("Invalid difficulty code {:?}; expected 1, 2 or 3", code),
                }
            }
        }
        Commands::Convert { data, out } => {
            let (grammars, entities) = load(&data.data)?;
            fs::create_dir_all(&out)?;

            let mut failed = 0;
            for (name, result) in converter::convert_all(&grammars, &entities, &out) {
                match result {
                    Ok(path) => println!("{} -> {}", name, path.display()),
                    Err(err) => {
                        failed += 1;
                        eprintln!("{}: {}", name, err);
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{} grammar(s) failed to convert", failed).into());
            }
        }
        Commands::Lint { data } => {
            let grammars = load_grammars(data.data.join("grammars"))?;

            let mut problems = 0;
            for grammar in &grammars {
                for problem in grammar.lint() {
                    problems += 1;
                    println!("{}: {}", grammar.name(), problem);
                }
            }
            println!("{} grammar(s) checked, {} problem(s)", grammars.len(), problems);
            if problems > 0 {
                std::process::exit(1);
            }
        }
        Commands::Serve { data, config } => {
            let config = load_config(config.as_deref())?;
            let (grammars, entities) = load(&data.data)?;
            let rng = rng_for(&config);
            let generator = Generator::new(grammars, Arc::new(entities), config)?;

            let mut handler = SpeechCommandHandler::new(Arc::new(generator), rng);
            let stdin = io::stdin();
            dispatch::serve(&mut handler, stdin.lock(), io::stdout())?;
        }
    }

    Ok(())
}
