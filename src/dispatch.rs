//! Request/response boundary for hosts that ask for generated commands.
//!
//! A request is a command name plus a parameter string, e.g.
//! `get_speech_cmd 2`. The response echoes the command, carries the rendered
//! task as its parameters on success, and the original parameters on failure.

use std::fmt;
use std::io::{BufRead, Write};
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::generator::Generator;
use crate::utils::Result;

/// Command answered by [`SpeechCommandHandler`].
pub const GET_SPEECH_CMD: &str = "get_speech_cmd";

/// Name of the shared value the rendered text is published to.
pub const RECOGNIZED_SPEECH: &str = "recognizedSpeech";

/// A request from the host: a command name and its parameter string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command: String,
    pub params: String,
}

impl Command {
    /// Create a command from its name and parameters
    pub fn new(command: &str, params: &str) -> Self {
        Command {
            command: command.to_string(),
            params: params.to_string(),
        }
    }

    /// Parse `<command> <params>`; `None` for a blank line.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (command, params) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));
        Some(Command::new(command, params.trim()))
    }
}

/// Answer to a [`Command`]; rendered as `<command> "<params>" <1|0>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub command: String,
    pub params: String,
    pub success: bool,
}

impl Response {
    /// Successful response carrying `params` in place of the request's.
    pub fn success(command: &Command, params: String) -> Self {
        Response {
            command: command.command.clone(),
            params,
            success: true,
        }
    }

    /// Failed response echoing the request's parameters.
    pub fn failure(command: &Command) -> Self {
        Response {
            command: command.command.clone(),
            params: command.params.clone(),
            success: false,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} \"{}\" {}",
            self.command,
            self.params,
            if self.success { 1 } else { 0 }
        )
    }
}

/// An externally owned value other subsystems read as recognized input.
pub trait SharedValue: Send {
    /// Name the value is registered under, e.g. [`RECOGNIZED_SPEECH`].
    fn name(&self) -> &str;

    /// Returns false when the value could not be written.
    fn try_write(&mut self, value: &str) -> bool;
}

/// Answers `get_speech_cmd` requests with a freshly generated task.
pub struct SpeechCommandHandler<R: Rng> {
    generator: Arc<Generator>,
    rng: R,
    shared: Option<Box<dyn SharedValue>>,
}

impl<R: Rng> SpeechCommandHandler<R> {
    /// Handler drawing from `generator` with its own random source.
    pub fn new(generator: Arc<Generator>, rng: R) -> Self {
        SpeechCommandHandler {
            generator,
            rng,
            shared: None,
        }
    }

    /// Also publish every generated text into `shared`.
    pub fn with_shared_value(mut self, shared: Box<dyn SharedValue>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Handle one request. Invalid codes and generation failures produce a
    /// failure response; the generator stays usable for later requests.
    pub fn handle(&mut self, command: &Command) -> Response {
        if command.command != GET_SPEECH_CMD {
            warn!("unsupported command {:?}", command.command);
            return Response::failure(command);
        }

        let task = match self
            .generator
            .generate_from_code(&command.params, &mut self.rng)
        {
            Ok(Some(task)) => task,
            Ok(None) => return Response::failure(command),
            Err(err) => {
                warn!("generation failed: {}", err);
                return Response::failure(command);
            }
        };

        debug!("generated task:\n{}", task.report());
        let text = task.text();
        if let Some(shared) = self.shared.as_mut() {
            if !shared.try_write(&text) {
                warn!("could not write shared value {}", shared.name());
            }
        }
        Response::success(command, text)
    }
}

/// Read requests line by line and write one response line per request.
pub fn serve<R, I, O>(handler: &mut SpeechCommandHandler<R>, input: I, mut output: O) -> Result<()>
where
    R: Rng,
    I: BufRead,
    O: Write,
{
    let mut handled = 0usize;
    for line in input.lines() {
        let line = line?;
        let Some(command) = Command::parse_line(&line) else {
            continue;
        };
        let response = handler.handle(&command);
        writeln!(output, "{}", response)?;
        output.flush()?;
        handled += 1;
    }
    info!("served {} requests", handled);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Entities;
    use crate::generator::GeneratorConfig;
    use crate::grammar::{DifficultyTier, GrammarBuilder};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::io::Cursor;
    use std::sync::Mutex;

    fn handler() -> SpeechCommandHandler<StdRng> {
        let easy = GrammarBuilder::new("easy")
            .tier(DifficultyTier::Easy)
            .add_rule("$Main", &["Say hello"])
            .build()
            .unwrap();
        let broken = GrammarBuilder::new("broken")
            .tier(DifficultyTier::High)
            .add_rule("$Main", &["Find {pron}"])
            .build()
            .unwrap();
        let generator = Generator::new(
            vec![easy, broken],
            Arc::new(Entities::new()),
            GeneratorConfig::default(),
        )
        .unwrap();
        SpeechCommandHandler::new(Arc::new(generator), StdRng::seed_from_u64(3))
    }

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl SharedValue for Recorder {
        fn name(&self) -> &str {
            RECOGNIZED_SPEECH
        }

        fn try_write(&mut self, value: &str) -> bool {
            self.0.lock().unwrap().push(value.to_string());
            true
        }
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            Command::parse_line("  get_speech_cmd   2 \n"),
            Some(Command::new("get_speech_cmd", "2"))
        );
        assert_eq!(
            Command::parse_line("get_speech_cmd"),
            Some(Command::new("get_speech_cmd", ""))
        );
        assert_eq!(Command::parse_line("   "), None);
    }

    #[test]
    fn test_successful_request() {
        let mut handler = handler();
        let response = handler.handle(&Command::new(GET_SPEECH_CMD, "1"));
        assert_eq!(
            response,
            Response {
                command: GET_SPEECH_CMD.to_string(),
                params: "Say hello".to_string(),
                success: true,
            }
        );
        assert_eq!(response.to_string(), "get_speech_cmd \"Say hello\" 1");
    }

    #[test]
    fn test_failures_echo_params() {
        let mut handler = handler();
        for params in ["0", "easy", "", "4"] {
            let response = handler.handle(&Command::new(GET_SPEECH_CMD, params));
            assert!(!response.success);
            assert_eq!(response.params, params);
        }

        // Generation error is scoped to the request.
        let response = handler.handle(&Command::new(GET_SPEECH_CMD, "3"));
        assert!(!response.success);
        assert!(handler.handle(&Command::new(GET_SPEECH_CMD, "1")).success);

        let response = handler.handle(&Command::new("play", "1"));
        assert_eq!(response.to_string(), "play \"1\" 0");
    }

    #[test]
    fn test_shared_value_receives_text() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let mut handler = handler().with_shared_value(Box::new(Recorder(written.clone())));

        handler.handle(&Command::new(GET_SPEECH_CMD, "2"));
        handler.handle(&Command::new(GET_SPEECH_CMD, "x"));
        assert_eq!(*written.lock().unwrap(), vec!["Say hello".to_string()]);
    }

    #[test]
    fn test_serve_loop() {
        let mut handler = handler();
        let input = Cursor::new("get_speech_cmd 1\n\nget_speech_cmd 9\n");
        let mut output = Vec::new();

        serve(&mut handler, input, &mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "get_speech_cmd \"Say hello\" 1\nget_speech_cmd \"9\" 0\n"
        );
    }
}
