//! Interactive command loop.

use crate::chat::ConversationalSession;
use crate::error::Result;
use crate::library::IngestionCoordinator;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::future::Future;
use std::io::Write;
use tokio::sync::Notify;

const PROMPT: &str = "You: ";

/// One line of user input, interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Help,
    Refresh,
    List,
    Empty,
    Question(String),
}

impl Command {
    /// Reserved words match case-insensitively after trimming; anything else
    /// is a question.
    pub fn parse(line: &str) -> Self {
        let text = line.trim();
        match text.to_lowercase().as_str() {
            "" => Command::Empty,
            "quit" | "exit" | "q" => Command::Quit,
            "help" => Command::Help,
            "refresh" => Command::Refresh,
            "list" | "pdfs" | "files" => Command::List,
            _ => Command::Question(text.to_string()),
        }
    }
}

/// Where the loop reads lines from. `None` ends the loop.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Line editor on the controlling terminal
pub struct TerminalInput {
    editor: DefaultEditor,
}

impl TerminalInput {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new()
            .map_err(|e| crate::error::PdfChatError::Io(std::io::Error::other(e.to_string())))?;
        Ok(Self { editor })
    }
}

impl LineSource for TerminalInput {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Io(e)) => Err(e.into()),
            Err(e) => Err(std::io::Error::other(e.to_string()).into()),
        }
    }
}

/// Await `fut` unless `interrupt` fires first, in which case `fut` is dropped
async fn unless_interrupted<F: Future>(fut: F, interrupt: &Notify) -> Option<F::Output> {
    tokio::select! {
        output = fut => Some(output),
        _ = interrupt.notified() => None,
    }
}

/// Run the loop until a quit command, end of input, or an interrupt.
///
/// Failures of a single command are reported to `out` and the loop goes on.
/// A notification on `interrupt` while a refresh or question is in flight
/// abandons it and ends the loop; a cancelled refresh leaves its files pending.
pub async fn run_loop<L, W>(
    input: &mut L,
    out: &mut W,
    coordinator: &IngestionCoordinator,
    session: &dyn ConversationalSession,
    interrupt: &Notify,
) -> Result<()>
where
    L: LineSource,
    W: Write,
{
    writeln!(out, "Chat with your PDFs. Type 'help' for commands, 'quit' to exit.")?;

    loop {
        let Some(line) = input.read_line(PROMPT)? else {
            writeln!(out, "\nGoodbye!")?;
            break;
        };

        match Command::parse(&line) {
            Command::Quit => {
                writeln!(out, "Goodbye!")?;
                break;
            }
            Command::Help => print_help(out)?,
            Command::Empty => writeln!(out, "Please enter a question, or 'help' for commands.")?,
            Command::Refresh => {
                let Some(outcome) =
                    unless_interrupted(coordinator.ingest_new_documents(), interrupt).await
                else {
                    writeln!(out, "\nGoodbye!")?;
                    break;
                };
                match outcome {
                    Ok(report) if report.count() == 0 => writeln!(out, "No new PDFs to process.")?,
                    Ok(report) => {
                        writeln!(out, "Processed {} new PDF(s).", report.count())?;
                        for name in &report.move_failures {
                            writeln!(
                                out,
                                "  {} was indexed but could not be moved; it will be retried.",
                                name
                            )?;
                        }
                    }
                    Err(e) => writeln!(out, "Error processing PDFs: {}", e)?,
                }
            }
            Command::List => match coordinator.processed_documents() {
                Ok(names) if names.is_empty() => writeln!(out, "No processed PDFs yet.")?,
                Ok(names) => {
                    writeln!(out, "Processed PDFs ({}):", names.len())?;
                    for name in names {
                        writeln!(out, "  - {}", name)?;
                    }
                }
                Err(e) => writeln!(out, "Could not list PDFs: {}", e)?,
            },
            Command::Question(text) => {
                let Some(outcome) =
                    unless_interrupted(session.respond(&text), interrupt).await
                else {
                    writeln!(out, "\nGoodbye!")?;
                    break;
                };
                match outcome {
                    Ok(answer) => writeln!(out, "\nAssistant: {}\n", answer)?,
                    Err(e) => writeln!(out, "Error: {}", e)?,
                }
            }
        }
        out.flush()?;
    }

    Ok(())
}

fn print_help<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "Commands:")?;
    writeln!(out, "  help              Show this help")?;
    writeln!(out, "  refresh           Ingest PDFs added to the input folder")?;
    writeln!(out, "  list, pdfs, files List processed PDFs")?;
    writeln!(out, "  quit, exit, q     Leave the chat")?;
    writeln!(out, "Anything else is sent as a question about your PDFs.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PdfChatError;
    use crate::library::coordinator::tests::{Library, RecordingStore};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct ScriptedInput(VecDeque<String>);

    impl ScriptedInput {
        fn new(lines: &[&str]) -> Self {
            Self(lines.iter().map(|s| s.to_string()).collect())
        }
    }

    impl LineSource for ScriptedInput {
        fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
            Ok(self.0.pop_front())
        }
    }

    struct RecordingSession {
        questions: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSession {
        fn new() -> Self {
            Self { questions: Mutex::new(Vec::new()), fail: false }
        }
    }

    #[async_trait]
    impl ConversationalSession for RecordingSession {
        async fn respond(&self, user_text: &str) -> Result<String> {
            self.questions.lock().unwrap().push(user_text.to_string());
            if self.fail {
                return Err(PdfChatError::Chat("model unavailable".to_string()));
            }
            Ok(format!("echo: {}", user_text))
        }
    }

    async fn run(
        lines: &[&str],
        library: &Library,
        store: Arc<RecordingStore>,
        session: &RecordingSession,
    ) -> String {
        let coordinator = IngestionCoordinator::new(&library.config, store);
        let mut input = ScriptedInput::new(lines);
        let mut out = Vec::new();
        run_loop(&mut input, &mut out, &coordinator, session, &Notify::new())
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_reserved_words() {
        assert_eq!(Command::parse("QUIT"), Command::Quit);
        assert_eq!(Command::parse(" exit "), Command::Quit);
        assert_eq!(Command::parse("q"), Command::Quit);
        assert_eq!(Command::parse("Help"), Command::Help);
        assert_eq!(Command::parse("refresh"), Command::Refresh);
        assert_eq!(Command::parse("PDFs"), Command::List);
        assert_eq!(Command::parse("files"), Command::List);
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(
            Command::parse("  list the main findings "),
            Command::Question("list the main findings".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_then_quit() {
        let library = Library::new();
        library.add("a.pdf");
        let store = Arc::new(RecordingStore::new());
        let session = RecordingSession::new();

        let lines = ["refresh", "quit", "never read"];
        let output = run(&lines, &library, store.clone(), &session).await;

        assert_eq!(store.call_count(), 1);
        assert!(session.questions.lock().unwrap().is_empty());
        assert!(output.contains("Processed 1 new PDF(s)."));
        assert!(output.trim_end().ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn test_questions_are_forwarded_and_answered() {
        let library = Library::new();
        let session = RecordingSession::new();

        let store = Arc::new(RecordingStore::new());
        let output = run(&["", "What is RAG?", "exit"], &library, store, &session).await;

        assert_eq!(*session.questions.lock().unwrap(), vec!["What is RAG?"]);
        assert!(output.contains("Please enter a question"));
        assert!(output.contains("Assistant: echo: What is RAG?"));
    }

    #[tokio::test]
    async fn test_end_of_input_ends_loop() {
        let library = Library::new();
        let session = RecordingSession::new();

        let output = run(&["help"], &library, Arc::new(RecordingStore::new()), &session).await;

        assert!(output.contains("Commands:"));
        assert!(output.trim_end().ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn test_session_error_keeps_loop_running() {
        let library = Library::new();
        let session = RecordingSession { fail: true, ..RecordingSession::new() };

        let store = Arc::new(RecordingStore::new());
        let output = run(&["first", "second", "quit"], &library, store, &session).await;

        assert_eq!(session.questions.lock().unwrap().len(), 2);
        assert_eq!(output.matches("Error: Chat error: model unavailable").count(), 2);
    }

    #[tokio::test]
    async fn test_list_shows_processed_documents() {
        let library = Library::new();
        library.add("a.pdf");
        let store = Arc::new(RecordingStore::new());
        let session = RecordingSession::new();

        let output = run(&["list", "refresh", "files", "q"], &library, store, &session).await;

        assert!(output.contains("No processed PDFs yet."));
        assert!(output.contains("Processed PDFs (1):\n  - a.pdf"));
    }

    #[tokio::test]
    async fn test_failed_refresh_is_reported() {
        let library = Library::new();
        library.add("a.pdf");
        let session = RecordingSession::new();

        let store = Arc::new(RecordingStore::failing());
        let output = run(&["refresh", "quit"], &library, store, &session).await;

        assert!(output.contains("Error processing PDFs"));
        assert_eq!(library.pending(), vec!["a.pdf"]);
    }

    #[tokio::test]
    async fn test_interrupted_refresh_removes_staging() {
        let library = Library::new();
        library.add("a.pdf");
        let store = Arc::new(RecordingStore { delay_ms: 5_000, ..RecordingStore::new() });
        let session = RecordingSession::new();
        let coordinator = IngestionCoordinator::new(&library.config, store.clone());
        let interrupt = Arc::new(Notify::new());

        let notifier = {
            let store = store.clone();
            let interrupt = interrupt.clone();
            tokio::spawn(async move {
                while store.call_count() == 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                }
                interrupt.notify_one();
            })
        };

        let mut input = ScriptedInput::new(&["refresh", "never read"]);
        let mut out = Vec::new();
        run_loop(&mut input, &mut out, &coordinator, &session, &interrupt)
            .await
            .unwrap();
        notifier.await.unwrap();
        let output = String::from_utf8(out).unwrap();

        let batch_dir = store.seen_dirs.lock().unwrap()[0].clone();
        assert!(!batch_dir.exists());
        assert!(!library.config.staging_folder.exists());
        assert_eq!(library.pending(), vec!["a.pdf"]);
        assert!(library.processed().is_empty());
        assert!(!output.contains("Processed"));
        assert!(output.trim_end().ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn test_interrupted_question_ends_loop() {
        struct StalledSession;

        #[async_trait]
        impl ConversationalSession for StalledSession {
            async fn respond(&self, _user_text: &str) -> Result<String> {
                std::future::pending().await
            }
        }

        let library = Library::new();
        let store = Arc::new(RecordingStore::new());
        let coordinator = IngestionCoordinator::new(&library.config, store);
        let interrupt = Notify::new();
        interrupt.notify_one();

        let mut input = ScriptedInput::new(&["What is RAG?", "never read"]);
        let mut out = Vec::new();
        run_loop(&mut input, &mut out, &coordinator, &StalledSession, &interrupt)
            .await
            .unwrap();
        let output = String::from_utf8(out).unwrap();

        assert!(!output.contains("Assistant:"));
        assert!(output.trim_end().ends_with("Goodbye!"));
    }
}
