use std::path::PathBuf;
use std::sync::Arc;

use econ_chat_backend::create_client;
use econ_chat_render::Renderer;
use econ_chat_storage::TurnId;
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

use crate::chat::{Attachment, ChatController, FeedbackSink, Role, Turn};
use crate::settings::{AppSettings, SettingsStore};

pub const PROCESSING_NOTICE: &str = "Processing...";

const HELP: &str = "\
Type a message and press enter to send it.
  /attach <path>...      select files for the next message (replaces the selection)
  /clear-attachments     drop the current file selection
  /send                  send the current input and attachments
  /feedback <n> up|down  rate bot reply number <n>
  /history               print the conversation so far
  /endpoint <url>        save a new backend endpoint (used from the next start)
  /help                  show this help
  /quit                  leave";

/// One parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Message(String),
    Send,
    Attach(Vec<PathBuf>),
    ClearAttachments,
    Feedback { index: usize, positive: bool },
    History,
    Endpoint(String),
    Help,
    Quit,
    /// Malformed command with a usage hint.
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let Some(command) = line.trim_start().strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match (name, args.as_slice()) {
            ("quit" | "exit", []) => Self::Quit,
            ("help", []) => Self::Help,
            ("send", []) => Self::Send,
            ("history", []) => Self::History,
            ("clear-attachments", []) => Self::ClearAttachments,
            ("attach", []) => Self::Invalid("usage: /attach <path>...".to_string()),
            ("attach", paths) => Self::Attach(paths.iter().map(PathBuf::from).collect()),
            ("endpoint", [url]) => Self::Endpoint((*url).to_string()),
            ("endpoint", _) => Self::Invalid("usage: /endpoint <url>".to_string()),
            ("feedback", [index, verdict]) => {
                let positive = match verdict.to_ascii_lowercase().as_str() {
                    "up" | "+" | "yes" => Some(true),
                    "down" | "-" | "no" => Some(false),
                    _ => None,
                };
                match (index.parse::<usize>(), positive) {
                    (Ok(index), Some(positive)) => Self::Feedback { index, positive },
                    _ => Self::Invalid("usage: /feedback <n> up|down".to_string()),
                }
            }
            ("feedback", _) => Self::Invalid("usage: /feedback <n> up|down".to_string()),
            (other, _) => Self::Invalid(format!("unknown command `/{other}`, try /help")),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TerminalError {
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write terminal output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Line-oriented presentation binding over a [`ChatController`].
pub struct Terminal<F> {
    controller: ChatController,
    feedback: F,
    renderer: Renderer,
    settings: Option<Arc<SettingsStore>>,
}

impl<F: FeedbackSink> Terminal<F> {
    pub fn new(controller: ChatController, feedback: F) -> Self {
        Self {
            controller,
            feedback,
            renderer: Renderer::default(),
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: Arc<SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    /// Runs until `/quit` or end of input. A reply still in flight at end of input is awaited.
    pub async fn run<R, W>(&mut self, input: R, mut output: W) -> Result<(), TerminalError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        write_line(
            &mut output,
            "Ask a question about the economy. /help lists commands.",
        )
        .await?;

        while let Some(line) = lines.next_line().await.context(ReadInputSnafu {
            stage: "read-command-line",
        })? {
            let flow = match Command::parse(&line) {
                Command::Quit => Flow::Quit,
                Command::Message(text) => {
                    self.controller.update_input(text);
                    self.dispatch(&mut lines, &mut output).await?
                }
                Command::Send => self.dispatch(&mut lines, &mut output).await?,
                command => {
                    self.handle_local(command, &mut output).await?;
                    Flow::Continue
                }
            };
            if flow == Flow::Quit {
                break;
            }
        }

        output.flush().await.context(WriteOutputSnafu {
            stage: "flush-terminal-output",
        })
    }

    async fn dispatch<R, W>(
        &mut self,
        lines: &mut Lines<R>,
        output: &mut W,
    ) -> Result<Flow, TerminalError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(pending) = self.controller.submit() else {
            write_line(output, "Nothing to send: type a message or /attach a file.").await?;
            return Ok(Flow::Continue);
        };

        if let Some(turn) = self.controller.transcript().last()
            && !turn.attachments.is_empty()
        {
            write_line(output, &attachment_summary(&turn.attachments)).await?;
        }
        write_line(output, PROCESSING_NOTICE).await?;

        let reply = pending.wait();
        tokio::pin!(reply);
        let mut input_open = true;

        let outcome = loop {
            tokio::select! {
                biased;
                outcome = &mut reply => break outcome,
                line = lines.next_line(), if input_open => {
                    let Some(line) = line.context(ReadInputSnafu {
                        stage: "read-line-while-awaiting-reply",
                    })? else {
                        input_open = false;
                        continue;
                    };
                    match Command::parse(&line) {
                        Command::Quit => return Ok(Flow::Quit),
                        Command::Message(text) => {
                            self.controller.update_input(text);
                            write_line(
                                output,
                                "Still processing the previous message. Your input is kept; /send it once the reply arrives.",
                            )
                            .await?;
                        }
                        Command::Send => {
                            write_line(output, "Still processing the previous message.").await?;
                        }
                        command => self.handle_local(command, output).await?,
                    }
                }
            }
        };

        match self.controller.resolve(outcome) {
            Ok(turn_id) => {
                if let Some(rendered) = self.render_turn_by_id(turn_id) {
                    write_line(output, &rendered).await?;
                }
            }
            Err(rejection) => {
                tracing::warn!(?rejection, "terminal received reply for inactive request");
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_local<W>(&mut self, command: Command, output: &mut W) -> Result<(), TerminalError>
    where
        W: AsyncWrite + Unpin,
    {
        match command {
            Command::Attach(paths) => {
                let mut attachments = Vec::with_capacity(paths.len());
                for path in &paths {
                    match Attachment::from_path(path) {
                        Ok(attachment) => attachments.push(attachment),
                        Err(error) => {
                            let message = format!("Could not attach {}: {error}", path.display());
                            return write_line(output, &message).await;
                        }
                    }
                }
                let summary = attachment_summary(&attachments);
                self.controller.set_attachments(attachments);
                write_line(output, &summary).await
            }
            Command::ClearAttachments => {
                self.controller.set_attachments(Vec::new());
                write_line(output, "Attachments cleared.").await
            }
            Command::Feedback { index, positive } => {
                let turn = index
                    .checked_sub(1)
                    .and_then(|position| self.controller.transcript().get(position))
                    .filter(|turn| turn.role == Role::Bot);
                match turn {
                    Some(turn) => {
                        self.feedback.record_feedback(turn.id, positive);
                        write_line(output, "Thanks for the feedback.").await
                    }
                    None => {
                        let message = format!("Message {index} is not a bot reply.");
                        write_line(output, &message).await
                    }
                }
            }
            Command::History => {
                let mut history = Vec::with_capacity(self.controller.transcript().len());
                for (position, turn) in self.controller.transcript().iter().enumerate() {
                    history.push(self.render_turn(turn_number(position), turn));
                }
                if history.is_empty() {
                    return write_line(output, "No messages yet.").await;
                }
                write_line(output, &history.join("\n\n")).await
            }
            Command::Endpoint(endpoint) => self.save_endpoint(&endpoint, output).await,
            Command::Help => write_line(output, HELP).await,
            Command::Invalid(message) => write_line(output, &message).await,
            Command::Message(_) | Command::Send | Command::Quit => Ok(()),
        }
    }

    async fn save_endpoint<W>(&self, endpoint: &str, output: &mut W) -> Result<(), TerminalError>
    where
        W: AsyncWrite + Unpin,
    {
        let Some(settings) = &self.settings else {
            return write_line(output, "Settings are not available in this session.").await;
        };

        let mut candidate = AppSettings::clone(&settings.settings());
        candidate.endpoint = endpoint.to_string();
        if let Err(error) = create_client(candidate.normalized().backend_config()) {
            return write_line(output, &format!("Endpoint rejected: {error}")).await;
        }

        match settings.set_endpoint(endpoint) {
            Ok(saved) => {
                let message = format!(
                    "Endpoint saved as {}. It is used from the next start.",
                    saved.endpoint
                );
                write_line(output, &message).await
            }
            Err(error) => {
                tracing::warn!(%error, "failed to persist endpoint");
                write_line(output, &format!("Could not save the endpoint: {error}")).await
            }
        }
    }

    fn render_turn_by_id(&self, turn_id: TurnId) -> Option<String> {
        let transcript = self.controller.transcript();
        let position = transcript.iter().rposition(|turn| turn.id == turn_id)?;
        Some(self.render_turn(turn_number(position), &transcript[position]))
    }

    fn render_turn(&self, index: usize, turn: &Turn) -> String {
        match turn.role {
            Role::User => {
                let mut text = format!("#{index} you> {}", turn.content);
                if !turn.attachments.is_empty() {
                    text.push('\n');
                    text.push_str(&attachment_summary(&turn.attachments));
                }
                text
            }
            Role::Bot => {
                let body = self.renderer.render(&turn.content).to_plain_text();
                format!("#{index} bot>\n{body}")
            }
        }
    }
}

/// Turns are numbered from 1 in replies, /history and /feedback.
fn turn_number(position: usize) -> usize {
    position + 1
}

fn attachment_summary(attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return "No files attached.".to_string();
    }
    let mut summary = format!("{} file(s) attached\nAttachments:", attachments.len());
    for attachment in attachments {
        summary.push_str(&format!(
            "\n  - {} ({} bytes, {})",
            attachment.name, attachment.size_bytes, attachment.mime_type
        ));
    }
    summary
}

async fn write_line<W>(output: &mut W, text: &str) -> Result<(), TerminalError>
where
    W: AsyncWrite + Unpin,
{
    output
        .write_all(text.as_bytes())
        .await
        .context(WriteOutputSnafu {
            stage: "write-terminal-line",
        })?;
    output.write_all(b"\n").await.context(WriteOutputSnafu {
        stage: "write-terminal-newline",
    })?;
    output.flush().await.context(WriteOutputSnafu {
        stage: "flush-terminal-line",
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use econ_chat_backend::{BoxFuture, FetchResult, ReplyClient, ReplyRequest};
    use econ_chat_storage::SessionId;
    use tokio::io::BufReader;

    use super::*;
    use crate::chat::FeedbackLedger;
    use crate::settings::state::SETTINGS_FILE_NAME;

    struct QueueClient {
        replies: Mutex<VecDeque<String>>,
    }

    impl ReplyClient for QueueClient {
        fn endpoint(&self) -> &str {
            "memory://queue"
        }

        fn fetch_reply(&self, _request: ReplyRequest) -> BoxFuture<'static, FetchResult<String>> {
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or_default();
            Box::pin(async move { Ok(reply) })
        }
    }

    struct SlowClient {
        delay: Duration,
    }

    impl ReplyClient for SlowClient {
        fn endpoint(&self) -> &str {
            "memory://slow"
        }

        fn fetch_reply(&self, request: ReplyRequest) -> BoxFuture<'static, FetchResult<String>> {
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(format!("re: {}", request.query))
            })
        }
    }

    fn terminal(replies: &[&str]) -> Terminal<FeedbackLedger> {
        let client = Arc::new(QueueClient {
            replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
        });
        Terminal::new(
            ChatController::new(client, SessionId::new_v4()),
            FeedbackLedger::new(),
        )
    }

    async fn run_script(terminal: &mut Terminal<FeedbackLedger>, script: &str) -> String {
        let mut output = Vec::new();
        terminal
            .run(BufReader::new(script.as_bytes()), &mut output)
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(
            Command::parse("What is GDP?"),
            Command::Message("What is GDP?".to_string())
        );
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(
            Command::parse("/attach a.pdf b.csv"),
            Command::Attach(vec![PathBuf::from("a.pdf"), PathBuf::from("b.csv")])
        );
        assert_eq!(
            Command::parse("/feedback 2 DOWN"),
            Command::Feedback {
                index: 2,
                positive: false
            }
        );
        assert!(matches!(Command::parse("/feedback x up"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/endpoint"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/dance"), Command::Invalid(_)));
    }

    #[tokio::test]
    async fn message_round_trip_prints_rendered_reply_and_records_feedback() {
        let mut terminal = terminal(&["**Hi** there"]);
        let output = run_script(&mut terminal, "Hello\n/feedback 2 up\n/quit\n").await;

        assert!(output.contains(PROCESSING_NOTICE));
        assert!(output.contains("#2 bot>\nHi there"));
        assert!(output.contains("Thanks for the feedback."));

        let transcript = terminal.controller().transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(terminal.feedback().verdict(transcript[1].id), Some(true));
    }

    #[tokio::test]
    async fn feedback_on_user_turn_is_refused() {
        let mut terminal = terminal(&["reply"]);
        let output = run_script(&mut terminal, "Hello\n/feedback 1 up\n/feedback 9 down\n").await;

        assert!(output.contains("Message 1 is not a bot reply."));
        assert!(output.contains("Message 9 is not a bot reply."));
        assert!(terminal.feedback().is_empty());
    }

    #[tokio::test]
    async fn attachment_only_message_is_sent_with_send() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, vec![0u8; 10]).unwrap();

        let mut terminal = terminal(&["Got your report"]);
        let script = format!("/send\n/attach {}\n/send\n", path.display());
        let output = run_script(&mut terminal, &script).await;

        assert!(output.contains("Nothing to send"));
        assert!(output.contains("1 file(s) attached"));
        assert!(output.contains("report.pdf (10 bytes, application/pdf)"));

        let transcript = terminal.controller().transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "");
        assert_eq!(transcript[0].attachments[0].name, "report.pdf");
    }

    #[tokio::test]
    async fn whitespace_message_is_not_sent() {
        let mut terminal = terminal(&[]);
        let output = run_script(&mut terminal, "   \n").await;

        assert!(output.contains("Nothing to send"));
        assert!(terminal.controller().transcript().is_empty());
    }

    #[tokio::test]
    async fn endpoint_command_persists_valid_urls_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let settings = Arc::new(SettingsStore::new(path.clone()));

        let mut terminal = terminal(&[]).with_settings(settings.clone());
        let output = run_script(
            &mut terminal,
            "/endpoint ftp://example.com\n/endpoint http://127.0.0.1:5000/chat\n",
        )
        .await;

        assert!(output.contains("Endpoint rejected"));
        assert!(output.contains("Endpoint saved as http://127.0.0.1:5000/chat"));
        assert_eq!(
            SettingsStore::new(path).settings().endpoint,
            "http://127.0.0.1:5000/chat"
        );
    }

    #[tokio::test]
    async fn input_typed_while_awaiting_reply_is_kept_for_later() {
        let client = Arc::new(SlowClient {
            delay: Duration::from_millis(200),
        });
        let mut terminal = Terminal::new(
            ChatController::new(client, SessionId::new_v4()),
            FeedbackLedger::new(),
        );
        let output = run_script(&mut terminal, "first\nsecond\n/send\n").await;

        let contents: Vec<&str> = terminal
            .controller()
            .transcript()
            .iter()
            .map(|turn| turn.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "re: first"]);
        assert_eq!(terminal.controller().pending_input(), "second");
        assert!(!terminal.controller().is_busy());

        assert!(output.contains(
            "Still processing the previous message. Your input is kept; /send it once the reply arrives."
        ));
        assert!(output.contains("Still processing the previous message.\n"));
        assert_eq!(output.matches("Still processing").count(), 2);
        assert!(output.contains("#2 bot>\nre: first"));
    }

    #[tokio::test]
    async fn reply_and_history_share_turn_numbers() {
        let mut terminal = terminal(&["one", "two"]);
        let output = run_script(&mut terminal, "Hello\nAgain\n/history\n").await;

        assert_eq!(output.matches("#2 bot>\none").count(), 2);
        assert_eq!(output.matches("#4 bot>\ntwo").count(), 2);
        assert!(output.contains("#1 you> Hello\n\n#2 bot>\none\n\n#3 you> Again"));
    }
}
