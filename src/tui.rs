#![cfg(feature = "tui")]

use crate::chat::{self, TurnOptions};
use crate::credential::ApiKey;
use crate::provider::Provider;
use crate::session::{Conversation, Exchange, Role, StreamSink};
use crate::{app, cli, config};
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

const HELP: &str = "Commands: /key <value>, /model <name>, /clear, /quit";

#[derive(Debug)]
enum StreamMsg {
    /// Full accumulated text so far.
    Live(String),
    Complete(Exchange),
    Failed(String),
}

/// One in-flight submission. Rendered from here while streaming; folded into
/// the conversation only on `Complete`.
struct Pending {
    user_text: String,
    live: String,
    rx: mpsc::UnboundedReceiver<StreamMsg>,
}

struct Ui {
    conversation: Conversation,
    input: String,
    raw_key: String,
    model: String,
    system_prompt: Option<String>,
    temperature: f32,
    notice: Option<String>,
    pending: Option<Pending>,
}

pub async fn run_tui(
    http: &reqwest::Client,
    cfg: Option<&config::Config>,
    args: &cli::Args,
) -> anyhow::Result<()> {
    let provider_name = args
        .provider
        .clone()
        .or_else(|| cfg.and_then(|c| c.provider.clone()))
        .unwrap_or_else(|| "openai".to_string());
    let provider: Arc<dyn Provider + Send + Sync> =
        Arc::from(app::build_provider(http, cfg, &provider_name)?);

    let base = app::turn_options(args.model.clone(), cfg);
    let raw_key = app::resolve_api_key(args.api_key.as_deref(), cfg).unwrap_or_default();

    let mut ui = Ui {
        conversation: Conversation::new(),
        input: String::new(),
        raw_key,
        model: base.model,
        system_prompt: base.system_prompt,
        temperature: base.temperature,
        notice: None,
        pending: None,
    };

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || loop {
        match crossterm::event::read() {
            Ok(ev) => {
                if ev_tx.send(ev).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = draw(&mut terminal, &ui) {
                    break Err(e);
                }
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    if handle_key(key, &mut ui, &provider) {
                        break Ok(());
                    }
                }
            }
            Some(msg) = async {
                match &mut ui.pending {
                    Some(p) => p.rx.recv().await,
                    None => None,
                }
            } => {
                match msg {
                    StreamMsg::Live(text) => {
                        if let Some(p) = &mut ui.pending {
                            p.live = text;
                        }
                    }
                    StreamMsg::Complete(exchange) => {
                        ui.conversation.commit(exchange);
                        ui.pending = None;
                    }
                    StreamMsg::Failed(e) => {
                        // Partial text is discarded; the conversation stays
                        // as it was before the submission.
                        ui.pending = None;
                        ui.notice = Some(e);
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

/// Returns true when the UI should exit.
fn handle_key(key: KeyEvent, ui: &mut Ui, provider: &Arc<dyn Provider + Send + Sync>) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match key.code {
        KeyCode::Esc => return true,
        KeyCode::Char(c) => ui.input.push(c),
        KeyCode::Backspace => {
            ui.input.pop();
        }
        KeyCode::Enter => {
            let msg = ui.input.trim().to_string();
            ui.input.clear();
            if msg.is_empty() {
                return false;
            }

            if msg == "/quit" {
                return true;
            }
            if msg == "/clear" {
                // Dropping the pending receiver also stops any in-flight
                // stream task, so nothing lands after the clear.
                ui.conversation.clear();
                ui.pending = None;
                ui.notice = Some("conversation cleared".to_string());
                return false;
            }
            if let Some(rest) = msg.strip_prefix("/key ") {
                ui.raw_key = rest.trim().to_string();
                ui.notice = match ApiKey::parse(&ui.raw_key) {
                    Ok(_) => Some("API key set".to_string()),
                    Err(e) => Some(format!("warning: {e}")),
                };
                return false;
            }
            if let Some(rest) = msg.strip_prefix("/model ") {
                ui.model = rest.trim().to_string();
                ui.notice = Some(format!("model set to: {}", ui.model));
                return false;
            }

            if ui.pending.is_some() {
                ui.notice = Some("(streaming in progress; wait for completion)".to_string());
                return false;
            }

            let api_key = match ApiKey::parse(&ui.raw_key) {
                Ok(k) => k,
                Err(e) => {
                    ui.notice = Some(format!("warning: {e}; set one with /key <value>"));
                    return false;
                }
            };

            let opts = TurnOptions {
                model: ui.model.clone(),
                system_prompt: ui.system_prompt.clone(),
                temperature: ui.temperature,
            };
            let history = ui.conversation.snapshot().to_vec();
            let provider = Arc::clone(provider);
            let (tx, rx) = mpsc::unbounded_channel::<StreamMsg>();
            ui.pending = Some(Pending {
                user_text: msg.clone(),
                live: String::new(),
                rx,
            });
            ui.notice = None;

            tokio::spawn(async move {
                let live_tx = tx.clone();
                let mut sink = StreamSink::new(String::new(), move |full: &str| {
                    let _ = live_tx.send(StreamMsg::Live(full.to_string()));
                });
                match chat::run_turn(provider.as_ref(), &api_key, &opts, &history, &msg, &mut sink)
                    .await
                {
                    Ok(exchange) => {
                        let _ = tx.send(StreamMsg::Complete(exchange));
                    }
                    Err(e) => {
                        let _ = tx.send(StreamMsg::Failed(e.to_string()));
                    }
                }
            });
        }
        _ => {}
    }

    false
}

fn draw(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, ui: &Ui) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(1),
                Constraint::Length(3),
            ])
            .split(f.area());

        let mut text = Text::default();
        for turn in ui.conversation.snapshot() {
            push_block(&mut text, turn.role.as_str(), &turn.content);
        }
        if let Some(p) = &ui.pending {
            push_block(&mut text, Role::User.as_str(), &p.user_text);
            let live = if p.live.is_empty() { "…" } else { p.live.as_str() };
            push_block(&mut text, Role::Assistant.as_str(), live);
        }

        let chat_pane = Paragraph::new(text)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("chatbot (model: {})", ui.model)),
            )
            .wrap(Wrap { trim: false });

        let status_w = Paragraph::new(status_line(ui));
        let input_w =
            Paragraph::new(ui.input.clone()).block(Block::default().borders(Borders::ALL).title("input"));

        f.render_widget(chat_pane, chunks[0]);
        f.render_widget(status_w, chunks[1]);
        f.render_widget(input_w, chunks[2]);

        let x = chunks[2].x + 1 + ui.input.chars().count() as u16;
        let y = chunks[2].y + 1;
        f.set_cursor_position((x.min(chunks[2].x + chunks[2].width.saturating_sub(2)), y));
    })?;
    Ok(())
}

fn push_block(text: &mut Text<'_>, role: &str, content: &str) {
    let style = match role {
        "user" => Style::default().add_modifier(Modifier::BOLD),
        _ => Style::default(),
    };
    text.lines.push(Line::styled(format!("{role}:"), style));
    text.lines.extend(Text::from(content.to_string()).lines);
    text.lines.push(Line::from(""));
}

fn status_line(ui: &Ui) -> String {
    if ApiKey::parse(&ui.raw_key).is_err() {
        return format!("warning: enter your API key with /key <value> (expected \"sk-\" prefix). {HELP}");
    }
    match &ui.notice {
        Some(notice) => notice.clone(),
        None => HELP.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::stub::StubProvider;
    use crate::session::Turn;

    fn test_ui(raw_key: &str) -> Ui {
        Ui {
            conversation: Conversation::new(),
            input: String::new(),
            raw_key: raw_key.to_string(),
            model: "test-model".to_string(),
            system_prompt: None,
            temperature: 0.0,
            notice: None,
            pending: None,
        }
    }

    fn enter() -> KeyEvent {
        KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)
    }

    #[tokio::test]
    async fn invalid_key_blocks_submission_with_warning() {
        let stub = StubProvider::with_fragments(["never sent"]);
        let provider: Arc<dyn Provider + Send + Sync> = Arc::new(stub.clone());

        let mut ui = test_ui("not-a-key");
        ui.input = "Hi".to_string();

        assert!(!handle_key(enter(), &mut ui, &provider));
        assert!(ui.pending.is_none());
        assert!(ui.conversation.is_empty());
        assert_eq!(stub.calls(), 0);
        assert!(ui.notice.as_deref().unwrap_or_default().contains("sk-"));
    }

    #[tokio::test]
    async fn clear_empties_conversation_and_drops_pending() {
        let stub = StubProvider::with_fragments(["x"]);
        let provider: Arc<dyn Provider + Send + Sync> = Arc::new(stub);

        let mut ui = test_ui("sk-test");
        ui.conversation.append(Turn::user("a"));
        ui.conversation.append(Turn::assistant("b"));
        ui.input = "/clear".to_string();

        assert!(!handle_key(enter(), &mut ui, &provider));
        assert!(ui.conversation.is_empty());
        assert!(ui.pending.is_none());
        assert!(ui.input.is_empty());
    }

    #[tokio::test]
    async fn key_command_updates_credential() {
        let provider: Arc<dyn Provider + Send + Sync> =
            Arc::new(StubProvider::with_fragments(["x"]));

        let mut ui = test_ui("");
        ui.input = "/key sk-fresh".to_string();
        assert!(!handle_key(enter(), &mut ui, &provider));
        assert_eq!(ui.raw_key, "sk-fresh");
        assert_eq!(ui.notice.as_deref(), Some("API key set"));

        ui.input = "/key nope".to_string();
        assert!(!handle_key(enter(), &mut ui, &provider));
        assert!(ui.notice.as_deref().unwrap_or_default().starts_with("warning:"));
    }

    #[tokio::test]
    async fn submission_streams_live_then_commits() {
        let stub = StubProvider::with_fragments(["Hello", " there"]);
        let provider: Arc<dyn Provider + Send + Sync> = Arc::new(stub.clone());

        let mut ui = test_ui("sk-test");
        ui.input = "Hi".to_string();
        assert!(!handle_key(enter(), &mut ui, &provider));
        assert_eq!(stub.calls(), 1);

        let mut pending = ui.pending.take().expect("submission staged");
        assert_eq!(pending.user_text, "Hi");

        let mut last_live = String::new();
        loop {
            match pending.rx.recv().await.expect("stream task reports") {
                StreamMsg::Live(text) => last_live = text,
                StreamMsg::Complete(exchange) => {
                    ui.conversation.commit(exchange);
                    break;
                }
                StreamMsg::Failed(e) => panic!("unexpected failure: {e}"),
            }
        }

        assert_eq!(last_live, "Hello there");
        assert_eq!(
            ui.conversation.snapshot(),
            &[Turn::user("Hi"), Turn::assistant("Hello there")]
        );
    }

    #[tokio::test]
    async fn failed_stream_reports_error_and_commits_nothing() {
        let stub = StubProvider::failing_after(["par"], "boom");
        let provider: Arc<dyn Provider + Send + Sync> = Arc::new(stub);

        let mut ui = test_ui("sk-test");
        ui.input = "Hi".to_string();
        assert!(!handle_key(enter(), &mut ui, &provider));

        let mut pending = ui.pending.take().expect("submission staged");
        let failure = loop {
            match pending.rx.recv().await.expect("stream task reports") {
                StreamMsg::Live(_) => {}
                StreamMsg::Complete(_) => panic!("stream should fail"),
                StreamMsg::Failed(e) => break e,
            }
        };

        assert!(failure.contains("boom"));
        assert!(ui.conversation.is_empty());
    }
}
