//! Rendering layer: translates terminal events into controller calls and
//! draws the controller state. No chat logic lives here.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{
    DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
    EnableFocusChange, EnableMouseCapture, Event, EventStream, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use tracing::warn;
use tui_textarea::{CursorMove, TextArea};

use crate::config::ChatConfig;
use crate::conn::{Connection, ConnectionState};
use crate::controller::ChatController;
use crate::history::NavOutcome;
use crate::i18n::{Locale, Strings};
use crate::markup::{format_html, render_lines};
use crate::transcript::{FileLogStore, Role};
use crate::wire::{generate_session_id, Inbound};

struct App {
    controller: ChatController,
    conn: Arc<Connection>,
    textarea: TextArea<'static>,
    /// Scroll offset from the bottom in lines; 0 = pinned to the latest
    /// message. Clamped during render, so scroll methods mutate freely.
    scroll_offset_from_bottom: u16,
    /// Advances on a timer while a reply is pending; drives the typing
    /// indicator animation.
    typing_phase: usize,
    fail_tx: mpsc::UnboundedSender<()>,
}

pub async fn run_tui(config: ChatConfig, locale: Locale) -> anyhow::Result<()> {
    let session_id = generate_session_id();
    let (conn, inbound_rx) = Connection::spawn(config.connection()?, session_id);
    let store = FileLogStore::new(config.log_path.clone());
    let controller = ChatController::new(Box::new(store), locale);

    let (fail_tx, fail_rx) = mpsc::unbounded_channel();
    let conn = Arc::new(conn);
    let app = App::new(controller, conn.clone(), fail_tx);

    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableFocusChange,
        EnableBracketedPaste
    )?;
    enable_raw_mode()?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, inbound_rx, fail_rx).await;

    conn.shutdown();
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        DisableFocusChange,
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    mut inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    mut fail_rx: mpsc::UnboundedReceiver<()>,
) -> io::Result<()> {
    let mut state_rx = app.conn.watch_state();
    let mut watch_alive = true;
    let mut reader = EventStream::new();
    let mut tick = tokio::time::interval(Duration::from_millis(250));

    loop {
        terminal.draw(|f| draw(f, &mut app))?;

        tokio::select! {
            Some(inbound) = inbound_rx.recv() => {
                app.controller.on_inbound(inbound);
                app.scroll_offset_from_bottom = 0;
            }
            Some(()) = fail_rx.recv() => {
                app.controller.on_send_failure();
                app.scroll_offset_from_bottom = 0;
            }
            _ = tick.tick() => {
                if app.controller.is_sending() {
                    app.typing_phase = app.typing_phase.wrapping_add(1);
                }
            }
            changed = state_rx.changed(), if watch_alive => {
                // A state change only needs a redraw; the label is computed
                // from the state during draw.
                if changed.is_err() {
                    watch_alive = false;
                }
            }
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(event)) => {
                        if app.handle_event(event) {
                            return Ok(());
                        }
                    }
                    Some(Err(err)) => return Err(err),
                    None => return Ok(()),
                }
            }
        }
    }
}

impl App {
    fn new(
        controller: ChatController,
        conn: Arc<Connection>,
        fail_tx: mpsc::UnboundedSender<()>,
    ) -> Self {
        let mut app = Self {
            controller,
            conn,
            textarea: TextArea::default(),
            scroll_offset_from_bottom: 0,
            typing_phase: 0,
            fail_tx,
        };
        app.set_buffer("");
        app
    }

    /// Returns true when the app should exit.
    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key),
            Event::Mouse(mouse) => {
                match mouse.kind {
                    MouseEventKind::ScrollUp => self.scroll_up(1),
                    MouseEventKind::ScrollDown => self.scroll_down(1),
                    _ => {}
                }
                false
            }
            Event::Paste(text) => {
                self.textarea.insert_str(text);
                false
            }
            Event::FocusGained => {
                if self.conn.state() != ConnectionState::Connected {
                    self.conn.nudge();
                }
                false
            }
            _ => false,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('q') | KeyCode::Char('c') => return true,
                KeyCode::Char('l') => {
                    let next = self.controller.language().toggled();
                    if self.controller.switch_language(next) {
                        self.textarea
                            .set_placeholder_text(self.controller.strings().placeholder);
                    }
                    return false;
                }
                KeyCode::Char('j') => {
                    self.textarea.insert_newline();
                    return false;
                }
                _ => {}
            }
        }
        match key.code {
            KeyCode::Enter => self.send(),
            KeyCode::Up => self.navigate(-1),
            KeyCode::Down => self.navigate(1),
            KeyCode::Esc => self.set_buffer(""),
            KeyCode::PageUp => self.scroll_up(10),
            KeyCode::PageDown => self.scroll_down(10),
            _ => {
                self.textarea.input(key);
            }
        }
        false
    }

    fn send(&mut self) {
        let buffer = self.textarea.lines().join("\n");
        let Some(text) = self.controller.submit(&buffer) else {
            return;
        };
        self.set_buffer("");
        self.scroll_offset_from_bottom = 0;
        self.typing_phase = 0;

        let conn = self.conn.clone();
        let fail_tx = self.fail_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = conn.send(&text).await {
                warn!(error = %err, "send failed");
                let _ = fail_tx.send(());
            }
        });
    }

    fn navigate(&mut self, direction: i32) {
        match self.controller.navigate_history(direction) {
            NavOutcome::Recall(text) => self.set_buffer(&text),
            NavOutcome::Compose => self.set_buffer(""),
            NavOutcome::Unchanged => {}
        }
    }

    fn set_buffer(&mut self, content: &str) {
        let mut textarea = if content.is_empty() {
            TextArea::default()
        } else {
            TextArea::new(content.lines().map(str::to_string).collect())
        };
        textarea.set_block(
            Block::default()
                .borders(Borders::TOP | Borders::BOTTOM)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        textarea.set_placeholder_text(self.controller.strings().placeholder);
        textarea.move_cursor(CursorMove::Bottom);
        textarea.move_cursor(CursorMove::End);
        self.textarea = textarea;
    }

    fn scroll_up(&mut self, lines: u16) {
        self.scroll_offset_from_bottom = self.scroll_offset_from_bottom.saturating_add(lines);
    }

    fn scroll_down(&mut self, lines: u16) {
        self.scroll_offset_from_bottom = self.scroll_offset_from_bottom.saturating_sub(lines);
    }
}

fn draw(f: &mut Frame, app: &mut App) {
    let strings = app.controller.strings();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(4),
        ])
        .split(f.area());

    let state = app.conn.state();
    let dot_color = match state {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Connecting => Color::Yellow,
        ConnectionState::Disconnected => Color::Red,
    };
    let status = Line::from(vec![
        Span::styled("● ", Style::default().fg(dot_color)),
        Span::styled(strings.title, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::raw(strings.status(state)),
        Span::raw("  "),
        Span::styled(strings.help, Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(status), chunks[0]);

    let mut lines: Vec<Line> = Vec::new();
    for message in app.controller.messages() {
        let (label, style) = match message.role {
            Role::User => (
                strings.role_user,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Role::Assistant => (
                strings.role_assistant,
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
            Role::Error => (
                strings.role_error,
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
        };
        lines.push(Line::from(Span::styled(label.to_string(), style)));
        lines.extend(render_lines(&format_html(&message.content)));
        lines.push(Line::default());
    }
    if app.controller.is_sending() {
        lines.push(typing_indicator_line(strings, app.typing_phase));
    }

    let viewport = chunks[1].height;
    let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    let max_offset = total.saturating_sub(viewport);
    if app.scroll_offset_from_bottom > max_offset {
        app.scroll_offset_from_bottom = max_offset;
    }
    let scroll_y = max_offset - app.scroll_offset_from_bottom;
    f.render_widget(Paragraph::new(lines).scroll((scroll_y, 0)), chunks[1]);

    f.render_widget(&app.textarea, chunks[2]);
}

/// The pending-reply line; the dot count cycles with the tick phase.
fn typing_indicator_line(strings: &'static Strings, phase: usize) -> Line<'static> {
    const DOTS: [&str; 3] = ["·", "· ·", "· · ·"];
    Line::from(Span::styled(
        format!("{} {}", strings.typing, DOTS[phase % DOTS.len()]),
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::{strings, Lang};

    #[test]
    fn typing_indicator_cycles_with_the_phase() {
        let en = strings(Lang::En);
        let rendered: Vec<String> = (0..4)
            .map(|phase| {
                typing_indicator_line(en, phase)
                    .spans
                    .iter()
                    .map(|span| span.content.clone().into_owned())
                    .collect()
            })
            .collect();
        assert_eq!(rendered[0], format!("{} ·", en.typing));
        assert_eq!(rendered[1], format!("{} · ·", en.typing));
        assert_eq!(rendered[2], format!("{} · · ·", en.typing));
        // Wraps back to a single dot.
        assert_eq!(rendered[3], rendered[0]);
    }
}
