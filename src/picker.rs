use std::io;
use std::panic;
use std::sync::Arc;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Terminal,
};

use workstate::models::Candidate;

struct Picker<'a> {
    title: &'a str,
    items: &'a [Candidate],
    state: ListState,
}

impl<'a> Picker<'a> {
    fn new(title: &'a str, items: &'a [Candidate]) -> Self {
        let mut state = ListState::default();
        state.select(Some(0));
        Self { title, items, state }
    }

    fn next(&mut self) {
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.items.len() => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    fn previous(&mut self) {
        let i = match self.state.selected() {
            Some(0) | None => self.items.len() - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    fn selected_value(&self) -> Option<String> {
        self.state
            .selected()
            .and_then(|i| self.items.get(i))
            .map(|c| c.value.clone())
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

/// Let the user choose one of `items`. `None` when cancelled or empty.
pub fn pick(title: &str, items: &[Candidate]) -> io::Result<Option<String>> {
    if items.is_empty() {
        return Ok(None);
    }

    with_terminal_hook(|| -> io::Result<Option<String>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

        let result = run(&mut terminal, Picker::new(title, items));
        restore_terminal();
        result
    })
}

/// Run `body` with a panic hook that puts the terminal back before the
/// previous hook runs. The previous hook is reinstalled afterwards.
fn with_terminal_hook<T>(body: impl FnOnce() -> T) -> T {
    let previous = Arc::new(panic::take_hook());
    let chained = Arc::clone(&previous);
    panic::set_hook(Box::new(move |info| {
        restore_terminal();
        (*chained)(info);
    }));

    let out = body();

    drop(panic::take_hook());
    if let Ok(hook) = Arc::try_unwrap(previous) {
        panic::set_hook(hook);
    }
    out
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut picker: Picker<'_>,
) -> io::Result<Option<String>> {
    loop {
        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(3), Constraint::Length(1)].as_ref())
                .split(f.size());

            let list = List::new(
                picker
                    .items
                    .iter()
                    .map(|c| ListItem::new(c.label.as_str()))
                    .collect::<Vec<_>>(),
            )
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" {} ", picker.title)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Blue)
                    .add_modifier(Modifier::BOLD),
            );
            f.render_stateful_widget(list, chunks[0], &mut picker.state);

            f.render_widget(
                Paragraph::new(" ↑/↓ or j/k to move, Enter to select, Esc or q to cancel")
                    .style(Style::default().fg(Color::DarkGray)),
                chunks[1],
            );
        })?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Down | KeyCode::Char('j') => picker.next(),
                KeyCode::Up | KeyCode::Char('k') => picker.previous(),
                KeyCode::Enter => return Ok(picker.selected_value()),
                KeyCode::Esc | KeyCode::Char('q') => return Ok(None),
                _ => {}
            }
        }
    }
}
