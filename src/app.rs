use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind};
use crossterm::{execute, event::EnableMouseCapture, event::DisableMouseCapture};
use parking_lot::Mutex;
use ratatui::{DefaultTerminal, Frame};
use ratatui::layout::{Layout, Direction, Constraint};
use ratatui::widgets::Paragraph;
use ratatui::style::{Style, Color};
use ratatui::text::{Span, Line};
use tracing::{info, warn};

use crate::cli::Settings;
use crate::core::export::save_csv;
use crate::core::process::ProcessDirectory;
use crate::core::table::{AddressMode, Column, ConnectionTable, PortMode, ResetListener};
use crate::widgets::{ConnectionTableWidget, SummaryWidget};

/// Counts completed table resets for the status bar.
struct ResetCounter(Arc<AtomicUsize>);

impl ResetListener for ResetCounter {
    fn begin_reset(&mut self) {}

    fn end_reset(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

struct PendingKill {
    pid: u32,
    name: String,
}

pub struct App {
    pub table_widget: ConnectionTableWidget,
    pub summary_widget: SummaryWidget,
    pub table: Arc<Mutex<ConnectionTable>>,
    processes: ProcessDirectory,
    resets: Arc<AtomicUsize>,
    output: PathBuf,
    pending_kill: Option<PendingKill>,
    message: Option<String>,
    pub exit: bool,
    pub paused: bool,
    pub last_tick: Instant,
    pub tick_rate: Duration,
    pub mouse_enabled: bool,
}

impl App {
    pub fn new(mut table: ConnectionTable, settings: &Settings) -> Self {
        let resets = Arc::new(AtomicUsize::new(0));
        table.subscribe(Box::new(ResetCounter(Arc::clone(&resets))));

        let table = Arc::new(Mutex::new(table));

        App {
            table_widget: ConnectionTableWidget::new(Arc::clone(&table)),
            summary_widget: SummaryWidget::new(Arc::clone(&table)),
            table,
            processes: ProcessDirectory::new(),
            resets,
            output: settings.output.clone(),
            pending_kill: None,
            message: None,
            exit: false,
            paused: false,
            last_tick: Instant::now(),
            tick_rate: settings.refresh_interval,
            mouse_enabled: false,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> io::Result<()> {
        if let Ok(()) = execute!(
            std::io::stdout(),
            EnableMouseCapture
        ) {
            self.mouse_enabled = true;
        }

        let result = self.run_loop(terminal);

        if self.mouse_enabled {
            let _ = execute!(
                std::io::stdout(),
                DisableMouseCapture
            );
        }

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> io::Result<()> {
        while !self.exit {
            let timeout = self.tick_rate
                .checked_sub(self.last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            if crossterm::event::poll(timeout)? {
                self.handle_events()?;
            }

            if self.last_tick.elapsed() >= self.tick_rate {
                self.tick();
                self.last_tick = Instant::now();
            }

            terminal.draw(|frame| self.draw(frame))?;
        }
        Ok(())
    }

    fn ticking(&self) -> bool {
        !self.paused && self.pending_kill.is_none()
    }

    fn tick(&mut self) {
        if self.ticking() {
            self.refresh_table();
        }
    }

    /// Refreshes and keeps the selection on the same connection when it survives.
    fn refresh_table(&mut self) {
        let mut table = self.table.lock();
        let selected_key = self.table_widget
            .selected()
            .and_then(|row| table.row(row))
            .map(|row| row.key);

        if let Err(err) = table.refresh() {
            warn!(error = %err, "refresh failed");
            self.message = Some(err.to_string());
            return;
        }

        let total_rows = table.row_count();
        match selected_key.and_then(|key| table.position_of(key)) {
            Some(row) => self.table_widget.select(Some(row), total_rows),
            None => {
                let row = self.table_widget.selected();
                self.table_widget.select(row, total_rows);
            }
        }
    }

    fn row_count(&self) -> usize {
        self.table.lock().row_count()
    }

    fn draw(&self, frame: &mut Frame) {
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),      // Table + summary
                Constraint::Length(1),   // Status bar
            ])
            .split(frame.area());

        let top_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Min(40),     // Connection table
                Constraint::Length(28),  // Summary
            ])
            .split(main_chunks[0]);

        frame.render_widget(&self.table_widget, top_chunks[0]);
        frame.render_widget(&self.summary_widget, top_chunks[1]);

        frame.render_widget(Paragraph::new(self.status_line()), main_chunks[1]);
    }

    fn status_line(&self) -> Line<'static> {
        let mut status_text = Vec::new();

        if let Some(kill) = &self.pending_kill {
            status_text.push(Span::styled(
                format!("Terminate {} (PID {})? ", kill.name, kill.pid),
                Style::default().fg(Color::Red),
            ));
            status_text.push(Span::styled("y", Style::default().fg(Color::Green)));
            status_text.push(Span::raw(": Yes "));
            status_text.push(Span::styled("n", Style::default().fg(Color::Green)));
            status_text.push(Span::raw(": No"));
            return Line::from(status_text);
        }

        if let Some(message) = &self.message {
            status_text.push(Span::styled(message.clone(), Style::default().fg(Color::Yellow)));
            status_text.push(Span::raw(" | "));
        }

        let state = if self.paused { "Paused" } else { "Live" };
        status_text.push(Span::styled(
            format!("{} #{}", state, self.resets.load(Ordering::Relaxed)),
            Style::default().fg(Color::Cyan),
        ));
        status_text.push(Span::raw(" | "));

        let bindings = [
            ("1-8", "Sort"),
            ("d", "Hosts"),
            ("s", "Services"),
            ("e", "Export"),
            ("k", "Kill"),
            ("p", "Pause"),
            ("q", "Quit"),
        ];
        for (key, label) in bindings {
            status_text.push(Span::styled(key, Style::default().fg(Color::Green)));
            status_text.push(Span::raw(format!(": {} ", label)));
        }

        Line::from(status_text)
    }

    fn handle_events(&mut self) -> io::Result<()> {
        match event::read()? {
            Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                self.handle_key_event(key_event)
            }
            Event::Mouse(mouse_event) => {
                self.handle_mouse_event(mouse_event)
            }
            _ => {}
        };
        Ok(())
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) {
        if self.pending_kill.is_some() {
            match key_event.code {
                KeyCode::Char('y') => self.confirm_kill(),
                KeyCode::Char('n') | KeyCode::Esc => self.pending_kill = None,
                _ => {}
            }
            return;
        }

        let total_rows = self.row_count();
        let page = self.table_widget.page_size();

        match key_event.code {
            KeyCode::Char('q') | KeyCode::Esc => self.exit(),
            KeyCode::Char(digit @ '1'..='8') => {
                let index = digit as usize - '1' as usize;
                if let Some(column) = Column::from_index(index) {
                    self.table.lock().sort_by(column);
                }
            }
            KeyCode::Char('d') => self.toggle_names(),
            KeyCode::Char('s') => self.toggle_services(),
            KeyCode::Char('e') => self.export(),
            KeyCode::Char('k') => self.request_kill(),
            KeyCode::Char('p') => self.paused = !self.paused,
            KeyCode::Up => self.table_widget.select_up(1, total_rows),
            KeyCode::Down => self.table_widget.select_down(1, total_rows),
            KeyCode::PageUp => self.table_widget.select_up(page, total_rows),
            KeyCode::PageDown => self.table_widget.select_down(page, total_rows),
            KeyCode::Home => self.table_widget.select_first(total_rows),
            KeyCode::End => self.table_widget.select_last(total_rows),
            _ => {}
        }
    }

    fn handle_mouse_event(&mut self, mouse_event: MouseEvent) {
        if !self.mouse_enabled {
            return;
        }

        let total_rows = self.row_count();
        match mouse_event.kind {
            MouseEventKind::ScrollUp => {
                self.table_widget.select_up(3, total_rows);
            }
            MouseEventKind::ScrollDown => {
                self.table_widget.select_down(3, total_rows);
            }
            _ => {}
        }
    }

    fn toggle_names(&mut self) {
        let mode = self.table.lock().toggle_name_resolution();
        self.message = Some(match mode {
            AddressMode::Numeric => "Showing addresses".to_string(),
            AddressMode::DomainName => "Showing host names".to_string(),
        });
    }

    fn toggle_services(&mut self) {
        let mode = self.table.lock().toggle_service_names();
        self.message = Some(match mode {
            PortMode::Numeric => "Showing port numbers".to_string(),
            PortMode::ServiceName => "Showing service names".to_string(),
        });
    }

    fn export(&mut self) {
        let result = save_csv(&self.table.lock(), &self.output);
        self.message = Some(match result {
            Ok(()) => format!("Saved {}", self.output.display()),
            Err(err) => format!("Export failed: {}", err),
        });
    }

    fn request_kill(&mut self) {
        let table = self.table.lock();
        let target = self.table_widget.selected().and_then(|row| {
            Some(PendingKill {
                pid: table.pid(row)?,
                name: table.process_name(row)?.to_string(),
            })
        });
        drop(table);

        if target.is_none() {
            self.message = Some("Select a row first".to_string());
        }
        self.pending_kill = target;
    }

    fn confirm_kill(&mut self) {
        let Some(kill) = self.pending_kill.take() else {
            return;
        };

        self.message = Some(match self.processes.terminate(kill.pid) {
            Ok(()) => {
                info!(pid = kill.pid, name = %kill.name, "terminated process");
                format!("Terminated {} (PID {})", kill.name, kill.pid)
            }
            Err(err) => err.to_string(),
        });
        // The tick was held while the prompt was open.
        self.last_tick = Instant::now()
            .checked_sub(self.tick_rate)
            .unwrap_or_else(Instant::now);
    }

    fn exit(&mut self) {
        self.exit = true
    }
}
