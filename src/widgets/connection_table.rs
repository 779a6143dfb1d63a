use std::sync::Arc;

use parking_lot::Mutex;
use ratatui::{
    buffer::Buffer,
    layout::{Rect, Constraint},
    style::{Stylize, Style, Color, Modifier},
    widgets::{Block, Table, Row, Cell, Widget, BorderType},
};

use crate::core::table::{Column, ConnectionTable, RowStyle};

pub struct ConnectionTableWidget {
    table: Arc<Mutex<ConnectionTable>>,
    selected: Option<usize>,
    scroll_offset: usize,
    visible_rows: std::cell::Cell<usize>,  // Written on each render
}

impl ConnectionTableWidget {
    pub fn new(table: Arc<Mutex<ConnectionTable>>) -> Self {
        Self {
            table,
            selected: None,
            scroll_offset: 0,
            visible_rows: std::cell::Cell::new(15),
        }
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Selects `row` (clamped to the table) and scrolls it into view.
    pub fn select(&mut self, row: Option<usize>, total_rows: usize) {
        self.selected = match row {
            Some(_) if total_rows == 0 => None,
            Some(row) => Some(row.min(total_rows - 1)),
            None => None,
        };
        self.scroll_into_view(total_rows);
    }

    pub fn select_up(&mut self, amount: usize, total_rows: usize) {
        let row = self.selected.map_or(0, |row| row.saturating_sub(amount));
        self.select(Some(row), total_rows);
    }

    pub fn select_down(&mut self, amount: usize, total_rows: usize) {
        let row = self.selected.map_or(0, |row| row + amount);
        self.select(Some(row), total_rows);
    }

    pub fn select_first(&mut self, total_rows: usize) {
        self.select(Some(0), total_rows);
    }

    pub fn select_last(&mut self, total_rows: usize) {
        self.select(Some(total_rows.saturating_sub(1)), total_rows);
    }

    pub fn page_size(&self) -> usize {
        self.visible_rows.get().max(1)
    }

    fn scroll_into_view(&mut self, total_rows: usize) {
        let visible_rows = self.page_size();
        let max_scroll = total_rows.saturating_sub(visible_rows);

        if let Some(row) = self.selected {
            if row < self.scroll_offset {
                self.scroll_offset = row;
            } else if row >= self.scroll_offset + visible_rows {
                self.scroll_offset = row + 1 - visible_rows;
            }
        }
        self.scroll_offset = self.scroll_offset.min(max_scroll);
    }
}

fn row_colors(style: RowStyle) -> Style {
    match style {
        RowStyle::New => Style::new().fg(Color::Green),
        RowStyle::Updated => Style::new().fg(Color::Yellow),
        RowStyle::Deleted => Style::new().fg(Color::Red).add_modifier(Modifier::CROSSED_OUT),
        RowStyle::Neutral => Style::new(),
    }
}

impl Widget for &ConnectionTableWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let table = self.table.lock();

        let content_height = area.height.saturating_sub(4);
        let visible_rows = content_height as usize;
        self.visible_rows.set(visible_rows);
        let total_rows = table.row_count();

        let start_idx = self.scroll_offset.min(total_rows);
        let end_idx = (start_idx + visible_rows).min(total_rows);

        let rows: Vec<Row> = (start_idx..end_idx).map(|index| {
            let mut style = row_colors(table.row_style(index));
            if self.selected == Some(index) {
                style = style.add_modifier(Modifier::REVERSED);
            }

            let cells: Vec<Cell> = Column::ALL.iter()
                .map(|&column| Cell::from(table.cell(index, column).unwrap_or_default()))
                .collect();
            Row::new(cells).style(style)
        }).collect();

        let widths = [
            Constraint::Percentage(16),  // Process
            Constraint::Percentage(7),   // PID
            Constraint::Percentage(7),   // Protocol
            Constraint::Percentage(20),  // Local Address
            Constraint::Percentage(8),   // Local Port
            Constraint::Percentage(22),  // Remote Address
            Constraint::Percentage(8),   // Remote Port
            Constraint::Percentage(12),  // Status
        ];

        let header: Vec<String> = Column::ALL.iter()
            .map(|&column| table.header(column))
            .collect();

        let title = format!("Connections ({}/{})", end_idx, total_rows);

        let widget = Table::new(rows, widths)
            .header(
                Row::new(header)
                    .style(Style::new().bold().fg(Color::White))
                    .bottom_margin(1)
            )
            .block(
                Block::bordered()
                    .title(title)
                    .title_style(Style::new().bold().fg(Color::Cyan))
                    .border_type(BorderType::Plain)
                    .border_style(Style::new().fg(Color::Blue))
            );

        widget.render(area, buf);
    }
}
