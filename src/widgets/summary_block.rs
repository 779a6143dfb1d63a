use std::sync::Arc;
use parking_lot::Mutex;
use ratatui::{
    buffer::Buffer,
    layout::{Rect, Alignment},
    style::{Stylize, Style, Color},
    text::{Line, Span, Text},
    widgets::{Block, Paragraph, Widget, BorderType},
};

use crate::core::table::{AddressMode, ConnectionTable, PortMode};

pub struct SummaryWidget {
    table: Arc<Mutex<ConnectionTable>>,
}

impl SummaryWidget {
    pub fn new(table: Arc<Mutex<ConnectionTable>>) -> Self {
        Self { table }
    }
}

fn count_line(label: &str, value: usize) -> Line<'static> {
    Line::from(vec![
        Span::raw(format!("{}: ", label)),
        Span::styled(
            format!("{}", value),
            Style::default().fg(Color::Green).bold()
        ),
    ])
}

impl Widget for &SummaryWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let table = self.table.lock();
        let counts = table.counts();

        let addresses = match table.address_mode() {
            AddressMode::Numeric => "numeric",
            AddressMode::DomainName => "names",
        };
        let ports = match table.port_mode() {
            PortMode::Numeric => "numeric",
            PortMode::ServiceName => "services",
        };

        let text = Text::from(vec![
            count_line("Endpoints", counts.endpoints),
            count_line("Established", counts.established),
            count_line("Listen", counts.listen),
            count_line("Close wait", counts.close_wait),
            count_line("Time wait", counts.time_wait),
            Line::from(vec![
                Span::raw("Hosts: "),
                Span::styled(addresses, Style::default().fg(Color::Yellow)),
                Span::raw("  Ports: "),
                Span::styled(ports, Style::default().fg(Color::Yellow)),
            ]),
        ]);

        let paragraph = Paragraph::new(text)
            .block(
                Block::bordered()
                    .title("Summary")
                    .title_style(Style::new().bold().fg(Color::Cyan))
                    .border_type(BorderType::Plain)
                    .border_style(Style::new().fg(Color::Blue))
            )
            .alignment(Alignment::Left);

        paragraph.render(area, buf);
    }
}
