mod app;
mod core;
mod widgets;
mod cli;

use std::fs::File;
use std::sync::Arc;

use app::App;
use cli::{parse_args, Settings};
use crate::core::export::save_csv;
use crate::core::name_cache::NameCache;
use crate::core::resolver::SystemResolver;
use crate::core::source::SystemSource;
use crate::core::table::{AddressMode, ConnectionTable, PortMode};
use tracing_subscriber::EnvFilter;

fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.export_only {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else if let Some(path) = &settings.log_file {
        // The terminal belongs to the UI, so interactive logs only go to a file.
        let file = File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    }
    Ok(())
}

fn build_table(settings: &Settings) -> ConnectionTable {
    let mut names = NameCache::new(Arc::new(SystemResolver));
    names.set_ttl(settings.dns_ttl);

    let mut table = ConnectionTable::new(Box::new(SystemSource::new()), names);
    if settings.resolve_names {
        table.set_address_mode(AddressMode::DomainName);
    }
    if settings.service_names {
        table.set_port_mode(PortMode::ServiceName);
    }
    table
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = parse_args();
    init_logging(&settings)?;

    let mut table = build_table(&settings);
    table.refresh()?;

    if settings.export_only {
        table.names_mut().wait_for_pending();
        save_csv(&table, &settings.output)?;
        return Ok(());
    }

    let mut terminal = ratatui::init();

    let app_result = App::new(table, &settings)
        .run(&mut terminal);

    ratatui::restore();

    app_result?;

    Ok(())
}
