use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use super::error::Result;
use super::table::{Column, ConnectionTable};

pub const DEFAULT_EXPORT_FILE: &str = "net_connections.csv";

const DELIMITER: &str = ";";

/// Writes the table as displayed: a header line with the column names, then
/// one line per row in column order.
pub fn write_csv<W: Write>(table: &ConnectionTable, mut out: W) -> Result<()> {
    let header: Vec<&str> = Column::ALL.iter().map(|column| column.title()).collect();
    writeln!(out, "{}", header.join(DELIMITER))?;

    for row in 0..table.row_count() {
        let cells: Vec<String> = Column::ALL
            .iter()
            .map(|&column| table.cell(row, column).unwrap_or_default())
            .collect();
        writeln!(out, "{}", cells.join(DELIMITER))?;
    }

    out.flush()?;
    Ok(())
}

pub fn save_csv(table: &ConnectionTable, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_csv(table, BufWriter::new(file))?;
    info!(path = %path.display(), rows = table.row_count(), "exported connections");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::ConnectionStatus;
    use crate::core::name_cache::NameCache;
    use crate::core::testing::{record, udp_listener, ScriptedSource, StaticResolver};
    use crate::core::worker_pool::WorkerPool;
    use crate::core::name_cache::SystemClock;
    use std::sync::Arc;

    fn loaded_table() -> ConnectionTable {
        let source = ScriptedSource::default();
        source.push(vec![
            record(5000, 443, ConnectionStatus::Established),
            udp_listener(53),
        ]);
        let names = NameCache::with_parts(
            Arc::new(StaticResolver::default()),
            Arc::new(SystemClock),
            WorkerPool::with_capacity(1),
        );
        let mut table = ConnectionTable::new(Box::new(source), names);
        table.refresh().unwrap();
        table.names_mut().wait_for_pending();
        table
    }

    #[test]
    fn test_write_csv() {
        let table = loaded_table();
        let mut out = Vec::new();

        write_csv(&table, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Process;PID;Protocol;Local Address;Local Port;Remote Address;Remote Port;Status\n\
             curl;100;TCP;10.0.0.1;5000;10.0.0.2;443;ESTABLISHED\n\
             dnsmasq;200;UDP;*;53;*;*;\n"
        );
    }

    #[test]
    fn test_save_csv_to_file() {
        let table = loaded_table();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_EXPORT_FILE);

        save_csv(&table, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with('\n'));
    }
}
