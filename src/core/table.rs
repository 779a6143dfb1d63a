use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, trace};

use super::connection::{
    is_wildcard_addr, is_wildcard_port, ConnectionRow, ConnectionStatus, Lifecycle, Protocol,
    SocketKind,
};
use super::diff::diff;
use super::error::Result;
use super::name_cache::NameCache;
use super::resolver::{service_or_numeric, Resolver};
use super::source::ConnectionSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Process,
    Pid,
    Protocol,
    LocalAddress,
    LocalPort,
    RemoteAddress,
    RemotePort,
    Status,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Process,
        Column::Pid,
        Column::Protocol,
        Column::LocalAddress,
        Column::LocalPort,
        Column::RemoteAddress,
        Column::RemotePort,
        Column::Status,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn title(&self) -> &'static str {
        match self {
            Column::Process => "Process",
            Column::Pid => "PID",
            Column::Protocol => "Protocol",
            Column::LocalAddress => "Local Address",
            Column::LocalPort => "Local Port",
            Column::RemoteAddress => "Remote Address",
            Column::RemotePort => "Remote Port",
            Column::Status => "Status",
        }
    }

    fn compare(&self, a: &ConnectionRow, b: &ConnectionRow) -> Ordering {
        let (a, b) = (&a.record, &b.record);
        match self {
            Column::Process => a.process_name.cmp(&b.process_name),
            Column::Pid => a.pid.cmp(&b.pid),
            Column::Protocol => a.protocol.cmp(&b.protocol),
            Column::LocalAddress => a.local_addr.cmp(&b.local_addr),
            Column::LocalPort => a.local_port.cmp(&b.local_port),
            Column::RemoteAddress => a.remote_addr.cmp(&b.remote_addr),
            Column::RemotePort => a.remote_port.cmp(&b.remote_port),
            Column::Status => a.status.display().cmp(b.status.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: Column,
    pub ascending: bool,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            column: Column::Process,
            ascending: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Numeric,
    DomainName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    Numeric,
    ServiceName,
}

/// Visual classification of a row after the last refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStyle {
    New,
    Updated,
    Deleted,
    Neutral,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub established: usize,
    pub listen: usize,
    pub close_wait: usize,
    pub time_wait: usize,
    pub endpoints: usize,
}

/// Receives begin/end notifications around every wholesale change of the rows.
pub trait ResetListener: Send {
    fn begin_reset(&mut self);
    fn end_reset(&mut self);
}

/// Monotonic primary keys. After wrapping, values still held by a live row are skipped.
#[derive(Debug, Default)]
struct KeyGenerator {
    next: u64,
}

impl KeyGenerator {
    fn issue(&mut self, taken: &HashSet<u64>) -> u64 {
        loop {
            let key = self.next;
            self.next = self.next.wrapping_add(1);
            if !taken.contains(&key) {
                return key;
            }
        }
    }
}

pub struct ConnectionTable {
    source: Box<dyn ConnectionSource>,
    names: NameCache,
    resolver: Arc<dyn Resolver>,
    services: HashMap<(u16, SocketKind), String>,
    rows: Vec<ConnectionRow>,
    updated: HashSet<u64>,
    keys: KeyGenerator,
    sort: SortOrder,
    address_mode: AddressMode,
    port_mode: PortMode,
    listeners: Vec<Box<dyn ResetListener>>,
}

impl ConnectionTable {
    pub fn new(source: Box<dyn ConnectionSource>, names: NameCache) -> Self {
        let resolver = names.resolver();
        Self {
            source,
            names,
            resolver,
            services: HashMap::new(),
            rows: Vec::new(),
            updated: HashSet::new(),
            keys: KeyGenerator::default(),
            sort: SortOrder::default(),
            address_mode: AddressMode::Numeric,
            port_mode: PortMode::Numeric,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn ResetListener>) {
        self.listeners.push(listener);
    }

    /// Runs one refresh cycle. On an enumeration failure the table is left untouched.
    pub fn refresh(&mut self) -> Result<()> {
        let snapshot = self.source.enumerate()?;

        // Ghosts from the previous cycle go before anything is matched.
        let previous: Vec<ConnectionRow> = std::mem::take(&mut self.rows)
            .into_iter()
            .filter(|row| !row.is_ghost())
            .collect();

        let mut taken: HashSet<u64> = previous.iter().map(|row| row.key).collect();
        let mut incoming = Vec::with_capacity(snapshot.len());
        for record in snapshot {
            let key = self.keys.issue(&taken);
            taken.insert(key);
            incoming.push(ConnectionRow::new(key, record));
        }

        let changes = diff(&previous, &incoming);
        let inherited: HashMap<usize, u64> = changes.continuing
            .iter()
            .map(|&(old, new)| (new, previous[old].key))
            .collect();
        let deleted: HashSet<usize> = changes.deleted.iter().copied().collect();

        let mut rows = Vec::with_capacity(incoming.len() + deleted.len());
        for (index, mut row) in incoming.into_iter().enumerate() {
            // Unmatched rows, duplicates of a known key included, stay fresh.
            if let Some(&key) = inherited.get(&index) {
                row.key = key;
                row.lifecycle = Lifecycle::Continuing;
            }
            rows.push(row);
        }

        let updated: HashSet<u64> = changes.updated.iter().map(|&index| previous[index].key).collect();

        for (index, mut row) in previous.into_iter().enumerate() {
            if deleted.contains(&index) {
                row.lifecycle = Lifecycle::Deleted;
                rows.push(row);
            }
        }

        if changes.is_unchanged() {
            trace!(total = rows.len(), "connection table unchanged");
        } else {
            debug!(
                created = changes.created.len() + changes.surplus.len(),
                updated = changes.updated.len(),
                deleted = changes.deleted.len(),
                total = rows.len(),
                "refreshed connection table"
            );
        }

        self.begin_reset();
        self.rows = rows;
        self.updated = updated;
        self.request_names();
        if self.port_mode == PortMode::ServiceName {
            self.populate_services();
        }
        self.apply_sort();
        self.end_reset();

        Ok(())
    }

    fn request_names(&mut self) {
        let addrs: HashSet<IpAddr> = self.rows
            .iter()
            .flat_map(|row| [row.record.local_addr, row.record.remote_addr])
            .filter(|addr| !addr.is_unspecified())
            .collect();
        self.names.append(addrs);
    }

    fn populate_services(&mut self) {
        let wanted: HashSet<(u16, SocketKind)> = self.rows
            .iter()
            .flat_map(|row| {
                let kind = row.record.protocol.kind;
                [(row.record.local_port, kind), (row.record.remote_port, kind)]
            })
            .filter(|(port, _)| *port != 0)
            .collect();

        for (port, kind) in wanted {
            if !self.services.contains_key(&(port, kind)) {
                let name = service_or_numeric(self.resolver.as_ref(), port, kind);
                self.services.insert((port, kind), name);
            }
        }
    }

    /// Re-selecting the active column flips direction; a new column starts ascending.
    pub fn sort_by(&mut self, column: Column) {
        if self.sort.column == column {
            self.sort.ascending = !self.sort.ascending;
        } else {
            self.sort = SortOrder {
                column,
                ascending: true,
            };
        }

        self.begin_reset();
        self.apply_sort();
        self.end_reset();
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    fn apply_sort(&mut self) {
        let order = self.sort;
        self.rows.sort_by(|a, b| {
            let ordering = order.column.compare(a, b);
            if order.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }

    fn begin_reset(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener.begin_reset();
        }
    }

    fn end_reset(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener.end_reset();
        }
    }

    pub fn address_mode(&self) -> AddressMode {
        self.address_mode
    }

    pub fn set_address_mode(&mut self, mode: AddressMode) {
        self.address_mode = mode;
    }

    pub fn toggle_name_resolution(&mut self) -> AddressMode {
        self.address_mode = match self.address_mode {
            AddressMode::Numeric => AddressMode::DomainName,
            AddressMode::DomainName => AddressMode::Numeric,
        };
        self.address_mode
    }

    pub fn port_mode(&self) -> PortMode {
        self.port_mode
    }

    pub fn set_port_mode(&mut self, mode: PortMode) {
        self.port_mode = mode;
        if mode == PortMode::ServiceName {
            self.populate_services();
        }
    }

    pub fn toggle_service_names(&mut self) -> PortMode {
        let next = match self.port_mode {
            PortMode::Numeric => PortMode::ServiceName,
            PortMode::ServiceName => PortMode::Numeric,
        };
        self.set_port_mode(next);
        next
    }

    pub fn names(&self) -> &NameCache {
        &self.names
    }

    pub fn names_mut(&mut self) -> &mut NameCache {
        &mut self.names
    }

    pub fn rows(&self) -> &[ConnectionRow] {
        &self.rows
    }

    pub fn row(&self, row: usize) -> Option<&ConnectionRow> {
        self.rows.get(row)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        Column::ALL.len()
    }

    /// Position of the row holding `key`, if it is still in the table.
    pub fn position_of(&self, key: u64) -> Option<usize> {
        self.rows.iter().position(|row| row.key == key)
    }

    pub fn process_name(&self, row: usize) -> Option<&str> {
        self.rows.get(row).map(|row| row.record.process_name.as_str())
    }

    pub fn pid(&self, row: usize) -> Option<u32> {
        self.rows.get(row).map(|row| row.record.pid)
    }

    pub fn header(&self, column: Column) -> String {
        if self.sort.column != column {
            return column.title().to_string();
        }
        let glyph = if self.sort.ascending { '▲' } else { '▼' };
        format!("{} {}", column.title(), glyph)
    }

    pub fn cell(&self, row: usize, column: Column) -> Option<String> {
        let record = &self.rows.get(row)?.record;
        let value = match column {
            Column::Process => record.process_name.clone(),
            Column::Pid => record.pid.to_string(),
            Column::Protocol => record.protocol.label().to_string(),
            Column::LocalAddress => self.render_addr(&record.local_addr, record.protocol),
            Column::LocalPort => self.render_port(record.local_port, record.protocol),
            Column::RemoteAddress => self.render_addr(&record.remote_addr, record.protocol),
            Column::RemotePort => self.render_port(record.remote_port, record.protocol),
            Column::Status => record.status.display().to_string(),
        };
        Some(value)
    }

    fn render_addr(&self, addr: &IpAddr, protocol: Protocol) -> String {
        if is_wildcard_addr(addr, protocol) {
            return "*".to_string();
        }
        let numeric = addr.to_string();
        match self.address_mode {
            AddressMode::Numeric => numeric,
            AddressMode::DomainName => self.names.domain_name(addr, &numeric),
        }
    }

    fn render_port(&self, port: u16, protocol: Protocol) -> String {
        if is_wildcard_port(port, protocol) {
            return "*".to_string();
        }
        match self.port_mode {
            PortMode::Numeric => port.to_string(),
            PortMode::ServiceName => self.services
                .get(&(port, protocol.kind))
                .cloned()
                .unwrap_or_else(|| port.to_string()),
        }
    }

    pub fn row_style(&self, row: usize) -> RowStyle {
        let Some(row) = self.rows.get(row) else {
            return RowStyle::Neutral;
        };
        match row.lifecycle {
            Lifecycle::Fresh => RowStyle::New,
            Lifecycle::Deleted => RowStyle::Deleted,
            Lifecycle::Continuing if self.updated.contains(&row.key) => RowStyle::Updated,
            Lifecycle::Continuing => RowStyle::Neutral,
        }
    }

    /// Counts over live rows; ghosts are excluded.
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for row in self.rows.iter().filter(|row| !row.is_ghost()) {
            counts.endpoints += 1;
            match row.status() {
                ConnectionStatus::Established => counts.established += 1,
                ConnectionStatus::Listen => counts.listen += 1,
                ConnectionStatus::CloseWait => counts.close_wait += 1,
                ConnectionStatus::TimeWait => counts.time_wait += 1,
                _ => {}
            }
        }
        counts
    }
}
