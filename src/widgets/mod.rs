pub mod connection_table;
pub mod summary_block;

pub use self::connection_table::ConnectionTableWidget;
pub use self::summary_block::SummaryWidget;
