pub mod convert;
pub mod dedup;
pub mod normalize;
pub mod sheet;
mod table;

pub use dedup::{
    DedupError, Deduplicator, Filtered, MatchRule, ReferenceSpec, RunOptions, RunReport,
    TargetReport, TargetSpec, TargetStatus, default_targets, filter,
};
pub use table::{Cell, Row, Table};

pub type Decimal = rust_decimal::Decimal;
