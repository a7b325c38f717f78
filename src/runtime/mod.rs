pub mod logger;
pub mod namespace;
pub mod report;

pub use namespace::NameRegistry;
pub use report::ExecutionReport;
