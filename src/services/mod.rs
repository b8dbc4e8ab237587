pub mod attribution;
pub mod history;
pub mod scan_service;
pub mod scheduler;
pub mod trends;

pub use history::ScanHistory;
pub use scan_service::{ScanFailure, ScanOutcome, ScanService};
pub use scheduler::{spawn_scheduled_scans, ScheduleConfig};
pub use trends::{TrendCache, TrendFilter, TrendService, DEFAULT_TREND_MONTHS};
