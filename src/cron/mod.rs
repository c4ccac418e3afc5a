//! # Cron Module
//!
//! Cron expression parsing, next-fire computation, and a background job
//! scheduler that dispatches due callbacks onto a [`TaskPool`].
//!
//! ## Expression grammar
//!
//! Five whitespace-separated fields, in order: minute, hour, day-of-month,
//! month, day-of-week. Each field is a comma-separated list of items:
//!
//! | Item | Meaning |
//! |---|---|
//! | `*` | every value in the field's range |
//! | `5` | the single value 5 |
//! | `1-5` | inclusive range; `22-2` wraps around the field boundary |
//! | `*/15` | every 15th value across the whole range |
//! | `10-40/10` | every 10th value within the range |
//! | `JAN`, `MON` | case-insensitive month / weekday names |
//!
//! Day-of-week accepts `7` as an alias of `0` (Sunday); the alias is
//! normalized away during parsing. All time arithmetic is UTC.
//!
//! ## Day matching
//!
//! When both day-of-month and day-of-week are restricted, a day matches if
//! it satisfies **either** field (the POSIX rule). When only one is
//! restricted, only that one constrains.
//!
//! ## Example
//!
//! ```rust,no_run
//! use girder::cron::CronScheduler;
//! use std::sync::Arc;
//!
//! let mut scheduler = CronScheduler::new(2);
//! scheduler
//!     .add_job("heartbeat", "emit a liveness mark", "*/5 * * * *", Arc::new(|| {
//!         println!("still alive");
//!     }))
//!     .unwrap();
//! scheduler.start();
//! ```

mod parser;
mod schedule;
mod scheduler;

pub use parser::{CronError, CronFields};
pub use schedule::CronSchedule;
pub use scheduler::{AddJobError, CronScheduler, JobCallback, JobSnapshot};
