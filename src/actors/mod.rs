//! Actor driving the collection cycles
//!
//! ```text
//!   tick / CollectNow
//!          │
//!   ┌──────▼──────────────┐   fan-out (Semaphore + JoinSet)
//!   │ CollectorScheduler  ├──────────────► SourceAdapter × N
//!   └──────┬──────────────┘
//!          │ merge → rates → alerts
//!   ┌──────▼──────┐
//!   │ StateStore  ├──► read() / subscribe()
//!   └─────────────┘
//! ```
//!
//! The scheduler is the only writer of the state store. Everything else talks to it
//! through a cloneable `SchedulerHandle`.

pub mod messages;
pub mod scheduler;

pub use messages::{CyclePhase, CycleReport, SchedulerCommand};
pub use scheduler::{CollectorScheduler, SchedulerHandle};
