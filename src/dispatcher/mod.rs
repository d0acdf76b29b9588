//! Job dispatching
//!
//! - `Job` and its payloads: the units of work crawlers hand to each other
//! - `Router`: one lazily created bounded queue per job kind

mod job;
mod router;

pub use job::{DirectoryPayload, FilePayload, Job, JobKind, WebPayload};
pub use router::{JobStream, Router};
