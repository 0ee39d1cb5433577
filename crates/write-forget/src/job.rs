//! Pending jobs and the coalescing policy.
//!
//! A pending job holds everything requested for a path since its current
//! physical operation began. Merging keeps the job equivalent to replaying the
//! merged requests in order:
//!
//! | job mode    | incoming          | result                       |
//! |-------------|-------------------|------------------------------|
//! | any         | overwrite(c)      | `Overwrite`, content = c     |
//! | `Overwrite` | append(c)         | `Overwrite`, content += c    |
//! | `Append`    | append(c)         | `Append`, content += c       |

use std::time::Instant;

use write_forget_core::WriteMode;

/// Accumulated, not-yet-issued request for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingJob {
    pub(crate) mode: WriteMode,
    pub(crate) content: String,
    /// Earliest instant the job may be handed to the sink.
    pub(crate) deadline: Instant,
}

impl PendingJob {
    pub(crate) const fn new(mode: WriteMode, content: String, deadline: Instant) -> Self {
        Self {
            mode,
            content,
            deadline,
        }
    }

    /// Fold a later request into this job and push the deadline out.
    pub(crate) fn merge(&mut self, mode: WriteMode, content: &str, deadline: Instant) {
        match mode {
            WriteMode::Overwrite => {
                self.mode = WriteMode::Overwrite;
                self.content.clear();
                self.content.push_str(content);
            }
            WriteMode::Append => self.content.push_str(content),
        }
        self.deadline = deadline;
    }
}
