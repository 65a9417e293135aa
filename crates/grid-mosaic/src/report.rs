//! Error-reporting seam for callers.
//!
//! Numeric routines never report on their own; callers that want the
//! `(filename, line, code)` triple logged or collected pass their result
//! through [`report_if_err`] or the [`report_status!`](crate::report_status)
//! macro.

use std::sync::Mutex;

use crate::error::{status_of, Result, STATUS_OK};

/// Receiver for failure reports.
pub trait ErrorReporter {
    fn report(&self, filename: &str, line: u32, code: i32);
}

/// Reports failures as `tracing` error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, filename: &str, line: u32, code: i32) {
        tracing::error!(file = filename, line, code, "Mosaic operation failed");
    }
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub filename: String,
    pub line: u32,
    pub code: i32,
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<Report>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the reports received so far.
    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, filename: &str, line: u32, code: i32) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(Report {
                filename: filename.to_string(),
                line,
                code,
            });
        }
    }
}

/// Report a failed result and return its status code (`STATUS_OK` on success).
pub fn report_if_err<T>(
    reporter: &dyn ErrorReporter,
    filename: &str,
    line: u32,
    result: &Result<T>,
) -> i32 {
    let status = status_of(result);
    if status != STATUS_OK {
        reporter.report(filename, line, status);
    }
    status
}

/// Report a failed result with the caller's file and line; evaluates to the status code.
#[macro_export]
macro_rules! report_status {
    ($reporter:expr, $result:expr) => {
        $crate::report::report_if_err($reporter, file!(), line!(), &$result)
    };
}
