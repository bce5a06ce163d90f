//! Change Parser — name-status diff text → [`ChangeRecord`]s.
//!
//! Input is one record per line, `status<TAB>path[<TAB>path2]`, as printed by
//! `git log --name-status --format=`. Lines without a TAB (blank separators,
//! commit headers) and lines whose path has no directory component are
//! skipped. An unrecognised status letter is an error; callers stop at the
//! first one.

use std::str::Lines;

use dockhand_core::{ChangeRecord, ChangeStatus};

use crate::error::ReconcileError;

/// Lazy, single-use sequence of change records over borrowed diff text.
#[derive(Debug)]
pub struct ChangeParser<'a> {
    lines: Lines<'a>,
}

/// Parse `raw` lazily. See the module docs for the line format.
pub fn parse_changes(raw: &str) -> ChangeParser<'_> {
    ChangeParser { lines: raw.lines() }
}

impl<'a> Iterator for ChangeParser<'a> {
    type Item = Result<ChangeRecord, ReconcileError>;

    fn next(&mut self) -> Option<Self::Item> {
        for line in self.lines.by_ref() {
            match parse_line(line) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}

/// Parse one line. `Ok(None)` means the line carries nothing for any service.
pub fn parse_line(line: &str) -> Result<Option<ChangeRecord>, ReconcileError> {
    let line = line.trim_end_matches('\r');
    let mut fields = line.split('\t');
    let raw_status = fields.next().unwrap_or_default();
    let Some(path) = fields.next() else {
        return Ok(None);
    };
    if !path.contains('/') {
        tracing::debug!(path, "skipping change outside any service directory");
        return Ok(None);
    }

    let status = ChangeStatus::parse(raw_status).ok_or_else(|| ReconcileError::UnknownOperation {
        status: raw_status.to_owned(),
        line: line.to_owned(),
    })?;

    let second = fields.next();
    if fields.next().is_some() {
        return Err(ReconcileError::MalformedRecord {
            line: line.to_owned(),
            reason: "more than two paths",
        });
    }

    let renamed_to = match (status.has_target(), second) {
        (true, Some(target)) => Some(target.to_owned()),
        (true, None) => {
            return Err(ReconcileError::MalformedRecord {
                line: line.to_owned(),
                reason: "rename or copy without a target path",
            })
        }
        (false, Some(_)) => {
            return Err(ReconcileError::MalformedRecord {
                line: line.to_owned(),
                reason: "second path on a single-path status",
            })
        }
        (false, None) => None,
    };

    Ok(Some(ChangeRecord {
        status,
        path: path.to_owned(),
        renamed_to,
    }))
}
