//! Formatting of store results into protocol lines. Nothing here performs I/O.

use crate::{error::StoreError, store::Record};

const SEPARATOR_WIDTH: usize = 10;

pub fn separator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

/// A separator, one `<id> - <name>` line per record, then a closing separator.
pub fn records(records: &[Record]) -> Vec<String> {
    let mut lines = Vec::with_capacity(records.len() + 2);
    lines.push(separator());
    lines.extend(
        records
            .iter()
            .map(|record| format!("{} - {}", record.id, record.name)),
    );
    lines.push(separator());
    lines
}

pub fn empty() -> String {
    "No results".to_string()
}

pub fn error(message: &str) -> String {
    format!("Error: {message}")
}

pub fn failure(message: &str) -> String {
    format!("Failure: {message}")
}

/// Renders the outcome of a search the way `find` reports it.
pub fn find_result(result: Result<Vec<Record>, StoreError>) -> Vec<String> {
    match result {
        Ok(found) if found.is_empty() => vec![empty()],
        Ok(found) => records(&found),
        Err(err) => vec![failure(&err.to_string())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, name: &str) -> Record {
        Record {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn records_are_framed_by_separators() {
        let lines = records(&[record(1, "Don Johnson"), record(4, "Dana Whitaker")]);
        assert_eq!(
            lines,
            vec![
                "----------",
                "1 - Don Johnson",
                "4 - Dana Whitaker",
                "----------",
            ]
        );
    }

    #[test]
    fn empty_search_reports_no_results() {
        assert_eq!(find_result(Ok(Vec::new())), vec!["No results"]);
    }

    #[test]
    fn store_errors_become_failure_lines() {
        assert_eq!(
            find_result(Err(StoreError::Backend("disk on fire".into()))),
            vec!["Failure: disk on fire"]
        );
    }

    #[test]
    fn error_prefix() {
        assert_eq!(error("no such command."), "Error: no such command.");
    }
}
