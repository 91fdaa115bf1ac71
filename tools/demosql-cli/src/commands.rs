//!
//! Subcommand implementations.
//!
//! Each command takes an open connection and writes its report to a
//! caller-supplied writer, so the binary prints to stdout while tests
//! capture into a buffer.
//!

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use demoplot::{render_histogram, HistogramOptions, PlotSize, Sample};
use demosql::{Bindable, Connection, Statement, StorageClass, Value};
use tracing::{debug, info};

use crate::errors::CliError;

/// Parses a command-line parameter: `NULL` (any case), an integer, a finite
/// real, or else text taken verbatim.
pub fn parse_param(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(integer) = raw.parse::<i64>() {
        return Value::Integer(integer);
    }
    match raw.parse::<f64>() {
        Ok(real) if real.is_finite() => Value::Real(real),
        _ => Value::Text(raw.to_string()),
    }
}

fn bind_params(stmt: &mut Statement<'_>, params: &[Value]) -> Result<(), CliError> {
    if params.len() > stmt.parameter_count() {
        return Err(CliError::ParameterCount {
            expected: stmt.parameter_count(),
            given: params.len(),
        });
    }
    let values: Vec<&dyn Bindable> = params.iter().map(|v| v as &dyn Bindable).collect();
    stmt.bind(&values)?;
    Ok(())
}

/// Runs `sql` as a batch, printing every row. Returns the number of rows printed.
pub fn exec<W: Write>(
    conn: &Connection,
    sql: &str,
    limit: Option<usize>,
    json: bool,
    out: &mut W,
) -> Result<usize, CliError> {
    let mut printed = 0;
    let mut failure: Option<CliError> = None;

    conn.execute_with_rows(sql, |row| {
        if limit.is_some_and(|limit| printed >= limit) {
            return false;
        }
        let written = if json {
            serde_json::to_string(&row)
                .map_err(CliError::from)
                .and_then(|line| writeln!(out, "{line}").map_err(CliError::from))
        } else {
            write_row_lines(out, printed, &row).map_err(CliError::from)
        };
        match written {
            Ok(()) => {
                printed += 1;
                limit.is_none_or(|limit| printed < limit)
            }
            Err(err) => {
                failure = Some(err);
                false
            }
        }
    })?;

    if let Some(err) = failure {
        return Err(err);
    }
    debug!(rows = printed, "exec finished");
    Ok(printed)
}

fn write_row_lines<W: Write>(
    out: &mut W,
    index: usize,
    row: &demosql::RowMap,
) -> std::io::Result<()> {
    if index > 0 {
        writeln!(out)?;
    }
    for (name, value) in row {
        writeln!(out, "{name} = {value}")?;
    }
    Ok(())
}

/// Prepares `sql`, binds `params`, and prints a tab-separated table with a
/// header line. Returns the number of data rows.
pub fn query<W: Write>(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    out: &mut W,
) -> Result<usize, CliError> {
    let mut stmt = conn.prepare(sql)?;
    bind_params(&mut stmt, params)?;

    if stmt.column_count() > 0 {
        writeln!(out, "{}", stmt.column_names().join("\t"))?;
    }

    let mut count = 0;
    let mut rows = stmt.rows();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(row.column_count());
        for idx in 0..row.column_count() {
            cells.push(row.get::<Value>(idx)?.to_string());
        }
        writeln!(out, "{}", cells.join("\t"))?;
        count += 1;
    }
    Ok(count)
}

/// Collects the last column of every row as real, skipping NULLs. With more
/// than one column, the first column's text labels the sample.
pub fn collect_samples(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Sample>, CliError> {
    let mut stmt = conn.prepare(sql)?;
    bind_params(&mut stmt, params)?;

    let last = match stmt.column_count().checked_sub(1) {
        Some(last) => last,
        None => return Err(CliError::NoColumns),
    };
    let samples: Vec<Option<Sample>> = stmt.query_map(|row| {
        if row.storage_class(last) == StorageClass::Null {
            return Ok(None);
        }
        let value = row.get::<f64>(last)?;
        let label = if last > 0 {
            row.get::<Value>(0)?.to_string()
        } else {
            String::new()
        };
        Ok(Some(Sample::new(label, value)))
    })?;
    Ok(samples.into_iter().flatten().collect())
}

/// Renders a histogram of the query's last column and writes it as PAM to `output`.
pub fn histogram(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    size: PlotSize,
    options: &HistogramOptions,
    output: &Path,
) -> Result<usize, CliError> {
    let samples = collect_samples(conn, sql, params)?;
    let bitmap = render_histogram(size, &samples, options);

    let file = File::create(output)?;
    bitmap.write_pam(BufWriter::new(file))?;
    info!(
        path = %output.display(),
        samples = samples.len(),
        width = bitmap.width(),
        height = bitmap.height(),
        "wrote histogram"
    );
    Ok(samples.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn people() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE people (name TEXT, role TEXT, height INTEGER);
             INSERT INTO people VALUES ('Andrew', 'Speaker', 193);
             INSERT INTO people VALUES ('Michael', NULL, 180);
             INSERT INTO people VALUES ('Conrad', 'Speaker', NULL);",
        )
        .unwrap();
        conn
    }

    fn output(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("NULL"), Value::Null);
        assert_eq!(parse_param("null"), Value::Null);
        assert_eq!(parse_param("42"), Value::Integer(42));
        assert_eq!(parse_param("-7"), Value::Integer(-7));
        assert_eq!(parse_param("2.5"), Value::Real(2.5));
        assert_eq!(parse_param("inf"), Value::Text("inf".to_string()));
        assert_eq!(parse_param("Andrew"), Value::Text("Andrew".to_string()));
    }

    #[test]
    fn test_exec_prints_name_value_lines() {
        let conn = people();
        let mut out = Vec::new();
        let rows = exec(
            &conn,
            "SELECT name, role FROM people ORDER BY rowid LIMIT 2",
            None,
            false,
            &mut out,
        )
        .unwrap();

        assert_eq!(rows, 2);
        assert_eq!(
            output(out),
            "name = Andrew\nrole = Speaker\n\nname = Michael\n"
        );
    }

    #[test]
    fn test_exec_json_with_limit() {
        let conn = people();
        let mut out = Vec::new();
        let rows = exec(
            &conn,
            "SELECT name, height FROM people ORDER BY rowid",
            Some(1),
            true,
            &mut out,
        )
        .unwrap();

        assert_eq!(rows, 1);
        assert_eq!(output(out), "{\"name\":\"Andrew\",\"height\":\"193\"}\n");
    }

    #[test]
    fn test_exec_limit_zero_prints_nothing() {
        let conn = people();
        let mut out = Vec::new();
        let rows = exec(&conn, "SELECT name FROM people", Some(0), false, &mut out).unwrap();
        assert_eq!(rows, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_query_prints_table() {
        let conn = people();
        let mut out = Vec::new();
        let rows = query(
            &conn,
            "SELECT name, role, height FROM people WHERE height > ? ORDER BY rowid",
            &[parse_param("100")],
            &mut out,
        )
        .unwrap();

        assert_eq!(rows, 2);
        assert_eq!(
            output(out),
            "name\trole\theight\nAndrew\tSpeaker\t193\nMichael\tNULL\t180\n"
        );
    }

    #[test]
    fn test_query_rejects_extra_params() {
        let conn = people();
        let mut out = Vec::new();
        let result = query(
            &conn,
            "SELECT name FROM people WHERE height > ?",
            &[Value::Integer(1), Value::Integer(2)],
            &mut out,
        );
        assert!(matches!(
            result,
            Err(CliError::ParameterCount {
                expected: 1,
                given: 2
            })
        ));
    }

    #[test]
    fn test_query_reports_database_errors() {
        let conn = people();
        let mut out = Vec::new();
        let result = query(&conn, "SELECT * FROM nowhere", &[], &mut out);
        assert!(matches!(result, Err(CliError::Database(_))));
    }

    #[test]
    fn test_collect_samples_skips_nulls() {
        let conn = people();
        let samples = collect_samples(
            &conn,
            "SELECT name, height FROM people ORDER BY rowid",
            &[],
        )
        .unwrap();
        assert_eq!(
            samples,
            vec![Sample::new("Andrew", 193.0), Sample::new("Michael", 180.0)]
        );
    }

    #[test]
    fn test_single_column_samples_are_unlabeled() {
        let conn = people();
        let samples = collect_samples(
            &conn,
            "SELECT height FROM people WHERE height IS NOT NULL ORDER BY rowid",
            &[],
        )
        .unwrap();
        assert_eq!(samples, vec![Sample::from(193.0), Sample::from(180.0)]);
    }

    #[test]
    fn test_collect_samples_without_columns() {
        let conn = people();
        let result = collect_samples(&conn, "DELETE FROM people WHERE 0", &[]);
        assert!(matches!(result, Err(CliError::NoColumns)));
    }

    #[test]
    fn test_histogram_writes_pam() {
        let conn = people();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("height.pam");

        let options = HistogramOptions {
            title: "Height".to_string(),
            ..HistogramOptions::default()
        };
        let samples = histogram(
            &conn,
            "SELECT height FROM people",
            &[],
            PlotSize::new(64.0, 48.0),
            &options,
            &path,
        )
        .unwrap();
        assert_eq!(samples, 2);

        let bytes = std::fs::read(&path).unwrap();
        let header = "P7\nWIDTH 64\nHEIGHT 48\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n";
        assert!(bytes.starts_with(header.as_bytes()));
        assert_eq!(bytes.len(), header.len() + 64 * 48 * 4);
    }
}
