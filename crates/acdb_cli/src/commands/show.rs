//! Show command implementation.

use acdb_sync_engine::{Engine, HttpClient};
use acdb_table::{to_jsonl, Aggregation, Filter, GroupBy, Table, Value};
use std::io::Write;

/// What to read and how to shape it.
#[derive(Debug, Default)]
pub struct ShowArgs {
    /// `column=value` filters.
    pub filters: Vec<String>,
    /// Column to group rows by.
    pub group_by: Option<String>,
    /// `op(column)` reductions per group.
    pub aggs: Vec<String>,
    /// Maximum number of rows to print.
    pub limit: Option<usize>,
}

/// Runs the show command.
pub fn run<C: HttpClient>(
    engine: &mut Engine<C>,
    dataset: &str,
    args: &ShowArgs,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let filters = args
        .filters
        .iter()
        .map(|f| parse_filter(f))
        .collect::<Result<Vec<Filter>, String>>()?;
    let aggs = args
        .aggs
        .iter()
        .map(|a| parse_agg(a))
        .collect::<Result<Vec<_>, String>>()?;
    if !aggs.is_empty() && args.group_by.is_none() {
        return Err("--agg needs --group-by".into());
    }

    let mut rows = select(engine, dataset, &filters, None)?;
    if let Some(key) = &args.group_by {
        rows = group(&rows, key, &aggs);
    }
    if let Some(n) = args.limit {
        rows = rows.into_iter().take(n).collect();
    }

    match format {
        "text" => {
            for row in rows.iter() {
                let cells: Vec<String> = row.iter().map(|(k, v)| format!("{k}={v}")).collect();
                println!("{}", cells.join("  "));
            }
        }
        _ => {
            std::io::stdout().write_all(&to_jsonl(&rows)?)?;
        }
    }

    Ok(())
}

/// Matching rows, at most `limit` of them.
pub fn select<C: HttpClient>(
    engine: &mut Engine<C>,
    dataset: &str,
    filters: &[Filter],
    limit: Option<usize>,
) -> Result<Table, Box<dyn std::error::Error>> {
    let rows = engine.filter(dataset, filters)?;
    Ok(match limit {
        Some(n) => rows.into_iter().take(n).collect(),
        None => rows,
    })
}

/// One row per distinct `key`, with a `rows` count and one
/// `<op>_<column>` column per reduction.
pub fn group(table: &Table, key: &str, aggs: &[(Aggregation, String)]) -> Table {
    aggs.iter()
        .fold(GroupBy::new(table, key).size("rows"), |g, (op, column)| {
            let target = format!("{}_{column}", op.name());
            g.agg(column.clone(), op.clone(), target)
        })
        .finish()
}

/// `op(column)`, e.g. `max(epoch_second)`.
pub fn parse_agg(text: &str) -> Result<(Aggregation, String), String> {
    let (op, rest) = text
        .split_once('(')
        .ok_or_else(|| format!("expected op(column), got {text:?}"))?;
    let column = rest
        .strip_suffix(')')
        .filter(|c| !c.is_empty())
        .ok_or_else(|| format!("expected op(column), got {text:?}"))?;
    Ok((op.trim().parse()?, column.trim().to_string()))
}

/// `column=value`; integers and floats compare as numbers.
pub fn parse_filter(text: &str) -> Result<Filter, String> {
    let (column, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected column=value, got {text:?}"))?;
    if column.is_empty() {
        return Err(format!("missing column in {text:?}"));
    }
    let value = if let Ok(i) = value.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(x) = value.parse::<f64>() {
        Value::Float(x)
    } else {
        Value::from(value)
    };
    Ok(Filter::equals(column, value))
}
