//! Property-based test generators using proptest.

use acdb_table::Row;
use proptest::prelude::*;

/// Strategy for an event row with a small id and time, so that generated
/// batches overlap often.
pub fn event_strategy() -> impl Strategy<Value = Row> {
    (0i64..64, 0i64..1_000).prop_map(|(id, t)| Row::new().with("id", id).with("t", t))
}

/// Strategy for a page of events.
pub fn page_strategy(max_rows: usize) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(event_strategy(), 0..=max_rows)
}

/// Strategy for a short sequence of pages.
pub fn pages_strategy(max_pages: usize, max_rows: usize) -> impl Strategy<Value = Vec<Vec<Row>>> {
    prop::collection::vec(page_strategy(max_rows), 1..=max_pages)
}

/// Strategy for strictly increasing event times starting after `after`.
pub fn increasing_times(after: i64, max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1i64..30, 0..=max_len).prop_map(move |steps| {
        steps
            .into_iter()
            .scan(after, |t, step| {
                *t += step;
                Some(*t)
            })
            .collect()
    })
}
