//! Test telemetry for the simulation kernel.
//!
//! Captures `tracing` events into row-oriented tables keyed by event target,
//! so tests can assert on what the simulation actually did (orders, trades,
//! settlements, bailouts) instead of poking at internals.
//!
//! # Usage
//!
//! ```ignore
//! // In simulation code:
//! tracing::info!(target: "trade", tick, qty, unit_price);
//!
//! // In a test:
//! let log = instrument::capture(|| {
//!     // ... run simulation ...
//! });
//! let trades = log.table("trade");
//! assert_eq!(trades.len(), 1);
//! assert_eq!(trades[0].u64("qty"), Some(5));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Metadata, Subscriber};

/// One recorded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U64(u64),
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            Value::I64(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            Value::U64(v) => Some(*v as f64),
            Value::I64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// One recorded event: field name → value, in recording order.
#[derive(Debug, Clone, Default)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn u64(&self, field: &str) -> Option<u64> {
        self.get(field).and_then(Value::as_u64)
    }

    pub fn i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// All captured events, one table per tracing target.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    tables: HashMap<String, Vec<Row>>,
}

impl EventLog {
    /// Rows recorded under a target, in emission order.
    pub fn table(&self, target: &str) -> &[Row] {
        self.tables.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, target: &str) -> usize {
        self.table(target).len()
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

thread_local! {
    static RECORDER: RefCell<EventLog> = RefCell::default();
}

struct RowVisitor<'a> {
    row: &'a mut Row,
}

impl Visit for RowVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.row.fields.push((field.name().to_string(), Value::U64(value)));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.row.fields.push((field.name().to_string(), Value::I64(value)));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.row.fields.push((field.name().to_string(), Value::F64(value)));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.row.fields.push((field.name().to_string(), Value::Bool(value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.row
            .fields
            .push((field.name().to_string(), Value::Str(value.to_string())));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }
}

/// Subscriber that appends info-level events to the thread-local log.
pub struct RowSubscriber;

impl Subscriber for RowSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= tracing::Level::INFO
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let target = event.metadata().target().to_string();
        let mut row = Row::default();
        event.record(&mut RowVisitor { row: &mut row });
        RECORDER.with(|r| {
            r.borrow_mut().tables.entry(target).or_default().push(row);
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Install the subscriber globally. Prefer [`capture`] in tests; this is for
/// long-lived embedding.
pub fn install_subscriber() {
    let _ = tracing::subscriber::set_global_default(RowSubscriber);
}

/// Take everything recorded on this thread so far.
pub fn drain() -> EventLog {
    RECORDER.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

/// Discard everything recorded on this thread.
pub fn clear() {
    RECORDER.with(|r| *r.borrow_mut() = EventLog::default());
}

/// Run `f` with the recorder active and return what it emitted. The recorder
/// is scoped to the current thread, so parallel tests do not interfere.
pub fn capture<F: FnOnce()>(f: F) -> EventLog {
    clear();
    tracing::subscriber::with_default(RowSubscriber, f);
    drain()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_returns_emitted_rows() {
        let log = capture(|| {
            tracing::info!(target: "trade", tick = 3u64, qty = 5u64, unit_price = 150i64);
            tracing::info!(target: "trade", tick = 3u64, qty = 2u64, unit_price = 140i64);
            tracing::info!(target: "order", tick = 3u64, side = "buy");
        });

        assert_eq!(log.count("trade"), 2);
        assert_eq!(log.count("order"), 1);
        assert_eq!(log.count("missing"), 0);

        let trades = log.table("trade");
        assert_eq!(trades[0].u64("qty"), Some(5));
        assert_eq!(trades[1].i64("unit_price"), Some(140));
        assert_eq!(log.table("order")[0].str("side"), Some("buy"));
    }

    #[test]
    fn debug_fields_record_as_strings() {
        #[derive(Debug)]
        #[allow(dead_code)]
        enum Side {
            Buy,
        }
        let log = capture(|| {
            tracing::info!(target: "t", side = ?Side::Buy);
        });
        assert_eq!(log.table("t")[0].str("side"), Some("Buy"));
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::U64(7).as_f64(), Some(7.0));
        assert_eq!(Value::I64(-1).as_u64(), None);
        assert_eq!(Value::U64(9).as_i64(), Some(9));
        assert_eq!(Value::Str("x".into()).as_u64(), None);
    }

    #[test]
    fn below_info_events_are_ignored() {
        let log = capture(|| {
            tracing::debug!(target: "quiet", x = 1u64);
        });
        assert!(log.is_empty());
    }
}
