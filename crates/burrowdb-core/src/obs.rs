//! Module: obs
//! Responsibility: the instrumentation boundary.
//! Engine logic MUST NOT depend on any concrete metrics state; all
//! instrumentation flows through [`MetricsEvent`] and [`MetricsSink`].
//! A scoped, thread-local override exists so tests can observe events
//! without global wiring.

use std::cell::Cell;

thread_local! {
    static SINK_OVERRIDE: Cell<Option<*const dyn MetricsSink>> = const { Cell::new(None) };
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    Insert { collection: &'a str },
    Update { collection: &'a str },
    Delete { collection: &'a str },
    UniqueViolation { collection: &'a str, index: &'a str },
    RowsScanned { collection: &'a str, rows: u64 },
    DeadEntrySkipped { collection: &'a str },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// Record one event against the scoped sink, if any is installed.
pub(crate) fn record(event: MetricsEvent<'_>) {
    SINK_OVERRIDE.with(|cell| {
        if let Some(ptr) = cell.get() {
            // The pointer is only ever set by `with_metrics_sink`, whose
            // borrow outlives the scope it installs.
            unsafe { (*ptr).record(event) };
        }
    });
}

/// Run `f` with `sink` receiving every event recorded on this thread.
pub fn with_metrics_sink<R>(sink: &dyn MetricsSink, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<*const dyn MetricsSink>);

    impl Drop for Restore {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| cell.set(self.0));
        }
    }

    // SAFETY: the lifetime is erased only for storage; `Restore` guarantees
    // the pointer is cleared before `sink`'s borrow ends.
    let erased: *const dyn MetricsSink =
        unsafe { std::mem::transmute::<*const dyn MetricsSink, *const (dyn MetricsSink + 'static)>(std::ptr::from_ref(sink)) };
    let previous = SINK_OVERRIDE.with(|cell| {
        let previous = cell.get();
        cell.set(Some(erased));
        previous
    });
    let _restore = Restore(previous);

    f()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Capture(RefCell<Vec<String>>);

    impl MetricsSink for Capture {
        fn record(&self, event: MetricsEvent<'_>) {
            self.0.borrow_mut().push(format!("{event:?}"));
        }
    }

    #[test]
    fn scoped_sink_receives_events_and_unwinds() {
        let capture = Capture::default();

        with_metrics_sink(&capture, || {
            record(MetricsEvent::Insert { collection: "c" });
        });
        record(MetricsEvent::Delete { collection: "c" });

        let events = capture.0.borrow();
        assert_eq!(events.len(), 1, "events outside the scope must be dropped");
        assert!(events[0].contains("Insert"));
    }
}
