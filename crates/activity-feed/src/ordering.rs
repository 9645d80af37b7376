//! Total order and merging of activity lists.
//!
//! Every function here is pure: inputs are borrowed, never mutated, and a new
//! list is returned. Records are cloned into the output, so callers that
//! want to share them wrap them in `Arc`.
//!
//! # Order
//!
//! 1. Pending activities come before confirmed ones, whatever their
//!    timestamps. A pending entry's timestamp usually jumps forward when it
//!    confirms; keeping pending entries on top means that jump does not
//!    shuffle the rendered list.
//! 2. Then by timestamp, in the requested direction.
//! 3. Then by id, always ascending.

use std::backtrace::Backtrace;
use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::warn;

use crate::activity::{Activity, SortDirection};

/// Report emitted when a list handed to a merge was not sorted.
#[derive(Debug)]
pub struct UnsortedInput {
    /// Which argument was unsorted (0 for the first list, 1 for the second).
    pub list_index: usize,
    /// Length of the offending list.
    pub len: usize,
    /// Position of the first adjacent pair out of order.
    pub first_violation: usize,
    /// Direction the list was expected to follow.
    pub direction: SortDirection,
    /// Call stack at the time of detection.
    pub backtrace: Backtrace,
}

/// Receives ordering diagnostics.
pub trait DiagnosticSink {
    /// A merge input was not sorted and has been re-sorted locally.
    fn unsorted_input(&self, report: &UnsortedInput);
}

/// Default sink: logs the report through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn unsorted_input(&self, report: &UnsortedInput) {
        warn!(
            list_index = report.list_index,
            len = report.len,
            first_violation = report.first_violation,
            direction = ?report.direction,
            "Merge input was not sorted, re-sorting before merge\n{}",
            report.backtrace
        );
    }
}

/// Compare two activities.
pub fn compare<A: Activity, B: Activity>(a: &A, b: &B, direction: SortDirection) -> Ordering {
    b.is_pending()
        .cmp(&a.is_pending())
        .then_with(|| match direction {
            SortDirection::Ascending => a.timestamp().cmp(&b.timestamp()),
            SortDirection::Descending => b.timestamp().cmp(&a.timestamp()),
        })
        .then_with(|| a.id().cmp(b.id()))
}

/// Return the activities sorted by [`compare`].
pub fn sort<T: Activity + Clone>(activities: &[T], direction: SortDirection) -> Vec<T> {
    let mut sorted = activities.to_vec();
    sorted.sort_by(|a, b| compare(a, b, direction));
    sorted
}

/// Whether no adjacent pair is out of order.
pub fn is_sorted<T: Activity>(activities: &[T], direction: SortDirection) -> bool {
    first_violation(activities, direction).is_none()
}

fn first_violation<T: Activity>(activities: &[T], direction: SortDirection) -> Option<usize> {
    activities
        .windows(2)
        .position(|pair| match pair {
            [a, b] => compare(a, b, direction) == Ordering::Greater,
            _ => false,
        })
}

/// Merge two sorted lists into their sorted union, logging unsorted inputs
/// through [`TracingDiagnostics`].
///
/// When an id appears in both lists, the record from `first` wins, even if
/// the two copies sit at different positions (a pending entry that has
/// since confirmed, for instance).
pub fn merge<T: Activity + Clone>(first: &[T], second: &[T], direction: SortDirection) -> Vec<T> {
    merge_with(first, second, direction, &TracingDiagnostics)
}

/// [`merge`] with an explicit diagnostic sink.
pub fn merge_with<T, D>(first: &[T], second: &[T], direction: SortDirection, sink: &D) -> Vec<T>
where
    T: Activity + Clone,
    D: DiagnosticSink + ?Sized,
{
    let first = ensure_sorted(first, 0, direction, sink);
    let second = ensure_sorted(second, 1, direction, sink);

    let first_ids: HashSet<&str> = first.iter().map(|a| a.id()).collect();
    let mut emitted: HashSet<&str> = HashSet::with_capacity(first.len() + second.len());
    let mut merged = Vec::with_capacity(first.len() + second.len());

    let mut left = first.iter().peekable();
    let mut right = second
        .iter()
        .filter(|a| !first_ids.contains(a.id()))
        .peekable();

    loop {
        let next = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => {
                if compare(*a, *b, direction) == Ordering::Greater {
                    right.next()
                } else {
                    left.next()
                }
            }
            (Some(_), None) => left.next(),
            (None, Some(_)) => right.next(),
            (None, None) => break,
        };

        if let Some(activity) = next {
            if emitted.insert(activity.id()) {
                merged.push(activity.clone());
            }
        }
    }

    merged
}

/// Merge a freshly fetched head page into a known list, both sorted
/// [`SortDirection::Descending`], keeping only the window both lists cover.
///
/// The cutoff is the larger of the two lists' last timestamps; entries older
/// than it are dropped from both sides before merging. This bounds the work
/// to the fresh window, so it is only suitable for rolling updates, never
/// for assembling a full history. An empty side returns the other unchanged.
pub fn merge_to_max_time<T: Activity + Clone>(known: &[T], fresh: &[T]) -> Vec<T> {
    merge_to_max_time_with(known, fresh, &TracingDiagnostics)
}

/// [`merge_to_max_time`] with an explicit diagnostic sink.
pub fn merge_to_max_time_with<T, D>(known: &[T], fresh: &[T], sink: &D) -> Vec<T>
where
    T: Activity + Clone,
    D: DiagnosticSink + ?Sized,
{
    let (Some(known_last), Some(fresh_last)) = (known.last(), fresh.last()) else {
        return if known.is_empty() {
            fresh.to_vec()
        } else {
            known.to_vec()
        };
    };

    let cutoff = known_last.timestamp().max(fresh_last.timestamp());
    let within = |list: &[T]| -> Vec<T> {
        list.iter()
            .filter(|a| a.timestamp() >= cutoff)
            .cloned()
            .collect()
    };

    merge_with(
        &within(known),
        &within(fresh),
        SortDirection::Descending,
        sink,
    )
}

/// Borrow the list if sorted, otherwise report it and return a sorted copy.
fn ensure_sorted<'a, T, D>(
    list: &'a [T],
    list_index: usize,
    direction: SortDirection,
    sink: &D,
) -> std::borrow::Cow<'a, [T]>
where
    T: Activity + Clone,
    D: DiagnosticSink + ?Sized,
{
    match first_violation(list, direction) {
        None => std::borrow::Cow::Borrowed(list),
        Some(position) => {
            sink.unsorted_input(&UnsortedInput {
                list_index,
                len: list.len(),
                first_violation: position,
                direction,
                backtrace: Backtrace::capture(),
            });
            std::borrow::Cow::Owned(sort(list, direction))
        }
    }
}
