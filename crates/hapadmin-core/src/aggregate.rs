//! Running one operation on every process and folding the answers.
//!
//! Counters fold by sum or average according to the metric tables.
//! Categorical values must agree across processes or the call fails with
//! the full per-process [`ResultSet`] attached; divergence is never
//! resolved silently.

use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::HapError;
use crate::tables::{AddressChange, CommandOutcome, Reduction, classify, is_error_output, reduction_for};
use crate::wire::MetricValue;

/// Per-process results, as `(process ordinal, value)` pairs.
pub type ResultSet<T> = Vec<(u32, T)>;

/// Anything that lives on exactly one HAProxy process.
pub trait ProcessBound {
    fn process_num(&self) -> u32;
}

impl ProcessBound for Endpoint {
    fn process_num(&self) -> u32 {
        Endpoint::process_num(self)
    }
}

impl<T: ProcessBound + ?Sized> ProcessBound for Arc<T> {
    fn process_num(&self) -> u32 {
        (**self).process_num()
    }
}

/// Run `op` on each handle in order and collect the results.
///
/// The first failure aborts the remaining handles; the transport has
/// already retried, so nothing is retried here.
pub async fn run_across<H, T, F>(handles: &[H], op: F) -> Result<ResultSet<T>, HapError>
where
    H: ProcessBound,
    F: AsyncFn(&H) -> Result<T, HapError>,
{
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push((handle.process_num(), op(handle).await?));
    }
    Ok(results)
}

/// Fold raw per-process values of metric `name`.
///
/// Values that do not convert to integers are dropped; nothing left
/// folds to 0. An unclassified name is always an error, and so is a sum
/// that leaves the `i128` range.
pub fn reduce_metric(name: &str, results: &ResultSet<String>) -> Result<i128, HapError> {
    let reduction = reduction_for(name).ok_or_else(|| HapError::UnknownMetric {
        name: name.to_string(),
    })?;
    let values: Vec<i128> = results
        .iter()
        .filter_map(|(_, raw)| MetricValue::convert(raw))
        .filter_map(|value| value.as_int())
        .collect();
    if values.is_empty() {
        return Ok(0);
    }
    let sum = checked_sum(name, values.iter().copied())?;
    Ok(match reduction {
        Reduction::Sum => sum,
        Reduction::Average => sum / values.len() as i128,
    })
}

/// Add up `values`, failing instead of wrapping.
pub fn checked_sum(name: &str, values: impl IntoIterator<Item = i128>) -> Result<i128, HapError> {
    values
        .into_iter()
        .try_fold(0i128, |total, value| total.checked_add(value))
        .ok_or_else(|| HapError::Overflow {
            name: name.to_string(),
        })
}

/// The single value every process agrees on.
///
/// Equality is decided on `T` itself. The fault carries the values in
/// their `Display` form, so two distinct values that print alike (such as
/// `MetricValue::Int(5)` and `MetricValue::Text("5")`) look the same in
/// the diagnostic even though they were told apart.
pub fn reduce_consistent<T>(results: ResultSet<T>) -> Result<T, HapError>
where
    T: Eq + Hash + Display,
{
    let distinct: HashSet<&T> = results.iter().map(|(_, value)| value).collect();
    if distinct.len() > 1 {
        return Err(HapError::Inconsistent {
            results: stringify(&results),
        });
    }
    results
        .into_iter()
        .next()
        .map(|(_, value)| value)
        .ok_or(HapError::NoEndpoints)
}

/// Interpret the output of an administrative command run on every process.
pub fn reduce_command(results: ResultSet<String>) -> Result<bool, HapError> {
    let message = agreed_message(results)?;
    match classify(&message) {
        CommandOutcome::Success => Ok(true),
        CommandOutcome::KnownError | CommandOutcome::UnknownError => {
            Err(HapError::CommandFailed { message })
        }
    }
}

/// Interpret the output of `set server ... addr`, which reports success
/// with free-form text rather than silence.
pub fn reduce_address_change(change: AddressChange, results: ResultSet<String>) -> Result<bool, HapError> {
    let message = agreed_message(results)?;
    if change.succeeded(&message) {
        Ok(true)
    } else {
        Err(HapError::CommandFailed { message })
    }
}

/// Reject multi-line output whose first line is a documented error.
pub fn check_output(lines: Vec<String>) -> Result<Vec<String>, HapError> {
    match lines.first() {
        Some(first) if is_error_output(first) => Err(HapError::CommandFailed {
            message: first.clone(),
        }),
        _ => Ok(lines),
    }
}

fn agreed_message(results: ResultSet<String>) -> Result<String, HapError> {
    let distinct: HashSet<&String> = results.iter().map(|(_, message)| message).collect();
    if distinct.len() > 1 {
        return Err(HapError::MultipleResults { results });
    }
    results
        .into_iter()
        .next()
        .map(|(_, message)| message)
        .ok_or(HapError::NoEndpoints)
}

fn stringify<T: Display>(results: &ResultSet<T>) -> ResultSet<String> {
    results
        .iter()
        .map(|(process, value)| (*process, value.to_string()))
        .collect()
}

/// Boolean view of a fallible call, for callers that only care whether it
/// worked. The discarded error is logged at debug level.
pub trait Lenient {
    fn succeeded(self) -> bool;
}

impl<T> Lenient for Result<T, HapError> {
    fn succeeded(self) -> bool {
        match self {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "ignoring failure");
                false
            }
        }
    }
}
