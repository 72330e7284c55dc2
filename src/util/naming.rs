//! Metric identity helpers.
//!
//! Names produced here are published into the shared external-metrics
//! namespace, so both the normalisation and the `s<index>-` prefix are part of
//! the external API and must stay stable.

/// Normalise a raw name into a form accepted by the external metrics API.
///
/// The result is lowercase, every run of characters outside `[a-z0-9]`
/// collapses into a single `-`, and leading or trailing separators are
/// dropped.
pub fn normalize_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !out.is_empty() {
                out.push('-');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }

    out
}

/// Qualify a metric name with the trigger's position on its workload
pub fn generate_metric_name_with_index(scaler_index: usize, metric_name: &str) -> String {
    format!("s{}-{}", scaler_index, metric_name)
}
