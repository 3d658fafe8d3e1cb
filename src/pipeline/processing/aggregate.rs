use tracing::debug;

use crate::types::ImpactRecord;

/// Placeholder written when a predictor has nothing to say
pub const NA: &str = "NA";

/// Lower median of a set of rank scores.
///
/// `NA` entries and anything that does not parse as a number are dropped; the survivors are
/// sorted ascending and the element at `floor(n / 2)` is returned in its original text form.
/// With no survivors the result is `NA`.
pub fn median_rank<S: AsRef<str>>(scores: &[Option<S>]) -> String {
    let mut values: Vec<(f64, &str)> = scores
        .iter()
        .flatten()
        .map(|s| AsRef::<str>::as_ref(s).trim())
        .filter(|s| !s.is_empty() && *s != NA)
        .filter_map(|s| match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Some((v, s)),
            _ => {
                debug!(score = %s, "Ignoring unparseable rank score");
                None
            }
        })
        .collect();

    if values.is_empty() {
        return NA.to_string();
    }

    values.sort_by(|a, b| a.0.total_cmp(&b.0));
    values[values.len() / 2].1.to_string()
}

/// Recompute `median_rank` for each impact row, returning only rows whose value changed.
pub fn refresh_median_ranks(impacts: &[ImpactRecord]) -> Vec<ImpactRecord> {
    impacts
        .iter()
        .filter_map(|impact| {
            let median = median_rank(&impact.rank_scores());
            if impact.median_rank.as_deref() == Some(median.as_str()) {
                return None;
            }
            let mut update = ImpactRecord::new(impact.mutation_id.clone());
            update.median_rank = Some(median);
            Some(update)
        })
        .collect()
}
