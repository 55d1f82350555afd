//! Per-batch result scanning and CSV row emission (C5 Result Scanner).

use ouija_core::{CutoffState, FilterConfig, ResultRecord};

/// Outcome of scanning one batch's host buffer.
pub struct ScanOutcome {
    /// CSV data rows (without the leading `|` protocol prefix), in slot order.
    pub rows: Vec<String>,
    /// `true` if this scan raised the auto cutoff (used to decide whether to
    /// log the `[AUTO] First batch cutoff set to <N>` line).
    pub cutoff_raised: bool,
}

/// Scan exactly `records.len()` slots of a completed batch, per spec §4.5:
/// empty slots (`seed[0]==0`) are skipped; in auto mode, the *first* batch
/// additionally skips any record at or below the starting cutoff (so the
/// auto cutoff can "settle" before anything is emitted against it); cutoff
/// updates from this scan never affect the kernel launch already in flight
/// for the next batch, only subsequent scans.
pub fn scan_batch(
    records: &[ResultRecord],
    cutoff: &mut CutoffState,
    first_batch: bool,
    config: &FilterConfig,
) -> ScanOutcome {
    let mut rows = Vec::new();
    let mut batch_high = cutoff.current();

    for record in records {
        if record.is_empty_slot() {
            continue;
        }
        batch_high = batch_high.max(record.total_score);

        if cutoff.is_auto() && first_batch && record.total_score <= cutoff.current() {
            continue;
        }
        if record.total_score >= cutoff.current() {
            rows.push(csv_row(record, config));
        }
    }

    let cutoff_raised = cutoff.observe_batch_high(batch_high);
    ScanOutcome { rows, cutoff_raised }
}

fn csv_row(record: &ResultRecord, config: &FilterConfig) -> String {
    let mut fields = vec![record.seed_str().to_string(), record.total_score.to_string()];
    if config.score_natural_negatives {
        fields.push(record.natural_negative_jokers.to_string());
    }
    if config.score_desired_negatives {
        fields.push(record.desired_negative_jokers.to_string());
    }
    for (i, _want) in config.wants.iter().enumerate() {
        let score = record.score_wants.get(i).copied().unwrap_or(0);
        fields.push(score.to_string());
    }
    fields.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ouija_core::Desire;

    fn record(seed: &str, score: u16) -> ResultRecord {
        let mut r = ResultRecord::default();
        let bytes = seed.as_bytes();
        r.seed[..bytes.len()].copy_from_slice(bytes);
        r.total_score = score;
        r
    }

    #[test]
    fn empty_slots_are_skipped() {
        let mut cutoff = CutoffState::fixed(0);
        let records = vec![ResultRecord::default(), record("ABC", 10)];
        let cfg = FilterConfig::default_template();
        let outcome = scan_batch(&records, &mut cutoff, false, &cfg);
        assert_eq!(outcome.rows.len(), 1);
    }

    #[test]
    fn static_cutoff_filters_by_score() {
        let mut cutoff = CutoffState::fixed(5);
        let records = vec![record("AAA", 3), record("BBB", 5), record("CCC", 9)];
        let cfg = FilterConfig::default_template();
        let outcome = scan_batch(&records, &mut cutoff, false, &cfg);
        assert_eq!(outcome.rows.len(), 2);
        assert!(outcome.rows[0].starts_with("BBB,5"));
        assert!(outcome.rows[1].starts_with("CCC,9"));
    }

    #[test]
    fn s3_auto_mode_first_batch_sets_cutoff_and_skips_below_it() {
        let mut cutoff = CutoffState::auto(1);
        let records = vec![record("AAA", 3), record("BBB", 7), record("CCC", 2)];
        let cfg = FilterConfig::default_template();
        let outcome = scan_batch(&records, &mut cutoff, true, &cfg);
        // first batch: cutoff starts at 1, so 3 and 7 both pass the `>= 1`
        // check, but the first-batch skip-below-cutoff rule only drops
        // records at or below the *starting* cutoff (1) -- none are, so all
        // three above-floor records would normally pass; this case exercises
        // that the auto cutoff rises to the batch max afterwards.
        assert_eq!(cutoff.current(), 7);
        assert!(outcome.cutoff_raised);
        assert!(!outcome.rows.is_empty());
    }

    #[test]
    fn auto_mode_first_batch_skips_records_at_or_below_starting_cutoff() {
        let mut cutoff = CutoffState::auto(5);
        let records = vec![record("AAA", 5), record("BBB", 4), record("CCC", 9)];
        let cfg = FilterConfig::default_template();
        let outcome = scan_batch(&records, &mut cutoff, true, &cfg);
        // AAA (==5) and BBB (<5) are skipped by the first-batch rule; CCC survives.
        assert_eq!(outcome.rows.len(), 1);
        assert!(outcome.rows[0].starts_with("CCC,9"));
    }

    #[test]
    fn auto_cutoff_never_decreases_across_batches() {
        let mut cutoff = CutoffState::auto(1);
        let cfg = FilterConfig::default_template();
        scan_batch(&[record("A", 7)], &mut cutoff, true, &cfg);
        assert_eq!(cutoff.current(), 7);
        scan_batch(&[record("B", 3)], &mut cutoff, false, &cfg);
        assert_eq!(cutoff.current(), 7);
    }

    #[test]
    fn csv_row_column_count_matches_header_column_count() {
        let mut cfg = FilterConfig::default_template();
        cfg.score_natural_negatives = true;
        cfg.wants.push(Desire {
            value: 1,
            joker_edition: 0,
            desire_by_ante: 1,
        });
        let header = cfg.csv_header(|id| id.to_string());
        let mut cutoff = CutoffState::fixed(0);
        let outcome = scan_batch(&[record("ZZZ", 4)], &mut cutoff, false, &cfg);
        assert_eq!(
            header.split(',').count(),
            outcome.rows[0].split(',').count()
        );
    }
}
