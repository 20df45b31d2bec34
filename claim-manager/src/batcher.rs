use claim_manager_ledger_client_interface::SegmentRange;

/// Splits the pending sequence numbers into maximal contiguous ranges of complete segments.
///
/// An incomplete segment is left out of every range and closes the range before it; the
/// next pending sequence number opens a new one. A gap in the sequence numbers closes the
/// open range as well. The returned ranges are sorted and disjoint.
pub(crate) fn make_ranges(pending: impl IntoIterator<Item = u64>, is_complete: impl Fn(u64) -> bool) -> Vec<SegmentRange> {
    let mut seq_nos: Vec<u64> = pending.into_iter().collect();
    seq_nos.sort_unstable();
    seq_nos.dedup();

    let mut ranges = Vec::new();
    let mut open: Option<SegmentRange> = None;

    for seq_no in seq_nos {
        if !is_complete(seq_no) {
            ranges.extend(open.take());
            continue;
        }

        open = match open {
            Some(range) if range.end.checked_add(1) == Some(seq_no) => Some(SegmentRange { end: seq_no, ..range }),
            Some(range) => {
                ranges.push(range);
                Some(SegmentRange::single(seq_no))
            }
            None => Some(SegmentRange::single(seq_no)),
        };
    }
    ranges.extend(open);

    ranges
}
