//! Raw row batches as pulled from a record source.

use immostat_types::record::RawRecord;

/// A fixed-size slice of the input, in input order. `seq` numbers batches
/// from zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    pub seq: u64,
    pub rows: Vec<RawRecord>,
}

impl RawBatch {
    pub fn new(seq: u64, rows: Vec<RawRecord>) -> Self {
        RawBatch { seq, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Split rows into batches of at most `batch_size` rows.
pub fn into_batches(rows: Vec<RawRecord>, batch_size: usize) -> Vec<RawBatch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(rows.len().div_ceil(batch_size));
    let mut iter = rows.into_iter().peekable();
    let mut seq = 0;
    while iter.peek().is_some() {
        let chunk: Vec<RawRecord> = iter.by_ref().take(batch_size).collect();
        batches.push(RawBatch::new(seq, chunk));
        seq += 1;
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_batches() {
        let rows = vec![RawRecord::default(); 5];
        let batches = into_batches(rows, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches.iter().map(|b| b.num_rows()).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert_eq!(batches[2].seq, 2);
        assert!(into_batches(Vec::new(), 10).is_empty());
    }
}
