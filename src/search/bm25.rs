//! Okapi BM25 scorer.

use crate::attribute::AttributeView;
use crate::attribute::kinds::{Document, Frequency, Norm};
use crate::error::{Result, SagittaError};
use crate::index::field::{FieldInfo, IndexFeatures};
use crate::index::reader::SegmentReader;
use crate::search::sort::{
    Boost, Collector, Scorer, ScoreCtx, ScoreStats, StatsCollector,
};
use std::rc::Rc;

fn read_f32(buf: &[u8]) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[..4]);
    f32::from_le_bytes(bytes)
}

fn write_f32(buf: &mut [u8], value: f32) {
    buf[..4].copy_from_slice(&value.to_le_bytes());
}

/// BM25 ranking with configurable `k1` and `b`.
///
/// Document length is recovered from the field's norm column (norms store
/// `1/sqrt(len)`); documents without a stored norm score against the average
/// field length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BM25 {
    k1: f32,
    b: f32,
}

impl BM25 {
    /// The registry name of this scorer.
    pub const NAME: &'static str = "bm25";

    /// A BM25 scorer with explicit parameters.
    pub fn new(k1: f32, b: f32) -> Self {
        BM25 { k1, b }
    }

    /// Parse `"k1,b"` (or `"k1"`, or empty for defaults).
    pub fn from_args(args: &str) -> Result<Self> {
        let args = args.trim();
        if args.is_empty() {
            return Ok(BM25::default());
        }
        let mut parts = args.split(',').map(str::trim);
        let k1 = parts
            .next()
            .unwrap_or_default()
            .parse::<f32>()
            .map_err(|_| SagittaError::malformed_args(format!("bm25: bad k1 in '{args}'")))?;
        let b = match parts.next() {
            Some(raw) => raw
                .parse::<f32>()
                .map_err(|_| SagittaError::malformed_args(format!("bm25: bad b in '{args}'")))?,
            None => BM25::default().b,
        };
        if parts.next().is_some() {
            return Err(SagittaError::malformed_args(format!(
                "bm25: expected 'k1,b', got '{args}'"
            )));
        }
        Ok(BM25::new(k1, b))
    }
}

impl Default for BM25 {
    fn default() -> Self {
        BM25 { k1: 1.2, b: 0.75 }
    }
}

struct BM25Ctx {
    freq: Option<crate::attribute::AttrRef<Frequency>>,
    norm: Option<Norm>,
    k1: f32,
    b: f32,
    avg_len: f32,
    /// `boost * idf * (k1 + 1)`, constant per segment.
    weight: f32,
}

impl ScoreCtx for BM25Ctx {
    fn score(&self, dst: &mut [u8]) {
        let freq = self
            .freq
            .as_ref()
            .map_or(1.0, |cell| cell.borrow().value as f32);
        let doc_len = match &self.norm {
            Some(norm) => {
                let value = norm.read();
                if value > 0.0 {
                    1.0 / (value * value)
                } else {
                    self.avg_len
                }
            }
            None => self.avg_len,
        };
        let denom = freq + self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_len);
        write_f32(dst, self.weight * freq / denom);
    }
}

impl Scorer for BM25 {
    fn bucket_size(&self) -> usize {
        size_of::<f32>()
    }

    fn features(&self) -> IndexFeatures {
        IndexFeatures::FREQ | IndexFeatures::NORM
    }

    fn new_collector(&self) -> Box<dyn Collector> {
        Box::new(StatsCollector::default())
    }

    fn prepare_scorer(
        &self,
        segment: &dyn SegmentReader,
        field: Option<&FieldInfo>,
        stats: &ScoreStats,
        boost: Boost,
        doc_attrs: AttributeView<'_>,
    ) -> Result<Box<dyn ScoreCtx>> {
        let freq = doc_attrs.get::<Frequency>();
        let doc = doc_attrs.get::<Document>();

        let norm = field
            .and_then(|info| info.norm_column)
            .and_then(|column| segment.values(column))
            .zip(doc)
            .map(|(values, doc)| {
                let mut norm = Norm::default();
                norm.reset(
                    Rc::new(move |id| {
                        values(id)
                            .and_then(|bytes| bytes.try_into().ok())
                            .map(f32::from_le_bytes)
                    }),
                    doc,
                );
                norm
            });

        let total = stats.total_docs.max(1) as f32;
        let matching = stats.docs_with_term as f32;
        let idf = (1.0 + (total - matching + 0.5) / (matching + 0.5)).ln();
        let avg_len = if stats.docs_with_field > 0 {
            (stats.sum_total_term_freq as f32 / stats.docs_with_field as f32).max(f32::EPSILON)
        } else {
            1.0
        };

        Ok(Box::new(BM25Ctx {
            freq,
            norm,
            k1: self.k1,
            b: self.b,
            avg_len,
            weight: boost * idf * (self.k1 + 1.0),
        }))
    }

    fn less(&self, lhs: &[u8], rhs: &[u8]) -> bool {
        read_f32(lhs) < read_f32(rhs)
    }

    fn add(&self, dst: &mut [u8], src: &[u8]) {
        write_f32(dst, read_f32(dst) + read_f32(src));
    }

    fn scale(&self, buf: &mut [u8], factor: f32) {
        write_f32(buf, read_f32(buf) * factor);
    }

    fn constant(&self, dst: &mut [u8], boost: Boost) {
        write_f32(dst, boost);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args() {
        assert_eq!(BM25::from_args("").unwrap(), BM25::default());
        assert_eq!(BM25::from_args("1.5,0.3").unwrap(), BM25::new(1.5, 0.3));
        assert_eq!(BM25::from_args("2.0").unwrap(), BM25::new(2.0, 0.75));
        assert!(BM25::from_args("nope").is_err());
        assert!(BM25::from_args("1.0,0.5,9").is_err());
    }

    #[test]
    fn test_bucket_ops() {
        let scorer = BM25::default();
        let mut a = vec![0u8; 4];
        let mut b = vec![0u8; 4];
        scorer.constant(&mut a, 1.0);
        scorer.constant(&mut b, 2.0);
        assert!(scorer.less(&a, &b));
        assert!(!scorer.less(&b, &a));

        scorer.add(&mut a, &b);
        assert_eq!(read_f32(&a), 3.0);
        scorer.scale(&mut a, 2.0);
        assert_eq!(read_f32(&a), 6.0);
    }
}
