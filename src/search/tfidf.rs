//! TF-IDF scorer.

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

/// Classic `sqrt(tf) * idf` ranking, optionally norm-weighted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TfIdf {
    with_norms: bool,
}

impl TfIdf {
    /// The registry name of this scorer.
    pub const NAME: &'static str = "tfidf";

    /// A TF-IDF scorer; `with_norms` folds the field norm into the score.
    pub fn new(with_norms: bool) -> Self {
        TfIdf { with_norms }
    }

    /// Parse `"true"`/`"false"` (norm weighting), empty for the default.
    pub fn from_args(args: &str) -> Result<Self> {
        match args.trim() {
            "" => Ok(TfIdf::default()),
            "true" => Ok(TfIdf::new(true)),
            "false" => Ok(TfIdf::new(false)),
            other => Err(SagittaError::malformed_args(format!(
                "tfidf: expected 'true' or 'false', got '{other}'"
            ))),
        }
    }
}

struct TfIdfCtx {
    freq: Option<crate::attribute::AttrRef<Frequency>>,
    norm: Option<Norm>,
    /// `boost * idf`, constant per segment.
    weight: f32,
}

impl ScoreCtx for TfIdfCtx {
    fn score(&self, dst: &mut [u8]) {
        let freq = self
            .freq
            .as_ref()
            .map_or(1.0, |cell| cell.borrow().value as f32);
        let norm = self.norm.as_ref().map_or(1.0, Norm::read);
        write_f32(dst, self.weight * freq.sqrt() * norm);
    }
}

impl Scorer for TfIdf {
    fn bucket_size(&self) -> usize {
        size_of::<f32>()
    }

    fn features(&self) -> IndexFeatures {
        if self.with_norms {
            IndexFeatures::FREQ | IndexFeatures::NORM
        } else {
            IndexFeatures::FREQ
        }
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
        let norm = if self.with_norms {
            field
                .and_then(|info| info.norm_column)
                .and_then(|column| segment.values(column))
                .zip(doc_attrs.get::<Document>())
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
                })
        } else {
            None
        };

        let total = stats.total_docs.max(1) as f32;
        let matching = stats.docs_with_term as f32;
        let idf = 1.0 + ((total + 1.0) / (matching + 1.0)).ln();

        Ok(Box::new(TfIdfCtx {
            freq,
            norm,
            weight: boost * idf,
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
        assert_eq!(TfIdf::from_args("").unwrap(), TfIdf::default());
        assert_eq!(TfIdf::from_args("true").unwrap(), TfIdf::new(true));
        assert_eq!(TfIdf::from_args("false").unwrap(), TfIdf::new(false));
        assert!(TfIdf::from_args("yes").is_err());
    }

    #[test]
    fn test_features_follow_norm_flag() {
        assert!(!TfIdf::new(false).features().contains(IndexFeatures::NORM));
        assert!(TfIdf::new(true).features().contains(IndexFeatures::NORM));
    }
}
