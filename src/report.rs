//! Recognition reports - per-verdict records handed from the loop to a writer
//!
//! The loop must not block on serial output, so reports are fixed-size
//! `Copy` records pushed into a bounded lock-free queue. When the writer
//! falls behind, new reports are dropped and counted instead of stalling
//! acquisition. The writer side serializes each report as one JSON line:
//!
//! ```text
//! {"ModelNumber":0,"Classification":6,"FeatureLength":3,"FeatureVector":[20,20,21]}
//! ```

use std::io::{self, Write};

use rtrb::{Consumer, Producer, RingBuffer};
use serde::Serialize;

use crate::analysis::ClassId;

/// Largest feature vector carried by a report; longer vectors are truncated.
pub const MAX_REPORT_FEATURES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognitionReport {
    pub model_number: u16,
    pub classification: ClassId,
    feature_len: u8,
    features: [u8; MAX_REPORT_FEATURES],
}

#[derive(Serialize)]
struct ReportLine<'a> {
    #[serde(rename = "ModelNumber")]
    model_number: u16,
    #[serde(rename = "Classification")]
    classification: ClassId,
    #[serde(rename = "FeatureLength", skip_serializing_if = "Option::is_none")]
    feature_length: Option<usize>,
    #[serde(rename = "FeatureVector", skip_serializing_if = "Option::is_none")]
    feature_vector: Option<&'a [u8]>,
}

impl RecognitionReport {
    pub fn new(model_number: u16, classification: ClassId, features: &[u8]) -> Self {
        let len = features.len().min(MAX_REPORT_FEATURES);
        let mut stored = [0u8; MAX_REPORT_FEATURES];
        stored[..len].copy_from_slice(&features[..len]);
        Self {
            model_number,
            classification,
            feature_len: len as u8,
            features: stored,
        }
    }

    pub fn features(&self) -> &[u8] {
        &self.features[..self.feature_len as usize]
    }

    /// One JSON object, without the trailing newline.
    pub fn to_json(&self, include_features: bool) -> serde_json::Result<String> {
        let features = include_features.then(|| self.features());
        serde_json::to_string(&ReportLine {
            model_number: self.model_number,
            classification: self.classification,
            feature_length: features.map(<[u8]>::len),
            feature_vector: features,
        })
    }
}

/// Split report queue handles
pub struct ReportChannels {
    pub sink: ReportSink,
    pub drain: ReportDrain,
}

pub struct ReportQueue;

impl ReportQueue {
    /// Allocate a queue holding up to `capacity` reports.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize, include_features: bool) -> ReportChannels {
        let (producer, consumer) = RingBuffer::new(capacity);
        ReportChannels {
            sink: ReportSink {
                producer,
                dropped: 0,
            },
            drain: ReportDrain {
                consumer,
                include_features,
            },
        }
    }
}

/// Loop side of the report queue.
pub struct ReportSink {
    producer: Producer<RecognitionReport>,
    dropped: u64,
}

impl ReportSink {
    /// Queue a report; returns `false` (and counts a drop) when full.
    pub fn push(&mut self, report: RecognitionReport) -> bool {
        match self.producer.push(report) {
            Ok(()) => true,
            Err(_) => {
                self.dropped += 1;
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Writer side of the report queue.
pub struct ReportDrain {
    consumer: Consumer<RecognitionReport>,
    include_features: bool,
}

impl ReportDrain {
    pub fn pop(&mut self) -> Option<RecognitionReport> {
        self.consumer.pop().ok()
    }

    /// Write every queued report as a JSON line; returns the number written.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<usize> {
        let mut written = 0;
        while let Ok(report) = self.consumer.pop() {
            let line = report
                .to_json(self.include_features)
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
            writeln!(out, "{}", line)?;
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_with_features() {
        let report = RecognitionReport::new(0, ClassId(6), &[20, 20, 21]);
        assert_eq!(
            report.to_json(true).unwrap(),
            r#"{"ModelNumber":0,"Classification":6,"FeatureLength":3,"FeatureVector":[20,20,21]}"#
        );
    }

    #[test]
    fn test_json_without_features() {
        let report = RecognitionReport::new(2, ClassId(1), &[1, 2, 3]);
        assert_eq!(
            report.to_json(false).unwrap(),
            r#"{"ModelNumber":2,"Classification":1}"#
        );
    }

    #[test]
    fn test_long_feature_vectors_truncate() {
        let features: Vec<u8> = (0..40).collect();
        let report = RecognitionReport::new(0, ClassId(0), &features);
        assert_eq!(report.features().len(), MAX_REPORT_FEATURES);
        assert_eq!(report.features()[15], 15);
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let ReportChannels { mut sink, mut drain } = ReportQueue::new(2, false);
        for class in 0..5 {
            sink.push(RecognitionReport::new(0, ClassId(class), &[]));
        }
        assert_eq!(sink.dropped(), 3);

        // Oldest reports survive
        assert_eq!(drain.pop().map(|r| r.classification), Some(ClassId(0)));
        assert_eq!(drain.pop().map(|r| r.classification), Some(ClassId(1)));
        assert!(drain.pop().is_none());
    }

    #[test]
    fn test_write_to_emits_json_lines() {
        let ReportChannels { mut sink, mut drain } = ReportQueue::new(8, true);
        sink.push(RecognitionReport::new(0, ClassId(3), &[7]));
        sink.push(RecognitionReport::new(0, ClassId(4), &[8]));

        let mut out = Vec::new();
        assert_eq!(drain.write_to(&mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["Classification"], 4);
        assert_eq!(parsed["FeatureVector"][0], 8);
        assert_eq!(drain.write_to(&mut Vec::new()).unwrap(), 0);
    }
}
