// PmeClassifier - pattern-matching-engine knowledge pack
//
// Pipeline per frame:
//   1. Push the selected axis into a sliding window of `window_len` samples
//   2. Every `slide` frames once the window is full, extract the features:
//      - PositiveZeroCrossings: upward crossings of the window mean
//      - NegativeZeroCrossings: downward crossings of the window mean
//      - GlobalPeaktoPeakofLowFrequency: peak-to-peak of a moving average
//      Crossings use a dead band around the mean so sensor noise does not
//      count. All features are scaled to u8.
//   3. Match the vector against the stored prototypes: every prototype whose
//      influence field (L1 radius) contains the vector fires; the nearest
//      firing prototype wins. Nothing fires -> unknown class.
//
// Prototypes are learned RCE-style: a new vector shrinks the fields of
// other-class prototypes that contain it and is committed as a prototype
// unless a same-class prototype already covers it.

use super::classifier::{ClassId, Classifier, ModelInfo};
use crate::capture::{SampleFrame, SampleValue};
use crate::error::ClassifierError;

pub const FEATURE_LEN: usize = 3;

/// Feature functions this pack computes, in vector order.
pub const SUPPORTED_FEATURES: [&str; FEATURE_LEN] = [
    "PositiveZeroCrossings",
    "NegativeZeroCrossings",
    "GlobalPeaktoPeakofLowFrequency",
];

pub type FeatureVector = [u8; FEATURE_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmeSettings {
    /// Samples per feature window.
    pub window_len: usize,
    /// Frames between decisions once the window is full.
    pub slide: usize,
    /// Frame axis fed to the window.
    pub axis: usize,
    /// Half-width of the dead band around the window mean.
    pub deadband: SampleValue,
    /// Moving-average width for the low-frequency signal.
    pub smoothing: usize,
    /// Largest influence field given to a new prototype.
    pub max_influence: u16,
    /// Fields are never shrunk below this.
    pub min_influence: u16,
}

impl Default for PmeSettings {
    fn default() -> Self {
        Self {
            window_len: 100,
            slide: 50,
            axis: 0,
            deadband: 200,
            smoothing: 5,
            max_influence: 48,
            min_influence: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prototype {
    pub class_id: ClassId,
    pub vector: FeatureVector,
    pub influence: u16,
}

impl Prototype {
    fn distance(&self, vector: &FeatureVector) -> u16 {
        l1_distance(&self.vector, vector)
    }
}

fn l1_distance(a: &FeatureVector, b: &FeatureVector) -> u16 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x as i16 - y as i16).unsigned_abs())
        .sum()
}

/// Compute the feature vector of one time-ordered window. Does not allocate.
pub fn extract_features(window: &[SampleValue], deadband: SampleValue, smoothing: usize) -> FeatureVector {
    if window.is_empty() {
        return [0; FEATURE_LEN];
    }

    let sum: i64 = window.iter().map(|&v| v as i64).sum();
    let mean = sum / window.len() as i64;
    let upper = mean + deadband as i64;
    let lower = mean - deadband as i64;

    // 1 above the band, -1 below, 0 before the signal first leaves the band
    let mut side = 0i8;
    let mut positive = 0u32;
    let mut negative = 0u32;
    for &v in window {
        let v = v as i64;
        if v > upper {
            if side < 0 {
                positive += 1;
            }
            side = 1;
        } else if v < lower {
            if side > 0 {
                negative += 1;
            }
            side = -1;
        }
    }

    let width = smoothing.clamp(1, window.len());
    let mut running: i64 = window[..width].iter().map(|&v| v as i64).sum();
    let mut low = running;
    let mut high = running;
    for i in width..window.len() {
        running += window[i] as i64 - window[i - width] as i64;
        low = low.min(running);
        high = high.max(running);
    }
    let peak_to_peak = (high - low) / width as i64;

    let max_crossings = (window.len() / 2).max(1) as u32;
    [
        scale_crossings(positive, max_crossings),
        scale_crossings(negative, max_crossings),
        (peak_to_peak / 257).clamp(0, 255) as u8,
    ]
}

fn scale_crossings(count: u32, max_crossings: u32) -> u8 {
    (count.min(max_crossings) * 255 / max_crossings) as u8
}

pub struct PmeClassifier {
    settings: PmeSettings,
    model: ModelInfo,
    prototypes: Vec<Prototype>,
    unknown: ClassId,
    ring: Box<[SampleValue]>,
    ordered: Box<[SampleValue]>,
    head: usize,
    filled: usize,
    since_decision: usize,
    features: FeatureVector,
    has_features: bool,
    initialized: bool,
}

impl PmeClassifier {
    pub fn new(model: ModelInfo, settings: PmeSettings) -> Self {
        Self {
            settings,
            model,
            prototypes: Vec::new(),
            unknown: ClassId::UNKNOWN,
            ring: Box::default(),
            ordered: Box::default(),
            head: 0,
            filled: 0,
            since_decision: 0,
            features: [0; FEATURE_LEN],
            has_features: false,
            initialized: false,
        }
    }

    pub fn with_prototypes(mut self, prototypes: Vec<Prototype>) -> Self {
        self.prototypes = prototypes;
        self
    }

    /// Class reported when no prototype fires.
    pub fn with_unknown_class(mut self, class_id: ClassId) -> Self {
        self.unknown = class_id;
        self
    }

    pub fn unknown_class(&self) -> ClassId {
        self.unknown
    }

    pub fn settings(&self) -> &PmeSettings {
        &self.settings
    }

    pub fn prototypes(&self) -> &[Prototype] {
        &self.prototypes
    }

    /// Teach one labelled feature vector.
    ///
    /// Returns `true` if a new prototype was committed.
    pub fn learn(&mut self, class_id: ClassId, vector: FeatureVector) -> bool {
        let min_influence = self.settings.min_influence;
        let mut nearest_other = self.settings.max_influence;
        let mut covered = false;

        for proto in &mut self.prototypes {
            let distance = proto.distance(&vector);
            if proto.class_id == class_id {
                covered |= distance < proto.influence;
            } else {
                if distance < proto.influence {
                    proto.influence = distance.max(min_influence);
                }
                nearest_other = nearest_other.min(distance);
            }
        }

        if covered || nearest_other < min_influence {
            return false;
        }

        self.prototypes.push(Prototype {
            class_id,
            vector,
            influence: nearest_other,
        });
        true
    }

    /// Teach every full window of a recorded signal, stepping by `slide`.
    pub fn learn_signal(&mut self, class_id: ClassId, signal: &[SampleValue]) -> usize {
        let PmeSettings {
            window_len,
            slide,
            deadband,
            smoothing,
            ..
        } = self.settings;
        if window_len == 0 || signal.len() < window_len {
            return 0;
        }

        let mut committed = 0;
        let mut start = 0;
        while start + window_len <= signal.len() {
            let vector = extract_features(&signal[start..start + window_len], deadband, smoothing);
            if self.learn(class_id, vector) {
                committed += 1;
            }
            start += slide.max(1);
        }
        committed
    }

    /// Nearest firing prototype, or the unknown class when none fires.
    pub fn recognize(&self, vector: &FeatureVector) -> ClassId {
        self.prototypes
            .iter()
            .map(|p| (p, p.distance(vector)))
            .filter(|(p, d)| *d < p.influence)
            .min_by_key(|(_, d)| *d)
            .map(|(p, _)| p.class_id)
            .unwrap_or(self.unknown)
    }

    fn push_sample(&mut self, value: SampleValue) {
        let len = self.ring.len();
        self.ring[self.head] = value;
        self.head = (self.head + 1) % len;
        if self.filled < len {
            self.filled += 1;
        }
    }

    fn window_features(&mut self) -> FeatureVector {
        // Oldest sample sits at `head` once the ring is full
        let (newer, older) = self.ring.split_at(self.head);
        let split = older.len();
        self.ordered[..split].copy_from_slice(older);
        self.ordered[split..].copy_from_slice(newer);
        extract_features(&self.ordered, self.settings.deadband, self.settings.smoothing)
    }
}

impl Classifier for PmeClassifier {
    fn init(&mut self) -> Result<(), ClassifierError> {
        if self.model.model_type != "PME" {
            return Err(ClassifierError::ModelInvalid {
                reason: format!("expected a PME model, got {}", self.model.model_type),
            });
        }
        for name in &self.model.feature_functions {
            if !SUPPORTED_FEATURES.contains(&name.as_str()) {
                return Err(ClassifierError::UnsupportedFeature { name: name.clone() });
            }
        }
        if self.settings.window_len < 2 || self.settings.slide == 0 {
            return Err(ClassifierError::InitFailed {
                reason: format!(
                    "window_len {} / slide {} invalid",
                    self.settings.window_len, self.settings.slide
                ),
            });
        }
        if self.unknown.index() >= self.model.num_classes() {
            return Err(ClassifierError::InitFailed {
                reason: format!("unknown class {} not in model", self.unknown),
            });
        }
        if let Some(proto) = self
            .prototypes
            .iter()
            .find(|p| p.class_id.index() >= self.model.num_classes())
        {
            return Err(ClassifierError::InitFailed {
                reason: format!("prototype class {} not in model", proto.class_id),
            });
        }

        self.ring = vec![0; self.settings.window_len].into_boxed_slice();
        self.ordered = vec![0; self.settings.window_len].into_boxed_slice();
        self.head = 0;
        self.filled = 0;
        self.since_decision = 0;
        self.has_features = false;
        self.initialized = true;

        log::info!(
            "[PME] Initialized {} with {} prototypes (window {}, slide {})",
            self.model.name,
            self.prototypes.len(),
            self.settings.window_len,
            self.settings.slide
        );
        Ok(())
    }

    fn classify(&mut self, frame: &SampleFrame) -> Option<ClassId> {
        if !self.initialized {
            return None;
        }

        self.push_sample(frame.axis(self.settings.axis));
        self.since_decision += 1;

        if self.filled < self.ring.len() || self.since_decision < self.settings.slide {
            return None;
        }
        self.since_decision = 0;

        self.features = self.window_features();
        self.has_features = true;
        Some(self.recognize(&self.features))
    }

    fn model(&self) -> &ModelInfo {
        &self.model
    }

    fn feature_vector(&self) -> &[u8] {
        if self.has_features {
            &self.features
        } else {
            &[]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_wave(len: usize, half_period: usize, amplitude: SampleValue) -> Vec<SampleValue> {
        (0..len)
            .map(|i| if (i / half_period) % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    fn frame(value: SampleValue) -> SampleFrame {
        SampleFrame::from_slice(&[value, 0, 0]).unwrap()
    }

    fn small_settings() -> PmeSettings {
        PmeSettings {
            window_len: 20,
            slide: 10,
            smoothing: 1,
            ..PmeSettings::default()
        }
    }

    #[test]
    fn test_flat_signal_has_no_features() {
        let window = vec![50; 100];
        assert_eq!(extract_features(&window, 200, 5), [0, 0, 0]);
    }

    #[test]
    fn test_zero_crossings_of_square_wave() {
        // 100 samples, 10 per half period: starts high, 5 downward and
        // 4 upward crossings
        let window = square_wave(100, 10, 1000);
        let features = extract_features(&window, 200, 1);
        assert_eq!(features[0], (4 * 255 / 50) as u8);
        assert_eq!(features[1], (5 * 255 / 50) as u8);
    }

    #[test]
    fn test_dead_band_ignores_noise() {
        let window = square_wave(100, 1, 150);
        let features = extract_features(&window, 200, 1);
        assert_eq!(features[0], 0);
        assert_eq!(features[1], 0);
    }

    #[test]
    fn test_peak_to_peak_of_smoothed_signal() {
        // Without smoothing the square wave spans 2 * 12850
        let window = square_wave(100, 25, 12850);
        let features = extract_features(&window, 200, 1);
        assert_eq!(features[2], 100);

        // Averaging over a full period flattens it
        let features = extract_features(&window, 200, 50);
        assert_eq!(features[2], 0);
    }

    #[test]
    fn test_recognize_nearest_firing_prototype() {
        let model = ModelInfo::embedded().unwrap();
        let classifier = PmeClassifier::new(model, PmeSettings::default()).with_prototypes(vec![
            Prototype {
                class_id: ClassId(2),
                vector: [10, 10, 90],
                influence: 30,
            },
            Prototype {
                class_id: ClassId(3),
                vector: [20, 20, 20],
                influence: 30,
            },
        ]);

        assert_eq!(classifier.recognize(&[12, 11, 85]), ClassId(2));
        assert_eq!(classifier.recognize(&[22, 20, 25]), ClassId(3));
        assert_eq!(classifier.recognize(&[200, 200, 200]), ClassId::UNKNOWN);

        let classifier = classifier.with_unknown_class(ClassId(5));
        assert_eq!(classifier.recognize(&[200, 200, 200]), ClassId(5));
        assert_eq!(classifier.recognize(&[12, 11, 85]), ClassId(2));
    }

    #[test]
    fn test_init_rejects_unknown_class_outside_model() {
        let model = ModelInfo::embedded().unwrap();
        let mut classifier =
            PmeClassifier::new(model, PmeSettings::default()).with_unknown_class(ClassId(7));
        assert!(matches!(
            classifier.init(),
            Err(ClassifierError::InitFailed { .. })
        ));
    }

    #[test]
    fn test_learn_shrinks_conflicting_fields() {
        let model = ModelInfo::embedded().unwrap();
        let mut classifier = PmeClassifier::new(model, PmeSettings::default());

        assert!(classifier.learn(ClassId(1), [0, 0, 0]));
        assert_eq!(classifier.prototypes()[0].influence, 48);

        // Covered by the existing class-1 field
        assert!(!classifier.learn(ClassId(1), [1, 1, 1]));

        // Other class inside the class-1 field: class-1 field shrinks to 20
        assert!(classifier.learn(ClassId(6), [10, 10, 0]));
        assert_eq!(classifier.prototypes()[0].influence, 20);
        assert_eq!(classifier.prototypes()[1].influence, 20);

        assert_eq!(classifier.recognize(&[2, 2, 0]), ClassId(1));
        assert_eq!(classifier.recognize(&[9, 9, 0]), ClassId(6));
    }

    #[test]
    fn test_classify_before_init_is_no_decision() {
        let model = ModelInfo::embedded().unwrap();
        let mut classifier = PmeClassifier::new(model, small_settings());
        assert_eq!(classifier.classify(&frame(0)), None);
    }

    #[test]
    fn test_decision_cadence() {
        let model = ModelInfo::embedded().unwrap();
        let mut classifier = PmeClassifier::new(model, small_settings());
        classifier.init().unwrap();

        let decisions: Vec<usize> = (1..=50)
            .filter(|_| classifier.classify(&frame(0)).is_some())
            .collect();
        // First decision when the window fills, then every `slide` frames
        assert_eq!(decisions, vec![20, 30, 40, 50]);
        assert_eq!(classifier.feature_vector(), &[0, 0, 0]);
    }

    #[test]
    fn test_classify_uses_learned_signal() {
        let model = ModelInfo::embedded().unwrap();
        let mut classifier = PmeClassifier::new(model, small_settings());

        let quiet = vec![0; 60];
        let busy = square_wave(60, 2, 3000);
        assert!(classifier.learn_signal(ClassId(1), &quiet) > 0);
        assert!(classifier.learn_signal(ClassId(5), &busy) > 0);
        classifier.init().unwrap();

        let mut verdicts = Vec::new();
        for &value in &busy {
            if let Some(class) = classifier.classify(&frame(value)) {
                verdicts.push(class);
            }
        }
        assert!(!verdicts.is_empty());
        assert!(verdicts.iter().all(|&c| c == ClassId(5)));
    }

    #[test]
    fn test_init_rejects_unsupported_feature() {
        let mut model = ModelInfo::embedded().unwrap();
        model.feature_functions.push("MFCC".to_string());
        let mut classifier = PmeClassifier::new(model, PmeSettings::default());
        assert_eq!(
            classifier.init(),
            Err(ClassifierError::UnsupportedFeature {
                name: "MFCC".to_string()
            })
        );
    }

    #[test]
    fn test_init_rejects_prototype_outside_model() {
        let model = ModelInfo::embedded().unwrap();
        let mut classifier = PmeClassifier::new(model, PmeSettings::default()).with_prototypes(vec![Prototype {
            class_id: ClassId(9),
            vector: [0, 0, 0],
            influence: 10,
        }]);
        assert!(matches!(
            classifier.init(),
            Err(ClassifierError::InitFailed { .. })
        ));
    }
}
