//! Sample frame - one multi-axis IMU reading captured at one sampling instant.

/// Largest axis count supported (accelerometer + gyroscope).
pub const MAX_AXES: usize = 6;

/// Type used to store sensor samples.
pub type SampleValue = i16;

/// One captured frame.
///
/// Storage is fixed at [`MAX_AXES`] values so frames can live in a
/// preallocated slot array; only the first `axes` values are meaningful.
/// Accelerometer axes come first (x, y, z), then gyroscope axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleFrame {
    values: [SampleValue; MAX_AXES],
    axes: u8,
}

impl SampleFrame {
    /// All-zero frame with `axes` active values (clamped to [`MAX_AXES`]).
    pub fn zeroed(axes: usize) -> Self {
        Self {
            values: [0; MAX_AXES],
            axes: axes.min(MAX_AXES) as u8,
        }
    }

    /// Build a frame from a slice of axis values.
    ///
    /// Returns `None` if the slice is empty or longer than [`MAX_AXES`].
    pub fn from_slice(values: &[SampleValue]) -> Option<Self> {
        if values.is_empty() || values.len() > MAX_AXES {
            return None;
        }
        let mut frame = Self::zeroed(values.len());
        frame.values[..values.len()].copy_from_slice(values);
        Some(frame)
    }

    #[inline]
    pub fn axes(&self) -> usize {
        self.axes as usize
    }

    #[inline]
    pub fn values(&self) -> &[SampleValue] {
        &self.values[..self.axes()]
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [SampleValue] {
        let axes = self.axes();
        &mut self.values[..axes]
    }

    /// Value of one axis, or 0 when the axis is not active.
    #[inline]
    pub fn axis(&self, index: usize) -> SampleValue {
        self.values().get(index).copied().unwrap_or(0)
    }
}
