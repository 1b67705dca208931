//! Small signal filters shared by the device tasks.

/// Largest window any task asks for.
pub const MAX_WINDOW: usize = 16;

/// Fixed-capacity rolling average.
///
/// Until the window fills, the average is taken over the samples seen so
/// far rather than padding with zeros.
#[derive(Debug, Clone)]
pub struct RollingAverage {
    ring: [f32; MAX_WINDOW],
    window: usize,
    head: usize,
    count: usize,
}

impl RollingAverage {
    /// `window` is clamped to `1..=MAX_WINDOW`.
    pub fn new(window: usize) -> Self {
        Self {
            ring: [0.0; MAX_WINDOW],
            window: window.clamp(1, MAX_WINDOW),
            head: 0,
            count: 0,
        }
    }

    /// Add a sample and return the new average.
    pub fn push(&mut self, value: f32) -> f32 {
        self.ring[self.head] = value;
        self.head = (self.head + 1) % self.window;
        if self.count < self.window {
            self.count += 1;
        }
        self.mean()
    }

    /// Average of the samples in the window, or `None` before the first.
    pub fn average(&self) -> Option<f32> {
        (self.count > 0).then(|| self.mean())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
    }

    fn mean(&self) -> f32 {
        let sum: f32 = self.ring[..self.count].iter().sum();
        sum / self.count as f32
    }
}

/// Change gate for noisy ADC readings: accepts a sample only when it moves
/// more than `threshold` counts from the last accepted one.
#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    last: u16,
    threshold: u16,
}

impl Debounce {
    pub const fn new(threshold: u16) -> Self {
        Self { last: 0, threshold }
    }

    /// Returns `true` (and remembers `raw`) if the sample moved enough.
    pub fn accept(&mut self, raw: u16) -> bool {
        if raw.abs_diff(self.last) > self.threshold {
            self.last = raw;
            true
        } else {
            false
        }
    }

    pub fn last(&self) -> u16 {
        self.last
    }
}
