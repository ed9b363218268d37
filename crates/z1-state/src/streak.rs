/// Debounce for one field: a value becomes current only after it has been
/// observed on `threshold` consecutive updates.
///
/// A tracker built with [`StreakTracker::monotonic`] additionally rejects any
/// observation that compares below the current value, so a misread can never
/// lower it.
#[derive(Debug, Clone)]
pub struct StreakTracker<T> {
    current: Option<T>,
    pending: Option<T>,
    count: u32,
    threshold: u32,
    decreases: Option<fn(&T, &T) -> bool>,
}

impl<T: Clone + PartialEq> StreakTracker<T> {
    pub fn new(threshold: u32) -> Self {
        Self {
            current: None,
            pending: None,
            count: 0,
            threshold: threshold.max(1),
            decreases: None,
        }
    }

    /// Feed one observation. Returns true when it promoted a new current value.
    pub fn update(&mut self, value: T) -> bool {
        if let (Some(current), Some(decreases)) = (&self.current, self.decreases) {
            if decreases(&value, current) {
                self.pending = None;
                self.count = 0;
                return false;
            }
        }

        if self.pending.as_ref() == Some(&value) {
            self.count = self.count.saturating_add(1);
        } else {
            self.pending = Some(value);
            self.count = 1;
        }

        if self.count >= self.threshold && self.pending != self.current {
            self.current = self.pending.clone();
            return true;
        }
        false
    }

    /// The promoted value, `None` until the first promotion
    pub fn value(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn is_primed(&self) -> bool {
        self.current.is_some()
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.pending = None;
        self.count = 0;
    }
}

impl<T: Clone + PartialOrd> StreakTracker<T> {
    /// Tracker for a field that can only legitimately increase
    pub fn monotonic(threshold: u32) -> Self {
        Self {
            decreases: Some(is_lower::<T>),
            ..Self::new(threshold)
        }
    }
}

fn is_lower<T: PartialOrd>(candidate: &T, current: &T) -> bool {
    candidate < current
}
