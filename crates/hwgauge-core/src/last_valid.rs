//! Per-key fallback to the most recent valid reading.

use std::collections::HashMap;

/// Last successfully observed value per metric key.
///
/// Entries are only ever inserted or overwritten. Once a key has held a
/// valid value, [`LastValid::settle`] never returns `None` for it again.
#[derive(Debug, Default)]
pub struct LastValid {
    values: HashMap<String, f32>,
}

impl LastValid {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reading` if it is a number and returns it; otherwise returns
    /// the previous valid value for `key`, if any.
    pub fn settle(&mut self, key: &str, reading: Option<f32>) -> Option<f32> {
        match reading {
            Some(value) if !value.is_nan() => {
                match self.values.get_mut(key) {
                    Some(slot) => *slot = value,
                    None => {
                        self.values.insert(key.to_string(), value);
                    }
                }
                Some(value)
            }
            _ => self.values.get(key).copied(),
        }
    }
}
