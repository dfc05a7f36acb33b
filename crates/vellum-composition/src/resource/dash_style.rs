use std::ops::Deref;
use std::sync::{Arc, OnceLock};

/// Immutable, cheaply cloned sequence of `f64` values.
#[derive(Clone, Debug, PartialEq)]
pub struct DoubleCollection(Arc<[f64]>);

impl DoubleCollection {
    pub fn empty() -> Self {
        static EMPTY: OnceLock<DoubleCollection> = OnceLock::new();
        EMPTY.get_or_init(|| Self(Arc::from(Vec::new()))).clone()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Whether both collections share one allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for DoubleCollection {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for DoubleCollection {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl From<&[f64]> for DoubleCollection {
    fn from(values: &[f64]) -> Self {
        Self(Arc::from(values))
    }
}

impl From<Vec<f64>> for DoubleCollection {
    fn from(values: Vec<f64>) -> Self {
        Self(Arc::from(values))
    }
}

impl<const N: usize> From<[f64; N]> for DoubleCollection {
    fn from(values: [f64; N]) -> Self {
        Self(Arc::from(values.as_slice()))
    }
}

const DASH: &[f64] = &[2.0, 2.0];
const DOT: &[f64] = &[0.0, 2.0];
const DASH_DOT: &[f64] = &[2.0, 2.0, 0.0, 2.0];
const DASH_DOT_DOT: &[f64] = &[2.0, 2.0, 0.0, 2.0, 0.0, 2.0];

fn preset(cell: &'static OnceLock<DoubleCollection>, values: &'static [f64]) -> DoubleCollection {
    cell.get_or_init(|| DoubleCollection::from(values)).clone()
}

/// Dash pattern for a stroked outline: alternating dash and gap lengths in units of pen
/// thickness, starting `offset` into the pattern.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashStyle {
    pub offset: f64,
    pub dashes: DoubleCollection,
}

impl DashStyle {
    pub fn new(dashes: impl Into<DoubleCollection>, offset: f64) -> Self {
        Self {
            offset,
            dashes: dashes.into(),
        }
    }

    pub fn solid() -> Self {
        Self::default()
    }

    pub fn dash() -> Self {
        static CELL: OnceLock<DoubleCollection> = OnceLock::new();
        Self::new(preset(&CELL, DASH), 1.0)
    }

    pub fn dot() -> Self {
        static CELL: OnceLock<DoubleCollection> = OnceLock::new();
        Self::new(preset(&CELL, DOT), 0.0)
    }

    pub fn dash_dot() -> Self {
        static CELL: OnceLock<DoubleCollection> = OnceLock::new();
        Self::new(preset(&CELL, DASH_DOT), 1.0)
    }

    pub fn dash_dot_dot() -> Self {
        static CELL: OnceLock<DoubleCollection> = OnceLock::new();
        Self::new(preset(&CELL, DASH_DOT_DOT), 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_share_one_allocation() {
        let a = DashStyle::dash_dot();
        let b = DashStyle::dash_dot();
        assert!(a.dashes.ptr_eq(&b.dashes));
        assert_eq!(a.dashes.as_slice(), &[2.0, 2.0, 0.0, 2.0]);
    }

    #[test]
    fn solid_has_no_dashes() {
        let solid = DashStyle::solid();
        assert!(solid.dashes.is_empty());
        assert!(solid.dashes.ptr_eq(&DoubleCollection::empty()));
    }
}
