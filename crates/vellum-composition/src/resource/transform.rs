use crate::resource::ResourceId;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TranslateTransform {
    pub x: f64,
    pub y: f64,
}

impl TranslateTransform {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl Default for ScaleTransform {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            center_x: 0.0,
            center_y: 0.0,
        }
    }
}

impl ScaleTransform {
    pub fn new(scale_x: f64, scale_y: f64) -> Self {
        Self {
            scale_x,
            scale_y,
            ..Self::default()
        }
    }
}

/// Rotation in degrees about `(center_x, center_y)`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RotateTransform {
    pub angle: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl RotateTransform {
    pub fn new(angle: f64) -> Self {
        Self {
            angle,
            ..Self::default()
        }
    }
}

/// Ordered composition of transform resources. A child listed twice holds two references.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformGroup {
    children: Vec<ResourceId>,
}

impl TransformGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_children(children: Vec<ResourceId>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[ResourceId] {
        &self.children
    }

    pub(crate) fn insert_child(&mut self, index: usize, child: ResourceId) {
        self.children.insert(index, child);
    }

    pub(crate) fn remove_child(&mut self, index: usize) -> ResourceId {
        self.children.remove(index)
    }
}
