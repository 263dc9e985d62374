use std::fmt;

// Shape3D — Spatial layout of one sample
//
// Every edge in the graph carries a width x height x depth shape. The shape
// decides how many scalars one sample holds (the product of the three
// extents) and how a (x, y, channel) coordinate maps to a flat offset:
//
//   index(x, y, c) = (height * c + y) * width + x
//
// i.e. channels are the outermost axis and x is contiguous. A fully-connected
// layer uses shapes like 4x1x1 for vectors and 4x2x1 for its weight matrix.

/// Width x height x depth extents of a single sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Shape3D {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Shape3D {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Shape3D {
            width,
            height,
            depth,
        }
    }

    /// Shape of a flat vector with `len` elements (len x 1 x 1).
    pub fn vector(len: usize) -> Self {
        Shape3D::new(len, 1, 1)
    }

    /// Number of scalars in one sample.
    pub fn size(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Number of scalars in one channel.
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Flat offset of coordinate (x, y, channel).
    pub fn index(&self, x: usize, y: usize, channel: usize) -> usize {
        debug_assert!(x < self.width, "x {} out of range {}", x, self.width);
        debug_assert!(y < self.height, "y {} out of range {}", y, self.height);
        debug_assert!(
            channel < self.depth,
            "channel {} out of range {}",
            channel,
            self.depth
        );
        (self.height * channel + y) * self.width + x
    }

    /// Change the extents in place.
    pub fn reshape(&mut self, width: usize, height: usize, depth: usize) {
        self.width = width;
        self.height = height;
        self.depth = depth;
    }
}

impl fmt::Display for Shape3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}

impl From<(usize, usize, usize)> for Shape3D {
    fn from((w, h, d): (usize, usize, usize)) -> Self {
        Shape3D::new(w, h, d)
    }
}

impl From<usize> for Shape3D {
    fn from(len: usize) -> Self {
        Shape3D::vector(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_and_area() {
        let s = Shape3D::new(3, 4, 5);
        assert_eq!(s.size(), 60);
        assert_eq!(s.area(), 12);
    }

    #[test]
    fn test_index_is_channel_major() {
        let s = Shape3D::new(3, 2, 2);
        assert_eq!(s.index(0, 0, 0), 0);
        assert_eq!(s.index(2, 0, 0), 2);
        assert_eq!(s.index(0, 1, 0), 3);
        assert_eq!(s.index(0, 0, 1), 6);
        assert_eq!(s.index(2, 1, 1), s.size() - 1);
    }

    #[test]
    fn test_vector_shape() {
        let s = Shape3D::from(7);
        assert_eq!(s, Shape3D::new(7, 1, 1));
        assert_eq!(s.size(), 7);
    }

    #[test]
    fn test_reshape() {
        let mut s = Shape3D::default();
        assert_eq!(s.size(), 0);
        s.reshape(2, 3, 4);
        assert_eq!(s.size(), 24);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Shape3D::new(3, 3, 10)), "3x3x10");
    }
}
