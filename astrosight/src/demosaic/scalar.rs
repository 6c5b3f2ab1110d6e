//! Neighbour averaging on a single-channel mosaic.
//!
//! Every helper averages only the neighbours that lie inside the image and
//! divides by how many there were. With no neighbour at all the result is 0.

/// Borrowed view of a single-channel color-filter mosaic.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mosaic<'a> {
    pub data: &'a [f32],
    pub width: usize,
    pub height: usize,
}

impl Mosaic<'_> {
    #[inline(always)]
    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

#[inline(always)]
fn average(sum: f32, count: u32) -> f32 {
    if count > 0 { sum / count as f32 } else { 0.0 }
}

/// Left and right neighbours.
#[inline(always)]
pub(crate) fn interpolate_horizontal(m: &Mosaic, x: usize, y: usize) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0;
    if x > 0 {
        sum += m.at(x - 1, y);
        count += 1;
    }
    if x + 1 < m.width {
        sum += m.at(x + 1, y);
        count += 1;
    }
    average(sum, count)
}

/// Top and bottom neighbours.
#[inline(always)]
pub(crate) fn interpolate_vertical(m: &Mosaic, x: usize, y: usize) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0;
    if y > 0 {
        sum += m.at(x, y - 1);
        count += 1;
    }
    if y + 1 < m.height {
        sum += m.at(x, y + 1);
        count += 1;
    }
    average(sum, count)
}

/// Four orthogonal neighbours.
#[inline(always)]
pub(crate) fn interpolate_cross(m: &Mosaic, x: usize, y: usize) -> f32 {
    // Fast path for interior pixels
    if x > 0 && x + 1 < m.width && y > 0 && y + 1 < m.height {
        return (m.at(x - 1, y) + m.at(x + 1, y) + m.at(x, y - 1) + m.at(x, y + 1)) * 0.25;
    }

    let mut sum = 0.0f32;
    let mut count = 0;
    if x > 0 {
        sum += m.at(x - 1, y);
        count += 1;
    }
    if x + 1 < m.width {
        sum += m.at(x + 1, y);
        count += 1;
    }
    if y > 0 {
        sum += m.at(x, y - 1);
        count += 1;
    }
    if y + 1 < m.height {
        sum += m.at(x, y + 1);
        count += 1;
    }
    average(sum, count)
}

/// Four diagonal neighbours.
#[inline(always)]
pub(crate) fn interpolate_diagonal(m: &Mosaic, x: usize, y: usize) -> f32 {
    // Fast path for interior pixels
    if x > 0 && x + 1 < m.width && y > 0 && y + 1 < m.height {
        return (m.at(x - 1, y - 1)
            + m.at(x + 1, y - 1)
            + m.at(x - 1, y + 1)
            + m.at(x + 1, y + 1))
            * 0.25;
    }

    let mut sum = 0.0f32;
    let mut count = 0;
    if x > 0 && y > 0 {
        sum += m.at(x - 1, y - 1);
        count += 1;
    }
    if x + 1 < m.width && y > 0 {
        sum += m.at(x + 1, y - 1);
        count += 1;
    }
    if x > 0 && y + 1 < m.height {
        sum += m.at(x - 1, y + 1);
        count += 1;
    }
    if x + 1 < m.width && y + 1 < m.height {
        sum += m.at(x + 1, y + 1);
        count += 1;
    }
    average(sum, count)
}
