//! Mapping free-form dimensions onto a provider's enumerated aspect ratios

use crate::protocol::Dimensions;
use std::fmt;

/// An aspect ratio such as `16:9`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn value(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Pick the candidate whose ratio is closest to `dimensions`
///
/// Distance is the absolute difference of width/height ratios. On exact ties
/// the earlier candidate wins. Returns `None` only for an empty candidate list.
pub fn closest_ratio(dimensions: Dimensions, candidates: &[AspectRatio]) -> Option<AspectRatio> {
    let target = dimensions.ratio();
    let mut best: Option<(AspectRatio, f64)> = None;

    for candidate in candidates {
        let distance = (candidate.value() - target).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((*candidate, distance)),
        }
    }

    best.map(|(ratio, _)| ratio)
}

/// Ratio label for a request, or `fallback` when it names no dimensions
pub fn ratio_label(
    dimensions: Option<Dimensions>,
    candidates: &[AspectRatio],
    fallback: AspectRatio,
) -> String {
    dimensions
        .and_then(|dims| closest_ratio(dims, candidates))
        .unwrap_or(fallback)
        .to_string()
}

/// Pick the closest of a fixed list of output sizes
pub fn closest_size(dimensions: Dimensions, sizes: &[Dimensions]) -> Option<Dimensions> {
    let ratios: Vec<AspectRatio> = sizes
        .iter()
        .map(|size| AspectRatio::new(size.width, size.height))
        .collect();
    let chosen = closest_ratio(dimensions, &ratios)?;
    sizes
        .iter()
        .copied()
        .find(|size| size.width == chosen.width && size.height == chosen.height)
}
