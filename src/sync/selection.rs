//! Random selection of the next icon/color index for a local edit.

use rand::RngExt;

/// Pick a uniformly random index in `0..=range_size` that differs from
/// `previous`, so a local edit is never a no-op.
///
/// `range_size` must be at least 1; a zero range is a configuration error
/// and is rejected when settings are built.
pub fn pick_distinct_index(previous: u32, range_size: u32) -> u32 {
    pick_distinct_index_with(&mut rand::rng(), previous, range_size)
}

/// Same as [`pick_distinct_index`] with a caller-supplied generator.
pub fn pick_distinct_index_with<R: RngExt>(
    rng: &mut R,
    previous: u32,
    range_size: u32,
) -> u32 {
    debug_assert!(range_size >= 1, "index range must hold at least two values");
    loop {
        let candidate = rng.random_range(0..=range_size);
        if candidate != previous {
            return candidate;
        }
    }
}
