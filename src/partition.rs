//! Partition
//!
//! In-place reordering of tuple index slices. Growing and table-driven pruning
//! hand every recursive call an exclusive sub-slice of one index vector; the
//! functions here reorder such a slice and report where the groups begin, so
//! tuples are never copied.
use crate::data::Table;

/// Provided a slice of tuple indices, pivot them so that every index for
/// which `goes_left` holds comes first. Returns the number of such indices,
/// which is also the start of the right-hand block.
#[inline]
pub fn pivot<F>(index: &mut [usize], mut goes_left: F) -> usize
where
    F: FnMut(usize) -> bool,
{
    let mut low = 0;
    let mut high = index.len();
    while low < high {
        if goes_left(index[low]) {
            low += 1;
        } else {
            high -= 1;
            index.swap(low, high);
        }
    }
    low
}

/// Move tuples whose value in `col` is missing to the front of the slice.
/// Returns the number of missing tuples.
#[inline]
pub fn pivot_missing(index: &mut [usize], table: &Table, col: usize) -> usize {
    pivot(index, |i| table.get(i, col).is_missing())
}

/// Sort tuples by their numeric value in `col`. Missing values sort first.
pub fn sort_by_value(index: &mut [usize], table: &Table, col: usize) {
    index.sort_by(|a, b| {
        let va = table.get(*a, col).as_f64().unwrap_or(f64::NEG_INFINITY);
        let vb = table.get(*b, col).as_f64().unwrap_or(f64::NEG_INFINITY);
        va.total_cmp(&vb)
    });
}
