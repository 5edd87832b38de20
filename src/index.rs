//! Index set helpers.
//!
//! Index sets are plain ascending `Vec<usize>`. Catalog data arriving from
//! graph construction may carry stale or out-of-range indexes, so the helpers
//! here accept any integer type and silently ignore values outside `[0, n)`.

use std::collections::HashSet;

/// Returns the ascending indexes in `[0, n)` that are not in `subset`.
///
/// Negative or out-of-range members of `subset` never match and are ignored.
pub fn find_complement<I>(n: usize, subset: I) -> Vec<usize>
where
    I: IntoIterator,
    I::Item: TryInto<usize>,
{
    let excluded: HashSet<usize> = subset
        .into_iter()
        .filter_map(|v| TryInto::<usize>::try_into(v).ok())
        .filter(|&v| v < n)
        .collect();

    (0..n).filter(|i| !excluded.contains(i)).collect()
}
