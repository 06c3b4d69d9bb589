//! Move minimisation for reordered children.
//!
//! Reused children keep their host nodes where they are if their previous
//! indices, read in new order, form a longest increasing run; every other
//! reused child is moved. Rotating `[A, B, C]` into `[C, A, B]` therefore
//! moves only `C`.

/// For each entry of `previous`, whether it belongs to one longest strictly
/// increasing subsequence (and can stay in place).
pub(crate) fn stable(previous: &[usize]) -> Vec<bool> {
    let mut keep = vec![false; previous.len()];
    if previous.is_empty() {
        return keep;
    }

    // tails[k]: index into `previous` of the smallest tail of a run of k + 1.
    let mut tails: Vec<usize> = Vec::with_capacity(previous.len());
    let mut back: Vec<Option<usize>> = vec![None; previous.len()];

    for (i, &value) in previous.iter().enumerate() {
        let at = tails.partition_point(|&t| previous[t] < value);
        back[i] = at.checked_sub(1).map(|k| tails[k]);
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }

    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        keep[i] = true;
        cursor = back[i];
    }
    keep
}
