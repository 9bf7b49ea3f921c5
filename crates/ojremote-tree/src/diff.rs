//! Ordered list reconciliation.
//!
//! [`array_diff`] turns one ordered list of unique values into another with a
//! sequence of inserts and removes. Applying the ops in emission order, each
//! at its own index, to a copy of `from` yields `to`:
//!
//! ```
//! use ojremote_tree::diff::{DiffKind, DiffOp, apply_diff, array_diff};
//!
//! let ops = array_diff(&[1, 2, 3], &[1, 5, 6, 3, 7]);
//! assert_eq!(ops, vec![
//!     DiffOp { op: DiffKind::Insert, value: 5, index: 1 },
//!     DiffOp { op: DiffKind::Insert, value: 6, index: 2 },
//!     DiffOp { op: DiffKind::Remove, value: 2, index: 3 },
//!     DiffOp { op: DiffKind::Insert, value: 7, index: 4 },
//! ]);
//!
//! let mut list = vec![1, 2, 3];
//! apply_diff(&mut list, &ops);
//! assert_eq!(list, vec![1, 5, 6, 3, 7]);
//! ```
//!
//! The scan is O(n·m). Child lists are short, so that is fine here.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiffKind {
    Insert,
    Remove,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffOp<T> {
    pub op: DiffKind,
    pub value: T,
    pub index: usize,
}

impl<T> DiffOp<T> {
    fn insert(value: T, index: usize) -> Self {
        Self { op: DiffKind::Insert, value, index }
    }

    fn remove(value: T, index: usize) -> Self {
        Self { op: DiffKind::Remove, value, index }
    }
}

/// Diff with value equality.
pub fn array_diff<T: PartialEq + Clone>(from: &[T], to: &[T]) -> Vec<DiffOp<T>> {
    array_diff_by(from, to, |a, b| a == b)
}

/// Diff with caller-supplied equality.
pub fn array_diff_by<T: Clone>(
    from: &[T],
    to: &[T],
    eq: impl Fn(&T, &T) -> bool,
) -> Vec<DiffOp<T>> {
    let mut ops = Vec::new();
    // `next` is the first unmatched position in `from`; `cursor` is where the
    // next op lands in the list being rebuilt.
    let mut next = 0;
    let mut cursor = 0;

    for target in to {
        match from[next..].iter().position(|candidate| eq(candidate, target)) {
            Some(offset) => {
                for skipped in &from[next..next + offset] {
                    ops.push(DiffOp::remove(skipped.clone(), cursor));
                }
                next += offset + 1;
                cursor += 1;
            }
            None => {
                ops.push(DiffOp::insert(target.clone(), cursor));
                cursor += 1;
            }
        }
    }
    for trailing in &from[next..] {
        ops.push(DiffOp::remove(trailing.clone(), cursor));
    }
    ops
}

/// Apply ops produced by [`array_diff`] to `list`, in order.
pub fn apply_diff<T: Clone>(list: &mut Vec<T>, ops: &[DiffOp<T>]) {
    for op in ops {
        match op.op {
            DiffKind::Insert => list.insert(op.index, op.value.clone()),
            DiffKind::Remove => {
                list.remove(op.index);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
