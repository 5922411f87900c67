//! crates/walk/src/correlate.rs
//!
//! Merge-walk of two name-sorted lists. Directory enumeration and the
//! various diff-flavored operations are all built on this.

/// Walks two name-sorted slices and reports each element as A-only,
/// B-only, or paired. Keys must be unique within each slice.
pub fn correlate<A, B, KA, KB, FA, FB, FAB>(
    a: &[A],
    b: &[B],
    key_a: KA,
    key_b: KB,
    mut only_a: FA,
    mut only_b: FB,
    mut both: FAB,
) where
    KA: Fn(&A) -> &str,
    KB: Fn(&B) -> &str,
    FA: FnMut(&A),
    FB: FnMut(&B),
    FAB: FnMut(&A, &B),
{
    let mut ia = 0;
    let mut ib = 0;
    while ia < a.len() && ib < b.len() {
        match key_a(&a[ia]).cmp(key_b(&b[ib])) {
            std::cmp::Ordering::Less => {
                only_a(&a[ia]);
                ia += 1;
            }
            std::cmp::Ordering::Greater => {
                only_b(&b[ib]);
                ib += 1;
            }
            std::cmp::Ordering::Equal => {
                both(&a[ia], &b[ib]);
                ia += 1;
                ib += 1;
            }
        }
    }
    for item in &a[ia..] {
        only_a(item);
    }
    for item in &b[ib..] {
        only_b(item);
    }
}
