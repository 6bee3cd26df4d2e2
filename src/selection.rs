//! Selection rules for targeting a region of the spectrum.
//!
//! The implicitly restarted Arnoldi iteration keeps the `nev` Ritz values
//! that best match a user-chosen criterion and uses the remaining ones as
//! shifts. The criterion is expressed as a total order over complex numbers:
//! sorting the Ritz values by a [`SelectionRule`] puts the wanted values
//! first and the shift candidates last.
//!
//! Each rule has a primary key and a tie-break so that the order is total
//! even for equal primary keys. The tie-breaks are chosen so that a
//! complex-conjugate pair always ends up adjacent after sorting, which the
//! restart logic relies on to keep its double-shift sweeps real.

use faer::c64;
use std::cmp::Ordering;

/// The part of the spectrum the solver should converge to.
///
/// "Largest" and "smallest" refer to the sort order of the primary key:
/// magnitude for `*Magn`, real part for `*Real`, and absolute imaginary
/// part for `*Imag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    /// Largest modulus first. This is the default in most applications and
    /// the canonical order of the final results.
    LargestMagn,
    /// Largest real part first. Useful for stability analysis, where the
    /// rightmost eigenvalues govern growth.
    LargestReal,
    /// Largest absolute imaginary part first.
    LargestImag,
    /// Smallest modulus first. Note that plain Arnoldi converges slowly to
    /// interior or small eigenvalues; prefer the shift-and-invert solver.
    SmallestMagn,
    /// Smallest real part first.
    SmallestReal,
    /// Smallest absolute imaginary part first.
    SmallestImag,
}

impl SelectionRule {
    /// Compares two Ritz values under this rule.
    ///
    /// Returns `Ordering::Less` when `a` is preferred over `b`, so sorting a
    /// slice with this comparator puts the wanted values first. The
    /// comparison uses [`f64::total_cmp`] on both keys, which makes the order
    /// total and the sort deterministic.
    pub fn compare(self, a: c64, b: c64) -> Ordering {
        match self {
            SelectionRule::LargestMagn => b
                .norm()
                .total_cmp(&a.norm())
                .then(b.re.total_cmp(&a.re)),
            SelectionRule::LargestReal => {
                b.re.total_cmp(&a.re).then(b.im.total_cmp(&a.im))
            }
            SelectionRule::LargestImag => b
                .im
                .abs()
                .total_cmp(&a.im.abs())
                .then(b.re.total_cmp(&a.re)),
            SelectionRule::SmallestMagn => a
                .norm()
                .total_cmp(&b.norm())
                .then(a.re.total_cmp(&b.re)),
            SelectionRule::SmallestReal => {
                a.re.total_cmp(&b.re).then(a.im.total_cmp(&b.im))
            }
            SelectionRule::SmallestImag => a
                .im
                .abs()
                .total_cmp(&b.im.abs())
                .then(a.re.total_cmp(&b.re)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(rule: SelectionRule, values: &[c64]) -> Vec<c64> {
        let mut v = values.to_vec();
        v.sort_by(|a, b| rule.compare(*a, *b));
        v
    }

    #[test]
    fn test_largest_magnitude_order() {
        let values = [
            c64::new(1.0, 0.0),
            c64::new(-3.0, 0.0),
            c64::new(0.0, 2.0),
        ];
        let s = sorted(SelectionRule::LargestMagn, &values);
        assert_eq!(s[0], c64::new(-3.0, 0.0));
        assert_eq!(s[1], c64::new(0.0, 2.0));
        assert_eq!(s[2], c64::new(1.0, 0.0));
    }

    #[test]
    fn test_smallest_real_order() {
        let values = [c64::new(2.0, 0.0), c64::new(-1.0, 0.0), c64::new(0.5, 0.0)];
        let s = sorted(SelectionRule::SmallestReal, &values);
        assert_eq!(s[0], c64::new(-1.0, 0.0));
        assert_eq!(s[2], c64::new(2.0, 0.0));
    }

    #[test]
    fn test_conjugate_pairs_stay_adjacent() {
        // A conjugate pair has equal primary key under every magnitude or
        // real-part rule; the tie-break must not separate it.
        let values = [
            c64::new(1.0, 2.0),
            c64::new(3.0, 0.0),
            c64::new(1.0, -2.0),
            c64::new(0.1, 0.0),
        ];
        for rule in [
            SelectionRule::LargestMagn,
            SelectionRule::LargestReal,
            SelectionRule::LargestImag,
            SelectionRule::SmallestMagn,
            SelectionRule::SmallestReal,
            SelectionRule::SmallestImag,
        ] {
            let s = sorted(rule, &values);
            let pos_plus = s.iter().position(|z| *z == c64::new(1.0, 2.0)).unwrap();
            let pos_minus = s.iter().position(|z| *z == c64::new(1.0, -2.0)).unwrap();
            assert_eq!(
                pos_plus.abs_diff(pos_minus),
                1,
                "rule {:?} split a conjugate pair",
                rule
            );
        }
    }

    #[test]
    fn test_largest_imag_prefers_large_imaginary_part() {
        let values = [c64::new(10.0, 0.0), c64::new(0.0, 1.0)];
        let s = sorted(SelectionRule::LargestImag, &values);
        assert_eq!(s[0], c64::new(0.0, 1.0));
    }
}
