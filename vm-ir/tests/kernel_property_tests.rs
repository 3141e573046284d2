//! Property tests for the pure compute kernels
//!
//! Relation codes against their inverses, and double-width division
//! against the reconstruction `q * d + r == (hi:lo)`.

use proptest::prelude::*;
use vm_ir::op::{div64_q, div64_r, idiv64_q, idiv64_r};
use vm_ir::{DivOp, RelOp};

proptest! {
    #[test]
    fn prop_inverted_relation_negates(a in any::<u32>(), b in any::<u32>(), wide in any::<u64>()) {
        for op in RelOp::ALL {
            prop_assert_ne!(op.eval(a, b), op.invert().eval(a, b));
            prop_assert_ne!(op.eval(wide, u64::from(b)), op.invert().eval(wide, u64::from(b)));
        }
    }

    #[test]
    fn prop_div64_reconstructs_dividend(hi in any::<u32>(), lo in any::<u32>(), d in 1u32..) {
        // 商必须放得进一个字
        let hi = hi % d;
        let q = div64_q(hi, lo, d).unwrap();
        let r = div64_r(hi, lo, d).unwrap();
        let dividend = (u64::from(hi) << 32) | u64::from(lo);
        prop_assert!(r < d);
        prop_assert_eq!(u64::from(q) * u64::from(d) + u64::from(r), dividend);
    }

    #[test]
    fn prop_idiv64_matches_i64(x in any::<i32>(), d in any::<i32>()) {
        prop_assume!(d != 0);
        let dividend = i64::from(x);
        let hi = (dividend >> 32) as u32;
        let lo = dividend as u32;
        let q = idiv64_q(hi, lo, d as u32).unwrap();
        let r = idiv64_r(hi, lo, d as u32).unwrap();
        prop_assert_eq!(q as i32 as i64, dividend.wrapping_div(i64::from(d)) as i32 as i64);
        prop_assert_eq!(r as i32, x.wrapping_rem(d));
    }

    #[test]
    fn prop_division_by_zero_is_none(a in any::<u64>()) {
        prop_assert_eq!(DivOp::DivQ.eval(a, 0u64), None);
        prop_assert_eq!(div64_q(a, a, 0u64), None);
        prop_assert_eq!(idiv64_r(a, a, 0u64), None);
    }
}
