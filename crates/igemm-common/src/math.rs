//! Integer helpers for tile and packing arithmetic.

/// Round `n` up to the next multiple of `q` (`q > 0`).
#[inline]
pub const fn round_up(n: usize, q: usize) -> usize {
    n.div_ceil(q) * q
}

/// Round `n` down to a multiple of `q` (`q > 0`).
#[inline]
pub const fn round_down(n: usize, q: usize) -> usize {
    n - n % q
}

/// Ceiling division.
#[inline]
pub const fn divide_round_up(n: usize, q: usize) -> usize {
    n.div_ceil(q)
}

/// Smallest prime that is `>= n`.
///
/// Used to derive strides and offsets that cannot accidentally line up with
/// a kernel's tile sizes.
pub fn next_prime(mut n: usize) -> usize {
    if n <= 2 {
        return 2;
    }
    if n % 2 == 0 {
        n += 1;
    }
    loop {
        if is_prime(n) {
            return n;
        }
        n += 2;
    }
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn next_prime_small_values() {
        assert_eq!(next_prime(0), 2);
        assert_eq!(next_prime(2), 2);
        assert_eq!(next_prime(3), 3);
        assert_eq!(next_prime(4), 5);
        assert_eq!(next_prime(5), 5);
        assert_eq!(next_prime(9), 11);
        assert_eq!(next_prime(14), 17);
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(round_up(0, 8), 0);
        assert_eq!(round_up(1, 8), 8);
        assert_eq!(round_up(8, 8), 8);
        assert_eq!(round_up(9, 8), 16);
        assert_eq!(round_down(15, 4), 12);
        assert_eq!(divide_round_up(9, 4), 3);
    }

    proptest! {
        #[test]
        fn round_up_is_smallest_multiple(n in 0usize..10_000, q in 1usize..64) {
            let r = round_up(n, q);
            prop_assert_eq!(r % q, 0);
            prop_assert!(r >= n);
            prop_assert!(r < n + q);
        }

        #[test]
        fn next_prime_is_prime_and_not_smaller(n in 0usize..5_000) {
            let p = next_prime(n);
            prop_assert!(p >= n);
            prop_assert!(is_prime(p));
        }
    }
}
