//! GF(2^8) arithmetic for the Reed-Solomon codec.
//!
//! The field is generated by the data-matrix primitive polynomial 0x012D with
//! generator element 2. Log/antilog tables are built once on first use and
//! are immutable afterwards.

use std::sync::OnceLock;

/// x^8 + x^5 + x^3 + x^2 + 1, the DataMatrix field polynomial.
pub const FIELD_POLY: u16 = 0x012D;

/// Number of non-zero field elements; also the maximum codeword length.
pub const FIELD_ORDER: usize = 255;

struct Tables {
    /// exp[i] = alpha^i, doubled so products of logs need no modulo.
    exp: [u8; 2 * FIELD_ORDER],
    /// log[a] = i such that alpha^i = a; log[0] is unused.
    log: [u8; 256],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut exp = [0u8; 2 * FIELD_ORDER];
        let mut log = [0u8; 256];
        let mut x: u16 = 1;
        for i in 0..FIELD_ORDER {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= FIELD_POLY;
            }
        }
        for i in FIELD_ORDER..2 * FIELD_ORDER {
            exp[i] = exp[i - FIELD_ORDER];
        }
        Tables { exp, log }
    })
}

/// alpha^i for any non-negative exponent.
pub fn alpha_pow(i: usize) -> u8 {
    tables().exp[i % FIELD_ORDER]
}

/// Addition and subtraction coincide in GF(2^8).
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = tables();
    t.exp[t.log[a as usize] as usize + t.log[b as usize] as usize]
}

/// Multiplicative inverse; `None` for zero.
pub fn inv(a: u8) -> Option<u8> {
    if a == 0 {
        return None;
    }
    let t = tables();
    Some(t.exp[FIELD_ORDER - t.log[a as usize] as usize])
}

/// `a / b`; `None` when dividing by zero.
pub fn div(a: u8, b: u8) -> Option<u8> {
    let b_inv = inv(b)?;
    Some(mul(a, b_inv))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_eight_wraps_to_field_poly_tail() {
        // alpha^8 = x^5 + x^3 + x^2 + 1 under 0x012D.
        assert_eq!(alpha_pow(8), 0x2D);
        assert_eq!(mul(alpha_pow(7), 2), 0x2D);
    }

    #[test]
    fn exp_log_are_inverse_maps() {
        for i in 0..FIELD_ORDER {
            let a = alpha_pow(i);
            assert_ne!(a, 0);
            assert_eq!(mul(a, inv(a).unwrap()), 1);
        }
    }

    #[test]
    fn multiplication_distributes_over_addition() {
        for &(a, b, c) in &[(7u8, 19u8, 230u8), (0x2D, 0xFF, 1), (91, 91, 200)] {
            assert_eq!(mul(a, add(b, c)), add(mul(a, b), mul(a, c)));
        }
    }

    #[test]
    fn zero_has_no_inverse() {
        assert!(inv(0).is_none());
        assert!(div(1, 0).is_none());
        assert_eq!(div(0, 7), Some(0));
    }
}
