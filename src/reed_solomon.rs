//! Reed-Solomon codec over GF(2^8), field polynomial 0x012D.
//!
//! Systematic encoding against the generator polynomial
//! g(x) = (x - a^0)(x - a^1) ... (x - a^(k-1)), and an errors-and-erasures
//! decoder: syndromes, Berlekamp-Massey over erasure-modified syndromes,
//! Chien-style root search, Forney magnitudes. With k parity symbols and e
//! known erasures the decoder corrects up to (k - e)/2 unlocated errors.
//!
//! Codewords are byte slices with the message first and parity last; the
//! first byte is the highest-degree coefficient. Generator polynomials are
//! derived once per parity length and cached.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::error::DecodeError;
use crate::galois;

/// Compute `parity_len` parity symbols for `data`.
pub fn parity(data: &[u8], parity_len: usize) -> Vec<u8> {
    let gen = generator_poly(parity_len);
    let mut work = data.to_vec();
    work.resize(data.len() + parity_len, 0);
    for i in 0..data.len() {
        let coef = work[i];
        if coef != 0 {
            // gen[0] is always 1; skip it.
            for (j, &g) in gen.iter().enumerate().skip(1) {
                work[i + j] ^= galois::mul(g, coef);
            }
        }
    }
    work.split_off(data.len())
}

/// Systematic encode: message followed by its parity symbols.
pub fn encode(data: &[u8], parity_len: usize) -> Vec<u8> {
    let mut codeword = data.to_vec();
    codeword.extend(parity(data, parity_len));
    codeword
}

/// Correct `codeword` in place, treating `erasures` as known-bad positions
/// (byte indices from the start of the codeword). Returns the number of
/// positions whose value actually changed. On error the codeword contents
/// are unspecified.
pub fn decode(
    codeword: &mut [u8],
    parity_len: usize,
    erasures: &[usize],
) -> Result<usize, DecodeError> {
    let n = codeword.len();
    if n > galois::FIELD_ORDER || parity_len >= n {
        return Err(DecodeError::ReedSolomonUncorrectable);
    }
    if erasures.len() > parity_len || erasures.iter().any(|&p| p >= n) {
        return Err(DecodeError::ReedSolomonUncorrectable);
    }

    let synd = syndromes(codeword, parity_len);
    if synd.iter().all(|&s| s == 0) {
        return Ok(0);
    }

    // Erasure locator: product of (1 + a^d x) over erased degrees d.
    let mut gamma = vec![1u8];
    for &pos in erasures {
        let x_e = galois::alpha_pow(n - 1 - pos);
        gamma = poly_mul(&gamma, &[1, x_e]);
    }

    // Modified syndromes T = S * Gamma mod x^k; Berlekamp-Massey on the
    // tail T[e..] finds the unknown-error locator.
    let mut t_poly = poly_mul(&synd, &gamma);
    t_poly.truncate(parity_len);
    t_poly.resize(parity_len, 0);
    let lambda = berlekamp_massey(&t_poly[erasures.len()..])?;

    // Full errata locator and its roots.
    let psi = poly_mul(&lambda, &gamma);
    let psi_degree = degree(&psi);
    let mut errata = Vec::with_capacity(psi_degree);
    for idx in 0..n {
        let x = galois::alpha_pow(n - 1 - idx);
        let x_inv = galois::inv(x).expect("powers of alpha are non-zero");
        if poly_eval(&psi, x_inv) == 0 {
            errata.push(idx);
        }
    }
    if errata.len() != psi_degree {
        return Err(DecodeError::ReedSolomonUncorrectable);
    }

    // Evaluator Omega = S * Psi mod x^k, then Forney. The generator roots
    // start at a^0, so the magnitude carries one extra factor of X.
    let mut omega = poly_mul(&synd, &psi);
    omega.truncate(parity_len);
    let psi_derivative = formal_derivative(&psi);
    let mut corrected = 0usize;
    for &idx in &errata {
        let x = galois::alpha_pow(n - 1 - idx);
        let x_inv = galois::inv(x).expect("powers of alpha are non-zero");
        let numerator = poly_eval(&omega, x_inv);
        let denominator = poly_eval(&psi_derivative, x_inv);
        let ratio = galois::div(numerator, denominator)
            .ok_or(DecodeError::ReedSolomonUncorrectable)?;
        let magnitude = galois::mul(x, ratio);
        codeword[idx] ^= magnitude;
        if magnitude != 0 {
            corrected += 1;
        }
    }

    if syndromes(codeword, parity_len).iter().any(|&s| s != 0) {
        return Err(DecodeError::ReedSolomonUncorrectable);
    }
    Ok(corrected)
}

/// Syndrome j is the codeword polynomial evaluated at a^j.
fn syndromes(codeword: &[u8], parity_len: usize) -> Vec<u8> {
    (0..parity_len)
        .map(|j| {
            let x = galois::alpha_pow(j);
            codeword
                .iter()
                .fold(0u8, |acc, &c| galois::mul(acc, x) ^ c)
        })
        .collect()
}

/// Shortest LFSR generating `seq`, as a locator polynomial (constant term 1,
/// ascending powers). Fails when the implied error count exceeds capacity.
fn berlekamp_massey(seq: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut current = vec![1u8];
    let mut previous = vec![1u8];
    let mut l = 0usize;
    let mut shift = 1usize;
    let mut prev_discrepancy = 1u8;

    for step in 0..seq.len() {
        let mut discrepancy = seq[step];
        for i in 1..=l.min(current.len() - 1) {
            discrepancy ^= galois::mul(current[i], seq[step - i]);
        }
        if discrepancy == 0 {
            shift += 1;
            continue;
        }
        let coef = galois::div(discrepancy, prev_discrepancy)
            .expect("previous discrepancy is non-zero");
        if 2 * l <= step {
            let keep = current.clone();
            subtract_shifted(&mut current, &previous, coef, shift);
            l = step + 1 - l;
            previous = keep;
            prev_discrepancy = discrepancy;
            shift = 1;
        } else {
            subtract_shifted(&mut current, &previous, coef, shift);
            shift += 1;
        }
    }

    if 2 * l > seq.len() {
        return Err(DecodeError::ReedSolomonUncorrectable);
    }
    while current.len() > 1 && *current.last().unwrap() == 0 {
        current.pop();
    }
    if current.len() - 1 != l {
        return Err(DecodeError::ReedSolomonUncorrectable);
    }
    Ok(current)
}

/// target -= coef * x^shift * source
fn subtract_shifted(target: &mut Vec<u8>, source: &[u8], coef: u8, shift: usize) {
    if target.len() < source.len() + shift {
        target.resize(source.len() + shift, 0);
    }
    for (j, &s) in source.iter().enumerate() {
        target[j + shift] ^= galois::mul(coef, s);
    }
}

/// Polynomial product, ascending powers.
fn poly_mul(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 {
            continue;
        }
        for (j, &bj) in b.iter().enumerate() {
            out[i + j] ^= galois::mul(ai, bj);
        }
    }
    out
}

/// Horner evaluation, ascending powers.
fn poly_eval(poly: &[u8], x: u8) -> u8 {
    poly.iter()
        .rev()
        .fold(0u8, |acc, &c| galois::mul(acc, x) ^ c)
}

fn degree(poly: &[u8]) -> usize {
    poly.iter().rposition(|&c| c != 0).unwrap_or(0)
}

/// In GF(2^m) the formal derivative keeps only odd-power terms.
fn formal_derivative(poly: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; poly.len().saturating_sub(1).max(1)];
    for (j, &c) in poly.iter().enumerate().skip(1) {
        if j % 2 == 1 {
            out[j - 1] = c;
        }
    }
    out
}

/// g(x) = product of (x - a^i) for i in 0..parity_len, descending powers.
fn generator_poly(parity_len: usize) -> Vec<u8> {
    static CACHE: OnceLock<Mutex<HashMap<usize, Vec<u8>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock().expect("generator cache poisoned");
    cache
        .entry(parity_len)
        .or_insert_with(|| {
            let mut gen = vec![1u8];
            for i in 0..parity_len {
                gen = poly_mul(&gen, &[1, galois::alpha_pow(i)]);
            }
            gen
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i + 1) as u8).collect()
    }

    #[test]
    fn clean_codeword_needs_no_correction() {
        let msg = message(32);
        let mut cw = encode(&msg, 8);
        assert_eq!(decode(&mut cw, 8, &[]).unwrap(), 0);
        assert_eq!(&cw[..32], msg.as_slice());
    }

    #[test]
    fn corrects_two_errors_in_forty_byte_message() {
        let msg = message(40);
        let mut cw = encode(&msg, 10);
        cw[7] ^= 0x5A;
        cw[22] ^= 0x81;
        assert_eq!(decode(&mut cw, 10, &[]).unwrap(), 2);
        assert_eq!(&cw[..40], msg.as_slice());
    }

    #[test]
    fn corrects_up_to_half_parity_errors() {
        let msg = message(40);
        let mut cw = encode(&msg, 10);
        for (i, &pos) in [3usize, 11, 19, 33, 47].iter().enumerate() {
            cw[pos] ^= (i as u8) + 1;
        }
        assert_eq!(decode(&mut cw, 10, &[]).unwrap(), 5);
        assert_eq!(&cw[..40], msg.as_slice());
    }

    #[test]
    fn erasures_double_the_budget() {
        let msg = message(30);
        let mut cw = encode(&msg, 10);
        let erased: Vec<usize> = vec![0, 5, 9, 14, 20, 24, 28, 31, 35, 39];
        for &pos in &erased {
            cw[pos] = 0xFF;
        }
        let corrected = decode(&mut cw, 10, &erased).unwrap();
        assert!(corrected <= 10);
        assert_eq!(&cw[..30], msg.as_slice());
    }

    #[test]
    fn mixed_errors_and_erasures() {
        // 2t + e <= k with t = 3, e = 4, k = 10.
        let msg = message(40);
        let mut cw = encode(&msg, 10);
        let erased = vec![1usize, 8, 25, 44];
        for &pos in &erased {
            cw[pos] ^= 0x33;
        }
        for &pos in &[12usize, 30, 38] {
            cw[pos] ^= 0xC4;
        }
        decode(&mut cw, 10, &erased).unwrap();
        assert_eq!(&cw[..40], msg.as_slice());
    }

    #[test]
    fn too_many_erasures_is_rejected() {
        let msg = message(20);
        let mut cw = encode(&msg, 6);
        let erased: Vec<usize> = (0..7).collect();
        assert_eq!(
            decode(&mut cw, 6, &erased),
            Err(DecodeError::ReedSolomonUncorrectable)
        );
    }

    #[test]
    fn overloaded_codeword_does_not_decode_silently() {
        // Six errors against k = 10 exceeds capacity; the decoder must not
        // return success with a wrong message.
        let msg = message(40);
        let mut cw = encode(&msg, 10);
        for &pos in &[0usize, 1, 2, 3, 4, 5] {
            cw[pos] ^= 0xFF;
        }
        match decode(&mut cw, 10, &[]) {
            Err(DecodeError::ReedSolomonUncorrectable) => {}
            Err(other) => panic!("unexpected error kind: {other}"),
            Ok(_) => assert_ne!(&cw[..40], msg.as_slice()),
        }
    }

    #[test]
    fn parity_is_systematic() {
        let msg = message(12);
        let cw = encode(&msg, 4);
        assert_eq!(&cw[..12], msg.as_slice());
        assert_eq!(cw.len(), 16);
    }
}
