//! GF(2^8) arithmetic and Reed-Solomon erasure decoding for Galileo HAS.
//!
//! HAS multi-page messages are protected by a systematic RS(255,32) code
//! over GF(2^8) with field polynomial 0x11D. A message of MS pages fills
//! the first MS information symbols of each column; the remaining
//! information symbols are zero and only parity pages beyond PID 32 are
//! ever transmitted. Recovery from any MS distinct pages is therefore an
//! erasure problem: invert one MS-wide submatrix of the generator matrix
//! and apply it to all 53 byte-columns. No Berlekamp-Massey machinery is
//! needed.

use std::sync::OnceLock;

use crate::prelude::*;

/// Field polynomial x^8 + x^4 + x^3 + x^2 + 1.
pub const FIELD_POLY: u16 = 0x11d;
/// Code length in symbols.
pub const N: usize = 255;
/// Information symbols of the mother code.
pub const K: usize = 32;
/// Bytes per HAS page column, i.e. cleartext bytes per page.
pub const PAGE_BYTES: usize = 53;

const fn build_exp() -> [u8; 512] {
    let mut exp = [0u8; 512];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        exp[i + 255] = x as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= FIELD_POLY;
        }
        i += 1;
    }
    exp
}

const fn build_log() -> [u8; 256] {
    let exp = build_exp();
    let mut log = [0u8; 256];
    let mut i = 0;
    while i < 255 {
        log[exp[i] as usize] = i as u8;
        i += 1;
    }
    log
}

const EXP: [u8; 512] = build_exp();
const LOG: [u8; 256] = build_log();

#[inline]
#[must_use]
pub fn gmul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + LOG[b as usize] as usize]
}

#[inline]
#[must_use]
pub fn ginv(a: u8) -> u8 {
    debug_assert!(a != 0, "zero has no inverse");
    EXP[255 - LOG[a as usize] as usize]
}

/// Generator polynomial g(x) = prod_{i=1..223} (x - alpha^i), coefficient
/// of x^j at index j; monic of degree N - K.
fn generator_poly() -> [u8; N - K + 1] {
    let mut g = [0u8; N - K + 1];
    g[0] = 1;
    let mut deg = 0;
    for i in 1..=(N - K) {
        // multiply g by (x + alpha^i)
        let root = EXP[i];
        let mut next = [0u8; N - K + 1];
        for j in 0..=deg {
            next[j + 1] ^= g[j];
            next[j] ^= gmul(g[j], root);
        }
        deg += 1;
        g = next;
    }
    g
}

/// Systematic generator matrix: row i is the codeword of unit vector e_i.
fn generator_matrix() -> &'static [[u8; N]; K] {
    static MATRIX: OnceLock<[[u8; N]; K]> = OnceLock::new();
    MATRIX.get_or_init(|| {
        let g = generator_poly();
        let mut matrix = [[0u8; N]; K];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[i] = 1;
            // remainder of x^(N-1-i) mod g(x)
            let mut work = [0u8; N];
            work[N - 1 - i] = 1;
            for d in (N - K..N).rev() {
                let c = work[d];
                if c == 0 {
                    continue;
                }
                for (j, &gj) in g.iter().enumerate() {
                    work[d - (N - K) + j] ^= gmul(c, gj);
                }
            }
            // parity symbol at codeword position K + j is the coefficient
            // of x^(N-K-1-j)
            for j in 0..N - K {
                row[K + j] = work[N - K - 1 - j];
            }
        }
        matrix
    })
}

/// Encode `ms` pages of cleartext (ms * [`PAGE_BYTES`] bytes) into the full
/// set of N pages, returned as (pid, page) pairs with 1-based PIDs.
///
/// Pages 1..=ms are the systematic cleartext; the rest are parity. Used by
/// the test suite and by anyone producing HAS-shaped page streams.
///
/// # Panics
/// If `cleartext.len() != ms * PAGE_BYTES` or `ms` is 0 or exceeds [`K`].
#[must_use]
pub fn encode_pages(cleartext: &[u8], ms: usize) -> Vec<(u8, [u8; PAGE_BYTES])> {
    assert!(ms >= 1 && ms <= K, "message size out of range");
    assert_eq!(cleartext.len(), ms * PAGE_BYTES, "cleartext length");
    let matrix = generator_matrix();
    let mut pages = vec![(0u8, [0u8; PAGE_BYTES]); N];
    for (p, page) in pages.iter_mut().enumerate() {
        page.0 = u8::try_from(p + 1).expect("N fits");
        for c in 0..PAGE_BYTES {
            let mut sym = 0u8;
            for i in 0..ms {
                sym ^= gmul(cleartext[i * PAGE_BYTES + c], matrix[i][p]);
            }
            page.1[c] = sym;
        }
    }
    pages
}

/// Recover `ms` * [`PAGE_BYTES`] bytes of cleartext from `ms` received
/// pages with distinct 1-based PIDs.
///
/// # Errors
/// [`Error::RsUncorrectable`] when fewer than `ms` pages are supplied, a
/// PID is out of range, or the erasure system is singular (duplicate PIDs).
pub fn erasure_decode(pages: &[(u8, [u8; PAGE_BYTES])], ms: usize) -> Result<Vec<u8>> {
    let fail = |reason: &str| Error::RsUncorrectable {
        stage: Stage::Reassembler,
        prn: None,
        reason: reason.to_string(),
    };
    if ms < 1 || ms > K {
        return Err(fail("message size out of range"));
    }
    if pages.len() < ms {
        return Err(fail("not enough pages"));
    }
    let matrix = generator_matrix();

    // A[j][i] = G[i][pid_j - 1], augmented with the identity for inversion.
    let mut a = vec![vec![0u8; 2 * ms]; ms];
    for (j, &(pid, _)) in pages.iter().take(ms).enumerate() {
        if pid == 0 {
            return Err(fail("page id is 1-based"));
        }
        for i in 0..ms {
            a[j][i] = matrix[i][usize::from(pid) - 1];
        }
        a[j][ms + j] = 1;
    }

    // Gauss-Jordan over GF(256)
    for col in 0..ms {
        let pivot = (col..ms)
            .find(|&r| a[r][col] != 0)
            .ok_or_else(|| fail("erasure system is singular"))?;
        a.swap(col, pivot);
        let inv = ginv(a[col][col]);
        for x in a[col].iter_mut() {
            *x = gmul(*x, inv);
        }
        for r in 0..ms {
            if r == col || a[r][col] == 0 {
                continue;
            }
            let factor = a[r][col];
            for x in 0..2 * ms {
                let v = gmul(factor, a[col][x]);
                a[r][x] ^= v;
            }
        }
    }

    let mut out = vec![0u8; ms * PAGE_BYTES];
    for c in 0..PAGE_BYTES {
        for i in 0..ms {
            let mut sym = 0u8;
            for j in 0..ms {
                sym ^= gmul(a[i][ms + j], pages[j].1[c]);
            }
            out[i * PAGE_BYTES + c] = sym;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_tables_are_consistent() {
        assert_eq!(EXP[0], 1);
        assert_eq!(EXP[1], 2);
        // alpha^8 = alpha^4 + alpha^3 + alpha^2 + 1 under 0x11d
        assert_eq!(EXP[8], 0x1d);
        for a in 1..=255u8 {
            assert_eq!(gmul(a, ginv(a)), 1, "a={a}");
        }
    }

    #[test]
    fn generator_rows_are_codewords() {
        // Every generator matrix row must evaluate to zero at every root
        // of g(x), i.e. be a valid codeword.
        let matrix = generator_matrix();
        for row in matrix.iter().take(3) {
            for i in 1..=3usize {
                let root = EXP[i];
                // Horner evaluation of the degree-254 codeword polynomial
                let mut acc = 0u8;
                for d in (0..N).rev() {
                    acc = gmul(acc, root) ^ row[N - 1 - d];
                }
                assert_eq!(acc, 0);
            }
        }
    }

    fn sample_cleartext(ms: usize) -> Vec<u8> {
        (0..ms * PAGE_BYTES)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(7))
            .collect()
    }

    #[test]
    fn systematic_pages_carry_cleartext() {
        let ms = 4;
        let cleartext = sample_cleartext(ms);
        let pages = encode_pages(&cleartext, ms);
        for i in 0..ms {
            assert_eq!(pages[i].0 as usize, i + 1);
            assert_eq!(&pages[i].1[..], &cleartext[i * PAGE_BYTES..(i + 1) * PAGE_BYTES]);
        }
    }

    #[test]
    fn decode_from_systematic_pages() {
        let ms = 5;
        let cleartext = sample_cleartext(ms);
        let pages = encode_pages(&cleartext, ms);
        let got = erasure_decode(&pages[..ms], ms).unwrap();
        assert_eq!(got, cleartext);
    }

    #[test]
    fn decode_from_parity_only_pages() {
        let ms = 11;
        let cleartext = sample_cleartext(ms);
        let pages = encode_pages(&cleartext, ms);
        // pick pages well past the systematic region
        let picked: Vec<_> = pages[60..60 + ms].to_vec();
        let got = erasure_decode(&picked, ms).unwrap();
        assert_eq!(got, cleartext);
    }

    #[test]
    fn decode_from_mixed_pages() {
        let ms = 7;
        let cleartext = sample_cleartext(ms);
        let pages = encode_pages(&cleartext, ms);
        let picked = vec![pages[2], pages[40], pages[0], pages[254], pages[100], pages[6], pages[33]];
        let got = erasure_decode(&picked, ms).unwrap();
        assert_eq!(got, cleartext);
    }

    #[test]
    fn duplicate_pages_are_singular() {
        let ms = 3;
        let cleartext = sample_cleartext(ms);
        let pages = encode_pages(&cleartext, ms);
        let picked = vec![pages[50], pages[50], pages[51]];
        assert!(erasure_decode(&picked, ms).is_err());
    }

    #[test]
    fn pid_zero_is_rejected() {
        let pages = vec![(0u8, [0u8; PAGE_BYTES])];
        assert!(erasure_decode(&pages, 1).is_err());
    }
}
