//! Wheel factorization over 2·3·5·7.
//!
//! [`WHEEL`] holds the gaps between consecutive integers coprime to 210.
//! Starting from 13 and adding successive gaps visits 17, 19, 23, 29, ...
//! and never lands on a multiple of 2, 3, 5 or 7. The same gaps scaled by a
//! prime `p` walk the multiples of `p` that survive the wheel.

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, Result, SieveInt};

/// Number of residues coprime to 210 (Euler's totient of 210).
pub const WHEEL_SIZE: usize = 48;

/// Product of the primes the wheel skips.
pub const WHEEL_MODULUS: usize = 210;

/// First value produced by [`candidates`].
pub const WHEEL_START: u8 = 13;

/// Gaps between consecutive integers coprime to 210, starting after 13.
pub const WHEEL: [u8; WHEEL_SIZE] = [
    4, 2, 4, 6, 2, 6, 4, 2, 4, 6, 6, 2, 6, 4, 2, 6, 4, 6, 8, 4, 2, 4, 2, 4, 8, 6, 4, 6, 2, 4, 6, 2,
    6, 6, 4, 2, 4, 6, 2, 6, 4, 2, 4, 2, 10, 2, 10, 2,
];

const NO_POSITION: u8 = u8::MAX;

// Residue (mod 210) -> index of the gap that follows it.
const WHEEL_POS: [u8; WHEEL_MODULUS] = {
    let mut table = [NO_POSITION; WHEEL_MODULUS];
    let mut n = WHEEL_START as usize;
    let mut i = 0;
    while i < WHEEL_SIZE {
        table[n % WHEEL_MODULUS] = i as u8;
        n += WHEEL[i] as usize;
        i += 1;
    }
    table
};

/// Looks up where the wheel pattern resumes for a value with the given
/// residue mod 210.
///
/// Returns `None` when the residue shares a factor with 210, i.e. the wheel
/// never visits it.
///
/// # Example
/// ```
/// use eratos::wheel_position;
///
/// assert_eq!(wheel_position(13), Some(0));
/// assert_eq!(wheel_position(11), Some(47));
/// assert_eq!(wheel_position(15), None);
/// ```
pub const fn wheel_position(residue: usize) -> Option<usize> {
    if residue >= WHEEL_MODULUS {
        return None;
    }
    match WHEEL_POS[residue] {
        NO_POSITION => None,
        i => Some(i as usize),
    }
}

/// An infinite, strictly increasing walk `n, n + k·w[i], n + k·w[i] + k·w[i+1], ...`
/// over the wheel.
///
/// This is the single engine behind both the candidate stream and every
/// per-prime multiples stream. It is a plain [`Iterator`]; the pipeline runs
/// each instance in its own task (see [`crate::spawn_source`]).
///
/// Values are produced with checked arithmetic. The value that would overflow
/// is reported once as [`Error::Overflow`], after which the iterator is
/// exhausted.
#[derive(Clone, Debug)]
pub struct Spin<T: SieveInt> {
    next: Option<T>,
    scale: T,
    index: usize,
    stage: &'static str,
    failed: bool,
}

impl<T: SieveInt> Spin<T> {
    /// Starts a walk at `start`, stepping by `scale` times the wheel gaps
    /// beginning at gap `index`.
    ///
    /// `index` is reduced modulo [`WHEEL_SIZE`].
    pub fn new(start: T, scale: T, index: usize, stage: &'static str) -> Self {
        Self {
            next: Some(start),
            scale,
            index: index % WHEEL_SIZE,
            stage,
            failed: false,
        }
    }

    /// The next value this walk will return, if it is representable.
    pub const fn peek(&self) -> Option<T> {
        self.next
    }

    fn step(&self, from: T) -> Option<T> {
        let gap = self.scale.checked_mul(T::from_u8(WHEEL[self.index]))?;
        from.checked_add(gap)
    }
}

impl<T: SieveInt> Iterator for Spin<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next {
            Some(current) => {
                self.next = self.step(current);
                self.index = (self.index + 1) % WHEEL_SIZE;
                Some(Ok(current))
            }
            None if !self.failed => {
                self.failed = true;
                Some(Err(Error::Overflow { stage: self.stage }))
            }
            None => None,
        }
    }
}

impl<T: SieveInt> core::iter::FusedIterator for Spin<T> {}

/// Returns the integers greater than 10 that are coprime to 210, in order.
///
/// # Example
/// ```
/// use eratos::candidates;
///
/// let first: Vec<u32> = candidates().take(6).map(Result::unwrap).collect();
/// assert_eq!(first, [13, 17, 19, 23, 29, 31]);
/// ```
pub fn candidates<T: SieveInt>() -> Spin<T> {
    Spin::new(T::from_u8(WHEEL_START), T::from_u8(1), 0, "candidates")
}

/// Returns the multiples of `p` that are coprime to 210, starting at `p²`.
///
/// The wheel is resumed at the position of `p mod 210`: the multiples are
/// `p·m` for the wheel values `m >= p`, so stepping `m` along the wheel steps
/// the product by `p` times the same gap.
///
/// # Errors
///
/// - [`Error::NotWheelPrime`] if `p` shares a factor with 210. The primes 2,
///   3, 5 and 7 never get a generator; the wheel already removes their
///   multiples.
/// - [`Error::Overflow`] if `p²` is not representable.
///
/// # Example
/// ```
/// use eratos::multiples;
///
/// let m: Vec<u32> = multiples(13_u32)?.take(4).map(Result::unwrap).collect();
/// assert_eq!(m, [169, 221, 247, 299]);
/// # Ok::<(), eratos::Error>(())
/// ```
#[cfg_attr(feature = "tracing", instrument(level = "trace"))]
pub fn multiples<T: SieveInt>(p: T) -> Result<Spin<T>> {
    let index = wheel_position(p.wheel_residue())
        .ok_or(Error::NotWheelPrime { value: p.to_u64() })?;
    let square = p
        .checked_mul(p)
        .ok_or(Error::Overflow { stage: "multiples" })?;
    Ok(Spin::new(square, p, index, "multiples"))
}
