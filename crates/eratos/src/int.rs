use core::fmt;
use core::hash::Hash;

/// Integer types the sieve can run on.
///
/// The representable range of a pipeline is its value type: a `u16` stream
/// ends after 65521, `i32` and `u32` reach into the billions.
///
/// All arithmetic goes through the checked methods here; a `None` becomes
/// [`crate::Error::Overflow`].
pub trait SieveInt:
    Copy + Clone + fmt::Debug + fmt::Display + Ord + PartialOrd + Eq + PartialEq + Hash
    + Send + Sync + 'static
{
    /// Converts a small constant (wheel steps, bootstrap primes).
    fn from_u8(v: u8) -> Self;

    /// `self + rhs`, or `None` on overflow.
    fn checked_add(self, rhs: Self) -> Option<Self>;

    /// `self * rhs`, or `None` on overflow.
    fn checked_mul(self, rhs: Self) -> Option<Self>;

    /// `self mod 210`. Only called on positive values.
    fn wheel_residue(self) -> usize;

    /// Widens to `u64` for error reporting. Saturates for negative values.
    fn to_u64(self) -> u64;
}

macro_rules! impl_sieve_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SieveInt for $ty {
                #[inline]
                fn from_u8(v: u8) -> Self {
                    v as $ty
                }

                #[inline]
                fn checked_add(self, rhs: Self) -> Option<Self> {
                    <$ty>::checked_add(self, rhs)
                }

                #[inline]
                fn checked_mul(self, rhs: Self) -> Option<Self> {
                    <$ty>::checked_mul(self, rhs)
                }

                #[inline]
                fn wheel_residue(self) -> usize {
                    (self % (210 as $ty)) as usize
                }

                #[inline]
                #[allow(clippy::cast_sign_loss, clippy::absurd_extreme_comparisons, unused_comparisons)]
                fn to_u64(self) -> u64 {
                    if self < (0 as $ty) { 0 } else { self as u64 }
                }
            }
        )*
    };
}

impl_sieve_int!(u16, u32, u64, usize, i32, i64);
