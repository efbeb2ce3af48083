//! Width dispatch: maps each signed result type onto its prepared stubs and owns the integer
//! post-processing (sign fold, ranged mapping).
//!
//! ## Notes
//! - The mapping is a closed set of three widths resolved statically through [`EntropyWord`].
//! - Post-processing uses wrapping arithmetic throughout; the raw path never panics on overflow.

use core::fmt;

use crate::internal::diagnostics::*;
use crate::internal::stub::{Callable, CheckedCallable, StubWord};
use crate::internal::stub_template::{write_checked_stub, write_generate_stub, Instruction};
use crate::HrOut;

/// Operand width of a generate stub.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug)]
pub enum Width {
    W16,
    W32,
    W64,
}

impl Width {
    pub const fn bits(self) -> u32 {
        match self {
            Width::W16 => 16,
            Width::W32 => 32,
            Width::W64 => 64,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Raw and checked callables for one width.
pub struct WidthStubs<R: StubWord> {
    pub raw: Callable<R>,
    pub checked: CheckedCallable<R>,
}

impl<R: StubWord> WidthStubs<R> {
    fn prepare(width: Width, instr: Instruction) -> HrResult<Self> {
        let raw = write_generate_stub(width, instr);
        let checked = write_checked_stub(width, instr);
        HrOut!("{} {} stub: {:?}", width, instr, raw);
        // Templates are built for exactly this width and the running CPU mode.
        unsafe {
            Ok(Self {
                raw: Callable::prepare(raw.as_bytes())?,
                checked: CheckedCallable::prepare(checked.as_bytes())?,
            })
        }
    }
}

/// Prepared stubs for every width available in the current execution mode.
#[derive(Default)]
pub struct StubSet {
    pub w16: Option<WidthStubs<u16>>,
    pub w32: Option<WidthStubs<u32>>,
    pub w64: Option<WidthStubs<u64>>,
}

impl StubSet {
    /// Prepares 16/32-bit stubs, plus 64-bit stubs when `with_64` is set.
    pub fn prepare(instr: Instruction, with_64: bool) -> HrResult<Self> {
        Ok(Self {
            w16: Some(WidthStubs::prepare(Width::W16, instr)?),
            w32: Some(WidthStubs::prepare(Width::W32, instr)?),
            w64: if with_64 { Some(WidthStubs::prepare(Width::W64, instr)?) } else { None },
        })
    }

    /// Number of executable regions held.
    pub fn len(&self) -> usize {
        2 * (self.w16.is_some() as usize + self.w32.is_some() as usize + self.w64.is_some() as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}

/// Signed result type of a generate call.
pub trait EntropyWord:
    sealed::Sealed + Copy + Ord + Default + fmt::Debug + Send + Sync + 'static
{
    type Raw: StubWord;
    const WIDTH: Width;
    const MIN: Self;

    /// Reinterprets the raw bit pattern as two's complement.
    fn from_raw(raw: Self::Raw) -> Self;

    /// Two's-complement fold: `!v + 1` for negative `v`. `MIN` folds to itself.
    fn fold(self) -> Self;

    /// `(self mod maximum) + minimum`, wrapping.
    ///
    /// # Panics
    /// If `maximum` is zero, like `%`. The facade rejects that range with `ZeroMaximum` first.
    fn modulo_range(self, minimum: Self, maximum: Self) -> Self;

    /// Maps an unbiased draw onto `[minimum, maximum)`; `None` when `raw` falls in the rejection
    /// zone and must be redrawn.
    fn span_range(raw: Self::Raw, minimum: Self, maximum: Self) -> Option<Self>;

    fn stubs(set: &StubSet) -> Option<&WidthStubs<Self::Raw>>;
}

macro_rules! impl_entropy_word {
    ($($t:ty => $raw:ty, $width:expr, $field:ident);* $(;)?) => {$(
        impl EntropyWord for $t {
            type Raw = $raw;
            const WIDTH: Width = $width;
            const MIN: Self = <$t>::MIN;

            #[inline(always)]
            fn from_raw(raw: $raw) -> Self {
                raw as $t
            }

            #[inline(always)]
            fn fold(self) -> Self {
                if self < 0 { (!self).wrapping_add(1) } else { self }
            }

            #[inline(always)]
            fn modulo_range(self, minimum: Self, maximum: Self) -> Self {
                self.wrapping_rem(maximum).wrapping_add(minimum)
            }

            #[inline(always)]
            fn span_range(raw: $raw, minimum: Self, maximum: Self) -> Option<Self> {
                let span = maximum.wrapping_sub(minimum) as $raw;
                // Smallest accepted draw: values below it would over-weight the low residues.
                let zone = span.wrapping_neg() % span;
                if raw < zone {
                    return None;
                }
                Some(minimum.wrapping_add((raw % span) as $t))
            }

            #[inline(always)]
            fn stubs(set: &StubSet) -> Option<&WidthStubs<$raw>> {
                set.$field.as_ref()
            }
        }
    )*};
}

impl_entropy_word! {
    i16 => u16, Width::W16, w16;
    i32 => u32, Width::W32, w32;
    i64 => u64, Width::W64, w64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_is_twos_complement() {
        assert_eq!((-1i16).fold(), 1);
        assert_eq!((-12345i32).fold(), 12345);
        assert_eq!(42i64.fold(), 42);
        assert_eq!(0i32.fold(), 0);
    }

    #[test]
    fn fold_keeps_minimum() {
        assert_eq!(i16::MIN.fold(), i16::MIN);
        assert_eq!(i32::MIN.fold(), i32::MIN);
        assert_eq!(i64::MIN.fold(), i64::MIN);
    }

    #[test]
    fn from_raw_reinterprets_bits() {
        assert_eq!(i16::from_raw(0xFFFF), -1);
        assert_eq!(i32::from_raw(0x8000_0000), i32::MIN);
        assert_eq!(i64::from_raw(7), 7);
    }

    #[test]
    fn modulo_range_uses_maximum_as_modulus() {
        assert_eq!(17i32.modulo_range(0, 10), 7);
        // -5..5 never reaches the upper half: 3 mod 5 = 3, 3 + -5 = -2.
        assert_eq!(3i32.modulo_range(-5, 5), -2);
        assert_eq!(i64::MIN.modulo_range(-5, 5), -8);
        assert_eq!(i16::MIN.modulo_range(-5, 5), -8);
        assert_eq!(i32::MIN.modulo_range(-5, 5), -8);
    }

    #[test]
    fn modulo_range_does_not_panic_on_edges() {
        assert_eq!(i64::MIN.modulo_range(-10, -1), -10);
        let _ = (-3i16).modulo_range(i16::MIN, -2);
    }

    #[test]
    fn modulo_range_with_negative_maximum() {
        // remainder keeps the dividend's sign: folded draws give 0..3, so -10..-7
        assert_eq!(0i32.modulo_range(-10, -3), -10);
        assert_eq!(7i32.modulo_range(-10, -3), -9);
        assert_eq!(i32::MAX.modulo_range(-10, -3), -9);
        assert_eq!(5i16.modulo_range(-10, -3), -8);
        // 2^15, 2^31 and 2^63 are all 2 mod 3
        assert_eq!(i16::MIN.modulo_range(-10, -3), -12);
        assert_eq!(i32::MIN.modulo_range(-10, -3), -12);
        assert_eq!(i64::MIN.modulo_range(-10, -3), -12);
    }

    #[test]
    fn span_range_stays_inside() {
        for raw in [0u16, 1, 9, 10, 0x7FFF, 0xFFFF] {
            if let Some(v) = i16::span_range(raw, -5, 5) {
                assert!((-5..5).contains(&v), "{v}");
            }
        }
        assert_eq!(i32::span_range(u32::MAX, i32::MIN, i32::MAX), Some(i32::MIN));
        assert_eq!(i32::span_range(0, i32::MIN, i32::MAX), None);
        // 2^64 % 10 = 6: 13 is accepted, 3 is not.
        assert_eq!(i64::span_range(13, 100, 110), Some(103));
        assert_eq!(i64::span_range(3, 100, 110), None);
    }

    #[test]
    fn span_range_rejects_biased_tail() {
        // 65536 % 10 = 6, so draws 0..6 are rejected for a span of 10.
        assert_eq!(i16::span_range(5, 0, 10), None);
        assert_eq!(i16::span_range(6, 0, 10), Some(6));
    }

    #[test]
    fn width_display() {
        assert_eq!(Width::W64.to_string(), "64-bit");
        assert_eq!(<i32 as EntropyWord>::WIDTH.bits(), 32);
    }
}
