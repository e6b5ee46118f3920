//! VAX G-float and D-float conversions.
//!
//! A VAX double occupies four little-endian 16-bit words with the most
//! significant word first.  Reassembled as `w0<<48 | w1<<32 | w2<<16 | w3`
//! it reads like an IEEE pattern with a different exponent bias:
//!
//! | format  | exponent bits | fraction bits | IEEE exponent |
//! |---------|---------------|---------------|---------------|
//! | G-float | 11            | 52            | `g - 2`       |
//! | D-float | 8             | 55            | `d + 894`     |
//!
//! An exponent field of zero with the sign clear is 0.0; with the sign set
//! it is a reserved operand.  VAX has no infinities, NaNs or subnormals.

use byteorder::{ByteOrder, LittleEndian};

const SIGN: u64 = 1 << 63;
const IEEE_FRAC: u64 = (1 << 52) - 1;
const HIDDEN: u64 = 1 << 52;

/// Outcome of decoding a VAX word into IEEE bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VaxDecode {
    Value(u64),
    Reserved,
}

/// Outcome of encoding an IEEE value into VAX bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VaxEncode {
    Bits([u8; 8]),
    Overflow,
}

pub(crate) fn words_to_bits(bytes: &[u8; 8]) -> u64 {
    (0..4).fold(0u64, |acc, i| (acc << 16) | LittleEndian::read_u16(&bytes[2 * i..2 * i + 2]) as u64)
}

pub(crate) fn bits_to_words(bits: u64) -> [u8; 8] {
    let mut out = [0u8; 8];
    for i in 0..4 {
        let word = (bits >> (48 - 16 * i)) as u16;
        LittleEndian::write_u16(&mut out[2 * i..2 * i + 2], word);
    }
    out
}

/// Shift `m` right by `shift` bits, rounding half to even.
fn shift_round(m: u64, shift: u32) -> u64 {
    if shift == 0 {
        return m;
    }
    if shift >= 64 {
        return 0;
    }
    let kept = m >> shift;
    let rem = m & ((1u64 << shift) - 1);
    let half = 1u64 << (shift - 1);
    if rem > half || (rem == half && kept & 1 == 1) {
        kept + 1
    } else {
        kept
    }
}

/// Split a finite, non-zero IEEE value into sign, unbiased-by-1023 exponent
/// field and 52-bit fraction, normalising subnormals.  The returned
/// exponent may be zero or negative for subnormal inputs.
fn split_ieee(value: f64) -> (u64, i32, u64) {
    let bits = value.to_bits();
    let sign = bits & SIGN;
    let exp = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & IEEE_FRAC;
    if exp != 0 {
        return (sign, exp, frac);
    }
    let lz = frac.leading_zeros() - 11;
    let m = frac << lz;
    (sign, 1 - lz as i32, m & IEEE_FRAC)
}

// ── G-float ──────────────────────────────────────────────────────────────────

pub(crate) fn gfloat_to_ieee(bytes: &[u8; 8]) -> VaxDecode {
    let bits = words_to_bits(bytes);
    let sign = bits & SIGN;
    let gexp = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & IEEE_FRAC;
    if gexp == 0 {
        return if sign == 0 { VaxDecode::Value(0) } else { VaxDecode::Reserved };
    }
    let exp = gexp - 2;
    if exp >= 1 {
        return VaxDecode::Value(sign | (exp as u64) << 52 | frac);
    }
    // Lands in the IEEE subnormal range.
    let m = shift_round(HIDDEN | frac, (1 - exp) as u32);
    VaxDecode::Value(sign | m)
}

pub(crate) fn ieee_to_gfloat(value: f64) -> VaxEncode {
    if !value.is_finite() {
        return VaxEncode::Overflow;
    }
    if value == 0.0 {
        return VaxEncode::Bits([0; 8]);
    }
    let (sign, exp, frac) = split_ieee(value);
    let gexp = exp + 2;
    if gexp <= 0 {
        return VaxEncode::Bits([0; 8]);
    }
    if gexp > 0x7ff {
        return VaxEncode::Overflow;
    }
    VaxEncode::Bits(bits_to_words(sign | (gexp as u64) << 52 | frac))
}

// ── D-float ──────────────────────────────────────────────────────────────────

pub(crate) fn dfloat_to_ieee(bytes: &[u8; 8]) -> VaxDecode {
    let bits = words_to_bits(bytes);
    let sign = bits & SIGN;
    let dexp = ((bits >> 55) & 0xff) as i32;
    let frac55 = bits & ((1u64 << 55) - 1);
    if dexp == 0 {
        return if sign == 0 { VaxDecode::Value(0) } else { VaxDecode::Reserved };
    }
    let mut exp = (dexp + 894) as u64;
    let mut frac = shift_round(frac55, 3);
    if frac == HIDDEN {
        frac = 0;
        exp += 1;
    }
    VaxDecode::Value(sign | exp << 52 | frac)
}

pub(crate) fn ieee_to_dfloat(value: f64) -> VaxEncode {
    if !value.is_finite() {
        return VaxEncode::Overflow;
    }
    if value == 0.0 {
        return VaxEncode::Bits([0; 8]);
    }
    let (sign, exp, frac) = split_ieee(value);
    let dexp = exp - 894;
    if dexp <= 0 {
        return VaxEncode::Bits([0; 8]);
    }
    if dexp > 0xff {
        return VaxEncode::Overflow;
    }
    VaxEncode::Bits(bits_to_words(sign | (dexp as u64) << 55 | frac << 3))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(v: f64) -> [u8; 8] {
        match ieee_to_gfloat(v) {
            VaxEncode::Bits(b) => b,
            VaxEncode::Overflow => panic!("overflow encoding {v}"),
        }
    }

    fn d(v: f64) -> [u8; 8] {
        match ieee_to_dfloat(v) {
            VaxEncode::Bits(b) => b,
            VaxEncode::Overflow => panic!("overflow encoding {v}"),
        }
    }

    #[test]
    fn one_has_known_patterns() {
        assert_eq!(g(1.0), [0x10, 0x40, 0, 0, 0, 0, 0, 0]);
        assert_eq!(d(1.0), [0x80, 0x40, 0, 0, 0, 0, 0, 0]);
        assert_eq!(g(-2.0), [0x20, 0xC0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn gfloat_is_exact_for_normal_range() {
        for v in [1.0, -3.5, 1.0e-300, 6.02214076e23, std::f64::consts::PI] {
            assert_eq!(gfloat_to_ieee(&g(v)), VaxDecode::Value(v.to_bits()));
        }
    }

    #[test]
    fn dfloat_keeps_values_in_its_range() {
        for v in [1.0, -0.5, 1.0e30, 1.0e-30, std::f64::consts::E] {
            assert_eq!(dfloat_to_ieee(&d(v)), VaxDecode::Value(v.to_bits()));
        }
    }

    #[test]
    fn dfloat_range_limits() {
        assert_eq!(ieee_to_dfloat(1.0e300), VaxEncode::Overflow);
        assert_eq!(ieee_to_dfloat(1.0e-300), VaxEncode::Bits([0; 8]));
        assert_eq!(ieee_to_gfloat(f64::INFINITY), VaxEncode::Overflow);
        assert_eq!(ieee_to_gfloat(f64::NAN), VaxEncode::Overflow);
    }

    #[test]
    fn reserved_operand_detected() {
        let reserved = bits_to_words(SIGN);
        assert_eq!(gfloat_to_ieee(&reserved), VaxDecode::Reserved);
        assert_eq!(dfloat_to_ieee(&reserved), VaxDecode::Reserved);
        assert_eq!(gfloat_to_ieee(&[0; 8]), VaxDecode::Value(0));
    }

    #[test]
    fn dfloat_rounds_to_nearest_even() {
        // Fraction with the dropped three bits exactly at one half and an odd kept bit.
        let bits = (129u64 << 55) | 0b1100;
        let decoded = dfloat_to_ieee(&bits_to_words(bits));
        assert_eq!(decoded, VaxDecode::Value(1.0f64.to_bits() | 2));
    }

    #[test]
    fn word_order_round_trips() {
        let bits = 0x0123_4567_89AB_CDEF;
        assert_eq!(words_to_bits(&bits_to_words(bits)), bits);
        assert_eq!(bits_to_words(bits)[0..2], [0x23, 0x01]);
    }
}
