//! Word codecs: byte-level encode/decode of 8-byte doubles and 4-byte
//! integers for each supported binary encoding.
//!
//! Every conversion works on byte slices.  Nothing in this crate
//! reinterprets memory as a different numeric type; the only bridge between
//! bytes and `f64` is `f64::from_bits` on an integer assembled explicitly.
//!
//! | encoding | doubles             | integers      |
//! |----------|---------------------|---------------|
//! | BIG-IEEE | IEEE 754, big end   | big end       |
//! | LTL-IEEE | IEEE 754, little end| little end    |
//! | VAX-GFLT | VAX G-float         | little end    |
//! | VAX-DFLT | VAX D-float         | little end    |

pub mod vax;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

use crate::registry::BinaryEncoding;
use self::vax::{VaxDecode, VaxEncode};

/// Size in bytes of one file word.
pub const WORD_BYTES: usize = 8;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("value {value} cannot be represented in {encoding}")]
    Unrepresentable { value: f64, encoding: BinaryEncoding },
    #[error("reserved operand {bits} in {encoding} data")]
    ReservedOperand { encoding: BinaryEncoding, bits: String },
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait WordCodec: Send + Sync {
    fn encoding(&self) -> BinaryEncoding;
    fn decode_f64(&self, bytes: [u8; 8]) -> Result<f64, CodecError>;
    fn encode_f64(&self, value: f64) -> Result<[u8; 8], CodecError>;
    fn decode_i32(&self, bytes: [u8; 4]) -> i32;
    fn encode_i32(&self, value: i32) -> [u8; 4];
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct BigIeeeCodec;
impl WordCodec for BigIeeeCodec {
    fn encoding(&self) -> BinaryEncoding { BinaryEncoding::BigIeee }
    fn decode_f64(&self, bytes: [u8; 8]) -> Result<f64, CodecError> { Ok(BigEndian::read_f64(&bytes)) }
    fn encode_f64(&self, value: f64) -> Result<[u8; 8], CodecError> {
        let mut out = [0u8; 8];
        BigEndian::write_f64(&mut out, value);
        Ok(out)
    }
    fn decode_i32(&self, bytes: [u8; 4]) -> i32 { BigEndian::read_i32(&bytes) }
    fn encode_i32(&self, value: i32) -> [u8; 4] {
        let mut out = [0u8; 4];
        BigEndian::write_i32(&mut out, value);
        out
    }
}

pub struct LtlIeeeCodec;
impl WordCodec for LtlIeeeCodec {
    fn encoding(&self) -> BinaryEncoding { BinaryEncoding::LtlIeee }
    fn decode_f64(&self, bytes: [u8; 8]) -> Result<f64, CodecError> { Ok(LittleEndian::read_f64(&bytes)) }
    fn encode_f64(&self, value: f64) -> Result<[u8; 8], CodecError> {
        let mut out = [0u8; 8];
        LittleEndian::write_f64(&mut out, value);
        Ok(out)
    }
    fn decode_i32(&self, bytes: [u8; 4]) -> i32 { LittleEndian::read_i32(&bytes) }
    fn encode_i32(&self, value: i32) -> [u8; 4] {
        let mut out = [0u8; 4];
        LittleEndian::write_i32(&mut out, value);
        out
    }
}

pub struct VaxGfloatCodec;
impl WordCodec for VaxGfloatCodec {
    fn encoding(&self) -> BinaryEncoding { BinaryEncoding::VaxGfloat }
    fn decode_f64(&self, bytes: [u8; 8]) -> Result<f64, CodecError> {
        vax_value(vax::gfloat_to_ieee(&bytes), self.encoding(), &bytes)
    }
    fn encode_f64(&self, value: f64) -> Result<[u8; 8], CodecError> {
        vax_bits(vax::ieee_to_gfloat(value), self.encoding(), value)
    }
    fn decode_i32(&self, bytes: [u8; 4]) -> i32 { LittleEndian::read_i32(&bytes) }
    fn encode_i32(&self, value: i32) -> [u8; 4] { LtlIeeeCodec.encode_i32(value) }
}

pub struct VaxDfloatCodec;
impl WordCodec for VaxDfloatCodec {
    fn encoding(&self) -> BinaryEncoding { BinaryEncoding::VaxDfloat }
    fn decode_f64(&self, bytes: [u8; 8]) -> Result<f64, CodecError> {
        vax_value(vax::dfloat_to_ieee(&bytes), self.encoding(), &bytes)
    }
    fn encode_f64(&self, value: f64) -> Result<[u8; 8], CodecError> {
        vax_bits(vax::ieee_to_dfloat(value), self.encoding(), value)
    }
    fn decode_i32(&self, bytes: [u8; 4]) -> i32 { LittleEndian::read_i32(&bytes) }
    fn encode_i32(&self, value: i32) -> [u8; 4] { LtlIeeeCodec.encode_i32(value) }
}

fn vax_value(decoded: VaxDecode, encoding: BinaryEncoding, raw: &[u8; 8]) -> Result<f64, CodecError> {
    match decoded {
        VaxDecode::Value(bits) => Ok(f64::from_bits(bits)),
        VaxDecode::Reserved => Err(CodecError::ReservedOperand { encoding, bits: hex::encode(raw) }),
    }
}

fn vax_bits(encoded: VaxEncode, encoding: BinaryEncoding, value: f64) -> Result<[u8; 8], CodecError> {
    match encoded {
        VaxEncode::Bits(b) => Ok(b),
        VaxEncode::Overflow => Err(CodecError::Unrepresentable { value, encoding }),
    }
}

/// Codec for `encoding`.
pub fn get_codec(encoding: BinaryEncoding) -> &'static dyn WordCodec {
    match encoding {
        BinaryEncoding::BigIeee => &BigIeeeCodec,
        BinaryEncoding::LtlIeee => &LtlIeeeCodec,
        BinaryEncoding::VaxGfloat => &VaxGfloatCodec,
        BinaryEncoding::VaxDfloat => &VaxDfloatCodec,
    }
}

// ── Slice helpers ────────────────────────────────────────────────────────────

fn word_at(bytes: &[u8]) -> [u8; 8] {
    let mut w = [0u8; 8];
    w.copy_from_slice(&bytes[..WORD_BYTES]);
    w
}

/// Decode whole words from `bytes`.  A trailing partial word is ignored.
pub fn decode_words(bytes: &[u8], encoding: BinaryEncoding) -> Result<Vec<f64>, CodecError> {
    let codec = get_codec(encoding);
    bytes.chunks_exact(WORD_BYTES).map(|c| codec.decode_f64(word_at(c))).collect()
}

/// Encode `values` as consecutive words.
pub fn encode_words(values: &[f64], encoding: BinaryEncoding) -> Result<Vec<u8>, CodecError> {
    let codec = get_codec(encoding);
    let mut out = Vec::with_capacity(values.len() * WORD_BYTES);
    for v in values {
        out.extend_from_slice(&codec.encode_f64(*v)?);
    }
    Ok(out)
}

/// Re-encode every whole word of `bytes` from one encoding to another.
///
/// Same-encoding translation is a plain copy.  With the `parallel` feature
/// the words are converted on the Rayon pool; the result is identical.
pub fn translate_words(bytes: &[u8], from: BinaryEncoding, to: BinaryEncoding) -> Result<Vec<u8>, CodecError> {
    let whole = bytes.len() - bytes.len() % WORD_BYTES;
    if from == to {
        return Ok(bytes[..whole].to_vec());
    }
    let src = get_codec(from);
    let dst = get_codec(to);
    convert_words(&bytes[..whole], |chunk| dst.encode_f64(src.decode_f64(word_at(chunk))?))
}

#[cfg(feature = "parallel")]
fn convert_words<F>(bytes: &[u8], convert: F) -> Result<Vec<u8>, CodecError>
where
    F: Fn(&[u8]) -> Result<[u8; 8], CodecError> + Send + Sync,
{
    use rayon::prelude::*;

    let words: Vec<[u8; 8]> = bytes.par_chunks_exact(WORD_BYTES).map(convert).collect::<Result<_, _>>()?;
    Ok(words.concat())
}

#[cfg(not(feature = "parallel"))]
fn convert_words<F>(bytes: &[u8], convert: F) -> Result<Vec<u8>, CodecError>
where
    F: Fn(&[u8]) -> Result<[u8; 8], CodecError>,
{
    let mut out = Vec::with_capacity(bytes.len());
    for chunk in bytes.chunks_exact(WORD_BYTES) {
        out.extend_from_slice(&convert(chunk)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ieee_codecs_mirror_byte_order() {
        assert_eq!(BigIeeeCodec.encode_f64(1.0).unwrap(), [0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(LtlIeeeCodec.encode_f64(1.0).unwrap(), [0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);
        assert_eq!(BigIeeeCodec.encode_i32(258), [0, 0, 1, 2]);
        assert_eq!(VaxDfloatCodec.decode_i32([2, 1, 0, 0]), 258);
    }

    #[test]
    fn translate_between_every_pair() {
        let values = [0.0, 1.0, -2.5, 1234.5678, 1.0e-20];
        for from in BinaryEncoding::ALL {
            let bytes = encode_words(&values, *from).unwrap();
            for to in BinaryEncoding::ALL {
                let moved = translate_words(&bytes, *from, *to).unwrap();
                assert_eq!(decode_words(&moved, *to).unwrap(), values, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn unrepresentable_values_surface() {
        let err = encode_words(&[1.0e200], BinaryEncoding::VaxDfloat).unwrap_err();
        assert!(matches!(err, CodecError::Unrepresentable { encoding: BinaryEncoding::VaxDfloat, .. }));
        let reserved = [0, 0x80, 0, 0, 0, 0, 0, 0];
        let err = decode_words(&reserved, BinaryEncoding::VaxGfloat).unwrap_err();
        assert_eq!(
            err,
            CodecError::ReservedOperand { encoding: BinaryEncoding::VaxGfloat, bits: "0080000000000000".into() }
        );
    }

    #[test]
    fn partial_words_are_dropped() {
        let mut bytes = encode_words(&[3.0], BinaryEncoding::BigIeee).unwrap();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert_eq!(translate_words(&bytes, BinaryEncoding::BigIeee, BinaryEncoding::LtlIeee).unwrap().len(), 8);
    }
}
