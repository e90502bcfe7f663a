use crate::error::WireError;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::One;
#[cfg(test)]
use num_traits::Zero;
use std::str;

/// A fixed-width 64-bit varint never needs more than ten 7-bit groups.
pub const MAX_VARINT_GROUPS: usize = 10;

/// Upper bound on the encoded length of an arbitrary-precision nat or int.
pub const MAX_BIG_VARINT_BYTES: usize = 4096;

/// A byte buffer meant for reading.
///
/// Example usage:
///
/// ```
/// let mut bb = brine_idl_schema::ByteBuffer::new(&[0x03, 0x61, 0x62, 0x63, 0xe5, 0x8e, 0x26]);
/// assert_eq!(bb.read_text(), Ok("abc"));
/// assert_eq!(bb.read_var_uint(), Ok(624485));
/// ```
///
pub struct ByteBuffer<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> ByteBuffer<'a> {
    /// Create a new ByteBuffer that wraps the provided byte slice. The lifetime
    /// of the returned ByteBuffer must not outlive the lifetime of the byte
    /// slice.
    pub fn new(data: &'a [u8]) -> ByteBuffer<'a> {
        ByteBuffer { data, index: 0 }
    }

    /// Retrieves the underlying byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Retrieves the current index into the underlying byte slice. This starts
    /// off as 0 and ends up as `self.data().len()` when everything has been
    /// read.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.index
    }

    /// Try to read a boolean value starting at the current index. Only `0`
    /// and `1` are accepted.
    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBoolean(other)),
        }
    }

    /// Try to read a presence flag (the prefix of `opt` and reference values).
    pub fn read_presence(&mut self) -> Result<bool, WireError> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidPresenceFlag(other)),
        }
    }

    /// Try to read a byte starting at the current index.
    pub fn read_byte(&mut self) -> Result<u8, WireError> {
        if self.index >= self.data.len() {
            Err(WireError::UnexpectedEof)
        } else {
            let value = self.data[self.index];
            self.index += 1;
            Ok(value)
        }
    }

    /// Try to read `len` bytes starting at the current index.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            Err(WireError::UnexpectedEof)
        } else {
            let value = &self.data[self.index..self.index + len];
            self.index += len;
            Ok(value)
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let bytes = self.read_bytes(N)?;
        bytes.try_into().map_err(|_| WireError::UnexpectedEof)
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i8(&mut self) -> Result<i8, WireError> {
        Ok(self.read_byte()? as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, WireError> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Try to read an unsigned LEB128 integer starting at the current index.
    pub fn read_var_uint(&mut self) -> Result<u64, WireError> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;

        for _ in 0..MAX_VARINT_GROUPS {
            let byte = self.read_byte()?;
            let group = (byte & 0x7f) as u64;

            // The tenth group only has room for the top bit.
            if shift == 63 && group > 1 {
                return Err(WireError::MalformedVarint);
            }
            result |= group << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }

        Err(WireError::MalformedVarint)
    }

    /// Try to read a signed LEB128 integer starting at the current index.
    pub fn read_var_int(&mut self) -> Result<i64, WireError> {
        let mut result: i64 = 0;
        let mut shift: u32 = 0;

        for _ in 0..MAX_VARINT_GROUPS {
            let byte = self.read_byte()?;
            result |= ((byte & 0x7f) as i64) << shift;
            shift += 7;

            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }

        Err(WireError::MalformedVarint)
    }

    /// Reads an unsigned LEB128 length and checks it against the bytes left,
    /// so a corrupt count can never drive a huge allocation.
    pub fn read_len(&mut self) -> Result<usize, WireError> {
        let len = self.read_var_uint()?;
        match usize::try_from(len) {
            Ok(len) if len <= self.remaining() => Ok(len),
            _ => Err(WireError::UnexpectedEof),
        }
    }

    fn read_groups(&mut self) -> Result<Vec<u8>, WireError> {
        let mut groups = Vec::new();
        loop {
            if groups.len() == MAX_BIG_VARINT_BYTES {
                return Err(WireError::MalformedVarint);
            }
            let byte = self.read_byte()?;
            groups.push(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(groups);
            }
        }
    }

    /// Try to read an arbitrary-precision natural number.
    pub fn read_nat(&mut self) -> Result<BigUint, WireError> {
        let groups = self.read_groups()?;
        BigUint::from_radix_le(&groups, 128).ok_or(WireError::MalformedVarint)
    }

    /// Try to read an arbitrary-precision signed integer.
    pub fn read_int(&mut self) -> Result<BigInt, WireError> {
        let groups = self.read_groups()?;
        let negative = groups.last().map_or(false, |last| last & 0x40 != 0);
        let magnitude = BigUint::from_radix_le(&groups, 128).ok_or(WireError::MalformedVarint)?;
        let mut result = BigInt::from_biguint(Sign::Plus, magnitude);
        if negative {
            result -= BigInt::one() << (7 * groups.len());
        }
        Ok(result)
    }

    /// Try to read a length-prefixed UTF-8 string. The string aliases the
    /// underlying memory.
    pub fn read_text(&mut self) -> Result<&'a str, WireError> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }

    /// Try to read a length-prefixed byte string.
    pub fn read_blob(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_len()?;
        self.read_bytes(len)
    }
}

/// Number of bytes `write_var_uint` emits for `value`.
pub fn size_var_uint(mut value: u64) -> usize {
    let mut size = 1;
    while value >= 0x80 {
        value >>= 7;
        size += 1;
    }
    size
}

/// Number of bytes `write_var_int` emits for `value`.
pub fn size_var_int(mut value: i64) -> usize {
    let mut size = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        size += 1;
        if (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0) {
            return size;
        }
    }
}

/// Number of bytes `write_nat` emits for `value`.
pub fn size_nat(value: &BigUint) -> usize {
    (value.bits().div_ceil(7) as usize).max(1)
}

/// Number of bytes `write_int` emits for `value`: enough 7-bit groups to hold
/// the two's complement form including its sign bit.
pub fn size_int(value: &BigInt) -> usize {
    let magnitude_bits = match value.sign() {
        Sign::Minus => (value.magnitude() - BigUint::one()).bits(),
        _ => value.magnitude().bits(),
    };
    ((magnitude_bits + 1).div_ceil(7) as usize).max(1)
}

fn twos_complement_group(bytes: &[u8], fill: u8, group: usize) -> u8 {
    let bit = group * 7;
    let lo = *bytes.get(bit / 8).unwrap_or(&fill) as u16;
    let hi = *bytes.get(bit / 8 + 1).unwrap_or(&fill) as u16;
    (((hi << 8 | lo) >> (bit % 8)) & 0x7f) as u8
}

#[test]
fn read_bool() {
    let read = |bytes| ByteBuffer::new(bytes).read_bool();
    assert_eq!(read(&[]), Err(WireError::UnexpectedEof));
    assert_eq!(read(&[0]), Ok(false));
    assert_eq!(read(&[1]), Ok(true));
    assert_eq!(read(&[2]), Err(WireError::InvalidBoolean(2)));
}

#[test]
fn read_presence() {
    let read = |bytes| ByteBuffer::new(bytes).read_presence();
    assert_eq!(read(&[0]), Ok(false));
    assert_eq!(read(&[1]), Ok(true));
    assert_eq!(read(&[0xff]), Err(WireError::InvalidPresenceFlag(0xff)));
}

#[test]
fn read_bytes() {
    let read = |bytes, len| ByteBuffer::new(bytes).read_bytes(len);
    assert_eq!(read(&[], 0), Ok(vec![].as_slice()));
    assert_eq!(read(&[], 1), Err(WireError::UnexpectedEof));
    assert_eq!(read(&[0], 1), Ok(vec![0].as_slice()));
    assert_eq!(read(&[0], 2), Err(WireError::UnexpectedEof));

    let mut bb = ByteBuffer::new(&[1, 2, 3, 4, 5]);
    assert_eq!(bb.read_bytes(3), Ok(vec![1, 2, 3].as_slice()));
    assert_eq!(bb.read_bytes(2), Ok(vec![4, 5].as_slice()));
    assert_eq!(bb.read_bytes(1), Err(WireError::UnexpectedEof));
}

#[test]
fn read_fixed_width() {
    let mut bb = ByteBuffer::new(&[0x34, 0x12, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x80, 0x3f]);
    assert_eq!(bb.read_u16(), Ok(0x1234));
    assert_eq!(bb.read_i32(), Ok(-1));
    assert_eq!(bb.read_f32(), Ok(1.0));
    assert_eq!(bb.read_u16(), Err(WireError::UnexpectedEof));
}

#[test]
fn read_var_uint() {
    let read = |bytes| ByteBuffer::new(bytes).read_var_uint();
    assert_eq!(read(&[]), Err(WireError::UnexpectedEof));
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[1]), Ok(1));
    assert_eq!(read(&[127]), Ok(127));
    assert_eq!(read(&[128]), Err(WireError::UnexpectedEof));
    assert_eq!(read(&[128, 1]), Ok(128));
    assert_eq!(read(&[129, 1]), Ok(129));
    assert_eq!(read(&[0xe5, 0x8e, 0x26]), Ok(624485));
    assert_eq!(read(&[255, 255, 255, 255, 15]), Ok(4294967295));
    assert_eq!(
        read(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
        Ok(u64::MAX)
    );
    assert_eq!(
        read(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02]),
        Err(WireError::MalformedVarint)
    );
    assert_eq!(read(&[0x80; 11]), Err(WireError::MalformedVarint));
}

#[test]
fn read_var_int() {
    let read = |bytes| ByteBuffer::new(bytes).read_var_int();
    assert_eq!(read(&[]), Err(WireError::UnexpectedEof));
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[1]), Ok(1));
    assert_eq!(read(&[0x7f]), Ok(-1));
    assert_eq!(read(&[0x3f]), Ok(63));
    assert_eq!(read(&[0x40]), Ok(-64));
    assert_eq!(read(&[0xc0, 0x00]), Ok(64));
    assert_eq!(read(&[0xbf, 0x7f]), Ok(-65));
    assert_eq!(read(&[0xc0, 0xbb, 0x78]), Ok(-123456));
    assert_eq!(
        read(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00]),
        Ok(i64::MAX)
    );
    assert_eq!(
        read(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7f]),
        Ok(i64::MIN)
    );
    assert_eq!(read(&[0xff; 11]), Err(WireError::MalformedVarint));
}

#[test]
fn read_nat() {
    let read = |bytes| ByteBuffer::new(bytes).read_nat();
    assert_eq!(read(&[0]), Ok(BigUint::zero()));
    assert_eq!(read(&[0x2a]), Ok(BigUint::from(42u32)));
    assert_eq!(read(&[0xe5, 0x8e, 0x26]), Ok(BigUint::from(624485u32)));
    assert_eq!(
        read(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x04]),
        Ok(BigUint::one() << 128u32)
    );
    assert_eq!(read(&[0x80]), Err(WireError::UnexpectedEof));
    assert_eq!(
        read(&[0x80; MAX_BIG_VARINT_BYTES + 1]),
        Err(WireError::MalformedVarint)
    );
}

#[test]
fn read_int() {
    let read = |bytes| ByteBuffer::new(bytes).read_int();
    assert_eq!(read(&[0]), Ok(BigInt::zero()));
    assert_eq!(read(&[0x7f]), Ok(BigInt::from(-1)));
    assert_eq!(read(&[0x2a]), Ok(BigInt::from(42)));
    assert_eq!(read(&[0xc0, 0xbb, 0x78]), Ok(BigInt::from(-123456)));
    assert_eq!(read(&[0x80, 0x7f]), Ok(BigInt::from(-128)));
    assert_eq!(read(&[0xff, 0x00]), Ok(BigInt::from(127)));
}

#[test]
fn read_text() {
    let read = |bytes| ByteBuffer::new(bytes).read_text();
    assert_eq!(read(&[0]), Ok(""));
    assert_eq!(read(&[3, 97, 98, 99]), Ok("abc"));
    assert_eq!(read(&[4, 240, 159, 141, 149]), Ok("🍕"));
    assert_eq!(read(&[3, 97, 98]), Err(WireError::UnexpectedEof));
    assert_eq!(read(&[2, 0xc3, 0x28]), Err(WireError::InvalidUtf8));
}

#[test]
fn read_sequence() {
    let mut bb = ByteBuffer::new(&[0x01, 0x7f, 0x03, 0x61, 0x62, 0x63, 0x2a, 0x00]);
    assert_eq!(bb.read_bool(), Ok(true));
    assert_eq!(bb.read_var_int(), Ok(-1));
    assert_eq!(bb.read_text(), Ok("abc"));
    assert_eq!(bb.read_u16(), Ok(42));
    assert_eq!(bb.remaining(), 0);
}

/// A byte buffer meant for writing.
///
/// Example usage:
///
/// ```
/// let mut bb = brine_idl_schema::ByteBufferMut::new();
/// bb.write_text("abc");
/// bb.write_var_int(-123456);
/// assert_eq!(bb.data(), [0x03, 0x61, 0x62, 0x63, 0xc0, 0xbb, 0x78]);
/// ```
///
#[derive(Default)]
pub struct ByteBufferMut {
    data: Vec<u8>,
}

impl ByteBufferMut {
    /// Creates an empty ByteBufferMut ready for writing.
    pub fn new() -> ByteBufferMut {
        ByteBufferMut { data: vec![] }
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> ByteBufferMut {
        ByteBufferMut {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Consumes this buffer and returns the underlying backing store. Use this
    /// to get the data out when you're done writing to the buffer.
    pub fn data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write a boolean value to the end of the buffer.
    pub fn write_bool(&mut self, value: bool) {
        self.data.push(if value { 1 } else { 0 });
    }

    /// Write a byte to the end of the buffer.
    pub fn write_byte(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Write a raw byte slice to the end of the buffer.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
    }

    /// Write an unsigned LEB128 integer to the end of the buffer.
    pub fn write_var_uint(&mut self, mut value: u64) {
        loop {
            let byte = value as u8 & 0x7f;
            value >>= 7;

            if value == 0 {
                self.write_byte(byte);
                return;
            }

            self.write_byte(byte | 0x80);
        }
    }

    /// Write a signed LEB128 integer to the end of the buffer.
    pub fn write_var_int(&mut self, mut value: i64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;

            if (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0) {
                self.write_byte(byte);
                return;
            }

            self.write_byte(byte | 0x80);
        }
    }

    /// Write an arbitrary-precision natural number as unsigned LEB128.
    pub fn write_nat(&mut self, value: &BigUint) {
        let groups = value.to_radix_le(128);
        let last = groups.len() - 1;
        for (i, group) in groups.into_iter().enumerate() {
            self.write_byte(if i == last { group } else { group | 0x80 });
        }
    }

    /// Write an arbitrary-precision integer as signed LEB128.
    pub fn write_int(&mut self, value: &BigInt) {
        let bytes = value.to_signed_bytes_le();
        let fill = if value.sign() == Sign::Minus { 0xff } else { 0x00 };
        let count = size_int(value);
        for i in 0..count {
            let group = twos_complement_group(&bytes, fill, i);
            self.write_byte(if i + 1 == count { group } else { group | 0x80 });
        }
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_byte(value as u8);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Write a UTF-8 string prefixed with its byte length.
    pub fn write_text(&mut self, value: &str) {
        self.write_blob(value.as_bytes());
    }

    /// Write a byte string prefixed with its length.
    pub fn write_blob(&mut self, value: &[u8]) {
        self.write_var_uint(value.len() as u64);
        self.write_bytes(value);
    }
}

#[cfg(test)]
fn write_once(cb: impl FnOnce(&mut ByteBufferMut)) -> Vec<u8> {
    let mut bb = ByteBufferMut::new();
    cb(&mut bb);
    bb.data()
}

#[test]
fn write_bool() {
    assert_eq!(write_once(|bb| bb.write_bool(false)), [0]);
    assert_eq!(write_once(|bb| bb.write_bool(true)), [1]);
}

#[test]
fn write_fixed_width() {
    assert_eq!(write_once(|bb| bb.write_u16(0x1234)), [0x34, 0x12]);
    assert_eq!(write_once(|bb| bb.write_i32(-2)), [0xfe, 0xff, 0xff, 0xff]);
    assert_eq!(write_once(|bb| bb.write_f64(1.0)), [0, 0, 0, 0, 0, 0, 0xf0, 0x3f]);
    assert_eq!(write_once(|bb| bb.write_i8(-1)), [0xff]);
}

#[test]
fn write_var_uint() {
    assert_eq!(write_once(|bb| bb.write_var_uint(0)), [0]);
    assert_eq!(write_once(|bb| bb.write_var_uint(42)), [0x2a]);
    assert_eq!(write_once(|bb| bb.write_var_uint(127)), [127]);
    assert_eq!(write_once(|bb| bb.write_var_uint(128)), [128, 1]);
    assert_eq!(write_once(|bb| bb.write_var_uint(624485)), [0xe5, 0x8e, 0x26]);
    assert_eq!(
        write_once(|bb| bb.write_var_uint(u64::MAX)),
        [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]
    );
}

#[test]
fn write_var_int() {
    assert_eq!(write_once(|bb| bb.write_var_int(0)), [0]);
    assert_eq!(write_once(|bb| bb.write_var_int(-1)), [0x7f]);
    assert_eq!(write_once(|bb| bb.write_var_int(63)), [0x3f]);
    assert_eq!(write_once(|bb| bb.write_var_int(64)), [0xc0, 0x00]);
    assert_eq!(write_once(|bb| bb.write_var_int(-64)), [0x40]);
    assert_eq!(write_once(|bb| bb.write_var_int(-65)), [0xbf, 0x7f]);
    assert_eq!(write_once(|bb| bb.write_var_int(-123456)), [0xc0, 0xbb, 0x78]);
    assert_eq!(
        write_once(|bb| bb.write_var_int(i64::MIN)),
        [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7f]
    );
}

#[test]
fn write_nat() {
    assert_eq!(write_once(|bb| bb.write_nat(&BigUint::zero())), [0]);
    assert_eq!(write_once(|bb| bb.write_nat(&BigUint::from(42u32))), [0x2a]);
    assert_eq!(
        write_once(|bb| bb.write_nat(&BigUint::from(624485u32))),
        [0xe5, 0x8e, 0x26]
    );
}

#[test]
fn write_int() {
    assert_eq!(write_once(|bb| bb.write_int(&BigInt::zero())), [0]);
    assert_eq!(write_once(|bb| bb.write_int(&BigInt::from(-1))), [0x7f]);
    assert_eq!(write_once(|bb| bb.write_int(&BigInt::from(42))), [0x2a]);
    assert_eq!(write_once(|bb| bb.write_int(&BigInt::from(64))), [0xc0, 0x00]);
    assert_eq!(write_once(|bb| bb.write_int(&BigInt::from(-128))), [0x80, 0x7f]);
    assert_eq!(
        write_once(|bb| bb.write_int(&BigInt::from(-123456))),
        [0xc0, 0xbb, 0x78]
    );
}

#[test]
fn big_and_fixed_codecs_agree() {
    for n in [0i64, 1, -1, 63, 64, -64, -65, 127, 128, -129, 1 << 40, -(1 << 40), i64::MAX, i64::MIN] {
        let fixed = write_once(|bb| bb.write_var_int(n));
        let big = write_once(|bb| bb.write_int(&BigInt::from(n)));
        assert_eq!(fixed, big, "int {}", n);
        assert_eq!(ByteBuffer::new(&big).read_int(), Ok(BigInt::from(n)));
    }
    for n in [0u64, 1, 127, 128, 300, 1 << 35, u64::MAX] {
        let fixed = write_once(|bb| bb.write_var_uint(n));
        let big = write_once(|bb| bb.write_nat(&BigUint::from(n)));
        assert_eq!(fixed, big, "nat {}", n);
    }
}

#[test]
fn size_matches_written_length() {
    for n in [0u64, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
        assert_eq!(size_var_uint(n), write_once(|bb| bb.write_var_uint(n)).len());
        assert_eq!(size_nat(&BigUint::from(n)), write_once(|bb| bb.write_nat(&BigUint::from(n))).len());
    }
    for n in [0i64, -1, 63, 64, -64, -65, 8191, 8192, -8192, -8193, i64::MAX, i64::MIN] {
        assert_eq!(size_var_int(n), write_once(|bb| bb.write_var_int(n)).len());
        assert_eq!(size_int(&BigInt::from(n)), write_once(|bb| bb.write_int(&BigInt::from(n))).len());
    }

    let huge = (BigInt::one() << 200u32) - BigInt::one();
    let bytes = write_once(|bb| bb.write_int(&-&huge));
    assert_eq!(size_int(&-&huge), bytes.len());
    assert_eq!(ByteBuffer::new(&bytes).read_int(), Ok(-huge));
}

#[test]
fn write_text() {
    assert_eq!(write_once(|bb| bb.write_text("")), [0]);
    assert_eq!(write_once(|bb| bb.write_text("abc")), [3, 97, 98, 99]);
    assert_eq!(write_once(|bb| bb.write_text("🍕")), [4, 240, 159, 141, 149]);
}
