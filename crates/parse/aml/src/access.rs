//! Bit-granular access over arrays of fixed-width elements.
//!
//! Fields and buffer fields name arbitrary bit ranges that need not start or
//! end on an element boundary. [`read_bits`] and [`write_bits`] split such a
//! range into runs confined to single elements (little-endian bit order
//! across elements) and load, mask and merge each run in turn. Both work on
//! any [`ElementStore`]: an in-memory region, an evaluated buffer, or an
//! index/data register window.
//!
//! All range and value checks happen before the first element is touched.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::AmlError;
use crate::flags::UpdateRule;
use crate::value::AmlValue;

/// A fixed-width unsigned element type (`u8`, `u16`, `u32`, `u64`).
pub trait AccessWidth: Copy + Eq + fmt::Debug + 'static {
    /// Width of the element in bits.
    const BITS: u32;

    /// Zero-extends the element to 64 bits.
    fn to_u64(self) -> u64;

    /// Truncates a 64-bit value to the element width.
    fn from_u64(value: u64) -> Self;
}

macro_rules! impl_access_width {
    ($($ty:ty),*) => {
        $(
            impl AccessWidth for $ty {
                const BITS: u32 = <$ty>::BITS;

                #[inline]
                fn to_u64(self) -> u64 {
                    u64::from(self)
                }

                #[inline]
                #[allow(clippy::cast_possible_truncation)]
                fn from_u64(value: u64) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

impl_access_width!(u8, u16, u32, u64);

/// Storage addressed one element at a time.
pub trait ElementStore {
    /// The element type.
    type Element: AccessWidth;

    /// Number of addressable elements.
    fn element_count(&self) -> usize;

    /// Reads element `index`.
    ///
    /// # Errors
    ///
    /// Implementations backed by other fields propagate their access errors.
    fn load(&mut self, index: usize) -> Result<Self::Element, AmlError>;

    /// Writes element `index`.
    ///
    /// # Errors
    ///
    /// Implementations backed by other fields propagate their access errors.
    fn store(&mut self, index: usize, value: Self::Element) -> Result<(), AmlError>;

    /// Total addressable bits.
    fn total_bits(&self) -> u64 {
        self.element_count() as u64 * u64::from(Self::Element::BITS)
    }
}

impl<T: AccessWidth> ElementStore for [T] {
    type Element = T;

    fn element_count(&self) -> usize {
        self.len()
    }

    fn load(&mut self, index: usize) -> Result<T, AmlError> {
        self.get(index).copied().ok_or(AmlError::AccessOutOfBounds {
            bit_offset: index as u64 * u64::from(T::BITS),
            width: u64::from(T::BITS),
            total_bits: self.total_bits(),
        })
    }

    fn store(&mut self, index: usize, value: T) -> Result<(), AmlError> {
        let total_bits = self.total_bits();
        let slot = self.get_mut(index).ok_or(AmlError::AccessOutOfBounds {
            bit_offset: index as u64 * u64::from(T::BITS),
            width: u64::from(T::BITS),
            total_bits,
        })?;
        *slot = value;
        Ok(())
    }
}

/// Mask with the low `count` bits set.
#[inline]
fn low_mask(count: u32) -> u64 {
    if count >= 64 {
        u64::MAX
    } else {
        (1 << count) - 1
    }
}

/// Largest value representable in `width` bits.
#[must_use]
pub fn max_value(width: u32) -> u64 {
    low_mask(width)
}

/// Rejects empty accesses and accesses that leave `[0, total_bits)`.
///
/// # Errors
///
/// Returns [`AmlError::ZeroWidthAccess`] or [`AmlError::AccessOutOfBounds`].
pub fn check_range(bit_offset: u64, width: u64, total_bits: u64) -> Result<(), AmlError> {
    if width == 0 {
        return Err(AmlError::ZeroWidthAccess);
    }
    match bit_offset.checked_add(width) {
        Some(end) if end <= total_bits => Ok(()),
        _ => Err(AmlError::AccessOutOfBounds {
            bit_offset,
            width,
            total_bits,
        }),
    }
}

/// Rejects integer accesses wider than 64 bits.
fn check_integer_width(width: u32) -> Result<(), AmlError> {
    if width > 64 {
        return Err(AmlError::AccessTooWide(width));
    }
    Ok(())
}

/// Rejects values that do not fit in `width` bits.
///
/// The limit is `2^width - 1`; a value of exactly `2^width` is rejected.
///
/// # Errors
///
/// Returns [`AmlError::ValueTooWide`] naming the value and the maximum.
pub fn check_value(value: u64, width: u32) -> Result<(), AmlError> {
    let max = max_value(width);
    if value > max {
        return Err(AmlError::ValueTooWide { value, width, max });
    }
    Ok(())
}

/// Splits `[bit_offset, bit_offset + width)` into per-element runs.
///
/// Yields `(element index, first bit within element, bit count)`.
fn runs(bit_offset: u64, width: u64, element_bits: u32) -> impl Iterator<Item = (usize, u32, u32)> {
    let element_bits_u64 = u64::from(element_bits);
    // Callers have bounds-checked the range against an in-memory element
    // count, so the index fits in usize.
    #[allow(clippy::cast_possible_truncation)]
    let mut index = (bit_offset / element_bits_u64) as usize;
    #[allow(clippy::cast_possible_truncation)]
    let mut start = (bit_offset % element_bits_u64) as u32;
    let mut remaining = width;

    core::iter::from_fn(move || {
        if remaining == 0 {
            return None;
        }
        let available = element_bits - start;
        #[allow(clippy::cast_possible_truncation)]
        let count = remaining.min(u64::from(available)) as u32;
        let run = (index, start, count);
        remaining -= u64::from(count);
        index += 1;
        start = 0;
        Some(run)
    })
}

/// Reads `width` bits (1-64) starting at `bit_offset`.
///
/// # Errors
///
/// Returns a range error if the access is empty, wider than 64 bits or
/// outside the store, or any error the store reports.
pub fn read_bits<S>(store: &mut S, bit_offset: u64, width: u32) -> Result<u64, AmlError>
where
    S: ElementStore + ?Sized,
{
    check_integer_width(width)?;
    check_range(bit_offset, u64::from(width), store.total_bits())?;

    let mut result = 0;
    let mut shift = 0;
    for (index, start, count) in runs(bit_offset, u64::from(width), S::Element::BITS) {
        let element = store.load(index)?.to_u64();
        result |= ((element >> start) & low_mask(count)) << shift;
        shift += count;
    }
    Ok(result)
}

/// Merges `slice` into bits `[start, start + count)` of element `index`.
///
/// A run covering the whole element is stored directly; otherwise the bits
/// outside the run follow `rule`. Only [`UpdateRule::Preserve`] loads the
/// current element.
fn merge_run<S>(
    store: &mut S,
    index: usize,
    start: u32,
    count: u32,
    slice: u64,
    rule: UpdateRule,
) -> Result<(), AmlError>
where
    S: ElementStore + ?Sized,
{
    let mask = low_mask(count) << start;
    let shifted = slice << start;

    let merged = if mask == low_mask(S::Element::BITS) {
        shifted
    } else {
        match rule {
            UpdateRule::Preserve => (store.load(index)?.to_u64() & !mask) | shifted,
            UpdateRule::WriteAsOnes => shifted | !mask,
            UpdateRule::WriteAsZeros => shifted,
        }
    };
    store.store(index, S::Element::from_u64(merged))
}

/// Writes the low `width` bits (1-64) of `value` starting at `bit_offset`.
///
/// Elements only partially covered by the write are merged according to
/// `rule`; elements covered entirely are stored directly.
///
/// # Errors
///
/// Returns a range error if the access is empty, wider than 64 bits, outside
/// the store, or if `value` does not fit in `width` bits. Nothing is written
/// in those cases.
pub fn write_bits<S>(
    store: &mut S,
    bit_offset: u64,
    width: u32,
    value: u64,
    rule: UpdateRule,
) -> Result<(), AmlError>
where
    S: ElementStore + ?Sized,
{
    check_integer_width(width)?;
    check_range(bit_offset, u64::from(width), store.total_bits())?;
    check_value(value, width)?;

    let mut shift = 0;
    for (index, start, count) in runs(bit_offset, u64::from(width), S::Element::BITS) {
        let slice = (value >> shift) & low_mask(count);
        merge_run(store, index, start, count, slice, rule)?;
        shift += count;
    }
    Ok(())
}

/// Extracts `count` (at most 64) bits starting at `bit_pos` from a
/// little-endian byte string, treating missing bytes as zero.
fn extract_bits(bytes: &[u8], bit_pos: u64, count: u32) -> u64 {
    let mut value = 0;
    for i in 0..count {
        let bit = bit_pos + u64::from(i);
        let byte = usize::try_from(bit / 8)
            .ok()
            .and_then(|b| bytes.get(b))
            .copied()
            .unwrap_or(0);
        value |= u64::from((byte >> (bit % 8)) & 1) << i;
    }
    value
}

/// ORs the low `count` bits of `value` into `bytes` starting at `bit_pos`.
fn deposit_bits(bytes: &mut [u8], bit_pos: u64, count: u32, value: u64) {
    for i in 0..count {
        if (value >> i) & 1 == 0 {
            continue;
        }
        let bit = bit_pos + u64::from(i);
        if let Some(byte) = usize::try_from(bit / 8).ok().and_then(|b| bytes.get_mut(b)) {
            *byte |= 1 << (bit % 8);
        }
    }
}

/// Reads a range of any width as a little-endian byte buffer of
/// `ceil(width / 8)` bytes.
///
/// # Errors
///
/// Returns a range error if the access is empty or outside the store, or any
/// error the store reports.
pub fn read_buffer<S>(store: &mut S, bit_offset: u64, width: u64) -> Result<Vec<u8>, AmlError>
where
    S: ElementStore + ?Sized,
{
    check_range(bit_offset, width, store.total_bits())?;

    let len = usize::try_from(width.div_ceil(8)).map_err(|_| AmlError::RegionTooLarge(width))?;
    let mut bytes = vec![0; len];
    let mut shift = 0;
    for (index, start, count) in runs(bit_offset, width, S::Element::BITS) {
        let bits = (store.load(index)?.to_u64() >> start) & low_mask(count);
        deposit_bits(&mut bytes, shift, count, bits);
        shift += u64::from(count);
    }
    Ok(bytes)
}

/// Writes a little-endian byte buffer into a range of any width.
///
/// Missing trailing bytes are written as zero; bytes beyond the range are
/// ignored, as is any excess in the final partial byte.
///
/// # Errors
///
/// Returns a range error if the access is empty or outside the store, or any
/// error the store reports.
pub fn write_buffer<S>(
    store: &mut S,
    bit_offset: u64,
    width: u64,
    bytes: &[u8],
    rule: UpdateRule,
) -> Result<(), AmlError>
where
    S: ElementStore + ?Sized,
{
    check_range(bit_offset, width, store.total_bits())?;

    let mut shift = 0;
    for (index, start, count) in runs(bit_offset, width, S::Element::BITS) {
        let slice = extract_bits(bytes, shift, count);
        merge_run(store, index, start, count, slice, rule)?;
        shift += u64::from(count);
    }
    Ok(())
}

/// Reads a field-sized range as an AML value.
///
/// Ranges of up to 64 bits read as an Integer, wider ones as a Buffer of
/// `ceil(width / 8)` bytes.
///
/// # Errors
///
/// Same as [`read_bits`] and [`read_buffer`].
pub fn read_value<S>(store: &mut S, bit_offset: u64, width: u64) -> Result<AmlValue, AmlError>
where
    S: ElementStore + ?Sized,
{
    match u32::try_from(width) {
        Ok(narrow) if narrow <= 64 => read_bits(store, bit_offset, narrow).map(AmlValue::Integer),
        _ => read_buffer(store, bit_offset, width).map(AmlValue::Buffer),
    }
}

/// Writes an Integer or Buffer value into a field-sized range.
///
/// An Integer must fit in `width` bits when the range is at most 64 bits
/// wide; a Buffer is truncated or zero-extended to the range.
///
/// # Errors
///
/// Returns [`AmlError::TypeMismatch`] for other value kinds, plus the errors
/// of [`write_bits`] and [`write_buffer`].
pub fn write_value<S>(
    store: &mut S,
    bit_offset: u64,
    width: u64,
    value: &AmlValue,
    rule: UpdateRule,
) -> Result<(), AmlError>
where
    S: ElementStore + ?Sized,
{
    match (value, u32::try_from(width)) {
        (AmlValue::Integer(v), Ok(narrow)) if narrow <= 64 => {
            write_bits(store, bit_offset, narrow, *v, rule)
        }
        (AmlValue::Integer(v), _) => write_buffer(store, bit_offset, width, &v.to_le_bytes(), rule),
        (AmlValue::Buffer(bytes), _) => write_buffer(store, bit_offset, width, bytes, rule),
        (other, _) => Err(AmlError::TypeMismatch {
            expected: "Integer or Buffer",
            found: other.type_name(),
        }),
    }
}
