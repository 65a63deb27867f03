//! Operation region spaces and the lazy field-to-region binding.
//!
//! A [`RegionSpace`] is the storage behind an operation region, addressed in
//! bits and accessed in elements of the width the field declared. A
//! [`FieldReference`] binds one field declaration to its region and builds
//! the region space the first time the field is touched.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use log::{debug, trace, warn};

use crate::AmlError;
use crate::access::{self, AccessWidth};
use crate::context::{ExecutionContext, evaluate_integer};
use crate::flags::{AccessType, FieldFlags, UpdateRule};
use crate::object::OpRegion;
use crate::path::AmlPath;
use crate::value::AmlValue;

/// Address space an operation region lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSpaceKind {
    /// Physical memory.
    SystemMemory,
    /// x86 I/O ports.
    SystemIo,
    /// PCI configuration space of the enclosing device.
    PciConfig,
    /// Embedded controller registers.
    EmbeddedControl,
    /// SMBus protocol space.
    SmBus,
    /// CMOS RAM.
    SystemCmos,
    /// A PCI BAR of the enclosing device.
    PciBarTarget,
    /// IPMI messaging.
    Ipmi,
    /// General purpose I/O pins.
    GeneralPurposeIo,
    /// Generic serial bus (I2C, SPI, UART).
    GenericSerialBus,
    /// OEM-defined space (0x80-0xFF).
    OemDefined(u8),
}

impl RegionSpaceKind {
    /// Decodes the `RegionSpace` byte of an `OperationRegion`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidRegionSpace`] for bytes 0x0A-0x7F.
    pub fn from_byte(byte: u8) -> Result<Self, AmlError> {
        Ok(match byte {
            0x00 => Self::SystemMemory,
            0x01 => Self::SystemIo,
            0x02 => Self::PciConfig,
            0x03 => Self::EmbeddedControl,
            0x04 => Self::SmBus,
            0x05 => Self::SystemCmos,
            0x06 => Self::PciBarTarget,
            0x07 => Self::Ipmi,
            0x08 => Self::GeneralPurposeIo,
            0x09 => Self::GenericSerialBus,
            0x80..=0xFF => Self::OemDefined(byte),
            other => return Err(AmlError::InvalidRegionSpace(other)),
        })
    }
}

impl fmt::Display for RegionSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SystemMemory => "SystemMemory",
            Self::SystemIo => "SystemIO",
            Self::PciConfig => "PCI_Config",
            Self::EmbeddedControl => "EmbeddedControl",
            Self::SmBus => "SMBus",
            Self::SystemCmos => "SystemCMOS",
            Self::PciBarTarget => "PciBarTarget",
            Self::Ipmi => "IPMI",
            Self::GeneralPurposeIo => "GeneralPurposeIO",
            Self::GenericSerialBus => "GenericSerialBus",
            Self::OemDefined(byte) => return write!(f, "OEM({byte:#x})"),
        };
        f.write_str(name)
    }
}

/// Bit-addressed storage behind an operation region.
///
/// Offsets are relative to the start of the region. Implementations are
/// exclusively owned by one [`FieldReference`].
pub trait RegionSpace: fmt::Debug {
    /// The address space this storage belongs to.
    fn kind(&self) -> RegionSpaceKind;

    /// Width of one access in bits (8, 16, 32 or 64).
    fn element_bits(&self) -> u32;

    /// Size of the region in bits, rounded up to whole elements.
    fn total_bits(&self) -> u64;

    /// Reads `width` bits (1-64) at `bit_offset`.
    ///
    /// # Errors
    ///
    /// Returns a range error for empty, over-wide or out-of-bounds accesses.
    fn read(&mut self, bit_offset: u64, width: u32) -> Result<u64, AmlError>;

    /// Writes the low `width` bits (1-64) of `value` at `bit_offset`.
    ///
    /// # Errors
    ///
    /// Returns a range error for empty, over-wide or out-of-bounds accesses
    /// and for values that do not fit in `width` bits.
    fn write(&mut self, bit_offset: u64, width: u32, value: u64) -> Result<(), AmlError>;

    /// Reads a range of any width as little-endian bytes.
    ///
    /// # Errors
    ///
    /// The default implementation only supports ranges of up to 64 bits.
    fn read_buffer(&mut self, bit_offset: u64, width: u64) -> Result<Vec<u8>, AmlError> {
        let narrow = u32::try_from(width).unwrap_or(u32::MAX);
        let value = self.read(bit_offset, narrow)?;
        let len = usize::from(u8::try_from(width.div_ceil(8)).unwrap_or(8));
        Ok(value.to_le_bytes()[..len].to_vec())
    }

    /// Writes little-endian bytes into a range of any width.
    ///
    /// # Errors
    ///
    /// The default implementation only supports ranges of up to 64 bits.
    fn write_buffer(&mut self, bit_offset: u64, width: u64, bytes: &[u8]) -> Result<(), AmlError> {
        let narrow = u32::try_from(width).unwrap_or(u32::MAX);
        let mut raw = [0u8; 8];
        for (dst, src) in raw.iter_mut().zip(bytes) {
            *dst = *src;
        }
        let value = u64::from_le_bytes(raw) & access::max_value(narrow);
        self.write(bit_offset, narrow, value)
    }

    /// Reads a field unit: an Integer up to 64 bits, a Buffer above.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`read`](Self::read) and
    /// [`read_buffer`](Self::read_buffer).
    fn read_value(&mut self, bit_offset: u64, width: u64) -> Result<AmlValue, AmlError> {
        match u32::try_from(width) {
            Ok(narrow) if narrow <= 64 => self.read(bit_offset, narrow).map(AmlValue::Integer),
            _ => self.read_buffer(bit_offset, width).map(AmlValue::Buffer),
        }
    }

    /// Writes an Integer or Buffer into a field unit.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::TypeMismatch`] for other value kinds and
    /// propagates range errors.
    fn write_value(&mut self, bit_offset: u64, width: u64, value: &AmlValue) -> Result<(), AmlError> {
        match (value, u32::try_from(width)) {
            (AmlValue::Integer(v), Ok(narrow)) if narrow <= 64 => self.write(bit_offset, narrow, *v),
            (AmlValue::Integer(v), _) => self.write_buffer(bit_offset, width, &v.to_le_bytes()),
            (AmlValue::Buffer(bytes), _) => self.write_buffer(bit_offset, width, bytes),
            (other, _) => Err(AmlError::TypeMismatch {
                expected: "Integer or Buffer",
                found: other.type_name(),
            }),
        }
    }
}

/// A region space backed by an in-memory array of `T` elements.
///
/// System memory, System I/O and PCI configuration regions all use this
/// representation unless the [`ExecutionContext`] maps them elsewhere.
pub struct MemoryRegion<T: AccessWidth> {
    kind: RegionSpaceKind,
    base: u64,
    elements: Vec<T>,
    update_rule: UpdateRule,
}

impl<T: AccessWidth> MemoryRegion<T> {
    /// Allocates a zeroed region of `ceil(length / size_of::<T>())` elements.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::EmptyRegion`] for a zero length and
    /// [`AmlError::RegionTooLarge`] if the backing array can't be allocated.
    pub fn new(
        kind: RegionSpaceKind,
        base: u64,
        length: u64,
        update_rule: UpdateRule,
    ) -> Result<Self, AmlError> {
        if length == 0 {
            return Err(AmlError::EmptyRegion);
        }
        let element_bytes = u64::from(T::BITS / 8);
        let count = usize::try_from(length.div_ceil(element_bytes))
            .map_err(|_| AmlError::RegionTooLarge(length))?;

        let mut elements = Vec::new();
        elements
            .try_reserve_exact(count)
            .map_err(|_| AmlError::RegionTooLarge(length))?;
        elements.resize(count, T::from_u64(0));

        Ok(Self {
            kind,
            base,
            elements,
            update_rule,
        })
    }
}

impl<T: AccessWidth> fmt::Debug for MemoryRegion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{:#x}[u{} x {}, {:?}]",
            self.kind,
            self.base,
            T::BITS,
            self.elements.len(),
            self.update_rule
        )
    }
}

impl<T: AccessWidth> RegionSpace for MemoryRegion<T> {
    fn kind(&self) -> RegionSpaceKind {
        self.kind
    }

    fn element_bits(&self) -> u32 {
        T::BITS
    }

    fn total_bits(&self) -> u64 {
        self.elements.len() as u64 * u64::from(T::BITS)
    }

    fn read(&mut self, bit_offset: u64, width: u32) -> Result<u64, AmlError> {
        access::read_bits(self.elements.as_mut_slice(), bit_offset, width)
    }

    fn write(&mut self, bit_offset: u64, width: u32, value: u64) -> Result<(), AmlError> {
        access::write_bits(
            self.elements.as_mut_slice(),
            bit_offset,
            width,
            value,
            self.update_rule,
        )
    }

    fn read_buffer(&mut self, bit_offset: u64, width: u64) -> Result<Vec<u8>, AmlError> {
        access::read_buffer(self.elements.as_mut_slice(), bit_offset, width)
    }

    fn write_buffer(&mut self, bit_offset: u64, width: u64, bytes: &[u8]) -> Result<(), AmlError> {
        access::write_buffer(
            self.elements.as_mut_slice(),
            bit_offset,
            width,
            bytes,
            self.update_rule,
        )
    }
}

/// Everything needed to build a region space for one field declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRequest {
    /// The region's address space.
    pub kind: RegionSpaceKind,
    /// Evaluated region offset.
    pub base: u64,
    /// Evaluated region length in bytes.
    pub length: u64,
    /// The field's declared access type.
    pub access: AccessType,
    /// The field's partial-write policy.
    pub update_rule: UpdateRule,
    /// The field unit that triggered resolution, for diagnostics.
    pub field: AmlPath,
}

/// Builds the array-backed region space for `request`.
///
/// # Errors
///
/// Returns [`AmlError::UnsupportedRegionSpace`] for kinds without an
/// implementation and [`AmlError::UnsupportedAccessType`] for access widths
/// the kind does not allow (buffer access anywhere, anything but byte access
/// on the embedded controller).
pub fn build_region_space(request: &RegionRequest) -> Result<Box<dyn RegionSpace>, AmlError> {
    let unsupported_access = || AmlError::UnsupportedAccessType {
        kind: request.kind,
        access: request.access,
        field: request.field,
    };

    match request.kind {
        RegionSpaceKind::SystemMemory | RegionSpaceKind::SystemIo | RegionSpaceKind::PciConfig => {
            match request.access {
                AccessType::Any | AccessType::Byte => memory_region::<u8>(request),
                AccessType::Word => memory_region::<u16>(request),
                AccessType::DWord => memory_region::<u32>(request),
                AccessType::QWord => memory_region::<u64>(request),
                AccessType::Buffer => Err(unsupported_access()),
            }
        }
        RegionSpaceKind::EmbeddedControl => match request.access {
            AccessType::Byte => memory_region::<u8>(request),
            _ => Err(unsupported_access()),
        },
        kind @ (RegionSpaceKind::SmBus
        | RegionSpaceKind::SystemCmos
        | RegionSpaceKind::PciBarTarget
        | RegionSpaceKind::Ipmi
        | RegionSpaceKind::GeneralPurposeIo
        | RegionSpaceKind::GenericSerialBus
        | RegionSpaceKind::OemDefined(_)) => Err(AmlError::UnsupportedRegionSpace {
            kind,
            field: request.field,
        }),
    }
}

fn memory_region<T: AccessWidth>(request: &RegionRequest) -> Result<Box<dyn RegionSpace>, AmlError> {
    Ok(Box::new(MemoryRegion::<T>::new(
        request.kind,
        request.base,
        request.length,
        request.update_rule,
    )?))
}

/// Binding between a field declaration and its operation region.
///
/// The region space is created on first use and kept for the lifetime of
/// the reference; its element width never changes afterwards.
pub struct FieldReference {
    flags: FieldFlags,
    space: Option<Box<dyn RegionSpace>>,
}

impl FieldReference {
    /// Creates an unresolved binding for a field declared with `flags`.
    #[must_use]
    pub const fn new(flags: FieldFlags) -> Self {
        Self { flags, space: None }
    }

    /// Returns `true` once a region space has been built.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.space.is_some()
    }

    /// Returns the region space, building it on the first call.
    ///
    /// The first call evaluates the region's offset and length in `ctx`,
    /// offers the region to [`ExecutionContext::map_region`], and otherwise
    /// builds an array-backed space with [`build_region_space`]. Later calls
    /// return the cached space without evaluating anything.
    ///
    /// # Errors
    ///
    /// Propagates evaluation failures and the errors of
    /// [`build_region_space`]. A failed resolution caches nothing.
    pub fn resolve<C>(
        &mut self,
        field: AmlPath,
        region: &OpRegion,
        ctx: &mut C,
    ) -> Result<&mut dyn RegionSpace, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        if self.space.is_none() {
            let base = evaluate_integer(ctx, &region.offset)?;
            let length = evaluate_integer(ctx, &region.length)?;
            let request = RegionRequest {
                kind: region.space,
                base,
                length,
                access: self.flags.access_type,
                update_rule: self.flags.update_rule,
                field,
            };

            let space = match ctx.map_region(&request)? {
                Some(space) => space,
                None => build_region_space(&request).inspect_err(|err| {
                    warn!("aml: {err}");
                })?,
            };
            debug!(
                "aml: bound {field} to {:?} ({} bytes at {base:#x})",
                space, length
            );
            self.space = Some(space);
        }

        match self.space.as_deref_mut() {
            Some(space) => {
                trace!("aml: access {field} via {space:?}");
                Ok(space)
            }
            None => Err(AmlError::Evaluation("region space missing after resolution")),
        }
    }
}

impl fmt::Debug for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldReference")
            .field("flags", &self.flags)
            .field("space", &self.space)
            .finish()
    }
}
