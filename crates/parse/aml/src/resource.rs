//! ACPI resource template decoder.
//!
//! Decodes the byte-encoded resource descriptors returned by `_CRS` into
//! [`ResourceSetting`]s. Both small (1-byte tag) and large (3-byte tag)
//! descriptors are handled, as defined in ACPI 6.5 §6.4. Descriptors of
//! unknown type are skipped; a descriptor that is shorter than its type
//! requires, or that runs past the buffer, is an error.

use alloc::vec::Vec;

use log::trace;

use crate::AmlError;

/// A decoded resource descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSetting {
    /// IRQ descriptor (small type 0x04).
    Irq {
        /// Bit `n` set means IRQ `n` is usable.
        mask: u16,
        /// Edge-triggered (vs level-triggered).
        edge_triggered: bool,
        /// Active-low (vs active-high).
        active_low: bool,
        /// Shared with other devices.
        shared: bool,
    },
    /// DMA descriptor (small type 0x05).
    Dma {
        /// Bit `n` set means channel `n` is usable.
        mask: u8,
        /// The device is a bus master.
        bus_master: bool,
    },
    /// I/O port range (small type 0x08).
    Io {
        /// Decodes all 16 address bits (vs 10).
        decode16: bool,
        /// Lowest base address.
        min: u16,
        /// Highest base address.
        max: u16,
        /// Base alignment.
        alignment: u8,
        /// Number of ports.
        length: u8,
    },
    /// Fixed I/O port range (small type 0x09).
    FixedIo {
        /// Base address (10-bit decode).
        base: u16,
        /// Number of ports.
        length: u8,
    },
    /// 24-bit memory range (large type 0x01), addresses already scaled.
    Memory24 {
        /// The range is writable.
        writable: bool,
        /// Lowest base address.
        min: u32,
        /// Highest base address.
        max: u32,
        /// Base alignment (0 means 64 KiB).
        alignment: u32,
        /// Length in bytes.
        length: u32,
    },
    /// 32-bit memory range (large type 0x05).
    Memory32 {
        /// The range is writable.
        writable: bool,
        /// Lowest base address.
        min: u32,
        /// Highest base address.
        max: u32,
        /// Base alignment.
        alignment: u32,
        /// Length in bytes.
        length: u32,
    },
    /// 32-bit fixed memory range (large type 0x06).
    FixedMemory32 {
        /// The range is writable.
        writable: bool,
        /// Base address.
        base: u32,
        /// Length in bytes.
        length: u32,
    },
    /// Word, DWord or QWord address space (large types 0x08, 0x07, 0x0A).
    AddressSpace {
        /// 0 = memory, 1 = I/O, 2 = bus number, 192-255 = vendor defined.
        resource_type: u8,
        /// Address granularity.
        granularity: u64,
        /// Lowest base address.
        min: u64,
        /// Highest base address.
        max: u64,
        /// Offset from secondary to primary bus address.
        translation: u64,
        /// Length of the range.
        length: u64,
    },
    /// Extended interrupt descriptor (large type 0x09).
    ExtendedIrq {
        /// The device consumes (vs produces) the interrupts.
        consumer: bool,
        /// Edge-triggered (vs level-triggered).
        edge_triggered: bool,
        /// Active-low (vs active-high).
        active_low: bool,
        /// Shared with other devices.
        shared: bool,
        /// Global system interrupt numbers.
        interrupts: Vec<u32>,
    },
}

/// Little-endian reader over one descriptor body.
struct Fields<'a> {
    body: &'a [u8],
    pos: usize,
    /// Offset of the descriptor's tag, for errors.
    offset: usize,
}

impl<'a> Fields<'a> {
    fn new(body: &'a [u8], offset: usize) -> Self {
        Self {
            body,
            pos: 0,
            offset,
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], AmlError> {
        let bytes = self
            .body
            .get(self.pos..self.pos + N)
            .and_then(|b| <[u8; N]>::try_from(b).ok())
            .ok_or(AmlError::MalformedResource {
                offset: self.offset,
            })?;
        self.pos += N;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, AmlError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, AmlError> {
        self.take().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, AmlError> {
        self.take().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, AmlError> {
        self.take().map(u64::from_le_bytes)
    }

    /// Reads a 2-, 4- or 8-byte field zero-extended to 64 bits.
    fn uint(&mut self, width: AddressWidth) -> Result<u64, AmlError> {
        match width {
            AddressWidth::Word => self.u16().map(u64::from),
            AddressWidth::DWord => self.u32().map(u64::from),
            AddressWidth::QWord => self.u64(),
        }
    }

    fn remaining(&self) -> usize {
        self.body.len().saturating_sub(self.pos)
    }
}

#[derive(Clone, Copy)]
enum AddressWidth {
    Word,
    DWord,
    QWord,
}

/// Decodes a resource template buffer.
///
/// Decoding stops at the End Tag (0x79) or at the end of the buffer.
///
/// # Errors
///
/// Returns [`AmlError::MalformedResource`] with the offset of the offending
/// descriptor if it is truncated.
pub fn decode_resource_data(data: &[u8]) -> Result<Vec<ResourceSetting>, AmlError> {
    let mut settings = Vec::new();
    let mut pos = 0;

    while let Some(&tag) = data.get(pos) {
        let offset = pos;
        let malformed = AmlError::MalformedResource { offset };

        // End Tag; its checksum byte is optional.
        if tag & 0xF8 == 0x78 {
            break;
        }

        let (large, kind, header, length) = if tag & 0x80 == 0 {
            (false, (tag >> 3) & 0x0F, 1, usize::from(tag & 0x07))
        } else {
            let len = data.get(pos + 1..pos + 3).ok_or(malformed.clone())?;
            (true, tag & 0x7F, 3, usize::from(u16::from_le_bytes([len[0], len[1]])))
        };
        let start = pos + header;
        let body = data.get(start..start + length).ok_or(malformed)?;
        pos = start + length;

        let mut fields = Fields::new(body, offset);
        let setting = match (large, kind) {
            (false, 0x04) => Some(irq(&mut fields)?),
            (false, 0x05) => Some(ResourceSetting::Dma {
                mask: fields.u8()?,
                bus_master: fields.u8()? & 0x04 != 0,
            }),
            (false, 0x08) => Some(ResourceSetting::Io {
                decode16: fields.u8()? & 0x01 != 0,
                min: fields.u16()?,
                max: fields.u16()?,
                alignment: fields.u8()?,
                length: fields.u8()?,
            }),
            (false, 0x09) => Some(ResourceSetting::FixedIo {
                base: fields.u16()?,
                length: fields.u8()?,
            }),
            (true, 0x01) => Some(ResourceSetting::Memory24 {
                writable: fields.u8()? & 0x01 != 0,
                min: u32::from(fields.u16()?) << 8,
                max: u32::from(fields.u16()?) << 8,
                alignment: u32::from(fields.u16()?),
                length: u32::from(fields.u16()?) << 8,
            }),
            (true, 0x05) => Some(ResourceSetting::Memory32 {
                writable: fields.u8()? & 0x01 != 0,
                min: fields.u32()?,
                max: fields.u32()?,
                alignment: fields.u32()?,
                length: fields.u32()?,
            }),
            (true, 0x06) => Some(ResourceSetting::FixedMemory32 {
                writable: fields.u8()? & 0x01 != 0,
                base: fields.u32()?,
                length: fields.u32()?,
            }),
            (true, 0x07) => Some(address_space(&mut fields, AddressWidth::DWord)?),
            (true, 0x08) => Some(address_space(&mut fields, AddressWidth::Word)?),
            (true, 0x0A) => Some(address_space(&mut fields, AddressWidth::QWord)?),
            (true, 0x09) => Some(extended_irq(&mut fields)?),
            _ => {
                trace!("aml: skipping resource descriptor {tag:#x} at {offset}");
                None
            }
        };
        settings.extend(setting);
    }
    Ok(settings)
}

fn irq(fields: &mut Fields<'_>) -> Result<ResourceSetting, AmlError> {
    let mask = fields.u16()?;
    // Without a flags byte the IRQ is ISA-style: edge, active-high, exclusive.
    let flags = if fields.remaining() > 0 {
        fields.u8()?
    } else {
        0x01
    };
    Ok(ResourceSetting::Irq {
        mask,
        edge_triggered: flags & 0x01 != 0,
        active_low: flags & 0x08 != 0,
        shared: flags & 0x10 != 0,
    })
}

fn address_space(fields: &mut Fields<'_>, width: AddressWidth) -> Result<ResourceSetting, AmlError> {
    let resource_type = fields.u8()?;
    let _general_flags = fields.u8()?;
    let _type_flags = fields.u8()?;
    Ok(ResourceSetting::AddressSpace {
        resource_type,
        granularity: fields.uint(width)?,
        min: fields.uint(width)?,
        max: fields.uint(width)?,
        translation: fields.uint(width)?,
        length: fields.uint(width)?,
    })
}

fn extended_irq(fields: &mut Fields<'_>) -> Result<ResourceSetting, AmlError> {
    let flags = fields.u8()?;
    let count = fields.u8()?;
    let interrupts = (0..count)
        .map(|_| fields.u32())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ResourceSetting::ExtendedIrq {
        consumer: flags & 0x01 != 0,
        edge_triggered: flags & 0x02 != 0,
        active_low: flags & 0x04 != 0,
        shared: flags & 0x08 != 0,
        interrupts,
    })
}
