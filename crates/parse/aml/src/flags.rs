//! Decoders for the flag bytes attached to field, method and mutex
//! declarations.
//!
//! Every decoder is strict: an encoding that names no known variant is a
//! [`AmlError`] at declaration time, never a guessed default.

use crate::AmlError;

/// Access width declared for a field (`FieldFlags` bits 0-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Any width the region allows; accessed as bytes.
    Any,
    /// 8-bit accesses.
    Byte,
    /// 16-bit accesses.
    Word,
    /// 32-bit accesses.
    DWord,
    /// 64-bit accesses.
    QWord,
    /// Buffer accesses (SMBus, IPMI, GSB protocols).
    Buffer,
}

impl AccessType {
    /// Decodes an access type from the low nibble of `byte`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidAccessType`] for nibbles above 5.
    pub fn from_byte(byte: u8) -> Result<Self, AmlError> {
        match byte & 0x0F {
            0 => Ok(Self::Any),
            1 => Ok(Self::Byte),
            2 => Ok(Self::Word),
            3 => Ok(Self::DWord),
            4 => Ok(Self::QWord),
            5 => Ok(Self::Buffer),
            other => Err(AmlError::InvalidAccessType(other)),
        }
    }

    /// Width in bits of one access, or `None` for buffer access.
    #[must_use]
    pub fn bits(self) -> Option<u32> {
        match self {
            Self::Any | Self::Byte => Some(8),
            Self::Word => Some(16),
            Self::DWord => Some(32),
            Self::QWord => Some(64),
            Self::Buffer => None,
        }
    }
}

/// Whether the global lock must be held around accesses (`FieldFlags` bit 4).
///
/// This crate never takes the lock itself; callers that share regions
/// across contexts acquire it before calling in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRule {
    /// No lock required.
    NoLock,
    /// The global lock must be held.
    Lock,
}

/// What happens to element bits outside a partial write (`FieldFlags`
/// bits 5-6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRule {
    /// Bits outside the write keep their current value.
    Preserve,
    /// Bits outside the write are set.
    WriteAsOnes,
    /// Bits outside the write are cleared.
    WriteAsZeros,
}

impl UpdateRule {
    /// Decodes an update rule from bits 5-6 of `byte`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidUpdateRule`] for the reserved value 3.
    pub fn from_byte(byte: u8) -> Result<Self, AmlError> {
        match (byte >> 5) & 0x03 {
            0 => Ok(Self::Preserve),
            1 => Ok(Self::WriteAsOnes),
            2 => Ok(Self::WriteAsZeros),
            other => Err(AmlError::InvalidUpdateRule(other)),
        }
    }
}

/// Decoded `FieldFlags` byte shared by Field, IndexField and BankField.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFlags {
    /// Access width.
    pub access_type: AccessType,
    /// Global lock requirement.
    pub lock_rule: LockRule,
    /// Partial-write policy.
    pub update_rule: UpdateRule,
}

impl FieldFlags {
    /// Decodes a `FieldFlags` byte.
    ///
    /// Bit 7 is reserved and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidAccessType`] or
    /// [`AmlError::InvalidUpdateRule`] for unknown encodings.
    pub fn from_byte(byte: u8) -> Result<Self, AmlError> {
        let access_type = AccessType::from_byte(byte)?;
        let update_rule = UpdateRule::from_byte(byte)?;
        let lock_rule = if byte & 0x10 == 0 {
            LockRule::NoLock
        } else {
            LockRule::Lock
        };
        Ok(Self {
            access_type,
            lock_rule,
            update_rule,
        })
    }
}

/// Decoded `MethodFlags` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodFlags {
    /// Number of arguments (0-7).
    pub arg_count: u8,
    /// Whether invocations are serialized.
    pub serialized: bool,
    /// Sync level used for serialization (0-15).
    pub sync_level: u8,
}

impl MethodFlags {
    /// Decodes a `MethodFlags` byte. Every byte is a valid encoding.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self {
            arg_count: byte & 0x07,
            serialized: byte & 0x08 != 0,
            sync_level: byte >> 4,
        }
    }
}

/// Decoded `SyncFlags` byte of a mutex declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexFlags {
    /// Sync level (0-15).
    pub sync_level: u8,
}

impl MutexFlags {
    /// Decodes a mutex `SyncFlags` byte.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidMutexFlags`] if any reserved bit (4-7) is
    /// set.
    pub fn from_byte(byte: u8) -> Result<Self, AmlError> {
        if byte & 0xF0 != 0 {
            return Err(AmlError::InvalidMutexFlags(byte));
        }
        Ok(Self { sync_level: byte })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_byte_is_any_nolock_preserve() {
        let flags = FieldFlags::from_byte(0x00).unwrap();
        assert_eq!(flags.access_type, AccessType::Any);
        assert_eq!(flags.lock_rule, LockRule::NoLock);
        assert_eq!(flags.update_rule, UpdateRule::Preserve);
    }

    #[test]
    fn dword_lock_preserve() {
        // 0b0001_0011: access 3, lock bit set, update rule 0.
        let flags = FieldFlags::from_byte(0x13).unwrap();
        assert_eq!(flags.access_type, AccessType::DWord);
        assert_eq!(flags.lock_rule, LockRule::Lock);
        assert_eq!(flags.update_rule, UpdateRule::Preserve);
    }

    #[test]
    fn update_rules_decode_from_bits_5_and_6() {
        assert_eq!(
            FieldFlags::from_byte(0x21).unwrap().update_rule,
            UpdateRule::WriteAsOnes
        );
        assert_eq!(
            FieldFlags::from_byte(0x41).unwrap().update_rule,
            UpdateRule::WriteAsZeros
        );
        // Reserved bit 7 does not disturb decoding.
        assert_eq!(
            FieldFlags::from_byte(0x82).unwrap().access_type,
            AccessType::Word
        );
    }

    #[test]
    fn unknown_encodings_are_errors() {
        assert_eq!(
            FieldFlags::from_byte(0x06),
            Err(AmlError::InvalidAccessType(6))
        );
        assert_eq!(
            FieldFlags::from_byte(0x61),
            Err(AmlError::InvalidUpdateRule(3))
        );
    }

    #[test]
    fn access_widths() {
        assert_eq!(AccessType::Any.bits(), Some(8));
        assert_eq!(AccessType::QWord.bits(), Some(64));
        assert_eq!(AccessType::Buffer.bits(), None);
    }

    #[test]
    fn method_flags_fields() {
        let flags = MethodFlags::from_byte(0x2B);
        assert_eq!(flags.arg_count, 3);
        assert!(flags.serialized);
        assert_eq!(flags.sync_level, 2);
    }

    #[test]
    fn mutex_reserved_bits_rejected() {
        assert_eq!(MutexFlags::from_byte(0x0F).unwrap().sync_level, 15);
        assert_eq!(
            MutexFlags::from_byte(0x10),
            Err(AmlError::InvalidMutexFlags(0x10))
        );
    }
}
