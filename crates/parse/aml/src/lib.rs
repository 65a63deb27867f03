//! `hadron-aml` --- the object and field-access layer of an AML interpreter.
//!
//! This crate holds the ACPI namespace once the bytecode parser has produced
//! it, and performs the hardware-facing half of evaluation: reading and
//! writing bit-granular fields inside operation regions, buffer fields
//! carved out of evaluated buffers, and the device queries (`_STA`, `_CRS`,
//! `_HID`, `_CID`, `_ADR`) that drive enumeration.
//!
//! Expression evaluation and method execution belong to the interpreter,
//! reached through the [`context::ExecutionContext`] trait; method bodies are
//! parsed on demand through [`context::TermListParser`].
//!
//! # Usage
//!
//! ```ignore
//! let mut ns = Namespace::new();
//! let sb = ns.add_scope(Namespace::ROOT, NameSeg::new("_SB")?)?;
//! let dev = ns.add(sb, NameSeg::new("EC0")?, NamedObject::Device)?;
//! // ...
//! let status = ns.device(dev).unwrap().status(&mut ctx)?;
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod access;
pub mod context;
pub mod device;
pub mod flags;
pub mod namespace;
pub mod object;
pub mod path;
pub mod region;
pub mod resource;
pub mod value;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use context::{ExecutionContext, TermListParser};
pub use device::{Device, DeviceStatus};
pub use flags::{AccessType, FieldFlags, LockRule, MethodFlags, MutexFlags, UpdateRule};
pub use namespace::{FieldListHandle, Namespace, NodeHandle};
pub use object::NamedObject;
pub use path::{AmlPath, NameSeg, NameString};
pub use region::{FieldReference, RegionSpace, RegionSpaceKind};
pub use resource::{ResourceSetting, decode_resource_data};
pub use value::{AmlValue, TermArg, TermList};

/// Errors raised while building the namespace or accessing its objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmlError {
    // --- Malformed encodings: the table is corrupt or non-conformant. ---
    /// A `FieldFlags` access type nibble above 5.
    #[error("invalid field access type {0:#x}")]
    InvalidAccessType(u8),
    /// A `FieldFlags` update rule of 3.
    #[error("invalid field update rule {0:#x}")]
    InvalidUpdateRule(u8),
    /// An operation region space byte in the reserved range.
    #[error("invalid region space {0:#x}")]
    InvalidRegionSpace(u8),
    /// An `External` object type above 16.
    #[error("invalid object type {0:#x}")]
    InvalidObjectType(u8),
    /// An `External` argument count above 7.
    #[error("argument count must be 0-7, not {0}")]
    InvalidArgCount(u8),
    /// A mutex `SyncFlags` byte with reserved bits set.
    #[error("invalid mutex flags {0:#x}")]
    InvalidMutexFlags(u8),
    /// A name segment or name string that is not valid AML.
    #[error("invalid AML name")]
    InvalidName,
    /// A resource descriptor runs past the end of its buffer.
    #[error("malformed resource descriptor at byte {offset}")]
    MalformedResource {
        /// Offset of the descriptor's tag byte.
        offset: usize,
    },

    // --- Unsupported features. ---
    /// No region space implementation exists for this kind.
    #[error("{kind} region space is not implemented (field {field})")]
    UnsupportedRegionSpace {
        /// The region kind.
        kind: RegionSpaceKind,
        /// The field that tried to use it.
        field: AmlPath,
    },
    /// The region kind does not support the field's access width.
    #[error("{kind} region space does not support {access:?} access (field {field})")]
    UnsupportedAccessType {
        /// The region kind.
        kind: RegionSpaceKind,
        /// The declared access type.
        access: AccessType,
        /// The field that declared it.
        field: AmlPath,
    },

    // --- Range violations: rejected before any storage is touched. ---
    /// A read or write of zero bits.
    #[error("zero-width field access")]
    ZeroWidthAccess,
    /// A bit range that does not lie within its region or buffer.
    #[error("access of {width} bits at bit {bit_offset} exceeds {total_bits} bits")]
    AccessOutOfBounds {
        /// First bit of the access.
        bit_offset: u64,
        /// Width of the access in bits.
        width: u64,
        /// Size of the region or buffer in bits.
        total_bits: u64,
    },
    /// An integer access wider than 64 bits.
    #[error("integer access of {0} bits exceeds 64 bits")]
    AccessTooWide(u32),
    /// A value that does not fit in the field it is written to.
    #[error("value {value:#x} can't fit in {width} bits (max = {max:#x})")]
    ValueTooWide {
        /// The offending value.
        value: u64,
        /// The field width in bits.
        width: u32,
        /// The largest value the field can hold.
        max: u64,
    },
    /// An operation region whose evaluated length is zero.
    #[error("operation region length must be non-zero")]
    EmptyRegion,
    /// An operation region too large to back in memory.
    #[error("operation region of {0} bytes can't be allocated")]
    RegionTooLarge(u64),

    // --- Type mismatches. ---
    /// A value of the wrong kind.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// The kind that was required.
        expected: &'static str,
        /// The kind that was produced.
        found: &'static str,
    },
    /// A named object that has no value to read.
    #[error("{path} ({kind}) can't be read as a value")]
    NotReadable {
        /// The object's path.
        path: AmlPath,
        /// The object's kind.
        kind: &'static str,
    },
    /// A named object that can't be stored to.
    #[error("{path} ({kind}) can't be written")]
    NotWritable {
        /// The object's path.
        path: AmlPath,
        /// The object's kind.
        kind: &'static str,
    },

    // --- Namespace and evaluation. ---
    /// A second object with an existing path.
    #[error("{0} is already defined")]
    AlreadyDefined(AmlPath),
    /// A name that resolves to nothing.
    #[error("{0} is not defined")]
    UndefinedName(NameString),
    /// A path deeper than [`AmlPath`] can hold.
    #[error("namespace path too deep")]
    PathOverflow,
    /// A method finished without a return value.
    #[error("method {0} returned no value")]
    NoReturnValue(AmlPath),
    /// A method whose body failed to parse on an earlier evaluation.
    #[error("method {0} has an unparseable body")]
    InvalidMethodBody(AmlPath),
    /// An object re-entered while it is already being accessed.
    #[error("{0} is already being accessed")]
    Busy(AmlPath),
    /// A failure reported by the interpreter or parser.
    #[error("evaluation failed: {0}")]
    Evaluation(&'static str),
}
