//! AML data values, term arguments and identifier decoding.

use alloc::string::String;
use alloc::vec::Vec;

use crate::AmlError;
use crate::path::NameString;

/// A compressed EISA/PnP device identifier.
///
/// EISA IDs are stored as 32-bit compressed values in AML bytecode
/// (via the `EisaId()` macro in ASL). The 3-letter manufacturer code
/// is packed into the upper 16 bits and the product ID into the lower 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EisaId {
    /// The raw 32-bit EISA ID value (byte-swapped from AML encoding).
    pub raw: u32,
}

impl EisaId {
    /// Decodes the EISA ID into a 7-character ASCII string (e.g., `"PNP0A03"`).
    #[must_use]
    pub fn decode(&self) -> [u8; 7] {
        // After byte-swapping to native order:
        //   Bits 30-26: first char - 'A' + 1
        //   Bits 25-21: second char - 'A' + 1
        //   Bits 20-16: third char - 'A' + 1
        //   Bits 15-0:  product ID as 4 hex digits
        let swapped = self.raw.swap_bytes();
        let letter = |shift: u32| (((swapped >> shift) & 0x1F) as u8) + b'@';
        let hex_digit = |shift: u32| {
            let nibble = ((swapped >> shift) & 0xF) as u8;
            if nibble < 10 {
                b'0' + nibble
            } else {
                b'A' + nibble - 10
            }
        };

        [
            letter(26),
            letter(21),
            letter(16),
            hex_digit(12),
            hex_digit(8),
            hex_digit(4),
            hex_digit(0),
        ]
    }
}

/// A concrete AML value produced by evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmlValue {
    /// A 64-bit integer.
    Integer(u64),
    /// An ASCII string.
    String(String),
    /// A byte buffer.
    Buffer(Vec<u8>),
    /// A reference to a named object.
    Reference(NameString),
}

impl AmlValue {
    /// Short type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "Integer",
            Self::String(_) => "String",
            Self::Buffer(_) => "Buffer",
            Self::Reference(_) => "Reference",
        }
    }

    /// Returns the integer payload, if this is an integer.
    #[must_use]
    pub fn as_integer(&self) -> Option<u64> {
        match *self {
            Self::Integer(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the integer payload or a type mismatch error.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::TypeMismatch`] for any non-integer value.
    pub fn expect_integer(&self) -> Result<u64, AmlError> {
        self.as_integer().ok_or(AmlError::TypeMismatch {
            expected: "Integer",
            found: self.type_name(),
        })
    }

    /// Returns the buffer payload or a type mismatch error.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::TypeMismatch`] for any non-buffer value.
    pub fn into_buffer(self) -> Result<Vec<u8>, AmlError> {
        match self {
            Self::Buffer(bytes) => Ok(bytes),
            other => Err(AmlError::TypeMismatch {
                expected: "Buffer",
                found: other.type_name(),
            }),
        }
    }
}

/// A lazily-evaluated AML expression operand.
///
/// The variants the bytecode parser emits are opaque to this crate; only an
/// [`ExecutionContext`](crate::context::ExecutionContext) turns a `TermArg`
/// into an [`AmlValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermArg {
    /// An already-concrete data object (`ByteConst`, `Buffer`, ...).
    Value(AmlValue),
    /// A reference to a named object, read when evaluated.
    Name(NameString),
    /// A method local (`Local0`-`Local7`).
    Local(u8),
    /// A method argument (`Arg0`-`Arg6`).
    Arg(u8),
    /// An unparsed expression (opcode and operands) for the interpreter.
    Expression(Vec<u8>),
}

impl TermArg {
    /// Shorthand for an integer constant operand.
    #[must_use]
    pub const fn integer(value: u64) -> Self {
        Self::Value(AmlValue::Integer(value))
    }
}

impl From<AmlValue> for TermArg {
    fn from(value: AmlValue) -> Self {
        Self::Value(value)
    }
}

/// The parsed statements of a method body, executed in order by an
/// [`ExecutionContext`](crate::context::ExecutionContext).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermList(pub Vec<TermArg>);

/// Decodes a `_HID`/`_CID` value into its identifier string.
///
/// Strings are returned as-is; integers are treated as compressed EISA IDs.
/// Other values have no identifier form.
#[must_use]
pub fn decode_hid(value: &AmlValue) -> Option<String> {
    match value {
        AmlValue::String(s) => Some(s.clone()),
        AmlValue::Integer(v) => {
            let raw = u32::try_from(*v).ok()?;
            let id = EisaId { raw }.decode();
            Some(id.iter().map(|&b| char::from(b)).collect())
        }
        AmlValue::Buffer(_) | AmlValue::Reference(_) => None,
    }
}
