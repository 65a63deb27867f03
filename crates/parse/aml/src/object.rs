//! Named object variants and their payloads.
//!
//! Every object the bytecode declares is one [`NamedObject`] variant, stored
//! in a [`Namespace`](crate::namespace::Namespace) node. Variants only own
//! the data relevant to them; reading and writing them as values is
//! dispatched by the namespace.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;
use core::mem;

use log::{debug, warn};

use crate::AmlError;
use crate::access;
use crate::context::{ExecutionContext, TermListParser, with_scope};
use crate::flags::{MethodFlags, MutexFlags, UpdateRule};
use crate::namespace::FieldListHandle;
use crate::path::AmlPath;
use crate::region::RegionSpaceKind;
use crate::value::{AmlValue, TermArg, TermList};

/// ACPI object type codes used by `External` declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    /// Type not known at compile time.
    Uninitialized = 0,
    /// Integer.
    Integer = 1,
    /// String.
    String = 2,
    /// Buffer.
    Buffer = 3,
    /// Package.
    Package = 4,
    /// Field unit.
    FieldUnit = 5,
    /// Device.
    Device = 6,
    /// Event.
    Event = 7,
    /// Control method.
    Method = 8,
    /// Mutex.
    Mutex = 9,
    /// Operation region.
    OperationRegion = 10,
    /// Power resource.
    PowerResource = 11,
    /// Processor.
    Processor = 12,
    /// Thermal zone.
    ThermalZone = 13,
    /// Buffer field.
    BufferField = 14,
    /// DDB handle.
    DdbHandle = 15,
    /// Debug object.
    DebugObject = 16,
}

impl ObjectType {
    /// Decodes an object type byte.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidObjectType`] for values above 16.
    pub fn from_byte(byte: u8) -> Result<Self, AmlError> {
        Ok(match byte {
            0 => Self::Uninitialized,
            1 => Self::Integer,
            2 => Self::String,
            3 => Self::Buffer,
            4 => Self::Package,
            5 => Self::FieldUnit,
            6 => Self::Device,
            7 => Self::Event,
            8 => Self::Method,
            9 => Self::Mutex,
            10 => Self::OperationRegion,
            11 => Self::PowerResource,
            12 => Self::Processor,
            13 => Self::ThermalZone,
            14 => Self::BufferField,
            15 => Self::DdbHandle,
            16 => Self::DebugObject,
            other => return Err(AmlError::InvalidObjectType(other)),
        })
    }
}

/// An `External` declaration: a name defined in another table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct External {
    object_type: ObjectType,
    arg_count: u8,
}

impl External {
    /// Creates an external declaration from its encoded type and argument
    /// count.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidObjectType`] or
    /// [`AmlError::InvalidArgCount`] (more than 7 arguments).
    pub fn new(object_type: u8, arg_count: u8) -> Result<Self, AmlError> {
        let object_type = ObjectType::from_byte(object_type)?;
        if arg_count > 7 {
            return Err(AmlError::InvalidArgCount(arg_count));
        }
        Ok(Self {
            object_type,
            arg_count,
        })
    }

    /// The declared object type.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// The declared argument count (methods only).
    #[must_use]
    pub fn arg_count(&self) -> u8 {
        self.arg_count
    }
}

/// An `OperationRegion` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRegion {
    /// The address space.
    pub space: RegionSpaceKind,
    /// Region offset, evaluated on first field access.
    pub offset: TermArg,
    /// Region length in bytes, evaluated on first field access.
    pub length: TermArg,
}

/// A `DataTableRegion` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRegion {
    /// Table signature.
    pub signature: TermArg,
    /// OEM ID.
    pub oem_id: TermArg,
    /// OEM table ID.
    pub oem_table_id: TermArg,
}

/// A `Processor` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processor {
    /// Processor ID.
    pub id: u8,
    /// Address of the processor block.
    pub pblk_address: u32,
    /// Length of the processor block.
    pub pblk_length: u8,
}

/// One named entry of a Field, IndexField or BankField declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldUnit {
    /// The declaration this unit belongs to.
    pub list: FieldListHandle,
    /// Offset of the unit from the start of the declaration, in bits.
    pub bit_offset: u64,
    /// Width of the unit in bits.
    pub bit_width: u64,
}

/// A range of bits inside a buffer, created by one of the `CreateXField`
/// operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferField {
    /// Operand producing the source buffer.
    pub source: TermArg,
    /// First bit of the field.
    pub bit_index: u64,
    /// Width of the field in bits.
    pub bit_width: u64,
}

impl BufferField {
    /// Reads the field from a freshly evaluated source buffer.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::TypeMismatch`] if the source is not a buffer, and
    /// range errors if the field does not fit in it.
    pub fn read<C>(&self, ctx: &mut C) -> Result<AmlValue, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let mut bytes = ctx.evaluate(&self.source)?.into_buffer()?;
        access::read_value(bytes.as_mut_slice(), self.bit_index, self.bit_width)
    }

    /// Merges `value` into the source buffer and stores the buffer back.
    ///
    /// # Errors
    ///
    /// As for [`read`](Self::read), plus any failure to store the source.
    pub fn write<C>(&self, value: &AmlValue, ctx: &mut C) -> Result<(), AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let mut bytes = ctx.evaluate(&self.source)?.into_buffer()?;
        access::write_value(
            bytes.as_mut_slice(),
            self.bit_index,
            self.bit_width,
            value,
            UpdateRule::Preserve,
        )?;
        ctx.store(&self.source, AmlValue::Buffer(bytes))
    }
}

enum MethodBody {
    Unparsed(Box<dyn TermListParser>),
    Parsed(Rc<TermList>),
    Invalid,
}

/// A control method.
///
/// The body is parsed the first time the method is invoked and the term list
/// is kept for every later invocation.
pub struct Method {
    flags: MethodFlags,
    body: RefCell<MethodBody>,
}

impl Method {
    /// Creates a method whose body will be produced by `parser`.
    #[must_use]
    pub fn new(flags: MethodFlags, parser: Box<dyn TermListParser>) -> Self {
        Self {
            flags,
            body: RefCell::new(MethodBody::Unparsed(parser)),
        }
    }

    /// Creates a method from an already parsed body.
    #[must_use]
    pub fn with_body(flags: MethodFlags, terms: TermList) -> Self {
        Self {
            flags,
            body: RefCell::new(MethodBody::Parsed(Rc::new(terms))),
        }
    }

    /// The decoded method flags.
    #[must_use]
    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    /// Returns `true` once the body has been parsed.
    #[must_use]
    pub fn is_parsed(&self) -> bool {
        matches!(self.body.try_borrow().as_deref(), Ok(MethodBody::Parsed(_)))
    }

    /// Returns the method's term list, parsing it on first use.
    ///
    /// # Errors
    ///
    /// Returns the parser's error on the failing call and
    /// [`AmlError::InvalidMethodBody`] on every call after it.
    pub fn term_list(&self, path: AmlPath) -> Result<Rc<TermList>, AmlError> {
        let mut body = self.body.try_borrow_mut().map_err(|_| AmlError::Busy(path))?;
        match mem::replace(&mut *body, MethodBody::Invalid) {
            MethodBody::Parsed(terms) => {
                *body = MethodBody::Parsed(Rc::clone(&terms));
                Ok(terms)
            }
            MethodBody::Invalid => Err(AmlError::InvalidMethodBody(path)),
            MethodBody::Unparsed(mut parser) => match parser.parse_term_list() {
                Ok(terms) => {
                    debug!("aml: parsed {path} ({} terms)", terms.0.len());
                    let terms = Rc::new(terms);
                    *body = MethodBody::Parsed(Rc::clone(&terms));
                    Ok(terms)
                }
                Err(err) => {
                    warn!("aml: failed to parse {path}: {err}");
                    Err(err)
                }
            },
        }
    }

    /// Runs the method with `path` as the current scope and returns its
    /// result.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NoReturnValue`] if the body finishes without a
    /// `Return`, and propagates parse and execution failures.
    pub fn invoke<C>(&self, path: AmlPath, ctx: &mut C) -> Result<AmlValue, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let terms = self.term_list(path)?;
        with_scope(ctx, path, |ctx| {
            let _ = ctx.take_return_value();
            ctx.execute(&terms)?;
            ctx.take_return_value().ok_or(AmlError::NoReturnValue(path))
        })
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("flags", &self.flags)
            .field("parsed", &self.is_parsed())
            .finish_non_exhaustive()
    }
}

/// An object declared in the ACPI namespace.
#[derive(Debug)]
pub enum NamedObject {
    /// A scope with no object of its own (`\`, `\_SB_`, `Scope()`).
    Scope,
    /// A `Name` holding a data value.
    Name(RefCell<AmlValue>),
    /// A `DataTableRegion`.
    DataRegion(DataRegion),
    /// A `Device`.
    Device,
    /// An `External` declaration.
    External(External),
    /// A unit of an `IndexField`.
    IndexField(FieldUnit),
    /// A control method.
    Method(Method),
    /// A `Mutex`.
    Mutex(MutexFlags),
    /// A unit of a `BankField`.
    BankField(FieldUnit),
    /// `CreateBitField`: one bit.
    CreateBitField(BufferField),
    /// `CreateByteField`: 8 bits.
    CreateByteField(BufferField),
    /// `CreateWordField`: 16 bits.
    CreateWordField(BufferField),
    /// `CreateDWordField`: 32 bits.
    CreateDWordField(BufferField),
    /// `CreateQWordField`: 64 bits.
    CreateQWordField(BufferField),
    /// `CreateField`: an explicit bit count.
    CreateField(BufferField),
    /// A unit of a `Field`.
    Field(FieldUnit),
    /// An `OperationRegion`.
    OpRegion(OpRegion),
    /// A `Processor`.
    Processor(Processor),
}

impl NamedObject {
    /// A `Name` object holding `value`.
    #[must_use]
    pub fn name(value: AmlValue) -> Self {
        Self::Name(RefCell::new(value))
    }

    /// `CreateBitField(source, bit_index, ...)`.
    #[must_use]
    pub fn create_bit_field(source: TermArg, bit_index: u64) -> Self {
        Self::CreateBitField(BufferField {
            source,
            bit_index,
            bit_width: 1,
        })
    }

    /// `CreateByteField(source, byte_index, ...)`.
    #[must_use]
    pub fn create_byte_field(source: TermArg, byte_index: u64) -> Self {
        Self::CreateByteField(Self::bytes_at(source, byte_index, 8))
    }

    /// `CreateWordField(source, byte_index, ...)`.
    #[must_use]
    pub fn create_word_field(source: TermArg, byte_index: u64) -> Self {
        Self::CreateWordField(Self::bytes_at(source, byte_index, 16))
    }

    /// `CreateDWordField(source, byte_index, ...)`.
    #[must_use]
    pub fn create_dword_field(source: TermArg, byte_index: u64) -> Self {
        Self::CreateDWordField(Self::bytes_at(source, byte_index, 32))
    }

    /// `CreateQWordField(source, byte_index, ...)`.
    #[must_use]
    pub fn create_qword_field(source: TermArg, byte_index: u64) -> Self {
        Self::CreateQWordField(Self::bytes_at(source, byte_index, 64))
    }

    /// `CreateField(source, bit_index, num_bits, ...)`.
    #[must_use]
    pub fn create_field(source: TermArg, bit_index: u64, num_bits: u64) -> Self {
        Self::CreateField(BufferField {
            source,
            bit_index,
            bit_width: num_bits,
        })
    }

    fn bytes_at(source: TermArg, byte_index: u64, bit_width: u64) -> BufferField {
        BufferField {
            source,
            bit_index: byte_index.saturating_mul(8),
            bit_width,
        }
    }

    /// The buffer field payload of any `CreateXField` variant.
    #[must_use]
    pub fn buffer_field(&self) -> Option<&BufferField> {
        match self {
            Self::CreateBitField(f)
            | Self::CreateByteField(f)
            | Self::CreateWordField(f)
            | Self::CreateDWordField(f)
            | Self::CreateQWordField(f)
            | Self::CreateField(f) => Some(f),
            _ => None,
        }
    }

    /// The field unit payload of a Field, IndexField or BankField unit.
    #[must_use]
    pub fn field_unit(&self) -> Option<&FieldUnit> {
        match self {
            Self::Field(u) | Self::IndexField(u) | Self::BankField(u) => Some(u),
            _ => None,
        }
    }

    /// Short kind name used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scope => "Scope",
            Self::Name(_) => "Name",
            Self::DataRegion(_) => "DataRegion",
            Self::Device => "Device",
            Self::External(_) => "External",
            Self::IndexField(_) => "IndexField",
            Self::Method(_) => "Method",
            Self::Mutex(_) => "Mutex",
            Self::BankField(_) => "BankField",
            Self::CreateBitField(_) => "CreateBitField",
            Self::CreateByteField(_) => "CreateByteField",
            Self::CreateWordField(_) => "CreateWordField",
            Self::CreateDWordField(_) => "CreateDWordField",
            Self::CreateQWordField(_) => "CreateQWordField",
            Self::CreateField(_) => "CreateField",
            Self::Field(_) => "Field",
            Self::OpRegion(_) => "OpRegion",
            Self::Processor(_) => "Processor",
        }
    }

    /// Returns `true` for objects that can hold children of their own.
    #[must_use]
    pub fn is_scope_like(&self) -> bool {
        matches!(self, Self::Scope | Self::Device | Self::Processor(_))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec;

    use super::*;
    use crate::testing::{CountingParser, MockContext};

    fn method_path() -> AmlPath {
        AmlPath::parse("\\_SB_.DEV0._STA").unwrap()
    }

    #[test]
    fn external_arg_count_is_bounded() {
        let ext = External::new(8, 7).unwrap();
        assert_eq!(ext.object_type(), ObjectType::Method);
        assert_eq!(ext.arg_count(), 7);
        assert_eq!(External::new(8, 8), Err(AmlError::InvalidArgCount(8)));
        assert_eq!(External::new(17, 0), Err(AmlError::InvalidObjectType(17)));
    }

    #[test]
    fn method_body_is_parsed_once() {
        let (parser, parses) = CountingParser::returning(vec![TermArg::integer(0x0F)]);
        let method = Method::new(MethodFlags::from_byte(0), Box::new(parser));
        let mut ctx = MockContext::detached();

        assert!(!method.is_parsed());
        assert_eq!(method.invoke(method_path(), &mut ctx), Ok(AmlValue::Integer(0x0F)));
        assert_eq!(method.invoke(method_path(), &mut ctx), Ok(AmlValue::Integer(0x0F)));
        assert!(method.is_parsed());
        assert_eq!(parses.get(), 1);
    }

    #[test]
    fn failed_parse_is_not_retried() {
        let (parser, parses) = CountingParser::failing();
        let method = Method::new(MethodFlags::from_byte(0), Box::new(parser));
        let mut ctx = MockContext::detached();

        assert!(matches!(
            method.invoke(method_path(), &mut ctx),
            Err(AmlError::Evaluation(_))
        ));
        assert_eq!(
            method.invoke(method_path(), &mut ctx),
            Err(AmlError::InvalidMethodBody(method_path()))
        );
        assert_eq!(parses.get(), 1);
    }

    #[test]
    fn invocation_runs_in_the_method_scope() {
        let method = Method::with_body(MethodFlags::from_byte(0), TermList::default());
        let mut ctx = MockContext::detached();
        let outer = ctx.scope();

        assert_eq!(
            method.invoke(method_path(), &mut ctx),
            Err(AmlError::NoReturnValue(method_path()))
        );
        assert_eq!(ctx.scopes_seen, vec![method_path()]);
        assert_eq!(ctx.scope(), outer);
    }

    #[test]
    fn stale_return_values_are_discarded() {
        let method = Method::with_body(MethodFlags::from_byte(0), TermList::default());
        let mut ctx = MockContext::detached();
        ctx.return_value = Some(AmlValue::Integer(1));
        assert!(matches!(
            method.invoke(method_path(), &mut ctx),
            Err(AmlError::NoReturnValue(_))
        ));
    }

    #[test]
    fn buffer_field_reads_the_evaluated_source() {
        let source = TermArg::Value(AmlValue::Buffer(vec![0x34, 0x12, 0xF0]));
        let mut ctx = MockContext::detached();

        let word = NamedObject::create_word_field(source.clone(), 0);
        let bit = NamedObject::create_bit_field(source.clone(), 20);
        let wide = NamedObject::create_field(source, 4, 20);

        let read = |obj: &NamedObject, ctx: &mut MockContext<'_>| {
            obj.buffer_field().unwrap().read(ctx).unwrap()
        };
        assert_eq!(read(&word, &mut ctx), AmlValue::Integer(0x1234));
        assert_eq!(read(&bit, &mut ctx), AmlValue::Integer(1));
        assert_eq!(read(&wide, &mut ctx), AmlValue::Integer(0xF_0123));
    }

    #[test]
    fn buffer_field_writes_store_the_merged_buffer() {
        let target = TermArg::Local(0);
        let mut ctx = MockContext::detached();
        ctx.locals[0] = Some(AmlValue::Buffer(vec![0xFF, 0xFF]));

        let field = NamedObject::create_field(target, 4, 8);
        field
            .buffer_field()
            .unwrap()
            .write(&AmlValue::Integer(0x00), &mut ctx)
            .unwrap();
        assert_eq!(ctx.locals[0], Some(AmlValue::Buffer(vec![0x0F, 0xF0])));
    }

    #[test]
    fn buffer_field_source_must_be_a_buffer() {
        let mut ctx = MockContext::detached();
        let field = NamedObject::create_byte_field(TermArg::integer(5), 0);
        assert_eq!(
            field.buffer_field().unwrap().read(&mut ctx),
            Err(AmlError::TypeMismatch {
                expected: "Buffer",
                found: "Integer"
            })
        );
    }

    #[test]
    fn method_debug_does_not_parse() {
        let (parser, parses) = CountingParser::returning(vec![]);
        let method = Method::new(MethodFlags::from_byte(0x0B), Box::new(parser));
        let text = std::format!("{method:?}");
        assert!(text.contains("parsed: false"));
        assert_eq!(parses.get(), 0);
    }
}
