//! The ACPI namespace: an arena of named objects indexed by handle.
//!
//! Nodes never move or disappear once added, so a [`NodeHandle`] stays valid
//! for the life of the [`Namespace`]. Each node maps short names to child
//! handles; parents are referenced by handle, never owned.
//!
//! Field declarations are stored once in a side table and shared by the
//! field units they declare. [`Namespace::read_value`] and
//! [`Namespace::update_value`] dispatch on the object variant.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::marker::PhantomData;

use log::trace;

use crate::AmlError;
use crate::access::{self, AccessWidth, ElementStore};
use crate::context::{ExecutionContext, evaluate_integer};
use crate::device::Device;
use crate::flags::{AccessType, FieldFlags};
use crate::object::{FieldUnit, NamedObject, OpRegion};
use crate::path::{AmlPath, NameSeg, NameString};
use crate::region::{FieldReference, RegionSpace, RegionSpaceKind};
use crate::value::{AmlValue, TermArg};

/// Handle to a namespace node.
///
/// Only valid for the namespace that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(usize);

/// Handle to a field declaration shared by its field units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldListHandle(usize);

/// What a field declaration is carved out of, as named in the bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// `Field (RegionName, ...)`.
    Region(NameString),
    /// `BankField (RegionName, BankName, BankValue, ...)`.
    Bank {
        /// The operation region holding the units.
        region: NameString,
        /// The field unit selecting the bank.
        bank: NameString,
        /// Value written to the bank unit before each access.
        bank_value: TermArg,
    },
    /// `IndexField (IndexName, DataName, ...)`.
    Index {
        /// The field unit receiving byte offsets.
        index: NameString,
        /// The field unit the data moves through.
        data: NameString,
    },
}

/// One entry of a field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEntry {
    /// A named unit of `bits` bits.
    Named {
        /// The unit's name.
        name: NameSeg,
        /// The unit's width.
        bits: u64,
    },
    /// An unnamed gap (`Offset()` or `, n`).
    Reserved {
        /// The gap's width.
        bits: u64,
    },
}

enum Binding {
    Region {
        region: NodeHandle,
    },
    Bank {
        region: NodeHandle,
        bank: NodeHandle,
        bank_value: TermArg,
    },
    Index {
        index: NodeHandle,
        data: NodeHandle,
    },
}

struct FieldList {
    binding: Binding,
    flags: FieldFlags,
    reference: RefCell<FieldReference>,
}

struct Node {
    path: AmlPath,
    parent: Option<NodeHandle>,
    children: BTreeMap<NameSeg, NodeHandle>,
    object: NamedObject,
}

/// Runs `$body` with `$window` bound to an [`IndexWindow`] whose element
/// width matches the declaration's access type.
macro_rules! index_window {
    ($ns:ident, $flags:expr, $index:expr, $data:expr, $path:expr, $ctx:expr, |$window:ident| $body:expr) => {
        match $flags.access_type {
            AccessType::Any | AccessType::Byte => {
                let mut $window = IndexWindow::<u8, _>::new($ns, $index, $data, &mut *$ctx);
                $body
            }
            AccessType::Word => {
                let mut $window = IndexWindow::<u16, _>::new($ns, $index, $data, &mut *$ctx);
                $body
            }
            AccessType::DWord => {
                let mut $window = IndexWindow::<u32, _>::new($ns, $index, $data, &mut *$ctx);
                $body
            }
            AccessType::QWord => {
                let mut $window = IndexWindow::<u64, _>::new($ns, $index, $data, &mut *$ctx);
                $body
            }
            AccessType::Buffer => Err(AmlError::UnsupportedAccessType {
                kind: $ns.unit_region_kind($data)?,
                access: AccessType::Buffer,
                field: $path,
            }),
        }
    };
}

/// The collected ACPI namespace.
pub struct Namespace {
    nodes: Vec<Node>,
    field_lists: Vec<FieldList>,
}

impl Namespace {
    /// Handle of the root scope (`\`).
    pub const ROOT: NodeHandle = NodeHandle(0);

    /// Creates a namespace holding only the root scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: alloc::vec![Node {
                path: AmlPath::ROOT,
                parent: None,
                children: BTreeMap::new(),
                object: NamedObject::Scope,
            }],
            field_lists: Vec::new(),
        }
    }

    fn node(&self, handle: NodeHandle) -> &Node {
        &self.nodes[handle.0]
    }

    fn field_list(&self, handle: FieldListHandle) -> &FieldList {
        &self.field_lists[handle.0]
    }

    /// Adds `object` as the child `name` of `parent`.
    ///
    /// An existing `External` declaration of the same name is replaced by
    /// the real definition.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::AlreadyDefined`] if the name is taken and
    /// [`AmlError::PathOverflow`] if the namespace is too deep.
    pub fn add(
        &mut self,
        parent: NodeHandle,
        name: NameSeg,
        object: NamedObject,
    ) -> Result<NodeHandle, AmlError> {
        let path = self.node(parent).path.child(name)?;

        if let Some(existing) = self.child(parent, name) {
            if !matches!(self.node(existing).object, NamedObject::External(_)) {
                return Err(AmlError::AlreadyDefined(path));
            }
            if !matches!(object, NamedObject::External(_)) {
                self.nodes[existing.0].object = object;
            }
            return Ok(existing);
        }

        let handle = NodeHandle(self.nodes.len());
        self.nodes.push(Node {
            path,
            parent: Some(parent),
            children: BTreeMap::new(),
            object,
        });
        self.nodes[parent.0].children.insert(name, handle);
        Ok(handle)
    }

    /// Opens the scope `name` under `parent`, creating it if needed.
    ///
    /// Reopening an existing device, processor or scope returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::AlreadyDefined`] if `name` is an object that can't
    /// hold children.
    pub fn add_scope(&mut self, parent: NodeHandle, name: NameSeg) -> Result<NodeHandle, AmlError> {
        if let Some(existing) = self.child(parent, name) {
            if self.node(existing).object.is_scope_like() {
                return Ok(existing);
            }
        }
        self.add(parent, name, NamedObject::Scope)
    }

    /// Adds a Field, BankField or IndexField declaration under `scope`.
    ///
    /// Every named entry becomes a field unit node whose offset is the sum of
    /// the widths before it, reserved gaps included.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::UndefinedName`] if the region or registers don't
    /// exist yet, [`AmlError::TypeMismatch`] if they are the wrong kind of
    /// object, [`AmlError::AlreadyDefined`] if any unit name is taken and
    /// [`AmlError::PathOverflow`] if `scope` is too deep to hold the units.
    /// Nothing is added on error.
    pub fn add_field_list(
        &mut self,
        scope: NodeHandle,
        source: FieldSource,
        flags: FieldFlags,
        entries: &[FieldEntry],
    ) -> Result<FieldListHandle, AmlError> {
        let scope_path = self.path(scope);
        let binding = match source {
            FieldSource::Region(region) => Binding::Region {
                region: self.expect_region(&scope_path, &region)?,
            },
            FieldSource::Bank {
                region,
                bank,
                bank_value,
            } => Binding::Bank {
                region: self.expect_region(&scope_path, &region)?,
                bank: self.expect_unit(&scope_path, &bank)?,
                bank_value,
            },
            FieldSource::Index { index, data } => Binding::Index {
                index: self.expect_unit(&scope_path, &index)?,
                data: self.expect_unit(&scope_path, &data)?,
            },
        };

        for (i, entry) in entries.iter().enumerate() {
            let FieldEntry::Named { name, .. } = *entry else {
                continue;
            };
            let repeated = entries[..i]
                .iter()
                .any(|e| matches!(*e, FieldEntry::Named { name: n, .. } if n == name));
            let taken = self
                .child(scope, name)
                .is_some_and(|h| !matches!(self.node(h).object, NamedObject::External(_)));
            let unit_path = scope_path.child(name)?;
            if repeated || taken {
                return Err(AmlError::AlreadyDefined(unit_path));
            }
        }

        let list = FieldListHandle(self.field_lists.len());
        let make_unit: fn(FieldUnit) -> NamedObject = match binding {
            Binding::Region { .. } => NamedObject::Field,
            Binding::Bank { .. } => NamedObject::BankField,
            Binding::Index { .. } => NamedObject::IndexField,
        };
        self.field_lists.push(FieldList {
            binding,
            flags,
            reference: RefCell::new(FieldReference::new(flags)),
        });

        let mut bit_offset = 0u64;
        for entry in entries {
            let bits = match *entry {
                FieldEntry::Named { name, bits } => {
                    let unit = FieldUnit {
                        list,
                        bit_offset,
                        bit_width: bits,
                    };
                    self.add(scope, name, make_unit(unit))?;
                    bits
                }
                FieldEntry::Reserved { bits } => bits,
            };
            bit_offset = bit_offset.saturating_add(bits);
        }
        Ok(list)
    }

    fn expect_region(&self, scope: &AmlPath, name: &NameString) -> Result<NodeHandle, AmlError> {
        let handle = self.resolve(scope, name)?;
        self.op_region(handle)?;
        Ok(handle)
    }

    fn expect_unit(&self, scope: &AmlPath, name: &NameString) -> Result<NodeHandle, AmlError> {
        let handle = self.resolve(scope, name)?;
        match self.node(handle).object.field_unit() {
            Some(_) => Ok(handle),
            None => Err(AmlError::TypeMismatch {
                expected: "FieldUnit",
                found: self.node(handle).object.kind_name(),
            }),
        }
    }

    fn op_region(&self, handle: NodeHandle) -> Result<&OpRegion, AmlError> {
        match &self.node(handle).object {
            NamedObject::OpRegion(op) => Ok(op),
            other => Err(AmlError::TypeMismatch {
                expected: "OpRegion",
                found: other.kind_name(),
            }),
        }
    }

    /// Returns the immediate child `name` of `parent`.
    #[must_use]
    pub fn child(&self, parent: NodeHandle, name: NameSeg) -> Option<NodeHandle> {
        self.node(parent).children.get(&name).copied()
    }

    /// Returns the immediate child named by `name` (e.g. `"_STA"`).
    ///
    /// Matching is exact and case-sensitive; short names are `_`-padded.
    #[must_use]
    pub fn child_node(&self, parent: NodeHandle, name: &str) -> Option<NodeHandle> {
        self.child(parent, NameSeg::new(name).ok()?)
    }

    /// Iterates over the children of `parent` in name order.
    pub fn children(&self, parent: NodeHandle) -> impl Iterator<Item = NodeHandle> + '_ {
        self.node(parent).children.values().copied()
    }

    /// Returns the enclosing node, or `None` for the root.
    #[must_use]
    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.node(handle).parent
    }

    /// Returns the absolute path of a node.
    #[must_use]
    pub fn path(&self, handle: NodeHandle) -> AmlPath {
        self.node(handle).path
    }

    /// Returns the object stored at a node.
    #[must_use]
    pub fn object(&self, handle: NodeHandle) -> &NamedObject {
        &self.node(handle).object
    }

    /// Returns the flags of a field declaration.
    #[must_use]
    pub fn field_flags(&self, list: FieldListHandle) -> FieldFlags {
        self.field_list(list).flags
    }

    /// Returns `true` once a field declaration has bound its region space.
    #[must_use]
    pub fn is_field_bound(&self, list: FieldListHandle) -> bool {
        self.field_list(list)
            .reference
            .try_borrow()
            .is_ok_and(|r| r.is_resolved())
    }

    /// Finds the node at an absolute path.
    #[must_use]
    pub fn lookup(&self, path: &AmlPath) -> Option<NodeHandle> {
        path.segments()
            .iter()
            .try_fold(Self::ROOT, |node, &seg| self.child(node, seg))
    }

    /// Resolves a name as written in bytecode against `scope`.
    ///
    /// A bare single-segment name is searched for in `scope` and then in
    /// each enclosing scope up to the root. Any other form names exactly one
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::UndefinedName`] if nothing matches.
    pub fn resolve(&self, scope: &AmlPath, name: &NameString) -> Result<NodeHandle, AmlError> {
        if name.is_search_name() {
            if let Some(&seg) = name.segments().first() {
                let mut candidate = Some(*scope);
                while let Some(path) = candidate {
                    if let Some(found) = self.lookup(&path).and_then(|h| self.child(h, seg)) {
                        return Ok(found);
                    }
                    candidate = path.parent();
                }
            }
            return Err(AmlError::UndefinedName(*name));
        }
        let path = name.resolve_in(scope)?;
        self.lookup(&path).ok_or(AmlError::UndefinedName(*name))
    }

    /// Returns a device view of `handle` if it is a device.
    #[must_use]
    pub fn device(&self, handle: NodeHandle) -> Option<Device<'_>> {
        match self.node(handle).object {
            NamedObject::Device => Some(Device::new(self, handle)),
            _ => None,
        }
    }

    /// Iterates over every device in the namespace.
    pub fn devices(&self) -> impl Iterator<Item = Device<'_>> {
        (0..self.nodes.len()).filter_map(|i| self.device(NodeHandle(i)))
    }

    /// Finds the first device whose static `_HID` decodes to `hid`.
    #[must_use]
    pub fn find_device_by_hid(&self, hid: &str) -> Option<Device<'_>> {
        self.devices()
            .find(|d| d.hardware_id().as_deref() == Some(hid))
    }

    /// Reads a named object as a value.
    ///
    /// Names yield their stored value, methods are invoked, field units are
    /// read through their region or registers and buffer fields through
    /// their source buffer.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NotReadable`] for objects without a value, and
    /// propagates evaluation and access failures.
    pub fn read_value<C>(&self, handle: NodeHandle, ctx: &mut C) -> Result<AmlValue, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let node = self.node(handle);
        match &node.object {
            NamedObject::Name(value) => value
                .try_borrow()
                .map(|v| v.clone())
                .map_err(|_| AmlError::Busy(node.path)),
            NamedObject::Method(method) => method.invoke(node.path, ctx),
            NamedObject::Field(unit) | NamedObject::IndexField(unit) | NamedObject::BankField(unit) => {
                self.read_field(node.path, unit, ctx)
            }
            NamedObject::CreateBitField(field)
            | NamedObject::CreateByteField(field)
            | NamedObject::CreateWordField(field)
            | NamedObject::CreateDWordField(field)
            | NamedObject::CreateQWordField(field)
            | NamedObject::CreateField(field) => field.read(ctx),
            other => Err(AmlError::NotReadable {
                path: node.path,
                kind: other.kind_name(),
            }),
        }
    }

    /// Stores `value` into a named object.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NotWritable`] for objects that can't be stored
    /// to, and propagates evaluation and access failures.
    pub fn update_value<C>(
        &self,
        handle: NodeHandle,
        value: AmlValue,
        ctx: &mut C,
    ) -> Result<(), AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let node = self.node(handle);
        match &node.object {
            NamedObject::Name(slot) => {
                *slot.try_borrow_mut().map_err(|_| AmlError::Busy(node.path))? = value;
                Ok(())
            }
            NamedObject::Field(unit) | NamedObject::IndexField(unit) | NamedObject::BankField(unit) => {
                self.write_field(node.path, unit, &value, ctx)
            }
            NamedObject::CreateBitField(field)
            | NamedObject::CreateByteField(field)
            | NamedObject::CreateWordField(field)
            | NamedObject::CreateDWordField(field)
            | NamedObject::CreateQWordField(field)
            | NamedObject::CreateField(field) => field.write(&value, ctx),
            other => Err(AmlError::NotWritable {
                path: node.path,
                kind: other.kind_name(),
            }),
        }
    }

    fn read_field<C>(&self, path: AmlPath, unit: &FieldUnit, ctx: &mut C) -> Result<AmlValue, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let list = self.field_list(unit.list);
        let value = match &list.binding {
            Binding::Region { region } => {
                self.with_region(list, *region, path, ctx, |space| {
                    space.read_value(unit.bit_offset, unit.bit_width)
                })
            }
            Binding::Bank {
                region,
                bank,
                bank_value,
            } => {
                self.with_region(list, *region, path, ctx, |space| {
                    check_unit(space, unit, None)
                })?;
                self.select_bank(*bank, bank_value, ctx)?;
                self.with_region(list, *region, path, ctx, |space| {
                    space.read_value(unit.bit_offset, unit.bit_width)
                })
            }
            Binding::Index { index, data } => {
                index_window!(self, list.flags, *index, *data, path, ctx, |window| {
                    access::read_value(&mut window, unit.bit_offset, unit.bit_width)
                })
            }
        }?;
        trace!("aml: read {path} = {value:?}");
        Ok(value)
    }

    fn write_field<C>(
        &self,
        path: AmlPath,
        unit: &FieldUnit,
        value: &AmlValue,
        ctx: &mut C,
    ) -> Result<(), AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        trace!("aml: write {path} = {value:?}");
        let list = self.field_list(unit.list);
        match &list.binding {
            Binding::Region { region } => self.with_region(list, *region, path, ctx, |space| {
                space.write_value(unit.bit_offset, unit.bit_width, value)
            }),
            Binding::Bank {
                region,
                bank,
                bank_value,
            } => {
                self.with_region(list, *region, path, ctx, |space| {
                    check_unit(space, unit, Some(value))
                })?;
                self.select_bank(*bank, bank_value, ctx)?;
                self.with_region(list, *region, path, ctx, |space| {
                    space.write_value(unit.bit_offset, unit.bit_width, value)
                })
            }
            Binding::Index { index, data } => {
                let rule = list.flags.update_rule;
                index_window!(self, list.flags, *index, *data, path, ctx, |window| {
                    access::write_value(&mut window, unit.bit_offset, unit.bit_width, value, rule)
                })
            }
        }
    }

    /// Resolves the declaration's region space and runs `f` on it.
    fn with_region<C, R>(
        &self,
        list: &FieldList,
        region: NodeHandle,
        path: AmlPath,
        ctx: &mut C,
        f: impl FnOnce(&mut dyn RegionSpace) -> Result<R, AmlError>,
    ) -> Result<R, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let op = self.op_region(region)?;
        let mut reference = list
            .reference
            .try_borrow_mut()
            .map_err(|_| AmlError::Busy(path))?;
        f(reference.resolve(path, op, ctx)?)
    }

    fn select_bank<C>(&self, bank: NodeHandle, bank_value: &TermArg, ctx: &mut C) -> Result<(), AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let value = evaluate_integer(ctx, bank_value)?;
        trace!("aml: select bank {value:#x} via {}", self.path(bank));
        self.update_value(bank, AmlValue::Integer(value), ctx)
    }

    /// The address space a field unit ultimately reaches.
    fn unit_region_kind(&self, unit: NodeHandle) -> Result<RegionSpaceKind, AmlError> {
        let Some(field) = self.node(unit).object.field_unit() else {
            return Err(AmlError::TypeMismatch {
                expected: "FieldUnit",
                found: self.node(unit).object.kind_name(),
            });
        };
        match &self.field_list(field.list).binding {
            Binding::Region { region } | Binding::Bank { region, .. } => {
                Ok(self.op_region(*region)?.space)
            }
            Binding::Index { data, .. } => self.unit_region_kind(*data),
        }
    }
}

/// Rejects a unit access that the region space would refuse, so that a
/// bank switch only happens for an access that will go through.
fn check_unit(space: &dyn RegionSpace, unit: &FieldUnit, value: Option<&AmlValue>) -> Result<(), AmlError> {
    access::check_range(unit.bit_offset, unit.bit_width, space.total_bits())?;
    match (value, u32::try_from(unit.bit_width)) {
        (None | Some(AmlValue::Buffer(_)), _) => Ok(()),
        (Some(AmlValue::Integer(v)), Ok(width)) if width <= 64 => access::check_value(*v, width),
        (Some(AmlValue::Integer(_)), _) => Ok(()),
        (Some(other), _) => Err(AmlError::TypeMismatch {
            expected: "Integer or Buffer",
            found: other.type_name(),
        }),
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

/// An IndexField's view of its data register as an array of elements.
///
/// Element `i` is reached by writing its byte offset to the index unit and
/// then moving the value through the data unit.
struct IndexWindow<'a, T, C: ?Sized> {
    ns: &'a Namespace,
    index: NodeHandle,
    data: NodeHandle,
    ctx: &'a mut C,
    width: PhantomData<T>,
}

impl<'a, T: AccessWidth, C: ExecutionContext + ?Sized> IndexWindow<'a, T, C> {
    fn new(ns: &'a Namespace, index: NodeHandle, data: NodeHandle, ctx: &'a mut C) -> Self {
        Self {
            ns,
            index,
            data,
            ctx,
            width: PhantomData,
        }
    }

    fn select(&mut self, element: usize) -> Result<(), AmlError> {
        let byte_offset = element as u64 * u64::from(T::BITS / 8);
        self.ns
            .update_value(self.index, AmlValue::Integer(byte_offset), &mut *self.ctx)
    }
}

impl<T: AccessWidth, C: ExecutionContext + ?Sized> ElementStore for IndexWindow<'_, T, C> {
    type Element = T;

    fn element_count(&self) -> usize {
        // The index register addresses the whole range; bounds come from the
        // registers themselves.
        usize::MAX / (T::BITS as usize)
    }

    fn load(&mut self, index: usize) -> Result<T, AmlError> {
        self.select(index)?;
        let value = self.ns.read_value(self.data, &mut *self.ctx)?.expect_integer()?;
        Ok(T::from_u64(value))
    }

    fn store(&mut self, index: usize, value: T) -> Result<(), AmlError> {
        self.select(index)?;
        self.ns
            .update_value(self.data, AmlValue::Integer(value.to_u64()), &mut *self.ctx)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec;

    use super::*;
    use crate::testing::MockContext;

    fn seg(name: &str) -> NameSeg {
        NameSeg::new(name).unwrap()
    }

    fn name(text: &str) -> NameString {
        NameString::parse(text).unwrap()
    }

    fn flags(byte: u8) -> FieldFlags {
        FieldFlags::from_byte(byte).unwrap()
    }

    fn named(text: &str, bits: u64) -> FieldEntry {
        FieldEntry::Named {
            name: seg(text),
            bits,
        }
    }

    fn region(kind: RegionSpaceKind, offset: u64, length: u64) -> NamedObject {
        NamedObject::OpRegion(OpRegion {
            space: kind,
            offset: TermArg::integer(offset),
            length: TermArg::integer(length),
        })
    }

    /// `\_SB_.PCI0` with a 16-byte memory region `MREG`.
    fn pci_namespace() -> (Namespace, NodeHandle) {
        let mut ns = Namespace::new();
        let sb = ns.add_scope(Namespace::ROOT, seg("_SB")).unwrap();
        let pci = ns.add(sb, seg("PCI0"), NamedObject::Device).unwrap();
        ns.add(pci, seg("MREG"), region(RegionSpaceKind::SystemMemory, 0xFED0_0000, 16))
            .unwrap();
        (ns, pci)
    }

    fn read(ns: &Namespace, path: &str) -> Result<AmlValue, AmlError> {
        let handle = ns.lookup(&AmlPath::parse(path).unwrap()).unwrap();
        ns.read_value(handle, &mut MockContext::new(ns))
    }

    fn write(ns: &Namespace, path: &str, value: AmlValue) -> Result<(), AmlError> {
        let handle = ns.lookup(&AmlPath::parse(path).unwrap()).unwrap();
        ns.update_value(handle, value, &mut MockContext::new(ns))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut ns = Namespace::new();
        ns.add(Namespace::ROOT, seg("FOO"), NamedObject::Device).unwrap();
        assert_eq!(
            ns.add(Namespace::ROOT, seg("FOO"), NamedObject::Device),
            Err(AmlError::AlreadyDefined(AmlPath::parse("\\FOO_").unwrap()))
        );
    }

    #[test]
    fn scopes_reopen_existing_containers() {
        let mut ns = Namespace::new();
        let sb = ns.add_scope(Namespace::ROOT, seg("_SB")).unwrap();
        assert_eq!(ns.add_scope(Namespace::ROOT, seg("_SB")).unwrap(), sb);
        let dev = ns.add(sb, seg("DEV0"), NamedObject::Device).unwrap();
        assert_eq!(ns.add_scope(sb, seg("DEV0")).unwrap(), dev);

        ns.add(sb, seg("VAL"), NamedObject::name(AmlValue::Integer(1))).unwrap();
        assert!(matches!(
            ns.add_scope(sb, seg("VAL")),
            Err(AmlError::AlreadyDefined(_))
        ));
    }

    #[test]
    fn external_declarations_are_superseded() {
        use crate::object::External;

        let mut ns = Namespace::new();
        let ext = NamedObject::External(External::new(6, 0).unwrap());
        let first = ns.add(Namespace::ROOT, seg("DEV0"), ext).unwrap();
        let second = ns.add(Namespace::ROOT, seg("DEV0"), NamedObject::Device).unwrap();
        assert_eq!(first, second);
        assert!(ns.device(second).is_some());
    }

    #[test]
    fn lookups_by_path_and_short_name() {
        let (ns, pci) = pci_namespace();
        let path = AmlPath::parse("\\_SB_.PCI0").unwrap();
        assert_eq!(ns.lookup(&path), Some(pci));
        assert_eq!(ns.path(pci), path);
        assert!(ns.child_node(pci, "MREG").is_some());
        assert_eq!(ns.child_node(pci, "mreg"), None);
        assert_eq!(ns.child_node(pci, "_STA"), None);
        assert_eq!(ns.parent(pci), ns.lookup(&AmlPath::parse("\\_SB_").unwrap()));
        assert_eq!(ns.children(pci).count(), 1);
    }

    #[test]
    fn single_segments_search_enclosing_scopes() {
        let (mut ns, pci) = pci_namespace();
        let lpc = ns.add(pci, seg("LPCB"), NamedObject::Device).unwrap();
        let scope = ns.path(lpc);

        assert_eq!(
            ns.path(ns.resolve(&scope, &name("MREG")).unwrap()),
            AmlPath::parse("\\_SB_.PCI0.MREG").unwrap()
        );
        assert_eq!(ns.resolve(&scope, &name("^MREG")).unwrap(), ns.child(pci, seg("MREG")).unwrap());
        assert_eq!(
            ns.resolve(&scope, &name("PCI0.MREG")),
            Err(AmlError::UndefinedName(name("PCI0.MREG")))
        );
        assert_eq!(
            ns.resolve(&scope, &name("NONE")),
            Err(AmlError::UndefinedName(name("NONE")))
        );
    }

    #[test]
    fn field_units_take_consecutive_offsets() {
        let (mut ns, pci) = pci_namespace();
        let list = ns
            .add_field_list(
                pci,
                FieldSource::Region(name("MREG")),
                flags(0x01),
                &[
                    named("FLGA", 4),
                    named("FLGB", 12),
                    FieldEntry::Reserved { bits: 8 },
                    named("WIDE", 72),
                ],
            )
            .unwrap();

        let unit = |n: &str| *ns.object(ns.child_node(pci, n).unwrap()).field_unit().unwrap();
        assert_eq!(unit("FLGA").bit_offset, 0);
        assert_eq!(unit("FLGB").bit_offset, 4);
        assert_eq!(unit("WIDE").bit_offset, 24);
        assert_eq!(unit("WIDE").list, list);
        assert!(matches!(
            ns.object(ns.child_node(pci, "FLGB").unwrap()),
            NamedObject::Field(_)
        ));
        assert_eq!(ns.field_flags(list).access_type, AccessType::Byte);
    }

    #[test]
    fn field_declarations_need_their_region() {
        let (mut ns, pci) = pci_namespace();
        assert_eq!(
            ns.add_field_list(pci, FieldSource::Region(name("NONE")), flags(0), &[named("A", 8)]),
            Err(AmlError::UndefinedName(name("NONE")))
        );
        ns.add(pci, seg("NAME"), NamedObject::name(AmlValue::Integer(0))).unwrap();
        assert_eq!(
            ns.add_field_list(pci, FieldSource::Region(name("NAME")), flags(0), &[named("A", 8)]),
            Err(AmlError::TypeMismatch {
                expected: "OpRegion",
                found: "Name"
            })
        );
    }

    #[test]
    fn colliding_unit_names_add_nothing() {
        let (mut ns, pci) = pci_namespace();
        let result = ns.add_field_list(
            pci,
            FieldSource::Region(name("MREG")),
            flags(0),
            &[named("AAAA", 8), named("BBBB", 8), named("AAAA", 8)],
        );
        assert!(matches!(result, Err(AmlError::AlreadyDefined(_))));
        assert_eq!(ns.child_node(pci, "AAAA"), None);
        assert_eq!(ns.child_node(pci, "BBBB"), None);
    }

    #[test]
    fn units_of_one_declaration_share_a_region_space() {
        let (mut ns, pci) = pci_namespace();
        let list = ns
            .add_field_list(
                pci,
                FieldSource::Region(name("MREG")),
                flags(0x00),
                &[named("FLGA", 4), named("FLGB", 12), named("WIDE", 72)],
            )
            .unwrap();
        assert!(!ns.is_field_bound(list));

        write(&ns, "\\_SB_.PCI0.FLGB", AmlValue::Integer(0xABC)).unwrap();
        write(&ns, "\\_SB_.PCI0.FLGA", AmlValue::Integer(0x5)).unwrap();
        assert!(ns.is_field_bound(list));
        assert_eq!(read(&ns, "\\_SB_.PCI0.FLGB"), Ok(AmlValue::Integer(0xABC)));
        assert_eq!(read(&ns, "\\_SB_.PCI0.FLGA"), Ok(AmlValue::Integer(0x5)));

        assert_eq!(
            read(&ns, "\\_SB_.PCI0.WIDE"),
            Ok(AmlValue::Buffer(vec![0; 9]))
        );
        assert!(matches!(
            write(&ns, "\\_SB_.PCI0.FLGA", AmlValue::Integer(0x10)),
            Err(AmlError::ValueTooWide { value: 0x10, width: 4, max: 0xF })
        ));
    }

    #[test]
    fn region_bounds_are_evaluated_through_the_context() {
        let mut ns = Namespace::new();
        ns.add(Namespace::ROOT, seg("BASE"), NamedObject::name(AmlValue::Integer(0x1000)))
            .unwrap();
        ns.add(
            Namespace::ROOT,
            seg("REG0"),
            NamedObject::OpRegion(OpRegion {
                space: RegionSpaceKind::SystemIo,
                offset: TermArg::Name(name("BASE")),
                length: TermArg::integer(2),
            }),
        )
        .unwrap();
        ns.add_field_list(
            Namespace::ROOT,
            FieldSource::Region(name("REG0")),
            flags(0x02),
            &[named("PORT", 16)],
        )
        .unwrap();

        write(&ns, "\\PORT", AmlValue::Integer(0xBEEF)).unwrap();
        assert_eq!(read(&ns, "\\PORT"), Ok(AmlValue::Integer(0xBEEF)));
    }

    #[test]
    fn self_referential_regions_report_busy() {
        let mut ns = Namespace::new();
        ns.add(
            Namespace::ROOT,
            seg("LOOP"),
            NamedObject::OpRegion(OpRegion {
                space: RegionSpaceKind::SystemMemory,
                offset: TermArg::Name(name("FLD0")),
                length: TermArg::integer(4),
            }),
        )
        .unwrap();
        ns.add_field_list(
            Namespace::ROOT,
            FieldSource::Region(name("LOOP")),
            flags(0x01),
            &[named("FLD0", 8)],
        )
        .unwrap();

        assert_eq!(
            read(&ns, "\\FLD0"),
            Err(AmlError::Busy(AmlPath::parse("\\FLD0").unwrap()))
        );
    }

    #[test]
    fn bank_fields_select_their_bank_first() {
        let (mut ns, pci) = pci_namespace();
        ns.add(pci, seg("BREG"), region(RegionSpaceKind::SystemIo, 0x70, 1))
            .unwrap();
        ns.add_field_list(
            pci,
            FieldSource::Region(name("BREG")),
            flags(0x01),
            &[named("BNK", 8)],
        )
        .unwrap();
        let list = ns
            .add_field_list(
                pci,
                FieldSource::Bank {
                    region: name("MREG"),
                    bank: name("BNK"),
                    bank_value: TermArg::integer(2),
                },
                flags(0x01),
                &[named("BF0", 8)],
            )
            .unwrap();
        assert!(matches!(
            ns.object(ns.child_node(pci, "BF0").unwrap()),
            NamedObject::BankField(_)
        ));

        assert_eq!(read(&ns, "\\_SB_.PCI0.BNK_"), Ok(AmlValue::Integer(0)));
        write(&ns, "\\_SB_.PCI0.BF0_", AmlValue::Integer(0x42)).unwrap();
        assert_eq!(read(&ns, "\\_SB_.PCI0.BNK_"), Ok(AmlValue::Integer(2)));
        assert_eq!(read(&ns, "\\_SB_.PCI0.BF0_"), Ok(AmlValue::Integer(0x42)));
        assert!(ns.is_field_bound(list));
    }

    /// `\_SB_.PCI0` with bank unit `BNK` and a BankField declaration over
    /// `bank_region` (bank value 2) holding `entries`.
    fn banked_namespace(bank_region: &str, entries: &[FieldEntry]) -> Namespace {
        let (mut ns, pci) = pci_namespace();
        ns.add(pci, seg("BREG"), region(RegionSpaceKind::SystemIo, 0x70, 1))
            .unwrap();
        ns.add(pci, seg("SMB0"), region(RegionSpaceKind::SmBus, 0, 4))
            .unwrap();
        ns.add_field_list(pci, FieldSource::Region(name("BREG")), flags(0x01), &[named("BNK", 8)])
            .unwrap();
        ns.add_field_list(
            pci,
            FieldSource::Bank {
                region: name(bank_region),
                bank: name("BNK"),
                bank_value: TermArg::integer(2),
            },
            flags(0x01),
            entries,
        )
        .unwrap();
        ns
    }

    #[test]
    fn rejected_bank_field_accesses_leave_the_bank_alone() {
        let ns = banked_namespace("MREG", &[named("BF0", 4)]);
        assert!(matches!(
            write(&ns, "\\_SB_.PCI0.BF0_", AmlValue::Integer(0x10)),
            Err(AmlError::ValueTooWide { value: 0x10, width: 4, max: 0xF })
        ));
        assert!(matches!(
            write(&ns, "\\_SB_.PCI0.BF0_", AmlValue::String("x".into())),
            Err(AmlError::TypeMismatch { .. })
        ));
        assert_eq!(read(&ns, "\\_SB_.PCI0.BNK_"), Ok(AmlValue::Integer(0)));

        // MREG is 16 bytes; this unit starts right after it.
        let ns = banked_namespace("MREG", &[FieldEntry::Reserved { bits: 128 }, named("PAST", 8)]);
        assert!(matches!(
            read(&ns, "\\_SB_.PCI0.PAST"),
            Err(AmlError::AccessOutOfBounds { .. })
        ));
        assert!(matches!(
            write(&ns, "\\_SB_.PCI0.PAST", AmlValue::Integer(1)),
            Err(AmlError::AccessOutOfBounds { .. })
        ));
        assert_eq!(read(&ns, "\\_SB_.PCI0.BNK_"), Ok(AmlValue::Integer(0)));

        let ns = banked_namespace("SMB0", &[named("SMBD", 8)]);
        assert!(matches!(
            write(&ns, "\\_SB_.PCI0.SMBD", AmlValue::Integer(1)),
            Err(AmlError::UnsupportedRegionSpace { .. })
        ));
        assert_eq!(read(&ns, "\\_SB_.PCI0.BNK_"), Ok(AmlValue::Integer(0)));
    }

    #[test]
    fn over_deep_field_units_add_nothing() {
        let mut ns = Namespace::new();
        ns.add(Namespace::ROOT, seg("REG0"), region(RegionSpaceKind::SystemMemory, 0, 4))
            .unwrap();
        let mut scope = Namespace::ROOT;
        for i in 0..16 {
            scope = ns.add_scope(scope, seg(&std::format!("S{i:X}"))).unwrap();
        }

        assert_eq!(
            ns.add_field_list(scope, FieldSource::Region(name("REG0")), flags(0x01), &[named("DEEP", 8)]),
            Err(AmlError::PathOverflow)
        );
        assert!(ns.field_lists.is_empty());
        assert_eq!(ns.children(scope).count(), 0);
    }

    #[test]
    fn index_fields_move_through_their_registers() {
        let mut ns = Namespace::new();
        ns.add(Namespace::ROOT, seg("IDXR"), region(RegionSpaceKind::SystemIo, 0x2E, 2))
            .unwrap();
        ns.add_field_list(
            Namespace::ROOT,
            FieldSource::Region(name("IDXR")),
            flags(0x01),
            &[named("INDX", 8), named("DATA", 8)],
        )
        .unwrap();
        ns.add_field_list(
            Namespace::ROOT,
            FieldSource::Index {
                index: name("INDX"),
                data: name("DATA"),
            },
            flags(0x01),
            &[named("LOWB", 8), named("NIBL", 4), named("NIBH", 4)],
        )
        .unwrap();

        write(&ns, "\\NIBH", AmlValue::Integer(0xA)).unwrap();
        assert_eq!(read(&ns, "\\INDX"), Ok(AmlValue::Integer(1)));
        assert_eq!(read(&ns, "\\DATA"), Ok(AmlValue::Integer(0xA0)));
        assert_eq!(read(&ns, "\\NIBH"), Ok(AmlValue::Integer(0xA)));

        write(&ns, "\\LOWB", AmlValue::Integer(0x55)).unwrap();
        assert_eq!(read(&ns, "\\INDX"), Ok(AmlValue::Integer(0)));
        assert_eq!(read(&ns, "\\DATA"), Ok(AmlValue::Integer(0x55)));
    }

    #[test]
    fn buffer_access_index_fields_name_the_register_space() {
        let mut ns = Namespace::new();
        ns.add(Namespace::ROOT, seg("IDXR"), region(RegionSpaceKind::SystemIo, 0x2E, 2))
            .unwrap();
        ns.add_field_list(
            Namespace::ROOT,
            FieldSource::Region(name("IDXR")),
            flags(0x01),
            &[named("INDX", 8), named("DATA", 8)],
        )
        .unwrap();
        ns.add_field_list(
            Namespace::ROOT,
            FieldSource::Index {
                index: name("INDX"),
                data: name("DATA"),
            },
            flags(0x05),
            &[named("BUFF", 8)],
        )
        .unwrap();

        assert_eq!(
            read(&ns, "\\BUFF"),
            Err(AmlError::UnsupportedAccessType {
                kind: RegionSpaceKind::SystemIo,
                access: AccessType::Buffer,
                field: AmlPath::parse("\\BUFF").unwrap(),
            })
        );
    }

    #[test]
    fn names_read_and_replace() {
        let mut ns = Namespace::new();
        ns.add(Namespace::ROOT, seg("VAL"), NamedObject::name(AmlValue::Integer(7)))
            .unwrap();
        assert_eq!(read(&ns, "\\VAL_"), Ok(AmlValue::Integer(7)));
        write(&ns, "\\VAL_", AmlValue::String("x".into())).unwrap();
        assert_eq!(read(&ns, "\\VAL_"), Ok(AmlValue::String("x".into())));
    }

    #[test]
    fn objects_without_values_are_type_errors() {
        let (ns, _) = pci_namespace();
        assert_eq!(
            read(&ns, "\\_SB_.PCI0"),
            Err(AmlError::NotReadable {
                path: AmlPath::parse("\\_SB_.PCI0").unwrap(),
                kind: "Device",
            })
        );
        assert_eq!(
            write(&ns, "\\_SB_.PCI0.MREG", AmlValue::Integer(0)),
            Err(AmlError::NotWritable {
                path: AmlPath::parse("\\_SB_.PCI0.MREG").unwrap(),
                kind: "OpRegion",
            })
        );
    }

    #[test]
    fn unsupported_regions_fail_without_touching_others() {
        let (mut ns, pci) = pci_namespace();
        ns.add(pci, seg("SMB0"), region(RegionSpaceKind::SmBus, 0, 0x100))
            .unwrap();
        ns.add_field_list(pci, FieldSource::Region(name("SMB0")), flags(0x01), &[named("SMBD", 8)])
            .unwrap();
        ns.add_field_list(pci, FieldSource::Region(name("MREG")), flags(0x01), &[named("OKAY", 8)])
            .unwrap();

        assert!(matches!(
            read(&ns, "\\_SB_.PCI0.SMBD"),
            Err(AmlError::UnsupportedRegionSpace {
                kind: RegionSpaceKind::SmBus,
                ..
            })
        ));
        write(&ns, "\\_SB_.PCI0.OKAY", AmlValue::Integer(1)).unwrap();
        assert_eq!(read(&ns, "\\_SB_.PCI0.OKAY"), Ok(AmlValue::Integer(1)));
    }
}
