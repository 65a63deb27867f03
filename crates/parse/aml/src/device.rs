//! Device queries: `_STA`, `_CRS`, `_HID`, `_CID` and `_ADR`.
//!
//! A [`Device`] is a borrowed view of a device node. Each query looks up a
//! well-known child object and reads it, invoking methods in a scope rooted
//! at the child's own path. Nothing is cached; repeated queries re-evaluate.

use alloc::string::String;
use alloc::vec::Vec;

use crate::AmlError;
use crate::context::{ExecutionContext, with_scope};
use crate::namespace::{Namespace, NodeHandle};
use crate::object::NamedObject;
use crate::path::{AmlPath, NameSeg};
use crate::resource::{ResourceSetting, decode_resource_data};
use crate::value::{AmlValue, decode_hid};

bitflags::bitflags! {
    /// Decoded `_STA` result.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceStatus: u32 {
        /// The device is present.
        const PRESENT         = 1 << 0;
        /// The device is enabled and decoding its resources.
        const ENABLED         = 1 << 1;
        /// The device should be shown in the UI.
        const SHOW_IN_UI      = 1 << 2;
        /// The device is functioning properly.
        const FUNCTIONING     = 1 << 3;
        /// A battery is present (control method batteries only).
        const BATTERY_PRESENT = 1 << 4;
    }
}

impl DeviceStatus {
    /// Status assumed for a device without `_STA`: every bit set (0x1F).
    pub const DEFAULT: Self = Self::all();

    /// Decodes the integer a `_STA` object produced. Bits above 4 are
    /// ignored.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_integer(value: u64) -> Self {
        Self::from_bits_truncate(value as u32)
    }

    /// Bit 0.
    #[must_use]
    pub fn present(self) -> bool {
        self.contains(Self::PRESENT)
    }

    /// Bit 1.
    #[must_use]
    pub fn enabled(self) -> bool {
        self.contains(Self::ENABLED)
    }

    /// Bit 2.
    #[must_use]
    pub fn show_in_ui(self) -> bool {
        self.contains(Self::SHOW_IN_UI)
    }

    /// Bit 3.
    #[must_use]
    pub fn functioning(self) -> bool {
        self.contains(Self::FUNCTIONING)
    }

    /// Bit 4.
    #[must_use]
    pub fn battery_present(self) -> bool {
        self.contains(Self::BATTERY_PRESENT)
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// `_STA` name segment.
const STA_SEG: NameSeg = NameSeg(*b"_STA");
/// `_CRS` name segment.
const CRS_SEG: NameSeg = NameSeg(*b"_CRS");
/// `_HID` name segment.
const HID_SEG: NameSeg = NameSeg(*b"_HID");
/// `_CID` name segment.
const CID_SEG: NameSeg = NameSeg(*b"_CID");
/// `_ADR` name segment.
const ADR_SEG: NameSeg = NameSeg(*b"_ADR");

/// A device node together with the namespace it lives in.
#[derive(Clone, Copy)]
pub struct Device<'a> {
    ns: &'a Namespace,
    handle: NodeHandle,
}

impl<'a> Device<'a> {
    pub(crate) fn new(ns: &'a Namespace, handle: NodeHandle) -> Self {
        Self { ns, handle }
    }

    /// The device's node.
    #[must_use]
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    /// The device's absolute path.
    #[must_use]
    pub fn path(&self) -> AmlPath {
        self.ns.path(self.handle)
    }

    /// Reads the device status from `_STA`.
    ///
    /// A device without `_STA` reports [`DeviceStatus::DEFAULT`].
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::TypeMismatch`] if `_STA` produces anything but an
    /// Integer, and propagates evaluation failures.
    pub fn status<C>(&self, ctx: &mut C) -> Result<DeviceStatus, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let Some(sta) = self.ns.child(self.handle, STA_SEG) else {
            return Ok(DeviceStatus::DEFAULT);
        };
        let value = self.evaluate(sta, ctx)?.expect_integer()?;
        Ok(DeviceStatus::from_integer(value))
    }

    /// Decodes the current resource settings from `_CRS`.
    ///
    /// Returns `Ok(None)` when there is no `_CRS` or it does not produce a
    /// Buffer.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::TypeMismatch`] if `_CRS` is neither a Name nor a
    /// Method, and propagates evaluation and decoding failures.
    pub fn current_resource_settings<C>(
        &self,
        ctx: &mut C,
    ) -> Result<Option<Vec<ResourceSetting>>, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let Some(crs) = self.ns.child(self.handle, CRS_SEG) else {
            return Ok(None);
        };
        match self.ns.object(crs) {
            NamedObject::Name(_) | NamedObject::Method(_) => {}
            other => {
                return Err(AmlError::TypeMismatch {
                    expected: "Name or Method",
                    found: other.kind_name(),
                });
            }
        }
        match self.evaluate(crs, ctx)? {
            AmlValue::Buffer(bytes) => decode_resource_data(&bytes).map(Some),
            _ => Ok(None),
        }
    }

    /// The hardware ID from a static `_HID` (`"PNP0A03"`, `"ACPI0003"`).
    ///
    /// `_HID` methods are not evaluated.
    #[must_use]
    pub fn hardware_id(&self) -> Option<String> {
        self.static_id(HID_SEG)
    }

    /// The compatible ID from a static `_CID`.
    #[must_use]
    pub fn pnp_name(&self) -> Option<String> {
        self.static_id(CID_SEG)
    }

    /// The bus address from `_ADR`.
    ///
    /// Returns `Ok(None)` when there is no `_ADR` or it does not produce an
    /// Integer.
    ///
    /// # Errors
    ///
    /// Propagates evaluation failures.
    pub fn address_resource<C>(&self, ctx: &mut C) -> Result<Option<u64>, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        let Some(adr) = self.ns.child(self.handle, ADR_SEG) else {
            return Ok(None);
        };
        match self.evaluate(adr, ctx) {
            Ok(value) => Ok(value.as_integer()),
            Err(AmlError::NotReadable { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn static_id(&self, seg: NameSeg) -> Option<String> {
        let child = self.ns.child(self.handle, seg)?;
        match self.ns.object(child) {
            NamedObject::Name(value) => decode_hid(&*value.try_borrow().ok()?),
            _ => None,
        }
    }

    fn evaluate<C>(&self, child: NodeHandle, ctx: &mut C) -> Result<AmlValue, AmlError>
    where
        C: ExecutionContext + ?Sized,
    {
        with_scope(ctx, self.ns.path(child), |ctx| self.ns.read_value(child, ctx))
    }
}

impl core::fmt::Debug for Device<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Device").field(&self.path()).finish()
    }
}
