//! AML name segments, absolute paths and name strings.
//!
//! ACPI names are composed of 4-byte segments. An [`AmlPath`] is an absolute
//! location in the namespace (`\_SB_.PCI0.LPCB`); a [`NameString`] is a name
//! as it appears in bytecode, which may be root-anchored, prefixed with one
//! or more `^` parent hops, or relative to the current scope.

use core::fmt;

use crate::AmlError;

/// A 4-byte AML name segment (e.g., `_SB_`, `PCI0`, `_HID`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameSeg(pub [u8; 4]);

impl NameSeg {
    /// Parses a name segment from text.
    ///
    /// Names shorter than four characters are padded with `_`, as ASL
    /// compilers do. The lead character must be `A`-`Z` or `_`, the rest
    /// `A`-`Z`, `0`-`9` or `_`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidName`] for empty, over-long or non-ASCII
    /// names.
    pub fn new(name: &str) -> Result<Self, AmlError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 {
            return Err(AmlError::InvalidName);
        }
        let mut seg = [b'_'; 4];
        for (i, &b) in bytes.iter().enumerate() {
            let valid = match b {
                b'A'..=b'Z' | b'_' => true,
                b'0'..=b'9' => i > 0,
                _ => false,
            };
            if !valid {
                return Err(AmlError::InvalidName);
            }
            seg[i] = b;
        }
        Ok(Self(seg))
    }

    /// Returns the name as a UTF-8 string (ACPI names are always ASCII).
    #[must_use]
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("")
    }
}

impl fmt::Debug for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameSeg(\"{}\")", self.as_str())
    }
}

impl fmt::Display for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum number of segments in an inline AML path.
const MAX_PATH_DEPTH: usize = 16;

/// A fixed-capacity absolute AML namespace path.
///
/// Stores up to [`MAX_PATH_DEPTH`] (16) segments inline, which is sufficient
/// for all practical ACPI namespace depths.
#[derive(Clone, Copy)]
pub struct AmlPath {
    segments: [NameSeg; MAX_PATH_DEPTH],
    len: u8,
}

impl AmlPath {
    /// The root path (`\`).
    pub const ROOT: Self = Self {
        segments: [NameSeg(*b"____"); MAX_PATH_DEPTH],
        len: 0,
    };

    /// Parses an absolute path such as `\_SB_.PCI0`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidName`] if the text is not root-anchored or
    /// contains an invalid segment, and [`AmlError::PathOverflow`] if it is
    /// deeper than the inline capacity.
    pub fn parse(text: &str) -> Result<Self, AmlError> {
        let name = NameString::parse(text)?;
        match name.anchor() {
            NameAnchor::Root => Ok(name.path),
            NameAnchor::Parent(_) => Err(AmlError::InvalidName),
        }
    }

    /// Appends a name segment to the path.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::PathOverflow`] if the path is already at maximum
    /// capacity.
    pub fn push(&mut self, seg: NameSeg) -> Result<(), AmlError> {
        if usize::from(self.len) >= MAX_PATH_DEPTH {
            return Err(AmlError::PathOverflow);
        }
        self.segments[usize::from(self.len)] = seg;
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the last name segment from the path.
    pub fn pop(&mut self) -> Option<NameSeg> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.segments[usize::from(self.len)])
    }

    /// Returns a copy of this path extended by `seg`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::PathOverflow`] if the result would be too deep.
    pub fn child(&self, seg: NameSeg) -> Result<Self, AmlError> {
        let mut path = *self;
        path.push(seg)?;
        Ok(path)
    }

    /// Returns the enclosing path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let mut path = *self;
        path.pop().map(|_| path)
    }

    /// Returns the segments of this path.
    #[must_use]
    pub fn segments(&self) -> &[NameSeg] {
        &self.segments[..usize::from(self.len)]
    }

    /// Returns the number of segments (depth) in this path.
    #[must_use]
    pub fn depth(&self) -> usize {
        usize::from(self.len)
    }

    /// Returns `true` for the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.len == 0
    }
}

impl Default for AmlPath {
    fn default() -> Self {
        Self::ROOT
    }
}

impl PartialEq for AmlPath {
    fn eq(&self, other: &Self) -> bool {
        self.segments() == other.segments()
    }
}

impl Eq for AmlPath {}

fn write_segments(f: &mut fmt::Formatter<'_>, segments: &[NameSeg]) -> fmt::Result {
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            f.write_str(".")?;
        }
        write!(f, "{seg}")?;
    }
    Ok(())
}

impl fmt::Debug for AmlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for AmlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\\")?;
        write_segments(f, self.segments())
    }
}

/// Where a [`NameString`] is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameAnchor {
    /// Starts at the namespace root (`\`).
    Root,
    /// Starts at the current scope after climbing this many parents (`^`).
    ///
    /// `Parent(0)` is a plain relative name.
    Parent(u8),
}

/// A name as written in AML: an anchor followed by zero or more segments.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NameString {
    anchor: NameAnchor,
    path: AmlPath,
}

impl NameString {
    /// Parses ASL-style name text: `\_SB_.PCI0`, `^^LNKA`, `PCI0.ISA_`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::InvalidName`] for malformed text and
    /// [`AmlError::PathOverflow`] for over-deep names.
    pub fn parse(text: &str) -> Result<Self, AmlError> {
        let (anchor, rest) = if let Some(rest) = text.strip_prefix('\\') {
            (NameAnchor::Root, rest)
        } else {
            let carets = text.bytes().take_while(|&b| b == b'^').count();
            let hops = u8::try_from(carets).map_err(|_| AmlError::InvalidName)?;
            (NameAnchor::Parent(hops), &text[carets..])
        };

        let mut path = AmlPath::ROOT;
        if !rest.is_empty() {
            for part in rest.split('.') {
                path.push(NameSeg::new(part)?)?;
            }
        }

        // Only `\` on its own may name nothing but its anchor.
        if path.is_root() && anchor != NameAnchor::Root {
            return Err(AmlError::InvalidName);
        }
        Ok(Self { anchor, path })
    }

    /// Returns the anchor of this name.
    #[must_use]
    pub fn anchor(&self) -> NameAnchor {
        self.anchor
    }

    /// Returns the segments following the anchor.
    #[must_use]
    pub fn segments(&self) -> &[NameSeg] {
        self.path.segments()
    }

    /// Returns `true` if this is a bare single segment with no prefix, the
    /// only form for which ACPI searches enclosing scopes.
    #[must_use]
    pub fn is_search_name(&self) -> bool {
        self.anchor == NameAnchor::Parent(0) && self.path.depth() == 1
    }

    /// Resolves this name against `scope` without searching ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::UndefinedName`] if `^` climbs above the root and
    /// [`AmlError::PathOverflow`] if the result is too deep.
    pub fn resolve_in(&self, scope: &AmlPath) -> Result<AmlPath, AmlError> {
        let mut base = match self.anchor {
            NameAnchor::Root => AmlPath::ROOT,
            NameAnchor::Parent(hops) => {
                let mut base = *scope;
                for _ in 0..hops {
                    base.pop().ok_or(AmlError::UndefinedName(*self))?;
                }
                base
            }
        };
        for &seg in self.segments() {
            base.push(seg)?;
        }
        Ok(base)
    }
}

impl fmt::Debug for NameString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for NameString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchor {
            NameAnchor::Root => f.write_str("\\")?,
            NameAnchor::Parent(hops) => {
                for _ in 0..hops {
                    f.write_str("^")?;
                }
            }
        }
        write_segments(f, self.segments())
    }
}
