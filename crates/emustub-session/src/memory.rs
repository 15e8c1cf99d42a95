//! Memory layout of an emulation session.

use std::ops::Range;

use crate::engine::Permissions;
use crate::error::{Error, Result};

/// Size of an emulated memory page.
pub const PAGE_SIZE: u64 = 0x1000;

/// Memory area declared by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryArea {
    /// Start address.
    pub base: u64,

    /// Size in bytes.
    pub size: u64,

    /// Access permissions.
    pub permissions: Permissions,
}

impl MemoryArea {
    /// Returns the address range of this area.
    pub fn range(&self) -> Range<u64> {
        self.base..self.base + self.size
    }
}

/// Stack of the emulated program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    /// Lowest address of the stack.
    pub base: u64,

    /// Size in bytes.
    pub size: u64,
}

impl StackRegion {
    /// Returns the initial stack pointer (top of the stack).
    pub fn top(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    /// Returns the address range of the stack.
    pub fn range(&self) -> Range<u64> {
        self.base..self.top()
    }
}

/// Initial memory content, written once the layout is mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryContent {
    /// Address of the first byte.
    pub address: u64,

    /// Raw bytes.
    pub bytes: Vec<u8>,
}

/// Page-aligned region to map into an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingRequest {
    /// Page-aligned base address.
    pub base: u64,

    /// Page-aligned size.
    pub size: u64,

    /// Access permissions.
    pub permissions: Permissions,
}

impl MappingRequest {
    /// Returns the address range of this request.
    pub fn range(&self) -> Range<u64> {
        self.base..self.base + self.size
    }
}

/// Declared memory layout: a stack plus user areas and contents.
#[derive(Debug, Clone)]
pub struct MemoryRegionTable {
    stack: StackRegion,
    areas: Vec<MemoryArea>,
    contents: Vec<MemoryContent>,
    frozen: bool,
}

impl MemoryRegionTable {
    /// Creates a new table with the given stack.
    pub fn new(stack_base: u64, stack_size: u64) -> Self {
        Self {
            stack: StackRegion {
                base: stack_base,
                size: stack_size,
            },
            areas: Vec::new(),
            contents: Vec::new(),
            frozen: false,
        }
    }

    /// Returns the stack region.
    pub fn stack(&self) -> StackRegion {
        self.stack
    }

    /// Returns the declared areas, in declaration order.
    pub fn areas(&self) -> &[MemoryArea] {
        &self.areas
    }

    /// Returns the declared contents, in declaration order.
    pub fn contents(&self) -> &[MemoryContent] {
        &self.contents
    }

    /// Returns whether the table was committed to an engine.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Declares a readable, writable and executable memory area.
    pub fn declare_area(&mut self, base: u64, size: u64) -> Result<()> {
        self.declare_area_with_permissions(base, size, Permissions::ALL)
    }

    /// Declares a memory area with explicit permissions.
    pub fn declare_area_with_permissions(
        &mut self,
        base: u64,
        size: u64,
        permissions: Permissions,
    ) -> Result<()> {
        if self.frozen {
            return Err(Error::MemoryTableFrozen);
        }

        if size == 0 || base.checked_add(size).is_none() {
            return Err(Error::InvalidSize { base, size });
        }

        self.areas.push(MemoryArea {
            base,
            size,
            permissions,
        });

        Ok(())
    }

    /// Declares initial memory content.
    pub fn declare_content(&mut self, address: u64, bytes: impl Into<Vec<u8>>) -> Result<()> {
        if self.frozen {
            return Err(Error::MemoryTableFrozen);
        }

        let bytes = bytes.into();

        if bytes.is_empty() {
            return Err(Error::EmptyContent(address));
        }

        self.contents.push(MemoryContent { address, bytes });

        Ok(())
    }

    /// Computes the page-aligned mapping requests of the layout.
    ///
    /// The stack comes first, then every area in declaration order. Each
    /// request is the smallest page-aligned superset of its region.
    pub fn commit(&self, page_size: u64) -> Result<Vec<MappingRequest>> {
        let stack = aligned(self.stack.base, self.stack.size, page_size).ok_or(
            Error::InvalidSize {
                base: self.stack.base,
                size: self.stack.size,
            },
        )?;

        let mut requests = vec![MappingRequest {
            base: stack.start,
            size: stack.end - stack.start,
            permissions: Permissions::READ | Permissions::WRITE,
        }];

        for area in &self.areas {
            let range = aligned(area.base, area.size, page_size).ok_or(Error::InvalidSize {
                base: area.base,
                size: area.size,
            })?;

            if let Some(other) = requests
                .iter()
                .find(|r| r.base < range.end && range.start < r.base + r.size)
            {
                return Err(Error::OverlappingArea {
                    first: other.range(),
                    second: range,
                });
            }

            requests.push(MappingRequest {
                base: range.start,
                size: range.end - range.start,
                permissions: area.permissions,
            });
        }

        Ok(requests)
    }

    /// Checks that every content block lands inside the stack or one area.
    pub fn check_contents(&self) -> Result<()> {
        self.contents.iter().try_for_each(|content| {
            let start = content.address;
            let end = start.saturating_add(content.bytes.len() as u64);

            if self.validate_range(start, end) {
                Ok(())
            } else {
                Err(Error::OutOfBounds { start, end })
            }
        })
    }

    /// Returns whether `[start, end)` lies within the stack or within a
    /// single declared area.
    pub fn validate_range(&self, start: u64, end: u64) -> bool {
        if end < start {
            return false;
        }

        let within = |r: Range<u64>| r.start <= start && end <= r.end;

        within(self.stack.range()) || self.areas.iter().any(|a| within(a.range()))
    }

    /// Freezes the table once committed to an engine.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }
}

fn aligned(base: u64, size: u64, page_size: u64) -> Option<Range<u64>> {
    if size == 0 || page_size == 0 {
        return None;
    }

    let start = base - base % page_size;
    let end = base.checked_add(size)?.checked_next_multiple_of(page_size)?;

    Some(start..end)
}
