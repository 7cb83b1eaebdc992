use std::ops::Add;

/// An index into a byte within an ELF file.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Offset(pub u64);

/// The address of a byte in the process that cored. These are normally associated with
/// one of the load segments in the core file.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct VirtualAddr(pub u64);

/// A range of bytes that can be addressed using either offsets into an ELF file or
/// virtual addresses. Sizes are u64 because guard regions can be larger than the
/// converting host's address space.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Bytes<A>
where
    A: Add<u64, Output = A> + Copy + Ord,
{
    pub start: A,
    pub size: u64,
}

impl Bytes<Offset> {
    pub fn from_raw(start: u64, size: u64) -> Self {
        Bytes {
            start: Offset(start),
            size,
        }
    }
}

impl Bytes<VirtualAddr> {
    pub fn from_raw(start: u64, size: u64) -> Self {
        Bytes {
            start: VirtualAddr(start),
            size,
        }
    }
}

impl<A: Add<u64, Output = A> + Copy + Ord> Bytes<A> {
    /// True if all of other lies within self. An empty other is covered if its start
    /// is within (or at the end of) self.
    pub fn covers(&self, other: &Bytes<A>) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }

    pub fn end(&self) -> A {
        self.start + self.size
    }
}

impl Add<u64> for VirtualAddr {
    type Output = VirtualAddr;

    fn add(self, rhs: u64) -> Self::Output {
        VirtualAddr(self.0.saturating_add(rhs))
    }
}

impl Add<u64> for Offset {
    type Output = Offset;

    fn add(self, rhs: u64) -> Self::Output {
        Offset(self.0.saturating_add(rhs))
    }
}
