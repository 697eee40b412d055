use super::JoinError;

/// First DevAddr handed out by the harness.
pub const DEV_ADDR_FIRST: u32 = 0xFFFF_0000;
/// Last usable DevAddr, `0xFFFFFFFF` is never allocated.
pub const DEV_ADDR_LAST: u32 = 0xFFFF_FFFE;

/// Hands out device addresses from a counter that never wraps.
#[derive(Debug, Clone)]
pub struct DevAddrAllocator {
    next: Option<u32>,
    last: u32,
}

impl Default for DevAddrAllocator {
    fn default() -> Self {
        Self::with_range(DEV_ADDR_FIRST, DEV_ADDR_LAST)
    }
}

impl DevAddrAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator over `first..=last`.
    pub fn with_range(first: u32, last: u32) -> Self {
        DevAddrAllocator { next: Some(first), last }
    }

    pub fn allocate(&mut self) -> Result<u32, JoinError> {
        let addr = self.next.filter(|a| *a <= self.last).ok_or(JoinError::AddressSpaceExhausted)?;
        self.next = addr.checked_add(1);
        Ok(addr)
    }

    /// Number of addresses still available.
    pub fn remaining(&self) -> u64 {
        match self.next {
            Some(next) if next <= self.last => u64::from(self.last - next) + 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counts_up_from_first() {
        let mut alloc = DevAddrAllocator::new();
        assert_eq!(alloc.allocate().unwrap(), 0xFFFF_0000);
        assert_eq!(alloc.allocate().unwrap(), 0xFFFF_0001);
        assert_eq!(alloc.remaining(), 0xFFFF - 2);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut alloc = DevAddrAllocator::with_range(DEV_ADDR_LAST - 1, DEV_ADDR_LAST);
        assert_eq!(alloc.allocate().unwrap(), DEV_ADDR_LAST - 1);
        assert_eq!(alloc.allocate().unwrap(), DEV_ADDR_LAST);
        assert_eq!(alloc.allocate(), Err(JoinError::AddressSpaceExhausted));
        assert_eq!(alloc.allocate(), Err(JoinError::AddressSpaceExhausted));
        assert_eq!(alloc.remaining(), 0);
    }

    #[test]
    fn does_not_wrap_at_u32_max() {
        let mut alloc = DevAddrAllocator::with_range(u32::MAX, u32::MAX);
        assert_eq!(alloc.allocate().unwrap(), u32::MAX);
        assert_eq!(alloc.allocate(), Err(JoinError::AddressSpaceExhausted));
    }
}
