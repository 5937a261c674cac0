//! Node registry
//!
//! One bit per node address, set when a `PONG` from that address is heard.

/// Bitmap of discovered node addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRegistry {
    bits: [u8; 32],
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `address` as present, returning `true` if it was not known before
    pub fn register(&mut self, address: u8) -> bool {
        let (index, mask) = Self::locate(address);
        let fresh = self.bits[index] & mask == 0;
        self.bits[index] |= mask;
        fresh
    }

    pub fn contains(&self, address: u8) -> bool {
        let (index, mask) = Self::locate(address);
        self.bits[index] & mask != 0
    }

    /// Number of known nodes
    pub fn len(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Known addresses in ascending order
    pub fn addresses(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&a| self.contains(a))
    }

    /// Raw bitmap, byte `a / 8`, bit `a % 8`
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bits
    }

    fn locate(address: u8) -> (usize, u8) {
        ((address / 8) as usize, 1 << (address % 8))
    }
}
