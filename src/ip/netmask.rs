use std::fmt::Debug;
use std::net::Ipv4Addr;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NetworkV4 {
    address: Ipv4Addr,
    mask: Ipv4Addr,
}

impl Debug for NetworkV4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = u32::from(self.mask);

        if mask.leading_ones() + mask.trailing_zeros() == 32 {
            write!(f, "{}/{}", self.address, mask.leading_ones())
        } else {
            write!(f, "{}/{}", self.address, self.mask)
        }
    }
}

impl NetworkV4 {
    pub const fn from_prefix(addr: Ipv4Addr, prefix: u8) -> Self {
        let bits = 32u32.saturating_sub(prefix as u32);
        let mask = if bits < 32 { !0u32 >> bits << bits } else { 0 };
        let [a, b, c, d] = mask.to_be_bytes();

        Self {
            address: addr,
            mask: Ipv4Addr::new(a, b, c, d),
        }
    }

    pub fn in_range(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        (u32::from(self.address) & mask) == (u32::from(addr) & mask)
    }
}

const fn net(a: u8, b: u8, c: u8, d: u8, prefix: u8) -> NetworkV4 {
    NetworkV4::from_prefix(Ipv4Addr::new(a, b, c, d), prefix)
}

/// Blocks that can never be the public address of a host on the internet.
/// The documentation blocks (TEST-NET-1/2/3) are deliberately absent.
const NON_GLOBAL_V4: [NetworkV4; 12] = [
    net(0, 0, 0, 0, 8),          // "this" network
    net(10, 0, 0, 0, 8),         // private
    net(100, 64, 0, 0, 10),      // shared address space (CGNAT)
    net(127, 0, 0, 0, 8),        // loopback
    net(169, 254, 0, 0, 16),     // link-local
    net(172, 16, 0, 0, 12),      // private
    net(192, 0, 0, 0, 24),       // IETF protocol assignments
    net(192, 168, 0, 0, 16),     // private
    net(198, 18, 0, 0, 15),      // benchmarking
    net(224, 0, 0, 0, 4),        // multicast
    net(240, 0, 0, 0, 4),        // reserved
    net(255, 255, 255, 255, 32), // limited broadcast
];

/// Whether `addr` may be published as the host's public address.
pub fn is_global_v4(addr: Ipv4Addr) -> bool {
    !NON_GLOBAL_V4.iter().any(|network| network.in_range(addr))
}
