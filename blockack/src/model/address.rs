use core::fmt;

/// Link-layer station address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u32);

impl Address {
    /// Address used by frames meant for every station.
    pub const BROADCAST: Self = Self(u32::MAX);

    /// True for the all-stations address.
    pub const fn is_broadcast(&self) -> bool {
        self.0 == u32::MAX
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            f.write_str("sta*")
        } else {
            write!(f, "sta{}", self.0)
        }
    }
}
