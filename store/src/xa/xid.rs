//! Transaction identifiers, flags and status codes of the XA protocol.

use std::fmt;

/// A global transaction branch identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    pub format_id: i32,
    pub global_id: Vec<u8>,
    pub branch_qualifier: Vec<u8>,
}

impl Xid {
    #[must_use]
    pub fn new(format_id: i32, global_id: impl Into<Vec<u8>>, branch_qualifier: impl Into<Vec<u8>>) -> Self {
        Self {
            format_id,
            global_id: global_id.into(),
            branch_qualifier: branch_qualifier.into(),
        }
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.format_id)?;
        for byte in &self.global_id {
            write!(f, "{byte:02x}")?;
        }
        f.write_str(":")?;
        for byte in &self.branch_qualifier {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Flags passed to `start`, `end` and `recover`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct XaFlags(pub u32);

impl XaFlags {
    pub const NO_FLAGS: Self = Self(0);
    pub const END_RSCAN: Self = Self(0x0080_0000);
    pub const START_RSCAN: Self = Self(0x0100_0000);
    pub const SUSPEND: Self = Self(0x0200_0000);
    pub const SUCCESS: Self = Self(0x0400_0000);
    pub const RESUME: Self = Self(0x0800_0000);
    pub const FAIL: Self = Self(0x2000_0000);
    pub const ONE_PHASE: Self = Self(0x4000_0000);
    pub const JOIN: Self = Self(0x0020_0000);

    const NAMED: [(Self, &'static str); 8] = [
        (Self::END_RSCAN, "TMENDRSCAN"),
        (Self::FAIL, "TMFAIL"),
        (Self::JOIN, "TMJOIN"),
        (Self::ONE_PHASE, "TMONEPHASE"),
        (Self::RESUME, "TMRESUME"),
        (Self::START_RSCAN, "TMSTARTRSCAN"),
        (Self::SUCCESS, "TMSUCCESS"),
        (Self::SUSPEND, "TMSUSPEND"),
    ];

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for XaFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NO_FLAGS {
            return f.write_str("TMNOFLAGS");
        }
        let mut remaining = self.0;
        let mut names = Vec::new();
        for (flag, name) in Self::NAMED {
            if self.contains(flag) {
                names.push(name.to_string());
                remaining &= !flag.0;
            }
        }
        if remaining != 0 {
            names.push(format!("{remaining:#x}"));
        }
        f.write_str(&names.join(","))
    }
}

/// Failures reported to the transaction manager, each with its XA code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XaError {
    /// `XA_RBROLLBACK`: the branch was marked rollback-only or failed to prepare.
    RollbackOnly,
    /// `XAER_RMERR`: the resource manager hit an error.
    ResourceManagerError,
    /// `XAER_NOTA`: the xid is not the one this resource is working on.
    NotA,
    /// `XAER_INVAL`: invalid arguments.
    Invalid,
    /// `XAER_PROTO`: call made out of protocol order.
    Protocol,
    /// `XAER_RMFAIL`: the resource manager is unavailable.
    ResourceManagerFailure,
}

impl XaError {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::RollbackOnly => 100,
            Self::ResourceManagerError => -3,
            Self::NotA => -4,
            Self::Invalid => -5,
            Self::Protocol => -6,
            Self::ResourceManagerFailure => -7,
        }
    }
}

impl fmt::Display for XaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RollbackOnly => "XA_RBROLLBACK",
            Self::ResourceManagerError => "XAER_RMERR",
            Self::NotA => "XAER_NOTA",
            Self::Invalid => "XAER_INVAL",
            Self::Protocol => "XAER_PROTO",
            Self::ResourceManagerFailure => "XAER_RMFAIL",
        };
        write!(f, "{name} ({})", self.code())
    }
}

impl std::error::Error for XaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_formatting() {
        assert_eq!(XaFlags::NO_FLAGS.to_string(), "TMNOFLAGS");
        assert_eq!(XaFlags::JOIN.to_string(), "TMJOIN");
        assert_eq!(
            XaFlags(XaFlags::SUCCESS.0 | XaFlags::FAIL.0 | 0x3).to_string(),
            "TMFAIL,TMSUCCESS,0x3"
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(XaError::RollbackOnly.code(), 100);
        assert_eq!(XaError::ResourceManagerFailure.code(), -7);
        assert_eq!(XaError::NotA.to_string(), "XAER_NOTA (-4)");
    }
}
