use crate::error::{BasinError, BasinResult};
use crate::vector::WatershedSelector;
use std::fmt;
use std::str::FromStr;

/// Accepted watershed code lengths
pub const REGION_LENGTHS: [usize; 4] = [4, 8, 10, 12];

/// A validated watershed code such as `1701020301`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionId(String);

impl RegionId {
    pub fn new(code: &str) -> BasinResult<Self> {
        let code = code.trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(BasinError::InvalidInput(format!(
                "Invalid watershed code \"{}\": must contain digits only",
                code
            )));
        }
        if !REGION_LENGTHS.contains(&code.len()) {
            return Err(BasinError::InvalidInput(format!(
                "Invalid watershed code \"{}\": must be 4, 8, 10 or 12 digits long",
                code
            )));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Leading `n` digits, or the whole code when it is shorter
    pub fn prefix(&self, n: usize) -> &str {
        &self.0[..n.min(self.0.len())]
    }

    /// Four digit unit whose hydrography archive contains this region
    pub fn huc4(&self) -> &str {
        self.prefix(4)
    }

    /// Boundary layer for this code length, e.g. `WBDHU10`
    pub fn boundary_layer(&self) -> String {
        format!("WBDHU{}", self.len())
    }

    /// Attribute holding the code in the boundary layer, e.g. `HUC10`
    pub fn boundary_field(&self) -> String {
        format!("HUC{}", self.len())
    }

    pub fn selector(&self) -> WatershedSelector {
        WatershedSelector {
            layer: self.boundary_layer(),
            field: self.boundary_field(),
            code: self.0.clone(),
            reach_prefix: self.prefix(8).to_string(),
        }
    }
}

impl FromStr for RegionId {
    type Err = BasinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_supported_lengths() {
        for code in ["1701", "17010203", "1701020301", "170102030101"] {
            assert!(RegionId::new(code).is_ok(), "{}", code);
        }
    }

    #[test]
    fn rejects_bad_codes() {
        for code in ["", "17010", "17010203a1", "1701020301010"] {
            assert!(matches!(RegionId::new(code), Err(BasinError::InvalidInput(_))), "{}", code);
        }
    }

    #[test]
    fn derived_keys() {
        let region: RegionId = "1701020301".parse().unwrap();
        assert_eq!(region.huc4(), "1701");
        assert_eq!(region.boundary_layer(), "WBDHU10");
        assert_eq!(region.boundary_field(), "HUC10");
        assert_eq!(region.selector().reach_prefix, "17010203");

        let small = RegionId::new("1701").unwrap();
        assert_eq!(small.selector().reach_prefix, "1701");
    }
}
