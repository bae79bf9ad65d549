//! Resource capacity arithmetic.

use serde::{Deserialize, Serialize};

/// Amounts of the four consumable node resources plus a public IPv4 count.
///
/// CRU is compute units, MRU memory bytes, SRU fast (SSD) storage bytes and
/// HRU bulk (HDD) storage bytes. The IPv4 count rides along for statistics
/// reports but takes no part in the arithmetic below: public IP usage is
/// tracked on the node and against the farm budget instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capacity {
    #[serde(rename = "CRU", default)]
    pub cru: u64,

    #[serde(rename = "MRU", default)]
    pub mru: u64,

    #[serde(rename = "SRU", default)]
    pub sru: u64,

    #[serde(rename = "HRU", default)]
    pub hru: u64,

    #[serde(rename = "ipv4", default)]
    pub ipv4: u64,
}

impl Capacity {
    pub const fn new(cru: u64, mru: u64, sru: u64, hru: u64) -> Self {
        Self {
            cru,
            mru,
            sru,
            hru,
            ipv4: 0,
        }
    }

    /// True when all four resource dimensions are zero.
    pub fn is_empty(&self) -> bool {
        self.cru == 0 && self.mru == 0 && self.sru == 0 && self.hru == 0
    }

    pub fn add(&mut self, other: &Capacity) {
        self.cru = self.cru.saturating_add(other.cru);
        self.mru = self.mru.saturating_add(other.mru);
        self.sru = self.sru.saturating_add(other.sru);
        self.hru = self.hru.saturating_add(other.hru);
    }

    /// `self - other`, each dimension saturating at zero.
    pub fn subtract(&self, other: &Capacity) -> Capacity {
        Capacity::new(
            self.cru.saturating_sub(other.cru),
            self.mru.saturating_sub(other.mru),
            self.sru.saturating_sub(other.sru),
            self.hru.saturating_sub(other.hru),
        )
    }

    /// `self - other`, or `None` if any dimension would underflow.
    pub fn checked_subtract(&self, other: &Capacity) -> Option<Capacity> {
        Some(Capacity::new(
            self.cru.checked_sub(other.cru)?,
            self.mru.checked_sub(other.mru)?,
            self.sru.checked_sub(other.sru)?,
            self.hru.checked_sub(other.hru)?,
        ))
    }

    /// True when every dimension of `self` fits inside `available`.
    pub fn fits_within(&self, available: &Capacity) -> bool {
        self.cru <= available.cru
            && self.mru <= available.mru
            && self.sru <= available.sru
            && self.hru <= available.hru
    }

    /// Sum of the four resource dimensions, used for farm-wide usage ratios.
    pub fn sum(&self) -> u64 {
        self.cru
            .saturating_add(self.mru)
            .saturating_add(self.sru)
            .saturating_add(self.hru)
    }
}

/// Total and used capacity of a node plus its compute over-provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumableResources {
    /// How far compute may be oversold, in [1, 4].
    #[serde(
        rename = "overProvisionCPU",
        alias = "OverProvisionCPU",
        default = "default_over_provision"
    )]
    pub over_provision_cpu: f64,

    pub total: Capacity,

    #[serde(default)]
    pub used: Capacity,
}

fn default_over_provision() -> f64 {
    1.0
}

impl Default for ConsumableResources {
    fn default() -> Self {
        Self {
            over_provision_cpu: default_over_provision(),
            total: Capacity::default(),
            used: Capacity::default(),
        }
    }
}

impl ConsumableResources {
    pub fn new(total: Capacity) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Total capacity with compute scaled by the over-provision factor.
    pub fn effective_total(&self) -> Capacity {
        let mut total = self.total;
        total.cru = (total.cru as f64 * self.over_provision_cpu).ceil() as u64;
        total
    }

    /// Capacity still claimable.
    pub fn free(&self) -> Capacity {
        self.effective_total().subtract(&self.used)
    }
}

/// A statistics report from a node agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatistics {
    pub total: Capacity,
    pub used: Capacity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty_ignores_ipv4() {
        let mut cap = Capacity::default();
        assert!(cap.is_empty());
        cap.ipv4 = 3;
        assert!(cap.is_empty());
        cap.hru = 1;
        assert!(!cap.is_empty());
    }

    #[test]
    fn test_add_and_subtract() {
        let mut cap = Capacity::new(1, 2, 3, 4);
        cap.add(&Capacity::new(1, 1, 1, 1));
        assert_eq!(cap, Capacity::new(2, 3, 4, 5));
        assert_eq!(cap.subtract(&Capacity::new(2, 3, 4, 5)), Capacity::default());
    }

    #[test]
    fn test_subtract_saturates() {
        let cap = Capacity::new(1, 1, 1, 1);
        let result = cap.subtract(&Capacity::new(2, 0, 5, 1));
        assert_eq!(result, Capacity::new(0, 1, 0, 0));
        assert_eq!(cap.checked_subtract(&Capacity::new(2, 0, 0, 0)), None);
        assert_eq!(
            cap.checked_subtract(&Capacity::new(1, 0, 0, 0)),
            Some(Capacity::new(0, 1, 1, 1))
        );
    }

    #[test]
    fn test_effective_total_rounds_compute_up() {
        let mut resources = ConsumableResources::new(Capacity::new(3, 8, 8, 8));
        resources.over_provision_cpu = 1.5;
        // ceil(3 * 1.5) = 5
        assert_eq!(resources.effective_total().cru, 5);
        assert_eq!(resources.effective_total().mru, 8);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::json!({"CRU": 4, "MRU": 8, "SRU": 16, "HRU": 32, "ipv4": 1});
        let cap: Capacity = serde_json::from_value(json).unwrap();
        assert_eq!(cap.cru, 4);
        assert_eq!(cap.hru, 32);
        assert_eq!(cap.ipv4, 1);
    }

    #[test]
    fn test_missing_over_provision_defaults_to_one() {
        let json = serde_json::json!({"total": {"CRU": 1, "MRU": 1, "SRU": 1, "HRU": 1}});
        let resources: ConsumableResources = serde_json::from_value(json).unwrap();
        assert_eq!(resources.over_provision_cpu, 1.0);
        assert!(resources.used.is_empty());
    }
}
