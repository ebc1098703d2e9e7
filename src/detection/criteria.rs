//! Criteria Vector
//!
//! The five boolean performance signals evaluated per host per run.
//! Index order is fixed (1..=5) and drives every classification code.

use serde::{Deserialize, Serialize};

/// Number of criteria in a vector
pub const CRITERIA_COUNT: usize = 5;

/// One zombie criterion, in canonical index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    CpuDecrease,
    NetDecrease,
    SustainedLowCpu,
    ConstantRam,
    ProfileLost,
}

impl Criterion {
    pub const ALL: [Criterion; CRITERIA_COUNT] = [
        Criterion::CpuDecrease,
        Criterion::NetDecrease,
        Criterion::SustainedLowCpu,
        Criterion::ConstantRam,
        Criterion::ProfileLost,
    ];

    /// 1-based position in the vector
    pub fn index(self) -> usize {
        match self {
            Criterion::CpuDecrease => 1,
            Criterion::NetDecrease => 2,
            Criterion::SustainedLowCpu => 3,
            Criterion::ConstantRam => 4,
            Criterion::ProfileLost => 5,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    /// Field name used on host records coming from the metrics exporter
    pub fn wire_name(self) -> &'static str {
        match self {
            Criterion::CpuDecrease => "Recent_CPU_decrease_criterion",
            Criterion::NetDecrease => "Recent_net_traffic_decrease_criterion",
            Criterion::SustainedLowCpu => "Sustained_Low_CPU_criterion",
            Criterion::ConstantRam => "Excessively_constant_RAM_criterion",
            Criterion::ProfileLost => "Daily_CPU_profile_lost_criterion",
        }
    }

    /// Sentence fragment used to build classification descriptions
    pub fn phrase(self) -> &'static str {
        match self {
            Criterion::CpuDecrease => "Sudden drop in CPU usage detected",
            Criterion::NetDecrease => "Sharp drop in recent network traffic detected",
            Criterion::SustainedLowCpu => "CPU usage has stayed too low for a prolonged period",
            Criterion::ConstantRam => "RAM usage remains abnormally constant, without variation",
            Criterion::ProfileLost => "Expected daily CPU usage pattern is no longer followed",
        }
    }

    /// Short label for catalogue summaries
    pub fn label(self) -> &'static str {
        match self {
            Criterion::CpuDecrease => "recent CPU decrease",
            Criterion::NetDecrease => "recent network traffic decrease",
            Criterion::SustainedLowCpu => "sustained low CPU",
            Criterion::ConstantRam => "constant RAM",
            Criterion::ProfileLost => "lost daily CPU profile",
        }
    }

    fn bit(self) -> u8 {
        1 << (self.index() - 1)
    }
}

/// Five named booleans, one per criterion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CriteriaVector {
    pub cpu_decrease: bool,
    pub net_decrease: bool,
    pub sustained_low_cpu: bool,
    pub constant_ram: bool,
    pub profile_lost: bool,
}

impl CriteriaVector {
    pub fn new(
        cpu_decrease: bool,
        net_decrease: bool,
        sustained_low_cpu: bool,
        constant_ram: bool,
        profile_lost: bool,
    ) -> Self {
        Self {
            cpu_decrease,
            net_decrease,
            sustained_low_cpu,
            constant_ram,
            profile_lost,
        }
    }

    /// Build from a 5-bit mask, bit `i - 1` holding criterion `i`
    pub fn from_mask(mask: u8) -> Self {
        let mut vector = Self::default();
        for criterion in Criterion::ALL {
            vector.set(criterion, mask & criterion.bit() != 0);
        }
        vector
    }

    pub fn mask(&self) -> u8 {
        Criterion::ALL
            .iter()
            .filter(|c| self.get(**c))
            .fold(0u8, |mask, c| mask | c.bit())
    }

    pub fn get(&self, criterion: Criterion) -> bool {
        match criterion {
            Criterion::CpuDecrease => self.cpu_decrease,
            Criterion::NetDecrease => self.net_decrease,
            Criterion::SustainedLowCpu => self.sustained_low_cpu,
            Criterion::ConstantRam => self.constant_ram,
            Criterion::ProfileLost => self.profile_lost,
        }
    }

    pub fn set(&mut self, criterion: Criterion, value: bool) {
        match criterion {
            Criterion::CpuDecrease => self.cpu_decrease = value,
            Criterion::NetDecrease => self.net_decrease = value,
            Criterion::SustainedLowCpu => self.sustained_low_cpu = value,
            Criterion::ConstantRam => self.constant_ram = value,
            Criterion::ProfileLost => self.profile_lost = value,
        }
    }

    /// Active criteria in index order
    pub fn active(&self) -> Vec<Criterion> {
        Criterion::ALL.into_iter().filter(|c| self.get(*c)).collect()
    }

    pub fn active_count(&self) -> usize {
        self.mask().count_ones() as usize
    }
}

impl From<[bool; CRITERIA_COUNT]> for CriteriaVector {
    fn from(bits: [bool; CRITERIA_COUNT]) -> Self {
        Self::new(bits[0], bits[1], bits[2], bits[3], bits[4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_roundtrip_covers_all_vectors() {
        for mask in 0u8..32 {
            assert_eq!(CriteriaVector::from_mask(mask).mask(), mask);
        }
    }

    #[test]
    fn test_active_in_index_order() {
        let v = CriteriaVector::from([false, true, false, true, true]);
        assert_eq!(
            v.active(),
            vec![Criterion::NetDecrease, Criterion::ConstantRam, Criterion::ProfileLost]
        );
        assert_eq!(v.active_count(), 3);
    }

    #[test]
    fn test_index_lookup() {
        assert_eq!(Criterion::from_index(1), Some(Criterion::CpuDecrease));
        assert_eq!(Criterion::from_index(5), Some(Criterion::ProfileLost));
        assert_eq!(Criterion::from_index(0), None);
        assert_eq!(Criterion::from_index(6), None);
    }
}
