//! Zombie Classifier
//!
//! Pure mapping from a criteria vector to its classification code.
//! Input: CriteriaVector (already normalised to booleans)
//! Output: Classification

use serde::Serialize;

use super::codes;
use super::criteria::CriteriaVector;

/// Result of classifying one criteria vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub code: &'static str,
    pub alias: &'static str,
    pub description: &'static str,
}

impl Classification {
    pub fn is_no_zombie(&self) -> bool {
        self.code == codes::NO_ZOMBIE_CODE
    }
}

/// Classify a criteria vector. Total over all 32 inputs.
pub fn classify(vector: &CriteriaVector) -> Classification {
    let info = codes::lookup(vector);
    Classification {
        code: info.code,
        alias: info.alias,
        description: codes::description(vector),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn v(bits: [u8; 5]) -> CriteriaVector {
        CriteriaVector::from(bits.map(|b| b == 1))
    }

    #[test]
    fn test_reference_vectors() {
        assert_eq!(classify(&v([1, 1, 0, 0, 0])).code, "2A");
        assert_eq!(classify(&v([0, 0, 0, 0, 0])).code, "0");
        assert_eq!(classify(&v([1, 1, 1, 1, 0])).code, "4E");
        assert_eq!(classify(&v([1, 1, 1, 1, 1])).code, "5");
    }

    #[test]
    fn test_single_criterion_letters() {
        assert_eq!(classify(&v([1, 0, 0, 0, 0])).code, "1A");
        assert_eq!(classify(&v([0, 0, 0, 0, 1])).code, "1E");
    }

    #[test]
    fn test_aliases() {
        assert_eq!(classify(&v([1, 1, 0, 0, 0])).alias, "Mummy");
        assert_eq!(classify(&v([0, 1, 1, 1, 1])).alias, "Nemesis");
        assert_eq!(classify(&v([1, 1, 1, 1, 1])).alias, "Coloso");
        assert_eq!(classify(&v([0, 0, 0, 0, 0])).alias, "No Zombie Detected");
    }

    #[test]
    fn test_description_joins_active_phrases() {
        let c = classify(&v([1, 0, 1, 0, 0]));
        assert_eq!(c.code, "2B");
        assert_eq!(
            c.description,
            "Sudden drop in CPU usage detected, CPU usage has stayed too low for a prolonged period"
        );
        assert_eq!(classify(&v([0, 0, 0, 0, 0])).description, codes::NO_ZOMBIE_DESCRIPTION);
    }

    #[test]
    fn test_reclassification_is_stable() {
        for mask in 0u8..32 {
            let vector = CriteriaVector::from_mask(mask);
            assert_eq!(classify(&vector), classify(&vector));
        }
    }
}
