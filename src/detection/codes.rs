//! Classification code catalogue
//!
//! Fixed, versioned table of the 32 criteria combinations. Each entry lists the
//! active criterion indices it stands for; the lookup index keyed by 5-bit mask
//! is built once on first use.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

use super::criteria::{CriteriaVector, Criterion, CRITERIA_COUNT};

pub const NO_ZOMBIE_CODE: &str = "0";
pub const NO_ZOMBIE_DESCRIPTION: &str = "No zombie criteria active";

/// One classification code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeInfo {
    pub code: &'static str,
    pub alias: &'static str,
    /// Active criterion indices (1-based, ascending)
    pub indices: &'static [usize],
}

impl CodeInfo {
    pub fn criteria(&self) -> Vec<Criterion> {
        self.indices.iter().filter_map(|i| Criterion::from_index(*i)).collect()
    }

    pub fn criteria_count(&self) -> usize {
        self.indices.len()
    }

    fn mask(&self) -> u8 {
        self.indices.iter().fold(0u8, |mask, i| mask | 1 << (i - 1))
    }
}

const fn entry(code: &'static str, alias: &'static str, indices: &'static [usize]) -> CodeInfo {
    CodeInfo { code, alias, indices }
}

/// Canonical order: by criteria count, then by letter
pub static CODE_TABLE: [CodeInfo; 32] = [
    entry("0", "No Zombie Detected", &[]),
    entry("1A", "Zombie", &[1]),
    entry("1B", "Walker", &[2]),
    entry("1C", "Crawler", &[3]),
    entry("1D", "Lurker", &[4]),
    entry("1E", "Sleeper", &[5]),
    entry("2A", "Mummy", &[1, 2]),
    entry("2B", "Wraith", &[1, 3]),
    entry("2C", "Vampire", &[1, 4]),
    entry("2D", "Banshee", &[1, 5]),
    entry("2E", "Phantom", &[2, 3]),
    entry("2F", "Specter", &[2, 4]),
    entry("2G", "Shade", &[2, 5]),
    entry("2H", "Poltergeist", &[3, 4]),
    entry("2I", "Spirit", &[3, 5]),
    entry("2J", "Apparition", &[4, 5]),
    entry("3A", "Solomon", &[1, 2, 3]),
    entry("3B", "Bud", &[1, 2, 4]),
    entry("3C", "Tarman", &[1, 2, 5]),
    entry("3D", "Ben", &[1, 3, 4]),
    entry("3E", "Fido", &[1, 3, 5]),
    entry("3F", "Bloater", &[1, 4, 5]),
    entry("3G", "Shambler", &[2, 3, 4]),
    entry("3H", "Stalker", &[2, 3, 5]),
    entry("3I", "Zeus", &[2, 4, 5]),
    entry("3J", "Wights", &[3, 4, 5]),
    entry("4A", "Nemesis", &[2, 3, 4, 5]),
    entry("4B", "Clicker", &[1, 3, 4, 5]),
    entry("4C", "Revenant", &[1, 2, 4, 5]),
    entry("4D", "Ghoul", &[1, 2, 3, 5]),
    entry("4E", "Gael", &[1, 2, 3, 4]),
    entry("5", "Coloso", &[1, 2, 3, 4, 5]),
];

struct CodeIndex {
    by_mask: [usize; 32],
    by_code: HashMap<&'static str, usize>,
    descriptions: [String; 32],
}

static INDEX: Lazy<CodeIndex> = Lazy::new(|| {
    let mut by_mask = [0usize; 32];
    let mut by_code = HashMap::with_capacity(CODE_TABLE.len());

    for (position, info) in CODE_TABLE.iter().enumerate() {
        debug_assert_eq!(code_for_indices(info.indices), info.code);
        by_mask[info.mask() as usize] = position;
        by_code.insert(info.code, position);
    }

    let descriptions = std::array::from_fn(|mask| describe(&CriteriaVector::from_mask(mask as u8)));

    CodeIndex { by_mask, by_code, descriptions }
});

fn describe(vector: &CriteriaVector) -> String {
    let parts: Vec<&str> = vector.active().into_iter().map(Criterion::phrase).collect();
    if parts.is_empty() {
        NO_ZOMBIE_DESCRIPTION.to_string()
    } else {
        parts.join(", ")
    }
}

/// Code assignment rule for a set of active indices (1-based, ascending).
///
/// Single and quadruple combinations are lettered by the active / missing
/// index; pairs and triples by their rank in lexicographic order among all
/// combinations of the same size.
pub fn code_for_indices(active: &[usize]) -> String {
    let n = active.len();
    match n {
        0 => NO_ZOMBIE_CODE.to_string(),
        1 => format!("1{}", letter(active[0] - 1)),
        4 => {
            let missing = (1..=CRITERIA_COUNT)
                .find(|i| !active.contains(i))
                .unwrap_or(CRITERIA_COUNT);
            format!("4{}", letter(missing - 1))
        }
        5 => "5".to_string(),
        _ => {
            let rank = combinations(n)
                .iter()
                .position(|combo| combo.as_slice() == active)
                .unwrap_or(0);
            format!("{}{}", n, letter(rank))
        }
    }
}

/// All `C(5, k)` index tuples in ascending lexicographic order
pub fn combinations(k: usize) -> Vec<Vec<usize>> {
    fn extend(start: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..=CRITERIA_COUNT {
            current.push(i);
            extend(i + 1, k, current, out);
            current.pop();
        }
    }

    let mut out = Vec::new();
    extend(1, k, &mut Vec::with_capacity(k), &mut out);
    out
}

fn letter(rank: usize) -> char {
    (b'A' + rank as u8) as char
}

/// Catalogue entry for a criteria vector
pub fn lookup(vector: &CriteriaVector) -> &'static CodeInfo {
    &CODE_TABLE[INDEX.by_mask[vector.mask() as usize]]
}

/// Pre-built description for a criteria vector
pub fn description(vector: &CriteriaVector) -> &'static str {
    INDEX.descriptions[vector.mask() as usize].as_str()
}

/// Catalogue entry by code string
pub fn find(code: &str) -> Option<&'static CodeInfo> {
    INDEX.by_code.get(code).map(|position| &CODE_TABLE[*position])
}

/// Alias for a code; unknown codes alias to themselves
pub fn alias_for(code: &str) -> &str {
    find(code).map(|info| info.alias).unwrap_or(code)
}

pub fn all_codes() -> impl Iterator<Item = &'static str> {
    CODE_TABLE.iter().map(|info| info.code)
}

pub fn is_known_code(code: &str) -> bool {
    find(code).is_some()
}

/// Criterion wire names for a code
pub fn criteria_for_code(code: &str) -> Option<Vec<&'static str>> {
    find(code).map(|info| info.criteria().into_iter().map(Criterion::wire_name).collect())
}

/// `{criteria count: {code: alias}}`
pub fn codes_by_criteria_count() -> BTreeMap<usize, BTreeMap<&'static str, &'static str>> {
    let mut grouped: BTreeMap<usize, BTreeMap<&'static str, &'static str>> = BTreeMap::new();
    for info in CODE_TABLE.iter() {
        grouped
            .entry(info.criteria_count())
            .or_default()
            .insert(info.code, info.alias);
    }
    grouped
}

/// Human summary of what a code stands for
pub fn code_summary(info: &CodeInfo) -> String {
    let labels: Vec<&str> = info.criteria().into_iter().map(Criterion::label).collect();
    match labels.len() {
        0 => "No zombie criteria detected - host is operating normally".to_string(),
        CRITERIA_COUNT => "All five zombie criteria detected - critical zombie state".to_string(),
        4 => {
            let missing = Criterion::ALL
                .into_iter()
                .find(|c| !info.indices.contains(&c.index()))
                .map(Criterion::label)
                .unwrap_or_default();
            format!("All criteria except {} detected", missing)
        }
        1 => capitalize(&format!("{} detected", labels[0])),
        _ => match labels.split_last() {
            Some((last, rest)) => capitalize(&format!("{} and {} detected", rest.join(", "), last)),
            None => String::new(),
        },
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_assignment_rule() {
        for info in CODE_TABLE.iter() {
            assert_eq!(code_for_indices(info.indices), info.code, "alias {}", info.alias);
        }
    }

    #[test]
    fn test_combination_counts() {
        assert_eq!(combinations(2).len(), 10);
        assert_eq!(combinations(3).len(), 10);
        assert_eq!(combinations(2)[4], vec![2, 3]);
        assert_eq!(combinations(3)[9], vec![3, 4, 5]);
    }

    #[test]
    fn test_find_and_alias() {
        assert_eq!(find("4D").map(|i| i.alias), Some("Ghoul"));
        assert_eq!(alias_for("2A"), "Mummy");
        assert_eq!(alias_for("9Z"), "9Z");
        assert!(!is_known_code("6"));
    }

    #[test]
    fn test_grouping_sizes() {
        let grouped = codes_by_criteria_count();
        let sizes: Vec<usize> = grouped.values().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![1, 5, 10, 10, 5, 1]);
    }

    #[test]
    fn test_code_summaries() {
        assert_eq!(
            code_summary(find("2A").unwrap()),
            "Recent CPU decrease and recent network traffic decrease detected"
        );
        assert_eq!(
            code_summary(find("3J").unwrap()),
            "Sustained low CPU, constant RAM and lost daily CPU profile detected"
        );
        assert_eq!(
            code_summary(find("4C").unwrap()),
            "All criteria except sustained low CPU detected"
        );
    }

    #[test]
    fn test_criteria_for_code() {
        assert_eq!(
            criteria_for_code("2J"),
            Some(vec!["Excessively_constant_RAM_criterion", "Daily_CPU_profile_lost_criterion"])
        );
        assert_eq!(criteria_for_code("0"), Some(vec![]));
        assert_eq!(criteria_for_code("nope"), None);
    }
}
