//! Aura tier table. Ten contiguous half-open point ranges, each 100 wide,
//! with the last tier open-ended. Boundary values belong to the upper tier,
//! so 100 points is already Sustainer.

use serde::{Deserialize, Serialize};

const TIER_WIDTH: u64 = 100;

const TIERS: [(&str, &str); 10] = [
    ("Initiator", "#00FF00"),
    ("Sustainer", "#FFD700"),
    ("Visionary", "#1E90FF"),
    ("Creator", "#FF00FF"),
    ("Innovator", "#FF0000"),
    ("Accelerator", "#FFA500"),
    ("Transformer", "#8B0000"),
    ("Healer", "#40E0D0"),
    ("Orchestrator", "#C0C0C0"),
    ("Harmoniser", "#800080"),
];

const SUB_LEVELS: [&str; 4] = ["I", "II", "III", "IV"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuraTier {
    pub level: &'static str,
    pub sub_level: &'static str,
    pub color: &'static str,
}

/// Pure lookup from cumulative points to tier. Total over all of `u64`:
/// everything at or above 900 is Harmoniser. The sub-level is the 25-point
/// quartile within the tier, clamped to IV inside the open-ended top tier.
pub fn level_for(points: u64) -> AuraTier {
    let index = ((points / TIER_WIDTH) as usize).min(TIERS.len() - 1);
    let (level, color) = TIERS[index];

    let within = points - (index as u64) * TIER_WIDTH;
    let quartile = ((within / 25) as usize).min(SUB_LEVELS.len() - 1);

    AuraTier {
        level,
        sub_level: SUB_LEVELS[quartile],
        color,
    }
}

/// Progress through the current tier as 0..=100. The top tier has no next
/// level, so it always reports 100.
pub fn percentage_to_next_level(points: u64) -> u8 {
    let index = (points / TIER_WIDTH) as usize;
    if index >= TIERS.len() - 1 {
        return 100;
    }
    (points % TIER_WIDTH) as u8
}

/// First-time badge carried by a tier, from the product's badge catalogue.
pub fn badge_for_level(level: &str) -> Option<String> {
    TIERS
        .iter()
        .find(|(name, _)| *name == level)
        .map(|(name, _)| format!("First {name} Badge"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_tier_covers_zero() {
        let tier = level_for(0);
        assert_eq!(tier.level, "Initiator");
        assert_eq!(tier.sub_level, "I");
        assert_eq!(tier.color, "#00FF00");
    }

    #[test]
    fn boundary_belongs_to_upper_tier() {
        assert_eq!(level_for(99).level, "Initiator");
        assert_eq!(level_for(100).level, "Sustainer");
        assert_eq!(level_for(899).level, "Orchestrator");
        assert_eq!(level_for(900).level, "Harmoniser");
    }

    #[test]
    fn table_is_total_and_monotone() {
        let mut last_index = 0usize;
        for points in 0..2_000u64 {
            let tier = level_for(points);
            let index = TIERS
                .iter()
                .position(|(name, _)| *name == tier.level)
                .expect("level must come from the table");
            assert!(index >= last_index, "level regressed at {points}");
            last_index = index;
        }
        assert_eq!(level_for(u64::MAX).level, "Harmoniser");
    }

    #[test]
    fn sub_levels_step_by_quartile() {
        assert_eq!(level_for(0).sub_level, "I");
        assert_eq!(level_for(24).sub_level, "I");
        assert_eq!(level_for(25).sub_level, "II");
        assert_eq!(level_for(50).sub_level, "III");
        assert_eq!(level_for(75).sub_level, "IV");
        assert_eq!(level_for(125).sub_level, "II");
        // Open-ended top tier clamps instead of wrapping.
        assert_eq!(level_for(5_000).sub_level, "IV");
    }

    #[test]
    fn percentage_tracks_position_in_tier() {
        assert_eq!(percentage_to_next_level(0), 0);
        assert_eq!(percentage_to_next_level(99), 99);
        assert_eq!(percentage_to_next_level(150), 50);
        assert_eq!(percentage_to_next_level(950), 100);
    }

    #[test]
    fn every_tier_has_a_badge() {
        for (name, _) in TIERS {
            assert_eq!(badge_for_level(name), Some(format!("First {name} Badge")));
        }
        assert_eq!(badge_for_level("Unheard Of"), None);
    }
}
