//! Site name generation for per-variant identity substitution.
//!
//! A name is a themed base word followed by a short random suffix with a
//! capital first letter ("Bistro" + "Kelm" → "BistroKelm"). Distinctness
//! comes from the suffix space and is not enforced.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

const GENERIC_WORDS: &[&str] = &[
    "Nova", "Prime", "Vista", "Astra", "Terra", "Lumen", "Vertex", "Orbit", "Atlas", "Zenith",
];

/// Theme keyword → base words. Lookup is exact after trimming and lowercasing.
const THEMES: &[(&str, &[&str])] = &[
    ("tech", &["Byte", "Pixel", "Quantum", "Code", "Logic", "Cyber", "Data", "Nexus"]),
    ("food", &["Bistro", "Taste", "Spice", "Flavor", "Crumb", "Harvest", "Oven", "Platter"]),
    ("restaurant", &["Bistro", "Table", "Grill", "Kitchen", "Diner", "Tavern", "Feast"]),
    ("travel", &["Voyage", "Journey", "Compass", "Horizon", "Trail", "Nomad", "Wander"]),
    ("health", &["Vita", "Care", "Remedy", "Pulse", "Vital", "Cure", "Balance"]),
    ("beauty", &["Glow", "Bloom", "Silk", "Charm", "Velvet", "Aura", "Grace"]),
    ("fitness", &["Fit", "Power", "Iron", "Motion", "Stamina", "Core", "Flex"]),
    ("finance", &["Capital", "Ledger", "Fund", "Asset", "Credit", "Equity", "Vault"]),
    ("construction", &["Build", "Stone", "Brick", "Frame", "Beam", "Forge", "Crest"]),
    ("auto", &["Motor", "Drive", "Gear", "Turbo", "Wheel", "Piston", "Road"]),
    ("education", &["Academy", "Scholar", "Mentor", "Learn", "Study", "Campus", "Quill"]),
    ("realty", &["Home", "Estate", "Haven", "Nest", "Dwell", "Manor", "Keys"]),
];

const SUFFIX_LENGTH: std::ops::RangeInclusive<usize> = 3..=6;

pub struct NameGenerator {
    rng: StdRng,
}

impl NameGenerator {
    /// Reproducible generator: the same seed yields the same names.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// `count` names drawn from the theme's words, or the generic list when
    /// the theme is absent or unknown.
    pub fn generate_names(&mut self, theme: Option<&str>, count: usize) -> Vec<String> {
        let words = words_for_theme(theme);
        (0..count).map(|_| self.next_name(words)).collect()
    }

    fn next_name(&mut self, words: &[&str]) -> String {
        let base = words.choose(&mut self.rng).copied().unwrap_or("Site");
        let length = self.rng.random_range(SUFFIX_LENGTH);

        let mut name = String::with_capacity(base.len() + length);
        name.push_str(base);
        for i in 0..length {
            let letter = self.rng.random_range(b'a'..=b'z') as char;
            name.push(if i == 0 { letter.to_ascii_uppercase() } else { letter });
        }
        name
    }
}

fn words_for_theme(theme: Option<&str>) -> &'static [&'static str] {
    let Some(theme) = theme.map(|t| t.trim().to_lowercase()) else {
        return GENERIC_WORDS;
    };
    THEMES
        .iter()
        .find(|(key, _)| *key == theme)
        .map(|(_, words)| *words)
        .unwrap_or(GENERIC_WORDS)
}
