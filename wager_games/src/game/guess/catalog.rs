//! Secret catalog for the guess games.

use rand::{RngCore, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::normalize;
use crate::game::{DifficultyBounds, GameType};

/// A guessable character with optional details and artwork.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub answer: String,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    /// Game types this entry may be used for. Empty means every guess game.
    #[serde(default)]
    pub games: Vec<GameType>,
}

impl CatalogEntry {
    /// Whether the entry can back a `game_type` board within `bounds`.
    #[must_use]
    pub fn fits(&self, game_type: GameType, bounds: &DifficultyBounds) -> bool {
        if !self.games.is_empty() && !self.games.contains(&game_type) {
            return false;
        }
        let answer = normalize(&self.answer);
        let len = answer.chars().count();
        let unique = answer.chars().collect::<HashSet<_>>().len();
        if len < 2 || len > bounds.max_length || unique > bounds.max_unique_letters {
            return false;
        }
        match game_type {
            GameType::PunkRecords => !self.details.is_empty(),
            GameType::Shambles => len <= bounds.grid_size * bounds.grid_size,
            _ => true,
        }
    }
}

/// Source of secrets for new guess boards.
pub trait SecretCatalog: Send + Sync {
    /// Pick a random entry usable for `game_type` within `bounds`.
    fn pick(
        &self,
        game_type: GameType,
        bounds: &DifficultyBounds,
        rng: &mut dyn RngCore,
    ) -> Option<CatalogEntry>;
}

/// Catalog backed by a fixed list of entries.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Load entries from a JSON array.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the document is not an array of entries.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// The catalog bundled with the library.
    #[must_use]
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(answer, details)| CatalogEntry {
                answer: (*answer).to_string(),
                details: details.iter().map(|d| (*d).to_string()).collect(),
                image: None,
                games: Vec::new(),
            })
            .collect();
        Self::new(entries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SecretCatalog for StaticCatalog {
    fn pick(
        &self,
        game_type: GameType,
        bounds: &DifficultyBounds,
        rng: &mut dyn RngCore,
    ) -> Option<CatalogEntry> {
        let candidates: Vec<&CatalogEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.fits(game_type, bounds))
            .collect();
        candidates.choose(rng).map(|entry| (*entry).clone())
    }
}

const BUILTIN: &[(&str, &[&str])] = &[
    ("Luffy", &["Captain of the Straw Hat Pirates", "Ate the Gum-Gum Fruit", "Dreams of becoming King of the Pirates"]),
    ("Zoro", &["Fights with three swords", "Gets lost constantly", "Former pirate hunter"]),
    ("Nami", &["Navigator of the Straw Hats", "Wields the Clima-Tact", "Loves tangerines"]),
    ("Usopp", &["Sniper with a long nose", "Son of Yasopp", "Tells tall tales"]),
    ("Sanji", &["Cook who fights only with his legs", "Raised at the Baratie", "Member of the Vinsmoke family"]),
    ("Chopper", &["Reindeer doctor", "Ate the Human-Human Fruit", "Loves cotton candy"]),
    ("Robin", &["Archaeologist who can read Poneglyphs", "Sprouts extra limbs", "Survivor of Ohara"]),
    ("Franky", &["Cyborg shipwright", "Built the Thousand Sunny", "Runs on cola"]),
    ("Brook", &["Skeleton musician", "Ate the Revive-Revive Fruit", "Asks to see panties"]),
    ("Jinbe", &["Fish-Man karate master", "Former Warlord of the Sea", "Helmsman of the Straw Hats"]),
    ("Shanks", &["Red-haired Emperor", "Gave away his straw hat", "Lost an arm to a Sea King"]),
    ("Buggy", &["Clown pirate", "Ate the Chop-Chop Fruit", "Accidental Emperor"]),
    ("Ace", &["Fire Fist", "Second division commander of Whitebeard", "Son of the Pirate King"]),
    ("Sabo", &["Chief of Staff of the Revolutionary Army", "Inherited the Flame-Flame Fruit", "Sworn brother of Luffy"]),
    ("Garp", &["Hero of the Marines", "Fist of Love", "Grandfather of Luffy"]),
    ("Roger", &["The Pirate King", "Captain of the Oro Jackson", "Reached Laugh Tale"]),
    ("Kaido", &["Strongest creature in the world", "Turns into a dragon", "Ruled Wano"]),
    ("Smoker", &["Marine who turns into smoke", "Carries a seastone jitte", "Chases Luffy since Loguetown"]),
    ("Mihawk", &["Greatest swordsman in the world", "Wields the black blade Yoru", "Lives on Kuraigana Island"]),
    ("Crocodile", &["Former Warlord with a hook", "Ate the Sand-Sand Fruit", "Led Baroque Works"]),
    ("Doflamingo", &["Heavenly Demon", "Controls people with strings", "Former king of Dressrosa"]),
    ("Whitebeard", &["Strongest man in the world", "Could shake the sea itself", "Treated his crew as sons"]),
    ("Vegapunk", &["Genius scientist", "Split into six satellites", "Creator of the Pacifistas"]),
    ("Hancock", &["Snake Princess", "Empress of Amazon Lily", "Turns admirers to stone"]),
    ("Rayleigh", &["Dark King", "First mate of the Pirate King", "Coats ships on Sabaody"]),
    ("Trafalgar Law", &["Surgeon of Death", "Ate the Op-Op Fruit", "Captain of the Heart Pirates"]),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Difficulty;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_pick_respects_bounds() {
        let catalog = StaticCatalog::builtin();
        let bounds = Difficulty::Easy.bounds();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let entry = catalog
                .pick(GameType::GuessOrLife, &bounds, &mut rng)
                .unwrap();
            assert!(normalize(&entry.answer).len() <= bounds.max_length);
        }
    }

    #[test]
    fn test_pick_honors_game_restriction() {
        let catalog = StaticCatalog::new(vec![CatalogEntry {
            answer: "Nami".to_string(),
            details: Vec::new(),
            image: None,
            games: vec![GameType::WhosWho],
        }]);
        let bounds = Difficulty::Hard.bounds();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(catalog.pick(GameType::GuessOrLife, &bounds, &mut rng).is_none());
        assert!(catalog.pick(GameType::WhosWho, &bounds, &mut rng).is_some());
    }

    #[test]
    fn test_detail_game_requires_details() {
        let entry = CatalogEntry {
            answer: "Nami".to_string(),
            details: Vec::new(),
            image: None,
            games: Vec::new(),
        };
        assert!(!entry.fits(GameType::PunkRecords, &Difficulty::Hard.bounds()));
    }

    #[test]
    fn test_from_json() {
        let catalog =
            StaticCatalog::from_json(r#"[{"answer": "Yamato", "details": ["Oni princess"]}]"#)
                .unwrap();
        assert_eq!(catalog.len(), 1);
    }
}
