use crate::rl::ConfigError;

/// Species short names for which iLand ships light influence patterns.
pub const ILAND_SPECIES: [&str; 32] = [
    "abal", "acca", "acpl", "acps", "algl", "alin", "alvi", "bepe", "cabe", "casa", "coav", "fasy",
    "frex", "lade", "piab", "pice", "pimu", "pini", "pisy", "poni", "potr", "psme", "qupe", "qupu",
    "quro", "rops", "saca", "soar", "soau", "tico", "tipl", "ulgl",
];

/// Largest catalog whose observation codes (`2 + index`) still fit in a `u8`.
pub const MAX_SPECIES: usize = u8::MAX as usize - 2;

/// Ordered list of species codes an agent may plant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesCatalog {
    names: Vec<String>,
}

impl SpeciesCatalog {
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .map(|n| n.trim().to_string())
            .collect();

        if names.is_empty() {
            return Err(ConfigError::EmptySpeciesCatalog);
        }
        if names.len() > MAX_SPECIES {
            return Err(ConfigError::TooManySpecies {
                count: names.len(),
                max: MAX_SPECIES,
            });
        }
        if let Some(bad) = names.iter().find(|n| n.is_empty() || n.contains(';')) {
            return Err(ConfigError::InvalidSpeciesName(bad.clone()));
        }

        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for SpeciesCatalog {
    fn default() -> Self {
        Self {
            names: ILAND_SPECIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
