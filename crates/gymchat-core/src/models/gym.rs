use serde::{Deserialize, Serialize};

/// Gym chains a user can pick in the gym selector, keyed by their stored id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gym {
    FriskisSvettis,
    NordicWellness,
    Sats,
    Fitness24Seven,
}

impl Gym {
    pub const ALL: [Gym; 4] = [
        Gym::FriskisSvettis,
        Gym::NordicWellness,
        Gym::Sats,
        Gym::Fitness24Seven,
    ];

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Gym::FriskisSvettis),
            2 => Some(Gym::NordicWellness),
            3 => Some(Gym::Sats),
            4 => Some(Gym::Fitness24Seven),
            _ => None,
        }
    }

    /// Value written to the `selectedGym` field
    pub fn id(self) -> i64 {
        match self {
            Gym::FriskisSvettis => 1,
            Gym::NordicWellness => 2,
            Gym::Sats => 3,
            Gym::Fitness24Seven => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Gym::FriskisSvettis => "Friskis & Svettis",
            Gym::NordicWellness => "Nordic Wellness",
            Gym::Sats => "SATS",
            Gym::Fitness24Seven => "Fitness24Seven",
        }
    }
}

impl std::fmt::Display for Gym {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_roundtrip() {
        for gym in Gym::ALL {
            assert_eq!(Gym::from_id(gym.id()), Some(gym));
        }
        assert_eq!(Gym::from_id(0), None);
        assert_eq!(Gym::from_id(5), None);
    }

    #[test]
    fn test_display_uses_chain_name() {
        assert_eq!(Gym::FriskisSvettis.to_string(), "Friskis & Svettis");
        assert_eq!(Gym::Sats.to_string(), "SATS");
    }
}
