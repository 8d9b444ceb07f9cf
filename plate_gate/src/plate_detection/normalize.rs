use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Canonical plate key: uppercase ASCII letters and digits only.
///
/// Registered plates and recognized text are both compared through this type,
/// so a value can only be built by [`normalize_plate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PlateIdentifier(String);

impl PlateIdentifier {
    pub fn new(raw: &str) -> Self {
        normalize_plate(Some(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PlateIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<String> for PlateIdentifier {
    fn from(raw: String) -> Self {
        normalize_plate(Some(&raw))
    }
}

impl From<PlateIdentifier> for String {
    fn from(plate: PlateIdentifier) -> Self {
        plate.0
    }
}

pub fn normalize_plate(raw: Option<&str>) -> PlateIdentifier {
    let Some(raw) = raw else {
        return PlateIdentifier::default();
    };
    PlateIdentifier(
        raw.to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect(),
    )
}
