use serde::Serialize;

/// Inclusive HSV box. Hue uses the 0..=180 scale, saturation and value 0..=255.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }
}

/// Named line colour. Red straddles the hue seam and carries a second range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineColorProfile {
    pub name: String,
    #[serde(flatten)]
    pub range: HsvRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap: Option<HsvRange>,
}

pub const PRESET_NAMES: [&str; 7] = ["black", "white", "red", "blue", "green", "yellow", "orange"];

impl LineColorProfile {
    /// Look up a preset by name (case-insensitive).
    pub fn preset(name: &str) -> Option<LineColorProfile> {
        let name = name.trim().to_ascii_lowercase();
        let (range, wrap) = match name.as_str() {
            "black" => (HsvRange::new([0, 0, 0], [180, 255, 60]), None),
            "white" => (HsvRange::new([0, 0, 200], [180, 30, 255]), None),
            "red" => (
                HsvRange::new([0, 120, 70], [10, 255, 255]),
                Some(HsvRange::new([170, 120, 70], [180, 255, 255])),
            ),
            "blue" => (HsvRange::new([100, 100, 50], [130, 255, 255]), None),
            "green" => (HsvRange::new([40, 50, 50], [80, 255, 255]), None),
            "yellow" => (HsvRange::new([20, 100, 100], [40, 255, 255]), None),
            "orange" => (HsvRange::new([10, 100, 100], [25, 255, 255]), None),
            _ => return None,
        };
        Some(LineColorProfile { name, range, wrap })
    }

    pub fn matches(&self, hsv: [u8; 3]) -> bool {
        self.range.contains(hsv) || self.wrap.is_some_and(|wrap| wrap.contains(hsv))
    }
}

impl Default for LineColorProfile {
    fn default() -> Self {
        LineColorProfile {
            name: "black".to_string(),
            range: HsvRange::new([0, 0, 0], [180, 255, 60]),
            wrap: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_resolves() {
        for name in PRESET_NAMES {
            let profile = LineColorProfile::preset(name);
            assert_eq!(profile.map(|p| p.name), Some(name.to_string()));
        }
        assert!(LineColorProfile::preset("purple").is_none());
    }

    #[test]
    fn red_matches_both_sides_of_the_hue_seam() {
        let Some(red) = LineColorProfile::preset("RED") else {
            panic!("red preset missing");
        };
        assert!(red.matches([3, 200, 200]));
        assert!(red.matches([175, 200, 200]));
        assert!(!red.matches([90, 200, 200]));
    }

    #[test]
    fn default_is_black_preset() {
        assert_eq!(LineColorProfile::preset("black"), Some(LineColorProfile::default()));
    }

    #[test]
    fn serialises_bounds_flat() -> serde_json::Result<()> {
        let json = serde_json::to_value(LineColorProfile::default())?;
        assert_eq!(json["lower"], serde_json::json!([0, 0, 0]));
        assert_eq!(json["upper"], serde_json::json!([180, 255, 60]));
        assert!(json.get("wrap").is_none());
        Ok(())
    }
}
