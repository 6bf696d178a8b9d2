use crate::scene::LAYER_COUNT;
use std::path::Path;

/// Layer reserved for preview captures.
pub const LAYER_PREVIEW: u8 = 31;
pub const DISTANCE_MULTIPLIER_MIN: f32 = 0.05;
pub const DISTANCE_MULTIPLIER_MAX: f32 = 3.0;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    pub layer: u8,
    /// Edge length of the square capture, in pixels.
    pub image_size: u32,
    pub fov_deg: f32,
    pub distance_multiplier: f32,
    /// Camera offset in units of the reference height.
    pub offset: [f32; 3],
    /// Height used when the subject has no descriptor.
    pub fallback_height: f32,
    /// Treat a capture with no covered pixels as a failure.
    pub require_visible_geometry: bool,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            layer: LAYER_PREVIEW,
            image_size: 128,
            fov_deg: 30.0,
            distance_multiplier: 1.5,
            offset: [0.0, 0.0, 0.0],
            fallback_height: 1.5,
            require_visible_geometry: false,
        }
    }
}

impl PreviewSettings {
    /// Clamp values a hand-edited file may have pushed out of range.
    pub fn normalized(mut self) -> Self {
        if self.layer >= LAYER_COUNT {
            log::warn!("Preview layer {} out of range; using {}", self.layer, LAYER_PREVIEW);
            self.layer = LAYER_PREVIEW;
        }
        self.image_size = self.image_size.clamp(1, 4096);
        if !self.fov_deg.is_finite() || self.fov_deg <= 1.0 || self.fov_deg >= 179.0 {
            self.fov_deg = 30.0;
        }
        self.distance_multiplier = if self.distance_multiplier.is_finite() {
            self.distance_multiplier
                .clamp(DISTANCE_MULTIPLIER_MIN, DISTANCE_MULTIPLIER_MAX)
        } else {
            1.5
        };
        if !self.fallback_height.is_finite() || self.fallback_height <= 0.0 {
            self.fallback_height = 1.5;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConfiguratorSettings {
    pub preview: PreviewSettings,
    /// Shared selection parameter written to every toggle.
    pub parameter_name: String,
    /// Stored previews are named `{prefix}{variant}`.
    pub preview_name_prefix: String,
    /// Replace an installed menu of the same name instead of refusing.
    pub replace_existing_menu: bool,
}

impl Default for ConfiguratorSettings {
    fn default() -> Self {
        Self {
            preview: PreviewSettings::default(),
            parameter_name: "ColorSelect".to_string(),
            preview_name_prefix: "Preview_".to_string(),
            replace_existing_menu: false,
        }
    }
}

impl ConfiguratorSettings {
    pub fn normalized(mut self) -> Self {
        self.preview = self.preview.normalized();
        if self.parameter_name.trim().is_empty() {
            self.parameter_name = Self::default().parameter_name;
        }
        self
    }
}

pub fn save_settings_to_file(settings: &ConfiguratorSettings, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_settings_from_file(path: &Path) -> Result<ConfiguratorSettings> {
    let json = std::fs::read_to_string(path)?;
    let settings: ConfiguratorSettings = serde_json::from_str(&json)?;
    Ok(settings.normalized())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: ConfiguratorSettings =
            serde_json::from_str(r#"{ "preview": { "image_size": 256 } }"#).unwrap();
        assert_eq!(settings.preview.image_size, 256);
        assert_eq!(settings.preview.layer, LAYER_PREVIEW);
        assert_eq!(settings.parameter_name, "ColorSelect");
        assert!(!settings.replace_existing_menu);
    }

    #[test]
    fn normalization_clamps_out_of_range_values() {
        let settings = PreviewSettings {
            layer: 40,
            image_size: 0,
            distance_multiplier: 9.0,
            fov_deg: 0.0,
            ..PreviewSettings::default()
        }
        .normalized();
        assert_eq!(settings.layer, LAYER_PREVIEW);
        assert_eq!(settings.image_size, 1);
        assert_eq!(settings.distance_multiplier, DISTANCE_MULTIPLIER_MAX);
        assert_eq!(settings.fov_deg, 30.0);
    }

    #[test]
    fn save_load_via_file() {
        let mut settings = ConfiguratorSettings::default();
        settings.preview.distance_multiplier = 2.25;
        settings.replace_existing_menu = true;

        let mut path = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!(
            "variant_previz_settings_{}_{}.json",
            std::process::id(),
            nonce
        ));

        save_settings_to_file(&settings, &path).unwrap();
        let loaded = load_settings_from_file(&path).unwrap();
        assert_eq!(loaded, settings);

        let _ = std::fs::remove_file(path);
    }
}
