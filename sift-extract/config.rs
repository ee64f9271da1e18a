use sift_core::SiftConfig;
use crate::error::ExtractResult;
use crate::extractor::{ExtractOptions, FeatureExtractor};

/// Complete extraction configuration: filter parameters plus output
/// options.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractConfig {
    pub filter: SiftConfig,
    pub options: ExtractOptions,
}

impl ExtractConfig {
    /// Validate and build the extractor described by this configuration.
    pub fn build(self) -> ExtractResult<FeatureExtractor> {
        FeatureExtractor::new(self.filter, self.options)
    }

    pub fn to_builder(self) -> ExtractorBuilder {
        ExtractorBuilder { config: self }
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "ExtractConfig: octaves={}, levels={}, first_octave={}, thresholds=[peak:{}, edge:{}, norm:{}], descriptors={}, force_orientations={}",
            self.filter.octaves,
            self.filter.levels,
            self.filter.first_octave,
            self.filter.peak_thresh,
            self.filter.edge_thresh,
            self.filter.norm_thresh,
            self.options.descriptors,
            self.options.force_orientations
        )
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string, validating the result
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = serde_json::from_str(json)?;
        config.clone().build()?;
        Ok(config)
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserialize from TOML string, validating the result
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = toml::from_str(toml_str)?;
        config.clone().build()?;
        Ok(config)
    }
}

/// Fluent builder for the extraction pipeline.
pub struct ExtractorBuilder {
    config: ExtractConfig,
}

impl ExtractorBuilder {
    pub fn new() -> Self {
        Self {
            config: ExtractConfig::default(),
        }
    }

    /// Set the octave count; negative means automatic.
    pub fn octaves(mut self, octaves: i32) -> Self {
        self.config.filter.octaves = octaves;
        self
    }

    /// Set levels per octave.
    pub fn levels(mut self, levels: usize) -> Self {
        self.config.filter.levels = levels;
        self
    }

    /// Set the first octave; negative upsamples the input.
    pub fn first_octave(mut self, first_octave: i32) -> Self {
        self.config.filter.first_octave = first_octave;
        self
    }

    /// Override the DoG peak threshold.
    pub fn peak_thresh(mut self, t: f64) -> Self {
        self.config.filter.peak_thresh = t;
        self
    }

    /// Override the edge rejection threshold.
    pub fn edge_thresh(mut self, t: f64) -> Self {
        self.config.filter.edge_thresh = t;
        self
    }

    /// Override the descriptor norm threshold.
    pub fn norm_thresh(mut self, t: f64) -> Self {
        self.config.filter.norm_thresh = t;
        self
    }

    /// Set the rayon thread count used for descriptor batches.
    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.filter.n_threads = n_threads;
        self
    }

    /// Enable/disable descriptor output.
    pub fn descriptors(mut self, enable: bool) -> Self {
        self.config.options.descriptors = enable;
        self
    }

    /// Enable/disable orientation recomputation for supplied frames.
    pub fn force_orientations(mut self, enable: bool) -> Self {
        self.config.options.force_orientations = enable;
        self
    }

    pub fn to_config(self) -> ExtractConfig {
        self.config
    }

    /// Validate and build the extractor.
    pub fn build(self) -> ExtractResult<FeatureExtractor> {
        self.config.build()
    }
}

impl Default for ExtractorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;

    #[test]
    fn builder_sets_all_fields() {
        let config = ExtractorBuilder::new()
            .octaves(4)
            .levels(5)
            .first_octave(-1)
            .peak_thresh(0.02)
            .edge_thresh(8.0)
            .norm_thresh(0.1)
            .descriptors(false)
            .force_orientations(true)
            .to_config();

        assert_eq!(config.filter.octaves, 4);
        assert_eq!(config.filter.levels, 5);
        assert_eq!(config.filter.first_octave, -1);
        assert_eq!(config.filter.peak_thresh, 0.02);
        assert_eq!(config.filter.edge_thresh, 8.0);
        assert_eq!(config.filter.norm_thresh, 0.1);
        assert!(!config.options.descriptors);
        assert!(config.options.force_orientations);
    }

    #[test]
    fn builder_validation_rejects_bad_values() {
        assert!(matches!(
            ExtractorBuilder::new().levels(0).build(),
            Err(ExtractError::InvalidLevels(0))
        ));
        assert!(matches!(
            ExtractorBuilder::new().edge_thresh(0.2).build(),
            Err(ExtractError::InvalidEdgeThresh(_))
        ));
        assert!(ExtractorBuilder::new().build().is_ok());
    }

    #[test]
    fn summary_mentions_key_settings() {
        let s = ExtractorBuilder::new().octaves(2).to_config().summary();
        assert!(s.contains("octaves=2"));
        assert!(s.contains("descriptors=true"));
    }
}
