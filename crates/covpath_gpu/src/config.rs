//! Renderer configuration

/// Smallest side length a new atlas page starts with.
pub const DEFAULT_MIN_ATLAS_SIZE: u32 = 1024;

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
}

/// Configuration for creating a [`PathRenderer`](crate::PathRenderer)
#[derive(Clone, Debug)]
pub struct PathRendererConfig {
    /// Accept paths that have a stable cache key
    ///
    /// When false, such paths are refused so a caching renderer gets them.
    pub draw_cachable_paths: bool,
    /// Initial side length of a new atlas page
    pub min_atlas_size: u32,
    /// Cap on atlas page growth (None = provider's max render target size)
    pub max_atlas_size: Option<u32>,
    /// Clipped device area above which a path is only drawn as a backup
    pub backup_area_threshold: u64,
    /// Verb count above which a cacheable path is only drawn as a backup
    pub backup_verb_threshold: usize,
}

impl Default for PathRendererConfig {
    fn default() -> Self {
        Self {
            draw_cachable_paths: false,
            min_atlas_size: DEFAULT_MIN_ATLAS_SIZE,
            max_atlas_size: None,
            backup_area_threshold: 256 * 256,
            backup_verb_threshold: 50,
        }
    }
}

impl PathRendererConfig {
    /// Apply `COVPATH_*` environment overrides and clamp against the device.
    ///
    /// Env:
    /// - COVPATH_MIN_ATLAS_SIZE=2048
    /// - COVPATH_MAX_ATLAS_SIZE=4096
    /// - COVPATH_DRAW_CACHABLE_PATHS=1
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_u32("COVPATH_MIN_ATLAS_SIZE") {
            self.min_atlas_size = v;
        }
        if let Some(v) = env_u32("COVPATH_MAX_ATLAS_SIZE") {
            self.max_atlas_size = Some(v);
        }
        if let Some(v) = env_bool("COVPATH_DRAW_CACHABLE_PATHS") {
            self.draw_cachable_paths = v;
        }
        self
    }

    /// Final (min, max) atlas side lengths for a device whose render targets
    /// are at most `max_render_target_size` on a side.
    pub(crate) fn atlas_size_limits(&self, max_render_target_size: u32) -> (u32, u32) {
        let max = self
            .max_atlas_size
            .unwrap_or(max_render_target_size)
            .clamp(1, max_render_target_size.max(1));
        let min = self.min_atlas_size.clamp(1, max);
        (min, max)
    }
}

pub(crate) fn log_renderer_config(config: &PathRendererConfig, min_atlas: u32, max_atlas: u32) {
    tracing::info!(
        "covpath config: draw_cachable_paths={}, atlas_size={}..={}, backup_area={}, backup_verbs={}",
        config.draw_cachable_paths,
        min_atlas,
        max_atlas,
        config.backup_area_threshold,
        config.backup_verb_threshold
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atlas_limits_follow_device() {
        let config = PathRendererConfig::default();
        assert_eq!(config.atlas_size_limits(8192), (1024, 8192));
        // A tiny device pulls the minimum down with it.
        assert_eq!(config.atlas_size_limits(512), (512, 512));
    }

    #[test]
    fn test_atlas_limits_clamp_overrides() {
        let config = PathRendererConfig {
            min_atlas_size: 4096,
            max_atlas_size: Some(100_000),
            ..Default::default()
        };
        assert_eq!(config.atlas_size_limits(2048), (2048, 2048));

        let config = PathRendererConfig {
            min_atlas_size: 0,
            max_atlas_size: Some(256),
            ..Default::default()
        };
        assert_eq!(config.atlas_size_limits(2048), (1, 256));
    }
}
