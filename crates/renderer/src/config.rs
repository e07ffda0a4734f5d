//! Renderer configuration.

/// Startup configuration for the window and renderer.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window width in pixels.
    pub width: u32,
    /// Initial window height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
    /// Enable Vulkan validation layers when available.
    pub enable_validation: bool,
    /// Clear color for the color attachment (RGBA).
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Lumen".to_string(),
            enable_validation: cfg!(debug_assertions),
            clear_color: [0.1, 0.1, 0.15, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RendererConfig::default();
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 600);
        assert_eq!(config.title, "Lumen");
    }
}
