// ============================================================================
// APP SETTINGS — persisted key=value configuration
// ============================================================================

use crate::channel;
use crate::slices::GridSpec;
use std::path::PathBuf;

/// User configuration persisted between sessions as a plain key=value file.
/// Unknown keys are ignored on load so older files keep working.
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// remove.bg credential for background removal. Empty = feature prompts
    /// for a key.
    pub remove_bg_api_key: String,
    /// Credential for the prompt-generation service. Empty = the AI tab
    /// shows the configure-a-key hint instead of calling out.
    pub prompt_api_key: String,
    /// Origins trusted on the import channel.
    pub allowed_origins: Vec<String>,
    /// Loopback port the import channel listens on.
    pub channel_port: u16,
    /// Optional font file for editor text objects. Empty = probe platform
    /// defaults.
    pub editor_font_path: String,
    /// Grid restored at startup.
    pub default_rows: u32,
    pub default_cols: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        let grid = GridSpec::default();
        Self {
            remove_bg_api_key: String::new(),
            prompt_api_key: String::new(),
            allowed_origins: channel::DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            channel_port: channel::DEFAULT_PORT,
            editor_font_path: String::new(),
            default_rows: grid.rows,
            default_cols: grid.cols,
        }
    }
}

impl AppSettings {
    /// Path of the settings file in the platform config directory.
    ///
    /// Windows:  `%APPDATA%\GridCut\gridcut_settings.cfg`
    /// Linux:    `~/.config/GridCut/gridcut_settings.cfg`
    /// macOS:    `~/Library/Application Support/GridCut/gridcut_settings.cfg`
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        let base = std::env::var("APPDATA").ok().map(PathBuf::from);
        #[cfg(target_os = "macos")]
        let base = std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library").join("Application Support"));
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let base = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")));

        let dir = base?.join("GridCut");
        let _ = std::fs::create_dir_all(&dir);
        Some(dir.join("gridcut_settings.cfg"))
    }

    pub fn default_grid(&self) -> GridSpec {
        GridSpec::new(
            self.default_rows.clamp(1, GridSpec::UI_MAX),
            self.default_cols.clamp(1, GridSpec::UI_MAX),
        )
    }

    fn to_config_string(&self) -> String {
        format!(
            "remove_bg_api_key={}\n\
             prompt_api_key={}\n\
             allowed_origins={}\n\
             channel_port={}\n\
             editor_font_path={}\n\
             default_rows={}\n\
             default_cols={}\n",
            self.remove_bg_api_key,
            self.prompt_api_key,
            self.allowed_origins.join(","),
            self.channel_port,
            self.editor_font_path,
            self.default_rows,
            self.default_cols,
        )
    }

    fn apply_line(&mut self, key: &str, val: &str) {
        match key {
            "remove_bg_api_key" => self.remove_bg_api_key = val.to_string(),
            "prompt_api_key" => self.prompt_api_key = val.to_string(),
            "allowed_origins" => {
                self.allowed_origins = val
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            "channel_port" => {
                if let Ok(port) = val.parse() {
                    self.channel_port = port;
                }
            }
            "editor_font_path" => self.editor_font_path = val.to_string(),
            "default_rows" => {
                if let Ok(n) = val.parse::<u32>() {
                    self.default_rows = n.clamp(1, GridSpec::UI_MAX);
                }
            }
            "default_cols" => {
                if let Ok(n) = val.parse::<u32>() {
                    self.default_cols = n.clamp(1, GridSpec::UI_MAX);
                }
            }
            _ => {}
        }
    }

    /// Save settings to disk. Failures are ignored — settings loss is not
    /// worth interrupting the session for.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        let _ = std::fs::write(path, self.to_config_string());
    }

    /// Load settings from disk (defaults when the file is missing/corrupt).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            s.apply_line(key.trim(), val.trim());
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips() {
        let mut s = AppSettings::default();
        s.remove_bg_api_key = "rb-key".into();
        s.prompt_api_key = "ai-key".into();
        s.allowed_origins = vec!["https://a.example".into(), "https://b.example".into()];
        s.channel_port = 50_000;
        s.default_rows = 3;
        s.default_cols = 8;

        let parsed = AppSettings::parse(&s.to_config_string());
        assert_eq!(parsed, s);
    }

    #[test]
    fn unknown_and_malformed_lines_are_ignored() {
        let parsed = AppSettings::parse(
            "future_option=whatever\nnot a key-value line\ndefault_rows=5\nchannel_port=junk\n",
        );
        assert_eq!(parsed.default_rows, 5);
        assert_eq!(parsed.channel_port, channel::DEFAULT_PORT);
        assert_eq!(parsed.default_cols, AppSettings::default().default_cols);
    }

    #[test]
    fn grid_values_are_clamped_to_ui_bounds() {
        let parsed = AppSettings::parse("default_rows=999\ndefault_cols=0\n");
        assert_eq!(parsed.default_rows, GridSpec::UI_MAX);
        assert_eq!(parsed.default_cols, 1);
        assert_eq!(parsed.default_grid(), GridSpec::new(GridSpec::UI_MAX, 1));
    }
}
