use crate::bo::BackendKind;
use crate::foundation::error::{Dri2Error, Dri2Result};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
/// Driver options controlling buffer exchange and the overlay.
///
/// Loaded from JSON ([`Dri2Options::from_json_str`]) or from xorg.conf-style key/value pairs
/// ([`Dri2Options::from_xorg_options`]). Missing keys keep their defaults.
pub struct Dri2Options {
    /// Offer buffer exchange at all (`DRI2`).
    pub enabled: bool,
    /// Show eligible windows through the hardware overlay (`DRI2HWOverlay`).
    pub hw_overlay: bool,
    /// Block for one vertical blank after activating the overlay (`SwapbuffersWait`).
    pub swapbuffers_wait: bool,
    /// Allocate from the dumb-buffer backend instead of UMP (`UseDumb`).
    pub use_dumb: bool,
    /// EXA acceleration owns pixmaps (`AccelMethod` = `EXA`).
    pub use_exa: bool,
    /// Register scanout framebuffers for page flipping (cleared by `NoFlip`).
    pub flip: bool,
}

impl Default for Dri2Options {
    fn default() -> Self {
        Self {
            enabled: true,
            hw_overlay: true,
            swapbuffers_wait: true,
            use_dumb: false,
            use_exa: false,
            flip: false,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Dri2Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Ok(true),
        "0" | "off" | "false" | "no" => Ok(false),
        other => Err(Dri2Error::config(format!(
            "option '{key}' expects a boolean, got '{other}'"
        ))),
    }
}

impl Dri2Options {
    /// Parse options from JSON.
    pub fn from_json_str(s: &str) -> Dri2Result<Self> {
        serde_json::from_str(s).map_err(|e| Dri2Error::config(format!("invalid options JSON: {e}")))
    }

    /// Apply xorg.conf `Option` entries on top of the defaults. Keys are case-insensitive;
    /// unknown keys are ignored.
    pub fn from_xorg_options<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Dri2Result<Self> {
        let mut opts = Self::default();
        for (key, value) in pairs {
            match key.to_ascii_lowercase().as_str() {
                "dri2" => opts.enabled = parse_bool(key, value)?,
                "dri2hwoverlay" => opts.hw_overlay = parse_bool(key, value)?,
                "swapbufferswait" => opts.swapbuffers_wait = parse_bool(key, value)?,
                "usedumb" => opts.use_dumb = parse_bool(key, value)?,
                "noflip" => opts.flip = !parse_bool(key, value)?,
                "accelmethod" => opts.use_exa = value.trim().eq_ignore_ascii_case("exa"),
                _ => tracing::debug!(key, "ignoring unknown option"),
            }
        }
        Ok(opts)
    }

    /// Backend selected by these options.
    pub fn backend_kind(&self) -> BackendKind {
        if self.use_dumb {
            BackendKind::Dumb
        } else {
            BackendKind::Ump
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
