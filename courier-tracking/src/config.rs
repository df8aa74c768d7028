use serde::Deserialize;

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

const fn default_unsubscribe_ttl_days() -> u32 {
    90
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Origin serving `/tracking/open` and `/tracking/click`, unless the
    /// brand names its own
    #[serde(default = "default_origin")]
    pub tracking_domain: String,

    /// Origin serving `/unsubscribe/{token}`
    #[serde(default = "default_origin")]
    pub base_url: String,

    /// How long an unsubscribe link stays valid
    #[serde(default = "default_unsubscribe_ttl_days")]
    pub unsubscribe_ttl_days: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_domain: default_origin(),
            base_url: default_origin(),
            unsubscribe_ttl_days: default_unsubscribe_ttl_days(),
        }
    }
}

/// Normalise an origin: default to `https://` and drop trailing slashes.
pub fn normalise_origin(origin: &str) -> String {
    let origin = origin.trim().trim_end_matches('/');
    if origin.starts_with("http://") || origin.starts_with("https://") {
        origin.to_string()
    } else {
        format!("https://{origin}")
    }
}
