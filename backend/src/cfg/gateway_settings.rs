use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub graph_api_base_url: String,

    #[serde(default)]
    pub request_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            graph_api_base_url: "https://graph.facebook.com/v18.0".to_string(),
            request_timeout_secs: 10,
        }
    }
}
