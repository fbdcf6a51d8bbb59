use serde::{Deserialize, Serialize};

use super::WebhookId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookInfo {
    pub id: WebhookId,
    pub id_model: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub active: bool,
}

impl WebhookInfo {
    pub fn watches(&self, model: &str, callback_url: &str) -> bool {
        self.id_model == model && self.callback_url == callback_url
    }
}
