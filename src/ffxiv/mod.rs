//! FFXIV character and item lookups against XIVAPI.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum FfxivError {
    #[error("XIVAPI request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("XIVAPI returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("nothing found for '{0}'")]
    NotFound(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CharacterSummary {
    #[serde(rename = "ID")]
    pub id: u64,
    pub name: String,
    pub server: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ClassJob {
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub unlocked_state: Option<NamedRef>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct NamedRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CharacterProfile {
    #[serde(rename = "ID")]
    pub id: u64,
    pub name: String,
    pub server: String,
    #[serde(rename = "DC", default)]
    pub data_center: Option<String>,
    #[serde(default)]
    pub portrait: Option<String>,
    #[serde(default)]
    pub free_company_name: Option<String>,
    #[serde(default)]
    pub active_class_job: Option<ClassJob>,
    #[serde(default)]
    pub class_jobs: Vec<ClassJob>,
}

impl CharacterProfile {
    pub fn active_job(&self) -> Option<(String, u32)> {
        let job = self.active_class_job.as_ref()?;
        let name = job.unlocked_state.as_ref()?.name.clone()?;
        Some((name, job.level))
    }

    /// Jobs at level 90 or above.
    pub fn high_level_jobs(&self) -> usize {
        self.class_jobs.iter().filter(|j| j.level >= 90).count()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ItemSummary {
    #[serde(rename = "ID")]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CharacterResponse {
    character: CharacterProfile,
}

#[derive(Clone)]
pub struct XivApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl XivApiClient {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Absolute URL for an icon/portrait path as XIVAPI returns it.
    pub fn asset_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, FfxivError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("XIVAPI: GET {}", url);
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.query(&[("private_key", key.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FfxivError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("XIVAPI: {} returned {}: {}", url, status, message);
            return Err(FfxivError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn search_character(&self, name: &str, server: &str) -> Result<CharacterSummary, FfxivError> {
        let found: SearchResponse<CharacterSummary> = self
            .get("/character/search", &[("name", name), ("server", server)])
            .await?;
        pick_character(found.results, name, server)
    }

    pub async fn character(&self, id: u64) -> Result<CharacterProfile, FfxivError> {
        let found: CharacterResponse = self
            .get(&format!("/character/{}", id), &[("extended", "1")])
            .await?;
        Ok(found.character)
    }

    pub async fn search_item(&self, name: &str) -> Result<Vec<ItemSummary>, FfxivError> {
        let found: SearchResponse<ItemSummary> = self
            .get("/search", &[("string", name), ("indexes", "Item"), ("limit", "5")])
            .await?;
        if found.results.is_empty() {
            return Err(FfxivError::NotFound(name.to_string()));
        }
        Ok(found.results)
    }
}

/// Exact name match wins over the first fuzzy result.
fn pick_character(results: Vec<CharacterSummary>, name: &str, server: &str) -> Result<CharacterSummary, FfxivError> {
    let exact = results
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case(name) && c.server.eq_ignore_ascii_case(server));
    let index = exact.or(if results.is_empty() { None } else { Some(0) });
    index
        .and_then(|i| results.into_iter().nth(i))
        .ok_or_else(|| FfxivError::NotFound(format!("{} @ {}", name, server)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_character_search() {
        let body = r#"{"Pagination":{"Page":1},"Results":[
            {"Avatar":"https://img/a.jpg","ID":123,"Name":"Wol Light","Server":"Cerberus"},
            {"ID":456,"Name":"Wol Lightbringer","Server":"Cerberus"}
        ]}"#;
        let parsed: SearchResponse<CharacterSummary> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 2);

        let picked = pick_character(parsed.results, "wol lightbringer", "cerberus").unwrap();
        assert_eq!(picked.id, 456);
    }

    #[test]
    fn test_pick_falls_back_to_first_or_not_found() {
        let results = vec![CharacterSummary {
            id: 1,
            name: "A".to_string(),
            server: "B".to_string(),
            avatar: None,
        }];
        assert_eq!(pick_character(results, "x", "y").unwrap().id, 1);
        assert!(matches!(
            pick_character(Vec::new(), "x", "y"),
            Err(FfxivError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_character_profile() {
        let body = r#"{"Character":{"ID":9,"Name":"Y'shtola Rhul","Server":"Twintania","DC":"Light",
            "FreeCompanyName":"Scions","ActiveClassJob":{"Level":90,"UnlockedState":{"Name":"Sage"}},
            "ClassJobs":[{"Level":90},{"Level":72},{"Level":100}]}}"#;
        let parsed: CharacterResponse = serde_json::from_str(body).unwrap();
        let profile = parsed.character;
        assert_eq!(profile.data_center.as_deref(), Some("Light"));
        assert_eq!(profile.active_job(), Some(("Sage".to_string(), 90)));
        assert_eq!(profile.high_level_jobs(), 2);
    }

    #[test]
    fn test_asset_url() {
        let client = XivApiClient::new(Client::new(), "https://xivapi.com/", None);
        assert_eq!(client.asset_url("/i/1.png"), "https://xivapi.com/i/1.png");
        assert_eq!(client.asset_url("https://cdn/x.png"), "https://cdn/x.png");
    }
}
