// Payload schemas for the feed index endpoint.
//
// The same endpoint returns two very different documents: the profile index
// (user info + tab listing) and a card list (the posts themselves). Validation
// here is purely structural. Each shape is a serde model, and a payload is
// accepted as a shape only if it deserializes into that model. Deciding which
// shape to try is the caller's job (see pipeline::state).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::FEED_TAB_TYPE;

/// Timestamp format used by `mblog.created_at`, e.g. `Sat Oct 18 20:15:03 +0800 2025`.
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload does not match the {shape} shape: {source}")]
    Shape {
        shape: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("index payload has an empty screen name")]
    EmptyScreenName,
}

/// Decode a response body into a JSON value.
pub fn decode(body: &str) -> Result<Value, SchemaError> {
    Ok(serde_json::from_str(body)?)
}

/// Validate a payload against the Index shape.
///
/// Requires `data.userInfo.screen_name` (non-empty) and a `data.tabsInfo.tabs`
/// list. Whether a feed tab exists is left to [`IndexPayload::feed_container_id`].
pub fn validate_index(value: &Value) -> Result<IndexPayload, SchemaError> {
    let payload = IndexPayload::deserialize(value).map_err(|source| SchemaError::Shape {
        shape: "index",
        source,
    })?;
    if payload.data.user_info.screen_name.trim().is_empty() {
        return Err(SchemaError::EmptyScreenName);
    }
    Ok(payload)
}

/// Validate a payload against the CardList shape.
///
/// Every card must carry an `mblog` record; `card_type` is optional.
pub fn validate_card_list(value: &Value) -> Result<CardListPayload, SchemaError> {
    CardListPayload::deserialize(value).map_err(|source| SchemaError::Shape {
        shape: "card list",
        source,
    })
}

// -- Index shape --

#[derive(Debug, Clone, Deserialize)]
pub struct IndexPayload {
    pub data: IndexData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexData {
    #[serde(rename = "userInfo")]
    pub user_info: UserInfo,
    #[serde(rename = "tabsInfo")]
    pub tabs_info: TabsInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub screen_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TabsInfo {
    pub tabs: Vec<Tab>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tab {
    #[serde(default)]
    pub tab_type: Option<String>,
    #[serde(default)]
    pub containerid: Option<String>,
}

impl IndexPayload {
    pub fn screen_name(&self) -> &str {
        &self.data.user_info.screen_name
    }

    /// Container id of the first `weibo` tab that has one.
    pub fn feed_container_id(&self) -> Option<&str> {
        self.data
            .tabs_info
            .tabs
            .iter()
            .filter(|tab| tab.tab_type.as_deref() == Some(FEED_TAB_TYPE))
            .find_map(|tab| tab.containerid.as_deref().filter(|id| !id.is_empty()))
    }
}

// -- CardList shape --

#[derive(Debug, Clone, Deserialize)]
pub struct CardListPayload {
    pub data: CardListData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardListData {
    pub cards: Vec<Card>,
}

/// One feed entry. Only `card_type == 9` is a real post.
#[derive(Debug, Clone, Deserialize)]
pub struct Card {
    #[serde(default)]
    pub card_type: Option<i64>,
    pub mblog: Mblog,
}

/// The post nested inside a card.
#[derive(Debug, Clone, Deserialize)]
pub struct Mblog {
    pub id: String,
    pub text: String,
    pub created_at: String,
    #[serde(default)]
    pub original_pic: Option<String>,
    #[serde(default)]
    pub page_info: Option<PageInfo>,
    /// Present when the post is a repost of someone else's post.
    #[serde(default)]
    pub retweeted_status: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub page_pic: Option<PagePic>,
    #[serde(default)]
    pub page_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagePic {
    pub url: String,
}

/// Attachment kind carried in `page_info.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Article,
    Video,
    Other,
}

impl PageInfo {
    pub fn page_kind(&self) -> PageKind {
        match self.kind.as_str() {
            "article" => PageKind::Article,
            "video" => PageKind::Video,
            _ => PageKind::Other,
        }
    }

    pub fn picture_url(&self) -> &str {
        self.page_pic.as_ref().map(|p| p.url.as_str()).unwrap_or("")
    }

    pub fn url(&self) -> &str {
        self.page_url.as_deref().unwrap_or("")
    }
}

impl Card {
    pub fn is_post(&self) -> bool {
        self.card_type == Some(super::POST_CARD_TYPE)
    }
}

impl Mblog {
    /// Parsed `created_at`, normalized to UTC. `None` if the format is unknown.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_str(&self.created_at, CREATED_AT_FORMAT)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn is_reshare(&self) -> bool {
        self.retweeted_status.is_some()
    }
}
