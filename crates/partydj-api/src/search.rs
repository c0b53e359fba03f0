//! Search requests and results

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to search for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchRequest {
    /// Free-text search
    Query {
        q: String,
        page_token: Option<String>,
    },
    /// Videos related to a given video
    Related {
        video_id: String,
        page_token: Option<String>,
    },
}

impl SearchRequest {
    pub fn query(q: impl Into<String>) -> Self {
        SearchRequest::Query {
            q: q.into(),
            page_token: None,
        }
    }

    pub fn related(video_id: impl Into<String>) -> Self {
        SearchRequest::Related {
            video_id: video_id.into(),
            page_token: None,
        }
    }

    /// Query-string parameters for the proxy's `/search` endpoint
    pub fn proxy_params(&self) -> Vec<(&'static str, String)> {
        let (mut params, page_token) = match self {
            SearchRequest::Query { q, page_token } => (vec![("q", q.trim().to_string())], page_token),
            SearchRequest::Related {
                video_id,
                page_token,
            } => (vec![("related", video_id.trim().to_string())], page_token),
        };
        if let Some(token) = page_token.as_ref().filter(|t| !t.is_empty()) {
            params.push(("pageToken", token.clone()));
        }
        params
    }
}

/// One decoded search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub video_id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    pub channel: Option<String>,
}

/// A page of results plus the token for the next page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub next_page_token: Option<String>,
}

impl SearchPage {
    /// Decode the upstream search response body the proxy passes through.
    ///
    /// Anything unexpected yields fewer hits, never an error: items without
    /// a video id are skipped and a body without `items` is an empty page.
    pub fn from_upstream(body: &Value) -> Self {
        let hits = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(decode_hit).collect())
            .unwrap_or_default();

        let next_page_token = body
            .get("nextPageToken")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            hits,
            next_page_token,
        }
    }
}

fn decode_hit(item: &Value) -> Option<SearchHit> {
    let video_id = match item.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(id) => id.get("videoId")?.as_str()?.to_string(),
        None => return None,
    };
    if video_id.trim().is_empty() {
        return None;
    }

    let snippet = item.get("snippet");
    let text = |field: &str| {
        snippet
            .and_then(|s| s.get(field))
            .and_then(Value::as_str)
            .map(decode_entities)
    };

    let thumbnail = snippet
        .and_then(|s| s.get("thumbnails"))
        .and_then(|thumbs| {
            ["medium", "default", "high"]
                .iter()
                .find_map(|size| thumbs.get(size)?.get("url")?.as_str())
        })
        .map(str::to_string);

    Some(SearchHit {
        video_id,
        title: text("title").unwrap_or_default(),
        thumbnail,
        channel: text("channelTitle"),
    })
}

/// Undo the HTML entity escaping the search API applies to titles
pub fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_upstream_page() {
        let body = json!({
            "nextPageToken": "CAwQAA",
            "items": [
                {
                    "id": { "kind": "youtube#video", "videoId": "abc123" },
                    "snippet": {
                        "title": "Rock &amp; Roll &#39;Live&#39;",
                        "channelTitle": "Band",
                        "thumbnails": {
                            "default": { "url": "https://i.ytimg.com/d.jpg" },
                            "medium": { "url": "https://i.ytimg.com/m.jpg" }
                        }
                    }
                },
                { "id": { "kind": "youtube#channel", "channelId": "xyz" } },
                { "snippet": { "title": "no id" } }
            ]
        });

        let page = SearchPage::from_upstream(&body);
        assert_eq!(page.next_page_token.as_deref(), Some("CAwQAA"));
        assert_eq!(page.hits.len(), 1);
        assert_eq!(page.hits[0].video_id, "abc123");
        assert_eq!(page.hits[0].title, "Rock & Roll 'Live'");
        assert_eq!(page.hits[0].thumbnail.as_deref(), Some("https://i.ytimg.com/m.jpg"));
        assert_eq!(page.hits[0].channel.as_deref(), Some("Band"));
    }

    #[test]
    fn malformed_body_is_empty_page() {
        assert_eq!(SearchPage::from_upstream(&json!("oops")), SearchPage::default());
        assert_eq!(
            SearchPage::from_upstream(&json!({ "items": 5 })),
            SearchPage::default()
        );
    }

    #[test]
    fn proxy_params() {
        let request = SearchRequest::Query {
            q: "  daft punk ".into(),
            page_token: Some("NEXT".into()),
        };
        assert_eq!(
            request.proxy_params(),
            vec![("q", "daft punk".to_string()), ("pageToken", "NEXT".to_string())]
        );
        assert_eq!(
            SearchRequest::related("abc").proxy_params(),
            vec![("related", "abc".to_string())]
        );
    }
}
