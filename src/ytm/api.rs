use crate::ytm::models::Track;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const LYRICS_PAGE_TYPE: &str = "MUSIC_PAGE_TYPE_TRACK_LYRICS";

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    bootstrap: OnceCell<Bootstrap>,
}

/// YouTube Music innertube client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct YtmClient {
    inner: Arc<Inner>,
}

#[derive(Debug, Clone)]
struct Bootstrap {
    api_key: String,
    client_version: String,
    visitor_data: Option<String>,
}

impl YtmClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"),
        );
        headers.insert(ORIGIN, HeaderValue::from_static("https://music.youtube.com"));
        headers.insert(REFERER, HeaderValue::from_static("https://music.youtube.com/"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                bootstrap: OnceCell::new(),
            }),
        })
    }

    /// Plain lyrics shown in the "Lyrics" tab of the watch page.
    ///
    /// `Ok(None)` when the track has no lyrics tab or the tab is empty.
    pub async fn lyrics(&self, video_id: &str) -> anyhow::Result<Option<String>> {
        let b = self.bootstrap().await?;

        let next: serde_json::Value = self
            .innertube_post("next", &b)
            .json(&json!({
                "context": client_context(&b),
                "videoId": video_id,
                "isAudioOnly": true
            }))
            .send()
            .await
            .context("send next request")?
            .error_for_status()
            .context("next http status")?
            .json()
            .await
            .context("parse next json")?;

        let Some(browse_id) = extract_lyrics_browse_id(&next) else {
            return Ok(None);
        };

        let page: serde_json::Value = self
            .innertube_post("browse", &b)
            .json(&json!({
                "context": client_context(&b),
                "browseId": browse_id
            }))
            .send()
            .await
            .context("send browse lyrics request")?
            .error_for_status()
            .context("browse lyrics http status")?
            .json()
            .await
            .context("parse browse lyrics json")?;

        Ok(extract_description_text(&page))
    }

    /// Title, artist and length for a video id.
    pub async fn track(&self, video_id: &str) -> anyhow::Result<Track> {
        let b = self.bootstrap().await?;

        let v: serde_json::Value = self
            .innertube_post("player", &b)
            .json(&json!({
                "context": client_context(&b),
                "videoId": video_id
            }))
            .send()
            .await
            .context("send player request")?
            .error_for_status()
            .context("player http status")?
            .json()
            .await
            .context("parse player json")?;

        parse_video_details(&v, video_id).context("player response has no videoDetails")
    }

    async fn bootstrap(&self) -> anyhow::Result<Bootstrap> {
        self.inner
            .bootstrap
            .get_or_try_init(|| async {
                let html = self
                    .inner
                    .http
                    .get("https://music.youtube.com/")
                    .send()
                    .await
                    .context("fetch music.youtube.com for bootstrap")?
                    .error_for_status()
                    .context("bootstrap http status")?
                    .text()
                    .await
                    .context("read bootstrap html")?;

                let api_key = parse_ytcfg_value(&html, "INNERTUBE_API_KEY")
                    .context("parse INNERTUBE_API_KEY")?;
                let client_version = parse_ytcfg_value(&html, "INNERTUBE_CLIENT_VERSION")
                    .context("parse INNERTUBE_CLIENT_VERSION")?;
                let visitor_data = parse_ytcfg_value(&html, "VISITOR_DATA");

                Ok(Bootstrap {
                    api_key,
                    client_version,
                    visitor_data,
                })
            })
            .await
            .cloned()
    }

    fn innertube_post(&self, path: &str, b: &Bootstrap) -> reqwest::RequestBuilder {
        let url = format!(
            "https://music.youtube.com/youtubei/v1/{path}?key={}&prettyPrint=false",
            b.api_key
        );

        let mut rb = self
            .inner
            .http
            .post(url)
            .header("X-Youtube-Client-Name", "67")
            .header("X-Youtube-Client-Version", b.client_version.as_str());

        if let Some(v) = b.visitor_data.as_deref() {
            rb = rb.header("X-Goog-Visitor-Id", v);
        }

        rb
    }
}

fn client_context(b: &Bootstrap) -> serde_json::Value {
    json!({
        "client": {
            "clientName": "WEB_REMIX",
            "clientVersion": b.client_version,
        }
    })
}

fn parse_ytcfg_value(html: &str, key: &str) -> Option<String> {
    // We look for `"KEY":"value"` occurrences in the initial HTML ytcfg payload.
    let needle = format!("{key}\":\"");
    let idx = html.find(&needle)?;
    let start = idx + needle.len();
    let rest = &html[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Browse id of the lyrics tab, unless the tab is greyed out.
fn extract_lyrics_browse_id(v: &serde_json::Value) -> Option<String> {
    find_first(v, &mut |node| {
        let tab = node.get("tabRenderer")?;
        let endpoint = tab.pointer("/endpoint/browseEndpoint")?;
        let page_type = endpoint
            .pointer("/browseEndpointContextSupportedConfigs/browseEndpointContextMusicConfig/pageType")?
            .as_str()?;
        if page_type != LYRICS_PAGE_TYPE {
            return None;
        }
        if tab.get("unselectable").and_then(|u| u.as_bool()) == Some(true) {
            return None;
        }
        endpoint.get("browseId")?.as_str().map(str::to_string)
    })
}

fn extract_description_text(v: &serde_json::Value) -> Option<String> {
    find_first(v, &mut |node| {
        let runs = node
            .pointer("/musicDescriptionShelfRenderer/description/runs")?
            .as_array()?;
        let text: String = runs
            .iter()
            .filter_map(|r| r.get("text").and_then(|t| t.as_str()))
            .collect();
        Some(text)
    })
}

fn parse_video_details(v: &serde_json::Value, video_id: &str) -> Option<Track> {
    let details = v.get("videoDetails")?;
    let title = details.get("title")?.as_str()?.to_string();
    let author = details
        .get("author")
        .and_then(|a| a.as_str())
        .map(|a| a.trim_end_matches(" - Topic").to_string());
    let duration_seconds = details
        .get("lengthSeconds")
        .and_then(|l| l.as_str())
        .and_then(|l| l.parse().ok());

    Some(Track {
        video_id: video_id.to_string(),
        title,
        artists: author.into_iter().collect(),
        album: None,
        duration_seconds,
    })
}

/// Depth-first search returning the first node `f` accepts.
fn find_first<T, F>(v: &serde_json::Value, f: &mut F) -> Option<T>
where
    F: FnMut(&serde_json::Value) -> Option<T>,
{
    if let Some(found) = f(v) {
        return Some(found);
    }
    match v {
        serde_json::Value::Array(a) => a.iter().find_map(|x| find_first(x, f)),
        serde_json::Value::Object(o) => o.values().find_map(|x| find_first(x, f)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lyrics_tab(browse_id: &str, unselectable: bool) -> serde_json::Value {
        json!({
            "tabRenderer": {
                "unselectable": unselectable,
                "endpoint": {
                    "browseEndpoint": {
                        "browseId": browse_id,
                        "browseEndpointContextSupportedConfigs": {
                            "browseEndpointContextMusicConfig": {
                                "pageType": LYRICS_PAGE_TYPE
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_lyrics_browse_id() {
        let next = json!({
            "contents": {
                "singleColumnMusicWatchNextResultsRenderer": {
                    "tabbedRenderer": {
                        "watchNextTabbedResultsRenderer": {
                            "tabs": [
                                { "tabRenderer": { "title": "Up next" } },
                                lyrics_tab("MPLYt_abc", false)
                            ]
                        }
                    }
                }
            }
        });
        assert_eq!(extract_lyrics_browse_id(&next).as_deref(), Some("MPLYt_abc"));

        let none = json!({ "tabs": [lyrics_tab("MPLYt_abc", true)] });
        assert_eq!(extract_lyrics_browse_id(&none), None);
    }

    #[test]
    fn test_description_text() {
        let page = json!({
            "contents": {
                "sectionListRenderer": {
                    "contents": [{
                        "musicDescriptionShelfRenderer": {
                            "description": { "runs": [{ "text": "line one\n" }, { "text": "line two" }] },
                            "footer": { "runs": [{ "text": "Source: LyricFind" }] }
                        }
                    }]
                }
            }
        });
        assert_eq!(
            extract_description_text(&page).as_deref(),
            Some("line one\nline two")
        );
        assert_eq!(extract_description_text(&json!({})), None);
    }

    #[test]
    fn test_video_details() {
        let v = json!({
            "videoDetails": {
                "videoId": "abc",
                "title": "Song",
                "author": "Band - Topic",
                "lengthSeconds": "215"
            }
        });
        let t = parse_video_details(&v, "abc").unwrap();
        assert_eq!(t.artists, vec!["Band".to_string()]);
        assert_eq!(t.duration_seconds, Some(215));
    }

    #[test]
    fn test_parse_ytcfg_value() {
        let html = r#"ytcfg.set({"INNERTUBE_API_KEY":"key123","INNERTUBE_CLIENT_VERSION":"1.2"})"#;
        assert_eq!(parse_ytcfg_value(html, "INNERTUBE_API_KEY").as_deref(), Some("key123"));
        assert_eq!(parse_ytcfg_value(html, "VISITOR_DATA"), None);
    }
}
