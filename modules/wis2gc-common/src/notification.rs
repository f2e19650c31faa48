use chrono::NaiveDateTime;
use serde_json::Value;

use crate::error::Wis2Error;

/// Integrity assertion carried on a notification's `properties.integrity` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityBlock {
    pub method: String,
    pub value: String,
}

/// Inline payload carried on a notification's `properties.content` block.
#[derive(Debug, Clone)]
pub struct ContentBlock {
    pub value: String,
    pub encoding: String,
    pub size: Option<u64>,
}

/// The chosen download source, resolved from the notification's `links`.
#[derive(Debug, Clone)]
pub struct SourceLink {
    pub href: String,
    pub dataserver: String,
    pub filename: String,
}

/// A parsed, validated WIS2 notification.
///
/// `raw` remains the source of truth for anything not hoisted into a typed
/// field, so `format_downstream` can clone it and only touch `id`, `topic`,
/// and the canonical/update link hrefs — every other property (including
/// ones this pipeline doesn't understand) survives untouched.
#[derive(Debug, Clone)]
pub struct Notification {
    raw: Value,
    pub id: String,
    pub topic: String,
    pub centre: String,
    pub data_id: String,
    pub pubtime: String,
    pub pubtime_epoch: f64,
    pub do_cache: bool,
    pub integrity_block: Option<IntegrityBlock>,
    pub content_block: Option<ContentBlock>,
}

impl Notification {
    /// Parse and validate a raw WIS2 notification payload.
    pub fn parse(raw_bytes: &[u8]) -> Result<Notification, Wis2Error> {
        let raw: Value =
            serde_json::from_slice(raw_bytes).map_err(|e| Wis2Error::BadJson(e.to_string()))?;

        let id = field_str(&raw, &["id"])?;
        let topic = field_str(&raw, &["topic"])?;
        let data_id = field_str(&raw, &["properties", "data_id"])?;
        let pubtime = field_str(&raw, &["properties", "pubtime"])?;

        if !raw.pointer("/links").map(|v| v.is_array()).unwrap_or(false) {
            return Err(Wis2Error::MissingField("links".to_string()));
        }

        let centre = topic
            .split('/')
            .nth(3)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Wis2Error::MissingField("topic centre segment".to_string()))?
            .to_string();

        let pubtime_epoch = parse_pubtime(&pubtime)?;

        let do_cache = match raw.pointer("/properties/cache") {
            None => true,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s != "false",
            Some(_) => true,
        };

        let integrity_block = raw.pointer("/properties/integrity").and_then(|v| {
            Some(IntegrityBlock {
                method: v.get("method")?.as_str()?.to_string(),
                value: v.get("value")?.as_str()?.to_string(),
            })
        });

        let content_block = raw.pointer("/properties/content").and_then(|v| {
            Some(ContentBlock {
                value: v.get("value")?.as_str()?.to_string(),
                encoding: v.get("encoding")?.as_str()?.to_string(),
                size: v.get("size").and_then(|s| s.as_u64()),
            })
        });

        Ok(Notification {
            raw,
            id,
            topic,
            centre,
            data_id,
            pubtime,
            pubtime_epoch,
            do_cache,
            integrity_block,
            content_block,
        })
    }

    /// Resolve the download source: first `update` link, else first `canonical`.
    pub fn select_source(&self) -> Result<SourceLink, Wis2Error> {
        let links = self
            .raw
            .pointer("/links")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let find_rel = |rel: &str| {
            links
                .iter()
                .find(|l| l.get("rel").and_then(|r| r.as_str()) == Some(rel))
        };
        let chosen = find_rel("update")
            .or_else(|| find_rel("canonical"))
            .ok_or(Wis2Error::MissingSourceLink)?;

        let href = chosen
            .get("href")
            .and_then(|h| h.as_str())
            .unwrap_or("")
            .to_string();
        if href.trim().is_empty() {
            return Err(Wis2Error::BadSourceUrl(format!(
                "empty URL in message {}",
                self.data_id
            )));
        }

        let parsed = url::Url::parse(&href).map_err(|e| Wis2Error::BadSourceUrl(e.to_string()))?;
        let host = parsed.host_str().unwrap_or("");
        if host.is_empty() {
            return Err(Wis2Error::BadSourceHost(format!(
                "no hostname in URL: {href}"
            )));
        }

        let path = parsed.path().trim_end_matches('/');
        let last_segment = path.rsplit('/').next().unwrap_or("");
        let filename = if last_segment.is_empty() {
            tracing::warn!(href = %href, data_id = %self.data_id, "could not extract filename from URL, using 'unknown'");
            "unknown".to_string()
        } else {
            percent_encoding::percent_decode_str(last_segment)
                .decode_utf8_lossy()
                .to_string()
        };

        Ok(SourceLink {
            href,
            dataserver: host.to_string(),
            filename,
        })
    }

    /// Whether the notification carries a `rel: "update"` link — novelty for
    /// an equal-or-earlier `pubtime_epoch` hinges on this.
    pub fn has_update_link(&self) -> bool {
        self.raw
            .pointer("/links")
            .and_then(|v| v.as_array())
            .map(|links| {
                links
                    .iter()
                    .any(|l| l.get("rel").and_then(|r| r.as_str()) == Some("update"))
            })
            .unwrap_or(false)
    }

    /// Whether any link's href contains `bucket_name` — a loop-prevention check.
    pub fn already_cached_by(&self, bucket_name: &str) -> bool {
        self.raw
            .pointer("/links")
            .and_then(|v| v.as_array())
            .map(|links| {
                links.iter().any(|l| {
                    l.get("href")
                        .and_then(|h| h.as_str())
                        .map(|h| h.contains(bucket_name))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    /// `message_group_id`: non-word characters stripped from `data_id`, last 127 chars.
    pub fn message_group_id(&self) -> String {
        derive_message_group_id(&self.data_id)
    }

    /// Downstream topic: first path segment rewritten from `origin` to `cache`.
    pub fn new_topic(&self) -> String {
        match self.topic.split_once('/') {
            Some((first, rest)) if first == "origin" => format!("cache/{rest}"),
            _ => self.topic.clone(),
        }
    }

    /// Error topic: `error/` prefixed onto the incoming topic.
    pub fn error_topic(&self) -> String {
        format!("error/{}", self.topic)
    }

    /// Cached blob key: `data/<everything after the wis2 segment>/<filename>`.
    pub fn cached_blob_key(&self, filename: &str) -> String {
        let pieces: Vec<&str> = self.topic.split('/').collect();
        let idx = pieces
            .iter()
            .position(|&p| p == "wis2")
            .map(|i| i + 1)
            .unwrap_or(0);
        let after = pieces[idx..].join("/");
        format!("data/{after}/{filename}")
    }

    /// Set the integrity block, patching both the typed field and the raw JSON
    /// so that `format_downstream` republishes it.
    pub fn set_integrity_block(&mut self, block: IntegrityBlock) {
        if let Some(props) = self
            .raw
            .get_mut("properties")
            .and_then(|p| p.as_object_mut())
        {
            props.insert(
                "integrity".to_string(),
                serde_json::json!({"method": block.method, "value": block.value}),
            );
        }
        self.integrity_block = Some(block);
    }

    /// Build the republished notification: fresh UUID `id`, `topic` dropped,
    /// and — only when caching — canonical/update link hrefs rewritten to
    /// `cache_url`. All other properties (including unknown ones) pass through.
    pub fn format_downstream(&self, cache_url: Option<&str>) -> Value {
        let mut msg = self.raw.clone();
        if let Some(obj) = msg.as_object_mut() {
            obj.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
            obj.remove("topic");

            if self.do_cache {
                if let Some(url) = cache_url {
                    if let Some(links) = obj.get_mut("links").and_then(|l| l.as_array_mut()) {
                        for link in links.iter_mut() {
                            let rel = link.get("rel").and_then(|r| r.as_str());
                            if matches!(rel, Some("canonical") | Some("update")) {
                                if let Some(lobj) = link.as_object_mut() {
                                    lobj.insert("href".to_string(), Value::String(url.to_string()));
                                }
                            }
                        }
                    }
                }
            }
        }
        msg
    }

    /// Enrich the original raw message with an `{error: {msg, traceback}}` block,
    /// for publication on the error topic.
    pub fn to_error_payload(&self, msg: &str, traceback: &str) -> Value {
        let mut payload = self.raw.clone();
        if let Some(obj) = payload.as_object_mut() {
            obj.insert(
                "error".to_string(),
                serde_json::json!({"msg": msg, "traceback": traceback}),
            );
        }
        payload
    }
}

/// Loop-prevention check against a raw (not-yet-validated) JSON payload —
/// used at ingress, before the message is known to be a well-formed
/// notification at all.
pub fn raw_already_cached_by(raw: &Value, bucket_name: &str) -> bool {
    raw.pointer("/links")
        .and_then(|v| v.as_array())
        .map(|links| {
            links.iter().any(|l| {
                l.get("href")
                    .and_then(|h| h.as_str())
                    .map(|h| h.contains(bucket_name))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

/// Derive a `message_group_id` from a `data_id`: strip non-word characters,
/// keep the last 127. Shared with C8, which derives a group key before a
/// notification has been fully parsed into a [`Notification`].
pub fn derive_message_group_id(data_id: &str) -> String {
    let stripped: String = data_id
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let len = stripped.chars().count();
    if len <= 127 {
        stripped
    } else {
        stripped.chars().skip(len - 127).collect()
    }
}

fn field_str(raw: &Value, path: &[&str]) -> Result<String, Wis2Error> {
    let mut cur = raw;
    for p in path {
        cur = cur
            .get(p)
            .ok_or_else(|| Wis2Error::MissingField(path.join(".")))?;
    }
    cur.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| Wis2Error::MissingField(path.join(".")))
}

/// Parse `pubtime` into seconds-since-epoch.
///
/// Accepts strict `YYYY-MM-DDTHH:MM:SSZ`, and a defensive fallback for
/// fractional forms where a trailing `:NNN` is reinterpreted as `.NNN` and
/// sub-second precision beyond 3 digits is truncated before parsing.
fn parse_pubtime(raw: &str) -> Result<f64, Wis2Error> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ") {
        return Ok(to_epoch(dt));
    }

    let mut s = raw.to_string();
    if s.split(':').count() == 4 {
        if let Some(idx) = s.rfind(':') {
            s.replace_range(idx..idx + 1, ".");
        }
    }

    let mut parts = s.splitn(2, '.');
    let date_part = parts.next().ok_or(Wis2Error::BadPubtime)?;
    let frac_part = parts.next().ok_or(Wis2Error::BadPubtime)?;
    let frac_part = if frac_part.len() > 4 {
        format!("{}Z", &frac_part[..3])
    } else {
        frac_part.to_string()
    };
    let new_dt = format!("{date_part}.{frac_part}");

    let dt = NaiveDateTime::parse_from_str(&new_dt, "%Y-%m-%dT%H:%M:%S%.fZ")
        .map_err(|_| Wis2Error::BadPubtime)?;
    Ok(to_epoch(dt))
}

fn to_epoch(dt: NaiveDateTime) -> f64 {
    let utc = dt.and_utc();
    utc.timestamp() as f64 + utc.timestamp_subsec_nanos() as f64 / 1_000_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pubtime: &str, extra: &str) -> String {
        format!(
            r#"{{
                "id": "msg-1",
                "topic": "origin/a/wis2/xyz/data/core/weather",
                "properties": {{
                    "data_id": "P1",
                    "pubtime": "{pubtime}"{extra}
                }},
                "links": [
                    {{"rel": "canonical", "href": "https://src.example.com/a/weather.bin"}}
                ]
            }}"#
        )
    }

    #[test]
    fn parses_required_fields() {
        let n = Notification::parse(sample("2024-05-01T00:00:00Z", "").as_bytes()).unwrap();
        assert_eq!(n.data_id, "P1");
        assert_eq!(n.centre, "xyz");
        assert!(n.do_cache);
        assert_eq!(n.pubtime_epoch, 1714521600.0);
    }

    #[test]
    fn missing_field_fails() {
        let bad = r#"{"id": "x", "topic": "origin/a/wis2/xyz/data/core/weather", "links": []}"#;
        let err = Notification::parse(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, Wis2Error::MissingField(_)));
    }

    #[test]
    fn fractional_colon_pubtime_recovers() {
        // a trailing `:NNN` reinterpreted as `.NNN`
        let n = Notification::parse(sample("2024-05-01T00:00:00:123Z", "").as_bytes()).unwrap();
        assert!((n.pubtime_epoch - 1714521600.123).abs() < 1e-6);
    }

    #[test]
    fn long_fraction_truncated_to_three_digits() {
        let n = Notification::parse(sample("2024-05-01T00:00:00.123456Z", "").as_bytes()).unwrap();
        assert!((n.pubtime_epoch - 1714521600.123).abs() < 1e-6);
    }

    #[test]
    fn cache_false_disables_caching() {
        let n = Notification::parse(
            sample("2024-05-01T00:00:00Z", r#", "cache": false"#).as_bytes(),
        )
        .unwrap();
        assert!(!n.do_cache);
    }

    #[test]
    fn select_source_prefers_update_over_canonical() {
        let raw = r#"{
            "id": "x", "topic": "origin/a/wis2/xyz/data/core/weather",
            "properties": {"data_id": "P1", "pubtime": "2024-05-01T00:00:00Z"},
            "links": [
                {"rel": "canonical", "href": "https://old.example.com/a.bin"},
                {"rel": "update", "href": "https://new.example.com/b.bin"}
            ]
        }"#;
        let n = Notification::parse(raw.as_bytes()).unwrap();
        let src = n.select_source().unwrap();
        assert_eq!(src.href, "https://new.example.com/b.bin");
        assert_eq!(src.dataserver, "new.example.com");
        assert_eq!(src.filename, "b.bin");
    }

    #[test]
    fn select_source_fails_without_links() {
        let raw = r#"{
            "id": "x", "topic": "origin/a/wis2/xyz/data/core/weather",
            "properties": {"data_id": "P1", "pubtime": "2024-05-01T00:00:00Z"},
            "links": [{"rel": "other", "href": "https://x.example.com/a"}]
        }"#;
        let n = Notification::parse(raw.as_bytes()).unwrap();
        assert!(matches!(n.select_source(), Err(Wis2Error::MissingSourceLink)));
    }

    #[test]
    fn empty_path_yields_unknown_filename() {
        let raw = r#"{
            "id": "x", "topic": "origin/a/wis2/xyz/data/core/weather",
            "properties": {"data_id": "P1", "pubtime": "2024-05-01T00:00:00Z"},
            "links": [{"rel": "canonical", "href": "https://src.example.com"}]
        }"#;
        let n = Notification::parse(raw.as_bytes()).unwrap();
        let src = n.select_source().unwrap();
        assert_eq!(src.filename, "unknown");
    }

    #[test]
    fn new_topic_rewrites_first_segment_only() {
        let n = Notification::parse(sample("2024-05-01T00:00:00Z", "").as_bytes()).unwrap();
        assert_eq!(n.new_topic(), "cache/a/wis2/xyz/data/core/weather");
    }

    #[test]
    fn cached_blob_key_uses_segment_after_wis2() {
        let n = Notification::parse(sample("2024-05-01T00:00:00Z", "").as_bytes()).unwrap();
        assert_eq!(
            n.cached_blob_key("weather.bin"),
            "data/xyz/data/core/weather/weather.bin"
        );
    }

    #[test]
    fn message_group_id_strips_non_word_chars_and_truncates() {
        let raw = format!(
            r#"{{
                "id": "x", "topic": "origin/a/wis2/xyz/data/core/weather",
                "properties": {{"data_id": "{}", "pubtime": "2024-05-01T00:00:00Z"}},
                "links": [{{"rel": "canonical", "href": "https://src.example.com/a.bin"}}]
            }}"#,
            "a-b.c_d".repeat(20)
        );
        let n = Notification::parse(raw.as_bytes()).unwrap();
        let gid = n.message_group_id();
        assert!(gid.len() <= 127);
        assert!(gid.chars().all(|c| c.is_alphanumeric() || c == '_'));
    }

    #[test]
    fn format_downstream_preserves_non_source_links_and_drops_topic() {
        let raw = r#"{
            "id": "orig-id", "topic": "origin/a/wis2/xyz/data/core/weather",
            "properties": {"data_id": "P1", "pubtime": "2024-05-01T00:00:00Z", "cache": true},
            "links": [
                {"rel": "canonical", "href": "https://src.example.com/a.bin"},
                {"rel": "self", "href": "https://meta.example.com/self", "type": "application/json"}
            ]
        }"#;
        let n = Notification::parse(raw.as_bytes()).unwrap();
        let out = n.format_downstream(Some("https://bucket.example.com/data/xyz/a.bin"));
        assert_ne!(out["id"], serde_json::json!("orig-id"));
        assert!(out.get("topic").is_none());
        let links = out["links"].as_array().unwrap();
        assert_eq!(
            links[0]["href"],
            serde_json::json!("https://bucket.example.com/data/xyz/a.bin")
        );
        assert_eq!(links[1]["href"], serde_json::json!("https://meta.example.com/self"));
        assert_eq!(links[1]["type"], serde_json::json!("application/json"));
        assert_eq!(out["properties"]["data_id"], serde_json::json!("P1"));
        assert_eq!(out["properties"]["pubtime"], serde_json::json!("2024-05-01T00:00:00Z"));
        assert_eq!(out["properties"]["cache"], serde_json::json!(true));
    }

    #[test]
    fn format_downstream_passthrough_leaves_links_untouched() {
        let raw = r#"{
            "id": "orig-id", "topic": "origin/a/wis2/xyz/data/core/weather",
            "properties": {"data_id": "P1", "pubtime": "2024-05-01T00:00:00Z", "cache": false},
            "links": [{"rel": "canonical", "href": "https://src.example.com/a.bin"}]
        }"#;
        let n = Notification::parse(raw.as_bytes()).unwrap();
        let out = n.format_downstream(None);
        assert_eq!(out["links"][0]["href"], serde_json::json!("https://src.example.com/a.bin"));
    }

    #[test]
    fn has_update_link_detects_rel() {
        let n = Notification::parse(sample("2024-05-01T00:00:00Z", "").as_bytes()).unwrap();
        assert!(!n.has_update_link());

        let raw = r#"{
            "id": "x", "topic": "origin/a/wis2/xyz/data/core/weather",
            "properties": {"data_id": "P1", "pubtime": "2024-05-01T00:00:00Z"},
            "links": [
                {"rel": "canonical", "href": "https://old.example.com/a.bin"},
                {"rel": "update", "href": "https://new.example.com/b.bin"}
            ]
        }"#;
        let n = Notification::parse(raw.as_bytes()).unwrap();
        assert!(n.has_update_link());
    }

    #[test]
    fn already_cached_by_detects_loop() {
        let raw = r#"{
            "id": "x", "topic": "origin/a/wis2/xyz/data/core/weather",
            "properties": {"data_id": "P1", "pubtime": "2024-05-01T00:00:00Z"},
            "links": [{"rel": "canonical", "href": "https://my-bucket.s3.amazonaws.com/data/x"}]
        }"#;
        let n = Notification::parse(raw.as_bytes()).unwrap();
        assert!(n.already_cached_by("my-bucket"));
        assert!(!n.already_cached_by("other-bucket"));
    }
}
