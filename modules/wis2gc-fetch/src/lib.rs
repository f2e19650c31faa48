//! C3: resolving a notification's payload to bytes, either decoded inline
//! from `properties.content` or streamed from the chosen source link.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use wis2gc_common::{ContentBlock, SourceLink, Wis2Error};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const CHUNK_SIZE: usize = 32 * 1024;

/// The result of fetching an object: its bytes, and — when the bytes were
/// streamed to disk rather than decoded inline — the scratch path they live
/// at, so the caller can remove it once it's been uploaded.
pub struct FetchedObject {
    pub bytes: Vec<u8>,
    pub tmp_path: Option<PathBuf>,
}

/// Build the `reqwest::Client` used for all source downloads.
///
/// `insecure_tls` disables certificate verification; only meant for the
/// local dev-mode workflow against self-signed test dataservers.
pub fn build_client(insecure_tls: bool) -> Result<reqwest::Client, Wis2Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(READ_TIMEOUT)
        .danger_accept_invalid_certs(insecure_tls)
        .build()
        .map_err(|e| Wis2Error::Fetch(e.to_string()))
}

/// Resolve a notification's object bytes: inline content takes precedence
/// over downloading, matching the original's preference for avoiding a
/// network round-trip when the dataserver already embedded the payload.
pub async fn fetch(
    client: &reqwest::Client,
    source: &SourceLink,
    content_block: Option<&ContentBlock>,
    tmp_dir: &Path,
) -> Result<FetchedObject, Wis2Error> {
    if let Some(block) = content_block {
        return fetch_inline(block);
    }
    fetch_streamed(client, source, tmp_dir).await
}

fn fetch_inline(block: &ContentBlock) -> Result<FetchedObject, Wis2Error> {
    let bytes = match block.encoding.as_str() {
        "utf-8" => block.value.as_bytes().to_vec(),
        "base64" => BASE64
            .decode(&block.value)
            .map_err(|e| Wis2Error::Fetch(format!("bad base64 content: {e}")))?,
        other => return Err(Wis2Error::UnsupportedEncoding(other.to_string())),
    };
    Ok(FetchedObject {
        bytes,
        tmp_path: None,
    })
}

async fn fetch_streamed(
    client: &reqwest::Client,
    source: &SourceLink,
    tmp_dir: &Path,
) -> Result<FetchedObject, Wis2Error> {
    let mut attempt = 0;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match try_download(client, source, tmp_dir).await {
            Ok(obj) => return Ok(obj),
            Err((err, retryable)) if retryable && attempt < MAX_RETRIES => {
                attempt += 1;
                tracing::warn!(
                    href = %source.href,
                    attempt,
                    error = %err,
                    "retrying download after server error"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err((err, _)) => return Err(err),
        }
    }
}

/// A single download attempt. The bool says whether a failure is worth
/// retrying (server errors only — client errors and I/O faults are not).
async fn try_download(
    client: &reqwest::Client,
    source: &SourceLink,
    tmp_dir: &Path,
) -> Result<FetchedObject, (Wis2Error, bool)> {
    let resp = client
        .get(&source.href)
        .send()
        .await
        .map_err(|e| (Wis2Error::Fetch(e.to_string()), false))?;

    let status = resp.status();
    if matches!(status.as_u16(), 500 | 502 | 503 | 504) {
        return Err((Wis2Error::Fetch(format!("server error {status}")), true));
    }
    if !status.is_success() {
        return Err((Wis2Error::Fetch(format!("http status {status}")), false));
    }

    if let Some(expected) = resp.content_length() {
        if expected > 0 {
            let available = available_space(tmp_dir);
            if available < expected {
                return Err((
                    Wis2Error::InsufficientStorage {
                        needed: expected,
                        available,
                    },
                    false,
                ));
            }
        }
    }

    let tmp_path = tmp_dir.join(format!("{}-{}", uuid_like(), source.filename));
    match stream_to_file(resp, &tmp_path).await {
        Ok(bytes) => Ok(FetchedObject {
            bytes,
            tmp_path: Some(tmp_path),
        }),
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            Err((e, false))
        }
    }
}

async fn stream_to_file(resp: reqwest::Response, path: &Path) -> Result<Vec<u8>, Wis2Error> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Wis2Error::Fetch(e.to_string()))?;
    let mut bytes = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Wis2Error::Fetch(e.to_string()))?;
        for piece in chunk.chunks(CHUNK_SIZE) {
            file.write_all(piece)
                .await
                .map_err(|e| Wis2Error::Fetch(e.to_string()))?;
        }
        bytes.extend_from_slice(&chunk);
    }
    file.flush().await.map_err(|e| Wis2Error::Fetch(e.to_string()))?;
    Ok(bytes)
}

/// Bytes free on the filesystem backing `dir`, matched by longest mount
/// point prefix. Falls back to `u64::MAX` (i.e. don't block) if the mount
/// can't be resolved, since a missing disk reading is not grounds to refuse
/// an otherwise-healthy download.
fn available_space(dir: &Path) -> u64 {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| dir.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
        .unwrap_or(u64::MAX)
}

/// A short random-ish token for scratch filenames, avoiding collisions
/// between concurrent fetches of the same filename without pulling in a
/// full UUID dependency for this crate.
fn uuid_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{nanos:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(value: &str, encoding: &str) -> ContentBlock {
        ContentBlock {
            value: value.to_string(),
            encoding: encoding.to_string(),
            size: None,
        }
    }

    #[test]
    fn decodes_utf8_inline_content() {
        let obj = fetch_inline(&block("hello world", "utf-8")).unwrap();
        assert_eq!(obj.bytes, b"hello world");
        assert!(obj.tmp_path.is_none());
    }

    #[test]
    fn decodes_base64_inline_content() {
        let encoded = BASE64.encode(b"binary payload");
        let obj = fetch_inline(&block(&encoded, "base64")).unwrap();
        assert_eq!(obj.bytes, b"binary payload");
    }

    #[test]
    fn rejects_bad_base64() {
        let err = fetch_inline(&block("not-base64!!", "base64")).unwrap_err();
        assert!(matches!(err, Wis2Error::Fetch(_)));
    }

    #[test]
    fn rejects_unsupported_encoding() {
        let err = fetch_inline(&block("abc", "gzip")).unwrap_err();
        assert!(matches!(err, Wis2Error::UnsupportedEncoding(e) if e == "gzip"));
    }
}
