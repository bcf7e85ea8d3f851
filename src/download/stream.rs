//! Native HLS streaming engine.
//!
//! Fetches the playlist, follows a master playlist to its highest-bandwidth
//! variant, and appends every media segment in order to the destination
//! file. Byte-range segments are requested with a `Range` header and
//! AES-128 segments are decrypted before they are written; any other
//! encryption method fails the item. Progress is the share of segments
//! written so far.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aes::Aes128;
use async_trait::async_trait;
use cbc::Decryptor;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use futures_util::StreamExt;
use m3u8_rs::{ByteRange, Key, KeyMethod, MasterPlaylist, MediaPlaylist, Playlist, VariantStream};
use reqwest::StatusCode;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::DownloadError;
use super::client::HttpClient;
use super::engine::{DownloadEngine, ProgressSink, ratio_percent};
use crate::settings::EngineKind;

/// AES-128 key and IV length in bytes.
const AES_BLOCK_LEN: usize = 16;

/// One request the streaming engine makes, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRequest {
    /// Absolute segment (or initialization section) URL.
    pub url: String,
    /// Inclusive byte range within `url`, from `EXT-X-BYTERANGE`.
    pub byte_range: Option<(u64, u64)>,
    /// Decryption parameters, from `EXT-X-KEY:METHOD=AES-128`.
    pub key: Option<SegmentKey>,
}

/// AES-128-CBC parameters for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentKey {
    /// Absolute key URL; the body must be exactly 16 bytes.
    pub key_url: String,
    /// Explicit IV, or the media sequence number as a big-endian 128-bit value.
    pub iv: [u8; AES_BLOCK_LEN],
}

/// Streams HLS playlists straight to a `.ts` file.
#[derive(Debug, Clone, Default)]
pub struct StreamEngine {
    client: HttpClient,
}

impl StreamEngine {
    /// Creates an engine with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(HttpClient::new())
    }

    /// Creates an engine sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(client: HttpClient) -> Self {
        Self { client }
    }

    /// Resolves `url` to the ordered segment requests.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Playlist`] for unparsable or empty playlists
    /// and for encryption or byte ranges that cannot be honored, and the
    /// client's errors for failed fetches.
    pub async fn segments(&self, url: &str) -> Result<Vec<SegmentRequest>, DownloadError> {
        let body = self.client.get_bytes(url).await?;
        match parse_playlist(url, &body.bytes)? {
            Playlist::MediaPlaylist(media) => media_segments(&body.final_url, &media),
            Playlist::MasterPlaylist(master) => {
                let variant = select_variant(&master)
                    .ok_or_else(|| DownloadError::playlist(url, "master playlist has no variants"))?;
                let variant_url = join_url(&body.final_url, &variant.uri)?;
                debug!(
                    variant = %variant_url,
                    bandwidth = variant.bandwidth,
                    "selected variant stream"
                );
                let variant_body = self.client.get_bytes(&variant_url).await?;
                match parse_playlist(&variant_url, &variant_body.bytes)? {
                    Playlist::MediaPlaylist(media) => {
                        media_segments(&variant_body.final_url, &media)
                    }
                    Playlist::MasterPlaylist(_) => Err(DownloadError::playlist(
                        variant_url,
                        "variant points at another master playlist",
                    )),
                }
            }
        }
    }

    async fn stream_to_file(
        &self,
        remote_url: &str,
        local_path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<u64, DownloadError> {
        let segments = self.segments(remote_url).await?;
        let total = segments.len() as u64;
        debug!(segments = total, "playlist resolved");

        let file = File::create(local_path)
            .await
            .map_err(|e| DownloadError::io(local_path, e))?;
        let mut writer = BufWriter::new(file);
        let mut keys: HashMap<String, Vec<u8>> = HashMap::new();
        let mut bytes_written: u64 = 0;

        for (done, segment) in (1_u64..).zip(segments.iter()) {
            if segment.byte_range.is_none() && segment.key.is_none() {
                bytes_written += self
                    .copy_segment(&segment.url, &mut writer, local_path)
                    .await?;
            } else {
                let data = self.fetch_segment(segment, &mut keys).await?;
                writer
                    .write_all(&data)
                    .await
                    .map_err(|e| DownloadError::io(local_path, e))?;
                bytes_written += data.len() as u64;
            }
            progress.progress(ratio_percent(done, total));
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(local_path, e))?;

        Ok(bytes_written)
    }

    /// Streams a plain segment body into `writer`.
    async fn copy_segment<W>(
        &self,
        url: &str,
        writer: &mut W,
        local_path: &Path,
    ) -> Result<u64, DownloadError>
    where
        W: AsyncWrite + Unpin,
    {
        let response = self.client.get(url).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(local_path, e))?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    /// Fetches a ranged and/or encrypted segment into memory, ready to write.
    async fn fetch_segment(
        &self,
        segment: &SegmentRequest,
        keys: &mut HashMap<String, Vec<u8>>,
    ) -> Result<Vec<u8>, DownloadError> {
        let url = segment.url.as_str();
        let response = self.client.get_range(url, segment.byte_range).await?;
        let partial = response.status() == StatusCode::PARTIAL_CONTENT;
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let data = match segment.byte_range {
            Some((start, end)) => {
                let expected = end - start + 1;
                if partial {
                    if body.len() as u64 != expected {
                        return Err(DownloadError::playlist(
                            url,
                            format!(
                                "expected {expected} bytes for range {start}-{end}, got {}",
                                body.len()
                            ),
                        ));
                    }
                    body.to_vec()
                } else {
                    // Range ignored by the server: cut the slice out of the full body.
                    slice_range(&body, start, end)
                        .ok_or_else(|| {
                            DownloadError::playlist(
                                url,
                                format!("byte range {start}-{end} is outside the resource"),
                            )
                        })?
                        .to_vec()
                }
            }
            None => body.to_vec(),
        };

        let Some(key) = &segment.key else {
            return Ok(data);
        };
        if !keys.contains_key(&key.key_url) {
            let fetched = self.client.get_bytes(&key.key_url).await?;
            if fetched.bytes.len() != AES_BLOCK_LEN {
                return Err(DownloadError::playlist(
                    &key.key_url,
                    format!(
                        "AES-128 key must be {AES_BLOCK_LEN} bytes, got {}",
                        fetched.bytes.len()
                    ),
                ));
            }
            debug!(key_url = %key.key_url, "fetched segment key");
            keys.insert(key.key_url.clone(), fetched.bytes);
        }
        let key_bytes = keys.get(&key.key_url).map_or(&[][..], Vec::as_slice);
        decrypt_aes128(key_bytes, &key.iv, &data).ok_or_else(|| {
            DownloadError::playlist(url, "segment does not decrypt with its AES-128 key")
        })
    }
}

#[async_trait]
impl DownloadEngine for StreamEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Internal
    }

    async fn is_available(&self) -> bool {
        true
    }

    #[instrument(skip(self, progress), fields(url = %remote_url, path = %local_path.display()))]
    async fn download(
        &self,
        remote_url: &str,
        local_path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf, DownloadError> {
        progress.started();
        match self.stream_to_file(remote_url, local_path, progress).await {
            Ok(bytes) => {
                info!(bytes, "stream saved");
                Ok(local_path.to_path_buf())
            }
            Err(error) => {
                if let Err(cleanup) = tokio::fs::remove_file(local_path).await
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(error = %cleanup, "failed to remove partial stream file");
                }
                Err(error)
            }
        }
    }
}

fn parse_playlist(url: &str, bytes: &[u8]) -> Result<Playlist, DownloadError> {
    m3u8_rs::parse_playlist_res(bytes)
        .map_err(|_| DownloadError::playlist(url, "not an HLS playlist"))
}

/// Highest-bandwidth playable variant; I-frame-only streams are skipped.
pub(crate) fn select_variant(master: &MasterPlaylist) -> Option<&VariantStream> {
    master
        .variants
        .iter()
        .filter(|variant| !variant.is_i_frame)
        .max_by_key(|variant| variant.bandwidth)
}

/// Segment requests in file order, with initialization sections
/// (`EXT-X-MAP`) inserted wherever they change.
pub(crate) fn media_segments(
    base_url: &str,
    media: &MediaPlaylist,
) -> Result<Vec<SegmentRequest>, DownloadError> {
    if media.segments.is_empty() {
        return Err(DownloadError::playlist(base_url, "playlist has no segments"));
    }

    let mut requests = Vec::with_capacity(media.segments.len());
    let mut current_map: Option<&str> = None;
    // Exclusive end of the previous sub-range, keyed by resource URL.
    let mut previous_range: Option<(String, u64)> = None;

    for (sequence, segment) in (media.media_sequence..).zip(media.segments.iter()) {
        let key = segment_key(base_url, segment.key.as_ref(), sequence)?;

        if let Some(map) = &segment.map
            && current_map != Some(map.uri.as_str())
        {
            let url = join_url(base_url, &map.uri)?;
            let byte_range = match &map.byte_range {
                Some(range) => Some(resolve_byte_range(
                    &url,
                    range.length,
                    Some(range.offset.unwrap_or(0)),
                    &mut None,
                )?),
                None => None,
            };
            requests.push(SegmentRequest {
                url,
                byte_range,
                key: key.clone(),
            });
            current_map = Some(map.uri.as_str());
        }

        let url = join_url(base_url, &segment.uri)?;
        let byte_range = match &segment.byte_range {
            Some(ByteRange { length, offset }) => Some(resolve_byte_range(
                &url,
                *length,
                *offset,
                &mut previous_range,
            )?),
            None => {
                previous_range = None;
                None
            }
        };
        requests.push(SegmentRequest {
            url,
            byte_range,
            key,
        });
    }
    Ok(requests)
}

/// Turns `length[@offset]` into an inclusive range. A missing offset
/// continues right after the previous sub-range of the same resource.
fn resolve_byte_range(
    url: &str,
    length: u64,
    offset: Option<u64>,
    previous: &mut Option<(String, u64)>,
) -> Result<(u64, u64), DownloadError> {
    if length == 0 {
        return Err(DownloadError::playlist(url, "empty byte range"));
    }
    let start = match (offset, previous.as_ref()) {
        (Some(offset), _) => offset,
        (None, Some((previous_url, end))) if previous_url == url => *end,
        (None, _) => {
            return Err(DownloadError::playlist(
                url,
                "byte range without offset does not follow a range of the same resource",
            ));
        }
    };
    let end = start
        .checked_add(length)
        .ok_or_else(|| DownloadError::playlist(url, "byte range overflows"))?;
    *previous = Some((url.to_string(), end));
    Ok((start, end - 1))
}

fn segment_key(
    base_url: &str,
    key: Option<&Key>,
    sequence: u64,
) -> Result<Option<SegmentKey>, DownloadError> {
    let Some(key) = key else {
        return Ok(None);
    };
    match &key.method {
        KeyMethod::None => Ok(None),
        KeyMethod::AES128 => {
            let uri = key
                .uri
                .as_deref()
                .ok_or_else(|| DownloadError::playlist(base_url, "AES-128 key has no URI"))?;
            let iv = match key.iv.as_deref() {
                Some(raw) => parse_iv(raw).ok_or_else(|| {
                    DownloadError::playlist(base_url, format!("invalid AES-128 IV {raw}"))
                })?,
                None => sequence_iv(sequence),
            };
            Ok(Some(SegmentKey {
                key_url: join_url(base_url, uri)?,
                iv,
            }))
        }
        other => Err(DownloadError::playlist(
            base_url,
            format!("unsupported encryption method {other}"),
        )),
    }
}

/// Parses a `0x`-prefixed 128-bit hex IV.
fn parse_iv(raw: &str) -> Option<[u8; AES_BLOCK_LEN]> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let decoded = hex::decode(digits).ok()?;
    decoded.try_into().ok()
}

fn sequence_iv(sequence: u64) -> [u8; AES_BLOCK_LEN] {
    let mut iv = [0_u8; AES_BLOCK_LEN];
    iv[8..].copy_from_slice(&sequence.to_be_bytes());
    iv
}

fn decrypt_aes128(key: &[u8], iv: &[u8; AES_BLOCK_LEN], data: &[u8]) -> Option<Vec<u8>> {
    let decryptor = Decryptor::<Aes128>::new_from_slices(key, iv).ok()?;
    decryptor.decrypt_padded_vec_mut::<Pkcs7>(data).ok()
}

fn slice_range(body: &[u8], start: u64, end: u64) -> Option<&[u8]> {
    let start = usize::try_from(start).ok()?;
    let end = usize::try_from(end).ok()?;
    body.get(start..=end)
}

fn join_url(base: &str, reference: &str) -> Result<String, DownloadError> {
    let base = Url::parse(base).map_err(|_| DownloadError::invalid_url(base))?;
    base.join(reference)
        .map(|u| u.to_string())
        .map_err(|_| DownloadError::invalid_url(reference))
}
