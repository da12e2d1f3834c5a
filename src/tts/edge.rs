//! Microsoft Edge read-aloud speech backend.
//!
//! Speaks the same websocket protocol as the browser's read-aloud feature:
//! a `speech.config` frame selects the output format, an SSML frame carries
//! the text, and the service streams binary `Path:audio` frames until it
//! sends `Path:turn.end`.

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{TtsError, VoiceBackend};

/// Read-aloud synthesis endpoint.
pub const DEFAULT_ENDPOINT: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";

/// Client token embedded in the browser extension.
const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

const GEC_VERSION: &str = "1-130.0.2849.68";

const ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0";

/// Seconds between 1601-01-01 and 1970-01-01.
const WINDOWS_EPOCH_OFFSET_SECS: u64 = 11_644_473_600;

/// Cap on the proxy's CONNECT response head.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

type EdgeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Edge read-aloud voice backend.
#[derive(Debug, Clone)]
pub struct EdgeTts {
    endpoint: String,
    output_format: String,
    proxy: Option<String>,
}

impl EdgeTts {
    /// Create a backend producing `output_format` audio.
    pub fn new(output_format: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            output_format: output_format.into(),
            proxy,
        }
    }

    /// Point the backend at another endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_url(&self) -> String {
        let connection_id = uuid::Uuid::new_v4().simple();
        format!(
            "{}?TrustedClientToken={TRUSTED_CLIENT_TOKEN}&Sec-MS-GEC={}&Sec-MS-GEC-Version={GEC_VERSION}&ConnectionId={connection_id}",
            self.endpoint,
            sec_ms_gec(unix_secs()),
        )
    }

    async fn connect(&self) -> Result<EdgeSocket, TtsError> {
        let mut request = self
            .request_url()
            .into_client_request()
            .map_err(|e| TtsError::Connection(format!("bad request: {e}")))?;
        let headers = request.headers_mut();
        headers.insert("Origin", HeaderValue::from_static(ORIGIN));
        headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));
        headers.insert("Pragma", HeaderValue::from_static("no-cache"));
        headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));

        let socket = match &self.proxy {
            None => {
                tokio_tungstenite::connect_async(request)
                    .await
                    .map_err(|e| TtsError::Connection(format!("connect: {e}")))?
                    .0
            }
            Some(proxy) => {
                let uri = request.uri();
                let host = uri
                    .host()
                    .ok_or_else(|| TtsError::Connection("endpoint has no host".into()))?
                    .to_owned();
                let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
                    Some("ws") => 80,
                    _ => 443,
                });
                let stream = connect_via_proxy(proxy, &host, port).await?;
                tokio_tungstenite::client_async_tls_with_config(request, stream, None, None)
                    .await
                    .map_err(|e| TtsError::Connection(format!("connect via proxy: {e}")))?
                    .0
            }
        };
        Ok(socket)
    }
}

#[async_trait]
impl VoiceBackend for EdgeTts {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, TtsError> {
        let mut socket = self.connect().await?;
        let timestamp = js_timestamp();

        socket
            .send(Message::Text(speech_config_frame(&timestamp, &self.output_format)))
            .await
            .map_err(|e| TtsError::Connection(format!("send config: {e}")))?;

        let request_id = uuid::Uuid::new_v4().simple().to_string();
        socket
            .send(Message::Text(ssml_frame(&request_id, &timestamp, voice, text)))
            .await
            .map_err(|e| TtsError::Connection(format!("send ssml: {e}")))?;

        let mut audio = Vec::new();
        while let Some(frame) = socket.next().await {
            match frame.map_err(|e| TtsError::Connection(format!("read: {e}")))? {
                Message::Text(body) => {
                    if header_path(&body) == Some("turn.end") {
                        break;
                    }
                }
                Message::Binary(data) => {
                    if let Some(chunk) = audio_payload(&data)? {
                        audio.extend_from_slice(chunk);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        let _ = socket.close(None).await;

        debug!(voice, bytes = audio.len(), "edge synthesis finished");
        if audio.is_empty() {
            return Err(TtsError::NoAudio);
        }
        Ok(audio)
    }
}

/// `Sec-MS-GEC` token: SHA-256 of the 5-minute-rounded Windows file time
/// concatenated with the client token, as uppercase hex.
pub fn sec_ms_gec(unix_secs: u64) -> String {
    let mut ticks = unix_secs + WINDOWS_EPOCH_OFFSET_SECS;
    ticks -= ticks % 300;
    let ticks = u128::from(ticks) * 10_000_000;

    let digest = Sha256::digest(format!("{ticks}{TRUSTED_CLIENT_TOKEN}").as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}

/// Expand a short voice name such as `en-GB-MaisieNeural` to its service name.
pub fn full_voice_name(voice: &str) -> String {
    if voice.starts_with("Microsoft Server Speech") {
        return voice.to_owned();
    }
    let mut parts = voice.splitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lang), Some(region), Some(name)) => {
            format!("Microsoft Server Speech Text to Speech Voice ({lang}-{region}, {name})")
        }
        _ => voice.to_owned(),
    }
}

/// Escape the five XML special characters.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn speech_config_frame(timestamp: &str, output_format: &str) -> String {
    let body = serde_json::json!({
        "context": {
            "synthesis": {
                "audio": {
                    "metadataoptions": {
                        "sentenceBoundaryEnabled": "false",
                        "wordBoundaryEnabled": "false",
                    },
                    "outputFormat": output_format,
                }
            }
        }
    });
    format!(
        "X-Timestamp:{timestamp}\r\nContent-Type:application/json; charset=utf-8\r\nPath:speech.config\r\n\r\n{body}\r\n"
    )
}

fn ssml_frame(request_id: &str, timestamp: &str, voice: &str, text: &str) -> String {
    format!(
        "X-RequestId:{request_id}\r\nContent-Type:application/ssml+xml\r\nX-Timestamp:{timestamp}Z\r\nPath:ssml\r\n\r\n\
         <speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{}'><prosody pitch='+0Hz' rate='+0%' volume='+0%'>{}</prosody></voice></speak>",
        full_voice_name(voice),
        escape_xml(text),
    )
}

/// Value of the `Path:` header in a text frame's header block.
fn header_path(frame: &str) -> Option<&str> {
    let head = frame.split("\r\n\r\n").next()?;
    head.lines()
        .find_map(|line| line.strip_prefix("Path:"))
        .map(str::trim)
}

/// Audio bytes carried by a binary frame, or `None` for non-audio frames.
///
/// Binary frames start with a big-endian `u16` header length.
fn audio_payload(data: &[u8]) -> Result<Option<&[u8]>, TtsError> {
    if data.len() < 2 {
        return Err(TtsError::Protocol("binary frame shorter than its header length".into()));
    }
    let header_len = usize::from(u16::from_be_bytes([data[0], data[1]]));
    let body_start = 2 + header_len;
    let header = data
        .get(2..body_start)
        .ok_or_else(|| TtsError::Protocol("binary frame header overruns frame".into()))?;
    let header = String::from_utf8_lossy(header);
    if header_path(&header) != Some("audio") {
        return Ok(None);
    }
    Ok(Some(&data[body_start..]))
}

/// Open a TCP tunnel to `host:port` through an HTTP CONNECT proxy.
async fn connect_via_proxy(proxy: &str, host: &str, port: u16) -> Result<TcpStream, TtsError> {
    let proxy_url = url::Url::parse(proxy)
        .map_err(|e| TtsError::Connection(format!("invalid proxy URL {proxy}: {e}")))?;
    let proxy_host = proxy_url
        .host_str()
        .ok_or_else(|| TtsError::Connection(format!("proxy URL {proxy} has no host")))?;
    let proxy_port = proxy_url.port_or_known_default().unwrap_or(80);

    let mut stream = TcpStream::connect((proxy_host, proxy_port))
        .await
        .map_err(|e| TtsError::Connection(format!("proxy connect: {e}")))?;

    let connect = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n");
    stream
        .write_all(connect.as_bytes())
        .await
        .map_err(|e| TtsError::Connection(format!("proxy write: {e}")))?;

    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_CONNECT_RESPONSE {
            return Err(TtsError::Connection("proxy response too large".into()));
        }
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| TtsError::Connection(format!("proxy read: {e}")))?;
        if n == 0 {
            return Err(TtsError::Connection("proxy closed during CONNECT".into()));
        }
        head.push(byte[0]);
    }

    let status_line = String::from_utf8_lossy(&head);
    let status = status_line.split_whitespace().nth(1).unwrap_or_default();
    if status != "200" {
        return Err(TtsError::Connection(format!(
            "proxy refused CONNECT: {}",
            status_line.lines().next().unwrap_or_default()
        )));
    }
    Ok(stream)
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Timestamp in the browser's `Date.toString()` shape.
fn js_timestamp() -> String {
    chrono::Utc::now()
        .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
        .to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn gec_token_is_stable_within_five_minutes() {
        let a = sec_ms_gec(1_700_000_100);
        let b = sec_ms_gec(1_700_000_199);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_ne!(a, sec_ms_gec(1_700_000_400));
    }

    #[test]
    fn voice_names_expand() {
        assert_eq!(
            full_voice_name("en-GB-MaisieNeural"),
            "Microsoft Server Speech Text to Speech Voice (en-GB, MaisieNeural)"
        );
        assert_eq!(full_voice_name("odd"), "odd");
    }

    #[test]
    fn ssml_escapes_text() {
        let frame = ssml_frame("id", "ts", "en-US-JennyNeural", "a < b & 'c'");
        assert!(frame.contains("Path:ssml\r\n\r\n"));
        assert!(frame.contains("a &lt; b &amp; &apos;c&apos;"));
        assert!(frame.contains("(en-US, JennyNeural)"));
    }

    #[test]
    fn config_frame_names_output_format() {
        let frame = speech_config_frame("ts", "audio-24khz-48kbitrate-mono-mp3");
        assert_eq!(header_path(&frame), Some("speech.config"));
        assert!(frame.contains("\"outputFormat\":\"audio-24khz-48kbitrate-mono-mp3\""));
    }

    fn binary_frame(path: &str, body: &[u8]) -> Vec<u8> {
        let header = format!("X-RequestId:x\r\nContent-Type:audio/mpeg\r\nPath:{path}\r\n");
        let mut out = (header.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn audio_payload_splits_header() {
        let frame = binary_frame("audio", b"MP3DATA");
        assert_eq!(audio_payload(&frame).unwrap(), Some(&b"MP3DATA"[..]));
        assert_eq!(audio_payload(&binary_frame("metadata", b"x")).unwrap(), None);
        assert!(audio_payload(&[0x00]).is_err());
        assert!(audio_payload(&[0x00, 0x10, b'a']).is_err());
    }

    /// Local server playing the service side of one synthesis exchange.
    async fn serve_once(chunks: Vec<&'static [u8]>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let mut paths = Vec::new();
            while paths.len() < 2 {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        paths.push(header_path(&text).unwrap_or_default().to_owned());
                    }
                    Some(_) => {}
                    None => return,
                }
            }
            assert_eq!(paths, vec!["speech.config", "ssml"]);
            for chunk in chunks {
                ws.send(Message::Binary(binary_frame("audio", chunk))).await.unwrap();
            }
            ws.send(Message::Text("X-RequestId:x\r\nPath:turn.end\r\n\r\n{}".into()))
                .await
                .unwrap();
        });
        format!("ws://{addr}/synthesize")
    }

    #[tokio::test]
    async fn collects_audio_until_turn_end() {
        let endpoint = serve_once(vec![b"abc", b"def"]).await;
        let tts = EdgeTts::new("audio-24khz-48kbitrate-mono-mp3", None).with_endpoint(endpoint);
        let audio = tts.synthesize("hello", "en-GB-MaisieNeural").await.unwrap();
        assert_eq!(audio, b"abcdef");
    }

    #[tokio::test]
    async fn no_audio_is_error() {
        let endpoint = serve_once(vec![]).await;
        let tts = EdgeTts::new("audio-24khz-48kbitrate-mono-mp3", None).with_endpoint(endpoint);
        let err = tts.synthesize("hello", "en-GB-MaisieNeural").await.unwrap_err();
        assert!(matches!(err, TtsError::NoAudio));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_connection_error() {
        let tts = EdgeTts::new("audio-24khz-48kbitrate-mono-mp3", None)
            .with_endpoint("ws://127.0.0.1:1/synthesize");
        let err = tts.synthesize("hello", "en-GB-MaisieNeural").await.unwrap_err();
        assert!(matches!(err, TtsError::Connection(_)));
    }
}
