//! Camera feed URL resolution.
//!
//! The dashboard only shows the URL; it never fetches the stream.

use garden_types::DeviceSnapshot;

/// Hostname suffixes of the tunnel service the camera is exposed through.
/// Tunnel hosts terminate TLS on 443, so they get `https` and no port.
const TUNNEL_DOMAINS: [&str; 3] = ["ngrok-free.app", "ngrok.app", "ngrok.io"];

/// Port the camera server listens on when reached directly.
pub const DIRECT_STREAM_PORT: u16 = 8080;

/// Path of the MJPEG endpoint on the camera server.
pub const STREAM_PATH: &str = "/video_feed";

/// Work out the video feed URL.
///
/// A configured `stream_host` wins over the URL the controller publishes in
/// the snapshot. Returns `None` when neither is available.
///
/// ```
/// use garden_core::resolve_video_url;
/// use garden_types::DeviceSnapshot;
///
/// let snapshot = DeviceSnapshot::default();
/// assert_eq!(
///     resolve_video_url(Some("abc123.ngrok-free.app"), &snapshot).as_deref(),
///     Some("https://abc123.ngrok-free.app/video_feed")
/// );
/// assert_eq!(
///     resolve_video_url(Some("192.168.1.40"), &snapshot).as_deref(),
///     Some("http://192.168.1.40:8080/video_feed")
/// );
/// assert_eq!(resolve_video_url(None, &snapshot), None);
/// ```
pub fn resolve_video_url(stream_host: Option<&str>, snapshot: &DeviceSnapshot) -> Option<String> {
    if let Some(host) = stream_host.map(normalize_host).filter(|h| !h.is_empty()) {
        return Some(url_for_host(host));
    }

    snapshot
        .video_stream_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

/// Whether `host` belongs to the tunnel service.
pub fn is_tunnel_host(host: &str) -> bool {
    let host = normalize_host(host).to_ascii_lowercase();
    let name = host.split(':').next().unwrap_or_default();
    TUNNEL_DOMAINS
        .iter()
        .any(|domain| name == *domain || name.ends_with(&format!(".{}", domain)))
}

fn url_for_host(host: &str) -> String {
    if is_tunnel_host(host) {
        format!("https://{}{}", host, STREAM_PATH)
    } else if host.contains(':') {
        format!("http://{}{}", host, STREAM_PATH)
    } else {
        format!("http://{}:{}{}", host, DIRECT_STREAM_PORT, STREAM_PATH)
    }
}

/// Strip whitespace, an accidental scheme, and trailing slashes.
fn normalize_host(host: &str) -> &str {
    let host = host.trim();
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    host.trim_end_matches('/')
}
