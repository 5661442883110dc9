//! Request descriptor and operator parsing.
//!
//! A proxied request names everything in its path: `{W}x{H}{ext?}/{URL}`.
//! The operator is designed so a single URL rewrites cleanly to a cache key;
//! there are no query parameters and no header negotiation.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::errors::ProxyError;

/// Naive path normalizers upstream tend to collapse `//` after the scheme;
/// this repairs `http:/host` and `https:///host` back to canonical form.
static REPAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?):/+([^/])").expect("repair regex is valid"));

/// Output encodings the proxy can produce, default WebP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossy WebP at the configured quality.
    Webp,
    /// Lossy JPEG at the configured quality.
    Jpeg,
    /// Lossless PNG.
    Png,
    /// PNG followed by an external palette quantizer.
    PngQuantized,
    /// Lossless GIF.
    Gif,
}

/// Extension tokens recognized at the end of the operator, longest first so
/// the longest suffix wins (`100x100pngq` is pngq, not a bad height).
const EXTENSION_TOKENS: &[(&str, OutputFormat)] = &[
    ("webp", OutputFormat::Webp),
    ("pngq", OutputFormat::PngQuantized),
    ("jpeg", OutputFormat::Jpeg),
    ("png", OutputFormat::Png),
    ("jpg", OutputFormat::Jpeg),
    ("gif", OutputFormat::Gif),
];

impl OutputFormat {
    /// The `Content-Type` served for this format.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Jpeg => "image/jpeg",
            Self::Png | Self::PngQuantized => "image/png",
            Self::Gif => "image/gif",
        }
    }

    /// The canonical file extension of a derived cache entry.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::PngQuantized => "pngq",
            Self::Gif => "gif",
        }
    }
}

/// Immutable descriptor of one proxied image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    width: u32,
    height: u32,
    format: OutputFormat,
    remote_url: String,
}

impl ImageRequest {
    /// Parses the path segment after `/image/` into a request descriptor.
    ///
    /// # Errors
    /// Returns [`ProxyError::BadInput`] when the separator is missing, the
    /// operator does not split into exactly two parts on `x`, or a dimension
    /// is not a non-negative integer.
    pub fn parse(subpath: &str) -> Result<Self, ProxyError> {
        let (operator, remote) = subpath
            .split_once('/')
            .ok_or_else(|| ProxyError::bad_input("missing separator between operator and url"))?;

        let remote_url = REPAIR_RE.replace(remote, "${1}://${2}").into_owned();

        let parts: Vec<&str> = operator.split('x').collect();
        let &[width_str, height_str] = parts.as_slice() else {
            return Err(ProxyError::bad_input("bad operator"));
        };

        let (height_str, format) = strip_extension(height_str);

        Ok(Self {
            width: parse_dimension(width_str, "width")?,
            height: parse_dimension(height_str, "height")?,
            format,
            remote_url,
        })
    }

    /// Requested width; zero means unconstrained on this axis.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Requested height; zero means unconstrained on this axis.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Requested output format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// The canonicalized remote URL.
    #[must_use]
    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// SVG sources are never rasterized; they bypass the transform stage.
    #[must_use]
    pub fn is_svg(&self) -> bool {
        self.remote_url.ends_with(".svg")
    }

    /// With both axes unconstrained there is nothing to transform.
    #[must_use]
    pub const fn is_passthrough(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    /// Whether the back end should treat the input as a candidate APNG.
    #[must_use]
    pub fn apng_hint(&self) -> bool {
        self.remote_url.ends_with(".apng")
    }
}

fn strip_extension(height_str: &str) -> (&str, OutputFormat) {
    for (token, format) in EXTENSION_TOKENS {
        if let Some(stripped) = height_str.strip_suffix(token) {
            return (stripped, *format);
        }
    }
    (height_str, OutputFormat::Webp)
}

fn parse_dimension(value: &str, axis: &str) -> Result<u32, ProxyError> {
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| ProxyError::bad_input(format!("failed to parse {axis}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operator() {
        let req = ImageRequest::parse("100x200/http://example.com/a.jpg").unwrap();
        assert_eq!(req.width(), 100);
        assert_eq!(req.height(), 200);
        assert_eq!(req.format(), OutputFormat::Webp);
        assert_eq!(req.remote_url(), "http://example.com/a.jpg");
    }

    #[test]
    fn test_extension_round_trip() {
        for (token, format) in [
            ("webp", OutputFormat::Webp),
            ("png", OutputFormat::Png),
            ("pngq", OutputFormat::PngQuantized),
            ("jpeg", OutputFormat::Jpeg),
            ("jpg", OutputFormat::Jpeg),
            ("gif", OutputFormat::Gif),
        ] {
            let req = ImageRequest::parse(&format!("10x20{token}/http://h/p")).unwrap();
            assert_eq!(req.width(), 10);
            assert_eq!(req.height(), 20);
            assert_eq!(req.format(), format, "token {token}");
        }
    }

    #[test]
    fn test_default_format_is_webp() {
        let req = ImageRequest::parse("10x20/http://h/p").unwrap();
        assert_eq!(req.format(), OutputFormat::Webp);
    }

    #[test]
    fn test_empty_dimensions_are_zero() {
        let req = ImageRequest::parse("x/http://h/p").unwrap();
        assert_eq!(req.width(), 0);
        assert_eq!(req.height(), 0);
        assert!(req.is_passthrough());

        let req = ImageRequest::parse("x100/http://h/p").unwrap();
        assert_eq!(req.width(), 0);
        assert_eq!(req.height(), 100);

        let req = ImageRequest::parse("100xwebp/http://h/p").unwrap();
        assert_eq!(req.width(), 100);
        assert_eq!(req.height(), 0);
        assert_eq!(req.format(), OutputFormat::Webp);
    }

    #[test]
    fn test_missing_separator() {
        assert!(matches!(
            ImageRequest::parse("100x100"),
            Err(ProxyError::BadInput(_))
        ));
    }

    #[test]
    fn test_bad_operator() {
        // No `x` at all, or more than one.
        assert!(ImageRequest::parse("100/http://h/p").is_err());
        assert!(ImageRequest::parse("1x2x3/http://h/p").is_err());
    }

    #[test]
    fn test_non_numeric_dimension() {
        assert!(ImageRequest::parse("axb/http://h/p").is_err());
        assert!(ImageRequest::parse("-5x10/http://h/p").is_err());
    }

    #[test]
    fn test_url_repair() {
        let req = ImageRequest::parse("1x1/http:/example.com/x").unwrap();
        assert_eq!(req.remote_url(), "http://example.com/x");

        let req = ImageRequest::parse("1x1/https:////host/p").unwrap();
        assert_eq!(req.remote_url(), "https://host/p");

        let req = ImageRequest::parse("1x1/https://already.ok/p").unwrap();
        assert_eq!(req.remote_url(), "https://already.ok/p");
    }

    #[test]
    fn test_svg_and_apng_hints() {
        let req = ImageRequest::parse("1x1/http://h/icon.svg").unwrap();
        assert!(req.is_svg());
        assert!(!req.apng_hint());

        let req = ImageRequest::parse("1x1/http://h/anim.apng").unwrap();
        assert!(req.apng_hint());
        assert!(!req.is_svg());
    }

    #[test]
    fn test_remote_url_keeps_query() {
        let req = ImageRequest::parse("1x1/http://h/p?size=big&v=2").unwrap();
        assert_eq!(req.remote_url(), "http://h/p?size=big&v=2");
    }
}
