use url::Url;

use crate::model::{PreviewFormat, PreviewQuality};

const DOWNLOAD_PATH: &str = "/services/files/download";
const PREVIEW_PATH: &str = "/services/preview";

/// Which preview renderer the backend should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    Image,
    Pdf,
    Document,
}

impl PreviewKind {
    fn segment(&self) -> &'static str {
        match self {
            PreviewKind::Image => "image",
            PreviewKind::Pdf => "pdf",
            PreviewKind::Document => "document",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSize {
    pub width: u32,
    pub height: u32,
}

pub fn download_link(
    base: &Url,
    node_id: &str,
    version: Option<u32>,
) -> Result<Url, url::ParseError> {
    let mut path = format!("{DOWNLOAD_PATH}/{node_id}");
    if let Some(version) = version {
        path.push_str(&format!("/{version}"));
    }
    base.join(&path)
}

pub fn preview_link(
    base: &Url,
    kind: PreviewKind,
    node_id: &str,
    version: u32,
    size: Option<PreviewSize>,
    quality: Option<PreviewQuality>,
    format: Option<PreviewFormat>,
) -> Result<Url, url::ParseError> {
    let mut path = format!("{PREVIEW_PATH}/{}/{node_id}/{version}", kind.segment());
    if let Some(size) = size {
        path.push_str(&format!("/{}x{}", size.width, size.height));
    }
    let mut url = base.join(&path)?;
    {
        let mut query = url.query_pairs_mut();
        if let Some(quality) = quality {
            query.append_pair("quality", quality_name(quality));
        }
        if let Some(format) = format {
            query.append_pair("output_format", format_name(format));
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}

pub fn thumbnail_link(
    base: &Url,
    kind: PreviewKind,
    node_id: &str,
    version: u32,
    size: PreviewSize,
    quality: PreviewQuality,
) -> Result<Url, url::ParseError> {
    let mut url = preview_link(base, kind, node_id, version, Some(size), Some(quality), None)?;
    let path = format!("{}/thumbnail/", url.path());
    url.set_path(&path);
    Ok(url)
}

fn quality_name(quality: PreviewQuality) -> &'static str {
    match quality {
        PreviewQuality::Lowest => "lowest",
        PreviewQuality::Low => "low",
        PreviewQuality::Medium => "medium",
        PreviewQuality::High => "high",
        PreviewQuality::Highest => "highest",
    }
}

fn format_name(format: PreviewFormat) -> &'static str {
    match format {
        PreviewFormat::Jpeg => "jpeg",
        PreviewFormat::Png => "png",
        PreviewFormat::Gif => "gif",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://mail.example.com").unwrap()
    }

    #[test]
    fn download_link_includes_optional_version() {
        assert_eq!(
            download_link(&base(), "n1", None).unwrap().as_str(),
            "https://mail.example.com/services/files/download/n1"
        );
        assert_eq!(
            download_link(&base(), "n1", Some(3)).unwrap().as_str(),
            "https://mail.example.com/services/files/download/n1/3"
        );
    }

    #[test]
    fn preview_link_encodes_size_and_quality() {
        let url = preview_link(
            &base(),
            PreviewKind::Image,
            "n1",
            2,
            Some(PreviewSize {
                width: 80,
                height: 60,
            }),
            Some(PreviewQuality::High),
            Some(PreviewFormat::Png),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://mail.example.com/services/preview/image/n1/2/80x60?quality=high&output_format=png"
        );
    }

    #[test]
    fn preview_link_without_options_has_no_query() {
        let url = preview_link(&base(), PreviewKind::Pdf, "n1", 1, None, None, None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://mail.example.com/services/preview/pdf/n1/1"
        );
    }

    #[test]
    fn thumbnail_link_appends_thumbnail_segment() {
        let url = thumbnail_link(
            &base(),
            PreviewKind::Image,
            "n1",
            1,
            PreviewSize {
                width: 80,
                height: 80,
            },
            PreviewQuality::Low,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://mail.example.com/services/preview/image/n1/1/80x80/thumbnail/?quality=low"
        );
    }
}
