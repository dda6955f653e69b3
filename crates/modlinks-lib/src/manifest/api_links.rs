use anyhow::{bail, Result};
use quick_xml::events::Event;

use super::document::{LinkSlot, LinkValue, LinksDocument, TextAccumulator};
use crate::mirror::error::MirrorError;

/// The three fixed API binary platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiPlatform {
    Linux,
    Mac,
    Windows,
}

impl ApiPlatform {
    pub const ALL: [ApiPlatform; 3] =
        [ApiPlatform::Linux, ApiPlatform::Mac, ApiPlatform::Windows];

    /// Tag name in the manifest, also used in output file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiPlatform::Linux => "Linux",
            ApiPlatform::Mac => "Mac",
            ApiPlatform::Windows => "Windows",
        }
    }

    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"Linux" => Some(ApiPlatform::Linux),
            b"Mac" => Some(ApiPlatform::Mac),
            b"Windows" => Some(ApiPlatform::Windows),
            _ => None,
        }
    }
}

/// One platform's API binary link.
#[derive(Debug, Clone)]
pub struct ApiEntry {
    pub platform: ApiPlatform,
    pub url: String,
    pub slot: LinkSlot,
}

/// Typed view over the API manifest: one version shared by all platforms
/// plus exactly one link per platform.
#[derive(Debug)]
pub struct ApiLinks {
    pub version: String,
    pub entries: Vec<ApiEntry>,
}

struct PendingPlatform {
    platform: ApiPlatform,
    link: LinkValue,
}

impl ApiLinks {
    /// Walk the document events and pick out the declared version and the
    /// three platform link slots.
    pub fn parse(doc: &LinksDocument) -> Result<Self> {
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut entries: Vec<ApiEntry> = Vec::new();

        let mut version: Option<String> = None;
        let mut in_version = false;
        let mut version_text = TextAccumulator::default();

        let mut pending: Option<PendingPlatform> = None;

        for (index, event) in doc.events().iter().enumerate() {
            match event {
                Event::Start(start) => {
                    let name = start.local_name().as_ref().to_vec();

                    if version.is_none() && name == b"Version" {
                        in_version = true;
                    }

                    if stack.last().is_some_and(|n| n.as_slice() == b"Links") {
                        if let Some(platform) = ApiPlatform::from_tag(&name) {
                            if entries.iter().any(|e| e.platform == platform) {
                                bail!(MirrorError::ManifestShape(format!(
                                    "duplicate {} link in api manifest",
                                    platform.as_str()
                                )));
                            }
                            pending = Some(PendingPlatform {
                                platform,
                                link: LinkValue::default(),
                            });
                        }
                    }

                    stack.push(name);
                }
                Event::End(end) => {
                    let name = end.local_name().as_ref().to_vec();
                    stack.pop();

                    if in_version && name == b"Version" {
                        in_version = false;
                        version = Some(version_text.take_trimmed());
                    }

                    let closes_platform = pending.as_ref().is_some_and(|p| {
                        name == p.platform.as_str().as_bytes()
                            && stack.last().is_some_and(|n| n.as_slice() == b"Links")
                    });
                    if closes_platform {
                        if let Some(p) = pending.take() {
                            let platform = p.platform;
                            let (slot, url) = match p.link.finish() {
                                Some(found) => found,
                                None => bail!(MirrorError::ManifestShape(format!(
                                    "missing {} link in api manifest",
                                    platform.as_str()
                                ))),
                            };
                            entries.push(ApiEntry { platform, url, slot });
                        }
                    }
                }
                Event::Text(_) | Event::CData(_) | Event::GeneralRef(_) => {
                    if in_version {
                        version_text.push_event(event)?;
                    }
                    if let Some(p) = &mut pending {
                        let n = stack.len();
                        let inside = n >= 2
                            && stack[n - 1].as_slice() == p.platform.as_str().as_bytes()
                            && stack[n - 2].as_slice() == b"Links";
                        if inside {
                            p.link.push_event(index, event)?;
                        }
                    }
                }
                _ => {}
            }
        }

        let version = match version {
            Some(v) if !v.is_empty() => v,
            _ => bail!(MirrorError::ManifestShape(
                "missing version in api manifest".into()
            )),
        };

        for platform in ApiPlatform::ALL {
            if !entries.iter().any(|e| e.platform == platform) {
                bail!(MirrorError::ManifestShape(format!(
                    "missing {} link in api manifest",
                    platform.as_str()
                )));
            }
        }

        Ok(Self { version, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<ApiLinks xmlns="https://github.com/hk-modding/modlinks">
  <Manifest>
    <Version>74</Version>
    <Links>
      <Linux SHA256="aaa">
        <![CDATA[https://upstream.example/api/linux.zip]]>
      </Linux>
      <Mac SHA256="bbb">
        <![CDATA[https://upstream.example/api/mac.zip]]>
      </Mac>
      <Windows SHA256="ccc">
        <![CDATA[https://upstream.example/api/windows.zip]]>
      </Windows>
    </Links>
  </Manifest>
</ApiLinks>
"#;

    #[test]
    fn parses_version_and_all_platforms() {
        let doc = LinksDocument::parse(SAMPLE).unwrap();
        let api = ApiLinks::parse(&doc).unwrap();

        assert_eq!(api.version, "74");
        assert_eq!(api.entries.len(), 3);
        assert_eq!(api.entries[0].platform, ApiPlatform::Linux);
        assert_eq!(api.entries[0].url, "https://upstream.example/api/linux.zip");
        assert_eq!(api.entries[2].platform, ApiPlatform::Windows);
        assert_eq!(
            api.entries[2].url,
            "https://upstream.example/api/windows.zip"
        );
    }

    #[test]
    fn rewritten_link_serializes_in_place() {
        let mut doc = LinksDocument::parse(SAMPLE).unwrap();
        let api = ApiLinks::parse(&doc).unwrap();

        doc.set_link(
            api.entries[0].slot,
            "https://mirror.example/apis/Linux-74.zip",
        );

        let expected = SAMPLE.replace(
            "https://upstream.example/api/linux.zip",
            "https://mirror.example/apis/Linux-74.zip",
        );
        assert_eq!(doc.to_xml().unwrap(), expected);
    }

    #[test]
    fn missing_platform_is_a_shape_error() {
        let trimmed = SAMPLE
            .lines()
            .filter(|line| !line.contains("windows") && !line.contains("Windows"))
            .collect::<Vec<_>>()
            .join("\n");

        let doc = LinksDocument::parse(&trimmed).unwrap();
        let err = ApiLinks::parse(&doc).unwrap_err();
        let shape = err.downcast_ref::<MirrorError>();
        assert!(matches!(shape, Some(MirrorError::ManifestShape(_))));
    }

    #[test]
    fn plain_text_links_are_accepted() {
        let xml = r#"<ApiLinks>
  <Manifest>
    <Version>74</Version>
    <Links>
      <Linux>https://upstream.example/linux.zip</Linux>
      <Mac>https://upstream.example/mac.zip</Mac>
      <Windows>https://upstream.example/windows.zip</Windows>
    </Links>
  </Manifest>
</ApiLinks>
"#;
        let doc = LinksDocument::parse(xml).unwrap();
        let api = ApiLinks::parse(&doc).unwrap();
        assert_eq!(api.entries[1].url, "https://upstream.example/mac.zip");
    }

    #[test]
    fn text_links_with_entity_references_parse_whole() {
        let xml = r#"<ApiLinks>
  <Manifest>
    <Version>74</Version>
    <Links>
      <Linux>https://upstream.example/linux.zip?a=1&amp;b=2</Linux>
      <Mac>https://upstream.example/mac.zip</Mac>
      <Windows>https://upstream.example/windows.zip</Windows>
    </Links>
  </Manifest>
</ApiLinks>
"#;
        let mut doc = LinksDocument::parse(xml).unwrap();
        let api = ApiLinks::parse(&doc).unwrap();
        assert_eq!(
            api.entries[0].url,
            "https://upstream.example/linux.zip?a=1&b=2"
        );

        doc.set_link(
            api.entries[0].slot,
            "https://mirror.example/apis/Linux-74.zip",
        );
        let output = doc.to_xml().unwrap();
        assert!(output.contains("<Linux>https://mirror.example/apis/Linux-74.zip</Linux>"));
        assert!(!output.contains("b=2"));
    }
}
