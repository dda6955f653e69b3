use anyhow::{bail, Result};
use quick_xml::events::Event;

use super::document::{LinkSlot, LinkValue, LinksDocument, TextAccumulator};
use crate::mirror::error::MirrorError;

/// One mod declaration from the mod manifest.
#[derive(Debug, Clone)]
pub struct ModEntry {
    /// Free-text display name, arbitrary Unicode.
    pub name: String,
    pub version: String,
    pub url: String,
    pub slot: LinkSlot,
}

/// Typed view over the mod manifest's repeated `Manifest` entries.
#[derive(Debug)]
pub struct ModLinks {
    pub entries: Vec<ModEntry>,
}

#[derive(Default)]
struct PendingEntry {
    name: TextAccumulator,
    version: TextAccumulator,
    link: LinkValue,
    link_closed: bool,
}

impl ModLinks {
    /// Walk the document events and collect every mod entry with its name,
    /// version, and link slot.
    pub fn parse(doc: &LinksDocument) -> Result<Self> {
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut entries: Vec<ModEntry> = Vec::new();
        let mut pending: Option<PendingEntry> = None;

        for (index, event) in doc.events().iter().enumerate() {
            match event {
                Event::Start(start) => {
                    let name = start.local_name().as_ref().to_vec();
                    if name == b"Manifest" && pending.is_none() {
                        pending = Some(PendingEntry::default());
                    }
                    stack.push(name);
                }
                Event::End(end) => {
                    let name = end.local_name().as_ref().to_vec();
                    stack.pop();

                    // Only the first Link element of an entry carries the
                    // download URL; repeats are ignored.
                    if name == b"Link" {
                        if let Some(p) = &mut pending {
                            if stack.last().is_some_and(|n| n.as_slice() == b"Manifest") {
                                p.link_closed = true;
                            }
                        }
                    }

                    if name == b"Manifest" {
                        if let Some(mut p) = pending.take() {
                            let display = p.name.take_trimmed();
                            if display.is_empty() {
                                bail!(MirrorError::ManifestShape(
                                    "mod entry with empty name".into()
                                ));
                            }

                            let (slot, url) = match p.link.finish() {
                                Some(found) => found,
                                None => bail!(MirrorError::ManifestShape(format!(
                                    "mod entry {:?} has no link",
                                    display
                                ))),
                            };

                            let version = p.version.take_trimmed();
                            if version.is_empty() {
                                bail!(MirrorError::ManifestShape(format!(
                                    "mod entry {:?} has no version",
                                    display
                                )));
                            }

                            entries.push(ModEntry {
                                name: display,
                                version,
                                url,
                                slot,
                            });
                        }
                    }
                }
                Event::Text(_) | Event::CData(_) | Event::GeneralRef(_) => {
                    if let Some(p) = &mut pending {
                        let n = stack.len();
                        if n < 2 || stack[n - 2].as_slice() != b"Manifest" {
                            continue;
                        }

                        match stack[n - 1].as_slice() {
                            b"Name" => p.name.push_event(event)?,
                            b"Version" => p.version.push_event(event)?,
                            b"Link" if !p.link_closed => p.link.push_event(index, event)?,
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(Self { entries })
    }
}
