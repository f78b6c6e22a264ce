use anyhow::{Context, Result};
use arboard::Clipboard;
use std::fmt;
use std::path::PathBuf;

/// One typed encoding of the copied content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    FileUrls,
    Image,
    Html,
    Attachments,
    Rtfd,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Representation::FileUrls => "file references",
            Representation::Image => "image",
            Representation::Html => "HTML",
            Representation::Attachments => "rich text attachments",
            Representation::Rtfd => "RTFD rich text",
        };
        f.write_str(name)
    }
}

/// Bitmap as tightly packed RGBA8 rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardImage {
    pub width: usize,
    pub height: usize,
    pub bytes: Vec<u8>,
}

/// Raw contents of a file embedded in rich text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: Option<String>,
    pub contents: Vec<u8>,
}

/// One named entry of an RTFD bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub name: String,
    pub contents: EntryContents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContents {
    File(Vec<u8>),
    Directory(Vec<BundleEntry>),
}

impl BundleEntry {
    pub fn file(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: EntryContents::File(contents.into()),
        }
    }

    pub fn directory(name: impl Into<String>, entries: Vec<BundleEntry>) -> Self {
        Self {
            name: name.into(),
            contents: EntryContents::Directory(entries),
        }
    }
}

/// Rich text rendered as an RTFD bundle: `TXT.rtf` plus the attachment
/// entries it refers to, under the names the text uses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtfdDocument {
    pub entries: Vec<BundleEntry>,
}

/// Read access to the shared system clipboard.
///
/// Every call queries the clipboard afresh. `Ok(None)` means the
/// representation is not present; `Err` means the clipboard could not be read.
pub trait Pasteboard {
    fn file_urls(&self) -> Result<Option<Vec<PathBuf>>>;
    fn image(&self) -> Result<Option<ClipboardImage>>;
    fn html(&self) -> Result<Option<Vec<u8>>>;
    /// Attachments of the rich text in document order; `None` without rich text
    fn attachments(&self) -> Result<Option<Vec<Attachment>>>;
    fn rtfd(&self) -> Result<Option<RtfdDocument>>;
}

/// The general pasteboard of the running system
#[derive(Debug, Default)]
pub struct SystemPasteboard;

impl SystemPasteboard {
    pub fn new() -> Self {
        Self
    }
}

impl Pasteboard for SystemPasteboard {
    fn file_urls(&self) -> Result<Option<Vec<PathBuf>>> {
        native::file_urls()
    }

    fn image(&self) -> Result<Option<ClipboardImage>> {
        let mut clipboard = Clipboard::new().context("Failed to access clipboard")?;

        match clipboard.get_image() {
            Ok(image) => Ok(Some(ClipboardImage {
                width: image.width,
                height: image.height,
                bytes: image.bytes.into_owned(),
            })),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(e).context("Failed to read image from clipboard"),
        }
    }

    fn html(&self) -> Result<Option<Vec<u8>>> {
        native::html()
    }

    fn attachments(&self) -> Result<Option<Vec<Attachment>>> {
        native::attachments()
    }

    fn rtfd(&self) -> Result<Option<RtfdDocument>> {
        native::rtfd()
    }
}

#[cfg(target_os = "macos")]
use crate::macos as native;

#[cfg(not(target_os = "macos"))]
use self::unsupported as native;

/// Representations only the native macOS pasteboard exposes
#[cfg(not(target_os = "macos"))]
mod unsupported {
    use super::{Attachment, Representation, RtfdDocument};
    use anyhow::Result;
    use std::path::PathBuf;

    fn absent<T>(representation: Representation) -> Result<Option<T>> {
        log::debug!("Reading {} is only supported on macOS", representation);
        Ok(None)
    }

    pub fn file_urls() -> Result<Option<Vec<PathBuf>>> {
        absent(Representation::FileUrls)
    }

    pub fn html() -> Result<Option<Vec<u8>>> {
        absent(Representation::Html)
    }

    pub fn attachments() -> Result<Option<Vec<Attachment>>> {
        absent(Representation::Attachments)
    }

    pub fn rtfd() -> Result<Option<RtfdDocument>> {
        absent(Representation::Rtfd)
    }
}
