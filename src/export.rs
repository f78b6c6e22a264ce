use crate::logger::Logger;
use crate::pasteboard::{ClipboardImage, Pasteboard, Representation};
use crate::rtfd;
use crate::run_context::RunContext;
use anyhow::{bail, Context, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

/// Writes clipboard representations into the run's output directory.
///
/// Failures are logged and never returned: each export mode stands alone.
pub struct Exporter<'a, P: Pasteboard + ?Sized> {
    context: &'a RunContext,
    pasteboard: &'a P,
    logger: &'a Logger,
}

impl<'a, P: Pasteboard + ?Sized> Exporter<'a, P> {
    pub fn new(context: &'a RunContext, pasteboard: &'a P, logger: &'a Logger) -> Self {
        Self {
            context,
            pasteboard,
            logger,
        }
    }

    pub fn logger(&self) -> &Logger {
        self.logger
    }

    /// Query one representation, logging read errors as absence
    fn read<T>(&self, representation: Representation, query: impl FnOnce(&P) -> Result<Option<T>>) -> Option<T> {
        match query(self.pasteboard) {
            Ok(value) => value,
            Err(e) => {
                self.logger
                    .error(&e.context(format!("Failed to read {} from the clipboard", representation)));
                None
            }
        }
    }

    /// Copy every referenced file to `<output>/<name>_<file name>`.
    ///
    /// Returns whether the clipboard held file references at all, even if
    /// some copies failed.
    pub fn save_files(&self) -> bool {
        let Some(sources) = self.read(Representation::FileUrls, |p| p.file_urls()) else {
            return false;
        };

        let mut failed = 0;
        for source in &sources {
            match self.copy_file(source) {
                Ok(file_name) => self.logger.info(format!(
                    "Save clipboard files to disk successful. File name: {}",
                    file_name
                )),
                Err(e) => {
                    failed += 1;
                    self.logger.error(&e.context(format!(
                        "Save clipboard file {:?} to disk failed",
                        source
                    )));
                }
            }
        }

        if failed > 0 {
            self.logger.error_msg(format!(
                "{} of {} clipboard files could not be saved",
                failed,
                sources.len()
            ));
        }
        true
    }

    fn copy_file(&self, source: &Path) -> Result<String> {
        let file_name = source
            .file_name()
            .with_context(|| format!("{:?} has no file name", source))?
            .to_string_lossy()
            .into_owned();

        let destination = self.context.copy_destination(&file_name);
        copy_item(source, &destination)?;

        Ok(destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or(file_name))
    }

    /// Encode the clipboard bitmap as `<name>.png`. Returns false when there is
    /// no bitmap or it could not be saved.
    pub fn save_image(&self) -> bool {
        let Some(image) = self.read(Representation::Image, |p| p.image()) else {
            return false;
        };

        let path = self.context.artifact_path(".png");
        let result = encode_png(&image).and_then(|png| write_atomic(&path, &png));

        match result {
            Ok(()) => {
                self.logger.info(format!(
                    "Save clipboard image to local file successful. File name: {}",
                    display_name(&path)
                ));
                true
            }
            Err(e) => {
                self.logger
                    .error(&e.context("Save clipboard image to local file failed"));
                false
            }
        }
    }

    /// Write every rich text attachment as an image: `<name>.png` for a single
    /// attachment, `<name>_<index>.png` in document order for several.
    pub fn save_attachment_images(&self) -> Vec<PathBuf> {
        let Some(attachments) = self.read(Representation::Attachments, |p| p.attachments()) else {
            self.logger
                .error_msg("No image or rich text with attachments on the clipboard");
            return Vec::new();
        };

        if attachments.is_empty() {
            self.logger
                .error_msg("Clipboard rich text contains no attachments");
            return Vec::new();
        }

        let single = attachments.len() == 1;
        let mut written = Vec::new();
        for (index, attachment) in attachments.iter().enumerate() {
            let path = if single {
                self.context.artifact_path(".png")
            } else {
                self.context.artifact_path(&format!("_{}.png", index))
            };

            match write_atomic(&path, &attachment.contents) {
                Ok(()) => {
                    self.logger.info(format!(
                        "Save clipboard images to local file successful. File name: {}",
                        display_name(&path)
                    ));
                    written.push(path);
                }
                Err(e) => self
                    .logger
                    .error(&e.context("Save clipboard images to local file failed")),
            }
        }
        written
    }

    /// Write the HTML representation verbatim to `<name>.html`
    pub fn save_html(&self) -> Option<PathBuf> {
        let Some(data) = self.read(Representation::Html, |p| p.html()) else {
            self.logger.error_msg("No HTML content on the clipboard");
            return None;
        };

        let html = match String::from_utf8(data) {
            Ok(html) => html,
            Err(e) => {
                self.logger
                    .error_msg(format!("Clipboard HTML is not valid UTF-8: {}", e));
                return None;
            }
        };

        let path = self.context.artifact_path(".html");
        match write_atomic(&path, html.as_bytes()) {
            Ok(()) => {
                self.logger.info(format!(
                    "Save clipboard content to html file successful. File name: {}",
                    display_name(&path)
                ));
                Some(path)
            }
            Err(e) => {
                self.logger
                    .error(&e.context("Save clipboard content to html file failed"));
                None
            }
        }
    }

    /// Write the rich text with its attachments as a `<name>.rtfd` bundle
    pub fn save_rtfd(&self) -> Option<PathBuf> {
        let Some(document) = self.read(Representation::Rtfd, |p| p.rtfd()) else {
            self.logger.error_msg("No rich text content on the clipboard");
            return None;
        };

        let path = self.context.artifact_path(".rtfd");
        match rtfd::write_bundle(&path, &document) {
            Ok(()) => {
                self.logger.info(format!(
                    "Save clipboard content to RTFD file successful. File name: {}",
                    display_name(&path)
                ));
                Some(path)
            }
            Err(e) => {
                self.logger
                    .error(&e.context("Save clipboard content to RTFD file failed"));
                None
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn encode_png(image: &ClipboardImage) -> Result<Vec<u8>> {
    let width = u32::try_from(image.width).context("Image is too wide")?;
    let height = u32::try_from(image.height).context("Image is too tall")?;

    let buffer = RgbaImage::from_raw(width, height, image.bytes.clone()).with_context(|| {
        format!(
            "Image data does not match its {}x{} size ({} bytes)",
            width,
            height,
            image.bytes.len()
        )
    })?;

    let mut png = Vec::new();
    DynamicImage::ImageRgba8(buffer)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(png)
}

/// Write through a temp file in the destination directory, then rename over `path`
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    // Temp files default to owner-only; artifacts get the usual file mode
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    let mut file = builder
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
    file.write_all(contents)
        .with_context(|| format!("Failed to write {:?}", path))?;
    file.persist(path)
        .with_context(|| format!("Failed to save {:?}", path))?;
    Ok(())
}

/// Copy a file or directory tree, refusing to overwrite anything.
/// Symbolic links are recreated, not followed.
fn copy_item(source: &Path, destination: &Path) -> Result<()> {
    if destination.symlink_metadata().is_ok() {
        bail!("{:?} already exists", destination);
    }

    let metadata = fs::symlink_metadata(source)
        .with_context(|| format!("Failed to read {:?}", source))?;

    if metadata.file_type().is_symlink() {
        copy_link(source, destination)?;
    } else if metadata.is_dir() {
        fs::create_dir(destination)
            .with_context(|| format!("Failed to create directory {:?}", destination))?;
        for entry in fs::read_dir(source).with_context(|| format!("Failed to list {:?}", source))? {
            let entry = entry?;
            copy_item(&entry.path(), &destination.join(entry.file_name()))?;
        }
    } else {
        fs::copy(source, destination)
            .with_context(|| format!("Failed to copy {:?} to {:?}", source, destination))?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_link(source: &Path, destination: &Path) -> Result<()> {
    let target =
        fs::read_link(source).with_context(|| format!("Failed to read link {:?}", source))?;
    std::os::unix::fs::symlink(&target, destination)
        .with_context(|| format!("Failed to create link {:?}", destination))?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_link(source: &Path, _destination: &Path) -> Result<()> {
    bail!("Copying symbolic link {:?} is not supported on this platform", source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pasteboard::memory::MemoryPasteboard;
    use crate::pasteboard::{Attachment, BundleEntry, RtfdDocument};
    use tempfile::TempDir;

    const STAMP: &str = "2024-03-13T09:05:07+08:00";

    struct Fixture {
        dir: TempDir,
        context: RunContext,
        logger: Logger,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let out = dir.path().join("out");
            fs::create_dir(&out).unwrap();
            let context = RunContext::with_name(format!("{}/", out.display()), STAMP);
            let logger = Logger::with_filters(&dir.path().join("pdc.log"), "info").unwrap();
            Self {
                dir,
                context,
                logger,
            }
        }

        fn out(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn exporter<'a>(&'a self, pasteboard: &'a MemoryPasteboard) -> Exporter<'a, MemoryPasteboard> {
            Exporter::new(&self.context, pasteboard, &self.logger)
        }

        fn output_names(&self) -> Vec<String> {
            let mut names: Vec<_> = fs::read_dir(self.out())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }

        fn log(&self) -> String {
            fs::read_to_string(self.dir.path().join("pdc.log")).unwrap()
        }
    }

    fn attachment(contents: &[u8]) -> Attachment {
        Attachment {
            file_name: Some("image.png".to_string()),
            contents: contents.to_vec(),
        }
    }

    fn bundle(attachment: &[u8]) -> RtfdDocument {
        RtfdDocument {
            entries: vec![
                BundleEntry::file("Attachment.tiff", attachment),
                BundleEntry::file(rtfd::TEXT_ENTRY, &b"{\\rtf1 copied}"[..]),
            ],
        }
    }

    #[test]
    fn files_are_copied_with_run_prefix() {
        let fixture = Fixture::new();
        let source = fixture.dir.path().join("report.txt");
        fs::write(&source, "quarterly").unwrap();

        let pasteboard = MemoryPasteboard {
            files: Some(vec![source]),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_files());
        let copied = fixture.out().join(format!("{}_report.txt", STAMP));
        assert_eq!(fs::read_to_string(copied).unwrap(), "quarterly");
    }

    #[test]
    fn file_copies_continue_after_a_failure() {
        let fixture = Fixture::new();
        let good = fixture.dir.path().join("good.txt");
        fs::write(&good, "ok").unwrap();
        let missing = fixture.dir.path().join("missing.txt");

        let pasteboard = MemoryPasteboard {
            files: Some(vec![missing, good]),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_files());
        assert_eq!(fixture.output_names(), vec![format!("{}_good.txt", STAMP)]);
        assert!(fixture.log().contains("1 of 2 clipboard files could not be saved"));
    }

    #[test]
    fn directories_are_copied_recursively() {
        let fixture = Fixture::new();
        let folder = fixture.dir.path().join("album");
        fs::create_dir_all(folder.join("nested")).unwrap();
        fs::write(folder.join("nested").join("a.txt"), "a").unwrap();

        let pasteboard = MemoryPasteboard {
            files: Some(vec![folder]),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_files());
        let copied = fixture
            .out()
            .join(format!("{}_album", STAMP))
            .join("nested")
            .join("a.txt");
        assert_eq!(fs::read_to_string(copied).unwrap(), "a");
    }

    #[test]
    fn existing_destination_is_not_overwritten() {
        let fixture = Fixture::new();
        let source = fixture.dir.path().join("a.txt");
        fs::write(&source, "new").unwrap();
        let destination = fixture.out().join(format!("{}_a.txt", STAMP));
        fs::write(&destination, "old").unwrap();

        let pasteboard = MemoryPasteboard {
            files: Some(vec![source]),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_files());
        assert_eq!(fs::read_to_string(destination).unwrap(), "old");
    }

    #[test]
    fn no_file_references_reports_false() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard::default();

        assert!(!fixture.exporter(&pasteboard).save_files());
        assert!(fixture.output_names().is_empty());
    }

    #[test]
    fn image_is_encoded_as_png() {
        let fixture = Fixture::new();
        let pixels = vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 0, 0, 0, 0];
        let pasteboard = MemoryPasteboard {
            image: Some(ClipboardImage {
                width: 2,
                height: 2,
                bytes: pixels.clone(),
            }),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_image());

        let path = fixture.out().join(format!("{}.png", STAMP));
        let decoded = image::load_from_memory_with_format(&fs::read(path).unwrap(), ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.into_raw(), pixels);
    }

    #[test]
    fn missing_image_reports_false() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard::default();

        assert!(!fixture.exporter(&pasteboard).save_image());
        assert!(fixture.output_names().is_empty());
    }

    #[test]
    fn mismatched_image_size_reports_false() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard {
            image: Some(ClipboardImage {
                width: 4,
                height: 4,
                bytes: vec![0; 3],
            }),
            ..Default::default()
        };

        assert!(!fixture.exporter(&pasteboard).save_image());
        assert!(fixture.output_names().is_empty());
        assert!(fixture.log().contains("Save clipboard image to local file failed"));
    }

    #[test]
    fn clipboard_read_error_is_logged() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard {
            fail_image: true,
            ..Default::default()
        };

        assert!(!fixture.exporter(&pasteboard).save_image());
        assert!(fixture.log().contains("clipboard is locked"));
    }

    #[test]
    fn single_attachment_is_written_byte_identical() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard {
            attachments: Some(vec![attachment(b"\x89PNG only")]),
            ..Default::default()
        };

        let written = fixture.exporter(&pasteboard).save_attachment_images();

        assert_eq!(written, vec![fixture.out().join(format!("{}.png", STAMP))]);
        assert_eq!(fs::read(&written[0]).unwrap(), b"\x89PNG only");
    }

    #[test]
    fn several_attachments_are_indexed_in_document_order() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard {
            attachments: Some(vec![
                attachment(b"first"),
                attachment(b"second"),
                attachment(b"third"),
            ]),
            ..Default::default()
        };

        let written = fixture.exporter(&pasteboard).save_attachment_images();

        assert_eq!(written.len(), 3);
        for (index, expected) in [&b"first"[..], b"second", b"third"].iter().enumerate() {
            let path = fixture.out().join(format!("{}_{}.png", STAMP, index));
            assert_eq!(fs::read(path).unwrap(), *expected);
        }
    }

    #[test]
    fn rich_text_without_attachments_writes_nothing() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard {
            attachments: Some(Vec::new()),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_attachment_images().is_empty());
        assert!(fixture.output_names().is_empty());
    }

    #[test]
    fn html_is_written_verbatim() {
        let fixture = Fixture::new();
        let html = "<meta charset='utf-8'><b>héllo</b>";
        let pasteboard = MemoryPasteboard {
            html: Some(html.as_bytes().to_vec()),
            ..Default::default()
        };

        let path = fixture.exporter(&pasteboard).save_html().unwrap();

        assert_eq!(path, fixture.out().join(format!("{}.html", STAMP)));
        assert_eq!(fs::read_to_string(path).unwrap(), html);
    }

    #[test]
    fn non_utf8_html_writes_nothing() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard {
            html: Some(vec![0x3c, 0x62, 0xff, 0xfe]),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_html().is_none());
        assert!(fixture.output_names().is_empty());
    }

    #[test]
    fn absent_html_writes_nothing() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard::default();

        assert!(fixture.exporter(&pasteboard).save_html().is_none());
        assert!(fixture.output_names().is_empty());
    }

    #[test]
    fn rtfd_bundle_round_trips() {
        let fixture = Fixture::new();
        let document = bundle(b"II*\0 embedded");
        let pasteboard = MemoryPasteboard {
            rtfd: Some(document.clone()),
            ..Default::default()
        };

        let path = fixture.exporter(&pasteboard).save_rtfd().unwrap();

        assert_eq!(path, fixture.out().join(format!("{}.rtfd", STAMP)));
        assert_eq!(rtfd::read_bundle(&path).unwrap(), document);
    }

    #[test]
    fn absent_rich_text_writes_no_bundle() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard::default();

        assert!(fixture.exporter(&pasteboard).save_rtfd().is_none());
        assert!(fixture.output_names().is_empty());
    }

    #[test]
    fn missing_output_directory_is_logged_not_raised() {
        let fixture = Fixture::new();
        fs::remove_dir(fixture.out()).unwrap();
        let pasteboard = MemoryPasteboard {
            html: Some(b"<p>hi</p>".to_vec()),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_html().is_none());
        assert!(fixture.log().contains("Save clipboard content to html file failed"));
    }

    #[test]
    fn attachments_do_not_depend_on_rtfd_rendering() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard {
            attachments: Some(vec![attachment(b"\x89PNG kept")]),
            fail_rtfd: true,
            ..Default::default()
        };

        let written = fixture.exporter(&pasteboard).save_attachment_images();

        assert_eq!(written.len(), 1);
        assert_eq!(pasteboard.queries(), vec![Representation::Attachments]);
    }

    #[test]
    fn rtfd_rendering_failure_is_logged() {
        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard {
            fail_rtfd: true,
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_rtfd().is_none());
        assert!(fixture.output_names().is_empty());
        assert!(fixture.log().contains("rich text could not be rendered as RTFD"));
    }

    #[test]
    fn rtfd_entry_names_follow_the_rendering() {
        let fixture = Fixture::new();
        let document = RtfdDocument {
            entries: vec![
                BundleEntry::file("Attachment.tiff", &b"first"[..]),
                BundleEntry::file("Attachment 1.tiff", &b"second"[..]),
                BundleEntry::file(rtfd::TEXT_ENTRY, &b"{\\rtf1 two}"[..]),
            ],
        };
        let pasteboard = MemoryPasteboard {
            rtfd: Some(document),
            ..Default::default()
        };

        let path = fixture.exporter(&pasteboard).save_rtfd().unwrap();

        assert_eq!(fs::read(path.join("Attachment.tiff")).unwrap(), b"first");
        assert_eq!(fs::read(path.join("Attachment 1.tiff")).unwrap(), b"second");
    }

    #[cfg(unix)]
    #[test]
    fn artifacts_get_the_usual_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let fixture = Fixture::new();
        let pasteboard = MemoryPasteboard {
            html: Some(b"<p>shared</p>".to_vec()),
            image: Some(ClipboardImage {
                width: 1,
                height: 1,
                bytes: vec![0, 0, 0, 255],
            }),
            ..Default::default()
        };
        let plain = fixture.out().join("plain.txt");
        fs::write(&plain, "plain").unwrap();

        let exporter = fixture.exporter(&pasteboard);
        let html = exporter.save_html().unwrap();
        assert!(exporter.save_image());
        let png = fixture.out().join(format!("{}.png", STAMP));

        let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode();
        // Group and other read bits match a file created the ordinary way
        assert_eq!(mode(&html) & 0o044, mode(&plain) & 0o044);
        assert_eq!(mode(&png) & 0o044, mode(&plain) & 0o044);
        assert_eq!(mode(&html) & 0o022, 0);
    }

    #[cfg(unix)]
    #[test]
    fn symbolic_links_are_copied_as_links() {
        let fixture = Fixture::new();
        let folder = fixture.dir.path().join("album");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("photo.jpg"), "jpg").unwrap();
        std::os::unix::fs::symlink(".", folder.join("loop")).unwrap();
        std::os::unix::fs::symlink("photo.jpg", folder.join("cover.jpg")).unwrap();

        let pasteboard = MemoryPasteboard {
            files: Some(vec![folder]),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_files());

        let copied = fixture.out().join(format!("{}_album", STAMP));
        let link = copied.join("loop");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("."));
        assert_eq!(fs::read_to_string(copied.join("cover.jpg")).unwrap(), "jpg");
        assert!(!fixture.log().contains("could not be saved"));
    }

    #[cfg(unix)]
    #[test]
    fn top_level_link_is_copied_as_link() {
        let fixture = Fixture::new();
        let target = fixture.dir.path().join("target.txt");
        fs::write(&target, "target").unwrap();
        let link = fixture.dir.path().join("shortcut.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let pasteboard = MemoryPasteboard {
            files: Some(vec![link]),
            ..Default::default()
        };

        assert!(fixture.exporter(&pasteboard).save_files());
        let copied = fixture.out().join(format!("{}_shortcut.txt", STAMP));
        assert_eq!(fs::read_link(copied).unwrap(), target);
    }
}
