use crate::export::Exporter;
use crate::pasteboard::Pasteboard;

/// Which export modes were requested on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modes {
    pub files: bool,
    pub image: bool,
    pub html: bool,
    pub rtfd: bool,
}

impl Modes {
    pub fn any(&self) -> bool {
        self.files || self.image || self.html || self.rtfd
    }
}

/// Run the requested modes in order: files, image, HTML, RTFD.
///
/// File references on the clipboard satisfy the whole run and skip the other
/// modes. A failure in one mode never stops the next.
pub fn dispatch<P: Pasteboard + ?Sized>(modes: Modes, exporter: &Exporter<'_, P>) {
    if !modes.any() {
        exporter
            .logger()
            .info("No export mode selected, nothing to do");
        return;
    }

    if modes.files && exporter.save_files() {
        return;
    }

    if modes.image && !exporter.save_image() {
        exporter.save_attachment_images();
    }

    if modes.html {
        exporter.save_html();
    }

    if modes.rtfd {
        exporter.save_rtfd();
    }
}
