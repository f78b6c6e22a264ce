//! Native `NSPasteboard` reads for the representations arboard does not expose.

use crate::pasteboard::{Attachment, BundleEntry, RtfdDocument};
use anyhow::{bail, Result};
use cocoa::base::{id, nil, BOOL, NO};
use cocoa::foundation::{NSArray, NSAutoreleasePool, NSRange, NSString, NSUInteger};
use objc::runtime::{Class, Object};
use objc::{class, msg_send, sel, sel_impl};
use std::ffi::CStr;
use std::path::PathBuf;

// Pasteboard and attributed string constants (from NSPasteboard.h / NSAttributedString.h)
const TYPE_FILE_URL: &str = "public.file-url";
const TYPE_HTML: &str = "public.html";
const ATTACHMENT_ATTRIBUTE: &str = "NSAttachment";
const DOCUMENT_TYPE_KEY: &str = "DocumentType";
const RTFD_DOCUMENT_TYPE: &str = "NSRTFD";

unsafe fn general_pasteboard() -> id {
    msg_send![class!(NSPasteboard), generalPasteboard]
}

unsafe fn ns_string(value: &str) -> id {
    NSString::alloc(nil).init_str(value)
}

unsafe fn to_string(value: id) -> Option<String> {
    if value == nil {
        return None;
    }
    let ptr = value.UTF8String();
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Copy the contents of an `NSData`
unsafe fn data_bytes(data: id) -> Option<Vec<u8>> {
    if data == nil {
        return None;
    }
    let length: NSUInteger = msg_send![data, length];
    if length == 0 {
        return Some(Vec::new());
    }
    let bytes: *const u8 = msg_send![data, bytes];
    if bytes.is_null() {
        return None;
    }
    Some(std::slice::from_raw_parts(bytes, length as usize).to_vec())
}

unsafe fn class_array(class: &Class) -> id {
    NSArray::arrayWithObject(nil, class as *const Class as *mut Object)
}

/// First object of `class` the pasteboard can produce
unsafe fn read_first_object(pasteboard: id, class: &Class) -> Option<id> {
    let classes = class_array(class);
    let can_read: BOOL = msg_send![pasteboard, canReadObjectForClasses: classes options: nil];
    if can_read == NO {
        return None;
    }

    let objects: id = msg_send![pasteboard, readObjectsForClasses: classes options: nil];
    if objects == nil || objects.count() == 0 {
        return None;
    }
    Some(objects.objectAtIndex(0))
}

/// Paths of the file URLs on the pasteboard, `None` when it holds none
pub fn file_urls() -> Result<Option<Vec<PathBuf>>> {
    unsafe {
        let _pool = NSAutoreleasePool::new(nil);
        let pasteboard = general_pasteboard();

        let types: id = msg_send![pasteboard, types];
        if types == nil {
            return Ok(None);
        }
        let has_file_urls: BOOL = msg_send![types, containsObject: ns_string(TYPE_FILE_URL)];
        if has_file_urls == NO {
            return Ok(None);
        }

        let urls: id = msg_send![pasteboard, readObjectsForClasses: class_array(class!(NSURL)) options: nil];
        if urls == nil {
            return Ok(None);
        }

        let mut paths = Vec::new();
        for index in 0..urls.count() {
            let url = urls.objectAtIndex(index);
            let is_file: BOOL = msg_send![url, isFileURL];
            if is_file == NO {
                continue;
            }
            let path: id = msg_send![url, path];
            if let Some(path) = to_string(path) {
                paths.push(PathBuf::from(path));
            }
        }

        log::debug!("Pasteboard holds {} file reference(s)", paths.len());
        Ok(Some(paths))
    }
}

/// Raw HTML data of the first pasteboard item
pub fn html() -> Result<Option<Vec<u8>>> {
    unsafe {
        let _pool = NSAutoreleasePool::new(nil);
        let pasteboard = general_pasteboard();

        let items: id = msg_send![pasteboard, pasteboardItems];
        if items == nil || items.count() == 0 {
            return Ok(None);
        }

        let item = items.objectAtIndex(0);
        let data: id = msg_send![item, dataForType: ns_string(TYPE_HTML)];
        Ok(data_bytes(data))
    }
}

/// The first attributed string on the pasteboard
unsafe fn first_attributed_string() -> Option<id> {
    read_first_object(general_pasteboard(), class!(NSAttributedString))
}

/// File contents of the rich text attachments, in document order
pub fn attachments() -> Result<Option<Vec<Attachment>>> {
    unsafe {
        let _pool = NSAutoreleasePool::new(nil);
        let Some(text) = first_attributed_string() else {
            return Ok(None);
        };

        let length: NSUInteger = msg_send![text, length];
        let attachments = attachments_in_order(text, length);
        log::debug!("Pasteboard rich text holds {} attachment(s)", attachments.len());
        Ok(Some(attachments))
    }
}

/// The RTFD file wrapper Cocoa renders for the first attributed string
pub fn rtfd() -> Result<Option<RtfdDocument>> {
    unsafe {
        let _pool = NSAutoreleasePool::new(nil);
        let Some(text) = first_attributed_string() else {
            return Ok(None);
        };

        let length: NSUInteger = msg_send![text, length];
        let wrapper = rtfd_wrapper(text, length)?;
        let entries = wrapper_entries(wrapper)?;
        log::debug!("RTFD rendering holds {} entries", entries.len());
        Ok(Some(RtfdDocument { entries }))
    }
}

/// Walk the attachment attribute runs from the start of the string
unsafe fn attachments_in_order(text: id, length: NSUInteger) -> Vec<Attachment> {
    let key = ns_string(ATTACHMENT_ATTRIBUTE);
    let mut attachments = Vec::new();
    let mut index: NSUInteger = 0;

    while index < length {
        let mut run = NSRange::new(index, 0);
        let value: id = msg_send![text, attribute: key atIndex: index effectiveRange: &mut run as *mut NSRange];

        if value != nil {
            match attachment_contents(value) {
                Some(attachment) => attachments.push(attachment),
                None => log::debug!("Skipping attachment without file contents at {}", index),
            }
        }

        let next = run.location + run.length;
        index = if next > index { next } else { index + 1 };
    }

    attachments
}

unsafe fn attachment_contents(attachment: id) -> Option<Attachment> {
    let is_attachment: BOOL = msg_send![attachment, isKindOfClass: class!(NSTextAttachment)];
    if is_attachment == NO {
        return None;
    }

    let wrapper: id = msg_send![attachment, fileWrapper];
    if wrapper == nil {
        return None;
    }
    let is_regular: BOOL = msg_send![wrapper, isRegularFile];
    if is_regular == NO {
        return None;
    }

    let contents: id = msg_send![wrapper, regularFileContents];
    let file_name: id = msg_send![wrapper, preferredFilename];

    Some(Attachment {
        file_name: to_string(file_name),
        contents: data_bytes(contents)?,
    })
}

unsafe fn rtfd_wrapper(text: id, length: NSUInteger) -> Result<id> {
    let attributes: id = msg_send![class!(NSDictionary),
        dictionaryWithObject: ns_string(RTFD_DOCUMENT_TYPE)
        forKey: ns_string(DOCUMENT_TYPE_KEY)];

    let mut error: id = nil;
    let wrapper: id = msg_send![text,
        fileWrapperFromRange: NSRange::new(0, length)
        documentAttributes: attributes
        error: &mut error as *mut id];

    if wrapper == nil {
        let reason: id = if error == nil {
            nil
        } else {
            msg_send![error, localizedDescription]
        };
        bail!(
            "Failed to render rich text as RTFD: {}",
            to_string(reason).unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(wrapper)
}

/// Children of a directory wrapper, under the keys Cocoa gave them
unsafe fn wrapper_entries(wrapper: id) -> Result<Vec<BundleEntry>> {
    let children: id = msg_send![wrapper, fileWrappers];
    if children == nil {
        bail!("RTFD rendering is not a directory");
    }

    let names: id = msg_send![children, allKeys];
    let mut entries = Vec::new();
    for index in 0..names.count() {
        let key = names.objectAtIndex(index);
        let child: id = msg_send![children, objectForKey: key];
        let Some(name) = to_string(key) else {
            continue;
        };

        let is_directory: BOOL = msg_send![child, isDirectory];
        let is_regular: BOOL = msg_send![child, isRegularFile];
        if is_directory != NO {
            entries.push(BundleEntry::directory(name, wrapper_entries(child)?));
        } else if is_regular != NO {
            let contents: id = msg_send![child, regularFileContents];
            let Some(contents) = data_bytes(contents) else {
                bail!("RTFD entry {} has no contents", name);
            };
            entries.push(BundleEntry::file(name, contents));
        } else {
            log::debug!("Skipping RTFD entry {} that is neither file nor directory", name);
        }
    }

    Ok(entries)
}
