//! macOS clipboard implementation using NSPasteboard

use super::{ClipboardAdapter, ClipboardError, FileList};
use async_trait::async_trait;
use cocoa::base::{id, nil};
use cocoa::foundation::{NSArray, NSAutoreleasePool, NSData, NSString};
use objc::{class, msg_send, sel, sel_impl};
use std::ffi::CStr;
use std::os::raw::c_char;

/// UTI of plain UTF-8 text
const UTI_PLAIN_TEXT: &str = "public.utf8-plain-text";
const UTI_PNG: &str = "public.png";
const UTI_FILE_URL: &str = "public.file-url";
const NS_FILENAMES_PBOARD_TYPE: &str = "NSFilenamesPboardType";

/// Image representations, most common first
const IMAGE_TYPES: &[&str] = &[
    "public.tiff",
    "public.png",
    "public.jpeg",
    "com.compuserve.gif",
    "public.image",
    "com.apple.pict",
    "com.microsoft.bmp",
];

/// macOS clipboard adapter
pub struct MacOSClipboard {
    pasteboard: id,
}

impl MacOSClipboard {
    /// Bind to the general pasteboard
    pub fn new() -> Result<Self, ClipboardError> {
        unsafe {
            let pasteboard: id = msg_send![class!(NSPasteboard), generalPasteboard];
            if pasteboard == nil {
                return Err(ClipboardError::Unavailable(
                    "Failed to get general pasteboard".to_string(),
                ));
            }

            Ok(Self { pasteboard })
        }
    }

    unsafe fn ns_string(value: &str) -> id {
        NSString::alloc(nil).init_str(value)
    }

    unsafe fn to_rust_string(string: id) -> Option<String> {
        if string == nil {
            return None;
        }
        let utf8_ptr: *const c_char = msg_send![string, UTF8String];
        if utf8_ptr.is_null() {
            return None;
        }
        Some(CStr::from_ptr(utf8_ptr).to_string_lossy().into_owned())
    }

    unsafe fn data_for_type(&self, uti: &str) -> Option<Vec<u8>> {
        let data: id = msg_send![self.pasteboard, dataForType: Self::ns_string(uti)];
        if data == nil {
            return None;
        }

        let length: usize = msg_send![data, length];
        let bytes: *const u8 = msg_send![data, bytes];
        if bytes.is_null() || length == 0 {
            return None;
        }

        Some(std::slice::from_raw_parts(bytes, length).to_vec())
    }

    unsafe fn read_string(&self) -> Option<String> {
        let pool = NSAutoreleasePool::new(nil);
        let string: id = msg_send![self.pasteboard, stringForType: Self::ns_string(UTI_PLAIN_TEXT)];
        let result = Self::to_rust_string(string);
        let _: () = msg_send![pool, drain];
        result
    }

    unsafe fn read_image_data(&self) -> Option<Vec<u8>> {
        let pool = NSAutoreleasePool::new(nil);
        let result = IMAGE_TYPES.iter().find_map(|uti| self.data_for_type(uti));
        let _: () = msg_send![pool, drain];
        result
    }

    /// File URLs from the modern per-item representation
    unsafe fn read_file_urls(&self) -> Vec<String> {
        let mut paths = Vec::new();

        let items: id = msg_send![self.pasteboard, pasteboardItems];
        if items == nil {
            return paths;
        }

        let count = NSArray::count(items);
        for i in 0..count {
            let item = NSArray::objectAtIndex(items, i);
            let url_string: id = msg_send![item, stringForType: Self::ns_string(UTI_FILE_URL)];
            if url_string == nil {
                continue;
            }

            let url: id = msg_send![class!(NSURL), URLWithString: url_string];
            if url == nil {
                continue;
            }
            let is_file: bool = msg_send![url, isFileURL];
            if !is_file {
                continue;
            }

            let path: id = msg_send![url, path];
            if let Some(path) = Self::to_rust_string(path) {
                paths.push(path);
            }
        }

        paths
    }

    /// File names from the legacy property list representation
    unsafe fn read_legacy_filenames(&self) -> Vec<String> {
        let list: id = msg_send![
            self.pasteboard,
            propertyListForType: Self::ns_string(NS_FILENAMES_PBOARD_TYPE)
        ];
        if list == nil {
            return Vec::new();
        }

        let is_array: bool = msg_send![list, isKindOfClass: class!(NSArray)];
        if !is_array {
            return Vec::new();
        }

        (0..NSArray::count(list))
            .filter_map(|i| Self::to_rust_string(NSArray::objectAtIndex(list, i)))
            .collect()
    }

    unsafe fn get_change_count(&self) -> i64 {
        msg_send![self.pasteboard, changeCount]
    }

    unsafe fn write_data(&self, data: &[u8], uti: &str) -> bool {
        let ns_data = NSData::dataWithBytes_length_(
            nil,
            data.as_ptr() as *const _,
            data.len() as u64,
        );
        msg_send![self.pasteboard, setData: ns_data forType: Self::ns_string(uti)]
    }
}

#[async_trait]
impl ClipboardAdapter for MacOSClipboard {
    async fn change_count(&self) -> Result<i64, ClipboardError> {
        unsafe { Ok(self.get_change_count()) }
    }

    async fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        unsafe { Ok(self.read_string().filter(|text| !text.is_empty())) }
    }

    async fn read_image(&self) -> Result<Option<Vec<u8>>, ClipboardError> {
        unsafe { Ok(self.read_image_data()) }
    }

    async fn read_file_list(&self) -> Result<Option<FileList>, ClipboardError> {
        let paths = unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let mut paths = self.read_file_urls();
            if paths.is_empty() {
                paths = self.read_legacy_filenames();
            }
            let _: () = msg_send![pool, drain];
            paths
        };

        if paths.is_empty() {
            return Ok(None);
        }
        FileList::from_paths(&paths).map(Some)
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let _: () = msg_send![self.pasteboard, clearContents];

            let success: bool = msg_send![self.pasteboard,
                setString: Self::ns_string(text)
                forType: Self::ns_string(UTI_PLAIN_TEXT)];

            let _: () = msg_send![pool, drain];
            if !success {
                return Err(ClipboardError::Platform(
                    "Failed to write text to pasteboard".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn write_image(&self, png: &[u8]) -> Result<(), ClipboardError> {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let _: () = msg_send![self.pasteboard, clearContents];
            let success = self.write_data(png, UTI_PNG);
            let _: () = msg_send![pool, drain];

            if !success {
                return Err(ClipboardError::Platform(
                    "Failed to write image to pasteboard".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn write_file_urls(&self, paths: &[String]) -> Result<(), ClipboardError> {
        if paths.is_empty() {
            return Err(ClipboardError::Platform("No file paths to write".to_string()));
        }

        unsafe {
            let pool = NSAutoreleasePool::new(nil);

            let urls: id = msg_send![class!(NSMutableArray), arrayWithCapacity: paths.len()];
            for path in paths {
                let url: id = msg_send![class!(NSURL), fileURLWithPath: Self::ns_string(path)];
                if url != nil {
                    let _: () = msg_send![urls, addObject: url];
                }
            }

            let _: () = msg_send![self.pasteboard, clearContents];
            let success: bool = msg_send![self.pasteboard, writeObjects: urls];

            let _: () = msg_send![pool, drain];
            if !success {
                return Err(ClipboardError::Platform(
                    "Failed to write file URLs to pasteboard".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn frontmost_application(&self) -> Option<String> {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);

            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let name = if workspace == nil {
                None
            } else {
                let app: id = msg_send![workspace, frontmostApplication];
                if app == nil {
                    None
                } else {
                    let localized: id = msg_send![app, localizedName];
                    Self::to_rust_string(localized)
                        .filter(|name| !name.is_empty())
                        .or_else(|| {
                            let bundle: id = msg_send![app, bundleIdentifier];
                            Self::to_rust_string(bundle)
                        })
                        .filter(|name| !name.is_empty())
                }
            };

            let _: () = msg_send![pool, drain];
            name
        }
    }

    fn name(&self) -> &str {
        "macOS (NSPasteboard)"
    }
}

// Safety: NSPasteboard is thread-safe according to Apple documentation
unsafe impl Send for MacOSClipboard {}
unsafe impl Sync for MacOSClipboard {}
