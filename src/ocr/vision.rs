//! Text recognition through the Vision framework (VNRecognizeTextRequest)

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

use async_trait::async_trait;
use cocoa::base::{id, nil, BOOL, YES};
use cocoa::foundation::NSAutoreleasePool;
use objc::runtime::Class;
use objc::{class, msg_send, sel, sel_impl};

use super::{OcrAdapter, OcrError};

#[link(name = "Vision", kind = "framework")]
extern "C" {}

/// VNRequestTextRecognitionLevelAccurate
const RECOGNITION_LEVEL_ACCURATE: isize = 0;

/// On-device recognizer, available from macOS 10.15
#[derive(Debug, Default)]
pub struct VisionRecognizer;

#[async_trait]
impl OcrAdapter for VisionRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        let image = image.to_vec();
        tokio::task::spawn_blocking(move || unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let result = recognize_text(&image);
            let _: () = msg_send![pool, drain];
            result
        })
        .await
        .map_err(|e| OcrError::Platform(format!("recognition task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "vision"
    }
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

fn class_named(name: &str) -> Result<&'static Class, OcrError> {
    Class::get(name).ok_or_else(|| OcrError::Platform(format!("{} is not available", name)))
}

/// Must run inside an autorelease pool
unsafe fn recognize_text(image: &[u8]) -> Result<String, OcrError> {
    let handler_class = class_named("VNImageRequestHandler")?;
    let request_class = class_named("VNRecognizeTextRequest")?;

    let data: id = msg_send![class!(NSData),
        dataWithBytes: image.as_ptr() as *const c_void
        length: image.len()];
    let options: id = msg_send![class!(NSDictionary), dictionary];

    let handler: id = msg_send![handler_class, alloc];
    let handler: id = msg_send![handler, initWithData: data options: options];
    if handler == nil {
        return Err(OcrError::Platform("image could not be loaded".to_string()));
    }

    let request: id = msg_send![request_class, alloc];
    let request: id = msg_send![request, init];
    let _: () = msg_send![request, setRecognitionLevel: RECOGNITION_LEVEL_ACCURATE];
    let _: () = msg_send![request, setUsesLanguageCorrection: YES];

    let requests: id = msg_send![class!(NSArray), arrayWithObject: request];
    let mut error: id = nil;
    let performed: BOOL = msg_send![handler, performRequests: requests error: &mut error as *mut id];

    let result = if performed == YES {
        Ok(collect_lines(request))
    } else {
        let reason = if error == nil {
            None
        } else {
            let description: id = msg_send![error, localizedDescription];
            to_rust_string(description)
        };
        Err(OcrError::Platform(
            reason.unwrap_or_else(|| "text recognition failed".to_string()),
        ))
    };

    let _: () = msg_send![request, release];
    let _: () = msg_send![handler, release];
    result
}

/// Best candidate of each observation, one per line
unsafe fn collect_lines(request: id) -> String {
    let results: id = msg_send![request, results];
    if results == nil {
        return String::new();
    }

    let count: usize = msg_send![results, count];
    let mut lines = Vec::with_capacity(count);
    for index in 0..count {
        let observation: id = msg_send![results, objectAtIndex: index];
        let candidates: id = msg_send![observation, topCandidates: 1usize];
        if candidates == nil {
            continue;
        }
        let candidate_count: usize = msg_send![candidates, count];
        if candidate_count == 0 {
            continue;
        }

        let candidate: id = msg_send![candidates, objectAtIndex: 0usize];
        let string: id = msg_send![candidate, string];
        if let Some(line) = to_rust_string(string) {
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
    }

    lines.join("\n")
}
