// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page notifications.
//
// Three event kinds announce the progress of a page through the pipeline:
// `pre_page_ocr` before extraction starts, `post_page_txt` once the text
// artifact exists, and `post_page_hocr` once a step's hOCR artifact exists.
// Delivery is synchronous and in-process; handlers that need to reach other
// processes serialise the event themselves.

use std::sync::{Arc, RwLock};

use papyrus_core::PagePath;
use papyrus_store::Storage;
use serde::Serialize;
use tracing::{debug, warn};

/// Where an event comes from. Shared by every event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventOrigin {
    /// The user who asked for the OCR run.
    pub owner_id: u64,
    pub document_id: u64,
    /// User-facing file name (the upload, not a converted sibling).
    pub file_name: String,
    pub page_num: u32,
    pub version: u32,
    pub step: u32,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrePageOcr {
    #[serde(flatten)]
    pub origin: EventOrigin,
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostPageTxt {
    #[serde(flatten)]
    pub origin: EventOrigin,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostPageHocr {
    #[serde(flatten)]
    pub origin: EventOrigin,
    pub hocr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    PrePageOcr(PrePageOcr),
    PostPageTxt(PostPageTxt),
    PostPageHocr(PostPageHocr),
}

impl PageEvent {
    /// Wire name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PrePageOcr(_) => "pre_page_ocr",
            Self::PostPageTxt(_) => "post_page_txt",
            Self::PostPageHocr(_) => "post_page_hocr",
        }
    }

    pub fn origin(&self) -> &EventOrigin {
        match self {
            Self::PrePageOcr(event) => &event.origin,
            Self::PostPageTxt(event) => &event.origin,
            Self::PostPageHocr(event) => &event.origin,
        }
    }
}

/// Receives page events.
pub trait PageEventHandler: Send + Sync {
    fn handle(&self, event: &PageEvent);
}

impl<F> PageEventHandler for F
where
    F: Fn(&PageEvent) + Send + Sync,
{
    fn handle(&self, event: &PageEvent) {
        self(event)
    }
}

/// In-process publish/subscribe registry.
#[derive(Default)]
pub struct NotificationBus {
    handlers: RwLock<Vec<Arc<dyn PageEventHandler>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It sees every event published from now on.
    pub fn subscribe(&self, handler: impl PageEventHandler + 'static) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.push(Arc::new(handler));
    }

    /// Deliver `event` to every handler registered at this moment, in
    /// registration order. Returns once all of them have run.
    pub fn publish(&self, event: &PageEvent) -> usize {
        let handlers: Vec<Arc<dyn PageEventHandler>> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for handler in &handlers {
            handler.handle(event);
        }
        debug!(
            event = event.name(),
            page = event.origin().page_num,
            step = event.origin().step,
            handlers = handlers.len(),
            "event published"
        );
        handlers.len()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

// ---------------------------------------------------------------------------
// Emission helpers
// ---------------------------------------------------------------------------

pub fn notify_pre_page_ocr(bus: &NotificationBus, origin: EventOrigin, lang: &str) {
    bus.publish(&PageEvent::PrePageOcr(PrePageOcr {
        origin,
        lang: lang.to_string(),
    }));
}

/// Publish `post_page_txt` with the stored text of `page`.
///
/// A missing or unreadable artifact is logged and nothing is published.
/// Returns whether an event went out.
pub fn notify_txt_ready(
    bus: &NotificationBus,
    storage: &dyn Storage,
    page: &PagePath,
    origin: EventOrigin,
) -> bool {
    match read_artifact(storage, &page.txt_url()) {
        Some(text) => {
            bus.publish(&PageEvent::PostPageTxt(PostPageTxt { origin, text }));
            true
        }
        None => false,
    }
}

/// Publish `post_page_hocr` with the stored hOCR of `page` at its step.
///
/// Same missing-artifact behaviour as [`notify_txt_ready`].
pub fn notify_hocr_ready(
    bus: &NotificationBus,
    storage: &dyn Storage,
    page: &PagePath,
    origin: EventOrigin,
) -> bool {
    match read_artifact(storage, &page.hocr_url()) {
        Some(hocr) => {
            bus.publish(&PageEvent::PostPageHocr(PostPageHocr { origin, hocr }));
            true
        }
        None => false,
    }
}

fn read_artifact(storage: &dyn Storage, url: &str) -> Option<String> {
    match storage.read_text(url) {
        Ok(Some(content)) => Some(content),
        Ok(None) => {
            warn!(url, "artifact missing, notification skipped");
            None
        }
        Err(err) => {
            warn!(url, %err, "artifact unreadable, notification skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use papyrus_core::{DocumentPath, Steps};
    use papyrus_store::LocalStorage;

    fn origin(step: u32) -> EventOrigin {
        EventOrigin {
            owner_id: 1,
            document_id: 2,
            file_name: "scan.pdf".into(),
            page_num: 1,
            version: 1,
            step,
            namespace: None,
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_: &PageEvent| seen.lock().expect("lock").push(id));
        }

        let delivered = bus.publish(&PageEvent::PrePageOcr(PrePageOcr {
            origin: origin(2),
            lang: "deu".into(),
        }));
        assert_eq!(delivered, 3);
        assert_eq!(*seen.lock().expect("lock"), vec![0, 1, 2]);
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let bus = NotificationBus::new();
        notify_pre_page_ocr(&bus, origin(2), "eng");

        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        bus.subscribe(move |_: &PageEvent| *counter.lock().expect("lock") += 1);
        assert_eq!(*count.lock().expect("lock"), 0);
    }

    #[test]
    fn missing_artifact_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let steps = Steps::default();
        let storage = LocalStorage::new(dir.path(), steps.clone());
        let page = PagePath::new(DocumentPath::new(1, 2, "scan.pdf", 1), 1, steps.text_step(), 1);

        let bus = NotificationBus::new();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        bus.subscribe(move |_: &PageEvent| *counter.lock().expect("lock") += 1);

        assert!(!notify_txt_ready(&bus, &storage, &page, origin(2)));
        assert!(!notify_hocr_ready(&bus, &storage, &page, origin(2)));
        assert_eq!(*count.lock().expect("lock"), 0);

        storage.write_text(&page.txt_url(), "hello").expect("write");
        assert!(notify_txt_ready(&bus, &storage, &page, origin(2)));
        assert_eq!(*count.lock().expect("lock"), 1);
    }

    #[test]
    fn events_serialise_flat_with_kind_tag() {
        let event = PageEvent::PostPageTxt(PostPageTxt {
            origin: origin(2),
            text: "hi".into(),
        });
        let json = serde_json::to_value(&event).expect("json");
        assert_eq!(json["event"], "post_page_txt");
        assert_eq!(json["document_id"], 2);
        assert_eq!(json["text"], "hi");
        assert_eq!(json["namespace"], serde_json::Value::Null);
    }
}
