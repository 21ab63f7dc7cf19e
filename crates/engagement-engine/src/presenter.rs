//! Popup content per variant and the outbound messaging boundary.

use serde::{Deserialize, Serialize};

use crate::types::{EngineResult, SessionMetrics, Variant};

/// Fixed copy set rendered by the host for one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentBundle {
    pub headline: &'static str,
    pub benefits: &'static [&'static str],
    pub call_to_action: &'static str,
    pub contact_placeholder: &'static str,
    /// First line of the message sent through the chat channel.
    pub message_intro: &'static str,
}

const GUIDE_CONTENT: ContentBundle = ContentBundle {
    headline: "Get the free Study Abroad & Career Guide",
    benefits: &[
        "Admission and visa timeline, step by step",
        "Tuition, living costs and scholarship options",
        "Where graduates find work after the program",
    ],
    call_to_action: "Send me the guide",
    contact_placeholder: "Phone number or messenger ID",
    message_intro: "Hi! I'd like to receive the free study abroad & career guide.",
};

const CONSULTATION_CONTENT: ContentBundle = ContentBundle {
    headline: "Not sure where to start? Talk to a counselor",
    benefits: &[
        "Free 1:1 session with an education & careers counselor",
        "An honest read on your chances before you apply",
        "A concrete plan for the next three months",
    ],
    call_to_action: "Book my free consultation",
    contact_placeholder: "Phone number or messenger ID",
    message_intro: "Hi! I'd like to book a free consultation.",
};

const RECOMMENDATION_CONTENT: ContentBundle = ContentBundle {
    headline: "Programs and jobs matched to your profile",
    benefits: &[
        "Shortlist of schools that fit your grades and budget",
        "Job tracks with real demand in each destination",
        "Personal recommendations within one business day",
    ],
    call_to_action: "Get my recommendations",
    contact_placeholder: "Phone number or messenger ID",
    message_intro: "Hi! I'd like personalized program and job recommendations.",
};

/// Copy for a variant. Control has none.
pub fn content_for(variant: Variant) -> Option<&'static ContentBundle> {
    match variant {
        Variant::Guide => Some(&GUIDE_CONTENT),
        Variant::Consultation => Some(&CONSULTATION_CONTENT),
        Variant::Recommendation => Some(&RECOMMENDATION_CONTENT),
        Variant::Control => None,
    }
}

/// What the host renders when the engine triggers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PopupView {
    pub variant: Variant,
    pub content: &'static ContentBundle,
}

/// Outbound request to open the external chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub message: String,
    pub contact: String,
}

/// The external messaging collaborator. "Opened" is terminal success.
pub trait MessagingChannel: Send + Sync {
    fn open(&self, request: &ChannelRequest) -> EngineResult<()>;
}

/// Channel that only logs the request, for hosts without a chat link.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChannel;

impl MessagingChannel for TracingChannel {
    fn open(&self, request: &ChannelRequest) -> EngineResult<()> {
        tracing::info!(contact = %request.contact, "Opening chat channel");
        Ok(())
    }
}

/// Compose the chat message for a converted lead.
pub fn compose_message(variant: Variant, contact: &str, metrics: &SessionMetrics) -> String {
    let intro = content_for(variant)
        .map(|c| c.message_intro)
        .unwrap_or("Hi! I'd like to get in touch.");

    format!(
        "{intro}\nContact: {contact}\n[{variant} | {}s on site | {:.0}% read | {} page(s)]",
        metrics.time_on_site_seconds, metrics.max_scroll_depth_percent, metrics.page_view_count
    )
}

/// Visibility of the popup within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupStatus {
    Hidden,
    Showing,
    Closed,
    Converted,
}

/// Tracks whether the popup is up and which view it carries.
#[derive(Debug, Clone)]
pub struct PopupPresenter {
    view: Option<PopupView>,
    status: PopupStatus,
}

impl Default for PopupPresenter {
    fn default() -> Self {
        Self {
            view: None,
            status: PopupStatus::Hidden,
        }
    }
}

impl PopupPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PopupStatus {
        self.status
    }

    pub fn is_showing(&self) -> bool {
        self.status == PopupStatus::Showing
    }

    /// The view currently on screen.
    pub fn view(&self) -> Option<&PopupView> {
        self.view.as_ref().filter(|_| self.is_showing())
    }

    /// Put the variant's popup up. `None` for control or if it was shown before.
    pub fn show(&mut self, variant: Variant) -> Option<PopupView> {
        if self.status != PopupStatus::Hidden {
            return None;
        }
        let view = PopupView {
            variant,
            content: content_for(variant)?,
        };
        self.view = Some(view);
        self.status = PopupStatus::Showing;
        Some(view)
    }

    /// Take the popup down. Returns the dismissed view if one was showing.
    pub fn dismiss(&mut self, converted: bool) -> Option<PopupView> {
        if !self.is_showing() {
            return None;
        }
        self.status = if converted {
            PopupStatus::Converted
        } else {
            PopupStatus::Closed
        };
        self.view
    }
}
