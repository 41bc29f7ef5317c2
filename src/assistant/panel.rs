//! Voice-assistant panel controller.
//!
//! Pure state: each element carries a set of class names that the widget
//! maps to visuals. Some class changes are deferred so a transition can start
//! from a clean state; deferred changes sit in a queue that the frame loop
//! drains with [`AssistantPanel::advance`].

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

pub const ACTIVE: &str = "active";
pub const OPEN: &str = "open";
pub const CLOSE: &str = "close";
pub const GLOW: &str = "glow-effect";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Element {
    Button,
    Panel,
    CallBar,
    Microphone,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PanelTimings {
    pub open_delay: Duration,
    /// Must match the panel's close transition.
    pub close_delay: Duration,
    /// Horizontal shift of the call bar once the microphone is engaged, px.
    pub call_bar_shift: f32,
}

impl Default for PanelTimings {
    fn default() -> Self {
        Self {
            open_delay: Duration::from_millis(10),
            close_delay: Duration::from_millis(300),
            call_bar_shift: 20.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassList(BTreeSet<&'static str>);

impl ClassList {
    pub fn contains(&self, class: &str) -> bool { self.0.contains(class) }
    pub fn add(&mut self, class: &'static str) -> bool { self.0.insert(class) }
    pub fn remove(&mut self, class: &str) -> bool { self.0.remove(class) }
    pub fn toggle(&mut self, class: &'static str) -> bool {
        if !self.0.remove(class) {
            self.0.insert(class);
        }
        self.0.contains(class)
    }
    pub fn iter(&self) -> impl Iterator<Item = &&'static str> { self.0.iter() }
}

#[derive(Clone, Debug)]
struct Deferred {
    due: Instant,
    element: Element,
    class: &'static str,
}

#[derive(Clone, Debug)]
pub struct AssistantPanel {
    timings: PanelTimings,
    open: bool,
    button: ClassList,
    panel: ClassList,
    microphone: ClassList,
    call_bar: ClassList,
    call_bar_offset: f32,
    pending: Vec<Deferred>,
}

impl Default for AssistantPanel {
    fn default() -> Self {
        Self::new(PanelTimings::default())
    }
}

impl AssistantPanel {
    pub fn new(timings: PanelTimings) -> Self {
        Self {
            timings,
            open: false,
            button: ClassList::default(),
            panel: ClassList::default(),
            microphone: ClassList::default(),
            call_bar: ClassList::default(),
            call_bar_offset: 0.0,
            pending: Vec::new(),
        }
    }

    pub fn timings(&self) -> PanelTimings { self.timings }
    pub fn set_timings(&mut self, timings: PanelTimings) { self.timings = timings; }
    pub fn is_open(&self) -> bool { self.open }
    pub fn call_bar_offset(&self) -> f32 { self.call_bar_offset }
    pub fn has_pending(&self) -> bool { !self.pending.is_empty() }

    pub fn classes(&self, element: Element) -> &ClassList {
        match element {
            Element::Button => &self.button,
            Element::Panel => &self.panel,
            Element::CallBar => &self.call_bar,
            Element::Microphone => &self.microphone,
        }
    }

    fn classes_mut(&mut self, element: Element) -> &mut ClassList {
        match element {
            Element::Button => &mut self.button,
            Element::Panel => &mut self.panel,
            Element::CallBar => &mut self.call_bar,
            Element::Microphone => &mut self.microphone,
        }
    }

    // A newer transition on an element supersedes whatever was still queued for it.
    fn schedule(&mut self, element: Element, class: &'static str, due: Instant) {
        self.pending.retain(|d| d.element != element);
        self.pending.push(Deferred { due, element, class });
    }

    pub fn toggle_panel(&mut self, now: Instant) {
        self.open = !self.open;
        self.button.toggle(ACTIVE);
        if self.open {
            self.panel.remove(CLOSE);
            self.schedule(Element::Panel, OPEN, now + self.timings.open_delay);
        } else {
            self.panel.remove(OPEN);
            self.schedule(Element::Panel, CLOSE, now + self.timings.close_delay);

            self.call_bar_offset = 0.0;
            self.microphone.remove(OPEN);
            self.schedule(Element::Microphone, CLOSE, now + self.timings.close_delay);
        }
        log::debug!("assistant panel {}", if self.open { "opening" } else { "closing" });
    }

    pub fn activate_sub_control(&mut self, now: Instant) {
        self.call_bar_offset = self.timings.call_bar_shift;
        self.microphone.remove(CLOSE);
        self.schedule(Element::Microphone, OPEN, now + self.timings.open_delay);
    }

    pub fn start_glow(&mut self) {
        self.panel.add(GLOW);
    }

    pub fn stop_glow(&mut self) {
        self.panel.remove(GLOW);
    }

    /// Apply every deferred change due at or before `now`, oldest first.
    pub fn advance(&mut self, now: Instant) -> bool {
        let (mut due, rest): (Vec<Deferred>, Vec<Deferred>) =
            self.pending.drain(..).partition(|d| d.due <= now);
        self.pending = rest;
        due.sort_by_key(|d| d.due);
        let changed = !due.is_empty();
        for d in due {
            self.classes_mut(d.element).add(d.class);
        }
        changed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|d| d.due).min()
    }
}
