use std::fmt;

/// Page anchors the agent can scroll to, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionId {
    Hero,
    About,
    Skills,
    Projects,
    Experience,
    Education,
    Contact,
}

impl SectionId {
    pub const ALL: [SectionId; 7] = [
        Self::Hero,
        Self::About,
        Self::Skills,
        Self::Projects,
        Self::Experience,
        Self::Education,
        Self::Contact,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::About => "about",
            Self::Skills => "skills",
            Self::Projects => "projects",
            Self::Experience => "experience",
            Self::Education => "education",
            Self::Contact => "contact",
        }
    }

    /// Exact, case-sensitive match against the anchor ids.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == raw)
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measured geometry of one section on the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionBounds {
    pub id: SectionId,
    pub top: f64,
    pub height: f64,
}

impl SectionBounds {
    pub const fn new(id: SectionId, top: f64, height: f64) -> Self {
        Self { id, top, height }
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Tracks which section the viewport midpoint sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionTracker {
    current: SectionId,
}

impl SectionTracker {
    pub const fn new() -> Self {
        Self {
            current: SectionId::Hero,
        }
    }

    pub fn current(&self) -> SectionId {
        self.current
    }

    /// Re-evaluates the current section from a scroll position.
    ///
    /// Sections missing from `layout` are skipped. Anything that matches no section,
    /// including a midpoint above the first one, falls back to `hero`.
    pub fn observe(
        &mut self,
        scroll_y: f64,
        viewport_height: f64,
        layout: &[SectionBounds],
    ) -> SectionId {
        let midpoint = scroll_y + viewport_height / 2.0;
        let mut active = SectionId::Hero;

        for id in SectionId::ALL {
            let Some(bounds) = layout.iter().find(|bounds| bounds.id == id) else {
                continue;
            };

            if midpoint >= bounds.top && midpoint < bounds.bottom() {
                active = id;
                break;
            }
            if midpoint < bounds.top && id == SectionId::ALL[0] {
                active = id;
                break;
            }
        }

        if active != self.current {
            tracing::debug!(from = %self.current, to = %active, "current section changed");
        }
        self.current = active;
        active
    }
}

impl Default for SectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stacked_layout() -> Vec<SectionBounds> {
        SectionId::ALL
            .iter()
            .enumerate()
            .map(|(index, id)| SectionBounds::new(*id, 100.0 + index as f64 * 800.0, 800.0))
            .collect()
    }

    #[test]
    fn parse_accepts_only_known_ids() {
        assert_eq!(SectionId::parse("projects"), Some(SectionId::Projects));
        assert_eq!(SectionId::parse("Projects"), None);
        assert_eq!(SectionId::parse("banana"), None);
    }

    #[test]
    fn midpoint_selects_containing_section() {
        let mut tracker = SectionTracker::new();
        let layout = stacked_layout();

        // Section bottoms are exclusive: midpoint 2500 is the first row of projects.
        assert_eq!(tracker.observe(2100.0, 800.0, &layout), SectionId::Projects);
        assert_eq!(tracker.current(), SectionId::Projects);
        assert_eq!(tracker.observe(1000.0, 800.0, &layout), SectionId::About);
    }

    #[test]
    fn above_first_section_falls_back_to_hero() {
        let mut tracker = SectionTracker::new();
        tracker.observe(2100.0, 800.0, &stacked_layout());
        assert_eq!(tracker.observe(0.0, 100.0, &stacked_layout()), SectionId::Hero);
    }

    #[test]
    fn missing_sections_are_skipped() {
        let mut tracker = SectionTracker::new();
        let layout = vec![SectionBounds::new(SectionId::Contact, 0.0, 500.0)];
        assert_eq!(tracker.observe(0.0, 600.0, &layout), SectionId::Contact);
        assert_eq!(tracker.observe(1000.0, 600.0, &layout), SectionId::Hero);
    }
}
