//! Section parser for planning replies.
//!
//! A planning reply is classified by the sections it contains. Markers are
//! only recognized at the start of a line (after trimming), case-insensitive:
//!
//! - `SUMMARY:` final answer, no tools needed
//! - `ANALYSIS:` optional reasoning that accompanies guidance
//! - `GUIDANCE:` (or `INSTRUCTIONS:` / `DIRECTIONS:`) instructions for the executor
//!
//! SUMMARY beats GUIDANCE; anything else is `Other`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Analysis,
    Guidance,
}

const MARKERS: [(&str, Section); 5] = [
    ("SUMMARY:", Section::Summary),
    ("ANALYSIS:", Section::Analysis),
    ("GUIDANCE:", Section::Guidance),
    ("INSTRUCTIONS:", Section::Guidance),
    ("DIRECTIONS:", Section::Guidance),
];

/// Classification of one planning reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedResponse {
    Summary(String),
    Guidance { analysis: Option<String>, guidance: String },
    /// No usable section; carries the full raw text
    Other(String),
}

impl ClassifiedResponse {
    pub fn kind(&self) -> ResponseKind {
        match self {
            ClassifiedResponse::Summary(_) => ResponseKind::Summary,
            ClassifiedResponse::Guidance { .. } => ResponseKind::Guidance,
            ClassifiedResponse::Other(_) => ResponseKind::Other,
        }
    }
}

/// Variant tag of a [`ClassifiedResponse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseKind {
    Summary,
    Guidance,
    Other,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Summary => "SUMMARY",
            ResponseKind::Guidance => "GUIDANCE",
            ResponseKind::Other => "OTHER",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw section contents; `None` when a section is missing or empty
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub summary: Option<String>,
    pub analysis: Option<String>,
    pub guidance: Option<String>,
}

impl Sections {
    fn slot(&mut self, section: Section) -> &mut Option<String> {
        match section {
            Section::Summary => &mut self.summary,
            Section::Analysis => &mut self.analysis,
            Section::Guidance => &mut self.guidance,
        }
    }
}

/// Match a recognized marker at the start of an already-trimmed line.
/// Returns the section and whatever follows the colon.
fn match_marker(line: &str) -> Option<(Section, &str)> {
    MARKERS.iter().find_map(|(label, section)| {
        let head = line.get(..label.len())?;
        head.eq_ignore_ascii_case(label)
            .then(|| (*section, &line[label.len()..]))
    })
}

fn finish(lines: &[&str]) -> Option<String> {
    let text = lines.join("\n");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Split a reply into its sections.
///
/// Content runs from a marker to the next recognized marker or the end of
/// the text. A marker for a section already seen closes the current section
/// and its content is discarded. Text before the first marker is ignored.
pub fn parse_sections(text: &str) -> Sections {
    let mut sections = Sections::default();
    let mut seen: Vec<Section> = Vec::new();
    // None while outside any section or inside a repeated one
    let mut current: Option<Section> = None;
    let mut buffer: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some((section, rest)) = match_marker(trimmed) {
            if let Some(open) = current.take() {
                *sections.slot(open) = finish(&buffer);
            }
            buffer.clear();

            if seen.contains(&section) {
                continue;
            }
            seen.push(section);
            current = Some(section);

            let rest = rest.trim();
            if !rest.is_empty() {
                buffer.push(rest);
            }
            continue;
        }

        if current.is_some() {
            buffer.push(line.trim_end());
        }
    }

    if let Some(open) = current {
        *sections.slot(open) = finish(&buffer);
    }
    sections
}

/// Classify a planning reply. Pure and deterministic.
pub fn classify(text: &str) -> ClassifiedResponse {
    let sections = parse_sections(text);

    if let Some(summary) = sections.summary {
        return ClassifiedResponse::Summary(summary);
    }
    if let Some(guidance) = sections.guidance {
        return ClassifiedResponse::Guidance {
            analysis: sections.analysis,
            guidance,
        };
    }
    ClassifiedResponse::Other(text.to_string())
}
