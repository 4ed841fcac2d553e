//! Pure frame rendering.
//!
//! Every function here maps state to a `String` and mutates nothing, so
//! frames can be asserted on in tests without a terminal.

use indicatif::HumanBytes;

use crate::classify::Classified;
use crate::session::SearchSession;
use crate::torrent::TorrentContentEntry;
use crate::tui::viewport::Viewport;

/// Marker prefix for the selected row.
const MARKER: &str = "> ";

/// Narrowest frame worth drawing.
const MIN_WIDTH: usize = 20;

/// Renders the browse screen: boxed header, viewport rows, key help.
#[must_use]
pub fn browse_frame(session: &SearchSession, viewport: &Viewport, width: usize) -> String {
    let width = width.max(MIN_WIDTH);
    let inner = width - 2;
    let mut frame = String::new();

    frame.push_str(&format!("┌{}┐\n", "─".repeat(inner)));
    let header = format!(
        "Results for '{}' ({} total)",
        session.query(),
        session.total()
    );
    frame.push_str(&format!("│{}│\n", fit(&header, inner)));
    frame.push_str(&format!("├{}┤\n", "─".repeat(inner)));

    let results = session.results();
    for row in 0..viewport.height() {
        let index = viewport.offset() + row;
        let line = match results.get(index) {
            Some(result) => {
                let marker = if index == viewport.selected() {
                    MARKER
                } else {
                    "  "
                };
                format!(
                    "{marker}{:>3}. {} - {}",
                    index + 1,
                    result.title_or_default(),
                    result.creator_or_default()
                )
            }
            None => String::new(),
        };
        frame.push_str(&format!("│{}│\n", fit(&line, inner)));
    }

    frame.push_str(&format!("├{}┤\n", "─".repeat(inner)));
    frame.push_str(&format!(
        "│{}│\n",
        fit("up/down move | enter open | q quit", inner)
    ));
    frame.push_str(&format!("└{}┘\n", "─".repeat(inner)));

    frame
}

/// Renders the file menu for one archive item.
#[must_use]
pub fn file_menu(title: &str, classified: &Classified) -> String {
    let mut menu = String::new();
    menu.push_str(&format!("Archive: {title}\n"));
    menu.push_str(&format!("{}\n", "-".repeat(70)));

    let mut number = 0usize;
    for candidate in &classified.audio {
        number += 1;
        menu.push_str(&format!(
            "{number:2}. {} | {} | {}\n",
            candidate.name,
            candidate.format,
            HumanBytes(candidate.size)
        ));
    }
    for torrent in &classified.torrents {
        number += 1;
        menu.push_str(&format!(
            "{number:2}. {} | torrent | {}\n",
            torrent.name,
            HumanBytes(torrent.size)
        ));
    }

    menu.push_str(&format!("{}\n", "-".repeat(70)));
    menu.push_str("Pick a number, 'all' for every audio file, or 'q' to go back:\n");
    menu
}

/// Renders the content list of a resolved torrent descriptor.
#[must_use]
pub fn torrent_menu(descriptor_name: &str, entries: &[TorrentContentEntry]) -> String {
    let mut menu = String::new();
    menu.push_str(&format!("Torrent: {descriptor_name}\n"));
    menu.push_str(&format!("{}\n", "-".repeat(70)));

    for entry in entries {
        menu.push_str(&format!(
            "{:2}. {} | {}\n",
            entry.index + 1,
            entry.path,
            HumanBytes(entry.size)
        ));
    }

    menu.push_str(&format!("{}\n", "-".repeat(70)));
    menu.push_str("Pick numbers (comma-separated), 'all', or 'q' to go back:\n");
    menu
}

/// Truncates to `width` characters and pads the remainder with spaces.
fn fit(text: &str, width: usize) -> String {
    let truncated: String = text.chars().take(width).collect();
    format!("{truncated:<width$}")
}
