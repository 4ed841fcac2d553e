//! Cooperative browse/select loop.
//!
//! One foreground loop renders frames and dispatches key input; search and
//! metadata calls are awaited inline (they are short), while transfers are
//! always handed to the download coordinator's detached tasks so navigation
//! stays responsive. Raw terminal mode is scoped to each single-keystroke
//! read through an RAII guard, so line input and task console output see a
//! cooked terminal.

mod prompt;
pub mod render;
mod viewport;

pub use prompt::{Selection, SelectionError, parse_selection};
pub use viewport::Viewport;

use std::io::{self, Write};
use std::sync::Arc;

use crossterm::cursor::MoveTo;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, read};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode};
use tracing::debug;

use crate::archive::ArchiveClient;
use crate::classify::{Classified, TorrentDescriptor, classify};
use crate::config::Config;
use crate::download::{Coordinator, Dispatch, DownloadError};
use crate::session::{SearchError, SearchSession};
use crate::torrent::TorrentResolver;

/// Width used when the terminal cannot report one.
const DEFAULT_WIDTH: usize = 100;

/// Navigation state of the foreground loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Screen {
    Browsing,
    Detail(usize),
    Terminated,
}

/// Keys the browse screen reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Up,
    Down,
    Enter,
    Quit,
    Other,
}

/// Restores cooked mode when dropped, whatever the exit path.
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// The interactive application.
#[derive(Debug)]
pub struct App {
    client: ArchiveClient,
    coordinator: Coordinator,
    resolver: Arc<dyn TorrentResolver>,
    config: Config,
}

impl App {
    /// Wires the application together.
    #[must_use]
    pub fn new(
        client: ArchiveClient,
        coordinator: Coordinator,
        resolver: Arc<dyn TorrentResolver>,
        config: Config,
    ) -> Self {
        Self {
            client,
            coordinator,
            resolver,
            config,
        }
    }

    /// Runs one interactive session, from query prompt to quit.
    ///
    /// Every archive or download failure is reported as a message and
    /// control returns to the nearest menu; only terminal IO errors
    /// propagate.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] when the terminal itself fails.
    pub async fn run(&self) -> io::Result<()> {
        let Some(query) = prompt_line("Search the free audio archive: ").await? else {
            return Ok(());
        };
        if query.is_empty() {
            println!("Empty query.");
            return Ok(());
        }

        let mut session = match SearchSession::start(&self.client, &query, self.config.page_size)
            .await
        {
            Ok(session) => session,
            Err(SearchError::Empty { .. }) => {
                println!("Nothing found.");
                return Ok(());
            }
        };

        let mut viewport = Viewport::new(self.config.window_height);
        let mut screen = Screen::Browsing;

        loop {
            match screen {
                Screen::Terminated => break,
                Screen::Browsing => {
                    // A failed grow is already logged; the next trigger retries.
                    let status = session.maybe_grow(&self.client, viewport.selected()).await;
                    debug!(?status, "growth tick");
                    viewport.sync(session.loaded());

                    clear_screen()?;
                    print!(
                        "{}",
                        render::browse_frame(&session, &viewport, terminal_width())
                    );
                    io::stdout().flush()?;

                    screen = match read_key().await? {
                        Key::Quit => Screen::Terminated,
                        Key::Up => {
                            viewport.move_up();
                            Screen::Browsing
                        }
                        Key::Down => {
                            viewport.move_down(session.loaded());
                            Screen::Browsing
                        }
                        Key::Enter if session.loaded() > 0 => {
                            Screen::Detail(viewport.selected())
                        }
                        Key::Enter | Key::Other => Screen::Browsing,
                    };
                }
                Screen::Detail(index) => {
                    // Selection and offset survive the detour untouched.
                    self.detail(&session, index).await?;
                    screen = Screen::Browsing;
                }
            }
        }

        clear_screen()?;
        let stats = self.coordinator.stats();
        if stats.total() > 0 {
            println!(
                "Background transfers so far: {} completed, {} failed.",
                stats.completed(),
                stats.failed()
            );
        }
        Ok(())
    }

    /// File inspection and selection for one archive item.
    async fn detail(&self, session: &SearchSession, index: usize) -> io::Result<()> {
        let Some(result) = session.results().get(index) else {
            return Ok(());
        };
        let identifier = result.identifier.clone();
        let title = result.title_or_default().to_string();

        clear_screen()?;
        println!("Archive: {title}");
        println!("Loading file listing...");

        let files = match self.client.file_listing(&identifier).await {
            Ok(files) => files,
            Err(error) => {
                println!("Could not load the file listing: {error}");
                return pause().await;
            }
        };

        let classified = classify(&files);
        if classified.is_empty() {
            println!("No downloadable audio or torrent descriptors in this item.");
            return pause().await;
        }

        self.file_menu_loop(&identifier, &title, &classified).await
    }

    /// Sub-loop over the item's file menu. Invalid input re-prompts.
    async fn file_menu_loop(
        &self,
        identifier: &str,
        title: &str,
        classified: &Classified,
    ) -> io::Result<()> {
        let menu_len = classified.audio.len() + classified.torrents.len();
        loop {
            clear_screen()?;
            print!("{}", render::file_menu(title, classified));
            io::stdout().flush()?;

            let Some(line) = prompt_line("> ").await? else {
                return Ok(());
            };

            match parse_selection(&line, menu_len) {
                Ok(Selection::Cancel) => return Ok(()),
                Ok(Selection::All) => {
                    for candidate in &classified.audio {
                        self.dispatch_whole(identifier, &candidate.name).await;
                    }
                    return pause().await;
                }
                Ok(Selection::Indices(indices)) => {
                    for index in indices {
                        if let Some(candidate) = classified.audio.get(index) {
                            self.dispatch_whole(identifier, &candidate.name).await;
                        } else if let Some(torrent) =
                            classified.torrents.get(index - classified.audio.len())
                        {
                            self.torrent_menu_loop(identifier, torrent).await?;
                        }
                    }
                    return pause().await;
                }
                Err(error) => {
                    println!("{error}");
                    pause().await?;
                }
            }
        }
    }

    /// Starts one whole-file download and reports how it was dispatched.
    async fn dispatch_whole(&self, identifier: &str, filename: &str) {
        match self.coordinator.download_whole(identifier, filename).await {
            Ok(Dispatch::AlreadyPresent(path)) => {
                println!("already present: {}", path.display());
            }
            Ok(Dispatch::Started(dest)) => {
                println!("downloading {filename} in the background -> {}", dest.display());
            }
            Err(error) => println!("cannot start download: {error}"),
        }
    }

    /// Resolves a torrent descriptor and runs the content-selection sub-loop.
    async fn torrent_menu_loop(
        &self,
        identifier: &str,
        descriptor: &TorrentDescriptor,
    ) -> io::Result<()> {
        println!("Reading torrent content list...");

        let url = match self.client.download_url(identifier, &descriptor.name) {
            Ok(url) => url,
            Err(error) => {
                println!("{error}");
                return pause().await;
            }
        };

        let entries = match self.resolver.resolve(url.as_str()).await {
            Ok(entries) => entries,
            Err(error) => {
                println!("{error}");
                return pause().await;
            }
        };
        if entries.is_empty() {
            println!("The descriptor lists no files.");
            return pause().await;
        }

        loop {
            clear_screen()?;
            print!("{}", render::torrent_menu(&descriptor.name, &entries));
            io::stdout().flush()?;

            let Some(line) = prompt_line("> ").await? else {
                return Ok(());
            };

            let indices = match parse_selection(&line, entries.len()) {
                Ok(Selection::Cancel) => return Ok(()),
                Ok(Selection::All) => (0..entries.len()).collect(),
                Ok(Selection::Indices(indices)) => indices,
                Err(error) => {
                    println!("{error}");
                    pause().await?;
                    continue;
                }
            };

            match self
                .coordinator
                .download_selected(identifier, descriptor, entries.len(), &indices)
                .await
            {
                Ok(_) => {
                    println!("torrent transfer running in the background");
                    return pause().await;
                }
                Err(error @ DownloadError::InvalidSelection { .. }) => {
                    // Stays inside the sub-loop, never escalates.
                    println!("{error}");
                    pause().await?;
                }
                Err(error) => {
                    println!("{error}");
                    return pause().await;
                }
            }
        }
    }
}

/// Terminal width queried per frame, with a fallback default.
fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(columns, _)| columns as usize)
        .unwrap_or(DEFAULT_WIDTH)
}

/// Clears the screen and homes the cursor.
fn clear_screen() -> io::Result<()> {
    execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))
}

/// Reads one key press, holding raw mode only for the read itself.
async fn read_key() -> io::Result<Key> {
    tokio::task::spawn_blocking(|| {
        let _guard = RawModeGuard::enter()?;
        loop {
            if let Event::Key(key) = read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(translate_key(key));
                }
            }
        }
    })
    .await
    .map_err(io::Error::other)?
}

fn translate_key(key: KeyEvent) -> Key {
    match key.code {
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Enter => Key::Enter,
        KeyCode::Char('q') => Key::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Key::Quit,
        _ => Key::Other,
    }
}

/// Prints a prompt and reads one trimmed line; `None` on end of input.
async fn prompt_line(prompt_text: &str) -> io::Result<Option<String>> {
    print!("{prompt_text}");
    io::stdout().flush()?;
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match io::stdin().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line.trim().to_string())),
        }
    })
    .await
    .map_err(io::Error::other)?
}

/// Waits for the user to acknowledge a message.
async fn pause() -> io::Result<()> {
    prompt_line("Press Enter to continue...").await.map(|_| ())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_translate_navigation_keys() {
        assert_eq!(translate_key(press(KeyCode::Up, KeyModifiers::NONE)), Key::Up);
        assert_eq!(
            translate_key(press(KeyCode::Down, KeyModifiers::NONE)),
            Key::Down
        );
        assert_eq!(
            translate_key(press(KeyCode::Enter, KeyModifiers::NONE)),
            Key::Enter
        );
    }

    #[test]
    fn test_translate_quit_keys() {
        assert_eq!(
            translate_key(press(KeyCode::Char('q'), KeyModifiers::NONE)),
            Key::Quit
        );
        assert_eq!(
            translate_key(press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Key::Quit
        );
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        assert_eq!(
            translate_key(press(KeyCode::Char('x'), KeyModifiers::NONE)),
            Key::Other
        );
        assert_eq!(
            translate_key(press(KeyCode::Char('c'), KeyModifiers::NONE)),
            Key::Other
        );
    }
}
