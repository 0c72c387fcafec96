//! OS clipboard access.
//!
//! Backends are synchronous and may block (another process can hold the
//! clipboard open), so callers that sit inside the history's exclusion domain
//! wrap them in [`TimedClipboard`].

use crate::entry::{join_paths, Content, ImageRgba};
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(750);

pub trait Clipboard: Send + Sync {
    /// Current clipboard content, or `None` when it is empty or holds nothing
    /// we can represent.
    fn read(&self) -> Result<Option<Content>>;
    fn write(&self, content: &Content) -> Result<()>;
}

impl<C: Clipboard + ?Sized> Clipboard for Arc<C> {
    fn read(&self) -> Result<Option<Content>> {
        (**self).read()
    }
    fn write(&self, content: &Content) -> Result<()> {
        (**self).write(content)
    }
}

#[derive(Default)]
pub struct NoopClipboard;

impl Clipboard for NoopClipboard {
    fn read(&self) -> Result<Option<Content>> {
        Ok(None)
    }
    fn write(&self, _content: &Content) -> Result<()> {
        Ok(())
    }
}

/// Process-local clipboard. Used by tests and headless hosts.
#[derive(Default)]
pub struct MemoryClipboard {
    slot: Mutex<Option<Content>>,
    failing: Mutex<bool>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates another application writing the clipboard.
    pub fn set(&self, content: Content) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(content);
    }

    pub fn set_text(&self, text: &str) {
        self.set(Content::text(text));
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn current(&self) -> Option<Content> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// While failing, every read and write reports the clipboard as locked.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|p| p.into_inner()) = failing;
    }

    fn check(&self) -> Result<()> {
        if *self.failing.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(Error::ClipboardUnavailable("clipboard is locked".into()));
        }
        Ok(())
    }
}

impl Clipboard for MemoryClipboard {
    fn read(&self) -> Result<Option<Content>> {
        self.check()?;
        Ok(self.current())
    }

    fn write(&self, content: &Content) -> Result<()> {
        self.check()?;
        let stored = match content {
            // The OS clipboard has no file-list writer here; it gets the paths as text.
            Content::FileList(paths) => Content::Text(join_paths(paths)),
            other => other.clone(),
        };
        self.set(stored);
        Ok(())
    }
}

/// The formats a backend can offer, each `None` when absent.
#[cfg_attr(not(feature = "clipboard"), allow(dead_code))]
trait FormatSource {
    fn file_list(&mut self) -> Result<Option<Vec<PathBuf>>>;
    fn html(&mut self) -> Result<Option<String>>;
    fn text(&mut self) -> Result<Option<String>>;
    fn image(&mut self) -> Result<Option<ImageRgba>>;
}

/// Picks the richest representation on offer: files, then html (with the
/// plain text as its alternative), then text, then image. Stops asking once
/// a format is found.
#[cfg_attr(not(feature = "clipboard"), allow(dead_code))]
fn read_preferred(src: &mut dyn FormatSource) -> Result<Option<Content>> {
    if let Some(paths) = src.file_list()?.filter(|p| !p.is_empty()) {
        return Ok(Some(Content::FileList(paths)));
    }
    if let Some(html) = src.html()?.filter(|h| !h.is_empty()) {
        let alt_text = src.text()?.filter(|t| !t.is_empty());
        return Ok(Some(Content::Html { html, alt_text }));
    }
    if let Some(text) = src.text()?.filter(|t| !t.is_empty()) {
        return Ok(Some(Content::Text(text)));
    }
    src.image().map(|img| img.map(Content::Image))
}

#[cfg(feature = "clipboard")]
pub struct ArboardClipboard;

#[cfg(feature = "clipboard")]
impl Default for ArboardClipboard {
    fn default() -> Self {
        Self
    }
}

#[cfg(feature = "clipboard")]
impl ArboardClipboard {
    pub fn new() -> Self {
        Self
    }

    fn open() -> Result<arboard::Clipboard> {
        arboard::Clipboard::new().map_err(unavailable)
    }
}

#[cfg(feature = "clipboard")]
fn unavailable(e: arboard::Error) -> Error {
    Error::ClipboardUnavailable(e.to_string())
}

/// A format that is missing or cannot be converted is absent, not an error.
#[cfg(feature = "clipboard")]
fn absent<T>(res: std::result::Result<T, arboard::Error>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(
            arboard::Error::ContentNotAvailable
            | arboard::Error::ConversionFailure
            | arboard::Error::ClipboardNotSupported,
        ) => Ok(None),
        Err(e) => Err(unavailable(e)),
    }
}

#[cfg(feature = "clipboard")]
impl FormatSource for arboard::Clipboard {
    fn file_list(&mut self) -> Result<Option<Vec<PathBuf>>> {
        absent(self.get().file_list())
    }

    fn html(&mut self) -> Result<Option<String>> {
        absent(self.get().html())
    }

    fn text(&mut self) -> Result<Option<String>> {
        absent(self.get_text())
    }

    fn image(&mut self) -> Result<Option<ImageRgba>> {
        Ok(absent(self.get_image())?.map(|img| ImageRgba {
            width: img.width as u32,
            height: img.height as u32,
            bytes: img.bytes.into_owned(),
        }))
    }
}

#[cfg(feature = "clipboard")]
impl Clipboard for ArboardClipboard {
    fn read(&self) -> Result<Option<Content>> {
        let mut cb = Self::open()?;
        read_preferred(&mut cb)
    }

    fn write(&self, content: &Content) -> Result<()> {
        let mut cb = Self::open()?;
        match content {
            Content::Text(s) => cb.set_text(s.as_str()).map_err(unavailable),
            Content::Html { html, alt_text } => cb
                .set_html(html.as_str(), alt_text.as_deref())
                .map_err(unavailable),
            Content::Image(img) => {
                let data = arboard::ImageData {
                    width: img.width as usize,
                    height: img.height as usize,
                    bytes: std::borrow::Cow::Borrowed(&img.bytes),
                };
                cb.set_image(data).map_err(unavailable)
            }
            Content::FileList(paths) => cb.set_text(join_paths(paths)).map_err(unavailable),
            Content::Other { mime, .. } => Err(Error::ClipboardUnavailable(format!(
                "cannot write `{mime}` to the system clipboard"
            ))),
        }
    }
}

/// The platform clipboard when built with the `clipboard` feature, a no-op
/// otherwise.
pub fn system() -> Arc<dyn Clipboard> {
    #[cfg(feature = "clipboard")]
    {
        Arc::new(ArboardClipboard::new())
    }
    #[cfg(not(feature = "clipboard"))]
    {
        Arc::new(NoopClipboard)
    }
}

type Job = Box<dyn FnOnce(&dyn Clipboard) + Send>;

/// Bounds every backend call by a deadline.
///
/// Calls run one at a time on a single worker thread. A call that misses the
/// deadline fails with `ClipboardUnavailable` but keeps running; until it
/// returns, further calls fail immediately instead of queueing behind it.
pub struct TimedClipboard {
    jobs: mpsc::SyncSender<Job>,
    busy: Arc<AtomicBool>,
    timeout: Duration,
}

impl TimedClipboard {
    pub fn new(inner: Arc<dyn Clipboard>, timeout: Duration) -> Self {
        let (jobs, rx) = mpsc::sync_channel::<Job>(1);
        let spawned = std::thread::Builder::new()
            .name("clipkeep-clipboard".into())
            .spawn(move || {
                for job in rx {
                    job(inner.as_ref());
                }
            });
        if let Err(e) = spawned {
            // Sends fail from here on, so every call reports the clipboard as unavailable.
            tracing::error!(error = %e, "could not start clipboard worker");
        }
        Self {
            jobs,
            busy: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True while an earlier call (usually one that timed out) is still
    /// running on the backend.
    pub fn in_flight(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn run<T, F>(&self, what: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Clipboard) -> Result<T> + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::ClipboardUnavailable(format!(
                "{what} skipped: previous clipboard call still running"
            )));
        }
        let (tx, rx) = mpsc::sync_channel(1);
        let busy = Arc::clone(&self.busy);
        let job: Job = Box::new(move |cb| {
            let res = f(cb);
            // Cleared before replying so the caller can issue the next call right away.
            busy.store(false, Ordering::SeqCst);
            let _ = tx.send(res);
        });
        if self.jobs.try_send(job).is_err() {
            self.busy.store(false, Ordering::SeqCst);
            return Err(Error::ClipboardUnavailable(format!(
                "{what}: clipboard worker is not running"
            )));
        }
        match rx.recv_timeout(self.timeout) {
            Ok(res) => res,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::ClipboardUnavailable(format!(
                "{what} timed out after {}ms",
                self.timeout.as_millis()
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::ClipboardUnavailable(
                format!("{what} worker exited without answering"),
            )),
        }
    }
}

impl Clipboard for TimedClipboard {
    fn read(&self) -> Result<Option<Content>> {
        self.run("read", |cb| cb.read())
    }

    fn write(&self, content: &Content) -> Result<()> {
        let content = content.clone();
        self.run("write", move |cb| cb.write(&content))
    }
}
