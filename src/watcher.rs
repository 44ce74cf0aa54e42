//! Background folder watching.
//!
//! A [`DirectoryWatcher`] subscribes to file-creation events for one folder and hands
//! each new direct child to the shared [`FileOrganizer`] on a dedicated worker thread.
//! Event delivery is abstracted behind [`EventSource`]; [`NotifySource`] is the
//! platform implementation.
use crate::file_organizer::{FileOrganizer, OrganizeObserver, organized_message};
use crossbeam_channel::{
    Receiver, RecvTimeoutError, Sender, TryRecvError, bounded, select, unbounded,
};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Pause between seeing a new file and organizing it, so writers can finish.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// How long [`DirectoryWatcher::stop`] waits for the worker thread.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

const WORKER_THREAD_NAME: &str = "tidywatch-watcher";

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Folder does not exist or is not a directory: {}", .0.display())]
    InvalidFolder(PathBuf),
    #[error("Failed to watch {}: {source}", .path.display())]
    Notify {
        path: PathBuf,
        source: notify::Error,
    },
    #[error("Failed to start watcher thread: {0}")]
    Spawn(std::io::Error),
}

/// Keeps an event subscription alive. Dropping it unsubscribes.
pub struct Subscription {
    _guard: Box<dyn Any + Send>,
}

impl Subscription {
    pub fn new<G: Send + 'static>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

/// Delivers the paths of files created directly inside a folder.
pub trait EventSource: Send + Sync {
    /// Starts sending created paths on `events` until the subscription is dropped.
    fn subscribe(&self, folder: &Path, events: Sender<PathBuf>)
    -> Result<Subscription, WatchError>;
}

/// [`EventSource`] backed by the platform's native file notification API.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifySource;

impl EventSource for NotifySource {
    fn subscribe(
        &self,
        folder: &Path,
        events: Sender<PathBuf>,
    ) -> Result<Subscription, WatchError> {
        let notify_error = |source| WatchError::Notify {
            path: folder.to_path_buf(),
            source,
        };

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) if matches!(event.kind, EventKind::Create(_)) => {
                    for path in event.paths {
                        // The receiver is gone once the watcher is stopping.
                        if events.send(path).is_err() {
                            return;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("File watch error: {}", e),
            })
            .map_err(notify_error)?;

        watcher
            .watch(folder, RecursiveMode::NonRecursive)
            .map_err(notify_error)?;

        Ok(Subscription::new(watcher))
    }
}

struct WatchSession {
    folder: PathBuf,
    subscription: Subscription,
    shutdown: Sender<()>,
    finished: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Watches one folder at a time and organizes files as they appear.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use tidywatch::config::AppConfig;
/// use tidywatch::file_organizer::FileOrganizer;
/// use tidywatch::output::ConsoleObserver;
/// use tidywatch::watcher::DirectoryWatcher;
///
/// let organizer = Arc::new(FileOrganizer::from_config(&AppConfig::default()).unwrap());
/// let mut watcher = DirectoryWatcher::new(organizer);
/// watcher
///     .start(Path::new("/home/me/Downloads"), Arc::new(ConsoleObserver::new()))
///     .unwrap();
/// // ...
/// watcher.stop();
/// ```
pub struct DirectoryWatcher {
    organizer: Arc<FileOrganizer>,
    source: Box<dyn EventSource>,
    settle_delay: Duration,
    session: Option<WatchSession>,
}

impl DirectoryWatcher {
    /// A watcher using native file notifications.
    pub fn new(organizer: Arc<FileOrganizer>) -> Self {
        Self::with_source(organizer, Box::new(NotifySource))
    }

    pub fn with_source(organizer: Arc<FileOrganizer>, source: Box<dyn EventSource>) -> Self {
        Self {
            organizer,
            source,
            settle_delay: SETTLE_DELAY,
            session: None,
        }
    }

    /// Overrides the delay between a file appearing and being organized.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// The folder being watched, as resolved when the watch started.
    pub fn watched_folder(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.folder.as_path())
    }

    /// Starts watching `folder`. Does nothing if a watch is already running.
    ///
    /// Each organized file is reported to `observer` as `Organized: <name>`; failures
    /// are reported through `on_error` and do not stop the watch.
    pub fn start(
        &mut self,
        folder: &Path,
        observer: Arc<dyn OrganizeObserver>,
    ) -> Result<(), WatchError> {
        if let Some(session) = &self.session {
            debug!("Already watching {}", session.folder.display());
            return Ok(());
        }

        if !folder.is_dir() {
            return Err(WatchError::InvalidFolder(folder.to_path_buf()));
        }
        let folder =
            fs::canonicalize(folder).map_err(|_| WatchError::InvalidFolder(folder.to_path_buf()))?;

        let (events_tx, events_rx) = unbounded();
        let subscription = self.source.subscribe(&folder, events_tx)?;

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (finished_tx, finished_rx) = bounded::<()>(1);

        let worker = Worker {
            folder: folder.clone(),
            organizer: Arc::clone(&self.organizer),
            observer,
            settle_delay: self.settle_delay,
            events: events_rx,
            shutdown: shutdown_rx,
        };

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                worker.run();
                let _ = finished_tx.send(());
            })
            .map_err(WatchError::Spawn)?;

        info!("Watching {}", folder.display());
        self.session = Some(WatchSession {
            folder,
            subscription,
            shutdown: shutdown_tx,
            finished: finished_rx,
            handle,
        });
        Ok(())
    }

    /// Stops the watch and waits for the worker to finish its current file.
    ///
    /// Does nothing if no watch is running. If the worker does not finish within
    /// [`STOP_TIMEOUT`] it is left to exit on its own.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let WatchSession {
            folder,
            subscription,
            shutdown,
            finished,
            handle,
        } = session;

        drop(subscription);
        drop(shutdown);

        match finished.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("Watcher thread for {} panicked", folder.display());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Watcher thread for {} did not stop within {:?}",
                    folder.display(),
                    STOP_TIMEOUT
                );
            }
        }

        info!("Stopped watching {}", folder.display());
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    folder: PathBuf,
    organizer: Arc<FileOrganizer>,
    observer: Arc<dyn OrganizeObserver>,
    settle_delay: Duration,
    events: Receiver<PathBuf>,
    shutdown: Receiver<()>,
}

impl Worker {
    fn run(&self) {
        loop {
            select! {
                recv(self.shutdown) -> _ => break,
                recv(self.events) -> event => {
                    let Ok(path) = event else { break };
                    if self.stopping() || !self.handle(&path) {
                        break;
                    }
                }
            }
        }
        debug!("Watcher worker for {} exiting", self.folder.display());
    }

    fn stopping(&self) -> bool {
        matches!(self.shutdown.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Returns `false` if shutdown was requested while waiting for the file to settle.
    fn handle(&self, path: &Path) -> bool {
        if path.parent() != Some(self.folder.as_path()) {
            debug!("Ignoring {}: not a direct child", path.display());
            return true;
        }

        let Some(_claim) = self.organizer.claim(path) else {
            debug!("Ignoring {}: already being processed", path.display());
            return true;
        };

        match self.shutdown.recv_timeout(self.settle_delay) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return false,
        }

        if !path.exists() {
            debug!("{} vanished before it could be organized", path.display());
            return true;
        }

        match self.organizer.organize(path, &self.folder) {
            Ok(Some(destination)) => {
                self.observer.on_organized(&organized_message(&destination));
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{}", e);
                self.observer.on_error(&e.to_string());
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompiledFilters;
    use crate::file_category::CategoryTable;
    use crate::file_organizer::OrganizeOptions;
    use crate::history::{HISTORY_LIMIT, HistoryLedger};
    use parking_lot::Mutex;
    use std::time::Instant;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingObserver {
        organized: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl OrganizeObserver for RecordingObserver {
        fn on_organized(&self, message: &str) {
            self.organized.lock().push(message.to_string());
        }

        fn on_error(&self, message: &str) {
            self.errors.lock().push(message.to_string());
        }
    }

    /// Event source driven by the test through the captured sender.
    #[derive(Clone, Default)]
    struct ManualSource {
        sender: Arc<Mutex<Option<Sender<PathBuf>>>>,
    }

    impl ManualSource {
        fn emit(&self, path: PathBuf) {
            let sender = self.sender.lock();
            sender
                .as_ref()
                .expect("not subscribed")
                .send(path)
                .expect("worker gone");
        }
    }

    impl EventSource for ManualSource {
        fn subscribe(
            &self,
            _folder: &Path,
            events: Sender<PathBuf>,
        ) -> Result<Subscription, WatchError> {
            *self.sender.lock() = Some(events);
            Ok(Subscription::new(()))
        }
    }

    fn organizer() -> Arc<FileOrganizer> {
        Arc::new(FileOrganizer::new(
            CategoryTable::default(),
            CompiledFilters::default(),
            OrganizeOptions::default(),
            HistoryLedger::in_memory(HISTORY_LIMIT),
        ))
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        condition()
    }

    #[test]
    fn test_created_file_is_organized() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = ManualSource::default();
        let observer = Arc::new(RecordingObserver::default());
        let mut watcher = DirectoryWatcher::with_source(organizer(), Box::new(source.clone()))
            .settle_delay(Duration::from_millis(10));

        watcher
            .start(temp_dir.path(), observer.clone())
            .expect("Failed to start watcher");
        let folder = watcher.watched_folder().expect("not running").to_path_buf();

        let photo = folder.join("photo.png");
        fs::write(&photo, "png").expect("Failed to write file");
        source.emit(photo.clone());

        assert!(wait_for(|| folder.join("Images").join("photo.png").exists()));
        assert!(wait_for(|| !observer.organized.lock().is_empty()));
        assert_eq!(*observer.organized.lock(), vec!["Organized: photo.png"]);
        watcher.stop();
        assert!(!photo.exists());
    }

    #[test]
    fn test_nested_and_vanished_paths_are_ignored() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = ManualSource::default();
        let observer = Arc::new(RecordingObserver::default());
        let mut watcher = DirectoryWatcher::with_source(organizer(), Box::new(source.clone()))
            .settle_delay(Duration::from_millis(10));

        watcher
            .start(temp_dir.path(), observer.clone())
            .expect("Failed to start watcher");
        let folder = watcher.watched_folder().expect("not running").to_path_buf();

        fs::create_dir(folder.join("sub")).expect("Failed to create dir");
        let nested = folder.join("sub").join("deep.txt");
        fs::write(&nested, "deep").expect("Failed to write file");
        source.emit(nested.clone());
        source.emit(folder.join("gone.txt"));
        let marker = folder.join("marker.txt");
        fs::write(&marker, "marker").expect("Failed to write file");
        source.emit(marker);

        // Events are handled in order, so once the marker lands the others were seen.
        assert!(wait_for(|| folder.join("Documents").join("marker.txt").exists()));
        watcher.stop();

        assert!(nested.exists());
        assert_eq!(observer.organized.lock().len(), 1);
        assert!(observer.errors.lock().is_empty());
    }

    #[test]
    fn test_start_rejects_missing_folder() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut watcher = DirectoryWatcher::with_source(organizer(), Box::new(ManualSource::default()));

        let result = watcher.start(
            &temp_dir.path().join("missing"),
            Arc::new(RecordingObserver::default()),
        );
        assert!(matches!(result, Err(WatchError::InvalidFolder(_))));
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let first = TempDir::new().expect("Failed to create temp directory");
        let second = TempDir::new().expect("Failed to create temp directory");
        let observer: Arc<dyn OrganizeObserver> = Arc::new(RecordingObserver::default());
        let mut watcher = DirectoryWatcher::with_source(organizer(), Box::new(ManualSource::default()));

        watcher.stop();
        watcher
            .start(first.path(), observer.clone())
            .expect("Failed to start watcher");
        let watched = watcher.watched_folder().map(Path::to_path_buf);
        watcher
            .start(second.path(), observer)
            .expect("Second start should be a no-op");

        assert_eq!(watcher.watched_folder().map(Path::to_path_buf), watched);
        watcher.stop();
        assert!(!watcher.is_running());
        watcher.stop();
    }

    #[test]
    fn test_stop_interrupts_settle_delay() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = ManualSource::default();
        let mut watcher = DirectoryWatcher::with_source(organizer(), Box::new(source.clone()))
            .settle_delay(Duration::from_secs(60));

        watcher
            .start(temp_dir.path(), Arc::new(RecordingObserver::default()))
            .expect("Failed to start watcher");
        let folder = watcher.watched_folder().expect("not running").to_path_buf();
        let file = folder.join("slow.txt");
        fs::write(&file, "slow").expect("Failed to write file");
        source.emit(file.clone());
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        watcher.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(file.exists());
    }

    #[test]
    fn test_native_notifications() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let observer = Arc::new(RecordingObserver::default());
        let mut watcher = DirectoryWatcher::new(organizer()).settle_delay(Duration::from_millis(50));

        watcher
            .start(temp_dir.path(), observer.clone())
            .expect("Failed to start watcher");
        let folder = watcher.watched_folder().expect("not running").to_path_buf();
        fs::write(folder.join("song.mp3"), "mp3").expect("Failed to write file");

        assert!(wait_for(|| folder.join("Audio").join("song.mp3").exists()));
        watcher.stop();
    }

    #[test]
    fn test_native_notifications_skip_category_folders() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let observer = Arc::new(RecordingObserver::default());
        let mut watcher = DirectoryWatcher::new(organizer()).settle_delay(Duration::from_millis(50));

        watcher
            .start(temp_dir.path(), observer.clone())
            .expect("Failed to start watcher");
        let folder = watcher.watched_folder().expect("not running").to_path_buf();

        fs::create_dir(folder.join("Images")).expect("Failed to create dir");
        let nested = folder.join("Images").join("x.txt");
        fs::write(&nested, "inside a category folder").expect("Failed to write file");
        // Top-level file written afterwards; once it lands, earlier events were handled.
        fs::write(folder.join("marker.txt"), "marker").expect("Failed to write file");

        assert!(wait_for(|| folder.join("Documents").join("marker.txt").exists()));
        thread::sleep(Duration::from_millis(200));
        watcher.stop();

        assert!(nested.exists());
        assert!(!folder.join("Documents").join("x.txt").exists());
        assert_eq!(*observer.organized.lock(), vec!["Organized: marker.txt"]);
    }
}
