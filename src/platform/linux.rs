//! Linux/X11 implementations of the host collaborators.
//!
//! Foreground detection reads EWMH properties off the root window, the
//! overlay is an override-redirect window covering the whole screen, and
//! installed applications are resolved through XDG desktop entries.

use super::{
    Host, LogNotifier, OverlaySurface, PackageInfo, PackageRegistry, SystemClock, SystemSettings,
    UsageEvent, UsageEventKind, UsageEventLog,
};
use crate::error::PlatformError;
use directories::BaseDirs;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::SystemTime;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ConfigureWindowAux, ConnectionExt, CreateWindowAux, EventMask, StackMode, Window,
    WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::COPY_DEPTH_FROM_PARENT;

/// Transitions kept for usage-log queries. Queries only look back a few
/// seconds, so this only has to outlast a burst of window switches.
const HISTORY_LIMIT: usize = 256;

fn x11_error(e: impl Display) -> PlatformError {
    PlatformError::Host(format!("X11: {e}"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("X11 host: mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Geometry and visuals of the default screen.
#[derive(Debug, Clone, Copy)]
struct ScreenInfo {
    root: Window,
    width: u16,
    height: u16,
    black_pixel: u32,
    root_visual: u32,
}

fn open_connection() -> Result<(RustConnection, ScreenInfo), PlatformError> {
    let (conn, screen_num) = x11rb::connect(None)
        .map_err(|e| PlatformError::unavailable("X11 display", e))?;
    let screen = conn
        .setup()
        .roots
        .get(screen_num)
        .ok_or_else(|| PlatformError::unavailable("X11 display", "no default screen"))?;
    let info = ScreenInfo {
        root: screen.root,
        width: screen.width_in_pixels,
        height: screen.height_in_pixels,
        black_pixel: screen.black_pixel,
        root_visual: screen.root_visual,
    };
    Ok((conn, info))
}

/// Values of a 32-bit list property (windows, atoms), in order.
fn u32_list(value: &[u8]) -> Vec<u32> {
    value
        .chunks_exact(4)
        .filter_map(|chunk| <[u8; 4]>::try_from(chunk).ok().map(u32::from_ne_bytes))
        .collect()
}

/// Instance part of a `WM_CLASS` value, lowercased. This is the namespace
/// foreground samples are reported in.
fn wm_class_instance(value: &[u8]) -> Option<String> {
    let instance = value.split(|b| *b == 0).next()?;
    let name = String::from_utf8_lossy(instance).trim().to_lowercase();
    (!name.is_empty()).then_some(name)
}

/// First candidate whose `_NET_WM_WINDOW_TYPE` includes `desktop_type`,
/// as a `WM_CLASS` instance. Candidates are `(window type, WM_CLASS)`
/// pairs and are consumed lazily.
fn desktop_instance<I>(candidates: I, desktop_type: u32) -> Option<String>
where
    I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
{
    candidates
        .into_iter()
        .filter(|(window_type, _)| u32_list(window_type).contains(&desktop_type))
        .find_map(|(_, class)| wm_class_instance(&class))
}

/// Read-only EWMH queries against the display.
pub struct X11Display {
    conn: RustConnection,
    root: Window,
}

impl X11Display {
    pub fn connect() -> Result<Self, PlatformError> {
        let (conn, screen) = open_connection()?;
        Ok(Self {
            conn,
            root: screen.root,
        })
    }

    fn get_atom(&self, name: &str) -> Option<u32> {
        self.conn
            .intern_atom(false, name.as_bytes())
            .ok()?
            .reply()
            .ok()
            .map(|r| r.atom)
    }

    fn get_window_property(&self, window: Window, atom: u32) -> Option<Vec<u8>> {
        let reply = self
            .conn
            .get_property(false, window, atom, AtomEnum::ANY, 0, 1024)
            .ok()?
            .reply()
            .ok()?;

        if reply.value.is_empty() {
            return None;
        }
        Some(reply.value)
    }

    fn window_from_property(&self, window: Window, name: &str) -> Option<Window> {
        let atom = self.get_atom(name)?;
        let value = self.get_window_property(window, atom)?;
        let bytes: [u8; 4] = value.get(..4)?.try_into().ok()?;
        Some(u32::from_ne_bytes(bytes)).filter(|id| *id != 0)
    }

    fn active_window_id(&self) -> Option<Window> {
        self.window_from_property(self.root, "_NET_ACTIVE_WINDOW")
    }

    /// Instance part of `WM_CLASS` on the focused window, lowercased.
    pub fn focused_application(&self) -> Option<String> {
        let window = self.active_window_id()?;
        let value = self.get_window_property(window, AtomEnum::WM_CLASS.into())?;
        wm_class_instance(&value)
    }

    /// `WM_CLASS` instance of the window typed `_NET_WM_WINDOW_TYPE_DESKTOP`
    /// (plasmashell, xfdesktop, nautilus-desktop ...). Managed clients are
    /// searched first, then the root's children.
    pub fn desktop_application(&self) -> Option<String> {
        let type_atom = self.get_atom("_NET_WM_WINDOW_TYPE")?;
        let desktop_type = self.get_atom("_NET_WM_WINDOW_TYPE_DESKTOP")?;

        let mut windows = self
            .get_atom("_NET_CLIENT_LIST")
            .and_then(|atom| self.get_window_property(self.root, atom))
            .map(|value| u32_list(&value))
            .unwrap_or_default();
        if let Some(tree) = self.conn.query_tree(self.root).ok().and_then(|c| c.reply().ok()) {
            windows.extend(tree.children);
        }

        let candidates = windows.into_iter().filter_map(|window| {
            let window_type = self.get_window_property(window, type_atom)?;
            let class = self.get_window_property(window, AtomEnum::WM_CLASS.into())?;
            Some((window_type, class))
        });
        desktop_instance(candidates, desktop_type)
    }

    /// Identifier of the home surface, in the same namespace as
    /// [`focused_application`](Self::focused_application). Falls back to the
    /// window manager name when no desktop window exists.
    pub fn home_application(&self) -> Option<String> {
        self.desktop_application().or_else(|| self.window_manager_name())
    }

    /// Name the EWMH window manager advertises, lowercased. This is the
    /// desktop shell, the closest thing X11 has to a home screen.
    pub fn window_manager_name(&self) -> Option<String> {
        let check = self.window_from_property(self.root, "_NET_SUPPORTING_WM_CHECK")?;
        let atom = self.get_atom("_NET_WM_NAME")?;
        let value = self.get_window_property(check, atom)?;
        let name = String::from_utf8(value).ok()?.trim_end_matches('\0').to_lowercase();
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Default)]
struct History {
    events: VecDeque<UsageEvent>,
    current: Option<String>,
}

impl History {
    fn record(&mut self, event: UsageEvent) {
        if self.events.len() >= HISTORY_LIMIT {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Usage log synthesised from focus changes.
///
/// X11 keeps no activity history, so every query samples the focused
/// window, records Paused/Resumed transitions when it changed, and reports
/// the still-focused application as resumed at the end of the range.
pub struct X11ActivityLog {
    display: Arc<X11Display>,
    history: Mutex<History>,
}

impl X11ActivityLog {
    pub fn new(display: Arc<X11Display>) -> Self {
        Self {
            display,
            history: Mutex::new(History::default()),
        }
    }
}

impl UsageEventLog for X11ActivityLog {
    fn query_events(
        &self,
        begin: SystemTime,
        end: SystemTime,
    ) -> Result<Vec<UsageEvent>, PlatformError> {
        let focused = self.display.focused_application();
        let mut history = lock(&self.history);

        if history.current != focused {
            if let Some(previous) = history.current.take() {
                history.record(UsageEvent::new(UsageEventKind::Paused, &previous, end));
            }
            if let Some(app) = focused.as_deref() {
                debug!("Focus moved to {app}");
                history.record(UsageEvent::new(UsageEventKind::Resumed, app, end));
            }
            history.current = focused;
        }

        let mut events: Vec<UsageEvent> = history
            .events
            .iter()
            .filter(|e| e.timestamp >= begin && e.timestamp <= end)
            .cloned()
            .collect();
        if let Some(app) = history.current.as_deref() {
            let already_reported = events
                .last()
                .is_some_and(|e| e.kind == UsageEventKind::Resumed && e.application == app && e.timestamp == end);
            if !already_reported {
                events.push(UsageEvent::new(UsageEventKind::Resumed, app, end));
            }
        }
        Ok(events)
    }
}

type ClickHandler = Arc<dyn Fn() + Send + Sync>;

struct OverlayInner {
    conn: RustConnection,
    screen: ScreenInfo,
    window: Mutex<Option<Window>>,
    on_click: Mutex<Option<ClickHandler>>,
}

/// Full-screen blocking window.
///
/// Override-redirect keeps the window manager from reparenting, moving or
/// focusing it. A click anywhere on it runs the registered click handler.
pub struct X11Overlay {
    inner: Arc<OverlayInner>,
}

impl X11Overlay {
    /// Open a dedicated connection and start the event pump for it.
    pub fn connect() -> Result<Self, PlatformError> {
        let (conn, screen) = open_connection()?;
        let inner = Arc::new(OverlayInner {
            conn,
            screen,
            window: Mutex::new(None),
            on_click: Mutex::new(None),
        });

        let pump = Arc::clone(&inner);
        thread::Builder::new()
            .name("x11-overlay-events".to_string())
            .spawn(move || pump.pump_events())
            .map_err(|e| PlatformError::unavailable("overlay event pump", e))?;

        Ok(Self { inner })
    }

    pub fn on_click<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *lock(&self.inner.on_click) = Some(Arc::new(handler));
    }
}

impl OverlayInner {
    fn pump_events(&self) {
        loop {
            let event = match self.conn.wait_for_event() {
                Ok(event) => event,
                Err(e) => {
                    warn!("Overlay event pump stopped: {e}");
                    return;
                }
            };

            if let Event::ButtonPress(press) = event {
                if *lock(&self.window) != Some(press.event) {
                    continue;
                }
                let handler = lock(&self.on_click).clone();
                if let Some(handler) = handler {
                    handler();
                }
            }
        }
    }
}

impl OverlaySurface for X11Overlay {
    fn attach(&self) -> Result<(), PlatformError> {
        let inner = &self.inner;
        let mut window = lock(&inner.window);
        if window.is_some() {
            return Ok(());
        }

        let id = inner.conn.generate_id().map_err(x11_error)?;
        let aux = CreateWindowAux::new()
            .override_redirect(1)
            .background_pixel(inner.screen.black_pixel)
            .event_mask(EventMask::BUTTON_PRESS);
        inner
            .conn
            .create_window(
                COPY_DEPTH_FROM_PARENT,
                id,
                inner.screen.root,
                0,
                0,
                inner.screen.width,
                inner.screen.height,
                0,
                WindowClass::INPUT_OUTPUT,
                inner.screen.root_visual,
                &aux,
            )
            .map_err(x11_error)?
            .check()
            .map_err(x11_error)?;
        inner.conn.map_window(id).map_err(x11_error)?;
        inner
            .conn
            .configure_window(id, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
            .map_err(x11_error)?;
        inner.conn.flush().map_err(x11_error)?;

        *window = Some(id);
        Ok(())
    }

    fn detach(&self) -> Result<(), PlatformError> {
        let inner = &self.inner;
        let Some(id) = lock(&inner.window).take() else {
            return Ok(());
        };
        inner.conn.destroy_window(id).map_err(x11_error)?;
        inner.conn.flush().map_err(x11_error)
    }
}

/// Resolves application identifiers to XDG desktop entries.
///
/// An `<id>.desktop` under a user or locally-installed data directory is a
/// user app; one only under a system directory is a system app.
pub struct DesktopEntryRegistry {
    user_dirs: Vec<PathBuf>,
    system_dirs: Vec<PathBuf>,
    display: Option<Arc<X11Display>>,
}

impl DesktopEntryRegistry {
    pub fn new(display: Arc<X11Display>) -> Self {
        let mut user_dirs = Vec::new();
        if let Some(base) = BaseDirs::new() {
            user_dirs.push(base.data_dir().join("applications"));
            user_dirs.push(base.data_dir().join("flatpak/exports/share/applications"));
        }
        user_dirs.push(PathBuf::from("/var/lib/flatpak/exports/share/applications"));
        user_dirs.push(PathBuf::from("/usr/local/share/applications"));

        Self {
            user_dirs,
            system_dirs: vec![PathBuf::from("/usr/share/applications")],
            display: Some(display),
        }
    }

    pub fn with_dirs(user_dirs: Vec<PathBuf>, system_dirs: Vec<PathBuf>) -> Self {
        Self {
            user_dirs,
            system_dirs,
            display: None,
        }
    }

    fn has_entry(dirs: &[PathBuf], identifier: &str) -> bool {
        let file_name = format!("{identifier}.desktop");
        dirs.iter().any(|dir| dir.join(&file_name).is_file())
    }
}

fn is_plain_identifier(identifier: &str) -> bool {
    !identifier.is_empty() && Path::new(identifier).file_name().is_some_and(|name| name == identifier)
}

impl PackageRegistry for DesktopEntryRegistry {
    fn lookup(&self, identifier: &str) -> Result<PackageInfo, PlatformError> {
        if !is_plain_identifier(identifier) {
            return Err(PlatformError::PackageNotFound(identifier.to_string()));
        }

        let is_system_app = if Self::has_entry(&self.user_dirs, identifier) {
            false
        } else if Self::has_entry(&self.system_dirs, identifier) {
            true
        } else {
            return Err(PlatformError::PackageNotFound(identifier.to_string()));
        };

        Ok(PackageInfo {
            identifier: identifier.to_string(),
            is_system_app,
        })
    }

    fn home_package(&self) -> Option<String> {
        self.display.as_ref()?.home_application()
    }
}

/// Permissions and app launching on an X11 desktop.
pub struct X11Settings {
    display: Arc<X11Display>,
}

impl X11Settings {
    pub fn new(display: Arc<X11Display>) -> Self {
        Self { display }
    }
}

impl SystemSettings for X11Settings {
    /// Focus tracking needs an EWMH window manager publishing
    /// `_NET_ACTIVE_WINDOW`.
    fn usage_access_granted(&self) -> bool {
        self.display.window_manager_name().is_some()
    }

    fn overlay_granted(&self) -> bool {
        true
    }

    fn open_usage_access_settings(&self) -> Result<(), PlatformError> {
        info!("Focus tracking needs an EWMH-compliant window manager; nothing to open");
        Ok(())
    }

    fn open_overlay_settings(&self) -> Result<(), PlatformError> {
        debug!("Overlay needs no permission on X11");
        Ok(())
    }

    fn launch_app(&self, identifier: &str) -> Result<(), PlatformError> {
        let status = Command::new("gtk-launch")
            .arg(identifier)
            .status()
            .map_err(|e| PlatformError::unavailable("gtk-launch", e))?;
        if status.success() {
            Ok(())
        } else {
            Err(PlatformError::Host(format!("gtk-launch {identifier} exited with {status}")))
        }
    }
}

/// Wire every collaborator to the local X server.
///
/// The overlay is returned separately so the caller can install its click
/// handler once the overlay controller exists.
pub fn connect() -> Result<(Host, Arc<X11Overlay>), PlatformError> {
    let display = Arc::new(X11Display::connect()?);
    let overlay = Arc::new(X11Overlay::connect()?);
    let surface: Arc<X11Overlay> = Arc::clone(&overlay);
    let surface: Arc<dyn OverlaySurface> = surface;

    let host = Host {
        usage_log: Arc::new(X11ActivityLog::new(Arc::clone(&display))),
        surface,
        registry: Arc::new(DesktopEntryRegistry::new(Arc::clone(&display))),
        notifier: Arc::new(LogNotifier),
        settings: Arc::new(X11Settings::new(display)),
        clock: Arc::new(SystemClock),
    };
    Ok((host, overlay))
}
