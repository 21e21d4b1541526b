use std::path::Path;

use crate::config::FitMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// The platform call that enumerates monitors and paints their backgrounds.
/// Everything is synchronous and may fail; callers log failures rather than
/// swallowing them.
pub trait DisplaySurface {
    fn monitor_count(&self) -> Result<u32, String>;
    fn monitor_id(&self, index: u32) -> Result<String, String>;
    fn monitor_rect(&self, id: &str) -> Result<Rect, String>;
    fn paint(&self, id: &str, image: &Path) -> Result<(), String>;
    fn set_fit_mode(&self, mode: FitMode) -> Result<(), String>;

    /// Asks the desktop to redraw after a batch of paints. Best effort.
    fn refresh(&self) {}
}

#[cfg(windows)]
pub use desktop::DesktopWallpaper;

#[cfg(windows)]
mod desktop {
    use std::{ffi::OsStr, os::windows::ffi::OsStrExt, path::Path};

    use windows::{
        core::PCWSTR,
        Win32::{
            System::Com::{
                CoCreateInstance, CoInitializeEx, CoTaskMemFree, CLSCTX_ALL,
                COINIT_APARTMENTTHREADED,
            },
            UI::Shell::{
                DesktopWallpaper as DesktopWallpaperClass, IDesktopWallpaper, DWPOS_CENTER,
                DWPOS_FILL, DWPOS_FIT, DWPOS_SPAN, DWPOS_STRETCH, DWPOS_TILE,
            },
            UI::WindowsAndMessaging::{
                SystemParametersInfoW, SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_SETDESKWALLPAPER,
            },
        },
    };

    use super::{DisplaySurface, Rect};
    use crate::config::FitMode;

    fn to_wstring(s: &str) -> Vec<u16> {
        OsStr::new(s)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect()
    }

    /// Wrapper around the `IDesktopWallpaper` COM interface.
    pub struct DesktopWallpaper {
        inner: IDesktopWallpaper,
    }

    impl DesktopWallpaper {
        pub fn new() -> Result<Self, String> {
            unsafe {
                let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
            }

            let inner: IDesktopWallpaper =
                unsafe { CoCreateInstance(&DesktopWallpaperClass, None, CLSCTX_ALL) }
                    .map_err(|e| format!("CoCreateInstance(DesktopWallpaper) failed: {e:?}"))?;

            Ok(Self { inner })
        }
    }

    impl DisplaySurface for DesktopWallpaper {
        fn monitor_count(&self) -> Result<u32, String> {
            unsafe { self.inner.GetMonitorDevicePathCount() }
                .map_err(|e| format!("GetMonitorDevicePathCount failed: {e:?}"))
        }

        fn monitor_id(&self, index: u32) -> Result<String, String> {
            let raw = unsafe { self.inner.GetMonitorDevicePathAt(index) }
                .map_err(|e| format!("GetMonitorDevicePathAt({index}) failed: {e:?}"))?;
            let id = unsafe { raw.to_string() };
            unsafe { CoTaskMemFree(Some(raw.0 as *const _)) };
            id.map_err(|e| format!("Monitor id at {index} is not valid UTF-16: {e}"))
        }

        fn monitor_rect(&self, id: &str) -> Result<Rect, String> {
            let wide = to_wstring(id);
            let rect = unsafe { self.inner.GetMonitorRECT(PCWSTR(wide.as_ptr())) }
                .map_err(|e| format!("GetMonitorRECT for '{id}' failed: {e:?}"))?;
            Ok(Rect {
                left: rect.left,
                top: rect.top,
                right: rect.right,
                bottom: rect.bottom,
            })
        }

        fn paint(&self, id: &str, image: &Path) -> Result<(), String> {
            let id_wide = to_wstring(id);
            let path_wide = to_wstring(&image.to_string_lossy());
            unsafe {
                self.inner
                    .SetWallpaper(PCWSTR(id_wide.as_ptr()), PCWSTR(path_wide.as_ptr()))
            }
            .map_err(|e| format!("SetWallpaper for '{id}' failed: {e:?}"))
        }

        fn set_fit_mode(&self, mode: FitMode) -> Result<(), String> {
            let position = match mode {
                FitMode::Center => DWPOS_CENTER,
                FitMode::Tile => DWPOS_TILE,
                FitMode::Stretch => DWPOS_STRETCH,
                FitMode::Fit => DWPOS_FIT,
                FitMode::Fill => DWPOS_FILL,
                FitMode::Span => DWPOS_SPAN,
            };
            unsafe { self.inner.SetPosition(position) }
                .map_err(|e| format!("SetPosition({mode:?}) failed: {e:?}"))
        }

        fn refresh(&self) {
            unsafe {
                let _ = SystemParametersInfoW(
                    SPI_SETDESKWALLPAPER,
                    0,
                    None,
                    SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
                );
            }
        }
    }
}
