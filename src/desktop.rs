//! Desktop integration for side effects that are not plain filesystem
//! calls, such as opening a document in the user's session or setting
//! the wallpaper.
//!
//! Handlers only talk to the [`Desktop`] trait, so tests substitute a
//! recording fake and never touch the real session.
//!
//! No call here goes through a shell interpreter with user-controlled
//! text: program names are validated by the caller and every argument
//! is passed as its own argv entry.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

pub trait Desktop: Send + Sync {
    /// Opens a file or folder with the session's default handler.
    fn open_path(&self, path: &Path) -> io::Result<()>;

    /// Starts a program by name, without waiting for it.
    fn launch(&self, program: &str) -> io::Result<()>;

    /// Stops every running instance of a program.
    /// Returns `Ok(false)` if none was running.
    fn terminate(&self, program: &str) -> io::Result<bool>;

    fn set_wallpaper(&self, image: &Path) -> io::Result<()>;
}

/// The real desktop of the current user session.
pub struct SystemDesktop;

/// Spawns a command and reaps it in the background so it never lingers
/// as a zombie.
fn spawn_detached(command: &mut Command) -> io::Result<()> {
    debug!("Spawning {command:?}");
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

/// Runs a command to completion and turns a non-zero exit into an error.
fn run_checked(command: &mut Command) -> io::Result<()> {
    debug!("Running {command:?}");
    let output = command.stdin(Stdio::null()).output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

#[cfg(windows)]
impl Desktop for SystemDesktop {
    fn open_path(&self, path: &Path) -> io::Result<()> {
        spawn_detached(Command::new("explorer").arg(path))
    }

    fn launch(&self, program: &str) -> io::Result<()> {
        // `start` resolves App Paths entries (chrome, winword, …) that
        // are not on PATH. The name is a validated bare program name.
        spawn_detached(Command::new("cmd").args(["/C", "start", "", program]))
    }

    fn terminate(&self, program: &str) -> io::Result<bool> {
        let image = if program.to_lowercase().ends_with(".exe") {
            program.to_string()
        } else {
            format!("{program}.exe")
        };
        let output = Command::new("taskkill")
            .args(["/IM", &image, "/F"])
            .stdin(Stdio::null())
            .output()?;
        match output.status.code() {
            Some(0) => Ok(true),
            // 128: no such process
            Some(128) => Ok(false),
            _ => Err(io::Error::other(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
        }
    }

    fn set_wallpaper(&self, image: &Path) -> io::Result<()> {
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::UI::WindowsAndMessaging::{
            SystemParametersInfoW, SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_SETDESKWALLPAPER,
        };

        let mut wide: Vec<u16> = image.as_os_str().encode_wide().chain(Some(0)).collect();
        // SAFETY: `wide` is NUL-terminated and outlives the call
        let ok = unsafe {
            SystemParametersInfoW(
                SPI_SETDESKWALLPAPER,
                0,
                wide.as_mut_ptr().cast(),
                SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(target_os = "macos")]
impl Desktop for SystemDesktop {
    fn open_path(&self, path: &Path) -> io::Result<()> {
        spawn_detached(Command::new("open").arg(path))
    }

    fn launch(&self, program: &str) -> io::Result<()> {
        run_checked(Command::new("open").args(["-a", program]))
    }

    fn terminate(&self, program: &str) -> io::Result<bool> {
        pkill(program)
    }

    fn set_wallpaper(&self, image: &Path) -> io::Result<()> {
        let image = image.to_string_lossy().replace('\\', "\\\\").replace('"', "\\\"");
        let script = format!(
            "tell application \"System Events\" to tell every desktop to set picture to \"{image}\""
        );
        run_checked(Command::new("osascript").args(["-e", &script]))
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
impl Desktop for SystemDesktop {
    fn open_path(&self, path: &Path) -> io::Result<()> {
        spawn_detached(Command::new("xdg-open").arg(path))
    }

    fn launch(&self, program: &str) -> io::Result<()> {
        spawn_detached(&mut Command::new(program))
    }

    fn terminate(&self, program: &str) -> io::Result<bool> {
        pkill(program)
    }

    fn set_wallpaper(&self, image: &Path) -> io::Result<()> {
        let uri = file_uri(image)?;
        for key in ["picture-uri", "picture-uri-dark"] {
            run_checked(Command::new("gsettings").args([
                "set",
                "org.gnome.desktop.background",
                key,
                &uri,
            ]))?;
        }
        Ok(())
    }
}

/// `file://` URI with the path percent-encoded, as gsettings expects.
#[cfg(all(unix, not(target_os = "macos")))]
fn file_uri(image: &Path) -> io::Result<String> {
    url::Url::from_file_path(image)
        .map(String::from)
        .map_err(|()| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} cannot be expressed as a file URI", image.display()),
            )
        })
}

#[cfg(unix)]
fn pkill(program: &str) -> io::Result<bool> {
    let output = Command::new("pkill")
        .args(["-x", program])
        .stdin(Stdio::null())
        .output()?;
    match output.status.code() {
        Some(0) => Ok(true),
        // 1: no process matched
        Some(1) => Ok(false),
        _ => Err(io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DesktopCall {
        Open(PathBuf),
        Launch(String),
        Terminate(String),
        Wallpaper(PathBuf),
    }

    /// Records calls instead of performing them.
    #[derive(Default)]
    pub struct RecordingDesktop {
        pub calls: Mutex<Vec<DesktopCall>>,
        /// Programs `terminate` reports as running
        pub running: Vec<String>,
    }

    impl RecordingDesktop {
        pub fn calls(&self) -> Vec<DesktopCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: DesktopCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Desktop for RecordingDesktop {
        fn open_path(&self, path: &Path) -> io::Result<()> {
            self.record(DesktopCall::Open(path.to_path_buf()));
            Ok(())
        }

        fn launch(&self, program: &str) -> io::Result<()> {
            self.record(DesktopCall::Launch(program.to_string()));
            Ok(())
        }

        fn terminate(&self, program: &str) -> io::Result<bool> {
            self.record(DesktopCall::Terminate(program.to_string()));
            Ok(self.running.iter().any(|p| p == program))
        }

        fn set_wallpaper(&self, image: &Path) -> io::Result<()> {
            self.record(DesktopCall::Wallpaper(image.to_path_buf()));
            Ok(())
        }
    }
}
