//! Browser launching
//!
//! The authorization flow only needs "show this URL to the user". The
//! system implementation hands the URL to the platform's default handler
//! (xdg-open on Linux, `open` on macOS, the URL protocol handler on
//! Windows); the manual one prints it for headless hosts.

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Capability to present an authorization URL to the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Opens URLs in the OS default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        open::that_detached(url).map_err(|e| {
            Error::Launch(format!(
                "no usable browser launcher on {}: {e}",
                std::env::consts::OS
            ))
        })?;
        debug!("launched system browser");
        Ok(())
    }
}

/// Prints the URL to stderr so the user can open it by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualBrowser;

impl BrowserLauncher for ManualBrowser {
    fn open(&self, url: &str) -> Result<()> {
        eprintln!("Open this URL in a browser to continue:\n\n  {url}\n");
        info!("waiting for manual authorization");
        Ok(())
    }
}

/// Select the launcher for this run.
pub fn launcher_for(open_browser: bool) -> Box<dyn BrowserLauncher> {
    if open_browser {
        Box::new(SystemBrowser)
    } else {
        Box::new(ManualBrowser)
    }
}
