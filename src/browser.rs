//! Opening URLs in the default browser.

use anyhow::{Context, Result};

/// Something that can show a URL to the user.
pub trait BrowserOpener {
    fn open(&mut self, url: &str) -> Result<()>;
}

/// Hands URLs to the OS default browser without waiting for it.
#[derive(Debug, Default)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&mut self, url: &str) -> Result<()> {
        open::that_detached(url).with_context(|| format!("failed to open {}", url))
    }
}
