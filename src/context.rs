//! The launcher context: every piece of mutable session state, owned in one
//! place and passed explicitly to the launch, group and shutdown functions.

use std::path::PathBuf;

use crate::browser::BrowserOpener;
use crate::catalog::Catalog;
use crate::config::LaunchConfig;
use crate::console::Console;
use crate::registry::SessionRegistry;

pub struct LauncherContext {
    pub catalog: Catalog,
    /// Directory catalog locations are resolved against.
    pub root: PathBuf,
    pub config: LaunchConfig,
    pub registry: SessionRegistry,
    pub browser: Box<dyn BrowserOpener>,
    pub console: Console,
}

impl LauncherContext {
    pub fn new(
        catalog: Catalog,
        root: PathBuf,
        config: LaunchConfig,
        browser: Box<dyn BrowserOpener>,
        console: Console,
    ) -> Self {
        Self {
            catalog,
            root,
            config,
            registry: SessionRegistry::new(),
            browser,
            console,
        }
    }

    /// Opens `url`, reporting failures as warnings. Returns whether it opened.
    pub fn open_browser(&mut self, url: &str) -> bool {
        match self.browser.open(url) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(url, error = %err, "failed to open browser");
                self.console.warn(format!("could not open browser: {:#}", err));
                false
            }
        }
    }
}
