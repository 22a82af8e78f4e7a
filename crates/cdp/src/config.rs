//! Launch configuration for Chromium-family browsers in pipe mode.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

/// Everything needed to spawn the browser process: binary, argv, env,
/// and the connection policies the registry reads at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path or name of the browser binary.
    pub chrome_path: String,
    /// Profile directory; a temp-dir fallback is created on demand.
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    /// Appended verbatim after the defaults and switches.
    pub extra_args: Vec<String>,
    /// Named switches: `--key` when the value is None, `--key=value` otherwise.
    pub switches: BTreeMap<String, Option<String>>,
    /// Default flags to drop, matched by name with or without the `--` prefix.
    pub ignore_default_args: Vec<String>,
    /// Environment overrides merged over the parent environment.
    pub env: BTreeMap<String, String>,
    /// Attach to every discovered controllable target automatically.
    pub auto_attach: bool,
    /// Domains to `<Domain>.enable` on each attached page/iframe session.
    pub auto_enable_domains: Vec<String>,
}

const DEFAULT_ARGS: &[&str] = &[
    "--no-first-run",
    "--no-default-browser-check",
    "--use-gl=angle",
    "--use-angle=swiftshader",
    "--disable-gpu",
];

impl Default for Config {
    fn default() -> Self {
        Self {
            chrome_path: "chromium".to_string(),
            user_data_dir: None,
            headless: true,
            extra_args: Vec::new(),
            switches: BTreeMap::new(),
            ignore_default_args: Vec::new(),
            env: BTreeMap::new(),
            auto_attach: true,
            auto_enable_domains: vec!["Page".to_string(), "DOM".to_string()],
        }
    }
}

impl Config {
    /// Resolve the profile directory, creating it if necessary.
    pub fn ensure_user_data_dir(&mut self) -> io::Result<PathBuf> {
        let dir = match &self.user_data_dir {
            Some(dir) => dir.clone(),
            None => {
                let dir = std::env::temp_dir().join(".pipecdp-profile");
                self.user_data_dir = Some(dir.clone());
                dir
            }
        };
        std::fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "using user data dir");
        Ok(dir)
    }

    /// Build the full child argv. Always pipe mode, always ends with a
    /// blank page so the browser has exactly one initial target.
    pub fn build_argv(&mut self) -> io::Result<Vec<String>> {
        let mut argv: Vec<String> = Vec::new();

        if self.headless && !self.extra_args.iter().any(|a| a == "--headless=new") {
            argv.push("--headless=new".to_string());
        }

        argv.push("--remote-debugging-pipe".to_string());
        let data_dir = self.ensure_user_data_dir()?;
        argv.push(format!("--user-data-dir={}", data_dir.display()));

        for arg in DEFAULT_ARGS {
            if !self.is_ignored(arg) {
                argv.push((*arg).to_string());
            }
        }

        for (key, value) in &self.switches {
            match value {
                Some(v) => argv.push(format!("--{key}={v}")),
                None => argv.push(format!("--{key}")),
            }
        }

        argv.extend(self.extra_args.iter().cloned());
        argv.push("about:blank".to_string());
        tracing::debug!(?argv, "built browser argv");
        Ok(argv)
    }

    /// Parent environment with the configured overrides applied.
    pub fn build_env(&self) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = std::env::vars().collect();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    fn is_ignored(&self, arg: &str) -> bool {
        let name = flag_name(arg);
        self.ignore_default_args.iter().any(|i| flag_name(i) == name)
    }
}

/// `--disable-gpu=x` and `disable-gpu` both name the flag `disable-gpu`.
fn flag_name(arg: &str) -> &str {
    let arg = arg.trim_start_matches('-');
    arg.split('=').next().unwrap_or(arg)
}
