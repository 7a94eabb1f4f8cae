use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::LaunchError;
use crate::size::TermSize;

/// How the child's standard streams are wired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Plain pipes. Size is communicated through the environment only, so a
    /// child asking the kernel for its window size gets nothing.
    #[default]
    Pipes,
    /// A real pseudo-terminal; resizes reach the child as SIGWINCH.
    Pty,
}

/// How to start one demo program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub command: String,
    /// `{cols}` and `{rows}` are replaced with the session size.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub description: Option<String>,
}

impl LaunchSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            backend: Backend::default(),
            description: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn expand_args(&self, size: TermSize) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{cols}", &size.cols.to_string())
                    .replace("{rows}", &size.rows.to_string())
            })
            .collect()
    }

    /// Full child environment: the spec's own variables first, then the
    /// size and color variables so those always win.
    pub fn environment(&self, size: TermSize) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.extend(size.env());
        env
    }
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    demos: BTreeMap<String, LaunchSpec>,
}

/// Fixed mapping from demo name to launch spec.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DemoRegistry {
    demos: BTreeMap<String, LaunchSpec>,
}

impl DemoRegistry {
    pub fn new(demos: BTreeMap<String, LaunchSpec>) -> Self {
        Self { demos }
    }

    /// Parse a TOML document with a `[demos.<name>]` table per demo.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let file: RegistryFile = toml::from_str(text)?;
        Ok(Self::new(file.demos))
    }

    pub fn resolve(&self, name: &str) -> Result<&LaunchSpec, LaunchError> {
        self.demos
            .get(name)
            .ok_or_else(|| LaunchError::UnknownDemo(name.to_string()))
    }

    /// Demo names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.demos.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.demos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.demos.is_empty()
    }
}

impl FromIterator<(String, LaunchSpec)> for DemoRegistry {
    fn from_iter<I: IntoIterator<Item = (String, LaunchSpec)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
