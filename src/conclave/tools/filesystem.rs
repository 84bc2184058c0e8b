//! Sandboxed File System Tool
//!
//! A [`FileSystemTool`] lets an agent read and write files inside one configured base directory
//! and nowhere else. It is built from the `FileSystem` entry of the tools configuration (see
//! [`ToolFactory`](crate::tool_provider::ToolFactory)), whose `basepath` parameter names the
//! sandbox root.
//!
//! # Containment
//!
//! Every requested path goes through the same resolution before any I/O happens:
//!
//! 1. Reject ambiguous syntax: empty paths, NUL bytes, `~` home shorthand, drive letters and UNC
//!    prefixes, paths longer than [`MAX_PATH_BYTES`] or with a component longer than
//!    [`MAX_COMPONENT_BYTES`].
//! 2. Relative paths are joined to the base directory; absolute paths are taken as-is.
//! 3. `.` and `..` components are resolved lexically.
//! 4. The path (or, for files that do not exist yet, its nearest existing ancestor) is
//!    canonicalized so symlinks are followed.
//! 5. The canonical result must lie under the canonical base directory, compared component by
//!    component (`/data2` is not inside `/data`).
//!
//! I/O then happens on the canonical path that passed the check.
//!
//! # Failures are text
//!
//! The agent-facing operations [`read`](FileSystemTool::read) and [`write`](FileSystemTool::write)
//! never fail: denials and I/O errors come back as descriptive strings so the model can reason
//! about them. The typed variants ([`read_file`](FileSystemTool::read_file) and friends) return
//! [`FileSystemError`] for callers that want to branch on the failure.
//!
//! ```rust,no_run
//! use conclave::tools::FileSystemTool;
//!
//! # async fn demo() -> Result<(), conclave::tools::FileSystemError> {
//! let fs = FileSystemTool::new("/data")?;
//! fs.write("/data/out.txt", "hello").await;
//! assert_eq!(fs.read("/data/out.txt").await, "hello");
//! assert!(fs.read("/data/../etc/passwd").await.starts_with("Error:"));
//! # Ok(())
//! # }
//! ```

use crate::tool_protocol::{
    ParamKind, ToolError, ToolParameter, ToolProtocol, ToolResult, ToolSpec,
};
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Longest accepted path, in bytes.
pub const MAX_PATH_BYTES: usize = 4096;
/// Longest accepted single path component, in bytes.
pub const MAX_COMPONENT_BYTES: usize = 255;

/// Errors that can occur during sandboxed file system operations
#[derive(Debug, Clone, PartialEq)]
pub enum FileSystemError {
    /// The resolved path lies outside the base directory
    AccessDenied(String),
    /// The path is empty, overlong or uses syntax we refuse to interpret
    InvalidPath(String),
    /// Path does not exist
    NotFound(String),
    /// A file operation was attempted on a directory
    IsDirectory(String),
    /// A directory operation was attempted on a file
    NotADirectory(String),
    /// The operating system refused access
    PermissionDenied(String),
    /// File extension not allowed
    ExtensionNotAllowed(String),
    /// The configured base directory is missing or not a directory
    BaseDirectoryUnavailable(String),
    /// Any other I/O failure
    IOError(String),
}

impl FileSystemError {
    /// `true` when the request was refused by the sandbox rather than by the file system.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            FileSystemError::AccessDenied(_)
                | FileSystemError::InvalidPath(_)
                | FileSystemError::ExtensionNotAllowed(_)
        )
    }

    fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileSystemError::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => FileSystemError::PermissionDenied(path.to_string()),
            _ => FileSystemError::IOError(format!("{} ({})", err, path)),
        }
    }
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSystemError::AccessDenied(_) => {
                write!(f, "Access to the specified path is denied.")
            }
            FileSystemError::InvalidPath(reason) => write!(f, "Invalid path: {}", reason),
            FileSystemError::NotFound(path) => write!(f, "File not found at path '{}'", path),
            FileSystemError::IsDirectory(path) => write!(f, "'{}' is a directory", path),
            FileSystemError::NotADirectory(path) => write!(f, "'{}' is not a directory", path),
            FileSystemError::PermissionDenied(path) => {
                write!(f, "Permission denied for path '{}'", path)
            }
            FileSystemError::ExtensionNotAllowed(ext) => {
                write!(f, "Files with extension '{}' are not allowed", ext)
            }
            FileSystemError::BaseDirectoryUnavailable(msg) => {
                write!(f, "Base directory unavailable: {}", msg)
            }
            FileSystemError::IOError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl Error for FileSystemError {}

/// Entry in a directory listing
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

/// File system access confined to one base directory.
#[derive(Debug, Clone)]
pub struct FileSystemTool {
    base_dir: PathBuf,
    allowed_extensions: Option<Vec<String>>,
}

impl FileSystemTool {
    /// Create a tool rooted at `base_dir`, which must already exist and be a directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, FileSystemError> {
        let requested = base_dir.as_ref();
        let base_dir = requested.canonicalize().map_err(|e| {
            FileSystemError::BaseDirectoryUnavailable(format!("{}: {}", requested.display(), e))
        })?;
        if !base_dir.is_dir() {
            return Err(FileSystemError::BaseDirectoryUnavailable(format!(
                "{} is not a directory",
                requested.display()
            )));
        }
        Ok(Self {
            base_dir,
            allowed_extensions: None,
        })
    }

    /// Restrict reads and writes to files with one of these extensions (e.g. `["md", "txt"]`).
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = Some(extensions);
        self
    }

    /// Canonical base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn check_syntax(path: &str) -> Result<(), FileSystemError> {
        if path.trim().is_empty() {
            return Err(FileSystemError::InvalidPath("path is empty".to_string()));
        }
        if path.len() > MAX_PATH_BYTES {
            return Err(FileSystemError::InvalidPath(format!(
                "path exceeds {} bytes",
                MAX_PATH_BYTES
            )));
        }
        if path.contains('\0') {
            return Err(FileSystemError::InvalidPath(
                "path contains a NUL byte".to_string(),
            ));
        }
        if path.starts_with('~') {
            return Err(FileSystemError::InvalidPath(
                "home directory shorthand is not supported".to_string(),
            ));
        }
        let bytes = path.as_bytes();
        let drive_letter = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
        if drive_letter || path.starts_with("\\\\") || path.starts_with("//") {
            return Err(FileSystemError::InvalidPath(
                "drive and network prefixes are not supported".to_string(),
            ));
        }
        if path
            .split(|c| c == '/' || c == '\\')
            .any(|segment| segment.len() > MAX_COMPONENT_BYTES)
        {
            return Err(FileSystemError::InvalidPath(format!(
                "path component exceeds {} bytes",
                MAX_COMPONENT_BYTES
            )));
        }
        Ok(())
    }

    fn check_extension(&self, path: &Path) -> Result<(), FileSystemError> {
        if let Some(allowed) = &self.allowed_extensions {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !allowed.iter().any(|a| a.trim_start_matches('.').to_lowercase() == ext) {
                return Err(FileSystemError::ExtensionNotAllowed(ext));
            }
        }
        Ok(())
    }

    /// Resolve `path` to a canonical location inside the base directory.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, FileSystemError> {
        Self::check_syntax(path)?;

        let requested = Path::new(path);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.base_dir.join(requested)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::Prefix(_) => {
                    return Err(FileSystemError::InvalidPath(
                        "drive and network prefixes are not supported".to_string(),
                    ))
                }
                Component::RootDir => normalized.push(component.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                Component::Normal(part) => normalized.push(part),
            }
        }

        // Canonicalize the longest existing prefix, then re-attach the part that does not exist
        // yet. A dangling link counts as existing and fails to canonicalize.
        let mut existing = normalized.as_path();
        let mut missing = Vec::new();
        while existing.symlink_metadata().is_err() {
            match (existing.file_name(), existing.parent()) {
                (Some(name), Some(parent)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(FileSystemError::AccessDenied(path.to_string())),
            }
        }
        let mut canonical = match existing.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) if existing.is_symlink() => {
                log::warn!(
                    "conclave::tools::filesystem: denied access to '{}' through a dangling link",
                    path
                );
                return Err(FileSystemError::AccessDenied(path.to_string()));
            }
            Err(e) => return Err(FileSystemError::from_io(e, path)),
        };
        for part in missing.into_iter().rev() {
            canonical.push(part);
        }

        if !canonical.starts_with(&self.base_dir) {
            log::warn!(
                "conclave::tools::filesystem: denied access to '{}' outside {}",
                path,
                self.base_dir.display()
            );
            return Err(FileSystemError::AccessDenied(path.to_string()));
        }

        Ok(canonical)
    }

    /// Read a whole file as UTF-8 text.
    pub async fn read_file(&self, path: &str) -> Result<String, FileSystemError> {
        let resolved = self.resolve(path)?;
        self.check_extension(&resolved)?;
        if resolved.is_dir() {
            return Err(FileSystemError::IsDirectory(path.to_string()));
        }
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| FileSystemError::from_io(e, path))
    }

    /// Create or overwrite a file, creating missing parent directories inside the base.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), FileSystemError> {
        let resolved = self.resolve(path)?;
        self.check_extension(&resolved)?;
        if resolved.is_dir() {
            return Err(FileSystemError::IsDirectory(path.to_string()));
        }
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FileSystemError::from_io(e, path))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| FileSystemError::from_io(e, path))
    }

    /// List the entries of a directory, sorted by name.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, FileSystemError> {
        let resolved = self.resolve(path)?;
        if !resolved.exists() {
            return Err(FileSystemError::NotFound(path.to_string()));
        }
        if !resolved.is_dir() {
            return Err(FileSystemError::NotADirectory(path.to_string()));
        }

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| FileSystemError::from_io(e, path))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| FileSystemError::from_io(e, path))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| FileSystemError::from_io(e, path))?;
            entries.push(DirectoryEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_directory: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Agent-facing read: the file content, or an `Error: ...` description.
    pub async fn read(&self, path: &str) -> String {
        match self.read_file(path).await {
            Ok(content) => content,
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Agent-facing write: a confirmation, or an `Error: ...` description.
    pub async fn write(&self, path: &str, content: &str) -> String {
        match self.write_file(path, content).await {
            Ok(()) => format!("Successfully wrote content to '{}'", path),
            Err(e) => format!("Error: {}", e),
        }
    }
}

fn string_param<'a>(parameters: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    parameters.get(name).and_then(|v| v.as_str())
}

#[async_trait]
impl ToolProtocol for FileSystemTool {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        if !matches!(tool_name, "read_file" | "write_file" | "list_directory") {
            return Err(Box::new(ToolError::UnknownTool(tool_name.to_string())));
        }
        let path = match string_param(&parameters, "path") {
            Some(path) => path,
            None => return Ok(ToolResult::failed("missing required parameter 'path'")),
        };
        let result = match tool_name {
            "read_file" => match self.read_file(path).await {
                Ok(content) => ToolResult::ok(serde_json::json!(content)),
                Err(e) => ToolResult::failed(e.to_string()),
            },
            "write_file" => {
                let content = match string_param(&parameters, "content") {
                    Some(content) => content,
                    None => return Ok(ToolResult::failed("missing required parameter 'content'")),
                };
                match self.write_file(path, content).await {
                    Ok(()) => ToolResult::ok(serde_json::json!(format!(
                        "Successfully wrote content to '{}'",
                        path
                    ))),
                    Err(e) => ToolResult::failed(e.to_string()),
                }
            }
            "list_directory" => match self.list_directory(path).await {
                Ok(entries) => {
                    let listing: Vec<serde_json::Value> = entries
                        .iter()
                        .map(|e| {
                            serde_json::json!({
                                "name": e.name,
                                "is_directory": e.is_directory,
                                "size": e.size,
                            })
                        })
                        .collect();
                    ToolResult::ok(serde_json::Value::Array(listing))
                }
                Err(e) => ToolResult::failed(e.to_string()),
            },
            other => return Err(Box::new(ToolError::UnknownTool(other.to_string()))),
        };
        Ok(result)
    }

    fn list_tools(&self) -> Vec<ToolSpec> {
        let path = || {
            ToolParameter::required(
                "path",
                ParamKind::String,
                "File path, relative to the sandbox or absolute inside it",
            )
        };
        vec![
            ToolSpec::new("read_file", "Read the full text content of a file").param(path()),
            ToolSpec::new(
                "write_file",
                "Create or overwrite a file with the given text content",
            )
            .param(path())
            .param(ToolParameter::required(
                "content",
                ParamKind::String,
                "Text to write",
            )),
            ToolSpec::new("list_directory", "List files and folders in a directory")
                .param(path()),
        ]
    }

    fn protocol_name(&self) -> &str {
        "filesystem"
    }
}
