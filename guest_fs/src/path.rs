//! Guest path handling
//!
//! Guest paths may use either `/` or `\` as a separator
//! (`\Device\Cdrom0\default.xex`, `/game/default.xex`).

use crate::error::FsError;

/// True for either guest path separator
pub fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Splits a device-relative path into components.
///
/// Empty and `.` components are dropped, so `"media//./logo.png"` and
/// `"\media\logo.png"` both give `["media", "logo.png"]`. An empty result
/// names the device root. `..` is rejected: a device never serves anything
/// above its own root.
///
/// # Examples
///
/// ```
/// use guest_fs::path::split_components;
///
/// let components = split_components("media\\ui/logo.png").unwrap();
/// assert_eq!(components, vec!["media", "ui", "logo.png"]);
/// assert!(split_components("").unwrap().is_empty());
/// ```
pub fn split_components(path: &str) -> Result<Vec<&str>, FsError> {
    let mut components = Vec::new();
    for component in path.split(is_separator) {
        match component {
            "" | "." => continue,
            ".." => {
                return Err(FsError::InvalidPath(format!(
                    "parent components are not supported: {}",
                    path
                )))
            }
            name if name.contains('\0') => {
                return Err(FsError::InvalidPath(format!(
                    "path contains NUL: {:?}",
                    path
                )))
            }
            name => components.push(name),
        }
    }
    Ok(components)
}

/// Joins components with `/`, the canonical separator for entry paths
pub fn join_components(components: &[&str]) -> String {
    components.join("/")
}
