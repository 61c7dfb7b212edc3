//! Parameter rewriting between sandbox and deployment locations
//!
//! Scripts receive paths to managed files as arguments. In audit mode those
//! must point at the sandboxed copies, in apply mode at the deployed ones.
//! The script itself never needs to know which mode is active.

use manifest::FileManifest;
use std::path::Path;

/// Rewrite `params` so managed-file references resolve under `target_dir`
///
/// For each token, in order:
/// - an absolute path containing a managed file name becomes
///   `target_dir/<name>` (first name in declaration order wins)
/// - a token equal to a managed file name becomes `target_dir/<token>`
/// - anything else passes through unchanged
///
/// A token matching several managed names is resolved by declaration
/// order only; such names should be avoided in configuration.
pub fn rewrite_params(params: &[String], manifest: &FileManifest, target_dir: &Path) -> Vec<String> {
    params
        .iter()
        .map(|param| rewrite_one(param, manifest, target_dir))
        .collect()
}

fn rewrite_one(param: &str, manifest: &FileManifest, target_dir: &Path) -> String {
    if param.starts_with('/') {
        if let Some(name) = manifest.paths().find(|name| param.contains(name)) {
            return join(target_dir, name);
        }
    } else if manifest.contains(param) {
        return join(target_dir, param);
    }
    param.to_string()
}

fn join(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().to_string()
}

/// Managed names that are substrings of another managed name
///
/// These make absolute-path rewriting depend on declaration order.
pub fn ambiguous_names(manifest: &FileManifest) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for a in manifest.paths() {
        for b in manifest.paths() {
            if a != b && b.contains(a) {
                pairs.push((a.to_string(), b.to_string()));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> FileManifest {
        FileManifest::from_pairs([("run.sh", "x"), ("settings.conf", "y"), ("lib/util.sh", "z")])
            .unwrap()
    }

    fn params(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_name_is_joined() {
        let out = rewrite_params(&params(&["settings.conf"]), &manifest(), Path::new("/tmp/sb"));
        assert_eq!(out, vec!["/tmp/sb/settings.conf"]);
    }

    #[test]
    fn test_absolute_path_is_redirected() {
        let out = rewrite_params(
            &params(&["/opt/app/lib/util.sh"]),
            &manifest(),
            Path::new("/tmp/sb"),
        );
        assert_eq!(out, vec!["/tmp/sb/lib/util.sh"]);
    }

    #[test]
    fn test_unrelated_tokens_pass_through() {
        let out = rewrite_params(
            &params(&["--check", "-v", "/etc/hosts", "other.conf"]),
            &manifest(),
            Path::new("/tmp/sb"),
        );
        assert_eq!(out, vec!["--check", "-v", "/etc/hosts", "other.conf"]);
    }

    #[test]
    fn test_relative_substring_is_not_rewritten() {
        let out = rewrite_params(&params(&["my-settings.conf"]), &manifest(), Path::new("/d"));
        assert_eq!(out, vec!["my-settings.conf"]);
    }

    #[test]
    fn test_first_declared_match_wins() {
        let m = FileManifest::from_pairs([("a.conf", "1"), ("data.conf", "2")]).unwrap();
        let out = rewrite_params(&params(&["/srv/data.conf"]), &m, Path::new("/d"));
        // "a.conf" is declared first and is a substring of "data.conf"
        assert_eq!(out, vec!["/d/a.conf"]);
        assert_eq!(
            ambiguous_names(&m),
            vec![("a.conf".to_string(), "data.conf".to_string())]
        );
    }

    #[test]
    fn test_order_of_params_is_kept() {
        let out = rewrite_params(
            &params(&["--apply", "run.sh", "settings.conf"]),
            &manifest(),
            Path::new("/real"),
        );
        assert_eq!(out, vec!["--apply", "/real/run.sh", "/real/settings.conf"]);
    }
}
