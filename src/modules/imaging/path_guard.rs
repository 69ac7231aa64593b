//! 归档路径校验
//! Archive path validation
//!
//! 只允许以 `/` 开头的相对归档路径，拒绝协议、主机、`..` 段与编码绕过，
//! 保证调用方无法把路由器指向任意主机。
//! Only absolute archive paths pass; schemes, hosts, `..` segments and their
//! encoded forms are rejected so callers cannot redirect the router.

use regex::Regex;

/// 路径校验失败原因 / Why a path was rejected
pub type PathRejection = &'static str;

#[derive(Debug, Clone)]
pub struct PathGuard {
    shape: Regex,
    traversal: Regex,
}

impl PathGuard {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            // 路径 + 可选查询串 / path with an optional query string
            shape: Regex::new(r"^/[A-Za-z0-9._~\-/]*(\?[A-Za-z0-9._~\-=&%+,]*)?$")?,
            // 明文或编码的 `..` 段 / plain or percent-encoded dot-dot segment
            traversal: Regex::new(r"(?i)(^|/)(\.|%2e){2}(/|$|\?)")?,
        })
    }

    pub fn check(&self, path: &str) -> Result<(), PathRejection> {
        if !path.starts_with('/') {
            return Err("path must start with '/'");
        }
        if path.starts_with("//") {
            return Err("path must not name a host");
        }
        if path.contains("://") {
            return Err("path must not carry a scheme");
        }
        if self.traversal.is_match(path) {
            return Err("path must not contain '..' segments");
        }
        if !self.shape.is_match(path) {
            return Err("path contains characters outside the archive path alphabet");
        }
        Ok(())
    }
}

/// 路径中是否有某一段等于归档内部 ID
/// Whether any path segment equals the archive-native id
pub fn references_segment(path: &str, native_id: &str) -> bool {
    if native_id.is_empty() {
        return false;
    }
    let path = path.split('?').next().unwrap_or(path);
    path.split('/').any(|segment| segment == native_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> PathGuard {
        PathGuard::new().unwrap()
    }

    #[test]
    fn test_accepts_archive_paths() {
        let g = guard();
        assert!(g.check("/instances/abc123").is_ok());
        assert!(g.check("/instances/abc123/file").is_ok());
        assert!(g.check("/instances/abc123/preview?quality=90").is_ok());
        assert!(g.check("/system").is_ok());
    }

    #[test]
    fn test_rejects_escapes() {
        let g = guard();
        assert!(g.check("instances/abc").is_err());
        assert!(g.check("//evil.example/x").is_err());
        assert!(g.check("/http://evil.example").is_err());
        assert!(g.check("/instances/../tools/reset").is_err());
        assert!(g.check("/instances/%2e%2e/tools").is_err());
        assert!(g.check("/instances/..").is_err());
        assert!(g.check("/instances/a@b").is_err());
        assert!(g.check("/instances/a b").is_err());
    }

    #[test]
    fn test_dotted_names_are_not_traversal() {
        let g = guard();
        assert!(g.check("/instances/1.2.840.113619").is_ok());
        assert!(g.check("/files/...").is_ok());
    }

    #[test]
    fn test_references_segment() {
        assert!(references_segment("/instances/abc123/file", "abc123"));
        assert!(references_segment("/instances/abc123?x=1", "abc123"));
        assert!(!references_segment("/instances/abc1234", "abc123"));
        assert!(!references_segment("/instances/other", ""));
    }
}
