//! Wire protocol: `<target_skeleton_path>;<source_motion_path>` in, `<output_path>;` out.
//!
//! Failures reply `ERROR:<category>:<message>;` so clients reading up to the
//! first `;` still terminate.

use std::path::{Path, PathBuf};

use crate::error::RetargetError;

pub const SEPARATOR: char = ';';
pub const ERROR_PREFIX: &str = "ERROR:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetargetRequest {
    pub target: PathBuf,
    pub source: PathBuf,
}

impl RetargetRequest {
    /// Parse request text. Anything after the second field is ignored.
    pub fn parse(text: &str) -> Result<Self, RetargetError> {
        let text = text.trim_end_matches('\0');
        if !text.contains(SEPARATOR) {
            return Err(RetargetError::MalformedRequest {
                reason: format!("missing '{SEPARATOR}' separator"),
            });
        }
        let mut fields = text.split(SEPARATOR).map(str::trim);
        let target = fields.next().unwrap_or_default();
        let source = fields.next().unwrap_or_default();
        if target.is_empty() || source.is_empty() {
            return Err(RetargetError::MalformedRequest {
                reason: "expected '<target_skeleton>;<source_motion>'".into(),
            });
        }
        Ok(Self {
            target: PathBuf::from(target),
            source: PathBuf::from(source),
        })
    }

    /// Encode as request text.
    pub fn to_wire(&self) -> String {
        format!(
            "{}{SEPARATOR}{}",
            self.target.display(),
            self.source.display()
        )
    }
}

pub fn success_reply(output: &Path) -> String {
    format!("{}{SEPARATOR}", output.display())
}

pub fn error_reply(err: &RetargetError) -> String {
    let message = err.to_string().replace(SEPARATOR, ",");
    format!("{ERROR_PREFIX}{}:{message}{SEPARATOR}", err.category())
}

/// Client-side view of a reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Output(PathBuf),
    Error { category: String, message: String },
}

impl Reply {
    /// Parse reply text up to the first separator.
    pub fn parse(text: &str) -> Self {
        let body = text.split(SEPARATOR).next().unwrap_or_default();
        match body.strip_prefix(ERROR_PREFIX) {
            Some(rest) => {
                let (category, message) = rest.split_once(':').unwrap_or((rest, ""));
                Reply::Error {
                    category: category.to_string(),
                    message: message.to_string(),
                }
            }
            None => Reply::Output(PathBuf::from(body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_fields_and_ignores_the_rest() {
        let req = RetargetRequest::parse(" skel.bvh ; motion.bvh;extra\0\0").unwrap();
        assert_eq!(req.target, PathBuf::from("skel.bvh"));
        assert_eq!(req.source, PathBuf::from("motion.bvh"));
        assert_eq!(RetargetRequest::parse(&req.to_wire()).unwrap(), req);
    }

    #[test]
    fn rejects_missing_separator_or_fields() {
        for text in ["onlyonefield", "skel.bvh;", ";motion.bvh", ""] {
            let err = RetargetRequest::parse(text).unwrap_err();
            assert_eq!(err.category(), "malformed_request", "{text:?}");
        }
    }

    #[test]
    fn error_reply_stays_single_message() {
        let err = RetargetError::MalformedRequest {
            reason: "a;b".into(),
        };
        let reply = error_reply(&err);
        assert_eq!(reply.matches(SEPARATOR).count(), 1);
        assert!(reply.ends_with(SEPARATOR));
        match Reply::parse(&reply) {
            Reply::Error { category, message } => {
                assert_eq!(category, "malformed_request");
                assert!(message.contains("a,b"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(
            Reply::parse(&success_reply(Path::new("/tmp/result_0.bvh"))),
            Reply::Output(PathBuf::from("/tmp/result_0.bvh"))
        );
    }
}
