//! Whole-region replacement of a method body.

use crate::error::{PatchError, PatchResult};
use crate::region::{find_regions, line_terminator, split_lines, strip_terminator};
use crate::rules::{ContentRule, Rewrite};
use crate::smali_parse::{is_method_end, is_method_start, parse_method_header};
use crate::types::MethodIdentity;

/// A literal method used as a replacement: declaration line, body and
/// `.end method`.
#[derive(Debug, Clone)]
pub struct MethodBody {
    identity: MethodIdentity,
    lines: Vec<String>,
}

impl MethodBody {
    /// Builds a body from its literal lines.
    ///
    /// The first line must declare a method and the last must be `.end method`,
    /// so the replacement is itself found by a later search for the same
    /// identity.
    pub fn new<I, S>(lines: I) -> PatchResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        let header = lines
            .first()
            .ok_or_else(|| PatchError::InvalidReplacement("empty body".to_string()))?;
        let (_, parsed) = parse_method_header(header).map_err(|_| {
            PatchError::InvalidReplacement(format!("not a method declaration: '{header}'"))
        })?;
        match lines.last() {
            Some(last) if lines.len() > 1 && is_method_end(last) => {}
            _ => {
                return Err(PatchError::InvalidReplacement(
                    "body must end with .end method".to_string(),
                ))
            }
        }
        let interior = &lines[1..lines.len() - 1];
        if interior.iter().any(|l| is_method_end(l)) {
            return Err(PatchError::InvalidReplacement(
                "body contains a nested .end method".to_string(),
            ));
        }
        if interior.iter().any(|l| is_method_start(l)) {
            return Err(PatchError::InvalidReplacement(
                "body contains a nested .method".to_string(),
            ));
        }
        Ok(MethodBody {
            identity: parsed.identity(),
            lines,
        })
    }

    pub fn identity(&self) -> &MethodIdentity {
        &self.identity
    }

    fn render(&self, eol: &str, terminate_last: bool) -> String {
        let mut out = String::new();
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            out.push_str(line);
            if i < last || terminate_last {
                out.push_str(eol);
            }
        }
        out
    }
}

/// Replaces every region declaring the body's method with the body itself.
///
/// # Examples
///
/// ```
///  use pairip_patcher::rewriter::{MethodBody, MethodRewriter};
///  use pairip_patcher::rules::{ContentRule, PatchOutcome};
///
///  let body = MethodBody::new([".method public run()V", "    return-void", ".end method"]).unwrap();
///  let rewriter = MethodRewriter::new(body);
///  let smali = ".method public run()V\n    invoke-static {}, La;->b()V\n    return-void\n.end method\n";
///  let once = rewriter.apply(smali).unwrap();
///  assert_eq!(once.outcome(), PatchOutcome::Changed(1));
///  assert_eq!(rewriter.apply(&once.content).unwrap().outcome(), PatchOutcome::Unchanged);
/// ```
#[derive(Debug, Clone)]
pub struct MethodRewriter {
    body: MethodBody,
}

impl MethodRewriter {
    pub fn new(body: MethodBody) -> Self {
        MethodRewriter { body }
    }

    pub fn target(&self) -> &MethodIdentity {
        self.body.identity()
    }
}

impl ContentRule for MethodRewriter {
    fn describe(&self) -> String {
        format!("rewrite {}", self.target())
    }

    fn apply(&self, content: &str) -> PatchResult<Rewrite> {
        let lines = split_lines(content);
        let regions = find_regions(&lines, self.target())?;
        if regions.is_empty() {
            return Ok(Rewrite::untouched(content, 0));
        }

        let eol = line_terminator(content);
        let mut out = String::with_capacity(content.len());
        let mut changed = 0;
        let mut next = 0;
        for region in &regions {
            for line in &lines[next..region.start] {
                out.push_str(line);
            }
            let end_line = lines[region.end];
            let terminated = strip_terminator(end_line).len() != end_line.len();
            let replacement = self.body.render(eol, terminated);
            let original: String = lines[region.start..=region.end].concat();
            if original != replacement {
                changed += 1;
            }
            out.push_str(&replacement);
            next = region.end + 1;
        }
        for line in &lines[next..] {
            out.push_str(line);
        }

        if changed == 0 {
            return Ok(Rewrite::untouched(content, regions.len()));
        }
        Ok(Rewrite {
            content: out,
            matched: regions.len(),
            changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PatchOutcome;

    fn rewriter() -> MethodRewriter {
        MethodRewriter::new(
            MethodBody::new([
                ".method static constructor <clinit>()V",
                "    .registers 1",
                "    return-void",
                ".end method",
            ])
            .unwrap(),
        )
    }

    const CLASS: &str = "\
.class public Lcom/pairip/VMRunner;
.super Ljava/lang/Object;

.method static constructor <clinit>()V
    .registers 2
    const-string v0, \"pairipcore\"
    invoke-static {v0}, Ljava/lang/System;->loadLibrary(Ljava/lang/String;)V
    return-void
.end method

.method public static invoke(Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;
    .registers 3
    const/4 v0, 0x0
    return-object v0
.end method
";

    #[test]
    fn replaces_region_and_keeps_rest() {
        let r = rewriter().apply(CLASS).unwrap();
        assert_eq!(r.outcome(), PatchOutcome::Changed(1));
        assert!(r.content.contains(
            ".method static constructor <clinit>()V\n    .registers 1\n    return-void\n.end method\n\n.method public static invoke"
        ));
        assert!(!r.content.contains("pairipcore"));
        assert!(r.content.ends_with("    return-object v0\n.end method\n"));
    }

    #[test]
    fn second_application_is_identity() {
        let once = rewriter().apply(CLASS).unwrap();
        let twice = rewriter().apply(&once.content).unwrap();
        assert_eq!(twice.outcome(), PatchOutcome::Unchanged);
        assert_eq!(twice.content, once.content);
    }

    #[test]
    fn absent_method_leaves_content() {
        let text = ".class public La;\n.super Ljava/lang/Object;\n";
        let r = rewriter().apply(text).unwrap();
        assert_eq!(r.outcome(), PatchOutcome::NotApplicable);
        assert_eq!(r.content, text);
    }

    #[test]
    fn keeps_crlf_and_missing_final_newline() {
        let text = ".class public La;\r\n.method static constructor <clinit>()V\r\n    nop\r\n.end method";
        let r = rewriter().apply(text).unwrap();
        assert_eq!(
            r.content,
            ".class public La;\r\n.method static constructor <clinit>()V\r\n    .registers 1\r\n    return-void\r\n.end method"
        );
    }

    #[test]
    fn malformed_region_is_error() {
        let text = ".method static constructor <clinit>()V\n    nop\n";
        assert!(matches!(
            rewriter().apply(text),
            Err(PatchError::MalformedRegion { .. })
        ));
    }

    #[test]
    fn body_validation() {
        assert!(MethodBody::new(Vec::<String>::new()).is_err());
        assert!(MethodBody::new(["    return-void", ".end method"]).is_err());
        assert!(MethodBody::new([".method public run()V", "    return-void"]).is_err());
        assert!(MethodBody::new([".method public run()V", ".end method", ".end method"]).is_err());
        assert!(MethodBody::new([".method public run()V", ".method public other()V", ".end method"]).is_err());
        let b = MethodBody::new([".method public run()V", ".end method"]).unwrap();
        assert_eq!(b.identity().to_string(), "run()V");
    }
}
