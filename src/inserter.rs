//! Guarded insertion of a short-circuit statement into a method.
//!
//! The guard goes right after the method's leading directive block
//! (registers, params and annotations), which in a typical disassembly ends
//! with the closing `.end annotation`. The original instructions stay in
//! place after it as unreachable code.

use crate::error::{PatchError, PatchResult};
use crate::region::{find_regions, line_terminator, split_lines, MethodRegion};
use crate::rules::{ContentRule, Rewrite};
use crate::types::MethodIdentity;

const INDENT: &str = "    ";

#[derive(Debug, Clone)]
pub struct MethodInserter {
    target: MethodIdentity,
    guard: Vec<String>,
}

impl MethodInserter {
    pub fn new<I, S>(target: MethodIdentity, guard: I) -> PatchResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let guard: Vec<String> = guard
            .into_iter()
            .map(|s| s.into().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if guard.is_empty() {
            return Err(PatchError::InvalidReplacement(format!(
                "empty guard for {target}"
            )));
        }
        Ok(MethodInserter { target, guard })
    }

    /// A guard consisting of a single `return-void`.
    pub fn return_void(target: MethodIdentity) -> Self {
        MethodInserter {
            target,
            guard: vec!["return-void".to_string()],
        }
    }

    pub fn target(&self) -> &MethodIdentity {
        &self.target
    }

    /// The executable lines after the anchor already start with the whole
    /// guard, or the first of them is an unconditional return.
    fn is_short_circuited(&self, lines: &[&str], anchor: usize, region: &MethodRegion) -> bool {
        let mut executable = lines[anchor + 1..region.end]
            .iter()
            .map(|l| l.trim())
            .filter(|t| !(t.is_empty() || t.starts_with('#') || t.starts_with(".line")))
            .peekable();
        if executable.peek().map_or(false, |t| is_unconditional_return(t)) {
            return true;
        }
        let mut guard = self.guard.iter();
        loop {
            match (guard.next(), executable.next()) {
                (None, _) => return true,
                (Some(g), Some(t)) if g == t => continue,
                _ => return false,
            }
        }
    }
}

fn is_unconditional_return(t: &str) -> bool {
    t == "return-void"
        || ["return ", "return-wide ", "return-object "]
            .iter()
            .any(|p| t.starts_with(p))
}

/// Index of the last line of the leading directive block, or the header line
/// when the method starts with an instruction.
pub(crate) fn find_anchor(lines: &[&str], region: &MethodRegion) -> usize {
    let mut anchor = region.start;
    let mut depth = 0usize;

    for i in region.body() {
        let t = lines[i].trim();
        if depth > 0 {
            if t.starts_with(".end annotation") || t.starts_with(".end subannotation") {
                depth -= 1;
            } else if t.starts_with(".annotation") || t.starts_with(".subannotation") {
                depth += 1;
            }
            anchor = i;
            continue;
        }

        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        if t.starts_with(".annotation") {
            depth += 1;
        } else if !(t.starts_with(".registers")
            || t.starts_with(".locals")
            || t.starts_with(".param")
            || t.starts_with(".end param"))
        {
            break;
        }
        anchor = i;
    }
    anchor
}

impl ContentRule for MethodInserter {
    fn describe(&self) -> String {
        format!("guard {}", self.target)
    }

    fn apply(&self, content: &str) -> PatchResult<Rewrite> {
        let lines = split_lines(content);
        let regions = find_regions(&lines, &self.target)?;

        let anchors: Vec<usize> = regions
            .iter()
            .map(|r| (r, find_anchor(&lines, r)))
            .filter(|(r, anchor)| !self.is_short_circuited(&lines, *anchor, r))
            .map(|(_, anchor)| anchor)
            .collect();
        if anchors.is_empty() {
            return Ok(Rewrite::untouched(content, regions.len()));
        }

        let eol = line_terminator(content);
        let mut out = String::with_capacity(content.len() + 32);
        let mut pending = anchors.iter().peekable();
        for (i, line) in lines.iter().enumerate() {
            out.push_str(line);
            if pending.peek() == Some(&&i) {
                pending.next();
                for g in &self.guard {
                    out.push_str(INDENT);
                    out.push_str(g);
                    out.push_str(eol);
                }
            }
        }

        Ok(Rewrite {
            content: out,
            matched: regions.len(),
            changed: anchors.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PatchOutcome;

    fn inserter() -> MethodInserter {
        MethodInserter::return_void("verify(Landroid/content/Context;)V".parse().unwrap())
    }

    #[test]
    fn anchor_after_annotations() {
        let text = "\
.method public static verify(Landroid/content/Context;)V
    .registers 3
    .param p0, \"context\"

    .annotation system Ldalvik/annotation/Throws;
        value = {
            Ljava/lang/Exception;
        }
    .end annotation

    .line 12
    invoke-static {p0}, La;->b(Landroid/content/Context;)V
    return-void
.end method
";
        let lines = split_lines(text);
        let region = MethodRegion { start: 0, end: 13 };
        assert_eq!(lines[find_anchor(&lines, &region)].trim(), ".end annotation");
    }

    #[test]
    fn anchor_without_annotations() {
        let text = ".method public static verify(Landroid/content/Context;)V\n    .registers 3\n    nop\n.end method\n";
        let r = inserter().apply(text).unwrap();
        assert_eq!(
            r.content,
            ".method public static verify(Landroid/content/Context;)V\n    .registers 3\n    return-void\n    nop\n.end method\n"
        );
    }

    #[test]
    fn skips_existing_guard_beyond_small_window() {
        let text = "\
.method public static verify(Landroid/content/Context;)V
    .registers 3
    .annotation system Ldalvik/annotation/Throws;
    .end annotation



    # already neutralised


    return-void
    nop
.end method
";
        let r = inserter().apply(text).unwrap();
        assert_eq!(r.outcome(), PatchOutcome::Unchanged);
    }

    #[test]
    fn other_return_forms_count_as_guard() {
        let text = ".method public static verify(Landroid/content/Context;)V\n    .locals 1\n    .line 3\n    return-object v0\n.end method\n";
        assert_eq!(inserter().apply(text).unwrap().outcome(), PatchOutcome::Unchanged);
    }

    #[test]
    fn multi_line_guard() {
        let target: MethodIdentity = "isValid()Z".parse().unwrap();
        let ins = MethodInserter::new(target, ["const/4 v0, 0x1", "return v0"]).unwrap();
        let text = ".method public isValid()Z\n    .registers 2\n    const/4 v0, 0x0\n    return v0\n.end method\n";
        let once = ins.apply(text).unwrap();
        assert_eq!(once.outcome(), PatchOutcome::Changed(1));
        assert!(once.content.contains(".registers 2\n    const/4 v0, 0x1\n    return v0\n    const/4 v0, 0x0"));
        assert_eq!(ins.apply(&once.content).unwrap().outcome(), PatchOutcome::Unchanged);
    }

    #[test]
    fn first_guard_line_alone_is_not_a_guard() {
        let target: MethodIdentity = "isValid()Z".parse().unwrap();
        let ins = MethodInserter::new(target, ["const/4 v0, 0x1", "return v0"]).unwrap();
        let text = ".method public isValid()Z\n    .registers 2\n    const/4 v0, 0x1\n    if-eqz p0, :cond_0\n    const/4 v0, 0x0\n    :cond_0\n    return v0\n.end method\n";
        let once = ins.apply(text).unwrap();
        assert_eq!(once.outcome(), PatchOutcome::Changed(1));
        assert!(once.content.contains(".registers 2\n    const/4 v0, 0x1\n    return v0\n    const/4 v0, 0x1\n    if-eqz"));
        assert_eq!(ins.apply(&once.content).unwrap().outcome(), PatchOutcome::Unchanged);
    }

    #[test]
    fn empty_guard_rejected() {
        let target: MethodIdentity = "isValid()Z".parse().unwrap();
        assert!(MethodInserter::new(target, ["   "]).is_err());
    }
}
