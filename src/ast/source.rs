use colored::Colorize;

/// A single point in source text: 1-based line, 0-based column and the
/// absolute byte index into the file.
///
/// The all-zero point is reserved as a sentinel that must never describe
/// real source text; compiler-synthesized nodes carry
/// [`SourceOrigin::Synth`] instead of a fabricated location.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SrcPoint {
    pub line: u32,
    pub col: u32,
    pub index: u32,
}

impl SrcPoint {
    pub fn new(line: u32, col: u32, index: u32) -> SrcPoint {
        SrcPoint { line, col, index }
    }

    /// The reserved `(0, 0, 0)` sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.line == 0 && self.col == 0 && self.index == 0
    }
}

/// Where an AST node comes from: either a concrete span of source text or
/// the compiler itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SourceOrigin {
    Loc { start: SrcPoint, end: SrcPoint },
    Synth,
}

impl SourceOrigin {
    /// Build a concrete location. Passes must never call this for nodes
    /// they synthesize; the sentinel check guards against smuggling the
    /// old `(0,0,0)` convention back in.
    pub fn loc(start: SrcPoint, end: SrcPoint) -> SourceOrigin {
        debug_assert!(
            !start.is_sentinel() || !end.is_sentinel(),
            "synthesized nodes must use SourceOrigin::Synth"
        );
        SourceOrigin::Loc { start, end }
    }

    pub fn is_synth(&self) -> bool {
        matches!(self, SourceOrigin::Synth)
    }

    /// Merge two origins into one covering both. Synthetic origins are
    /// absorbed by concrete ones so error reporting can always fall back
    /// to the nearest source-backed ancestor.
    pub fn merge(&self, other: &SourceOrigin) -> SourceOrigin {
        match (self, other) {
            (SourceOrigin::Loc { start, .. }, SourceOrigin::Loc { end, .. }) => SourceOrigin::Loc {
                start: *start,
                end: *end,
            },
            (loc @ SourceOrigin::Loc { .. }, SourceOrigin::Synth) => *loc,
            (SourceOrigin::Synth, loc @ SourceOrigin::Loc { .. }) => *loc,
            (SourceOrigin::Synth, SourceOrigin::Synth) => SourceOrigin::Synth,
        }
    }

    /// Render this origin against the source text it was produced from,
    /// marking the offending range in red with a trailing pointer line.
    /// Synthetic origins render as the bare message.
    pub fn render(&self, source: &str, msg: impl ToString) -> String {
        let SourceOrigin::Loc { start, end } = self else {
            return format!("(synthesized) {}", msg.to_string());
        };

        let lines = source.lines().collect::<Vec<_>>();
        let first = start.line.saturating_sub(1) as usize;
        let last = (end.line.saturating_sub(1) as usize).min(lines.len().saturating_sub(1));

        let Some(line_str) = lines.get(first) else {
            return format!("{}:{}: {}", start.line, start.col, msg.to_string());
        };

        // margin before the left border, wide enough for the last line number
        let left_margin = format!("{}", end.line).len();
        let left_margin_fill = " ".repeat(left_margin);

        // split right at the start of the error in the first line
        let split_at = (start.col as usize).min(line_str.len());
        let (left, right) = line_str.split_at(split_at);

        let (left, right) = if first != last {
            // the error ranges over more than a single line, the rest of
            // this line is part of it
            (left.to_string(), right.red().to_string())
        } else {
            let err_len = (end.col.saturating_sub(start.col) as usize).min(right.len());
            let (err_str, after_err) = right.split_at(err_len);
            (left.to_string(), format!("{}{after_err}", err_str.red()))
        };

        let mut rendered = format!(
            "{left_margin_fill} |\n{line} |{left}{right}",
            line = start.line
        );

        for line in lines.iter().take(last + 1).skip(first + 1) {
            rendered = format!("{rendered}\n{left_margin_fill} |{}", line.red());
        }

        let pointer_fill = " ".repeat(end.col.saturating_sub(1) as usize);
        format!(
            "{rendered}\n{left_margin_fill} |{pointer_fill}^--- {}\n{left_margin_fill} |",
            msg.to_string()
        )
    }
}

impl Default for SourceOrigin {
    fn default() -> Self {
        SourceOrigin::Synth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_point() {
        assert!(SrcPoint::new(0, 0, 0).is_sentinel());
        assert!(!SrcPoint::new(1, 0, 0).is_sentinel());
    }

    #[test]
    fn test_merge_prefers_concrete() {
        let loc = SourceOrigin::loc(SrcPoint::new(1, 0, 0), SrcPoint::new(1, 3, 3));
        assert_eq!(loc.merge(&SourceOrigin::Synth), loc);
        assert_eq!(SourceOrigin::Synth.merge(&loc), loc);
        assert_eq!(
            SourceOrigin::Synth.merge(&SourceOrigin::Synth),
            SourceOrigin::Synth
        );
    }

    #[test]
    fn test_merge_spans() {
        let a = SourceOrigin::loc(SrcPoint::new(1, 0, 0), SrcPoint::new(1, 3, 3));
        let b = SourceOrigin::loc(SrcPoint::new(2, 0, 10), SrcPoint::new(2, 5, 15));
        assert_eq!(
            a.merge(&b),
            SourceOrigin::Loc {
                start: SrcPoint::new(1, 0, 0),
                end: SrcPoint::new(2, 5, 15)
            }
        );
    }

    #[test]
    fn test_render_synth() {
        let rendered = SourceOrigin::Synth.render("let x = 1;", "boom");
        assert!(rendered.contains("boom"));
        assert!(rendered.contains("synthesized"));
    }

    #[test]
    fn test_render_single_line() {
        let origin = SourceOrigin::loc(SrcPoint::new(1, 4, 4), SrcPoint::new(1, 5, 5));
        let rendered = origin.render("let x = 1;", "unknown name");
        assert!(rendered.contains("unknown name"));
        assert!(rendered.contains("^---"));
    }
}
