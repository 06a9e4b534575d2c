//! Custom SQL functions installed on every connection.

use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::Connection;

/// Register every custom function on a fresh connection.
pub fn register_all(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_aggregate_function(
        "VIDEO_GROUP_AGGREGATE",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        VideoGroupAggregate,
    )
}

/// Strip a leading "the " (any case), reporting whether one was present.
pub(crate) fn strip_article(value: &str) -> (&str, bool) {
    match value.get(..4) {
        Some(lead) if lead.eq_ignore_ascii_case("the ") => (&value[4..], true),
        _ => (value, false),
    }
}

/// Longest common prefix of two strings, case-insensitive for ASCII,
/// exact for anything else so multi-byte codepoints are never split.
pub(crate) fn common_prefix<'a>(lhs: &'a str, rhs: &str) -> &'a str {
    let mut end = 0;
    let mut rhs_chars = rhs.chars();
    for (idx, lc) in lhs.char_indices() {
        let Some(rc) = rhs_chars.next() else { break };
        let matches = if lc.is_ascii() && rc.is_ascii() {
            lc.eq_ignore_ascii_case(&rc)
        } else {
            lc == rc
        };
        if !matches {
            break;
        }
        end = idx + lc.len_utf8();
    }
    &lhs[..end]
}

// ---------------------------------------------------------------------------
// VIDEO_GROUP_AGGREGATE
// ---------------------------------------------------------------------------

/// Folds titles into their longest common case-insensitive prefix.
///
/// A leading "the " is skipped on every operand; when only some operands
/// carried the article, the result is flagged as `(The) <prefix>`.
#[derive(Default)]
struct VideoGroupState {
    prefix: Option<String>,
    with_article: bool,
    without_article: bool,
}

struct VideoGroupAggregate;

impl Aggregate<VideoGroupState, Option<String>> for VideoGroupAggregate {
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<VideoGroupState> {
        Ok(VideoGroupState::default())
    }

    fn step(&self, ctx: &mut Context<'_>, state: &mut VideoGroupState) -> rusqlite::Result<()> {
        let value: Option<String> = ctx.get(0)?;
        let Some(value) = value else { return Ok(()) };
        let (stripped, had_article) = strip_article(&value);
        if had_article {
            state.with_article = true;
        } else {
            state.without_article = true;
        }
        state.prefix = Some(match state.prefix.take() {
            None => stripped.to_owned(),
            Some(prev) => common_prefix(&prev, stripped).to_owned(),
        });
        Ok(())
    }

    fn finalize(
        &self,
        _ctx: &mut Context<'_>,
        state: Option<VideoGroupState>,
    ) -> rusqlite::Result<Option<String>> {
        Ok(state.and_then(|s| {
            s.prefix.map(|p| {
                if s.with_article && s.without_article {
                    format!("(The) {p}")
                } else {
                    p
                }
            })
        }))
    }
}
